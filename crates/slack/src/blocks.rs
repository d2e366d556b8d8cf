//! Outbound message shapes.
//!
//! A reply body may embed raw Block Kit as `<blocks>[...]</blocks>`; the text
//! around the wrapper becomes the notification/accessibility fallback. Each
//! delivery tier has its own `chat.postMessage` body builder here.

use serde_json::{json, Value};

use crate::api::PostMessageRequest;

const BLOCKS_OPEN: &str = "<blocks>";
const BLOCKS_CLOSE: &str = "</blocks>";

#[derive(Clone, Debug, PartialEq)]
pub struct BlockKitPayload {
    pub blocks: Vec<Value>,
    pub fallback_text: String,
}

/// Extracts the first `<blocks>...</blocks>` segment from `text`.
///
/// Returns `None` unless the segment holds a non-empty JSON array whose
/// every element is an object with a `type` key. Malformed content is not an
/// error: the caller sends the text through the markdown/plain tiers instead.
pub fn parse_blocks(text: &str, default_fallback: &str) -> Option<BlockKitPayload> {
    let start = text.find(BLOCKS_OPEN)?;
    let inner_start = start + BLOCKS_OPEN.len();
    let inner_len = text[inner_start..].find(BLOCKS_CLOSE)?;
    let inner_end = inner_start + inner_len;
    let end = inner_end + BLOCKS_CLOSE.len();

    let parsed: Value = serde_json::from_str(&text[inner_start..inner_end]).ok()?;
    let Value::Array(blocks) = parsed else {
        return None;
    };
    if blocks.is_empty() || !blocks.iter().all(is_typed_block) {
        return None;
    }

    let remainder = format!("{}{}", &text[..start], &text[end..]);
    let trimmed = remainder.trim();
    let fallback_text =
        if trimmed.is_empty() { default_fallback.to_owned() } else { trimmed.to_owned() };

    Some(BlockKitPayload { blocks, fallback_text })
}

fn is_typed_block(block: &Value) -> bool {
    block.as_object().is_some_and(|object| object.contains_key("type"))
}

pub fn markdown_block(text: &str) -> Value {
    json!({ "type": "markdown", "text": text })
}

pub fn block_kit_message(
    channel: &str,
    payload: &BlockKitPayload,
    thread_ts: Option<&str>,
) -> PostMessageRequest {
    PostMessageRequest {
        channel: channel.to_owned(),
        text: payload.fallback_text.clone(),
        blocks: Some(payload.blocks.clone()),
        thread_ts: thread_ts.map(str::to_owned),
    }
}

pub fn markdown_message(channel: &str, text: &str, thread_ts: Option<&str>) -> PostMessageRequest {
    PostMessageRequest {
        channel: channel.to_owned(),
        text: text.to_owned(),
        blocks: Some(vec![markdown_block(text)]),
        thread_ts: thread_ts.map(str::to_owned),
    }
}

pub fn plain_message(channel: &str, text: &str, thread_ts: Option<&str>) -> PostMessageRequest {
    PostMessageRequest {
        channel: channel.to_owned(),
        text: text.to_owned(),
        blocks: None,
        thread_ts: thread_ts.map(str::to_owned),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{markdown_message, parse_blocks, plain_message};

    const FALLBACK: &str = "Message from Andy";

    #[test]
    fn extracts_blocks_and_surrounding_text() {
        let text = "prefix <blocks>[{\"type\":\"section\"}]</blocks> suffix";
        let payload = parse_blocks(text, FALLBACK).expect("valid block kit");

        assert_eq!(payload.blocks.len(), 1);
        assert_eq!(payload.fallback_text, "prefix  suffix");
    }

    #[test]
    fn empty_surrounding_text_uses_default_fallback() {
        let text = "  <blocks>[{\"type\":\"divider\"},{\"type\":\"section\",\"text\":{\"type\":\"mrkdwn\",\"text\":\"*hi*\"}}]</blocks>\n";
        let payload = parse_blocks(text, FALLBACK).expect("valid block kit");

        assert_eq!(payload.blocks.len(), 2);
        assert_eq!(payload.fallback_text, FALLBACK);
    }

    #[test]
    fn wrapper_may_span_lines() {
        let text = "Summary\n<blocks>\n[\n  {\"type\": \"header\"}\n]\n</blocks>";
        let payload = parse_blocks(text, FALLBACK).expect("multi-line block kit");
        assert_eq!(payload.blocks[0]["type"], "header");
        assert_eq!(payload.fallback_text, "Summary");
    }

    #[test]
    fn only_first_wrapper_is_consumed() {
        let text = "a <blocks>[{\"type\":\"divider\"}]</blocks> b <blocks>[]</blocks>";
        let payload = parse_blocks(text, FALLBACK).expect("first wrapper is valid");
        assert_eq!(payload.fallback_text, "a  b <blocks>[]</blocks>");
    }

    #[test]
    fn malformed_wrappers_are_not_block_kit() {
        let cases = [
            "no wrapper at all",
            "<blocks>[{\"type\":\"section\"}]",
            "<blocks>not json</blocks>",
            "<blocks>[]</blocks>",
            "<blocks>{\"type\":\"section\"}</blocks>",
            "<blocks>[{\"text\":\"missing type\"}]</blocks>",
            "<blocks>[{\"type\":\"section\"}, 42]</blocks>",
            "<blocks>[[\"type\"]]</blocks>",
        ];

        for text in cases {
            assert_eq!(parse_blocks(text, FALLBACK), None, "{text}");
        }
    }

    #[test]
    fn markdown_tier_wraps_text_in_single_markdown_block() {
        let request = markdown_message("C1", "*bold*", Some("1730000000.000100"));
        let body = serde_json::to_value(&request).expect("serialize");

        assert_eq!(
            body,
            json!({
                "channel": "C1",
                "text": "*bold*",
                "blocks": [{ "type": "markdown", "text": "*bold*" }],
                "thread_ts": "1730000000.000100"
            })
        );
    }

    #[test]
    fn plain_tier_has_no_blocks() {
        let request = plain_message("C1", "hello", None);
        assert!(request.blocks.is_none());
        assert!(request.thread_ts.is_none());
    }
}
