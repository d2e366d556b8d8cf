use serde_json::json;
use slackbridge_slack::{api::PostMessageRequest, events::channel_id_from_jid, HttpSlackApi, SlackApi};

use crate::commands::{run_api_command, CommandResult, EXIT_SLACK_API};

const COMMAND: &str = "test-send";
pub const DEFAULT_TEXT: &str =
    "Hello from slackbridge! This is a test message to verify the Slack connection.";

/// Posts one plain-text message to `channel` (raw id or `slack:` jid) with
/// the bot token.
pub fn run(channel: &str, text: Option<&str>) -> CommandResult {
    let request = PostMessageRequest {
        channel: channel_id_from_jid(channel).to_string(),
        text: text.unwrap_or(DEFAULT_TEXT).to_string(),
        blocks: None,
        thread_ts: None,
    };
    run_api_command(COMMAND, |api| send(api, request))
}

async fn send(api: HttpSlackApi, request: PostMessageRequest) -> CommandResult {
    match api.post_message(&request).await {
        Ok(posted) => CommandResult::success_with_details(
            COMMAND,
            format!("message sent to {}\nmessage ts: {}", request.channel, posted.ts),
            Some(json!({ "channel": request.channel, "ts": posted.ts })),
        ),
        Err(error) => {
            let mut message = format!("send to {} failed: {error}", request.channel);
            if let Some(hint) = error.slack_error().and_then(hint_for) {
                message.push('\n');
                message.push_str(hint);
            }
            CommandResult::failure(COMMAND, "slack_api", message, EXIT_SLACK_API)
        }
    }
}

fn hint_for(slack_error: &str) -> Option<&'static str> {
    match slack_error {
        "channel_not_found" => Some(
            "hint: the channel was not found; the bot may need to be invited or the channel id is wrong",
        ),
        "not_in_channel" => {
            Some("hint: the bot is not in this channel; open a DM with the bot or invite it first")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::hint_for;

    #[test]
    fn known_delivery_errors_carry_hints() {
        assert!(hint_for("channel_not_found").is_some_and(|hint| hint.contains("invited")));
        assert!(hint_for("not_in_channel").is_some_and(|hint| hint.contains("DM")));
        assert_eq!(hint_for("ratelimited"), None);
    }
}
