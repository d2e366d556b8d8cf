use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use slackbridge_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let fields: [(&str, String, &[&str]); 12] = [
        (
            "slack.app_token",
            redact_token(config.slack.app_token.expose_secret()),
            &["SLACKBRIDGE_SLACK_APP_TOKEN", "SLACK_APP_TOKEN"],
        ),
        (
            "slack.bot_token",
            redact_token(config.slack.bot_token.expose_secret()),
            &["SLACKBRIDGE_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"],
        ),
        ("slack.api_base_url", config.slack.api_base_url.clone(), &["SLACKBRIDGE_SLACK_API_BASE_URL"]),
        (
            "slack.assistant_name",
            config.slack.assistant_name.clone(),
            &["SLACKBRIDGE_SLACK_ASSISTANT_NAME"],
        ),
        ("slack.ack_text", config.slack.ack_text.clone(), &["SLACKBRIDGE_SLACK_ACK_TEXT"]),
        (
            "slack.request_timeout_secs",
            config.slack.request_timeout_secs.to_string(),
            &["SLACKBRIDGE_SLACK_REQUEST_TIMEOUT_SECS"],
        ),
        ("socket.max_retries", config.socket.max_retries.to_string(), &["SLACKBRIDGE_SOCKET_MAX_RETRIES"]),
        (
            "socket.base_delay_ms",
            config.socket.base_delay_ms.to_string(),
            &["SLACKBRIDGE_SOCKET_BASE_DELAY_MS"],
        ),
        ("socket.max_delay_ms", config.socket.max_delay_ms.to_string(), &["SLACKBRIDGE_SOCKET_MAX_DELAY_MS"]),
        ("groups", format!("{} registered", config.groups.len()), &[]),
        (
            "logging.level",
            config.logging.level.clone(),
            &["SLACKBRIDGE_LOGGING_LEVEL", "SLACKBRIDGE_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["SLACKBRIDGE_LOGGING_FORMAT", "SLACKBRIDGE_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        lines.push(render_line(key, &value, source(key, env_keys)));
    }
    for group in &config.groups {
        lines.push(format!("  - {} ({})", group.jid, group.name));
    }

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
