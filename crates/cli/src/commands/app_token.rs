use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use slackbridge_core::config::{AppConfig, LoadOptions};
use slackbridge_slack::HttpSlackApi;

use crate::commands::{runtime, CommandResult, EXIT_CONFIG, EXIT_RUNTIME, EXIT_SLACK_API};

const COMMAND: &str = "app-token";

/// Reports the shape of the app-level token and asks Slack for a Socket Mode
/// URL with it. Runs on unvalidated config so a swapped token is still
/// described instead of rejected.
pub fn run() -> CommandResult {
    let config = match AppConfig::load_unvalidated(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };

    let token = config.slack.app_token.expose_secret().trim().to_string();
    if token.is_empty() {
        return CommandResult::failure(
            COMMAND,
            "config_validation",
            "slack.app_token is not set (SLACKBRIDGE_SLACK_APP_TOKEN or SLACK_APP_TOKEN)",
            EXIT_CONFIG,
        );
    }

    let mut lines = describe_token(&token);

    let api = match HttpSlackApi::from_config(&config.slack) {
        Ok(api) => api,
        Err(error) => return CommandResult::failure(COMMAND, "http_client", error.to_string(), EXIT_RUNTIME),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure(COMMAND, "runtime", error, EXIT_RUNTIME),
    };

    let app_token = SecretString::from(token.clone());
    match runtime.block_on(api.open_socket_connection(&app_token)) {
        Ok(_) => {
            lines.push("connection test ok: true".to_string());
            let details = json!({
                "prefix": token_prefix(&token),
                "length": token.chars().count(),
                "connection_ok": true,
            });
            CommandResult::success_with_details(COMMAND, lines.join("\n"), Some(details))
        }
        Err(error) => {
            lines.push("connection test ok: false".to_string());
            lines.push(format!("error: {}", error.slack_error().map_or_else(|| error.to_string(), str::to_owned)));
            CommandResult::failure(COMMAND, "slack_api", lines.join("\n"), EXIT_SLACK_API)
        }
    }
}

fn describe_token(token: &str) -> Vec<String> {
    let mut lines = vec![
        format!("token prefix: {}", token_prefix(token)),
        format!("token length: {}", token.chars().count()),
    ];
    if !token.starts_with("xapp-") {
        lines.push("warning: app-level tokens start with xapp-".to_string());
    }
    lines
}

fn token_prefix(token: &str) -> String {
    token.chars().take(5).collect()
}

#[cfg(test)]
mod tests {
    use super::describe_token;

    #[test]
    fn reports_prefix_length_and_warns_on_wrong_kind() {
        let lines = describe_token("xoxb-123456");
        assert_eq!(lines[0], "token prefix: xoxb-");
        assert_eq!(lines[1], "token length: 11");
        assert!(lines[2].contains("xapp-"));

        assert_eq!(describe_token("xapp-1-A").len(), 2);
    }
}
