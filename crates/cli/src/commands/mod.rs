pub mod app_token;
pub mod config;
pub mod doctor;
pub mod identity;
pub mod resolve_users;
pub mod scopes;
pub mod test_send;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use slackbridge_core::config::{AppConfig, LoadOptions};
use slackbridge_slack::HttpSlackApi;

pub const EXIT_RUNTIME: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_SLACK_API: u8 = 3;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success_with_details(
        command: &str,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Loads validated config, builds the Web API client and drives `inspect` on a
/// fresh current-thread runtime.
fn run_api_command<F, Fut>(command: &str, inspect: F) -> CommandResult
where
    F: FnOnce(HttpSlackApi) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };

    let api = match HttpSlackApi::from_config(&config.slack) {
        Ok(api) => api,
        Err(error) => return CommandResult::failure(command, "http_client", error.to_string(), EXIT_RUNTIME),
    };

    match runtime() {
        Ok(runtime) => runtime.block_on(inspect(api)),
        Err(error) => CommandResult::failure(command, "runtime", error, EXIT_RUNTIME),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize async runtime: {error}"))
}
