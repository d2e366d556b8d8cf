use serde_json::json;
use slackbridge_slack::{ApiError, HttpSlackApi, SlackApi};

use crate::commands::{run_api_command, CommandResult, EXIT_SLACK_API};

const COMMAND: &str = "identity";
const DM_PAGE_SIZE: u32 = 100;

/// `auth.test` for the bot token, then the bot's open direct-message channels.
pub fn run() -> CommandResult {
    run_api_command(COMMAND, inspect)
}

async fn inspect(api: HttpSlackApi) -> CommandResult {
    let identity = match api.auth_test().await {
        Ok(identity) => identity,
        Err(error) => return CommandResult::failure(COMMAND, "slack_api", error.to_string(), EXIT_SLACK_API),
    };

    let mut lines = vec![
        format!("bot user id: {}", identity.user_id),
        format!("bot name: {}", identity.user.as_deref().unwrap_or("<unknown>")),
        format!("team: {}", identity.team.as_deref().unwrap_or("<unknown>")),
    ];

    let direct_messages = match api.list_direct_messages(DM_PAGE_SIZE).await {
        Ok(channels) if channels.is_empty() => {
            lines.push(
                "direct messages: none (expected until someone opens a DM with the bot)".to_string(),
            );
            json!([])
        }
        Ok(channels) => {
            lines.push(format!("direct messages: {}", channels.len()));
            for channel in &channels {
                lines.push(format!(
                    "  - {} (user {})",
                    channel.id,
                    channel.user.as_deref().unwrap_or("<unknown>")
                ));
            }
            json!(channels.iter().map(|channel| json!({ "id": channel.id, "user": channel.user })).collect::<Vec<_>>())
        }
        Err(error) => {
            lines.push(format!("direct messages: unavailable ({})", describe(&error)));
            json!(null)
        }
    };

    let details = json!({
        "user_id": identity.user_id,
        "user": identity.user,
        "team": identity.team,
        "bot_id": identity.bot_id,
        "direct_messages": direct_messages,
    });
    CommandResult::success_with_details(COMMAND, lines.join("\n"), Some(details))
}

fn describe(error: &ApiError) -> String {
    error.slack_error().map_or_else(|| error.to_string(), str::to_owned)
}
