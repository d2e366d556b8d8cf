use serde_json::json;
use slackbridge_slack::{ApiError, HttpSlackApi};

use crate::commands::{run_api_command, CommandResult, EXIT_SLACK_API};

const COMMAND: &str = "scopes";
const DM_PAGE_SIZE: u32 = 10;

/// Granted OAuth scopes, plus whether `conversations.list` (DM discovery)
/// is permitted with them.
pub fn run() -> CommandResult {
    run_api_command(COMMAND, inspect)
}

async fn inspect(api: HttpSlackApi) -> CommandResult {
    let granted = match api.granted_scopes().await {
        Ok(granted) => granted,
        Err(error) => return CommandResult::failure(COMMAND, "slack_api", error.to_string(), EXIT_SLACK_API),
    };

    let mut lines = vec![
        format!("x-oauth-scopes: {}", granted.scopes.as_deref().unwrap_or("(not returned)")),
        format!("user: {}", granted.identity.user.as_deref().unwrap_or("<unknown>")),
        format!("team: {}", granted.identity.team.as_deref().unwrap_or("<unknown>")),
    ];

    let conversations = match api.list_direct_messages(DM_PAGE_SIZE).await {
        Ok(_) => ConversationsAccess { ok: true, error: None, needed: None, provided: None },
        Err(ApiError::Slack { error, needed, provided, .. }) => {
            ConversationsAccess { ok: false, error: Some(error), needed, provided }
        }
        Err(other) => {
            ConversationsAccess { ok: false, error: Some(other.to_string()), needed: None, provided: None }
        }
    };

    lines.push(format!("conversations.list ok: {}", conversations.ok));
    lines.push(format!("conversations.list error: {}", conversations.error.as_deref().unwrap_or("none")));
    lines.push(format!("conversations.list needed: {}", conversations.needed.as_deref().unwrap_or("n/a")));
    lines.push(format!(
        "conversations.list provided: {}",
        conversations.provided.as_deref().unwrap_or("n/a")
    ));

    let details = json!({
        "scopes": granted
            .scopes
            .as_deref()
            .map(|scopes| scopes.split(',').map(str::trim).filter(|scope| !scope.is_empty()).collect::<Vec<_>>()),
        "conversations_list": {
            "ok": conversations.ok,
            "error": conversations.error,
            "needed": conversations.needed,
            "provided": conversations.provided,
        },
    });
    CommandResult::success_with_details(COMMAND, lines.join("\n"), Some(details))
}

struct ConversationsAccess {
    ok: bool,
    error: Option<String>,
    needed: Option<String>,
    provided: Option<String>,
}
