use std::collections::HashMap;

use serde_json::{json, Value};
use slackbridge_slack::{HttpSlackApi, SlackApi};

use crate::commands::{run_api_command, CommandResult};

const COMMAND: &str = "resolve-users";
const SLACKBOT: &str = "USLACKBOT";
const DM_PAGE_SIZE: u32 = 200;

/// Maps each user id to a display name and, when one exists, the bot's DM
/// channel with that user. A failed lookup is reported on its own line and
/// does not stop the run.
pub fn run(user_ids: &[String]) -> CommandResult {
    let user_ids = user_ids.to_vec();
    run_api_command(COMMAND, |api| inspect(api, user_ids))
}

async fn inspect(api: HttpSlackApi, user_ids: Vec<String>) -> CommandResult {
    let (dm_by_user, dm_note) = match api.list_direct_messages(DM_PAGE_SIZE).await {
        Ok(channels) => (
            channels
                .into_iter()
                .filter_map(|channel| channel.user.map(|user| (user, channel.id)))
                .collect::<HashMap<_, _>>(),
            None,
        ),
        Err(error) => (HashMap::new(), Some(format!("DM lookup unavailable: {error}"))),
    };

    let mut lines = Vec::new();
    let mut resolved = Vec::new();
    if let Some(note) = dm_note {
        lines.push(note);
    }

    for user_id in &user_ids {
        let dm = dm_by_user.get(user_id).map(String::as_str);
        let dm_label = dm.unwrap_or("<none>");

        if user_id == SLACKBOT {
            lines.push(format!("Slackbot -> DM: {dm_label}"));
            resolved.push(entry(user_id, Some("Slackbot"), dm, None));
            continue;
        }

        match api.user_info(user_id).await {
            Ok(profile) => {
                let name = profile.display_name().unwrap_or(user_id.as_str());
                lines.push(format!("{name} ({user_id}) -> DM: {dm_label}"));
                resolved.push(entry(user_id, Some(name), dm, None));
            }
            Err(error) => {
                let reason = error.slack_error().map_or_else(|| error.to_string(), str::to_owned);
                lines.push(format!("Unknown ({user_id}) -> DM: {dm_label} [error: {reason}]"));
                resolved.push(entry(user_id, None, dm, Some(&reason)));
            }
        }
    }

    CommandResult::success_with_details(COMMAND, lines.join("\n"), Some(Value::Array(resolved)))
}

fn entry(user_id: &str, name: Option<&str>, dm: Option<&str>, error: Option<&str>) -> Value {
    json!({ "user_id": user_id, "name": name, "dm_channel": dm, "error": error })
}
