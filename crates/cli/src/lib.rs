pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "slackbridge",
    about = "Slack credential and connectivity diagnostics",
    long_about = "Query the Slack Web API with the configured bot and app tokens, and inspect the effective slackbridge configuration.",
    after_help = "Examples:\n  slackbridge doctor --json\n  slackbridge resolve-users U0123ABCD USLACKBOT\n  slackbridge test-send --channel D0123ABCD"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Show the bot identity (auth.test) and its direct-message channels")]
    Identity,
    #[command(about = "Check the app-level token shape and open a Socket Mode connection with it")]
    AppToken,
    #[command(about = "List granted OAuth scopes and check conversations.list permissions")]
    Scopes,
    #[command(about = "Resolve user ids to display names and DM channel ids")]
    ResolveUsers {
        #[arg(required = true, value_name = "USER_ID")]
        user_ids: Vec<String>,
    },
    #[command(about = "Post a single plain-text test message")]
    TestSend {
        #[arg(long, value_name = "ID", help = "Channel or DM id (a `slack:` jid is accepted)")]
        channel: String,
        #[arg(long, help = "Message text (defaults to a short greeting)")]
        text: Option<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, bot identity and Socket Mode readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Identity => commands::identity::run(),
        Command::AppToken => commands::app_token::run(),
        Command::Scopes => commands::scopes::run(),
        Command::ResolveUsers { user_ids } => commands::resolve_users::run(&user_ids),
        Command::TestSend { channel, text } => commands::test_send::run(&channel, text.as_deref()),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (output, passed) = commands::doctor::run(json);
            commands::CommandResult { exit_code: if passed { 0 } else { 1 }, output }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
