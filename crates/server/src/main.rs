mod bootstrap;
mod bus;

use anyhow::Result;
use slackbridge_core::config::{AppConfig, LoadOptions};
use slackbridge_core::{Channel, MessageBus};
use slackbridge_slack::ConnectionState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use slackbridge_core::config::LogFormat::*;

    // RUST_LOG, when set, wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();
    run().await
}

async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    app.channel.connect().await?;

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        assistant_name = %app.config.slack.assistant_name,
        registered_groups = app.bus.registered_groups().len(),
        "slackbridge-server started"
    );

    let mut state = app.channel.subscribe_state();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        _ = state.wait_for(|state| *state == ConnectionState::Disconnected) => {
            warn!(
                event_name = "system.server.session_lost",
                correlation_id = "shutdown",
                "socket session ended and could not be re-established"
            );
        }
    }

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        delivered = app.bus.delivered_count(),
        discovered_chats = app.bus.discovered_chats().len(),
        "slackbridge-server stopping"
    );
    app.channel.disconnect().await?;

    Ok(())
}
