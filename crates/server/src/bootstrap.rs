use std::sync::Arc;

use slackbridge_core::config::AppConfig;
use slackbridge_slack::{ApiError, SlackChannel};
use thiserror::Error;
use tracing::{info, warn};

use crate::bus::ConfiguredBus;

pub struct Application {
    pub config: AppConfig,
    pub bus: Arc<ConfiguredBus>,
    pub channel: SlackChannel,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("slack client setup failed: {0}")]
    SlackClient(#[source] ApiError),
}

/// Wires the configured bus to the Slack channel. Nothing touches the
/// network until the channel is connected.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        groups = config.groups.len(),
        "starting application bootstrap"
    );

    for warning in config.slack.token_warnings() {
        warn!(
            event_name = "system.bootstrap.token_shape",
            correlation_id = "bootstrap",
            warning = %warning,
            "slack token looks unusual; passing it to slack unchanged"
        );
    }

    let bus = Arc::new(ConfiguredBus::from_groups(&config.groups));
    let channel =
        SlackChannel::from_config(&config, bus.clone()).map_err(BootstrapError::SlackClient)?;

    info!(
        event_name = "system.bootstrap.channel_ready",
        correlation_id = "bootstrap",
        api_base_url = %config.slack.api_base_url,
        "slack channel wired"
    );

    Ok(Application { config, bus, channel })
}
