//! Slack channel adapter - Socket Mode in, Web API out
//!
//! - **API** (`api`) - `auth.test`, `users.info`, `chat.postMessage`, `chat.delete` and diagnostics queries
//! - **Socket Mode** (`socket`) - WebSocket session with ack-first dispatch and reconnection
//! - **Events** (`events`) - Message screening and jid / timestamp normalization
//! - **Block Kit** (`blocks`) - `<blocks>` extraction and per-tier message bodies
//! - **Channel** (`channel`) - `SlackChannel`, the `Channel` implementation the bus talks to
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps and enable Socket Mode
//! 2. Subscribe to `message.channels`, `message.groups` and `message.im`
//! 3. Set `SLACK_APP_TOKEN` (`xapp-`) and `SLACK_BOT_TOKEN` (`xoxb-`)
//!
//! # Architecture
//!
//! ```text
//! Slack ─▶ WebSocketTransport ─▶ SocketModeRunner ─▶ InboundHandler ─▶ MessageBus
//!                                                                        │
//! Slack ◀── chat.postMessage ◀── SlackChannel::send_message ◀────────────┘
//!           (Block Kit → markdown → plain)
//! ```

pub mod api;
pub mod blocks;
pub mod channel;
pub mod events;
pub mod socket;

pub use api::{ApiError, HttpSlackApi, SlackApi};
pub use channel::{ConnectionState, InboundHandler, SlackChannel, SlackChannelOptions};
pub use socket::{ReconnectPolicy, SocketTransport, WebSocketTransport};
