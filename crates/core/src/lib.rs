pub mod channel;
pub mod config;
pub mod domain;
pub mod errors;

pub use channel::{route_jid, Channel, DeliveryFormat, DeliveryReceipt, MessageBus};
pub use domain::group::RegisteredGroup;
pub use domain::message::{ChatMetadata, InboundMessage};
pub use errors::{BestEffort, ChannelError};
