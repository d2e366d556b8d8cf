pub mod group;
pub mod jid;
pub mod message;
