use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat the bus has opted into. Channels only test membership; the
/// contents belong to the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredGroup {
    pub name: String,
    pub added_at: DateTime<Utc>,
}

impl RegisteredGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), added_at: Utc::now() }
    }
}
