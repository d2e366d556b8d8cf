use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("identity resolution failed: {0}")]
    Identity(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("message delivery failed: {0}")]
    Delivery(String),
}

impl ChannelError {
    /// Fatal errors abort `connect`; everything else is reported per call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Identity(_))
    }

    pub fn class(&self) -> &'static str {
        match self {
            Self::Identity(_) => "identity",
            Self::Transport(_) => "transport",
            Self::Delivery(_) => "delivery",
        }
    }
}

/// Outcome of an operation whose failure is logged and ignored.
///
/// Keeps "this did not happen, and that is fine" distinct from a
/// `ChannelError` the caller has to act on.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum BestEffort<T> {
    Done(T),
    Skipped { reason: String },
}

impl<T> BestEffort<T> {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped { reason: reason.into() }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Skipped { .. } => None,
        }
    }

    pub fn unwrap_or(self, fallback: T) -> T {
        self.into_option().unwrap_or(fallback)
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for BestEffort<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Done(value),
            Err(error) => Self::skipped(error.to_string()),
        }
    }
}
