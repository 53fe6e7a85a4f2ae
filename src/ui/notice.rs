//! User-facing notices and the policy mapping failures onto them.

use std::fmt;

use tracing::{error, info};

use crate::services::ai::AiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Soft inline message; nothing went wrong.
    Info(String),
    Success(String),
    /// Blocking error notification.
    Error(String),
}

impl Notice {
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Info(m) | Self::Success(m) | Self::Error(m) => m,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Where notices go: a toast area, a status bar, a terminal.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notifier that writes to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::Error(m) => error!(text = %m, "notice"),
            Notice::Info(m) | Notice::Success(m) => info!(text = %m, "notice"),
        }
    }
}

/// Notice for a failed AI call. `Cancelled` is a de-duplication artifact
/// and maps to nothing.
#[must_use]
pub fn ai_failure_notice(err: &AiError) -> Option<Notice> {
    match err {
        AiError::Cancelled => None,
        AiError::Busy => Some(Notice::Info(err.to_string())),
        other => Some(Notice::Error(other.to_string())),
    }
}

/// Notice for any other failure.
#[must_use]
pub fn failure_notice(err: &impl fmt::Display) -> Notice {
    Notice::Error(err.to_string())
}

#[cfg(test)]
#[path = "notice_test.rs"]
mod tests;
