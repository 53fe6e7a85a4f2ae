//! Shared error classification.

/// Stable machine-readable code plus a retry hint, implemented by every
/// error type that reaches a caller outside its own module.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
