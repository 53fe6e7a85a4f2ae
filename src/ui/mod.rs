//! UI-facing plumbing: reentrancy guards for controls and user notices.

pub mod guard;
pub mod notice;
