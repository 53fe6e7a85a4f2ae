//! Client core for the notes backend: coalesced REST calls, a single-flight
//! AI optimizer, and reentrancy guards for UI controls.

pub mod app;
pub mod config;
pub mod error;
pub mod models;
pub mod net;
pub mod services;
pub mod ui;
