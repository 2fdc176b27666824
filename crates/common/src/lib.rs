//! Corellium Common Library
//!
//! REST client, payload types and the small helpers resources share:
//! collection reconciliation and state polling.

pub mod client;
pub mod config;
pub mod error;
pub mod poll;
pub mod reconcile;
pub mod types;

// Re-export commonly used types
pub use client::CorelliumClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use poll::{StateWaiter, POLL_INTERVAL};
pub use reconcile::{diff_by_key, reconcile_by_key, Changes};
pub use types::*;
