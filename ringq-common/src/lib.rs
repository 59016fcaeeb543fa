//! # ringq Common Library
//!
//! Shared code for the ringq migration tooling:
//! - Error type
//! - Bootstrap configuration loading and value resolution
//! - Relay event types and the broadcast EventBus
//! - SSE helpers for re-broadcasting events to a UI
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
