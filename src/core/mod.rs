//! # Core Module
//!
//! Configuration and shared reply utilities.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

pub mod config;
pub mod response;

pub use config::Config;
pub use response::{fenced_output, split_reply, truncate, MESSAGE_LIMIT};
