//! Common types and utilities shared across postwatch crates.
//!
//! This crate holds the observability bootstrap and the error type used at the
//! application seams (delivery, configuration, cycle orchestration). It stays
//! dependency-light so every crate in the workspace can pull it in.
//!
//! # Overview
//!
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`PostwatchError`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use postwatch_common::PostwatchError;
//!
//! let err = PostwatchError::Notify("webhook returned 500".into());
//! assert_eq!(err.to_string(), "Notify error: webhook returned 500");
//! ```

pub mod observability;

/// Error types used across the postwatch system.
#[derive(thiserror::Error, Debug)]
pub enum PostwatchError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The feed could not be fetched or parsed for a whole cycle.
    #[error("Feed error: {0}")]
    Feed(String),

    /// A downstream notifier rejected or failed to deliver a post.
    #[error("Notify error: {0}")]
    Notify(String),
}
