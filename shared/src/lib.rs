//! Shared types and utilities for Lens
//!
//! This crate contains the record model, the filter/page types, and the HTTP
//! envelopes used across the capture agent, the server, and the viewer CLI.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{page::*, record::*};

/// Errors raised while parsing shared types.
#[derive(Debug, thiserror::Error)]
pub enum SharedError {
    #[error("invalid filter: {0} (expected all, slow or failed)")]
    InvalidFilter(String),

    #[error("invalid time display mode: {0} (expected relative or absolute)")]
    InvalidTimeDisplay(String),
}
