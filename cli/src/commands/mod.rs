//! Subcommand implementations

pub mod clear;
pub mod seed;
pub mod tail;
