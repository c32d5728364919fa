//! Query capture
//!
//! `query` owns the per-unit agent, `stack` resolves call-sites and
//! `context` gathers host, request and connection details.

pub mod context;
pub mod query;
pub mod stack;
