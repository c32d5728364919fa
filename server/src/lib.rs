//! Lens storage engine and query gateway
//!
//! Captured queries are persisted through a [`storage::StorageBackend`] and
//! served to viewers by [`gateway::QueryGateway`] over HTTP.

pub mod audit;
pub mod config;
pub mod display;
pub mod gateway;
pub mod metrics;
#[cfg(feature = "gateway")]
pub mod server;
pub mod storage;
