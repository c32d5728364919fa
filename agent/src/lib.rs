//! Lens capture agent
//!
//! Embedded in an application's database layer: wrap each statement in
//! `start`/`finish`, then `flush` (or drop the agent) at the end of the unit
//! of work.

pub mod collector;
pub mod config;

pub use collector::context::{connection_info, RequestContext};
pub use collector::query::{
    CaptureAgent, CaptureAgentFactory, CaptureError, FlushStatus, QueryHandle, QueryTarget,
};
pub use config::CaptureConfig;
