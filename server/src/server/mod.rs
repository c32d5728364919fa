pub mod api;
pub mod http;

pub use api::{handle_api, ApiState};
pub use http::serve;
