//! Ambient context attached to captured queries

use lens_shared::types::record::ConnectionInfo;
use std::collections::HashMap;

/// Build connection info from a driver name and connection parameters.
/// The database name comes from `database`, else `dbname`.
pub fn connection_info(driver: Option<&str>, params: &HashMap<String, String>) -> ConnectionInfo {
    ConnectionInfo {
        driver: driver.map(str::to_string),
        database: params
            .get("database")
            .or_else(|| params.get("dbname"))
            .cloned(),
    }
}

/// The incoming request a unit of work is serving, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub method: Option<String>,
    pub uri: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            uri: Some(uri.into()),
        }
    }

    /// `"METHOD URI"`, or the URI alone. None without a URI.
    pub fn describe(&self) -> Option<String> {
        let uri = self.uri.as_deref()?;
        Some(match self.method.as_deref() {
            Some(method) => format!("{} {}", method.to_uppercase(), uri),
            None => uri.to_string(),
        })
    }
}

/// Host name reported by the OS.
pub fn hostname() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}
