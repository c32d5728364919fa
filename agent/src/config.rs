//! Configuration types for the capture agent

use serde::{Deserialize, Serialize};

/// Symbol namespaces whose frames never appear in captured backtraces.
pub const DEFAULT_IGNORED_PREFIXES: &[&str] = &[
    "lens_agent::",
    "lens_server::",
    "std::",
    "core::",
    "alloc::",
    "backtrace::",
    "tokio::",
    "hyper::",
    "rusqlite::",
];

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Master switch; when false `start` captures nothing
    pub enabled: bool,

    /// Frames whose symbol path starts with one of these are dropped
    pub ignored_prefixes: Vec<String>,

    /// Report the enclosing function's declaration line instead of the
    /// call-site line when debug info allows it
    pub prefer_declaration_site: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let enabled = std::env::var("LENS_CAPTURE_ENABLED")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "off" | "no"))
            .unwrap_or(true);

        let mut ignored_prefixes: Vec<String> = DEFAULT_IGNORED_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect();
        if let Ok(extra) = std::env::var("LENS_CAPTURE_IGNORE") {
            ignored_prefixes.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        }

        Self {
            enabled,
            ignored_prefixes,
            prefer_declaration_site: true,
        }
    }
}

impl CaptureConfig {
    /// Add namespaces to the ignore list.
    pub fn ignore(mut self, prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ignored_prefixes.extend(prefixes.into_iter().map(Into::into));
        self
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
