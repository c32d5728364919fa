//! Query record definitions
//!
//! A [`QueryRecord`] is what the capture agent assembles for one executed
//! statement. Once the storage engine persists it, it becomes a
//! [`StoredRecord`] carrying the store-assigned id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Statements slower than this many seconds count as slow.
pub const SLOW_QUERY_THRESHOLD_SECS: f64 = 0.1;

/// Store-assigned record identifier
pub type RecordId = u64;

/// Bind values attached to a statement.
///
/// Positional parameters serialize as a JSON array, named ones as an object
/// whose key order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameters {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        match self {
            Parameters::Positional(values) => values.is_empty(),
            Parameters::Named(values) => values.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Parameters::Positional(values) => values.len(),
            Parameters::Named(values) => values.len(),
        }
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::Positional(Vec::new())
    }
}

/// One frame of a filtered call-site backtrace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktraceFrame {
    pub file: String,
    pub line: u32,
    pub function: String,

    /// Enclosing module/type path, when the symbol has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl BacktraceFrame {
    /// `file:line` form used in compact backtrace views
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

/// Which database a statement ran against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub driver: Option<String>,
    pub database: Option<String>,
}

/// A captured query, as produced by the capture agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub batch_id: Uuid,
    pub sql: String,
    #[serde(default)]
    pub parameters: Parameters,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
    #[serde(default)]
    pub backtrace: Vec<BacktraceFrame>,
    #[serde(default)]
    pub connection: ConnectionInfo,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl QueryRecord {
    pub fn is_slow(&self) -> bool {
        self.duration_seconds > SLOW_QUERY_THRESHOLD_SECS
    }

    /// Normalized textual projection that `search` filters match against.
    pub fn search_text(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_default()
            .to_lowercase()
    }
}

/// A record after the storage engine has accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: QueryRecord,
}

/// Read-only projection handed to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    pub id: RecordId,
    pub batch_id: Uuid,
    pub content: QueryRecord,
    pub created_at: DateTime<Utc>,
    pub error: bool,

    /// Parameters interpolated into the SQL text. Never executable.
    pub display_sql: String,

    /// Every backtrace frame as `file:line`, outermost first
    #[serde(default)]
    pub backtrace_display: Vec<String>,
}

impl DisplayRecord {
    /// First `limit` backtrace lines plus the number of lines left out.
    pub fn backtrace_preview(&self, limit: usize) -> (&[String], usize) {
        let shown = limit.min(self.backtrace_display.len());
        (
            &self.backtrace_display[..shown],
            self.backtrace_display.len() - shown,
        )
    }
}
