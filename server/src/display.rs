//! Human-readable projection of stored records
//!
//! `interpolate_for_display` substitutes bind values into SQL text for
//! reading only. The output is never executed.

use lens_shared::types::record::{DisplayRecord, Parameters, StoredRecord};
use regex::{NoExpand, Regex};
use serde_json::Value;

const UNSUPPORTED: &str = "'[UNSUPPORTED TYPE]'";

/// Build the viewer projection of a stored record.
pub fn project(stored: StoredRecord) -> DisplayRecord {
    let record = stored.record;
    DisplayRecord {
        id: stored.id,
        batch_id: record.batch_id,
        created_at: stored.created_at,
        error: record.error,
        display_sql: interpolate_for_display(&record.sql, &record.parameters),
        backtrace_display: record.backtrace.iter().map(|f| f.location()).collect(),
        content: record,
    }
}

/// Substitute `parameters` into `sql`.
///
/// Positional values replace `?` placeholders left to right; substituted
/// text is never rescanned. Named values replace every `:name` followed by a
/// word boundary.
pub fn interpolate_for_display(sql: &str, parameters: &Parameters) -> String {
    match parameters {
        Parameters::Positional(values) => interpolate_positional(sql, values),
        Parameters::Named(values) => {
            let mut out = sql.to_string();
            for (key, value) in values {
                let name = key.strip_prefix(':').unwrap_or(key);
                if name.is_empty() {
                    continue;
                }
                let pattern = format!(r":{}\b", regex::escape(name));
                let re = match Regex::new(&pattern) {
                    Ok(re) => re,
                    Err(e) => {
                        tracing::debug!("Skipping parameter {:?}: {}", key, e);
                        continue;
                    }
                };
                let formatted = format_param(value);
                out = re.replace_all(&out, NoExpand(&formatted)).into_owned();
            }
            out
        }
    }
}

fn interpolate_positional(sql: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    for value in values {
        match rest.find('?') {
            Some(pos) => {
                out.push_str(&rest[..pos]);
                out.push_str(&format_param(value));
                rest = &rest[pos + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Render one bind value as SQL-ish text.
pub fn format_param(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(format_param).collect();
            format!("({})", parts.join(", "))
        }
        Value::Object(_) => UNSUPPORTED.to_string(),
    }
}
