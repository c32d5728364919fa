//! Seed command implementation
//!
//! Runs a small demo workload against an in-memory SQLite database with the
//! capture agent attached, so a fresh store has something to tail.

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use lens_agent::{connection_info, CaptureAgent, CaptureAgentFactory, CaptureConfig, RequestContext, QueryTarget};
use lens_server::config::LensConfig;
use lens_server::storage::{QueryStore, StorageBackend};
use lens_shared::types::record::{ConnectionInfo, Parameters};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ToSql};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const DEMO_USERS: i64 = 10;

#[derive(Args, Debug, Clone)]
pub struct SeedArgs {
    /// TOML configuration file (same as the gateway's)
    #[arg(short, long, env = "LENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of simulated requests
    #[arg(short = 'n', long, default_value = "25")]
    pub count: u64,

    /// Rows generated by the deliberately slow query
    #[arg(long, default_value = "2000000")]
    pub slow_rows: i64,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn run(args: SeedArgs) -> Result<()> {
    tokio::task::spawn_blocking(move || seed(&args))
        .await
        .context("Seed task panicked")?
}

fn seed(args: &SeedArgs) -> Result<()> {
    let config = LensConfig::load(args.config.as_deref())?;
    let store = StorageBackend::open(&config.storage).context("Failed to open query store")?;
    let location = store.location_name().to_string();
    let factory = CaptureAgentFactory::new(Arc::new(store), CaptureConfig::default());

    let app = DemoApp::open().context("Failed to create demo database")?;

    let progress = ProgressBar::new(args.count);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut captured = 0;
    for i in 0..args.count {
        let user_id = (i as i64 % DEMO_USERS) + 1;
        let agent = factory.begin(RequestContext::new("GET", format!("/demo/users/{}", user_id)));
        progress.set_message(format!("request {}", i + 1));

        app.show_user(&agent, user_id);
        if i % 3 == 0 {
            app.rename_user(&agent, user_id, &format!("user-{}-{}", user_id, i));
        }
        if i % 5 == 4 {
            app.report(&agent, args.slow_rows);
        }
        if i % 7 == 6 {
            app.register_duplicate(&agent, user_id);
        }

        captured += agent.end_unit();
        progress.inc(1);
    }
    progress.finish_and_clear();

    output::success(&format!(
        "Captured {} queries from {} requests into {}",
        captured, args.count, location
    ));
    Ok(())
}

/// A stand-in application whose data access goes through the agent.
struct DemoApp {
    conn: Connection,
    connection: ConnectionInfo,
}

impl DemoApp {
    fn open() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE
            );",
        )?;
        for id in 1..=DEMO_USERS {
            conn.execute(
                "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3)",
                (id, format!("user-{}", id), format!("user{}@example.com", id)),
            )?;
        }

        let params = HashMap::from([("database".to_string(), ":memory:".to_string())]);
        Ok(Self {
            conn,
            connection: connection_info(Some("sqlite"), &params),
        })
    }

    fn show_user(&self, agent: &CaptureAgent, id: i64) {
        self.run(
            agent,
            "SELECT id, name, email FROM users WHERE id = ?",
            Parameters::Positional(vec![json!(id)]),
        );
    }

    fn rename_user(&self, agent: &CaptureAgent, id: i64, name: &str) {
        let mut values = Map::new();
        values.insert("name".to_string(), json!(name));
        values.insert("id".to_string(), json!(id));
        self.run(
            agent,
            "UPDATE users SET name = :name WHERE id = :id",
            Parameters::Named(values),
        );
    }

    fn report(&self, agent: &CaptureAgent, rows: i64) {
        self.run(
            agent,
            "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < ?) \
             SELECT count(*), sum(x) FROM n",
            Parameters::Positional(vec![json!(rows)]),
        );
    }

    /// Always violates the primary key.
    fn register_duplicate(&self, agent: &CaptureAgent, id: i64) {
        self.run(
            agent,
            "INSERT INTO users (id, name, email) VALUES (?, ?, ?)",
            Parameters::Positional(vec![
                json!(id),
                json!("duplicate"),
                json!(format!("dup{}@example.com", id)),
            ]),
        );
    }

    /// Execute a statement, reporting the outcome to the agent. Statement
    /// errors are part of the demo and are not propagated.
    fn run(&self, agent: &CaptureAgent, sql: &str, parameters: Parameters) {
        let handle = agent.start(
            QueryTarget::new(sql)
                .with_parameters(parameters.clone())
                .on_connection(self.connection.clone()),
        );

        let outcome = self.execute(sql, &parameters);

        let Some(handle) = handle else {
            return;
        };
        let reported = match &outcome {
            Ok(rows) => {
                debug!("{} row(s) from {}", rows, sql);
                agent.finish(handle)
            }
            Err(e) => agent.fail(handle, e.to_string()),
        };
        if let Err(e) = reported {
            debug!("Capture bookkeeping failed: {}", e);
        }
    }

    fn execute(&self, sql: &str, parameters: &Parameters) -> rusqlite::Result<usize> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = match parameters {
            Parameters::Positional(values) => {
                let values: Vec<SqlValue> = values.iter().map(to_sql_value).collect();
                stmt.query(rusqlite::params_from_iter(values))?
            }
            Parameters::Named(values) => {
                let bound: Vec<(String, SqlValue)> = values
                    .iter()
                    .map(|(name, value)| (format!(":{}", name.trim_start_matches(':')), to_sql_value(value)))
                    .collect();
                let refs: Vec<(&str, &dyn ToSql)> = bound
                    .iter()
                    .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
                    .collect();
                stmt.query(refs.as_slice())?
            }
        };

        let mut count = 0;
        while rows.next()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
