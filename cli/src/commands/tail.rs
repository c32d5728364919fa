//! Tail command implementation

use crate::client::LensClient;
use crate::tail::debounce::DEFAULT_DEBOUNCE;
use crate::tail::settings::Settings;
use crate::tail::{self, TailOptions};
use anyhow::{Context, Result};
use clap::Args;
use lens_shared::types::page::{FilterKind, DEFAULT_PER_PAGE};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct TailArgs {
    /// Gateway URL, including any route prefix
    #[arg(short, long, env = "LENS_ENDPOINT", default_value = "http://127.0.0.1:8087")]
    pub endpoint: String,

    /// Initial filter: all, slow or failed
    #[arg(short, long, default_value = "all")]
    pub filter: FilterKind,

    /// Initial search text
    #[arg(short, long, default_value = "")]
    pub search: String,

    /// Records per page
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    pub per_page: u32,

    /// How often to check for new entries (e.g., "2500ms", "5s")
    #[arg(long, default_value = "2500ms")]
    pub poll_interval: String,

    /// Viewer settings file (defaults to the user config directory)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn run(args: TailArgs) -> Result<()> {
    let poll_interval = lens_shared::utils::parse_duration(&args.poll_interval)
        .context("Failed to parse poll interval")?;
    let client = LensClient::new(&args.endpoint).context("Failed to build HTTP client")?;

    let options = TailOptions {
        filter: args.filter,
        search: args.search,
        per_page: args.per_page,
        poll_interval,
        debounce: DEFAULT_DEBOUNCE,
        settings_path: args.settings.or_else(Settings::default_path),
    };

    tail::run(client, options).await
}
