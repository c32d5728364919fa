//! Clear command implementation

use crate::client::LensClient;
use crate::output;
use crate::retry::retry_with_backoff;
use anyhow::{Context, Result};
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Gateway URL, including any route prefix
    #[arg(short, long, env = "LENS_ENDPOINT", default_value = "http://127.0.0.1:8087")]
    pub endpoint: String,

    /// Attempts before giving up on an unavailable gateway
    #[arg(long, default_value = "3")]
    pub attempts: u32,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn run(args: ClearArgs) -> Result<()> {
    let client = LensClient::new(&args.endpoint).context("Failed to build HTTP client")?;

    let response = retry_with_backoff("clear", args.attempts, Duration::from_millis(500), || {
        client.clear()
    })
    .await
    .context("Failed to clear queries")?;

    output::success(&response.message);
    Ok(())
}
