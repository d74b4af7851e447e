use std::process::exit;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use reqwest::blocking::Client;
use reqwest::Url;

/// Probes a transcript_relay deployment and exits nonzero when it is down.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL to probe
    #[arg(default_value = "http://localhost:8080/healthz")]
    url: Url,

    /// Seconds to wait before the probe counts as failed
    #[arg(short, long, default_value = "5")]
    timeout: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let client = Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;
    let response = client.get(args.url).send()?;
    if !response.status().is_success() {
        eprintln!("Probe failed with status {}", response.status());
        exit(1);
    }
    Ok(())
}
