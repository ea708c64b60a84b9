mod config;
mod error;
mod stack;

use std::fs;
use std::process;

use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::error::Result;

fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries the template.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        tracing::error!(error = %e, "synthesis failed");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = AppConfig::from_env()?;
    let overrides = config.overrides()?;

    let template = stack::build(&config, overrides)?;
    let json = template.to_json_pretty()?;

    match &config.output {
        Some(path) => {
            fs::write(path, format!("{json}\n"))?;
            tracing::info!(path = %path.display(), "template written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
