//! Helpers shared by the demo binaries.

use std::path::Path;

use anyhow::{Context, Result};
use shade_core::config::Config;
use tracing::debug;

pub fn sep(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("  {title}");
    println!("{}\n", "=".repeat(60));
}

/// `RUST_LOG` wins; otherwise the library logs at info.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shade_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Load a TOML config from the first CLI argument, or fall back to
/// `defaults` when no path is given.
pub fn load_config(defaults: Config) -> Result<Config> {
    let Some(arg) = std::env::args().nth(1) else {
        return Ok(defaults);
    };
    let path = Path::new(&arg);
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config at {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}
