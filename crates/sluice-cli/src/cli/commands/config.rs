//! `sluice config` handlers.

use anyhow::{Context, Result};
use sluice_core::config::{Config, paths};

pub fn path() {
    println!("{}", paths::config_path().display());
}

pub fn init() -> Result<()> {
    let path = paths::config_path();
    Config::init(&path).with_context(|| format!("init config at {}", path.display()))?;
    println!("Created config at {}", path.display());
    Ok(())
}

/// Prints the template with Rust defaults merged in (used by xtask).
pub fn generate() -> Result<()> {
    print!("{}", Config::generate()?);
    Ok(())
}

/// Prints the effective configuration after defaults are applied.
pub fn show(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("serialize config")?;
    print!("{rendered}");
    Ok(())
}
