//! Configuration management for sluice.
//!
//! Loads configuration from ${SLUICE_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::input::DEFAULT_READ_BUFFER_BYTES;
use crate::core::pipeline::{DEFAULT_UPDATE_CHANNEL_CAPACITY, PipelineOptions};
use crate::core::scanner::{EndOfStreamPolicy, TrailingBackticks, UnterminatedBlocks};

/// Returns the default config template.
///
/// This is embedded from default_config.toml at compile time.
/// To update, run `cargo xtask update-default-config`.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for sluice configuration and log files.
    //!
    //! SLUICE_HOME resolution order:
    //! 1. SLUICE_HOME environment variable (if set)
    //! 2. ~/.config/sluice (default)
    //! 3. ./.sluice when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the sluice home directory.
    pub fn sluice_home() -> PathBuf {
        if let Ok(home) = std::env::var("SLUICE_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".sluice"),
            |h| h.join(".config").join("sluice"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        sluice_home().join("config.toml")
    }
}

/// Stream splitting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// What to do with 1-2 unresolved backticks at end of stream: "flush" or "drop"
    pub trailing_backticks: TrailingBackticks,

    /// What to do with a block still open at end of stream: "seal" or "discard"
    pub unterminated_blocks: UnterminatedBlocks,

    /// Seconds to wait for the next chunk before giving up (0 disables)
    pub idle_timeout_secs: u64,

    /// Read buffer size for byte sources
    pub read_buffer_bytes: usize,

    /// Capacity of the update channel
    pub update_channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            trailing_backticks: TrailingBackticks::default(),
            unterminated_blocks: UnterminatedBlocks::default(),
            idle_timeout_secs: 0,
            read_buffer_bytes: DEFAULT_READ_BUFFER_BYTES,
            update_channel_capacity: DEFAULT_UPDATE_CHANNEL_CAPACITY,
        }
    }
}

impl StreamConfig {
    pub fn policy(&self) -> EndOfStreamPolicy {
        EndOfStreamPolicy {
            trailing_backticks: self.trailing_backticks,
            unterminated_blocks: self.unterminated_blocks,
        }
    }

    /// Returns the idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            idle_timeout: self.idle_timeout(),
            policy: self.policy(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. "warn" or "sluice_core=debug"
    pub level: String,

    /// Optional log file; relative paths resolve against SLUICE_HOME
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Self::DEFAULT_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LogConfig {
    const DEFAULT_LEVEL: &str = "warn";
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub log: LogConfig,
}

impl Config {
    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    ///
    /// # Errors
    /// Returns an error if the file exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Generates a fresh config TOML from Rust defaults.
    ///
    /// Uses the embedded template for structure and comments and merges
    /// values from `Config::default()` into it. `xtask update-default-config`
    /// writes the result back to `default_config.toml`.
    ///
    /// # Errors
    /// Returns an error if serialization or template parsing fails.
    pub fn generate() -> Result<String> {
        use toml_edit::DocumentMut;

        let generated_toml = toml::to_string(&Config::default())
            .context("Failed to serialize default config to TOML")?;

        let mut doc: DocumentMut = default_config_template()
            .parse()
            .context("Failed to parse default config template")?;
        let generated_doc: DocumentMut = generated_toml
            .parse()
            .context("Failed to parse generated config")?;

        merge_items(doc.as_table_mut(), generated_doc.as_table());

        Ok(doc.to_string())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Recursively overlays `source` values onto `target`, keeping comments.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}
