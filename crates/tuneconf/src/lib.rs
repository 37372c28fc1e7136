//! Layered configuration for Tunesmith.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tuneconf::TunesmithConfig;
//!
//! let (config, sources) = TunesmithConfig::load_with_sources(None).expect("config");
//! println!("model: {}", config.llm.model);
//! println!("files: {:?}", sources.files);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, tables merge key by key):
//! 1. `/etc/tunesmith/config.toml` (system)
//! 2. `~/.config/tunesmith/config.toml` (user)
//! 3. `./tunesmith.toml`, or the path given with `--config`
//! 4. Environment variables (`OPENAI_API_KEY`, `OPENAI_BASE_URL`, `TUNESMITH_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [llm]
//! api_base = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//! timeout_secs = 120
//! notation_max_tokens = 1000
//!
//! [output]
//! midi_path = "~/music/generated_song.mid"
//! ticks_per_quarter = 480
//!
//! [generation]
//! seed = 7
//! humanize = true
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{apply_env_overrides, discover_config_files, expand_path, ConfigSources};
pub use sections::{GenerationConfig, LlmConfig, OutputConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid merged configuration: {0}")]
    Invalid(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Complete Tunesmith configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TunesmithConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl TunesmithConfig {
    /// Load from all sources, discarding source information.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables were applied.
    ///
    /// If `config_path` is provided it replaces `./tunesmith.toml`; system and
    /// user files still load first.
    pub fn load_with_sources(config_path: Option<&Path>) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files(config_path);
        let (mut config, mut sources) = Self::from_files(&files)?;
        loader::apply_env_overrides(&mut config, &mut sources);
        Ok((config, sources))
    }

    /// Merge the given files in order, without consulting the environment.
    pub fn from_files(files: &[PathBuf]) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            let table = loader::load_from_file(path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        let mut config: TunesmithConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid(e.to_string()))?;
        config.output.midi_path = expand_path(&config.output.midi_path.to_string_lossy());
        Ok((config, sources))
    }

    /// Effective configuration as TOML, with the API key masked.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.llm.api_key.is_some() {
            shown.llm.api_key = Some("<redacted>".to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}
