//! Configuration sections and their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Chat-completion backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    /// Default: https://api.openai.com/v1
    #[serde(default = "LlmConfig::default_api_base")]
    pub api_base: String,

    /// Usually supplied through `OPENAI_API_KEY` rather than a file.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "LlmConfig::default_model")]
    pub model: String,

    /// HTTP timeout per request.
    #[serde(default = "LlmConfig::default_timeout_secs")]
    pub timeout_secs: u64,

    /// Completion budget for notation requests.
    #[serde(default = "LlmConfig::default_notation_max_tokens")]
    pub notation_max_tokens: u32,
}

impl LlmConfig {
    fn default_api_base() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_timeout_secs() -> u64 {
        120
    }

    fn default_notation_max_tokens() -> u32 {
        1000
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: Self::default_api_base(),
            api_key: None,
            model: Self::default_model(),
            timeout_secs: Self::default_timeout_secs(),
            notation_max_tokens: Self::default_notation_max_tokens(),
        }
    }
}

/// Where and how the MIDI file is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_midi_path")]
    pub midi_path: PathBuf,

    #[serde(default = "OutputConfig::default_ticks_per_quarter")]
    pub ticks_per_quarter: u16,
}

impl OutputConfig {
    fn default_midi_path() -> PathBuf {
        PathBuf::from("generated_song.mid")
    }

    fn default_ticks_per_quarter() -> u16 {
        480
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            midi_path: Self::default_midi_path(),
            ticks_per_quarter: Self::default_ticks_per_quarter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Fixed RNG seed for reproducible arrangement; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Apply timing jitter to note starts.
    #[serde(default = "GenerationConfig::default_humanize")]
    pub humanize: bool,
}

impl GenerationConfig {
    fn default_humanize() -> bool {
        true
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            humanize: Self::default_humanize(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// EnvFilter directive (trace, debug, info, warn, error, or per-target).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
