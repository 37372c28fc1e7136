//! Config file discovery, loading, merging, and environment variable overlay.

use crate::{ConfigError, TunesmithConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// Returns existing paths in load order: system, user, then the CLI path or
/// `./tunesmith.toml`.
pub fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/tunesmith/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("tunesmith/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("tunesmith.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and check it against the config schema.
pub fn load_from_file(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_toml(&contents, path)
}

pub(crate) fn parse_toml(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let table: toml::Table = contents
        .parse()
        .map_err(|e: toml::de::Error| parse_error(e.to_string()))?;

    // a file that is valid TOML but has wrong types should name the file
    toml::Value::Table(table.clone())
        .try_into::<TunesmithConfig>()
        .map_err(|e| parse_error(e.to_string()))?;

    Ok(table)
}

/// Deep-merge `overlay` into `base`: nested tables merge key by key, any
/// other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(config: &mut TunesmithConfig, sources: &mut ConfigSources) {
    apply_overrides(config, sources, |name| env::var(name).ok());
}

/// Apply overrides using `lookup` to read variables.
pub fn apply_overrides(
    config: &mut TunesmithConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = take(&lookup, sources, "OPENAI_API_KEY") {
        config.llm.api_key = Some(v);
    }
    if let Some(v) = take(&lookup, sources, "OPENAI_BASE_URL") {
        config.llm.api_base = v;
    }
    if let Some(v) = take(&lookup, sources, "TUNESMITH_MODEL") {
        config.llm.model = v;
    }
    if let Some(v) = take(&lookup, sources, "TUNESMITH_OUTPUT") {
        config.output.midi_path = expand_path(&v);
    }
    if let Some(seed) = lookup("TUNESMITH_SEED").and_then(|v| v.trim().parse().ok()) {
        config.generation.seed = Some(seed);
        sources.env_overrides.push("TUNESMITH_SEED".to_string());
    }
    if let Some(v) = take(&lookup, sources, "TUNESMITH_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    // RUST_LOG wins over everything else for log filtering
    if let Some(v) = take(&lookup, sources, "RUST_LOG") {
        config.telemetry.log_level = v;
    }
}

/// Non-blank variable value, recorded in `sources` when present.
fn take(
    lookup: &impl Fn(&str) -> Option<String>,
    sources: &mut ConfigSources,
    name: &str,
) -> Option<String> {
    let value = lookup(name).filter(|v| !v.trim().is_empty())?;
    sources.env_overrides.push(name.to_string());
    Some(value)
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        return match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(stripped),
            None => PathBuf::from(path),
        };
    }

    if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        let (var_name, rest) = match stripped.split_once('/') {
            Some((name, rest)) => (name, Some(rest)),
            None => (stripped, None),
        };
        return match (env::var(var_name), rest) {
            (Ok(value), Some(rest)) => PathBuf::from(value).join(rest),
            (Ok(value), None) => PathBuf::from(value),
            (Err(_), _) => PathBuf::from(path),
        };
    }

    PathBuf::from(path)
}
