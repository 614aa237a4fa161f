use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Interpreter limits and host defaults. Every field may be omitted from the
/// TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub max_loop_iterations: usize,
    pub max_call_depth: usize,
    pub default_timeout_ms: u64,
    pub input_timeout_ms: Option<u64>,
    pub event_history: usize,
    pub yield_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 10_000,
            max_call_depth: 200,
            default_timeout_ms: 30_000,
            input_timeout_ms: None,
            event_history: 256,
            yield_interval: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Parse engine config")
    }

    /// Load `path`. A missing file yields defaults only when `optional`.
    pub fn load(path: &Path, optional: bool) -> Result<Self> {
        if optional && !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    // ~/.susa/config.toml
    dirs_next::home_dir().map(|h| h.join(".susa").join("config.toml"))
}

pub fn resolve_config_path(cli_path: &Option<PathBuf>) -> Option<PathBuf> {
    if let Some(p) = cli_path {
        return Some(p.clone());
    }
    default_config_path()
}

/// An explicit `--config` must exist; the default location may be absent.
pub fn load_config(cli_path: &Option<PathBuf>) -> Result<EngineConfig> {
    match resolve_config_path(cli_path) {
        Some(path) => EngineConfig::load(&path, cli_path.is_none()),
        None => Ok(EngineConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = EngineConfig::from_toml("max_loop_iterations = 50\n").unwrap();
        assert_eq!(cfg.max_loop_iterations, 50);
        assert_eq!(cfg.max_call_depth, 200);
        assert_eq!(cfg.event_history, 256);
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(EngineConfig::from_toml("max_loops = 5\n").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Some(dir.path().join("nope.toml"));
        assert!(load_config(&missing).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_timeout_ms = 1500\ninput_timeout_ms = 200").unwrap();
        let cfg = load_config(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.default_timeout_ms, 1500);
        assert_eq!(cfg.input_timeout_ms, Some(200));
    }
}
