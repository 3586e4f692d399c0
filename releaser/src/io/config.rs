//! Releaser configuration stored in `releaser.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "releaser.toml";
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;
/// Overrides `store_dir` when set.
pub const STORE_DIR_ENV: &str = "RELEASER_STORE_DIR";

/// Releaser configuration (TOML).
///
/// Missing fields default to values that work out of the box on a Unix host.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaserConfig {
    /// Root directory of the JSON record store.
    pub store_dir: PathBuf,

    /// Truncate each captured stdout/stderr stream beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,

    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell program for `shell` steps.
    pub program: String,
    /// Arguments placed before the rendered command (e.g. `["-c"]`).
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "bash".to_string(),
            args: vec!["-c".to_string()],
        }
    }
}

impl Default for ReleaserConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".releaser"),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            log_level: "warn".to_string(),
            shell: ShellConfig::default(),
        }
    }
}

impl ReleaserConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.shell.program.trim().is_empty() {
            return Err(anyhow!("shell.program must be non-empty"));
        }
        if self.store_dir.as_os_str().is_empty() {
            return Err(anyhow!("store_dir must be non-empty"));
        }
        Ok(())
    }

    /// Apply `RELEASER_STORE_DIR` if present.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os(STORE_DIR_ENV).filter(|v| !v.is_empty()) {
            self.store_dir = PathBuf::from(dir);
        }
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReleaserConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReleaserConfig> {
    if !path.exists() {
        let cfg = ReleaserConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ReleaserConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
