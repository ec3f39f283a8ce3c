//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use edge_cache::EdgeCacheConfig;

use crate::config::find_config;
use crate::output::Output;

/// Execution context for CLI commands.
pub struct Context {
    /// Loaded configuration, or defaults when no file was found.
    pub config: EdgeCacheConfig,
    /// File the configuration came from.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Context {
    /// Load context from an explicit config path or the nearest config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let config_path = match config_path {
            Some(path) => Some(resolve(&cwd, path)),
            None => find_config(&cwd),
        };

        let config = match &config_path {
            Some(path) => {
                output.debug(&format!("Using config: {}", path.display()));
                EdgeCacheConfig::read(path)
                    .with_context(|| format!("Failed to load config: {}", path.display()))?
            }
            None => {
                output.debug("No config file found, using defaults");
                EdgeCacheConfig::default()
            }
        };

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve(&self.cwd, path)
    }
}

fn resolve(cwd: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}
