//! Global context for Berth operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::config::{load_config, Config};

/// Environment variable overriding the global Berth directory.
pub const BERTH_HOME_ENV: &str = "BERTH_HOME";

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global Berth data (~/.berth/)
    home: PathBuf,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        let home = match std::env::var_os(BERTH_HOME_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => directories::BaseDirs::new()
                .map(|b| b.home_dir().join(".berth"))
                .unwrap_or_else(|| PathBuf::from(".berth")),
        };

        Ok(GlobalContext {
            cwd,
            home,
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    /// Use `home` instead of `~/.berth`.
    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = home;
        self
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the Berth home directory (~/.berth/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Nearest `.berth` directory at or above the working directory.
    pub fn find_project_dir(&self) -> Option<PathBuf> {
        self.cwd
            .ancestors()
            .map(|dir| dir.join(".berth"))
            .find(|dir| dir.is_dir() && dir != &self.home)
    }

    /// Get the project configuration file path (.berth/config.toml).
    pub fn project_config_path(&self) -> PathBuf {
        self.find_project_dir()
            .unwrap_or_else(|| self.cwd.join(".berth"))
            .join("config.toml")
    }

    /// Merged global and project configuration.
    pub fn load_config(&self) -> Config {
        load_config(&self.config_path(), &self.project_config_path())
    }

    /// Resolve `path` against the working directory.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}
