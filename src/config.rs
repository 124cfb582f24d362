/*
 * aurforge - AUR helper with recursive dependency builds.
 * Copyright (C) 2025  aurforge contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Configuration management with validation and defaults.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AurforgeError, AurforgeResult};

/// Main configuration structure for aurforge
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable colored output
    pub color: bool,

    /// Check the local database after each build
    pub validate: bool,

    /// AUR-specific configuration
    pub aur: AurConfig,

    /// libalpm database locations
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            color: true,
            validate: true,
            aur: AurConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// AUR-specific configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AurConfig {
    /// AUR RPC endpoint
    pub rpc_url: String,

    /// Host that `URLPath` download paths are relative to
    pub base_url: String,

    /// Per-request timeout in seconds (0 = none)
    pub request_timeout_secs: u64,

    /// Build directory path
    pub build_dir: PathBuf,

    /// Remove extracted sources once an attempt is finished
    pub clean_build: bool,

    /// Number of parallel make jobs (0 = auto-detect)
    pub make_jobs: usize,

    /// Pass --noconfirm to makepkg
    pub noconfirm: bool,

    /// Longest allowed chain of nested AUR builds
    pub max_depth: usize,
}

impl Default for AurConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://aur.archlinux.org/rpc/".to_string(),
            base_url: "https://aur.archlinux.org".to_string(),
            request_timeout_secs: 30,
            build_dir: default_build_dir(),
            clean_build: false,
            make_jobs: 0, // Auto-detect
            noconfirm: false,
            max_depth: 32,
        }
    }
}

/// libalpm configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Filesystem root
    pub root: String,

    /// pacman database path
    pub dbpath: String,

    /// Sync databases consulted for the official-repository tier
    pub repos: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            dbpath: "/var/lib/pacman".to_string(),
            repos: vec![
                "core".to_string(),
                "extra".to_string(),
                "multilib".to_string(),
            ],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (empty = no file logging)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

/// `$TMPDIR/aurforge-<uid>`, one build tree per user
fn default_build_dir() -> PathBuf {
    let uid = unsafe { libc::geteuid() };
    std::env::temp_dir().join(format!("aurforge-{}", uid))
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. /etc/aurforge/aurforge.toml (system-wide)
    /// 2. ~/.config/aurforge/config.toml (user)
    /// 3. Environment variables (AURFORGE_*)
    pub fn load() -> Self {
        let mut paths = vec![PathBuf::from("/etc/aurforge/aurforge.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("aurforge").join("config.toml"));
        }

        Self::load_layers(&paths).apply_env_overrides()
    }

    /// Overlay the files key by key, later files winning, then fill
    /// whatever none of them set from the defaults
    fn load_layers(paths: &[PathBuf]) -> Self {
        let mut merged = toml::Table::new();
        for path in paths {
            if let Some(table) = Self::read_file(path) {
                merge_tables(&mut merged, table);
            }
        }

        match toml::Value::Table(merged).try_into::<Config>() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("ignoring configuration files: {}", e);
                Config::default()
            }
        }
    }

    /// The file's raw table, if it exists and describes a valid config
    fn read_file(path: &Path) -> Option<toml::Table> {
        if !path.exists() {
            return None;
        }
        let content = fs::read_to_string(path).ok()?;
        let checked = content
            .parse::<toml::Table>()
            .map_err(|e| e.to_string())
            .and_then(|table| {
                toml::Value::Table(table.clone())
                    .try_into::<Config>()
                    .map(|_| table)
                    .map_err(|e| e.to_string())
            });
        match checked {
            Ok(table) => Some(table),
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("AURFORGE_COLOR") {
            self.color = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("AURFORGE_VALIDATE") {
            self.validate = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("AURFORGE_BUILD_DIR") {
            self.aur.build_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("AURFORGE_RPC_URL") {
            self.aur.rpc_url = val;
        }

        if let Ok(val) = std::env::var("AURFORGE_LOG_LEVEL") {
            self.logging.level = val;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> AurforgeResult<()> {
        if self.aur.max_depth == 0 {
            return Err(config_error("aur.max_depth must be at least 1"));
        }
        if !self.aur.rpc_url.starts_with("http://") && !self.aur.rpc_url.starts_with("https://") {
            return Err(config_error("aur.rpc_url must be an http(s) URL"));
        }
        if !self.aur.base_url.starts_with("http://") && !self.aur.base_url.starts_with("https://") {
            return Err(config_error("aur.base_url must be an http(s) URL"));
        }
        if self.aur.build_dir.as_os_str().is_empty() {
            return Err(config_error("aur.build_dir must not be empty"));
        }
        Ok(())
    }

    /// Get the number of make jobs, auto-detecting if set to 0
    pub fn get_make_jobs(&self) -> usize {
        if self.aur.make_jobs == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.aur.make_jobs
        }
    }
}

/// Recursively copy `overlay` into `base`; nested tables merge, any other
/// value replaces what was there
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(inner) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, inner),
                _ => {
                    base.insert(key, toml::Value::Table(inner));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

fn config_error(message: &str) -> AurforgeError {
    AurforgeError::ConfigError {
        message: message.to_string(),
    }
}
