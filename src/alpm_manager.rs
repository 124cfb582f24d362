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

//! Local and sync database queries through libalpm.

use alpm::{Alpm, LogLevel, SigLevel};
use std::cmp::Ordering;

use crate::config::DatabaseConfig;
use crate::error::{AurforgeError, AurforgeResult};

/// Exact-name queries against the pacman databases
pub trait PackageDatabase {
    /// Installed version of `name`, if installed
    fn installed_version(&self, name: &str) -> AurforgeResult<Option<String>>;

    /// Name of the first sync repository carrying `name`
    fn sync_repo(&self, name: &str) -> AurforgeResult<Option<String>>;

    /// Installed packages that no sync repository carries, with versions
    fn foreign_packages(&self) -> AurforgeResult<Vec<(String, String)>>;
}

/// libalpm-backed database access.
///
/// A fresh handle is opened for every query: makepkg installs packages
/// behind our back, and a long-lived handle would keep serving its cached
/// view of the local database.
pub struct AlpmManager {
    root: String,
    dbpath: String,
    repos: Vec<String>,
}

impl AlpmManager {
    pub fn new(config: &DatabaseConfig) -> AurforgeResult<Self> {
        let manager = Self {
            root: config.root.clone(),
            dbpath: config.dbpath.clone(),
            repos: config.repos.clone(),
        };
        // Fail early on a broken dbpath instead of on the first dependency
        manager.open()?;
        Ok(manager)
    }

    fn open(&self) -> AurforgeResult<Alpm> {
        let mut handle = Alpm::new(self.root.as_str(), self.dbpath.as_str())
            .map_err(|e| AurforgeError::database("failed to initialize libalpm", e))?;

        handle.set_log_cb((), |level, msg, _| match level {
            LogLevel::ERROR => tracing::error!("alpm: {}", msg.trim_end()),
            LogLevel::WARNING => tracing::warn!("alpm: {}", msg.trim_end()),
            _ => {}
        });

        for repo in &self.repos {
            handle
                .register_syncdb_mut(repo.as_str(), SigLevel::DATABASE_OPTIONAL)
                .map_err(|e| AurforgeError::database(format!("failed to register {}", repo), e))?;
        }

        Ok(handle)
    }
}

impl PackageDatabase for AlpmManager {
    fn installed_version(&self, name: &str) -> AurforgeResult<Option<String>> {
        let handle = self.open()?;
        let version = handle
            .localdb()
            .pkg(name)
            .ok()
            .map(|pkg| pkg.version().as_str().to_string());
        Ok(version)
    }

    fn sync_repo(&self, name: &str) -> AurforgeResult<Option<String>> {
        let handle = self.open()?;
        for db in handle.syncdbs() {
            if db.pkg(name).is_ok() {
                return Ok(Some(db.name().to_string()));
            }
        }
        Ok(None)
    }

    fn foreign_packages(&self) -> AurforgeResult<Vec<(String, String)>> {
        let handle = self.open()?;
        let mut foreign = Vec::new();
        for pkg in handle.localdb().pkgs() {
            let in_sync = handle.syncdbs().iter().any(|db| db.pkg(pkg.name()).is_ok());
            if !in_sync {
                foreign.push((pkg.name().to_string(), pkg.version().as_str().to_string()));
            }
        }
        Ok(foreign)
    }
}

/// pacman's version ordering
pub fn vercmp(a: &str, b: &str) -> Ordering {
    alpm::vercmp(a, b)
}
