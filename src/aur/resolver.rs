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

//! Dependency classification against installed, repo and AUR tiers.
//!
//! Tiers are asked in a fixed order and the first one that has a package
//! wins, so an installed package never costs a sync-db or RPC lookup.

use async_trait::async_trait;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

use super::client::MetadataService;
use super::pkgbuild::DependencySpec;
use crate::alpm_manager::PackageDatabase;
use crate::error::{AurforgeError, AurforgeResult};

/// Where a dependency can be satisfied from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageSource {
    /// Package is installed locally
    Installed,
    /// Package is in an official repository
    OfficialRepo,
    /// Package is only in the AUR and needs a nested build
    RemoteOnly,
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageSource::Installed => write!(f, "system"),
            PackageSource::OfficialRepo => write!(f, "repos"),
            PackageSource::RemoteOnly => write!(f, "the AUR"),
        }
    }
}

/// One source of packages in the classification chain
#[async_trait(?Send)]
pub trait Tier {
    fn source(&self) -> PackageSource;

    async fn has(&self, name: &str) -> AurforgeResult<bool>;
}

/// Packages present in the local database
pub struct InstalledTier {
    db: Rc<dyn PackageDatabase>,
}

impl InstalledTier {
    pub fn new(db: Rc<dyn PackageDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait(?Send)]
impl Tier for InstalledTier {
    fn source(&self) -> PackageSource {
        PackageSource::Installed
    }

    async fn has(&self, name: &str) -> AurforgeResult<bool> {
        Ok(self.db.installed_version(name)?.is_some())
    }
}

/// Packages available from a registered sync database
pub struct RepoTier {
    db: Rc<dyn PackageDatabase>,
}

impl RepoTier {
    pub fn new(db: Rc<dyn PackageDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait(?Send)]
impl Tier for RepoTier {
    fn source(&self) -> PackageSource {
        PackageSource::OfficialRepo
    }

    async fn has(&self, name: &str) -> AurforgeResult<bool> {
        Ok(self.db.sync_repo(name)?.is_some())
    }
}

/// Packages known to the AUR RPC
pub struct AurTier {
    client: Rc<dyn MetadataService>,
}

impl AurTier {
    pub fn new(client: Rc<dyn MetadataService>) -> Self {
        Self { client }
    }
}

#[async_trait(?Send)]
impl Tier for AurTier {
    fn source(&self) -> PackageSource {
        PackageSource::RemoteOnly
    }

    async fn has(&self, name: &str) -> AurforgeResult<bool> {
        Ok(self.client.info(name).await?.is_some())
    }
}

/// Bare dependency names with their tier, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    entries: Vec<(String, PackageSource)>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<PackageSource> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, source)| *source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PackageSource)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), *s))
    }

    /// Dependencies that need a nested AUR build
    pub fn remote_only(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, source)| *source == PackageSource::RemoteOnly)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn insert(&mut self, name: &str, source: PackageSource) {
        if self.get(name).is_none() {
            self.entries.push((name.to_string(), source));
        }
    }
}

/// Ordered chain of tiers
pub struct DependencyClassifier {
    tiers: Vec<Box<dyn Tier>>,
}

impl DependencyClassifier {
    pub fn new(tiers: Vec<Box<dyn Tier>>) -> Self {
        Self { tiers }
    }

    /// The standard installed, repos, AUR chain
    pub fn standard(db: Rc<dyn PackageDatabase>, client: Rc<dyn MetadataService>) -> Self {
        Self::new(vec![
            Box::new(InstalledTier::new(Rc::clone(&db))),
            Box::new(RepoTier::new(db)),
            Box::new(AurTier::new(client)),
        ])
    }

    /// Classify every dependency; any unresolvable name fails the whole call
    pub async fn classify(&self, specs: &[DependencySpec]) -> AurforgeResult<Classification> {
        let mut classification = Classification::default();
        if specs.is_empty() {
            return Ok(classification);
        }

        for spec in specs {
            let name = spec.name();
            if name.is_empty() {
                return Err(AurforgeError::DependencyNotFound {
                    dependency: spec.raw().to_string(),
                });
            }
            if classification.get(name).is_some() {
                continue;
            }

            let source = self.lookup(name).await?;
            debug!(
                "{} ({}) resolved to {:?}",
                name,
                spec.constraint().unwrap_or("any version"),
                source
            );
            classification.insert(name, source);
        }

        Ok(classification)
    }

    async fn lookup(&self, name: &str) -> AurforgeResult<PackageSource> {
        for tier in &self.tiers {
            if tier.has(name).await? {
                return Ok(tier.source());
            }
        }
        Err(AurforgeError::DependencyNotFound {
            dependency: name.to_string(),
        })
    }
}
