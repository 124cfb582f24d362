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

//! Upgrade detection for installed AUR packages.

use std::cmp::Ordering;
use tracing::debug;

use super::client::MetadataService;
use crate::alpm_manager::{vercmp, PackageDatabase};
use crate::error::AurforgeResult;

/// A foreign package with a newer AUR version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgrade {
    pub name: String,
    pub installed: String,
    pub available: String,
}

/// Compare every foreign package against the AUR in one multiinfo request
pub async fn find_upgrades(
    database: &dyn PackageDatabase,
    metadata: &dyn MetadataService,
) -> AurforgeResult<Vec<Upgrade>> {
    let foreign = database.foreign_packages()?;
    if foreign.is_empty() {
        return Ok(Vec::new());
    }

    let names: Vec<String> = foreign.iter().map(|(name, _)| name.clone()).collect();
    let records = metadata.multiinfo(&names).await?;

    let mut upgrades = Vec::new();
    for (name, installed) in foreign {
        let Some(record) = records.iter().find(|r| r.name == name) else {
            debug!("{} is not in the AUR", name);
            continue;
        };
        if vercmp(&record.version, &installed) == Ordering::Greater {
            upgrades.push(Upgrade {
                name,
                installed,
                available: record.version.clone(),
            });
        }
    }
    Ok(upgrades)
}
