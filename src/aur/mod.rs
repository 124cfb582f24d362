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

//! AUR (Arch User Repository) support module.
//!
//! This module provides:
//! - RPC client for info, search and multiinfo queries
//! - Snapshot download and extraction
//! - PKGBUILD dependency extraction
//! - Three-tier dependency classification
//! - makepkg invocation and recursive build orchestration

pub mod builder;
pub mod client;
pub mod fetch;
pub mod orchestrator;
pub mod pkgbuild;
pub mod resolver;
pub mod upgrade;

pub use builder::Makepkg;
pub use client::{AurClient, MetadataService, PackageRecord};
pub use fetch::HttpDownloader;
pub use orchestrator::{BuildOutcome, Orchestrator, OrchestratorSettings, Validation};
pub use upgrade::find_upgrades;
