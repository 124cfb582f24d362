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

//! Error taxonomy for build attempts.
//!
//! Every variant except [`AurforgeError::Interrupted`] is fatal only to the
//! build attempt that raised it; the orchestrator turns it into a
//! `BuildOutcome::Failure` and moves on.

use thiserror::Error;

/// Main error type for aurforge operations
#[derive(Debug, Error)]
pub enum AurforgeError {
    /// Connection-level failures talking to the AUR
    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The AUR answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// AUR package not found
    #[error("AUR package '{package}' not found")]
    AurPackageNotFound { package: String },

    /// Recipe archive download produced nothing
    #[error("Download of '{url}' failed: {reason}")]
    Download { url: String, reason: String },

    /// Recipe archive extraction produced nothing
    #[error("Extraction of '{archive}' failed: {reason}")]
    Extract { archive: String, reason: String },

    /// A declared dependency is not installed, not in a repo and not in the AUR
    #[error("Cannot find dependency '{dependency}' anywhere")]
    DependencyNotFound { dependency: String },

    /// Circular dependency detected in AUR packages
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Dependency chain exceeded the configured depth
    #[error("Dependency chain for '{package}' exceeds depth {max_depth}")]
    DepthExceeded { package: String, max_depth: usize },

    /// Package still needs AUR dependencies after they were built
    #[error("'{package}' still needs {} after its dependencies were built", .remaining.join(", "))]
    UnresolvedAfterRetry {
        package: String,
        remaining: Vec<String>,
    },

    /// A nested dependency build failed
    #[error("Cannot build '{package}': dependency '{dependency}' failed")]
    DependencyFailed { package: String, dependency: String },

    /// Build failures during AUR package compilation
    #[error("Build failed for '{package}': {reason}")]
    BuildFailed {
        package: String,
        reason: String,
        exit_code: Option<i32>,
    },

    /// Package missing from the local database after a successful build
    #[error("Validation failed for '{package}': {reason}")]
    ValidationFailed { package: String, reason: String },

    /// Local or sync database errors (ALPM operations)
    #[error("Database error: {context}")]
    Database {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// File system errors
    #[error("File system error for '{path}': {message}")]
    FileSystem {
        path: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Interrupted operation
    #[error("Operation interrupted")]
    Interrupted,

    /// Anything else, reported verbatim
    #[error("{0}")]
    Other(String),
}

impl AurforgeError {
    /// Whether this error must stop the whole session rather than one attempt
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, AurforgeError::Interrupted)
    }

    /// Create a database error
    pub fn database<E: std::error::Error + Send + Sync + 'static>(
        context: impl Into<String>,
        source: E,
    ) -> Self {
        AurforgeError::Database {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error from a transport failure
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        AurforgeError::Network {
            url: url.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a filesystem error
    pub fn filesystem(
        path: impl AsRef<std::path::Path>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        AurforgeError::FileSystem {
            path: path.as_ref().display().to_string(),
            message: message.into(),
            source: Some(source),
        }
    }
}

/// Result type alias for aurforge operations
pub type AurforgeResult<T> = std::result::Result<T, AurforgeError>;
