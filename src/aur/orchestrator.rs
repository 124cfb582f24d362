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

//! Build orchestration.
//!
//! A single build attempt never recurses. When it finds dependencies that
//! only the AUR carries it stops before the build and hands them back as
//! [`BuildOutcome::NeedsDependencies`]. [`Orchestrator::orchestrate`] keeps
//! an explicit stack of in-progress packages, builds the missing ones first
//! and then retries the dependent exactly once.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, Instrument};

use super::builder::{BuildOptions, BuildTool};
use super::client::{MetadataService, PackageRecord};
use super::fetch::{extract, Downloader, WorkingDirectory};
use super::pkgbuild::extract_dependencies;
use super::resolver::DependencyClassifier;
use crate::alpm_manager::PackageDatabase;
use crate::config::Config;
use crate::error::{AurforgeError, AurforgeResult};
use crate::interrupt::Interrupt;
use crate::report::Reporter;

/// What post-build validation found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Not requested, or the package was built without installing
    Skipped,
    Installed { version: String },
    /// Installed, but not at the version the AUR advertised
    Outdated { expected: String, installed: String },
}

/// Result of one build attempt
#[derive(Debug)]
pub enum BuildOutcome {
    Success(Validation),
    Failure(AurforgeError),
    /// Paused: these AUR packages must be built first
    NeedsDependencies(Vec<String>),
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success(_))
    }
}

/// Session-wide orchestration settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub build_root: PathBuf,
    pub clean_build: bool,
    pub max_depth: usize,
    /// Install top-level targets; dependencies are always installed
    pub install: bool,
    /// Classify recipe dependencies before building
    pub depcheck: bool,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config, install: bool, depcheck: bool) -> Self {
        Self {
            build_root: config.aur.build_dir.clone(),
            clean_build: config.aur.clean_build,
            max_depth: config.aur.max_depth,
            install,
            depcheck,
        }
    }
}

/// One package on the orchestration stack
#[derive(Debug)]
struct Frame {
    package: String,
    validate: bool,
    install: bool,
    retried: bool,
    pending: VecDeque<String>,
}

impl Frame {
    fn new(package: &str, validate: bool, install: bool) -> Self {
        Self {
            package: package.to_string(),
            validate,
            install,
            retried: false,
            pending: VecDeque::new(),
        }
    }
}

pub struct Orchestrator {
    metadata: Rc<dyn MetadataService>,
    database: Rc<dyn PackageDatabase>,
    classifier: DependencyClassifier,
    downloader: Box<dyn Downloader>,
    build_tool: Box<dyn BuildTool>,
    settings: OrchestratorSettings,
    reporter: Reporter,
    interrupt: Interrupt,
    built: Vec<String>,
    /// Subset of `built` that was also installed
    installed: Vec<String>,
}

impl Orchestrator {
    pub fn new(
        metadata: Rc<dyn MetadataService>,
        database: Rc<dyn PackageDatabase>,
        downloader: Box<dyn Downloader>,
        build_tool: Box<dyn BuildTool>,
        settings: OrchestratorSettings,
        reporter: Reporter,
        interrupt: Interrupt,
    ) -> Self {
        let classifier = DependencyClassifier::standard(Rc::clone(&database), Rc::clone(&metadata));
        Self {
            metadata,
            database,
            classifier,
            downloader,
            build_tool,
            settings,
            reporter,
            interrupt,
            built: Vec::new(),
            installed: Vec::new(),
        }
    }

    /// Packages built successfully in this session, in build order
    pub fn built(&self) -> &[String] {
        &self.built
    }

    fn already_built(&self, package: &str) -> bool {
        self.built.iter().any(|b| b == package)
    }

    fn already_installed(&self, package: &str) -> bool {
        self.installed.iter().any(|b| b == package)
    }

    /// Run one build attempt for `package` using the session's install setting
    pub async fn attempt_build(&self, package: &str, validate: bool) -> BuildOutcome {
        self.attempt(package, validate, self.settings.install).await
    }

    async fn attempt(&self, package: &str, validate: bool, install: bool) -> BuildOutcome {
        let span = crate::span_build!(package);
        match self.try_attempt(package, validate, install).instrument(span).await {
            Ok(outcome) => outcome,
            Err(e) => BuildOutcome::Failure(e),
        }
    }

    async fn try_attempt(
        &self,
        package: &str,
        validate: bool,
        install: bool,
    ) -> AurforgeResult<BuildOutcome> {
        self.interrupt.check()?;

        let record = self
            .interrupt
            .guard(self.metadata.info(package))
            .await?
            .ok_or_else(|| AurforgeError::AurPackageNotFound {
                package: package.to_string(),
            })?;
        self.reporter
            .msg(format!("Building {} {}...", record.name, record.version));
        if record.is_out_of_date() {
            self.reporter
                .warning(format!("{} is flagged out of date", record.name));
        }

        let workdir = WorkingDirectory::prepare(
            &self.settings.build_root,
            package,
            record.snapshot_name(),
            self.settings.clean_build,
        )?;

        self.reporter.msg2("Downloading the tarball...");
        let bytes = self
            .interrupt
            .guard(self.downloader.download(&record.url_path, workdir.archive()))
            .await?;
        self.reporter
            .msg2(format!("{:.1} KiB downloaded", bytes as f64 / 1024.0));
        self.interrupt.check()?;

        let files = extract(workdir.archive(), workdir.root())?;
        self.reporter.msg2(format!("{} files extracted", files));
        if !workdir.path().is_dir() {
            return Err(AurforgeError::Extract {
                archive: workdir.archive().display().to_string(),
                reason: format!("archive has no {}/ directory", record.snapshot_name()),
            });
        }

        if self.settings.depcheck {
            self.reporter.msg("Checking dependencies...");
            let recipe = workdir.read_recipe()?;
            let specs = extract_dependencies(&recipe);
            let classification = self
                .interrupt
                .guard(self.classifier.classify(&specs))
                .await?;
            debug!("{} dependencies classified", classification.len());

            if classification.is_empty() {
                self.reporter.msg2("none found");
            }
            for (name, source) in classification.iter() {
                self.reporter.msg2(format!("{}: found in {}", name, source));
            }

            let remote = classification.remote_only();
            if !remote.is_empty() {
                debug!("{} waits for {:?}", package, remote);
                return Ok(BuildOutcome::NeedsDependencies(remote));
            }
        }

        self.interrupt.check()?;
        self.reporter.msg("Starting the build...");
        let options = BuildOptions {
            install,
            nodeps: !self.settings.depcheck,
        };
        let result = self.build_tool.build(package, workdir.path(), options);
        // A Ctrl-C also kills makepkg; report the interrupt, not the exit code
        self.interrupt.check()?;
        result?;

        if !(validate && install) {
            return Ok(BuildOutcome::Success(Validation::Skipped));
        }
        self.validate(&record).map(BuildOutcome::Success)
    }

    fn validate(&self, record: &PackageRecord) -> AurforgeResult<Validation> {
        match self.database.installed_version(&record.name)? {
            None => Err(AurforgeError::ValidationFailed {
                package: record.name.clone(),
                reason: "package is not installed".to_string(),
            }),
            Some(installed) if installed == record.version => {
                self.reporter.msg2(format!(
                    "Validation: {} {} installed",
                    record.name, installed
                ));
                Ok(Validation::Installed { version: installed })
            }
            Some(installed) => {
                self.reporter.warning(format!(
                    "Validation: {} installed as {}, expected {}",
                    record.name, installed, record.version
                ));
                Ok(Validation::Outdated {
                    expected: record.version.clone(),
                    installed,
                })
            }
        }
    }

    /// Build `package` and, first, every AUR package it needs.
    ///
    /// Dependencies are built with validation on and always installed,
    /// since the dependent's build needs them. The returned outcome is
    /// never `NeedsDependencies`.
    pub async fn orchestrate(&mut self, package: &str, validate: bool) -> BuildOutcome {
        if self.already_built(package) {
            self.reporter
                .msg2(format!("{} was already built in this session", package));
            return BuildOutcome::Success(Validation::Skipped);
        }

        let mut stack = vec![Frame::new(package, validate, self.settings.install)];

        loop {
            if let Err(e) = self.interrupt.check() {
                return self.unwind(&stack, e);
            }

            let Some(top) = stack.last_mut() else {
                return BuildOutcome::Success(Validation::Skipped);
            };

            if let Some(dep) = top.pending.pop_front() {
                if self.already_installed(&dep) {
                    debug!("{} already installed", dep);
                    continue;
                }
                if let Some(pos) = stack.iter().position(|f| f.package == dep) {
                    let mut cycle: Vec<String> =
                        stack[pos..].iter().map(|f| f.package.clone()).collect();
                    cycle.push(dep);
                    return self.unwind(&stack, AurforgeError::CircularDependency { cycle });
                }
                if stack.len() > self.settings.max_depth {
                    let error = AurforgeError::DepthExceeded {
                        package: dep,
                        max_depth: self.settings.max_depth,
                    };
                    return self.unwind(&stack, error);
                }

                self.reporter.msg(format!("Building dependency {}...", dep));
                stack.push(Frame::new(&dep, true, true));
                continue;
            }

            let name = top.package.clone();
            let (validate, install, retried) = (top.validate, top.install, top.retried);

            match self.attempt(&name, validate, install).await {
                BuildOutcome::Success(validation) => {
                    if install {
                        self.installed.push(name.clone());
                    }
                    self.built.push(name);
                    stack.pop();
                    if stack.is_empty() {
                        return BuildOutcome::Success(validation);
                    }
                }
                BuildOutcome::NeedsDependencies(remaining) if retried => {
                    let error = AurforgeError::UnresolvedAfterRetry {
                        package: name,
                        remaining,
                    };
                    return self.unwind(&stack, error);
                }
                BuildOutcome::NeedsDependencies(deps) => {
                    self.reporter.warning(format!(
                        "{} needs AUR packages: {}",
                        name,
                        deps.join(", ")
                    ));
                    if let Some(top) = stack.last_mut() {
                        top.retried = true;
                        top.pending = deps.into();
                    }
                }
                BuildOutcome::Failure(e) => return self.unwind(&stack, e),
            }
        }
    }

    /// Fail the innermost frame with `error` and every ancestor with
    /// `DependencyFailed`; the root's error is returned.
    fn unwind(&self, stack: &[Frame], error: AurforgeError) -> BuildOutcome {
        self.reporter.error(error.to_string());
        if error.is_fatal_to_session() {
            return BuildOutcome::Failure(error);
        }

        let mut failed = error;
        for pair in stack.windows(2).rev() {
            failed = AurforgeError::DependencyFailed {
                package: pair[0].package.clone(),
                dependency: pair[1].package.clone(),
            };
            self.reporter.error(failed.to_string());
        }
        BuildOutcome::Failure(failed)
    }
}
