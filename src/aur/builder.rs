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

//! makepkg invocation with proper privilege handling.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

use crate::config::Config;
use crate::error::{AurforgeError, AurforgeResult};

/// Per-attempt switches for the build tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Install the result (`makepkg -i`)
    pub install: bool,
    /// Skip makepkg's own dependency checks
    pub nodeps: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            install: true,
            nodeps: false,
        }
    }
}

/// The external program that turns an extracted recipe into a package
pub trait BuildTool {
    /// Build (and optionally install) the recipe in `dir`; `Ok` means exit code 0
    fn build(&self, package: &str, dir: &Path, options: BuildOptions) -> AurforgeResult<()>;
}

/// Who makepkg runs as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Privilege {
    /// Normal user
    User,
    /// Root via sudo: drop back to the invoking user
    DropTo(String),
    /// Plain root
    Root,
}

impl Privilege {
    pub fn detect() -> Self {
        let uid = unsafe { libc::geteuid() };
        if uid != 0 {
            return Privilege::User;
        }
        match std::env::var("SUDO_USER") {
            Ok(user) if !user.is_empty() && user != "root" => Privilege::DropTo(user),
            _ => Privilege::Root,
        }
    }
}

/// makepkg runner
pub struct Makepkg {
    program: PathBuf,
    make_jobs: usize,
    noconfirm: bool,
    privilege: Privilege,
}

impl Makepkg {
    /// Find makepkg on `PATH` and take settings from configuration
    pub fn locate(config: &Config) -> AurforgeResult<Self> {
        let program = which::which("makepkg").map_err(|e| AurforgeError::BuildFailed {
            package: String::new(),
            reason: format!("makepkg not found: {}", e),
            exit_code: None,
        })?;

        Ok(Self {
            program,
            make_jobs: config.get_make_jobs(),
            noconfirm: config.aur.noconfirm,
            privilege: Privilege::detect(),
        })
    }

    fn makepkg_args(&self, options: BuildOptions) -> Vec<String> {
        let mut args = vec![if options.install { "-si" } else { "-s" }.to_string()];
        if options.nodeps {
            args.push("--nodeps".to_string());
        }
        if self.noconfirm {
            args.push("--noconfirm".to_string());
        }
        if self.privilege == Privilege::Root {
            args.push("--asroot".to_string());
        }
        args
    }

    /// The full command, not yet spawned
    fn command(&self, dir: &Path, options: BuildOptions) -> Command {
        let mut cmd = match &self.privilege {
            Privilege::DropTo(user) => {
                let mut cmd = Command::new("sudo");
                cmd.arg("-u").arg(user).arg(&self.program);
                cmd
            }
            _ => Command::new(&self.program),
        };
        cmd.args(self.makepkg_args(options));
        cmd.env("MAKEFLAGS", format!("-j{}", self.make_jobs));
        cmd.current_dir(dir);
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        cmd
    }

    /// Hand the build tree to the unprivileged user
    fn chown_for(&self, dir: &Path) {
        if let Privilege::DropTo(user) = &self.privilege {
            info!("dropping privileges to {}", user);
            let _ = Command::new("chown")
                .arg("-R")
                .arg(format!("{}:", user))
                .arg(dir)
                .status();
        }
    }
}

impl BuildTool for Makepkg {
    fn build(&self, package: &str, dir: &Path, options: BuildOptions) -> AurforgeResult<()> {
        self.chown_for(dir);

        let mut cmd = self.command(dir, options);
        info!("running {:?} in {}", cmd, dir.display());

        let status = cmd.status().map_err(|e| AurforgeError::BuildFailed {
            package: package.to_string(),
            reason: format!("cannot run makepkg: {}", e),
            exit_code: None,
        })?;

        if !status.success() {
            return Err(AurforgeError::BuildFailed {
                package: package.to_string(),
                reason: match status.code() {
                    Some(code) => format!("makepkg exited with code {}", code),
                    None => "makepkg was killed by a signal".to_string(),
                },
                exit_code: status.code(),
            });
        }

        Ok(())
    }
}
