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

//! makepkg-style progress messages.
//!
//! Colour is a property of the [`Reporter`] value, not of the process.

use console::{Style, StyledObject};
use std::fmt::Display;

use crate::logging::REPORT_TARGET;

/// Writes `==>` / `  ->` messages to stderr and mirrors them into the log file
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    color: bool,
    quiet: bool,
}

impl Reporter {
    pub fn new(color: bool) -> Self {
        Self { color, quiet: false }
    }

    /// A reporter that only logs, used by tests
    pub fn quiet() -> Self {
        Self {
            color: false,
            quiet: true,
        }
    }

    /// Apply a style, honouring this reporter's colour setting
    pub fn paint<D: Display>(&self, style: Style, value: D) -> StyledObject<D> {
        style.force_styling(self.color).apply_to(value)
    }

    /// Main message
    pub fn msg(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        tracing::info!(target: REPORT_TARGET, "{}", text);
        self.emit(format!(
            "{} {}",
            self.paint(Style::new().green().bold(), "==>"),
            self.paint(Style::new().bold(), text)
        ));
    }

    /// Sub-message
    pub fn msg2(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        tracing::info!(target: REPORT_TARGET, "  {}", text);
        self.emit(format!(
            "{} {}",
            self.paint(Style::new().blue().bold(), "  ->"),
            self.paint(Style::new().bold(), text)
        ));
    }

    pub fn warning(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        tracing::warn!(target: REPORT_TARGET, "{}", text);
        self.emit(format!(
            "{} {}",
            self.paint(Style::new().yellow().bold(), "==> WARNING:"),
            self.paint(Style::new().bold(), text)
        ));
    }

    pub fn error(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        tracing::error!(target: REPORT_TARGET, "{}", text);
        self.emit(format!(
            "{} {}",
            self.paint(Style::new().red().bold(), "==> ERROR:"),
            self.paint(Style::new().bold(), text)
        ));
    }

    fn emit(&self, line: String) {
        if !self.quiet {
            eprintln!("{}", line);
        }
    }
}
