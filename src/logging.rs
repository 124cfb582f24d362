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

//! Logging and observability with tracing support.

use std::path::Path;
use tracing::Subscriber;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Target of the events `Reporter` mirrors; they reach the log file only
pub const REPORT_TARGET: &str = "report";

/// Compact console layer; drops `REPORT_TARGET` events, which the
/// reporter already printed
fn console_layer<S, W>(writer: W, color: bool) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(color)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .with_filter(filter_fn(|meta| meta.target() != REPORT_TARGET))
}

/// Initialize logging from the loaded configuration
pub fn init(config: &LoggingConfig, color: bool) {
    init_with_file(&config.level, config.file.as_deref(), color)
}

/// Initialize logging with a specific level, console only
pub fn init_with_level(level: &str, color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(std::io::stderr, color))
        .try_init();
}

/// Initialize logging with optional file output
pub fn init_with_file(level: &str, log_file: Option<&Path>, color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            let file_layer = fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true);

            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer(std::io::stderr, color))
                .with(file_layer)
                .try_init();

            return;
        }
    }

    // Fallback to console-only
    init_with_level(level, color);
}

/// Span around one build attempt
#[macro_export]
macro_rules! span_build {
    ($package:expr) => {
        tracing::info_span!("build", package = $package)
    };
}

/// Span around one network request
#[macro_export]
macro_rules! span_request {
    ($kind:expr, $arg:expr) => {
        tracing::debug_span!("aur_request", kind = $kind, arg = $arg)
    };
}
