// TPD - Test Plan Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Logging configuration for TPD components
//!
//! Provides centralized logging setup with:
//! - Structured console output with thread names
//! - Optional daily-rotated file logging
//! - Environment variable support (`RUST_LOG`, [`TPD_LOG_DIR`](crate::env::TPD_LOG_DIR))

use eyre::{eyre, Result};
use once_cell::sync::OnceCell;
use std::{env, fs, path::PathBuf, sync::Once};
use tracing::Level;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::env::TPD_LOG_DIR;

/// Keeps the non-blocking file writer alive for the lifetime of the process.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialize logging for a TPD component
///
/// Console output is always enabled. When `enable_file_logging` is set, a
/// second layer writes uncoloured output to
/// `<log root>/<component_name>/<component_name>.log`, rotated daily.
///
/// Fails if a global subscriber is already installed.
///
/// # Examples
/// ```rust,no_run
/// use tpd_common::logging;
///
/// fn main() -> eyre::Result<()> {
///     logging::init_logging("tpd", true)?;
///     tracing::info!("debugger ready");
///     Ok(())
/// }
/// ```
pub fn init_logging(component_name: &str, enable_file_logging: bool) -> Result<()> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .with_filter(default_filter("info"));

    if enable_file_logging {
        let log_dir = create_log_directory(component_name)?;
        let file_appender = rolling::daily(&log_dir, format!("{component_name}.log"));
        let (writer, guard) = non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(LocalTime::rfc_3339())
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(default_filter("debug"));

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| eyre!("Failed to initialize tracing subscriber: {e}"))?;

        // A second successful init is impossible, so the slot is always empty here.
        let _ = FILE_GUARD.set(guard);

        tracing::info!(
            component = component_name,
            log_dir = %log_dir.display(),
            "Logging initialized with console and file output"
        );
    } else {
        tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .map_err(|e| eyre!("Failed to initialize tracing subscriber: {e}"))?;

        tracing::info!(component = component_name, "Logging initialized with console output only");
    }

    Ok(())
}

/// Resolve the log directory for a component and make sure it exists
fn create_log_directory(component_name: &str) -> Result<PathBuf> {
    let root = env::var_os(TPD_LOG_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("tpd-logs"));
    let log_dir = root.join(component_name);

    fs::create_dir_all(&log_dir)?;

    Ok(log_dir)
}

/// `RUST_LOG` if set and valid, otherwise the given level
fn default_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize simple console-only logging
///
/// Useful for tests and small utilities. `RUST_LOG` takes precedence over
/// `level`.
pub fn init_simple_logging(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter(level.as_str()))
        .with_test_writer()
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .try_init()
        .map_err(|e| eyre!("Failed to initialize simple logging: {e}"))
}

static TEST_LOGGING_INIT: Once = Once::new();

/// Logging initialization for tests, safe to call from every test
///
/// The first call installs a compact console subscriber at `default_level`
/// (INFO when `None`); later calls do nothing.
///
/// # Usage
/// ```rust
/// use tpd_common::logging;
///
/// logging::ensure_test_logging(None);
/// tracing::info!("visible under `cargo test -- --nocapture`");
/// ```
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        // Another subscriber may already be installed by the test harness.
        let _ = init_simple_logging(default_level.unwrap_or(Level::INFO));
    });
}
