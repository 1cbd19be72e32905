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

//! Environment variable name constants for TPD configuration.
//!
//! These constants are the single source of truth for every environment
//! variable TPD reads.
//!
//! # Environment Variables
//!
//! - [`TPD_CONFIG`] - Path of the debugger configuration file
//! - [`TPD_LOOPS`] - Iteration count forced on the debugged thread group
//! - [`TPD_PAUSE_ON_START`] - Pause before the first unit is dispatched
//! - [`TPD_LOG_DIR`] - Root directory for log files

/// Environment variable pointing at the debugger configuration file.
///
/// When unset, the configuration is looked up at
/// `<config dir>/tpd/debugger.toml` and defaults are used if that file
/// does not exist.
///
/// # Examples
///
/// ```bash
/// TPD_CONFIG=/etc/tpd/debugger.toml cargo run
/// ```
pub const TPD_CONFIG: &str = "TPD_CONFIG";

/// Environment variable overriding the number of iterations the debugged
/// thread group runs.
///
/// # Value Format
///
/// Must be a positive `u32`. Other values make configuration loading fail.
pub const TPD_LOOPS: &str = "TPD_LOOPS";

/// Environment variable requesting a pause before the first dispatched unit.
///
/// Accepts `1`, `true`, `yes`, `on` (case-insensitive) as enabled and `0`,
/// `false`, `no`, `off` as disabled. Other values make configuration loading
/// fail.
pub const TPD_PAUSE_ON_START: &str = "TPD_PAUSE_ON_START";

/// Environment variable for the log directory root.
///
/// # Default
///
/// When not set, logs are written below `<temp dir>/tpd-logs`.
pub const TPD_LOG_DIR: &str = "TPD_LOG_DIR";
