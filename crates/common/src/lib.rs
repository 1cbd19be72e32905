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

//! TPD Common - shared types and utilities for TPD components
//!
//! This crate holds the test-plan data model consumed by the engine and its
//! observers (plan tree, run context, sample results), together with the
//! logging setup and environment variable names shared across the workspace.

/// Environment variable names used for TPD configuration
pub mod env;
/// Logging setup and utilities for consistent logging across TPD components
pub mod logging;
/// Test-plan data model: plan tree, run context and sample results
pub mod types;

pub use logging::*;
pub use types::*;
