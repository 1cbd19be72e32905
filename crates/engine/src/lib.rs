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

//! TPD Engine - plan execution and step-by-step debugging
//!
//! This crate contains a reference host engine that runs test-plan trees
//! ([`StandardEngine`]) and the debugger built on top of its per-unit
//! dispatch hook ([`Debugger`]).
//!
//! A typical debugging run:
//!
//! 1. create a [`Debugger`] with a [`TestTreeProvider`] and a
//!    [`DebuggerFrontend`];
//! 2. select the thread group to debug with [`Debugger::select_subtree`]
//!    and toggle breakpoints on nodes;
//! 3. [`Debugger::start`] the run and drive it with
//!    [`Debugger::step_over`], [`Debugger::continue_run`] and
//!    [`Debugger::stop`], typically from [`DebuggerFrontend::frozen_at`].

/// Debugger configuration
pub mod config;
pub use config::*;

/// Debug session, interception layer, worker and controller
pub mod debugger;
pub use debugger::*;

/// Error types
pub mod error;
pub use error::{ConfigError, DebuggerError, EngineError};

/// Host engine boundary and the reference engine
pub mod host;
pub use host::*;
