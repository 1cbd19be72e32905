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

//! Host engine boundary.
//!
//! A host engine runs a configured plan tree. The debugger never reaches into
//! an engine's internals: everything it needs goes through [`HostEngine`],
//! and the per-unit dispatch step is replaced through
//! [`HostEngine::set_compiler`].

mod compiler;
mod standard;
mod thread;
mod unit;

pub use compiler::*;
pub use standard::*;
pub use thread::*;
pub use unit::*;

use std::sync::Arc;

use auto_impl::auto_impl;
use tpd_common::PlanTree;

use crate::EngineError;

/// Operations the debugger needs from an engine
#[auto_impl(Box)]
pub trait HostEngine: Send + Sync {
    /// Install the plan to run. Fails if the plan cannot be scheduled.
    fn configure(&mut self, tree: PlanTree) -> Result<(), EngineError>;

    /// Replace the per-unit dispatch step.
    fn set_compiler(&mut self, compiler: Arc<dyn UnitCompiler>);

    /// Run the configured plan to the end, blocking the caller.
    fn run_test(&self) -> Result<RunOutcome, EngineError>;

    /// Whether a run is in progress.
    fn is_active(&self) -> bool;

    /// Ask running plan threads to stop before their next dispatch.
    fn stop_test(&self);
}
