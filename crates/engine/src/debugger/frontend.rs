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

//! Observer contracts of the debugger.
//!
//! Frontends are called from the worker thread, in dispatch order, and never
//! while the session lock is held. Calling
//! [`Debugger::continue_run`](crate::Debugger::continue_run),
//! [`Debugger::step_over`](crate::Debugger::step_over) or
//! [`Debugger::stop`](crate::Debugger::stop) from inside
//! [`DebuggerFrontend::frozen_at`] is the usual way to resume.

use auto_impl::auto_impl;
use tpd_common::{PlanTree, RunContext};

use crate::{ExecutableUnit, StopReason};

/// Receives the state changes of a debug session
#[auto_impl(&, Arc, Box)]
pub trait DebuggerFrontend: Send + Sync {
    /// The session was started. Called on the thread that started it.
    fn started(&self);

    /// The session ended. Called exactly once per started session.
    fn stopped(&self, reason: &StopReason);

    /// The paused worker resumed, either stepping or running.
    fn continuing(&self);

    /// The worker paused before executing `unit`.
    fn frozen_at(&self, unit: &ExecutableUnit);

    /// Current runtime state of the paused worker. Advisory.
    fn status_refresh(&self, ctx: &RunContext);
}

/// Observer invoked once per intercepted unit, whether or not it pauses
#[auto_impl(&, Arc, Box)]
pub trait StepTrigger: Send + Sync {
    /// A unit is about to be dispatched.
    fn notify(&self, unit: &ExecutableUnit);
}

/// Supplies the full plan tree a sub-tree is selected from
#[auto_impl(&, Arc, Box)]
pub trait TestTreeProvider: Send + Sync {
    /// The current plan tree.
    fn test_tree(&self) -> PlanTree;
}

impl TestTreeProvider for PlanTree {
    fn test_tree(&self) -> PlanTree {
        self.clone()
    }
}
