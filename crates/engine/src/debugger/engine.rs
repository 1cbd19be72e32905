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

//! Single-threaded engine driven by the debugger worker.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tpd_common::{PlanTree, RunContext};
use tracing::debug;

use crate::{
    EngineError, HostEngine, PlanThread, RunOutcome, SampleListener, Schedule, TestCompiler,
    UnitCompiler,
};

/// Runs the first thread group of a plan as one plan thread, inline on the
/// thread calling [`HostEngine::run_test`].
///
/// The run context is created by `run_test` and passed down explicitly to
/// the compiler, so the debugger sees the context of the thread it paused.
pub struct DebuggerEngine {
    schedule: Option<Arc<Schedule>>,
    compiler: Arc<dyn UnitCompiler>,
    listeners: Vec<Arc<dyn SampleListener>>,
    running: Arc<AtomicBool>,
    active: AtomicBool,
    last_context: Mutex<Option<RunContext>>,
}

impl Default for DebuggerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DebuggerEngine {
    pub fn new() -> Self {
        Self {
            schedule: None,
            compiler: Arc::new(TestCompiler::new()),
            listeners: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            active: AtomicBool::new(false),
            last_context: Mutex::new(None),
        }
    }

    /// Register a listener for every sample.
    pub fn add_listener(&mut self, listener: Arc<dyn SampleListener>) {
        self.listeners.push(listener);
    }

    /// Context of the last completed run.
    pub fn last_context(&self) -> Option<RunContext> {
        self.last_context.lock().clone()
    }
}

/// Clears the active flag however `run_test` is left.
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl HostEngine for DebuggerEngine {
    fn configure(&mut self, tree: PlanTree) -> Result<(), EngineError> {
        let schedule = Schedule::for_plan(&tree)?
            .into_iter()
            .find(|schedule| !schedule.is_empty())
            .ok_or(EngineError::NoRunnableSampler)?;
        debug!(group = %schedule.group_id(), slots = schedule.slot_count(), "debugger engine configured");
        self.schedule = Some(Arc::new(schedule));
        Ok(())
    }

    fn set_compiler(&mut self, compiler: Arc<dyn UnitCompiler>) {
        self.compiler = compiler;
    }

    fn run_test(&self) -> Result<RunOutcome, EngineError> {
        let schedule = self.schedule.clone().ok_or(EngineError::NotConfigured)?;
        if self.active.swap(true, Ordering::AcqRel) {
            return Err(EngineError::AlreadyRunning);
        }
        let _active = ActiveGuard(&self.active);
        self.running.store(true, Ordering::Release);

        let plan_thread = PlanThread::new(
            schedule,
            1,
            1,
            self.compiler.clone(),
            self.running.clone(),
            self.listeners.clone(),
        );
        let mut ctx = plan_thread.new_context();
        let outcome = plan_thread.run(&mut ctx);

        self.running.store(false, Ordering::Release);
        *self.last_context.lock() = Some(ctx);
        outcome
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn stop_test(&self) {
        self.running.store(false, Ordering::Release);
    }
}
