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

//! The plain multi-threaded engine.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use tpd_common::PlanTree;
use tracing::{error, info};

use crate::{
    error::panic_message, EngineError, HostEngine, PlanThread, RunOutcome, SampleListener,
    Schedule, TestCompiler, UnitCompiler,
};

type PlanThreadHandle = (String, JoinHandle<Result<RunOutcome, EngineError>>);

/// Runs every thread group of a plan, each with its configured number of
/// OS threads
pub struct StandardEngine {
    schedules: Vec<Arc<Schedule>>,
    compiler: Arc<dyn UnitCompiler>,
    listeners: Vec<Arc<dyn SampleListener>>,
    running: Arc<AtomicBool>,
    active: AtomicBool,
}

impl Default for StandardEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardEngine {
    /// Create an unconfigured engine using [`TestCompiler`].
    pub fn new() -> Self {
        Self {
            schedules: Vec::new(),
            compiler: Arc::new(TestCompiler::new()),
            listeners: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            active: AtomicBool::new(false),
        }
    }

    /// Register a listener for every sample of every thread.
    pub fn add_listener(&mut self, listener: Arc<dyn SampleListener>) {
        self.listeners.push(listener);
    }

    fn spawn_threads(&self) -> Result<Vec<PlanThreadHandle>, EngineError> {
        let mut handles = Vec::new();
        for (index, schedule) in self.schedules.iter().enumerate() {
            for number in 1..=schedule.threads() {
                let plan_thread = PlanThread::new(
                    schedule.clone(),
                    index + 1,
                    number,
                    self.compiler.clone(),
                    self.running.clone(),
                    self.listeners.clone(),
                );
                let name = plan_thread.name().to_string();
                let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                    let mut ctx = plan_thread.new_context();
                    plan_thread.run(&mut ctx)
                });
                match spawned {
                    Ok(handle) => handles.push((name, handle)),
                    Err(err) => {
                        self.running.store(false, Ordering::Release);
                        for (_, handle) in handles {
                            let _ = handle.join();
                        }
                        return Err(EngineError::Spawn(err));
                    }
                }
            }
        }
        Ok(handles)
    }
}

impl HostEngine for StandardEngine {
    fn configure(&mut self, tree: PlanTree) -> Result<(), EngineError> {
        self.schedules = Schedule::for_plan(&tree)?.into_iter().map(Arc::new).collect();
        Ok(())
    }

    fn set_compiler(&mut self, compiler: Arc<dyn UnitCompiler>) {
        self.compiler = compiler;
    }

    fn run_test(&self) -> Result<RunOutcome, EngineError> {
        if self.schedules.is_empty() {
            return Err(EngineError::NotConfigured);
        }
        if self.active.swap(true, Ordering::AcqRel) {
            return Err(EngineError::AlreadyRunning);
        }
        self.running.store(true, Ordering::Release);
        info!(groups = self.schedules.len(), "starting test");

        let handles = match self.spawn_threads() {
            Ok(handles) => handles,
            Err(err) => {
                self.active.store(false, Ordering::Release);
                return Err(err);
            }
        };

        let mut outcome = RunOutcome::Completed;
        let mut failure = None;
        for (name, handle) in handles {
            match handle.join() {
                Ok(Ok(RunOutcome::Completed)) => {}
                Ok(Ok(other)) => {
                    if other == RunOutcome::Aborted || outcome == RunOutcome::Completed {
                        outcome = other;
                    }
                }
                Ok(Err(err)) => {
                    error!(thread = %name, %err, "plan thread failed");
                    failure.get_or_insert(err);
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(thread = %name, %message, "plan thread panicked");
                    failure.get_or_insert(EngineError::ThreadPanicked { thread: name, message });
                }
            }
        }

        self.running.store(false, Ordering::Release);
        self.active.store(false, Ordering::Release);
        info!(%outcome, failed = failure.is_some(), "test ended");
        failure.map_or(Ok(outcome), Err)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn stop_test(&self) {
        self.running.store(false, Ordering::Release);
    }
}
