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

//! Debugger controller.

use std::{sync::Arc, thread, time::Duration};

use parking_lot::{Mutex, RwLock};
use tpd_common::{Loops, NodeId, NodeKind, NodeType, PlanTree};
use tracing::{debug, info, warn};

use crate::{
    BreakpointRegistry, DebugSession, DebuggerConfig, DebuggerEngine, DebuggerError,
    DebuggerFrontend, DebuggingThread, ExecutableUnit, HostEngine, SampleListener, Schedule,
    SessionState, StepTrigger, StepperSlot, StopReason, TestTreeProvider,
};

struct ActiveRun {
    session: Arc<DebugSession>,
    worker: Option<DebuggingThread>,
}

/// Step-by-step debugger for one thread group of a test plan.
///
/// All methods take `&self` and may be called from any thread, including
/// from inside frontend callbacks. Breakpoints outlive individual runs:
/// starting again after a run ended creates a fresh session with the same
/// breakpoints.
pub struct Debugger {
    provider: Arc<dyn TestTreeProvider>,
    frontend: Arc<dyn DebuggerFrontend>,
    config: DebuggerConfig,
    breakpoints: Arc<BreakpointRegistry>,
    stepper: StepperSlot,
    listeners: Mutex<Vec<Arc<dyn SampleListener>>>,
    selected: Mutex<Option<PlanTree>>,
    start_lock: Mutex<()>,
    run: Mutex<Option<ActiveRun>>,
}

impl Debugger {
    /// Create a debugger over the plan supplied by `provider`.
    pub fn new(
        provider: Arc<dyn TestTreeProvider>,
        frontend: Arc<dyn DebuggerFrontend>,
        config: DebuggerConfig,
    ) -> Self {
        Self {
            provider,
            frontend,
            config,
            breakpoints: Arc::new(BreakpointRegistry::new()),
            stepper: Arc::new(RwLock::new(None)),
            listeners: Mutex::new(Vec::new()),
            selected: Mutex::new(None),
            start_lock: Mutex::new(()),
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// The breakpoint registry shared by every run of this debugger.
    pub fn breakpoints(&self) -> &Arc<BreakpointRegistry> {
        &self.breakpoints
    }

    /// Flip the breakpoint on `node` and return whether it is now set.
    pub fn toggle_breakpoint(&self, node: NodeId) -> bool {
        self.breakpoints.toggle(node)
    }

    pub fn is_breakpoint(&self, node: NodeId) -> bool {
        self.breakpoints.is_set(node)
    }

    /// Whether `node` exists in the current plan and may carry a breakpoint.
    pub fn is_breakpoint_eligible(&self, node: NodeId) -> bool {
        self.provider.test_tree().is_breakpoint_eligible(node)
    }

    /// Install or remove the step trigger. Takes effect at the next dispatch.
    pub fn set_stepper(&self, stepper: Option<Arc<dyn StepTrigger>>) {
        *self.stepper.write() = stepper;
    }

    /// Register a listener receiving every sample of later runs.
    pub fn add_sample_listener(&self, listener: Arc<dyn SampleListener>) {
        self.listeners.lock().push(listener);
    }

    /// Build the debugging tree for the thread group enclosing `node`.
    ///
    /// The tree keeps the plan root, the plan-level elements that are not
    /// thread groups or workbenches, and the selected thread group reduced to
    /// one thread running `loops` iterations. Node identities are those of
    /// the full plan, so breakpoints carry over.
    pub fn select_subtree(&self, node: NodeId) -> Result<PlanTree, DebuggerError> {
        let full = self.provider.test_tree();
        let path = full.path_to(node).ok_or(DebuggerError::UnknownNode(node))?;
        let group = path
            .iter()
            .rev()
            .find(|candidate| candidate.node_type() == NodeType::ThreadGroup)
            .copied()
            .ok_or(DebuggerError::NoThreadGroup(node))?;

        let single = Arc::new(group.reshaped(
            NodeKind::ThreadGroup { threads: 1, loops: Loops::Finite(self.config.loops) },
            group.children().to_vec(),
        ));
        let root = full.root();
        let mut children: Vec<_> = root
            .children()
            .iter()
            .filter_map(|child| match child.node_type() {
                _ if child.id() == group.id() => Some(single.clone()),
                NodeType::ThreadGroup | NodeType::WorkBench => None,
                _ => Some(child.clone()),
            })
            .collect();
        if !children.iter().any(|child| child.id() == group.id()) {
            children.push(single.clone());
        }
        let tree = PlanTree::new(root.reshaped(root.kind().clone(), children));

        if Schedule::build(&tree, &single)?.is_empty() {
            return Err(DebuggerError::NoRunnableSampler(group.id()));
        }

        info!(group = %group.id(), name = group.name(), "thread group selected for debugging");
        *self.selected.lock() = Some(tree.clone());
        Ok(tree)
    }

    /// The tree built by the last successful [`select_subtree`](Self::select_subtree).
    pub fn selected_tree(&self) -> Option<PlanTree> {
        self.selected.lock().clone()
    }

    /// Start a run of the selected tree on a new worker thread.
    ///
    /// No-op while a run is active. Configuration errors are returned before
    /// any notification is made.
    pub fn start(&self) -> Result<(), DebuggerError> {
        let _starting = self.start_lock.lock();
        if self.session().is_some_and(|session| session.is_active()) {
            debug!("start ignored, a run is active");
            return Ok(());
        }

        self.config.validate()?;
        let tree = self.selected_tree().ok_or(DebuggerError::NoSelection)?;
        let mut engine = DebuggerEngine::new();
        for listener in self.listeners.lock().iter() {
            engine.add_listener(listener.clone());
        }
        engine.configure(tree)?;

        let session = Arc::new(DebugSession::new(
            self.breakpoints.clone(),
            self.frontend.clone(),
            self.config.refresh_on_pause,
        ));
        *self.run.lock() = Some(ActiveRun { session: session.clone(), worker: None });
        session.start(self.config.pause_on_start);

        match DebuggingThread::spawn(&self.config.worker_name, engine, session.clone(), self.stepper.clone()) {
            Ok(worker) => {
                if let Some(run) = self.run.lock().as_mut() {
                    if Arc::ptr_eq(&run.session, &session) {
                        run.worker = Some(worker);
                    }
                }
                Ok(())
            }
            Err(err) => {
                warn!(%err, "failed to spawn debugger worker");
                session.finish(StopReason::Failed(err.to_string()));
                Err(DebuggerError::Spawn(err))
            }
        }
    }

    /// Execute one unit and pause again. Queued while running.
    pub fn step_over(&self) -> bool {
        self.session().is_some_and(|session| session.step_over())
    }

    /// Resume until the next breakpoint.
    pub fn continue_run(&self) -> bool {
        self.session().is_some_and(|session| session.continue_run())
    }

    /// Pause at the next dispatch.
    pub fn pause(&self) -> bool {
        self.session().is_some_and(|session| session.pause())
    }

    /// Stop the run. Idempotent, and a no-op before `start`.
    pub fn stop(&self) -> bool {
        let run = self.run.lock();
        let Some(run) = run.as_ref() else {
            return false;
        };
        let stopped = run.session.stop();
        if stopped {
            if let Some(worker) = &run.worker {
                worker.engine().stop_test();
            }
        }
        stopped
    }

    /// Ask the paused worker to deliver `status_refresh` again.
    pub fn refresh_status(&self) -> bool {
        self.session().is_some_and(|session| session.refresh_status())
    }

    /// State of the current or last run, `Idle` before the first start.
    pub fn state(&self) -> SessionState {
        self.session().map_or(SessionState::Idle, |session| session.state())
    }

    /// The unit most recently dispatched by the current or last run.
    pub fn current_unit(&self) -> Option<Arc<ExecutableUnit>> {
        self.session().and_then(|session| session.last_unit())
    }

    /// Whether a run is in progress.
    pub fn is_active(&self) -> bool {
        self.session().is_some_and(|session| session.is_active())
    }

    /// Wait until the worker is paused. False on timeout or if the run ended.
    pub fn wait_until_paused(&self, timeout: Duration) -> bool {
        self.session().is_some_and(|session| session.wait_until_paused(timeout))
    }

    /// Wait until the current run delivered `stopped()`. True if nothing runs.
    pub fn wait_until_done(&self, timeout: Duration) -> bool {
        self.session().is_none_or(|session| session.wait_until_done(timeout))
    }

    fn session(&self) -> Option<Arc<DebugSession>> {
        self.run.lock().as_ref().map(|run| run.session.clone())
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        let Some(run) = self.run.get_mut().take() else {
            return;
        };
        run.session.stop();
        if let Some(worker) = run.worker {
            worker.engine().stop_test();
            if worker.thread_id() != thread::current().id() && worker.join().is_err() {
                warn!("debugger worker panicked while shutting down");
            }
        }
    }
}
