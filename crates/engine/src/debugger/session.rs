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

//! Debug session state machine.
//!
//! The session owns the run state of one debugging run and the park/release
//! handshake between the worker and the control thread:
//!
//! ```text
//! Idle --start--> Running --breakpoint / queued pause--> Paused
//!                 Running <--continue-- Paused --step--> Stepping
//!                 Running <--continue-- Stepping --next dispatch--> Paused
//! Running | Paused | Stepping --stop--> Stopped
//! Running | Stepping --plan exhausted--> Finished
//! ```
//!
//! Control commands only change the state and post a [`PendingMode`] under the
//! session mutex before signalling the condition variable, so a wake-up posted
//! before the worker starts waiting is never lost. The worker is the only
//! thread that executes plan elements. Frontend callbacks are made with the
//! mutex released.

use std::{
    mem,
    ops::ControlFlow,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use derive_more::Display;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use tpd_common::RunContext;
use tracing::{debug, error, info};

use crate::{error::panic_message, BreakpointRegistry, DebuggerFrontend, ExecutableUnit};

/// Lifecycle state of a debug session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, Serialize)]
pub enum SessionState {
    /// Created, not started
    Idle,
    /// Executing units without pausing
    Running,
    /// Worker parked before a unit
    Paused,
    /// Executing one unit, pausing at the next dispatch
    Stepping,
    /// Stopped on request or after a failure
    Stopped,
    /// The plan ran to the end
    Finished,
}

impl SessionState {
    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Finished)
    }

    /// Whether the worker is running or parked.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Stepping)
    }
}

/// Why a session ended
#[derive(Clone, Debug, PartialEq, Eq, Display, Serialize)]
pub enum StopReason {
    /// The plan ran to the end
    #[display("finished")]
    Finished,
    /// The run was stopped before the end
    #[display("aborted")]
    Aborted,
    /// The engine failed or panicked
    #[display("failed: {_0}")]
    Failed(String),
}

impl StopReason {
    /// Whether the session ended abnormally.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Wake-up token posted to a parked worker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingMode {
    None,
    Step,
    Continue,
    Stop,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    pending: PendingMode,
    pause_requested: bool,
    refresh_requested: bool,
    last_unit: Option<Arc<ExecutableUnit>>,
    /// `stopped()` has been claimed by a call to `finish`.
    finishing: bool,
    /// `stopped()` has been delivered.
    done: bool,
}

/// State and park/release handshake of one debugging run
pub struct DebugSession {
    inner: Mutex<Inner>,
    signal: Condvar,
    breakpoints: Arc<BreakpointRegistry>,
    frontend: Arc<dyn DebuggerFrontend>,
    refresh_on_pause: bool,
}

impl DebugSession {
    /// Create an idle session.
    ///
    /// With `refresh_on_pause`, every `frozen_at` is followed by a
    /// `status_refresh` carrying the worker's run context.
    pub fn new(
        breakpoints: Arc<BreakpointRegistry>,
        frontend: Arc<dyn DebuggerFrontend>,
        refresh_on_pause: bool,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                pending: PendingMode::None,
                pause_requested: false,
                refresh_requested: false,
                last_unit: None,
                finishing: false,
                done: false,
            }),
            signal: Condvar::new(),
            breakpoints,
            frontend,
            refresh_on_pause,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// The unit most recently dispatched.
    pub fn last_unit(&self) -> Option<Arc<ExecutableUnit>> {
        self.inner.lock().last_unit.clone()
    }

    /// Whether the session was started and has not delivered `stopped()` yet.
    pub fn is_active(&self) -> bool {
        let inner = self.inner.lock();
        inner.state != SessionState::Idle && !inner.done
    }

    /// Whether `stopped()` has been delivered.
    pub fn is_done(&self) -> bool {
        self.inner.lock().done
    }

    /// Leave `Idle` and notify `started()` on the calling thread.
    ///
    /// With `pause_on_start` the first dispatch pauses. Returns false if the
    /// session was already started.
    pub fn start(&self, pause_on_start: bool) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Idle {
                debug!(state = %inner.state, "start ignored");
                return false;
            }
            inner.state = SessionState::Running;
            inner.pause_requested = pause_on_start;
        }
        info!(pause_on_start, "debug session started");
        self.frontend.started();
        true
    }

    /// Execute exactly one unit and pause at the next dispatch.
    ///
    /// While running, the request is queued and the worker pauses at the next
    /// dispatch instead.
    pub fn step_over(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Paused => {
                Self::transition(&mut inner, SessionState::Stepping);
                inner.pending = PendingMode::Step;
                self.signal.notify_all();
                true
            }
            SessionState::Running => {
                inner.pause_requested = true;
                debug!("step queued until next dispatch");
                true
            }
            state => {
                debug!(%state, "step ignored");
                false
            }
        }
    }

    /// Resume without pausing until the next breakpoint.
    pub fn continue_run(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Paused => {
                Self::transition(&mut inner, SessionState::Running);
                inner.pending = PendingMode::Continue;
                self.signal.notify_all();
                true
            }
            SessionState::Stepping | SessionState::Running => {
                Self::transition(&mut inner, SessionState::Running);
                inner.pause_requested = false;
                true
            }
            state => {
                debug!(%state, "continue ignored");
                false
            }
        }
    }

    /// Queue a pause at the next dispatch.
    pub fn pause(&self) -> bool {
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Running | SessionState::Stepping) {
            inner.pause_requested = true;
            true
        } else {
            false
        }
    }

    /// Stop the run. The pending unit of a parked worker is not executed.
    ///
    /// No-op before `start` and once the session is terminal.
    pub fn stop(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.is_live() {
            debug!(state = %inner.state, "stop ignored");
            return false;
        }
        Self::transition(&mut inner, SessionState::Stopped);
        inner.pending = PendingMode::Stop;
        self.signal.notify_all();
        info!("debug session stop requested");
        true
    }

    /// Ask a paused worker to deliver `status_refresh` again.
    pub fn refresh_status(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Paused {
            return false;
        }
        inner.refresh_requested = true;
        self.signal.notify_all();
        true
    }

    /// Remember `unit` as the current unit.
    pub fn record_unit(&self, unit: &Arc<ExecutableUnit>) {
        self.inner.lock().last_unit = Some(unit.clone());
    }

    /// Dispatch hook, called on the worker before `unit` executes.
    ///
    /// Pauses if the unit hits a breakpoint, the session is stepping, or a
    /// pause was requested, and blocks until resumed. Returns
    /// [`ControlFlow::Break`] if the session was stopped.
    pub fn on_dispatch(&self, unit: &Arc<ExecutableUnit>, ctx: &RunContext) -> ControlFlow<()> {
        let mut inner = self.inner.lock();
        let reason = match inner.state {
            SessionState::Stopped | SessionState::Finished => return ControlFlow::Break(()),
            SessionState::Stepping => "step",
            _ if self.breakpoints.hits(unit) => "breakpoint",
            _ if inner.pause_requested => "pause request",
            _ => return ControlFlow::Continue(()),
        };

        inner.pause_requested = false;
        inner.refresh_requested = false;
        inner.pending = PendingMode::None;
        Self::transition(&mut inner, SessionState::Paused);
        self.signal.notify_all();
        drop(inner);

        info!(node = %unit.sampler_id(), seq = unit.seq(), reason, "paused at {}", unit.sampler().name());
        self.frontend.frozen_at(unit);
        if self.refresh_on_pause {
            self.frontend.status_refresh(ctx);
        }
        self.park(ctx)
    }

    /// Block the worker until a pending mode is posted.
    fn park(&self, ctx: &RunContext) -> ControlFlow<()> {
        let mut inner = self.inner.lock();
        loop {
            match mem::replace(&mut inner.pending, PendingMode::None) {
                PendingMode::Step | PendingMode::Continue => break,
                PendingMode::Stop => {
                    debug!("parked worker released by stop");
                    return ControlFlow::Break(());
                }
                PendingMode::None if inner.refresh_requested => {
                    inner.refresh_requested = false;
                    MutexGuard::unlocked(&mut inner, || self.frontend.status_refresh(ctx));
                }
                PendingMode::None => self.signal.wait(&mut inner),
            }
        }
        inner.refresh_requested = false;
        let state = inner.state;
        drop(inner);

        info!(%state, "resumed");
        self.frontend.continuing();
        ControlFlow::Continue(())
    }

    /// Report the end of the worker. Only the first call has an effect.
    ///
    /// If the session was already stopped, that terminal state is kept and
    /// the run is reported as aborted unless the worker failed.
    pub fn finish(&self, outcome: StopReason) {
        let reason = {
            let mut inner = self.inner.lock();
            if inner.finishing {
                return;
            }
            inner.finishing = true;
            inner.pending = PendingMode::None;

            let reason = match (outcome, inner.state) {
                (failed @ StopReason::Failed(_), _) => failed,
                (_, SessionState::Stopped) => StopReason::Aborted,
                (outcome, _) => outcome,
            };
            if !inner.state.is_terminal() {
                let terminal = match reason {
                    StopReason::Finished => SessionState::Finished,
                    _ => SessionState::Stopped,
                };
                Self::transition(&mut inner, terminal);
            }
            reason
        };

        if reason.is_failure() {
            error!(%reason, "debug session ended abnormally");
        } else {
            info!(%reason, "debug session ended");
        }
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| self.frontend.stopped(&reason)));
        if let Err(payload) = delivered {
            let message = panic_message(payload.as_ref());
            error!(%message, "frontend panicked while handling stop");
        }

        self.inner.lock().done = true;
        self.signal.notify_all();
    }

    /// Wait until the worker is paused. Returns false on timeout or if the
    /// session ended first.
    pub fn wait_until_paused(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.state != SessionState::Paused && !inner.state.is_terminal() {
            if self.signal.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.state == SessionState::Paused
    }

    /// Wait until `stopped()` has been delivered. Returns false on timeout.
    pub fn wait_until_done(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.done {
            if self.signal.wait_until(&mut inner, deadline).timed_out() {
                return inner.done;
            }
        }
        true
    }

    fn transition(inner: &mut Inner, to: SessionState) {
        if inner.state != to {
            debug!(from = %inner.state, state = %to, "session state changed");
            inner.state = to;
        }
    }
}
