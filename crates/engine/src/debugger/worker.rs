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

//! Debugger worker thread.

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
};

use tracing::{error, info};

use crate::{
    error::panic_message, DebugSession, DebuggerCompiler, HostEngine, RunOutcome, StepperSlot,
    StopReason, TestCompiler,
};

/// The thread running a debugged engine.
///
/// Spawning installs the dispatch interceptor on the engine. Whatever ends
/// the run (completion, stop, error or panic), the session receives exactly
/// one `finish` from this thread.
pub struct DebuggingThread {
    engine: Arc<dyn HostEngine>,
    handle: JoinHandle<()>,
}

impl DebuggingThread {
    /// Install the interceptor on `engine` and run it on a new thread named
    /// `name`.
    pub fn spawn<E>(
        name: &str,
        mut engine: E,
        session: Arc<DebugSession>,
        stepper: StepperSlot,
    ) -> io::Result<Self>
    where
        E: HostEngine + 'static,
    {
        engine.set_compiler(Arc::new(DebuggerCompiler::new(
            TestCompiler::new(),
            session.clone(),
            stepper,
        )));
        let engine: Arc<dyn HostEngine> = Arc::new(engine);

        let handle = thread::Builder::new().name(name.to_string()).spawn({
            let engine = engine.clone();
            move || run(engine.as_ref(), &session)
        })?;
        Ok(Self { engine, handle })
    }

    /// The engine driven by this thread.
    pub fn engine(&self) -> &Arc<dyn HostEngine> {
        &self.engine
    }

    pub fn thread_id(&self) -> ThreadId {
        self.handle.thread().id()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread to exit.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

fn run(engine: &dyn HostEngine, session: &DebugSession) {
    info!("debugger worker started");
    let reason = match panic::catch_unwind(AssertUnwindSafe(|| engine.run_test())) {
        Ok(Ok(RunOutcome::Completed)) => StopReason::Finished,
        Ok(Ok(outcome)) => {
            info!(%outcome, "debugged run ended early");
            StopReason::Aborted
        }
        Ok(Err(err)) => {
            error!(%err, "debugged run failed");
            StopReason::Failed(err.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%message, "debugged run panicked");
            StopReason::Failed(format!("panic: {message}"))
        }
    };
    session.finish(reason);
}
