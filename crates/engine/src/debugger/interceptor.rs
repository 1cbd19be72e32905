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

//! Dispatch interception.

use std::{ops::ControlFlow, sync::Arc};

use parking_lot::RwLock;
use tpd_common::RunContext;

use crate::{DebugSession, ExecutableUnit, SamplerSlot, StepTrigger, UnitCompiler};

/// Shared, replaceable step trigger
pub type StepperSlot = Arc<RwLock<Option<Arc<dyn StepTrigger>>>>;

/// Compiler wrapper installed on the debugged engine.
///
/// For every slot it compiles through the inner compiler, records the unit
/// as current, notifies the step trigger and then hands the unit to the
/// session, which may park the calling thread.
pub struct DebuggerCompiler<C> {
    inner: C,
    session: Arc<DebugSession>,
    stepper: StepperSlot,
}

impl<C: UnitCompiler> DebuggerCompiler<C> {
    pub fn new(inner: C, session: Arc<DebugSession>, stepper: StepperSlot) -> Self {
        Self { inner, session, stepper }
    }
}

impl<C: UnitCompiler> UnitCompiler for DebuggerCompiler<C> {
    fn compile(&self, slot: &SamplerSlot, ctx: &RunContext) -> ControlFlow<(), Arc<ExecutableUnit>> {
        let unit = self.inner.compile(slot, ctx)?;
        self.session.record_unit(&unit);

        let stepper = self.stepper.read().clone();
        if let Some(stepper) = stepper {
            stepper.notify(&unit);
        }

        self.session.on_dispatch(&unit, ctx)?;
        ControlFlow::Continue(unit)
    }
}
