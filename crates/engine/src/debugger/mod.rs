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

//! Step-by-step debugging of a test plan.
//!
//! [`Debugger`] is the entry point. It selects a thread group, runs it on a
//! [`DebuggingThread`] through a [`DebuggerEngine`] whose dispatch step is
//! replaced by a [`DebuggerCompiler`], and forwards control commands to the
//! [`DebugSession`] that parks and releases the worker.

mod breakpoints;
mod controller;
mod engine;
mod frontend;
mod interceptor;
mod session;
mod worker;

pub use breakpoints::*;
pub use controller::*;
pub use engine::*;
pub use frontend::*;
pub use interceptor::*;
pub use session::*;
pub use worker::*;
