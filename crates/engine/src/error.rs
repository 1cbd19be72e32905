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

//! Error types of the engine and the debugger.

use std::io;

use thiserror::Error;
use tpd_common::NodeId;

/// Errors raised by a host engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// `run_test` was called before `configure`
    #[error("engine has no configured plan")]
    NotConfigured,

    /// A run is already in progress
    #[error("engine is already running a plan")]
    AlreadyRunning,

    /// The configured plan has no thread group
    #[error("plan has no thread group")]
    NoThreadGroup,

    /// The thread groups of the plan contain no sampler to run
    #[error("plan has no runnable sampler")]
    NoRunnableSampler,

    /// An element callback returned an error
    #[error("element '{name}' ({node}) failed: {report}")]
    Element {
        /// Failing node
        node: NodeId,
        /// Display name of the failing node
        name: String,
        /// Error returned by the element
        report: eyre::Report,
    },

    /// A plan thread could not be spawned
    #[error("failed to spawn plan thread: {0}")]
    Spawn(#[from] io::Error),

    /// A plan thread panicked
    #[error("plan thread '{thread}' panicked: {message}")]
    ThreadPanicked {
        /// Thread name
        thread: String,
        /// Panic payload, when it was a string
        message: String,
    },
}

/// Errors returned synchronously by the debugger controller
#[derive(Debug, Error)]
pub enum DebuggerError {
    /// `start` was called before a sub-tree was selected
    #[error("no thread group selected")]
    NoSelection,

    /// The node does not exist in the plan
    #[error("node {0} is not part of the test plan")]
    UnknownNode(NodeId),

    /// The node is not inside a thread group
    #[error("node {0} is not inside a thread group")]
    NoThreadGroup(NodeId),

    /// The selected thread group has nothing to execute
    #[error("thread group {0} has no runnable sampler")]
    NoRunnableSampler(NodeId),

    /// The engine rejected the selected tree
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The debugger configuration is invalid
    #[error("invalid debugger configuration: {0}")]
    Config(#[from] ConfigError),

    /// The worker thread could not be spawned
    #[error("failed to spawn debugger worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Invalid debugger configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `loops` must be at least one
    #[error("loops must be at least 1")]
    ZeroLoops,

    /// The worker thread name is empty
    #[error("worker name must not be empty")]
    EmptyWorkerName,

    /// An environment override could not be parsed
    #[error("invalid value '{value}' for environment variable {var}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
