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

//! Executable units.
//!
//! An [`ExecutableUnit`] is what the engine is about to run for one sampler
//! dispatch: the sampler itself bundled with every pre-processor,
//! post-processor and assertion in its scope. Units are produced by a
//! [`UnitCompiler`](super::UnitCompiler) right before execution and are
//! discarded afterwards.

use std::{fmt, sync::Arc};

use tpd_common::{NodeId, PlanNode};

/// A sampler together with the elements in its scope, ready to run
#[derive(Clone, Debug)]
pub struct ExecutableUnit {
    seq: u64,
    thread_name: String,
    iteration: u64,
    sampler: Arc<PlanNode>,
    pre_processors: Vec<Arc<PlanNode>>,
    post_processors: Vec<Arc<PlanNode>>,
    assertions: Vec<Arc<PlanNode>>,
}

impl ExecutableUnit {
    /// Bundle a sampler with its scoped elements.
    pub fn new(
        seq: u64,
        thread_name: impl Into<String>,
        iteration: u64,
        sampler: Arc<PlanNode>,
        pre_processors: Vec<Arc<PlanNode>>,
        post_processors: Vec<Arc<PlanNode>>,
        assertions: Vec<Arc<PlanNode>>,
    ) -> Self {
        Self {
            seq,
            thread_name: thread_name.into(),
            iteration,
            sampler,
            pre_processors,
            post_processors,
            assertions,
        }
    }

    /// Dispatch sequence number, starting at 1 for each compiler.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Name of the plan thread the unit was compiled for.
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Thread-group iteration the unit belongs to.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The sampler node.
    pub fn sampler(&self) -> &Arc<PlanNode> {
        &self.sampler
    }

    /// Identity of the sampler node.
    pub fn sampler_id(&self) -> NodeId {
        self.sampler.id()
    }

    pub fn pre_processors(&self) -> &[Arc<PlanNode>] {
        &self.pre_processors
    }

    pub fn post_processors(&self) -> &[Arc<PlanNode>] {
        &self.post_processors
    }

    pub fn assertions(&self) -> &[Arc<PlanNode>] {
        &self.assertions
    }

    /// Every node bundled in the unit, sampler first.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(&self.sampler)
            .chain(&self.pre_processors)
            .chain(&self.post_processors)
            .chain(&self.assertions)
            .map(|node| node.id())
    }
}

impl fmt::Display for ExecutableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} '{}' {} (thread {}, iteration {})",
            self.seq,
            self.sampler.name(),
            self.sampler.id(),
            self.thread_name,
            self.iteration
        )
    }
}
