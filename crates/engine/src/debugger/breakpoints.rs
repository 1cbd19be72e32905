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

//! Breakpoint registry.

use dashmap::{mapref::entry::Entry, DashMap};
use tpd_common::NodeId;
use tracing::debug;

use crate::ExecutableUnit;

/// Set of nodes that pause execution when dispatched.
///
/// The control thread toggles entries while the worker queries them on every
/// dispatch. A toggle flips membership under the shard lock of its entry, so
/// concurrent toggles of one node never lose an update. Eligibility of a node
/// is the caller's concern.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    breakpoints: DashMap<NodeId, ()>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the breakpoint on `node` and return whether it is now set.
    pub fn toggle(&self, node: NodeId) -> bool {
        let enabled = match self.breakpoints.entry(node) {
            Entry::Occupied(entry) => {
                entry.remove();
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(());
                true
            }
        };
        debug!(%node, enabled, "breakpoint toggled");
        enabled
    }

    /// Whether `node` carries a breakpoint.
    pub fn is_set(&self, node: NodeId) -> bool {
        self.breakpoints.contains_key(&node)
    }

    /// Whether the unit's sampler or any element bundled with it carries a
    /// breakpoint.
    pub fn hits(&self, unit: &ExecutableUnit) -> bool {
        !self.breakpoints.is_empty() && unit.node_ids().any(|node| self.is_set(node))
    }

    /// Remove every breakpoint.
    pub fn clear(&self) {
        self.breakpoints.clear();
    }

    /// All breakpoints, sorted.
    pub fn all(&self) -> Vec<NodeId> {
        let mut all: Vec<NodeId> = self.breakpoints.iter().map(|entry| *entry.key()).collect();
        all.sort_unstable();
        all
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
