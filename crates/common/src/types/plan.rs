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

//! Hierarchical test-plan tree.
//!
//! A plan is a tree of [`PlanNode`]s. Every node receives a fresh [`NodeId`]
//! when it is built; cloning a node or a whole [`PlanTree`] keeps the
//! identities, so a breakpoint set on a node of the full plan still matches
//! the same node in any sub-tree selected from it.
//!
//! Whether a node may carry a breakpoint is decided once, from its type, when
//! the node is created ([`PlanNode::is_breakpoint_eligible`]).

use std::{collections::BTreeMap, fmt, sync::Arc};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::{macros::universal_id, RunContext, SampleResult};

universal_id! {
    /// Stable identity of a [`PlanNode`].
    NodeId => 1
}

/// Type tag of a plan node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum NodeType {
    /// Root of a plan
    #[display("test plan")]
    TestPlan,
    /// Scratch area that is never executed
    #[display("workbench")]
    WorkBench,
    /// A group of threads running its children
    #[display("thread group")]
    ThreadGroup,
    /// Logic controller (simple or loop)
    #[display("controller")]
    Controller,
    /// Element producing a sample
    #[display("sampler")]
    Sampler,
    /// Element running before a sampler
    #[display("pre-processor")]
    PreProcessor,
    /// Element running after a sampler
    #[display("post-processor")]
    PostProcessor,
    /// Element checking a sample result
    #[display("assertion")]
    Assertion,
    /// Element contributing variables to the run context
    #[display("config element")]
    ConfigElement,
}

impl NodeType {
    /// Whether nodes of this type can carry a breakpoint.
    pub const fn is_breakpoint_eligible(self) -> bool {
        !matches!(self, Self::TestPlan | Self::WorkBench | Self::ThreadGroup | Self::ConfigElement)
    }
}

/// Iteration count of a thread group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loops {
    /// Run the children this many times
    Finite(u32),
    /// Run until stopped
    Forever,
}

/// Sampler behaviour.
pub type SamplerFn = Arc<dyn Fn(&mut RunContext) -> eyre::Result<SampleResult> + Send + Sync>;
/// Pre- and post-processor behaviour.
pub type ProcessorFn = Arc<dyn Fn(&mut RunContext) -> eyre::Result<()> + Send + Sync>;
/// Assertion behaviour. Returns a failure message when the assertion does not hold.
pub type AssertionFn = Arc<dyn Fn(&RunContext, &SampleResult) -> Option<String> + Send + Sync>;

/// What a node is and, for executable elements, what it does
#[derive(Clone)]
pub enum NodeKind {
    /// Plan root
    TestPlan,
    /// Never-executed scratch area
    WorkBench,
    /// Thread group
    ThreadGroup {
        /// Number of threads
        threads: u32,
        /// Iterations per thread
        loops: Loops,
    },
    /// Transparent grouping controller
    SimpleController,
    /// Controller repeating its children
    LoopController {
        /// Number of repetitions
        loops: u32,
    },
    /// Sampler
    Sampler(SamplerFn),
    /// Pre-processor
    PreProcessor(ProcessorFn),
    /// Post-processor
    PostProcessor(ProcessorFn),
    /// Assertion
    Assertion(AssertionFn),
    /// Variables applied to the run context when a thread starts
    ConfigElement(BTreeMap<String, String>),
}

impl NodeKind {
    /// The type tag of this kind.
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::TestPlan => NodeType::TestPlan,
            Self::WorkBench => NodeType::WorkBench,
            Self::ThreadGroup { .. } => NodeType::ThreadGroup,
            Self::SimpleController | Self::LoopController { .. } => NodeType::Controller,
            Self::Sampler(_) => NodeType::Sampler,
            Self::PreProcessor(_) => NodeType::PreProcessor,
            Self::PostProcessor(_) => NodeType::PostProcessor,
            Self::Assertion(_) => NodeType::Assertion,
            Self::ConfigElement(_) => NodeType::ConfigElement,
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadGroup { threads, loops } => f
                .debug_struct("ThreadGroup")
                .field("threads", threads)
                .field("loops", loops)
                .finish(),
            Self::LoopController { loops } => {
                f.debug_struct("LoopController").field("loops", loops).finish()
            }
            Self::ConfigElement(vars) => f.debug_tuple("ConfigElement").field(vars).finish(),
            other => write!(f, "{:?}", other.node_type()),
        }
    }
}

/// A node of the test-plan tree
#[derive(Clone, Debug)]
pub struct PlanNode {
    id: NodeId,
    name: String,
    kind: NodeKind,
    breakpoint_eligible: bool,
    children: Vec<Arc<PlanNode>>,
}

impl PlanNode {
    /// Create a node with a fresh identity and no children.
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        let breakpoint_eligible = kind.node_type().is_breakpoint_eligible();
        Self { id: NodeId::next(), name: name.into(), kind, breakpoint_eligible, children: vec![] }
    }

    /// Plan root.
    pub fn test_plan(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::TestPlan)
    }

    /// Workbench.
    pub fn workbench(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::WorkBench)
    }

    /// Thread group.
    pub fn thread_group(name: impl Into<String>, threads: u32, loops: Loops) -> Self {
        Self::new(name, NodeKind::ThreadGroup { threads, loops })
    }

    /// Simple controller.
    pub fn simple_controller(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::SimpleController)
    }

    /// Loop controller.
    pub fn loop_controller(name: impl Into<String>, loops: u32) -> Self {
        Self::new(name, NodeKind::LoopController { loops })
    }

    /// Sampler.
    pub fn sampler<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut RunContext) -> eyre::Result<SampleResult> + Send + Sync + 'static,
    {
        Self::new(name, NodeKind::Sampler(Arc::new(f)))
    }

    /// Pre-processor.
    pub fn pre_processor<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut RunContext) -> eyre::Result<()> + Send + Sync + 'static,
    {
        Self::new(name, NodeKind::PreProcessor(Arc::new(f)))
    }

    /// Post-processor.
    pub fn post_processor<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut RunContext) -> eyre::Result<()> + Send + Sync + 'static,
    {
        Self::new(name, NodeKind::PostProcessor(Arc::new(f)))
    }

    /// Assertion.
    pub fn assertion<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&RunContext, &SampleResult) -> Option<String> + Send + Sync + 'static,
    {
        Self::new(name, NodeKind::Assertion(Arc::new(f)))
    }

    /// Config element holding user-defined variables.
    pub fn config_element<I, K, V>(name: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self::new(name, NodeKind::ConfigElement(vars))
    }

    /// Append a child.
    pub fn with_child(mut self, child: impl Into<Arc<Self>>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several children, in order.
    pub fn with_children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        self.children.extend(children.into_iter().map(Arc::new));
        self
    }

    /// A copy of this node with the same identity and name but a different
    /// kind and child list.
    pub fn reshaped(&self, kind: NodeKind, children: Vec<Arc<Self>>) -> Self {
        let breakpoint_eligible = kind.node_type().is_breakpoint_eligible();
        Self { id: self.id, name: self.name.clone(), kind, breakpoint_eligible, children }
    }

    /// Stable identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind and behaviour.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Type tag.
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Whether a breakpoint may be offered on this node.
    pub fn is_breakpoint_eligible(&self) -> bool {
        self.breakpoint_eligible
    }

    /// Ordered children.
    pub fn children(&self) -> &[Arc<Self>] {
        &self.children
    }

    /// Find a node in this sub-tree (including `self`).
    pub fn find(&self, id: NodeId) -> Option<&Self> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Nodes from `self` down to the node with `id`, both ends included.
    pub fn path_to(&self, id: NodeId) -> Option<Vec<&Self>> {
        fn descend<'a>(node: &'a PlanNode, id: NodeId, path: &mut Vec<&'a PlanNode>) -> bool {
            path.push(node);
            if node.id == id || node.children.iter().any(|child| descend(child, id, path)) {
                return true;
            }
            path.pop();
            false
        }

        let mut path = Vec::new();
        descend(self, id, &mut path).then_some(path)
    }

    /// Visit this sub-tree in pre-order together with each node's depth.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self, usize)) {
        fn go<'a>(node: &'a PlanNode, depth: usize, visit: &mut impl FnMut(&'a PlanNode, usize)) {
            visit(node, depth);
            for child in &node.children {
                go(child, depth + 1, visit);
            }
        }
        go(self, 0, visit);
    }
}

/// A complete plan tree
#[derive(Clone, Debug)]
pub struct PlanTree {
    root: Arc<PlanNode>,
}

impl PlanTree {
    /// Wrap a root node.
    pub fn new(root: impl Into<Arc<PlanNode>>) -> Self {
        Self { root: root.into() }
    }

    /// Root node.
    pub fn root(&self) -> &Arc<PlanNode> {
        &self.root
    }

    /// Find a node by identity.
    pub fn find(&self, id: NodeId) -> Option<&PlanNode> {
        self.root.find(id)
    }

    /// Whether the tree contains a node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Nodes from the root down to `id`.
    pub fn path_to(&self, id: NodeId) -> Option<Vec<&PlanNode>> {
        self.root.path_to(id)
    }

    /// All thread groups, in plan order.
    pub fn thread_groups(&self) -> Vec<&PlanNode> {
        let mut groups = Vec::new();
        self.root.walk(&mut |node, _| {
            if node.node_type() == NodeType::ThreadGroup {
                groups.push(node);
            }
        });
        groups
    }

    /// Whether the node exists and may carry a breakpoint.
    pub fn is_breakpoint_eligible(&self, id: NodeId) -> bool {
        self.find(id).is_some_and(PlanNode::is_breakpoint_eligible)
    }

    /// Identities of all nodes, in pre-order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.root.walk(&mut |node, _| ids.push(node.id()));
        ids
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.root.walk(&mut |_, _| count += 1);
        count
    }

    /// Always false: a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for PlanTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = Ok(());
        self.root.walk(&mut |node, depth| {
            if result.is_ok() {
                result = writeln!(
                    f,
                    "{:indent$}{} [{}] {}",
                    "",
                    node.name(),
                    node.node_type(),
                    node.id(),
                    indent = depth * 2
                );
            }
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (PlanTree, NodeId, NodeId, NodeId) {
        let sampler = PlanNode::sampler("GET /", |_| Ok(SampleResult::success("GET /")));
        let sampler_id = sampler.id();
        let group = PlanNode::thread_group("Users", 1, Loops::Finite(1))
            .with_child(PlanNode::config_element("vars", [("host", "localhost")]))
            .with_child(sampler);
        let group_id = group.id();
        let plan = PlanNode::test_plan("Plan").with_child(group);
        let plan_id = plan.id();
        (PlanTree::new(plan), plan_id, group_id, sampler_id)
    }

    #[test]
    fn test_node_ids_are_unique_and_stable_across_clones() {
        let (tree, plan_id, group_id, sampler_id) = sample_tree();
        assert_ne!(plan_id, group_id);
        assert_ne!(group_id, sampler_id);

        let copy = tree.clone();
        assert_eq!(copy.node_ids(), tree.node_ids());
        assert_eq!(copy.find(sampler_id).map(PlanNode::name), Some("GET /"));
    }

    #[test]
    fn test_breakpoint_eligibility_is_computed_from_type() {
        let (tree, plan_id, group_id, sampler_id) = sample_tree();
        assert!(!tree.is_breakpoint_eligible(plan_id));
        assert!(!tree.is_breakpoint_eligible(group_id));
        assert!(tree.is_breakpoint_eligible(sampler_id));

        let config_id = tree.find(group_id).unwrap().children()[0].id();
        assert!(!tree.is_breakpoint_eligible(config_id));
        assert!(!tree.is_breakpoint_eligible(NodeId::from(u64::MAX)));

        assert!(PlanNode::loop_controller("loop", 2).is_breakpoint_eligible());
        assert!(PlanNode::assertion("check", |_, _| None).is_breakpoint_eligible());
        assert!(!PlanNode::workbench("bench").is_breakpoint_eligible());
    }

    #[test]
    fn test_path_to_includes_both_ends() {
        let (tree, plan_id, group_id, sampler_id) = sample_tree();
        let path: Vec<NodeId> = tree.path_to(sampler_id).unwrap().iter().map(|n| n.id()).collect();
        assert_eq!(path, vec![plan_id, group_id, sampler_id]);

        assert_eq!(tree.path_to(plan_id).unwrap().len(), 1);
        assert!(tree.path_to(NodeId::from(u64::MAX)).is_none());
    }

    #[test]
    fn test_reshaped_keeps_identity() {
        let (tree, _, group_id, _) = sample_tree();
        let group = tree.find(group_id).unwrap();
        let single = group.reshaped(
            NodeKind::ThreadGroup { threads: 1, loops: Loops::Finite(3) },
            group.children().to_vec(),
        );

        assert_eq!(single.id(), group_id);
        assert_eq!(single.name(), "Users");
        assert_eq!(single.children().len(), 2);
        assert!(matches!(
            single.kind(),
            NodeKind::ThreadGroup { threads: 1, loops: Loops::Finite(3) }
        ));
    }

    #[test]
    fn test_tree_outline() {
        let (tree, ..) = sample_tree();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.thread_groups().len(), 1);

        let outline = tree.to_string();
        let lines: Vec<&str> = outline.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Plan [test plan]"));
        assert!(lines[1].starts_with("  Users [thread group]"));
        assert!(lines[3].starts_with("    GET / [sampler]"));
    }
}
