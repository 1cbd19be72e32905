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

//! Unit compilation.
//!
//! A thread group is flattened once into a [`Schedule`]: the [`SamplerSlot`]s
//! one iteration of a plan thread walks through, with the scoped elements of
//! each sampler resolved. Loop controllers keep their count and are repeated
//! while the slots are iterated, so a large count costs no memory.
//! Right before a slot runs, the engine asks its [`UnitCompiler`] to turn it
//! into an [`ExecutableUnit`]. The compiler is the only per-dispatch hook of
//! the engine and can be replaced through
//! [`HostEngine::set_compiler`](super::HostEngine::set_compiler).

use std::{
    collections::BTreeMap,
    ops::ControlFlow,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use auto_impl::auto_impl;
use tpd_common::{Loops, NodeId, NodeKind, PlanNode, PlanTree, RunContext};

use crate::{EngineError, ExecutableUnit};

/// Elements that apply to every sampler below the level they are attached at
#[derive(Clone, Debug, Default)]
struct Scope {
    pre_processors: Vec<Arc<PlanNode>>,
    post_processors: Vec<Arc<PlanNode>>,
    assertions: Vec<Arc<PlanNode>>,
}

impl Scope {
    /// This scope plus the scoped elements among `nodes`, appended after the
    /// ones already present.
    fn extended(&self, nodes: &[Arc<PlanNode>]) -> Self {
        let mut scope = self.clone();
        for node in nodes {
            match node.kind() {
                NodeKind::PreProcessor(_) => scope.pre_processors.push(node.clone()),
                NodeKind::PostProcessor(_) => scope.post_processors.push(node.clone()),
                NodeKind::Assertion(_) => scope.assertions.push(node.clone()),
                _ => {}
            }
        }
        scope
    }
}

/// One sampler position in a schedule
#[derive(Clone, Debug)]
pub struct SamplerSlot {
    sampler: Arc<PlanNode>,
    scope: Scope,
}

impl SamplerSlot {
    /// The sampler node.
    pub fn sampler(&self) -> &Arc<PlanNode> {
        &self.sampler
    }

    /// Pre-processors in scope, outermost first.
    pub fn pre_processors(&self) -> &[Arc<PlanNode>] {
        &self.scope.pre_processors
    }

    /// Post-processors in scope, outermost first.
    pub fn post_processors(&self) -> &[Arc<PlanNode>] {
        &self.scope.post_processors
    }

    /// Assertions in scope, outermost first.
    pub fn assertions(&self) -> &[Arc<PlanNode>] {
        &self.scope.assertions
    }
}

/// A sampler, or a loop controller body repeated `times` times
#[derive(Clone, Debug)]
enum Step {
    Sample(SamplerSlot),
    Repeat { times: u32, body: Vec<Step> },
}

/// A thread group flattened into the slots of a single iteration
#[derive(Clone, Debug)]
pub struct Schedule {
    group_id: NodeId,
    group_name: String,
    threads: u32,
    loops: Loops,
    variables: BTreeMap<String, String>,
    steps: Vec<Step>,
}

impl Schedule {
    /// Flatten `group`, which must be a thread group of `tree`.
    ///
    /// Config elements and scoped elements attached directly to the plan root
    /// apply to the group as well.
    pub fn build(tree: &PlanTree, group: &PlanNode) -> Result<Self, EngineError> {
        let NodeKind::ThreadGroup { threads, loops } = group.kind() else {
            return Err(EngineError::NoThreadGroup);
        };

        let root = tree.root();
        let mut variables = BTreeMap::new();
        for node in root.children() {
            if let NodeKind::ConfigElement(vars) = node.kind() {
                variables.extend(vars.clone());
            }
        }
        group.walk(&mut |node, _| {
            if let NodeKind::ConfigElement(vars) = node.kind() {
                variables.extend(vars.clone());
            }
        });

        let plan_scope = Scope::default().extended(root.children());
        let steps = collect_steps(group, &plan_scope);

        Ok(Self {
            group_id: group.id(),
            group_name: group.name().to_string(),
            threads: *threads,
            loops: *loops,
            variables,
            steps,
        })
    }

    /// Schedules of every thread group in the plan.
    ///
    /// Fails if the plan has no thread group or nothing to sample.
    pub fn for_plan(tree: &PlanTree) -> Result<Vec<Self>, EngineError> {
        let schedules = tree
            .thread_groups()
            .into_iter()
            .map(|group| Self::build(tree, group))
            .collect::<Result<Vec<_>, _>>()?;

        if schedules.is_empty() {
            return Err(EngineError::NoThreadGroup);
        }
        if schedules.iter().all(Schedule::is_empty) {
            return Err(EngineError::NoRunnableSampler);
        }
        Ok(schedules)
    }

    pub fn group_id(&self) -> NodeId {
        self.group_id
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// Number of threads to run.
    pub fn threads(&self) -> u32 {
        self.threads
    }

    /// Iterations per thread.
    pub fn loops(&self) -> Loops {
        self.loops
    }

    /// Variables seeded into each thread's context.
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Slots of one iteration, in execution order.
    pub fn slots(&self) -> Slots<'_> {
        Slots { stack: vec![Frame { body: &self.steps, pos: 0, passes: 1 }] }
    }

    /// Whether an iteration dispatches nothing.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of slots in one iteration, saturating at `u64::MAX`.
    pub fn slot_count(&self) -> u64 {
        count_slots(&self.steps)
    }
}

/// Loop controllers with a zero count or no sampler below them are dropped,
/// so every kept `Repeat` body yields at least one slot per pass.
fn collect_steps(node: &PlanNode, scope: &Scope) -> Vec<Step> {
    let scope = scope.extended(node.children());
    let mut steps = Vec::new();
    for child in node.children() {
        match child.kind() {
            NodeKind::Sampler(_) => steps.push(Step::Sample(SamplerSlot {
                sampler: child.clone(),
                scope: scope.extended(child.children()),
            })),
            NodeKind::SimpleController => steps.extend(collect_steps(child, &scope)),
            NodeKind::LoopController { loops } if *loops > 0 => {
                let body = collect_steps(child, &scope);
                if !body.is_empty() {
                    steps.push(Step::Repeat { times: *loops, body });
                }
            }
            _ => {}
        }
    }
    steps
}

fn count_slots(steps: &[Step]) -> u64 {
    steps.iter().fold(0u64, |total, step| {
        let count = match step {
            Step::Sample(_) => 1,
            Step::Repeat { times, body } => count_slots(body).saturating_mul(u64::from(*times)),
        };
        total.saturating_add(count)
    })
}

struct Frame<'a> {
    body: &'a [Step],
    pos: usize,
    passes: u32,
}

/// Iterator over the slots of one iteration, repeating loop bodies in place
pub struct Slots<'a> {
    stack: Vec<Frame<'a>>,
}

impl<'a> Iterator for Slots<'a> {
    type Item = &'a SamplerSlot;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let body = frame.body;
            let Some(step) = body.get(frame.pos) else {
                frame.passes -= 1;
                if frame.passes == 0 {
                    self.stack.pop();
                } else {
                    frame.pos = 0;
                }
                continue;
            };
            frame.pos += 1;
            match step {
                Step::Sample(slot) => return Some(slot),
                Step::Repeat { times, body } => {
                    self.stack.push(Frame { body, pos: 0, passes: *times });
                }
            }
        }
    }
}

/// The per-dispatch step of an engine: turns the next slot into a unit.
///
/// Returning [`ControlFlow::Break`] aborts the plan thread without executing
/// the slot.
#[auto_impl(&, Arc, Box)]
pub trait UnitCompiler: Send + Sync {
    /// Compile `slot` for the thread owning `ctx`.
    fn compile(&self, slot: &SamplerSlot, ctx: &RunContext) -> ControlFlow<(), Arc<ExecutableUnit>>;
}

/// Plain compiler used when nothing intercepts dispatch
#[derive(Debug, Default)]
pub struct TestCompiler {
    dispatched: AtomicU64,
}

impl TestCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units compiled so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl UnitCompiler for TestCompiler {
    fn compile(&self, slot: &SamplerSlot, ctx: &RunContext) -> ControlFlow<(), Arc<ExecutableUnit>> {
        let seq = self.dispatched.fetch_add(1, Ordering::Relaxed) + 1;
        ControlFlow::Continue(Arc::new(ExecutableUnit::new(
            seq,
            ctx.thread_name(),
            ctx.iteration(),
            slot.sampler.clone(),
            slot.scope.pre_processors.clone(),
            slot.scope.post_processors.clone(),
            slot.scope.assertions.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use tpd_common::SampleResult;

    use super::*;

    fn sampler(name: &'static str) -> PlanNode {
        PlanNode::sampler(name, move |_| Ok(SampleResult::success(name)))
    }

    fn names(nodes: &[Arc<PlanNode>]) -> Vec<&str> {
        nodes.iter().map(|node| node.name()).collect()
    }

    #[test]
    fn test_loop_controllers_are_expanded() {
        let group = PlanNode::thread_group("Users", 1, Loops::Finite(1))
            .with_child(sampler("a"))
            .with_child(
                PlanNode::loop_controller("twice", 2)
                    .with_child(sampler("b"))
                    .with_child(PlanNode::simple_controller("inner").with_child(sampler("c"))),
            )
            .with_child(sampler("d"));
        let tree = PlanTree::new(PlanNode::test_plan("Plan").with_child(group));

        let schedules = Schedule::for_plan(&tree).unwrap();
        assert_eq!(schedules.len(), 1);
        let order: Vec<&str> = schedules[0].slots().map(|slot| slot.sampler().name()).collect();
        assert_eq!(order, vec!["a", "b", "c", "b", "c", "d"]);
        assert_eq!(schedules[0].slot_count(), 6);
    }

    #[test]
    fn test_nested_loops_repeat_in_place() {
        let group = PlanNode::thread_group("Users", 1, Loops::Finite(1)).with_child(
            PlanNode::loop_controller("outer", 2)
                .with_child(sampler("x"))
                .with_child(PlanNode::loop_controller("inner", 3).with_child(sampler("y")))
                .with_child(PlanNode::loop_controller("never", 0).with_child(sampler("z")))
                .with_child(PlanNode::loop_controller("hollow", 5)),
        );
        let tree = PlanTree::new(PlanNode::test_plan("Plan").with_child(group));

        let schedule = Schedule::build(&tree, tree.thread_groups()[0]).unwrap();
        let order: Vec<&str> = schedule.slots().map(|slot| slot.sampler().name()).collect();
        assert_eq!(order, vec!["x", "y", "y", "y", "x", "y", "y", "y"]);
        assert_eq!(schedule.slot_count(), 8);
    }

    #[test]
    fn test_huge_loop_count_is_not_materialized() {
        let group = PlanNode::thread_group("Users", 1, Loops::Finite(1)).with_child(
            PlanNode::loop_controller("huge", u32::MAX)
                .with_child(PlanNode::loop_controller("huger", u32::MAX).with_child(sampler("a")))
                .with_child(sampler("b")),
        );
        let tree = PlanTree::new(PlanNode::test_plan("Plan").with_child(group));

        let schedule = Schedule::build(&tree, tree.thread_groups()[0]).unwrap();
        assert!(!schedule.is_empty());
        assert_eq!(schedule.slot_count(), u64::MAX);
        let head: Vec<&str> = schedule.slots().take(3).map(|slot| slot.sampler().name()).collect();
        assert_eq!(head, vec!["a", "a", "a"]);
    }

    #[test]
    fn test_loops_without_samplers_leave_schedule_empty() {
        let group = PlanNode::thread_group("Users", 1, Loops::Finite(1))
            .with_child(PlanNode::loop_controller("hollow", u32::MAX))
            .with_child(PlanNode::loop_controller("skipped", 0).with_child(sampler("a")));
        let tree = PlanTree::new(PlanNode::test_plan("Plan").with_child(group));

        assert!(Schedule::build(&tree, tree.thread_groups()[0]).unwrap().is_empty());
        assert!(matches!(Schedule::for_plan(&tree), Err(EngineError::NoRunnableSampler)));
    }

    #[test]
    fn test_scoped_elements_are_ordered_outer_first() {
        let target = sampler("target")
            .with_child(PlanNode::pre_processor("pre-sampler", |_| Ok(())))
            .with_child(PlanNode::assertion("assert-sampler", |_, _| None));
        let group = PlanNode::thread_group("Users", 2, Loops::Finite(3))
            .with_child(PlanNode::pre_processor("pre-group", |_| Ok(())))
            .with_child(PlanNode::post_processor("post-group", |_| Ok(())))
            .with_child(PlanNode::simple_controller("ctrl").with_child(target))
            .with_child(PlanNode::config_element("group-vars", [("user", "alice")]));
        let plan = PlanNode::test_plan("Plan")
            .with_child(PlanNode::pre_processor("pre-plan", |_| Ok(())))
            .with_child(PlanNode::config_element("plan-vars", [("host", "localhost")]))
            .with_child(group);
        let tree = PlanTree::new(plan);

        let schedule = Schedule::build(&tree, tree.thread_groups()[0]).unwrap();
        assert_eq!(schedule.threads(), 2);
        assert_eq!(schedule.loops(), Loops::Finite(3));
        assert_eq!(schedule.variables().get("host").map(String::as_str), Some("localhost"));
        assert_eq!(schedule.variables().get("user").map(String::as_str), Some("alice"));

        let slot = schedule.slots().next().unwrap();
        assert_eq!(names(slot.pre_processors()), vec!["pre-plan", "pre-group", "pre-sampler"]);
        assert_eq!(names(slot.post_processors()), vec!["post-group"]);
        assert_eq!(names(slot.assertions()), vec!["assert-sampler"]);
    }

    #[test]
    fn test_plan_without_samplers_is_rejected() {
        let empty = PlanTree::new(PlanNode::test_plan("Plan"));
        assert!(matches!(Schedule::for_plan(&empty), Err(EngineError::NoThreadGroup)));

        let idle = PlanTree::new(
            PlanNode::test_plan("Plan").with_child(PlanNode::thread_group("Idle", 1, Loops::Finite(1))),
        );
        assert!(matches!(Schedule::for_plan(&idle), Err(EngineError::NoRunnableSampler)));
    }

    #[test]
    fn test_compiler_numbers_units() {
        let tree = PlanTree::new(
            PlanNode::test_plan("Plan").with_child(
                PlanNode::thread_group("Users", 1, Loops::Finite(1)).with_child(sampler("only")),
            ),
        );
        let schedule = Schedule::build(&tree, tree.thread_groups()[0]).unwrap();
        let compiler = TestCompiler::new();
        let mut ctx = RunContext::new("Users 1-1", 1);
        ctx.set_iteration(4);

        let slot = schedule.slots().next().unwrap();
        let first = compiler.compile(slot, &ctx);
        let second = compiler.compile(slot, &ctx);
        let (ControlFlow::Continue(first), ControlFlow::Continue(second)) = (first, second) else {
            panic!("plain compiler never aborts");
        };

        assert_eq!((first.seq(), second.seq()), (1, 2));
        assert_eq!(first.iteration(), 4);
        assert_eq!(first.thread_name(), "Users 1-1");
        assert_eq!(first.node_ids().count(), 1);
        assert_eq!(compiler.dispatched(), 2);
    }
}
