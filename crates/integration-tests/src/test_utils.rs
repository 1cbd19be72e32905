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

//! Test utilities for integration tests

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging for a test
    pub fn init_test_environment() {
        tpd_common::logging::ensure_test_logging(None);
    }
}

/// Observers recording what a debugger reports
pub mod recorders {
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    use parking_lot::{Condvar, Mutex, RwLock};
    use tpd_common::{NodeId, RunContext, SampleResult};
    use tpd_engine::{DebuggerFrontend, ExecutableUnit, SampleListener, StepTrigger, StopReason};

    /// One frontend notification
    #[derive(Clone, Debug, PartialEq)]
    pub enum FrontendEvent {
        /// `started()`
        Started,
        /// `stopped(reason)`
        Stopped(StopReason),
        /// `continuing()`
        Continuing,
        /// `frozen_at(unit)`, identified by its sampler
        FrozenAt(NodeId),
        /// `status_refresh(ctx)` with a JSON snapshot of the context
        StatusRefresh(serde_json::Value),
    }

    type FrozenHook = Box<dyn Fn(&ExecutableUnit) + Send + Sync>;

    /// Frontend that records every notification in order.
    ///
    /// A hook installed with [`on_frozen`](Self::on_frozen) runs inside
    /// `frozen_at`, on the debugger worker.
    #[derive(Default)]
    pub struct RecordingFrontend {
        events: Mutex<Vec<FrontendEvent>>,
        changed: Condvar,
        on_frozen: RwLock<Option<FrozenHook>>,
    }

    impl RecordingFrontend {
        /// Create an empty recorder
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Run `hook` on every `frozen_at`
        pub fn on_frozen(&self, hook: impl Fn(&ExecutableUnit) + Send + Sync + 'static) {
            *self.on_frozen.write() = Some(Box::new(hook));
        }

        /// Recorded events
        pub fn events(&self) -> Vec<FrontendEvent> {
            self.events.lock().clone()
        }

        /// Recorded events without status refreshes
        pub fn control_events(&self) -> Vec<FrontendEvent> {
            self.events
                .lock()
                .iter()
                .filter(|event| !matches!(event, FrontendEvent::StatusRefresh(_)))
                .cloned()
                .collect()
        }

        /// Number of recorded events matching `predicate`
        pub fn count(&self, predicate: impl Fn(&FrontendEvent) -> bool) -> usize {
            self.events.lock().iter().filter(|event| predicate(event)).count()
        }

        /// Samplers reported by `frozen_at`, in order
        pub fn frozen_nodes(&self) -> Vec<NodeId> {
            self.events
                .lock()
                .iter()
                .filter_map(|event| match event {
                    FrontendEvent::FrozenAt(node) => Some(*node),
                    _ => None,
                })
                .collect()
        }

        /// Reasons reported by `stopped`
        pub fn stop_reasons(&self) -> Vec<StopReason> {
            self.events
                .lock()
                .iter()
                .filter_map(|event| match event {
                    FrontendEvent::Stopped(reason) => Some(reason.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Wait until the recorded events satisfy `predicate`. False on timeout.
        pub fn wait_for(
            &self,
            predicate: impl Fn(&[FrontendEvent]) -> bool,
            timeout: Duration,
        ) -> bool {
            let deadline = Instant::now() + timeout;
            let mut events = self.events.lock();
            while !predicate(&events) {
                if self.changed.wait_until(&mut events, deadline).timed_out() {
                    return predicate(&events);
                }
            }
            true
        }

        /// Wait until at least `n` events match `predicate`. False on timeout.
        pub fn wait_for_count(
            &self,
            predicate: impl Fn(&FrontendEvent) -> bool,
            n: usize,
            timeout: Duration,
        ) -> bool {
            self.wait_for(|events| events.iter().filter(|event| predicate(event)).count() >= n, timeout)
        }

        fn push(&self, event: FrontendEvent) {
            self.events.lock().push(event);
            self.changed.notify_all();
        }
    }

    impl DebuggerFrontend for RecordingFrontend {
        fn started(&self) {
            self.push(FrontendEvent::Started);
        }

        fn stopped(&self, reason: &StopReason) {
            self.push(FrontendEvent::Stopped(reason.clone()));
        }

        fn continuing(&self) {
            self.push(FrontendEvent::Continuing);
        }

        fn frozen_at(&self, unit: &ExecutableUnit) {
            self.push(FrontendEvent::FrozenAt(unit.sampler_id()));
            if let Some(hook) = self.on_frozen.read().as_ref() {
                hook(unit);
            }
        }

        fn status_refresh(&self, ctx: &RunContext) {
            self.push(FrontendEvent::StatusRefresh(ctx.snapshot_json()));
        }
    }

    /// Step trigger recording the sampler of every dispatched unit
    #[derive(Default)]
    pub struct CountingStepper {
        units: Mutex<Vec<NodeId>>,
    }

    impl CountingStepper {
        /// Create an empty stepper
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Number of units seen
        pub fn count(&self) -> usize {
            self.units.lock().len()
        }

        /// Samplers of the units seen, in dispatch order
        pub fn sequence(&self) -> Vec<NodeId> {
            self.units.lock().clone()
        }
    }

    impl StepTrigger for CountingStepper {
        fn notify(&self, unit: &ExecutableUnit) {
            self.units.lock().push(unit.sampler_id());
        }
    }

    /// Sample listener recording every executed sampler
    #[derive(Default)]
    pub struct ExecutionLog {
        samples: Mutex<Vec<(NodeId, bool)>>,
    }

    impl ExecutionLog {
        /// Create an empty log
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Executed samplers, in order
        pub fn executed(&self) -> Vec<NodeId> {
            self.samples.lock().iter().map(|(node, _)| *node).collect()
        }

        /// Number of executed samples
        pub fn len(&self) -> usize {
            self.samples.lock().len()
        }

        /// Whether nothing was executed
        pub fn is_empty(&self) -> bool {
            self.samples.lock().is_empty()
        }

        /// Number of failed samples
        pub fn failures(&self) -> usize {
            self.samples.lock().iter().filter(|(_, success)| !success).count()
        }
    }

    impl SampleListener for ExecutionLog {
        fn sample_occurred(&self, unit: &ExecutableUnit, result: &SampleResult) {
            self.samples.lock().push((unit.sampler_id(), result.is_success()));
        }
    }
}

/// Test-plan fixtures
pub mod plans {
    use tpd_common::{Loops, NodeId, PlanNode, PlanTree, SampleResult};

    /// A plan together with the identities tests refer to
    pub struct PlanFixture {
        /// The full plan
        pub tree: PlanTree,
        /// The thread group to debug
        pub group: NodeId,
        /// Samplers of that thread group, in plan order
        pub samplers: Vec<NodeId>,
    }

    fn ok_sampler(name: &str) -> PlanNode {
        let label = name.to_string();
        PlanNode::sampler(name, move |_| Ok(SampleResult::success(label.clone())))
    }

    /// One thread group with three samplers in a row.
    pub fn three_samplers() -> PlanFixture {
        let samplers = [ok_sampler("sampler 1"), ok_sampler("sampler 2"), ok_sampler("sampler 3")];
        let ids = samplers.iter().map(PlanNode::id).collect();
        let group = PlanNode::thread_group("Users", 10, Loops::Finite(5)).with_children(samplers);
        let group_id = group.id();
        let tree = PlanTree::new(PlanNode::test_plan("Three samplers").with_child(group));
        PlanFixture { tree, group: group_id, samplers: ids }
    }

    /// A plan exercising controllers, scoped elements, plan-level config, a
    /// workbench and a second thread group.
    ///
    /// The debugged group runs `login`, then `browse` twice inside a loop
    /// controller, then `logout` inside a simple controller.
    pub fn shop_plan() -> PlanFixture {
        let login = PlanNode::sampler("login", |ctx| {
            let user = ctx.substitute("${user}");
            ctx.set_variable("session", format!("{user}-session"));
            Ok(SampleResult::success("login"))
        })
        .with_child(PlanNode::assertion("has session", |ctx, _| {
            ctx.variable("session").is_none().then(|| "no session".to_string())
        }));
        let browse = PlanNode::sampler("browse", |ctx| {
            let pages = ctx.variable("pages").and_then(|p| p.parse::<u32>().ok()).unwrap_or(0);
            ctx.set_variable("pages", (pages + 1).to_string());
            Ok(SampleResult::success("browse"))
        });
        let logout = ok_sampler("logout");
        let ids = vec![login.id(), browse.id(), logout.id()];

        let group = PlanNode::thread_group("Shoppers", 25, Loops::Forever)
            .with_child(PlanNode::pre_processor("mark", |ctx| {
                ctx.set_variable("marked", "yes");
                Ok(())
            }))
            .with_child(login)
            .with_child(PlanNode::loop_controller("browse twice", 2).with_child(browse))
            .with_child(PlanNode::simple_controller("leave").with_child(logout));
        let group_id = group.id();

        let admins = PlanNode::thread_group("Admins", 2, Loops::Finite(1)).with_child(ok_sampler("audit"));
        let plan = PlanNode::test_plan("Shop")
            .with_child(PlanNode::config_element("defaults", [("user", "alice")]))
            .with_child(admins)
            .with_child(group)
            .with_child(PlanNode::workbench("scratch").with_child(ok_sampler("draft")));

        PlanFixture { tree: PlanTree::new(plan), group: group_id, samplers: ids }
    }

    /// A thread group looping forever over one sampler.
    pub fn endless_plan() -> PlanFixture {
        let sampler = PlanNode::sampler("tick", |ctx| {
            let ticks = ctx.variable("ticks").and_then(|t| t.parse::<u64>().ok()).unwrap_or(0);
            ctx.set_variable("ticks", (ticks + 1).to_string());
            Ok(SampleResult::success("tick"))
        });
        let ids = vec![sampler.id()];
        let group = PlanNode::thread_group("Ticker", 1, Loops::Forever).with_child(sampler);
        let group_id = group.id();
        let tree = PlanTree::new(PlanNode::test_plan("Endless").with_child(group));
        PlanFixture { tree, group: group_id, samplers: ids }
    }

    /// A thread group whose only sampler sits in a loop controller with the
    /// largest possible count.
    pub fn huge_loop_plan() -> PlanFixture {
        let sampler = ok_sampler("poll");
        let ids = vec![sampler.id()];
        let group = PlanNode::thread_group("Pollers", 1, Loops::Finite(1))
            .with_child(PlanNode::loop_controller("poll forever", u32::MAX).with_child(sampler));
        let group_id = group.id();
        let tree = PlanTree::new(PlanNode::test_plan("Huge loop").with_child(group));
        PlanFixture { tree, group: group_id, samplers: ids }
    }

    /// Two samplers, the second failing with an error.
    pub fn failing_plan() -> PlanFixture {
        let first = ok_sampler("first");
        let broken =
            PlanNode::sampler("broken", |_| Err(eyre::eyre!("connection refused by target")));
        let ids = vec![first.id(), broken.id()];
        let group = PlanNode::thread_group("Users", 1, Loops::Finite(1))
            .with_child(first)
            .with_child(broken);
        let group_id = group.id();
        let tree = PlanTree::new(PlanNode::test_plan("Failing").with_child(group));
        PlanFixture { tree, group: group_id, samplers: ids }
    }

    /// One sampler that panics.
    pub fn panicking_plan() -> PlanFixture {
        let sampler = PlanNode::sampler("explode", |_| panic!("sampler exploded"));
        let ids = vec![sampler.id()];
        let group = PlanNode::thread_group("Users", 1, Loops::Finite(1)).with_child(sampler);
        let group_id = group.id();
        let tree = PlanTree::new(PlanNode::test_plan("Panicking").with_child(group));
        PlanFixture { tree, group: group_id, samplers: ids }
    }
}

/// Debugger construction helpers
pub mod debugger {
    use std::sync::Arc;

    use tpd_engine::{Debugger, DebuggerConfig};

    use super::{plans::PlanFixture, recorders::RecordingFrontend};

    /// A debugger over `fixture` with its thread group already selected.
    pub fn selected_debugger(
        fixture: &PlanFixture,
        config: DebuggerConfig,
    ) -> (Arc<Debugger>, Arc<RecordingFrontend>) {
        let frontend = RecordingFrontend::new();
        let debugger = Arc::new(Debugger::new(
            Arc::new(fixture.tree.clone()),
            frontend.clone(),
            config,
        ));
        debugger.select_subtree(fixture.group).unwrap();
        (debugger, frontend)
    }

    /// Make `frozen_at` resume the run right away.
    pub fn resume_on_freeze(debugger: &Arc<Debugger>, frontend: &RecordingFrontend) {
        let weak = Arc::downgrade(debugger);
        frontend.on_frozen(move |_| {
            if let Some(debugger) = weak.upgrade() {
                debugger.continue_run();
            }
        });
    }
}
