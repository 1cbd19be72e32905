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

//! Plan threads.

use std::{
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use auto_impl::auto_impl;
use derive_more::Display;
use tpd_common::{Loops, NodeKind, PlanNode, RunContext, SampleResult};
use tracing::{debug, trace};

use crate::{EngineError, ExecutableUnit, Schedule, UnitCompiler};

/// How a plan thread ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum RunOutcome {
    /// Every iteration ran to the end
    #[display("completed")]
    Completed,
    /// The engine's running flag was cleared
    #[display("stopped")]
    Stopped,
    /// The compiler refused to dispatch the next unit
    #[display("aborted")]
    Aborted,
}

/// Receives every sample result produced by a plan thread
#[auto_impl(&, Arc, Box)]
pub trait SampleListener: Send + Sync {
    /// Called on the plan thread once the unit's assertions have run.
    fn sample_occurred(&self, unit: &ExecutableUnit, result: &SampleResult);
}

/// One thread of a thread group, walking its schedule
pub struct PlanThread {
    name: String,
    number: u32,
    schedule: Arc<Schedule>,
    compiler: Arc<dyn UnitCompiler>,
    running: Arc<AtomicBool>,
    listeners: Vec<Arc<dyn SampleListener>>,
}

impl PlanThread {
    /// Create thread `number` (1-based) of the `group_index`-th thread group.
    pub fn new(
        schedule: Arc<Schedule>,
        group_index: usize,
        number: u32,
        compiler: Arc<dyn UnitCompiler>,
        running: Arc<AtomicBool>,
        listeners: Vec<Arc<dyn SampleListener>>,
    ) -> Self {
        let name = format!("{} {group_index}-{number}", schedule.group_name());
        Self { name, number, schedule, compiler, running, listeners }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A fresh context for this thread, seeded with the schedule's variables.
    pub fn new_context(&self) -> RunContext {
        let mut ctx = RunContext::new(&self.name, self.number);
        for (name, value) in self.schedule.variables() {
            ctx.set_variable(name, value);
        }
        ctx
    }

    /// Run the schedule to the end on the calling thread.
    pub fn run(&self, ctx: &mut RunContext) -> Result<RunOutcome, EngineError> {
        if self.schedule.is_empty() {
            return Ok(RunOutcome::Completed);
        }

        debug!(thread = %self.name, loops = ?self.schedule.loops(), "plan thread started");
        let mut iteration = 0u64;
        loop {
            if let Loops::Finite(loops) = self.schedule.loops() {
                if iteration >= u64::from(loops) {
                    break;
                }
            }
            ctx.set_iteration(iteration);

            for slot in self.schedule.slots() {
                if !self.running.load(Ordering::Acquire) {
                    debug!(thread = %self.name, "plan thread stopped");
                    return Ok(RunOutcome::Stopped);
                }
                let unit = match self.compiler.compile(slot, ctx) {
                    ControlFlow::Continue(unit) => unit,
                    ControlFlow::Break(()) => {
                        debug!(thread = %self.name, node = %slot.sampler().id(), "dispatch aborted");
                        return Ok(RunOutcome::Aborted);
                    }
                };
                self.execute(&unit, ctx)?;
            }
            iteration += 1;
        }

        debug!(thread = %self.name, iterations = iteration, "plan thread completed");
        Ok(RunOutcome::Completed)
    }

    /// Pre-processors, sampler, post-processors, then assertions.
    fn execute(&self, unit: &ExecutableUnit, ctx: &mut RunContext) -> Result<(), EngineError> {
        ctx.set_current_sampler(Some(unit.sampler().name().to_string()));

        for pre in unit.pre_processors() {
            if let NodeKind::PreProcessor(f) = pre.kind() {
                f(&mut *ctx).map_err(|report| element_error(pre, report))?;
            }
        }

        let NodeKind::Sampler(sample) = unit.sampler().kind() else {
            return Ok(());
        };
        let started = Instant::now();
        let mut result = sample(&mut *ctx).map_err(|report| element_error(unit.sampler(), report))?;
        if result.elapsed().is_zero() {
            result = result.with_elapsed(started.elapsed());
        }

        for post in unit.post_processors() {
            if let NodeKind::PostProcessor(f) = post.kind() {
                f(&mut *ctx).map_err(|report| element_error(post, report))?;
            }
        }

        for assertion in unit.assertions() {
            if let NodeKind::Assertion(check) = assertion.kind() {
                if let Some(message) = check(&*ctx, &result) {
                    result.fail_assertion(format!("{}: {message}", assertion.name()));
                }
            }
        }

        trace!(unit = %unit, success = result.is_success(), "sample completed");
        for listener in &self.listeners {
            listener.sample_occurred(unit, &result);
        }
        ctx.record_result(result);
        ctx.set_current_sampler(None);
        Ok(())
    }
}

fn element_error(node: &PlanNode, report: eyre::Report) -> EngineError {
    EngineError::Element { node: node.id(), name: node.name().to_string(), report }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tpd_common::{PlanTree, SampleResult};

    use super::*;
    use crate::TestCompiler;

    #[derive(Default)]
    struct Collector(Mutex<Vec<(String, bool)>>);

    impl SampleListener for Collector {
        fn sample_occurred(&self, unit: &ExecutableUnit, result: &SampleResult) {
            self.0.lock().push((unit.sampler().name().to_string(), result.is_success()));
        }
    }

    fn thread_for(group: PlanNode, running: bool) -> (PlanThread, Arc<Collector>) {
        let tree = PlanTree::new(PlanNode::test_plan("Plan").with_child(group));
        let schedule = Arc::new(Schedule::build(&tree, tree.thread_groups()[0]).unwrap());
        let collector = Arc::new(Collector::default());
        let thread = PlanThread::new(
            schedule,
            1,
            1,
            Arc::new(TestCompiler::new()),
            Arc::new(AtomicBool::new(running)),
            vec![collector.clone() as Arc<dyn SampleListener>],
        );
        (thread, collector)
    }

    #[test]
    fn test_elements_run_in_order_and_assertions_fail_samples() {
        let group = PlanNode::thread_group("Users", 1, Loops::Finite(2))
            .with_child(PlanNode::config_element("vars", [("greeting", "hello")]))
            .with_child(
                PlanNode::sampler("echo", |ctx| {
                    let body = ctx.substitute("${greeting} ${name}");
                    Ok(SampleResult::success("echo").with_message(body))
                })
                .with_child(PlanNode::pre_processor("set name", |ctx| {
                    ctx.set_variable("name", "world");
                    Ok(())
                }))
                .with_child(PlanNode::post_processor("count", |ctx| {
                    let count = ctx.variable("count").and_then(|c| c.parse::<u32>().ok()).unwrap_or(0);
                    ctx.set_variable("count", (count + 1).to_string());
                    Ok(())
                }))
                .with_child(PlanNode::assertion("first only", |ctx, _| {
                    (ctx.iteration() > 0).then(|| "not the first iteration".to_string())
                })),
            );
        let (thread, collector) = thread_for(group, true);

        let mut ctx = thread.new_context();
        assert_eq!(thread.run(&mut ctx).unwrap(), RunOutcome::Completed);

        assert_eq!(ctx.variable("count"), Some("2"));
        assert_eq!(ctx.sample_count(), 2);
        let last = ctx.previous_result().unwrap();
        assert_eq!(last.message(), "hello world");
        assert!(!last.is_success());
        assert_eq!(last.assertion_failures(), ["first only: not the first iteration"]);
        assert_eq!(*collector.0.lock(), vec![("echo".to_string(), true), ("echo".to_string(), false)]);
    }

    #[test]
    fn test_element_error_aborts_the_thread() {
        let group = PlanNode::thread_group("Users", 1, Loops::Forever)
            .with_child(PlanNode::sampler("broken", |_| Err(eyre::eyre!("connection refused"))));
        let (thread, collector) = thread_for(group, true);

        let err = thread.run(&mut thread.new_context()).unwrap_err();
        assert!(matches!(&err, EngineError::Element { name, .. } if name == "broken"));
        assert!(err.to_string().contains("connection refused"));
        assert!(collector.0.lock().is_empty());
    }

    #[test]
    fn test_cleared_running_flag_stops_before_dispatch() {
        let group = PlanNode::thread_group("Users", 1, Loops::Forever)
            .with_child(PlanNode::sampler("never", |_| Ok(SampleResult::success("never"))));
        let (thread, collector) = thread_for(group, false);

        assert_eq!(thread.run(&mut thread.new_context()).unwrap(), RunOutcome::Stopped);
        assert!(collector.0.lock().is_empty());
        assert_eq!(thread.name(), "Users 1-1");
    }
}
