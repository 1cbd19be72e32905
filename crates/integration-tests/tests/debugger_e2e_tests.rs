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

//! End-to-end tests for the debugger
//!
//! These tests drive a [`Debugger`] the way an interactive frontend would:
//! - selecting a thread group and toggling breakpoints
//! - starting, stepping, continuing and stopping a run
//! - resuming from inside `frozen_at`

use std::{sync::Arc, time::Duration};

use tpd_common::{NodeId, NodeKind, NodeType, PlanTree};
use tpd_engine::{
    Debugger, DebuggerConfig, DebuggerError, HostEngine, SessionState, StandardEngine, StopReason,
};
use tpd_integration_tests::test_utils::{
    debugger::{resume_on_freeze, selected_debugger},
    init,
    plans::{self, PlanFixture},
    recorders::{CountingStepper, ExecutionLog, FrontendEvent, RecordingFrontend},
};
use tracing::info;

const TIMEOUT: Duration = Duration::from_secs(10);

fn quiet_config() -> DebuggerConfig {
    DebuggerConfig::default().with_refresh_on_pause(false)
}

#[test]
fn test_breakpoint_on_second_sampler() {
    init::init_test_environment();
    info!("Testing a breakpoint on the second of three samplers");

    let fixture = plans::three_samplers();
    let (debugger, frontend) = selected_debugger(&fixture, quiet_config());
    resume_on_freeze(&debugger, &frontend);
    assert!(debugger.toggle_breakpoint(fixture.samplers[1]));

    debugger.start().unwrap();
    assert!(debugger.wait_until_done(TIMEOUT));

    assert_eq!(
        frontend.events(),
        vec![
            FrontendEvent::Started,
            FrontendEvent::FrozenAt(fixture.samplers[1]),
            FrontendEvent::Continuing,
            FrontendEvent::Stopped(StopReason::Finished),
        ]
    );
    assert_eq!(debugger.state(), SessionState::Finished);
    assert!(!debugger.is_active());
}

#[test]
fn test_stepper_sees_the_unwrapped_sequence() {
    init::init_test_environment();
    info!("Testing that interception neither drops nor repeats units");

    let fixture = plans::shop_plan();
    let (debugger, _frontend) = selected_debugger(&fixture, quiet_config().with_loops(3));
    let stepper = CountingStepper::new();
    debugger.set_stepper(Some(stepper.clone()));

    let log = ExecutionLog::new();
    let mut engine = StandardEngine::new();
    engine.add_listener(log.clone());
    engine.configure(debugger.selected_tree().unwrap()).unwrap();
    engine.run_test().unwrap();

    debugger.start().unwrap();
    assert!(debugger.wait_until_done(TIMEOUT));

    let [login, browse, logout] = fixture.samplers[..] else { panic!("three samplers") };
    let one_iteration = [login, browse, browse, logout];
    assert_eq!(log.executed(), one_iteration.repeat(3));
    assert_eq!(stepper.sequence(), log.executed());
}

#[test]
fn test_each_step_executes_exactly_one_unit() {
    init::init_test_environment();
    info!("Testing step consumption");

    let fixture = plans::shop_plan();
    let (debugger, frontend) =
        selected_debugger(&fixture, quiet_config().with_pause_on_start(true).with_loops(2));
    let log = ExecutionLog::new();
    debugger.add_sample_listener(log.clone());

    debugger.start().unwrap();
    let mut steps = 0;
    while debugger.wait_until_paused(TIMEOUT) {
        assert_eq!(log.len(), steps);
        assert!(frontend.wait_for_count(|e| matches!(e, FrontendEvent::FrozenAt(_)), steps + 1, TIMEOUT));
        let frozen = debugger.current_unit().unwrap();
        assert_eq!(frontend.frozen_nodes().last(), Some(&frozen.sampler_id()));

        assert!(debugger.step_over());
        steps += 1;
    }

    assert!(debugger.wait_until_done(TIMEOUT));
    assert_eq!(steps, 8);
    assert_eq!(log.len(), 8);
    assert_eq!(frontend.stop_reasons(), vec![StopReason::Finished]);
    assert_eq!(frontend.count(|e| matches!(e, FrontendEvent::Continuing)), 8);
}

#[test]
fn test_breakpoints_are_deterministic_across_runs() {
    init::init_test_environment();
    info!("Testing breakpoint determinism and restart");

    let fixture = plans::shop_plan();
    let (debugger, frontend) = selected_debugger(&fixture, quiet_config().with_loops(2));
    resume_on_freeze(&debugger, &frontend);
    let [login, browse, _] = fixture.samplers[..] else { panic!("three samplers") };
    debugger.toggle_breakpoint(login);
    debugger.toggle_breakpoint(browse);

    debugger.start().unwrap();
    assert!(debugger.wait_until_done(TIMEOUT));
    let first_run = frontend.frozen_nodes();
    assert_eq!(first_run, vec![login, browse, browse, login, browse, browse]);

    // Breakpoints survive the run; a second start creates a fresh session.
    assert!(debugger.is_breakpoint(login));
    debugger.start().unwrap();
    assert!(debugger.wait_until_done(TIMEOUT));
    assert_eq!(frontend.frozen_nodes(), [first_run.clone(), first_run].concat());
    assert_eq!(frontend.stop_reasons(), vec![StopReason::Finished, StopReason::Finished]);
    assert_eq!(frontend.count(|e| matches!(e, FrontendEvent::Started)), 2);
}

#[test]
fn test_breakpoint_on_scoped_element_pauses_its_sampler() {
    init::init_test_environment();
    info!("Testing breakpoints on elements bundled with a sampler");

    let fixture = plans::shop_plan();
    let (debugger, frontend) = selected_debugger(&fixture, quiet_config());
    resume_on_freeze(&debugger, &frontend);

    let group = fixture.tree.find(fixture.group).unwrap();
    let mark = group.children().iter().find(|n| n.name() == "mark").unwrap().id();
    assert!(debugger.is_breakpoint_eligible(mark));
    debugger.toggle_breakpoint(mark);

    debugger.start().unwrap();
    assert!(debugger.wait_until_done(TIMEOUT));
    // The group-level pre-processor is bundled with every sampler.
    assert_eq!(frontend.frozen_nodes().len(), 4);
}

#[test]
fn test_stop_is_idempotent() {
    init::init_test_environment();
    info!("Testing stop before start, while paused and after the end");

    let fixture = plans::three_samplers();
    let (debugger, frontend) = selected_debugger(&fixture, quiet_config().with_pause_on_start(true));
    let log = ExecutionLog::new();
    debugger.add_sample_listener(log.clone());

    assert!(!debugger.stop());
    assert!(frontend.events().is_empty());

    debugger.start().unwrap();
    assert!(debugger.wait_until_paused(TIMEOUT));
    assert!(debugger.stop());
    assert!(!debugger.stop());
    assert!(debugger.wait_until_done(TIMEOUT));
    assert!(!debugger.stop());

    assert!(log.is_empty());
    assert_eq!(debugger.state(), SessionState::Stopped);
    assert_eq!(frontend.stop_reasons(), vec![StopReason::Aborted]);
    assert!(!debugger.step_over());
    assert!(!debugger.continue_run());
}

#[test]
fn test_stop_from_inside_frozen_at() {
    init::init_test_environment();
    info!("Testing stop issued by the frontend callback");

    let fixture = plans::endless_plan();
    let (debugger, frontend) = selected_debugger(&fixture, quiet_config().with_loops(1000));
    let weak = Arc::downgrade(&debugger);
    frontend.on_frozen(move |_| {
        if let Some(debugger) = weak.upgrade() {
            debugger.stop();
        }
    });
    debugger.toggle_breakpoint(fixture.samplers[0]);

    debugger.start().unwrap();
    assert!(debugger.wait_until_done(TIMEOUT));
    assert_eq!(
        frontend.events(),
        vec![
            FrontendEvent::Started,
            FrontendEvent::FrozenAt(fixture.samplers[0]),
            FrontendEvent::Stopped(StopReason::Aborted),
        ]
    );
}

#[test]
fn test_step_over_while_running_is_queued() {
    init::init_test_environment();
    info!("Testing step_over issued while running");

    let fixture = plans::endless_plan();
    let (debugger, frontend) = selected_debugger(&fixture, quiet_config().with_loops(u32::MAX));

    debugger.start().unwrap();
    assert_eq!(debugger.state(), SessionState::Running);
    assert!(debugger.step_over());
    assert!(debugger.wait_until_paused(TIMEOUT));
    assert!(frontend.wait_for_count(|e| matches!(e, FrontendEvent::FrozenAt(_)), 1, TIMEOUT));
    assert_eq!(frontend.frozen_nodes(), vec![fixture.samplers[0]]);

    assert!(debugger.step_over());
    assert!(debugger.wait_until_paused(TIMEOUT));
    assert!(debugger.stop());
    assert!(debugger.wait_until_done(TIMEOUT));
    assert_eq!(frontend.frozen_nodes().len(), 2);
    assert_eq!(frontend.stop_reasons(), vec![StopReason::Aborted]);
}

#[test]
fn test_huge_loop_controller_is_debuggable() {
    init::init_test_environment();
    info!("Testing a loop controller with the largest count");

    let fixture = plans::huge_loop_plan();
    let (debugger, frontend) = selected_debugger(&fixture, quiet_config());
    debugger.toggle_breakpoint(fixture.samplers[0]);

    debugger.start().unwrap();
    assert!(debugger.wait_until_paused(TIMEOUT));
    assert!(debugger.step_over());
    assert!(debugger.wait_until_paused(TIMEOUT));
    assert!(frontend.wait_for_count(|e| matches!(e, FrontendEvent::FrozenAt(_)), 2, TIMEOUT));
    assert!(debugger.stop());
    assert!(debugger.wait_until_done(TIMEOUT));

    assert_eq!(frontend.frozen_nodes(), vec![fixture.samplers[0]; 2]);
    assert_eq!(frontend.stop_reasons(), vec![StopReason::Aborted]);
}

#[test]
fn test_pause_and_refresh_status() {
    init::init_test_environment();
    info!("Testing pause requests and status refreshes");

    let fixture = plans::endless_plan();
    let (debugger, frontend) =
        selected_debugger(&fixture, DebuggerConfig::default().with_loops(u32::MAX));

    debugger.start().unwrap();
    assert!(debugger.pause());
    assert!(debugger.wait_until_paused(TIMEOUT));
    assert!(debugger.refresh_status());

    let is_refresh = |e: &FrontendEvent| matches!(e, FrontendEvent::StatusRefresh(_));
    assert!(frontend.wait_for_count(is_refresh, 2, TIMEOUT));
    let events = frontend.events();
    let Some(FrontendEvent::StatusRefresh(snapshot)) = events.iter().rev().find(|e| is_refresh(*e))
    else {
        panic!("no status refresh recorded");
    };
    assert_eq!(snapshot["thread_name"], "Ticker 1-1");
    assert_eq!(snapshot["current_sampler"], serde_json::Value::Null);

    debugger.stop();
    assert!(debugger.wait_until_done(TIMEOUT));
    assert!(!debugger.refresh_status());
}

#[test]
fn test_engine_failure_is_reported_once() {
    init::init_test_environment();
    info!("Testing element errors and panics at the worker boundary");

    let fixture = plans::failing_plan();
    let (debugger, frontend) = selected_debugger(&fixture, quiet_config());
    debugger.start().unwrap();
    assert!(debugger.wait_until_done(TIMEOUT));
    let reasons = frontend.stop_reasons();
    assert_eq!(reasons.len(), 1);
    assert!(matches!(&reasons[0], StopReason::Failed(msg) if msg.contains("connection refused")));
    assert_eq!(debugger.state(), SessionState::Stopped);

    let fixture = plans::panicking_plan();
    let (debugger, frontend) = selected_debugger(&fixture, quiet_config());
    debugger.start().unwrap();
    assert!(debugger.wait_until_done(TIMEOUT));
    assert_eq!(
        frontend.stop_reasons(),
        vec![StopReason::Failed("panic: sampler exploded".to_string())]
    );
}

#[test]
fn test_selection_errors() {
    init::init_test_environment();
    info!("Testing configuration errors of select_subtree and start");

    let fixture = plans::shop_plan();
    let frontend = RecordingFrontend::new();
    let debugger = Debugger::new(Arc::new(fixture.tree.clone()), frontend.clone(), quiet_config());

    assert!(matches!(debugger.start(), Err(DebuggerError::NoSelection)));
    assert!(matches!(
        debugger.select_subtree(NodeId::from(u64::MAX)),
        Err(DebuggerError::UnknownNode(_))
    ));
    let root = fixture.tree.root().id();
    assert!(matches!(debugger.select_subtree(root), Err(DebuggerError::NoThreadGroup(_))));
    let workbench = fixture
        .tree
        .root()
        .children()
        .iter()
        .find(|n| n.node_type() == NodeType::WorkBench)
        .unwrap()
        .children()[0]
        .id();
    assert!(matches!(debugger.select_subtree(workbench), Err(DebuggerError::NoThreadGroup(_))));
    assert!(frontend.events().is_empty());

    let zero = Debugger::new(
        Arc::new(fixture.tree.clone()),
        RecordingFrontend::new(),
        quiet_config().with_loops(0),
    );
    zero.select_subtree(fixture.group).unwrap();
    assert!(matches!(zero.start(), Err(DebuggerError::Config(_))));
}

#[test]
fn test_selected_tree_keeps_identities() {
    init::init_test_environment();
    info!("Testing the shape of the debugging tree");

    let fixture = plans::shop_plan();
    let debugger = Debugger::new(
        Arc::new(fixture.tree.clone()),
        RecordingFrontend::new(),
        quiet_config().with_loops(4),
    );
    let browse = fixture.samplers[1];
    let tree: PlanTree = debugger.select_subtree(browse).unwrap();

    let top: Vec<NodeType> = tree.root().children().iter().map(|n| n.node_type()).collect();
    assert_eq!(top, vec![NodeType::ConfigElement, NodeType::ThreadGroup]);
    assert_eq!(tree.root().id(), fixture.tree.root().id());

    let group = tree.find(fixture.group).unwrap();
    assert!(matches!(
        group.kind(),
        NodeKind::ThreadGroup { threads: 1, loops: tpd_common::Loops::Finite(4) }
    ));
    for sampler in &fixture.samplers {
        assert!(tree.contains(*sampler));
    }
    assert_eq!(tree.thread_groups().len(), 1);
    assert_eq!(debugger.selected_tree().unwrap().node_ids(), tree.node_ids());

    assert!(debugger.is_breakpoint_eligible(browse));
    assert!(!debugger.is_breakpoint_eligible(fixture.group));
    assert!(!debugger.is_breakpoint_eligible(tree.root().id()));
}

#[test]
fn test_worker_thread_is_named_from_config() {
    init::init_test_environment();
    info!("Testing the worker thread name");

    let fixture = plans::three_samplers();
    let (debugger, frontend) =
        selected_debugger(&fixture, quiet_config().with_worker_name("plan-debugger"));
    let names = Arc::new(parking_lot::Mutex::new(Vec::new()));
    frontend.on_frozen({
        let names = names.clone();
        let weak = Arc::downgrade(&debugger);
        move |_| {
            names.lock().push(std::thread::current().name().map(str::to_string));
            if let Some(debugger) = weak.upgrade() {
                debugger.continue_run();
            }
        }
    });
    debugger.toggle_breakpoint(fixture.samplers[2]);

    debugger.start().unwrap();
    assert!(debugger.wait_until_done(TIMEOUT));
    assert_eq!(*names.lock(), vec![Some("plan-debugger".to_string())]);
}

#[test]
fn test_fixture_ids_are_distinct() {
    let PlanFixture { tree, samplers, .. } = plans::three_samplers();
    let mut ids = tree.node_ids();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), tree.len());
    assert_eq!(samplers.len(), 3);
}
