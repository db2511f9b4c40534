//! Interrupt listener racing the main flow for the shared teardown.

use certrun::context::RunState;
use certrun::report::EXIT_INTERRUPTED;
use certrun::sequencer::{SkipReason, StageStatus};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

use crate::integration::support::{config_for, fixture, response, ClusterScript, ScriptedHealth, RUN_ID};

#[tokio::test]
async fn test_interrupt_during_poll_tears_down_once() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(dir.path());
    config.poll.interval_ms = 5;
    config.poll.deadline_secs = 1;
    // health never passes, so the run is parked in a polling stage
    let fx = fixture(
        config,
        ClusterScript::healthy(),
        ScriptedHealth::new(vec![response(503, "starting")]),
    );

    let (fire, trigger) = oneshot::channel::<()>();
    let (exited_tx, exited_rx) = oneshot::channel();
    let listener = fx.harness.spawn_interrupt_listener(
        async move {
            let _ = trigger.await;
        },
        move |report| {
            let _ = exited_tx.send(report);
        },
    );

    let run = fx.harness.run();
    let interrupt = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = fire.send(());
    };
    let (report, ()) = tokio::join!(run, interrupt);

    let listener_report = exited_rx.await.expect("listener reached its exit hook");
    listener.await.unwrap();

    assert!(report.interrupted);
    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.exit_code(), EXIT_INTERRUPTED);
    assert!(report
        .stages
        .iter()
        .any(|r| r.status == StageStatus::Skipped(SkipReason::RunAborted)));

    // both callers got the same teardown, which ran exactly once
    assert_eq!(report.teardown.as_ref(), Some(&listener_report));
    assert_eq!(fx.harness.teardown_controller().executions(), 1);
    assert_eq!(fx.cluster.saw(&format!("delete namespace {}", RUN_ID)), 1);
    assert_eq!(fx.dns.deleted.lock().len(), 1);
}

#[tokio::test]
async fn test_interrupt_before_first_stage_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(config_for(dir.path()), ClusterScript::healthy(), ScriptedHealth::healthy());

    let (exited_tx, exited_rx) = oneshot::channel();
    fx.harness.spawn_interrupt_listener(async {}, move |report| {
        let _ = exited_tx.send(report);
    });
    let listener_report = exited_rx.await.unwrap();
    assert!(fx.harness.interrupt_flag().is_raised());

    let report = fx.harness.run().await;

    assert!(report.interrupted);
    assert!(report
        .stages
        .iter()
        .all(|r| r.status == StageStatus::Skipped(SkipReason::RunAborted)));
    assert_eq!(fx.cluster.saw("docker"), 0);
    assert_eq!(report.teardown, Some(listener_report));
    assert_eq!(fx.harness.teardown_controller().executions(), 1);
}

#[tokio::test]
async fn test_explicit_second_teardown_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(config_for(dir.path()), ClusterScript::healthy(), ScriptedHealth::healthy());

    let report = fx.harness.run().await;
    let again = fx
        .harness
        .teardown_controller()
        .teardown(fx.harness.context())
        .await;

    assert_eq!(report.teardown, Some(again));
    assert_eq!(fx.cluster.saw("delete namespace"), 1);
    assert_eq!(fx.dns.deleted.lock().len(), 1);
}
