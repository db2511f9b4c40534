//! Full successful run against scripted collaborators.

use certrun::context::RunState;
use certrun::sequencer::StageStatus;
use certrun::stages;
use certrun::teardown::StepOutcome;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

use crate::integration::support::{
    config_for, fixture, ClusterScript, ScriptedHealth, DOMAIN, PORT, RUN_ID, SERVICE_IP,
};

#[tokio::test]
async fn test_successful_run_passes_every_stage_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(config_for(dir.path()), ClusterScript::healthy(), ScriptedHealth::healthy());

    let report = fx.harness.run().await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.exit_code(), 0);
    assert!(!report.interrupted);
    assert_eq!(report.stages.len(), 11);
    for record in &report.stages {
        assert_eq!(record.status, StageStatus::Passed, "stage {} did not pass", record.name);
    }

    let ctx = fx.harness.context();
    assert_eq!(ctx.service_address(), Some(SERVICE_IP.parse().unwrap()));
    assert_eq!(ctx.dns_record_id().as_deref(), Some("abc123"));
    assert_eq!(
        fx.dns.created.lock().as_slice(),
        [(format!("{}.{}", RUN_ID, DOMAIN), SERVICE_IP.to_string())]
    );

    // three service polls, one health probe
    assert_eq!(fx.cluster.saw("get svc"), 3);
    assert_eq!(fx.health.probes.load(Ordering::SeqCst), 1);

    let teardown = report.teardown.expect("teardown report attached");
    assert!(!teardown.has_failures());
    assert_eq!(teardown.dns_record, StepOutcome::Done("record abc123".to_string()));
    assert_eq!(fx.cluster.saw(&format!("delete namespace {} --ignore-not-found", RUN_ID)), 1);
    assert_eq!(fx.dns.deleted.lock().as_slice(), ["abc123".to_string()]);
    assert!(!fx.manifest_path.exists());
}

#[tokio::test]
async fn test_commands_follow_stage_order() {
    let dir = TempDir::new().unwrap();
    let fx = fixture(config_for(dir.path()), ClusterScript::healthy(), ScriptedHealth::healthy());
    fx.harness.run().await;

    let commands: Vec<String> = fx.cluster.commands.lock().iter().map(|c| c.to_string()).collect();
    let image = "quay.io/hiphipjorge/auto-kubernetes-lets-encrypt:0123abc";
    assert_eq!(commands[0], format!("docker build -t {} .", image));
    assert_eq!(commands[1], format!("docker push {}", image));
    assert_eq!(commands[2], format!("kubectl create namespace {}", RUN_ID));
    assert!(commands[3].starts_with(&format!("kubectl --namespace {} apply -f ", RUN_ID)));
    assert_eq!(
        commands.last().map(String::as_str),
        Some(format!("kubectl delete namespace {} --ignore-not-found", RUN_ID).as_str())
    );
}

#[tokio::test]
async fn test_rendered_manifest_carries_run_values() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(dir.path());
    config.teardown.enabled = false;
    let fx = fixture(config, ClusterScript::healthy(), ScriptedHealth::healthy());

    let report = fx.harness.run().await;
    assert_eq!(report.state, RunState::Completed);

    let rendered = std::fs::read_to_string(&fx.manifest_path).unwrap();
    assert!(rendered.contains(&format!("nodePort: {}", PORT)));
    assert!(rendered.contains("image: quay.io/hiphipjorge/auto-kubernetes-lets-encrypt:0123abc"));
    assert!(rendered.contains(&format!("value: {}.example.test", RUN_ID)));
    assert!(!rendered.contains('*'));

    // teardown disabled: nothing removed
    let teardown = report.teardown.unwrap();
    assert_eq!(teardown.namespace.label(), "skipped");
    assert!(fx.dns.deleted.lock().is_empty());
    assert_eq!(fx.cluster.saw("delete namespace"), 0);
}

#[tokio::test]
async fn test_skip_build_uses_published_image() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(dir.path());
    config.build.skip = true;
    let fx = fixture(config, ClusterScript::healthy(), ScriptedHealth::healthy());

    let report = fx.harness.run().await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.stages[0].name, stages::BUILD_IMAGE);
    assert_eq!(report.stages[0].status, StageStatus::Passed);
    assert_eq!(report.stages[1].status.label(), "disabled");
    assert_eq!(fx.cluster.saw("docker"), 0);
}
