//! Teardown Controller
//!
//! Removes everything a run created: the namespace (and all objects the manifest
//! put in it), the rendered manifest files, and the DNS record. The three steps
//! are independent; a failure is logged and recorded, and the next step still
//! runs. The body executes at most once per controller, however many callers race
//! for it; later callers wait for and share the first result.

use crate::context::RunContext;
use crate::error::HarnessError;
use crate::gateway::DnsApi;
use crate::inspect::Kubectl;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Result of one teardown step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Done(String),
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Done(_) => "done",
            StepOutcome::Skipped(_) => "skipped",
            StepOutcome::Failed(_) => "failed",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            StepOutcome::Done(d) | StepOutcome::Skipped(d) | StepOutcome::Failed(d) => d,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub namespace: StepOutcome,
    pub artifacts: StepOutcome,
    pub dns_record: StepOutcome,
}

impl TeardownReport {
    fn disabled() -> Self {
        let skipped = || StepOutcome::Skipped("teardown disabled".to_string());
        Self {
            namespace: skipped(),
            artifacts: skipped(),
            dns_record: skipped(),
        }
    }

    pub fn steps(&self) -> [(&'static str, &StepOutcome); 3] {
        [
            ("namespace", &self.namespace),
            ("artifacts", &self.artifacts),
            ("dns-record", &self.dns_record),
        ]
    }

    pub fn has_failures(&self) -> bool {
        self.steps().iter().any(|(_, outcome)| outcome.is_failed())
    }
}

pub struct TeardownController {
    kubectl: Kubectl,
    dns: Arc<dyn DnsApi>,
    zone: String,
    enabled: bool,
    gate: OnceCell<TeardownReport>,
    executions: AtomicUsize,
}

impl TeardownController {
    pub fn new(kubectl: Kubectl, dns: Arc<dyn DnsApi>, zone: impl Into<String>, enabled: bool) -> Self {
        Self {
            kubectl,
            dns,
            zone: zone.into(),
            enabled,
            gate: OnceCell::new(),
            executions: AtomicUsize::new(0),
        }
    }

    /// Tear the run down. Safe to call from several tasks and more than once.
    pub async fn teardown(&self, ctx: &RunContext) -> TeardownReport {
        self.gate
            .get_or_init(|| async {
                self.executions.fetch_add(1, Ordering::SeqCst);
                if self.enabled {
                    self.execute(ctx).await
                } else {
                    info!(run_id = ctx.run_id(), "Teardown disabled; leaving run resources in place");
                    TeardownReport::disabled()
                }
            })
            .await
            .clone()
    }

    /// How many times the teardown body has run (0 or 1).
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// The report of the completed teardown, if it has run.
    pub fn report(&self) -> Option<TeardownReport> {
        self.gate.get().cloned()
    }

    async fn execute(&self, ctx: &RunContext) -> TeardownReport {
        info!(run_id = ctx.run_id(), "Tearing down run resources");
        let namespace = self.delete_namespace(ctx).await;
        let artifacts = delete_artifacts(ctx).await;
        let dns_record = self.delete_dns_record(ctx).await;
        TeardownReport {
            namespace,
            artifacts,
            dns_record,
        }
    }

    async fn delete_namespace(&self, ctx: &RunContext) -> StepOutcome {
        match self.kubectl.delete_namespace(ctx.run_id()).await {
            Ok(()) => {
                info!(namespace = ctx.run_id(), "Deleted namespace");
                StepOutcome::Done(format!("namespace {}", ctx.run_id()))
            }
            Err(e) => failed("namespace", e),
        }
    }

    async fn delete_dns_record(&self, ctx: &RunContext) -> StepOutcome {
        let Some(record_id) = ctx.dns_record_id() else {
            return StepOutcome::Skipped("no DNS record created".to_string());
        };
        match self.dns.delete_record(&self.zone, &record_id).await {
            Ok(()) => StepOutcome::Done(format!("record {}", record_id)),
            Err(e) => failed("dns-record", e),
        }
    }
}

async fn delete_artifacts(ctx: &RunContext) -> StepOutcome {
    let artifacts = ctx.generated_artifacts();
    if artifacts.is_empty() {
        return StepOutcome::Skipped("no generated files".to_string());
    }

    let mut errors = Vec::new();
    for path in &artifacts {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "Deleted file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "File already gone")
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete file");
                errors.push(format!("{}: {}", path.display(), e));
            }
        }
    }

    if errors.is_empty() {
        StepOutcome::Done(format!("{} file(s)", artifacts.len()))
    } else {
        StepOutcome::Failed(errors.join("; "))
    }
}

fn failed(step: &str, error: HarnessError) -> StepOutcome {
    warn!(step, error = %error, "Teardown step failed");
    StepOutcome::Failed(error.to_string())
}
