//! Stage Sequencer
//!
//! Runs stages strictly in order. Each stage is `Pending -> Running -> {Passed,
//! Failed}`, or goes straight to `Skipped` when the run has already aborted or
//! the stage is disabled by configuration. The first failure (or an interrupt)
//! aborts the run; everything after it is skipped without being invoked.

use crate::context::{RunContext, RunState};
use crate::error::HarnessError;
use crate::report::RunReport;
use crate::signal::InterruptFlag;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One ordered verification step.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Disabled stages are skipped without aborting the run.
    fn enabled(&self) -> bool {
        true
    }

    /// Perform the step, blocking until its condition holds or it fails hard.
    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError>;
}

/// Why a stage did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RunAborted,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped(SkipReason),
}

impl StageStatus {
    pub fn label(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Passed => "passed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped(SkipReason::RunAborted) => "skipped",
            StageStatus::Skipped(SkipReason::Disabled) => "disabled",
        }
    }
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Pending,
            started_at: None,
            duration_ms: None,
            error_kind: None,
            error: None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms
            .map(|ms| Duration::from_millis(ms.min(u64::MAX as u128) as u64))
    }
}

/// Drives a list of stages against one run context.
pub struct Sequencer {
    interrupt: InterruptFlag,
}

impl Sequencer {
    pub fn new(interrupt: InterruptFlag) -> Self {
        Self { interrupt }
    }

    /// Run every stage in order and report per-stage outcomes.
    pub async fn run(&self, ctx: &RunContext, stages: &[Box<dyn Stage>]) -> RunReport {
        let started_at = Utc::now();
        let mut state = RunState::Initializing;
        let mut interrupted = false;
        let mut records: Vec<StageRecord> =
            stages.iter().map(|s| StageRecord::pending(s.name())).collect();

        info!(run_id = ctx.run_id(), stages = stages.len(), "Run starting");
        state = match state {
            RunState::Initializing => RunState::Executing,
            other => other,
        };

        for (stage, record) in stages.iter().zip(records.iter_mut()) {
            if state.admits_stages() && self.interrupt.is_raised() {
                warn!(run_id = ctx.run_id(), stage = stage.name(), "Interrupted; skipping remaining stages");
                interrupted = true;
                state = state.abort();
            }

            if !state.admits_stages() {
                record.status = StageStatus::Skipped(SkipReason::RunAborted);
                info!(run_id = ctx.run_id(), stage = stage.name(), "Stage skipped");
                continue;
            }

            if !stage.enabled() {
                record.status = StageStatus::Skipped(SkipReason::Disabled);
                info!(run_id = ctx.run_id(), stage = stage.name(), "Stage disabled by configuration");
                continue;
            }

            record.status = StageStatus::Running;
            record.started_at = Some(Utc::now());
            info!(run_id = ctx.run_id(), stage = stage.name(), "Stage running");
            let clock = Instant::now();
            let result = stage.run(ctx).await;
            record.duration_ms = Some(clock.elapsed().as_millis());

            match result {
                Ok(()) => {
                    record.status = StageStatus::Passed;
                    info!(
                        run_id = ctx.run_id(),
                        stage = stage.name(),
                        duration_ms = record.duration_ms.unwrap_or_default() as u64,
                        "Stage passed"
                    );
                }
                Err(e) => {
                    error!(run_id = ctx.run_id(), stage = stage.name(), error = %e, "Stage failed");
                    record.status = StageStatus::Failed;
                    record.error_kind = Some(e.kind().to_string());
                    record.error = Some(e.to_string());
                    state = state.abort();
                }
            }
        }

        state = state.finish();
        info!(run_id = ctx.run_id(), state = state.as_str(), "Run finished");

        RunReport {
            run_id: ctx.run_id().to_string(),
            state,
            interrupted,
            started_at,
            finished_at: Utc::now(),
            stages: records,
            teardown: None,
        }
    }
}
