//! Run report: per-stage outcomes, teardown results and the process exit code.

use crate::context::RunState;
use crate::sequencer::{StageRecord, StageStatus};
use crate::teardown::{StepOutcome, TeardownReport};
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};

pub const EXIT_COMPLETED: i32 = 0;
pub const EXIT_ABORTED: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub state: RunState,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown: Option<TeardownReport>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        match self.state {
            RunState::Completed => EXIT_COMPLETED,
            _ if self.interrupted => EXIT_INTERRUPTED,
            _ => EXIT_ABORTED,
        }
    }

    /// The stage that aborted the run, if any.
    pub fn failed_stage(&self) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.status == StageStatus::Failed)
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|r| r.status == status).count()
    }
}

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn colored_status(status: StageStatus) -> String {
    let label = status.label();
    match status {
        StageStatus::Passed => label.green().to_string(),
        StageStatus::Failed => label.red().bold().to_string(),
        StageStatus::Skipped(_) => label.yellow().to_string(),
        StageStatus::Pending | StageStatus::Running => label.dimmed().to_string(),
    }
}

fn colored_step(outcome: &StepOutcome) -> String {
    let label = outcome.label();
    match outcome {
        StepOutcome::Done(_) => label.green().to_string(),
        StepOutcome::Skipped(_) => label.yellow().to_string(),
        StepOutcome::Failed(_) => label.red().bold().to_string(),
    }
}

fn format_duration(record: &StageRecord) -> String {
    match record.duration() {
        Some(d) if d.as_secs() >= 1 => format!("{:.1}s", d.as_secs_f64()),
        Some(d) => format!("{}ms", d.as_millis()),
        None => "-".to_string(),
    }
}

/// Human-readable report with a stage table and a teardown table.
pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("Run {}", report.run_id))
    ));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Stage", "Status", "Duration", "Detail"]);
    for record in &report.stages {
        table.add_row(vec![
            record.name.clone(),
            colored_status(record.status),
            format_duration(record),
            record.error.clone().unwrap_or_default(),
        ]);
    }
    out.push_str(&format!("{}\n\n", table));

    if let Some(teardown) = &report.teardown {
        out.push_str(&format!("{}\n\n", format_section_heading("Teardown")));
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Step", "Outcome", "Detail"]);
        for (step, outcome) in teardown.steps() {
            table.add_row(vec![
                step.to_string(),
                colored_step(outcome),
                outcome.detail().to_string(),
            ]);
        }
        out.push_str(&format!("{}\n\n", table));
    }

    let summary = format!(
        "Result: {} ({} passed, {} failed, {} skipped)",
        report.state.as_str(),
        report.count(StageStatus::Passed),
        report.count(StageStatus::Failed),
        report
            .stages
            .iter()
            .filter(|r| matches!(r.status, StageStatus::Skipped(_)))
            .count(),
    );
    if report.state == RunState::Completed {
        out.push_str(&format!("{}\n", summary.green()));
    } else {
        out.push_str(&format!("{}\n", summary.red()));
    }
    if report.interrupted {
        out.push_str("Run was interrupted.\n");
    }
    out
}

pub fn render_json(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
