//! Run Context
//!
//! Per-invocation identity and the state that stages hand to one another. One
//! instance exists per process; it is shared as `Arc<RunContext>` between the
//! sequencer and the interrupt listener, so the mutable fields sit behind locks.

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// First port of the cluster node-port range.
pub const NODE_PORT_BASE: u16 = 30000;
/// Width of the node-port window used for allocation.
pub const NODE_PORT_SPAN: u64 = 2767;

/// Global state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Executing,
    Completed,
    Aborted,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Initializing => "initializing",
            RunState::Executing => "executing",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        }
    }

    /// Whether a stage observed in this state may run its action.
    pub fn admits_stages(self) -> bool {
        matches!(self, RunState::Initializing | RunState::Executing)
    }

    /// Transition taken when a stage fails or the run is interrupted.
    /// `Aborted` is absorbing; a finished run never reopens.
    pub fn abort(self) -> RunState {
        match self {
            RunState::Completed => RunState::Completed,
            _ => RunState::Aborted,
        }
    }

    /// Transition taken after the last stage. Only an executing run completes.
    pub fn finish(self) -> RunState {
        match self {
            RunState::Initializing | RunState::Executing => RunState::Completed,
            other => other,
        }
    }
}

/// Shared per-run state.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    allocated_port: u16,
    image_ref: RwLock<Option<String>>,
    service_address: RwLock<Option<IpAddr>>,
    dns_record_id: RwLock<Option<String>>,
    generated_artifacts: Mutex<BTreeSet<PathBuf>>,
}

impl RunContext {
    /// Create a context with a fresh run id and a time-derived port.
    pub fn generate() -> Self {
        Self::with_identity(generate_run_id(), allocate_port(SystemTime::now()))
    }

    /// Create a context with a fixed identity.
    pub fn with_identity(run_id: impl Into<String>, allocated_port: u16) -> Self {
        Self {
            run_id: run_id.into(),
            allocated_port,
            image_ref: RwLock::new(None),
            service_address: RwLock::new(None),
            dns_record_id: RwLock::new(None),
            generated_artifacts: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn allocated_port(&self) -> u16 {
        self.allocated_port
    }

    pub fn image_ref(&self) -> Option<String> {
        self.image_ref.read().clone()
    }

    pub fn set_image_ref(&self, image_ref: impl Into<String>) {
        *self.image_ref.write() = Some(image_ref.into());
    }

    pub fn service_address(&self) -> Option<IpAddr> {
        *self.service_address.read()
    }

    pub fn set_service_address(&self, address: IpAddr) {
        *self.service_address.write() = Some(address);
    }

    /// Identifier of the DNS record created by this run, if any.
    pub fn dns_record_id(&self) -> Option<String> {
        self.dns_record_id.read().clone()
    }

    pub fn set_dns_record_id(&self, record_id: impl Into<String>) {
        *self.dns_record_id.write() = Some(record_id.into());
    }

    /// Remember a file created for this run so teardown can remove it.
    pub fn track_artifact(&self, path: impl AsRef<Path>) {
        self.generated_artifacts
            .lock()
            .insert(path.as_ref().to_path_buf());
    }

    /// Snapshot of tracked artifacts, in path order.
    pub fn generated_artifacts(&self) -> Vec<PathBuf> {
        self.generated_artifacts.lock().iter().cloned().collect()
    }

    /// Fully-qualified host name of the run on `domain`.
    pub fn fqdn(&self, domain: &str) -> String {
        format!("{}.{}", self.run_id, domain)
    }
}

/// Random 31-bit non-negative integer rendered in decimal.
pub fn generate_run_id() -> String {
    let id: u32 = rand::thread_rng().gen_range(0..=i32::MAX as u32);
    id.to_string()
}

/// Node port derived from wall-clock seconds.
pub fn allocate_port(now: SystemTime) -> u16 {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    NODE_PORT_BASE + (secs % NODE_PORT_SPAN) as u16
}
