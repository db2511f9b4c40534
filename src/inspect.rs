//! Resource Inspector
//!
//! Thin `kubectl` wrapper plus typed snapshots decoded from `-o json` output.
//! Decoding is deliberately lenient about absent status fields, since objects
//! returned by the control plane fill in over time.

use crate::error::HarnessError;
use crate::exec::{CommandRunner, CommandSpec};
use crate::poll::PollOutcome;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// A structured view of one control-plane object.
pub trait Snapshot: Sized {
    /// Resource kind as `kubectl get` expects it.
    const KIND: &'static str;

    /// Decode from the JSON document returned by `kubectl get -o json`.
    fn decode(json: &str) -> Result<Self, HarnessError>;
}

fn decode_json<T: DeserializeOwned>(what: &str, json: &str) -> Result<T, HarnessError> {
    serde_json::from_str(json).map_err(|e| HarnessError::Decode {
        what: what.to_string(),
        reason: e.to_string(),
    })
}

/// Load-balancer view of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    /// First ingress IP, once assigned.
    pub address: Option<String>,
}

#[derive(Deserialize, Default)]
struct ServiceDoc {
    #[serde(default)]
    status: ServiceStatusDoc,
}

#[derive(Deserialize, Default)]
struct ServiceStatusDoc {
    #[serde(default, rename = "loadBalancer")]
    load_balancer: LoadBalancerDoc,
}

#[derive(Deserialize, Default)]
struct LoadBalancerDoc {
    #[serde(default)]
    ingress: Vec<IngressDoc>,
}

#[derive(Deserialize, Default)]
struct IngressDoc {
    #[serde(default)]
    ip: String,
}

impl Snapshot for ServiceSnapshot {
    const KIND: &'static str = "svc";

    fn decode(json: &str) -> Result<Self, HarnessError> {
        let doc: ServiceDoc = decode_json("service", json)?;
        let address = doc
            .status
            .load_balancer
            .ingress
            .into_iter()
            .next()
            .map(|entry| entry.ip)
            .filter(|ip| !ip.is_empty());
        Ok(Self { address })
    }
}

/// Completion counters of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobSnapshot {
    pub succeeded: u32,
    pub failed: u32,
}

#[derive(Deserialize, Default)]
struct JobDoc {
    #[serde(default)]
    status: JobStatusDoc,
}

#[derive(Deserialize, Default)]
struct JobStatusDoc {
    #[serde(default)]
    succeeded: u32,
    #[serde(default)]
    failed: u32,
}

impl Snapshot for JobSnapshot {
    const KIND: &'static str = "job";

    fn decode(json: &str) -> Result<Self, HarnessError> {
        let doc: JobDoc = decode_json("job", json)?;
        Ok(Self {
            succeeded: doc.status.succeeded,
            failed: doc.status.failed,
        })
    }
}

/// Stored keys of a secret. Values stay encoded; only presence matters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecretSnapshot {
    pub data: BTreeMap<String, String>,
}

#[derive(Deserialize, Default)]
struct SecretDoc {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

impl SecretSnapshot {
    /// Value under `key` when present and non-empty.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl Snapshot for SecretSnapshot {
    const KIND: &'static str = "secret";

    fn decode(json: &str) -> Result<Self, HarnessError> {
        let doc: SecretDoc = decode_json("secret", json)?;
        Ok(Self { data: doc.data })
    }
}

/// Cluster control-plane operations used by the harness.
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl Kubectl {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
    }

    pub fn create_namespace_command(&self, namespace: &str) -> CommandSpec {
        self.command().args(["create", "namespace", namespace])
    }

    pub fn apply_command(&self, namespace: &str, manifest: &Path) -> CommandSpec {
        self.command()
            .args(["--namespace", namespace, "apply", "-f"])
            .arg(manifest.to_string_lossy())
    }

    pub fn get_command(&self, namespace: &str, kind: &str, name: &str) -> CommandSpec {
        self.command()
            .args(["--namespace", namespace, "get", kind, name, "-o", "json"])
    }

    pub fn delete_namespace_command(&self, namespace: &str) -> CommandSpec {
        self.command()
            .args(["delete", "namespace", namespace, "--ignore-not-found"])
    }

    pub async fn create_namespace(&self, namespace: &str) -> Result<(), HarnessError> {
        self.runner
            .run(&self.create_namespace_command(namespace))
            .await
            .map(|_| ())
    }

    pub async fn apply_manifest(&self, namespace: &str, manifest: &Path) -> Result<(), HarnessError> {
        self.runner
            .run(&self.apply_command(namespace, manifest))
            .await
            .map(|_| ())
    }

    /// Delete a namespace and everything in it. Deleting a missing namespace succeeds.
    pub async fn delete_namespace(&self, namespace: &str) -> Result<(), HarnessError> {
        self.runner
            .run(&self.delete_namespace_command(namespace))
            .await
            .map(|_| ())
    }

    /// Raw `get -o json` output for one object.
    pub async fn get_json(&self, namespace: &str, kind: &str, name: &str) -> Result<String, HarnessError> {
        self.runner.run(&self.get_command(namespace, kind, name)).await
    }

    /// Fetch one object and decode it.
    pub async fn fetch_structured<T: Snapshot>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<T, HarnessError> {
        let json = self.get_json(namespace, T::KIND, name).await?;
        T::decode(&json)
    }

    /// Polling form of [`Kubectl::fetch_structured`]: every failure is "not ready".
    pub async fn poll_structured<T: Snapshot>(&self, namespace: &str, name: &str) -> PollOutcome<T> {
        match self.fetch_structured(namespace, name).await {
            Ok(snapshot) => PollOutcome::Ready(snapshot),
            Err(e) => PollOutcome::not_ready(e.to_string()),
        }
    }
}
