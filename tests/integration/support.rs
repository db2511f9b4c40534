//! Scripted in-memory collaborators: a fake cluster behind the command runner,
//! a recording DNS provider, a scripted health endpoint and resolver.

use async_trait::async_trait;
use certrun::config::HarnessConfig;
use certrun::context::RunContext;
use certrun::error::HarnessError;
use certrun::exec::{CommandRunner, CommandSpec};
use certrun::gateway::{DnsApi, HealthProbe, HealthResponse, NameResolver};
use certrun::harness::Harness;
use certrun::stages::Backends;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const RUN_ID: &str = "4242";
pub const PORT: u16 = 30042;
pub const SERVICE_IP: &str = "203.0.113.7";
pub const DOMAIN: &str = "example.test";

pub const TEMPLATE: &str = "\
apiVersion: v1
kind: Service
metadata:
  name: auto-kubernetes-lets-encrypt
spec:
  type: LoadBalancer
  ports:
  - port: 80
    nodePort: *NODE_PORT*
---
apiVersion: batch/v1
kind: Job
spec:
  template:
    spec:
      containers:
      - image: *IMAGE_NAME*
        env:
        - name: DOMAIN
          value: *SUBDOMAIN*.example.test
";

/// Behaviour of the fake control plane.
pub struct ClusterScript {
    /// `get svc` calls answered without an address before one appears.
    pub service_pending_polls: usize,
    pub job_succeeded: u32,
    pub secrets: BTreeMap<String, BTreeMap<String, String>>,
    pub fail_apply: bool,
}

impl ClusterScript {
    /// Everything eventually works.
    pub fn healthy() -> Self {
        let mut secrets = BTreeMap::new();
        secrets.insert(
            "auto-kubernetes-lets-encrypt-user".to_string(),
            BTreeMap::from([("registration".to_string(), "eyJ1cmkiOiJ4In0=".to_string())]),
        );
        secrets.insert(
            "auto-kubernetes-lets-encrypt-certs".to_string(),
            BTreeMap::from([(format!("{}.{}.crt", RUN_ID, DOMAIN), "LS0tLS1CRUdJTg==".to_string())]),
        );
        Self {
            service_pending_polls: 2,
            job_succeeded: 1,
            secrets,
            fail_apply: false,
        }
    }
}

/// Answers `docker` and `kubectl` invocations from a script and records them.
pub struct FakeCluster {
    script: ClusterScript,
    service_polls: AtomicUsize,
    pub commands: Mutex<Vec<CommandSpec>>,
}

impl FakeCluster {
    pub fn new(script: ClusterScript) -> Self {
        Self {
            script,
            service_polls: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn saw(&self, needle: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.to_string().contains(needle))
            .count()
    }

    fn get(&self, kind: &str, name: &str) -> Result<String, String> {
        match kind {
            "svc" => {
                let polls = self.service_polls.fetch_add(1, Ordering::SeqCst);
                if polls < self.script.service_pending_polls {
                    Ok(r#"{"status":{"loadBalancer":{}}}"#.to_string())
                } else {
                    Ok(format!(
                        r#"{{"status":{{"loadBalancer":{{"ingress":[{{"ip":"{}"}}]}}}}}}"#,
                        SERVICE_IP
                    ))
                }
            }
            "job" => Ok(format!(
                r#"{{"status":{{"succeeded":{}}}}}"#,
                self.script.job_succeeded
            )),
            "secret" => match self.script.secrets.get(name) {
                Some(data) => Ok(serde_json::json!({ "data": data }).to_string()),
                None => Err(format!("secrets \"{}\" not found", name)),
            },
            other => Err(format!("unknown kind {}", other)),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeCluster {
    async fn run(&self, command: &CommandSpec) -> Result<String, HarnessError> {
        self.commands.lock().push(command.clone());
        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        let reply = match args.as_slice() {
            ["--namespace", _, "apply", ..] if self.script.fail_apply => {
                Err("error validating manifest".to_string())
            }
            ["--namespace", _, "get", kind, name, ..] => self.get(kind, name),
            _ => Ok(String::new()),
        };
        reply.map_err(|stderr| HarnessError::CommandFailed {
            command: command.to_string(),
            status: "exit status: 1".to_string(),
            stderr,
        })
    }
}

#[derive(Default)]
pub struct RecordingDns {
    pub created: Mutex<Vec<(String, String)>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl DnsApi for RecordingDns {
    async fn create_record(&self, _zone: &str, name: &str, address: &str) -> Result<String, HarnessError> {
        self.created.lock().push((name.to_string(), address.to_string()));
        Ok("abc123".to_string())
    }

    async fn delete_record(&self, _zone: &str, record_id: &str) -> Result<(), HarnessError> {
        self.deleted.lock().push(record_id.to_string());
        Ok(())
    }
}

/// Returns the scripted responses in order, then repeats the last one.
pub struct ScriptedHealth {
    responses: Mutex<Vec<HealthResponse>>,
    pub probes: AtomicUsize,
}

impl ScriptedHealth {
    pub fn new(responses: Vec<HealthResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self::new(vec![response(200, r#"{"Healthy": true}"#)])
    }
}

pub fn response(status: u16, body: &str) -> HealthResponse {
    HealthResponse {
        status,
        body: body.to_string(),
    }
}

#[async_trait]
impl HealthProbe for ScriptedHealth {
    async fn check(&self, _url: &str) -> Result<HealthResponse, HarnessError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock();
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else {
            responses
                .first()
                .cloned()
                .ok_or_else(|| HarnessError::Http("connection refused".to_string()))
        }
    }
}

/// Resolves to nothing for the first `pending` lookups, then to the service address.
pub struct LaggingResolver {
    pending: usize,
    lookups: AtomicUsize,
}

impl LaggingResolver {
    pub fn new(pending: usize) -> Self {
        Self {
            pending,
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NameResolver for LaggingResolver {
    async fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, HarnessError> {
        if self.lookups.fetch_add(1, Ordering::SeqCst) < self.pending {
            return Ok(Vec::new());
        }
        Ok(vec![SERVICE_IP.parse().map_err(|_| HarnessError::Http("bad ip".to_string()))?])
    }
}

pub struct Fixture {
    pub cluster: Arc<FakeCluster>,
    pub dns: Arc<RecordingDns>,
    pub health: Arc<ScriptedHealth>,
    pub harness: Harness,
    pub manifest_path: PathBuf,
}

pub fn config_for(dir: &Path) -> HarnessConfig {
    let template = dir.join("kubernetes-resources.yml");
    std::fs::write(&template, TEMPLATE).unwrap();

    let mut config = HarnessConfig::default();
    config.build.commit = Some("0123abc".to_string());
    config.manifest.template = template;
    config.manifest.output_dir = Some(dir.to_path_buf());
    config.dns.zone_id = "zone-1".to_string();
    config.dns.domain = DOMAIN.to_string();
    config.dns.auth_email = "ops@example.test".to_string();
    config.dns.auth_key = "key".to_string();
    config.poll.interval_ms = 2;
    config.poll.deadline_secs = 5;
    config
}

pub fn fixture(config: HarnessConfig, script: ClusterScript, health: ScriptedHealth) -> Fixture {
    let manifest_path = config
        .manifest
        .resolved_output_dir()
        .join(format!("{}-kubernetes-resources.yml", RUN_ID));
    let cluster = Arc::new(FakeCluster::new(script));
    let dns = Arc::new(RecordingDns::default());
    let health = Arc::new(health);
    let backends = Backends {
        commands: cluster.clone(),
        dns: dns.clone(),
        health: health.clone(),
        resolver: Arc::new(LaggingResolver::new(1)),
    };
    let harness =
        Harness::with_context(config, backends, RunContext::with_identity(RUN_ID, PORT)).unwrap();
    Fixture {
        cluster,
        dns,
        health,
        harness,
        manifest_path,
    }
}
