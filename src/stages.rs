//! The standard verification stages, in run order.
//!
//! One-shot stages fail the run on the first error. Polling stages retry every
//! transient condition until it clears or the poll deadline passes.

use crate::config::HarnessConfig;
use crate::context::RunContext;
use crate::error::HarnessError;
use crate::exec::{CommandRunner, CommandSpec, SystemCommandRunner};
use crate::gateway::{
    build_http_client, CloudflareDns, DnsApi, HealthProbe, HttpHealthProbe, NameResolver,
    SystemResolver,
};
use crate::inspect::{JobSnapshot, Kubectl, SecretSnapshot, ServiceSnapshot};
use crate::manifest;
use crate::poll::{poll_until, PollOutcome, PollPolicy};
use crate::sequencer::Stage;
use async_trait::async_trait;
use regex::Regex;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

pub const BUILD_IMAGE: &str = "build-image";
pub const PUBLISH_IMAGE: &str = "publish-image";
pub const CREATE_NAMESPACE: &str = "create-namespace";
pub const APPLY_MANIFEST: &str = "apply-manifest";
pub const AWAIT_SERVICE_ADDRESS: &str = "await-service-address";
pub const CREATE_DNS_RECORD: &str = "create-dns-record";
pub const AWAIT_DNS_PROPAGATION: &str = "await-dns-propagation";
pub const AWAIT_HEALTHY: &str = "await-healthy";
pub const AWAIT_JOB_COMPLETION: &str = "await-job-completion";
pub const VERIFY_REGISTRATION: &str = "verify-registration";
pub const VERIFY_CERTIFICATE: &str = "verify-certificate";

/// External collaborators the stages talk to.
#[derive(Clone)]
pub struct Backends {
    pub commands: Arc<dyn CommandRunner>,
    pub dns: Arc<dyn DnsApi>,
    pub health: Arc<dyn HealthProbe>,
    pub resolver: Arc<dyn NameResolver>,
}

impl Backends {
    /// Real processes, real HTTP, the system resolver.
    pub fn system(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let client = build_http_client()?;
        Ok(Self {
            commands: Arc::new(SystemCommandRunner),
            dns: Arc::new(CloudflareDns::new(
                client.clone(),
                config.dns.api_base.clone(),
                config.dns.auth_email.clone(),
                config.dns.auth_key.clone(),
            )),
            health: Arc::new(HttpHealthProbe::new(client)),
            resolver: Arc::new(SystemResolver),
        })
    }
}

/// Everything a stage needs besides the run context.
pub struct StageEnv {
    pub config: HarnessConfig,
    pub backends: Backends,
    pub kubectl: Kubectl,
    pub poll: PollPolicy,
    marker: Regex,
}

impl StageEnv {
    pub fn new(config: HarnessConfig, backends: Backends) -> Result<Self, HarnessError> {
        let marker = Regex::new(&config.health.marker)
            .map_err(|e| HarnessError::Config(format!("Invalid health marker: {}", e)))?;
        let kubectl = Kubectl::new(backends.commands.clone(), config.cluster.kubectl.clone());
        let poll = config.poll.policy();
        Ok(Self {
            config,
            backends,
            kubectl,
            poll,
            marker,
        })
    }

    /// Override the poll policy from configuration.
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn require_image(&self, ctx: &RunContext) -> Result<String, HarnessError> {
        ctx.image_ref()
            .ok_or_else(|| HarnessError::Assertion("image reference has not been set".to_string()))
    }

    fn health_url(&self, ctx: &RunContext) -> String {
        format!("{}://{}", self.config.health.scheme, ctx.fqdn(&self.config.dns.domain))
    }

    fn certificate_key(&self, ctx: &RunContext) -> String {
        format!("{}.crt", ctx.fqdn(&self.config.dns.domain))
    }
}

/// The eleven stages in their fixed order.
pub fn standard_stages(env: Arc<StageEnv>) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(BuildImage(env.clone())),
        Box::new(PublishImage(env.clone())),
        Box::new(CreateNamespace(env.clone())),
        Box::new(ApplyManifest(env.clone())),
        Box::new(AwaitServiceAddress(env.clone())),
        Box::new(CreateDnsRecord(env.clone())),
        Box::new(AwaitDnsPropagation(env.clone())),
        Box::new(AwaitHealthy(env.clone())),
        Box::new(AwaitJobCompletion(env.clone())),
        Box::new(VerifyRegistration(env.clone())),
        Box::new(VerifyCertificate(env)),
    ]
}

/// Builds the image tagged with the configured commit.
pub struct BuildImage(pub Arc<StageEnv>);

#[async_trait]
impl Stage for BuildImage {
    fn name(&self) -> &str {
        BUILD_IMAGE
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let build = &self.0.config.build;
        let image = build.image_ref().ok_or_else(|| {
            HarnessError::Config(
                "no commit configured (build.commit or BUILD_GIT_COMMIT); cannot build image"
                    .to_string(),
            )
        })?;
        ctx.set_image_ref(&image);

        if build.skip {
            info!(image = %image, "Build skipped; using published image");
            return Ok(());
        }

        let command = CommandSpec::new(&build.program)
            .args(["build", "-t", image.as_str()])
            .arg(build.context.to_string_lossy());
        self.0.backends.commands.run(&command).await?;
        info!(image = %image, "Built image");
        Ok(())
    }
}

/// Pushes the built image.
pub struct PublishImage(pub Arc<StageEnv>);

#[async_trait]
impl Stage for PublishImage {
    fn name(&self) -> &str {
        PUBLISH_IMAGE
    }

    fn enabled(&self) -> bool {
        !self.0.config.build.skip
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let image = self.0.require_image(ctx)?;
        let command = CommandSpec::new(&self.0.config.build.program).args(["push", image.as_str()]);
        self.0.backends.commands.run(&command).await?;
        info!(image = %image, "Published image");
        Ok(())
    }
}

/// Creates the run's namespace, named after the run id.
pub struct CreateNamespace(pub Arc<StageEnv>);

#[async_trait]
impl Stage for CreateNamespace {
    fn name(&self) -> &str {
        CREATE_NAMESPACE
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        self.0.kubectl.create_namespace(ctx.run_id()).await
    }
}

/// Renders the manifest for this run and applies it to the namespace.
pub struct ApplyManifest(pub Arc<StageEnv>);

#[async_trait]
impl Stage for ApplyManifest {
    fn name(&self) -> &str {
        APPLY_MANIFEST
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let image = self.0.require_image(ctx)?;
        let manifest_config = &self.0.config.manifest;
        let path = manifest::materialize(
            &manifest_config.template,
            &manifest_config.resolved_output_dir(),
            ctx.run_id(),
            &image,
            ctx.allocated_port(),
        )?;
        ctx.track_artifact(&path);
        self.0.kubectl.apply_manifest(ctx.run_id(), &path).await
    }
}

/// Waits until the service has a load-balancer address.
pub struct AwaitServiceAddress(pub Arc<StageEnv>);

#[async_trait]
impl Stage for AwaitServiceAddress {
    fn name(&self) -> &str {
        AWAIT_SERVICE_ADDRESS
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let kubectl = &self.0.kubectl;
        let namespace = ctx.run_id();
        let service = self.0.config.cluster.service_name.as_str();

        let address = poll_until("service address", self.0.poll, move |_| async move {
            match kubectl.poll_structured::<ServiceSnapshot>(namespace, service).await {
                PollOutcome::Ready(ServiceSnapshot {
                    address: Some(address),
                }) => match address.parse::<IpAddr>() {
                    Ok(ip) => PollOutcome::Ready(ip),
                    Err(_) => PollOutcome::not_ready(format!("'{}' is not an IP address", address)),
                },
                PollOutcome::Ready(_) => PollOutcome::not_ready("no ingress address yet"),
                PollOutcome::NotReady(reason) => PollOutcome::NotReady(reason),
            }
        })
        .await?;

        info!(address = %address, "Service address assigned");
        ctx.set_service_address(address);
        Ok(())
    }
}

/// Points `<run_id>.<domain>` at the service address.
pub struct CreateDnsRecord(pub Arc<StageEnv>);

#[async_trait]
impl Stage for CreateDnsRecord {
    fn name(&self) -> &str {
        CREATE_DNS_RECORD
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let address = ctx.service_address().ok_or_else(|| {
            HarnessError::Assertion("service address has not been discovered".to_string())
        })?;
        let dns = &self.0.config.dns;
        let record_id = self
            .0
            .backends
            .dns
            .create_record(&dns.zone_id, &ctx.fqdn(&dns.domain), &address.to_string())
            .await?;
        ctx.set_dns_record_id(record_id);
        Ok(())
    }
}

/// Waits until public resolution of the run's host returns the service address.
pub struct AwaitDnsPropagation(pub Arc<StageEnv>);

#[async_trait]
impl Stage for AwaitDnsPropagation {
    fn name(&self) -> &str {
        AWAIT_DNS_PROPAGATION
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let expected = ctx.service_address().ok_or_else(|| {
            HarnessError::Assertion("service address has not been discovered".to_string())
        })?;
        let host = ctx.fqdn(&self.0.config.dns.domain);
        let resolver = self.0.backends.resolver.as_ref();
        let host_ref = host.as_str();

        poll_until("DNS propagation", self.0.poll, move |_| async move {
            match resolver.lookup(host_ref).await {
                Ok(addrs) if addrs.contains(&expected) => PollOutcome::Ready(()),
                Ok(addrs) => PollOutcome::not_ready(format!("{} resolves to {:?}", host_ref, addrs)),
                Err(e) => PollOutcome::not_ready(e.to_string()),
            }
        })
        .await?;

        info!(host = %host, address = %expected, "DNS record resolves");
        Ok(())
    }
}

/// Waits for a 200 health response whose body matches the marker.
pub struct AwaitHealthy(pub Arc<StageEnv>);

#[async_trait]
impl Stage for AwaitHealthy {
    fn name(&self) -> &str {
        AWAIT_HEALTHY
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let url = self.0.health_url(ctx);
        let probe = self.0.backends.health.as_ref();
        let marker = &self.0.marker;
        let url_ref = url.as_str();

        poll_until("healthy response", self.0.poll, move |_| async move {
            match probe.check(url_ref).await {
                Ok(response) if response.status != 200 => {
                    PollOutcome::not_ready(format!("status {}", response.status))
                }
                Ok(response) if marker.is_match(&response.body) => PollOutcome::Ready(()),
                Ok(_) => PollOutcome::not_ready("body does not match health marker"),
                Err(e) => PollOutcome::not_ready(e.to_string()),
            }
        })
        .await?;

        info!(url = %url, "Service reports healthy");
        Ok(())
    }
}

/// Waits until the issuing job has exactly one successful completion.
pub struct AwaitJobCompletion(pub Arc<StageEnv>);

#[async_trait]
impl Stage for AwaitJobCompletion {
    fn name(&self) -> &str {
        AWAIT_JOB_COMPLETION
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let kubectl = &self.0.kubectl;
        let namespace = ctx.run_id();
        let job = self.0.config.cluster.job_name.as_str();

        let snapshot = poll_until("job completion", self.0.poll, move |_| async move {
            match kubectl.poll_structured::<JobSnapshot>(namespace, job).await {
                PollOutcome::Ready(snapshot) if snapshot.succeeded == 1 => PollOutcome::Ready(snapshot),
                PollOutcome::Ready(snapshot) => PollOutcome::not_ready(format!(
                    "succeeded={} failed={}",
                    snapshot.succeeded, snapshot.failed
                )),
                PollOutcome::NotReady(reason) => PollOutcome::NotReady(reason),
            }
        })
        .await?;

        info!(job, failed = snapshot.failed, "Job completed");
        Ok(())
    }
}

async fn fetch_secret_key(
    env: &StageEnv,
    ctx: &RunContext,
    secret: &str,
    key: &str,
) -> Result<(), HarnessError> {
    let snapshot: SecretSnapshot = env.kubectl.fetch_structured(ctx.run_id(), secret).await?;
    match snapshot.non_empty(key) {
        Some(_) => {
            info!(secret, key, "Secret entry present");
            Ok(())
        }
        None => Err(HarnessError::Assertion(format!(
            "secret '{}' has no value for '{}' (keys: {:?})",
            secret,
            key,
            snapshot.data.keys().collect::<Vec<_>>()
        ))),
    }
}

/// Asserts the ACME registration was stored.
pub struct VerifyRegistration(pub Arc<StageEnv>);

#[async_trait]
impl Stage for VerifyRegistration {
    fn name(&self) -> &str {
        VERIFY_REGISTRATION
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let cluster = &self.0.config.cluster;
        fetch_secret_key(&self.0, ctx, &cluster.registration_secret, &cluster.registration_key).await
    }
}

/// Asserts a certificate for the run's host was stored.
pub struct VerifyCertificate(pub Arc<StageEnv>);

#[async_trait]
impl Stage for VerifyCertificate {
    fn name(&self) -> &str {
        VERIFY_CERTIFICATE
    }

    async fn run(&self, ctx: &RunContext) -> Result<(), HarnessError> {
        let key = self.0.certificate_key(ctx);
        fetch_secret_key(&self.0, ctx, &self.0.config.cluster.certificate_secret, &key).await
    }
}
