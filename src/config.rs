//! Configuration System
//!
//! Layered harness configuration: built-in defaults, the global user file, workspace
//! files, an explicit `--config` file, then `CERTRUN__SECTION__KEY` environment
//! variables. Legacy variables fill gaps last.

use crate::error::HarnessError;
use crate::logging::LoggingConfig;
use crate::poll::PollPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod merge;
mod sources;

pub use merge::apply_legacy_env;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub manifest: ManifestConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub teardown: TeardownConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Container build and publish settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Container tool used for build and push
    #[serde(default = "default_build_program")]
    pub program: String,

    /// Image repository without tag
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Commit used as the image tag. Required by the build stage.
    #[serde(default)]
    pub commit: Option<String>,

    /// Build context directory
    #[serde(default = "default_build_context")]
    pub context: PathBuf,

    /// Reuse an already published image: no build, no push
    #[serde(default)]
    pub skip: bool,
}

fn default_build_program() -> String {
    "docker".to_string()
}

fn default_repository() -> String {
    "quay.io/hiphipjorge/auto-kubernetes-lets-encrypt".to_string()
}

fn default_build_context() -> PathBuf {
    PathBuf::from(".")
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: default_build_program(),
            repository: default_repository(),
            commit: None,
            context: default_build_context(),
            skip: false,
        }
    }
}

impl BuildConfig {
    /// Tagged image reference, if a commit is configured.
    pub fn image_ref(&self) -> Option<String> {
        self.commit
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|commit| format!("{}:{}", self.repository, commit))
    }
}

/// Deployment manifest template settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestConfig {
    #[serde(default = "default_template")]
    pub template: PathBuf,

    /// Directory for rendered manifests; the template's directory when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_template() -> PathBuf {
    PathBuf::from("test-fixtures/kubernetes-resources.yml")
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
            output_dir: None,
        }
    }
}

impl ManifestConfig {
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            self.template
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }
}

/// Names of the objects the deployment creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_kubectl")]
    pub kubectl: String,

    #[serde(default = "default_workload_name")]
    pub service_name: String,

    #[serde(default = "default_workload_name")]
    pub job_name: String,

    #[serde(default = "default_registration_secret")]
    pub registration_secret: String,

    #[serde(default = "default_registration_key")]
    pub registration_key: String,

    #[serde(default = "default_certificate_secret")]
    pub certificate_secret: String,
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_workload_name() -> String {
    "auto-kubernetes-lets-encrypt".to_string()
}

fn default_registration_secret() -> String {
    "auto-kubernetes-lets-encrypt-user".to_string()
}

fn default_registration_key() -> String {
    "registration".to_string()
}

fn default_certificate_secret() -> String {
    "auto-kubernetes-lets-encrypt-certs".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            service_name: default_workload_name(),
            job_name: default_workload_name(),
            registration_secret: default_registration_secret(),
            registration_key: default_registration_key(),
            certificate_secret: default_certificate_secret(),
        }
    }
}

/// DNS provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_dns_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub zone_id: String,

    /// Parent domain; each run gets `<run_id>.<domain>`
    #[serde(default)]
    pub domain: String,

    #[serde(default)]
    pub auth_email: String,

    #[serde(default)]
    pub auth_key: String,
}

fn default_dns_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            api_base: default_dns_api_base(),
            zone_id: String::new(),
            domain: String::new(),
            auth_email: String::new(),
            auth_key: String::new(),
        }
    }
}

/// Health probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Regular expression the response body must match
    #[serde(default = "default_marker")]
    pub marker: String,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_marker() -> String {
    "Healthy.*true".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            marker: default_marker(),
        }
    }
}

/// Blocking poll settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound per polling stage; 0 polls forever
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_deadline_secs() -> u64 {
    900
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        let deadline = (self.deadline_secs > 0).then(|| Duration::from_secs(self.deadline_secs));
        PollPolicy::new(Duration::from_millis(self.interval_ms), deadline)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeardownConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub key: String,
    pub message: String,
}

impl ValidationError {
    fn new(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl HarnessConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let required = [
            ("build.program", &self.build.program),
            ("build.repository", &self.build.repository),
            ("cluster.kubectl", &self.cluster.kubectl),
            ("cluster.service_name", &self.cluster.service_name),
            ("cluster.job_name", &self.cluster.job_name),
            ("cluster.registration_secret", &self.cluster.registration_secret),
            ("cluster.registration_key", &self.cluster.registration_key),
            ("cluster.certificate_secret", &self.cluster.certificate_secret),
            ("dns.zone_id", &self.dns.zone_id),
            ("dns.domain", &self.dns.domain),
            ("dns.auth_email", &self.dns.auth_email),
            ("dns.auth_key", &self.dns.auth_key),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                errors.push(ValidationError::new(key, "must not be empty"));
            }
        }

        if !self.dns.api_base.starts_with("http://") && !self.dns.api_base.starts_with("https://")
        {
            errors.push(ValidationError::new(
                "dns.api_base",
                format!("'{}' is not an http(s) URL", self.dns.api_base),
            ));
        }

        if self.health.scheme != "http" && self.health.scheme != "https" {
            errors.push(ValidationError::new(
                "health.scheme",
                "must be 'http' or 'https'",
            ));
        }

        if let Err(e) = regex::Regex::new(&self.health.marker) {
            errors.push(ValidationError::new("health.marker", e.to_string()));
        }

        if self.poll.interval_ms == 0 {
            errors.push(ValidationError::new("poll.interval_ms", "must be positive"));
        }

        if self.manifest.template.as_os_str().is_empty() {
            errors.push(ValidationError::new("manifest.template", "must not be empty"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all problems into one error.
    pub fn ensure_valid(&self) -> Result<(), HarnessError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            HarnessError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }

    /// Copy safe to print: credentials replaced.
    pub fn redacted(&self) -> HarnessConfig {
        let mut copy = self.clone();
        if !copy.dns.auth_key.is_empty() {
            copy.dns.auth_key = "<redacted>".to_string();
        }
        copy
    }
}

/// Loads `HarnessConfig` from all layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace, optionally adding an explicit file.
    pub fn load(workspace_root: &Path, explicit: Option<&Path>) -> Result<HarnessConfig, HarnessError> {
        Self::load_with_env(workspace_root, explicit, |key| std::env::var(key).ok())
    }

    /// Same as [`ConfigLoader::load`], with legacy variables read through `lookup`.
    pub fn load_with_env<F>(
        workspace_root: &Path,
        explicit: Option<&Path>,
        lookup: F,
    ) -> Result<HarnessConfig, HarnessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = merge::builder_with_defaults()?;
        builder = sources::global_file::add_to_builder(builder)?;
        builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(HarnessError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CERTRUN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: HarnessConfig = builder.build()?.try_deserialize()?;
        apply_legacy_env(&mut config, lookup);
        Ok(config)
    }

    /// Load only the given file on top of defaults.
    pub fn load_from_file(path: &Path) -> Result<HarnessConfig, HarnessError> {
        let config = merge::builder_with_defaults()?
            .add_source(config::File::from(path.to_path_buf()).required(true))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Path of the user-level config file, if a home directory is known.
    pub fn global_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }
}
