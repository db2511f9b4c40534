//! Merge rules: defaults, override order, legacy environment fallbacks.

use super::HarnessConfig;
use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("build.program", "docker")?
        .set_default("cluster.kubectl", "kubectl")?
        .set_default("poll.interval_ms", 1000)?
        .set_default("poll.deadline_secs", 900)?
        .set_default("teardown.enabled", true)
}

/// Fill settings from the variables older CI pipelines export.
///
/// Only gaps are filled, except the two switches, which can only ever turn a
/// behaviour off: `SKIP_BUILD` skips build and push, `CERTRUN_NO_TEARDOWN`
/// keeps the run's resources.
pub fn apply_legacy_env<F>(config: &mut HarnessConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if config.build.commit.as_deref().map_or(true, |c| c.trim().is_empty()) {
        if let Some(commit) = set("BUILD_GIT_COMMIT") {
            config.build.commit = Some(commit);
        }
    }
    if config.dns.auth_key.is_empty() {
        if let Some(key) = set("CLOUDFLARE_API_KEY") {
            config.dns.auth_key = key;
        }
    }
    if set("SKIP_BUILD").is_some() {
        config.build.skip = true;
    }
    if set("CERTRUN_NO_TEARDOWN").is_some() {
        config.teardown.enabled = false;
    }
}
