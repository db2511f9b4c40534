//! Layered configuration: global file, workspace file, explicit file, environment.

use certrun::cli::{Cli, CliContext, Commands};
use certrun::config::ConfigLoader;
use clap::Parser;
use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes tests that touch process environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        let saved = vars
            .iter()
            .map(|(key, value)| {
                let previous = std::env::var(key).ok();
                std::env::set_var(key, value);
                (*key, previous)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, previous) in &self.saved {
            match previous {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

#[test]
fn test_layers_apply_in_precedence_order() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let xdg = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    std::fs::create_dir_all(xdg.path().join("certrun")).unwrap();
    std::fs::write(
        xdg.path().join("certrun/config.toml"),
        "[dns]\ndomain = \"global.test\"\nzone_id = \"global-zone\"\nauth_email = \"global@example.test\"\n",
    )
    .unwrap();
    std::fs::create_dir_all(workspace.path().join("config")).unwrap();
    std::fs::write(
        workspace.path().join("config/config.toml"),
        "[dns]\nzone_id = \"workspace-zone\"\n\n[poll]\ndeadline_secs = 60\n",
    )
    .unwrap();
    let explicit = workspace.path().join("ci.toml");
    std::fs::write(&explicit, "[poll]\ndeadline_secs = 120\ninterval_ms = 500\n").unwrap();

    let xdg_path = xdg.path().to_string_lossy().to_string();
    let _env = EnvGuard::set(&[
        ("XDG_CONFIG_HOME", xdg_path.as_str()),
        ("CERTRUN_ENV", "integration"),
        ("CERTRUN__POLL__INTERVAL_MS", "250"),
    ]);

    let config = ConfigLoader::load_with_env(workspace.path(), Some(&explicit), |key| match key {
        "BUILD_GIT_COMMIT" => Some("feedface".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(config.dns.domain, "global.test");
    assert_eq!(config.dns.auth_email, "global@example.test");
    assert_eq!(config.dns.zone_id, "workspace-zone");
    assert_eq!(config.poll.deadline_secs, 120);
    assert_eq!(config.poll.interval_ms, 250);
    assert_eq!(config.build.commit.as_deref(), Some("feedface"));
    assert!(config.teardown.enabled);
}

#[test]
fn test_cli_context_and_flags() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let xdg = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let xdg_path = xdg.path().to_string_lossy().to_string();
    let _env = EnvGuard::set(&[("XDG_CONFIG_HOME", xdg_path.as_str())]);

    let ws = workspace.path().to_string_lossy().to_string();
    let cli = Cli::try_parse_from([
        "certrun",
        "--workspace",
        ws.as_str(),
        "run",
        "--skip-build",
        "--no-teardown",
        "--format",
        "json",
    ])
    .unwrap();

    let (skip_build, no_teardown) = match cli.command {
        Commands::Run {
            skip_build,
            no_teardown,
            ..
        } => (skip_build, no_teardown),
        other => panic!("unexpected command {:?}", other),
    };

    let context = CliContext::new(cli.workspace.clone(), cli.config.clone()).unwrap();
    let config = context.run_config(skip_build, no_teardown);
    assert!(config.build.skip);
    assert!(!config.teardown.enabled);
    assert_eq!(
        config.manifest.template,
        workspace.path().join("test-fixtures/kubernetes-resources.yml")
    );
}

#[test]
fn test_missing_explicit_config_file_fails() {
    let workspace = TempDir::new().unwrap();
    let missing = workspace.path().join("nope.toml");
    let err = ConfigLoader::load_with_env(workspace.path(), Some(&missing), |_| None).unwrap_err();
    assert_eq!(err.kind(), "config");
}
