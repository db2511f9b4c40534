//! CLI route: single route table and CLI context. Dispatches to the harness,
//! the manifest materializer and report presentation.

use crate::cli::parse::{Commands, OutputFormat};
use crate::config::{ConfigLoader, HarnessConfig};
use crate::error::HarnessError;
use crate::harness::Harness;
use crate::manifest;
use crate::report::{render_json, render_text, EXIT_COMPLETED, EXIT_INTERRUPTED};
use crate::signal::termination_signal;
use crate::stages::Backends;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Text to print and the process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub exit_code: i32,
}

impl CommandOutput {
    fn ok(text: String) -> Self {
        Self {
            text,
            exit_code: EXIT_COMPLETED,
        }
    }
}

/// Runtime context for CLI execution: workspace and effective configuration.
pub struct CliContext {
    workspace_root: PathBuf,
    config: HarnessConfig,
}

impl CliContext {
    /// Load configuration for `workspace_root` through `ConfigLoader`.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, HarnessError> {
        let config = ConfigLoader::load(&workspace_root, config_path.as_deref())?;
        Ok(Self::with_config(workspace_root, config))
    }

    pub fn with_config(workspace_root: PathBuf, config: HarnessConfig) -> Self {
        Self {
            workspace_root,
            config,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub async fn execute(&self, command: &Commands) -> Result<CommandOutput, HarnessError> {
        match command {
            Commands::Run {
                skip_build,
                no_teardown,
                format,
            } => {
                let config = self.run_config(*skip_build, *no_teardown);
                self.handle_run(config, *format).await
            }
            Commands::Render {
                template,
                image,
                subdomain,
                port,
                output_dir,
            } => self.handle_render(template, image, subdomain, *port, output_dir.as_deref()),
            Commands::Config => self.handle_config(),
        }
    }

    /// Effective configuration for a run after CLI flags are applied.
    pub fn run_config(&self, skip_build: bool, no_teardown: bool) -> HarnessConfig {
        let mut config = self.config.clone();
        if skip_build {
            config.build.skip = true;
        }
        if no_teardown {
            config.teardown.enabled = false;
        }
        if config.manifest.template.is_relative() {
            config.manifest.template = self.workspace_root.join(&config.manifest.template);
        }
        if config.build.context.is_relative() {
            config.build.context = self.workspace_root.join(&config.build.context);
        }
        config
    }

    async fn handle_run(
        &self,
        config: HarnessConfig,
        format: OutputFormat,
    ) -> Result<CommandOutput, HarnessError> {
        config.ensure_valid()?;
        let backends = Backends::system(&config)?;
        let harness = Harness::new(config, backends)?;

        let listener = harness.spawn_interrupt_listener(termination_signal(), |teardown| {
            if teardown.has_failures() {
                warn!("Teardown after interrupt left resources behind");
            }
            eprintln!("Interrupted; teardown finished.");
            std::process::exit(EXIT_INTERRUPTED);
        });

        let report = harness.run().await;
        listener.abort();
        info!(
            run_id = report.run_id.as_str(),
            state = report.state.as_str(),
            "Verification run finished"
        );

        let text = match format {
            OutputFormat::Text => render_text(&report),
            OutputFormat::Json => render_json(&report).map_err(|e| HarnessError::Decode {
                what: "run report".to_string(),
                reason: e.to_string(),
            })?,
        };
        Ok(CommandOutput {
            text,
            exit_code: report.exit_code(),
        })
    }

    fn handle_render(
        &self,
        template: &Path,
        image: &str,
        subdomain: &str,
        port: u16,
        output_dir: Option<&Path>,
    ) -> Result<CommandOutput, HarnessError> {
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => template
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let written = manifest::materialize(template, &output_dir, subdomain, image, port)?;
        Ok(CommandOutput::ok(format!("Wrote {}", written.display())))
    }

    fn handle_config(&self) -> Result<CommandOutput, HarnessError> {
        let text = toml::to_string_pretty(&self.config.redacted())
            .map_err(|e| HarnessError::Config(format!("Failed to serialize configuration: {}", e)))?;
        Ok(CommandOutput::ok(text))
    }
}
