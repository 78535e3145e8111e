//! Driving the external packaging tool against a workspace.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::app::pack_config::ConfigGenerator;
use crate::domain::errors::PipelineError;
use crate::domain::model::PackArtifact;
use crate::infra::config::Config;
use crate::infra::naming::{is_run_name, next_run_id};
use crate::infra::process::{ProcessRunner, display_command};

/// Progress of a single [`PackagerInvoker::pack`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStage {
    Idle,
    ValidatingWorkspace,
    GeneratingConfig,
    Invoking,
    Succeeded,
    Failed,
}

impl fmt::Display for PackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PackStage::Idle => "idle",
            PackStage::ValidatingWorkspace => "validating-workspace",
            PackStage::GeneratingConfig => "generating-config",
            PackStage::Invoking => "invoking",
            PackStage::Succeeded => "succeeded",
            PackStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

struct StageTracker {
    stage: PackStage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: PackStage::Idle,
        }
    }

    fn advance(&mut self, next: PackStage) {
        tracing::debug!(from = %self.stage, to = %next, "pack stage");
        self.stage = next;
    }
}

/// External tool invocation: program, leading arguments, and artifact extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub extension: String,
}

impl PackagerCommand {
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: config.packager.program(),
            args: config.packager.args(),
            extension: config.packager.extension(),
        }
    }
}

/// Names the artifact, writes its config, and runs the packaging tool.
pub struct PackagerInvoker<R> {
    results_root: PathBuf,
    command: PackagerCommand,
    generator: ConfigGenerator,
    runner: R,
}

impl<R: ProcessRunner> PackagerInvoker<R> {
    pub fn new(
        results_root: impl Into<PathBuf>,
        command: PackagerCommand,
        generator: ConfigGenerator,
        runner: R,
    ) -> Self {
        Self {
            results_root: results_root.into(),
            command,
            generator,
            runner,
        }
    }

    pub fn from_config(config: &Config, runner: R) -> Result<Self> {
        Ok(Self::new(
            config.paths.results_root(),
            PackagerCommand::from_config(config),
            ConfigGenerator::from_config(config)?,
            runner,
        ))
    }

    /// Pack `workspace_root` into `<results_root>/<token>-<timestamp>-pack.<ext>`.
    ///
    /// Fails with [`PipelineError::WorkspaceNotFound`] before touching the results root when the
    /// workspace is missing. The returned artifact path is not checked for existence.
    pub fn pack(&self, workspace_root: &Path) -> Result<PackArtifact, PipelineError> {
        let mut tracker = StageTracker::new();
        let result = self.run_stages(&mut tracker, workspace_root);
        match &result {
            Ok(artifact) => {
                tracker.advance(PackStage::Succeeded);
                tracing::info!(artifact = %artifact.path.display(), "packed workspace");
            }
            Err(err) => {
                let failed_in = tracker.stage;
                tracker.advance(PackStage::Failed);
                tracing::error!(stage = %failed_in, error = %err, "packing failed");
            }
        }
        result
    }

    fn run_stages(
        &self,
        tracker: &mut StageTracker,
        workspace_root: &Path,
    ) -> Result<PackArtifact, PipelineError> {
        tracker.advance(PackStage::ValidatingWorkspace);
        if !workspace_root.is_dir() {
            return Err(PipelineError::WorkspaceNotFound(workspace_root.to_path_buf()));
        }
        let name = workspace_root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if !is_run_name(name) {
            tracing::debug!(workspace = name, "packing a directory not created by materialize");
        }

        tracker.advance(PackStage::GeneratingConfig);
        let results_root = std::path::absolute(&self.results_root).map_err(|err| {
            PipelineError::io("failed to resolve results root", &self.results_root, err)
        })?;
        fs::create_dir_all(&results_root)
            .map_err(|err| PipelineError::io("failed to create results root", &results_root, err))?;
        let run_id = next_run_id()?;
        let artifact_path = results_root.join(run_id.artifact_file_name(&self.command.extension));
        tracing::info!(artifact = %artifact_path.display(), "naming artifact");
        let config_path = self.generator.generate(&results_root, &artifact_path)?;

        tracker.advance(PackStage::Invoking);
        let mut args: Vec<OsString> = self.command.args.iter().map(OsString::from).collect();
        args.push(workspace_root.as_os_str().to_owned());
        args.push(OsString::from("--config"));
        args.push(config_path.as_os_str().to_owned());

        let command_line = display_command(&self.command.program, &args);
        tracing::info!(command = %command_line, "running packager");

        let output = self
            .runner
            .run(&self.command.program, &args)
            .map_err(|err| PipelineError::PackagingFailed {
                command: command_line.clone(),
                reason: format!("failed to spawn: {err}"),
            })?;
        if !output.success() {
            let reason = match output.exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_owned(),
            };
            let stderr = output.stderr.trim();
            let reason = if stderr.is_empty() {
                reason
            } else {
                format!("{reason}: {stderr}")
            };
            return Err(PipelineError::PackagingFailed {
                command: command_line,
                reason,
            });
        }

        Ok(PackArtifact {
            path: artifact_path,
            config_path,
            run_id,
        })
    }
}
