//! Materialize → pack, composed.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::app::materialize::WorkspaceMaterializer;
use crate::app::packager::PackagerInvoker;
use crate::domain::errors::PipelineError;
use crate::domain::model::{MaterializedWorkspace, PackArtifact};
use crate::infra::config::Config;
use crate::infra::process::ProcessRunner;

/// Everything a pipeline run produced. The workspace is left on disk for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub workspace: MaterializedWorkspace,
    pub artifact: PackArtifact,
}

pub struct Pipeline<R> {
    materializer: WorkspaceMaterializer,
    packager: PackagerInvoker<R>,
}

impl<R: ProcessRunner> Pipeline<R> {
    pub fn new(materializer: WorkspaceMaterializer, packager: PackagerInvoker<R>) -> Self {
        Self {
            materializer,
            packager,
        }
    }

    pub fn from_config(config: &Config, runner: R) -> Result<Self> {
        Ok(Self::new(
            WorkspaceMaterializer::from_config(config)?,
            PackagerInvoker::from_config(config, runner)?,
        ))
    }

    /// Copy `paths` into a fresh workspace and pack it. Per-file copy failures do not stop the
    /// pack; they are returned in the report.
    pub fn run<P: AsRef<Path>>(&self, paths: &[P]) -> Result<PipelineReport, PipelineError> {
        let workspace = self.materializer.materialize(paths)?;
        if !workspace.is_complete() {
            tracing::warn!(
                failed = workspace.failures.len(),
                copied = workspace.copied.len(),
                "packing a partial workspace"
            );
        }
        let artifact = self.packager.pack(&workspace.root)?;
        Ok(PipelineReport {
            workspace,
            artifact,
        })
    }
}
