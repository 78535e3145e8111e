//! Domain-specific errors.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal failures of the materialize → pack pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no files selected")]
    InputEmpty,
    #[error("workspace not found: {}", .0.display())]
    WorkspaceNotFound(PathBuf),
    #[error("packaging failed running `{command}`: {reason}")]
    PackagingFailed { command: String, reason: String },
    #[error("failed to name run: {0}")]
    Naming(#[from] time::error::Format),
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Failures raised by the extension classifier.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("folder {} does not exist", .0.display())]
    FolderNotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },
}

/// Failures raised by the task optimizer.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("unsupported provider: {0}")]
    ProviderUnsupported(String),
    #[error("API key for {provider} is missing; set the {variable} environment variable")]
    CredentialMissing {
        provider: &'static str,
        variable: &'static str,
    },
    #[error("mock data missing: {0}")]
    MockDataMissing(String),
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
    #[error("failed to render prompt: {0}")]
    Template(#[from] minijinja::Error),
}
