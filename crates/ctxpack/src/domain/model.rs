//! Domain models for selections, workspaces, and pack artifacts.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::errors::PipelineError;

/// Ordered, non-empty list of files chosen by the caller. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    paths: Vec<PathBuf>,
}

impl FileSelection {
    /// Build a selection, rejecting an empty list with [`PipelineError::InputEmpty`].
    pub fn new<I, P>(paths: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return Err(PipelineError::InputEmpty);
        }
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Token plus truncated timestamp identifying one workspace or artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RunId {
    token: String,
    timestamp: String,
}

impl RunId {
    pub fn new(token: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Directory name used for a workspace: `<token>-<timestamp>`.
    pub fn dir_name(&self) -> String {
        self.to_string()
    }

    /// Artifact file name: `<token>-<timestamp>-pack.<ext>`.
    pub fn artifact_file_name(&self, extension: &str) -> String {
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            format!("{self}-pack")
        } else {
            format!("{self}-pack.{extension}")
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.token, self.timestamp)
    }
}

/// Classification of a per-file copy failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyFailureKind {
    SourceMissing,
    PermissionDenied,
    /// The file lies outside the reference directory and would land outside the workspace.
    OutsideReference,
    Other,
}

/// A file that could not be copied into a workspace. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyFailure {
    pub path: PathBuf,
    pub kind: CopyFailureKind,
    pub message: String,
}

impl CopyFailure {
    pub(crate) fn from_io(path: &Path, err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => CopyFailureKind::SourceMissing,
            io::ErrorKind::PermissionDenied => CopyFailureKind::PermissionDenied,
            _ => CopyFailureKind::Other,
        };
        Self {
            path: path.to_path_buf(),
            kind,
            message: err.to_string(),
        }
    }
}

/// Result of materializing a selection: the workspace plus any per-file failures.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializedWorkspace {
    pub root: PathBuf,
    pub reference_dir: PathBuf,
    pub run_id: RunId,
    /// Workspace-relative paths of the copied files, in selection order.
    pub copied: Vec<PathBuf>,
    pub failures: Vec<CopyFailure>,
}

impl MaterializedWorkspace {
    /// Whether every selected file made it into the workspace.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Output of a successful pack. The artifact file itself is not verified.
#[derive(Debug, Clone, Serialize)]
pub struct PackArtifact {
    pub path: PathBuf,
    pub config_path: PathBuf,
    pub run_id: RunId,
}
