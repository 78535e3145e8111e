//! Copying a file selection into an isolated workspace.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::errors::PipelineError;
use crate::domain::model::{CopyFailure, CopyFailureKind, FileSelection, MaterializedWorkspace, RunId};
use crate::infra::config::Config;
use crate::infra::naming::next_run_id;

const MAX_CREATE_ATTEMPTS: usize = 3;

/// How the directory that workspace paths are relative to is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum ReferencePolicy {
    /// Parent directory of the first selected file. Files outside it are reported as failures.
    #[default]
    FirstParent,
    /// Deepest directory containing every selected file.
    CommonAncestor,
}

impl ReferencePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferencePolicy::FirstParent => "first-parent",
            ReferencePolicy::CommonAncestor => "common-ancestor",
        }
    }
}

impl fmt::Display for ReferencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferencePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first-parent" | "first" => Ok(ReferencePolicy::FirstParent),
            "common-ancestor" | "common" => Ok(ReferencePolicy::CommonAncestor),
            other => anyhow::bail!("unknown reference policy '{other}'"),
        }
    }
}

/// Copies selections into `<scratch_root>/<token>-<timestamp>/`, preserving relative layout.
#[derive(Debug, Clone)]
pub struct WorkspaceMaterializer {
    scratch_root: PathBuf,
    policy: ReferencePolicy,
}

impl WorkspaceMaterializer {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            policy: ReferencePolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = config.materialize.reference().parse()?;
        Ok(Self::new(config.paths.scratch_root()).with_policy(policy))
    }

    pub fn with_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Materialize `paths`, failing with [`PipelineError::InputEmpty`] when none are given.
    pub fn materialize<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<MaterializedWorkspace, PipelineError> {
        let selection = FileSelection::new(paths.iter().map(|path| path.as_ref().to_path_buf()))?;
        self.materialize_selection(&selection)
    }

    /// Copy every selected file, in order, into a fresh workspace.
    ///
    /// Per-file failures are collected in [`MaterializedWorkspace::failures`]; the remaining
    /// files are still attempted and the workspace is returned regardless.
    pub fn materialize_selection(
        &self,
        selection: &FileSelection,
    ) -> Result<MaterializedWorkspace, PipelineError> {
        let sources: Vec<PathBuf> = selection.paths().iter().map(|p| absolutize(p)).collect();
        let reference_dir = match self.policy {
            ReferencePolicy::FirstParent => parent_dir(&sources[0]),
            ReferencePolicy::CommonAncestor => common_ancestor(&sources),
        };

        let (run_id, root) = self.create_workspace()?;
        tracing::info!(
            workspace = %root.display(),
            reference = %reference_dir.display(),
            files = sources.len(),
            "materializing selection"
        );

        let mut copied = Vec::with_capacity(sources.len());
        let mut failures = Vec::new();

        for (original, source) in selection.paths().iter().zip(&sources) {
            match copy_into(&root, &reference_dir, source) {
                Ok(relative) => {
                    tracing::debug!(source = %source.display(), target = %relative.display(), "copied");
                    copied.push(relative);
                }
                Err(failure) => {
                    let failure = CopyFailure {
                        path: original.clone(),
                        ..failure
                    };
                    tracing::warn!(
                        path = %failure.path.display(),
                        kind = ?failure.kind,
                        "{}",
                        failure.message
                    );
                    failures.push(failure);
                }
            }
        }

        Ok(MaterializedWorkspace {
            root,
            reference_dir,
            run_id,
            copied,
            failures,
        })
    }

    fn create_workspace(&self) -> Result<(RunId, PathBuf), PipelineError> {
        let scratch_root = absolutize(&self.scratch_root);
        fs::create_dir_all(&scratch_root)
            .map_err(|err| PipelineError::io("failed to create scratch root", &scratch_root, err))?;

        let mut attempt = 1;
        loop {
            let run_id = next_run_id()?;
            let root = scratch_root.join(run_id.dir_name());
            match fs::create_dir(&root) {
                Ok(()) => return Ok((run_id, root)),
                Err(err)
                    if err.kind() == io::ErrorKind::AlreadyExists
                        && attempt < MAX_CREATE_ATTEMPTS =>
                {
                    tracing::warn!(workspace = %root.display(), "workspace name collision, retrying");
                    attempt += 1;
                }
                Err(err) => {
                    return Err(PipelineError::io("failed to create workspace", root, err));
                }
            }
        }
    }
}

fn copy_into(root: &Path, reference_dir: &Path, source: &Path) -> Result<PathBuf, CopyFailure> {
    let outside = |detail: String| CopyFailure {
        path: source.to_path_buf(),
        kind: CopyFailureKind::OutsideReference,
        message: detail,
    };

    let relative = relative_path(reference_dir, source).ok_or_else(|| {
        outside(format!(
            "no relative path from {} to {}",
            reference_dir.display(),
            source.display()
        ))
    })?;
    if relative
        .components()
        .any(|component| component == Component::ParentDir)
    {
        return Err(outside(format!(
            "relative path {} leaves reference directory {}",
            relative.display(),
            reference_dir.display()
        )));
    }

    let destination = root.join(&relative);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|err| CopyFailure::from_io(source, &err))?;
    }
    fs::copy(source, &destination).map_err(|err| CopyFailure::from_io(source, &err))?;
    Ok(relative)
}

/// Lexical path from `base` to `target`, using `..` segments where `target` is outside `base`.
///
/// Both paths are expected to be normalized. Returns `None` when they share no root.
pub fn relative_path(base: &Path, target: &Path) -> Option<PathBuf> {
    if base.has_root() != target.has_root() {
        return None;
    }

    let base_parts: Vec<Component<'_>> = base.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();
    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if base.has_root() && common == 0 {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }
    Some(relative)
}

/// Deepest directory that contains every path's parent.
pub fn common_ancestor(paths: &[PathBuf]) -> PathBuf {
    let mut parents = paths.iter().map(|path| parent_dir(path));
    let Some(first) = parents.next() else {
        return PathBuf::new();
    };

    let mut ancestor = first;
    for parent in parents {
        ancestor = ancestor
            .components()
            .zip(parent.components())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.as_os_str())
            .collect();
    }
    ancestor
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}

fn absolutize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize(&absolute)
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    #[test]
    fn empty_selection_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let materializer = WorkspaceMaterializer::new(temp.path().join("tmp"));
        let result = materializer.materialize::<PathBuf>(&[]);
        assert!(matches!(result, Err(PipelineError::InputEmpty)));
        assert!(!temp.path().join("tmp").exists());
    }

    #[test]
    fn copies_relative_to_first_parent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let proj = temp.path().join("proj");
        write(&proj.join("a.txt"), "alpha")?;
        write(&proj.join("sub/b.js"), "beta")?;
        write(&proj.join("sub/c.py"), "gamma")?;

        let materializer = WorkspaceMaterializer::new(temp.path().join("tmp"));
        let workspace =
            materializer.materialize(&[proj.join("a.txt"), proj.join("sub/b.js")])?;

        assert!(workspace.is_complete());
        assert_eq!(workspace.reference_dir, proj);
        assert_eq!(
            workspace.copied,
            vec![PathBuf::from("a.txt"), PathBuf::from("sub/b.js")]
        );
        assert_eq!(fs::read_to_string(workspace.root.join("a.txt"))?, "alpha");
        assert_eq!(fs::read_to_string(workspace.root.join("sub/b.js"))?, "beta");
        assert!(!workspace.root.join("sub/c.py").exists());
        assert!(workspace.root.starts_with(temp.path().join("tmp")));
        Ok(())
    }

    #[test]
    fn missing_files_do_not_abort_the_copy() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let proj = temp.path().join("proj");
        write(&proj.join("a.txt"), "alpha")?;
        write(&proj.join("c.txt"), "gamma")?;

        let materializer = WorkspaceMaterializer::new(temp.path().join("tmp"));
        let workspace = materializer.materialize(&[
            proj.join("a.txt"),
            proj.join("missing.txt"),
            proj.join("c.txt"),
        ])?;

        assert_eq!(workspace.copied.len(), 2);
        assert_eq!(workspace.failures.len(), 1);
        assert_eq!(workspace.failures[0].path, proj.join("missing.txt"));
        assert_eq!(workspace.failures[0].kind, CopyFailureKind::SourceMissing);
        assert!(workspace.root.join("c.txt").exists());
        Ok(())
    }

    #[test]
    fn first_parent_reports_files_outside_reference() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write(&temp.path().join("left/one.txt"), "1")?;
        write(&temp.path().join("right/two.txt"), "2")?;

        let scratch = temp.path().join("tmp");
        let workspace = WorkspaceMaterializer::new(&scratch).materialize(&[
            temp.path().join("left/one.txt"),
            temp.path().join("right/two.txt"),
        ])?;

        assert_eq!(workspace.copied, vec![PathBuf::from("one.txt")]);
        assert_eq!(workspace.failures.len(), 1);
        assert_eq!(workspace.failures[0].kind, CopyFailureKind::OutsideReference);
        assert!(workspace.failures[0].message.contains("../right/two.txt"));
        assert!(!scratch.join("right").exists());
        Ok(())
    }

    #[test]
    fn common_ancestor_keeps_sibling_trees() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write(&temp.path().join("left/one.txt"), "1")?;
        write(&temp.path().join("right/deep/two.txt"), "2")?;

        let workspace = WorkspaceMaterializer::new(temp.path().join("tmp"))
            .with_policy(ReferencePolicy::CommonAncestor)
            .materialize(&[
                temp.path().join("left/one.txt"),
                temp.path().join("right/deep/two.txt"),
            ])?;

        assert!(workspace.is_complete());
        assert_eq!(workspace.reference_dir, temp.path());
        assert!(workspace.root.join("left/one.txt").exists());
        assert!(workspace.root.join("right/deep/two.txt").exists());
        Ok(())
    }

    #[test]
    fn duplicates_are_copied_redundantly() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write(&temp.path().join("proj/a.txt"), "alpha")?;
        let file = temp.path().join("proj/a.txt");

        let workspace = WorkspaceMaterializer::new(temp.path().join("tmp"))
            .materialize(&[file.clone(), file])?;
        assert_eq!(workspace.copied.len(), 2);
        assert!(workspace.is_complete());
        Ok(())
    }

    #[test]
    fn relative_path_uses_parent_segments() {
        assert_eq!(
            relative_path(Path::new("/proj/left"), Path::new("/proj/right/b.txt")),
            Some(PathBuf::from("../right/b.txt"))
        );
        assert_eq!(
            relative_path(Path::new("/proj"), Path::new("/proj/sub/b.js")),
            Some(PathBuf::from("sub/b.js"))
        );
        assert_eq!(relative_path(Path::new("/proj"), Path::new("proj/a")), None);
    }

    #[test]
    fn common_ancestor_of_siblings() {
        let paths = vec![
            PathBuf::from("/proj/a/x.txt"),
            PathBuf::from("/proj/b/c/y.txt"),
            PathBuf::from("/proj/a/z.txt"),
        ];
        assert_eq!(common_ancestor(&paths), PathBuf::from("/proj"));
        assert_eq!(
            common_ancestor(&[PathBuf::from("/proj/a/x.txt")]),
            PathBuf::from("/proj/a")
        );
    }

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn parses_reference_policy() -> anyhow::Result<()> {
        assert_eq!("first-parent".parse::<ReferencePolicy>()?, ReferencePolicy::FirstParent);
        assert_eq!("COMMON".parse::<ReferencePolicy>()?, ReferencePolicy::CommonAncestor);
        assert!("nearest".parse::<ReferencePolicy>().is_err());
        Ok(())
    }
}
