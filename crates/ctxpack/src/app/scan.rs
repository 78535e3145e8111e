//! Grouping a folder's files by extension.

use std::collections::BTreeMap;
use std::path::Path;

use ignore::WalkBuilder;

use crate::domain::errors::ScanError;

/// Key used for files without an extension.
pub const UNKNOWN_EXTENSION: &str = "unknown";

/// Extension token (`.rs`, `.txt`, or [`UNKNOWN_EXTENSION`]) to sorted file names.
pub type FilesByExtension = BTreeMap<String, Vec<String>>;

/// List the regular files directly inside `folder`, grouped by extension.
///
/// Subdirectories are not descended into. Hidden and git-ignored files are included.
pub fn classify_by_extension(folder: &Path) -> Result<FilesByExtension, ScanError> {
    if !folder.is_dir() {
        return Err(ScanError::FolderNotFound(folder.to_path_buf()));
    }

    let walker = WalkBuilder::new(folder)
        .standard_filters(false)
        .follow_links(true)
        .max_depth(Some(1))
        .build();

    let mut grouped = FilesByExtension::new();
    for result in walker {
        let entry = result.map_err(|source| ScanError::Walk {
            path: folder.to_path_buf(),
            source,
        })?;
        if entry.depth() == 0 || !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        grouped
            .entry(extension_token(entry.path()))
            .or_default()
            .push(name);
    }

    for names in grouped.values_mut() {
        names.sort();
    }
    tracing::debug!(folder = %folder.display(), groups = grouped.len(), "classified folder");
    Ok(grouped)
}

fn extension_token(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{ext}"),
        _ => UNKNOWN_EXTENSION.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn groups_top_level_files_by_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path();
        fs::write(root.join("file1.txt"), "This is a mock .txt file")?;
        fs::write(root.join("script1.js"), "This is a mock .js file")?;
        fs::write(root.join("notes.txt"), "more")?;
        fs::write(root.join("Makefile"), "all:")?;
        fs::write(root.join(".gitignore"), "*.txt")?;
        fs::create_dir_all(root.join("nested"))?;
        fs::write(root.join("nested/deep.rs"), "fn main() {}")?;

        let grouped = classify_by_extension(root)?;

        assert_eq!(
            grouped.get(".txt"),
            Some(&vec!["file1.txt".to_string(), "notes.txt".to_string()])
        );
        assert_eq!(grouped.get(".js"), Some(&vec!["script1.js".to_string()]));
        assert_eq!(
            grouped.get(UNKNOWN_EXTENSION),
            Some(&vec![".gitignore".to_string(), "Makefile".to_string()])
        );
        assert!(!grouped.contains_key(".rs"));
        Ok(())
    }

    #[test]
    fn empty_folder_yields_no_groups() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        assert!(classify_by_extension(temp.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_folder_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("absent");
        let err = classify_by_extension(&missing).unwrap_err();
        assert!(matches!(err, ScanError::FolderNotFound(path) if path == missing));
    }
}
