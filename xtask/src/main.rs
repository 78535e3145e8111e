use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use cargo_metadata::MetadataCommand;
use clap::{Parser, Subcommand};
use ctxpack::infra::naming::is_run_name;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(author, version, about = "ctxpack automation commands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cargo nextest with default configuration
    Nextest {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        release: bool,
    },
    /// Check formatting and run clippy with warnings denied
    Lint,
    /// Verify the bundled default config parses and has every section
    CheckDefaults,
    /// Remove run directories left in the scratch and results roots
    Clean {
        #[arg(long, default_value = "tmp")]
        scratch_root: PathBuf,
        #[arg(long, default_value = "results")]
        results_root: PathBuf,
        /// Only list what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

const REQUIRED_SECTIONS: &[&str] = &["paths", "packager", "materialize", "ignore", "optimizer"];

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Nextest { profile, release } => run_nextest(profile, release)?,
        Commands::Lint => run_lint()?,
        Commands::CheckDefaults => check_defaults()?,
        Commands::Clean {
            scratch_root,
            results_root,
            dry_run,
        } => clean(&[scratch_root, results_root], dry_run)?,
    }
    Ok(())
}

fn run_nextest(profile: Option<String>, release: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("nextest").arg("run").arg("--workspace");
    if let Some(profile) = profile {
        cmd.arg("--profile").arg(profile);
    }
    if release {
        cmd.arg("--release");
    }
    cargo(cmd, "cargo nextest run")
}

fn run_lint() -> Result<()> {
    let mut fmt = Command::new("cargo");
    fmt.args(["fmt", "--all", "--", "--check"]);
    cargo(fmt, "cargo fmt")?;

    let mut clippy = Command::new("cargo");
    clippy.args(["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"]);
    cargo(clippy, "cargo clippy")
}

fn cargo(mut cmd: Command, label: &str) -> Result<()> {
    let status = cmd.status().with_context(|| format!("failed to spawn {label}"))?;
    if !status.success() {
        bail!("{label} failed");
    }
    Ok(())
}

fn check_defaults() -> Result<()> {
    let metadata = MetadataCommand::new().no_deps().exec()?;
    let package = metadata
        .workspace_packages()
        .into_iter()
        .find(|package| package.name == "ctxpack")
        .context("ctxpack package not found in workspace")?;
    let manifest_dir = package
        .manifest_path
        .parent()
        .context("manifest path has no parent")?;
    let path = manifest_dir.join("assets/default-config.toml");

    let raw = fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
    let table: toml::Table = toml::from_str(&raw).with_context(|| format!("failed to parse {path}"))?;

    let missing: Vec<_> = REQUIRED_SECTIONS
        .iter()
        .filter(|section| !table.get(**section).is_some_and(toml::Value::is_table))
        .collect();
    if !missing.is_empty() {
        bail!("{path} is missing sections: {missing:?}");
    }

    let summary: serde_json::Map<String, serde_json::Value> = table
        .iter()
        .map(|(name, value)| {
            let keys = value.as_table().map(|t| t.len()).unwrap_or_default();
            (name.clone(), serde_json::Value::from(keys))
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

const RUN_NAME_LEN: usize = 28;

/// Workspace directories are run names; artifacts and their configs add a `-pack...` suffix.
fn is_run_entry(name: &str) -> bool {
    match (name.get(..RUN_NAME_LEN), name.get(RUN_NAME_LEN..)) {
        (Some(run), Some(rest)) => {
            is_run_name(run) && (rest.is_empty() || rest.starts_with("-pack"))
        }
        _ => false,
    }
}

fn clean(roots: &[PathBuf], dry_run: bool) -> Result<()> {
    let mut removed = 0usize;
    for root in roots.iter().filter(|root| root.is_dir()) {
        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !is_run_entry(name) {
                continue;
            }
            println!("{}", entry.path().display());
            if !dry_run {
                remove(entry.path())?;
            }
            removed += 1;
        }
    }
    let verb = if dry_run { "found" } else { "removed" };
    println!("{removed} run entries {verb}");
    Ok(())
}

fn remove(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .with_context(|| format!("failed to remove {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_run_names() {
        assert!(is_run_entry("0f3a9c1e-2024-09-25T12-30-45"));
        assert!(is_run_entry("0f3a9c1e-2024-09-25T12-30-45-pack.xml"));
        assert!(!is_run_entry("notes.txt"));
        assert!(is_run_entry("0f3a9c1e-2024-09-25T12-30-45-pack.config.json"));
        assert!(!is_run_entry("zzzzzzzz-2024-09-25T12-30-45"));
        assert!(!is_run_entry("0f3a9c1e-20xx-09-25T12-30-45"));
        assert!(!is_run_entry("0f3a9c1e-2024-09-25T12-30-45.bak"));
    }
}
