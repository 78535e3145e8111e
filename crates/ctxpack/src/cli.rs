//! Command-line interface.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;
use tracing::level_filters::LevelFilter;

use crate::app::materialize::{ReferencePolicy, WorkspaceMaterializer};
use crate::app::optimize::{OptimizerSettings, TaskOptimizer};
use crate::app::pack_config::OutputStyle;
use crate::app::packager::PackagerInvoker;
use crate::app::pipeline::Pipeline;
use crate::app::scan::classify_by_extension;
use crate::domain::model::MaterializedWorkspace;
use crate::infra::config::Config;
use crate::infra::llm::HttpCompletionClient;
use crate::infra::process::{OutputMode, SystemRunner};

#[derive(Debug, Parser)]
#[command(
    name = "ctxpack",
    author,
    version,
    about = "Copy selected files into an isolated workspace and pack them into one artifact",
    long_about = None
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Directory that holds workspaces.
    #[arg(long, global = true, value_name = "DIR")]
    scratch_root: Option<PathBuf>,
    /// Directory that receives artifacts and their configs.
    #[arg(long, global = true, value_name = "DIR")]
    results_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copy files into a new workspace, preserving their relative layout.
    Materialize(SelectArgs),
    /// Run the packaging tool against an existing workspace.
    Pack {
        workspace: PathBuf,
        #[arg(long, value_enum)]
        style: Option<OutputStyle>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Materialize the files and pack the resulting workspace.
    Run {
        #[command(flatten)]
        select: SelectArgs,
        #[arg(long, value_enum)]
        style: Option<OutputStyle>,
    },
    /// List a folder's files grouped by extension.
    Classify {
        dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Break a task into subtasks with a language model.
    Optimize {
        task: String,
        /// Provider name (openai, claude, gemini, deepseek).
        #[arg(long)]
        provider: Option<String>,
    },
    /// Print the effective configuration.
    Config,
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct SelectArgs {
    /// Files to copy. Paths are relative to the parent of the first one.
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
    #[arg(long, value_enum)]
    reference: Option<ReferencePolicy>,
    /// Print the result as JSON.
    #[arg(long)]
    json: bool,
    /// Exit with an error if any file could not be copied.
    #[arg(long)]
    strict: bool,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::ERROR;
        }
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    pub fn run(self) -> Result<()> {
        let mut config = Config::load()?;
        if let Some(dir) = self.scratch_root {
            config.paths.set_scratch_root(dir);
        }
        if let Some(dir) = self.results_root {
            config.paths.set_results_root(dir);
        }

        match self.command {
            Command::Materialize(select) => {
                apply_selection_overrides(&mut config, &select);
                let workspace = WorkspaceMaterializer::from_config(&config)?
                    .materialize(&select.files)?;
                if select.json {
                    print_json(&workspace)?;
                } else {
                    println!("{}", workspace.root.display());
                }
                report_failures(&workspace, select.strict)
            }
            Command::Pack {
                workspace,
                style,
                json,
            } => {
                if let Some(style) = style {
                    config.packager.set_style(style.as_str());
                }
                let packager = PackagerInvoker::from_config(&config, runner_for(json))?;
                let artifact = packager.pack(&workspace)?;
                if json {
                    print_json(&artifact)
                } else {
                    println!("{}", artifact.path.display());
                    Ok(())
                }
            }
            Command::Run { select, style } => {
                apply_selection_overrides(&mut config, &select);
                if let Some(style) = style {
                    config.packager.set_style(style.as_str());
                }
                let pipeline = Pipeline::from_config(&config, runner_for(select.json))?;
                let report = pipeline.run(&select.files)?;
                if select.json {
                    print_json(&report)?;
                } else {
                    println!("{}", report.artifact.path.display());
                }
                report_failures(&report.workspace, select.strict)
            }
            Command::Classify { dir, json } => {
                let grouped = classify_by_extension(&dir)?;
                if json {
                    return print_json(&grouped);
                }
                let mut stdout = io::stdout().lock();
                for (extension, names) in &grouped {
                    writeln!(stdout, "{extension}: {}", names.join(", "))?;
                }
                Ok(())
            }
            Command::Optimize { task, provider } => {
                if let Some(provider) = provider {
                    config.optimizer.set_provider(provider);
                }
                let optimizer = TaskOptimizer::new(
                    OptimizerSettings::from_config(&config),
                    HttpCompletionClient::new()?,
                );
                print_json(&optimizer.optimize_task(&task)?)
            }
            Command::Config => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
            Command::Completions { shell } => {
                clap_complete::generate(shell, &mut Cli::command(), "ctxpack", &mut io::stdout());
                Ok(())
            }
        }
    }
}

fn apply_selection_overrides(config: &mut Config, select: &SelectArgs) {
    if let Some(reference) = select.reference {
        config.materialize.set_reference(reference.as_str());
    }
}

/// JSON output owns stdout, so the packager's own output is captured instead of inherited.
fn runner_for(json: bool) -> SystemRunner {
    if json {
        SystemRunner::new(OutputMode::Capture)
    } else {
        SystemRunner::default()
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

fn report_failures(workspace: &MaterializedWorkspace, strict: bool) -> Result<()> {
    for failure in &workspace.failures {
        eprintln!(
            "not copied: {} ({:?}): {}",
            failure.path.display(),
            failure.kind,
            failure.message
        );
    }
    if strict && !workspace.is_complete() {
        bail!(
            "{} of {} file(s) could not be copied",
            workspace.failures.len(),
            workspace.failures.len() + workspace.copied.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_maps_to_levels() {
        let cli = Cli::parse_from(["ctxpack", "-vv", "config"]);
        assert_eq!(cli.log_level(), LevelFilter::TRACE);
        let cli = Cli::parse_from(["ctxpack", "--quiet", "config"]);
        assert_eq!(cli.log_level(), LevelFilter::ERROR);
    }

    #[test]
    fn materialize_requires_files() {
        assert!(Cli::try_parse_from(["ctxpack", "materialize"]).is_err());
    }
}
