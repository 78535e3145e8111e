//! Declarative configuration for the external packaging tool.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::ValueEnum;
use globset::Glob;
use serde::{Deserialize, Serialize};

use crate::domain::errors::PipelineError;
use crate::infra::config::{Config, DEFAULT_HEADER_TEXT};

/// Name used when the artifact path has no usable file stem.
pub const FALLBACK_CONFIG_FILE: &str = "pack.config.json";
const CONFIG_FILE_SUFFIX: &str = ".config.json";

/// Build, lock, log, and IDE artifacts the packager must never include.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/*.log",
    "tmp/",
    "node_modules/",
    "package-lock.json",
    "yarn.lock",
    "Pods/",
    "Podfile.lock",
    "*.xcworkspace",
    "*.xcuserdata",
    "*.xcshareddata",
    "*.xcodeproj/xcuserdata/",
    "DerivedData/",
    "*.o",
    "*.a",
    "*.dSYM",
    ".build/",
    "Carthage/",
    "*.log",
    ".DS_Store",
    "test-reports/",
    "*.plist",
    "fastlane/Report.xml",
    "fastlane/report.xml",
    "fastlane/Preview.html",
];

/// Output markup produced by the packaging tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Xml,
    Markdown,
    Plain,
}

impl OutputStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStyle::Xml => "xml",
            OutputStyle::Markdown => "markdown",
            OutputStyle::Plain => "plain",
        }
    }
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputStyle {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "xml" => Ok(OutputStyle::Xml),
            "markdown" | "md" => Ok(OutputStyle::Markdown),
            "plain" | "text" | "txt" => Ok(OutputStyle::Plain),
            other => anyhow::bail!("unknown output style '{other}'"),
        }
    }
}

/// Document consumed by the packaging tool via `--config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackConfig {
    pub output: OutputSection,
    pub include: Vec<String>,
    pub ignore: IgnoreSection,
    pub security: SecuritySection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSection {
    pub file_path: PathBuf,
    pub style: OutputStyle,
    pub header_text: String,
    pub remove_comments: bool,
    pub remove_empty_lines: bool,
    pub show_line_numbers: bool,
    pub top_files_length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreSection {
    pub use_gitignore: bool,
    pub use_default_patterns: bool,
    pub custom_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySection {
    pub enable_security_check: bool,
}

impl PackConfig {
    /// Read a previously generated config back from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read pack config {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid pack config in {}", path.display()))
    }
}

/// Produces [`PackConfig`] documents and persists them next to the artifacts.
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    style: OutputStyle,
    header_text: String,
    extra_ignores: Vec<String>,
}

impl Default for ConfigGenerator {
    fn default() -> Self {
        Self {
            style: OutputStyle::default(),
            header_text: DEFAULT_HEADER_TEXT.to_owned(),
            extra_ignores: Vec::new(),
        }
    }
}

impl ConfigGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a generator from the `[packager]` and `[ignore]` config sections.
    pub fn from_config(config: &Config) -> Result<Self> {
        let style = config.packager.style().parse::<OutputStyle>()?;
        Self::new()
            .with_style(style)
            .with_header_text(config.packager.header_text())
            .with_extra_ignores(config.ignore.patterns.clone())
    }

    pub fn with_style(mut self, style: OutputStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_header_text(mut self, header_text: impl Into<String>) -> Self {
        self.header_text = header_text.into();
        self
    }

    /// Append deny-list patterns after the built-in ones. Each must be a valid glob.
    pub fn with_extra_ignores(mut self, patterns: Vec<String>) -> Result<Self> {
        for pattern in &patterns {
            Glob::new(pattern).with_context(|| format!("invalid ignore pattern '{pattern}'"))?;
        }
        self.extra_ignores = patterns;
        Ok(self)
    }

    /// Build the config value targeting `output_path`. The path is not validated.
    pub fn build(&self, output_path: &Path) -> PackConfig {
        let mut custom_patterns: Vec<String> = DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(|pattern| (*pattern).to_owned())
            .collect();
        for pattern in &self.extra_ignores {
            if !custom_patterns.contains(pattern) {
                custom_patterns.push(pattern.clone());
            }
        }

        PackConfig {
            output: OutputSection {
                file_path: output_path.to_path_buf(),
                style: self.style,
                header_text: self.header_text.clone(),
                remove_comments: true,
                remove_empty_lines: true,
                show_line_numbers: false,
                top_files_length: 0,
            },
            include: vec!["**/*".to_owned()],
            ignore: IgnoreSection {
                use_gitignore: true,
                use_default_patterns: true,
                custom_patterns,
            },
            security: SecuritySection {
                enable_security_check: true,
            },
        }
    }

    /// Write the config for `output_path` into `config_dir`, creating the directory if needed.
    ///
    /// The file name is derived from the artifact's stem so concurrent runs never share a
    /// config file. An existing file of the same name is overwritten.
    pub fn generate(&self, config_dir: &Path, output_path: &Path) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(config_dir)
            .map_err(|err| PipelineError::io("failed to create config directory", config_dir, err))?;

        let config_path = config_dir.join(config_file_name(output_path));
        let config = self.build(output_path);
        let data = serde_json::to_string_pretty(&config).map_err(|err| {
            PipelineError::io("failed to serialize pack config for", &config_path, err.into())
        })?;
        fs::write(&config_path, data)
            .map_err(|err| PipelineError::io("failed to write pack config", &config_path, err))?;

        tracing::debug!(path = %config_path.display(), "wrote pack config");
        Ok(config_path)
    }
}

/// `<artifact stem>.config.json`, e.g. `1a2b3c4d-2024-09-25T12-30-45-pack.config.json`.
pub fn config_file_name(output_path: &Path) -> String {
    match output_path.file_stem().and_then(|stem| stem.to_str()) {
        Some(stem) if !stem.is_empty() => format!("{stem}{CONFIG_FILE_SUFFIX}"),
        _ => FALLBACK_CONFIG_FILE.to_owned(),
    }
}
