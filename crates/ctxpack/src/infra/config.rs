//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".ctxpack/config.toml";

const DEFAULT_SCRATCH_ROOT: &str = "tmp";
const DEFAULT_RESULTS_ROOT: &str = "results";
const DEFAULT_PROGRAM: &str = "npx";
const DEFAULT_PROGRAM_ARGS: &[&str] = &["repopack"];
const DEFAULT_EXTENSION: &str = "xml";
const DEFAULT_STYLE: &str = "xml";
pub const DEFAULT_HEADER_TEXT: &str = "This file is generated for code refactor and optimization.";
const DEFAULT_REFERENCE: &str = "first-parent";
const DEFAULT_PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_MAX_TOKENS: u32 = 300;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MODE: &str = "development";

/// Layered configuration loaded from defaults, user, workspace, and env.
///
/// Unset fields stay `None` so a layer only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub packager: Packager,
    #[serde(default)]
    pub materialize: Materialize,
    #[serde(default)]
    pub ignore: Ignore,
    #[serde(default)]
    pub optimizer: Optimizer,
}

/// Scratch and results roots. Relative values resolve against the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Paths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scratch_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    results_root: Option<PathBuf>,
}

impl Paths {
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_ROOT))
    }

    pub fn results_root(&self) -> PathBuf {
        self.results_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_ROOT))
    }

    pub fn set_scratch_root(&mut self, path: impl Into<PathBuf>) {
        self.scratch_root = Some(path.into());
    }

    pub fn set_results_root(&mut self, path: impl Into<PathBuf>) {
        self.results_root = Some(path.into());
    }
}


/// External packaging tool invocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Packager {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header_text: Option<String>,
}

impl Packager {
    pub fn program(&self) -> String {
        self.program
            .clone()
            .unwrap_or_else(|| DEFAULT_PROGRAM.to_owned())
    }

    /// Arguments placed before the workspace path, e.g. `["repopack"]` for `npx`.
    pub fn args(&self) -> Vec<String> {
        self.args.clone().unwrap_or_else(|| {
            DEFAULT_PROGRAM_ARGS
                .iter()
                .map(|arg| (*arg).to_owned())
                .collect()
        })
    }

    pub fn extension(&self) -> String {
        self.extension
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_owned())
    }

    pub fn style(&self) -> String {
        self.style
            .clone()
            .unwrap_or_else(|| DEFAULT_STYLE.to_owned())
    }

    pub fn header_text(&self) -> String {
        self.header_text
            .clone()
            .unwrap_or_else(|| DEFAULT_HEADER_TEXT.to_owned())
    }

    pub fn set_style(&mut self, style: impl Into<String>) {
        self.style = Some(style.into());
    }

    /// Replace the program and its leading arguments.
    pub fn set_command(&mut self, program: impl Into<String>, args: Vec<String>) {
        self.program = Some(program.into());
        self.args = Some(args);
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Materialize {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
}

impl Materialize {
    /// Reference directory policy name (`first-parent` or `common-ancestor`).
    pub fn reference(&self) -> String {
        self.reference
            .clone()
            .unwrap_or_else(|| DEFAULT_REFERENCE.to_owned())
    }

    pub fn set_reference(&mut self, reference: impl Into<String>) {
        self.reference = Some(reference.into());
    }
}


/// Extra deny-list patterns appended to the built-in packager ignore rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Ignore {
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Task optimizer provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Optimizer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_fixture: Option<PathBuf>,
}

impl Optimizer {
    pub fn provider(&self) -> String {
        self.provider
            .clone()
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_owned())
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_owned())
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Deployment mode; `prod`/`production` enables live provider calls.
    pub fn mode(&self) -> String {
        self.mode
            .clone()
            .unwrap_or_else(|| DEFAULT_MODE.to_owned())
    }

    pub fn set_provider(&mut self, provider: impl Into<String>) {
        self.provider = Some(provider.into());
    }

    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.mode = Some(mode.into());
    }
}


/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    scratch_root: Option<String>,
    results_root: Option<String>,
    packager: Option<String>,
    provider: Option<String>,
    mode: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            scratch_root: env::var("CTXPACK_SCRATCH_ROOT").ok(),
            results_root: env::var("CTXPACK_RESULTS_ROOT").ok(),
            packager: env::var("CTXPACK_PACKAGER").ok(),
            provider: env::var("CTXPACK_PROVIDER").ok(),
            mode: env::var("CTXPACK_ENV").ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(scratch_root: &str, packager: &str, mode: &str) -> Self {
        Self {
            scratch_root: Some(scratch_root.to_owned()),
            results_root: None,
            packager: Some(packager.to_owned()),
            provider: None,
            mode: Some(mode.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    ///
    /// A `.env` file in the working directory is read first so its values count as environment.
    pub fn load() -> Result<Self> {
        load_dotenv()?;
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            tracing::debug!(path = %global_path.display(), "loading user config");
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            tracing::debug!(path = %workspace_path.display(), "loading workspace config");
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    fn merge(self, other: Self) -> Self {
        Self {
            paths: merge_paths(self.paths, other.paths),
            packager: merge_packager(self.packager, other.packager),
            materialize: Materialize {
                reference: other.materialize.reference.or(self.materialize.reference),
            },
            ignore: merge_ignore(self.ignore, other.ignore),
            optimizer: merge_optimizer(self.optimizer, other.optimizer),
        }
    }
}

fn merge_paths(base: Paths, overlay: Paths) -> Paths {
    Paths {
        scratch_root: overlay.scratch_root.or(base.scratch_root),
        results_root: overlay.results_root.or(base.results_root),
    }
}

fn merge_packager(base: Packager, overlay: Packager) -> Packager {
    Packager {
        program: overlay.program.or(base.program),
        args: overlay.args.or(base.args),
        extension: overlay.extension.or(base.extension),
        style: overlay.style.or(base.style),
        header_text: overlay.header_text.or(base.header_text),
    }
}

fn merge_ignore(base: Ignore, overlay: Ignore) -> Ignore {
    let mut patterns = base.patterns;
    for pattern in overlay.patterns {
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }
    Ignore { patterns }
}

fn merge_optimizer(base: Optimizer, overlay: Optimizer) -> Optimizer {
    Optimizer {
        provider: overlay.provider.or(base.provider),
        model: overlay.model.or(base.model),
        max_tokens: overlay.max_tokens.or(base.max_tokens),
        temperature: overlay.temperature.or(base.temperature),
        mode: overlay.mode.or(base.mode),
        mock_fixture: overlay.mock_fixture.or(base.mock_fixture),
    }
}

fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env");
            Ok(())
        }
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(err).context("failed to load .env file"),
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("ctxpack/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return Some(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(scratch_root) = env.scratch_root {
        config.paths.set_scratch_root(scratch_root);
    }
    if let Some(results_root) = env.results_root {
        config.paths.set_results_root(results_root);
    }
    if let Some(packager) = env.packager {
        let mut words = packager.split_whitespace().map(str::to_owned);
        if let Some(program) = words.next() {
            config.packager.set_command(program, words.collect());
        }
    }
    if let Some(provider) = env.provider {
        config.optimizer.set_provider(provider);
    }
    if let Some(mode) = env.mode {
        config.optimizer.set_mode(mode);
    }
    config
}
