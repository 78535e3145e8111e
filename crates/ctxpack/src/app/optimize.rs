//! Breaking a task description into subtasks with a language model.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};

use crate::domain::errors::OptimizeError;
use crate::infra::config::Config;
use crate::infra::llm::{CompletionClient, CompletionRequest};

const PROMPT_TEMPLATE: &str =
    "Optimize and break down the following task into subtasks: {{ task }}";

/// Hosted providers the optimizer can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Claude,
    Gemini,
    DeepSeek,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
            Provider::DeepSeek => "deepseek",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1/completions",
            Provider::Claude => "https://api.anthropic.com/v1/completions",
            Provider::Gemini => "https://api.google.com/gemini/v1/completions",
            Provider::DeepSeek => "https://api.deepseek.com/v1/completions",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn credential_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Claude => "CLAUDE_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = OptimizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "claude" | "anthropic" => Ok(Provider::Claude),
            "gemini" => Ok(Provider::Gemini),
            "deepseek" => Ok(Provider::DeepSeek),
            _ => Err(OptimizeError::ProviderUnsupported(value.to_owned())),
        }
    }
}

/// Whether live provider calls are allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    Production,
    /// Canned output; no network traffic.
    #[default]
    Development,
}

impl RunMode {
    /// `prod` and `production` select [`RunMode::Production`]; anything else is development.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => RunMode::Production,
            _ => RunMode::Development,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedTask {
    pub original_task: String,
    pub optimized_prompt: String,
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: u32,
    pub description: String,
}

/// Canned output templates used outside production. `{{ task }}` is substituted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockFixture {
    pub optimized_prompt: String,
    pub subtasks: Vec<String>,
}

impl Default for MockFixture {
    fn default() -> Self {
        Self {
            optimized_prompt: "Optimized: {{ task }}".into(),
            subtasks: vec![
                "Analyze the current {{ task }}".into(),
                "Identify areas for refactoring in {{ task }}".into(),
                "Refactor the identified areas using best practices".into(),
                "Test and validate the refactored {{ task }}".into(),
            ],
        }
    }
}

impl MockFixture {
    fn load(path: &Path) -> Result<Self, OptimizeError> {
        let data = fs::read_to_string(path).map_err(|err| {
            OptimizeError::MockDataMissing(format!("{}: {err}", path.display()))
        })?;
        let fixture: MockFixture = serde_json::from_str(&data).map_err(|err| {
            OptimizeError::MockDataMissing(format!("{}: {err}", path.display()))
        })?;
        if fixture.subtasks.is_empty() {
            return Err(OptimizeError::MockDataMissing(format!(
                "{} lists no subtasks",
                path.display()
            )));
        }
        Ok(fixture)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub mode: RunMode,
    pub mock_fixture: Option<PathBuf>,
}

impl OptimizerSettings {
    pub fn from_config(config: &Config) -> Self {
        let optimizer = &config.optimizer;
        Self {
            provider: optimizer.provider(),
            model: optimizer.model(),
            max_tokens: optimizer.max_tokens(),
            temperature: optimizer.temperature(),
            mode: RunMode::from_label(&optimizer.mode()),
            mock_fixture: optimizer.mock_fixture.clone(),
        }
    }
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

type CredentialLookup = fn(&str) -> Option<String>;

fn env_credential(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Turns a free-form task into an optimized prompt plus ordered subtasks.
pub struct TaskOptimizer<C> {
    settings: OptimizerSettings,
    client: C,
    credentials: CredentialLookup,
}

impl<C: CompletionClient> TaskOptimizer<C> {
    pub fn new(settings: OptimizerSettings, client: C) -> Self {
        Self {
            settings,
            client,
            credentials: env_credential,
        }
    }

    /// Replace the process-environment credential lookup.
    pub fn with_credentials(mut self, lookup: CredentialLookup) -> Self {
        self.credentials = lookup;
        self
    }

    pub fn optimize_task(&self, task: &str) -> Result<OptimizedTask, OptimizeError> {
        let provider: Provider = self.settings.provider.parse()?;

        if self.settings.mode == RunMode::Development {
            tracing::debug!(%provider, "returning canned optimization");
            return self.canned(task);
        }

        let variable = provider.credential_var();
        let api_key = (self.credentials)(variable)
            .filter(|key| !key.trim().is_empty())
            .ok_or(OptimizeError::CredentialMissing {
                provider: provider.as_str(),
                variable,
            })?;

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            prompt: render(PROMPT_TEMPLATE, task)?,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        tracing::info!(%provider, model = %request.model, "requesting task breakdown");
        let completion = self
            .client
            .complete(provider.endpoint(), &api_key, &request)?;

        let steps = [
            format!("Step 1: {completion}"),
            format!("Step 2: Review and refine {completion}"),
            format!("Step 3: Implement {completion}"),
            "Step 4: Test and validate changes".to_owned(),
        ];
        Ok(OptimizedTask {
            original_task: task.to_owned(),
            optimized_prompt: completion,
            subtasks: numbered(steps),
        })
    }

    fn canned(&self, task: &str) -> Result<OptimizedTask, OptimizeError> {
        let fixture = match &self.settings.mock_fixture {
            Some(path) => MockFixture::load(path)?,
            None => MockFixture::default(),
        };

        let subtasks = fixture
            .subtasks
            .iter()
            .map(|template| render(template, task))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OptimizedTask {
            original_task: task.to_owned(),
            optimized_prompt: render(&fixture.optimized_prompt, task)?,
            subtasks: numbered(subtasks),
        })
    }
}

fn render(template: &str, task: &str) -> Result<String, OptimizeError> {
    Ok(Environment::new().render_str(template, context! { task => task })?)
}

fn numbered(descriptions: impl IntoIterator<Item = String>) -> Vec<Subtask> {
    (1..)
        .zip(descriptions)
        .map(|(id, description)| Subtask { id, description })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    #[derive(Default)]
    struct FakeClient {
        requests: RefCell<Vec<(String, String, CompletionRequest)>>,
    }

    impl CompletionClient for FakeClient {
        fn complete(
            &self,
            endpoint: &str,
            api_key: &str,
            request: &CompletionRequest,
        ) -> Result<String, OptimizeError> {
            self.requests
                .borrow_mut()
                .push((endpoint.to_owned(), api_key.to_owned(), request.clone()));
            Ok("rewrite the parser".into())
        }
    }

    struct FailingClient {
        error: fn() -> OptimizeError,
        calls: Cell<usize>,
    }

    impl FailingClient {
        fn new(error: fn() -> OptimizeError) -> Self {
            Self {
                error,
                calls: Cell::new(0),
            }
        }
    }

    impl CompletionClient for FailingClient {
        fn complete(
            &self,
            _endpoint: &str,
            _api_key: &str,
            _request: &CompletionRequest,
        ) -> Result<String, OptimizeError> {
            self.calls.set(self.calls.get() + 1);
            Err((self.error)())
        }
    }

    fn production_with(client: FailingClient) -> TaskOptimizer<FailingClient> {
        TaskOptimizer::new(settings("openai", RunMode::Production), client)
            .with_credentials(|_| Some("sk-test".into()))
    }

    fn settings(provider: &str, mode: RunMode) -> OptimizerSettings {
        OptimizerSettings {
            provider: provider.into(),
            mode,
            ..OptimizerSettings::default()
        }
    }

    #[test]
    fn development_mode_returns_canned_breakdown() -> Result<(), OptimizeError> {
        let optimizer =
            TaskOptimizer::new(settings("openai", RunMode::Development), FakeClient::default());
        let result = optimizer.optimize_task("refactor with Swift")?;

        assert_eq!(result.original_task, "refactor with Swift");
        assert_eq!(result.optimized_prompt, "Optimized: refactor with Swift");
        assert_eq!(result.subtasks.len(), 4);
        assert_eq!(result.subtasks[0].id, 1);
        assert_eq!(result.subtasks[0].description, "Analyze the current refactor with Swift");
        assert!(optimizer.client.requests.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn canned_output_is_deterministic() -> Result<(), OptimizeError> {
        let optimizer =
            TaskOptimizer::new(settings("gemini", RunMode::Development), FakeClient::default());
        assert_eq!(optimizer.optimize_task("x")?, optimizer.optimize_task("x")?);
        Ok(())
    }

    #[test]
    fn production_mode_calls_provider() -> Result<(), OptimizeError> {
        let optimizer =
            TaskOptimizer::new(settings("deepseek", RunMode::Production), FakeClient::default())
                .with_credentials(|name| (name == "DEEPSEEK_API_KEY").then(|| "sk-test".into()));
        let result = optimizer.optimize_task("split the monolith")?;

        assert_eq!(result.optimized_prompt, "rewrite the parser");
        assert_eq!(result.subtasks[3].description, "Step 4: Test and validate changes");

        let requests = optimizer.client.requests.borrow();
        let (endpoint, key, request) = &requests[0];
        assert_eq!(endpoint, "https://api.deepseek.com/v1/completions");
        assert_eq!(key, "sk-test");
        assert_eq!(
            request.prompt,
            "Optimize and break down the following task into subtasks: split the monolith"
        );
        Ok(())
    }

    #[test]
    fn transport_failure_surfaces_without_retry() {
        let optimizer = production_with(FailingClient::new(|| OptimizeError::Transport {
            endpoint: "https://api.openai.com/v1/completions".into(),
            message: "status 503 Service Unavailable".into(),
        }));

        let err = optimizer.optimize_task("task").unwrap_err();
        assert!(matches!(err, OptimizeError::Transport { ref message, .. } if message.contains("503")));
        assert_eq!(optimizer.client.calls.get(), 1);
    }

    #[test]
    fn malformed_response_surfaces_without_retry() {
        let optimizer = production_with(FailingClient::new(|| {
            OptimizeError::InvalidResponse("response contained no completion text".into())
        }));

        let err = optimizer.optimize_task("task").unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidResponse(_)));
        assert_eq!(optimizer.client.calls.get(), 1);
    }

    #[test]
    fn missing_credential_is_reported() {
        let optimizer =
            TaskOptimizer::new(settings("claude", RunMode::Production), FakeClient::default())
                .with_credentials(|_| None);
        let err = optimizer.optimize_task("task").unwrap_err();
        assert!(matches!(
            err,
            OptimizeError::CredentialMissing {
                variable: "CLAUDE_API_KEY",
                ..
            }
        ));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let optimizer =
            TaskOptimizer::new(settings("mistral", RunMode::Development), FakeClient::default());
        let err = optimizer.optimize_task("task").unwrap_err();
        assert!(matches!(err, OptimizeError::ProviderUnsupported(name) if name == "mistral"));
    }

    #[test]
    fn fixture_replaces_canned_templates() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let fixture = temp.path().join("mock.json");
        fs::write(
            &fixture,
            r#"{"optimizedPrompt":"Plan: {{ task }}","subtasks":["Do {{ task }}"]}"#,
        )?;
        let optimizer = TaskOptimizer::new(
            OptimizerSettings {
                mock_fixture: Some(fixture),
                ..settings("openai", RunMode::Development)
            },
            FakeClient::default(),
        );

        let result = optimizer.optimize_task("it")?;
        assert_eq!(result.optimized_prompt, "Plan: it");
        assert_eq!(
            result.subtasks,
            vec![Subtask {
                id: 1,
                description: "Do it".into()
            }]
        );
        Ok(())
    }

    #[test]
    fn missing_fixture_is_mock_data_missing() {
        let optimizer = TaskOptimizer::new(
            OptimizerSettings {
                mock_fixture: Some(PathBuf::from("/definitely/not/here.json")),
                ..settings("openai", RunMode::Development)
            },
            FakeClient::default(),
        );
        assert!(matches!(
            optimizer.optimize_task("task"),
            Err(OptimizeError::MockDataMissing(_))
        ));
    }

    #[test]
    fn output_uses_camel_case_keys() {
        let value = serde_json::to_value(OptimizedTask {
            original_task: "a".into(),
            optimized_prompt: "b".into(),
            subtasks: vec![],
        })
        .unwrap();
        assert!(value.get("originalTask").is_some());
        assert!(value.get("optimizedPrompt").is_some());
    }

    #[test]
    fn run_mode_labels() {
        assert_eq!(RunMode::from_label("prod"), RunMode::Production);
        assert_eq!(RunMode::from_label("Production"), RunMode::Production);
        assert_eq!(RunMode::from_label("test"), RunMode::Development);
    }
}
