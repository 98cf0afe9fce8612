/// Configuration for the review pipeline: defaults, optional YAML file,
/// environment overrides.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MODEL: &str = "qwen-plus";
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_FORGE_API_BASE: &str = "https://gitee.com/api/v5";
pub const DEFAULT_REPORT_PATH: &str = "review_results/pr_review_report.md";
pub const DEFAULT_STAGE_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub forge: ForgeSettings,
    pub pipeline: PipelineSettings,
}

/// Chat backend settings (OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

/// Gitee REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeSettings {
    pub api_base: String,
    /// Optional access token; Gitee serves public PRs anonymously.
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub stage_timeout_seconds: u64,
    pub output_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            forge: ForgeSettings::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Default for ForgeSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_FORGE_API_BASE.to_string(),
            access_token: None,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stage_timeout_seconds: DEFAULT_STAGE_TIMEOUT_SECONDS,
            output_path: PathBuf::from(DEFAULT_REPORT_PATH),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then the YAML file if given, then
    /// environment overrides. A missing file falls back to defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_yaml::from_str(&content).context("Failed to parse configuration file")?
            }
            Some(path) => {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                Settings::default()
            }
            None => Settings::default(),
        };

        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a YAML file.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Override fields from the environment (same variables the original
    /// deployment documents in its .env).
    fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            self.model.model = model;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            self.model.base_url = base_url;
        }
        if let Ok(api_base) = std::env::var("GITEE_API_BASE") {
            self.forge.api_base = api_base;
        }
        if let Ok(token) = std::env::var("GITEE_TOKEN") {
            self.forge.access_token = Some(token);
        }
        if let Ok(timeout) = std::env::var("REVIEW_TIMEOUT_SECONDS") {
            match timeout.parse() {
                Ok(seconds) => self.pipeline.stage_timeout_seconds = seconds,
                Err(_) => warn!("Ignoring unparsable REVIEW_TIMEOUT_SECONDS: {}", timeout),
            }
        }
        if let Ok(path) = std::env::var("REVIEW_OUTPUT_PATH") {
            self.pipeline.output_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.stage_timeout_seconds == 0 {
            anyhow::bail!("Stage timeout must be greater than 0");
        }
        if self.model.base_url.is_empty() {
            anyhow::bail!("Chat backend base URL must not be empty");
        }
        if self.forge.api_base.is_empty() {
            anyhow::bail!("Forge API base URL must not be empty");
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.stage_timeout_seconds)
    }
}
