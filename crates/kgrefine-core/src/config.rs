use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::census::CensusPolicy;
use crate::entity::AttributePolicy;
use crate::{Error, Result};

pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub const MODEL_ENV: &str = "KGREFINE_MODEL";
pub const BASE_URL_ENV: &str = "KGREFINE_BASE_URL";
pub const DASHSCOPE_KEY_ENV: &str = "DASHSCOPE_API_KEY";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

/// Which OpenAI-compatible service the model name points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    DashScope,
    OpenAi,
}

impl Provider {
    /// Qwen models are served by DashScope; everything else goes to OpenAI.
    pub fn for_model(model: &str) -> Self {
        if model.to_lowercase().contains("qwen") {
            Self::DashScope
        } else {
            Self::OpenAi
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::DashScope => DASHSCOPE_BASE_URL,
            Self::OpenAi => OPENAI_BASE_URL,
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::DashScope => DASHSCOPE_KEY_ENV,
            Self::OpenAi => OPENAI_KEY_ENV,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DashScope => f.write_str("dashscope"),
            Self::OpenAi => f.write_str("openai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout_secs: u64,
    /// Retries on 429 and 5xx responses.
    pub max_retries: u32,
    /// First backoff delay; doubles per retry.
    pub retry_backoff_ms: u64,
    /// Ask for `response_format: json_object`.
    pub json_mode: bool,
    /// Never read from or written to a config file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen-plus".to_string(),
            base_url: None,
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: 120,
            max_retries: 3,
            retry_backoff_ms: 500,
            json_mode: true,
            api_key: None,
        }
    }
}

impl LlmConfig {
    pub fn provider(&self) -> Provider {
        Provider::for_model(&self.model)
    }

    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider().default_base_url())
    }

    /// The key for the active provider from the environment.
    pub fn resolve_api_key(&mut self) -> Option<&str> {
        if self.api_key.is_none() {
            self.api_key = env::var(self.provider().api_key_env())
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
        self.api_key.as_deref()
    }

    pub fn redacted_api_key(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| {
            let chars: Vec<char> = key.chars().collect();
            if chars.len() <= 4 {
                "***".to_string()
            } else {
                let suffix: String = chars[chars.len() - 4..].iter().collect();
                format!("***{suffix}")
            }
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub attribute_policy: AttributePolicy,
    pub census_policy: CensusPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Reads a TOML file, then applies environment overrides and validates the result.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.with_overrides(|key| env::var(key).ok())
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        self.apply_overrides(lookup);
        self.validate()?;
        Ok(self)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Model and endpoint overrides from `lookup`; blank values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |key| lookup(key).filter(|v: &String| !v.trim().is_empty());
        if let Some(model) = set(MODEL_ENV) {
            self.llm.model = model;
        }
        if let Some(url) = set(BASE_URL_ENV) {
            self.llm.base_url = Some(url);
        }
        self.llm.resolve_api_key();
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(Error::InvalidConfig("llm.model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::InvalidConfig(format!(
                "llm.temperature must be within [0, 2], got {}",
                self.llm.temperature
            )));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::InvalidConfig("llm.timeout_secs must be positive".into()));
        }
        if let Some(url) = &self.llm.base_url {
            url::Url::parse(url)
                .map_err(|e| Error::InvalidConfig(format!("llm.base_url {url}: {e}")))?;
        }
        Ok(())
    }
}
