//! Runtime settings read from the environment.

use crate::executor::{ExecutorConfig, RenderQuality};
use crate::provider::{ProviderConfig, DEEPSEEK_BASE_URL, DEEPSEEK_MODEL};
use crate::workflow::WorkflowConfig;
use mathviz_error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_API_BASE: &str = "MATHVIZ_LLM_API_BASE";
pub const ENV_API_KEY: &str = "MATHVIZ_LLM_API_KEY";
pub const ENV_MODEL: &str = "MATHVIZ_LLM_MODEL";
pub const ENV_TEMPERATURE: &str = "MATHVIZ_LLM_TEMPERATURE";
pub const ENV_QUALITY: &str = "MATHVIZ_MANIM_QUALITY";
pub const ENV_OUTPUT_DIR: &str = "MATHVIZ_OUTPUT_DIR";
pub const ENV_RENDER_TIMEOUT: &str = "MATHVIZ_RENDER_TIMEOUT_SECS";
pub const ENV_ENABLE_REVIEW: &str = "MATHVIZ_ENABLE_REVIEW";
pub const ENV_SKILLS_DIR: &str = "MATHVIZ_SKILLS_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub quality: RenderQuality,
    pub output_dir: PathBuf,
    pub render_timeout: Duration,
    pub enable_review: bool,
    pub skills_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let executor = ExecutorConfig::default();
        Self {
            api_base: DEEPSEEK_BASE_URL.to_string(),
            api_key: None,
            model: DEEPSEEK_MODEL.to_string(),
            temperature: ProviderConfig::default().temperature,
            quality: executor.quality,
            output_dir: executor.output_dir,
            render_timeout: executor.timeout,
            enable_review: false,
            skills_dir: None,
        }
    }
}

impl Settings {
    /// Defaults overridden by `MATHVIZ_*` variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut settings = Self::default();

        if let Some(v) = get(ENV_API_BASE) {
            settings.api_base = v;
        }
        if let Some(v) = get(ENV_API_KEY) {
            settings.api_key = Some(v);
        }
        if let Some(v) = get(ENV_MODEL) {
            settings.model = v;
        }
        if let Some(v) = get(ENV_TEMPERATURE) {
            settings.temperature = parse(ENV_TEMPERATURE, &v)?;
        }
        if let Some(v) = get(ENV_QUALITY) {
            settings.quality = v
                .parse()
                .map_err(|e: Error| e.with_context("variable", ENV_QUALITY))?;
        }
        if let Some(v) = get(ENV_OUTPUT_DIR) {
            settings.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_RENDER_TIMEOUT) {
            settings.render_timeout = Duration::from_secs(parse(ENV_RENDER_TIMEOUT, &v)?);
        }
        if let Some(v) = get(ENV_ENABLE_REVIEW) {
            settings.enable_review = parse_bool(ENV_ENABLE_REVIEW, &v)?;
        }
        if let Some(v) = get(ENV_SKILLS_DIR) {
            settings.skills_dir = Some(PathBuf::from(v));
        }

        Ok(settings)
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.api_key.clone(),
            base_url: self.api_base.clone(),
            default_model: self.model.clone(),
            temperature: self.temperature,
            ..ProviderConfig::default()
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            quality: self.quality,
            output_dir: self.output_dir.clone(),
            timeout: self.render_timeout,
            ..ExecutorConfig::default()
        }
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            enable_review: self.enable_review,
            ..WorkflowConfig::default()
        }
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| {
        Error::config_invalid(format!("{} has invalid value '{}': {}", key, value, e))
            .with_context("variable", key)
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config_invalid(format!("{} must be a boolean, got '{}'", key, value))
            .with_context("variable", key)),
    }
}
