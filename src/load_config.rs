/// `load_config`: loads the static YAML config and injects secrets from the environment.
///
/// The YAML file never holds secrets. API keys come from the environment
/// (`main` loads `.env` first):
/// - `OPENAI_API_KEY` (required)
/// - `GROQ_API_KEY` (required)
/// - `AI_DEVS_TASK_KEY` (required only when a `task` section is configured)
/// - `OPENAI_BASE_URL` (optional, OpenAI-compatible server such as a local Ollama)
///
/// All errors are `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::cache::KeyHasher;
use crate::pipeline::{PipelineConfig, DEFAULT_BOUNDARY};
use crate::providers::{
    DEFAULT_COMPLETION_MODEL, DEFAULT_TRANSCRIPTION_MODEL, DEFAULT_VISION_MODEL, OPENAI_BASE_URL,
};
use crate::verify::verify_url_from_env;

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentSection {
    pub url: String,
    pub base_url: String,
    #[serde(default = "default_boundary")]
    pub boundary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsSection {
    #[serde(default = "default_completion_model")]
    pub completion: String,
    #[serde(default = "default_vision_model")]
    pub vision: String,
    #[serde(default = "default_transcription_model")]
    pub transcription: String,
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            completion: default_completion_model(),
            vision: default_vision_model(),
            transcription: default_transcription_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    pub dir: PathBuf,
    #[serde(default)]
    pub key: KeyHasher,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskSection {
    pub name: String,
    #[serde(default)]
    pub verify_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StaticConfig {
    document: DocumentSection,
    #[serde(default)]
    questions_url: Option<String>,
    #[serde(default)]
    models: ModelsSection,
    #[serde(default)]
    cache: Option<CacheSection>,
    #[serde(default)]
    task: Option<TaskSection>,
}

fn default_boundary() -> String {
    DEFAULT_BOUNDARY.to_owned()
}

fn default_completion_model() -> String {
    DEFAULT_COMPLETION_MODEL.to_owned()
}

fn default_vision_model() -> String {
    DEFAULT_VISION_MODEL.to_owned()
}

fn default_transcription_model() -> String {
    DEFAULT_TRANSCRIPTION_MODEL.to_owned()
}

/// Secrets and endpoints taken from the environment.
#[derive(Clone)]
pub struct Secrets {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub groq_api_key: String,
    pub task_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("openai_api_key", &"<redacted>")
            .field("openai_base_url", &self.openai_base_url)
            .field("groq_api_key", &"<redacted>")
            .field("task_key", &self.task_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Task to submit answers for, with its resolved verification URL.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub name: String,
    pub verify_url: String,
}

/// Fully merged configuration used by the CLI.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub document_url: String,
    pub pipeline: PipelineConfig,
    pub questions_url: Option<String>,
    pub models: ModelsSection,
    pub cache: Option<CacheSection>,
    pub task: Option<TaskConfig>,
    pub secrets: Secrets,
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) => {
            info!(var = name, "Found secret in environment");
            Ok(value)
        }
        Err(e) => {
            error!(error = ?e, var = name, "Environment variable not set");
            Err(anyhow::anyhow!("{name} environment variable not set: {e}"))
        }
    }
}

/// Load `path`, validate it and merge in secrets from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let static_conf: StaticConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    regex::Regex::new(&static_conf.document.boundary)
        .with_context(|| format!("Invalid document.boundary {:?}", static_conf.document.boundary))?;

    let openai_api_key = required_env("OPENAI_API_KEY")?;
    let groq_api_key = required_env("GROQ_API_KEY")?;
    let task_key = match &static_conf.task {
        Some(_) => Some(required_env("AI_DEVS_TASK_KEY")?),
        None => None,
    };
    let openai_base_url =
        std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| OPENAI_BASE_URL.to_owned());

    let task = static_conf.task.map(|task| TaskConfig {
        verify_url: task.verify_url.unwrap_or_else(verify_url_from_env),
        name: task.name,
    });

    let pipeline = PipelineConfig {
        boundary: static_conf.document.boundary,
        base_url: static_conf.document.base_url,
    };

    info!(
        document_url = %static_conf.document.url,
        base_url = %pipeline.base_url,
        has_questions = static_conf.questions_url.is_some(),
        cache = static_conf.cache.is_some(),
        task = task.as_ref().map(|t| t.name.as_str()).unwrap_or("none"),
        "Config loaded and merged successfully"
    );

    Ok(AppConfig {
        document_url: static_conf.document.url,
        pipeline,
        questions_url: static_conf.questions_url,
        models: static_conf.models,
        cache: static_conf.cache,
        task,
        secrets: Secrets {
            openai_api_key,
            openai_base_url,
            groq_api_key,
            task_key,
        },
    })
}
