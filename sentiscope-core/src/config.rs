use crate::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "SENTISCOPE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "sentiscope.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub fetch: FetchConfig,
    pub classifier: ClassifierConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub max_sources: usize,
    pub request_timeout_secs: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: format!("sentiscope/{}", env!("CARGO_PKG_VERSION")),
            max_sources: 100,
            request_timeout_secs: 30,
        }
    }
}

impl RedditConfig {
    pub fn credentials(&self) -> Result<(String, String), ConfigError> {
        let client_id = self
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: "REDDIT_CLIENT_ID".to_string(),
            })?;
        let client_secret = self
            .client_secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: "REDDIT_CLIENT_SECRET".to_string(),
            })?;
        Ok((client_id, client_secret))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub per_source_limit: usize,
    pub courtesy_delay_ms: u64,
    /// Below this many remaining requests the fetcher waits for the reset.
    pub quota_floor: f64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            per_source_limit: 100,
            courtesy_delay_ms: 500,
            quota_floor: 2.0,
        }
    }
}

impl FetchConfig {
    pub fn courtesy_delay(&self) -> Duration {
        Duration::from_millis(self.courtesy_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    HuggingFace,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub backend: ClassifierBackend,
    pub model: String,
    pub endpoint: String,
    pub api_token: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub batch_size: usize,
    pub max_length: usize,
    pub max_concurrent_batches: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::HuggingFace,
            model: "MarieAngeA13/Sentiment-Analysis-BERT".to_string(),
            endpoint: "https://api-inference.huggingface.co".to_string(),
            api_token: None,
            model_dir: None,
            batch_size: 2,
            max_length: 512,
            max_concurrent_batches: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub path: PathBuf,
    /// Unlabeled posts saved by a fetch-only run, read back for classification.
    pub working_path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sentiment.csv"),
            working_path: PathBuf::from("working.csv"),
        }
    }
}

impl AppConfig {
    /// Loads `$SENTISCOPE_CONFIG` or `./sentiscope.toml`, then applies
    /// environment overrides. A missing default file means defaults; a
    /// missing explicitly named file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                    Self::default()
                }
            }
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
                path: path.display().to_string(),
            })?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup("REDDIT_CLIENT_ID") {
            self.reddit.client_id = Some(client_id);
        }
        if let Some(client_secret) = lookup("REDDIT_CLIENT_SECRET") {
            self.reddit.client_secret = Some(client_secret);
        }
        if let Some(user_agent) = lookup("REDDIT_USER_AGENT") {
            self.reddit.user_agent = user_agent;
        }
        if let Some(token) = lookup("HF_API_TOKEN") {
            self.classifier.api_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("classifier.batch_size", self.classifier.batch_size),
            ("classifier.max_length", self.classifier.max_length),
            (
                "classifier.max_concurrent_batches",
                self.classifier.max_concurrent_batches,
            ),
            ("reddit.max_sources", self.reddit.max_sources),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }

        if self.fetch.quota_floor < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "fetch.quota_floor".to_string(),
                value: self.fetch.quota_floor.to_string(),
            });
        }

        if self.classifier.backend == ClassifierBackend::Local
            && self.classifier.model_dir.is_none()
        {
            return Err(ConfigError::MissingField {
                field: "classifier.model_dir".to_string(),
            });
        }

        Ok(())
    }
}
