pub mod classifier;
pub mod huggingface;
#[cfg(feature = "local-model")]
pub mod local;
pub mod normalize;

pub use classifier::SentimentClassifier;
pub use huggingface::HuggingFaceModel;
#[cfg(feature = "local-model")]
pub use local::LocalBertModel;
pub use normalize::{combine_title_and_text, normalize_text};

use sentiscope_core::{ClassifierBackend, ClassifierConfig, CoreError, SentimentModel};
use std::sync::Arc;
use tracing::info;

/// Builds the model backend named in the configuration.
pub fn build_model(config: &ClassifierConfig) -> Result<Arc<dyn SentimentModel>, CoreError> {
    match config.backend {
        ClassifierBackend::HuggingFace => {
            info!("Using hosted inference for {}", config.model);
            Ok(Arc::new(HuggingFaceModel::new(config)?))
        }
        ClassifierBackend::Local => load_local(config),
    }
}

#[cfg(feature = "local-model")]
fn load_local(config: &ClassifierConfig) -> Result<Arc<dyn SentimentModel>, CoreError> {
    let model_dir = config
        .model_dir
        .as_deref()
        .ok_or_else(|| sentiscope_core::ConfigError::MissingField {
            field: "classifier.model_dir".to_string(),
        })?;
    Ok(Arc::new(LocalBertModel::load(model_dir)?))
}

#[cfg(not(feature = "local-model"))]
fn load_local(_config: &ClassifierConfig) -> Result<Arc<dyn SentimentModel>, CoreError> {
    Err(sentiscope_core::ConfigError::InvalidValue {
        field: "classifier.backend".to_string(),
        value: "local (built without the local-model feature)".to_string(),
    }
    .into())
}

impl SentimentClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, CoreError> {
        Ok(SentimentClassifier::new(build_model(config)?)
            .with_max_concurrent_batches(config.max_concurrent_batches))
    }
}
