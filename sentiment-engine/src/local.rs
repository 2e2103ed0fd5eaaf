//! BERT sequence classifier run in-process with candle.
//!
//! Expects a directory holding `config.json`, `tokenizer.json` and
//! `model.safetensors` as exported for `BertForSequenceClassification`.

use async_trait::async_trait;
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use sentiscope_core::{ClassifierError, CoreError, Prediction, SentimentModel};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Classification-head fields of `config.json` that the BERT config ignores.
#[derive(Debug, Deserialize)]
struct HeadConfig {
    hidden_size: usize,
    #[serde(default)]
    id2label: HashMap<String, String>,
}

impl HeadConfig {
    /// Labels ordered by class index.
    fn labels(&self) -> Result<Vec<String>, ClassifierError> {
        let mut indexed = self
            .id2label
            .iter()
            .map(|(id, label)| {
                id.parse::<usize>()
                    .map(|id| (id, label.clone()))
                    .map_err(|_| ClassifierError::ModelLoadingFailed {
                        model_path: format!("id2label key '{}' is not an index", id),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        indexed.sort_by_key(|(id, _)| *id);

        if indexed.is_empty() || indexed.iter().enumerate().any(|(i, (id, _))| i != *id) {
            return Err(ClassifierError::ModelLoadingFailed {
                model_path: "id2label must map 0..n".to_string(),
            });
        }
        Ok(indexed.into_iter().map(|(_, label)| label).collect())
    }
}

struct LocalInner {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    labels: Vec<String>,
    device: Device,
}

pub struct LocalBertModel {
    inner: Arc<LocalInner>,
    name: String,
}

impl LocalBertModel {
    pub fn load(model_dir: &Path) -> Result<Self, CoreError> {
        let config_path = require_file(model_dir, CONFIG_FILE)?;
        let tokenizer_path = require_file(model_dir, TOKENIZER_FILE)?;
        let weights_path = require_file(model_dir, WEIGHTS_FILE)?;

        let config_json = std::fs::read_to_string(&config_path)?;
        let bert_config: BertConfig = serde_json::from_str(&config_json)?;
        let head_config: HeadConfig = serde_json::from_str(&config_json)?;
        let labels = head_config.labels()?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            ClassifierError::ModelLoadingFailed {
                model_path: format!("{}: {}", tokenizer_path.display(), e),
            }
        })?;

        let device = Device::cuda_if_available(0).map_err(loading_error(&weights_path))?;
        let weights = std::fs::read(&weights_path)?;
        let vb = VarBuilder::from_buffered_safetensors(weights, DType::F32, &device)
            .map_err(loading_error(&weights_path))?;

        let bert = BertModel::load(vb.clone(), &bert_config).map_err(loading_error(&weights_path))?;
        let pooler = linear(
            head_config.hidden_size,
            head_config.hidden_size,
            vb.pp("bert.pooler.dense"),
        )
        .map_err(loading_error(&weights_path))?;
        let classifier = linear(head_config.hidden_size, labels.len(), vb.pp("classifier"))
            .map_err(loading_error(&weights_path))?;

        info!(
            "Loaded local model from {} with labels {:?} on {:?}",
            model_dir.display(),
            labels,
            device
        );

        Ok(Self {
            inner: Arc::new(LocalInner {
                bert,
                pooler,
                classifier,
                tokenizer,
                labels,
                device,
            }),
            name: model_dir.display().to_string(),
        })
    }
}

impl LocalInner {
    fn predict_all(
        &self,
        texts: &[String],
        truncation: bool,
        max_length: usize,
    ) -> Result<Vec<Prediction>, ClassifierError> {
        let mut tokenizer = self.tokenizer.clone();
        let truncation_params = truncation.then(|| TruncationParams {
            max_length,
            ..Default::default()
        });
        tokenizer
            .with_truncation(truncation_params)
            .map_err(|e| ClassifierError::InferenceFailed {
                reason: format!("Invalid truncation settings: {}", e),
            })?;

        texts
            .iter()
            .map(|text| self.predict(&tokenizer, text))
            .collect()
    }

    fn predict(&self, tokenizer: &Tokenizer, text: &str) -> Result<Prediction, ClassifierError> {
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|_| ClassifierError::TokenizationFailed {
                text_length: text.len(),
            })?;

        let probabilities = self.forward(encoding.get_ids()).map_err(inference_error)?;
        let (index, score) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or_else(|| ClassifierError::InferenceFailed {
                reason: "Model produced no logits".to_string(),
            })?;

        Ok(Prediction {
            label: self.labels[index].clone(),
            score: Some(score),
        })
    }

    fn forward(&self, token_ids: &[u32]) -> candle_core::Result<Vec<f32>> {
        let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self.bert.forward(&input_ids, &token_type_ids)?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;

        candle_nn::ops::softmax(&logits, 1)?.squeeze(0)?.to_vec1::<f32>()
    }
}

#[async_trait]
impl SentimentModel for LocalBertModel {
    async fn classify_batch(
        &self,
        texts: &[String],
        truncation: bool,
        max_length: usize,
    ) -> Result<Vec<Prediction>, CoreError> {
        let inner = self.inner.clone();
        let texts = texts.to_vec();
        debug!("Running local inference on {} texts", texts.len());

        let predictions = tokio::task::spawn_blocking(move || {
            inner.predict_all(&texts, truncation, max_length)
        })
        .await
        .map_err(|e| CoreError::Internal {
            message: format!("Inference task failed: {}", e),
        })??;

        Ok(predictions)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn require_file(model_dir: &Path, file_name: &str) -> Result<PathBuf, ClassifierError> {
    let path = model_dir.join(file_name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ClassifierError::ModelNotFound {
            model_name: path.display().to_string(),
        })
    }
}

fn loading_error(path: &Path) -> impl Fn(candle_core::Error) -> ClassifierError + '_ {
    move |e| ClassifierError::ModelLoadingFailed {
        model_path: format!("{}: {}", path.display(), e),
    }
}

fn inference_error(e: candle_core::Error) -> ClassifierError {
    ClassifierError::InferenceFailed {
        reason: e.to_string(),
    }
}
