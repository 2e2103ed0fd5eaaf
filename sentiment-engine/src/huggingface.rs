//! Hosted Hugging Face inference API backend.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sentiscope_core::{
    retry_with_backoff, ClassifierConfig, ClassifierError, CoreError, Prediction, SentimentModel,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: usize = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(2);
const PROVIDER: &str = "huggingface";

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a [String],
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    truncation: bool,
    max_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

/// The API returns every label's score per input, or a flat list when it
/// has already reduced to one label per input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    PerInput(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

#[derive(Debug, Deserialize)]
struct InferenceErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    estimated_time: Option<f64>,
}

pub struct HuggingFaceModel {
    http_client: Client,
    model: String,
    url: String,
    api_token: Option<String>,
}

impl HuggingFaceModel {
    pub fn new(config: &ClassifierConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(http_client, config))
    }

    pub fn with_client(http_client: Client, config: &ClassifierConfig) -> Self {
        Self {
            http_client,
            model: config.model.clone(),
            url: model_url(&config.endpoint, &config.model),
            api_token: config.api_token.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(
        &self,
        texts: &[String],
        truncation: bool,
        max_length: usize,
    ) -> Result<Vec<Prediction>, CoreError> {
        let body = InferenceRequest {
            inputs: texts,
            parameters: InferenceParameters {
                truncation,
                max_length,
            },
        };

        let mut request = self.http_client.post(&self.url).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        debug!("POST {} with {} inputs", self.url, texts.len());
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CoreError::Timeout {
                    seconds: REQUEST_TIMEOUT.as_secs(),
                }
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let error = map_error_response(status, &bytes, &self.model);
            warn!("Inference request failed with {}: {}", status, error);
            return Err(error.into());
        }

        let parsed: InferenceResponse = serde_json::from_slice(&bytes).map_err(|e| {
            warn!("Unexpected inference response: {}", e);
            ClassifierError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
            }
        })?;

        Ok(best_predictions(parsed, texts.len())?)
    }
}

#[async_trait]
impl SentimentModel for HuggingFaceModel {
    async fn classify_batch(
        &self,
        texts: &[String],
        truncation: bool,
        max_length: usize,
    ) -> Result<Vec<Prediction>, CoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        retry_with_backoff(
            || self.request(texts, truncation, max_length),
            MAX_RETRIES,
            INITIAL_RETRY_DELAY,
        )
        .await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn model_url(endpoint: &str, model: &str) -> String {
    format!("{}/models/{}", endpoint.trim_end_matches('/'), model)
}

fn map_error_response(status: StatusCode, body: &[u8], model: &str) -> ClassifierError {
    let parsed: Option<InferenceErrorBody> = serde_json::from_slice(body).ok();

    match status {
        StatusCode::SERVICE_UNAVAILABLE => ClassifierError::ModelLoading {
            estimated_seconds: parsed
                .and_then(|body| body.estimated_time)
                .map(|seconds| seconds.ceil().max(1.0) as u64)
                .unwrap_or(20),
        },
        StatusCode::NOT_FOUND => ClassifierError::ModelNotFound {
            model_name: model.to_string(),
        },
        _ => ClassifierError::InferenceFailed {
            reason: match parsed {
                Some(body) if !body.error.is_empty() => format!("HTTP {}: {}", status, body.error),
                _ => format!("HTTP {}", status),
            },
        },
    }
}

fn best_predictions(
    response: InferenceResponse,
    expected: usize,
) -> Result<Vec<Prediction>, ClassifierError> {
    match response {
        InferenceResponse::PerInput(per_input) => per_input
            .into_iter()
            .map(|scores| top_label(scores).ok_or_else(invalid_format))
            .collect(),
        InferenceResponse::Flat(scores) if scores.len() == expected => {
            Ok(scores.into_iter().map(Prediction::from).collect())
        }
        InferenceResponse::Flat(scores) if expected == 1 => {
            Ok(vec![top_label(scores).ok_or_else(invalid_format)?])
        }
        InferenceResponse::Flat(_) => Err(invalid_format()),
    }
}

fn top_label(scores: Vec<LabelScore>) -> Option<Prediction> {
    scores
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(Prediction::from)
}

fn invalid_format() -> ClassifierError {
    ClassifierError::InvalidResponseFormat {
        provider: PROVIDER.to_string(),
    }
}

impl From<LabelScore> for Prediction {
    fn from(label_score: LabelScore) -> Self {
        Prediction {
            label: label_score.label,
            score: Some(label_score.score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> InferenceResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_model_url() {
        let config = ClassifierConfig {
            endpoint: "https://api-inference.huggingface.co/".to_string(),
            ..ClassifierConfig::default()
        };
        let model = HuggingFaceModel::with_client(Client::new(), &config);
        assert_eq!(
            model.url(),
            "https://api-inference.huggingface.co/models/MarieAngeA13/Sentiment-Analysis-BERT"
        );
        assert_eq!(model.name(), "MarieAngeA13/Sentiment-Analysis-BERT");
    }

    #[test]
    fn test_request_body_shape() {
        let texts = vec!["one".to_string(), "two".to_string()];
        let body = InferenceRequest {
            inputs: &texts,
            parameters: InferenceParameters {
                truncation: true,
                max_length: 512,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "inputs": ["one", "two"],
                "parameters": {"truncation": true, "max_length": 512}
            })
        );
    }

    #[test]
    fn test_per_input_scores_pick_highest() {
        let response = parse(
            r#"[
                [{"label": "positive", "score": 0.1}, {"label": "negative", "score": 0.8}, {"label": "neutral", "score": 0.1}],
                [{"label": "positive", "score": 0.7}, {"label": "negative", "score": 0.2}]
            ]"#,
        );
        let predictions = best_predictions(response, 2).unwrap();
        assert_eq!(predictions[0].label, "negative");
        assert_eq!(predictions[1].label, "positive");
        assert_eq!(predictions[1].score, Some(0.7));
    }

    #[test]
    fn test_flat_one_label_per_input() {
        let response = parse(r#"[{"label": "neutral", "score": 0.6}, {"label": "positive", "score": 0.9}]"#);
        let predictions = best_predictions(response, 2).unwrap();
        let labels: Vec<_> = predictions.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["neutral", "positive"]);
    }

    #[test]
    fn test_flat_scores_for_single_input() {
        let response = parse(
            r#"[{"label": "neutral", "score": 0.2}, {"label": "positive", "score": 0.5}, {"label": "negative", "score": 0.3}]"#,
        );
        let predictions = best_predictions(response, 1).unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].label, "positive");
    }

    #[test]
    fn test_unusable_shapes_are_rejected() {
        let response = parse(r#"[{"label": "neutral", "score": 0.2}]"#);
        assert!(matches!(
            best_predictions(response, 3),
            Err(ClassifierError::InvalidResponseFormat { .. })
        ));

        let response = parse(r#"[[]]"#);
        assert!(best_predictions(response, 1).is_err());

        assert!(serde_json::from_str::<InferenceResponse>(r#"{"error": "bad"}"#).is_err());
    }

    #[test]
    fn test_error_mapping() {
        let loading = map_error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            br#"{"error": "Model is currently loading", "estimated_time": 12.4}"#,
            "m",
        );
        assert_eq!(
            loading,
            ClassifierError::ModelLoading {
                estimated_seconds: 13
            }
        );

        let missing = map_error_response(StatusCode::NOT_FOUND, b"", "some/model");
        assert_eq!(
            missing,
            ClassifierError::ModelNotFound {
                model_name: "some/model".to_string()
            }
        );

        match map_error_response(StatusCode::UNAUTHORIZED, br#"{"error": "Invalid token"}"#, "m") {
            ClassifierError::InferenceFailed { reason } => assert!(reason.contains("Invalid token")),
            other => panic!("Expected InferenceFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_skips_request() {
        let model = HuggingFaceModel::with_client(Client::new(), &ClassifierConfig::default());
        let predictions = tokio_test::block_on(model.classify_batch(&[], true, 512)).unwrap();
        assert!(predictions.is_empty());
    }
}
