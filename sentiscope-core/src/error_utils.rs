use crate::error::*;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::SourceApi(e) => {
                error!("Source API error details: {:?}", e);
            }
            CoreError::Classifier(e) => {
                error!("Classifier error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            CoreError::Export(e) => {
                error!("Export error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::SourceApi(e) => e.is_retryable(),
            CoreError::Classifier(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            CoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::SourceApi(e) => e.retry_after(),
            CoreError::Classifier(e) => e.retry_after(),
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::SourceApi(e) => e.user_friendly_message(),
            CoreError::Classifier(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Export(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            CoreError::Io(e) => format!("File error: {}", e),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::SourceApi(_) => "SOURCE_API".to_string(),
            CoreError::Classifier(_) => "CLASSIFIER".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Export(_) => "EXPORT".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for SourceApiError {
    fn log_error(&self) -> &Self {
        error!("SourceApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("SourceApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            SourceApiError::RateLimitExceeded { .. } => true,
            SourceApiError::RequestTimeout => true,
            SourceApiError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(30)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            SourceApiError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your credentials.".to_string()
            }
            SourceApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            SourceApiError::Forbidden { resource } => format!(
                "Access denied to {}. The community may be private or quarantined.",
                resource
            ),
            SourceApiError::SubredditNotFound { subreddit } => {
                format!("Subreddit '{}' not found or is banned.", subreddit)
            }
            SourceApiError::InvalidToken => {
                "Reddit authentication token is invalid. Please check the app credentials."
                    .to_string()
            }
            SourceApiError::RequestTimeout => {
                "Request to Reddit timed out. Please try again.".to_string()
            }
            _ => "Reddit API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            SourceApiError::AuthenticationFailed { .. } => "SOURCE_AUTH_FAILED".to_string(),
            SourceApiError::RateLimitExceeded { .. } => "SOURCE_RATE_LIMIT".to_string(),
            SourceApiError::Forbidden { .. } => "SOURCE_FORBIDDEN".to_string(),
            SourceApiError::SubredditNotFound { .. } => "SOURCE_NOT_FOUND".to_string(),
            SourceApiError::InvalidToken => "SOURCE_INVALID_TOKEN".to_string(),
            SourceApiError::RequestTimeout => "SOURCE_TIMEOUT".to_string(),
            SourceApiError::InvalidResponse { .. } => "SOURCE_INVALID_RESPONSE".to_string(),
            SourceApiError::ServerError { .. } => "SOURCE_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ClassifierError {
    fn log_error(&self) -> &Self {
        error!("ClassifierError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ClassifierError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(self, ClassifierError::ModelLoading { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ClassifierError::ModelLoading { estimated_seconds } => {
                Some(Duration::from_secs((*estimated_seconds).max(1)))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ClassifierError::ModelNotFound { model_name } => format!(
                "Sentiment model '{}' not found. Please check the classifier settings.",
                model_name
            ),
            ClassifierError::ModelLoadingFailed { .. } => {
                "Failed to load the sentiment model. Please check the model files.".to_string()
            }
            ClassifierError::ModelLoading { estimated_seconds } => format!(
                "The sentiment model is warming up. Please retry in about {} seconds.",
                estimated_seconds
            ),
            ClassifierError::MisalignedBatch { .. } => {
                "The sentiment model returned an unexpected number of labels.".to_string()
            }
            _ => "Sentiment classification failed. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ClassifierError::ModelLoadingFailed { .. } => "CLS_MODEL_LOAD_FAILED".to_string(),
            ClassifierError::ModelNotFound { .. } => "CLS_MODEL_NOT_FOUND".to_string(),
            ClassifierError::TokenizationFailed { .. } => "CLS_TOKENIZATION_FAILED".to_string(),
            ClassifierError::InferenceFailed { .. } => "CLS_INFERENCE_FAILED".to_string(),
            ClassifierError::ModelLoading { .. } => "CLS_MODEL_LOADING".to_string(),
            ClassifierError::MisalignedBatch { .. } => "CLS_MISALIGNED_BATCH".to_string(),
            ClassifierError::InvalidResponseFormat { .. } => "CLS_INVALID_RESPONSE".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ExportError {
    fn log_error(&self) -> &Self {
        error!("ExportError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ExportError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ExportError::Csv(e) => format!("Could not read or write the table: {}", e),
            ExportError::MissingColumn { column } => {
                format!("The table file has no '{}' column.", column)
            }
            ExportError::EmptyField { row, column } => {
                format!("Row {} of the table file has no {}.", row, column)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ExportError::Csv(_) => "EXPORT_CSV".to_string(),
            ExportError::MissingColumn { .. } => "EXPORT_MISSING_COLUMN".to_string(),
            ExportError::EmptyField { .. } => "EXPORT_EMPTY_FIELD".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
            if error.is_retryable() {
                if let Some(retry_after) = error.retry_after() {
                    info!("Error is retryable. Retry after: {:?}", retry_after);
                }
            }
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `max_retries` retries have been spent. The error's own `retry_after`
/// overrides the running delay; the delay doubles up to 60s.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: usize,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorExt,
{
    let mut attempt = 0;
    let mut delay = initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= max_retries || !error.is_retryable() {
                    return Err(error);
                }

                if let Some(retry_delay) = error.retry_after() {
                    delay = retry_delay;
                }

                info!(
                    "Retrying operation (attempt {}/{}) after {:?}",
                    attempt + 1,
                    max_retries,
                    delay
                );

                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(60));
                attempt += 1;
            }
        }
    }
}
