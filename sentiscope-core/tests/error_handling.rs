use sentiscope_core::{
    retry_with_backoff, ClassifierError, ConfigError, CoreError, ErrorExt, ErrorReporter,
    ExportError, SourceApiError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn test_error_codes() {
    let source_error = CoreError::SourceApi(SourceApiError::InvalidToken);
    assert_eq!(source_error.error_code(), "SOURCE_API");

    let classifier_error = CoreError::Classifier(ClassifierError::ModelNotFound {
        model_name: "bert".to_string(),
    });
    assert_eq!(classifier_error.error_code(), "CLASSIFIER");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "client_id".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");

    let export_error = CoreError::Export(ExportError::MissingColumn {
        column: "Title".to_string(),
    });
    assert_eq!(export_error.error_code(), "EXPORT");
}

#[test]
fn test_forbidden_is_distinguishable() {
    let forbidden = CoreError::SourceApi(SourceApiError::Forbidden {
        resource: "/r/private/search".to_string(),
    });
    assert!(forbidden.is_forbidden());
    assert!(!forbidden.is_retryable());

    let server_error = CoreError::SourceApi(SourceApiError::ServerError { status_code: 502 });
    assert!(!server_error.is_forbidden());
    assert!(server_error.is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limit_error =
        CoreError::SourceApi(SourceApiError::RateLimitExceeded { retry_after: 60 });
    assert_eq!(
        rate_limit_error.retry_after(),
        Some(Duration::from_secs(60))
    );

    let loading_error = CoreError::Classifier(ClassifierError::ModelLoading {
        estimated_seconds: 0,
    });
    assert_eq!(loading_error.retry_after(), Some(Duration::from_secs(1)));

    let timeout_error = CoreError::Timeout { seconds: 30 };
    assert_eq!(timeout_error.retry_after(), Some(Duration::from_secs(30)));
}

#[test]
fn test_user_friendly_messages() {
    let source_error = CoreError::SourceApi(SourceApiError::InvalidToken);
    let message = source_error.user_friendly_message();
    assert!(message.contains("authentication token is invalid"));

    let config_error = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "REDDIT_CLIENT_ID".to_string(),
    });
    assert!(config_error
        .user_friendly_message()
        .contains("REDDIT_CLIENT_ID"));

    let misaligned = CoreError::Classifier(ClassifierError::MisalignedBatch {
        expected: 2,
        actual: 1,
    });
    assert!(!misaligned.user_friendly_message().is_empty());
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new()
        .with_error_reporting(true)
        .with_warning_reporting(true);
    let error = CoreError::SourceApi(SourceApiError::InvalidToken);

    // This test just ensures the methods don't panic
    reporter.report_error(&error);
    reporter.report_warning(&error);
}

#[test]
fn test_retry_with_backoff_recovers_from_model_loading() {
    let attempts = AtomicUsize::new(0);

    let result = tokio_test::block_on(retry_with_backoff(
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(CoreError::Classifier(ClassifierError::ModelLoading {
                        estimated_seconds: 0,
                    }))
                } else {
                    Ok(attempt)
                }
            }
        },
        3,
        Duration::from_millis(1),
    ));

    assert_eq!(result.unwrap(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_retry_with_backoff_stops_on_permanent_error() {
    let attempts = AtomicUsize::new(0);

    let result: Result<(), CoreError> = tokio_test::block_on(retry_with_backoff(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err(CoreError::SourceApi(SourceApiError::Forbidden {
                    resource: "r/secret".to_string(),
                }))
            }
        },
        3,
        Duration::from_millis(1),
    ));

    assert!(result.unwrap_err().is_forbidden());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
