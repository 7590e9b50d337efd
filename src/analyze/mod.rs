//! Client for a Document Intelligence-style analyze API.
//!
//! Submission is `POST .../documentModels/{model}:analyze`, which replies with
//! HTTP 202 and an `Operation-Location` header naming the status URL. Status
//! queries are plain `GET`s against that URL. This client implements
//! [`LroTransport`], so a [`crate::lro::Poller`] owns all waiting; each
//! method here performs exactly one round trip (plus bounded retries of
//! transient submission failures).

pub mod result;

use std::sync::LazyLock;

use base64::{Engine as _, prelude::BASE64_STANDARD};
use keen_retry::{ExponentialJitter, ResolvedResult, RetryResult};
use regex::Regex;
use reqwest::StatusCode;
use uuid::Uuid;

use self::result::AnalyzeResult;
use crate::{
    config::ServiceConfig,
    lro::{
        LroError, LroTransport, OperationHandle, OperationStatus, PollSnapshot,
        ServiceError,
    },
    prelude::*,
    retry::{IntoRetryResult as _, IsKnownTransient as _},
};

/// The service API version we request.
const API_VERSION: &str = "2024-11-30";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Header carrying a caller-generated id for request correlation.
const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// A unit of work: one document analyzed by one model.
#[derive(Clone, Debug)]
pub struct AnalyzeRequest {
    /// The model to run, e.g. `prebuilt-layout`.
    pub model_id: String,

    /// Where the document bytes come from.
    pub source: DocumentSource,
}

impl AnalyzeRequest {
    /// Analyze a document the service fetches from a URL.
    pub fn from_url(model_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            source: DocumentSource::Url(url.into()),
        }
    }

    /// Analyze a local file, uploading its contents inline.
    pub async fn from_file(model_id: impl Into<String>, path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Self {
            model_id: model_id.into(),
            source: DocumentSource::Base64(BASE64_STANDARD.encode(&bytes)),
        })
    }
}

/// The document source, in the wire format the analyze endpoint expects:
/// either `{"urlSource": ...}` or `{"base64Source": ...}`.
#[derive(Clone, Serialize)]
pub enum DocumentSource {
    /// A URL the service downloads directly.
    #[serde(rename = "urlSource")]
    Url(String),

    /// Document bytes, base64-encoded and uploaded inline.
    #[serde(rename = "base64Source")]
    Base64(String),
}

// Hand-written so megabytes of base64 never land in logs.
impl std::fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            DocumentSource::Base64(data) => f
                .debug_tuple("Base64")
                .field(&format!("<{} bytes>", data.len()))
                .finish(),
        }
    }
}

/// The wire shape of one status query response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperationResponse {
    /// Current operation status.
    status: OperationStatus,

    /// The analysis result, present once `status` is `succeeded`.
    analyze_result: Option<AnalyzeResult>,

    /// The failure detail, present once `status` is `failed`.
    error: Option<ServiceError>,
}

/// Matches the final path segment of an `Operation-Location` URL, which is
/// the operation id: `.../analyzeResults/{id}?api-version=...`.
static OPERATION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/([^/?]+)(?:\?.*)?$").expect("failed to compile regex"));

/// Extract the operation id from an `Operation-Location` URL.
///
/// Falls back to the whole URL when no path segment can be found, which
/// keeps the id usable for log correlation either way.
fn operation_id_from_url(url: &str) -> String {
    OPERATION_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
        .unwrap_or_else(|| url.to_owned())
}

/// Client for the analyze API.
pub struct AnalyzeClient {
    /// Service endpoint and credential.
    config: ServiceConfig,

    /// The shared HTTP connection pool, reused across submissions and polls.
    http: reqwest::Client,
}

impl AnalyzeClient {
    /// Create a new client for the given service.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    /// The submission URL for a model.
    fn analyze_url(&self, model_id: &str) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}",
            self.config.endpoint, model_id, API_VERSION
        )
    }

    /// One submission attempt, classified for retrying.
    async fn submit_once(
        &self,
        request: &AnalyzeRequest,
    ) -> RetryResult<(), (), OperationHandle, LroError> {
        self.try_submit(request).await.into_retry_result()
    }

    /// Perform one submission round trip.
    async fn try_submit(
        &self,
        request: &AnalyzeRequest,
    ) -> Result<OperationHandle, LroError> {
        let url = self.analyze_url(&request.model_id);
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, self.config.credential.expose())
            .header(CLIENT_REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .json(&request.source)
            .send()
            .await
            .map_err(|e| {
                LroError::transport(format!("POST {url}: {e}"), e.is_known_transient())
            })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let retryable = status.is_known_transient();
            let body = response.text().await.unwrap_or_default();
            return Err(LroError::transport(
                format!("POST {url}: unexpected status {status}: {body}"),
                retryable,
            ));
        }

        let location = response
            .headers()
            .get("operation-location")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                LroError::transport(
                    format!("POST {url}: response had no Operation-Location header"),
                    false,
                )
            })?;
        Ok(OperationHandle {
            id: operation_id_from_url(location),
            status_url: location.to_owned(),
        })
    }

    /// Build a handle for an operation submitted earlier, from its status
    /// URL. Used to resume polling after a local timeout.
    pub fn handle_from_status_url(&self, status_url: impl Into<String>) -> OperationHandle {
        let status_url = status_url.into();
        OperationHandle {
            id: operation_id_from_url(&status_url),
            status_url,
        }
    }
}

#[async_trait]
impl LroTransport for AnalyzeClient {
    type Request = AnalyzeRequest;
    type Output = AnalyzeResult;

    #[instrument(level = "debug", skip_all, fields(model = %request.model_id))]
    async fn submit(&self, request: &AnalyzeRequest) -> Result<OperationHandle, LroError> {
        // If submission fails transiently, back off exponentially before
        // giving up.
        let jitter = ExponentialJitter::FromBackoffRange {
            backoff_range_millis: 1..=10_000,
            re_attempts: 4,
            jitter_ratio: 0.2,
        };

        let resolved = self
            .submit_once(request)
            .await
            .retry_with_async(|_| async move { self.submit_once(request).await })
            .with_exponential_jitter(|| jitter)
            .await
            .inspect_recovered(|_, _, retry_errors_list| {
                warn!(
                    "submission succeeded after {} retries (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            })
            .inspect_given_up(|_, retry_errors_list, fatal_error| {
                error!(
                    "submission failed after {} retry attempts: {fatal_error:?}",
                    retry_errors_list.len()
                )
            });

        match resolved {
            ResolvedResult::Ok { output, .. }
            | ResolvedResult::Recovered { output, .. } => Ok(output),
            ResolvedResult::Fatal { error, .. } => Err(error),
            ResolvedResult::GivenUp { fatal_error, .. }
            | ResolvedResult::Unrecoverable { fatal_error, .. } => Err(fatal_error),
        }
    }

    #[instrument(level = "trace", skip_all, fields(id = %handle.id))]
    async fn poll(
        &self,
        handle: &OperationHandle,
    ) -> Result<PollSnapshot<AnalyzeResult>, LroError> {
        let url = &handle.status_url;
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, self.config.credential.expose())
            .send()
            .await
            .map_err(|e| {
                LroError::transport(format!("GET {url}: {e}"), e.is_known_transient())
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LroError::InvalidOperation {
                id: handle.id.clone(),
            });
        }
        if !status.is_success() {
            let retryable = status.is_known_transient();
            let body = response.text().await.unwrap_or_default();
            return Err(LroError::transport(
                format!("GET {url}: unexpected status {status}: {body}"),
                retryable,
            ));
        }

        let parsed = response
            .json::<AnalyzeOperationResponse>()
            .await
            .map_err(|e| {
                LroError::transport(
                    format!("GET {url}: failed to parse status response: {e}"),
                    false,
                )
            })?;
        Ok(PollSnapshot {
            status: parsed.status,
            result: parsed.analyze_result,
            error: parsed.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_ids_come_from_the_final_path_segment() {
        let url = "https://res.cognitiveservices.azure.com/documentintelligence/documentModels/prebuilt-layout/analyzeResults/3b5a0c4e?api-version=2024-11-30";
        assert_eq!(operation_id_from_url(url), "3b5a0c4e");
        assert_eq!(
            operation_id_from_url("https://res.example.test/operations/op-77"),
            "op-77"
        );
    }

    #[test]
    fn document_sources_serialize_to_the_wire_format() {
        let url = DocumentSource::Url("https://example.test/form.pdf".to_owned());
        assert_eq!(
            serde_json::to_value(&url).unwrap(),
            serde_json::json!({"urlSource": "https://example.test/form.pdf"})
        );

        let inline = DocumentSource::Base64("aGVsbG8=".to_owned());
        assert_eq!(
            serde_json::to_value(&inline).unwrap(),
            serde_json::json!({"base64Source": "aGVsbG8="})
        );
    }

    #[test]
    fn base64_sources_are_redacted_in_debug_output() {
        let inline = DocumentSource::Base64("aGVsbG8=".repeat(1000));
        let debugged = format!("{:?}", inline);
        assert!(!debugged.contains("aGVsbG8="));
        assert!(debugged.contains("8000 bytes"));
    }

    #[test]
    fn status_responses_deserialize_from_camel_case() {
        let running: AnalyzeOperationResponse =
            serde_json::from_str(r#"{"status": "notStarted"}"#).unwrap();
        assert_eq!(running.status, OperationStatus::NotStarted);
        assert!(running.analyze_result.is_none());

        let failed: AnalyzeOperationResponse = serde_json::from_str(
            r#"{"status": "failed", "error": {"code": "InvalidRequest", "message": "bad source"}}"#,
        )
        .unwrap();
        assert_eq!(failed.status, OperationStatus::Failed);
        assert_eq!(failed.error.unwrap().code, "InvalidRequest");
    }
}
