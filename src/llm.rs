use crate::agent::AgentError;
use crate::catalog::ActionCandidate;
use crate::reconcile::ResolvedTarget;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(not(feature = "mock-llm"))]
use reqwest::{Client, StatusCode}; // Only used by the real implementation
#[cfg(not(feature = "mock-llm"))]
use serde::de::DeserializeOwned;
#[cfg(not(feature = "mock-llm"))]
use tracing::error;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT_MS: u32 = 25_000;
pub const DEFAULT_LANGUAGE: &str = "en";

/// Payload sent to the answering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidedRequest {
    pub question: String,
    pub title: String,
    pub url: String,
    pub text: String,
    pub actions: Vec<ActionCandidate>,
}

/// The collaborator's answer, optionally naming the control to highlight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidedResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub target: Option<ResolvedTarget>,
}

/// Free-form question about the page, answered without a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub title: String,
    pub url: String,
    pub text: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub answer: String,
}

/// Page to be summarized for reading aloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub title: String,
    pub url: String,
    pub text: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub summary: String,
}

/// `{error}` body the backend sends with failure statuses.
#[derive(Debug, Deserialize)]
struct BackendError {
    error: String,
}

/// Message carried by a failure body: the `error` field, or the raw text.
pub fn backend_error_message(body: &str) -> String {
    match serde_json::from_str::<BackendError>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_string(),
    }
}

/// The backend reports upstream rate limiting in the message of a 500.
pub fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["rate limit", "quota", "resource_exhausted", "429"]
        .iter()
        .any(|marker| lower.contains(marker))
}

#[derive(Debug, Clone)]
pub struct GuideConfig {
    /// Base URL of the backend that fronts the language model.
    pub backend_url: String,
    pub timeout_ms: u32,
}

impl Default for GuideConfig {
    fn default() -> Self {
        GuideConfig {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl GuideConfig {
    pub fn new(backend_url: &str) -> Self {
        let backend_url = backend_url.trim().trim_end_matches('/');
        GuideConfig {
            backend_url: if backend_url.is_empty() {
                DEFAULT_BACKEND_URL.to_string()
            } else {
                backend_url.to_string()
            },
            ..Default::default()
        }
    }

    pub fn guide_endpoint(&self) -> String {
        format!("{}/guide", self.backend_url)
    }

    pub fn ask_endpoint(&self) -> String {
        format!("{}/ask", self.backend_url)
    }

    pub fn summarize_endpoint(&self) -> String {
        format!("{}/summarize", self.backend_url)
    }
}

#[cfg(not(feature = "mock-llm"))]
pub async fn call_guide_backend(
    request: &GuidedRequest,
    config: &GuideConfig,
) -> Result<GuidedResponse, AgentError> {
    debug!(
        "call_guide_backend (REAL): {} actions",
        request.actions.len()
    );
    post_json(&config.guide_endpoint(), request, config).await
}

#[cfg(not(feature = "mock-llm"))]
pub async fn call_ask_backend(request: &AskRequest, config: &GuideConfig) -> Result<AskResponse, AgentError> {
    debug!("call_ask_backend (REAL) for question: {}", request.question);
    post_json(&config.ask_endpoint(), request, config).await
}

#[cfg(not(feature = "mock-llm"))]
pub async fn call_summarize_backend(
    request: &SummarizeRequest,
    config: &GuideConfig,
) -> Result<SummaryResponse, AgentError> {
    debug!("call_summarize_backend (REAL) for {}", request.url);
    post_json(&config.summarize_endpoint(), request, config).await
}

/// POSTs `body` as JSON and decodes the reply, mapping rate limiting to
/// [`AgentError::QuotaExhausted`].
#[cfg(not(feature = "mock-llm"))]
async fn post_json<B, R>(endpoint: &str, body: &B, config: &GuideConfig) -> Result<R, AgentError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    debug!("POST (REAL): {}", endpoint);

    let client = Client::new();
    let builder = client.post(endpoint).json(body);
    #[cfg(not(target_arch = "wasm32"))]
    let builder = builder.timeout(std::time::Duration::from_millis(config.timeout_ms as u64));

    let res = with_deadline(builder.send(), config.timeout_ms)
        .await?
        .map_err(|e| {
            error!("Request error (REAL): {}", e);
            AgentError::LlmCallFailed(format!("Request error: {}", e))
        })?;

    debug!("Response status (REAL): {}", res.status());

    if res.status() == StatusCode::TOO_MANY_REQUESTS {
        return Err(AgentError::QuotaExhausted(
            "Answering service rate limit reached. Wait a minute and try again.".to_string(),
        ));
    }
    if !res.status().is_success() {
        let error_text = res
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error text".to_string());
        let message = backend_error_message(&error_text);
        error!("API error (REAL): {}", message);
        if is_quota_message(&message) {
            return Err(AgentError::QuotaExhausted(message));
        }
        return Err(AgentError::LlmCallFailed(format!("API error: {}", message)));
    }

    res.json::<R>().await.map_err(|e| {
        let error_message = format!("JSON parsing error (REAL): {}", e);
        error!("{}", error_message);
        AgentError::InvalidLlmResponse(error_message)
    })
}

/// Races `future` against the collaborator timeout in the browser, where reqwest
/// has no per-request timeout of its own.
#[cfg(all(not(feature = "mock-llm"), target_arch = "wasm32"))]
async fn with_deadline<F, T>(future: F, timeout_ms: u32) -> Result<T, AgentError>
where
    F: std::future::Future<Output = T>,
{
    use futures::future::{select, Either};
    use gloo_timers::future::TimeoutFuture;

    match select(Box::pin(future), TimeoutFuture::new(timeout_ms)).await {
        Either::Left((value, _)) => Ok(value),
        Either::Right((_, _)) => Err(AgentError::Timeout(timeout_ms)),
    }
}

#[cfg(all(not(feature = "mock-llm"), not(target_arch = "wasm32")))]
async fn with_deadline<F, T>(future: F, _timeout_ms: u32) -> Result<T, AgentError>
where
    F: std::future::Future<Output = T>,
{
    Ok(future.await)
}

#[cfg(feature = "mock-llm")]
pub async fn call_guide_backend(
    request: &GuidedRequest,
    _config: &GuideConfig,
) -> Result<GuidedResponse, AgentError> {
    debug!("call_guide_backend (MOCK) for question: {}", request.question);

    if request.question.contains("fail_llm_call") {
        Err(AgentError::LlmCallFailed(
            "Mocked LLM Error: LLM call failed as requested by prompt.".to_string(),
        ))
    } else if request.question.contains("mock_not_found") {
        Ok(GuidedResponse {
            answer: "I can\u{2019}t find that on this page.".to_string(),
            target: None,
        })
    } else if request.question.contains("mock_target") {
        Ok(GuidedResponse {
            answer: "Press the first control on the page.".to_string(),
            target: request.actions.first().map(|a| ResolvedTarget {
                selector: a.selector.clone(),
                label: a.label.clone(),
            }),
        })
    } else {
        Ok(GuidedResponse {
            answer: format!("Mocked answer for: {}", request.question),
            target: None,
        })
    }
}

#[cfg(feature = "mock-llm")]
pub async fn call_ask_backend(request: &AskRequest, _config: &GuideConfig) -> Result<AskResponse, AgentError> {
    debug!("call_ask_backend (MOCK) for question: {}", request.question);

    if request.question.contains("fail_llm_call") {
        Err(AgentError::LlmCallFailed(
            "Mocked LLM Error: LLM call failed as requested by prompt.".to_string(),
        ))
    } else if request.question.contains("mock_quota") {
        Err(AgentError::QuotaExhausted("Mocked rate limit.".to_string()))
    } else {
        Ok(AskResponse {
            answer: format!("Mocked answer about {}: {}", request.title, request.question),
        })
    }
}

#[cfg(feature = "mock-llm")]
pub async fn call_summarize_backend(
    request: &SummarizeRequest,
    _config: &GuideConfig,
) -> Result<SummaryResponse, AgentError> {
    debug!("call_summarize_backend (MOCK) for {}", request.url);

    if request.text.contains("fail_llm_call") {
        Err(AgentError::LlmCallFailed(
            "Mocked LLM Error: LLM call failed as requested by page text.".to_string(),
        ))
    } else {
        Ok(SummaryResponse {
            summary: format!("Mocked summary of {} ({} chars)", request.title, request.text.chars().count()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guide_config_normalizes_backend_url() {
        assert_eq!(GuideConfig::new("http://localhost:3000/").guide_endpoint(), "http://localhost:3000/guide");
        assert_eq!(GuideConfig::new("  ").backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(GuideConfig::default().timeout_ms, 25_000);
    }

    #[test]
    fn test_guided_response_tolerates_missing_fields() {
        let response: GuidedResponse = serde_json::from_str(r#"{"answer":"Click Book."}"#).unwrap();
        assert_eq!(response.target, None);

        let response: GuidedResponse =
            serde_json::from_str(r##"{"answer":"x","target":{"selector":"#book","label":"Book"}}"##).unwrap();
        assert_eq!(response.target.unwrap().selector, "#book");

        let response: GuidedResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.answer, "");
    }

    #[test]
    fn test_backend_endpoints() {
        let config = GuideConfig::new("https://guide.example/api/");
        assert_eq!(config.ask_endpoint(), "https://guide.example/api/ask");
        assert_eq!(config.summarize_endpoint(), "https://guide.example/api/summarize");
    }

    #[test]
    fn test_backend_error_message_prefers_error_field() {
        assert_eq!(backend_error_message(r#"{"error":"Invalid JSON"}"#), "Invalid JSON");
        assert_eq!(backend_error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_quota_messages_are_recognized() {
        assert!(is_quota_message(
            "Gemini rate limit reached. Wait a minute or check your quota"
        ));
        assert!(is_quota_message("RESOURCE_EXHAUSTED"));
        assert!(!is_quota_message("Invalid JSON"));
    }

    #[test]
    fn test_summary_and_answer_tolerate_missing_fields() {
        let summary: SummaryResponse = serde_json::from_str(r#"{"summary":"Short."}"#).unwrap();
        assert_eq!(summary.summary, "Short.");
        let answer: AskResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(answer.answer, "");
    }

    #[test]
    fn test_guided_request_wire_shape() {
        let request = GuidedRequest {
            question: "q".into(),
            title: "t".into(),
            url: "u".into(),
            text: "x".into(),
            actions: vec![ActionCandidate {
                selector: "#a".into(),
                label: "A b".into(),
                tag: "button".into(),
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["actions"][0]["selector"], "#a");
        assert_eq!(value["question"], "q");
    }
}
