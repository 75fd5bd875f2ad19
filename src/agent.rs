use crate::catalog::ActionCandidate;
use crate::intent::{best_target, ScoredTarget};
use crate::llm::{
    call_ask_backend, call_guide_backend, call_summarize_backend, AskRequest, GuideConfig, GuidedRequest,
    GuidedResponse, SummarizeRequest, DEFAULT_LANGUAGE,
};
use crate::reconcile::{reconcile, ResolvedTarget, TargetSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Page text beyond this many characters is cut before it is sent out.
pub const MAX_PAGE_TEXT_CHARS: usize = 20_000;
const TRUNCATION_MARKER: &str = "\n\n[Truncated due to length]";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM Call Failed: {0}")]
    LlmCallFailed(String),
    #[error("Invalid LLM Response: {0}")]
    InvalidLlmResponse(String),
    #[error("Quota Exhausted: {0}")]
    QuotaExhausted(String),
    #[error("LLM Call Timed Out after {0}ms")]
    Timeout(u32),
    #[error("No question was asked")]
    EmptyQuestion,
}

/// What the page looked like when the request was made.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub title: String,
    pub url: String,
    pub text: String,
}

impl PageSnapshot {
    fn title_or_unknown(&self) -> String {
        non_blank_or_unknown(&self.title)
    }

    fn url_or_unknown(&self) -> String {
        non_blank_or_unknown(&self.url)
    }
}

fn non_blank_or_unknown(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() { "Unknown".to_string() } else { value.to_string() }
}

/// Final answer for one guided request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuidedOutcome {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ResolvedTarget>,
    pub source: TargetSource,
    /// Why the collaborator's answer was not used, when it was not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

/// Answer used when the collaborator is unavailable and no control matched either.
pub const UNAVAILABLE_ANSWER: &str =
    "I couldn't get an answer right now. Please try again in a moment.";

/// Clamps page text to `MAX_PAGE_TEXT_CHARS`, marking the cut.
pub fn clamp_page_text(text: &str) -> String {
    match text.char_indices().nth(MAX_PAGE_TEXT_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Runs one guided request: local scoring, the answering collaborator, reconciliation.
pub struct GuideAgent {
    config: GuideConfig,
}

impl GuideAgent {
    pub fn new(config: GuideConfig) -> Self {
        GuideAgent { config }
    }

    pub fn config(&self) -> &GuideConfig {
        &self.config
    }

    pub fn build_request(
        &self,
        page: &PageSnapshot,
        catalog: &[ActionCandidate],
        question: &str,
    ) -> GuidedRequest {
        GuidedRequest {
            question: question.trim().to_string(),
            title: page.title.clone(),
            url: page.url.clone(),
            text: clamp_page_text(&page.text),
            actions: catalog.to_vec(),
        }
    }

    pub async fn guide(
        &self,
        page: &PageSnapshot,
        catalog: &[ActionCandidate],
        question: &str,
    ) -> GuidedOutcome {
        let request = self.build_request(page, catalog, question);
        let heuristic = best_target(catalog, question);
        debug!(
            "Guided request '{}': {} candidates, heuristic {:?}",
            request.question,
            catalog.len(),
            heuristic.as_ref().map(|h| (&h.candidate.selector, h.score))
        );

        let external = call_guide_backend(&request, &self.config).await;
        settle(heuristic.as_ref(), external, question)
    }

    pub fn build_ask_request(&self, page: &PageSnapshot, question: &str) -> AskRequest {
        AskRequest {
            question: question.trim().to_string(),
            title: page.title_or_unknown(),
            url: page.url_or_unknown(),
            text: clamp_page_text(&page.text),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn build_summarize_request(&self, page: &PageSnapshot) -> SummarizeRequest {
        SummarizeRequest {
            title: page.title_or_unknown(),
            url: page.url_or_unknown(),
            text: clamp_page_text(&page.text),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Answers a free-form question about the page. Unlike `guide` there is no
    /// local fallback, so collaborator errors propagate.
    pub async fn ask(&self, page: &PageSnapshot, question: &str) -> Result<String, AgentError> {
        let request = self.build_ask_request(page, question);
        if request.question.is_empty() {
            return Err(AgentError::EmptyQuestion);
        }
        let response = call_ask_backend(&request, &self.config).await?;
        Ok(response.answer.trim().to_string())
    }

    /// Summarizes the page for reading aloud.
    pub async fn summarize(&self, page: &PageSnapshot) -> Result<String, AgentError> {
        let request = self.build_summarize_request(page);
        debug!("Summarizing '{}' ({} chars)", request.title, request.text.chars().count());
        let response = call_summarize_backend(&request, &self.config).await?;
        Ok(response.summary.trim().to_string())
    }
}

/// Combines the heuristic target with the collaborator's result. A failed
/// collaborator counts as "no external answer, no external target".
pub fn settle(
    heuristic: Option<&ScoredTarget>,
    external: Result<GuidedResponse, AgentError>,
    question: &str,
) -> GuidedOutcome {
    let (response, degraded) = match external {
        Ok(response) => (Some(response), None),
        Err(e) => {
            warn!("Answering collaborator unavailable, using local match only: {}", e);
            (None, Some(e.to_string()))
        }
    };

    let raw_answer = response.as_ref().map(|r| r.answer.as_str()).unwrap_or("");
    let external_target = response.as_ref().and_then(|r| r.target.as_ref());
    let reconciled = reconcile(heuristic, external_target, raw_answer, question);

    let answer = match (&reconciled.target, reconciled.answer.trim().is_empty()) {
        (Some(t), true) => crate::reconcile::fallback_answer(&t.label, question),
        (None, true) => UNAVAILABLE_ANSWER.to_string(),
        _ => reconciled.answer,
    };

    GuidedOutcome {
        answer,
        target: reconciled.target,
        source: reconciled.source,
        degraded,
    }
}
