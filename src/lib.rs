use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::console;

use crate::agent::{GuideAgent, GuidedOutcome};
use crate::dom_utils::BrowserHost;
use crate::highlight::{HighlightController, HighlightError, HighlightResponse, DEFAULT_NOTE};
use crate::llm::{AskResponse, GuideConfig, SummaryResponse};
use crate::reputation::ReputationConfig;

pub mod agent;
pub mod catalog;
pub mod dom_utils;
pub mod highlight;
pub mod intent;
pub mod llm;
#[cfg(target_arch = "wasm32")]
pub mod logging;
pub mod reconcile;
pub mod reputation;
pub mod speech;

type SharedController = Rc<RefCell<HighlightController<BrowserHost>>>;

/// Guided answer plus what happened when its target was highlighted.
#[derive(Serialize)]
struct GuideReply {
    #[serde(flatten)]
    outcome: GuidedOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    highlight: Option<HighlightResponse>,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value)
        .map_err(|e| JsValue::from_str(&format!("SerializationError: {}", e)))
}

/// Activates a highlight whose expiry routes back through the controller.
fn activate_highlight(controller: &SharedController, selector: &str, note: &str) -> Result<u64, HighlightError> {
    let weak = Rc::downgrade(controller);
    controller.borrow_mut().activate(selector, note, move |session_id| {
        // Deferred so the firing timer is not dropped inside its own callback.
        wasm_bindgen_futures::spawn_local(async move {
            if let Some(controller) = weak.upgrade() {
                controller.borrow_mut().expire(session_id);
            }
        });
    })
}

// Expose PageGuide to JavaScript
#[wasm_bindgen]
pub struct PageGuide {
    highlight: SharedController,
}

#[wasm_bindgen]
impl PageGuide {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<PageGuide, JsValue> {
        Ok(PageGuide {
            highlight: Rc::new(RefCell::new(HighlightController::new(BrowserHost::new()?))),
        })
    }

    /// JSON array of `{selector, label, tag}` for the visible controls on the page.
    pub fn actionable_elements(&self) -> Result<String, JsValue> {
        let actions = dom_utils::collect_actionable_elements()?;
        to_json(&actions)
    }

    /// JSON `{title, url, text}` of the current page.
    pub fn page_snapshot(&self) -> Result<String, JsValue> {
        let snapshot = dom_utils::page_snapshot()?;
        to_json(&snapshot)
    }

    /// Highlights `selector`; answers JSON `{ok, reason?}`.
    pub fn highlight(&self, selector: &str, note: Option<String>) -> Result<String, JsValue> {
        console::log_1(&format!("Attempting to highlight element with selector: {}", selector).into());
        let note = note.unwrap_or_else(|| DEFAULT_NOTE.to_string());
        let result = activate_highlight(&self.highlight, selector, &note);
        match &result {
            Ok(id) => console::log_1(&format!("Successfully highlighted '{}' (session {})", selector, id).into()),
            Err(e) => console::warn_1(&format!("Highlight of '{}' failed: {}", selector, e).into()),
        }
        to_json(&HighlightResponse::from(result))
    }

    pub fn clear_highlight(&self) {
        self.highlight.borrow_mut().clear();
    }

    pub fn is_highlight_active(&self) -> bool {
        self.highlight.borrow().is_active()
    }

    /// Answers `question` about the current page and highlights the control it
    /// points at. Resolves to the JSON guided reply.
    pub fn guide(&self, question: String, backend_url: Option<String>) -> js_sys::Promise {
        let controller = self.highlight.clone();
        future_to_promise(async move {
            let catalog = dom_utils::collect_actionable_elements()?;
            let snapshot = dom_utils::page_snapshot()?;
            let agent = GuideAgent::new(GuideConfig::new(backend_url.as_deref().unwrap_or("")));

            let outcome = agent.guide(&snapshot, &catalog, &question).await;
            if let Some(reason) = &outcome.degraded {
                console::warn_1(&format!("Guide answered from local match only: {}", reason).into());
            }

            let highlight = outcome.target.as_ref().map(|target| {
                HighlightResponse::from(activate_highlight(&controller, &target.selector, DEFAULT_NOTE))
            });
            let reply = GuideReply { outcome, highlight };
            Ok(JsValue::from_str(&to_json(&reply)?))
        })
    }

    /// Answers a free-form question about the current page. Resolves to JSON
    /// `{answer}` and rejects when the backend fails.
    pub fn ask(&self, question: String, backend_url: Option<String>) -> js_sys::Promise {
        future_to_promise(async move {
            let snapshot = dom_utils::page_snapshot()?;
            let agent = GuideAgent::new(GuideConfig::new(backend_url.as_deref().unwrap_or("")));
            let answer = agent.ask(&snapshot, &question).await.map_err(|e| {
                console::error_1(&format!("Ask failed: {}", e).into());
                JsValue::from_str(&e.to_string())
            })?;
            Ok(JsValue::from_str(&to_json(&AskResponse { answer })?))
        })
    }

    /// Summarizes the current page for reading aloud. Resolves to JSON `{summary}`.
    pub fn summarize(&self, backend_url: Option<String>) -> js_sys::Promise {
        future_to_promise(async move {
            let snapshot = dom_utils::page_snapshot()?;
            let agent = GuideAgent::new(GuideConfig::new(backend_url.as_deref().unwrap_or("")));
            let summary = agent.summarize(&snapshot).await.map_err(|e| {
                console::error_1(&format!("Summarize failed: {}", e).into());
                JsValue::from_str(&e.to_string())
            })?;
            Ok(JsValue::from_str(&to_json(&SummaryResponse { summary })?))
        })
    }

    /// Resolves to JSON `{safe, threats}` for `url`. Without an API key every URL is safe.
    pub fn check_reputation(&self, url: String, api_key: Option<String>) -> js_sys::Promise {
        future_to_promise(async move {
            let config = ReputationConfig {
                api_key: api_key.filter(|k| !k.trim().is_empty()),
                ..Default::default()
            };
            let verdict = reputation::check_url(&url, &config)
                .await
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            Ok(JsValue::from_str(&to_json(&verdict)?))
        })
    }
}

// Initialize WASM module and log to console
#[wasm_bindgen(start)]
pub fn run() -> Result<(), JsValue> {
    #[cfg(debug_assertions)]
    console_error_panic_hook::set_once(); // Better panic messages in browser
    #[cfg(target_arch = "wasm32")]
    logging::init_browser_logging();
    console::log_1(&"PageGuide initialized!".into());
    Ok(())
}
