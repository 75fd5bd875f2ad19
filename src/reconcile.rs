use crate::intent::ScoredTarget;
use serde::{Deserialize, Serialize};

/// The phrase the answering collaborator is instructed to emit when the page
/// does not contain the answer.
pub const NOT_FOUND_SENTINEL: &str = "I can't find that on this page.";

/// Apostrophe look-alikes folded to `'` before sentinel matching.
const APOSTROPHE_VARIANTS: [char; 5] = ['\u{2019}', '\u{2018}', '\u{02BC}', '\u{0060}', '\u{00B4}'];

/// Selector and label ultimately used for highlighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub selector: String,
    pub label: String,
}

/// Where the resolved target came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSource {
    External,
    Heuristic,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub answer: String,
    pub target: Option<ResolvedTarget>,
    pub source: TargetSource,
}

fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if APOSTROPHE_VARIANTS.contains(&c) { '\'' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// True when `answer` carries the not-found sentinel, ignoring case and apostrophe style.
pub fn is_not_found(answer: &str) -> bool {
    let sentinel = normalize(NOT_FOUND_SENTINEL);
    let sentinel = sentinel.trim_end_matches('.');
    normalize(answer).contains(sentinel)
}

/// Multi-step answer naming the located control, used when the text answer failed
/// but element matching succeeded.
pub fn fallback_answer(label: &str, request: &str) -> String {
    let request = request.trim();
    format!(
        "I found a control on this page that matches your request \"{}\".\n\
         1. Look for the highlighted \"{}\" element.\n\
         2. Click it to continue.\n\
         3. Follow the on-screen steps that appear next.",
        request, label
    )
}

/// Merges the heuristic target with the collaborator's suggestion.
///
/// A suggestion with a non-empty selector wins. When the answer is the not-found
/// sentinel but some target resolved, the answer is replaced by `fallback_answer`;
/// with no target the answer passes through untouched.
pub fn reconcile(
    heuristic: Option<&ScoredTarget>,
    external: Option<&ResolvedTarget>,
    raw_answer: &str,
    request: &str,
) -> Reconciliation {
    let external = external
        .filter(|t| !t.selector.trim().is_empty())
        .map(|t| ResolvedTarget {
            selector: t.selector.trim().to_string(),
            label: t.label.trim().to_string(),
        });

    let (target, source) = match (external, heuristic) {
        (Some(ext), heuristic) => {
            // The collaborator may omit the label; borrow it from the heuristic when they agree.
            let label = if ext.label.is_empty() {
                heuristic
                    .filter(|h| h.candidate.selector == ext.selector)
                    .map(|h| h.candidate.label.clone())
                    .unwrap_or_default()
            } else {
                ext.label
            };
            (
                Some(ResolvedTarget {
                    selector: ext.selector,
                    label,
                }),
                TargetSource::External,
            )
        }
        (None, Some(h)) => (
            Some(ResolvedTarget {
                selector: h.candidate.selector.clone(),
                label: h.candidate.label.clone(),
            }),
            TargetSource::Heuristic,
        ),
        (None, None) => (None, TargetSource::None),
    };

    let answer = match &target {
        Some(t) if is_not_found(raw_answer) => {
            let label = if t.label.is_empty() { "highlighted" } else { t.label.as_str() };
            fallback_answer(label, request)
        }
        _ => raw_answer.to_string(),
    };

    Reconciliation {
        answer,
        target,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ActionCandidate;

    fn scored(selector: &str, label: &str) -> ScoredTarget {
        ScoredTarget {
            candidate: ActionCandidate {
                selector: selector.to_string(),
                label: label.to_string(),
                tag: "a".to_string(),
            },
            score: 7,
        }
    }

    fn external(selector: &str, label: &str) -> ResolvedTarget {
        ResolvedTarget {
            selector: selector.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_sentinel_detection_variants() {
        assert!(is_not_found("I can't find that on this page."));
        assert!(is_not_found("I can\u{2019}t find that on this page."));
        assert!(is_not_found("Sorry. I CAN'T FIND THAT ON THIS PAGE"));
        assert!(!is_not_found("Click the blue button at the top."));
    }

    #[test]
    fn test_external_target_takes_priority() {
        let h = scored("#book", "Book now");
        let ext = external("#contact", "Contact us");
        let result = reconcile(Some(&h), Some(&ext), "Use the contact form.", "contact them");
        assert_eq!(result.target, Some(ext));
        assert_eq!(result.source, TargetSource::External);
        assert_eq!(result.answer, "Use the contact form.");
    }

    #[test]
    fn test_blank_external_selector_falls_back_to_heuristic() {
        let h = scored("#book", "Book now");
        let ext = external("   ", "Whatever");
        let result = reconcile(Some(&h), Some(&ext), "Press Book now.", "book");
        assert_eq!(result.target, Some(external("#book", "Book now")));
        assert_eq!(result.source, TargetSource::Heuristic);
    }

    #[test]
    fn test_not_found_with_heuristic_target_rewrites_answer() {
        let h = scored("#book", "Book an appointment");
        let result = reconcile(
            Some(&h),
            None,
            "I can\u{2019}t find that on this page.",
            "I want to book an appointment",
        );
        assert_eq!(result.target, Some(external("#book", "Book an appointment")));
        assert!(result.answer.contains("\"Book an appointment\""));
        assert!(result.answer.contains("I want to book an appointment"));
        assert!(!is_not_found(&result.answer));
    }

    #[test]
    fn test_not_found_without_target_passes_through() {
        let result = reconcile(None, None, NOT_FOUND_SENTINEL, "weather");
        assert_eq!(result.answer, NOT_FOUND_SENTINEL);
        assert_eq!(result.target, None);
        assert_eq!(result.source, TargetSource::None);
    }

    #[test]
    fn test_external_without_label_borrows_matching_heuristic_label() {
        let h = scored("#book", "Book now");
        let ext = external("#book", "");
        let result = reconcile(Some(&h), Some(&ext), NOT_FOUND_SENTINEL, "book");
        assert_eq!(result.target, Some(external("#book", "Book now")));
        assert!(result.answer.contains("\"Book now\""));
    }
}
