use crate::catalog::ActionCandidate;
use serde::Serialize;
use std::collections::HashSet;

const TOKEN_MATCH_POINTS: u32 = 3;
const CATEGORY_POINTS: u32 = 4;
const BUTTON_POINTS: u32 = 1;

/// Named intent categories and the keyword variants that signal them.
///
/// A category contributes when one of its variants is a request token and one of
/// its variants occurs anywhere in the lower-cased label.
pub const INTENT_CATEGORIES: &[(&str, &[&str])] = &[
    ("appointment", &["appointment", "appointments", "book", "booking", "schedule", "reserve", "reservation"]),
    ("sign-in", &["login", "log", "signin", "sign", "account"]),
    ("register", &["register", "signup", "join", "create", "enroll"]),
    ("checkout", &["checkout", "cart", "basket", "pay", "payment", "purchase", "buy"]),
    ("contact", &["contact", "email", "phone", "call", "message"]),
    ("menu", &["menu", "navigation", "nav"]),
    ("search", &["search", "find", "lookup"]),
    ("help", &["help", "support", "faq", "assistance"]),
];

/// A catalog entry together with the score it earned for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredTarget {
    pub candidate: ActionCandidate,
    pub score: u32,
}

/// Lower-cases, replaces non-alphanumeric characters with spaces, splits on
/// whitespace, and drops tokens of two characters or fewer.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Scores one candidate against the request tokens. Returns 0 for a label with no tokens.
pub fn score_candidate(candidate: &ActionCandidate, request_tokens: &HashSet<String>) -> u32 {
    let label_tokens = tokenize(&candidate.label);
    if label_tokens.is_empty() {
        return 0;
    }

    let mut score = label_tokens
        .iter()
        .filter(|t| request_tokens.contains(*t))
        .count() as u32
        * TOKEN_MATCH_POINTS;

    let label = candidate.label.to_lowercase();
    for (_, variants) in INTENT_CATEGORIES {
        let asked = variants.iter().any(|v| request_tokens.contains(*v));
        if asked && variants.iter().any(|v| label.contains(v)) {
            score += CATEGORY_POINTS;
        }
    }

    // The button prior only breaks ties between relevant candidates.
    if score > 0 && candidate.tag == "button" {
        score += BUTTON_POINTS;
    }

    score
}

/// Picks the best-scoring candidate for a free-text request.
///
/// Ties go to the earliest candidate in document order. Returns `None` when the
/// request has no usable tokens or no candidate scores above zero.
pub fn best_target(candidates: &[ActionCandidate], request: &str) -> Option<ScoredTarget> {
    let request_tokens: HashSet<String> = tokenize(request).into_iter().collect();
    if request_tokens.is_empty() {
        return None;
    }

    let mut best: Option<ScoredTarget> = None;
    for candidate in candidates {
        let score = score_candidate(candidate, &request_tokens);
        if score == 0 {
            continue;
        }
        let better = best.as_ref().map_or(true, |b| score > b.score);
        if better {
            best = Some(ScoredTarget {
                candidate: candidate.clone(),
                score,
            });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(label: &str, tag: &str) -> ActionCandidate {
        ActionCandidate {
            selector: format!("#{}", label.replace(' ', "-").to_lowercase()),
            label: label.to_string(),
            tag: tag.to_string(),
        }
    }

    #[test]
    fn test_tokenize_drops_short_tokens_and_punctuation() {
        assert_eq!(
            tokenize("I want to BOOK an appointment!"),
            vec!["want", "book", "appointment"]
        );
        assert_eq!(tokenize("sign-in, please"), vec!["sign", "please"]);
        assert!(tokenize("a an to ?!").is_empty());
    }

    #[test]
    fn test_book_appointment_outranks_contact() {
        let candidates = vec![
            candidate("Book an appointment", "a"),
            candidate("Contact us", "a"),
        ];
        let best = best_target(&candidates, "I want to book an appointment").unwrap();
        assert_eq!(best.candidate.label, "Book an appointment");
        // "book" + "appointment" overlap, plus the appointment category.
        assert_eq!(best.score, 2 * 3 + 4);
    }

    #[test]
    fn test_category_bonus_without_token_overlap() {
        let candidates = vec![candidate("Schedule a visit", "a"), candidate("About", "a")];
        let best = best_target(&candidates, "where do I book?").unwrap();
        assert_eq!(best.candidate.label, "Schedule a visit");
        assert_eq!(best.score, 4);
    }

    #[test]
    fn test_no_shared_vocabulary_returns_none() {
        let candidates = vec![candidate("Privacy policy", "a"), candidate("Careers", "a")];
        assert_eq!(best_target(&candidates, "what is the weather tomorrow"), None);
    }

    #[test]
    fn test_button_bonus_alone_is_not_enough() {
        let candidates = vec![candidate("Subscribe", "button")];
        let request_tokens: HashSet<String> = tokenize("weather forecast").into_iter().collect();
        assert_eq!(score_candidate(&candidates[0], &request_tokens), 0);
        assert_eq!(best_target(&candidates, "weather forecast"), None);
    }

    #[test]
    fn test_button_bonus_breaks_ties() {
        let candidates = vec![candidate("Checkout", "a"), candidate("Checkout", "button")];
        let best = best_target(&candidates, "go to checkout").unwrap();
        assert_eq!(best.candidate.tag, "button");
        assert_eq!(best.score, 3 + 4 + 1);
    }

    #[test]
    fn test_empty_request_tokens_return_none() {
        let candidates = vec![candidate("Go", "button")];
        assert_eq!(best_target(&candidates, "is it ok?"), None);
    }

    #[test]
    fn test_tie_break_prefers_document_order() {
        let candidates = vec![candidate("Contact sales", "a"), candidate("Contact support", "a")];
        let best = best_target(&candidates, "contact").unwrap();
        assert_eq!(best.candidate.label, "Contact sales");
    }

    #[test]
    fn test_label_without_tokens_is_skipped() {
        let candidates = vec![candidate("OK", "button"), candidate("Sign in", "a")];
        let best = best_target(&candidates, "how do I sign in").unwrap();
        assert_eq!(best.candidate.label, "Sign in");
    }
}
