//! URL reputation lookups against the Safe Browsing v4 `threatMatches:find` API.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_ENDPOINT: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";
const CLIENT_ID: &str = "pageguide";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const THREAT_TYPES: [&str; 4] = [
    "MALWARE",
    "SOCIAL_ENGINEERING",
    "UNWANTED_SOFTWARE",
    "POTENTIALLY_HARMFUL_APPLICATION",
];
const SKIPPED_SCHEMES: [&str; 4] = ["chrome://", "chrome-extension://", "file://", "about:"];

#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("Reputation request failed: {0}")]
    RequestFailed(String),
    #[error("Reputation service returned status {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("Invalid reputation response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct ReputationConfig {
    /// Without a key every lookup answers "safe".
    pub api_key: Option<String>,
    pub endpoint: String,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        ReputationConfig {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl ReputationConfig {
    /// Reads `GOOGLE_SAFE_BROWSING_API_KEY`; blank values count as absent.
    pub fn from_env() -> Self {
        let api_key = std::env::var("GOOGLE_SAFE_BROWSING_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        ReputationConfig {
            api_key,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threat {
    pub threat_type: String,
    pub platform_type: String,
    pub url: String,
}

impl Threat {
    pub fn description(&self) -> &'static str {
        match self.threat_type.as_str() {
            "MALWARE" => "This site may install malicious software on your device.",
            "SOCIAL_ENGINEERING" => "This site may try to trick you into revealing personal information.",
            "UNWANTED_SOFTWARE" => "This site may install unwanted software.",
            "POTENTIALLY_HARMFUL_APPLICATION" => "This site may distribute harmful applications.",
            _ => "This site has been flagged as potentially unsafe.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub threats: Vec<Threat>,
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        SafetyVerdict {
            safe: true,
            threats: Vec::new(),
        }
    }

    pub fn from_threats(threats: Vec<Threat>) -> Self {
        SafetyVerdict {
            safe: threats.is_empty(),
            threats,
        }
    }
}

/// Browser-internal and local pages are never looked up.
pub fn should_check(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && !SKIPPED_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    client: ClientInfo<'a>,
    threat_info: ThreatInfo<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfo<'a> {
    client_id: &'a str,
    client_version: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreatInfo<'a> {
    threat_types: &'a [&'a str],
    platform_types: [&'a str; 1],
    threat_entry_types: [&'a str; 1],
    threat_entries: [ThreatEntry<'a>; 1],
}

#[derive(Serialize)]
struct ThreatEntry<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    matches: Vec<ThreatMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreatMatch {
    #[serde(default)]
    threat_type: String,
    #[serde(default)]
    platform_type: String,
    threat: Option<MatchedEntry>,
}

#[derive(Deserialize)]
struct MatchedEntry {
    #[serde(default)]
    url: String,
}

fn lookup_body(url: &str) -> LookupRequest<'_> {
    LookupRequest {
        client: ClientInfo {
            client_id: CLIENT_ID,
            client_version: CLIENT_VERSION,
        },
        threat_info: ThreatInfo {
            threat_types: &THREAT_TYPES,
            platform_types: ["ANY_PLATFORM"],
            threat_entry_types: ["URL"],
            threat_entries: [ThreatEntry { url }],
        },
    }
}

/// Parses a lookup response body; `{}` means no matches.
pub fn parse_verdict(body: &str, checked_url: &str) -> Result<SafetyVerdict, ReputationError> {
    let response: LookupResponse =
        serde_json::from_str(body).map_err(|e| ReputationError::InvalidResponse(e.to_string()))?;
    let threats = response
        .matches
        .into_iter()
        .map(|m| Threat {
            threat_type: m.threat_type,
            platform_type: m.platform_type,
            url: m
                .threat
                .map(|t| t.url)
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| checked_url.to_string()),
        })
        .collect();
    Ok(SafetyVerdict::from_threats(threats))
}

pub async fn check_url(url: &str, config: &ReputationConfig) -> Result<SafetyVerdict, ReputationError> {
    let Some(api_key) = config.api_key.as_deref() else {
        debug!("No reputation API key configured; treating {} as safe", url);
        return Ok(SafetyVerdict::safe());
    };
    if !should_check(url) {
        return Ok(SafetyVerdict::safe());
    }

    let res = reqwest::Client::new()
        .post(&config.endpoint)
        .query(&[("key", api_key)])
        .json(&lookup_body(url))
        .send()
        .await
        .map_err(|e| {
            error!("Reputation request error: {}", e);
            ReputationError::RequestFailed(e.to_string())
        })?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| ReputationError::RequestFailed(e.to_string()))?;
    if !status.is_success() {
        warn!("Reputation service answered {}: {}", status, body);
        return Err(ReputationError::ApiError {
            status: status.as_u16(),
            body,
        });
    }

    let verdict = parse_verdict(&body, url)?;
    debug!("Reputation of {}: safe={}, {} threats", url, verdict.safe, verdict.threats.len());
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_check_skips_internal_pages() {
        assert!(should_check("https://example.com/login"));
        assert!(should_check("http://localhost:3000"));
        assert!(!should_check("chrome://settings"));
        assert!(!should_check("chrome-extension://abc/popup.html"));
        assert!(!should_check("file:///home/user/page.html"));
        assert!(!should_check("about:blank"));
        assert!(!should_check("   "));
    }

    #[test]
    fn test_parse_verdict_without_matches_is_safe() {
        let verdict = parse_verdict("{}", "https://example.com").unwrap();
        assert_eq!(verdict, SafetyVerdict::safe());
    }

    #[test]
    fn test_parse_verdict_collects_threats() {
        let body = r#"{"matches":[
            {"threatType":"SOCIAL_ENGINEERING","platformType":"ANY_PLATFORM","threat":{"url":"https://phish.example"}},
            {"threatType":"MALWARE","platformType":"WINDOWS"}
        ]}"#;
        let verdict = parse_verdict(body, "https://phish.example/x").unwrap();
        assert!(!verdict.safe);
        assert_eq!(verdict.threats.len(), 2);
        assert_eq!(verdict.threats[0].url, "https://phish.example");
        assert_eq!(verdict.threats[1].url, "https://phish.example/x");
        assert!(verdict.threats[0].description().contains("personal information"));
    }

    #[test]
    fn test_parse_verdict_rejects_garbage() {
        assert!(matches!(
            parse_verdict("not json", "https://example.com"),
            Err(ReputationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_unknown_threat_type_has_generic_description() {
        let threat = Threat {
            threat_type: "THREAT_TYPE_UNSPECIFIED".into(),
            platform_type: "ANY_PLATFORM".into(),
            url: "https://x.example".into(),
        };
        assert_eq!(threat.description(), "This site has been flagged as potentially unsafe.");
    }

    #[test]
    fn test_lookup_body_wire_shape() {
        let value = serde_json::to_value(lookup_body("https://example.com")).unwrap();
        assert_eq!(value["client"]["clientId"], "pageguide");
        assert_eq!(value["threatInfo"]["threatTypes"].as_array().unwrap().len(), 4);
        assert_eq!(value["threatInfo"]["threatEntries"][0]["url"], "https://example.com");
        assert_eq!(value["threatInfo"]["platformTypes"][0], "ANY_PLATFORM");
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[tokio::test]
    async fn test_missing_key_answers_safe_without_network() {
        let config = ReputationConfig {
            api_key: None,
            endpoint: "http://127.0.0.1:9/unreachable".into(),
        };
        let verdict = check_url("https://example.com", &config).await.unwrap();
        assert!(verdict.safe);
    }
}
