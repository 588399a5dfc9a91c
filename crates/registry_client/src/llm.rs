//! Identity extraction through an Azure OpenAI chat deployment.

use std::time::Duration;

use regmerge_recon::model::parse_loose_date;
use regmerge_recon::{CallError, FailureKind, IdentityCandidates, IdentityExtractor};
use serde_json::{json, Value};

use crate::http::{ClientError, HttpTransport};

/// Characters of document text sent to the model.
pub const MAX_PROMPT_CHARS: usize = 3000;

const SYSTEM_PROMPT: &str =
    "You are a medical document analyzer. Extract MRN and DOB accurately.";

#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

#[derive(Clone)]
pub struct AzureOpenAiExtractor {
    http: HttpTransport,
    config: AzureOpenAiConfig,
}

impl AzureOpenAiExtractor {
    pub fn new(config: AzureOpenAiConfig, timeout: Duration) -> Self {
        Self {
            http: HttpTransport::new(timeout),
            config,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment,
            self.config.api_version
        )
    }

    fn complete(&self, text: &str) -> Result<String, ClientError> {
        let body = json!({
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(text)},
            ],
            "temperature": 0.1,
            "max_tokens": 200,
        });
        let request = self
            .http
            .client()
            .post(self.completions_url())
            .header("api-key", &self.config.api_key)
            .json(&body);
        let response = self.http.send_json(request)?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| ClientError::Parse("completion has no message content".into()))
    }
}

impl IdentityExtractor for AzureOpenAiExtractor {
    fn extract_identity_candidates(&self, text: &str) -> Result<IdentityCandidates, CallError> {
        let reply = self.complete(text)?;
        let candidates = parse_reply(&reply);
        if candidates.is_empty() {
            return Err(CallError::new(
                FailureKind::Permanent,
                format!("no MRN or DOB in model reply: {}", first_line(&reply)),
            ));
        }
        log::debug!("model extracted mrn={:?} dob={:?}", candidates.mrn, candidates.dob);
        Ok(candidates)
    }
}

fn build_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    format!(
        "Extract the Medical Record Number (MRN) and Date of Birth (DOB) from the following \
         medical document text.\n\
         Look for variations like \"MRN:\", \"Medical Record Number:\", \"MR Number:\", \"DOB:\", \
         \"Date of Birth:\", \"Birth Date:\".\n\n\
         Return the result in JSON format:\n\
         {{\"mrn\": \"extracted_mrn_value\", \"dob\": \"extracted_dob_value\"}}\n\n\
         If not found, use empty strings.\n\n\
         Document text:\n{excerpt}"
    )
}

/// Parse the model's reply: JSON first (code fences stripped), then
/// `MRN:` / `DOB:` lines.
pub fn parse_reply(reply: &str) -> IdentityCandidates {
    let body = strip_fences(reply);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if value.is_object() {
            return IdentityCandidates {
                mrn: json_field(&value["mrn"]),
                dob: json_field(&value["dob"]).and_then(|d| parse_loose_date(&d)),
            };
        }
        return IdentityCandidates::default();
    }

    let mut candidates = IdentityCandidates::default();
    for line in body.lines() {
        let Some((label, rest)) = line.split_once(':') else {
            continue;
        };
        let label = label.to_lowercase();
        let Some(value) = meaningful(rest.trim().trim_matches('"').trim_matches('\'')) else {
            continue;
        };
        if label.contains("mrn") || label.contains("medical record") {
            candidates.mrn = Some(value.to_string());
        } else if label.contains("dob") || label.contains("date of birth") {
            candidates.dob = parse_loose_date(value);
        }
    }
    candidates
}

fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn json_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => meaningful(s.trim()).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Placeholder answers the model uses for "not found".
fn meaningful(value: &str) -> Option<&str> {
    let lower = value.to_ascii_lowercase();
    if value.is_empty() || matches!(lower.as_str(), "null" | "none" | "n/a") {
        None
    } else {
        Some(value)
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}
