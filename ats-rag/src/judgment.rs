//! Grounded per-requirement judgment by a language model.
//!
//! The [`JudgmentOrchestrator`] shows the model one requirement and the
//! résumé excerpts retrieved for it, and asks for a verdict drawn from a
//! closed set of match levels. Responses are parsed strictly: an answer
//! without a recognizable match level gets exactly one reformulation retry,
//! then fails with [`RatingError::UnparsableJudgment`]. Citations are checked
//! against the evidence that was actually supplied.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::config::RatingConfig;
use crate::document::{Evidence, Requirement};
use crate::error::{RatingError, Result};

/// Attempts per requirement: the original prompt plus one reformulation.
const MAX_ATTEMPTS: usize = 2;

const REFORMULATION: &str = "Your previous answer did not follow the required format. \
Respond again with exactly one JSON object and nothing else: no prose, no markdown. \
The object must have the keys \"match_level\" (one of \"STRONG\", \"PARTIAL\", \"NONE\"), \
\"rationale\" (a string) and \"cited_chunk_ids\" (an array of excerpt ids).";

/// How well the résumé satisfies one requirement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchLevel {
    /// The excerpts explicitly satisfy the requirement.
    Strong,
    /// The excerpts satisfy part of the requirement or only imply it.
    Partial,
    /// The excerpts do not support the requirement.
    None,
    /// The requirement could not be judged. Never produced by the model;
    /// assigned only when failures are reported in place.
    Unknown,
}

impl MatchLevel {
    /// Parse a model-produced level. Only `STRONG`, `PARTIAL` and `NONE` are
    /// accepted (case-insensitive).
    pub fn from_model_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "STRONG" => Some(Self::Strong),
            "PARTIAL" => Some(Self::Partial),
            "NONE" => Some(Self::None),
            _ => None,
        }
    }

    /// The canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "STRONG",
            Self::Partial => "PARTIAL",
            Self::None => "NONE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured judgment for one requirement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    /// The requirement judged.
    pub requirement_id: String,
    /// The match level.
    pub match_level: MatchLevel,
    /// A short justification.
    pub rationale: String,
    /// Evidence chunks the rationale relies on; always a subset of the
    /// evidence supplied for this requirement.
    pub cited_chunk_ids: Vec<String>,
}

/// A response that parsed, before citations are checked.
#[derive(Debug, Clone, PartialEq)]
struct ParsedJudgment {
    match_level: MatchLevel,
    rationale: String,
    cited_chunk_ids: Vec<String>,
}

#[derive(Deserialize)]
struct RawJudgment {
    #[serde(alias = "matchLevel", alias = "level")]
    match_level: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default, alias = "citedChunkIds", alias = "citations")]
    cited_chunk_ids: Vec<Value>,
}

/// Produces a [`Verdict`] per requirement through a [`CompletionProvider`].
pub struct JudgmentOrchestrator {
    provider: Arc<dyn CompletionProvider>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    response_language: String,
}

impl JudgmentOrchestrator {
    /// Create an orchestrator using the model settings from `config`.
    pub fn new(provider: Arc<dyn CompletionProvider>, config: &RatingConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.completion_timeout(),
            response_language: config.response_language.clone(),
        }
    }

    /// Judge one requirement against its evidence.
    ///
    /// # Errors
    ///
    /// - [`RatingError::ModelUnavailable`] if a completion call fails or times
    ///   out; transport failures are not retried.
    /// - [`RatingError::UnparsableJudgment`] if both attempts come back
    ///   without a recognizable match level.
    pub async fn judge(&self, requirement: &Requirement, evidence: &Evidence) -> Result<Verdict> {
        let evidence_ids = evidence.chunk_ids();
        let system = system_prompt(&self.response_language);
        let prompt = judgment_prompt(requirement, evidence);

        let mut last_response = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let prompt =
                if attempt == 1 { prompt.clone() } else { format!("{prompt}\n\n{REFORMULATION}") };
            let request = CompletionRequest {
                system: system.clone(),
                prompt,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let response = self.complete(requirement, &evidence_ids, &request).await?;
            if let Some(parsed) = parse_response(&response) {
                let verdict = sanitize(requirement, evidence, parsed);
                info!(
                    requirement.id = %requirement.id,
                    match_level = %verdict.match_level,
                    cited = verdict.cited_chunk_ids.len(),
                    attempt,
                    "requirement judged"
                );
                return Ok(verdict);
            }

            warn!(
                requirement.id = %requirement.id,
                attempt,
                response_len = response.len(),
                "judgment response has no recognizable match level"
            );
            last_response = response;
        }

        error!(requirement.id = %requirement.id, "giving up on unparsable judgment");
        Err(RatingError::UnparsableJudgment {
            requirement_id: requirement.id.clone(),
            evidence_ids,
            response: last_response,
        })
    }

    async fn complete(
        &self,
        requirement: &Requirement,
        evidence_ids: &[String],
        request: &CompletionRequest,
    ) -> Result<String> {
        debug!(
            requirement.id = %requirement.id,
            provider = self.provider.name(),
            prompt_len = request.prompt.len(),
            "requesting judgment"
        );

        let unavailable = |message: String| RatingError::ModelUnavailable {
            requirement_id: requirement.id.clone(),
            evidence_ids: evidence_ids.to_vec(),
            message,
        };

        match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                error!(requirement.id = %requirement.id, error = %e, "completion failed");
                Err(unavailable(e.to_string()))
            }
            Err(_) => {
                error!(requirement.id = %requirement.id, timeout = ?self.timeout, "completion timed out");
                Err(unavailable(format!("completion timed out after {:?}", self.timeout)))
            }
        }
    }
}

/// Standing instructions for the evaluator role.
fn system_prompt(language: &str) -> String {
    format!(
        "You are an Applicant Tracking System working alongside an experienced technical \
recruiter. You decide whether a candidate satisfies ONE job requirement, using ONLY the \
résumé excerpts you are given. Never assume skills, years or roles the excerpts do not state.\n\
\n\
Match levels:\n\
- STRONG: the excerpts explicitly satisfy the requirement.\n\
- PARTIAL: the excerpts satisfy part of it, or only imply it.\n\
- NONE: the excerpts do not support it.\n\
\n\
Answer with exactly one JSON object and nothing else:\n\
{{\"match_level\": \"STRONG\" | \"PARTIAL\" | \"NONE\", \"rationale\": \"<one or two sentences>\", \
\"cited_chunk_ids\": [\"<id of each excerpt you relied on>\"]}}\n\
Cite only ids that appear in the excerpts. Write the rationale in {language}."
    )
}

/// The per-requirement task: the requirement verbatim plus labeled evidence.
fn judgment_prompt(requirement: &Requirement, evidence: &Evidence) -> String {
    let mut prompt = format!("Requirement:\n\"{}\"\n\nRésumé excerpts:\n", requirement.text);
    if evidence.is_empty() {
        prompt.push_str("(no résumé excerpts were retrieved)\n");
    }
    for result in &evidence.results {
        prompt.push_str(&format!(
            "\n[{}] (similarity {:.2})\n{}\n",
            result.chunk.id, result.score, result.chunk.text
        ));
    }
    prompt.push_str("\nJudge the requirement against these excerpts only.");
    prompt
}

/// Parse a model response into a judgment, or `None` if no match level can
/// be recognized.
fn parse_response(text: &str) -> Option<ParsedJudgment> {
    let raw: RawJudgment = serde_json::from_value(extract_json(text)?).ok()?;
    let match_level = MatchLevel::from_model_token(raw.match_level.as_deref()?)?;
    let cited_chunk_ids = raw.cited_chunk_ids.iter().filter_map(cited_id).collect();
    Some(ParsedJudgment {
        match_level,
        rationale: raw.rationale.unwrap_or_default().trim().to_string(),
        cited_chunk_ids,
    })
}

fn cited_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let id = s.trim().trim_start_matches('[').trim_end_matches(']').trim();
            (!id.is_empty()).then(|| id.to_string())
        }
        Value::Number(n) => n.as_u64().map(|n| format!("chunk_{n}")),
        _ => None,
    }
}

/// Find a JSON object in a response: bare, fenced, or embedded in prose.
fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    let candidates = [Some(text.to_string()), extract_fenced(text), extract_braced(text)];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|candidate| serde_json::from_str::<Value>(&candidate).ok())
        .find(Value::is_object)
}

fn extract_fenced(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip an info string such as `json`.
    let body_start = after_fence.find('\n').map_or(0, |i| i + 1);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim().to_string())
}

fn extract_braced(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| text[start..=end].to_string())
}

/// Drop citations outside the evidence and duplicates, keeping first-cited order.
fn sanitize(requirement: &Requirement, evidence: &Evidence, parsed: ParsedJudgment) -> Verdict {
    let mut cited: Vec<String> = Vec::with_capacity(parsed.cited_chunk_ids.len());
    for id in parsed.cited_chunk_ids {
        if !evidence.contains(&id) {
            warn!(requirement.id = %requirement.id, chunk.id = %id, "dropping citation outside evidence");
            continue;
        }
        if !cited.contains(&id) {
            cited.push(id);
        }
    }

    Verdict {
        requirement_id: requirement.id.clone(),
        match_level: parsed.match_level,
        rationale: parsed.rationale,
        cited_chunk_ids: cited,
    }
}
