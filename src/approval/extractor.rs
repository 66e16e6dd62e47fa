//! Hiring-manager field extraction for the clarification round.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::approval::types::{ExtractedFields, ExtractionResult, ExtractionStatus};
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmHandle};

const EXTRACT_MAX_TOKENS: u32 = 400;

/// Pulls the required hiring-manager fields out of a free-text reply.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Extract fields from `reply` given the approval email it relates to.
    ///
    /// Malformed model output is reported as an `Error` status inside the
    /// result; `Err` is reserved for failure to reach the capability.
    async fn extract(&self, context: &str, reply: &str) -> Result<ExtractionResult, LlmError>;
}

/// Extractor backed by a chat model returning JSON.
pub struct LlmExtractor {
    llm: LlmHandle,
}

impl LlmExtractor {
    pub fn new(llm: LlmHandle) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FieldExtractor for LlmExtractor {
    async fn extract(&self, context: &str, reply: &str) -> Result<ExtractionResult, LlmError> {
        let llm = self.llm.provider()?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_extract_system_prompt()),
            ChatMessage::user(build_extract_user_prompt(context, reply)),
        ])
        .with_temperature(0.0)
        .with_max_tokens(EXTRACT_MAX_TOKENS);

        let response = llm.complete(request).await?;
        if response.is_truncated() {
            warn!(
                model = llm.model_name(),
                output_tokens = response.output_tokens,
                "Extractor output hit the token limit"
            );
        }

        let result = match parse_extraction_response(&response.content) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    raw_response = %response.content,
                    error = %e,
                    "Failed to parse extractor response"
                );
                ExtractionResult::failed("unparseable extractor output")
            }
        };

        debug!(
            model = llm.model_name(),
            response_id = response.response_id.as_deref().unwrap_or(""),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            status = ?result.status,
            missing = ?result.missing_fields,
            "Extracted hiring manager details"
        );
        Ok(result.normalized())
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_extract_system_prompt() -> &'static str {
    "You extract hiring manager details from an email reply.\n\n\
     Required fields:\n\
     - \"name\": the hiring manager's full name (string)\n\
     - \"years_of_experience\": years of experience of the candidate (integer)\n\
     - \"service_line_change\": description of the requested service line change (string)\n\n\
     Respond with ONLY a JSON object:\n\
     {\"status\": \"Approved\" | \"Not Approved\", \
     \"fields\": {\"name\": ..., \"years_of_experience\": ..., \"service_line_change\": ...}, \
     \"missing_fields\": [...]}\n\n\
     Rules:\n\
     - Use null for any field the reply does not state. Never guess.\n\
     - List every null field name in \"missing_fields\".\n\
     - \"status\" is \"Approved\" only when all three fields are present."
}

fn build_extract_user_prompt(context: &str, reply: &str) -> String {
    format!(
        "Original approval email:\n{}\n\nHiring manager reply:\n{}",
        context.trim(),
        reply.trim()
    )
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    fields: FieldsResponse,
    #[serde(default)]
    missing_fields: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FieldsResponse {
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    years_of_experience: Option<Value>,
    #[serde(default)]
    service_line_change: Option<Value>,
}

fn parse_extraction_response(raw: &str) -> Result<ExtractionResult, String> {
    let json_str = extract_json_object(raw);
    let response: ExtractionResponse =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    let status = match response.status.trim().to_ascii_lowercase().as_str() {
        "approved" => ExtractionStatus::Approved,
        "not approved" | "not_approved" | "rejected" => ExtractionStatus::NotApproved,
        "error" => ExtractionStatus::Error,
        other => return Err(format!("unknown extraction status: '{other}'")),
    };

    let fields = ExtractedFields {
        name: response.fields.name.as_ref().and_then(text_value),
        years_of_experience: response
            .fields
            .years_of_experience
            .as_ref()
            .and_then(years_value),
        service_line_change: response
            .fields
            .service_line_change
            .as_ref()
            .and_then(text_value),
    };

    Ok(ExtractionResult {
        status,
        fields,
        missing_fields: response.missing_fields,
    })
}

/// Non-blank string (numbers are stringified).
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-negative whole years from a number or a string like "7 years".
fn years_value(value: &Value) -> Option<u32> {
    let years = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let numeric: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            numeric.parse::<f64>().ok()?
        }
        _ => return None,
    };
    if years.is_finite() && years >= 0.0 && years <= f64::from(u32::MAX) {
        Some(years.floor() as u32)
    } else {
        None
    }
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
