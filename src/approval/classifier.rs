//! Reply classification.
//!
//! The workflow only sees the `ReplyClassifier` trait; `LlmClassifier` is
//! the production implementation on top of the configured chat model.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::approval::types::ClassificationLabel;
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmHandle};

/// Max tokens for the classification call. The answer is at most two words.
const CLASSIFY_MAX_TOKENS: u32 = 8;

/// Approval-context text beyond this many chars is cut from the prompt.
const CONTEXT_PREVIEW_CHARS: usize = 4000;

/// Maps a free-text reply to an approval email onto a classification label.
#[async_trait]
pub trait ReplyClassifier: Send + Sync {
    /// Classify `reply` given the approval email it answers.
    ///
    /// An `Err` means the capability itself failed; the workflow records it
    /// as the `Error` label.
    async fn classify(&self, context: &str, reply: &str)
    -> Result<ClassificationLabel, LlmError>;
}

/// Classifier backed by a chat model at temperature zero.
pub struct LlmClassifier {
    llm: LlmHandle,
}

impl LlmClassifier {
    pub fn new(llm: LlmHandle) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ReplyClassifier for LlmClassifier {
    async fn classify(
        &self,
        context: &str,
        reply: &str,
    ) -> Result<ClassificationLabel, LlmError> {
        let llm = self.llm.provider()?;

        if reply.trim().is_empty() {
            return Ok(ClassificationLabel::NotApproved);
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classify_system_prompt()),
            ChatMessage::user(build_classify_user_prompt(context, reply)),
        ])
        .with_temperature(0.0)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = llm.complete(request).await?;
        if response.is_truncated() {
            warn!(model = llm.model_name(), "Classifier output hit the token limit");
        }
        let label = parse_label(&response.content);
        debug!(
            model = llm.model_name(),
            response_id = response.response_id.as_deref().unwrap_or(""),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            raw = %response.content.trim(),
            label = %label,
            "Classified reply"
        );
        Ok(label)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_classify_system_prompt() -> &'static str {
    "You analyze replies to approval-request emails. Decide what the reply means.\n\n\
     Answer with exactly one of these labels and nothing else:\n\
     - Approved: the sender clearly grants the request.\n\
     - Not Approved: the sender declines, defers, or refuses.\n\
     - Clarification: the sender asks a question or needs more information \
     before deciding.\n\n\
     Do not add punctuation or explanation."
}

fn build_classify_user_prompt(context: &str, reply: &str) -> String {
    let context_preview: String = context.chars().take(CONTEXT_PREVIEW_CHARS).collect();
    format!(
        "Approval request email:\n{}\n\nReply:\n{}",
        context_preview.trim(),
        reply.trim()
    )
}

// ── Response parsing ────────────────────────────────────────────────

/// Map raw model output onto a label. Anything unexpected is `NotApproved`.
fn parse_label(raw: &str) -> ClassificationLabel {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '!')
        .trim()
        .to_ascii_lowercase();

    match cleaned.as_str() {
        "approved" | "positive" => ClassificationLabel::Approved,
        "not approved" | "negative" => ClassificationLabel::NotApproved,
        "clarification" => ClassificationLabel::Clarification,
        _ => {
            warn!(raw_response = %raw, "Unrecognized classifier output, treating as Not Approved");
            ClassificationLabel::NotApproved
        }
    }
}
