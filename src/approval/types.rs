//! Data model for the approval workflow.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Labels and statuses ─────────────────────────────────────────────

/// Outcome reported by the reply classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClassificationLabel {
    Approved,
    NotApproved,
    Clarification,
    Error,
    /// Anything outside the fixed label set. Resolved fail-closed.
    Unrecognized(String),
}

impl ClassificationLabel {
    /// Parse a label by its canonical text; unknown text is kept verbatim.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Approved" => Self::Approved,
            "Not Approved" => Self::NotApproved,
            "Clarification" => Self::Clarification,
            "Error" => Self::Error,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Approved => "Approved",
            Self::NotApproved => "Not Approved",
            Self::Clarification => "Clarification",
            Self::Error => "Error",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Final status for this label. Total: unknown labels reject.
    pub fn final_status(&self) -> FinalStatus {
        match self {
            Self::Approved => FinalStatus::Approved,
            Self::Clarification => FinalStatus::Clarification,
            Self::NotApproved => FinalStatus::Rejected,
            Self::Error => FinalStatus::Error,
            Self::Unrecognized(_) => FinalStatus::Rejected,
        }
    }
}

impl std::fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ClassificationLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClassificationLabel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Terminal disposition of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalStatus {
    Approved,
    Rejected,
    Clarification,
    Error,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Clarification => "Clarification",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Request ─────────────────────────────────────────────────────────

/// Immutable input to one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Correlates gateway and workflow logs for this run.
    #[serde(default = "Uuid::new_v4")]
    pub run_id: Uuid,
    pub service_line: String,
    pub threshold: i64,
    /// The approval email the first party is replying to.
    pub approval_context: String,
    /// First-party reply; may be empty.
    pub first_party_reply: String,
    /// Hiring manager reply. `Some` only on a clarification submission,
    /// even when the text itself is empty.
    pub second_party_reply: Option<String>,
}

impl ApprovalRequest {
    pub fn new(
        service_line: impl Into<String>,
        threshold: i64,
        approval_context: impl Into<String>,
        first_party_reply: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            service_line: service_line.into(),
            threshold,
            approval_context: approval_context.into(),
            first_party_reply: first_party_reply.into(),
            second_party_reply: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_second_party_reply(mut self, reply: impl Into<String>) -> Self {
        self.second_party_reply = Some(reply.into());
        self
    }
}

// ── Extraction ──────────────────────────────────────────────────────

pub const FIELD_NAME: &str = "name";
pub const FIELD_YEARS_OF_EXPERIENCE: &str = "years_of_experience";
pub const FIELD_SERVICE_LINE_CHANGE: &str = "service_line_change";

/// The three fields every clarification must supply, in canonical order.
pub const REQUIRED_FIELDS: [&str; 3] = [
    FIELD_NAME,
    FIELD_YEARS_OF_EXPERIENCE,
    FIELD_SERVICE_LINE_CHANGE,
];

/// Hiring-manager details recovered from the second-party reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub name: Option<String>,
    pub years_of_experience: Option<u32>,
    pub service_line_change: Option<String>,
}

impl ExtractedFields {
    /// Required field names whose value is absent, in canonical order.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push(FIELD_NAME);
        }
        if self.years_of_experience.is_none() {
            missing.push(FIELD_YEARS_OF_EXPERIENCE);
        }
        if self.service_line_change.is_none() {
            missing.push(FIELD_SERVICE_LINE_CHANGE);
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Status reported by the field extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStatus {
    Approved,
    #[serde(rename = "Not Approved")]
    NotApproved,
    Error,
}

/// Output of the field extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    pub fields: ExtractedFields,
    pub missing_fields: Vec<String>,
}

impl ExtractionResult {
    /// An extraction that could not be performed at all.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Error,
            fields: ExtractedFields::default(),
            missing_fields: vec![reason.into()],
        }
    }

    /// Enforce the result invariant: every absent field is listed as
    /// missing, and `Approved` requires all fields.
    pub fn normalized(mut self) -> Self {
        let absent = self.fields.missing();

        let mut listed: Vec<String> = absent.iter().map(|f| f.to_string()).collect();
        let mut seen: BTreeSet<String> = listed.iter().cloned().collect();
        for entry in self.missing_fields {
            if seen.insert(entry.clone()) {
                listed.push(entry);
            }
        }
        self.missing_fields = listed;

        if !absent.is_empty() && self.status == ExtractionStatus::Approved {
            self.status = ExtractionStatus::NotApproved;
        }
        self
    }
}

// ── Steps and state ─────────────────────────────────────────────────

/// Named states of the approval state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Start,
    Classifying,
    StatusDetermined,
    /// Suspended until the hiring manager replies; the run ends here.
    AwaitingClarification,
    Clarifying,
    End,
}

impl WorkflowStep {
    /// Check if this step may be followed by `target`.
    pub fn can_transition_to(&self, target: WorkflowStep) -> bool {
        use WorkflowStep::*;

        matches!(
            (self, target),
            (Start, Classifying)
                | (Classifying, StatusDetermined)
                | (StatusDetermined, End)
                | (StatusDetermined, AwaitingClarification)
                | (StatusDetermined, Clarifying)
                | (AwaitingClarification, End)
                | (Clarifying, End)
        )
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Classifying => "classifying",
            Self::StatusDetermined => "status_determined",
            Self::AwaitingClarification => "awaiting_clarification",
            Self::Clarifying => "clarifying",
            Self::End => "end",
        };
        write!(f, "{s}")
    }
}

/// A recorded step transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTransition {
    pub from: WorkflowStep,
    pub to: WorkflowStep,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Mutable record accumulated across one workflow run.
///
/// Owned exclusively by the run that created it.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub run_id: Uuid,
    pub service_line: String,
    pub threshold: i64,
    pub approval_context: String,
    pub first_party_reply: String,
    /// `None` until the Classifying step has run.
    pub classification: Option<ClassificationLabel>,
    pub clarification_needed: bool,
    pub second_party_reply: Option<String>,
    pub extracted_data: Option<ExtractedFields>,
    pub missing_fields: Vec<String>,
    /// `None` until StatusDetermined has run.
    pub final_status: Option<FinalStatus>,
    pub step: WorkflowStep,
    pub transitions: Vec<StepTransition>,
}

impl WorkflowState {
    pub fn new(request: ApprovalRequest) -> Self {
        Self {
            run_id: request.run_id,
            service_line: request.service_line,
            threshold: request.threshold,
            approval_context: request.approval_context,
            first_party_reply: request.first_party_reply,
            classification: None,
            clarification_needed: false,
            second_party_reply: request.second_party_reply,
            extracted_data: None,
            missing_fields: Vec::new(),
            final_status: None,
            step: WorkflowStep::Start,
            transitions: Vec::new(),
        }
    }

    /// Move to `next`, recording the edge.
    pub fn transition_to(
        &mut self,
        next: WorkflowStep,
        reason: Option<String>,
    ) -> Result<(), String> {
        if !self.step.can_transition_to(next) {
            return Err(format!("Cannot transition from {} to {}", self.step, next));
        }
        self.transitions.push(StepTransition {
            from: self.step,
            to: next,
            at: Utc::now(),
            reason,
        });
        self.step = next;
        Ok(())
    }

    /// Final status, treating a run that never determined one as `Error`.
    pub fn outcome(&self) -> FinalStatus {
        self.final_status.unwrap_or(FinalStatus::Error)
    }

    /// Steps visited, in order, starting at `Start`.
    pub fn path(&self) -> Vec<WorkflowStep> {
        let mut path = vec![WorkflowStep::Start];
        path.extend(self.transitions.iter().map(|t| t.to));
        path
    }
}
