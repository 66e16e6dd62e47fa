//! Request gateway: the cutoff check, workflow invocation, and response mapping.
//!
//! `Gateway` is transport-agnostic; `routes` exposes it over HTTP.

pub mod routes;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::approval::{
    ApprovalRequest, ApprovalWorkflow, ExtractedFields, FinalStatus, WorkflowState,
};
use crate::config::AUTO_APPROVAL_CUTOFF;
use crate::error::GatewayError;

pub use routes::{approval_routes, cors_layer};

// ── Wire types ──────────────────────────────────────────────────────

/// Body of `POST /process-approval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSubmission {
    pub service_line: String,
    pub threshold: i64,
    /// The email shown to the approver when the threshold is exceeded.
    #[serde(rename = "approval_email")]
    pub approval_context: String,
    /// A missing reply is treated as empty and rejected above the cutoff.
    #[serde(rename = "user_reply", default)]
    pub first_party_reply: String,
}

impl ApprovalSubmission {
    fn into_request(self, run_id: Uuid) -> ApprovalRequest {
        ApprovalRequest::new(
            self.service_line,
            self.threshold,
            self.approval_context,
            self.first_party_reply,
        )
        .with_run_id(run_id)
    }
}

/// Body of `POST /process-clarification`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationSubmission {
    pub service_line: String,
    pub threshold: i64,
    #[serde(rename = "approval_email")]
    pub approval_context: String,
    #[serde(rename = "user_reply", default)]
    pub first_party_reply: String,
    #[serde(rename = "hiring_manager_reply", default)]
    pub second_party_reply: String,
}

impl ClarificationSubmission {
    fn into_request(self, run_id: Uuid) -> ApprovalRequest {
        ApprovalRequest::new(
            self.service_line,
            self.threshold,
            self.approval_context,
            self.first_party_reply,
        )
        .with_run_id(run_id)
        .with_second_party_reply(self.second_party_reply)
    }
}

/// Successful gateway outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    #[serde(rename = "Auto-Approved")]
    AutoApproved,
    Approved,
    Rejected,
    Clarification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub status: ResponseStatus,
    pub detail: Option<String>,
    pub extracted_data: Option<ExtractedFields>,
}

impl ApprovalResponse {
    pub fn new(status: ResponseStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
            extracted_data: None,
        }
    }

    pub fn with_extracted_data(mut self, data: ExtractedFields) -> Self {
        self.extracted_data = Some(data);
        self
    }
}

// ── Gateway ─────────────────────────────────────────────────────────

/// Applies the auto-approval cutoff and maps workflow outcomes to responses.
pub struct Gateway {
    workflow: ApprovalWorkflow,
    cutoff: i64,
    timeout: Option<Duration>,
}

impl Gateway {
    pub fn new(workflow: ApprovalWorkflow) -> Self {
        Self {
            workflow,
            cutoff: AUTO_APPROVAL_CUTOFF,
            timeout: None,
        }
    }

    /// Bound each workflow run; `None` waits as long as the run takes.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// First round: classify the approver's reply.
    pub async fn submit_approval(
        &self,
        submission: ApprovalSubmission,
    ) -> Result<ApprovalResponse, GatewayError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "process_approval",
            %run_id,
            service_line = %submission.service_line,
            threshold = submission.threshold,
        );
        async move {
            info!("Received approval request");
            let response = self.approve(submission, run_id).await;
            log_outcome(&response);
            response
        }
        .instrument(span)
        .await
    }

    /// Second round: re-run the whole workflow with the hiring manager's reply.
    pub async fn submit_clarification(
        &self,
        submission: ClarificationSubmission,
    ) -> Result<ApprovalResponse, GatewayError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "process_clarification",
            %run_id,
            service_line = %submission.service_line,
            threshold = submission.threshold,
        );
        async move {
            info!("Received clarification request");
            let response = self.clarify(submission, run_id).await;
            log_outcome(&response);
            response
        }
        .instrument(span)
        .await
    }

    async fn approve(
        &self,
        submission: ApprovalSubmission,
        run_id: Uuid,
    ) -> Result<ApprovalResponse, GatewayError> {
        if submission.threshold <= self.cutoff {
            info!(
                threshold = submission.threshold,
                cutoff = self.cutoff,
                "Threshold not exceeded, auto-approving"
            );
            return Ok(ApprovalResponse::new(
                ResponseStatus::AutoApproved,
                "Threshold was not exceeded.",
            ));
        }

        if submission.first_party_reply.trim().is_empty() {
            return Err(GatewayError::InvalidInput(format!(
                "User reply is required when threshold > {}.",
                self.cutoff
            )));
        }

        let state = self.run_workflow(submission.into_request(run_id)).await?;
        let detail = classification_detail(&state);

        match state.outcome() {
            FinalStatus::Approved => Ok(ApprovalResponse::new(ResponseStatus::Approved, detail)),
            FinalStatus::Rejected => Ok(ApprovalResponse::new(ResponseStatus::Rejected, detail)),
            FinalStatus::Clarification => Ok(ApprovalResponse::new(
                ResponseStatus::Clarification,
                "Clarification required from hiring manager.",
            )),
            FinalStatus::Error => Err(GatewayError::Processing(
                "Processing error in the approval workflow.".to_string(),
            )),
        }
    }

    /// Only an approval with extracted details succeeds; every other
    /// outcome of the second round is a client-input error.
    async fn clarify(
        &self,
        submission: ClarificationSubmission,
        run_id: Uuid,
    ) -> Result<ApprovalResponse, GatewayError> {
        if submission.second_party_reply.trim().is_empty() {
            return Err(GatewayError::InvalidInput(
                "Hiring manager reply is required for clarification.".to_string(),
            ));
        }

        let state = self.run_workflow(submission.into_request(run_id)).await?;

        match (state.outcome(), state.extracted_data) {
            (FinalStatus::Approved, Some(data)) => Ok(ApprovalResponse::new(
                ResponseStatus::Approved,
                "Hiring manager details extracted and approved.",
            )
            .with_extracted_data(data)),
            (FinalStatus::Error, _) if !state.missing_fields.is_empty() => {
                Err(GatewayError::InvalidInput(format!(
                    "Missing or invalid hiring manager details. Missing fields: {}",
                    state.missing_fields.join(", ")
                )))
            }
            _ => Err(GatewayError::InvalidInput(
                "Missing or invalid hiring manager details.".to_string(),
            )),
        }
    }

    /// Run the workflow on its own task so a panic cannot take the caller down.
    ///
    /// On timeout the run is abandoned, not cancelled: it finishes in the
    /// background and its result is dropped.
    async fn run_workflow(&self, request: ApprovalRequest) -> Result<WorkflowState, GatewayError> {
        let workflow = self.workflow.clone();
        let handle = tokio::spawn(async move { workflow.run(request).await }.in_current_span());

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, handle).await.map_err(|_| {
                error!(timeout = ?limit, "Approval workflow timed out");
                GatewayError::Timeout(limit)
            })?,
            None => handle.await,
        };

        joined.map_err(|e| {
            error!(error = %e, "Approval workflow task failed");
            GatewayError::Internal
        })
    }
}

fn log_outcome(response: &Result<ApprovalResponse, GatewayError>) {
    match response {
        Ok(r) => info!(status = ?r.status, "Request completed"),
        Err(e) => warn!(error = %e, "Request rejected"),
    }
}

fn classification_detail(state: &WorkflowState) -> String {
    format!(
        "Reply classified as: {}",
        state
            .classification
            .as_ref()
            .map(|l| l.as_str())
            .unwrap_or("N/A")
    )
}
