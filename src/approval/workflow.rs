//! Approval workflow state machine.
//!
//! ```text
//! Start → Classifying → StatusDetermined ─┬─→ End
//!                                         ├─→ AwaitingClarification → End
//!                                         └─→ Clarifying → End
//! ```
//!
//! One run owns one `WorkflowState`. The classifier and the extractor are
//! each called at most once, and their failures become data (`Error`)
//! instead of escaping the run.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::approval::classifier::ReplyClassifier;
use crate::approval::extractor::FieldExtractor;
use crate::approval::types::{
    ApprovalRequest, ClassificationLabel, ExtractionStatus, FinalStatus, WorkflowState,
    WorkflowStep,
};

/// Drives a request through classification and the optional clarification round.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    classifier: Arc<dyn ReplyClassifier>,
    extractor: Arc<dyn FieldExtractor>,
}

impl ApprovalWorkflow {
    pub fn new(classifier: Arc<dyn ReplyClassifier>, extractor: Arc<dyn FieldExtractor>) -> Self {
        Self {
            classifier,
            extractor,
        }
    }

    /// Run the workflow to completion and return the accumulated state.
    ///
    /// A `Clarification` outcome with no second-party reply is a suspension:
    /// the caller re-runs later with the full request plus that reply.
    pub async fn run(&self, request: ApprovalRequest) -> WorkflowState {
        let mut state = WorkflowState::new(request);
        info!(
            run_id = %state.run_id,
            service_line = %state.service_line,
            threshold = state.threshold,
            clarification_round = state.second_party_reply.is_some(),
            "Starting approval workflow"
        );

        let mut next = WorkflowStep::Classifying;
        loop {
            let reason = match next {
                WorkflowStep::Classifying => None,
                WorkflowStep::StatusDetermined => {
                    state.classification.as_ref().map(|l| format!("classified as {l}"))
                }
                WorkflowStep::AwaitingClarification => {
                    Some("no hiring manager reply yet".to_string())
                }
                WorkflowStep::Clarifying => Some("hiring manager reply present".to_string()),
                WorkflowStep::End => state.final_status.map(|s| format!("final status {s}")),
                WorkflowStep::Start => None,
            };

            if let Err(e) = state.transition_to(next, reason) {
                error!(run_id = %state.run_id, error = %e, "Illegal workflow transition");
                state.final_status = Some(FinalStatus::Error);
                break;
            }

            next = match state.step {
                WorkflowStep::Classifying => {
                    self.classify(&mut state).await;
                    WorkflowStep::StatusDetermined
                }
                WorkflowStep::StatusDetermined => determine_status(&mut state),
                WorkflowStep::AwaitingClarification => WorkflowStep::End,
                WorkflowStep::Clarifying => {
                    self.clarify(&mut state).await;
                    WorkflowStep::End
                }
                WorkflowStep::End => break,
                WorkflowStep::Start => WorkflowStep::Classifying,
            };
        }

        info!(
            run_id = %state.run_id,
            classification = state.classification.as_ref().map(|l| l.as_str()).unwrap_or(""),
            final_status = %state.outcome(),
            "Approval workflow finished"
        );
        state
    }

    /// Classifying: record exactly one label.
    async fn classify(&self, state: &mut WorkflowState) {
        let label = if state.first_party_reply.trim().is_empty() {
            debug!(run_id = %state.run_id, "Empty reply, skipping classifier");
            ClassificationLabel::NotApproved
        } else {
            match self
                .classifier
                .classify(&state.approval_context, &state.first_party_reply)
                .await
            {
                Ok(label) => label,
                Err(e) => {
                    warn!(run_id = %state.run_id, error = %e, "Reply classification failed");
                    ClassificationLabel::Error
                }
            }
        };

        state.clarification_needed = label == ClassificationLabel::Clarification;
        state.classification = Some(label);
    }

    /// Clarifying: extract the hiring manager's details once.
    async fn clarify(&self, state: &mut WorkflowState) {
        let reply = state.second_party_reply.clone().unwrap_or_default();
        if reply.trim().is_empty() {
            warn!(run_id = %state.run_id, "Empty hiring manager reply");
            state.final_status = Some(FinalStatus::Error);
            state.missing_fields = vec!["hiring_manager_reply".to_string()];
            return;
        }

        let result = match self.extractor.extract(&state.approval_context, &reply).await {
            Ok(result) => result.normalized(),
            Err(e) => {
                warn!(run_id = %state.run_id, error = %e, "Field extraction failed");
                state.final_status = Some(FinalStatus::Error);
                state.missing_fields = vec!["extraction failed".to_string()];
                return;
            }
        };

        if result.status == ExtractionStatus::Approved && result.fields.is_complete() {
            state.final_status = Some(FinalStatus::Approved);
            state.missing_fields.clear();
            state.extracted_data = Some(result.fields);
        } else {
            debug!(
                run_id = %state.run_id,
                status = ?result.status,
                missing = ?result.missing_fields,
                "Hiring manager details incomplete"
            );
            state.final_status = Some(FinalStatus::Error);
            state.missing_fields = result.missing_fields;
        }
    }
}

/// StatusDetermined: map the label, then pick the branch.
fn determine_status(state: &mut WorkflowState) -> WorkflowStep {
    let status = state
        .classification
        .as_ref()
        .map(ClassificationLabel::final_status)
        .unwrap_or(FinalStatus::Error);
    state.final_status = Some(status);

    match (status, state.second_party_reply.is_some()) {
        (FinalStatus::Clarification, true) => WorkflowStep::Clarifying,
        (FinalStatus::Clarification, false) => WorkflowStep::AwaitingClarification,
        _ => WorkflowStep::End,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::approval::types::{
        ExtractedFields, ExtractionResult, FIELD_NAME, FIELD_SERVICE_LINE_CHANGE,
        FIELD_YEARS_OF_EXPERIENCE,
    };
    use crate::error::LlmError;

    /// Classifier stub returning a fixed outcome and counting calls.
    struct StubClassifier {
        outcome: Result<ClassificationLabel, String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl StubClassifier {
        fn returning(label: ClassificationLabel) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(label),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                outcome: Err("timeout talking to model".into()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ReplyClassifier for StubClassifier {
        async fn classify(
            &self,
            context: &str,
            reply: &str,
        ) -> Result<ClassificationLabel, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((context.to_string(), reply.to_string()));
            self.outcome.clone().map_err(|reason| LlmError::RequestFailed {
                provider: "stub".into(),
                reason,
            })
        }
    }

    /// Extractor stub returning a fixed outcome and counting calls.
    struct StubExtractor {
        outcome: Result<ExtractionResult, String>,
        calls: AtomicUsize,
    }

    impl StubExtractor {
        fn returning(result: ExtractionResult) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(result),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                outcome: Err("HTTP 500".into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FieldExtractor for StubExtractor {
        async fn extract(
            &self,
            _context: &str,
            _reply: &str,
        ) -> Result<ExtractionResult, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone().map_err(|reason| LlmError::RequestFailed {
                provider: "stub".into(),
                reason,
            })
        }
    }

    fn complete_fields() -> ExtractedFields {
        ExtractedFields {
            name: Some("Dana Reyes".into()),
            years_of_experience: Some(7),
            service_line_change: Some("Move from Audit to Advisory".into()),
        }
    }

    fn approved_extraction() -> ExtractionResult {
        ExtractionResult {
            status: ExtractionStatus::Approved,
            fields: complete_fields(),
            missing_fields: vec![],
        }
    }

    fn request(reply: &str) -> ApprovalRequest {
        ApprovalRequest::new(
            "Data Migration",
            50,
            "Subject: Approval needed for Data Migration",
            reply,
        )
    }

    fn workflow(
        classifier: &Arc<StubClassifier>,
        extractor: &Arc<StubExtractor>,
    ) -> ApprovalWorkflow {
        ApprovalWorkflow::new(classifier.clone(), extractor.clone())
    }

    #[tokio::test]
    async fn approved_reply_ends_approved() {
        let classifier = StubClassifier::returning(ClassificationLabel::Approved);
        let extractor = StubExtractor::returning(approved_extraction());
        let state = workflow(&classifier, &extractor)
            .run(request("Approved, please proceed"))
            .await;

        assert_eq!(state.classification, Some(ClassificationLabel::Approved));
        assert_eq!(state.final_status, Some(FinalStatus::Approved));
        assert!(!state.clarification_needed);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            state.path(),
            vec![
                WorkflowStep::Start,
                WorkflowStep::Classifying,
                WorkflowStep::StatusDetermined,
                WorkflowStep::End,
            ]
        );
    }

    #[tokio::test]
    async fn state_keeps_request_run_id() {
        let classifier = StubClassifier::returning(ClassificationLabel::Approved);
        let extractor = StubExtractor::returning(approved_extraction());
        let run_id = uuid::Uuid::new_v4();
        let state = workflow(&classifier, &extractor)
            .run(request("yes").with_run_id(run_id))
            .await;
        assert_eq!(state.run_id, run_id);
    }

    #[tokio::test]
    async fn classifier_receives_context_and_reply() {
        let classifier = StubClassifier::returning(ClassificationLabel::Approved);
        let extractor = StubExtractor::returning(approved_extraction());
        workflow(&classifier, &extractor).run(request("yes")).await;

        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Subject: Approval needed for Data Migration");
        assert_eq!(seen[0].1, "yes");
    }

    #[tokio::test]
    async fn label_mapping_through_workflow() {
        let cases = [
            (ClassificationLabel::Approved, FinalStatus::Approved),
            (ClassificationLabel::NotApproved, FinalStatus::Rejected),
            (ClassificationLabel::Clarification, FinalStatus::Clarification),
            (ClassificationLabel::Error, FinalStatus::Error),
            (
                ClassificationLabel::Unrecognized("Perhaps".into()),
                FinalStatus::Rejected,
            ),
        ];
        for (label, expected) in cases {
            let classifier = StubClassifier::returning(label.clone());
            let extractor = StubExtractor::returning(approved_extraction());
            let state = workflow(&classifier, &extractor).run(request("reply")).await;
            assert_eq!(state.final_status, Some(expected), "label {label}");
            assert_eq!(state.classification, Some(label));
        }
    }

    #[tokio::test]
    async fn empty_reply_rejects_without_classifier() {
        let classifier = StubClassifier::returning(ClassificationLabel::Approved);
        let extractor = StubExtractor::returning(approved_extraction());
        let state = workflow(&classifier, &extractor).run(request("")).await;

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.classification, Some(ClassificationLabel::NotApproved));
        assert_eq!(state.final_status, Some(FinalStatus::Rejected));
        assert!(!state.clarification_needed);
    }

    #[tokio::test]
    async fn classifier_failure_becomes_error_status() {
        let classifier = StubClassifier::failing();
        let extractor = StubExtractor::returning(approved_extraction());
        let state = workflow(&classifier, &extractor).run(request("yes")).await;

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.classification, Some(ClassificationLabel::Error));
        assert_eq!(state.final_status, Some(FinalStatus::Error));
    }

    #[tokio::test]
    async fn clarification_without_second_reply_suspends() {
        let classifier = StubClassifier::returning(ClassificationLabel::Clarification);
        let extractor = StubExtractor::returning(approved_extraction());
        let state = workflow(&classifier, &extractor)
            .run(request("Can you clarify the budget?"))
            .await;

        assert!(state.clarification_needed);
        assert_eq!(state.final_status, Some(FinalStatus::Clarification));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            state.path(),
            vec![
                WorkflowStep::Start,
                WorkflowStep::Classifying,
                WorkflowStep::StatusDetermined,
                WorkflowStep::AwaitingClarification,
                WorkflowStep::End,
            ]
        );
    }

    #[tokio::test]
    async fn clarification_with_complete_fields_approves() {
        let classifier = StubClassifier::returning(ClassificationLabel::Clarification);
        let extractor = StubExtractor::returning(approved_extraction());
        let state = workflow(&classifier, &extractor)
            .run(
                request("Can you clarify the budget?").with_second_party_reply(
                    "I'm Dana Reyes, 7 years of experience, moving from Audit to Advisory.",
                ),
            )
            .await;

        assert_eq!(state.final_status, Some(FinalStatus::Approved));
        assert_eq!(state.extracted_data, Some(complete_fields()));
        assert!(state.missing_fields.is_empty());
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.step, WorkflowStep::End);
    }

    #[tokio::test]
    async fn clarification_missing_any_field_is_error() {
        for field in [FIELD_NAME, FIELD_YEARS_OF_EXPERIENCE, FIELD_SERVICE_LINE_CHANGE] {
            let mut fields = complete_fields();
            match field {
                FIELD_NAME => fields.name = None,
                FIELD_YEARS_OF_EXPERIENCE => fields.years_of_experience = None,
                _ => fields.service_line_change = None,
            }
            // The extractor overclaims: status Approved, nothing listed.
            let extractor = StubExtractor::returning(ExtractionResult {
                status: ExtractionStatus::Approved,
                fields,
                missing_fields: vec![],
            });
            let classifier = StubClassifier::returning(ClassificationLabel::Clarification);
            let state = workflow(&classifier, &extractor)
                .run(request("Need details").with_second_party_reply("partial info"))
                .await;

            assert_eq!(state.final_status, Some(FinalStatus::Error), "field {field}");
            assert_eq!(state.missing_fields, vec![field.to_string()]);
            assert!(state.extracted_data.is_none());
        }
    }

    #[tokio::test]
    async fn clarification_not_approved_extraction_is_error() {
        let extractor = StubExtractor::returning(ExtractionResult {
            status: ExtractionStatus::NotApproved,
            fields: complete_fields(),
            missing_fields: vec![],
        });
        let classifier = StubClassifier::returning(ClassificationLabel::Clarification);
        let state = workflow(&classifier, &extractor)
            .run(request("Need details").with_second_party_reply("details"))
            .await;
        assert_eq!(state.final_status, Some(FinalStatus::Error));
    }

    #[tokio::test]
    async fn empty_second_reply_errors_without_extractor() {
        let classifier = StubClassifier::returning(ClassificationLabel::Clarification);
        let extractor = StubExtractor::returning(approved_extraction());
        let state = workflow(&classifier, &extractor)
            .run(request("Can you clarify?").with_second_party_reply("  "))
            .await;

        assert_eq!(state.final_status, Some(FinalStatus::Error));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn extractor_failure_becomes_error_status() {
        let classifier = StubClassifier::returning(ClassificationLabel::Clarification);
        let extractor = StubExtractor::failing();
        let state = workflow(&classifier, &extractor)
            .run(request("Can you clarify?").with_second_party_reply("Dana, 7y, Advisory"))
            .await;

        assert_eq!(state.final_status, Some(FinalStatus::Error));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.missing_fields.len(), 1);
        assert!(state.missing_fields[0].starts_with("extraction failed"));
    }

    #[tokio::test]
    async fn second_reply_ignored_when_not_clarification() {
        let classifier = StubClassifier::returning(ClassificationLabel::NotApproved);
        let extractor = StubExtractor::returning(approved_extraction());
        let state = workflow(&classifier, &extractor)
            .run(request("No.").with_second_party_reply("Dana, 7 years, Advisory"))
            .await;

        assert_eq!(state.final_status, Some(FinalStatus::Rejected));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transitions_are_timestamped_in_order() {
        let classifier = StubClassifier::returning(ClassificationLabel::Approved);
        let extractor = StubExtractor::returning(approved_extraction());
        let state = workflow(&classifier, &extractor).run(request("yes")).await;

        assert_eq!(state.transitions.len(), 3);
        assert!(
            state
                .transitions
                .windows(2)
                .all(|w| w[0].at <= w[1].at && w[0].to == w[1].from)
        );
        assert_eq!(
            state.transitions[1].reason.as_deref(),
            Some("classified as Approved")
        );
    }
}
