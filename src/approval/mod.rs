//! Approval core.
//!
//! A request that exceeds the auto-approval cutoff flows through:
//! 1. `ReplyClassifier::classify()`: first-party reply → label
//! 2. Status determination: label → final status
//! 3. Optionally `FieldExtractor::extract()`: hiring manager reply → fields
//!
//! `ApprovalWorkflow` owns the sequencing; the classifier and extractor are
//! injected so tests can substitute deterministic stand-ins.

pub mod classifier;
pub mod extractor;
pub mod types;
pub mod workflow;

pub use classifier::{LlmClassifier, ReplyClassifier};
pub use extractor::{FieldExtractor, LlmExtractor};
pub use types::*;
pub use workflow::ApprovalWorkflow;
