//! Approval Assist: reply-classification approval workflow service.

pub mod approval;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
