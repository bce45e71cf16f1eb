//! Conversation pipeline: turn types and the orchestrator that runs them.

pub mod messages;
pub mod orchestrator;
