//! Nanna: a conversational voice companion with an animated face.
//!
//! One conversational turn runs at a time:
//! Capture → Generate → Synthesize + Animate → Idle
//!
//! # Architecture
//!
//! - **Capture** ([`stt`]): speech-capture adapter emitting interim and final transcripts
//! - **Generation** ([`llm`]): text-generation adapter (Gemini, OpenAI-compatible)
//! - **Synthesis** ([`tts`]): provider chain with one-hop fallback to the system voice
//!   and polling for providers that return asynchronous jobs
//! - **Playback** ([`audio`]): playback primitive reporting start, level and end
//! - **Animation** ([`avatar`]): expression frames driven by text timing or audio level
//! - **Orchestration** ([`pipeline`]): the single-flight turn state machine

pub mod audio;
pub mod avatar;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod runtime;
pub mod sentiment;
pub mod settings;
pub mod stt;
pub mod tts;
pub mod viseme;

pub use config::NannaConfig;
pub use error::{NannaError, Result};
pub use pipeline::messages::{TurnId, TurnState};
pub use pipeline::orchestrator::{TurnOrchestrator, TurnRejected};
pub use runtime::RuntimeEvent;
