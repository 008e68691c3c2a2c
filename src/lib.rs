//! Kiln: Streaming Orchestration of Generated Artifacts
//!
//! Kiln turns a conversational request into a multi-file project produced by a
//! language model. It classifies intent, asks clarifying questions, streams
//! generation as typed events, recovers malformed model output and persists the
//! result as versioned artifacts.

pub mod api;
pub mod artifact;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod intent;
pub mod logging;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod recovery;
pub mod request;
pub mod session;
