//! Integration tests for the kiln orchestration engine

mod test_utils;

mod artifact_store;
mod config_integration;
mod orchestrator_flows;
mod recovery_parser;
mod resume_protocol;
mod retry_fallback;
mod sync_api;
