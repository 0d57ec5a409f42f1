//! Integration Tests Module
//!
//! End-to-end tests for the analysis workflow orchestrator using scripted
//! remote services and a real in-memory SQLite database:
//! - Single-query flow: plan creation, preview, execution, rollback on failure
//! - Queue mode: batch planning, partial failure, manual advance to results
//! - Session persistence: round-trip, stale-version discard, reload-time
//!   reconciliation against live job status
//!
//! No network calls are made. Tests drive the controller through the same
//! trait seams the HTTP implementations use.

// Shared mocks and harness
mod support;

// Single-query workflow tests
mod workflow_test;
