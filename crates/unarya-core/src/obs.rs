//! Structured observability hooks for pipeline run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: run start, stage
//!   transition, stage failure and retry, run finish
//!
//! Events are emitted at `info!` level (failures at `warn!`). Filtering and
//! JSON output are configured by [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

use crate::domain::{StageError, StageStatus};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// Only use this from synchronous code; async code should attach
/// [`run_span`] with `tracing::Instrument`.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// Span tagged with the run_id, for instrumenting a run's future.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("unarya.run", run_id = %run_id)
}

/// Emit event: run started for a source.
pub fn emit_run_started(run_id: &str, source_url: &str, source_type: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        source_url = %source_url,
        source_type = %source_type,
    );
}

/// Emit event: a stage changed status.
pub fn emit_stage_transition(run_id: &str, stage: &str, status: StageStatus) {
    info!(
        event = "stage.transition",
        run_id = %run_id,
        stage = %stage,
        status = %status,
    );
}

/// Emit event: a stage call failed. Logged once per stage, before retries.
pub fn emit_stage_failed(stage: &str, attempt: u32, error: &StageError) {
    warn!(
        event = "stage.failed",
        stage = %stage,
        attempt = attempt,
        kind = %error.kind(),
        error = %error,
        "failure at stage {}",
        stage
    );
}

/// Emit event: a stage call is about to be retried.
pub fn emit_stage_retry(stage: &str, retry: u32, max_retries: u32, error: &StageError) {
    info!(
        event = "stage.retry",
        stage = %stage,
        retry = retry,
        max_retries = max_retries,
        error = %error,
        "retry {}/{} for stage {}",
        retry,
        max_retries,
        stage
    );
}

/// Emit event: run finished with duration and outcome.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: run aborted at a stage (warning level).
pub fn emit_run_aborted(run_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.aborted", run_id = %run_id, stage = %stage, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id");
    }
}
