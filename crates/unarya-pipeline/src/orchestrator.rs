//! Pipeline orchestration.
//!
//! [`Orchestrator::run`] walks the [`PipelinePlan`] in order. Each stage goes
//! `pending → running → success|failed` in the shared [`StateTracker`], and
//! every attempt is bounded by the stage timeout and raced against the run's
//! cancellation token. The first stage that exhausts its retries aborts the
//! run; later stages are never attempted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};
use unarya_core::aggregator;
use unarya_core::metrics::{RunOutcome, METRICS};
use unarya_core::obs;
use unarya_core::{
    OrchestratorConfig, PipelineRequest, PipelineResult, RetryPolicy, RunId, StageError,
    StageStatus, StageSummary, StateTracker,
};

use crate::clients::StageClients;
use crate::error::{OrchestratorError, Result};
use crate::stage::{PipelinePlan, StageContext, StageDescriptor};

/// Coordinates the stage clients for any number of concurrent runs.
pub struct Orchestrator {
    clients: StageClients,
    plan: PipelinePlan,
    retry: RetryPolicy,
    stage_timeout: Duration,
    tracker: Arc<StateTracker>,
    active: Mutex<HashMap<RunId, CancellationToken>>,
}

impl Orchestrator {
    /// Standard plan, default retry policy and timeout.
    pub fn new(clients: StageClients) -> Self {
        Self::with_config(clients, &OrchestratorConfig::default())
    }

    pub fn with_config(clients: StageClients, config: &OrchestratorConfig) -> Self {
        Self {
            clients,
            plan: PipelinePlan::standard(),
            retry: config.retry.clone(),
            stage_timeout: config.stage_timeout,
            tracker: Arc::new(StateTracker::with_retention(config.state_retention)),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_plan(mut self, plan: PipelinePlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Share a tracker with other components (e.g. the daemon's status view).
    pub fn with_tracker(mut self, tracker: Arc<StateTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &Arc<StateTracker> {
        &self.tracker
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    /// Validate `request` and run it to completion.
    ///
    /// An invalid request fails before any stage client is called.
    pub async fn run(
        &self,
        request: PipelineRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineResult> {
        request.validate()?;
        let run_id = RunId::new();
        self.register(&run_id);
        self.execute(run_id, request, cancel).await
    }

    /// Validate `request`, then run it in the background.
    ///
    /// Returns as soon as the run is registered; progress is visible through
    /// [`Orchestrator::tracker`] under the returned id.
    pub fn start(self: &Arc<Self>, request: PipelineRequest) -> Result<RunId> {
        request.validate()?;
        let run_id = RunId::new();
        self.register(&run_id);

        let cancel = CancellationToken::new();
        self.lock_active().insert(run_id.clone(), cancel.clone());

        let this = Arc::clone(self);
        let id = run_id.clone();
        tokio::spawn(async move {
            let outcome = this.execute(id.clone(), request, cancel).await;
            this.lock_active().remove(&id);
            if let Err(e) = outcome {
                tracing::debug!(run_id = %id, error = %e, "background run ended with error");
            }
        });

        Ok(run_id)
    }

    /// Cancel a run started with [`Orchestrator::start`]. Returns whether it
    /// was still active.
    pub fn cancel(&self, run_id: &RunId) -> bool {
        match self.lock_active().get(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every background run.
    pub fn shutdown(&self) {
        let active = self.lock_active();
        for token in active.values() {
            token.cancel();
        }
        if !active.is_empty() {
            info!(runs = active.len(), "cancelled active runs");
        }
    }

    /// Ids of background runs still executing.
    pub fn active_runs(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.lock_active().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_active(&self, run_id: &RunId) -> bool {
        self.lock_active().contains_key(run_id)
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<RunId, CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, run_id: &RunId) {
        for stage in self.plan.stages() {
            self.tracker.update(run_id, &stage.name, StageStatus::Pending);
        }
    }

    async fn execute(
        &self,
        run_id: RunId,
        request: PipelineRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineResult> {
        let span = obs::run_span(run_id.as_str());
        self.execute_inner(run_id, request, cancel)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        run_id: RunId,
        request: PipelineRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineResult> {
        let start = Instant::now();
        METRICS.record_run_started();
        obs::emit_run_started(
            run_id.as_str(),
            &request.source_url,
            request.source_type.as_str(),
        );

        let mut ctx = StageContext::new(request);
        let mut summaries: Vec<StageSummary> = Vec::with_capacity(self.plan.stages().len());

        for (index, stage) in self.plan.stages().iter().enumerate() {
            self.tracker
                .update(&run_id, &stage.name, StageStatus::Running);

            let outcome = self
                .retry
                .run(&stage.name, &cancel, |_attempt| {
                    self.attempt(stage, &ctx, &cancel)
                })
                .await;

            match outcome {
                Ok(done) => {
                    self.tracker
                        .update(&run_id, &stage.name, StageStatus::Success);
                    summaries.push(StageSummary {
                        stage: stage.name.clone(),
                        status: StageStatus::Success,
                        attempts: done.attempts,
                    });
                    ctx.insert(done.value);
                }
                Err(exhausted) => {
                    self.tracker
                        .update(&run_id, &stage.name, StageStatus::Failed);
                    summaries.push(StageSummary {
                        stage: stage.name.clone(),
                        status: StageStatus::Failed,
                        attempts: exhausted.attempts,
                    });
                    for rest in &self.plan.stages()[index + 1..] {
                        summaries.push(StageSummary {
                            stage: rest.name.clone(),
                            status: StageStatus::Pending,
                            attempts: 0,
                        });
                    }

                    let duration_ms = start.elapsed().as_millis() as u64;
                    let partial = Box::new(PipelineResult {
                        run_id: run_id.clone(),
                        plan_digest: self.plan.digest().to_string(),
                        stages: summaries,
                        final_result: None,
                        duration_ms,
                        failed_stage: Some(stage.name.clone()),
                        error: Some(exhausted.to_string()),
                    });

                    let cancelled = exhausted.error == StageError::Cancelled;
                    if cancelled {
                        METRICS.record_run_finished(RunOutcome::Cancelled);
                    } else {
                        METRICS.record_stage_failure(&stage.name);
                        METRICS.record_run_finished(RunOutcome::Failed);
                    }
                    obs::emit_run_aborted(run_id.as_str(), &stage.name, &exhausted);
                    obs::emit_run_finished(run_id.as_str(), duration_ms, false);

                    return Err(if cancelled {
                        OrchestratorError::Cancelled {
                            stage: stage.name.clone(),
                            partial,
                        }
                    } else {
                        OrchestratorError::StageFailed {
                            stage: stage.name.clone(),
                            attempts: exhausted.attempts,
                            source: exhausted,
                            partial,
                        }
                    });
                }
            }
        }

        let final_result = match (ctx.parsed(), ctx.analysis(), ctx.scan()) {
            (Ok(parsed), Ok(ai), Ok(scan)) => aggregator::aggregate(parsed, ai, scan),
            _ => {
                METRICS.record_run_finished(RunOutcome::Failed);
                return Err(OrchestratorError::Internal(format!(
                    "plan {} completed without every aggregation input",
                    self.plan.digest()
                )));
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        METRICS.record_run_finished(RunOutcome::Succeeded);
        obs::emit_run_finished(run_id.as_str(), duration_ms, true);
        info!(
            run_id = %run_id,
            risk_score = final_result.risk_score,
            risk_level = %final_result.risk_level,
            "pipeline completed"
        );

        Ok(PipelineResult {
            run_id,
            plan_digest: self.plan.digest().to_string(),
            stages: summaries,
            final_result: Some(final_result),
            duration_ms,
            failed_stage: None,
            error: None,
        })
    }

    /// One bounded, cancellable call of a stage handler.
    async fn attempt(
        &self,
        stage: &StageDescriptor,
        ctx: &StageContext,
        cancel: &CancellationToken,
    ) -> std::result::Result<crate::stage::Artifact, StageError> {
        METRICS.record_stage_attempt(&stage.name);
        let call = tokio::time::timeout(
            self.stage_timeout,
            stage.handler.execute(ctx, &self.clients),
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StageError::Cancelled),
            res = call => match res {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout(self.stage_timeout)),
            },
        }
    }
}
