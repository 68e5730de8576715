//! Drives the Scan → Analyze → Optimize → Report state machine.
//!
//! Phases move `Pending → Scanning → Analyzing → Optimizing → Reporting →
//! Done`; any stage failure moves the run to the absorbing `Failed` phase.
//! A resumed run re-enters at the first stage lacking a success entry. An
//! orchestrator built with a stop stage pauses once that stage has succeeded,
//! leaving the run resumable.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::runner::{Classifier, StageRunner};
use super::{PipelineState, ResultCache, RetryingExecutor};
use crate::config::CostflowConfig;
use crate::core::{CostSummary, RunPhase, StageName};
use crate::errors::{CostflowError, RetryError, RetryStop, ValidationError};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::observability::SpanTimer;
use crate::stages::{default_stages, Stage, StageContext, StagePorts};
use crate::store::SnapshotStore;

/// The stage that halted a run.
#[derive(Debug)]
pub struct StageFailure {
    /// The failed stage.
    pub stage: StageName,
    /// Executor attempts used by the failing stage attempt.
    pub attempts: u32,
    /// The final error.
    pub error: CostflowError,
}

/// Timing and totals of one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    /// Wall-clock duration of this invocation.
    pub elapsed_ms: u64,
    /// Duration of each stage executed in this invocation.
    pub stage_durations_ms: BTreeMap<StageName, u64>,
    /// Cost and savings totals of the resulting state.
    pub summary: CostSummary,
}

/// Result of `run` or `resume`.
#[derive(Debug)]
pub struct RunOutcome {
    /// The final state.
    pub state: PipelineState,
    /// `Done` or `Failed`, or the phase of the next stage when paused.
    pub phase: RunPhase,
    /// Set when the run paused after this stage.
    pub paused_after: Option<StageName>,
    /// Set when the run halted on a stage failure.
    pub failure: Option<StageFailure>,
    /// Timing and totals.
    pub metrics: RunMetrics,
    /// Snapshot saves that failed; the run continued regardless.
    pub persist_errors: Vec<String>,
}

impl RunOutcome {
    /// Returns true when every stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.phase == RunPhase::Done
    }

    /// Returns true when the run stopped early without failing.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused_after.is_some()
    }

    /// Converts a failed run into an error naming the stage, its attempt
    /// count and the last cause.
    pub fn into_result(self) -> Result<PipelineState, CostflowError> {
        match self.failure {
            None => Ok(self.state),
            Some(StageFailure {
                error: CostflowError::Retry(retry),
                ..
            }) => Err(CostflowError::Retry(retry)),
            Some(StageFailure {
                stage,
                attempts,
                error,
            }) => Err(RetryError::new(stage.as_str(), attempts, RetryStop::Fatal, error).into()),
        }
    }
}

/// Runs the pipeline for one state at a time.
pub struct Orchestrator {
    ctx: StageContext,
    runner: StageRunner,
    stages: BTreeMap<StageName, Arc<dyn Stage>>,
    store: Option<Arc<dyn SnapshotStore>>,
    events: Arc<dyn EventSink>,
    stop_after: Option<StageName>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.stages)
            .field("has_store", &self.store.is_some())
            .field("stop_after", &self.stop_after)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Starts building an orchestrator around `ports`.
    #[must_use]
    pub fn builder(ports: StagePorts) -> OrchestratorBuilder {
        OrchestratorBuilder::new(ports)
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &CostflowConfig {
        self.ctx.config()
    }

    /// The result cache shared by all runs of this orchestrator.
    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        self.ctx.cache()
    }

    /// Runs a fresh pipeline with a new run id.
    pub async fn run(&self) -> RunOutcome {
        self.run_state(PipelineState::start()).await
    }

    /// Runs the pipeline starting from `state` as a fresh run.
    pub async fn run_state(&self, state: PipelineState) -> RunOutcome {
        self.emit(PipelineEvent::PipelineStarted {
            run_id: state.run_id.clone(),
        })
        .await;
        self.drive(state).await
    }

    /// Loads the snapshot of `run_id` and resumes it.
    pub async fn resume(&self, run_id: &str) -> Result<RunOutcome, CostflowError> {
        let store = self.store.as_ref().ok_or_else(|| {
            CostflowError::Config("resume requires a snapshot store".to_string())
        })?;
        let state = store.load(run_id).await?.ok_or_else(|| {
            CostflowError::from(
                ValidationError::new(format!("no snapshot for run '{run_id}'"))
                    .with_field("run_id"),
            )
        })?;
        Ok(self.resume_state(state).await)
    }

    /// Resumes `state` at its first stage lacking a success entry.
    ///
    /// A state whose stages have all succeeded is returned as `Done`
    /// without executing anything.
    pub async fn resume_state(&self, state: PipelineState) -> RunOutcome {
        if let Some(from) = state.next_stage() {
            tracing::info!(run_id = %state.run_id, from = %from, "Resuming run");
            self.emit(PipelineEvent::PipelineResumed {
                run_id: state.run_id.clone(),
                from,
            })
            .await;
        }
        self.drive(state).await
    }

    async fn drive(&self, mut state: PipelineState) -> RunOutcome {
        let timer = SpanTimer::start("pipeline");
        let mut stage_durations_ms = BTreeMap::new();
        let mut persist_errors = Vec::new();
        let mut failure = None;
        let mut paused_after = None;

        while let Some(name) = state.next_stage() {
            if let Some(stop) = self.stop_after.filter(|s| state.has_succeeded(*s)) {
                paused_after = Some(stop);
                break;
            }
            let Some(stage) = self.stages.get(&name) else {
                failure = Some(StageFailure {
                    stage: name,
                    attempts: 0,
                    error: CostflowError::Config(format!("no implementation for stage '{name}'")),
                });
                break;
            };

            self.emit(PipelineEvent::StageStarted {
                run_id: state.run_id.clone(),
                stage: name,
            })
            .await;

            let run = match self.runner.run(stage.as_ref(), &state, &self.ctx).await {
                Ok(run) => run,
                Err(violation) => {
                    failure = Some(StageFailure {
                        stage: name,
                        attempts: 0,
                        error: violation.into(),
                    });
                    break;
                }
            };

            state = run.state;
            stage_durations_ms.insert(name, run.elapsed_ms);
            self.persist(&state, &mut persist_errors).await;

            match run.error {
                None => {
                    self.emit(PipelineEvent::StageCompleted {
                        run_id: state.run_id.clone(),
                        stage: name,
                        attempts: run.result.attempts,
                        duration_ms: run.elapsed_ms,
                    })
                    .await;
                }
                Some(error) => {
                    self.emit(PipelineEvent::StageFailed {
                        run_id: state.run_id.clone(),
                        stage: name,
                        attempts: run.result.attempts,
                        error_kind: error.root_cause().kind().to_string(),
                        error: error.root_cause().to_string(),
                    })
                    .await;
                    failure = Some(StageFailure {
                        stage: name,
                        attempts: run.result.attempts,
                        error,
                    });
                    break;
                }
            }
        }

        let summary = CostSummary::compute(
            state.cost_data.as_ref(),
            state.recommendations.as_deref(),
            &self.config().currency,
        );
        let elapsed_ms = timer.finish();

        let phase = match (&failure, paused_after) {
            (None, Some(after)) => {
                let phase = state.phase();
                let next = state.next_stage().unwrap_or(StageName::Report);
                tracing::info!(
                    run_id = %state.run_id,
                    after = %after,
                    next = %next,
                    elapsed_ms,
                    "Pipeline paused"
                );
                self.emit(PipelineEvent::PipelinePaused {
                    run_id: state.run_id.clone(),
                    after,
                    next,
                })
                .await;
                phase
            }
            (None, None) => {
                tracing::info!(
                    run_id = %state.run_id,
                    elapsed_ms,
                    total_cost = %summary.total_cost,
                    potential_savings = %summary.total_potential_savings,
                    "Pipeline completed"
                );
                self.emit(PipelineEvent::PipelineCompleted {
                    run_id: state.run_id.clone(),
                    elapsed_ms,
                    total_cost: summary.total_cost.clone(),
                    potential_savings: summary.total_potential_savings.clone(),
                })
                .await;
                RunPhase::Done
            }
            (Some(f), _) => {
                tracing::error!(
                    run_id = %state.run_id,
                    stage = %f.stage,
                    attempts = f.attempts,
                    error = %f.error,
                    "Pipeline failed"
                );
                self.emit(PipelineEvent::PipelineFailed {
                    run_id: state.run_id.clone(),
                    stage: f.stage,
                    error: f.error.root_cause().to_string(),
                })
                .await;
                RunPhase::Failed
            }
        };

        RunOutcome {
            state,
            phase,
            paused_after,
            failure,
            metrics: RunMetrics {
                elapsed_ms,
                stage_durations_ms,
                summary,
            },
            persist_errors,
        }
    }

    async fn persist(&self, state: &PipelineState, errors: &mut Vec<String>) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(state).await {
            tracing::warn!(run_id = %state.run_id, error = %e, "Failed to persist snapshot");
            errors.push(e.to_string());
        }
    }

    async fn emit(&self, event: PipelineEvent) {
        self.events.emit(&event).await;
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    ports: StagePorts,
    config: CostflowConfig,
    store: Option<Arc<dyn SnapshotStore>>,
    events: Option<Arc<dyn EventSink>>,
    cache: Option<Arc<ResultCache>>,
    classifier: Option<Classifier>,
    overrides: Vec<Arc<dyn Stage>>,
    stop_after: Option<StageName>,
}

impl OrchestratorBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new(ports: StagePorts) -> Self {
        Self {
            ports,
            config: CostflowConfig::default(),
            store: None,
            events: None,
            cache: None,
            classifier: None,
            overrides: Vec::new(),
            stop_after: None,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CostflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Persists state after every stage attempt.
    #[must_use]
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reports lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Uses an existing cache instead of a fresh one.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the default error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Replaces the implementation of the stage `stage.name()`.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.overrides.push(stage);
        self
    }

    /// Pauses runs once `stage` has succeeded. Stopping after Report is the
    /// same as running to completion.
    #[must_use]
    pub fn with_stop_after(mut self, stage: StageName) -> Self {
        self.stop_after = Some(stage);
        self
    }

    /// Validates the configuration and builds the orchestrator.
    pub fn build(self) -> Result<Orchestrator, ValidationError> {
        self.config.validate()?;

        let mut stages: BTreeMap<StageName, Arc<dyn Stage>> = default_stages()
            .into_iter()
            .map(|stage| (stage.name(), stage))
            .collect();
        for stage in self.overrides {
            stages.insert(stage.name(), stage);
        }

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ResultCache::from_config(&self.config.cache)));
        let mut runner = StageRunner::new(RetryingExecutor::new(self.config.retry.clone()));
        if let Some(classifier) = self.classifier {
            runner = runner.with_classifier(classifier);
        }

        Ok(Orchestrator {
            ctx: StageContext::new(self.ports, cache, Arc::new(self.config)),
            runner,
            stages,
            store: self.store,
            events: self.events.unwrap_or_else(|| Arc::new(NoOpEventSink)),
            stop_after: self.stop_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use crate::events::CollectingEventSink;
    use crate::store::InMemorySnapshotStore;
    use crate::testing::{fixtures, history_of};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = CostflowConfig::default();
        config.retry.max_attempts = 0;

        let err = Orchestrator::builder(fixtures::empty_ports())
            .with_config(config)
            .build()
            .unwrap_err();

        assert_eq!(err.field.as_deref(), Some("retry.max_attempts"));
    }

    #[tokio::test]
    async fn test_empty_estate_runs_to_done() {
        let events = Arc::new(CollectingEventSink::new());
        let orchestrator = Orchestrator::builder(fixtures::empty_ports())
            .with_config(fixtures::fast_config())
            .with_event_sink(events.clone())
            .build()
            .unwrap();

        let outcome = orchestrator.run().await;

        assert!(outcome.is_success());
        assert_eq!(outcome.state.cost_data.as_ref().map(BTreeMap::len), Some(0));
        assert_eq!(outcome.state.recommendations.as_ref().map(Vec::len), Some(0));
        assert_eq!(outcome.metrics.stage_durations_ms.len(), 4);
        assert_eq!(
            events.event_types(),
            vec![
                "pipeline.started",
                "stage.started",
                "stage.completed",
                "stage.started",
                "stage.completed",
                "stage.started",
                "stage.completed",
                "stage.started",
                "stage.completed",
                "pipeline.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_resume_of_done_state_is_noop() {
        let orchestrator = Orchestrator::builder(fixtures::empty_ports())
            .with_config(fixtures::fast_config())
            .build()
            .unwrap();
        let done = orchestrator.run().await.into_result().unwrap();

        let events = Arc::new(CollectingEventSink::new());
        let orchestrator = Orchestrator::builder(fixtures::empty_ports())
            .with_config(fixtures::fast_config())
            .with_event_sink(events.clone())
            .build()
            .unwrap();
        let outcome = orchestrator.resume_state(done.clone()).await;

        assert_eq!(outcome.phase, RunPhase::Done);
        assert_eq!(outcome.state.stage_history(), done.stage_history());
        assert!(outcome.metrics.stage_durations_ms.is_empty());
        assert_eq!(events.event_types(), vec!["pipeline.completed"]);
    }

    #[tokio::test]
    async fn test_resume_requires_store_and_snapshot() {
        let orchestrator = Orchestrator::builder(fixtures::empty_ports()).build().unwrap();
        assert_eq!(orchestrator.resume("r").await.unwrap_err().kind(), "config");

        let orchestrator = Orchestrator::builder(fixtures::empty_ports())
            .with_snapshot_store(Arc::new(InMemorySnapshotStore::new()))
            .build()
            .unwrap();
        assert_eq!(orchestrator.resume("r").await.unwrap_err().kind(), "validation");
    }

    #[tokio::test]
    async fn test_into_result_names_stage_and_attempts() {
        let ports = fixtures::empty_ports().with_costs(Arc::new(
            crate::testing::StaticCostProvider::default()
                .with_failures(vec![CostflowError::fatal("billing", "401 unauthorized")]),
        ));
        let inventory = Arc::new(crate::testing::StaticInventoryProvider::new(vec![
            fixtures::vm("vm-1"),
        ]));
        let orchestrator = Orchestrator::builder(ports.with_inventory(inventory))
            .with_config(fixtures::fast_config())
            .build()
            .unwrap();

        let outcome = orchestrator.run().await;
        assert_eq!(
            history_of(&outcome.state),
            vec![
                (StageName::Scan, StageStatus::Success),
                (StageName::Analyze, StageStatus::Failure)
            ]
        );

        let err = outcome.into_result().unwrap_err();
        let CostflowError::Retry(retry) = err else {
            panic!("expected aggregated error");
        };
        assert_eq!(retry.operation, "analyze");
        assert_eq!(retry.attempts, 1);
        assert_eq!(retry.stop, RetryStop::Fatal);
        assert!(retry.cause.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_stop_after_pauses_and_resume_continues() {
        let (resources, costs, candidates) = fixtures::three_resource_estate();
        let ports = fixtures::static_ports(resources, costs, candidates);
        let store = Arc::new(InMemorySnapshotStore::new());
        let events = Arc::new(CollectingEventSink::new());
        let staged = Orchestrator::builder(ports.clone())
            .with_config(fixtures::fast_config())
            .with_snapshot_store(store.clone())
            .with_event_sink(events.clone())
            .with_stop_after(StageName::Analyze)
            .build()
            .unwrap();

        let outcome = staged.run().await;

        assert!(outcome.is_paused());
        assert!(!outcome.is_success());
        assert_eq!(outcome.phase, RunPhase::Optimizing);
        assert_eq!(outcome.paused_after, Some(StageName::Analyze));
        assert!(outcome.state.recommendations.is_none());
        assert_eq!(
            events.event_types().last().copied(),
            Some("pipeline.paused")
        );
        let run_id = outcome.state.run_id.clone();

        let again = staged.resume(&run_id).await.unwrap();
        assert!(again.is_paused());
        assert!(again.metrics.stage_durations_ms.is_empty());

        let full = Orchestrator::builder(ports)
            .with_config(fixtures::fast_config())
            .with_snapshot_store(store)
            .build()
            .unwrap();
        let done = full.resume(&run_id).await.unwrap();

        assert_eq!(done.phase, RunPhase::Done);
        assert_eq!(done.paused_after, None);
        assert_eq!(
            history_of(&done.state),
            vec![
                (StageName::Scan, StageStatus::Success),
                (StageName::Analyze, StageStatus::Success),
                (StageName::Optimize, StageStatus::Success),
                (StageName::Report, StageStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_after_report_runs_to_done() {
        let orchestrator = Orchestrator::builder(fixtures::empty_ports())
            .with_config(fixtures::fast_config())
            .with_stop_after(StageName::Report)
            .build()
            .unwrap();

        let outcome = orchestrator.run().await;

        assert_eq!(outcome.phase, RunPhase::Done);
        assert!(!outcome.is_paused());
    }
}
