//! End-to-end tests of the orchestrated pipeline over in-memory ports.

#[cfg(test)]
mod tests {
    use crate::core::{
        Candidate, CostEntry, Level, Resource, RunPhase, StageName, StageOutput, StageResult,
        StageStatus, TimeWindow,
    };
    use crate::errors::{CostflowError, RetryStop};
    use crate::events::CollectingEventSink;
    use crate::pipeline::{Orchestrator, PipelineState};
    use crate::stages::{CostProvider, RecommendationGenerator, StagePorts};
    use crate::store::{FileSnapshotStore, InMemorySnapshotStore, SnapshotStore};
    use crate::testing::{
        assert_attempts, assert_clean_run, fixtures, history_of, MemoryReportSink,
        StaticCostProvider, StaticGenerator, StaticInventoryProvider,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn three_resource_ports() -> StagePorts {
        let (resources, costs, candidates) = fixtures::three_resource_estate();
        fixtures::static_ports(resources, costs, candidates)
    }

    fn orchestrator(ports: StagePorts) -> Orchestrator {
        Orchestrator::builder(ports)
            .with_config(fixtures::fast_config())
            .build()
            .unwrap()
    }

    /// Cost provider that always throttles and records when it was called.
    #[derive(Debug, Default)]
    struct ThrottledCostProvider {
        calls: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl CostProvider for ThrottledCostProvider {
        async fn get_costs(
            &self,
            _resource_ids: &[String],
            _window: TimeWindow,
        ) -> Result<BTreeMap<String, CostEntry>, CostflowError> {
            self.calls.lock().push(Instant::now());
            Err(CostflowError::transient("billing", "429 too many requests"))
        }
    }

    /// Generator whose first call for one resource times out.
    #[derive(Debug)]
    struct FlakyGenerator {
        inner: StaticGenerator,
        flaky_id: String,
        calls: Mutex<BTreeMap<String, usize>>,
    }

    impl FlakyGenerator {
        fn new(candidates: Vec<Candidate>, flaky_id: &str) -> Self {
            Self {
                inner: StaticGenerator::new(candidates),
                flaky_id: flaky_id.to_string(),
                calls: Mutex::new(BTreeMap::new()),
            }
        }

        fn calls_for(&self, id: &str) -> usize {
            self.calls.lock().get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl RecommendationGenerator for FlakyGenerator {
        async fn generate(
            &self,
            resource: &Resource,
            cost: &CostEntry,
        ) -> Result<Vec<Candidate>, CostflowError> {
            let seen = {
                let mut calls = self.calls.lock();
                let count = calls.entry(resource.id.clone()).or_insert(0);
                *count += 1;
                *count
            };
            if resource.id == self.flaky_id && seen == 1 {
                return Err(CostflowError::transient("advisor", "timeout"));
            }
            self.inner.generate(resource, cost).await
        }
    }

    /// Snapshot store whose disk is always full.
    #[derive(Debug, Default)]
    struct FullDiskStore;

    #[async_trait]
    impl SnapshotStore for FullDiskStore {
        async fn save(&self, _state: &PipelineState) -> Result<(), CostflowError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left on device").into())
        }

        async fn load(&self, _run_id: &str) -> Result<Option<PipelineState>, CostflowError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_scan_yields_every_listed_resource() {
        let resources: Vec<_> = (0..12).map(|i| fixtures::vm(&format!("vm-{i:02}"))).collect();
        let costs = resources
            .iter()
            .map(|r| (r.id.clone(), fixtures::cost(&r.id, 20)))
            .collect();
        let mut config = fixtures::fast_config();
        config.analysis.batch_size = 5;
        let ports = fixtures::static_ports(resources, costs, Vec::new());
        let orchestrator = Orchestrator::builder(ports)
            .with_config(config)
            .build()
            .unwrap();

        let state = orchestrator.run().await.into_result().unwrap();

        assert_eq!(state.inventory.as_ref().map(Vec::len), Some(12));
        assert_eq!(state.cost_data.as_ref().map(BTreeMap::len), Some(12));
    }

    #[tokio::test]
    async fn test_successful_run_has_one_success_per_stage_in_order() {
        let outcome = orchestrator(three_resource_ports()).run().await;

        assert_eq!(outcome.phase, RunPhase::Done);
        assert!(outcome.failure.is_none());
        assert!(outcome.persist_errors.is_empty());
        assert_clean_run(&outcome.state);
        assert!(outcome.state.report.is_some());
    }

    #[tokio::test]
    async fn test_three_resource_scenario_end_to_end() {
        let sink = Arc::new(MemoryReportSink::new());
        let orchestrator = orchestrator(three_resource_ports().with_sink(sink.clone()));

        let outcome = orchestrator.run().await;
        let state = &outcome.state;

        let ids: Vec<_> = state
            .recommendations
            .as_ref()
            .unwrap()
            .iter()
            .map(|r| r.resource_id.as_str())
            .collect();
        assert_eq!(ids, vec!["vm-a", "vm-b", "vm-c"]);

        let summary = &outcome.metrics.summary;
        assert_eq!(summary.total_cost.minor_units, 16_000);
        assert_eq!(summary.total_potential_savings.minor_units, 8_500);

        let payloads = sink.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].run_id, state.run_id);
        assert_eq!(payloads[0].high_cost_resources.len(), 1);
        assert_eq!(
            state.report.as_ref().unwrap().locations,
            vec![format!("memory://{}", state.run_id)]
        );
    }

    #[tokio::test]
    async fn test_ranking_is_identical_across_runs() {
        let first = orchestrator(three_resource_ports()).run().await.state;
        let second = orchestrator(three_resource_ports()).run().await.state;

        assert_eq!(first.recommendations, second.recommendations);
    }

    #[tokio::test]
    async fn test_empty_inventory_completes_with_empty_outputs() {
        let outcome = orchestrator(fixtures::empty_ports()).run().await;

        assert_eq!(outcome.phase, RunPhase::Done);
        assert_eq!(outcome.state.inventory, Some(Vec::new()));
        assert_eq!(outcome.state.cost_data, Some(BTreeMap::new()));
        assert_eq!(outcome.state.recommendations, Some(Vec::new()));
        assert_eq!(outcome.metrics.summary.savings_percentage, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_law_on_persistent_throttling() {
        let costs = Arc::new(ThrottledCostProvider::default());
        let ports = three_resource_ports().with_costs(costs.clone());
        let mut config = fixtures::fast_config();
        config.retry = config
            .retry
            .with_max_attempts(3)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30));
        let orchestrator = Orchestrator::builder(ports).with_config(config).build().unwrap();

        let outcome = orchestrator.run().await;

        let calls = costs.calls.lock().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(1));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(2));

        assert_eq!(outcome.phase, RunPhase::Failed);
        assert_eq!(
            history_of(&outcome.state),
            vec![
                (StageName::Scan, StageStatus::Success),
                (StageName::Analyze, StageStatus::Failure)
            ]
        );
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.stage, StageName::Analyze);
        assert_eq!(failure.attempts, 3);

        let CostflowError::Retry(retry) = outcome.into_result().unwrap_err() else {
            panic!("expected aggregated retry error");
        };
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.stop, RetryStop::Exhausted);
        assert!(retry.cause.is_transient());
    }

    #[tokio::test]
    async fn test_transient_failures_within_budget_do_not_fail_the_run() {
        let (resources, costs, candidates) = fixtures::three_resource_estate();
        let generator = Arc::new(StaticGenerator::new(candidates).with_failures(vec![
            CostflowError::transient("advisor", "timeout"),
            CostflowError::transient("advisor", "timeout"),
        ]));
        let ports =
            fixtures::static_ports(resources, costs, Vec::new()).with_generator(generator.clone());
        let mut config = fixtures::fast_config();
        config.optimize.generator_concurrency = 1;
        let orchestrator = Orchestrator::builder(ports).with_config(config).build().unwrap();

        let outcome = orchestrator.run().await;

        assert_clean_run(&outcome.state);
        let optimize = &outcome.state.stage_history()[2];
        assert_eq!(optimize.attempts, 3);
        assert_eq!(generator.calls(), 5);
        assert_eq!(outcome.state.recommendations.as_ref().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_retried_stage_reuses_cached_sub_calls() {
        let (resources, costs, candidates) = fixtures::three_resource_estate();
        let generator = Arc::new(FlakyGenerator::new(candidates, "vm-c"));
        let ports =
            fixtures::static_ports(resources, costs, Vec::new()).with_generator(generator.clone());
        let mut config = fixtures::fast_config();
        config.optimize.generator_concurrency = 1;
        let orchestrator = Orchestrator::builder(ports).with_config(config).build().unwrap();

        let outcome = orchestrator.run().await;

        assert_clean_run(&outcome.state);
        assert_eq!(outcome.state.stage_history()[2].attempts, 2);
        assert_eq!(generator.calls_for("vm-a"), 1);
        assert_eq!(generator.calls_for("vm-b"), 1);
        assert_eq!(generator.calls_for("vm-c"), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_halts_without_retry() {
        let costs = Arc::new(
            StaticCostProvider::default()
                .with_failures(vec![CostflowError::fatal("billing", "403 forbidden")]),
        );
        let events = Arc::new(CollectingEventSink::new());
        let orchestrator = Orchestrator::builder(three_resource_ports().with_costs(costs.clone()))
            .with_config(fixtures::fast_config())
            .with_event_sink(events.clone())
            .build()
            .unwrap();

        let outcome = orchestrator.run().await;

        assert_eq!(outcome.phase, RunPhase::Failed);
        assert_eq!(costs.calls(), 1);
        assert!(outcome.state.recommendations.is_none());
        assert_eq!(
            events.event_types().last().copied(),
            Some("pipeline.failed")
        );
        assert_eq!(events.events_of_type("stage.failed").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_required_resources_is_not_retried() {
        let inventory = Arc::new(StaticInventoryProvider::new(Vec::new()));
        let mut config = fixtures::fast_config();
        config.scan.require_resources = true;
        let ports = fixtures::empty_ports().with_inventory(inventory.clone());
        let orchestrator = Orchestrator::builder(ports)
            .with_config(config)
            .build()
            .unwrap();

        let outcome = orchestrator.run().await;

        assert_eq!(outcome.phase, RunPhase::Failed);
        assert_eq!(inventory.calls(), 1);
        let result = &outcome.state.stage_history()[0];
        assert_eq!(result.attempts, 1);
        assert_eq!(result.error_kind.as_deref(), Some("validation"));
    }

    #[tokio::test]
    async fn test_resume_after_scan_runs_only_later_stages() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let first = Orchestrator::builder(
            three_resource_ports().with_costs(Arc::new(
                StaticCostProvider::default()
                    .with_failures(vec![CostflowError::fatal("billing", "expired token")]),
            )),
        )
        .with_config(fixtures::fast_config())
        .with_snapshot_store(store.clone())
        .build()
        .unwrap();
        let failed = first.run().await;
        assert_eq!(failed.phase, RunPhase::Failed);
        let run_id = failed.state.run_id.clone();

        let inventory = Arc::new(StaticInventoryProvider::new(Vec::new()));
        let events = Arc::new(CollectingEventSink::new());
        let second = Orchestrator::builder(three_resource_ports().with_inventory(inventory.clone()))
            .with_config(fixtures::fast_config())
            .with_snapshot_store(store.clone())
            .with_event_sink(events.clone())
            .build()
            .unwrap();

        let outcome = second.resume(&run_id).await.unwrap();

        assert_eq!(outcome.phase, RunPhase::Done);
        assert_eq!(outcome.state.run_id, run_id);
        assert_eq!(inventory.calls(), 0);
        assert_eq!(
            history_of(&outcome.state),
            vec![
                (StageName::Scan, StageStatus::Success),
                (StageName::Analyze, StageStatus::Failure),
                (StageName::Analyze, StageStatus::Success),
                (StageName::Optimize, StageStatus::Success),
                (StageName::Report, StageStatus::Success),
            ]
        );
        assert_attempts(&outcome.state, StageName::Scan, 1);
        assert_eq!(
            outcome.metrics.stage_durations_ms.keys().copied().collect::<Vec<_>>(),
            vec![StageName::Analyze, StageName::Optimize, StageName::Report]
        );
        assert_eq!(events.event_types()[0], "pipeline.resumed");

        let persisted = store.load(&run_id).await.unwrap().unwrap();
        assert_eq!(persisted.stage_history().len(), 5);
    }

    #[tokio::test]
    async fn test_resume_from_file_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileSnapshotStore::new(dir.path()));
        let (resources, _, _) = fixtures::three_resource_estate();
        let scanned = PipelineState::start()
            .with_output(StageName::Scan, StageOutput::Inventory(resources))
            .unwrap()
            .with_result(StageResult::success(StageName::Scan, Utc::now(), 1));
        store.save(&scanned).await.unwrap();

        let inventory = Arc::new(StaticInventoryProvider::new(Vec::new()));
        let ports = three_resource_ports().with_inventory(inventory.clone());
        let resumed = Orchestrator::builder(ports)
            .with_config(fixtures::fast_config())
            .with_snapshot_store(store.clone())
            .build()
            .unwrap()
            .resume(&scanned.run_id)
            .await
            .unwrap();

        assert_clean_run(&resumed.state);
        assert_eq!(inventory.calls(), 0);
        assert_eq!(resumed.state.inventory.as_ref().map(Vec::len), Some(3));
        let fresh = orchestrator(three_resource_ports()).run().await.state;
        assert_eq!(resumed.state.recommendations, fresh.recommendations);

        let on_disk = store.load(&scanned.run_id).await.unwrap().unwrap();
        assert!(on_disk.is_complete());
    }

    #[tokio::test]
    async fn test_persistence_failures_do_not_abort_the_run() {
        let orchestrator = Orchestrator::builder(three_resource_ports())
            .with_config(fixtures::fast_config())
            .with_snapshot_store(Arc::new(FullDiskStore))
            .build()
            .unwrap();

        let outcome = orchestrator.run().await;

        assert_eq!(outcome.phase, RunPhase::Done);
        assert_eq!(outcome.persist_errors.len(), 4);
        assert!(outcome.persist_errors[0].contains("no space left"));
    }

    #[tokio::test]
    async fn test_quick_wins_reach_the_report() {
        let resources = vec![fixtures::vm("vm-1"), fixtures::vm("vm-2")];
        let costs = resources
            .iter()
            .map(|r| (r.id.clone(), fixtures::cost(&r.id, 200)))
            .collect();
        let candidates = vec![
            fixtures::candidate("vm-1", 60, Level::Low, Level::Low),
            fixtures::candidate("vm-2", 90, Level::High, Level::Medium),
        ];
        let sink = Arc::new(MemoryReportSink::new());
        let ports = fixtures::static_ports(resources, costs, candidates).with_sink(sink.clone());

        orchestrator(ports).run().await.into_result().unwrap();

        let payload = &sink.payloads()[0];
        assert_eq!(payload.quick_wins.len(), 1);
        assert_eq!(payload.quick_wins[0].resource_id, "vm-1");
        assert_eq!(payload.stage_history.len(), 3);
    }
}
