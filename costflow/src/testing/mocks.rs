//! Scripted in-memory ports.
//!
//! Each mock can be primed with errors that are returned, in order, by the
//! first calls before it starts answering normally. Calls are counted.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::{Candidate, CostEntry, InventoryFilter, ReportReceipt, Resource, TimeWindow};
use crate::errors::CostflowError;
use crate::stages::{
    CostProvider, InventoryProvider, RecommendationGenerator, ReportPayload, ReportSink,
};

/// Errors handed out before normal answers, and a call counter.
#[derive(Debug, Default)]
pub struct FailureScript {
    pending: Mutex<VecDeque<CostflowError>>,
    calls: AtomicUsize,
}

impl FailureScript {
    /// Primes the script with errors returned by the first calls.
    pub fn push_all(&self, errors: Vec<CostflowError>) {
        self.pending.lock().extend(errors);
    }

    /// Records a call and returns its scripted error, if any.
    pub fn next(&self) -> Result<(), CostflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pending.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Inventory provider serving a fixed list.
#[derive(Debug, Default)]
pub struct StaticInventoryProvider {
    resources: Vec<Resource>,
    script: FailureScript,
}

impl StaticInventoryProvider {
    /// Serves `resources` for every filter they match.
    #[must_use]
    pub fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources,
            script: FailureScript::default(),
        }
    }

    /// Fails the first calls with `errors`.
    #[must_use]
    pub fn with_failures(self, errors: Vec<CostflowError>) -> Self {
        self.script.push_all(errors);
        self
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl InventoryProvider for StaticInventoryProvider {
    async fn list_resources(
        &self,
        filter: &InventoryFilter,
    ) -> Result<Vec<Resource>, CostflowError> {
        self.script.next()?;
        Ok(self
            .resources
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

/// Cost provider serving a fixed table.
#[derive(Debug, Default)]
pub struct StaticCostProvider {
    costs: BTreeMap<String, CostEntry>,
    script: FailureScript,
}

impl StaticCostProvider {
    /// Serves entries from `costs`.
    #[must_use]
    pub fn new(costs: BTreeMap<String, CostEntry>) -> Self {
        Self {
            costs,
            script: FailureScript::default(),
        }
    }

    /// Fails the first calls with `errors`.
    #[must_use]
    pub fn with_failures(self, errors: Vec<CostflowError>) -> Self {
        self.script.push_all(errors);
        self
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl CostProvider for StaticCostProvider {
    async fn get_costs(
        &self,
        resource_ids: &[String],
        _window: TimeWindow,
    ) -> Result<BTreeMap<String, CostEntry>, CostflowError> {
        self.script.next()?;
        Ok(resource_ids
            .iter()
            .filter_map(|id| self.costs.get(id).map(|c| (id.clone(), c.clone())))
            .collect())
    }
}

/// Generator returning canned candidates per resource id.
#[derive(Debug, Default)]
pub struct StaticGenerator {
    candidates: HashMap<String, Vec<Candidate>>,
    script: FailureScript,
}

impl StaticGenerator {
    /// Serves `candidates`, grouped by their resource id.
    #[must_use]
    pub fn new(candidates: Vec<Candidate>) -> Self {
        let mut by_resource: HashMap<String, Vec<Candidate>> = HashMap::new();
        for candidate in candidates {
            by_resource
                .entry(candidate.resource_id.clone())
                .or_default()
                .push(candidate);
        }
        Self {
            candidates: by_resource,
            script: FailureScript::default(),
        }
    }

    /// Fails the first calls with `errors`.
    #[must_use]
    pub fn with_failures(self, errors: Vec<CostflowError>) -> Self {
        self.script.push_all(errors);
        self
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl RecommendationGenerator for StaticGenerator {
    async fn generate(
        &self,
        resource: &Resource,
        _cost: &CostEntry,
    ) -> Result<Vec<Candidate>, CostflowError> {
        self.script.next()?;
        Ok(self.candidates.get(&resource.id).cloned().unwrap_or_default())
    }
}

/// Report sink keeping payloads in memory.
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    payloads: RwLock<Vec<ReportPayload>>,
    script: FailureScript,
}

impl MemoryReportSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first calls with `errors`.
    #[must_use]
    pub fn with_failures(self, errors: Vec<CostflowError>) -> Self {
        self.script.push_all(errors);
        self
    }

    /// Payloads received so far.
    #[must_use]
    pub fn payloads(&self) -> Vec<ReportPayload> {
        self.payloads.read().clone()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    async fn emit(&self, payload: &ReportPayload) -> Result<ReportReceipt, CostflowError> {
        self.script.next()?;
        self.payloads.write().push(payload.clone());
        Ok(ReportReceipt::new(vec![format!("memory://{}", payload.run_id)]))
    }
}
