//! Ready-made resources, costs and contexts for tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::mocks::{MemoryReportSink, StaticCostProvider, StaticGenerator, StaticInventoryProvider};
use crate::config::CostflowConfig;
use crate::core::{
    ActionKind, Candidate, CostEntry, Effort, Money, Recommendation, Resource, ResourceKind, Risk,
};
use crate::pipeline::{RecommendationRanker, ResultCache};
use crate::stages::{StageContext, StagePorts};

/// A production VM with the given id.
#[must_use]
pub fn vm(id: &str) -> Resource {
    Resource::new(id, id, ResourceKind::VirtualMachine, "eastus", "Standard_D4s_v3", "rg-prod")
        .with_tag("environment", "prod")
}

/// A resource of `kind` with the given id.
#[must_use]
pub fn resource(id: &str, kind: ResourceKind) -> Resource {
    Resource::new(id, id, kind, "eastus", "standard", "rg-prod")
}

/// A USD cost entry of `monthly` whole dollars.
#[must_use]
pub fn cost(id: &str, monthly: i64) -> CostEntry {
    CostEntry::new(id, Money::from_major(monthly, "USD"))
}

/// A resize candidate saving `savings` whole dollars.
#[must_use]
pub fn candidate(id: &str, savings: i64, effort: Effort, risk: Risk) -> Candidate {
    Candidate {
        resource_id: id.to_string(),
        action: ActionKind::Resize,
        estimated_savings: Money::from_major(savings, "USD"),
        effort,
        risk,
        rationale: format!("downsize {id}"),
    }
}

/// A scored recommendation built from [`candidate`].
#[must_use]
pub fn recommendation(id: &str, savings: i64, effort: Effort, risk: Risk) -> Recommendation {
    let c = candidate(id, savings, effort, risk);
    let priority_score = RecommendationRanker::score(&c);
    Recommendation {
        resource_id: c.resource_id,
        action: c.action,
        estimated_savings: c.estimated_savings,
        effort: c.effort,
        risk: c.risk,
        rationale: c.rationale,
        priority_score,
    }
}

/// Default config with millisecond retry delays.
#[must_use]
pub fn fast_config() -> CostflowConfig {
    let mut config = CostflowConfig::default();
    config.retry = config
        .retry
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(10));
    config
}

/// Ports serving the given estate.
#[must_use]
pub fn static_ports(
    resources: Vec<Resource>,
    costs: BTreeMap<String, CostEntry>,
    candidates: Vec<Candidate>,
) -> StagePorts {
    StagePorts::new(
        Arc::new(StaticInventoryProvider::new(resources)),
        Arc::new(StaticCostProvider::new(costs)),
        Arc::new(StaticGenerator::new(candidates)),
        Arc::new(MemoryReportSink::new()),
    )
}

/// Ports over an empty estate.
#[must_use]
pub fn empty_ports() -> StagePorts {
    static_ports(Vec::new(), BTreeMap::new(), Vec::new())
}

/// Three VMs costing $100, $50 and $10 with one equal-effort candidate
/// each, saving $40, $40 and $5.
#[must_use]
pub fn three_resource_estate() -> (Vec<Resource>, BTreeMap<String, CostEntry>, Vec<Candidate>) {
    let rows = [("vm-b", 100, 40), ("vm-a", 50, 40), ("vm-c", 10, 5)];
    let resources = rows.iter().map(|(id, _, _)| vm(id)).collect();
    let costs = rows
        .iter()
        .map(|(id, c, _)| ((*id).to_string(), cost(id, *c)))
        .collect();
    let candidates = rows
        .iter()
        .map(|(id, _, s)| candidate(id, *s, Effort::Medium, Risk::Low))
        .collect();
    (resources, costs, candidates)
}

/// A stage context over an empty estate with [`fast_config`].
#[must_use]
pub fn empty_context() -> StageContext {
    context_with(|ports| ports, |_| {})
}

/// A stage context over an empty estate, with ports and config adjusted.
pub fn context_with<P, C>(ports: P, config: C) -> StageContext
where
    P: FnOnce(StagePorts) -> StagePorts,
    C: FnOnce(&mut CostflowConfig),
{
    let mut cfg = fast_config();
    config(&mut cfg);
    StageContext::new(
        ports(empty_ports()),
        Arc::new(ResultCache::from_config(&cfg.cache)),
        Arc::new(cfg),
    )
}
