//! External collaborators injected into stages.
//!
//! Each port is a narrow async trait. Stages receive them bundled in
//! `StagePorts` and never construct them.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use super::ReportPayload;
use crate::core::{Candidate, CostEntry, InventoryFilter, ReportReceipt, Resource, TimeWindow};
use crate::errors::CostflowError;

/// Lists resources within a scope.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Returns the resources matching `filter`.
    async fn list_resources(
        &self,
        filter: &InventoryFilter,
    ) -> Result<Vec<Resource>, CostflowError>;
}

/// Returns cost data for resources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CostProvider: Send + Sync {
    /// Returns cost entries keyed by resource id for `window`.
    ///
    /// Ids without cost data may be absent from the result.
    async fn get_costs(
        &self,
        resource_ids: &[String],
        window: TimeWindow,
    ) -> Result<BTreeMap<String, CostEntry>, CostflowError>;
}

/// Proposes optimizations for one resource. Output is untrusted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecommendationGenerator: Send + Sync {
    /// Returns zero or more candidates for `resource`.
    async fn generate(
        &self,
        resource: &Resource,
        cost: &CostEntry,
    ) -> Result<Vec<Candidate>, CostflowError>;
}

/// Receives the finished report payload.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Delivers the payload and returns where it went.
    async fn emit(&self, payload: &ReportPayload) -> Result<ReportReceipt, CostflowError>;
}

/// The four collaborators a run needs.
#[derive(Clone)]
pub struct StagePorts {
    /// Inventory source.
    pub inventory: Arc<dyn InventoryProvider>,
    /// Cost source.
    pub costs: Arc<dyn CostProvider>,
    /// Candidate generator.
    pub generator: Arc<dyn RecommendationGenerator>,
    /// Report destination.
    pub sink: Arc<dyn ReportSink>,
}

impl std::fmt::Debug for StagePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePorts").finish_non_exhaustive()
    }
}

impl StagePorts {
    /// Bundles the four ports.
    #[must_use]
    pub fn new(
        inventory: Arc<dyn InventoryProvider>,
        costs: Arc<dyn CostProvider>,
        generator: Arc<dyn RecommendationGenerator>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            inventory,
            costs,
            generator,
            sink,
        }
    }

    /// Replaces the inventory provider.
    #[must_use]
    pub fn with_inventory(mut self, inventory: Arc<dyn InventoryProvider>) -> Self {
        self.inventory = inventory;
        self
    }

    /// Replaces the cost provider.
    #[must_use]
    pub fn with_costs(mut self, costs: Arc<dyn CostProvider>) -> Self {
        self.costs = costs;
        self
    }

    /// Replaces the generator.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn RecommendationGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Replaces the report sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }
}
