//! Inventory and costs read from a JSON estate file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::{CostEntry, InventoryFilter, Resource, TimeWindow};
use crate::errors::{CostflowError, ValidationError};
use crate::stages::{CostProvider, InventoryProvider};

/// A snapshot of one subscription: its resources and their monthly costs.
///
/// ```json
/// {
///   "subscription_id": "sub-123",
///   "resources": [{ "id": "vm-1", "name": "web-01", "kind": "virtual_machine", ... }],
///   "costs": [{
///     "resource_id": "vm-1",
///     "monthly_cost": { "minor_units": 12000, "currency": "USD" }
///   }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstateFile {
    /// Subscription the estate belongs to; `None` accepts any scope.
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// All resources in the estate.
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Monthly cost entries.
    #[serde(default)]
    pub costs: Vec<CostEntry>,
}

impl EstateFile {
    /// Reads and validates an estate file.
    pub fn load(path: &Path) -> Result<Self, CostflowError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| match e {
            CostflowError::Serialization(msg) => {
                CostflowError::Config(format!("invalid estate file {}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parses and validates an estate from JSON text.
    pub fn from_json(raw: &str) -> Result<Self, CostflowError> {
        let estate: Self = serde_json::from_str(raw)?;
        estate.validate()?;
        Ok(estate)
    }

    /// Rejects duplicate resource ids and duplicate cost entries.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = std::collections::HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.id.as_str()) {
                return Err(ValidationError::new(format!(
                    "duplicate resource id '{}'",
                    resource.id
                ))
                .with_field("resources"));
            }
        }
        let mut costed = std::collections::HashSet::new();
        for entry in &self.costs {
            if !costed.insert(entry.resource_id.as_str()) {
                return Err(ValidationError::new(format!(
                    "duplicate cost entry for '{}'",
                    entry.resource_id
                ))
                .with_field("costs"));
            }
        }
        Ok(())
    }

    /// Cost entries keyed by resource id.
    #[must_use]
    pub fn cost_table(&self) -> BTreeMap<String, CostEntry> {
        self.costs
            .iter()
            .map(|entry| (entry.resource_id.clone(), entry.clone()))
            .collect()
    }

    fn covers(&self, subscription_id: &str) -> bool {
        subscription_id.is_empty()
            || self
                .subscription_id
                .as_deref()
                .map_or(true, |own| own.eq_ignore_ascii_case(subscription_id))
    }
}

/// Lists resources from an [`EstateFile`].
#[derive(Debug, Clone)]
pub struct FileInventoryProvider {
    estate: Arc<EstateFile>,
}

impl FileInventoryProvider {
    /// Serves the given estate.
    #[must_use]
    pub fn new(estate: Arc<EstateFile>) -> Self {
        Self { estate }
    }
}

#[async_trait]
impl InventoryProvider for FileInventoryProvider {
    async fn list_resources(
        &self,
        filter: &InventoryFilter,
    ) -> Result<Vec<Resource>, CostflowError> {
        if !self.estate.covers(&filter.subscription_id) {
            return Err(CostflowError::fatal(
                "inventory",
                format!("subscription '{}' not found", filter.subscription_id),
            ));
        }
        Ok(self
            .estate
            .resources
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

/// Serves cost entries from an [`EstateFile`].
///
/// The file holds one monthly figure per resource, so the window is only
/// logged.
#[derive(Debug, Clone)]
pub struct FileCostProvider {
    costs: BTreeMap<String, CostEntry>,
}

impl FileCostProvider {
    /// Serves the given estate's costs.
    #[must_use]
    pub fn new(estate: &EstateFile) -> Self {
        Self {
            costs: estate.cost_table(),
        }
    }
}

#[async_trait]
impl CostProvider for FileCostProvider {
    async fn get_costs(
        &self,
        resource_ids: &[String],
        window: TimeWindow,
    ) -> Result<BTreeMap<String, CostEntry>, CostflowError> {
        tracing::debug!(
            requested = resource_ids.len(),
            window = %window,
            "Reading costs from estate"
        );
        Ok(resource_ids
            .iter()
            .filter_map(|id| self.costs.get(id).map(|entry| (id.clone(), entry.clone())))
            .collect())
    }
}
