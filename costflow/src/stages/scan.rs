//! Scan: inventory discovery.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashSet;

use super::{Stage, StageContext};
use crate::core::{InventoryFilter, Resource, StageName, StageOutput};
use crate::errors::{CostflowError, ValidationError};
use crate::pipeline::{CacheKey, PipelineState};

/// Lists resources for every configured scope and merges them.
///
/// Scopes are queried concurrently. Results are merged in scope order and
/// de-duplicated by resource id, keeping the first occurrence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStage;

fn inventory_key(filter: &InventoryFilter) -> Result<CacheKey, CostflowError> {
    Ok(CacheKey::new("inventory").param("filter", serde_json::to_string(filter)?))
}

#[async_trait]
impl Stage for ScanStage {
    fn name(&self) -> StageName {
        StageName::Scan
    }

    async fn execute(
        &self,
        _state: &PipelineState,
        ctx: &StageContext,
    ) -> Result<StageOutput, CostflowError> {
        let config = &ctx.config().scan;
        let provider = &ctx.ports().inventory;

        let listings = try_join_all(config.scopes.iter().map(|filter| async move {
            let key = inventory_key(filter)?;
            ctx.cache()
                .get_or_compute(&key, None, || provider.list_resources(filter))
                .await
        }))
        .await?;

        let mut seen = HashSet::new();
        let mut inventory: Vec<Resource> = listings
            .into_iter()
            .flatten()
            .filter(|resource| seen.insert(resource.id.clone()))
            .collect();

        if let Some(limit) = config.limit {
            inventory.truncate(limit);
        }

        if inventory.is_empty() && config.require_resources {
            return Err(ValidationError::new("no resources found in the configured scopes")
                .with_field("inventory")
                .into());
        }

        tracing::info!(
            scopes = config.scopes.len(),
            resources = inventory.len(),
            "Inventory scanned"
        );
        Ok(StageOutput::Inventory(inventory))
    }
}
