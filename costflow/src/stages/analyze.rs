//! Analyze: cost attribution.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashSet};

use super::{missing_input, Stage, StageContext};
use crate::core::{CostEntry, StageName, StageOutput, TimeWindow};
use crate::errors::{CostflowError, ValidationError};
use crate::pipeline::{CacheKey, PipelineState};

/// Queries cost data for the scanned inventory in concurrent batches.
///
/// The window is anchored on the run's creation date, so retries and resumes
/// query the same period. Entries for ids outside the inventory are dropped.
/// Every entry must be in the configured currency.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeStage;

fn costs_key(batch: &[String], window: TimeWindow) -> Result<CacheKey, CostflowError> {
    Ok(CacheKey::new("costs")
        .param("ids", serde_json::to_string(batch)?)
        .param("window", window))
}

#[async_trait]
impl Stage for AnalyzeStage {
    fn name(&self) -> StageName {
        StageName::Analyze
    }

    async fn execute(
        &self,
        state: &PipelineState,
        ctx: &StageContext,
    ) -> Result<StageOutput, CostflowError> {
        let inventory = state
            .inventory
            .as_ref()
            .ok_or_else(|| missing_input(StageName::Analyze, "inventory"))?;

        if inventory.is_empty() {
            tracing::info!("Empty inventory, nothing to analyze");
            return Ok(StageOutput::CostData(BTreeMap::new()));
        }

        let config = ctx.config();
        let window = TimeWindow::trailing_days(
            config.analysis.window_days,
            state.created_at.date_naive(),
        );
        let ids: Vec<String> = inventory.iter().map(|r| r.id.clone()).collect();
        let known: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let provider = &ctx.ports().costs;

        let batches = try_join_all(ids.chunks(config.analysis.batch_size).map(|batch| async move {
            let key = costs_key(batch, window)?;
            ctx.cache()
                .get_or_compute(&key, None, || provider.get_costs(batch, window))
                .await
        }))
        .await?;

        let mut cost_data = BTreeMap::new();
        for (id, entry) in batches.into_iter().flatten() {
            if !known.contains(id.as_str()) {
                tracing::debug!(resource_id = %id, "Dropping cost entry for unknown resource");
                continue;
            }
            check_currency(&entry, &config.currency)?;
            cost_data.insert(id, entry);
        }

        tracing::info!(
            window = %window,
            resources = inventory.len(),
            costed = cost_data.len(),
            "Costs analyzed"
        );
        Ok(StageOutput::CostData(cost_data))
    }
}

fn check_currency(entry: &CostEntry, currency: &str) -> Result<(), ValidationError> {
    if entry.monthly_cost.currency != currency {
        return Err(ValidationError::new(format!(
            "cost for '{}' is in {}, expected {currency}",
            entry.resource_id, entry.monthly_cost.currency
        ))
        .with_field("currency"));
    }
    Ok(())
}
