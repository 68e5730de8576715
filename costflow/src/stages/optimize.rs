//! Optimize: candidate generation and ranking.

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use std::collections::HashSet;

use super::{missing_input, Stage, StageContext};
use crate::core::{Candidate, CostEntry, Money, Resource, StageName, StageOutput};
use crate::errors::CostflowError;
use crate::pipeline::{CacheKey, PipelineState, RecommendationRanker};

/// Asks the generator for candidates per resource, then ranks them.
///
/// Generator calls run with bounded concurrency and keep inventory order.
/// Resources without a cost entry are offered to the generator with a zero
/// cost. Candidates naming a resource outside the inventory, or priced in a
/// currency other than the configured one, are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizeStage;

fn candidates_key(resource: &Resource, cost: &CostEntry) -> Result<CacheKey, CostflowError> {
    Ok(CacheKey::new("candidates")
        .param("resource", serde_json::to_string(resource)?)
        .param("cost", serde_json::to_string(cost)?))
}

#[async_trait]
impl Stage for OptimizeStage {
    fn name(&self) -> StageName {
        StageName::Optimize
    }

    async fn execute(
        &self,
        state: &PipelineState,
        ctx: &StageContext,
    ) -> Result<StageOutput, CostflowError> {
        let inventory = state
            .inventory
            .as_ref()
            .ok_or_else(|| missing_input(StageName::Optimize, "inventory"))?;
        let cost_data = state
            .cost_data
            .as_ref()
            .ok_or_else(|| missing_input(StageName::Optimize, "cost_data"))?;

        let config = ctx.config();
        let generator = &ctx.ports().generator;

        let work: Vec<(&Resource, CostEntry)> = inventory
            .iter()
            .map(|resource| {
                let cost = cost_data.get(&resource.id).cloned().unwrap_or_else(|| {
                    CostEntry::new(resource.id.clone(), Money::zero(config.currency.clone()))
                });
                (resource, cost)
            })
            .collect();

        let lookups: Vec<_> = work
            .into_iter()
            .map(|(resource, cost)| async move {
                let key = candidates_key(resource, &cost)?;
                ctx.cache()
                    .get_or_compute(&key, None, || generator.generate(resource, &cost))
                    .await
            })
            .collect();

        let generated: Vec<Vec<Candidate>> = stream::iter(lookups)
            .buffered(config.optimize.generator_concurrency.max(1))
            .try_collect()
            .await?;

        let known: HashSet<&str> = inventory.iter().map(|r| r.id.as_str()).collect();
        let candidates: Vec<Candidate> = generated
            .into_iter()
            .flatten()
            .filter(|candidate| {
                if !known.contains(candidate.resource_id.as_str()) {
                    tracing::warn!(
                        resource_id = %candidate.resource_id,
                        action = %candidate.action,
                        "Dropping candidate for unknown resource"
                    );
                    return false;
                }
                if candidate.estimated_savings.currency != config.currency {
                    tracing::warn!(
                        resource_id = %candidate.resource_id,
                        action = %candidate.action,
                        currency = %candidate.estimated_savings.currency,
                        expected = %config.currency,
                        "Dropping candidate in foreign currency"
                    );
                    return false;
                }
                true
            })
            .collect();

        let recommendations = RecommendationRanker::new().rank(&candidates);

        tracing::info!(
            resources = inventory.len(),
            recommendations = recommendations.len(),
            "Recommendations ranked"
        );
        Ok(StageOutput::Recommendations(recommendations))
    }
}
