//! Report: payload assembly and delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{missing_input, Stage, StageContext};
use crate::config::CostflowConfig;
use crate::core::{
    CostEntry, CostSummary, Money, Recommendation, Resource, ResourceKind, StageName, StageOutput,
    StageResult,
};
use crate::errors::CostflowError;
use crate::pipeline::PipelineState;

/// One resource's monthly cost, for report listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCost {
    /// Resource id.
    pub resource_id: String,
    /// Display name.
    pub name: String,
    /// Resource category.
    pub kind: ResourceKind,
    /// Monthly cost.
    pub monthly_cost: Money,
}

/// Everything a report sink receives.
///
/// The payload shape is fixed here; how it is rendered is up to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    /// Run identifier.
    pub run_id: String,
    /// When the payload was assembled.
    pub generated_at: DateTime<Utc>,
    /// Cost and savings totals.
    pub summary: CostSummary,
    /// Monthly cost per resource kind.
    pub cost_by_kind: BTreeMap<String, Money>,
    /// Resources at or above the high-cost threshold, most expensive first.
    pub high_cost_resources: Vec<ResourceCost>,
    /// Low-effort, low-risk recommendations in rank order.
    pub quick_wins: Vec<Recommendation>,
    /// Scanned inventory.
    pub inventory: Vec<Resource>,
    /// Cost entries by resource id.
    pub cost_data: BTreeMap<String, CostEntry>,
    /// Ranked recommendations.
    pub recommendations: Vec<Recommendation>,
    /// Stage history up to, not including, the report attempt.
    pub stage_history: Vec<StageResult>,
}

impl ReportPayload {
    /// Builds the payload from a state that has completed Optimize.
    pub fn build(state: &PipelineState, config: &CostflowConfig) -> Result<Self, CostflowError> {
        let inventory = state
            .inventory
            .clone()
            .ok_or_else(|| missing_input(StageName::Report, "inventory"))?;
        let cost_data = state
            .cost_data
            .clone()
            .ok_or_else(|| missing_input(StageName::Report, "cost_data"))?;
        let recommendations = state
            .recommendations
            .clone()
            .ok_or_else(|| missing_input(StageName::Report, "recommendations"))?;

        let summary = CostSummary::compute(
            Some(&cost_data),
            Some(recommendations.as_slice()),
            &config.currency,
        );

        let mut cost_by_kind: BTreeMap<String, Money> = BTreeMap::new();
        let mut high_cost_resources = Vec::new();
        for resource in &inventory {
            let Some(entry) = cost_data.get(&resource.id) else {
                continue;
            };
            let slot = cost_by_kind
                .entry(resource.kind.to_string())
                .or_insert_with(|| Money::zero(config.currency.clone()));
            *slot = slot.checked_add(&entry.monthly_cost)?;

            if entry.monthly_cost.minor_units >= config.report.high_cost_threshold_minor {
                high_cost_resources.push(ResourceCost {
                    resource_id: resource.id.clone(),
                    name: resource.name.clone(),
                    kind: resource.kind,
                    monthly_cost: entry.monthly_cost.clone(),
                });
            }
        }
        high_cost_resources.sort_by(|a, b| {
            b.monthly_cost
                .minor_units
                .cmp(&a.monthly_cost.minor_units)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });

        let quick_wins = recommendations
            .iter()
            .filter(|rec| rec.is_quick_win())
            .take(config.report.top_n)
            .cloned()
            .collect();

        Ok(Self {
            run_id: state.run_id.clone(),
            generated_at: Utc::now(),
            summary,
            cost_by_kind,
            high_cost_resources,
            quick_wins,
            inventory,
            cost_data,
            recommendations,
            stage_history: state.stage_history().to_vec(),
        })
    }
}

/// Assembles the report payload and hands it to the report sink.
///
/// Sink calls are not cached; sinks are expected to overwrite by run id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportStage;

#[async_trait]
impl Stage for ReportStage {
    fn name(&self) -> StageName {
        StageName::Report
    }

    async fn execute(
        &self,
        state: &PipelineState,
        ctx: &StageContext,
    ) -> Result<StageOutput, CostflowError> {
        let payload = ReportPayload::build(state, ctx.config())?;
        let receipt = ctx.ports().sink.emit(&payload).await?;

        tracing::info!(
            run_id = %payload.run_id,
            locations = receipt.locations.len(),
            total_cost = %payload.summary.total_cost,
            potential_savings = %payload.summary.total_potential_savings,
            "Report emitted"
        );
        Ok(StageOutput::Report(receipt))
    }
}
