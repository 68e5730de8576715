//! Cost and savings totals derived from a run's outputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CostEntry, Money, Recommendation};

/// Totals computed purely from `cost_data` and `recommendations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    /// Sum of monthly costs.
    pub total_cost: Money,
    /// Sum of estimated savings over all recommendations.
    pub total_potential_savings: Money,
    /// Savings as a percentage of total cost; 0 when there is no cost.
    pub savings_percentage: f64,
    /// Resources with a cost entry.
    pub costed_resources: usize,
    /// Recommendations priced in the summary currency.
    pub recommendation_count: usize,
}

impl CostSummary {
    /// Computes totals. Amounts in a currency other than `currency` are skipped.
    #[must_use]
    pub fn compute(
        cost_data: Option<&BTreeMap<String, CostEntry>>,
        recommendations: Option<&[Recommendation]>,
        currency: &str,
    ) -> Self {
        let total_cost: i64 = cost_data
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|entry| entry.monthly_cost.currency == currency)
            .map(|entry| entry.monthly_cost.minor_units)
            .fold(0, i64::saturating_add);

        let counted: Vec<&Recommendation> = recommendations
            .unwrap_or_default()
            .iter()
            .filter(|rec| rec.estimated_savings.currency == currency)
            .collect();
        let total_savings: i64 = counted
            .iter()
            .map(|rec| rec.estimated_savings.minor_units)
            .fold(0, i64::saturating_add);

        #[allow(clippy::cast_precision_loss)]
        let savings_percentage = if total_cost > 0 {
            total_savings as f64 / total_cost as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_cost: Money::from_minor(total_cost, currency),
            total_potential_savings: Money::from_minor(total_savings, currency),
            savings_percentage,
            costed_resources: cost_data.map_or(0, BTreeMap::len),
            recommendation_count: counted.len(),
        }
    }
}
