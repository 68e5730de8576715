//! Deterministic ranking of optimization candidates.
//!
//! `priority_score = savings * impact_weight(effort) * (1 - risk_penalty(risk))`
//!
//! Ordering is total: score descending, then raw savings descending, then
//! resource id ascending, then action kind.

use std::cmp::Ordering;

use crate::core::{Candidate, Effort, Level, Recommendation, Risk};

/// Weight applied for implementation effort. Decreases from low to high.
#[must_use]
pub fn impact_weight(effort: Effort) -> f64 {
    match effort {
        Level::Low => 1.0,
        Level::Medium => 0.75,
        Level::High => 0.5,
    }
}

/// Penalty applied for risk, in `[0, 1)`. Increases from low to high.
#[must_use]
pub fn risk_penalty(risk: Risk) -> f64 {
    match risk {
        Level::Low => 0.0,
        Level::Medium => 0.25,
        Level::High => 0.5,
    }
}

/// Scores and orders candidates. Stateless; inputs are only borrowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendationRanker;

impl RecommendationRanker {
    /// Creates a ranker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Score for a candidate whose savings are already sanitised.
    #[must_use]
    pub fn score(candidate: &Candidate) -> f64 {
        candidate.estimated_savings.as_major()
            * impact_weight(candidate.effort)
            * (1.0 - risk_penalty(candidate.risk))
    }

    /// Returns a new, descending-sorted list of recommendations.
    ///
    /// Negative savings are clamped to zero.
    #[must_use]
    pub fn rank(&self, candidates: &[Candidate]) -> Vec<Recommendation> {
        let mut ranked: Vec<Recommendation> = candidates
            .iter()
            .map(|candidate| {
                let sanitized = sanitize(candidate);
                let priority_score = Self::score(&sanitized);
                Recommendation {
                    resource_id: sanitized.resource_id,
                    action: sanitized.action,
                    estimated_savings: sanitized.estimated_savings,
                    effort: sanitized.effort,
                    risk: sanitized.risk,
                    rationale: sanitized.rationale,
                    priority_score,
                }
            })
            .collect();

        ranked.sort_by(compare);
        ranked
    }
}

fn sanitize(candidate: &Candidate) -> Candidate {
    let mut out = candidate.clone();
    if candidate.estimated_savings.minor_units < 0 {
        tracing::debug!(
            resource_id = %candidate.resource_id,
            action = %candidate.action,
            savings = candidate.estimated_savings.minor_units,
            "Clamping negative candidate savings"
        );
        out.estimated_savings = candidate.estimated_savings.clamp_to(i64::MAX);
    }
    out
}

fn compare(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then_with(|| {
            b.estimated_savings
                .minor_units
                .cmp(&a.estimated_savings.minor_units)
        })
        .then_with(|| a.resource_id.cmp(&b.resource_id))
        .then_with(|| a.action.cmp(&b.action))
}
