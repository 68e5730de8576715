//! Optimization candidates and ranked recommendations.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Money;

/// The kind of optimization proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Change to a smaller size/SKU.
    Resize,
    /// Buy a reservation or savings plan.
    Reserve,
    /// Stop or schedule the resource off.
    Deallocate,
    /// Move to a cheaper tier.
    MigrateTier,
    /// Fix tagging for cost allocation.
    Retag,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resize => "resize",
            Self::Reserve => "reserve",
            Self::Deallocate => "deallocate",
            Self::MigrateTier => "migrate-tier",
            Self::Retag => "retag",
        };
        f.write_str(s)
    }
}

/// Low/medium/high ordinal shared by effort and risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Implementation effort.
pub type Effort = Level;

/// Implementation risk.
pub type Risk = Level;

/// An unranked optimization suggestion from the recommendation generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Target resource id.
    pub resource_id: String,
    /// Proposed action.
    pub action: ActionKind,
    /// Estimated monthly savings.
    pub estimated_savings: Money,
    /// Implementation effort.
    pub effort: Effort,
    /// Implementation risk.
    pub risk: Risk,
    /// Free-form explanation supplied by the generator.
    pub rationale: String,
}

/// A ranked, scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Target resource id.
    pub resource_id: String,
    /// Proposed action.
    pub action: ActionKind,
    /// Estimated monthly savings, after sanitising.
    pub estimated_savings: Money,
    /// Implementation effort.
    pub effort: Effort,
    /// Implementation risk.
    pub risk: Risk,
    /// Free-form explanation supplied by the generator.
    pub rationale: String,
    /// Score computed once by the ranker.
    pub priority_score: f64,
}

impl Recommendation {
    /// Returns true for low-effort, low-risk recommendations.
    #[must_use]
    pub fn is_quick_win(&self) -> bool {
        self.effort == Level::Low && self.risk == Level::Low && !self.estimated_savings.is_zero()
    }
}
