//! Typed stage outputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CostEntry, Recommendation, Resource, StageName};

/// Locations written by a report sink.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportReceipt {
    /// Where the report was delivered (paths, URIs, object keys).
    pub locations: Vec<String>,
}

impl ReportReceipt {
    /// Creates a receipt for the given locations.
    #[must_use]
    pub fn new(locations: Vec<String>) -> Self {
        Self { locations }
    }
}

/// The field a stage populates on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "value", rename_all = "snake_case")]
pub enum StageOutput {
    /// Scan output.
    Inventory(Vec<Resource>),
    /// Analyze output.
    CostData(BTreeMap<String, CostEntry>),
    /// Optimize output, already ranked.
    Recommendations(Vec<Recommendation>),
    /// Report output.
    Report(ReportReceipt),
}

impl StageOutput {
    /// The stage that owns this output field.
    #[must_use]
    pub fn owner(&self) -> StageName {
        match self {
            Self::Inventory(_) => StageName::Scan,
            Self::CostData(_) => StageName::Analyze,
            Self::Recommendations(_) => StageName::Optimize,
            Self::Report(_) => StageName::Report,
        }
    }

    /// Number of items produced, for logging.
    #[must_use]
    pub fn item_count(&self) -> usize {
        match self {
            Self::Inventory(v) => v.len(),
            Self::CostData(m) => m.len(),
            Self::Recommendations(v) => v.len(),
            Self::Report(r) => r.locations.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_owner() {
        assert_eq!(StageOutput::Inventory(Vec::new()).owner(), StageName::Scan);
        assert_eq!(StageOutput::CostData(BTreeMap::new()).owner(), StageName::Analyze);
        assert_eq!(StageOutput::Recommendations(Vec::new()).owner(), StageName::Optimize);
        assert_eq!(StageOutput::Report(ReportReceipt::default()).owner(), StageName::Report);
    }

    #[test]
    fn test_item_count() {
        let receipt = ReportReceipt::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(StageOutput::Report(receipt).item_count(), 2);
    }
}
