//! Stage names, stage status and run phases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

/// One of the four ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Inventory discovery.
    Scan,
    /// Cost attribution.
    Analyze,
    /// Optimization-candidate generation and ranking.
    Optimize,
    /// Report assembly.
    Report,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [Self; 4] = [Self::Scan, Self::Analyze, Self::Optimize, Self::Report];

    /// Returns the stage that must succeed before this one may run.
    #[must_use]
    pub fn predecessor(self) -> Option<Self> {
        match self {
            Self::Scan => None,
            Self::Analyze => Some(Self::Scan),
            Self::Optimize => Some(Self::Analyze),
            Self::Report => Some(Self::Optimize),
        }
    }

    /// Returns the stage that follows this one.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Scan => Some(Self::Analyze),
            Self::Analyze => Some(Self::Optimize),
            Self::Optimize => Some(Self::Report),
            Self::Report => None,
        }
    }

    /// Returns the lowercase stage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Analyze => "analyze",
            Self::Optimize => "optimize",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == lower)
            .ok_or_else(|| {
                ValidationError::new(format!(
                    "unknown stage '{s}', expected scan, analyze, optimize or report"
                ))
                .with_field("stage")
            })
    }
}

/// Outcome of one stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed and its output field is populated.
    Success,
    /// Stage failed after its retry budget or on a fatal error.
    Failure,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Orchestrator state machine.
///
/// `Pending → Scanning → Analyzing → Optimizing → Reporting → Done`, with
/// `Failed` reachable from any in-progress phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// No stage has started.
    #[default]
    Pending,
    /// Scan is executing.
    Scanning,
    /// Analyze is executing.
    Analyzing,
    /// Optimize is executing.
    Optimizing,
    /// Report is executing.
    Reporting,
    /// All stages succeeded.
    Done,
    /// A stage failed; the run halted.
    Failed,
}

impl RunPhase {
    /// The in-progress phase owned by a stage.
    #[must_use]
    pub fn for_stage(stage: StageName) -> Self {
        match stage {
            StageName::Scan => Self::Scanning,
            StageName::Analyze => Self::Analyzing,
            StageName::Optimize => Self::Optimizing,
            StageName::Report => Self::Reporting,
        }
    }

    /// The stage owning this phase, if it is an in-progress phase.
    #[must_use]
    pub fn stage(self) -> Option<StageName> {
        match self {
            Self::Scanning => Some(StageName::Scan),
            Self::Analyzing => Some(StageName::Analyze),
            Self::Optimizing => Some(StageName::Optimize),
            Self::Reporting => Some(StageName::Report),
            Self::Pending | Self::Done | Self::Failed => None,
        }
    }

    /// The phase entered after the owning stage succeeds.
    #[must_use]
    pub fn advance(self) -> Self {
        match self {
            Self::Pending => Self::Scanning,
            Self::Scanning => Self::Analyzing,
            Self::Analyzing => Self::Optimizing,
            Self::Optimizing => Self::Reporting,
            Self::Reporting | Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Analyzing => "analyzing",
            Self::Optimizing => "optimizing",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_links() {
        assert_eq!(StageName::Scan.predecessor(), None);
        assert_eq!(StageName::Report.predecessor(), Some(StageName::Optimize));
        assert_eq!(StageName::Optimize.next(), Some(StageName::Report));
        assert_eq!(StageName::Report.next(), None);

        for pair in StageName::ALL.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert_eq!(pair[1].predecessor(), Some(pair[0]));
        }
    }

    #[test]
    fn test_stage_name_serialize() {
        let json = serde_json::to_string(&StageName::Analyze).unwrap();
        assert_eq!(json, r#""analyze""#);
        assert_eq!(StageName::Report.to_string(), "report");
    }

    #[test]
    fn test_stage_name_parse() {
        assert_eq!("analyze".parse::<StageName>().unwrap(), StageName::Analyze);
        assert_eq!("Scan".parse::<StageName>().unwrap(), StageName::Scan);
        let err = "deploy".parse::<StageName>().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("stage"));
    }

    #[test]
    fn test_run_phase_walk() {
        let mut phase = RunPhase::Pending;
        let mut seen = Vec::new();
        while !phase.is_terminal() {
            phase = phase.advance();
            seen.push(phase);
        }

        assert_eq!(
            seen,
            vec![
                RunPhase::Scanning,
                RunPhase::Analyzing,
                RunPhase::Optimizing,
                RunPhase::Reporting,
                RunPhase::Done,
            ]
        );
    }

    #[test]
    fn test_run_phase_stage_mapping() {
        for stage in StageName::ALL {
            assert_eq!(RunPhase::for_stage(stage).stage(), Some(stage));
        }
        assert_eq!(RunPhase::Failed.stage(), None);
        assert_eq!(RunPhase::Failed.advance(), RunPhase::Failed);
    }
}
