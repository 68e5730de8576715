//! Stage trait and the four pipeline stages.
//!
//! A stage reads the fields its predecessors wrote, calls external ports
//! through the run's cache, and returns a typed `StageOutput`. Stages never
//! retry on their own and never touch `stage_history`.

mod analyze;
mod optimize;
mod ports;
mod report;
mod scan;

pub use analyze::AnalyzeStage;
pub use optimize::OptimizeStage;
pub use ports::{CostProvider, InventoryProvider, RecommendationGenerator, ReportSink, StagePorts};
pub use report::{ReportPayload, ReportStage, ResourceCost};
pub use scan::ScanStage;

#[cfg(test)]
pub use ports::{
    MockCostProvider, MockInventoryProvider, MockRecommendationGenerator, MockReportSink,
};

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::config::CostflowConfig;
use crate::core::{StageName, StageOutput};
use crate::errors::{CostflowError, PipelineStateError};
use crate::pipeline::{PipelineState, ResultCache};

/// Shared, read-only inputs available to every stage of a run.
#[derive(Debug, Clone)]
pub struct StageContext {
    ports: StagePorts,
    cache: Arc<ResultCache>,
    config: Arc<CostflowConfig>,
}

impl StageContext {
    /// Creates a context.
    #[must_use]
    pub fn new(ports: StagePorts, cache: Arc<ResultCache>, config: Arc<CostflowConfig>) -> Self {
        Self {
            ports,
            cache,
            config,
        }
    }

    /// External collaborators.
    #[must_use]
    pub fn ports(&self) -> &StagePorts {
        &self.ports
    }

    /// The run's result cache.
    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &CostflowConfig {
        &self.config
    }
}

/// One pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Which of the four stages this implements.
    fn name(&self) -> StageName;

    /// Runs the stage against `state`. Called once per executor attempt.
    async fn execute(
        &self,
        state: &PipelineState,
        ctx: &StageContext,
    ) -> Result<StageOutput, CostflowError>;
}

/// The standard implementation of every stage, in execution order.
#[must_use]
pub fn default_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(ScanStage),
        Arc::new(AnalyzeStage),
        Arc::new(OptimizeStage),
        Arc::new(ReportStage),
    ]
}

/// A stage backed by a synchronous closure.
pub struct FnStage<F>
where
    F: Fn(&PipelineState) -> Result<StageOutput, CostflowError> + Send + Sync,
{
    name: StageName,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&PipelineState) -> Result<StageOutput, CostflowError> + Send + Sync,
{
    /// Creates a closure-backed stage.
    pub fn new(name: StageName, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&PipelineState) -> Result<StageOutput, CostflowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&PipelineState) -> Result<StageOutput, CostflowError> + Send + Sync,
{
    fn name(&self) -> StageName {
        self.name
    }

    async fn execute(
        &self,
        state: &PipelineState,
        _ctx: &StageContext,
    ) -> Result<StageOutput, CostflowError> {
        (self.func)(state)
    }
}

pub(crate) fn missing_input(stage: StageName, field: &'static str) -> CostflowError {
    PipelineStateError::MissingInput { stage, field }.into()
}
