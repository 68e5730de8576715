//! Testing utilities for costflow pipelines.
//!
//! This module provides:
//! - Scripted in-memory ports
//! - Fixtures for resources, costs, candidates and stage contexts
//! - Assertions over stage history

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{assert_attempts, assert_clean_run, history_of};
pub use mocks::{
    FailureScript, MemoryReportSink, StaticCostProvider, StaticGenerator, StaticInventoryProvider,
};
