//! Heuristic recommendation generator.

use async_trait::async_trait;

use crate::config::OptimizeConfig;
use crate::core::{
    ActionKind, Candidate, CostEntry, Effort, Level, Money, Resource, ResourceKind, Risk,
};
use crate::errors::CostflowError;
use crate::stages::RecommendationGenerator;

/// Environments considered safe to stop outside working hours.
const NON_PRODUCTION: &[&str] = &["dev", "development", "test", "qa", "staging", "sandbox"];

/// Environments eligible for reservations.
const PRODUCTION: &[&str] = &["prod", "production"];

/// Thresholds and savings ratios of the built-in rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleThresholds {
    /// Minimum monthly cost, in minor units, before a reservation is proposed.
    pub reserve_min_minor: i64,
    /// Share of cost saved by a reservation, in permille.
    pub reserve_permille: i64,
    /// Share of cost saved by stopping a non-production VM off-hours.
    pub deallocate_permille: i64,
    /// vCPU count at or above which a VM counts as oversized.
    pub oversized_vcpus: u32,
    /// Share of cost saved by halving an oversized VM.
    pub resize_permille: i64,
    /// Share of cost saved by moving premium storage to standard.
    pub migrate_permille: i64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            reserve_min_minor: 5_000,
            reserve_permille: 300,
            deallocate_permille: 600,
            oversized_vcpus: 16,
            resize_permille: 500,
            migrate_permille: 400,
        }
    }
}

/// Proposes candidates from resource metadata and its monthly cost.
///
/// Rules:
/// - production VMs above a cost floor: reserve
/// - non-production VMs: deallocate off-hours
/// - VMs with a large vCPU count: resize down
/// - premium disks and storage accounts: migrate to a standard tier
/// - any resource missing a required tag: retag (no direct savings)
#[derive(Debug, Clone)]
pub struct RuleBasedGenerator {
    required_tags: Vec<String>,
    thresholds: RuleThresholds,
}

impl RuleBasedGenerator {
    /// Creates a generator checking for `required_tags`.
    #[must_use]
    pub fn new(required_tags: Vec<String>) -> Self {
        Self {
            required_tags,
            thresholds: RuleThresholds::default(),
        }
    }

    /// Creates a generator from the optimize settings.
    #[must_use]
    pub fn from_config(config: &OptimizeConfig) -> Self {
        Self::new(config.required_tags.clone())
    }

    /// Overrides the rule thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: RuleThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Applies every rule to one resource.
    #[must_use]
    pub fn evaluate(&self, resource: &Resource, cost: &CostEntry) -> Vec<Candidate> {
        let monthly = &cost.monthly_cost;
        let t = &self.thresholds;
        let mut out = Vec::new();

        if resource.kind == ResourceKind::VirtualMachine {
            let env = environment(resource);
            if env.as_deref().is_some_and(|e| PRODUCTION.contains(&e))
                && monthly.minor_units >= t.reserve_min_minor
            {
                out.push(candidate(
                    resource,
                    ActionKind::Reserve,
                    monthly.scaled_permille(t.reserve_permille),
                    (Level::Medium, Level::Low),
                    format!(
                        "{} runs steadily in production; a 1-year reservation covers it",
                        resource.name
                    ),
                ));
            }
            if env.as_deref().is_some_and(|e| NON_PRODUCTION.contains(&e)) {
                out.push(candidate(
                    resource,
                    ActionKind::Deallocate,
                    monthly.scaled_permille(t.deallocate_permille),
                    (Level::Low, Level::Medium),
                    format!("{} is non-production; stop it outside working hours", resource.name),
                ));
            }
            if sku_vcpus(&resource.sku).is_some_and(|n| n >= t.oversized_vcpus) {
                out.push(candidate(
                    resource,
                    ActionKind::Resize,
                    monthly.scaled_permille(t.resize_permille),
                    (Level::Medium, Level::Medium),
                    format!(
                        "{} ({}) is oversized; halve its vCPU count",
                        resource.name, resource.sku
                    ),
                ));
            }
        }

        if matches!(resource.kind, ResourceKind::Disk | ResourceKind::StorageAccount)
            && resource.sku.to_ascii_lowercase().contains("premium")
        {
            out.push(candidate(
                resource,
                ActionKind::MigrateTier,
                monthly.scaled_permille(t.migrate_permille),
                (Level::Low, Level::Low),
                format!(
                    "{} uses {}; standard tier fits its access pattern",
                    resource.name, resource.sku
                ),
            ));
        }

        let missing: Vec<&str> = self
            .required_tags
            .iter()
            .filter(|tag| resource.tag(tag).map_or(true, |v| v.trim().is_empty()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            out.push(candidate(
                resource,
                ActionKind::Retag,
                Money::zero(monthly.currency.clone()),
                (Level::Low, Level::Low),
                format!("{} is missing tags: {}", resource.name, missing.join(", ")),
            ));
        }

        out
    }
}

#[async_trait]
impl RecommendationGenerator for RuleBasedGenerator {
    async fn generate(
        &self,
        resource: &Resource,
        cost: &CostEntry,
    ) -> Result<Vec<Candidate>, CostflowError> {
        Ok(self.evaluate(resource, cost))
    }
}

fn environment(resource: &Resource) -> Option<String> {
    resource
        .tag("environment")
        .or_else(|| resource.tag("env"))
        .map(|e| e.trim().to_ascii_lowercase())
}

fn candidate(
    resource: &Resource,
    action: ActionKind,
    estimated_savings: Money,
    (effort, risk): (Effort, Risk),
    rationale: String,
) -> Candidate {
    Candidate {
        resource_id: resource.id.clone(),
        action,
        estimated_savings,
        effort,
        risk,
        rationale,
    }
}

/// vCPU count encoded in an Azure-style SKU, e.g. `Standard_D16s_v3` -> 16.
fn sku_vcpus(sku: &str) -> Option<u32> {
    let size = sku.split('_').nth(1)?;
    let digits: String = size
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use pretty_assertions::assert_eq;

    fn generator() -> RuleBasedGenerator {
        RuleBasedGenerator::new(vec!["environment".into(), "owner".into()])
    }

    fn actions(candidates: &[Candidate]) -> Vec<ActionKind> {
        candidates.iter().map(|c| c.action).collect()
    }

    #[test]
    fn test_sku_vcpus() {
        assert_eq!(sku_vcpus("Standard_D16s_v3"), Some(16));
        assert_eq!(sku_vcpus("Standard_B2ms"), Some(2));
        assert_eq!(sku_vcpus("Premium_LRS"), None);
        assert_eq!(sku_vcpus("standard"), None);
    }

    #[test]
    fn test_production_vm_gets_reservation() {
        let vm = fixtures::vm("vm-1").with_tag("owner", "team-a");

        let out = generator().evaluate(&vm, &fixtures::cost("vm-1", 200));

        assert_eq!(actions(&out), vec![ActionKind::Reserve]);
        assert_eq!(out[0].estimated_savings, Money::from_major(60, "USD"));
    }

    #[test]
    fn test_cheap_production_vm_not_reserved() {
        let vm = fixtures::vm("vm-1").with_tag("owner", "team-a");

        let out = generator().evaluate(&vm, &fixtures::cost("vm-1", 20));

        assert!(out.is_empty());
    }

    #[test]
    fn test_dev_vm_deallocated_and_oversized_resized() {
        let vm = Resource::new(
            "vm-2",
            "build",
            ResourceKind::VirtualMachine,
            "eastus",
            "Standard_D32s_v5",
            "rg-ci",
        )
        .with_tag("env", "Dev")
        .with_tag("environment", "dev")
        .with_tag("owner", "ci");

        let out = generator().evaluate(&vm, &fixtures::cost("vm-2", 1000));

        assert_eq!(actions(&out), vec![ActionKind::Deallocate, ActionKind::Resize]);
        assert_eq!(out[0].estimated_savings, Money::from_major(600, "USD"));
        assert_eq!(out[1].estimated_savings, Money::from_major(500, "USD"));
    }

    #[test]
    fn test_premium_disk_migrates_and_missing_tags_reported() {
        let disk =
            Resource::new("disk-1", "data", ResourceKind::Disk, "eastus", "Premium_LRS", "rg-data");

        let out = generator().evaluate(&disk, &fixtures::cost("disk-1", 50));

        assert_eq!(actions(&out), vec![ActionKind::MigrateTier, ActionKind::Retag]);
        assert_eq!(out[0].estimated_savings, Money::from_major(20, "USD"));
        assert!(out[1].estimated_savings.is_zero());
        assert_eq!(out[1].rationale, "data is missing tags: environment, owner");
    }

    #[tokio::test]
    async fn test_generate_delegates_to_rules() {
        let vm = fixtures::vm("vm-1");

        let out = generator().generate(&vm, &fixtures::cost("vm-1", 200)).await.unwrap();

        assert_eq!(actions(&out), vec![ActionKind::Reserve, ActionKind::Retag]);
    }
}
