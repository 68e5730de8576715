//! Discovered cloud resources and their cost entries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Money;

/// Broad resource category used for breakdowns and heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute instance.
    VirtualMachine,
    /// Managed disk.
    Disk,
    /// Blob/file storage account.
    StorageAccount,
    /// Managed SQL database.
    SqlDatabase,
    /// Web app / app service plan.
    AppService,
    /// Public IP address.
    PublicIp,
    /// Anything else.
    #[serde(other)]
    Other,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::VirtualMachine => "virtual_machine",
            Self::Disk => "disk",
            Self::StorageAccount => "storage_account",
            Self::SqlDatabase => "sql_database",
            Self::AppService => "app_service",
            Self::PublicIp => "public_ip",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// A discovered cloud entity subject to cost attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Provider-assigned unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Resource category.
    pub kind: ResourceKind,
    /// Deployment region.
    pub region: String,
    /// Size or SKU.
    pub sku: String,
    /// Owning resource group.
    pub resource_group: String,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Resource {
    /// Creates a resource with no tags.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ResourceKind,
        region: impl Into<String>,
        sku: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            region: region.into(),
            sku: sku.into(),
            resource_group: resource_group.into(),
            tags: BTreeMap::new(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Returns a tag value.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Monthly cost attributed to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEntry {
    /// The resource this cost belongs to.
    pub resource_id: String,
    /// Total monthly cost.
    pub monthly_cost: Money,
    /// Cost by meter or category.
    #[serde(default)]
    pub breakdown: BTreeMap<String, Money>,
}

impl CostEntry {
    /// Creates a cost entry with an empty breakdown.
    #[must_use]
    pub fn new(resource_id: impl Into<String>, monthly_cost: Money) -> Self {
        Self {
            resource_id: resource_id.into(),
            monthly_cost,
            breakdown: BTreeMap::new(),
        }
    }

    /// Adds a breakdown line.
    #[must_use]
    pub fn with_meter(mut self, meter: impl Into<String>, amount: Money) -> Self {
        self.breakdown.insert(meter.into(), amount);
        self
    }
}

/// Scope passed to the inventory provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InventoryFilter {
    /// Subscription or account scope.
    pub subscription_id: String,
    /// Restrict to a single resource group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    /// Restrict to these kinds; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_kinds: Vec<ResourceKind>,
}

impl InventoryFilter {
    /// Creates a filter covering a whole subscription.
    #[must_use]
    pub fn subscription(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            ..Self::default()
        }
    }

    /// Restricts the filter to a resource group.
    #[must_use]
    pub fn with_resource_group(mut self, group: impl Into<String>) -> Self {
        self.resource_group = Some(group.into());
        self
    }

    /// Restricts the filter to a set of kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<ResourceKind>) -> Self {
        self.resource_kinds = kinds;
        self
    }

    /// Returns true if the resource falls inside this filter.
    #[must_use]
    pub fn matches(&self, resource: &Resource) -> bool {
        let group_ok = self
            .resource_group
            .as_deref()
            .map_or(true, |g| g.eq_ignore_ascii_case(&resource.resource_group));
        let kind_ok =
            self.resource_kinds.is_empty() || self.resource_kinds.contains(&resource.kind);
        group_ok && kind_ok
    }
}

/// Inclusive date range for cost queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// First day included.
    pub start: NaiveDate,
    /// Last day included.
    pub end: NaiveDate,
}

impl TimeWindow {
    /// The `days`-long window ending on `end`.
    #[must_use]
    pub fn trailing_days(days: u32, end: NaiveDate) -> Self {
        let start = end - chrono::Duration::days(i64::from(days.saturating_sub(1)));
        Self { start, end }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
