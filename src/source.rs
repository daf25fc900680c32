use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::MetricRecord;

/// A brand or competitor known to the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
}

/// Supplies raw measurement rows for an entity over a date range.
///
/// Implementations own validation and coercion: every returned record is
/// already normalized, so the aggregation core never branches on untyped or
/// out-of-range values. Timeouts and retries are the implementation's
/// responsibility, not the core's.
#[async_trait]
pub trait MetricRecordSource: Send + Sync {
    /// Fetch records for `entity_id` within the inclusive date range.
    ///
    /// An unknown entity is an `EntityNotFound` error. A known entity with no
    /// records in range returns an empty vec — cold-start entities are a
    /// legitimate input, not a failure.
    async fn fetch(
        &self,
        entity_id: &str,
        scope: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MetricRecord>>;
}

/// Resolves mover group keys to display labels and citation sources to
/// authority weights.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Human-readable label for a group key (query id, topic, or source
    /// domain). Callers fall back to the raw key when this fails.
    async fn resolve_name(&self, group_key: &str) -> Result<String>;

    /// Externally supplied authority weight of a citation source, if one is
    /// known for the domain.
    async fn impact_score(&self, source_domain: &str) -> Result<Option<f64>>;
}

/// Knows which competitors are tracked against each brand.
#[async_trait]
pub trait CompetitorRegistry: Send + Sync {
    /// Resolve an entity. `EntityNotFound` when unknown — for brand ids this
    /// is the hard precondition that aborts a report run.
    async fn get_entity(&self, entity_id: &str) -> Result<EntityRef>;

    /// Tracked competitors for a brand, in registry order.
    async fn list_competitors(&self, brand_id: &str) -> Result<Vec<EntityRef>>;
}

/// Optional collaborator supplying site-traffic session counts. Reports only
/// carry a traffic section when an implementation is wired in and has data
/// for the requested range.
#[async_trait]
pub trait TrafficSource: Send + Sync {
    /// Total sessions for the entity over the inclusive date range, or `None`
    /// when no traffic data exists for it.
    async fn sessions(
        &self,
        entity_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<f64>>;
}
