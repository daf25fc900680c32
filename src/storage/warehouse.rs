//! Warehouse-backed implementations of the collaborator interfaces the
//! report core consumes. Each wraps the shared [`Database`] and does its row
//! coercion inside the connection call, so the core only ever sees
//! normalized, explicitly typed values.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::record::MetricRecord;
use crate::source::{
    CompetitorRegistry, EntityDirectory, EntityRef, MetricRecordSource, TrafficSource,
};
use crate::storage::{repository, Database};

/// Metric records served from `fact_metric_records`.
pub struct WarehouseRecordSource {
    db: Database,
}

impl WarehouseRecordSource {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetricRecordSource for WarehouseRecordSource {
    async fn fetch(
        &self,
        entity_id: &str,
        scope: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MetricRecord>> {
        let id = entity_id.to_string();
        let scope = scope.to_string();
        let rows = self
            .db
            .reader()
            .call(move |conn| {
                if !repository::entity_exists(conn, &id)? {
                    return Ok(None);
                }
                let records = repository::fetch_records(conn, &id, &scope, start, end)?;
                Ok::<Option<Vec<MetricRecord>>, rusqlite::Error>(Some(records))
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match rows {
            Some(records) => Ok(records),
            None => Err(Error::EntityNotFound(format!("entity {entity_id} unknown"))),
        }
    }
}

/// Display names and impact weights served from the query and source
/// dimension tables. Topics have no dimension table; their key is already
/// the label, so unknown keys resolve to themselves.
pub struct WarehouseDirectory {
    db: Database,
}

impl WarehouseDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EntityDirectory for WarehouseDirectory {
    async fn resolve_name(&self, group_key: &str) -> Result<String> {
        let key = group_key.to_string();
        self.db
            .reader()
            .call(move |conn| {
                if let Some(text) = repository::get_query_text(conn, &key)? {
                    return Ok(text);
                }
                if let Some(name) = repository::get_source_display_name(conn, &key)? {
                    return Ok(name);
                }
                Ok::<String, rusqlite::Error>(key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn impact_score(&self, source_domain: &str) -> Result<Option<f64>> {
        let domain = source_domain.to_string();
        self.db
            .reader()
            .call(move |conn| repository::get_impact_score(conn, &domain))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Brand and competitor lookups served from `dim_entities`.
pub struct WarehouseRegistry {
    db: Database,
}

impl WarehouseRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CompetitorRegistry for WarehouseRegistry {
    async fn get_entity(&self, entity_id: &str) -> Result<EntityRef> {
        let id = entity_id.to_string();
        let entity = self
            .db
            .reader()
            .call(move |conn| repository::get_entity(conn, &id))
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        entity.ok_or_else(|| Error::EntityNotFound(format!("entity {entity_id} unknown")))
    }

    async fn list_competitors(&self, brand_id: &str) -> Result<Vec<EntityRef>> {
        let brand_id = brand_id.to_string();
        self.db
            .reader()
            .call(move |conn| repository::list_competitors(conn, &brand_id))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Session counts served from `fact_traffic_days`.
pub struct WarehouseTraffic {
    db: Database,
}

impl WarehouseTraffic {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TrafficSource for WarehouseTraffic {
    async fn sessions(
        &self,
        entity_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<f64>> {
        let entity_id = entity_id.to_string();
        self.db
            .reader()
            .call(move |conn| repository::sum_sessions(conn, &entity_id, start, end))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn seeded_db() -> Database {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_brand(conn, "brand-1", "Our Brand", None, "default")?;
                repository::upsert_query(conn, "q1", "best running shoes")?;
                repository::upsert_source(conn, "example.com", Some("Example"), Some(80.0))?;
                let record = MetricRecord {
                    entity_id: "brand-1".to_string(),
                    query_id: "q1".to_string(),
                    topic: "general".to_string(),
                    source_domain: "example.com".to_string(),
                    collector_type: "assistant_a".to_string(),
                    // Out of range on purpose; the boundary must clamp it.
                    visibility_index: 1.4,
                    share_of_answer: 20.0,
                    sentiment_score: 0.3,
                    has_brand_presence: true,
                    first_position: Some(3),
                    positions: vec![3],
                    recorded_at: d(2025, 6, 15),
                };
                repository::insert_record(conn, &record, "default")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_fetch_normalizes_rows() {
        let db = seeded_db().await;
        let source = WarehouseRecordSource::new(db);
        let records = source
            .fetch("brand-1", "default", d(2025, 6, 1), d(2025, 6, 30))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].visibility_index, 1.0);
    }

    #[tokio::test]
    async fn test_fetch_unknown_entity_is_not_found() {
        let db = seeded_db().await;
        let source = WarehouseRecordSource::new(db);
        let result = source
            .fetch("ghost", "default", d(2025, 6, 1), d(2025, 6, 30))
            .await;
        assert!(matches!(result, Err(Error::EntityNotFound(_))));
    }

    #[tokio::test]
    async fn test_fetch_empty_range_is_ok() {
        let db = seeded_db().await;
        let source = WarehouseRecordSource::new(db);
        let records = source
            .fetch("brand-1", "default", d(2024, 1, 1), d(2024, 1, 31))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_directory_resolution_order() {
        let db = seeded_db().await;
        let directory = WarehouseDirectory::new(db);
        assert_eq!(
            directory.resolve_name("q1").await.unwrap(),
            "best running shoes"
        );
        assert_eq!(directory.resolve_name("example.com").await.unwrap(), "Example");
        // Topics resolve to themselves.
        assert_eq!(directory.resolve_name("general").await.unwrap(), "general");
        assert_eq!(
            directory.impact_score("example.com").await.unwrap(),
            Some(80.0)
        );
        assert_eq!(directory.impact_score("nowhere.net").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_registry_entity_lookup() {
        let db = seeded_db().await;
        let registry = WarehouseRegistry::new(db);
        let brand = registry.get_entity("brand-1").await.unwrap();
        assert_eq!(brand.name, "Our Brand");
        assert!(matches!(
            registry.get_entity("ghost").await,
            Err(Error::EntityNotFound(_))
        ));
    }
}
