use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::date_util::{date_key, parse_date_key};
use crate::record::MetricRecord;
use crate::source::EntityRef;

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Entities ───────────────────────────────────────────────────────

pub fn upsert_brand(
    conn: &Connection,
    entity_id: &str,
    name: &str,
    website_url: Option<&str>,
    scope: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO dim_entities (entity_id, name, kind, website_url, customer_scope, cached_at)
         VALUES (?1, ?2, 'brand', ?3, ?4, datetime('now'))
         ON CONFLICT(entity_id) DO UPDATE SET
           name = excluded.name,
           website_url = COALESCE(excluded.website_url, dim_entities.website_url),
           customer_scope = excluded.customer_scope,
           cached_at = excluded.cached_at",
        params![entity_id, name, website_url, scope],
    )?;
    Ok(())
}

pub fn upsert_competitor(
    conn: &Connection,
    brand_id: &str,
    entity_id: &str,
    name: &str,
    website_url: Option<&str>,
    scope: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO dim_entities
           (entity_id, name, kind, parent_brand_id, website_url, customer_scope, cached_at)
         VALUES (?1, ?2, 'competitor', ?3, ?4, ?5, datetime('now'))
         ON CONFLICT(entity_id) DO UPDATE SET
           name = excluded.name,
           parent_brand_id = excluded.parent_brand_id,
           website_url = COALESCE(excluded.website_url, dim_entities.website_url),
           customer_scope = excluded.customer_scope,
           cached_at = excluded.cached_at",
        params![entity_id, name, brand_id, website_url, scope],
    )?;
    Ok(())
}

pub fn remove_competitor(conn: &Connection, entity_id: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "DELETE FROM dim_entities WHERE entity_id = ?1 AND kind = 'competitor'",
        params![entity_id],
    )?;
    Ok(n > 0)
}

pub fn get_entity(
    conn: &Connection,
    entity_id: &str,
) -> Result<Option<EntityRef>, rusqlite::Error> {
    conn.query_row(
        "SELECT entity_id, name, website_url FROM dim_entities WHERE entity_id = ?1",
        params![entity_id],
        |row| {
            Ok(EntityRef {
                entity_id: row.get(0)?,
                name: row.get(1)?,
                website_url: row.get(2)?,
            })
        },
    )
    .optional()
}

pub fn entity_exists(conn: &Connection, entity_id: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM dim_entities WHERE entity_id = ?1",
        params![entity_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Tracked competitors for a brand, name order for stable output.
pub fn list_competitors(
    conn: &Connection,
    brand_id: &str,
) -> Result<Vec<EntityRef>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, name, website_url FROM dim_entities
         WHERE kind = 'competitor' AND parent_brand_id = ?1
         ORDER BY name",
    )?;
    let rows = stmt.query_map(params![brand_id], |row| {
        Ok(EntityRef {
            entity_id: row.get(0)?,
            name: row.get(1)?,
            website_url: row.get(2)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Query and source dimensions ────────────────────────────────────

pub fn upsert_query(
    conn: &Connection,
    query_id: &str,
    text: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO dim_queries (query_id, text, cached_at)
         VALUES (?1, ?2, datetime('now'))",
        params![query_id, text],
    )?;
    Ok(())
}

pub fn get_query_text(
    conn: &Connection,
    query_id: &str,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT text FROM dim_queries WHERE query_id = ?1",
        params![query_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn upsert_source(
    conn: &Connection,
    source_domain: &str,
    display_name: Option<&str>,
    impact_score: Option<f64>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO dim_sources (source_domain, display_name, impact_score, cached_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(source_domain) DO UPDATE SET
           display_name = COALESCE(excluded.display_name, dim_sources.display_name),
           impact_score = COALESCE(excluded.impact_score, dim_sources.impact_score),
           cached_at = excluded.cached_at",
        params![source_domain, display_name, impact_score],
    )?;
    Ok(())
}

pub fn get_source_display_name(
    conn: &Connection,
    source_domain: &str,
) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT display_name FROM dim_sources WHERE source_domain = ?1",
        params![source_domain],
        |row| row.get(0),
    )
    .optional()
    .map(Option::flatten)
}

pub fn get_impact_score(
    conn: &Connection,
    source_domain: &str,
) -> Result<Option<f64>, rusqlite::Error> {
    conn.query_row(
        "SELECT impact_score FROM dim_sources WHERE source_domain = ?1",
        params![source_domain],
        |row| row.get(0),
    )
    .optional()
    .map(Option::flatten)
}

// ── Metric records ─────────────────────────────────────────────────

pub fn insert_record(
    conn: &Connection,
    record: &MetricRecord,
    scope: &str,
) -> Result<(), rusqlite::Error> {
    let positions = serde_json::to_string(&record.positions).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO fact_metric_records (
            entity_id, customer_scope, query_id, topic, source_domain, collector_type,
            visibility_index, share_of_answer, sentiment_score, has_brand_presence,
            first_position, positions, date_key
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            record.entity_id,
            scope,
            record.query_id,
            record.topic,
            record.source_domain,
            record.collector_type,
            record.visibility_index,
            record.share_of_answer,
            record.sentiment_score,
            record.has_brand_presence as i64,
            record.first_position,
            positions,
            date_key(record.recorded_at),
        ],
    )?;
    Ok(())
}

/// Records for an entity within the inclusive date range. Rows are coerced
/// into [`MetricRecord`] here — position lists come back from their JSON
/// column and every record is normalized before the core sees it.
pub fn fetch_records(
    conn: &Connection,
    entity_id: &str,
    scope: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<MetricRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, query_id, topic, source_domain, collector_type,
                visibility_index, share_of_answer, sentiment_score, has_brand_presence,
                first_position, positions, date_key
         FROM fact_metric_records
         WHERE entity_id = ?1 AND customer_scope = ?2
           AND date_key >= ?3 AND date_key <= ?4
         ORDER BY record_id",
    )?;
    let rows = stmt.query_map(
        params![entity_id, scope, date_key(start), date_key(end)],
        |row| {
            let positions_json: String = row.get(10)?;
            let date_str: String = row.get(11)?;
            Ok((
                MetricRecord {
                    entity_id: row.get(0)?,
                    query_id: row.get(1)?,
                    topic: row.get(2)?,
                    source_domain: row.get(3)?,
                    collector_type: row.get(4)?,
                    visibility_index: row.get(5)?,
                    share_of_answer: row.get(6)?,
                    sentiment_score: row.get(7)?,
                    has_brand_presence: row.get::<_, i64>(8)? != 0,
                    first_position: row.get(9)?,
                    positions: serde_json::from_str(&positions_json).unwrap_or_default(),
                    recorded_at: NaiveDate::default(),
                },
                date_str,
            ))
        },
    )?;

    Ok(rows
        .filter_map(|r| r.ok())
        .filter_map(|(mut record, date_str)| {
            record.recorded_at = parse_date_key(&date_str)?;
            Some(record.normalize())
        })
        .collect())
}

pub fn count_records(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.query_row("SELECT COUNT(*) FROM fact_metric_records", [], |row| {
        row.get(0)
    })
}

// ── Traffic ────────────────────────────────────────────────────────

pub fn upsert_traffic_day(
    conn: &Connection,
    entity_id: &str,
    day: NaiveDate,
    sessions: i64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO fact_traffic_days (entity_id, date_key, sessions)
         VALUES (?1, ?2, ?3)",
        params![entity_id, date_key(day), sessions],
    )?;
    Ok(())
}

/// Total sessions in range, or `None` when the entity has no traffic rows at
/// all in that range — absence of data and zero sessions are different
/// things for the trigger rules.
pub fn sum_sessions(
    conn: &Connection,
    entity_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Option<f64>, rusqlite::Error> {
    let (count, total): (i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*), SUM(sessions) FROM fact_traffic_days
         WHERE entity_id = ?1 AND date_key >= ?2 AND date_key <= ?3",
        params![entity_id, date_key(start), date_key(end)],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if count == 0 {
        Ok(None)
    } else {
        Ok(Some(total.unwrap_or(0.0)))
    }
}

// ── Reports ────────────────────────────────────────────────────────

/// A persisted report: the immutable snapshot plus its narrative.
#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub report_id: i64,
    pub brand_id: String,
    pub period_key: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub snapshot_json: String,
    pub narrative: String,
    pub generated_at: String,
}

#[allow(clippy::too_many_arguments)]
pub fn insert_report(
    conn: &Connection,
    brand_id: &str,
    period_key: &str,
    period_start: NaiveDate,
    period_end: NaiveDate,
    snapshot_json: &str,
    narrative: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_reports
           (brand_id, period_key, period_start, period_end, snapshot, narrative, generated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))",
        params![
            brand_id,
            period_key,
            date_key(period_start),
            date_key(period_end),
            snapshot_json,
            narrative
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_report(
    conn: &Connection,
    report_id: i64,
) -> Result<Option<StoredReport>, rusqlite::Error> {
    conn.query_row(
        "SELECT report_id, brand_id, period_key, period_start, period_end,
                snapshot, narrative, generated_at
         FROM fact_reports WHERE report_id = ?1",
        params![report_id],
        report_from_row,
    )
    .optional()
}

pub fn list_reports(
    conn: &Connection,
    brand_id: &str,
) -> Result<Vec<StoredReport>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT report_id, brand_id, period_key, period_start, period_end,
                snapshot, narrative, generated_at
         FROM fact_reports WHERE brand_id = ?1
         ORDER BY report_id DESC",
    )?;
    let rows = stmt.query_map(params![brand_id], report_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn report_from_row(row: &rusqlite::Row<'_>) -> Result<StoredReport, rusqlite::Error> {
    let start: String = row.get(3)?;
    let end: String = row.get(4)?;
    Ok(StoredReport {
        report_id: row.get(0)?,
        brand_id: row.get(1)?,
        period_key: row.get(2)?,
        period_start: parse_date_key(&start).unwrap_or_default(),
        period_end: parse_date_key(&end).unwrap_or_default(),
        snapshot_json: row.get(5)?,
        narrative: row.get(6)?,
        generated_at: row.get(7)?,
    })
}

pub fn count_reports(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.query_row("SELECT COUNT(*) FROM fact_reports", [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(day: NaiveDate) -> MetricRecord {
        MetricRecord {
            entity_id: "brand-1".to_string(),
            query_id: "q1".to_string(),
            topic: "general".to_string(),
            source_domain: "example.com".to_string(),
            collector_type: "assistant_a".to_string(),
            visibility_index: 0.5,
            share_of_answer: 20.0,
            sentiment_score: 0.3,
            has_brand_presence: true,
            first_position: Some(3),
            positions: vec![3, 5],
            recorded_at: day,
        }
    }

    #[tokio::test]
    async fn test_record_round_trip_honors_date_range() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                upsert_brand(conn, "brand-1", "Our Brand", None, "default")?;
                insert_record(conn, &record(d(2025, 6, 1)), "default")?;
                insert_record(conn, &record(d(2025, 6, 15)), "default")?;
                insert_record(conn, &record(d(2025, 7, 1)), "default")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let records = db
            .reader()
            .call(|conn| {
                fetch_records(conn, "brand-1", "default", d(2025, 6, 1), d(2025, 6, 30))
            })
            .await
            .unwrap();

        // Inclusive on both ends; the July row is out of range.
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].positions, vec![3, 5]);
        assert_eq!(records[0].recorded_at, d(2025, 6, 1));
        assert_eq!(records[0].first_position, Some(3));
    }

    #[tokio::test]
    async fn test_fetch_respects_scope() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                upsert_brand(conn, "brand-1", "Our Brand", None, "acme")?;
                insert_record(conn, &record(d(2025, 6, 1)), "acme")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let other_scope = db
            .reader()
            .call(|conn| {
                fetch_records(conn, "brand-1", "default", d(2025, 6, 1), d(2025, 6, 30))
            })
            .await
            .unwrap();
        assert!(other_scope.is_empty());
    }

    #[tokio::test]
    async fn test_competitor_listing_scoped_to_brand() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                upsert_brand(conn, "brand-1", "Our Brand", None, "default")?;
                upsert_brand(conn, "brand-2", "Other Brand", None, "default")?;
                upsert_competitor(conn, "brand-1", "comp-1", "Rival A", None, "default")?;
                upsert_competitor(conn, "brand-1", "comp-2", "Rival B", None, "default")?;
                upsert_competitor(conn, "brand-2", "comp-3", "Rival C", None, "default")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let competitors = db
            .reader()
            .call(|conn| list_competitors(conn, "brand-1"))
            .await
            .unwrap();
        let names: Vec<&str> = competitors.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Rival A", "Rival B"]);

        let removed = db
            .writer()
            .call(|conn| remove_competitor(conn, "comp-1"))
            .await
            .unwrap();
        assert!(removed);
    }

    #[tokio::test]
    async fn test_sum_sessions_distinguishes_absent_from_zero() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                upsert_brand(conn, "brand-1", "Our Brand", None, "default")?;
                upsert_traffic_day(conn, "brand-1", d(2025, 6, 1), 0)?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let (present, absent) = db
            .reader()
            .call(|conn| {
                let present = sum_sessions(conn, "brand-1", d(2025, 6, 1), d(2025, 6, 30))?;
                let absent = sum_sessions(conn, "brand-1", d(2025, 7, 1), d(2025, 7, 31))?;
                Ok::<_, rusqlite::Error>((present, absent))
            })
            .await
            .unwrap();
        assert_eq!(present, Some(0.0));
        assert_eq!(absent, None);
    }

    #[tokio::test]
    async fn test_report_round_trip() {
        let db = Database::open_memory().await.unwrap();
        let id = db
            .writer()
            .call(|conn| {
                upsert_brand(conn, "brand-1", "Our Brand", None, "default")?;
                insert_report(
                    conn,
                    "brand-1",
                    "30d:2025-06-30",
                    d(2025, 6, 1),
                    d(2025, 6, 30),
                    "{\"ok\":true}",
                    "Narrative text",
                )
            })
            .await
            .unwrap();

        let report = db
            .reader()
            .call(move |conn| get_report(conn, id))
            .await
            .unwrap()
            .expect("report should exist");
        assert_eq!(report.brand_id, "brand-1");
        assert_eq!(report.period_key, "30d:2025-06-30");
        assert_eq!(report.narrative, "Narrative text");

        let listed = db
            .reader()
            .call(|conn| list_reports(conn, "brand-1"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].report_id, id);
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                set_config(conn, "llm_provider", "bedrock")?;
                set_config(conn, "llm_provider", "anthropic")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let value = db
            .reader()
            .call(|conn| get_config(conn, "llm_provider"))
            .await
            .unwrap();
        assert_eq!(value, Some("anthropic".to_string()));
    }
}
