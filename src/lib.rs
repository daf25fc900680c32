pub mod date_util;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod period;
pub mod record;
pub mod report;
pub mod source;
pub mod storage;

pub use error::{Error, Result};
pub use metrics::{
    CompetitiveLandscapeEntry, Delta, Metric, MoverSet, PeriodSummary, ReportDataSnapshot,
    SummaryFact, TopMoverItem, TopMovers, TrendPoint, TrendSeries,
};
pub use period::ReportPeriod;
pub use record::MetricRecord;
pub use report::{ReportAssembler, ReportRequest};
pub use source::{
    CompetitorRegistry, EntityDirectory, EntityRef, MetricRecordSource, TrafficSource,
};
pub use storage::repository::StoredReport;
pub use storage::Database;

use std::sync::Arc;

use serde::Serialize;

use llm::narrative::{fallback_narrative, NarrativeGenerator};
use storage::repository;
use storage::warehouse::{
    WarehouseDirectory, WarehouseRecordSource, WarehouseRegistry, WarehouseTraffic,
};

/// Outcome of loading a measurement export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub inserted: u64,
    pub skipped: u64,
}

/// Warehouse row counts for the status command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub records: i64,
    pub reports: i64,
    pub config: Vec<(String, String)>,
}

/// Main entry point for the answer-engine visibility warehouse.
///
/// Owns the database plus the report assembler wired against the
/// warehouse-backed collaborators. All collaborators are injected at
/// construction; swap any of them for tests or alternative backends via
/// [`AeoDW::with_collaborators`].
pub struct AeoDW {
    db: Database,
    assembler: ReportAssembler,
    narrative: Option<Arc<dyn NarrativeGenerator>>,
    scope: String,
}

impl AeoDW {
    /// Wire the warehouse-backed collaborators over `db` for `scope`.
    pub fn new(db: Database, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        let assembler = ReportAssembler::new(
            Arc::new(WarehouseRecordSource::new(db.clone())),
            Arc::new(WarehouseDirectory::new(db.clone())),
            Arc::new(WarehouseRegistry::new(db.clone())),
            scope.clone(),
        )
        .with_traffic(Arc::new(WarehouseTraffic::new(db.clone())));

        Self {
            db,
            assembler,
            narrative: None,
            scope,
        }
    }

    /// Full dependency injection, for tests and alternative backends.
    pub fn with_collaborators(
        db: Database,
        assembler: ReportAssembler,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            db,
            assembler,
            narrative: None,
            scope: scope.into(),
        }
    }

    /// Attach a narrative generator. Without one (or when it fails), reports
    /// carry the deterministic templated narrative.
    pub fn with_narrative(mut self, narrative: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrative = Some(narrative);
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Report generation ──────────────────────────────────────────

    /// Assemble the snapshot for a request without persisting anything.
    pub async fn assemble_snapshot(&self, request: &ReportRequest) -> Result<ReportDataSnapshot> {
        self.assembler.assemble(request).await
    }

    /// Generate and persist a report: assemble the snapshot, produce the
    /// narrative, and store both as one immutable row.
    ///
    /// Narrative generation failures never fail the report: the deterministic
    /// fallback is assembled directly from the detected facts, so a report
    /// with facts always ships with a non-empty narrative.
    pub async fn generate_report(&self, request: &ReportRequest) -> Result<StoredReport> {
        let snapshot = self.assembler.assemble(request).await?;

        let narrative = match &self.narrative {
            Some(generator) => match generator.generate(&snapshot).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    log::warn!("narrative generator returned empty text, using fallback");
                    fallback_narrative(&snapshot)
                }
                Err(e) => {
                    log::warn!("narrative generation failed, using fallback: {e}");
                    fallback_narrative(&snapshot)
                }
            },
            None => fallback_narrative(&snapshot),
        };

        let snapshot_json = serde_json::to_string(&snapshot)
            .map_err(|e| Error::Other(format!("snapshot serialization failed: {e}")))?;
        let period = ReportPeriod::for_request(request.period_days, request.end_date)?;

        let report_id = self
            .db
            .writer()
            .call({
                let brand_id = snapshot.brand.entity_id.clone();
                let period_key = period.to_key();
                let (start, end) = period.date_range();
                let narrative = narrative.clone();
                move |conn| {
                    repository::insert_report(
                        conn,
                        &brand_id,
                        &period_key,
                        start,
                        end,
                        &snapshot_json,
                        &narrative,
                    )
                }
            })
            .await?;

        self.get_report(report_id)
            .await?
            .ok_or_else(|| Error::Database("stored report vanished".into()))
    }

    pub async fn get_report(&self, report_id: i64) -> Result<Option<StoredReport>> {
        self.db
            .reader()
            .call(move |conn| repository::get_report(conn, report_id))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn list_reports(&self, brand_id: &str) -> Result<Vec<StoredReport>> {
        let brand_id = brand_id.to_string();
        self.db
            .reader()
            .call(move |conn| repository::list_reports(conn, &brand_id))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Ingest ─────────────────────────────────────────────────────

    /// Load a JSON-lines measurement export. Each line is one record;
    /// malformed or unattributable lines are logged, counted, and skipped
    /// rather than aborting the load.
    pub async fn ingest_jsonl(&self, content: &str) -> Result<IngestReport> {
        let mut records = Vec::new();
        let mut skipped = 0u64;

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<MetricRecord>(line) {
                Ok(record) => match record.validate() {
                    Ok(()) => records.push(record.normalize()),
                    Err(e) => {
                        log::warn!("skipping line {}: {e}", number + 1);
                        skipped += 1;
                    }
                },
                Err(e) => {
                    log::warn!("skipping line {}: {e}", number + 1);
                    skipped += 1;
                }
            }
        }

        let scope = self.scope.clone();
        let (inserted, failed) = self
            .db
            .writer()
            .call(move |conn| {
                let mut inserted = 0u64;
                let mut failed = 0u64;
                for record in &records {
                    match repository::insert_record(conn, record, &scope) {
                        Ok(()) => inserted += 1,
                        Err(e) => {
                            log::warn!(
                                "could not store record for {}: {e}",
                                record.entity_id
                            );
                            failed += 1;
                        }
                    }
                }
                Ok::<(u64, u64), rusqlite::Error>((inserted, failed))
            })
            .await?;

        Ok(IngestReport {
            inserted,
            skipped: skipped + failed,
        })
    }

    // ── Brand and competitor management ────────────────────────────

    pub async fn set_brand(
        &self,
        entity_id: &str,
        name: &str,
        website_url: Option<&str>,
    ) -> Result<()> {
        let entity_id = entity_id.to_string();
        let name = name.to_string();
        let website_url = website_url.map(|s| s.to_string());
        let scope = self.scope.clone();
        self.db
            .writer()
            .call(move |conn| {
                repository::upsert_brand(conn, &entity_id, &name, website_url.as_deref(), &scope)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn add_competitor(
        &self,
        brand_id: &str,
        entity_id: &str,
        name: &str,
        website_url: Option<&str>,
    ) -> Result<()> {
        let brand_id = brand_id.to_string();
        let entity_id = entity_id.to_string();
        let name = name.to_string();
        let website_url = website_url.map(|s| s.to_string());
        let scope = self.scope.clone();
        self.db
            .writer()
            .call(move |conn| {
                repository::upsert_competitor(
                    conn,
                    &brand_id,
                    &entity_id,
                    &name,
                    website_url.as_deref(),
                    &scope,
                )
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn remove_competitor(&self, entity_id: &str) -> Result<bool> {
        let entity_id = entity_id.to_string();
        self.db
            .writer()
            .call(move |conn| repository::remove_competitor(conn, &entity_id))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn list_competitors(&self, brand_id: &str) -> Result<Vec<EntityRef>> {
        let brand_id = brand_id.to_string();
        self.db
            .reader()
            .call(move |conn| repository::list_competitors(conn, &brand_id))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Dimension maintenance ──────────────────────────────────────

    pub async fn set_query_text(&self, query_id: &str, text: &str) -> Result<()> {
        let query_id = query_id.to_string();
        let text = text.to_string();
        self.db
            .writer()
            .call(move |conn| repository::upsert_query(conn, &query_id, &text))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn set_source_info(
        &self,
        source_domain: &str,
        display_name: Option<&str>,
        impact_score: Option<f64>,
    ) -> Result<()> {
        let source_domain = source_domain.to_string();
        let display_name = display_name.map(|s| s.to_string());
        self.db
            .writer()
            .call(move |conn| {
                repository::upsert_source(
                    conn,
                    &source_domain,
                    display_name.as_deref(),
                    impact_score,
                )
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn add_traffic_day(
        &self,
        entity_id: &str,
        day: chrono::NaiveDate,
        sessions: i64,
    ) -> Result<()> {
        let entity_id = entity_id.to_string();
        self.db
            .writer()
            .call(move |conn| repository::upsert_traffic_day(conn, &entity_id, day, sessions))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn status(&self) -> Result<StatusReport> {
        self.db
            .reader()
            .call(|conn| {
                Ok::<StatusReport, rusqlite::Error>(StatusReport {
                    records: repository::count_records(conn)?,
                    reports: repository::count_reports(conn)?,
                    config: repository::list_config(conn)?,
                })
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
