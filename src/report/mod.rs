use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::landscape;
use crate::metrics::movers::{self, MoverDimension, DEFAULT_TOP_K};
use crate::metrics::trend::{self, DEFAULT_WINDOW_COUNT, DEFAULT_WINDOW_DAYS};
use crate::metrics::{
    aggregate, compare_periods, delta, summarize_records, triggers, BrandPerformance, BrandTrends,
    DimensionMovers, Metric, ProviderPerformance, ReportDataSnapshot, TopMovers, TrafficSummary,
};
use crate::period::ReportPeriod;
use crate::record::MetricRecord;
use crate::source::{
    CompetitorRegistry, EntityDirectory, MetricRecordSource, TrafficSource,
};

/// A report-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub brand_id: String,
    /// One of 7, 30, 60, or 90.
    pub period_days: u32,
    /// Last day of the reporting period; today when absent.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Fan-out/fan-in driver that assembles one [`ReportDataSnapshot`].
///
/// Every collaborator is injected at construction time; the assembler holds
/// no mutable state and a single instance can serve concurrent report runs
/// for different brands and periods without coordination.
pub struct ReportAssembler {
    source: Arc<dyn MetricRecordSource>,
    directory: Arc<dyn EntityDirectory>,
    registry: Arc<dyn CompetitorRegistry>,
    traffic: Option<Arc<dyn TrafficSource>>,
    scope: String,
}

impl ReportAssembler {
    pub fn new(
        source: Arc<dyn MetricRecordSource>,
        directory: Arc<dyn EntityDirectory>,
        registry: Arc<dyn CompetitorRegistry>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            source,
            directory,
            registry,
            traffic: None,
            scope: scope.into(),
        }
    }

    /// Attach an optional traffic collaborator; reports gain a traffic
    /// section when it has data for the requested range.
    pub fn with_traffic(mut self, traffic: Arc<dyn TrafficSource>) -> Self {
        self.traffic = Some(traffic);
        self
    }

    /// Assemble the full snapshot for one request.
    ///
    /// Brand identity resolution is the single hard precondition: an unknown
    /// brand aborts before any branch starts. Every other branch contains its
    /// own failure — logged and omitted from the corresponding section, with
    /// sibling branches unaffected. Branches never communicate; the only
    /// synchronization is the final join.
    pub async fn assemble(&self, request: &ReportRequest) -> Result<ReportDataSnapshot> {
        let period = ReportPeriod::for_request(request.period_days, request.end_date)?;
        let comparison = period.comparison();

        let brand = self.registry.get_entity(&request.brand_id).await?;
        log::info!(
            "assembling report for {} over {period}",
            brand.entity_id
        );

        let (performance, landscape, period_records, traffic) = tokio::join!(
            self.brand_performance(&brand.entity_id, period),
            self.build_landscape(&brand, period),
            self.fetch_period_records(&brand.entity_id, period),
            self.traffic_summary(&brand.entity_id, period),
        );

        let performance = performance.unwrap_or_else(|e| {
            log::error!("brand performance branch failed: {e}");
            BrandPerformance::default()
        });
        let landscape = landscape.unwrap_or_else(|e| {
            log::warn!("competitive landscape branch failed: {e}");
            Vec::new()
        });
        let (current_records, previous_records) = period_records.unwrap_or_else(|e| {
            log::warn!("top-mover record fetch failed: {e}");
            (Vec::new(), Vec::new())
        });

        let providers = provider_breakdown(&current_records, &previous_records);
        let top_movers = self.top_movers(&current_records, &previous_records).await;

        let (period_start, period_end) = period.date_range();
        let (comparison_start, comparison_end) = comparison.date_range();

        let mut snapshot = ReportDataSnapshot {
            brand,
            period_start,
            period_end,
            comparison_start,
            comparison_end,
            performance,
            providers,
            landscape,
            top_movers,
            traffic,
            facts: Vec::new(),
        };
        let facts = triggers::detect(&snapshot);
        snapshot.facts = facts;
        Ok(snapshot)
    }

    async fn brand_performance(
        &self,
        entity_id: &str,
        period: ReportPeriod,
    ) -> Result<BrandPerformance> {
        let (start, end) = period.date_range();
        let (prev_start, prev_end) = period.comparison().date_range();

        let (current, previous) = tokio::try_join!(
            aggregate(self.source.as_ref(), entity_id, &self.scope, start, end),
            aggregate(
                self.source.as_ref(),
                entity_id,
                &self.scope,
                prev_start,
                prev_end
            ),
        )?;

        let (visibility, share_of_answer) = tokio::join!(
            trend::trend(
                self.source.as_ref(),
                entity_id,
                &self.scope,
                end,
                DEFAULT_WINDOW_COUNT,
                DEFAULT_WINDOW_DAYS,
                Metric::Visibility,
            ),
            trend::trend(
                self.source.as_ref(),
                entity_id,
                &self.scope,
                end,
                DEFAULT_WINDOW_COUNT,
                DEFAULT_WINDOW_DAYS,
                Metric::ShareOfAnswer,
            ),
        );

        Ok(BrandPerformance {
            comparison: compare_periods(current, previous),
            trends: BrandTrends {
                visibility,
                share_of_answer,
            },
        })
    }

    async fn build_landscape(
        &self,
        brand: &crate::source::EntityRef,
        period: ReportPeriod,
    ) -> Result<Vec<crate::metrics::CompetitiveLandscapeEntry>> {
        let competitors = self.registry.list_competitors(&brand.entity_id).await?;
        landscape::build(
            self.source.as_ref(),
            brand,
            &competitors,
            &self.scope,
            period,
        )
        .await
    }

    /// Both record sets are fetched once; the provider breakdown and every
    /// mover dimension reduce over them without further source round-trips.
    async fn fetch_period_records(
        &self,
        entity_id: &str,
        period: ReportPeriod,
    ) -> Result<(Vec<MetricRecord>, Vec<MetricRecord>)> {
        let (start, end) = period.date_range();
        let (prev_start, prev_end) = period.comparison().date_range();
        tokio::try_join!(
            self.source.fetch(entity_id, &self.scope, start, end),
            self.source
                .fetch(entity_id, &self.scope, prev_start, prev_end),
        )
    }

    async fn traffic_summary(
        &self,
        entity_id: &str,
        period: ReportPeriod,
    ) -> Option<TrafficSummary> {
        let traffic = self.traffic.as_ref()?;
        let (start, end) = period.date_range();
        let (prev_start, prev_end) = period.comparison().date_range();

        let (current, previous) = tokio::join!(
            traffic.sessions(entity_id, start, end),
            traffic.sessions(entity_id, prev_start, prev_end),
        );
        match (current, previous) {
            (Ok(Some(current_sessions)), Ok(previous)) => {
                let previous_sessions = previous.unwrap_or(0.0);
                Some(TrafficSummary {
                    current_sessions,
                    previous_sessions,
                    sessions_delta: delta(current_sessions, previous_sessions),
                })
            }
            (Ok(None), _) => None,
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("traffic branch failed: {e}");
                None
            }
        }
    }

    async fn top_movers(
        &self,
        current: &[MetricRecord],
        previous: &[MetricRecord],
    ) -> TopMovers {
        let impact = self.impact_scores(current, previous).await;
        TopMovers {
            queries: self
                .dimension_movers(current, previous, MoverDimension::Query, None)
                .await,
            topics: self
                .dimension_movers(current, previous, MoverDimension::Topic, None)
                .await,
            sources: self
                .dimension_movers(current, previous, MoverDimension::Source, Some(&impact))
                .await,
        }
    }

    async fn dimension_movers(
        &self,
        current: &[MetricRecord],
        previous: &[MetricRecord],
        dimension: MoverDimension,
        impact: Option<&HashMap<String, f64>>,
    ) -> DimensionMovers {
        let mut result = DimensionMovers {
            visibility: movers::rank(
                current,
                previous,
                dimension,
                Metric::Visibility,
                DEFAULT_TOP_K,
                impact,
            ),
            share_of_answer: movers::rank(
                current,
                previous,
                dimension,
                Metric::ShareOfAnswer,
                DEFAULT_TOP_K,
                impact,
            ),
            sentiment: movers::rank(
                current,
                previous,
                dimension,
                Metric::Sentiment,
                DEFAULT_TOP_K,
                impact,
            ),
            position: movers::rank(
                current,
                previous,
                dimension,
                Metric::Position,
                DEFAULT_TOP_K,
                impact,
            ),
        };
        for set in [
            &mut result.visibility,
            &mut result.share_of_answer,
            &mut result.sentiment,
            &mut result.position,
        ] {
            movers::resolve_names(self.directory.as_ref(), set).await;
        }
        result
    }

    /// Authority weights for every citation source seen in either period.
    /// Unknown domains and failed lookups simply have no weight.
    async fn impact_scores(
        &self,
        current: &[MetricRecord],
        previous: &[MetricRecord],
    ) -> HashMap<String, f64> {
        let domains: BTreeSet<&str> = current
            .iter()
            .chain(previous)
            .map(|r| r.source_domain.as_str())
            .collect();

        let lookups = domains.iter().map(|d| self.directory.impact_score(d));
        let results = futures::future::join_all(lookups).await;

        domains
            .iter()
            .zip(results)
            .filter_map(|(domain, result)| match result {
                Ok(Some(score)) => Some((domain.to_string(), score)),
                Ok(None) => None,
                Err(e) => {
                    log::debug!("impact lookup for {domain} failed: {e}");
                    None
                }
            })
            .collect()
    }
}

/// Period-over-period comparison per answer engine, derived from the already
/// fetched record sets. Collectors are emitted in lexical order so repeated
/// runs serialize identically.
pub fn provider_breakdown(
    current: &[MetricRecord],
    previous: &[MetricRecord],
) -> Vec<ProviderPerformance> {
    let collectors: BTreeSet<&str> = current
        .iter()
        .chain(previous)
        .map(|r| r.collector_type.as_str())
        .collect();

    collectors
        .into_iter()
        .map(|collector| {
            let cur = summarize_records(
                current.iter().filter(|r| r.collector_type == collector),
            );
            let prev = summarize_records(
                previous.iter().filter(|r| r.collector_type == collector),
            );
            ProviderPerformance {
                collector_type: collector.to_string(),
                comparison: compare_periods(cur, prev),
            }
        })
        .collect()
}
