use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::source::EntityRef;

/// Aggregate of all measurements for one entity over one date range.
///
/// Derived on demand, never persisted independently of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// Mean visibility index, reported 0..100.
    pub visibility: f64,
    /// Mean share of answer, 0..100.
    pub share_of_answer: f64,
    /// Mean sentiment, -1..1.
    pub sentiment: f64,
    /// Share of records in which the entity is present at all, 0..100.
    pub appearance_rate: f64,
    /// Mean rank across ranked appearances. 0 means the entity never ranked
    /// in the period.
    pub average_position: f64,
}

/// Absolute and percentage change of one metric between two periods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub absolute: f64,
    pub percentage: f64,
}

/// The metrics a report aggregates, trends, and ranks movers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Visibility,
    ShareOfAnswer,
    Sentiment,
    Position,
}

impl Metric {
    /// Project this metric out of a period summary.
    pub fn of(&self, summary: &PeriodSummary) -> f64 {
        match self {
            Metric::Visibility => summary.visibility,
            Metric::ShareOfAnswer => summary.share_of_answer,
            Metric::Sentiment => summary.sentiment,
            Metric::Position => summary.average_position,
        }
    }

    /// Position improves when the numeric rank decreases; every other metric
    /// improves when it increases.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, Metric::Position)
    }
}

/// One bucket of a rolling trend series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub value: f64,
}

/// Fixed-length trend series, oldest window first.
pub type TrendSeries = Vec<TrendPoint>;

/// A query, topic, or citation source whose metric moved between periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopMoverItem {
    /// Display label; falls back to the raw group key when resolution fails.
    pub name: String,
    pub group_key: String,
    pub change_absolute: f64,
    pub change_percentage: f64,
    pub current_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_score: Option<f64>,
}

/// Ranked movers for one (dimension, metric) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoverSet {
    pub gains: Vec<TopMoverItem>,
    pub losses: Vec<TopMoverItem>,
}

/// Movers across all ranked metrics for one grouping dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionMovers {
    pub visibility: MoverSet,
    pub share_of_answer: MoverSet,
    pub sentiment: MoverSet,
    pub position: MoverSet,
}

/// Top movers for every grouping dimension in a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopMovers {
    pub queries: DimensionMovers,
    pub topics: DimensionMovers,
    pub sources: DimensionMovers,
}

/// One row of the competitive landscape, brand included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitiveLandscapeEntry {
    pub name: String,
    pub is_brand: bool,
    pub current: PeriodSummary,
    pub visibility_delta: Delta,
    pub share_of_answer_delta: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    /// Sort rank: high severities first.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    VisibilityGain,
    VisibilityLoss,
    SentimentImprovement,
    SentimentDecline,
    CompetitiveThreat,
    ShareOfAnswerGain,
    ShareOfAnswerLoss,
    TrafficGain,
    TrafficLoss,
}

/// One deterministic finding about the period, handed to narrative
/// generation. The core does not know how facts become prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryFact {
    pub kind: FactKind,
    pub severity: Severity,
    pub description: String,
    pub metrics: BTreeMap<String, f64>,
}

/// Per-metric deltas between two period summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDeltas {
    pub visibility: Delta,
    pub share_of_answer: Delta,
    pub sentiment: Delta,
    pub appearance_rate: Delta,
    pub average_position: Delta,
}

/// Current vs. previous period for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceComparison {
    pub current: PeriodSummary,
    pub previous: PeriodSummary,
    pub deltas: MetricDeltas,
}

/// Rolling trends shown alongside the brand's headline numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandTrends {
    pub visibility: TrendSeries,
    pub share_of_answer: TrendSeries,
}

/// The brand's own performance block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandPerformance {
    pub comparison: PerformanceComparison,
    pub trends: BrandTrends,
}

/// Period-over-period performance of one answer engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPerformance {
    pub collector_type: String,
    pub comparison: PerformanceComparison,
}

/// Site-traffic section, present only when a traffic collaborator had data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficSummary {
    pub current_sessions: f64,
    pub previous_sessions: f64,
    pub sessions_delta: Delta,
}

/// The aggregate root a report run produces: everything downstream consumers
/// (narrative, persistence, rendering) need, assembled once and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDataSnapshot {
    pub brand: EntityRef,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub comparison_start: NaiveDate,
    pub comparison_end: NaiveDate,
    pub performance: BrandPerformance,
    pub providers: Vec<ProviderPerformance>,
    pub landscape: Vec<CompetitiveLandscapeEntry>,
    pub top_movers: TopMovers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficSummary>,
    pub facts: Vec<SummaryFact>,
}
