use chrono::NaiveDate;

use crate::metrics::{summarize_records, Metric, TrendPoint, TrendSeries};
use crate::period::trend_windows;
use crate::source::MetricRecordSource;

pub const DEFAULT_WINDOW_COUNT: u32 = 12;
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Rolling trend for one metric: `window_count` contiguous windows of
/// `window_days` each, ending at `end`, oldest first.
///
/// The series is always exactly `window_count` points long. A window with no
/// underlying records contributes a point with value 0 rather than being
/// omitted, so downstream chart axes stay fixed-length; a window whose fetch
/// fails is logged and likewise contributes 0.
pub async fn trend(
    source: &dyn MetricRecordSource,
    entity_id: &str,
    scope: &str,
    end: NaiveDate,
    window_count: u32,
    window_days: u32,
    metric: Metric,
) -> TrendSeries {
    let windows = trend_windows(end, window_count, window_days);

    let fetches = windows
        .iter()
        .map(|&(start, window_end)| source.fetch(entity_id, scope, start, window_end));
    let results = futures::future::join_all(fetches).await;

    windows
        .into_iter()
        .zip(results)
        .map(|((window_start, window_end), result)| {
            let value = match result {
                Ok(records) => metric.of(&summarize_records(&records)),
                Err(e) => {
                    log::warn!(
                        "trend window {window_start}..{window_end} for {entity_id} failed: {e}"
                    );
                    0.0
                }
            };
            TrendPoint {
                window_start,
                window_end,
                value,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;

    use crate::error::{Error, Result};
    use crate::record::MetricRecord;

    /// Source with records on a fixed set of days only.
    struct DaysSource {
        days: Vec<NaiveDate>,
    }

    #[async_trait]
    impl MetricRecordSource for DaysSource {
        async fn fetch(
            &self,
            entity_id: &str,
            _scope: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<MetricRecord>> {
            Ok(self
                .days
                .iter()
                .filter(|d| **d >= start && **d <= end)
                .map(|d| MetricRecord {
                    entity_id: entity_id.to_string(),
                    query_id: "q1".to_string(),
                    topic: "general".to_string(),
                    source_domain: "example.com".to_string(),
                    collector_type: "assistant_a".to_string(),
                    visibility_index: 0.4,
                    share_of_answer: 10.0,
                    sentiment_score: 0.0,
                    has_brand_presence: true,
                    first_position: None,
                    positions: vec![],
                    recorded_at: *d,
                })
                .collect())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl MetricRecordSource for FailingSource {
        async fn fetch(
            &self,
            _entity_id: &str,
            _scope: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<MetricRecord>> {
            Err(Error::Source("backend unavailable".into()))
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_trend_always_has_window_count_points() {
        // Data only inside the newest window; the other 11 must still appear.
        let source = DaysSource {
            days: vec![d(2025, 6, 29), d(2025, 6, 30)],
        };
        let series = trend(&source, "brand-1", "default", d(2025, 6, 30), 12, 7, Metric::Visibility)
            .await;
        assert_eq!(series.len(), 12);
        assert_eq!(series.last().unwrap().value, 40.00);
        assert!(series[..11].iter().all(|p| p.value == 0.0));
    }

    #[tokio::test]
    async fn test_trend_windows_are_contiguous() {
        let source = DaysSource { days: vec![] };
        let series = trend(&source, "brand-1", "default", d(2025, 6, 30), 6, 7, Metric::Visibility)
            .await;
        assert_eq!(series.len(), 6);
        for pair in series.windows(2) {
            assert_eq!(pair[1].window_start, pair[0].window_end + Duration::days(1));
        }
        assert_eq!(series.last().unwrap().window_end, d(2025, 6, 30));
    }

    #[tokio::test]
    async fn test_failed_window_contributes_zero() {
        let series = trend(
            &FailingSource,
            "brand-1",
            "default",
            d(2025, 6, 30),
            12,
            7,
            Metric::ShareOfAnswer,
        )
        .await;
        assert_eq!(series.len(), 12);
        assert!(series.iter().all(|p| p.value == 0.0));
    }
}
