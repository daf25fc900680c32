use crate::error::Result;
use crate::metrics::{aggregate, delta, CompetitiveLandscapeEntry};
use crate::period::ReportPeriod;
use crate::source::{EntityRef, MetricRecordSource};

/// Build the ranked competitive landscape for a brand and its tracked
/// competitors over one period.
///
/// The brand's own entry is computed first and must succeed. Each competitor
/// is computed independently; a single competitor failing is logged and
/// omitted, shrinking the result by exactly one entry and never aborting the
/// siblings. The final list is sorted by current visibility descending with
/// the brand included in the sort, not pinned to the top.
pub async fn build(
    source: &dyn MetricRecordSource,
    brand: &EntityRef,
    competitors: &[EntityRef],
    scope: &str,
    period: ReportPeriod,
) -> Result<Vec<CompetitiveLandscapeEntry>> {
    let mut entries = Vec::with_capacity(competitors.len() + 1);
    entries.push(entry_for(source, brand, true, scope, period).await?);

    let results = futures::future::join_all(
        competitors
            .iter()
            .map(|competitor| entry_for(source, competitor, false, scope, period)),
    )
    .await;

    for (competitor, result) in competitors.iter().zip(results) {
        match result {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                log::warn!(
                    "omitting competitor {} from landscape: {e}",
                    competitor.entity_id
                );
            }
        }
    }

    entries.sort_by(|a, b| b.current.visibility.total_cmp(&a.current.visibility));
    Ok(entries)
}

/// Current summary plus the headline deltas compared at this level:
/// visibility and share of answer only.
async fn entry_for(
    source: &dyn MetricRecordSource,
    entity: &EntityRef,
    is_brand: bool,
    scope: &str,
    period: ReportPeriod,
) -> Result<CompetitiveLandscapeEntry> {
    let (start, end) = period.date_range();
    let (prev_start, prev_end) = period.comparison().date_range();

    let current = aggregate(source, &entity.entity_id, scope, start, end).await?;
    let previous = aggregate(source, &entity.entity_id, scope, prev_start, prev_end).await?;

    Ok(CompetitiveLandscapeEntry {
        name: entity.name.clone(),
        is_brand,
        current,
        visibility_delta: delta(current.visibility, previous.visibility),
        share_of_answer_delta: delta(current.share_of_answer, previous.share_of_answer),
        website_url: entity.website_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    use crate::error::Error;
    use crate::record::MetricRecord;

    /// Fixed per-entity visibility; errors for entities in `failing`.
    struct FixtureSource {
        visibility: HashMap<String, f64>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl MetricRecordSource for FixtureSource {
        async fn fetch(
            &self,
            entity_id: &str,
            _scope: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> crate::error::Result<Vec<MetricRecord>> {
            if self.failing.iter().any(|f| f == entity_id) {
                return Err(Error::Source(format!("fetch failed for {entity_id}")));
            }
            let Some(&vis) = self.visibility.get(entity_id) else {
                return Err(Error::EntityNotFound(entity_id.to_string()));
            };
            // Previous period (detected by its start date) gets half the
            // current visibility so deltas are nonzero.
            let cutoff = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
            let index = if start < cutoff { vis / 2.0 } else { vis };
            Ok(vec![MetricRecord {
                entity_id: entity_id.to_string(),
                query_id: "q1".to_string(),
                topic: "general".to_string(),
                source_domain: "example.com".to_string(),
                collector_type: "assistant_a".to_string(),
                visibility_index: index,
                share_of_answer: index * 100.0,
                sentiment_score: 0.0,
                has_brand_presence: true,
                first_position: None,
                positions: vec![],
                recorded_at: start,
            }])
        }
    }

    fn entity(id: &str, name: &str) -> EntityRef {
        EntityRef {
            entity_id: id.to_string(),
            name: name.to_string(),
            website_url: Some(format!("https://{id}.example")),
        }
    }

    fn period() -> ReportPeriod {
        ReportPeriod::new(30, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_landscape_sorted_by_visibility_brand_not_pinned() {
        let source = FixtureSource {
            visibility: HashMap::from([
                ("brand-1".to_string(), 0.4),
                ("comp-1".to_string(), 0.8),
                ("comp-2".to_string(), 0.2),
            ]),
            failing: vec![],
        };
        let brand = entity("brand-1", "Our Brand");
        let competitors = vec![entity("comp-1", "Leader"), entity("comp-2", "Trailer")];

        let entries = build(&source, &brand, &competitors, "default", period())
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Leader", "Our Brand", "Trailer"]);
        assert!(entries[1].is_brand);
        // Only the headline deltas are compared at this level.
        assert!(entries[0].visibility_delta.absolute > 0.0);
        assert!(entries[0].share_of_answer_delta.absolute > 0.0);
    }

    #[tokio::test]
    async fn test_single_competitor_failure_shrinks_list_by_one() {
        let source = FixtureSource {
            visibility: HashMap::from([
                ("brand-1".to_string(), 0.4),
                ("comp-1".to_string(), 0.8),
                ("comp-2".to_string(), 0.2),
            ]),
            failing: vec!["comp-1".to_string()],
        };
        let brand = entity("brand-1", "Our Brand");
        let competitors = vec![entity("comp-1", "Leader"), entity("comp-2", "Trailer")];

        let entries = build(&source, &brand, &competitors, "default", period())
            .await
            .unwrap();
        // Brand + the one healthy competitor; no error escapes to the caller.
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.name != "Leader"));
    }

    #[tokio::test]
    async fn test_brand_failure_aborts_build() {
        let source = FixtureSource {
            visibility: HashMap::new(),
            failing: vec![],
        };
        let brand = entity("missing", "Ghost");
        let result = build(&source, &brand, &[], "default", period()).await;
        assert!(matches!(result, Err(Error::EntityNotFound(_))));
    }
}
