pub mod landscape;
pub mod movers;
pub mod trend;
pub mod triggers;
pub mod types;

pub use types::*;

use chrono::NaiveDate;

use crate::date_util::round2;
use crate::error::Result;
use crate::record::MetricRecord;
use crate::source::MetricRecordSource;

/// Reduce a set of raw records into a single period summary.
///
/// Pure: identical inputs produce bit-identical output, and an empty record
/// set is a legitimate cold-start input yielding the all-zero summary.
pub fn summarize_records<'a, I>(records: I) -> PeriodSummary
where
    I: IntoIterator<Item = &'a MetricRecord>,
{
    let mut count = 0usize;
    let mut visibility_sum = 0.0;
    let mut share_sum = 0.0;
    let mut sentiment_sum = 0.0;
    let mut present = 0usize;
    let mut position_sum = 0.0;
    let mut ranked = 0usize;

    for record in records {
        count += 1;
        visibility_sum += record.visibility_index;
        share_sum += record.share_of_answer;
        sentiment_sum += record.sentiment_score;
        if record.has_brand_presence {
            present += 1;
        }
        // Unranked records are excluded from the position average entirely:
        // an empty positions list must not drag the mean toward a false rank.
        if let Some(mean) = record.mean_position() {
            position_sum += mean;
            ranked += 1;
        }
    }

    if count == 0 {
        return PeriodSummary::default();
    }

    let n = count as f64;
    let average_position = if ranked == 0 {
        0.0
    } else {
        position_sum / ranked as f64
    };

    PeriodSummary {
        visibility: round2(visibility_sum / n * 100.0),
        share_of_answer: round2(share_sum / n),
        sentiment: round2(sentiment_sum / n),
        appearance_rate: round2(present as f64 / n * 100.0),
        average_position: round2(average_position),
    }
}

/// Aggregate an entity's records over a date range into a period summary.
///
/// An unknown entity fails with `EntityNotFound` (surfaced by the source); an
/// empty-but-valid record set is not a failure.
pub async fn aggregate(
    source: &dyn MetricRecordSource,
    entity_id: &str,
    scope: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PeriodSummary> {
    let records = source.fetch(entity_id, scope, start, end).await?;
    Ok(summarize_records(&records))
}

/// Absolute and percentage change between a current and previous value.
///
/// A previous value of exactly zero yields percentage 0 even when the
/// absolute change is nonzero: division by zero is defined away rather than
/// special-cased by callers.
pub fn delta(current: f64, previous: f64) -> Delta {
    let absolute = current - previous;
    let percentage = if previous != 0.0 {
        absolute / previous * 100.0
    } else {
        0.0
    };
    Delta {
        absolute: round2(absolute),
        percentage: round2(percentage),
    }
}

/// Deltas for every summary metric between two periods.
pub fn metric_deltas(current: &PeriodSummary, previous: &PeriodSummary) -> MetricDeltas {
    MetricDeltas {
        visibility: delta(current.visibility, previous.visibility),
        share_of_answer: delta(current.share_of_answer, previous.share_of_answer),
        sentiment: delta(current.sentiment, previous.sentiment),
        appearance_rate: delta(current.appearance_rate, previous.appearance_rate),
        average_position: delta(current.average_position, previous.average_position),
    }
}

/// Current/previous/deltas block for one entity.
pub fn compare_periods(current: PeriodSummary, previous: PeriodSummary) -> PerformanceComparison {
    PerformanceComparison {
        current,
        previous,
        deltas: metric_deltas(&current, &previous),
    }
}
