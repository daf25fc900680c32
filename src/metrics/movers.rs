use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::metrics::{delta, summarize_records, Metric, MoverSet, PeriodSummary, TopMoverItem};
use crate::record::MetricRecord;
use crate::source::EntityDirectory;

pub const DEFAULT_TOP_K: usize = 5;

/// How records are grouped when ranking movers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoverDimension {
    Query,
    Topic,
    Source,
}

impl MoverDimension {
    fn key_of<'a>(&self, record: &'a MetricRecord) -> &'a str {
        match self {
            MoverDimension::Query => &record.query_id,
            MoverDimension::Topic => &record.topic,
            MoverDimension::Source => &record.source_domain,
        }
    }
}

/// Rank the groups whose `metric` moved most between two periods.
///
/// Both record sets are grouped by the dimension key and reduced with the
/// same aggregation the period summary uses, then full-outer-joined on the
/// key: a group present in only one period carries value 0 in the other, so
/// appearing or disappearing entirely is a trackable event. Groups with no
/// visibility signal in either period are dropped as noise, and a change of
/// exactly zero lands in neither list.
///
/// For the position metric the lists are inverted: a decrease in numeric
/// rank is an improvement, so gains hold `change < 0` sorted most-negative
/// first, and losses hold `change > 0` sorted most-positive first.
///
/// When `impact` is supplied (citation-source authority weights), it becomes
/// the primary sort key on both sides: a fixed swing on a high-authority
/// source outranks the same swing on a negligible one.
pub fn rank(
    current: &[MetricRecord],
    previous: &[MetricRecord],
    dimension: MoverDimension,
    metric: Metric,
    top_k: usize,
    impact: Option<&HashMap<String, f64>>,
) -> MoverSet {
    let current_groups = group_summaries(current, dimension);
    let previous_groups = group_summaries(previous, dimension);

    let keys: BTreeSet<&str> = current_groups
        .keys()
        .chain(previous_groups.keys())
        .copied()
        .collect();

    let mut movers = Vec::new();
    for key in keys {
        let cur = current_groups.get(key).copied().unwrap_or_default();
        let prev = previous_groups.get(key).copied().unwrap_or_default();

        if cur.visibility == 0.0 && prev.visibility == 0.0 {
            continue;
        }

        let current_value = metric.of(&cur);
        let previous_value = metric.of(&prev);
        let change = delta(current_value, previous_value);
        if change.absolute == 0.0 {
            continue;
        }

        movers.push(TopMoverItem {
            name: key.to_string(),
            group_key: key.to_string(),
            change_absolute: change.absolute,
            change_percentage: change.percentage,
            current_value: crate::date_util::round2(current_value),
            impact_score: impact.and_then(|m| m.get(key).copied()),
        });
    }

    let improvement_is_negative = metric.lower_is_better();
    let (mut gains, mut losses): (Vec<_>, Vec<_>) = movers.into_iter().partition(|m| {
        if improvement_is_negative {
            m.change_absolute < 0.0
        } else {
            m.change_absolute > 0.0
        }
    });

    let has_impact = impact.is_some();
    sort_movers(&mut gains, has_impact, improvement_is_negative);
    sort_movers(&mut losses, has_impact, !improvement_is_negative);
    gains.truncate(top_k);
    losses.truncate(top_k);

    MoverSet { gains, losses }
}

/// Sort with the biggest mover first. `ascending_change` flips the change
/// ordering for the side where more negative means bigger.
fn sort_movers(items: &mut [TopMoverItem], has_impact: bool, ascending_change: bool) {
    items.sort_by(|a, b| {
        if has_impact {
            let ia = a.impact_score.unwrap_or(0.0);
            let ib = b.impact_score.unwrap_or(0.0);
            match ib.total_cmp(&ia) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        let by_change = if ascending_change {
            a.change_absolute.total_cmp(&b.change_absolute)
        } else {
            b.change_absolute.total_cmp(&a.change_absolute)
        };
        match by_change {
            Ordering::Equal => {}
            other => return other,
        }
        if ascending_change {
            a.current_value.total_cmp(&b.current_value)
        } else {
            b.current_value.total_cmp(&a.current_value)
        }
    });
}

fn group_summaries(
    records: &[MetricRecord],
    dimension: MoverDimension,
) -> BTreeMap<&str, PeriodSummary> {
    let mut groups: BTreeMap<&str, Vec<&MetricRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(dimension.key_of(record))
            .or_default()
            .push(record);
    }
    groups
        .into_iter()
        .map(|(key, group)| (key, summarize_records(group)))
        .collect()
}

/// Replace raw group keys with directory display names. A failed lookup
/// keeps the raw key rather than dropping the item.
pub async fn resolve_names(directory: &dyn EntityDirectory, set: &mut MoverSet) {
    for item in set.gains.iter_mut().chain(set.losses.iter_mut()) {
        match directory.resolve_name(&item.group_key).await {
            Ok(name) if !name.is_empty() => item.name = name,
            Ok(_) => {}
            Err(e) => {
                log::debug!(
                    "name resolution for {} failed, keeping raw key: {e}",
                    item.group_key
                );
            }
        }
    }
}
