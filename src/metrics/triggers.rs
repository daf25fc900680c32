use std::collections::BTreeMap;

use crate::metrics::{FactKind, ReportDataSnapshot, Severity, SummaryFact};

/// Percentage swing in visibility or share of answer that warrants a fact.
const HEADLINE_SWING_PCT: f64 = 15.0;
/// Absolute sentiment shift that warrants a fact.
const SENTIMENT_SWING: f64 = 0.5;
/// Absolute share-of-answer points a competitor must gain to count as a
/// competitive threat.
const THREAT_SOA_POINTS: f64 = 10.0;
/// Percentage swing in sessions that warrants a traffic fact.
const SESSIONS_SWING_PCT: f64 = 20.0;

/// Evaluate the deterministic fact rules against an assembled snapshot.
///
/// Rules run in a fixed order and each is independently testable. The output
/// is sorted by severity (high, medium, low) with ties preserving
/// rule-evaluation order; it is the sole hand-off to narrative generation.
pub fn detect(snapshot: &ReportDataSnapshot) -> Vec<SummaryFact> {
    let mut facts = Vec::new();
    let deltas = &snapshot.performance.comparison.deltas;
    let current = &snapshot.performance.comparison.current;
    let previous = &snapshot.performance.comparison.previous;

    if deltas.visibility.percentage > HEADLINE_SWING_PCT {
        facts.push(SummaryFact {
            kind: FactKind::VisibilityGain,
            severity: Severity::High,
            description: format!(
                "Visibility rose {:.2}% period over period ({:.2} to {:.2})",
                deltas.visibility.percentage, previous.visibility, current.visibility
            ),
            metrics: BTreeMap::from([
                ("current".to_string(), current.visibility),
                ("previous".to_string(), previous.visibility),
                ("delta_pct".to_string(), deltas.visibility.percentage),
            ]),
        });
    }

    if deltas.visibility.percentage < -HEADLINE_SWING_PCT {
        facts.push(SummaryFact {
            kind: FactKind::VisibilityLoss,
            severity: Severity::High,
            description: format!(
                "Visibility fell {:.2}% period over period ({:.2} to {:.2})",
                deltas.visibility.percentage.abs(),
                previous.visibility,
                current.visibility
            ),
            metrics: BTreeMap::from([
                ("current".to_string(), current.visibility),
                ("previous".to_string(), previous.visibility),
                ("delta_pct".to_string(), deltas.visibility.percentage),
            ]),
        });
    }

    if deltas.sentiment.absolute > SENTIMENT_SWING {
        facts.push(SummaryFact {
            kind: FactKind::SentimentImprovement,
            severity: Severity::Medium,
            description: format!(
                "Sentiment improved by {:.2} ({:.2} to {:.2})",
                deltas.sentiment.absolute, previous.sentiment, current.sentiment
            ),
            metrics: BTreeMap::from([
                ("current".to_string(), current.sentiment),
                ("previous".to_string(), previous.sentiment),
                ("delta".to_string(), deltas.sentiment.absolute),
            ]),
        });
    }

    if deltas.sentiment.absolute < -SENTIMENT_SWING {
        facts.push(SummaryFact {
            kind: FactKind::SentimentDecline,
            severity: Severity::High,
            description: format!(
                "Sentiment declined by {:.2} ({:.2} to {:.2})",
                deltas.sentiment.absolute.abs(),
                previous.sentiment,
                current.sentiment
            ),
            metrics: BTreeMap::from([
                ("current".to_string(), current.sentiment),
                ("previous".to_string(), previous.sentiment),
                ("delta".to_string(), deltas.sentiment.absolute),
            ]),
        });
    }

    // One fact per qualifying competitor, in landscape order.
    for entry in snapshot.landscape.iter().filter(|e| !e.is_brand) {
        if entry.share_of_answer_delta.absolute > THREAT_SOA_POINTS {
            facts.push(SummaryFact {
                kind: FactKind::CompetitiveThreat,
                severity: Severity::High,
                description: format!(
                    "{} gained {:.2} share-of-answer points period over period",
                    entry.name, entry.share_of_answer_delta.absolute
                ),
                metrics: BTreeMap::from([
                    ("delta_points".to_string(), entry.share_of_answer_delta.absolute),
                    ("current".to_string(), entry.current.share_of_answer),
                ]),
            });
        }
    }

    if deltas.share_of_answer.percentage > HEADLINE_SWING_PCT {
        facts.push(SummaryFact {
            kind: FactKind::ShareOfAnswerGain,
            severity: Severity::High,
            description: format!(
                "Share of answer rose {:.2}% period over period ({:.2} to {:.2})",
                deltas.share_of_answer.percentage,
                previous.share_of_answer,
                current.share_of_answer
            ),
            metrics: BTreeMap::from([
                ("current".to_string(), current.share_of_answer),
                ("previous".to_string(), previous.share_of_answer),
                ("delta_pct".to_string(), deltas.share_of_answer.percentage),
            ]),
        });
    }

    if deltas.share_of_answer.percentage < -HEADLINE_SWING_PCT {
        facts.push(SummaryFact {
            kind: FactKind::ShareOfAnswerLoss,
            severity: Severity::High,
            description: format!(
                "Share of answer fell {:.2}% period over period ({:.2} to {:.2})",
                deltas.share_of_answer.percentage.abs(),
                previous.share_of_answer,
                current.share_of_answer
            ),
            metrics: BTreeMap::from([
                ("current".to_string(), current.share_of_answer),
                ("previous".to_string(), previous.share_of_answer),
                ("delta_pct".to_string(), deltas.share_of_answer.percentage),
            ]),
        });
    }

    if let Some(traffic) = &snapshot.traffic {
        if traffic.sessions_delta.percentage > SESSIONS_SWING_PCT {
            facts.push(SummaryFact {
                kind: FactKind::TrafficGain,
                severity: Severity::High,
                description: format!(
                    "Sessions rose {:.2}% period over period",
                    traffic.sessions_delta.percentage
                ),
                metrics: BTreeMap::from([
                    ("current".to_string(), traffic.current_sessions),
                    ("previous".to_string(), traffic.previous_sessions),
                    ("delta_pct".to_string(), traffic.sessions_delta.percentage),
                ]),
            });
        }
        if traffic.sessions_delta.percentage < -SESSIONS_SWING_PCT {
            facts.push(SummaryFact {
                kind: FactKind::TrafficLoss,
                severity: Severity::High,
                description: format!(
                    "Sessions fell {:.2}% period over period",
                    traffic.sessions_delta.percentage.abs()
                ),
                metrics: BTreeMap::from([
                    ("current".to_string(), traffic.current_sessions),
                    ("previous".to_string(), traffic.previous_sessions),
                    ("delta_pct".to_string(), traffic.sessions_delta.percentage),
                ]),
            });
        }
    }

    // Stable sort: ties keep rule-evaluation order within a severity tier.
    facts.sort_by_key(|f| f.severity.rank());
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::metrics::{
        compare_periods, BrandPerformance, CompetitiveLandscapeEntry, Delta, PeriodSummary,
        TopMovers, TrafficSummary,
    };
    use crate::source::EntityRef;

    fn snapshot(current: PeriodSummary, previous: PeriodSummary) -> ReportDataSnapshot {
        ReportDataSnapshot {
            brand: EntityRef {
                entity_id: "brand-1".to_string(),
                name: "Our Brand".to_string(),
                website_url: None,
            },
            period_start: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            comparison_start: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            comparison_end: NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
            performance: BrandPerformance {
                comparison: compare_periods(current, previous),
                trends: Default::default(),
            },
            providers: vec![],
            landscape: vec![],
            top_movers: TopMovers::default(),
            traffic: None,
            facts: vec![],
        }
    }

    fn summary(visibility: f64, soa: f64, sentiment: f64) -> PeriodSummary {
        PeriodSummary {
            visibility,
            share_of_answer: soa,
            sentiment,
            appearance_rate: 0.0,
            average_position: 0.0,
        }
    }

    #[test]
    fn test_visibility_gain_rule() {
        let facts = detect(&snapshot(summary(50.0, 10.0, 0.0), summary(40.0, 10.0, 0.0)));
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].kind, FactKind::VisibilityGain);
        assert_eq!(facts[0].severity, Severity::High);
        assert_eq!(facts[0].metrics["delta_pct"], 25.00);
    }

    #[test]
    fn test_visibility_loss_rule() {
        let facts = detect(&snapshot(summary(30.0, 10.0, 0.0), summary(40.0, 10.0, 0.0)));
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].kind, FactKind::VisibilityLoss);
    }

    #[test]
    fn test_small_swing_emits_nothing() {
        let facts = detect(&snapshot(summary(42.0, 10.0, 0.1), summary(40.0, 10.0, 0.0)));
        assert!(facts.is_empty());
    }

    #[test]
    fn test_sentiment_rules_are_asymmetric() {
        // An improvement is medium severity; a decline of the same size is high.
        let up = detect(&snapshot(summary(40.0, 10.0, 0.6), summary(40.0, 10.0, 0.0)));
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].kind, FactKind::SentimentImprovement);
        assert_eq!(up[0].severity, Severity::Medium);

        let down = detect(&snapshot(summary(40.0, 10.0, -0.6), summary(40.0, 10.0, 0.0)));
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].kind, FactKind::SentimentDecline);
        assert_eq!(down[0].severity, Severity::High);
    }

    #[test]
    fn test_competitive_threat_one_fact_per_competitor() {
        let mut snap = snapshot(summary(40.0, 10.0, 0.0), summary(40.0, 10.0, 0.0));
        let threat = |name: &str, delta_points: f64| CompetitiveLandscapeEntry {
            name: name.to_string(),
            is_brand: false,
            current: summary(50.0, 30.0, 0.0),
            visibility_delta: Delta::default(),
            share_of_answer_delta: Delta {
                absolute: delta_points,
                percentage: 0.0,
            },
            website_url: None,
        };
        snap.landscape = vec![
            threat("Rival A", 12.0),
            threat("Rival B", 3.0),
            threat("Rival C", 15.0),
        ];

        let facts = detect(&snap);
        let threats: Vec<&SummaryFact> = facts
            .iter()
            .filter(|f| f.kind == FactKind::CompetitiveThreat)
            .collect();
        assert_eq!(threats.len(), 2);
        assert!(threats[0].description.contains("Rival A"));
        assert!(threats[1].description.contains("Rival C"));
    }

    #[test]
    fn test_brand_landscape_entry_never_a_threat() {
        let mut snap = snapshot(summary(40.0, 10.0, 0.0), summary(40.0, 10.0, 0.0));
        snap.landscape = vec![CompetitiveLandscapeEntry {
            name: "Our Brand".to_string(),
            is_brand: true,
            current: summary(50.0, 30.0, 0.0),
            visibility_delta: Delta::default(),
            share_of_answer_delta: Delta {
                absolute: 20.0,
                percentage: 0.0,
            },
            website_url: None,
        }];
        assert!(detect(&snap).is_empty());
    }

    #[test]
    fn test_share_of_answer_rules() {
        let gain = detect(&snapshot(summary(40.0, 20.0, 0.0), summary(40.0, 10.0, 0.0)));
        assert_eq!(gain.len(), 1);
        assert_eq!(gain[0].kind, FactKind::ShareOfAnswerGain);

        let loss = detect(&snapshot(summary(40.0, 5.0, 0.0), summary(40.0, 10.0, 0.0)));
        assert_eq!(loss.len(), 1);
        assert_eq!(loss[0].kind, FactKind::ShareOfAnswerLoss);
    }

    #[test]
    fn test_traffic_rules_require_traffic_data() {
        let base = snapshot(summary(40.0, 10.0, 0.0), summary(40.0, 10.0, 0.0));
        assert!(detect(&base).is_empty());

        let mut with_traffic = base.clone();
        with_traffic.traffic = Some(TrafficSummary {
            current_sessions: 1300.0,
            previous_sessions: 1000.0,
            sessions_delta: Delta {
                absolute: 300.0,
                percentage: 30.0,
            },
        });
        let facts = detect(&with_traffic);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].kind, FactKind::TrafficGain);
    }

    #[test]
    fn test_output_sorted_by_severity_with_rule_order_ties() {
        // Sentiment improvement (medium, rule 3) plus SOA gain (high, rule 6):
        // the high fact sorts first even though its rule runs later.
        let facts = detect(&snapshot(summary(40.0, 20.0, 0.6), summary(40.0, 10.0, 0.0)));
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].kind, FactKind::ShareOfAnswerGain);
        assert_eq!(facts[1].kind, FactKind::SentimentImprovement);

        // Two highs keep rule order: visibility gain (rule 1) before SOA gain
        // (rule 6).
        let facts = detect(&snapshot(summary(50.0, 20.0, 0.0), summary(40.0, 10.0, 0.0)));
        assert_eq!(facts[0].kind, FactKind::VisibilityGain);
        assert_eq!(facts[1].kind, FactKind::ShareOfAnswerGain);
    }
}
