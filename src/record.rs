use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One raw brand-visibility measurement: how a single answer engine treated
/// an entity for one query, on one day, citing one source.
///
/// Records are immutable once produced and owned by the record source. The
/// aggregation core never mutates them and never sees out-of-range values:
/// every row passes through [`MetricRecord::normalize`] at the source
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub entity_id: String,
    pub query_id: String,
    pub topic: String,
    pub source_domain: String,
    /// Which answer engine produced this measurement.
    pub collector_type: String,
    /// Fraction of the response in which the entity appears, 0..1.
    pub visibility_index: f64,
    /// Share of answer attention attributable to the entity, 0..100.
    pub share_of_answer: f64,
    /// Tone toward the entity, -1..1.
    pub sentiment_score: f64,
    pub has_brand_presence: bool,
    /// First rank at which the entity appeared, if it ranked at all.
    /// Absent means "never first-ranked" — never encoded as zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_position: Option<u32>,
    /// All ranks at which the entity appeared; empty when unranked.
    #[serde(default)]
    pub positions: Vec<u32>,
    pub recorded_at: NaiveDate,
}

impl MetricRecord {
    /// Mean of this record's position list, or `None` when the record has no
    /// ranked appearance. Unranked records must not contribute a zero to any
    /// position average.
    pub fn mean_position(&self) -> Option<f64> {
        if self.positions.is_empty() {
            return None;
        }
        let sum: u32 = self.positions.iter().sum();
        Some(sum as f64 / self.positions.len() as f64)
    }

    /// Clamp out-of-range metric values and drop non-positive ranks.
    ///
    /// Storage rows and ingest payloads pass through here so downstream code
    /// never branches on out-of-range ambiguity.
    pub fn normalize(mut self) -> Self {
        self.visibility_index = self.visibility_index.clamp(0.0, 1.0);
        self.share_of_answer = self.share_of_answer.clamp(0.0, 100.0);
        self.sentiment_score = self.sentiment_score.clamp(-1.0, 1.0);
        self.positions.retain(|&p| p > 0);
        if self.first_position == Some(0) {
            self.first_position = None;
        }
        self
    }

    /// Reject records that cannot be attributed to an entity, query, or
    /// collector. Called on ingest, before normalization.
    pub fn validate(&self) -> Result<()> {
        if self.entity_id.trim().is_empty() {
            return Err(Error::InvalidRecord("missing entity_id".into()));
        }
        if self.query_id.trim().is_empty() {
            return Err(Error::InvalidRecord("missing query_id".into()));
        }
        if self.collector_type.trim().is_empty() {
            return Err(Error::InvalidRecord("missing collector_type".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entity_id: &str) -> MetricRecord {
        MetricRecord {
            entity_id: entity_id.to_string(),
            query_id: "q1".to_string(),
            topic: "general".to_string(),
            source_domain: "example.com".to_string(),
            collector_type: "assistant_a".to_string(),
            visibility_index: 0.5,
            share_of_answer: 20.0,
            sentiment_score: 0.3,
            has_brand_presence: true,
            first_position: Some(3),
            positions: vec![3],
            recorded_at: NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
        }
    }

    #[test]
    fn test_mean_position_empty_is_none() {
        let mut r = record("e1");
        r.positions = vec![];
        assert_eq!(r.mean_position(), None);
    }

    #[test]
    fn test_mean_position_averages_ranks() {
        let mut r = record("e1");
        r.positions = vec![1, 2, 6];
        assert_eq!(r.mean_position(), Some(3.0));
    }

    #[test]
    fn test_normalize_clamps_ranges() {
        let mut r = record("e1");
        r.visibility_index = 1.7;
        r.share_of_answer = -4.0;
        r.sentiment_score = -3.0;
        r.positions = vec![0, 2];
        r.first_position = Some(0);
        let r = r.normalize();
        assert_eq!(r.visibility_index, 1.0);
        assert_eq!(r.share_of_answer, 0.0);
        assert_eq!(r.sentiment_score, -1.0);
        assert_eq!(r.positions, vec![2]);
        assert_eq!(r.first_position, None);
    }

    #[test]
    fn test_validate_rejects_blank_identifiers() {
        let mut r = record("e1");
        assert!(r.validate().is_ok());
        r.entity_id = " ".to_string();
        assert!(r.validate().is_err());
    }
}
