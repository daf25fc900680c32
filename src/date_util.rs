use chrono::NaiveDate;

/// Round a metric to 2 decimal places. Every reported number passes through
/// here so repeated runs over the same records produce bit-identical output.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Format a date as the `YYYY-MM-DD` key used in fact tables.
pub fn date_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` date key.
pub fn parse_date_key(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Strip markdown code fences from LLM responses.
pub fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = s.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.344999), 12.34);
        assert_eq!(round2(12.345001), 12.35);
        assert_eq!(round2(-100.0), -100.0);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(1.0 / 3.0), 0.33);
    }

    #[test]
    fn test_date_key_round_trip() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(date_key(d), "2025-03-09");
        assert_eq!(parse_date_key("2025-03-09"), Some(d));
        assert_eq!(parse_date_key("garbage"), None);
    }

    #[test]
    fn test_strip_code_fences_json() {
        assert_eq!(
            strip_code_fences("```json\n{\"key\": \"value\"}\n```"),
            "{\"key\": \"value\"}"
        );
    }

    #[test]
    fn test_strip_code_fences_none() {
        assert_eq!(
            strip_code_fences("{\"key\": \"value\"}"),
            "{\"key\": \"value\"}"
        );
    }
}
