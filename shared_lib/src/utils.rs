use chrono::NaiveDateTime;

/// Timestamp layout used by the telephony provider and by the call tables.
pub const CALL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn duration_to_ms_string(duration: std::time::Duration) -> String {
    let milliseconds = duration.as_secs_f64() * 1000.0;
    format!("{milliseconds:.2}ms")
}

/// Parses a provider timestamp, returning `None` for absent, blank or malformed values.
pub fn parse_call_timestamp(field: &str, value: Option<&str>) -> Option<NaiveDateTime> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    match NaiveDateTime::parse_from_str(value, CALL_TIMESTAMP_FORMAT) {
        Ok(timestamp) => Some(timestamp),
        Err(e) => {
            tracing::warn!("Invalid datetime format for {}: {:?} ({})", field, value, e);
            None
        }
    }
}

pub fn format_call_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(CALL_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate, Timelike};

    use super::*;

    #[test]
    fn parses_provider_timestamp() {
        let parsed = parse_call_timestamp("start_time", Some("2024-01-15 10:30:00"))
            .expect("timestamp should parse");

        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), 1);
        assert_eq!(parsed.day(), 15);
        assert_eq!(parsed.hour(), 10);
        assert_eq!(parsed.minute(), 30);
        assert_eq!(parsed.second(), 0);
    }

    #[test]
    fn malformed_timestamps_become_none() {
        assert_eq!(parse_call_timestamp("end_time", Some("not-a-date")), None);
        assert_eq!(parse_call_timestamp("end_time", Some("2024-01-15T10:30:00")), None);
        assert_eq!(parse_call_timestamp("end_time", Some("2024-13-40 10:30:00")), None);
        assert_eq!(parse_call_timestamp("end_time", Some("   ")), None);
        assert_eq!(parse_call_timestamp("end_time", None), None);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert!(parse_call_timestamp("answer_stamp", Some(" 2024-01-15 10:30:00 ")).is_some());
    }

    #[test]
    fn formats_back_to_provider_layout() {
        let timestamp = NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|date| date.and_hms_opt(10, 30, 0))
            .unwrap();
        assert_eq!(format_call_timestamp(&timestamp), "2024-01-15 10:30:00");
    }

    #[test]
    fn duration_formatting() {
        let duration = std::time::Duration::from_micros(1_500);
        assert_eq!(duration_to_ms_string(duration), "1.50ms");
    }
}
