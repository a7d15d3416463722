use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::NaiveDateTime;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

use crate::utils::parse_call_timestamp;

pub const DEFAULT_HANGUP_CAUSE: &str = "unknown";

/// The four call classifications. Each maps to exactly one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallCategory {
    AnsweredOutbound,
    AnsweredInbound,
    MissedOutbound,
    MissedInbound,
}

impl CallCategory {
    pub const ALL: [CallCategory; 4] = [
        CallCategory::AnsweredOutbound,
        CallCategory::AnsweredInbound,
        CallCategory::MissedOutbound,
        CallCategory::MissedInbound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallCategory::AnsweredOutbound => "answered_outbound",
            CallCategory::AnsweredInbound => "answered_inbound",
            CallCategory::MissedOutbound => "missed_outbound",
            CallCategory::MissedInbound => "missed_inbound",
        }
    }

    /// SQL identifier of the backing table. The only source of table names in statements.
    pub fn table(&self) -> &'static str {
        match self {
            CallCategory::AnsweredOutbound => "answered_outbound_calls",
            CallCategory::AnsweredInbound => "answered_inbound_calls",
            CallCategory::MissedOutbound => "missed_outbound_calls",
            CallCategory::MissedInbound => "missed_inbound_calls",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CallCategory::AnsweredOutbound => "Answered outbound",
            CallCategory::AnsweredInbound => "Answered inbound",
            CallCategory::MissedOutbound => "Missed outbound",
            CallCategory::MissedInbound => "Missed inbound",
        }
    }
}

impl Display for CallCategory {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CallCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CallCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown call category: {s:?}"))
    }
}

/// `call_duration` is stored as whatever scalar the provider sent. Booleans and integers
/// outside the i64 range keep their exact JSON text.
#[derive(Debug, Clone, PartialEq)]
pub enum CallDuration {
    Integer(i64),
    Real(f64),
    Text(String),
}

#[derive(Debug, PartialEq)]
pub enum PayloadError {
    Empty,
    Invalid(String),
}

impl Display for PayloadError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PayloadError::Empty => write!(f, "no data received"),
            PayloadError::Invalid(reason) => write!(f, "invalid payload: {reason}"),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Webhook body as sent by the telephony provider. Unknown fields are ignored.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CallEventPayload {
    #[serde(rename = "callID", default, deserialize_with = "lenient_string")]
    pub call_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dispnumber: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub caller_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub answer_stamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_duration")]
    pub call_duration: Option<CallDuration>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub destination: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub resource_url: Option<String>,
    #[serde(rename = "missedFrom", default, deserialize_with = "lenient_string")]
    pub missed_from: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hangup_cause: Option<String>,
}

impl CallEventPayload {
    /// Decodes a raw request body. Empty bodies and empty or non-object JSON count as "no data".
    pub fn from_json_bytes(body: &[u8]) -> Result<Self, PayloadError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(PayloadError::Empty);
        }

        let value: Value =
            serde_json::from_slice(body).map_err(|e| PayloadError::Invalid(e.to_string()))?;

        match &value {
            Value::Null => return Err(PayloadError::Empty),
            Value::Object(map) if map.is_empty() => return Err(PayloadError::Empty),
            Value::Object(_) => {}
            _ => return Err(PayloadError::Invalid("expected a JSON object".to_string())),
        }

        serde_json::from_value(value).map_err(|e| PayloadError::Invalid(e.to_string()))
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

fn lenient_duration<'de, D>(deserializer: D) -> Result<Option<CallDuration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(match (n.as_i64(), n.is_f64()) {
            (Some(seconds), _) => CallDuration::Integer(seconds),
            (None, true) => CallDuration::Real(n.as_f64().unwrap_or_default()),
            (None, false) => CallDuration::Text(n.to_string()),
        })),
        Some(Value::String(s)) => Ok(Some(CallDuration::Text(s))),
        Some(Value::Bool(b)) => Ok(Some(CallDuration::Text(b.to_string()))),
        Some(other) => Err(de::Error::custom(format!(
            "expected a number or string for call_duration, got {other}"
        ))),
    }
}

/// A normalized call event, ready to be written to its category table.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEventRecord {
    pub category: CallCategory,
    pub call_id: Option<String>,
    pub dispnumber: Option<String>,
    pub caller_id: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub answer_stamp: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub call_duration: Option<CallDuration>,
    pub destination: Option<String>,
    pub status: Option<String>,
    pub resource_url: Option<String>,
    pub missed_from: Option<String>,
    pub hangup_cause: String,
}

impl CallEventRecord {
    pub fn from_payload(category: CallCategory, payload: CallEventPayload) -> Self {
        CallEventRecord {
            category,
            start_time: parse_call_timestamp("start_time", payload.start_time.as_deref()),
            answer_stamp: parse_call_timestamp("answer_stamp", payload.answer_stamp.as_deref()),
            end_time: parse_call_timestamp("end_time", payload.end_time.as_deref()),
            call_id: payload.call_id,
            dispnumber: payload.dispnumber,
            caller_id: payload.caller_id,
            call_duration: payload.call_duration,
            destination: payload.destination,
            status: payload.status,
            resource_url: payload.resource_url,
            missed_from: payload.missed_from,
            hangup_cause: payload
                .hangup_cause
                .unwrap_or_else(|| DEFAULT_HANGUP_CAUSE.to_string()),
        }
    }

    /// The stored `callType` always names the category the event arrived on.
    pub fn call_type(&self) -> &'static str {
        self.category.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_round_trip_through_names() {
        for category in CallCategory::ALL {
            assert_eq!(category.as_str().parse::<CallCategory>().unwrap(), category);
            assert!(category.table().starts_with(category.as_str()));
            assert!(category.table().ends_with("_calls"));
        }
    }

    #[test]
    fn unknown_categories_are_rejected() {
        for name in [
            "",
            "answered",
            "ANSWERED_OUTBOUND",
            "answered_outbound_calls",
            "missed_inbound; DROP TABLE missed_inbound_calls",
        ] {
            assert!(name.parse::<CallCategory>().is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn empty_bodies_are_reported_as_no_data() {
        assert_eq!(CallEventPayload::from_json_bytes(b"").unwrap_err(), PayloadError::Empty);
        assert_eq!(CallEventPayload::from_json_bytes(b"  \n").unwrap_err(), PayloadError::Empty);
        assert_eq!(CallEventPayload::from_json_bytes(b"{}").unwrap_err(), PayloadError::Empty);
        assert_eq!(CallEventPayload::from_json_bytes(b"null").unwrap_err(), PayloadError::Empty);
    }

    #[test]
    fn malformed_bodies_are_invalid() {
        let bodies: [&[u8]; 4] = [
            b"{\"callID\":",
            b"[1, 2]",
            b"\"call\"",
            b"{\"callID\": {\"a\": 1}}",
        ];
        for body in bodies {
            assert!(matches!(
                CallEventPayload::from_json_bytes(body),
                Err(PayloadError::Invalid(_))
            ));
        }
    }

    #[test]
    fn payload_accepts_numbers_and_ignores_unknown_fields() {
        let body = br#"{
            "callID": 987654,
            "dispnumber": "+15550100",
            "caller_id": 15550199,
            "call_duration": 42,
            "callType": "something_else",
            "extra": {"nested": true}
        }"#;

        let payload = CallEventPayload::from_json_bytes(body).unwrap();
        assert_eq!(payload.call_id.as_deref(), Some("987654"));
        assert_eq!(payload.caller_id.as_deref(), Some("15550199"));
        assert_eq!(payload.call_duration, Some(CallDuration::Integer(42)));
        assert_eq!(payload.hangup_cause, None);
    }

    #[test]
    fn call_duration_passes_through_any_scalar() {
        let text = CallEventPayload::from_json_bytes(br#"{"call_duration": "00:01:12"}"#).unwrap();
        assert_eq!(text.call_duration, Some(CallDuration::Text("00:01:12".into())));

        let real = CallEventPayload::from_json_bytes(br#"{"call_duration": 12.5}"#).unwrap();
        assert_eq!(real.call_duration, Some(CallDuration::Real(12.5)));

        let null = CallEventPayload::from_json_bytes(br#"{"call_duration": null}"#).unwrap();
        assert_eq!(null.call_duration, None);

        let flag = CallEventPayload::from_json_bytes(br#"{"call_duration": true}"#).unwrap();
        assert_eq!(flag.call_duration, Some(CallDuration::Text("true".into())));
    }

    #[test]
    fn oversized_call_duration_keeps_exact_digits() {
        let body = br#"{"call_duration": 18446744073709551615}"#;
        let payload = CallEventPayload::from_json_bytes(body).unwrap();
        assert_eq!(
            payload.call_duration,
            Some(CallDuration::Text("18446744073709551615".into()))
        );

        let negative = CallEventPayload::from_json_bytes(br#"{"call_duration": -3}"#).unwrap();
        assert_eq!(negative.call_duration, Some(CallDuration::Integer(-3)));
    }

    #[test]
    fn nested_call_duration_is_invalid() {
        assert!(matches!(
            CallEventPayload::from_json_bytes(br#"{"call_duration": [1]}"#),
            Err(PayloadError::Invalid(_))
        ));
    }

    #[test]
    fn record_normalizes_payload() {
        let payload = CallEventPayload::from_json_bytes(
            br#"{
                "callID": "abc-123",
                "start_time": "2024-01-15 10:30:00",
                "answer_stamp": "not-a-date",
                "missedFrom": "+15550123"
            }"#,
        )
        .unwrap();

        let record = CallEventRecord::from_payload(CallCategory::MissedInbound, payload);
        assert_eq!(record.call_type(), "missed_inbound");
        assert_eq!(record.hangup_cause, DEFAULT_HANGUP_CAUSE);
        assert!(record.start_time.is_some());
        assert_eq!(record.answer_stamp, None);
        assert_eq!(record.end_time, None);
        assert_eq!(record.missed_from.as_deref(), Some("+15550123"));
    }

    #[test]
    fn explicit_hangup_cause_is_kept() {
        let payload =
            CallEventPayload::from_json_bytes(br#"{"hangup_cause": "NORMAL_CLEARING"}"#).unwrap();
        let record = CallEventRecord::from_payload(CallCategory::AnsweredInbound, payload);
        assert_eq!(record.hangup_cause, "NORMAL_CLEARING");
    }
}
