use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

const TEMPERATURE_KEY: &str = "temperature";
const PRESSURE_KEY: &str = "pressure";
const HUMIDITY_KEY: &str = "humidity";

/// Raw publish as delivered by the broker session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// One decoded sensor measurement.
///
/// Absent quantities stay `None`; a missing value is never reported as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    topic: String,
    temperature: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
    received_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(
        topic: impl Into<String>,
        temperature: Option<f64>,
        pressure: Option<f64>,
        humidity: Option<f64>,
    ) -> Self {
        Self::received_at(topic, temperature, pressure, humidity, Utc::now())
    }

    pub fn received_at(
        topic: impl Into<String>,
        temperature: Option<f64>,
        pressure: Option<f64>,
        humidity: Option<f64>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            topic: topic.into(),
            temperature,
            pressure,
            humidity,
            received_at,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn pressure(&self) -> Option<f64> {
        self.pressure
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Both quantities the storage series needs are present
    pub fn is_storable(&self) -> bool {
        self.temperature.is_some() && self.pressure.is_some()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn show(value: Option<f64>) -> String {
            value.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "{} [{}] temperature={} °C pressure={} hPa humidity={} %",
            self.received_at.format("%H:%M:%S"),
            self.topic,
            show(self.temperature),
            show(self.pressure),
            show(self.humidity)
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Payload on {topic} is not valid UTF-8: {reason}")]
    Encoding { topic: String, reason: String },

    #[error("Payload on {topic} is not valid JSON: {reason}")]
    Json { topic: String, reason: String },

    #[error("Payload on {topic} has an unsupported shape: {found}")]
    UnsupportedShape { topic: String, found: String },

    #[error("Payload on {topic} carries no recognized numeric field")]
    NoRecognizedField { topic: String },
}

/// Turns raw broker payloads into [`Reading`]s.
///
/// Accepts a JSON object with any of `temperature`, `pressure` and `humidity`.
/// Every other document shape is rejected, whatever topic it arrived on.
#[derive(Debug, Clone, Default)]
pub struct MessageRouter;

impl MessageRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, topic: &str, payload: &[u8]) -> Result<Reading, ParseError> {
        let text = std::str::from_utf8(payload).map_err(|e| ParseError::Encoding {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        let document: Value =
            serde_json::from_str(text.trim()).map_err(|e| ParseError::Json {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let reading = match document {
            Value::Object(fields) => reading_from_object(topic, &fields),
            other => {
                return Err(ParseError::UnsupportedShape {
                    topic: topic.to_string(),
                    found: json_kind(&other).to_string(),
                })
            }
        }?;

        debug!("Routed {}", reading);
        Ok(reading)
    }
}

fn reading_from_object(topic: &str, fields: &Map<String, Value>) -> Result<Reading, ParseError> {
    let number = |key: &str| fields.get(key).and_then(Value::as_f64);

    let temperature = number(TEMPERATURE_KEY);
    let pressure = number(PRESSURE_KEY);
    let humidity = number(HUMIDITY_KEY);

    if temperature.is_none() && pressure.is_none() && humidity.is_none() {
        return Err(ParseError::NoRecognizedField {
            topic: topic.to_string(),
        });
    }

    Ok(Reading::new(topic, temperature, pressure, humidity))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn router() -> MessageRouter {
        MessageRouter::new()
    }

    #[test]
    fn parses_temperature_and_pressure() {
        let before = Utc::now();
        let reading = router()
            .route(
                "sensors/temperature",
                br#"{"temperature":30.5,"pressure":1012.3}"#,
            )
            .unwrap();

        assert_eq!(reading.temperature(), Some(30.5));
        assert_eq!(reading.pressure(), Some(1012.3));
        assert_eq!(reading.humidity(), None);
        assert_eq!(reading.topic(), "sensors/temperature");
        assert!(reading.timestamp() >= before);
        assert!(reading.is_storable());
    }

    #[test]
    fn missing_fields_are_none_not_zero() {
        let reading = router()
            .route("sensors/data", br#"{"pressure":1000.0}"#)
            .unwrap();

        assert_eq!(reading.temperature(), None);
        assert_eq!(reading.pressure(), Some(1000.0));
        assert!(!reading.is_storable());
    }

    #[test]
    fn integer_values_are_accepted() {
        let reading = router()
            .route("sensors/data", br#"{"temperature":21,"pressure":1005}"#)
            .unwrap();

        assert_eq!(reading.temperature(), Some(21.0));
        assert_eq!(reading.pressure(), Some(1005.0));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let reading = router()
            .route("sensors/data", b"  {\"humidity\": 40.5}\n")
            .unwrap();

        assert_eq!(reading.humidity(), Some(40.5));
    }

    #[test]
    fn garbage_is_a_json_error() {
        let err = router().route("sensors/data", b"garbage").unwrap_err();
        assert!(matches!(err, ParseError::Json { .. }));
    }

    #[test]
    fn json_string_is_an_unsupported_shape() {
        let err = router().route("sensors/data", br#""garbage""#).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnsupportedShape {
                topic: "sensors/data".to_string(),
                found: "string".to_string(),
            }
        );
    }

    #[test]
    fn object_without_known_fields_is_rejected() {
        let err = router()
            .route("sensors/data", br#"{"voltage":3.3}"#)
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::NoRecognizedField {
                topic: "sensors/data".to_string()
            }
        );
    }

    #[test]
    fn non_numeric_known_field_counts_as_absent() {
        let reading = router()
            .route("sensors/data", br#"{"temperature":"hot","pressure":990.1}"#)
            .unwrap();
        assert_eq!(reading.temperature(), None);
        assert_eq!(reading.pressure(), Some(990.1));

        let err = router()
            .route("sensors/data", br#"{"temperature":null}"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::NoRecognizedField { .. }));
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        let err = router().route("sensors/data", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ParseError::Encoding { .. }));
    }

    #[test]
    fn bare_number_is_rejected_on_every_topic() {
        let r = router();

        for (topic, payload) in [
            ("sensors/temperature", &b"27.0"[..]),
            ("sensors/pressure", b"1009.8"),
            ("sensors/humidity", b"55"),
            ("sensors/data", b"23.4"),
        ] {
            let err = r.route(topic, payload).unwrap_err();
            assert_eq!(
                err,
                ParseError::UnsupportedShape {
                    topic: topic.to_string(),
                    found: "number".to_string(),
                }
            );
        }
    }

    #[test]
    fn single_quantity_object_on_its_own_topic_is_accepted() {
        let reading = router()
            .route("sensors/temperature", br#"{"temperature":27.0}"#)
            .unwrap();

        assert_eq!(reading.temperature(), Some(27.0));
        assert_eq!(reading.pressure(), None);
        assert!(!reading.is_storable());
    }
}
