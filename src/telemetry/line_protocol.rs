use crate::mqtt::message_router::Reading;

use super::SeriesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Seconds,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Seconds => "s",
        }
    }
}

/// One point of the weather series, rendered as a line-protocol line.
///
/// Only built from readings that carry both temperature and pressure.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageWriteRequest {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, f64)>,
    timestamp: i64,
    precision: Precision,
}

impl StorageWriteRequest {
    /// `None` unless temperature and pressure are both present.
    ///
    /// The timestamp is the reading's arrival time in Unix seconds.
    pub fn from_reading(reading: &Reading, series: &SeriesConfig) -> Option<Self> {
        let temperature = reading.temperature()?;
        let pressure = reading.pressure()?;

        Some(Self {
            measurement: series.measurement.clone(),
            tags: vec![("host".to_string(), series.host_tag.clone())],
            fields: vec![
                ("temperature".to_string(), temperature),
                ("pressure".to_string(), pressure),
            ],
            timestamp: reading.timestamp().timestamp(),
            precision: Precision::Seconds,
        })
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// `weather,host=pico temperature=30.5,pressure=1012.3 1700000000`
    pub fn to_line(&self) -> String {
        let mut line = escape_measurement(&self.measurement);

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape_key(key), format_float(*value)))
            .collect();

        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&self.timestamp.to_string());
        line
    }
}

fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}

// tag keys, tag values and field keys
fn escape_key(name: &str) -> String {
    name.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

// Whole numbers keep a decimal point so the field is never read as an integer
fn format_float(value: f64) -> String {
    let rendered = value.to_string();
    if rendered.contains('.') || !value.is_finite() {
        rendered
    } else {
        format!("{}.0", rendered)
    }
}
