pub mod analytics;
pub mod assessments;
pub mod catalog;
pub mod progress;
pub mod sessions;

use chrono::{DateTime, SecondsFormat, Utc};

pub fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub fn from_millis(value: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value).unwrap_or_default()
}

pub fn millis_to_iso(value: i64) -> String {
    from_millis(value).to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
