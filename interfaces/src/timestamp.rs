//! Fixed-width RFC 3339 timestamps.
//!
//! Every timestamp written to the document store goes through this format
//! (`2025-08-01T09:30:00.000000Z`), so string order equals time order in
//! any backend that compares the stored text.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn format(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A timestamp as a JSON value, for use in store filters.
pub fn to_value(value: &DateTime<Utc>) -> serde_json::Value {
    serde_json::Value::String(format(value))
}

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

pub mod option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&super::format(value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(raw) if !raw.is_empty() => DateTime::parse_from_rfc3339(&raw)
                .map(|parsed| Some(parsed.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_is_fixed_width_and_ordered() {
        let whole = Utc.with_ymd_and_hms(2025, 8, 1, 9, 30, 0).unwrap();
        let fraction = whole + Duration::milliseconds(500);

        assert_eq!(format(&whole), "2025-08-01T09:30:00.000000Z");
        assert_eq!(format(&whole).len(), format(&fraction).len());
        assert!(format(&whole) < format(&fraction));
    }

    #[test]
    fn test_deserialize_accepts_offsets() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "crate::timestamp")]
            at: DateTime<Utc>,
        }

        let wrapper: Wrapper = serde_json::from_str(r#"{"at":"2025-08-01T11:30:00+02:00"}"#).unwrap();
        assert_eq!(wrapper.at, Utc.with_ymd_and_hms(2025, 8, 1, 9, 30, 0).unwrap());
    }
}
