use super::{MigrationError, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// The earliest representable instant. Every time-versioned property starts here.
pub const START_OF_TIME: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// The latest representable instant.
pub const END_OF_TIME: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

const START_OF_TIME_LITERAL: &str = "START_OF_TIME";

/// Parse an instant from operator text: `START_OF_TIME` or RFC 3339.
pub fn parse_instant(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if text.eq_ignore_ascii_case(START_OF_TIME_LITERAL) {
        return Ok(START_OF_TIME);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| MigrationError::InvalidArgument(format!("Invalid instant '{}': {}", text, e)))
}

/// Inverse of [`parse_instant`].
pub fn format_instant(instant: DateTime<Utc>) -> String {
    if instant == START_OF_TIME {
        START_OF_TIME_LITERAL.to_string()
    } else {
        instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

/// Serde adapter storing an instant as `(seconds, nanos)`.
///
/// RFC 3339 text cannot express the extreme years of [`START_OF_TIME`], so
/// stored property keys use the numeric form.
pub mod serde_instant {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        instant: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        (instant.timestamp(), instant.timestamp_subsec_nanos()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let (secs, nanos) = <(i64, u32)>::deserialize(deserializer)?;
        DateTime::from_timestamp(secs, nanos)
            .ok_or_else(|| D::Error::custom(format!("instant out of range: {}s {}ns", secs, nanos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of_time_literal_round_trips() {
        assert_eq!(parse_instant("START_OF_TIME").unwrap(), START_OF_TIME);
        assert_eq!(format_instant(START_OF_TIME), "START_OF_TIME");
    }

    #[test]
    fn test_rfc3339_round_trips() {
        let instant = parse_instant("2020-12-02T00:00:00Z").unwrap();
        assert_eq!(format_instant(instant), "2020-12-02T00:00:00Z");
        assert_eq!(parse_instant(&format_instant(instant)).unwrap(), instant);
    }

    #[test]
    fn test_offsets_are_normalized_to_utc() {
        let instant = parse_instant("2020-12-02T02:00:00+02:00").unwrap();
        assert_eq!(format_instant(instant), "2020-12-02T00:00:00Z");
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn test_numeric_form_covers_start_of_time() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Holder {
            #[serde(with = "serde_instant")]
            at: DateTime<Utc>,
        }

        let bytes = rmp_serde::to_vec_named(&Holder { at: START_OF_TIME }).unwrap();
        let back: Holder = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back.at, START_OF_TIME);
    }
}
