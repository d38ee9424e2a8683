// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Textual time codecs used by the Semtech UDP JSON payloads.
//!
//! The packet forwarder uses two distinct encodings:
//! - a compact ISO-8601 form for per-packet timestamps (`rxpk.time`),
//! - an expanded human-readable form for the stats block (`stat.time`),
//!   fixed to the layout `2016-01-06 09:20:23 GMT`.
//!
//! Both are part of the wire contract: some gateway firmwares parse these
//! fields literally, so the exact layouts must be preserved.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const EXPANDED_LAYOUT: &str = "%Y-%m-%d %H:%M:%S GMT";

/// Compact ISO-8601 timestamp (`2016-01-06T09:20:23Z`).
///
/// The zero value encodes as JSON `null`, matching the reference forwarder
/// behavior for gateways without a time source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactTime(pub DateTime<Utc>);

impl CompactTime {
    /// True when this is the zero value (serialized as `null`).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == DateTime::<Utc>::default()
    }
}

impl Default for CompactTime {
    fn default() -> Self {
        Self(DateTime::<Utc>::default())
    }
}

impl From<DateTime<Utc>> for CompactTime {
    fn from(t: DateTime<Utc>) -> Self {
        Self(t)
    }
}

impl fmt::Display for CompactTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Serialize for CompactTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_zero() {
            serializer.serialize_unit()
        } else {
            serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
    }
}

impl<'de> Deserialize<'de> for CompactTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let parsed = DateTime::parse_from_rfc3339(&s).map_err(D::Error::custom)?;
        Ok(Self(parsed.with_timezone(&Utc)))
    }
}

/// Expanded stats timestamp (`2016-01-06 09:20:23 GMT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandedTime(pub DateTime<Utc>);

impl From<DateTime<Utc>> for ExpandedTime {
    fn from(t: DateTime<Utc>) -> Self {
        Self(t)
    }
}

impl fmt::Display for ExpandedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(EXPANDED_LAYOUT))
    }
}

impl Serialize for ExpandedTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.format(EXPANDED_LAYOUT).to_string())
    }
}

impl<'de> Deserialize<'de> for ExpandedTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&s, EXPANDED_LAYOUT).map_err(D::Error::custom)?;
        Ok(Self(Utc.from_utc_datetime(&naive)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_time() -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(2016, 1, 6)
            .expect("valid date")
            .and_hms_opt(9, 20, 23)
            .expect("valid time");
        Utc.from_utc_datetime(&naive)
    }

    #[test]
    fn test_compact_time_roundtrip() {
        let t = CompactTime::from(sample_time());
        let json = serde_json::to_string(&t).expect("serialize should succeed");
        assert_eq!(json, "\"2016-01-06T09:20:23Z\"");

        let back: CompactTime = serde_json::from_str(&json).expect("parse should succeed");
        assert_eq!(back, t);
    }

    #[test]
    fn test_compact_time_zero_is_null() {
        let json = serde_json::to_string(&CompactTime::default()).expect("serialize");
        assert_eq!(json, "null");
    }

    #[test]
    fn test_expanded_time_roundtrip() {
        let t = ExpandedTime::from(sample_time());
        let json = serde_json::to_string(&t).expect("serialize should succeed");
        assert_eq!(json, "\"2016-01-06 09:20:23 GMT\"");

        let back: ExpandedTime = serde_json::from_str(&json).expect("parse should succeed");
        assert_eq!(back, t);
    }

    #[test]
    fn test_expanded_time_rejects_compact_form() {
        let result = serde_json::from_str::<ExpandedTime>("\"2016-01-06T09:20:23Z\"");
        assert!(result.is_err());
    }
}
