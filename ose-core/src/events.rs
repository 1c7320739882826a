//! Activity events
//!
//! Raw records arrive from ingestion with every field optional; validation
//! turns them into immutable `ActivityEvent`s or a `MalformedEvent` reason.

use chrono::{DateTime, NaiveDate};
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable company key shared by every entity
pub type CompanyId = String;

/// Why a raw record could not become an event
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventError {
    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("unparseable event date: {value:?}")]
    InvalidDate { value: String },
}

/// An event record as supplied by ingestion
///
/// Scalars of any JSON type are read as text (SIREN numbers often arrive as
/// integers); nested objects and arrays read as absent. Either way the record
/// reaches validation instead of failing to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawActivityRecord {
    #[serde(default, alias = "siren", deserialize_with = "lenient_text")]
    pub company_id: Option<String>,
    #[serde(default, alias = "category", deserialize_with = "lenient_text")]
    pub raw_category: Option<String>,
    #[serde(default, alias = "publishedAt", deserialize_with = "lenient_text")]
    pub event_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub source: Option<String>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    deserializer.deserialize_any(LenientText)
}

struct LenientText;

impl<'de> Visitor<'de> for LenientText {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(LenientText)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

/// A dated, categorized occurrence about a company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub company_id: CompanyId,
    pub raw_category: String,
    /// Filled by the normalizer; `None` when the tag is not in the taxonomy
    pub canonical_category: Option<String>,
    pub event_date: NaiveDate,
    pub source: String,
}

impl ActivityEvent {
    /// Validate a raw record
    pub fn from_raw(raw: &RawActivityRecord) -> Result<Self, EventError> {
        let company_id = required(&raw.company_id, "company_id")?;
        let raw_category = required(&raw.raw_category, "raw_category")?;
        let date_str = required(&raw.event_date, "event_date")?;
        let source = required(&raw.source, "source")?;

        let event_date = parse_event_date(&date_str).ok_or(EventError::InvalidDate {
            value: date_str.clone(),
        })?;

        Ok(Self {
            company_id,
            raw_category,
            canonical_category: None,
            event_date,
            source,
        })
    }

    pub fn is_recognized(&self) -> bool {
        self.canonical_category.is_some()
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String, EventError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(EventError::MissingField {
            field: field.to_string(),
        }),
    }
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp (calendar date of its own offset)
pub fn parse_event_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Non-fatal issues recorded while preparing a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchWarning {
    /// Record excluded from aggregation
    MalformedEvent {
        /// Position in the input stream
        index: usize,
        company_id: Option<String>,
        reason: EventError,
    },
    /// Event kept but excluded from signal counts
    UnrecognizedCategory {
        company_id: CompanyId,
        raw_category: String,
    },
}
