//! Event types shared by the source side, the destination side and the engine.
//!
//! `SourceEvent` is what the ICS parser hands over, `CanonicalEvent` is the
//! engine's normalized shape, and `DestinationEvent` is a record as the
//! destination calendar stores it (including fields we don't manage).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw event as produced by the ICS parser.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEvent {
    pub uid: String,
    pub summary: String,
    pub location: String,
    pub description: String,
    pub start: SourceTime,
    pub end: SourceTime,
}

/// A timestamp descriptor exactly as the feed expressed it.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceTime {
    /// All-day (VALUE=DATE)
    Date(NaiveDate),
    /// UTC time (with Z suffix)
    DateTimeUtc(DateTime<Utc>),
    /// Floating time (no timezone)
    DateTimeFloating(NaiveDateTime),
    /// Time with an explicit TZID
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
    /// Time whose TZID is only defined by the feed's own VTIMEZONE, already
    /// resolved to its UTC offset
    DateTimeOffset(DateTime<FixedOffset>),
}

/// Start or end of an event in the destination's wire shape.
///
/// Serializes as `{"date": "2025-03-20"}` or
/// `{"dateTime": "2025-03-20T15:00:00+01:00", "timeZone": "Europe/Paris"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSpec {
    Date {
        date: NaiveDate,
    },
    DateTime {
        #[serde(rename = "dateTime")]
        date_time: DateTime<FixedOffset>,
        #[serde(
            rename = "timeZone",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        time_zone: Option<String>,
    },
}

impl TimeSpec {
    pub fn date(date: NaiveDate) -> Self {
        TimeSpec::Date { date }
    }

    pub fn date_time(date_time: DateTime<FixedOffset>, time_zone: Option<String>) -> Self {
        TimeSpec::DateTime {
            date_time,
            time_zone,
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, TimeSpec::Date { .. })
    }
}

/// The engine's normalized event. Recomputed on every run, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: String,
    pub summary: String,
    pub location: String,
    pub description: String,
    pub start: TimeSpec,
    pub end: TimeSpec,
}

/// An event as stored by the destination calendar.
///
/// `id` is both the identifier matched against `CanonicalEvent::id` and the
/// handle used to address updates. Fields the engine doesn't manage (colors,
/// reminders, etags, ...) are kept in `extra` and survive updates untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationEvent {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<TimeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<TimeSpec>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DestinationEvent {
    /// Handle used to address this record in update calls.
    pub fn handle(&self) -> &str {
        &self.id
    }

    /// Copy of this record with every canonical field overlaid on top.
    pub fn overlay(&self, event: &CanonicalEvent) -> DestinationEvent {
        DestinationEvent {
            id: event.id.clone(),
            summary: event.summary.clone(),
            location: event.location.clone(),
            description: event.description.clone(),
            start: Some(event.start.clone()),
            end: Some(event.end.clone()),
            extra: self.extra.clone(),
        }
    }
}

impl From<&CanonicalEvent> for DestinationEvent {
    fn from(event: &CanonicalEvent) -> Self {
        DestinationEvent {
            id: event.id.clone(),
            summary: event.summary.clone(),
            location: event.location.clone(),
            description: event.description.clone(),
            start: Some(event.start.clone()),
            end: Some(event.end.clone()),
            extra: serde_json::Map::new(),
        }
    }
}

/// One configured destination: a calendar fed by one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub id: String,
    pub feed_url: String,
}

impl Destination {
    pub fn new(id: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            feed_url: feed_url.into(),
        }
    }
}
