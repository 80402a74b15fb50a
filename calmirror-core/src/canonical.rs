//! Conversion of raw feed events into the canonical event shape.

use chrono::{Duration, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::error::{MirrorError, MirrorResult};
use crate::event::{CanonicalEvent, SourceEvent, SourceTime, TimeSpec};

/// Derive a destination-safe event id from a source UID.
///
/// Keeps only base32hex characters (`0-9`, `a-v`, case-insensitive), in their
/// original order, lowercased. `"9B37-XYZ@group"` becomes `"9b37group"`.
pub fn derive_id(uid: &str) -> MirrorResult<String> {
    let id: String = uid
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| matches!(c, '0'..='9' | 'a'..='v'))
        .collect();

    if id.is_empty() {
        return Err(MirrorError::MalformedIdentifier(uid.to_string()));
    }

    Ok(id)
}

/// Convert a raw parsed event into a `CanonicalEvent`.
pub fn canonicalize(raw: &SourceEvent) -> MirrorResult<CanonicalEvent> {
    Ok(CanonicalEvent {
        id: derive_id(&raw.uid)?,
        summary: raw.summary.clone(),
        location: raw.location.clone(),
        description: raw.description.clone(),
        start: to_time_spec(&raw.uid, &raw.start)?,
        end: to_time_spec(&raw.uid, &raw.end)?,
    })
}

fn to_time_spec(uid: &str, time: &SourceTime) -> MirrorResult<TimeSpec> {
    match time {
        SourceTime::Date(d) => Ok(TimeSpec::date(*d)),
        SourceTime::DateTimeUtc(dt) => Ok(TimeSpec::date_time(dt.fixed_offset(), None)),
        // No zone given: the destination reads it as UTC
        SourceTime::DateTimeFloating(naive) => {
            Ok(TimeSpec::date_time(naive.and_utc().fixed_offset(), None))
        }
        SourceTime::DateTimeZoned { datetime, tzid } => {
            let name = tzid.trim_matches('"');
            let tz: Tz = name.parse().map_err(|_| MirrorError::UnknownTimeZone {
                uid: uid.to_string(),
                tzid: tzid.clone(),
            })?;
            let instant = resolve_local(&tz, datetime).ok_or_else(|| {
                MirrorError::InvalidLocalTime {
                    datetime: datetime.to_string(),
                    tzid: tzid.clone(),
                }
            })?;
            Ok(TimeSpec::date_time(instant, Some(name.to_string())))
        }
        // The feed's zone name isn't an IANA name, so only the offset is sent
        SourceTime::DateTimeOffset(dt) => Ok(TimeSpec::date_time(*dt, None)),
    }
}

/// Resolve a wall-clock time in `tz`. Ambiguous times take the earlier instant;
/// times skipped by a DST jump are moved forward by an hour.
fn resolve_local(
    tz: &Tz,
    datetime: &NaiveDateTime,
) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    tz.from_local_datetime(datetime)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(*datetime + Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.fixed_offset())
}
