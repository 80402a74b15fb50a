//! ICS feed parsing using the icalendar crate's parser.

use std::collections::HashMap;

use chrono::Duration;
use chrono_tz::Tz;
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, read_calendar, unfold},
};
use tracing::warn;

use crate::error::{MirrorError, MirrorResult};
use crate::event::{SourceEvent, SourceTime};
use crate::ports::IcsParser;
use crate::vtimezone::{self, FeedTimeZone};

/// `IcsParser` backed by `icalendar::parser`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IcalParser;

impl IcsParser for IcalParser {
    fn parse(&self, text: &str) -> MirrorResult<Vec<SourceEvent>> {
        parse_feed(text)
    }
}

/// Parse every single (non-recurring) VEVENT of a feed into a `SourceEvent`.
///
/// Recurring masters (RRULE/RDATE) and their instance overrides (RECURRENCE-ID)
/// are skipped. Events without DTSTART are skipped with a warning. TZIDs that
/// aren't IANA names are resolved through the feed's VTIMEZONE components.
pub fn parse_feed(text: &str) -> MirrorResult<Vec<SourceEvent>> {
    let unfolded = unfold(text);
    let calendar = read_calendar(&unfolded).map_err(|e| MirrorError::Parse(e.to_string()))?;
    let zones = vtimezone::collect(&calendar.components);

    let mut events = Vec::new();

    for vevent in calendar.components.iter().filter(|c| c.name == "VEVENT") {
        let uid = vevent.find_prop("UID").map(|p| p.val.to_string());

        if vevent.find_prop("RECURRENCE-ID").is_some() {
            continue;
        }
        if vevent.find_prop("RRULE").is_some() || vevent.find_prop("RDATE").is_some() {
            warn!(uid = ?uid, "Skipping recurring VEVENT");
            continue;
        }

        match parse_vevent(vevent) {
            Some(mut event) => {
                event.start = resolve_feed_zone(event.start, &zones);
                event.end = resolve_feed_zone(event.end, &zones);
                events.push(event);
            }
            None => warn!(uid = ?uid, "Skipping VEVENT without a usable DTSTART"),
        }
    }

    Ok(events)
}

/// Swap a zoned time whose TZID is unknown to the IANA database for the
/// instant given by the feed's own definition of that TZID.
fn resolve_feed_zone(time: SourceTime, zones: &HashMap<String, FeedTimeZone>) -> SourceTime {
    let SourceTime::DateTimeZoned { datetime, tzid } = &time else {
        return time;
    };
    let name = tzid.trim_matches('"');
    if name.parse::<Tz>().is_ok() {
        return time;
    }

    match zones.get(name).and_then(|zone| zone.resolve(datetime)) {
        Some(instant) => SourceTime::DateTimeOffset(instant),
        None => time,
    }
}

fn parse_vevent(vevent: &Component) -> Option<SourceEvent> {
    // A missing UID is rejected later as a malformed identifier
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .unwrap_or_default();

    let start = to_source_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);

    let end = match vevent.find_prop("DTEND") {
        Some(prop) => to_source_time(DatePerhapsTime::try_from(prop).ok()?),
        None => {
            let duration = vevent
                .find_prop("DURATION")
                .and_then(|p| parse_duration(p.val.as_ref()));
            default_end(&start, duration)
        }
    };

    Some(SourceEvent {
        uid,
        summary: text_prop(vevent, "SUMMARY"),
        location: text_prop(vevent, "LOCATION"),
        description: text_prop(vevent, "DESCRIPTION"),
        start,
        end,
    })
}

fn text_prop(vevent: &Component, name: &str) -> String {
    vevent
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
        .unwrap_or_default()
}

/// Convert icalendar's DatePerhapsTime to our SourceTime, preserving timezone info
fn to_source_time(dpt: DatePerhapsTime) -> SourceTime {
    match dpt {
        DatePerhapsTime::Date(d) => SourceTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => SourceTime::DateTimeUtc(dt),
            CalendarDateTime::Floating(naive) => SourceTime::DateTimeFloating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => SourceTime::DateTimeZoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// End time for an event without DTEND (RFC 5545 3.6.1).
fn default_end(start: &SourceTime, duration: Option<Duration>) -> SourceTime {
    match (start, duration) {
        (SourceTime::Date(d), Some(dur)) => {
            SourceTime::Date(*d + Duration::days(dur.num_days().max(1)))
        }
        (SourceTime::Date(d), None) => SourceTime::Date(*d + Duration::days(1)),
        (_, None) => start.clone(),
        (SourceTime::DateTimeUtc(dt), Some(dur)) => SourceTime::DateTimeUtc(*dt + dur),
        (SourceTime::DateTimeFloating(naive), Some(dur)) => {
            SourceTime::DateTimeFloating(*naive + dur)
        }
        (SourceTime::DateTimeZoned { datetime, tzid }, Some(dur)) => SourceTime::DateTimeZoned {
            datetime: *datetime + dur,
            tzid: tzid.clone(),
        },
        (SourceTime::DateTimeOffset(dt), Some(dur)) => SourceTime::DateTimeOffset(*dt + dur),
    }
}

/// Parse a DURATION value (PT1H30M, P1D, ...). Negative durations are ignored.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.starts_with('-') {
        return None;
    }
    let duration = iso8601::duration(value.trim_start_matches('+')).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// Unescape TEXT values per RFC 5545
/// Reverses: \, → , and \; → ; and \\ → \ and \n → newline
fn unescape_text(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some(',') | Some(';') | Some('\\') => {
                result.extend(chars.next());
            }
            Some('n') | Some('N') => {
                result.push('\n');
                chars.next();
            }
            _ => result.push(c),
        }
    }

    result
}
