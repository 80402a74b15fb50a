//! Time zones defined inline by a feed's VTIMEZONE components.
//!
//! Exchange and Outlook feeds name zones like `W. Europe Standard Time`, which
//! the IANA database doesn't know. Those feeds always ship the zone's rules, so
//! local times can still be turned into an instant from the STANDARD/DAYLIGHT
//! observances.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use icalendar::parser::Component;
use rrule::RRuleSet;
use tracing::warn;

const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// One STANDARD or DAYLIGHT block.
#[derive(Debug, Clone, PartialEq)]
struct Observance {
    /// First onset, as a wall-clock time
    start: NaiveDateTime,
    offset: FixedOffset,
    rrule: Option<String>,
    rdates: Vec<NaiveDateTime>,
}

impl Observance {
    fn from_component(component: &Component) -> Option<Self> {
        let start = parse_local(component.find_prop("DTSTART")?.val.as_ref())?;
        let offset = parse_utc_offset(component.find_prop("TZOFFSETTO")?.val.as_ref())?;

        let rdates = component
            .properties
            .iter()
            .filter(|p| p.name == "RDATE")
            .flat_map(|p| p.val.as_ref().split(',').filter_map(parse_local).collect::<Vec<_>>())
            .collect();

        Some(Self {
            start,
            offset,
            rrule: component.find_prop("RRULE").map(|p| p.val.to_string()),
            rdates,
        })
    }

    /// Latest onset at or before `local`, if this observance has started by then.
    fn last_onset(&self, local: &NaiveDateTime) -> Option<NaiveDateTime> {
        if self.start > *local {
            return None;
        }

        let mut latest = self.start;
        for rdate in self.rdates.iter().filter(|d| *d <= local) {
            latest = latest.max(*rdate);
        }
        if let Some(onset) = self.rrule.as_deref().and_then(|r| self.last_rule_onset(r, local)) {
            latest = latest.max(onset);
        }

        Some(latest)
    }

    /// Wall-clock times are expanded as if they were UTC, so the rule never
    /// depends on the zone it describes.
    fn last_rule_onset(&self, rule: &str, local: &NaiveDateTime) -> Option<NaiveDateTime> {
        let rule_str = format!(
            "DTSTART:{}Z\nRRULE:{}",
            self.start.format(LOCAL_FORMAT),
            rule
        );
        let rule_set: RRuleSet = match rule_str.parse() {
            Ok(set) => set,
            Err(e) => {
                warn!(rule, error = %e, "Ignoring unreadable VTIMEZONE rule");
                return None;
            }
        };

        // Every yearly rule has an onset within the last year
        let tz: rrule::Tz = Utc.into();
        let after = (local.and_utc() - Duration::days(366)).with_timezone(&tz);
        let before = (local.and_utc() + Duration::seconds(1)).with_timezone(&tz);

        rule_set
            .after(after)
            .before(before)
            .all(64)
            .dates
            .last()
            .map(|dt| dt.naive_utc())
    }
}

/// A zone as described by one VTIMEZONE component.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedTimeZone {
    standard: Vec<Observance>,
    daylight: Vec<Observance>,
}

impl FeedTimeZone {
    fn from_component(component: &Component) -> Self {
        let observances = |name: &str| {
            component
                .components
                .iter()
                .filter(|c| c.name == name)
                .filter_map(Observance::from_component)
                .collect::<Vec<_>>()
        };

        Self {
            standard: observances("STANDARD"),
            daylight: observances("DAYLIGHT"),
        }
    }

    /// UTC offset in effect at the wall-clock time `local`.
    pub fn offset_at(&self, local: &NaiveDateTime) -> Option<FixedOffset> {
        let current = self
            .standard
            .iter()
            .chain(&self.daylight)
            .filter_map(|o| o.last_onset(local).map(|onset| (onset, o.offset)))
            .max_by_key(|(onset, _)| *onset)
            .map(|(_, offset)| offset);

        // Before the first onset the zone is taken as being on standard time
        current.or_else(|| {
            self.standard
                .first()
                .or(self.daylight.first())
                .map(|o| o.offset)
        })
    }

    /// Resolve `local` to an instant with this zone's offset.
    pub fn resolve(&self, local: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        self.offset_at(local)?.from_local_datetime(local).single()
    }
}

/// Every VTIMEZONE of a calendar, keyed by TZID.
pub fn collect(components: &[Component]) -> HashMap<String, FeedTimeZone> {
    components
        .iter()
        .filter(|c| c.name == "VTIMEZONE")
        .filter_map(|c| {
            let tzid = c.find_prop("TZID")?.val.as_ref().trim_matches('"').to_string();
            Some((tzid, FeedTimeZone::from_component(c)))
        })
        .collect()
}

fn parse_local(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim().trim_end_matches('Z'), LOCAL_FORMAT).ok()
}

/// Parse a UTC-OFFSET value (`+0100`, `-0500`, `+053000`).
fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    let (sign, digits) = match value.split_at_checked(1)? {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    if !matches!(digits.len(), 4 | 6) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<i32>().ok();
    let hours = field(0..2)?;
    let minutes = field(2..4)?;
    let seconds = if digits.len() == 6 { field(4..6)? } else { 0 };

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60 + seconds))
}
