//! Field-level comparison between canonical and destination events.

use crate::event::{CanonicalEvent, DestinationEvent, TimeSpec};

/// Read access to the fields that decide whether two events are in sync.
pub trait EventFields {
    fn summary(&self) -> &str;
    fn location(&self) -> &str;
    fn description(&self) -> &str;
    fn start(&self) -> Option<&TimeSpec>;
    fn end(&self) -> Option<&TimeSpec>;
}

impl EventFields for CanonicalEvent {
    fn summary(&self) -> &str {
        &self.summary
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn start(&self) -> Option<&TimeSpec> {
        Some(&self.start)
    }
    fn end(&self) -> Option<&TimeSpec> {
        Some(&self.end)
    }
}

impl EventFields for DestinationEvent {
    fn summary(&self) -> &str {
        &self.summary
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn start(&self) -> Option<&TimeSpec> {
        self.start.as_ref()
    }
    fn end(&self) -> Option<&TimeSpec> {
        self.end.as_ref()
    }
}

/// Whether `a` and `b` agree on every field the destination shows.
///
/// Text fields compare exactly. Times compare as instants, so
/// `09:00:00Z` and `10:00:00+01:00` are equal, but a changed time zone name
/// on the same instant is a difference.
pub fn is_equal<A, B>(a: &A, b: &B) -> bool
where
    A: EventFields + ?Sized,
    B: EventFields + ?Sized,
{
    a.summary() == b.summary()
        && a.location() == b.location()
        && a.description() == b.description()
        && same_time(a.start(), b.start())
        && same_time(a.end(), b.end())
}

fn same_time(a: Option<&TimeSpec>, b: Option<&TimeSpec>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => same_time_spec(a, b),
        _ => false,
    }
}

fn same_time_spec(a: &TimeSpec, b: &TimeSpec) -> bool {
    match (a, b) {
        (TimeSpec::Date { date: a }, TimeSpec::Date { date: b }) => a == b,
        (
            TimeSpec::DateTime {
                date_time: a_dt,
                time_zone: a_tz,
            },
            TimeSpec::DateTime {
                date_time: b_dt,
                time_zone: b_tz,
            },
        ) => a_dt == b_dt && a_tz == b_tz,
        // All-day vs timed
        _ => false,
    }
}
