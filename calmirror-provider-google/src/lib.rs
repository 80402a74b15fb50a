//! Google Calendar destination for calmirror.
//!
//! Events are written through the Calendar v3 REST API as plain JSON so that
//! fields calmirror doesn't manage (colors, reminders, attendees, ...) are
//! read and written back untouched.
//!
//! Obtaining the OAuth access token is left to the caller.

mod api;
mod types;

pub use api::{DEFAULT_API_BASE, GoogleCalendarClient};
