//! Runs the fetch → canonicalize → transform → reconcile → apply chain for
//! every configured destination.

use std::fmt;
use std::sync::Arc;

use tracing::{Instrument, error, info, info_span, warn};

use crate::canonical::canonicalize;
use crate::error::{MirrorError, MirrorResult};
use crate::event::{CanonicalEvent, Destination, DestinationEvent};
use crate::ports::{DestinationClient, FeedFetcher, IcsParser};
use crate::reconcile::{Operation, reconcile};
use crate::transform::{self, OverrideRegistry};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Log the operations instead of executing them.
    pub dry_run: bool,
}

/// Counters for one destination's run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Events read from the feed
    pub fetched: usize,
    /// Events dropped because they could not be canonicalized
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// The destination's transform failed and untransformed events were used
    pub transform_failed: bool,
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} skipped",
            self.created, self.updated, self.unchanged, self.skipped
        )
    }
}

#[derive(Debug)]
pub struct DestinationReport {
    pub destination_id: String,
    pub outcome: MirrorResult<SyncStats>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub destinations: Vec<DestinationReport>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &MirrorError)> {
        self.destinations.iter().filter_map(|d| match &d.outcome {
            Ok(_) => None,
            Err(e) => Some((d.destination_id.as_str(), e)),
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Sum of the stats of every destination that completed.
    pub fn totals(&self) -> SyncStats {
        self.destinations
            .iter()
            .filter_map(|d| d.outcome.as_ref().ok())
            .fold(SyncStats::default(), |mut acc, s| {
                acc.fetched += s.fetched;
                acc.skipped += s.skipped;
                acc.created += s.created;
                acc.updated += s.updated;
                acc.unchanged += s.unchanged;
                acc.transform_failed |= s.transform_failed;
                acc
            })
    }
}

/// Wires the collaborators together and mirrors each destination in turn.
pub struct Orchestrator {
    fetcher: Arc<dyn FeedFetcher>,
    parser: Arc<dyn IcsParser>,
    client: Arc<dyn DestinationClient>,
    overrides: Arc<OverrideRegistry>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        parser: Arc<dyn IcsParser>,
        client: Arc<dyn DestinationClient>,
        overrides: Arc<OverrideRegistry>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            client,
            overrides,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Mirror every destination in declaration order.
    ///
    /// A failing destination is logged and recorded in the report; the
    /// remaining destinations still run.
    pub async fn run(&self, destinations: &[Destination]) -> RunReport {
        let mut report = RunReport::default();

        for destination in destinations {
            let span = info_span!("destination", id = %destination.id);
            let outcome = self.sync_destination(destination).instrument(span).await;

            match &outcome {
                Ok(stats) => info!(destination = %destination.id, "{}", stats),
                Err(e) => {
                    error!(destination = %destination.id, error = %e, "Destination sync failed")
                }
            }

            report.destinations.push(DestinationReport {
                destination_id: destination.id.clone(),
                outcome,
            });
        }

        report
    }

    /// Mirror one destination. Errors abandon the rest of this destination.
    pub async fn sync_destination(&self, destination: &Destination) -> MirrorResult<SyncStats> {
        let mut stats = SyncStats::default();

        let existing = self.client.list(&destination.id).await?;
        let text = self.fetcher.fetch_text(&destination.feed_url).await?;
        let raw_events = self.parser.parse(&text)?;
        stats.fetched = raw_events.len();

        info!(
            existing = existing.len(),
            fetched = raw_events.len(),
            "Loaded destination and feed"
        );

        let mut canonical: Vec<CanonicalEvent> = Vec::with_capacity(raw_events.len());
        for raw in &raw_events {
            match canonicalize(raw) {
                Ok(event) => canonical.push(event),
                Err(e) => {
                    warn!(uid = %raw.uid, error = %e, "Skipping event");
                    stats.skipped += 1;
                }
            }
        }

        let override_fn = self.overrides.resolve(&destination.id);
        let transformed = transform::apply(override_fn.as_ref(), canonical);
        stats.transform_failed = transformed.failure.is_some();
        let canonical = transformed.events;

        let operations = reconcile(&destination.id, &existing, &canonical);

        for operation in operations {
            if self.options.dry_run {
                info!("(dry run) {}", operation);
            } else {
                self.execute(&destination.id, &operation).await?;
            }
            match operation {
                Operation::Create(_) => stats.created += 1,
                Operation::Update { .. } => stats.updated += 1,
            }
        }

        let unique_ids = {
            let mut ids: Vec<&str> = canonical.iter().map(|e| e.id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            ids.len()
        };
        stats.unchanged = unique_ids - stats.created - stats.updated;

        Ok(stats)
    }

    async fn execute(&self, destination_id: &str, operation: &Operation) -> MirrorResult<()> {
        match operation {
            Operation::Create(event) => {
                self.client
                    .create(destination_id, &DestinationEvent::from(event))
                    .await?;
            }
            Operation::Update { handle, event } => {
                self.client.update(destination_id, handle, event).await?;
            }
        }
        info!("{}", operation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{SourceEvent, SourceTime};
    use crate::ics::IcalParser;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:abc@example.com\r\n\
SUMMARY:Standup\r\n\
DESCRIPTION:Daily sync\\nDial-in: 555\r\n\
DTSTART:20240101T090000Z\r\n\
DTEND:20240101T091500Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:@@@\r\n\
SUMMARY:Broken\r\n\
DTSTART:20240102T090000Z\r\n\
DTEND:20240102T091500Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    struct StaticFeeds(HashMap<String, String>);

    #[async_trait]
    impl FeedFetcher for StaticFeeds {
        async fn fetch_text(&self, uri: &str) -> MirrorResult<String> {
            self.0.get(uri).cloned().ok_or_else(|| MirrorError::Fetch {
                uri: uri.to_string(),
                message: "404 Not Found".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct MemoryCalendar {
        calendars: Mutex<HashMap<String, Vec<DestinationEvent>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MemoryCalendar {
        async fn seed(&self, destination_id: &str, events: Vec<DestinationEvent>) {
            self.calendars
                .lock()
                .await
                .insert(destination_id.to_string(), events);
        }

        async fn events(&self, destination_id: &str) -> Vec<DestinationEvent> {
            self.calendars
                .lock()
                .await
                .get(destination_id)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl DestinationClient for MemoryCalendar {
        async fn list(&self, destination_id: &str) -> MirrorResult<Vec<DestinationEvent>> {
            self.calls.lock().await.push(format!("list {}", destination_id));
            self.calendars
                .lock()
                .await
                .get(destination_id)
                .cloned()
                .ok_or_else(|| MirrorError::Api(format!("404 calendar {}", destination_id)))
        }

        async fn create(
            &self,
            destination_id: &str,
            event: &DestinationEvent,
        ) -> MirrorResult<DestinationEvent> {
            self.calls
                .lock()
                .await
                .push(format!("create {} {}", destination_id, event.id));
            let mut calendars = self.calendars.lock().await;
            let events = calendars.entry(destination_id.to_string()).or_default();
            if events.iter().any(|e| e.id == event.id) {
                return Err(MirrorError::Api("409 duplicate".to_string()));
            }
            events.push(event.clone());
            Ok(event.clone())
        }

        async fn update(
            &self,
            destination_id: &str,
            handle: &str,
            event: &DestinationEvent,
        ) -> MirrorResult<DestinationEvent> {
            self.calls
                .lock()
                .await
                .push(format!("update {} {}", destination_id, handle));
            let mut calendars = self.calendars.lock().await;
            let slot = calendars
                .get_mut(destination_id)
                .and_then(|events| events.iter_mut().find(|e| e.id == handle))
                .ok_or_else(|| MirrorError::Api("404 event".to_string()))?;
            *slot = event.clone();
            Ok(event.clone())
        }
    }

    fn orchestrator(
        feeds: &[(&str, &str)],
        calendar: Arc<MemoryCalendar>,
        overrides: OverrideRegistry,
    ) -> Orchestrator {
        let feeds = feeds
            .iter()
            .map(|(uri, text)| (uri.to_string(), text.to_string()))
            .collect();
        Orchestrator::new(
            Arc::new(StaticFeeds(feeds)),
            Arc::new(IcalParser),
            calendar,
            Arc::new(overrides),
        )
    }

    #[tokio::test]
    async fn test_first_run_creates_and_second_run_converges() {
        let calendar = Arc::new(MemoryCalendar::default());
        calendar.seed("team", vec![]).await;
        let orch = orchestrator(
            &[("https://feeds.test/team.ics", FEED)],
            calendar.clone(),
            OverrideRegistry::new(),
        );
        let destinations = [Destination::new("team", "https://feeds.test/team.ics")];

        let first = orch.run(&destinations).await;
        let stats = first.destinations[0].outcome.as_ref().expect("sync ok");
        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.created, 1);

        let events = calendar.events("team").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "abceamplecom");
        assert_eq!(events[0].description, "Daily sync\nDial-in: 555");

        let second = orch.run(&destinations).await;
        let stats = second.destinations[0].outcome.as_ref().expect("sync ok");
        assert_eq!(stats.created, 0);
        assert_eq!(stats.updated, 0);
        assert_eq!(stats.unchanged, 1);
    }

    #[tokio::test]
    async fn test_stale_event_is_updated_and_keeps_extra_fields() {
        let calendar = Arc::new(MemoryCalendar::default());
        calendar
            .seed(
                "team",
                vec![DestinationEvent {
                    id: "abceamplecom".to_string(),
                    summary: "Old title".to_string(),
                    location: String::new(),
                    description: String::new(),
                    start: None,
                    end: None,
                    extra: serde_json::from_value(json!({"colorId": "9"})).unwrap(),
                }],
            )
            .await;
        let orch = orchestrator(
            &[("https://feeds.test/team.ics", FEED)],
            calendar.clone(),
            OverrideRegistry::new(),
        );

        let report = orch
            .run(&[Destination::new("team", "https://feeds.test/team.ics")])
            .await;
        assert_eq!(report.totals().updated, 1);

        let events = calendar.events("team").await;
        assert_eq!(events[0].summary, "Standup");
        assert_eq!(events[0].extra.get("colorId"), Some(&json!("9")));
        assert_eq!(
            events[0].start,
            Some(crate::event::TimeSpec::date_time(
                Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap().fixed_offset(),
                None
            ))
        );
    }

    #[tokio::test]
    async fn test_failing_destination_does_not_stop_the_run() {
        let calendar = Arc::new(MemoryCalendar::default());
        calendar.seed("broken-feed", vec![]).await;
        calendar.seed("team", vec![]).await;
        let orch = orchestrator(
            &[("https://feeds.test/team.ics", FEED)],
            calendar.clone(),
            OverrideRegistry::new(),
        );

        let report = orch
            .run(&[
                Destination::new("missing-calendar", "https://feeds.test/team.ics"),
                Destination::new("broken-feed", "https://feeds.test/gone.ics"),
                Destination::new("team", "https://feeds.test/team.ics"),
            ])
            .await;

        let failures: Vec<_> = report.failures().map(|(id, _)| id).collect();
        assert_eq!(failures, vec!["missing-calendar", "broken-feed"]);
        assert!(matches!(
            report.destinations[1].outcome,
            Err(MirrorError::Fetch { .. })
        ));
        assert_eq!(calendar.events("team").await.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_transform_uses_untransformed_events() {
        let calendar = Arc::new(MemoryCalendar::default());
        calendar.seed("team", vec![]).await;
        let mut overrides = OverrideRegistry::new();
        overrides.register("team", |_| Err(MirrorError::Transform("always fails".into())));
        let orch = orchestrator(
            &[("https://feeds.test/team.ics", FEED)],
            calendar.clone(),
            overrides,
        );

        let report = orch
            .run(&[Destination::new("team", "https://feeds.test/team.ics")])
            .await;

        let stats = report.destinations[0].outcome.as_ref().expect("sync ok");
        assert!(stats.transform_failed);
        assert_eq!(stats.created, 1);
        assert_eq!(calendar.events("team").await[0].summary, "Standup");
    }

    #[tokio::test]
    async fn test_transform_runs_before_matching() {
        let calendar = Arc::new(MemoryCalendar::default());
        calendar.seed("team", vec![]).await;
        let mut overrides = OverrideRegistry::new();
        overrides.register("team", |events: Vec<CanonicalEvent>| {
            Ok(events
                .into_iter()
                .map(|mut e| {
                    e.description = e.description.lines().next().unwrap_or("").to_string();
                    e
                })
                .collect())
        });
        let orch = orchestrator(
            &[("https://feeds.test/team.ics", FEED)],
            calendar.clone(),
            overrides,
        );
        let destinations = [Destination::new("team", "https://feeds.test/team.ics")];

        orch.run(&destinations).await;
        assert_eq!(calendar.events("team").await[0].description, "Daily sync");

        let second = orch.run(&destinations).await;
        assert_eq!(second.totals().created + second.totals().updated, 0);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_mutate() {
        let calendar = Arc::new(MemoryCalendar::default());
        calendar.seed("team", vec![]).await;
        let orch = orchestrator(
            &[("https://feeds.test/team.ics", FEED)],
            calendar.clone(),
            OverrideRegistry::new(),
        )
        .with_options(RunOptions { dry_run: true });

        let report = orch
            .run(&[Destination::new("team", "https://feeds.test/team.ics")])
            .await;

        assert_eq!(report.totals().created, 1);
        assert!(calendar.events("team").await.is_empty());
        assert_eq!(*calendar.calls.lock().await, vec!["list team".to_string()]);
    }

    #[tokio::test]
    async fn test_api_error_abandons_remaining_operations() {
        struct RejectingCalendar;

        #[async_trait]
        impl DestinationClient for RejectingCalendar {
            async fn list(&self, _: &str) -> MirrorResult<Vec<DestinationEvent>> {
                Ok(vec![])
            }
            async fn create(
                &self,
                _: &str,
                _: &DestinationEvent,
            ) -> MirrorResult<DestinationEvent> {
                Err(MirrorError::Api("403 Forbidden".to_string()))
            }
            async fn update(
                &self,
                _: &str,
                _: &str,
                _: &DestinationEvent,
            ) -> MirrorResult<DestinationEvent> {
                Err(MirrorError::Api("403 Forbidden".to_string()))
            }
        }

        struct OneEvent;

        impl IcsParser for OneEvent {
            fn parse(&self, _: &str) -> MirrorResult<Vec<SourceEvent>> {
                let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
                Ok(vec![SourceEvent {
                    uid: "abc".to_string(),
                    summary: "Standup".to_string(),
                    location: String::new(),
                    description: String::new(),
                    start: SourceTime::DateTimeUtc(at),
                    end: SourceTime::DateTimeUtc(at),
                }])
            }
        }

        let orch = Orchestrator::new(
            Arc::new(StaticFeeds(HashMap::from([(
                "https://feeds.test/a.ics".to_string(),
                String::new(),
            )]))),
            Arc::new(OneEvent),
            Arc::new(RejectingCalendar),
            Arc::new(OverrideRegistry::new()),
        );

        let report = orch
            .run(&[Destination::new("team", "https://feeds.test/a.ics")])
            .await;
        assert!(matches!(
            report.destinations[0].outcome,
            Err(MirrorError::Api(_))
        ));
    }
}
