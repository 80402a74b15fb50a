//! Google Calendar v3 REST client.

use async_trait::async_trait;
use calmirror_core::ports::DestinationClient;
use calmirror_core::{DestinationEvent, MirrorError, MirrorResult};
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use crate::types::{ErrorBody, EventsPage};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Largest page size `events.list` accepts.
const MAX_RESULTS: &str = "2500";

/// `DestinationClient` for Google Calendar, authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http: Client,
    base_url: Url,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(access_token: impl Into<String>) -> MirrorResult<Self> {
        Self::with_base_url(DEFAULT_API_BASE, access_token)
    }

    pub fn with_base_url(base_url: &str, access_token: impl Into<String>) -> MirrorResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            MirrorError::Config(format!("Invalid API base URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(MirrorError::Config(format!(
                "Invalid API base URL '{}'",
                base_url
            )));
        }

        Ok(Self {
            http: Client::new(),
            base_url,
            access_token: access_token.into(),
        })
    }

    /// `{base}/calendars/{calendar_id}/events[/{event_id}]`, each segment percent-encoded.
    fn events_url(&self, calendar_id: &str, event_id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        {
            // Checked in the constructor
            let mut segments = url
                .path_segments_mut()
                .unwrap_or_else(|_| unreachable!("base URL can be a base"));
            segments
                .pop_if_empty()
                .extend(["calendars", calendar_id, "events"]);
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        url
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> MirrorResult<Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| MirrorError::Api(format!("Failed to {}: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);

        Err(MirrorError::Api(format!(
            "Failed to {}: {} {}",
            what, status, message
        )))
    }

    async fn read_event(response: Response, what: &str) -> MirrorResult<DestinationEvent> {
        response
            .json::<DestinationEvent>()
            .await
            .map_err(|e| MirrorError::Api(format!("Failed to read {} response: {}", what, e)))
    }
}

#[async_trait]
impl DestinationClient for GoogleCalendarClient {
    async fn list(&self, destination_id: &str) -> MirrorResult<Vec<DestinationEvent>> {
        let url = self.events_url(destination_id, None);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.get(url.clone()).query(&[("maxResults", MAX_RESULTS)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: EventsPage = self
                .send(request, "list events")
                .await?
                .json()
                .await
                .map_err(|e| MirrorError::Api(format!("Failed to read event list: {}", e)))?;

            debug!(count = page.items.len(), "Fetched events page");

            events.extend(page.items.into_iter().filter(|e| {
                e.extra.get("status").and_then(|s| s.as_str()) != Some("cancelled")
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(events)
    }

    async fn create(
        &self,
        destination_id: &str,
        event: &DestinationEvent,
    ) -> MirrorResult<DestinationEvent> {
        let url = self.events_url(destination_id, None);
        let what = format!("create event {}", event.id);
        let response = self.send(self.http.post(url).json(event), &what).await?;
        Self::read_event(response, &what).await
    }

    async fn update(
        &self,
        destination_id: &str,
        handle: &str,
        event: &DestinationEvent,
    ) -> MirrorResult<DestinationEvent> {
        let url = self.events_url(destination_id, Some(handle));
        let what = format!("update event {}", handle);
        let response = self.send(self.http.put(url).json(event), &what).await?;
        Self::read_event(response, &what).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CALENDAR: &str = "team@group.calendar.google.com";
    const EVENTS_PATH: &str = "/calendar/v3/calendars/team@group.calendar.google.com/events";

    async fn client(server: &MockServer) -> GoogleCalendarClient {
        GoogleCalendarClient::with_base_url(&format!("{}/calendar/v3", server.uri()), "token-123")
            .expect("valid base url")
    }

    fn event_json(id: &str, summary: &str) -> serde_json::Value {
        json!({
            "id": id,
            "summary": summary,
            "start": {"dateTime": "2024-01-01T09:00:00Z"},
            "end": {"dateTime": "2024-01-01T09:15:00Z"},
            "colorId": "5"
        })
    }

    #[test]
    fn test_events_url_encodes_calendar_id() {
        let client = GoogleCalendarClient::new("t").unwrap();
        let url = client.events_url("a b#c@group.calendar.google.com", Some("abc"));
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/a%20b%23c@group.calendar.google.com/events/abc"
        );
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens_and_drops_cancelled() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(EVENTS_PATH))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    event_json("bbb", "Second"),
                    {"id": "ccc", "status": "cancelled"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(EVENTS_PATH))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [event_json("aaa", "First")],
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let events = client(&server).await.list(CALENDAR).await.expect("list ok");
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["aaa", "bbb"]);
        assert_eq!(events[0].extra.get("colorId"), Some(&json!("5")));
    }

    #[tokio::test]
    async fn test_create_posts_event_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .and(body_partial_json(json!({"id": "abc", "summary": "Standup"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_json("abc", "Standup")))
            .expect(1)
            .mount(&server)
            .await;

        let event: DestinationEvent =
            serde_json::from_value(event_json("abc", "Standup")).unwrap();
        let created = client(&server)
            .await
            .create(CALENDAR, &event)
            .await
            .expect("create ok");
        assert_eq!(created.id, "abc");
    }

    #[tokio::test]
    async fn test_update_puts_to_event_handle() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(format!("{}/abc", EVENTS_PATH)))
            .and(body_partial_json(json!({"summary": "Renamed", "colorId": "5"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_json("abc", "Renamed")))
            .expect(1)
            .mount(&server)
            .await;

        let event: DestinationEvent =
            serde_json::from_value(event_json("abc", "Renamed")).unwrap();
        let updated = client(&server)
            .await
            .update(CALENDAR, "abc", &event)
            .await
            .expect("update ok");
        assert_eq!(updated.summary, "Renamed");
    }

    #[tokio::test]
    async fn test_error_status_becomes_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {"code": 409, "message": "The requested identifier already exists."}
            })))
            .mount(&server)
            .await;

        let event: DestinationEvent =
            serde_json::from_value(event_json("abc", "Standup")).unwrap();
        let err = client(&server)
            .await
            .create(CALENDAR, &event)
            .await
            .unwrap_err();

        match err {
            MirrorError::Api(msg) => {
                assert!(msg.contains("409"), "got: {}", msg);
                assert!(msg.contains("already exists"), "got: {}", msg);
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }
}
