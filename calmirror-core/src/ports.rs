//! Collaborator interfaces the engine drives.
//!
//! Fetching, parsing and the destination API all live behind these traits so
//! the orchestrator can run against real services or in-memory fakes.

use async_trait::async_trait;

use crate::error::MirrorResult;
use crate::event::{DestinationEvent, SourceEvent};

/// Retrieves the raw text of a subscription feed.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fails with `MirrorError::Fetch`.
    async fn fetch_text(&self, uri: &str) -> MirrorResult<String>;
}

/// Turns feed text into raw events. Feed-level properties are ignored.
pub trait IcsParser: Send + Sync {
    /// Fails with `MirrorError::Parse`.
    fn parse(&self, text: &str) -> MirrorResult<Vec<SourceEvent>>;
}

/// A calendar store that receives the mirrored events.
///
/// All methods fail with `MirrorError::Api`.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    async fn list(&self, destination_id: &str) -> MirrorResult<Vec<DestinationEvent>>;

    async fn create(
        &self,
        destination_id: &str,
        event: &DestinationEvent,
    ) -> MirrorResult<DestinationEvent>;

    async fn update(
        &self,
        destination_id: &str,
        handle: &str,
        event: &DestinationEvent,
    ) -> MirrorResult<DestinationEvent>;
}
