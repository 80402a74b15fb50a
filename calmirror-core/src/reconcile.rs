//! Matching canonical events against a destination's existing events.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

use crate::equality::is_equal;
use crate::event::{CanonicalEvent, DestinationEvent};

/// A mutation proposed for a destination calendar.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(CanonicalEvent),
    Update {
        handle: String,
        event: DestinationEvent,
    },
}

impl Operation {
    pub fn event_id(&self) -> &str {
        match self {
            Operation::Create(event) => &event.id,
            Operation::Update { event, .. } => &event.id,
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Operation::Create(event) => &event.summary,
            Operation::Update { event, .. } => &event.summary,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operation::Create(_) => "+",
            Operation::Update { .. } => "~",
        };
        write!(f, "{} {} {}", symbol, self.event_id(), self.summary())
    }
}

/// Compute the create/update operations that bring `existing` in line with
/// `canonical`.
///
/// Operations come out in canonical order. Existing events with no canonical
/// counterpart are left alone; nothing is ever deleted. When `existing`
/// holds several events with the same id, the first one is used. When
/// `canonical` repeats an id, only its first occurrence is reconciled.
pub fn reconcile(
    destination_id: &str,
    existing: &[DestinationEvent],
    canonical: &[CanonicalEvent],
) -> Vec<Operation> {
    let mut operations = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for event in canonical {
        if !seen.insert(event.id.as_str()) {
            warn!(
                destination = destination_id,
                id = %event.id,
                "Duplicate event id in feed, keeping first occurrence"
            );
            continue;
        }

        match existing.iter().find(|e| e.id == event.id) {
            None => operations.push(Operation::Create(event.clone())),
            Some(current) if is_equal(event, current) => {
                debug!(destination = destination_id, id = %event.id, "Already in sync");
            }
            Some(current) => operations.push(Operation::Update {
                handle: current.handle().to_string(),
                event: current.overlay(event),
            }),
        }
    }

    operations
}
