//! Declarative transform steps that can be set per destination in config.

use calmirror_core::{CanonicalEvent, MirrorResult, OverrideRegistry};
use serde::Deserialize;

use crate::config::DestinationConfig;

/// One rewrite applied to every event of a destination, in list order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformStep {
    /// Keep only the first line of the description, trimmed
    DescriptionFirstLine,
    ClearDescription,
    ClearLocation,
    SummaryPrefix { prefix: String },
    /// Drop events whose summary contains `text`
    ExcludeSummaryContaining { text: String },
}

impl TransformStep {
    fn apply(&self, events: Vec<CanonicalEvent>) -> Vec<CanonicalEvent> {
        match self {
            TransformStep::ExcludeSummaryContaining { text } => events
                .into_iter()
                .filter(|e| !e.summary.contains(text.as_str()))
                .collect(),
            _ => events
                .into_iter()
                .map(|mut event| {
                    self.rewrite(&mut event);
                    event
                })
                .collect(),
        }
    }

    fn rewrite(&self, event: &mut CanonicalEvent) {
        match self {
            TransformStep::DescriptionFirstLine => {
                event.description = event
                    .description
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
            }
            TransformStep::ClearDescription => event.description.clear(),
            TransformStep::ClearLocation => event.location.clear(),
            TransformStep::SummaryPrefix { prefix } => {
                if !event.summary.starts_with(prefix.as_str()) {
                    event.summary = format!("{}{}", prefix, event.summary);
                }
            }
            TransformStep::ExcludeSummaryContaining { .. } => {}
        }
    }
}

/// Run `steps` in order over the whole event list.
pub fn run_steps(
    steps: &[TransformStep],
    events: Vec<CanonicalEvent>,
) -> MirrorResult<Vec<CanonicalEvent>> {
    Ok(steps.iter().fold(events, |events, step| step.apply(events)))
}

/// Register a transform for every destination that declares steps.
pub fn build_registry(destinations: &[DestinationConfig]) -> OverrideRegistry {
    let mut registry = OverrideRegistry::new();

    for destination in destinations.iter().filter(|d| !d.transforms.is_empty()) {
        let steps = destination.transforms.clone();
        registry.register(destination.calendar_id.clone(), move |events| {
            run_steps(&steps, events)
        });
    }

    registry
}
