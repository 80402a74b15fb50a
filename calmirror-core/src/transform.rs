//! Per-destination transforms applied to canonical events before matching.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::warn;

use crate::error::{MirrorError, MirrorResult};
use crate::event::CanonicalEvent;

/// A transform over the whole canonical event sequence of one destination.
pub type OverrideFn =
    Arc<dyn Fn(Vec<CanonicalEvent>) -> MirrorResult<Vec<CanonicalEvent>> + Send + Sync>;

/// Transforms keyed by destination id. Filled once at start-up, read-only after.
#[derive(Clone, Default)]
pub struct OverrideRegistry {
    overrides: HashMap<String, OverrideFn>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` for `destination_id`, replacing any earlier registration.
    pub fn register<F>(&mut self, destination_id: impl Into<String>, f: F)
    where
        F: Fn(Vec<CanonicalEvent>) -> MirrorResult<Vec<CanonicalEvent>> + Send + Sync + 'static,
    {
        self.overrides.insert(destination_id.into(), Arc::new(f));
    }

    pub fn resolve(&self, destination_id: &str) -> Option<OverrideFn> {
        self.overrides.get(destination_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl std::fmt::Debug for OverrideRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.overrides.keys()).finish()
    }
}

/// Outcome of running the transform stage.
#[derive(Debug)]
pub struct Transformed {
    pub events: Vec<CanonicalEvent>,
    /// Set when the override failed and `events` is the untransformed input.
    pub failure: Option<MirrorError>,
}

/// Run `override_fn` over `events`.
///
/// Without an override the input is returned as is. If the override returns an
/// error or panics, the failure is logged and the untransformed input is used.
pub fn apply(override_fn: Option<&OverrideFn>, events: Vec<CanonicalEvent>) -> Transformed {
    let Some(f) = override_fn else {
        return Transformed {
            events,
            failure: None,
        };
    };

    let result = catch_unwind(AssertUnwindSafe(|| f(events.clone())));

    let failure = match result {
        Ok(Ok(transformed)) => {
            return Transformed {
                events: transformed,
                failure: None,
            };
        }
        Ok(Err(e)) => e,
        Err(panic) => MirrorError::Transform(panic_message(panic.as_ref())),
    };

    warn!(error = %failure, "Transform failed, using untransformed events");

    Transformed {
        events,
        failure: Some(failure),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("transform panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("transform panicked: {}", s)
    } else {
        "transform panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TimeSpec;
    use chrono::NaiveDate;

    fn events() -> Vec<CanonicalEvent> {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        vec![CanonicalEvent {
            id: "abc".to_string(),
            summary: "Standup".to_string(),
            location: String::new(),
            description: "First line\nSecond line".to_string(),
            start: TimeSpec::date(day),
            end: TimeSpec::date(day.succ_opt().unwrap()),
        }]
    }

    #[test]
    fn test_no_override_is_identity() {
        let result = apply(None, events());
        assert_eq!(result.events, events());
        assert!(result.failure.is_none());
    }

    #[test]
    fn test_override_result_is_used() {
        let mut registry = OverrideRegistry::new();
        registry.register("cal", |events: Vec<CanonicalEvent>| {
            Ok(events
                .into_iter()
                .map(|mut e| {
                    e.summary = format!("[Work] {}", e.summary);
                    e
                })
                .collect())
        });

        let f = registry.resolve("cal").expect("registered");
        let result = apply(Some(&f), events());
        assert_eq!(result.events[0].summary, "[Work] Standup");
        assert!(result.failure.is_none());
    }

    #[test]
    fn test_failing_override_falls_back_to_input() {
        let mut registry = OverrideRegistry::new();
        registry.register("cal", |_| Err(MirrorError::Transform("boom".to_string())));

        let f = registry.resolve("cal").expect("registered");
        let result = apply(Some(&f), events());
        assert_eq!(result.events, events());
        assert!(matches!(result.failure, Some(MirrorError::Transform(msg)) if msg == "boom"));
    }

    #[test]
    fn test_panicking_override_falls_back_to_input() {
        let mut registry = OverrideRegistry::new();
        registry.register("cal", |_| panic!("bad transform"));

        let f = registry.resolve("cal").expect("registered");
        let result = apply(Some(&f), events());
        assert_eq!(result.events, events());
        match result.failure {
            Some(MirrorError::Transform(msg)) => assert!(msg.contains("bad transform")),
            other => panic!("Expected transform failure, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_unknown_destination_is_none() {
        let registry = OverrideRegistry::new();
        assert!(registry.resolve("missing").is_none());
        assert!(registry.is_empty());
    }
}
