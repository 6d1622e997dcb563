//! The live display state and its broadcast.
//!
//! `DisplayStore` is the single owner of the `DisplayState`. An accepted
//! update replaces the state and is broadcast to every registered screen
//! while the state lock is held, so screens see updates in the same order
//! the store applied them.
//!
//! Lock order is always state then registry. Connection handlers read the
//! state and release the lock before sending, so they never hold both.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use vitrine_catalog::ObjectCatalog;
use vitrine_core::{DisplayState, DomainError, ObjectName, Probability};
use vitrine_protocol::PushMessage;

use crate::registry::{BroadcastReport, ChannelRegistry};

/// Outcome of an accepted update.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The state now being displayed
    pub state: DisplayState,

    /// How the broadcast of that state went
    pub report: BroadcastReport,
}

/// Errors returned by `DisplayStore::update`.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("Failed to encode display update: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Owner of the process-wide display state.
pub struct DisplayStore {
    state: Mutex<DisplayState>,
    registry: Arc<ChannelRegistry>,
}

impl DisplayStore {
    /// Creates a store showing `initial`.
    pub fn new(initial: DisplayState, registry: Arc<ChannelRegistry>) -> Self {
        Self {
            state: Mutex::new(initial),
            registry,
        }
    }

    /// The registry updates are broadcast to.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Returns the latest state.
    pub async fn current(&self) -> DisplayState {
        self.state.lock().await.clone()
    }

    /// Validates and applies an update, then broadcasts it.
    ///
    /// On failure nothing is changed and nothing is sent. The name must be
    /// the "nothing" sentinel or known to `catalog`.
    pub async fn update(
        &self,
        raw_name: &str,
        probability: f64,
        catalog: &ObjectCatalog,
    ) -> Result<UpdateOutcome, DisplayError> {
        let next = match validate(raw_name, probability, catalog) {
            Ok(state) => state,
            Err(e) => {
                warn!(object_name = %raw_name, prob = probability, error = %e, "Rejected display update");
                return Err(e.into());
            }
        };
        let payload = PushMessage::update(&next).encode()?;

        let mut state = self.state.lock().await;
        *state = next;
        let report = self.registry.broadcast(&payload).await;

        debug!(
            object_name = %state.object_name,
            prob = state.probability.value(),
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Display updated"
        );

        Ok(UpdateOutcome {
            state: state.clone(),
            report,
        })
    }
}

fn validate(
    raw_name: &str,
    probability: f64,
    catalog: &ObjectCatalog,
) -> Result<DisplayState, DomainError> {
    let name = ObjectName::parse(raw_name)?;
    let probability = Probability::new(probability)?;
    if !name.is_nothing() && !catalog.contains(name.as_str()) {
        return Err(DomainError::UnknownObject {
            name: name.as_str().to_string(),
        });
    }
    Ok(DisplayState::new(name, probability))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory::memory_channel;
    use crate::channel::ChannelId;
    use tempfile::TempDir;

    fn catalog_with(names: &[&str]) -> (TempDir, ObjectCatalog) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::create_dir_all(dir.path().join(format!("{name}_1"))).unwrap();
        }
        let catalog = ObjectCatalog::scan(dir.path());
        (dir, catalog)
    }

    fn store() -> DisplayStore {
        DisplayStore::new(DisplayState::nothing(), Arc::new(ChannelRegistry::new()))
    }

    #[tokio::test]
    async fn test_initial_state() {
        let store = store();
        let state = store.current().await;
        assert!(state.object_name.is_nothing());
        assert_eq!(state.probability, Probability::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_name_leaves_state_unchanged() {
        let (_dir, catalog) = catalog_with(&["apple"]);
        let store = store();
        let (screen, mut outbox) = memory_channel(ChannelId::new(1));
        store.registry().add(screen).await;
        let before = store.current().await;

        let err = store.update("unknown_name", 0.5, &catalog).await.unwrap_err();

        assert!(matches!(
            err,
            DisplayError::Invalid(DomainError::UnknownObject { .. })
        ));
        assert_eq!(err.to_string(), "unknown object name: unknown_name");
        assert_eq!(store.current().await, before);
        assert!(outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_nothing_broadcasts_exactly_once() {
        let (_dir, catalog) = catalog_with(&[]);
        let store = store();
        let (screen, mut outbox) = memory_channel(ChannelId::new(1));
        store.registry().add(screen).await;

        let outcome = store.update("nothing", 0.0, &catalog).await.unwrap();

        assert_eq!(outcome.report.delivered, 1);
        assert_eq!(
            outbox.try_recv().ok().as_deref(),
            Some(r#"{"object_name":"nothing","prob":0.0}"#)
        );
        assert!(outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_known_name_replaces_state() {
        let (_dir, catalog) = catalog_with(&["apple"]);
        let store = store();

        let outcome = store.update(" apple ", 0.75, &catalog).await.unwrap();

        assert_eq!(outcome.state.object_name.as_str(), "apple");
        let current = store.current().await;
        assert_eq!(current.object_name.as_str(), "apple");
        assert_eq!(current.probability.value(), 0.75);
        assert_eq!(outcome.report.attempted(), 0);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (_dir, catalog) = catalog_with(&["apple"]);
        let store = store();
        let err = store.update("  ", 0.5, &catalog).await.unwrap_err();
        assert!(matches!(
            err,
            DisplayError::Invalid(DomainError::BlankObjectName)
        ));
    }

    #[tokio::test]
    async fn test_non_finite_probability_rejected() {
        let (_dir, catalog) = catalog_with(&["apple"]);
        let store = store();
        assert!(store.update("apple", f64::NAN, &catalog).await.is_err());
        assert!(store.update("apple", f64::INFINITY, &catalog).await.is_err());
        assert!(store.current().await.object_name.is_nothing());
    }

    #[tokio::test]
    async fn test_probability_outside_unit_range_accepted() {
        let (_dir, catalog) = catalog_with(&["apple"]);
        let store = store();

        let outcome = store.update("apple", 1.5, &catalog).await.unwrap();

        assert_eq!(outcome.state.probability.value(), 1.5);
        assert_eq!(store.current().await.probability.value(), 1.5);
    }

    #[tokio::test]
    async fn test_failed_screen_dropped_during_update() {
        let (_dir, catalog) = catalog_with(&["apple"]);
        let store = store();
        let (good, mut good_out) = memory_channel(ChannelId::new(1));
        let (bad, _bad_out) = memory_channel(ChannelId::new(2));
        bad.fail_sends(true);
        store.registry().add(good).await;
        store.registry().add(bad.clone()).await;

        let outcome = store.update("apple", 0.9, &catalog).await.unwrap();

        assert_eq!(outcome.report.dropped, vec![ChannelId::new(2)]);
        assert!(good_out.try_recv().is_ok());
        assert!(bad.is_closed());
        assert_eq!(store.registry().len().await, 1);
    }
}
