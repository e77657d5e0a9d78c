//! Dispatcher and performer seam
//!
//! A [`Dispatcher`] is an immutable table mapping each [`IntentKind`] to a
//! [`Performer`]. Callers pick the table (real AWS vs in-memory fake) and
//! hand intents to [`Dispatcher::dispatch`]; composite performers receive
//! the dispatcher back so their sub-intents route through the same table.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::intent::{Intent, IntentKind, Outcome};
use crate::{Error, Result};

/// Executes one (or a family of) intent variants against a concrete
/// backend.
///
/// The dispatcher is passed through so performers defined in terms of other
/// intents can re-enter [`Dispatcher::dispatch`]. There is no ambient or
/// global dispatcher.
#[async_trait]
pub trait Performer: Send + Sync {
    async fn perform(&self, dispatcher: &Dispatcher, intent: Intent) -> Result<Outcome>;
}

/// Immutable variant-to-performer table.
pub struct Dispatcher {
    performers: HashMap<IntentKind, Arc<dyn Performer>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder {
            performers: HashMap::new(),
        }
    }

    /// Execute `intent` with the performer registered for its variant.
    ///
    /// Fails with [`Error::UnhandledIntent`] when no performer is
    /// registered. That is a programmer error in table construction and
    /// must not be caught and ignored.
    pub async fn dispatch(&self, intent: Intent) -> Result<Outcome> {
        let kind = intent.kind();
        let performer = self
            .performers
            .get(&kind)
            .cloned()
            .ok_or(Error::UnhandledIntent(kind))?;
        performer.perform(self, intent).await
    }

    /// Whether a performer is registered for `kind`.
    pub fn handles(&self, kind: IntentKind) -> bool {
        self.performers.contains_key(&kind)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.performers.keys().collect();
        kinds.sort_by_key(|k| format!("{:?}", k));
        f.debug_struct("Dispatcher").field("kinds", &kinds).finish()
    }
}

/// Builds a [`Dispatcher`], validating composite prerequisites.
pub struct DispatcherBuilder {
    performers: HashMap<IntentKind, Arc<dyn Performer>>,
}

impl DispatcherBuilder {
    /// Register `performer` for `kind`, replacing any earlier registration.
    pub fn register(mut self, kind: IntentKind, performer: Arc<dyn Performer>) -> Self {
        self.performers.insert(kind, performer);
        self
    }

    /// Register the same performer for several kinds.
    pub fn register_all(mut self, kinds: &[IntentKind], performer: Arc<dyn Performer>) -> Self {
        for kind in kinds {
            self.performers.insert(*kind, performer.clone());
        }
        self
    }

    /// Finish the table.
    ///
    /// Fails with [`Error::UnhandledIntent`] naming the first missing
    /// prerequisite if a registered composite kind re-dispatches to a kind
    /// with no registration. A new intent variant therefore surfaces at
    /// dispatcher construction rather than mid-composite at runtime.
    pub fn build(self) -> Result<Dispatcher> {
        for kind in self.performers.keys() {
            for required in kind.requires() {
                if !self.performers.contains_key(required) {
                    return Err(Error::UnhandledIntent(*required));
                }
            }
        }
        Ok(Dispatcher {
            performers: self.performers,
        })
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.performers.keys().collect();
        kinds.sort_by_key(|k| format!("{:?}", k));
        f.debug_struct("DispatcherBuilder")
            .field("kinds", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticPerformer(Outcome);

    #[async_trait]
    impl Performer for StaticPerformer {
        async fn perform(&self, _dispatcher: &Dispatcher, _intent: Intent) -> Result<Outcome> {
            Ok(self.0.clone())
        }
    }

    fn list_intent() -> Intent {
        Intent::ListKeys {
            bucket: "releases".to_string(),
            prefix: String::new(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_registered_performer() {
        let dispatcher = Dispatcher::builder()
            .register(
                IntentKind::ListKeys,
                Arc::new(StaticPerformer(Outcome::Keys(Default::default()))),
            )
            .build()
            .unwrap();

        let outcome = dispatcher.dispatch(list_intent()).await.unwrap();
        assert_eq!(outcome, Outcome::Keys(Default::default()));
    }

    #[tokio::test]
    async fn test_dispatch_unregistered_kind_fails() {
        let dispatcher = Dispatcher::builder().build().unwrap();

        let err = dispatcher.dispatch(list_intent()).await.unwrap_err();
        assert!(matches!(err, Error::UnhandledIntent(IntentKind::ListKeys)));
    }

    #[tokio::test]
    async fn test_build_rejects_composite_without_prerequisites() {
        let err = Dispatcher::builder()
            .register(
                IntentKind::DownloadKeysRecursively,
                Arc::new(StaticPerformer(Outcome::Done)),
            )
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::UnhandledIntent(_)));
    }

    #[tokio::test]
    async fn test_build_accepts_composite_with_prerequisites() {
        let primitive = Arc::new(StaticPerformer(Outcome::Done));
        let dispatcher = Dispatcher::builder()
            .register(IntentKind::ListKeys, primitive.clone())
            .register(IntentKind::DownloadKey, primitive.clone())
            .register(IntentKind::DownloadKeysRecursively, primitive)
            .build()
            .unwrap();

        assert!(dispatcher.handles(IntentKind::DownloadKeysRecursively));
    }
}
