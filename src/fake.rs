//! In-memory fake backend
//!
//! [`FakeCloud`] models bucket contents, website routing rules, and an
//! ordered log of invalidation requests, so workflow code can be exercised
//! deterministically with no network access. Its dispatcher registers the
//! fake for every primitive intent kind but reuses the real composite
//! performers, proving that composite logic is backend-agnostic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::composite::{RecursiveDownloadPerformer, RecursiveUploadPerformer};
use crate::dispatch::{Dispatcher, Performer};
use crate::intent::{relative_object_key, Intent, IntentKind, Outcome};
use crate::{Error, Result};

/// Routing rules per bucket: key prefix to replacement prefix.
pub type RoutingRules = HashMap<String, HashMap<String, String>>;

/// Bucket contents: bucket name to (key to content bytes).
pub type Buckets = HashMap<String, HashMap<String, Vec<u8>>>;

/// One recorded invalidation request, verbatim and in issue order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invalidation {
    pub cname: String,
    pub paths: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    routing_rules: RoutingRules,
    buckets: Buckets,
    invalidations: Vec<Invalidation>,
}

/// In-memory stand-in for the S3 + CloudFront backend.
///
/// Cloneable handle over shared state, so a test can keep one clone for
/// assertions after handing another to the dispatcher. Not meant to be
/// shared across concurrent runs; each test owns its own instance.
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fake from pre-populated routing rules and bucket contents.
    pub fn seeded(routing_rules: RoutingRules, buckets: Buckets) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                routing_rules,
                buckets,
                invalidations: Vec::new(),
            })),
        }
    }

    /// Ensure `bucket` exists (empty if new).
    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.into())
            .or_default();
        self
    }

    /// Store `content` at `key`, creating `bucket` if needed.
    pub fn with_object(
        self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.into())
            .or_default()
            .insert(key.into(), content);
        self
    }

    /// Add a routing rule redirecting `prefix` to `target_prefix`.
    pub fn with_routing_rule(
        self,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        target_prefix: impl Into<String>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .routing_rules
            .entry(bucket.into())
            .or_default()
            .insert(prefix.into(), target_prefix.into());
        self
    }

    /// Dispatcher routing every primitive intent to this fake and the two
    /// composite intents to the shared composite performers.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::builder()
            .register_all(
                &[
                    IntentKind::UpdateRoutingRule,
                    IntentKind::CreateInvalidation,
                    IntentKind::DeleteKeys,
                    IntentKind::CopyKeys,
                    IntentKind::ListKeys,
                    IntentKind::DownloadKey,
                    IntentKind::UploadKey,
                ],
                Arc::new(self.clone()),
            )
            .register(
                IntentKind::DownloadKeysRecursively,
                Arc::new(RecursiveDownloadPerformer),
            )
            .register(
                IntentKind::UploadKeysRecursively,
                Arc::new(RecursiveUploadPerformer),
            )
            .build()
            .expect("fake table registers every intent kind")
    }

    /// Invalidation requests issued so far, in order.
    pub fn invalidations(&self) -> Vec<Invalidation> {
        self.state.lock().unwrap().invalidations.clone()
    }

    /// Content stored at `bucket`/`key`, if any.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .and_then(|b| b.get(key).cloned())
    }

    /// All keys currently stored in `bucket`.
    pub fn keys(&self, bucket: &str) -> Option<BTreeSet<String>> {
        self.state
            .lock()
            .unwrap()
            .buckets
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
    }

    /// Current redirect target of the routing rule for `prefix`.
    pub fn routing_rule(&self, bucket: &str, prefix: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .routing_rules
            .get(bucket)
            .and_then(|rules| rules.get(prefix).cloned())
    }

    fn update_routing_rule(
        &self,
        bucket: String,
        prefix: String,
        target_prefix: String,
    ) -> Result<Outcome> {
        let mut state = self.state.lock().unwrap();
        let rules = state
            .routing_rules
            .get_mut(&bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.clone()))?;
        let target = rules.get_mut(&prefix).ok_or_else(|| Error::RuleNotFound {
            bucket: bucket.clone(),
            prefix: prefix.clone(),
        })?;

        if *target == target_prefix {
            return Ok(Outcome::PreviousTarget(None));
        }
        let old = std::mem::replace(target, target_prefix);
        Ok(Outcome::PreviousTarget(Some(old)))
    }

    fn delete_keys(&self, bucket: String, prefix: String, keys: Vec<String>) -> Result<Outcome> {
        let mut state = self.state.lock().unwrap();
        let contents = state
            .buckets
            .get_mut(&bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.clone()))?;
        for key in keys {
            let full = format!("{}{}", prefix, key);
            contents.remove(&full).ok_or_else(|| Error::KeyNotFound {
                bucket: bucket.clone(),
                key: full,
            })?;
        }
        Ok(Outcome::Done)
    }

    fn copy_keys(
        &self,
        source_bucket: String,
        source_prefix: String,
        destination_bucket: String,
        destination_prefix: String,
        keys: Vec<String>,
    ) -> Result<Outcome> {
        let mut state = self.state.lock().unwrap();

        let source = state
            .buckets
            .get(&source_bucket)
            .ok_or_else(|| Error::BucketNotFound(source_bucket.clone()))?;
        let mut copied = Vec::with_capacity(keys.len());
        for key in &keys {
            let source_key = format!("{}{}", source_prefix, key);
            let content = source.get(&source_key).ok_or_else(|| Error::KeyNotFound {
                bucket: source_bucket.clone(),
                key: source_key,
            })?;
            copied.push((format!("{}{}", destination_prefix, key), content.clone()));
        }

        let destination = state
            .buckets
            .get_mut(&destination_bucket)
            .ok_or_else(|| Error::BucketNotFound(destination_bucket.clone()))?;
        for (key, content) in copied {
            destination.insert(key, content);
        }
        Ok(Outcome::Done)
    }

    fn list_keys(&self, bucket: String, prefix: String) -> Result<Outcome> {
        let state = self.state.lock().unwrap();
        let contents = state
            .buckets
            .get(&bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.clone()))?;
        let keys = contents
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        Ok(Outcome::Keys(keys))
    }

    fn download_key(
        &self,
        source_bucket: String,
        source_key: String,
        target_path: std::path::PathBuf,
    ) -> Result<Outcome> {
        let content = {
            let state = self.state.lock().unwrap();
            let contents = state
                .buckets
                .get(&source_bucket)
                .ok_or_else(|| Error::BucketNotFound(source_bucket.clone()))?;
            contents
                .get(&source_key)
                .ok_or_else(|| Error::KeyNotFound {
                    bucket: source_bucket.clone(),
                    key: source_key.clone(),
                })?
                .clone()
        };
        fs::write(&target_path, content)?;
        Ok(Outcome::Done)
    }

    fn upload_key(
        &self,
        source_path: std::path::PathBuf,
        target_bucket: String,
        target_key: String,
        file: std::path::PathBuf,
    ) -> Result<Outcome> {
        let key = relative_object_key(&target_key, &source_path, &file)?;
        let content = fs::read(&file)?;

        let mut state = self.state.lock().unwrap();
        let contents = state
            .buckets
            .get_mut(&target_bucket)
            .ok_or_else(|| Error::BucketNotFound(target_bucket.clone()))?;
        contents.insert(key, content);
        Ok(Outcome::Done)
    }
}

#[async_trait]
impl Performer for FakeCloud {
    async fn perform(&self, _dispatcher: &Dispatcher, intent: Intent) -> Result<Outcome> {
        debug!(kind = ?intent.kind(), "fake backend performing intent");
        match intent {
            Intent::UpdateRoutingRule {
                bucket,
                prefix,
                target_prefix,
            } => self.update_routing_rule(bucket, prefix, target_prefix),
            Intent::CreateInvalidation { cname, paths } => {
                self.state
                    .lock()
                    .unwrap()
                    .invalidations
                    .push(Invalidation { cname, paths });
                Ok(Outcome::Done)
            }
            Intent::DeleteKeys {
                bucket,
                prefix,
                keys,
            } => self.delete_keys(bucket, prefix, keys),
            Intent::CopyKeys {
                source_bucket,
                source_prefix,
                destination_bucket,
                destination_prefix,
                keys,
            } => self.copy_keys(
                source_bucket,
                source_prefix,
                destination_bucket,
                destination_prefix,
                keys,
            ),
            Intent::ListKeys { bucket, prefix } => self.list_keys(bucket, prefix),
            Intent::DownloadKey {
                source_bucket,
                source_key,
                target_path,
            } => self.download_key(source_bucket, source_key, target_path),
            Intent::UploadKey {
                source_path,
                target_bucket,
                target_key,
                file,
            } => self.upload_key(source_path, target_bucket, target_key, file),
            other => Err(Error::UnexpectedIntent {
                performer: "FakeCloud",
                got: other.kind(),
            }),
        }
    }
}

impl std::fmt::Debug for FakeCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("FakeCloud")
            .field("buckets", &state.buckets.keys().collect::<Vec<_>>())
            .field("invalidations", &state.invalidations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_routing_rule_changes_target_and_returns_old() {
        let fake = FakeCloud::new().with_routing_rule("docs.example.com", "en/latest/", "en/0.9/");
        let dispatcher = fake.dispatcher();

        let outcome = dispatcher
            .dispatch(Intent::UpdateRoutingRule {
                bucket: "docs.example.com".to_string(),
                prefix: "en/latest/".to_string(),
                target_prefix: "en/1.0/".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::PreviousTarget(Some("en/0.9/".to_string())));
        assert_eq!(
            fake.routing_rule("docs.example.com", "en/latest/"),
            Some("en/1.0/".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_routing_rule_same_target_is_idempotent() {
        let fake = FakeCloud::new().with_routing_rule("docs.example.com", "en/latest/", "en/1.0/");
        let dispatcher = fake.dispatcher();

        let outcome = dispatcher
            .dispatch(Intent::UpdateRoutingRule {
                bucket: "docs.example.com".to_string(),
                prefix: "en/latest/".to_string(),
                target_prefix: "en/1.0/".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::PreviousTarget(None));
        assert_eq!(
            fake.routing_rule("docs.example.com", "en/latest/"),
            Some("en/1.0/".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_routing_rule_missing_rule_fails() {
        let fake = FakeCloud::new().with_routing_rule("docs.example.com", "en/latest/", "en/1.0/");
        let dispatcher = fake.dispatcher();

        let err = dispatcher
            .dispatch(Intent::UpdateRoutingRule {
                bucket: "docs.example.com".to_string(),
                prefix: "en/devel/".to_string(),
                target_prefix: "en/1.0/".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RuleNotFound { .. }));

        let err = dispatcher
            .dispatch(Intent::UpdateRoutingRule {
                bucket: "other-bucket".to_string(),
                prefix: "en/latest/".to_string(),
                target_prefix: "en/1.0/".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalidations_are_recorded_in_order_without_dedup() {
        let fake = FakeCloud::new();
        let dispatcher = fake.dispatcher();

        let intent = Intent::CreateInvalidation {
            cname: "docs.example.com".to_string(),
            paths: vec!["/en/latest/".to_string()],
        };
        dispatcher.dispatch(intent.clone()).await.unwrap();
        dispatcher.dispatch(intent).await.unwrap();

        let invalidations = fake.invalidations();
        assert_eq!(invalidations.len(), 2);
        assert_eq!(invalidations[0], invalidations[1]);
        assert_eq!(invalidations[0].cname, "docs.example.com");
    }

    #[tokio::test]
    async fn test_delete_keys_applies_prefix_and_fails_on_missing() {
        let fake = FakeCloud::new()
            .with_object("releases", "docs/a.html", b"a".to_vec())
            .with_object("releases", "docs/b.html", b"b".to_vec());
        let dispatcher = fake.dispatcher();

        dispatcher
            .dispatch(Intent::DeleteKeys {
                bucket: "releases".to_string(),
                prefix: "docs/".to_string(),
                keys: vec!["a.html".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(fake.object("releases", "docs/a.html"), None);
        assert!(fake.object("releases", "docs/b.html").is_some());

        let err = dispatcher
            .dispatch(Intent::delete_keys("releases", vec!["missing".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_copy_keys_between_buckets() {
        let fake = FakeCloud::new()
            .with_object("staging", "1.0/cli".to_string(), b"binary".to_vec())
            .with_bucket("releases");
        let dispatcher = fake.dispatcher();

        dispatcher
            .dispatch(Intent::CopyKeys {
                source_bucket: "staging".to_string(),
                source_prefix: "1.0/".to_string(),
                destination_bucket: "releases".to_string(),
                destination_prefix: "latest/".to_string(),
                keys: vec!["cli".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(
            fake.object("releases", "latest/cli"),
            Some(b"binary".to_vec())
        );
        // Source is untouched.
        assert_eq!(fake.object("staging", "1.0/cli"), Some(b"binary".to_vec()));
    }

    #[tokio::test]
    async fn test_copy_keys_missing_source_key_fails() {
        let fake = FakeCloud::new().with_bucket("staging").with_bucket("releases");
        let dispatcher = fake.dispatcher();

        let err = dispatcher
            .dispatch(Intent::copy_keys(
                "staging",
                "releases",
                vec!["missing".to_string()],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_keys_strips_prefix() {
        let fake = FakeCloud::new()
            .with_object("releases", "docs/index.html", b"i".to_vec())
            .with_object("releases", "docs/api/index.html", b"a".to_vec())
            .with_object("releases", "other/readme", b"r".to_vec());
        let dispatcher = fake.dispatcher();

        let keys = dispatcher
            .dispatch(Intent::ListKeys {
                bucket: "releases".to_string(),
                prefix: "docs/".to_string(),
            })
            .await
            .unwrap()
            .into_keys()
            .unwrap();

        let expected: BTreeSet<String> = ["index.html".to_string(), "api/index.html".to_string()]
            .into_iter()
            .collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_seeded_state_is_visible_to_performers() {
        let mut rules = RoutingRules::new();
        rules
            .entry("docs.example.com".to_string())
            .or_default()
            .insert("en/latest/".to_string(), "en/1.0/".to_string());
        let mut buckets = Buckets::new();
        buckets
            .entry("releases".to_string())
            .or_default()
            .insert("docs/index.html".to_string(), b"hello".to_vec());

        let fake = FakeCloud::seeded(rules, buckets);
        let dispatcher = fake.dispatcher();

        let keys = dispatcher
            .dispatch(Intent::ListKeys {
                bucket: "releases".to_string(),
                prefix: "docs/".to_string(),
            })
            .await
            .unwrap()
            .into_keys()
            .unwrap();
        assert!(keys.contains("index.html"));
        assert_eq!(
            fake.routing_rule("docs.example.com", "en/latest/"),
            Some("en/1.0/".to_string())
        );
        assert!(fake.invalidations().is_empty());
    }

    #[tokio::test]
    async fn test_fake_dispatcher_handles_every_kind() {
        let dispatcher = FakeCloud::new().dispatcher();
        for kind in IntentKind::ALL {
            assert!(dispatcher.handles(kind), "missing performer for {:?}", kind);
        }
    }
}
