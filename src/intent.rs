//! Intent and outcome types
//!
//! Every side-effecting cloud operation is described by an [`Intent`]: an
//! inert value carrying only the data needed to perform that operation.
//! Constructing an intent has no side effect; only dispatching it does
//! (see [`crate::dispatch`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// One cloud/storage operation, as pure data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    /// Change the redirect target of the routing rule whose condition
    /// matches `prefix` on the bucket's website configuration.
    UpdateRoutingRule {
        bucket: String,
        prefix: String,
        target_prefix: String,
    },

    /// Request CDN invalidation of `paths` for the distribution associated
    /// with `cname`.
    CreateInvalidation { cname: String, paths: Vec<String> },

    /// Delete `prefix + key` for each key.
    DeleteKeys {
        bucket: String,
        prefix: String,
        keys: Vec<String>,
    },

    /// Copy each key from the source location to the destination location.
    CopyKeys {
        source_bucket: String,
        source_prefix: String,
        destination_bucket: String,
        destination_prefix: String,
        keys: Vec<String>,
    },

    /// List keys under `prefix`, with `prefix` stripped from the returned
    /// names.
    ListKeys { bucket: String, prefix: String },

    /// Fetch one object to a local path, overwriting if present.
    DownloadKey {
        source_bucket: String,
        source_key: String,
        target_path: PathBuf,
    },

    /// Fetch all objects under `source_prefix` whose names end with one of
    /// `filter_extensions`, preserving relative structure under
    /// `target_path`.
    DownloadKeysRecursively {
        source_bucket: String,
        source_prefix: String,
        target_path: PathBuf,
        filter_extensions: Vec<String>,
    },

    /// Upload one local file. The object key is `target_key` plus the path
    /// of `file` relative to `source_path`; the object is made publicly
    /// readable.
    UploadKey {
        source_path: PathBuf,
        target_bucket: String,
        target_key: String,
        file: PathBuf,
    },

    /// Walk `source_path` and upload every regular file whose base name is
    /// in `files`, via [`Intent::UploadKey`].
    UploadKeysRecursively {
        source_path: PathBuf,
        target_bucket: String,
        target_key: String,
        files: Vec<String>,
    },
}

impl Intent {
    /// [`Intent::DeleteKeys`] with an empty prefix.
    pub fn delete_keys(bucket: impl Into<String>, keys: Vec<String>) -> Self {
        Intent::DeleteKeys {
            bucket: bucket.into(),
            prefix: String::new(),
            keys,
        }
    }

    /// [`Intent::CopyKeys`] with empty prefixes on both sides.
    pub fn copy_keys(
        source_bucket: impl Into<String>,
        destination_bucket: impl Into<String>,
        keys: Vec<String>,
    ) -> Self {
        Intent::CopyKeys {
            source_bucket: source_bucket.into(),
            source_prefix: String::new(),
            destination_bucket: destination_bucket.into(),
            destination_prefix: String::new(),
            keys,
        }
    }

    /// The variant tag used for dispatcher table lookup.
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::UpdateRoutingRule { .. } => IntentKind::UpdateRoutingRule,
            Intent::CreateInvalidation { .. } => IntentKind::CreateInvalidation,
            Intent::DeleteKeys { .. } => IntentKind::DeleteKeys,
            Intent::CopyKeys { .. } => IntentKind::CopyKeys,
            Intent::ListKeys { .. } => IntentKind::ListKeys,
            Intent::DownloadKey { .. } => IntentKind::DownloadKey,
            Intent::DownloadKeysRecursively { .. } => IntentKind::DownloadKeysRecursively,
            Intent::UploadKey { .. } => IntentKind::UploadKey,
            Intent::UploadKeysRecursively { .. } => IntentKind::UploadKeysRecursively,
        }
    }
}

/// Fieldless tag for each [`Intent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentKind {
    UpdateRoutingRule,
    CreateInvalidation,
    DeleteKeys,
    CopyKeys,
    ListKeys,
    DownloadKey,
    DownloadKeysRecursively,
    UploadKey,
    UploadKeysRecursively,
}

impl IntentKind {
    /// Every variant, for table-completeness checks and tests.
    pub const ALL: [IntentKind; 9] = [
        IntentKind::UpdateRoutingRule,
        IntentKind::CreateInvalidation,
        IntentKind::DeleteKeys,
        IntentKind::CopyKeys,
        IntentKind::ListKeys,
        IntentKind::DownloadKey,
        IntentKind::DownloadKeysRecursively,
        IntentKind::UploadKey,
        IntentKind::UploadKeysRecursively,
    ];

    /// Kinds a composite performer re-dispatches to.
    ///
    /// A dispatcher registering a composite kind must also register these
    /// (checked at construction by
    /// [`crate::dispatch::DispatcherBuilder::build`]).
    pub fn requires(self) -> &'static [IntentKind] {
        match self {
            IntentKind::DownloadKeysRecursively => {
                &[IntentKind::ListKeys, IntentKind::DownloadKey]
            }
            IntentKind::UploadKeysRecursively => &[IntentKind::UploadKey],
            _ => &[],
        }
    }
}

/// The result of performing an intent.
///
/// Most operations produce no value; the two that do get their own shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Operation completed with no result value.
    Done,

    /// Key names from [`Intent::ListKeys`], prefix stripped. Ordered so
    /// that composite iteration is deterministic.
    Keys(BTreeSet<String>),

    /// Previous redirect target from [`Intent::UpdateRoutingRule`].
    /// `None` means the rule already pointed at the requested target and no
    /// write was performed.
    PreviousTarget(Option<String>),
}

impl Outcome {
    /// Extract the key set from a [`Intent::ListKeys`] outcome.
    pub fn into_keys(self) -> Result<BTreeSet<String>> {
        match self {
            Outcome::Keys(keys) => Ok(keys),
            _ => Err(Error::UnexpectedOutcome("Keys")),
        }
    }

    /// Extract the previous target from an [`Intent::UpdateRoutingRule`]
    /// outcome.
    pub fn into_previous_target(self) -> Result<Option<String>> {
        match self {
            Outcome::PreviousTarget(target) => Ok(target),
            _ => Err(Error::UnexpectedOutcome("PreviousTarget")),
        }
    }
}

/// Destination key for an upload: `target_key` plus the path of `file`
/// relative to `source_path`, with `/`-separated components.
pub(crate) fn relative_object_key(
    target_key: &str,
    source_path: &Path,
    file: &Path,
) -> Result<String> {
    let relative = file
        .strip_prefix(source_path)
        .map_err(|_| Error::FileOutsideSource {
            source_path: source_path.to_path_buf(),
            file: file.to_path_buf(),
        })?;

    let mut key = String::from(target_key);
    for component in relative.components() {
        key.push('/');
        key.push_str(&component.as_os_str().to_string_lossy());
    }
    Ok(key)
}
