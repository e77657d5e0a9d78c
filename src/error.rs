//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror.

use crate::intent::IntentKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// No performer is registered for the dispatched intent variant.
    ///
    /// This is a programmer error: dispatcher tables are built once and are
    /// expected to be total over the variants they claim to support.
    #[error("no performer registered for intent {0:?}")]
    UnhandledIntent(IntentKind),

    /// A performer received an intent variant it does not handle.
    ///
    /// Only reachable through a mis-built dispatcher table; like
    /// [`Error::UnhandledIntent`] this is fatal, not recoverable.
    #[error("performer '{performer}' cannot handle intent {got:?}")]
    UnexpectedIntent {
        performer: &'static str,
        got: IntentKind,
    },

    /// A performer returned an outcome shape the caller did not expect.
    #[error("unexpected outcome: expected {0}")]
    UnexpectedOutcome(&'static str),

    #[error("no routing rule for prefix '{prefix}' in bucket '{bucket}'")]
    RuleNotFound { bucket: String, prefix: String },

    #[error("no distribution with CNAME '{0}'")]
    DistributionNotFound(String),

    #[error("bucket '{0}' not found")]
    BucketNotFound(String),

    #[error("key '{key}' not found in bucket '{bucket}'")]
    KeyNotFound { bucket: String, key: String },

    #[error("file '{}' is not under source path '{}'", file.display(), source_path.display())]
    FileOutsideSource {
        source_path: std::path::PathBuf,
        file: std::path::PathBuf,
    },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
