//! Composite performers
//!
//! The two recursive operations are defined entirely in terms of other
//! intents, re-entering [`Dispatcher::dispatch`] for each step. Both the
//! real and fake dispatcher factories register these same performers, so a
//! composite behaves identically regardless of which backend serves the
//! primitive sub-intents.

use async_trait::async_trait;
use std::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::dispatch::{Dispatcher, Performer};
use crate::intent::{Intent, Outcome};
use crate::{Error, Result};

/// Performs [`Intent::DownloadKeysRecursively`]: list the prefix, then
/// download each key matching the extension filter, creating intermediate
/// directories as needed. Non-matching keys are skipped silently.
pub struct RecursiveDownloadPerformer;

#[async_trait]
impl Performer for RecursiveDownloadPerformer {
    async fn perform(&self, dispatcher: &Dispatcher, intent: Intent) -> Result<Outcome> {
        let Intent::DownloadKeysRecursively {
            source_bucket,
            source_prefix,
            target_path,
            filter_extensions,
        } = intent
        else {
            return Err(Error::UnexpectedIntent {
                performer: "RecursiveDownloadPerformer",
                got: intent.kind(),
            });
        };

        let keys = dispatcher
            .dispatch(Intent::ListKeys {
                bucket: source_bucket.clone(),
                prefix: format!("{}/", source_prefix),
            })
            .await?
            .into_keys()?;

        debug!(
            bucket = %source_bucket,
            prefix = %source_prefix,
            candidates = keys.len(),
            "recursive download listing complete"
        );

        for key in keys {
            if !filter_extensions.iter().any(|ext| key.ends_with(ext)) {
                continue;
            }

            let path = target_path.join(&key);
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
            }

            dispatcher
                .dispatch(Intent::DownloadKey {
                    source_bucket: source_bucket.clone(),
                    source_key: format!("{}/{}", source_prefix, key),
                    target_path: path,
                })
                .await?;
        }

        Ok(Outcome::Done)
    }
}

/// Performs [`Intent::UploadKeysRecursively`]: walk the source directory
/// and upload every regular file whose base name is listed. Directories and
/// non-matching files are skipped silently.
pub struct RecursiveUploadPerformer;

#[async_trait]
impl Performer for RecursiveUploadPerformer {
    async fn perform(&self, dispatcher: &Dispatcher, intent: Intent) -> Result<Outcome> {
        let Intent::UploadKeysRecursively {
            source_path,
            target_bucket,
            target_key,
            files,
        } = intent
        else {
            return Err(Error::UnexpectedIntent {
                performer: "RecursiveUploadPerformer",
                got: intent.kind(),
            });
        };

        for entry in WalkDir::new(&source_path).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !files.iter().any(|f| f.as_str() == &*name) {
                continue;
            }

            debug!(file = %entry.path().display(), bucket = %target_bucket, "uploading");

            dispatcher
                .dispatch(Intent::UploadKey {
                    source_path: source_path.clone(),
                    target_bucket: target_bucket.clone(),
                    target_key: target_key.clone(),
                    file: entry.path().to_path_buf(),
                })
                .await?;
        }

        Ok(Outcome::Done)
    }
}
