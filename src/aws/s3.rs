//! S3 performer backed by aws-sdk-s3.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    Delete, ObjectCannedAcl, ObjectIdentifier, Redirect, RoutingRule, WebsiteConfiguration,
};
use aws_sdk_s3::Client;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::dispatch::{Dispatcher, Performer};
use crate::intent::{relative_object_key, Intent, Outcome};
use crate::{Error, Result};

/// Performs the six primitive S3 intents against the live service.
pub struct S3Performer {
    client: Client,
}

impl S3Performer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn update_routing_rule(
        &self,
        bucket: &str,
        prefix: &str,
        target_prefix: &str,
    ) -> Result<Outcome> {
        let website = self
            .client
            .get_bucket_website()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("failed to read website configuration: {}", e)))?;

        let rules = website.routing_rules();

        // First rule in source order wins when several conditions match.
        let position = rules
            .iter()
            .position(|rule| {
                rule.condition()
                    .and_then(|c| c.key_prefix_equals())
                    .is_some_and(|p| p == prefix)
            })
            .ok_or_else(|| Error::RuleNotFound {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            })?;

        let matched = &rules[position];
        let old_target = matched
            .redirect()
            .and_then(|r| r.replace_key_prefix_with())
            .map(str::to_string);

        if old_target.as_deref() == Some(target_prefix) {
            debug!(bucket, prefix, "routing rule already points at target; no write");
            return Ok(Outcome::PreviousTarget(None));
        }

        let mut updated_rules = Vec::with_capacity(rules.len());
        for (index, rule) in rules.iter().enumerate() {
            let redirect = if index == position {
                let mut builder = Redirect::builder();
                if let Some(current) = rule.redirect() {
                    builder = builder
                        .set_host_name(current.host_name().map(str::to_string))
                        .set_http_redirect_code(current.http_redirect_code().map(str::to_string))
                        .set_protocol(current.protocol().cloned())
                        .set_replace_key_with(current.replace_key_with().map(str::to_string));
                }
                builder.replace_key_prefix_with(target_prefix).build()
            } else {
                rule.redirect()
                    .cloned()
                    .unwrap_or_else(|| Redirect::builder().build())
            };

            let updated = RoutingRule::builder()
                .set_condition(rule.condition().cloned())
                .redirect(redirect)
                .build();
            updated_rules.push(updated);
        }

        let configuration = WebsiteConfiguration::builder()
            .set_index_document(website.index_document().cloned())
            .set_error_document(website.error_document().cloned())
            .set_redirect_all_requests_to(website.redirect_all_requests_to().cloned())
            .set_routing_rules(Some(updated_rules))
            .build();

        self.client
            .put_bucket_website()
            .bucket(bucket)
            .website_configuration(configuration)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("failed to write website configuration: {}", e)))?;

        debug!(bucket, prefix, target_prefix, "routing rule updated");
        Ok(Outcome::PreviousTarget(old_target))
    }

    async fn delete_keys(&self, bucket: &str, prefix: &str, keys: &[String]) -> Result<Outcome> {
        let objects = keys
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(format!("{}{}", prefix, key))
                    .build()
                    .map_err(|e| Error::Backend(format!("invalid object identifier: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| Error::Backend(format!("invalid delete request: {}", e)))?;

        debug!(bucket, count = keys.len(), "deleting keys");
        self.client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("failed to delete keys: {}", e)))?;
        Ok(Outcome::Done)
    }

    /// Copies are independent; a failure leaves earlier copies in place.
    async fn copy_keys(
        &self,
        source_bucket: &str,
        source_prefix: &str,
        destination_bucket: &str,
        destination_prefix: &str,
        keys: &[String],
    ) -> Result<Outcome> {
        for key in keys {
            self.client
                .copy_object()
                .copy_source(format!("{}/{}{}", source_bucket, source_prefix, key))
                .bucket(destination_bucket)
                .key(format!("{}{}", destination_prefix, key))
                .send()
                .await
                .map_err(|e| Error::Backend(format!("failed to copy key '{}': {}", key, e)))?;
        }
        debug!(
            source_bucket,
            destination_bucket,
            count = keys.len(),
            "copied keys"
        );
        Ok(Outcome::Done)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Outcome> {
        let mut keys = BTreeSet::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| Error::Backend(format!("failed to list keys: {}", e)))?;
            for object in page.contents() {
                if let Some(stripped) = object.key().and_then(|k| k.strip_prefix(prefix)) {
                    keys.insert(stripped.to_string());
                }
            }
        }

        debug!(bucket, prefix, count = keys.len(), "listed keys");
        Ok(Outcome::Keys(keys))
    }

    async fn download_key(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_path: &Path,
    ) -> Result<Outcome> {
        let response = self
            .client
            .get_object()
            .bucket(source_bucket)
            .key(source_key)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("failed to fetch key '{}': {}", source_key, e)))?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Backend(format!("failed to read object body: {}", e)))?;

        fs::write(target_path, bytes.into_bytes())?;
        debug!(source_bucket, source_key, target = %target_path.display(), "downloaded key");
        Ok(Outcome::Done)
    }

    async fn upload_key(
        &self,
        source_path: &Path,
        target_bucket: &str,
        target_key: &str,
        file: &Path,
    ) -> Result<Outcome> {
        let key = relative_object_key(target_key, source_path, file)?;
        let content = fs::read(file)?;

        self.client
            .put_object()
            .bucket(target_bucket)
            .key(&key)
            .body(ByteStream::from(content))
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("failed to upload key '{}': {}", key, e)))?;

        debug!(target_bucket, key = %key, file = %file.display(), "uploaded key");
        Ok(Outcome::Done)
    }
}

#[async_trait]
impl Performer for S3Performer {
    async fn perform(&self, _dispatcher: &Dispatcher, intent: Intent) -> Result<Outcome> {
        match intent {
            Intent::UpdateRoutingRule {
                bucket,
                prefix,
                target_prefix,
            } => {
                self.update_routing_rule(&bucket, &prefix, &target_prefix)
                    .await
            }
            Intent::DeleteKeys {
                bucket,
                prefix,
                keys,
            } => self.delete_keys(&bucket, &prefix, &keys).await,
            Intent::CopyKeys {
                source_bucket,
                source_prefix,
                destination_bucket,
                destination_prefix,
                keys,
            } => {
                self.copy_keys(
                    &source_bucket,
                    &source_prefix,
                    &destination_bucket,
                    &destination_prefix,
                    &keys,
                )
                .await
            }
            Intent::ListKeys { bucket, prefix } => self.list_keys(&bucket, &prefix).await,
            Intent::DownloadKey {
                source_bucket,
                source_key,
                target_path,
            } => {
                self.download_key(&source_bucket, &source_key, &target_path)
                    .await
            }
            Intent::UploadKey {
                source_path,
                target_bucket,
                target_key,
                file,
            } => {
                self.upload_key(&source_path, &target_bucket, &target_key, &file)
                    .await
            }
            other => Err(Error::UnexpectedIntent {
                performer: "S3Performer",
                got: other.kind(),
            }),
        }
    }
}

impl std::fmt::Debug for S3Performer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Performer").finish_non_exhaustive()
    }
}
