//! CloudFront performer backed by aws-sdk-cloudfront.

use async_trait::async_trait;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_cloudfront::Client;
use tracing::debug;
use uuid::Uuid;

use crate::dispatch::{Dispatcher, Performer};
use crate::intent::{Intent, Outcome};
use crate::{Error, Result};

/// Performs [`Intent::CreateInvalidation`] against the live service.
pub struct CloudFrontPerformer {
    client: Client,
}

impl CloudFrontPerformer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn create_invalidation(&self, cname: &str, paths: Vec<String>) -> Result<Outcome> {
        // First distribution in provider order wins if several carry the
        // CNAME.
        let mut distribution_id = None;
        let mut pages = self.client.list_distributions().into_paginator().send();
        'outer: while let Some(page) = pages.next().await {
            let page = page
                .map_err(|e| Error::Backend(format!("failed to list distributions: {}", e)))?;
            let Some(list) = page.distribution_list() else {
                continue;
            };
            for distribution in list.items() {
                let aliases = distribution
                    .aliases()
                    .map(|a| a.items())
                    .unwrap_or_default();
                if aliases.iter().any(|alias| alias == cname) {
                    distribution_id = Some(distribution.id().to_string());
                    break 'outer;
                }
            }
        }
        let distribution_id =
            distribution_id.ok_or_else(|| Error::DistributionNotFound(cname.to_string()))?;

        let path_count = paths.len();
        let batch = InvalidationBatch::builder()
            .paths(
                Paths::builder()
                    .quantity(path_count as i32)
                    .set_items(Some(paths))
                    .build()
                    .map_err(|e| Error::Backend(format!("invalid invalidation paths: {}", e)))?,
            )
            .caller_reference(Uuid::new_v4().to_string())
            .build()
            .map_err(|e| Error::Backend(format!("invalid invalidation batch: {}", e)))?;

        self.client
            .create_invalidation()
            .distribution_id(&distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("failed to create invalidation: {}", e)))?;

        debug!(cname, distribution_id = %distribution_id, paths = path_count, "invalidation created");
        Ok(Outcome::Done)
    }
}

#[async_trait]
impl Performer for CloudFrontPerformer {
    async fn perform(&self, _dispatcher: &Dispatcher, intent: Intent) -> Result<Outcome> {
        match intent {
            Intent::CreateInvalidation { cname, paths } => {
                self.create_invalidation(&cname, paths).await
            }
            other => Err(Error::UnexpectedIntent {
                performer: "CloudFrontPerformer",
                got: other.kind(),
            }),
        }
    }
}

impl std::fmt::Debug for CloudFrontPerformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFrontPerformer").finish_non_exhaustive()
    }
}
