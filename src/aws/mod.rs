//! Real AWS performers
//!
//! Dispatcher factory backed by aws-sdk-s3 and aws-sdk-cloudfront. Each
//! performer is a direct, synchronous translation of one intent into SDK
//! calls — no retry, backoff, or partial-failure recovery; provider errors
//! propagate to the caller of dispatch unmodified.

pub mod cloudfront;
pub mod s3;

pub use cloudfront::CloudFrontPerformer;
pub use s3::S3Performer;

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

use crate::composite::{RecursiveDownloadPerformer, RecursiveUploadPerformer};
use crate::dispatch::Dispatcher;
use crate::intent::IntentKind;
use crate::Result;

/// Environment configuration for the real backend.
#[derive(Debug, Clone)]
pub struct Config {
    /// Custom endpoint for S3-compatible providers; `None` uses AWS.
    pub endpoint: Option<String>,
    pub region: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            endpoint: std::env::var("AWS_ENDPOINT_URL").ok(),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

/// Build the real dispatcher from environment configuration.
///
/// Credentials come from the standard AWS provider chain (environment,
/// profile, instance role).
pub async fn dispatcher() -> Result<Dispatcher> {
    let config = Config::from_env()?;

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()));
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;

    info!(region = %config.region, "configured AWS dispatcher");

    Ok(dispatcher_with_clients(
        aws_sdk_s3::Client::new(&shared),
        aws_sdk_cloudfront::Client::new(&shared),
    ))
}

/// Build the real dispatcher from already-configured SDK clients.
pub fn dispatcher_with_clients(
    s3: aws_sdk_s3::Client,
    cloudfront: aws_sdk_cloudfront::Client,
) -> Dispatcher {
    Dispatcher::builder()
        .register_all(
            &[
                IntentKind::UpdateRoutingRule,
                IntentKind::DeleteKeys,
                IntentKind::CopyKeys,
                IntentKind::ListKeys,
                IntentKind::DownloadKey,
                IntentKind::UploadKey,
            ],
            Arc::new(S3Performer::new(s3)),
        )
        .register(
            IntentKind::CreateInvalidation,
            Arc::new(CloudFrontPerformer::new(cloudfront)),
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
        .expect("real table registers every intent kind")
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::Credentials;

    fn test_clients() -> (aws_sdk_s3::Client, aws_sdk_cloudfront::Client) {
        let credentials = Credentials::new("test", "test", None, None, "static");
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials.clone())
            .build();
        let cf_config = aws_sdk_cloudfront::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .build();
        (
            aws_sdk_s3::Client::from_conf(s3_config),
            aws_sdk_cloudfront::Client::from_conf(cf_config),
        )
    }

    #[test]
    fn test_real_dispatcher_handles_every_kind() {
        let (s3, cloudfront) = test_clients();
        let dispatcher = dispatcher_with_clients(s3, cloudfront);
        for kind in IntentKind::ALL {
            assert!(dispatcher.handles(kind), "missing performer for {:?}", kind);
        }
    }
}
