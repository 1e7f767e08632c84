//! CloudFront cache invalidation after a deployment.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_cloudfront::error::DisplayErrorContext;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crate::CdnConfig;
use crate::error::{HookError, Result};

/// Path pattern covering every object of a distribution
pub const WILDCARD_PATH: &str = "/*";
pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";

const FALLBACK_REGION: &str = "us-east-1";

/// Tells whether CDN credentials are available right now.
pub trait CredentialSource: Send + Sync {
    fn credentials_present(&self) -> bool;
}

/// Checks the AWS key variables of the process environment on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn credentials_present(&self) -> bool {
        std::env::var_os(ACCESS_KEY_ENV).is_some() && std::env::var_os(SECRET_KEY_ENV).is_some()
    }
}

/// Fixed answer, for wiring without touching the environment.
#[derive(Debug, Clone, Copy)]
pub struct StaticCredentials(pub bool);

impl CredentialSource for StaticCredentials {
    fn credentials_present(&self) -> bool {
        self.0
    }
}

/// A configured distribution to purge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationTarget {
    pub name: String,
    pub distribution_id: String,
}

impl InvalidationTarget {
    pub fn new(name: impl Into<String>, distribution_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            distribution_id: distribution_id.into(),
        }
    }
}

/// One "create invalidation" call for a single distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub distribution_id: String,
    pub caller_reference: String,
    pub paths: Vec<String>,
}

impl InvalidationRequest {
    /// Purge everything, using the Unix seconds of `now` as caller reference.
    ///
    /// Two requests for the same distribution within one second share a
    /// reference, which CloudFront treats as the same invalidation.
    pub fn wildcard(target: &InvalidationTarget, now: DateTime<Utc>) -> Self {
        Self {
            distribution_id: target.distribution_id.clone(),
            caller_reference: now.timestamp().to_string(),
            paths: vec![WILDCARD_PATH.to_string()],
        }
    }
}

/// Issues invalidation requests to a CDN. Returns the invalidation id.
#[async_trait]
pub trait InvalidationClient: Send + Sync {
    async fn create_invalidation(&self, request: &InvalidationRequest) -> Result<String>;
}

/// [`InvalidationClient`] backed by the AWS SDK
#[derive(Clone)]
pub struct CloudFrontClient {
    client: aws_sdk_cloudfront::Client,
}

impl CloudFrontClient {
    pub fn new(client: aws_sdk_cloudfront::Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential and region chains.
    /// Credentials are resolved lazily, on the first request.
    pub async fn from_env() -> Self {
        let region = RegionProviderChain::default_provider().or_else(FALLBACK_REGION);
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        Self::new(aws_sdk_cloudfront::Client::new(&config))
    }
}

#[async_trait]
impl InvalidationClient for CloudFrontClient {
    async fn create_invalidation(&self, request: &InvalidationRequest) -> Result<String> {
        let paths = Paths::builder()
            .quantity(request.paths.len() as i32)
            .set_items(Some(request.paths.clone()))
            .build()
            .map_err(|e| HookError::InvalidationFailed(e.to_string()))?;

        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(&request.caller_reference)
            .build()
            .map_err(|e| HookError::InvalidationFailed(e.to_string()))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(&request.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| HookError::InvalidationFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .invalidation()
            .map(|inv| inv.id().to_string())
            .unwrap_or_default())
    }
}

/// Result of purging a single target
#[derive(Debug)]
pub struct InvalidationOutcome {
    pub target: InvalidationTarget,
    pub result: Result<String>,
}

#[derive(Debug)]
pub enum InvalidationRun {
    /// No credentials, nothing was attempted
    Skipped,
    Attempted(Vec<InvalidationOutcome>),
}

impl InvalidationRun {
    pub fn attempted(&self) -> usize {
        match self {
            InvalidationRun::Skipped => 0,
            InvalidationRun::Attempted(outcomes) => outcomes.len(),
        }
    }

    pub fn failed(&self) -> usize {
        match self {
            InvalidationRun::Skipped => 0,
            InvalidationRun::Attempted(outcomes) => {
                outcomes.iter().filter(|o| o.result.is_err()).count()
            }
        }
    }
}

/// Purges the configured distributions after a deployment run
pub struct CacheInvalidator {
    targets: Vec<InvalidationTarget>,
    credentials: Arc<dyn CredentialSource>,
    client: Arc<dyn InvalidationClient>,
}

impl CacheInvalidator {
    pub fn new(
        targets: Vec<InvalidationTarget>,
        credentials: Arc<dyn CredentialSource>,
        client: Arc<dyn InvalidationClient>,
    ) -> Self {
        let targets = targets
            .into_iter()
            .filter(|t| !t.distribution_id.trim().is_empty())
            .collect();
        Self {
            targets,
            credentials,
            client,
        }
    }

    /// Targets in book, docs order, skipping the ones left empty.
    pub fn from_config(
        cdn: &CdnConfig,
        credentials: Arc<dyn CredentialSource>,
        client: Arc<dyn InvalidationClient>,
    ) -> Self {
        let targets = [
            ("book", &cdn.book_distribution_id),
            ("docs", &cdn.docs_distribution_id),
        ]
        .into_iter()
        .filter_map(|(name, id)| {
            id.as_ref()
                .map(|id| InvalidationTarget::new(name, id.as_str()))
        })
        .collect();
        Self::new(targets, credentials, client)
    }

    pub fn targets(&self) -> &[InvalidationTarget] {
        &self.targets
    }

    /// Attempt one wildcard invalidation per target.
    ///
    /// Skipped entirely when no credentials are present. A failing target is
    /// logged and does not stop the remaining ones; nothing is retried.
    pub async fn invalidate_all(&self) -> InvalidationRun {
        if !self.credentials.credentials_present() {
            info!("no CDN credentials present, skipping cache invalidation");
            return InvalidationRun::Skipped;
        }

        info!("creating cloudfront invalidation");
        let mut outcomes = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let request = InvalidationRequest::wildcard(target, Utc::now());
            let result = self.client.create_invalidation(&request).await;
            match &result {
                Ok(id) => info!(
                    "invalidated {} cdn ({}), invalidation id {}",
                    target.name, target.distribution_id, id
                ),
                Err(e) => error!("error invalidating {} cdn: {}", target.name, e),
            }
            outcomes.push(InvalidationOutcome {
                target: target.clone(),
                result,
            });
        }

        InvalidationRun::Attempted(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wildcard_request() {
        let target = InvalidationTarget::new("book", "E123");
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let request = InvalidationRequest::wildcard(&target, now);
        assert_eq!(request.distribution_id, "E123");
        assert_eq!(request.caller_reference, "1704164645");
        assert_eq!(request.paths, vec!["/*".to_string()]);
    }

    #[test]
    fn test_static_credentials() {
        assert!(StaticCredentials(true).credentials_present());
        assert!(!StaticCredentials(false).credentials_present());
    }
}
