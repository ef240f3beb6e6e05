//! Configurable adapter for exercising the orchestrator
//!
//! A `MockAdapter` can succeed, fail with a chosen error, panic, or stall for
//! a while before answering. It never touches the network, which makes it
//! suitable for integration tests that need to control every platform's
//! outcome.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::{mismatch, PlatformAdapter, PlatformCredentials};
use crate::types::Platform;

#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    Fail(PlatformError),
    Panic,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,
    pub behavior: MockBehavior,
    /// Simulated network latency before the outcome is produced
    pub delay: Duration,
    pub is_configured: bool,
    pub call_count: Arc<AtomicUsize>,
    pub posted: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            behavior: MockBehavior::Succeed,
            delay: Duration::ZERO,
            is_configured: true,
            call_count: Arc::new(AtomicUsize::new(0)),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockAdapter {
    config: MockConfig,
}

impl MockAdapter {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    pub fn failure(platform: Platform, error: PlatformError) -> Self {
        Self::new(MockConfig {
            behavior: MockBehavior::Fail(error),
            ..MockConfig::new(platform)
        })
    }

    pub fn panicking(platform: Platform) -> Self {
        Self::new(MockConfig {
            behavior: MockBehavior::Panic,
            ..MockConfig::new(platform)
        })
    }

    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    pub fn not_configured(platform: Platform) -> Self {
        Self::new(MockConfig {
            is_configured: false,
            ..MockConfig::new(platform)
        })
    }

    pub fn call_count(&self) -> usize {
        self.config.call_count.load(Ordering::SeqCst)
    }

    /// Content and media of every successful call, in call order
    pub fn posted(&self) -> Vec<(String, Vec<String>)> {
        self.config
            .posted
            .lock()
            .map(|posted| posted.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        content: &str,
        media: &[String],
    ) -> Result<String> {
        self.config.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.config.is_configured {
            return Err(PlatformError::NotConfigured(format!("mock {}", self.config.platform)).into());
        }
        if credentials.platform() != self.config.platform {
            return Err(mismatch(self.config.platform));
        }

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        match &self.config.behavior {
            MockBehavior::Succeed => {
                if let Ok(mut posted) = self.config.posted.lock() {
                    posted.push((content.to_string(), media.to_vec()));
                }
                Ok(format!("{}:mock-{}", self.config.platform, uuid::Uuid::new_v4()))
            }
            MockBehavior::Fail(error) => Err(error.clone().into()),
            MockBehavior::Panic => panic!("mock {} adapter panicked", self.config.platform),
        }
    }
}
