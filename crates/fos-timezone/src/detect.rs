//! Timezone detection
//!
//! One detection cycle races every provider through
//! [`fos_network::first_success`] and commits the winner:
//!
//! 1. take a new cycle generation (older cycles can no longer commit)
//! 2. in [`DetectionMode::Invalidate`], clear the stored zone and tell
//!    open pages
//! 3. race the providers, each under its own timeout
//! 4. clear-then-set the result, persist, then broadcast
//!
//! A failed race writes nothing.

use crate::bridge::PageRegistry;
use crate::provider::{ProviderDescriptor, ProviderFailure};
use crate::state::{DetectionResult, SharedState, StoreError};
use fos_network::{first_success, Entrant, Fetch, RaceError, Win};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Detection errors
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("All timezone providers failed")]
    AllProvidersFailed(#[source] RaceError<ProviderFailure>),

    #[error("Detection cycle {0} was superseded by a newer one")]
    Superseded(u64),

    #[error("Failed to store detection result: {0}")]
    Store(#[from] StoreError),
}

/// What happens to the stored zone while a cycle runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectionMode {
    /// Clear the stored zone before racing so dependents block until the
    /// new answer is in
    #[default]
    Invalidate,
    /// Keep serving the previous zone until a new one wins
    KeepPrevious,
}

/// Something that can start a detection cycle in the background
pub trait DetectionTrigger: Send + Sync + 'static {
    /// Start a cycle without waiting for it
    fn trigger(&self);
}

/// Runs detection cycles against a set of providers
pub struct TimezoneDetector<F> {
    fetch: Arc<F>,
    providers: Arc<[ProviderDescriptor]>,
    state: Arc<SharedState>,
    pages: Arc<PageRegistry>,
}

impl<F> Clone for TimezoneDetector<F> {
    fn clone(&self) -> Self {
        Self {
            fetch: Arc::clone(&self.fetch),
            providers: Arc::clone(&self.providers),
            state: Arc::clone(&self.state),
            pages: Arc::clone(&self.pages),
        }
    }
}

impl<F: Fetch> TimezoneDetector<F> {
    /// Detector over the built-in providers
    pub fn new(fetch: F, state: Arc<SharedState>, pages: Arc<PageRegistry>) -> Self {
        Self {
            fetch: Arc::new(fetch),
            providers: ProviderDescriptor::defaults().into(),
            state,
            pages,
        }
    }

    /// Replace the provider list
    pub fn with_providers(mut self, providers: Vec<ProviderDescriptor>) -> Self {
        self.providers = providers.into();
        self
    }

    /// Providers raced in each cycle
    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// Shared state this detector writes to
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Run one detection cycle to completion
    pub async fn detect(&self, mode: DetectionMode) -> Result<DetectionResult, DetectionError> {
        let generation = self.state.begin_cycle();
        info!(
            "Detection cycle {} started ({} providers, {:?})",
            generation,
            self.providers.len(),
            mode
        );

        if mode == DetectionMode::Invalidate {
            self.state.clear_detection()?;
            self.pages.broadcast(None);
        }

        let entrants = self
            .providers
            .iter()
            .map(|provider| {
                let fetch = Arc::clone(&self.fetch);
                let provider = provider.clone();
                Entrant::new(provider.id.clone(), provider.timeout, async move {
                    provider.lookup(fetch.as_ref()).await
                })
            })
            .collect();

        match first_success(entrants).await {
            Ok(Win { label, value }) => {
                let result = DetectionResult::new(value, label);
                if !self.state.commit_detection(generation, result.clone())? {
                    return Err(DetectionError::Superseded(generation));
                }

                info!(
                    "Timezone detected: {} (via {})",
                    result.timezone_id, result.source_provider_id
                );
                let reached = self.pages.sync_with(&self.state);
                debug!("Detection result sent to {} page(s)", reached);
                Ok(result)
            }
            Err(e) => {
                for (provider, failure) in e.failures() {
                    warn!("Provider {} failed: {}", provider, failure);
                }
                error!("Timezone detection failed: no provider answered");
                Err(DetectionError::AllProvidersFailed(e))
            }
        }
    }

    /// Run a cycle on the current tokio runtime
    pub fn spawn(&self, mode: DetectionMode) -> JoinHandle<Result<DetectionResult, DetectionError>> {
        let detector = self.clone();
        tokio::spawn(async move { detector.detect(mode).await })
    }
}

impl<F: Fetch> DetectionTrigger for TimezoneDetector<F> {
    fn trigger(&self) {
        // Outcome is logged by detect(); nobody waits on it
        drop(self.spawn(DetectionMode::Invalidate));
    }
}
