//! AI gateway: the single entry point for chat completions.
//!
//! Wraps the provider list with three guarantees:
//! - single-flight: at most one call in flight process-wide, enforced by a
//!   one-permit semaphore handed out through [`AiGateway::try_begin`];
//! - fallback: quota and transport failures advance a round-robin cursor to
//!   the next valid provider and retry exactly once;
//! - one-time warnings: repeated failures surface to the user only once until
//!   [`AiGateway::reset_warnings`] is called.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ProviderConfig;
use crate::http::HttpProvider;
use crate::provider::{CompletionRequest, LlmError, LlmProvider};

/// Gateway-level failure for one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("no eligible provider configured")]
    NoEligibleProvider,
    /// First attempt failed with a non-retryable error.
    #[error("provider failed: {0}")]
    Provider(LlmError),
    /// First attempt failed, fallback retry failed too.
    #[error("providers exhausted (first: {first}, retry: {last})")]
    Exhausted { first: LlmError, last: LlmError },
}

/// Which one-time warning to latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Fallback retry also failed.
    ProviderFailing,
    /// No valid provider in the list.
    NotConfigured,
}

/// Successful completion plus the provider that produced it.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub token_count: u32,
    pub provider: String,
    pub provider_index: usize,
}

/// Proof that the holder owns the single in-flight slot. Dropping it frees
/// the slot.
#[derive(Debug)]
pub struct FlightPermit {
    _permit: OwnedSemaphorePermit,
}

struct ProviderSlot {
    config: ProviderConfig,
    provider: Arc<dyn LlmProvider>,
}

struct Inner {
    slots: Vec<ProviderSlot>,
    cursor: AtomicUsize,
    flight: Mutex<Arc<Semaphore>>,
    timeout: Option<Duration>,
    provider_warned: AtomicBool,
    config_warned: AtomicBool,
}

/// Clone-cheap handle; clones share the guard, cursor and warning latches.
#[derive(Clone)]
pub struct AiGateway {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiGateway")
            .field("providers", &self.inner.slots.len())
            .field("cursor", &self.cursor())
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl AiGateway {
    /// Build HTTP providers for every config.
    pub fn new(configs: Vec<ProviderConfig>, timeout: Option<Duration>) -> Self {
        let slots = configs
            .into_iter()
            .map(|config| {
                let provider: Arc<dyn LlmProvider> = Arc::new(HttpProvider::from_config(&config));
                (config, provider)
            })
            .collect();
        Self::with_providers(slots, timeout)
    }

    /// Build from explicit (config, provider) pairs.
    pub fn with_providers(
        slots: Vec<(ProviderConfig, Arc<dyn LlmProvider>)>,
        timeout: Option<Duration>,
    ) -> Self {
        let slots: Vec<ProviderSlot> = slots
            .into_iter()
            .map(|(config, provider)| ProviderSlot { config, provider })
            .collect();
        let start = first_valid(&slots).unwrap_or(0);
        Self {
            inner: Arc::new(Inner {
                slots,
                cursor: AtomicUsize::new(start),
                flight: Mutex::new(Arc::new(Semaphore::new(1))),
                timeout,
                provider_warned: AtomicBool::new(false),
                config_warned: AtomicBool::new(false),
            }),
        }
    }

    pub fn has_valid_provider(&self) -> bool {
        first_valid(&self.inner.slots).is_some()
    }

    /// Index of the provider the next call will start with.
    pub fn cursor(&self) -> Option<usize> {
        self.has_valid_provider()
            .then(|| self.inner.cursor.load(Ordering::SeqCst))
    }

    /// Name of the provider the next call will start with.
    pub fn current_provider(&self) -> Option<&str> {
        self.cursor().map(|i| self.inner.slots[i].provider.name())
    }

    /// True while a flight permit is held.
    pub fn is_busy(&self) -> bool {
        self.semaphore().available_permits() == 0
    }

    /// Claim the single in-flight slot, or `None` if it is taken.
    pub fn try_begin(&self) -> Option<FlightPermit> {
        self.semaphore()
            .try_acquire_owned()
            .ok()
            .map(|permit| FlightPermit { _permit: permit })
    }

    /// Run one completion with the fallback protocol.
    ///
    /// The caller must hold the flight permit for the duration of the call.
    pub async fn complete(
        &self,
        _permit: &FlightPermit,
        request: CompletionRequest,
    ) -> Result<Completion, GatewayError> {
        let first = self.current_index().ok_or(GatewayError::NoEligibleProvider)?;

        let first_err = match self.attempt(first, request.clone()).await {
            Ok(done) => return Ok(done),
            Err(e) if e.is_retryable() => e,
            Err(e) => {
                tracing::warn!(
                    provider = self.inner.slots[first].provider.name(),
                    error = %e,
                    "provider call failed, not retrying"
                );
                return Err(GatewayError::Provider(e));
            }
        };

        let next = self.advance_from(first);
        tracing::warn!(
            provider = self.inner.slots[first].provider.name(),
            fallback = self.inner.slots[next].provider.name(),
            error = %first_err,
            "provider call failed, retrying on fallback"
        );

        self.attempt(next, request).await.map_err(|last| {
            tracing::warn!(
                provider = self.inner.slots[next].provider.name(),
                error = %last,
                "fallback provider failed"
            );
            GatewayError::Exhausted { first: first_err, last }
        })
    }

    /// Latch a one-time warning. Returns true the first time only.
    pub fn latch_warning(&self, kind: WarningKind) -> bool {
        let flag = match kind {
            WarningKind::ProviderFailing => &self.inner.provider_warned,
            WarningKind::NotConfigured => &self.inner.config_warned,
        };
        !flag.swap(true, Ordering::SeqCst)
    }

    /// Re-arm both one-time warnings.
    pub fn reset_warnings(&self) {
        self.inner.provider_warned.store(false, Ordering::SeqCst);
        self.inner.config_warned.store(false, Ordering::SeqCst);
    }

    /// Session boundary: fresh flight guard and cursor back to the first
    /// valid provider. A permit still held by a stale task guards the old
    /// semaphore and no longer blocks new calls.
    pub fn reset(&self) {
        let mut flight = self
            .inner
            .flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *flight = Arc::new(Semaphore::new(1));
        drop(flight);
        self.inner
            .cursor
            .store(first_valid(&self.inner.slots).unwrap_or(0), Ordering::SeqCst);
    }

    fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(
            &self
                .inner
                .flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn current_index(&self) -> Option<usize> {
        let slots = &self.inner.slots;
        let cursor = self.inner.cursor.load(Ordering::SeqCst);
        if slots.get(cursor).is_some_and(|s| s.config.is_valid()) {
            return Some(cursor);
        }
        let found = next_valid(slots, cursor)?;
        self.inner.cursor.store(found, Ordering::SeqCst);
        Some(found)
    }

    /// Move the cursor to the next valid provider after `from` (wrapping,
    /// possibly back onto `from` itself).
    fn advance_from(&self, from: usize) -> usize {
        let next = next_valid(&self.inner.slots, from).unwrap_or(from);
        self.inner.cursor.store(next, Ordering::SeqCst);
        next
    }

    async fn attempt(&self, index: usize, request: CompletionRequest) -> Result<Completion, LlmError> {
        let slot = &self.inner.slots[index];
        let call = slot.provider.complete(request);
        let response = match self.inner.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| LlmError::Transport(format!("timed out after {}s", limit.as_secs())))?,
            None => call.await,
        }?;

        tracing::debug!(
            provider = slot.provider.name(),
            tokens = response.token_count(),
            "provider call succeeded"
        );
        Ok(Completion {
            token_count: response.token_count(),
            content: response.content,
            provider: slot.provider.name().to_owned(),
            provider_index: index,
        })
    }
}

fn first_valid(slots: &[ProviderSlot]) -> Option<usize> {
    slots.iter().position(|s| s.config.is_valid())
}

/// First valid slot strictly after `from`, wrapping around to `from` last.
fn next_valid(slots: &[ProviderSlot], from: usize) -> Option<usize> {
    let len = slots.len();
    (1..=len)
        .map(|step| (from + step) % len)
        .find(|&i| slots[i].config.is_valid())
}
