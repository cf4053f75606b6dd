//! API gateway: retry, cancellation and error normalization around a
//! [`ProvisioningApi`] transport.
//!
//! Reads (`fetch_offers`, `fetch_balance`, `poll_status`) retry transient
//! failures with exponential backoff. `start_provisioning` is side-effecting
//! and is attempted exactly once. `cancel_provisioning` is best-effort.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FailureReason;
use crate::providers::{
    AttemptId, MachineOffer, OfferQuery, ProviderError, ProvisioningApi, ProvisioningConfig,
    ProvisioningStatus,
};

/// Normalized gateway failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider rejected the request; retrying will not help.
    #[error("rejected by provider: {0}")]
    Validation(String),

    /// Network or provider hiccup, after `attempts` tries.
    #[error("transient failure after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    /// The session is not authenticated.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The provider timed out.
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    /// The caller's cancellation token fired.
    #[error("cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Reason code for a failure caused by this error.
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Validation(_) | Self::Auth(_) => FailureReason::ProviderRejected,
            Self::Transient { .. } => FailureReason::TransientExhausted,
            Self::Timeout(_) => FailureReason::Timeout,
            Self::Cancelled => FailureReason::Cancelled,
        }
    }
}

impl From<ProviderError> for GatewayError {
    fn from(error: ProviderError) -> Self {
        let message = error.to_string();
        match error {
            ProviderError::Api { status, .. } => match status {
                401 | 403 => Self::Auth(message),
                408 | 429 | 500..=599 => Self::Transient {
                    attempts: 1,
                    message,
                },
                _ => Self::Validation(message),
            },
            ProviderError::NotFound(_) | ProviderError::Config(_) => Self::Validation(message),
            ProviderError::Timeout(secs) => Self::Timeout(secs),
            ProviderError::Http(_) | ProviderError::Serialization(_) => Self::Transient {
                attempts: 1,
                message,
            },
        }
    }
}

/// Retry configuration for gateway reads.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry.min(10)).unwrap_or(10);
        let multiplier = self.backoff_multiplier.powi(exp);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Whether another attempt is allowed after `attempts` tries.
    #[must_use]
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Retry- and cancellation-aware front for a [`ProvisioningApi`].
#[derive(Clone)]
pub struct Gateway {
    api: Arc<dyn ProvisioningApi>,
    retry: RetryConfig,
}

impl Gateway {
    /// Wrap a transport.
    #[must_use]
    pub fn new(api: Arc<dyn ProvisioningApi>, retry: RetryConfig) -> Self {
        Self { api, retry }
    }

    /// Fetch offers. An empty list is a successful result.
    ///
    /// # Errors
    /// Returns the normalized error once retries are exhausted or the token fires.
    pub async fn fetch_offers(
        &self,
        query: &OfferQuery,
        token: &CancellationToken,
    ) -> Result<Vec<MachineOffer>, GatewayError> {
        let api = self.api.as_ref();
        self.with_retry("fetch_offers", token, move || api.fetch_offers(query))
            .await
    }

    /// Fetch the account balance. Auth failures are returned without retry.
    ///
    /// # Errors
    /// Returns the normalized error once retries are exhausted or the token fires.
    pub async fn fetch_balance(&self, token: &CancellationToken) -> Result<f64, GatewayError> {
        let api = self.api.as_ref();
        self.with_retry("fetch_balance", token, move || api.fetch_balance())
            .await
    }

    /// Submit a provisioning request exactly once.
    ///
    /// The token is checked before sending; once sent, the request is not
    /// abandoned so that its outcome is always observed.
    ///
    /// # Errors
    /// Returns [`GatewayError::Cancelled`] if the token already fired, or the
    /// normalized provider error.
    pub async fn start_provisioning(
        &self,
        config: &ProvisioningConfig,
        token: &CancellationToken,
    ) -> Result<AttemptId, GatewayError> {
        if token.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        self.api
            .start_provisioning(config)
            .await
            .map_err(GatewayError::from)
    }

    /// Poll an attempt's status.
    ///
    /// # Errors
    /// Returns the normalized error once retries are exhausted or the token fires.
    pub async fn poll_status(
        &self,
        attempt: &AttemptId,
        token: &CancellationToken,
    ) -> Result<ProvisioningStatus, GatewayError> {
        let api = self.api.as_ref();
        self.with_retry("poll_status", token, move || api.poll_status(attempt))
            .await
    }

    /// Best-effort teardown. Errors are logged, never returned.
    ///
    /// Runs regardless of any wizard token: it is usually issued right after
    /// that token was cancelled.
    pub async fn cancel_provisioning(&self, attempt: &AttemptId) {
        match self.api.cancel_provisioning(attempt).await {
            Ok(()) => info!(attempt_id = %attempt, "Provisioning attempt cancelled"),
            Err(e) => warn!(attempt_id = %attempt, error = %e, "Failed to cancel provisioning attempt"),
        }
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        token: &CancellationToken,
        mut f: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = tokio::select! {
                biased;
                () = token.cancelled() => return Err(GatewayError::Cancelled),
                result = f() => result,
            };

            let message = match result.map_err(GatewayError::from) {
                Ok(value) => return Ok(value),
                Err(GatewayError::Transient { message, .. }) => message,
                Err(error) => {
                    debug!(operation, error = %error, "Non-retriable gateway failure");
                    return Err(error);
                }
            };

            if !self.retry.should_retry(attempts) {
                warn!(operation, attempts, error = %message, "Retries exhausted");
                return Err(GatewayError::Transient { attempts, message });
            }

            let delay = self.retry.delay_for_attempt(attempts - 1);
            warn!(
                operation,
                attempt = attempts,
                max_attempts = self.retry.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %message,
                "Transient failure, retrying"
            );

            tokio::select! {
                biased;
                () = token.cancelled() => return Err(GatewayError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
