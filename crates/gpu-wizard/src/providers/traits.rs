//! Provisioning API capability trait and the shapes it exchanges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{PerformanceTier, StrategyKind, TierKind};

/// Errors raised by a provisioning API transport.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A provider-advertised machine that can be rented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineOffer {
    /// Offer ID.
    pub id: String,
    /// GPU model (e.g., "RTX 4090").
    pub gpu_model: String,
    /// Number of GPUs on the host.
    pub gpu_count: u32,
    /// GPU memory per card in GB.
    pub gpu_ram_gb: u32,
    /// Compute score (TFLOPS).
    pub compute_score: f64,
    /// API region code of the host.
    pub region: String,
    /// Hourly price in USD.
    pub price_per_hour: f64,
    /// Whether the offer can currently be rented.
    pub available: bool,
}

/// Filter sent to `fetch_offers`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferQuery {
    /// De-duplicated API region codes.
    pub region_codes: Vec<String>,
    /// Tier whose filters apply.
    pub tier: TierKind,
}

impl OfferQuery {
    /// Filter parameters of the queried tier.
    #[must_use]
    pub fn filter(&self) -> &'static PerformanceTier {
        self.tier.tier()
    }
}

/// Identifier of one provisioning attempt, assigned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub String);

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttemptId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Finalized selections submitted to start provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// API region codes of the selected locations.
    pub region_codes: Vec<String>,
    /// Selected location keys, in selection order.
    pub locations: Vec<String>,
    /// Hardware tier.
    pub tier: TierKind,
    /// Offer to rent.
    pub offer: MachineOffer,
    /// Failover strategy.
    pub strategy: StrategyKind,
    /// Ports to open.
    pub ports: Vec<u16>,
}

/// Lifecycle phase of a provisioning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPhase {
    /// Accepted by the provider, machine not yet booting.
    Pending,
    /// Machine is booting / becoming reachable.
    Connecting,
    /// Machine is ready.
    Ready,
    /// Attempt failed.
    Failed,
}

impl ProvisionPhase {
    /// Whether the phase ends the attempt.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    fn order(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Connecting => 1,
            Self::Ready | Self::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` goes forward (or stays put).
    #[must_use]
    pub fn allows(self, next: Self) -> bool {
        !self.is_terminal() && next.order() >= self.order()
    }
}

impl std::fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Status of an in-flight attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningStatus {
    /// Current phase.
    pub phase: ProvisionPhase,
    /// Provider-reported progress, 0-100.
    pub progress_percent: Option<f64>,
    /// Provider message.
    pub message: Option<String>,
}

impl ProvisioningStatus {
    /// Status of a freshly accepted attempt.
    #[must_use]
    pub fn pending() -> Self {
        Self::with_phase(ProvisionPhase::Pending)
    }

    /// Status with only a phase.
    #[must_use]
    pub fn with_phase(phase: ProvisionPhase) -> Self {
        Self {
            phase,
            progress_percent: None,
            message: None,
        }
    }

    /// Whether the attempt has ended.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Capability interface to the offers/provisioning API.
///
/// Implementations translate the provider's wire format into these shapes
/// and report raw transport errors; retry and cancellation live in
/// [`crate::gateway::Gateway`].
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    /// List offers matching the query. An empty list is not an error.
    async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<MachineOffer>, ProviderError>;

    /// Current account balance in USD.
    async fn fetch_balance(&self) -> Result<f64, ProviderError>;

    /// Submit a provisioning request.
    async fn start_provisioning(
        &self,
        config: &ProvisioningConfig,
    ) -> Result<AttemptId, ProviderError>;

    /// Current status of an attempt.
    async fn poll_status(&self, attempt: &AttemptId) -> Result<ProvisioningStatus, ProviderError>;

    /// Tear down an attempt.
    async fn cancel_provisioning(&self, attempt: &AttemptId) -> Result<(), ProviderError>;
}
