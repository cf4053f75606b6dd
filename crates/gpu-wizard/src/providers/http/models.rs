//! Wire models for the `/api/v0` provisioning REST API.

use serde::{Deserialize, Serialize};

// ============================================================================
// Offers
// ============================================================================

/// `GET /api/v0/offers` response.
#[derive(Debug, Deserialize)]
pub struct OffersResponse {
    /// Matching offers.
    #[serde(default)]
    pub offers: Vec<OfferRecord>,
}

/// Offer IDs are numeric on some deployments and strings on others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OfferIdValue {
    /// Numeric ID.
    Number(u64),
    /// String ID.
    Text(String),
}

impl std::fmt::Display for OfferIdValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One offer as sent by the API.
#[derive(Debug, Deserialize)]
pub struct OfferRecord {
    /// Offer ID.
    pub id: OfferIdValue,
    /// GPU model name.
    pub gpu_name: Option<String>,
    /// Number of GPUs.
    pub num_gpus: Option<u32>,
    /// GPU memory per card in GB.
    pub gpu_ram: Option<f64>,
    /// Compute score (TFLOPS).
    pub compute_score: Option<f64>,
    /// Total dollars per hour.
    pub dph_total: Option<f64>,
    /// API region code.
    pub region: Option<String>,
    /// Whether the offer can be rented now.
    pub rentable: Option<bool>,
}

// ============================================================================
// Balance
// ============================================================================

/// `GET /api/v0/balance` response.
#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    /// Account credit in USD.
    pub credit: f64,
}

// ============================================================================
// Instances
// ============================================================================

/// `POST /api/v0/instances` body.
#[derive(Debug, Serialize)]
pub struct CreateInstanceBody {
    /// Offer to rent.
    pub offer_id: String,
    /// Selected API region codes.
    pub regions: Vec<String>,
    /// Tier identifier.
    pub tier: String,
    /// Failover strategy identifier.
    pub strategy: String,
    /// Ports to open.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
}

/// `POST /api/v0/instances` response.
#[derive(Debug, Deserialize)]
pub struct CreateInstanceResponse {
    /// Attempt identifier.
    pub attempt_id: String,
}

/// `GET /api/v0/instances/{id}` response.
#[derive(Debug, Deserialize)]
pub struct InstanceStatusResponse {
    /// Provider status string.
    pub status: Option<String>,
    /// Progress percentage.
    pub progress: Option<f64>,
    /// Human-readable status message.
    pub status_msg: Option<String>,
}
