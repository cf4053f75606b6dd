//! Hardware performance tiers.

use serde::{Deserialize, Serialize};

use crate::providers::MachineOffer;

/// Named hardware bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Consumer cards, lowest price.
    Budget,
    /// Mid-range cards for most inference work.
    Standard,
    /// Datacenter cards.
    HighEnd,
}

impl TierKind {
    /// Stable identifier used on the wire and in the CLI.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Standard => "standard",
            Self::HighEnd => "high_end",
        }
    }

    /// Catalog entry for this tier.
    #[must_use]
    pub fn tier(self) -> &'static PerformanceTier {
        match self {
            Self::Budget => &TIERS[0],
            Self::Standard => &TIERS[1],
            Self::HighEnd => &TIERS[2],
        }
    }
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "budget" => Ok(Self::Budget),
            "standard" => Ok(Self::Standard),
            "high_end" | "highend" => Ok(Self::HighEnd),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Filter parameters used to query offers for a tier.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceTier {
    /// Tier identifier.
    pub kind: TierKind,
    /// Display name.
    pub name: &'static str,
    /// Short description.
    pub description: &'static str,
    /// Minimum GPU memory per card in GB.
    pub min_vram_gb: u32,
    /// Minimum compute score (TFLOPS).
    pub min_compute_score: f64,
    /// Maximum hourly price in USD.
    pub max_price_per_hour: f64,
}

impl PerformanceTier {
    /// Whether an offer satisfies this tier's filters.
    #[must_use]
    pub fn matches(&self, offer: &MachineOffer) -> bool {
        offer.gpu_ram_gb >= self.min_vram_gb
            && offer.compute_score >= self.min_compute_score
            && offer.price_per_hour <= self.max_price_per_hour
    }
}

/// All tiers, cheapest first.
pub static TIERS: [PerformanceTier; 3] = [
    PerformanceTier {
        kind: TierKind::Budget,
        name: "Budget",
        description: "RTX 3060/3080 class, experiments and small models",
        min_vram_gb: 8,
        min_compute_score: 5.0,
        max_price_per_hour: 0.35,
    },
    PerformanceTier {
        kind: TierKind::Standard,
        name: "Standard",
        description: "RTX 3090/4090 class, most inference workloads",
        min_vram_gb: 16,
        min_compute_score: 20.0,
        max_price_per_hour: 1.00,
    },
    PerformanceTier {
        kind: TierKind::HighEnd,
        name: "High-End",
        description: "A100/H100 class, training and large models",
        min_vram_gb: 40,
        min_compute_score: 60.0,
        max_price_per_hour: 4.00,
    },
];
