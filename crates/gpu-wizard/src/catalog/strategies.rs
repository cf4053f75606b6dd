//! Failover strategies and their cost/recovery characteristics.

use serde::{Deserialize, Serialize};

/// Hours used to derive a monthly cost from an hourly one.
pub const HOURS_PER_MONTH: f64 = 720.0;

/// Failover strategy identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Periodic compressed snapshots, restored onto a new machine.
    SnapshotOnly,
    /// A secondary GPU kept ready on the same host.
    WarmPool,
    /// A low-cost CPU instance keeping data synchronized.
    CpuStandbyOnly,
    /// Standby capacity at another provider.
    ThirdPartyStandby,
    /// No failover.
    None,
}

impl StrategyKind {
    /// Stable identifier used on the wire and in the CLI.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SnapshotOnly => "snapshot_only",
            Self::WarmPool => "warm_pool",
            Self::CpuStandbyOnly => "cpu_standby_only",
            Self::ThirdPartyStandby => "third_party_standby",
            Self::None => "none",
        }
    }

    /// Catalog entry for this strategy.
    #[must_use]
    pub fn strategy(self) -> &'static FailoverStrategy {
        STRATEGIES
            .iter()
            .find(|s| s.kind == self)
            .unwrap_or(&STRATEGIES[STRATEGIES.len() - 1])
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        STRATEGIES
            .iter()
            .map(|s| s.kind)
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| format!("unknown failover strategy: {s}"))
    }
}

/// A failover strategy offered by the catalog.
#[derive(Debug, Clone, Copy)]
pub struct FailoverStrategy {
    /// Strategy identifier.
    pub kind: StrategyKind,
    /// Display name.
    pub name: &'static str,
    /// Upper bound on recovery time in seconds (`None` = no recovery).
    pub recovery_time_secs: Option<u64>,
    /// Upper bound on data loss in seconds of work (`None` = everything since start).
    pub data_loss_secs: Option<u64>,
    /// Recurring cost on top of the GPU, USD per hour.
    pub hourly_cost: f64,
    /// Whether the strategy can be selected at all.
    pub available: bool,
    /// Needs a host with at least two GPUs.
    pub requires_multi_gpu: bool,
    /// Default selection.
    pub recommended: bool,
    /// Historical average time to bring a machine up with this strategy.
    pub typical_setup_secs: u64,
}

impl FailoverStrategy {
    /// Monthly recurring cost in USD.
    #[must_use]
    pub fn monthly_cost(&self) -> f64 {
        self.hourly_cost * HOURS_PER_MONTH
    }

    /// Whether the strategy has a recurring cost.
    #[must_use]
    pub fn has_recurring_cost(&self) -> bool {
        self.hourly_cost > 0.0
    }
}

pub static STRATEGIES: &[FailoverStrategy] = &[
    FailoverStrategy {
        kind: StrategyKind::SnapshotOnly,
        name: "Snapshot only",
        recovery_time_secs: Some(600),
        data_loss_secs: Some(3600),
        hourly_cost: 0.005,
        available: true,
        requires_multi_gpu: false,
        recommended: false,
        typical_setup_secs: 180,
    },
    FailoverStrategy {
        kind: StrategyKind::WarmPool,
        name: "Warm pool",
        recovery_time_secs: Some(30),
        data_loss_secs: Some(0),
        hourly_cost: 0.03,
        available: true,
        requires_multi_gpu: true,
        recommended: false,
        typical_setup_secs: 240,
    },
    FailoverStrategy {
        kind: StrategyKind::CpuStandbyOnly,
        name: "CPU standby",
        recovery_time_secs: Some(300),
        data_loss_secs: Some(60),
        hourly_cost: 0.01,
        available: true,
        requires_multi_gpu: false,
        recommended: true,
        typical_setup_secs: 210,
    },
    FailoverStrategy {
        kind: StrategyKind::ThirdPartyStandby,
        name: "Third-party standby",
        recovery_time_secs: Some(900),
        data_loss_secs: Some(300),
        hourly_cost: 0.02,
        available: false,
        requires_multi_gpu: false,
        recommended: false,
        typical_setup_secs: 300,
    },
    FailoverStrategy {
        kind: StrategyKind::None,
        name: "No failover",
        recovery_time_secs: None,
        data_loss_secs: None,
        hourly_cost: 0.0,
        available: true,
        requires_multi_gpu: false,
        recommended: false,
        typical_setup_secs: 120,
    },
];

/// The catalog-flagged default strategy.
#[must_use]
pub fn recommended_strategy() -> StrategyKind {
    STRATEGIES
        .iter()
        .find(|s| s.recommended)
        .map_or(StrategyKind::None, |s| s.kind)
}
