//! Inputs to and side effects of the wizard reducer.

use chrono::{DateTime, Utc};

use crate::catalog::{Location, StrategyKind, TierKind};
use crate::gateway::GatewayError;
use crate::providers::{AttemptId, MachineOffer, OfferQuery, ProvisioningConfig, ProvisioningStatus};
use crate::timer::TimerTick;

use super::state::RequestId;

/// Everything that can change the wizard state.
///
/// User intents come from the caller; the `*Loaded`, `Provisioning*` and
/// `PollFailed` variants are results of effects re-entering the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Add a location to the selection.
    SelectLocation(Location),
    /// Remove a location by [`Location::key`].
    DeselectLocation(String),
    /// Choose a hardware tier.
    SelectTier(TierKind),
    /// Choose an offer by ID instead of the top recommendation.
    SelectOffer(String),
    /// Choose a failover strategy.
    SelectStrategy(StrategyKind),
    /// Replace the port configuration.
    SetPorts(Vec<u16>),
    /// Go to the next step.
    Advance,
    /// Go to the previous step.
    Retreat,
    /// Validate and start a provisioning attempt.
    StartProvisioning,
    /// Abandon the in-flight attempt.
    Cancel,
    /// Abandon everything and start over.
    Reset,

    /// Offer fetch finished.
    OffersLoaded {
        request: RequestId,
        result: Result<Vec<MachineOffer>, GatewayError>,
    },
    /// Balance fetch finished.
    BalanceLoaded {
        request: RequestId,
        result: Result<f64, GatewayError>,
    },
    /// Start request finished.
    ProvisioningStarted {
        request: RequestId,
        result: Result<AttemptId, GatewayError>,
        started_at: DateTime<Utc>,
    },
    /// Timer snapshot.
    ProvisioningTick { request: RequestId, tick: TimerTick },
    /// Non-terminal poll result.
    ProvisioningStatus {
        request: RequestId,
        status: ProvisioningStatus,
    },
    /// Terminal poll result.
    ProvisioningTerminal {
        request: RequestId,
        status: ProvisioningStatus,
    },
    /// Polling gave up.
    PollFailed {
        request: RequestId,
        error: GatewayError,
    },
}

/// Side effects requested by a transition, run by [`super::WizardSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch offers; supersedes any older fetch.
    FetchOffers { request: RequestId, query: OfferQuery },
    /// Fetch the balance.
    FetchBalance { request: RequestId },
    /// Submit the attempt and start its timer.
    StartProvisioning {
        request: RequestId,
        config: ProvisioningConfig,
        fallback_eta_secs: u64,
    },
    /// Start polling an accepted attempt.
    MonitorAttempt {
        request: RequestId,
        attempt_id: AttemptId,
    },
    /// Stop polling and the timer.
    StopMonitoring,
    /// Abandon outstanding offer and balance fetches.
    CancelReads,
    /// Best-effort provider-side teardown.
    CancelProvisioning { attempt_id: AttemptId },
    /// Cancel every outstanding call and start a fresh token.
    CancelAll,
}
