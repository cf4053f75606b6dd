//! Wizard state snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{
    locations_to_region_codes, recommended_strategy, FailoverStrategy, Location, StrategyKind,
    TierKind, DEFAULT_PORTS,
};
use crate::config::Policy;
use crate::error::{FailureReason, WizardError};
use crate::providers::{
    AttemptId, MachineOffer, OfferQuery, ProvisioningConfig, ProvisioningStatus,
};

use super::ranking::{rank_offers, RecommendedMachine};

/// Wizard steps, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Pick countries/regions.
    Location,
    /// Pick a tier and an offer.
    Hardware,
    /// Pick a failover strategy.
    Strategy,
    /// Review and provision.
    Provision,
}

impl Step {
    /// Total number of steps.
    pub const TOTAL_STEPS: u8 = 4;

    /// All steps in order.
    pub const ALL: [Self; 4] = [Self::Location, Self::Hardware, Self::Strategy, Self::Provision];

    /// 1-based step number.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Location => 1,
            Self::Hardware => 2,
            Self::Strategy => 3,
            Self::Provision => 4,
        }
    }

    /// Step for a 1-based number.
    #[must_use]
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.get(usize::from(number.checked_sub(1)?)).copied()
    }

    /// Following step.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    /// Preceding step.
    #[must_use]
    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }

    /// Title for display.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Location => "Choose location",
            Self::Hardware => "Choose hardware",
            Self::Strategy => "Choose failover strategy",
            Self::Provision => "Provision",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Sequence number tagging an asynchronous request.
///
/// Results carrying an ID the state no longer waits for are stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fetched offers, keyed by the query that produced them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum OffersCache {
    /// Nothing fetched.
    #[default]
    Empty,
    /// A fetch is in flight.
    Loading {
        request: RequestId,
        query: OfferQuery,
    },
    /// Results for `query`.
    Loaded {
        query: OfferQuery,
        offers: Vec<MachineOffer>,
    },
    /// The fetch for `query` failed.
    Failed { query: OfferQuery },
}

impl OffersCache {
    /// Offers if the cache holds results for exactly this query.
    #[must_use]
    pub fn offers_for(&self, query: &OfferQuery) -> Option<&[MachineOffer]> {
        match self {
            Self::Loaded { query: q, offers } if q == query => Some(offers),
            _ => None,
        }
    }

    /// Whether a fetch for this query is in flight.
    #[must_use]
    pub fn is_loading_for(&self, query: &OfferQuery) -> bool {
        matches!(self, Self::Loading { query: q, .. } if q == query)
    }

    /// Request ID of the in-flight fetch.
    #[must_use]
    pub fn pending_request(&self) -> Option<RequestId> {
        match self {
            Self::Loading { request, .. } => Some(*request),
            _ => None,
        }
    }
}

/// Cached account balance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Balance {
    /// Not fetched (treated as insufficient).
    #[default]
    Unknown,
    /// A fetch is in flight.
    Loading { request: RequestId },
    /// Balance in USD.
    Known(f64),
}

impl Balance {
    /// The balance, if known.
    #[must_use]
    pub fn known(self) -> Option<f64> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }
}

/// The in-flight provisioning attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningAttempt {
    /// Request that started the attempt.
    pub request: RequestId,
    /// Provider attempt ID, once the start request returned.
    pub attempt_id: Option<AttemptId>,
    /// Submitted configuration.
    pub config: ProvisioningConfig,
    /// Latest status.
    pub status: ProvisioningStatus,
    /// Seconds since the attempt started.
    pub elapsed_secs: u64,
    /// Latest ETA.
    pub estimated_remaining_secs: Option<u64>,
    /// When the provider accepted the request.
    pub started_at: Option<DateTime<Utc>>,
}

/// How the last attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// The machine is ready.
    Succeeded {
        attempt_id: AttemptId,
        config: ProvisioningConfig,
        elapsed_secs: u64,
    },
    /// The attempt failed.
    Failed {
        reason: FailureReason,
        attempt_id: Option<AttemptId>,
        elapsed_secs: u64,
    },
}

/// Coarse lifecycle phase, derived from the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardPhase {
    /// Nothing selected yet.
    Idle,
    /// Step 1.
    LocationStep,
    /// Step 2.
    HardwareStep,
    /// Step 3.
    StrategyStep,
    /// Step 4, no attempt yet.
    ReadyToProvision,
    /// An attempt is in flight.
    Provisioning,
    /// The last attempt succeeded.
    Succeeded,
    /// The last attempt failed.
    Failed,
}

/// Canonical wizard state. Mutated only through [`super::reduce`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardState {
    /// Current step.
    pub step: Step,
    /// Furthest step reached; never decreases until reset.
    pub furthest_step: Step,
    /// Selected locations, in selection order.
    pub locations: Vec<Location>,
    /// Selected tier.
    pub tier: Option<TierKind>,
    /// Selected failover strategy.
    pub strategy: StrategyKind,
    /// Offer to provision.
    pub chosen_offer: Option<MachineOffer>,
    /// Ports to open.
    pub ports: Vec<u16>,
    /// Offers cache.
    pub offers: OffersCache,
    /// Balance cache.
    pub balance: Balance,
    /// In-flight attempt.
    pub attempt: Option<ProvisioningAttempt>,
    /// Result of the last attempt.
    pub outcome: Option<Outcome>,
    /// Last error.
    pub error: Option<WizardError>,
    /// Decision constants.
    pub policy: Policy,
    next_request: u64,
}

impl Default for WizardState {
    fn default() -> Self {
        Self::initial()
    }
}

impl WizardState {
    /// Step 1, nothing selected, nothing cached, default policy.
    #[must_use]
    pub fn initial() -> Self {
        Self::new(Policy::default())
    }

    /// Initial state with an explicit policy.
    #[must_use]
    pub fn new(policy: Policy) -> Self {
        Self {
            step: Step::Location,
            furthest_step: Step::Location,
            locations: Vec::new(),
            tier: None,
            strategy: recommended_strategy(),
            chosen_offer: None,
            ports: DEFAULT_PORTS.to_vec(),
            offers: OffersCache::Empty,
            balance: Balance::Unknown,
            attempt: None,
            outcome: None,
            error: None,
            policy,
            next_request: 1,
        }
    }

    /// Fresh initial state that keeps the policy and the request sequence.
    #[must_use]
    pub(crate) fn reset(&self) -> Self {
        Self {
            next_request: self.next_request,
            ..Self::new(self.policy)
        }
    }

    /// Allocate the next request ID.
    pub(crate) fn next_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        id
    }

    /// API region codes of the current selection.
    #[must_use]
    pub fn region_codes(&self) -> Vec<String> {
        locations_to_region_codes(&self.locations)
    }

    /// Offer query for the current selection, if it is complete enough.
    #[must_use]
    pub fn offer_query(&self) -> Option<OfferQuery> {
        let tier = self.tier?;
        let region_codes = self.region_codes();
        if region_codes.is_empty() {
            return None;
        }
        Some(OfferQuery { region_codes, tier })
    }

    /// Fetched offers valid for the current selection.
    #[must_use]
    pub fn current_offers(&self) -> Option<&[MachineOffer]> {
        self.offer_query()
            .and_then(|query| self.offers.offers_for(&query))
    }

    /// Ranked candidates for the current selection.
    #[must_use]
    pub fn recommendations(&self) -> Vec<RecommendedMachine> {
        match (self.tier, self.current_offers()) {
            (Some(tier), Some(offers)) => {
                rank_offers(offers, tier.tier(), self.policy.max_recommendations)
            }
            _ => Vec::new(),
        }
    }

    /// The offer provisioning would use: the chosen one, else the top recommendation.
    #[must_use]
    pub fn effective_offer(&self) -> Option<MachineOffer> {
        self.chosen_offer
            .clone()
            .or_else(|| self.recommendations().into_iter().next().map(|r| r.offer))
    }

    /// Catalog entry of the selected strategy.
    #[must_use]
    pub fn selected_strategy(&self) -> &'static FailoverStrategy {
        self.strategy.strategy()
    }

    /// Whether an attempt is in flight.
    #[must_use]
    pub fn is_provisioning(&self) -> bool {
        self.attempt.is_some()
    }

    /// Build the payload for `start_provisioning`.
    #[must_use]
    pub fn provisioning_config(&self) -> Option<ProvisioningConfig> {
        Some(ProvisioningConfig {
            region_codes: self.region_codes(),
            locations: self.locations.iter().map(Location::key).collect(),
            tier: self.tier?,
            offer: self.effective_offer()?,
            strategy: self.strategy,
            ports: self.ports.clone(),
        })
    }

    /// Derived lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> WizardPhase {
        if self.attempt.is_some() {
            return WizardPhase::Provisioning;
        }
        match self.outcome {
            Some(Outcome::Succeeded { .. }) => return WizardPhase::Succeeded,
            Some(Outcome::Failed { .. }) => return WizardPhase::Failed,
            None => {}
        }
        match self.step {
            Step::Location
                if self.locations.is_empty() && self.furthest_step == Step::Location =>
            {
                WizardPhase::Idle
            }
            Step::Location => WizardPhase::LocationStep,
            Step::Hardware => WizardPhase::HardwareStep,
            Step::Strategy => WizardPhase::StrategyStep,
            Step::Provision => WizardPhase::ReadyToProvision,
        }
    }
}
