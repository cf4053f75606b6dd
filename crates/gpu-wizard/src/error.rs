//! Wizard-level errors and stable failure reason codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::validation::ValidationIssue;
use crate::wizard::Step;

/// Stable reason code carried by failures, for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// No available offer matches the selection.
    NoOffers,
    /// Balance unknown or below the minimum.
    BalanceInsufficient,
    /// The provider refused the request or reported the attempt failed.
    ProviderRejected,
    /// The attempt exceeded the provisioning timeout.
    Timeout,
    /// Cancelled by the user.
    Cancelled,
    /// Transient failures persisted after retries.
    TransientExhausted,
}

impl FailureReason {
    /// Stable code string.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::NoOffers => "no-offers",
            Self::BalanceInsufficient => "balance-insufficient",
            Self::ProviderRejected => "provider-rejected",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::TransientExhausted => "transient-exhausted",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Which kind of request a [`WizardError::Request`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Offer listing.
    Offers,
    /// Balance lookup.
    Balance,
    /// Starting an attempt.
    StartProvisioning,
    /// Status polling.
    Poll,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offers => write!(f, "offers"),
            Self::Balance => write!(f, "balance"),
            Self::StartProvisioning => write!(f, "start provisioning"),
            Self::Poll => write!(f, "status poll"),
        }
    }
}

/// Error surfaced in the wizard state.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardError {
    /// The current step cannot be left yet.
    #[error("step {step} is incomplete: {issues:?}")]
    StepIncomplete {
        step: Step,
        issues: Vec<ValidationIssue>,
    },

    /// Pre-provisioning validation failed.
    #[error("not ready to provision: {issues:?}")]
    NotReady { issues: Vec<ValidationIssue> },

    /// The location is not in the catalog.
    #[error("unknown location: {0}")]
    UnknownLocation(String),

    /// The offer ID is not among the fetched offers.
    #[error("unknown or unavailable offer: {0}")]
    UnknownOffer(String),

    /// Port configuration rejected.
    #[error("invalid ports: {0}")]
    InvalidPorts(String),

    /// Selections are locked while an attempt runs.
    #[error("a provisioning attempt is in flight")]
    AttemptInFlight,

    /// A machine was already provisioned; only a reset starts over.
    #[error("a machine was already provisioned, reset to start over")]
    AlreadyProvisioned,

    /// The session is not authenticated.
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    /// A request failed without ending the flow.
    #[error("{kind} request failed: {message}")]
    Request {
        kind: RequestKind,
        reason: FailureReason,
        message: String,
    },

    /// The provisioning attempt ended in failure.
    #[error("provisioning failed ({reason}): {message}")]
    Provisioning {
        reason: FailureReason,
        message: String,
    },
}

impl WizardError {
    /// Build a request error from a gateway failure.
    #[must_use]
    pub fn from_gateway(kind: RequestKind, error: &GatewayError) -> Self {
        match error {
            GatewayError::Auth(message) => Self::Unauthenticated(message.clone()),
            other => Self::Request {
                kind,
                reason: other.reason(),
                message: other.to_string(),
            },
        }
    }

    /// Stable reason code, where one applies.
    #[must_use]
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            Self::StepIncomplete { issues, .. } | Self::NotReady { issues } => {
                issues.iter().find_map(|i| i.reason())
            }
            Self::Request { reason, .. } | Self::Provisioning { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
