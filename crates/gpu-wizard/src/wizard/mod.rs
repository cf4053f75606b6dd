//! The provisioning wizard: state, transitions and the effect runner.
//!
//! [`reduce`] is the only place the state changes. [`WizardSession`] owns a
//! state, runs the [`Effect`]s a transition returns and feeds their results
//! back in as [`Action`]s.

mod action;
pub mod ranking;
mod reducer;
mod session;
mod state;

pub use action::{Action, Effect};
pub use ranking::{rank_offers, RecommendationTag, RecommendedMachine};
pub use reducer::reduce;
pub use session::WizardSession;
pub use state::{
    Balance, OffersCache, Outcome, ProvisioningAttempt, RequestId, Step, WizardPhase,
    WizardState,
};
