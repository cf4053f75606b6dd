//! Orchestration core of a GPU rental provisioning wizard.
//!
//! The wizard walks a user through four steps and then provisions a machine:
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐
//! │ Location │──►│ Hardware │──►│ Strategy │──►│ Provision │
//! │ regions  │   │ tier +   │   │ failover │   │ start,    │
//! │ countries│   │ offer    │   │ balance  │   │ poll, ETA │
//! └──────────┘   └──────────┘   └──────────┘   └───────────┘
//! ```
//!
//! State changes only through the pure [`wizard::reduce`] function. A
//! [`wizard::WizardSession`] runs the effects it returns (offer and balance
//! fetches, the provisioning request, status polling and the ETA timer)
//! against a [`providers::ProvisioningApi`] through the retrying
//! [`gateway::Gateway`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gpu_wizard::catalog::{Location, TierKind};
//! use gpu_wizard::providers::http::HttpProvisioningApi;
//! use gpu_wizard::wizard::{Action, WizardSession};
//! use gpu_wizard::WizardConfig;
//!
//! let api = Arc::new(HttpProvisioningApi::new(base_url, api_key)?);
//! let mut session = WizardSession::new(api, WizardConfig::from_env());
//!
//! session.dispatch(Action::SelectLocation(Location::region("europe").unwrap()));
//! session.dispatch(Action::SelectTier(TierKind::Standard));
//! session.dispatch(Action::Advance);
//! session.settle().await;
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod format;
pub mod gateway;
pub mod providers;
pub mod timer;
pub mod validation;
pub mod wizard;

pub use config::{Policy, WizardConfig};
pub use error::{FailureReason, WizardError};
pub use gateway::{Gateway, GatewayError, RetryConfig};
pub use providers::traits::{
    AttemptId, MachineOffer, ProviderError, ProvisionPhase, ProvisioningApi, ProvisioningConfig,
    ProvisioningStatus,
};
pub use wizard::{Action, Effect, Step, WizardPhase, WizardSession, WizardState};
