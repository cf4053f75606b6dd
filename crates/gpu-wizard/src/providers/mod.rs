//! Provisioning API capability and transports.
//!
//! This module contains the [`ProvisioningApi`] trait the wizard is driven
//! through, and an HTTP implementation of it.

pub mod http;
pub mod traits;

pub use traits::{
    AttemptId, MachineOffer, OfferQuery, ProviderError, ProvisionPhase, ProvisioningApi,
    ProvisioningConfig, ProvisioningStatus,
};
