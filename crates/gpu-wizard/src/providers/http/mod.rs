//! REST/JSON transport for the provisioning API.
//!
//! Implements [`ProvisioningApi`](crate::providers::ProvisioningApi) against
//! the versioned `/api/v0` endpoints.
//!
//! ## Example
//!
//! ```ignore
//! use gpu_wizard::providers::http::HttpProvisioningApi;
//! use gpu_wizard::providers::ProvisioningApi;
//!
//! let api = HttpProvisioningApi::new("https://console.example.com", api_key)?;
//! let balance = api.fetch_balance().await?;
//! ```

mod client;
mod models;

pub use client::HttpProvisioningApi;
pub use models::*;
