//! HTTP client for the provisioning API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::models::{
    BalanceResponse, CreateInstanceBody, CreateInstanceResponse, InstanceStatusResponse,
    OfferRecord, OffersResponse,
};
use crate::providers::traits::{
    AttemptId, MachineOffer, OfferQuery, ProviderError, ProvisionPhase, ProvisioningApi,
    ProvisioningConfig, ProvisioningStatus,
};

/// Version prefix of every endpoint.
const API_PREFIX: &str = "/api/v0";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Provisioning API over REST/JSON.
#[derive(Clone)]
pub struct HttpProvisioningApi {
    /// HTTP client.
    client: Client,
    /// Scheme and host, without trailing slash.
    base_url: String,
    /// API key for authentication.
    api_key: String,
}

impl HttpProvisioningApi {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns error if the base URL is empty or the HTTP client cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ProviderError::Config("API base URL is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.url(path);
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated POST request.
    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ProviderError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let url = self.url(path);
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated DELETE request.
    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        let url = self.url(path);
        debug!(url = %url, "DELETE request");

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    /// Handle API response, parsing JSON or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                ProviderError::Serialization(e)
            })
        } else if status == StatusCode::NOT_FOUND {
            Err(ProviderError::NotFound(text))
        } else {
            Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    /// Convert an API offer record to our `MachineOffer` type.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_offer(record: &OfferRecord) -> MachineOffer {
        MachineOffer {
            id: record.id.to_string(),
            gpu_model: record
                .gpu_name
                .clone()
                .unwrap_or_else(|| "Unknown GPU".to_string()),
            gpu_count: record.num_gpus.unwrap_or(1).max(1),
            // API reports fractional GB
            gpu_ram_gb: record.gpu_ram.unwrap_or(0.0).max(0.0).floor() as u32,
            compute_score: record.compute_score.unwrap_or(0.0),
            region: record.region.clone().unwrap_or_default(),
            price_per_hour: record.dph_total.unwrap_or(0.0),
            // An offer without a price cannot be rented.
            available: record.rentable.unwrap_or(false) && record.dph_total.is_some(),
        }
    }

    /// Convert an instance status response to our `ProvisioningStatus` type.
    fn to_status(response: InstanceStatusResponse) -> ProvisioningStatus {
        let phase = match response
            .status
            .as_deref()
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("connecting" | "booting" | "starting") => ProvisionPhase::Connecting,
            Some("running" | "ready") => ProvisionPhase::Ready,
            Some("failed" | "error" | "exited" | "offline") => ProvisionPhase::Failed,
            _ => ProvisionPhase::Pending,
        };

        ProvisioningStatus {
            phase,
            progress_percent: response.progress.map(|p| p.clamp(0.0, 100.0)),
            message: response.status_msg,
        }
    }
}

#[async_trait]
impl ProvisioningApi for HttpProvisioningApi {
    async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<MachineOffer>, ProviderError> {
        let filter = query.filter();
        let params = [
            ("regions", query.region_codes.join(",")),
            ("min_vram", filter.min_vram_gb.to_string()),
            ("min_compute", filter.min_compute_score.to_string()),
            ("max_price", filter.max_price_per_hour.to_string()),
        ];

        let response: OffersResponse = self.get("/offers", &params).await?;
        let offers: Vec<MachineOffer> = response.offers.iter().map(Self::to_offer).collect();

        debug!(count = offers.len(), tier = %query.tier, "Fetched offers");
        Ok(offers)
    }

    async fn fetch_balance(&self) -> Result<f64, ProviderError> {
        let response: BalanceResponse = self.get("/balance", &[]).await?;
        Ok(response.credit)
    }

    async fn start_provisioning(
        &self,
        config: &ProvisioningConfig,
    ) -> Result<AttemptId, ProviderError> {
        info!(
            offer_id = %config.offer.id,
            strategy = %config.strategy,
            "Submitting provisioning request"
        );

        let body = CreateInstanceBody {
            offer_id: config.offer.id.clone(),
            regions: config.region_codes.clone(),
            tier: config.tier.to_string(),
            strategy: config.strategy.to_string(),
            ports: config.ports.clone(),
        };

        let response: CreateInstanceResponse = self.post("/instances", &body).await?;
        let attempt = AttemptId(response.attempt_id);

        info!(attempt_id = %attempt, "Provisioning request accepted");
        Ok(attempt)
    }

    async fn poll_status(&self, attempt: &AttemptId) -> Result<ProvisioningStatus, ProviderError> {
        let response: InstanceStatusResponse =
            self.get(&format!("/instances/{attempt}"), &[]).await?;
        Ok(Self::to_status(response))
    }

    async fn cancel_provisioning(&self, attempt: &AttemptId) -> Result<(), ProviderError> {
        info!(attempt_id = %attempt, "Cancelling provisioning attempt");
        self.delete(&format!("/instances/{attempt}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::http::OfferIdValue;

    #[test]
    fn test_status_mapping() {
        let status = HttpProvisioningApi::to_status(InstanceStatusResponse {
            status: Some("Booting".to_string()),
            progress: Some(140.0),
            status_msg: None,
        });
        assert_eq!(status.phase, ProvisionPhase::Connecting);
        assert_eq!(status.progress_percent, Some(100.0));

        let status = HttpProvisioningApi::to_status(InstanceStatusResponse {
            status: Some("something_new".to_string()),
            progress: None,
            status_msg: None,
        });
        assert_eq!(status.phase, ProvisionPhase::Pending);
    }

    #[test]
    fn test_offer_without_price_is_unavailable() {
        let offer = HttpProvisioningApi::to_offer(&OfferRecord {
            id: OfferIdValue::Number(42),
            gpu_name: Some("RTX 4090".to_string()),
            num_gpus: None,
            gpu_ram: Some(23.9),
            compute_score: Some(82.0),
            dph_total: None,
            region: Some("US".to_string()),
            rentable: Some(true),
        });
        assert_eq!(offer.id, "42");
        assert_eq!(offer.gpu_count, 1);
        assert_eq!(offer.gpu_ram_gb, 23);
        assert!(!offer.available);
    }

    #[test]
    fn test_empty_base_url_is_rejected() {
        assert!(matches!(
            HttpProvisioningApi::new("  ".trim(), "key"),
            Err(ProviderError::Config(_))
        ));
    }
}
