//! Scripted in-memory provisioning API for wizard flow tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gpu_wizard::catalog::{Location, TierKind};
use gpu_wizard::providers::{
    AttemptId, MachineOffer, OfferQuery, ProviderError, ProvisionPhase, ProvisioningApi,
    ProvisioningConfig, ProvisioningStatus,
};
use gpu_wizard::wizard::{Action, WizardSession};
use gpu_wizard::{Policy, RetryConfig, WizardConfig};

/// Answers every call from fixed data and counts calls.
pub struct ScriptedApi {
    pub offers: Mutex<Vec<MachineOffer>>,
    pub balance: Mutex<f64>,
    /// Returned one per poll; the last one repeats. Empty means pending forever.
    pub statuses: Mutex<VecDeque<ProvisioningStatus>>,
    /// Offer fetches that fail with a 503 before one succeeds.
    pub offer_failures: AtomicUsize,
    /// HTTP status the start request fails with.
    pub start_error: Mutex<Option<u16>>,
    /// The start request never answers.
    pub start_hangs: AtomicBool,
    /// HTTP status every poll fails with.
    pub poll_error: Mutex<Option<u16>>,
    pub offer_calls: AtomicUsize,
    pub balance_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub cancelled: Mutex<Vec<AttemptId>>,
    pub queries: Mutex<Vec<OfferQuery>>,
}

impl ScriptedApi {
    pub fn new(offers: Vec<MachineOffer>, balance: f64) -> Self {
        Self {
            offers: Mutex::new(offers),
            balance: Mutex::new(balance),
            statuses: Mutex::new(VecDeque::new()),
            offer_failures: AtomicUsize::new(0),
            start_error: Mutex::new(None),
            start_hangs: AtomicBool::new(false),
            poll_error: Mutex::new(None),
            offer_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            cancelled: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_statuses(self, statuses: Vec<ProvisioningStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn cancelled(&self) -> Vec<AttemptId> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProvisioningApi for ScriptedApi {
    async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<MachineOffer>, ProviderError> {
        self.offer_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        if self
            .offer_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::Api {
                status: 503,
                message: "busy".to_string(),
            });
        }
        Ok(self.offers.lock().unwrap().clone())
    }

    async fn fetch_balance(&self) -> Result<f64, ProviderError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.balance.lock().unwrap())
    }

    async fn start_provisioning(
        &self,
        _config: &ProvisioningConfig,
    ) -> Result<AttemptId, ProviderError> {
        let n = self.start_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.start_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(status) = *self.start_error.lock().unwrap() {
            return Err(ProviderError::Api {
                status,
                message: "rejected".to_string(),
            });
        }
        Ok(AttemptId(format!("a-{n}")))
    }

    async fn poll_status(&self, _attempt: &AttemptId) -> Result<ProvisioningStatus, ProviderError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.poll_error.lock().unwrap() {
            return Err(ProviderError::Api {
                status,
                message: "poll failed".to_string(),
            });
        }
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or_else(ProvisioningStatus::pending))
    }

    async fn cancel_provisioning(&self, attempt: &AttemptId) -> Result<(), ProviderError> {
        self.cancelled.lock().unwrap().push(attempt.clone());
        Ok(())
    }
}

pub fn offer(id: &str, gpus: u32, price: f64) -> MachineOffer {
    MachineOffer {
        id: id.to_string(),
        gpu_model: "RTX 4090".to_string(),
        gpu_count: gpus,
        gpu_ram_gb: 24,
        compute_score: 82.0,
        region: "US".to_string(),
        price_per_hour: price,
        available: true,
    }
}

pub fn status(phase: ProvisionPhase, progress: Option<f64>) -> ProvisioningStatus {
    ProvisioningStatus {
        phase,
        progress_percent: progress,
        message: None,
    }
}

/// Fast intervals and a short timeout.
pub fn test_config() -> WizardConfig {
    WizardConfig {
        policy: Policy {
            provisioning_timeout_secs: 30,
            ..Policy::default()
        },
        poll_interval: Duration::from_secs(5),
        tick_interval: Duration::from_secs(1),
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        },
    }
}

/// Walk a session from step 1 to step 4 with US / standard.
pub async fn walk_to_provision(session: &mut WizardSession) {
    session.dispatch(Action::SelectLocation(Location::country("US").unwrap()));
    session.dispatch(Action::SelectTier(TierKind::Standard));
    for _ in 0..3 {
        session.dispatch(Action::Advance);
        session.settle().await;
    }
}
