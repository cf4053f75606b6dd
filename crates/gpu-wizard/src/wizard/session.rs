//! Effect runner: owns the state, feeds actions through [`reduce`] and runs
//! the effects it returns.
//!
//! Async work is spawned on the current tokio runtime. Results come back as
//! actions on an internal channel and are applied one at a time by
//! [`WizardSession::next_event`], so the state only ever changes inside
//! [`WizardSession::dispatch`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WizardConfig;
use crate::gateway::{Gateway, GatewayError};
use crate::providers::{AttemptId, ProvisioningApi, ProvisioningStatus};
use crate::timer::ProvisioningTimer;

use super::action::{Action, Effect};
use super::reducer::reduce;
use super::state::{Balance, RequestId, WizardState};

/// A running wizard flow.
///
/// Dropping the session cancels every outstanding call and timer.
pub struct WizardSession {
    state: WizardState,
    gateway: Gateway,
    poll_interval: Duration,
    tick_interval: Duration,
    /// Parent of every per-purpose token below.
    token: CancellationToken,
    offers_token: Option<CancellationToken>,
    balance_token: Option<CancellationToken>,
    attempt_token: Option<CancellationToken>,
    /// Feeds the running attempt timer until the poller takes it over.
    attempt_status: Option<watch::Sender<ProvisioningStatus>>,
    tx: mpsc::UnboundedSender<Action>,
    rx: mpsc::UnboundedReceiver<Action>,
}

impl WizardSession {
    /// New session in the initial state.
    #[must_use]
    pub fn new(api: Arc<dyn ProvisioningApi>, config: WizardConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: WizardState::new(config.policy),
            gateway: Gateway::new(api, config.retry),
            poll_interval: config.poll_interval,
            tick_interval: config.tick_interval,
            token: CancellationToken::new(),
            offers_token: None,
            balance_token: None,
            attempt_token: None,
            attempt_status: None,
            tx,
            rx,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &WizardState {
        &self.state
    }

    /// Sender for actions produced outside the session (UI, signal handlers).
    /// They are applied by [`Self::next_event`].
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<Action> {
        self.tx.clone()
    }

    /// Apply an action now and start its effects.
    pub fn dispatch(&mut self, action: Action) -> &WizardState {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = reduce(state, action);
        self.state = state;
        for effect in effects {
            self.run(effect);
        }
        &self.state
    }

    /// Wait for the next queued action and apply it.
    ///
    /// Waits forever when nothing is outstanding and no external sender is
    /// producing actions.
    pub async fn next_event(&mut self) -> &WizardState {
        // `self.tx` keeps the channel open, so `recv` never yields `None`
        if let Some(action) = self.rx.recv().await {
            self.dispatch(action);
        }
        &self.state
    }

    /// Apply queued actions until `done` holds.
    pub async fn wait_until(&mut self, done: impl Fn(&WizardState) -> bool) -> &WizardState {
        while !done(&self.state) {
            self.next_event().await;
        }
        &self.state
    }

    /// Apply queued actions until no offers, balance or start request is
    /// outstanding. Monitoring of an accepted attempt keeps running.
    pub async fn settle(&mut self) -> &WizardState {
        self.wait_until(|state| !has_pending_requests(state)).await
    }

    /// Apply queued actions until the in-flight attempt (if any) has ended.
    pub async fn run_until_finished(&mut self) -> &WizardState {
        self.wait_until(|state| state.attempt.is_none()).await
    }

    fn run(&mut self, effect: Effect) {
        debug!(?effect, "Running effect");
        match effect {
            Effect::FetchOffers { request, query } => {
                let token = replace_token(&self.token, &mut self.offers_token);
                let gateway = self.gateway.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = gateway.fetch_offers(&query, &token).await;
                    let _ = tx.send(Action::OffersLoaded { request, result });
                });
            }
            Effect::FetchBalance { request } => {
                let token = replace_token(&self.token, &mut self.balance_token);
                let gateway = self.gateway.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = gateway.fetch_balance(&token).await;
                    let _ = tx.send(Action::BalanceLoaded { request, result });
                });
            }
            Effect::StartProvisioning {
                request,
                config,
                fallback_eta_secs,
            } => {
                let token = replace_token(&self.token, &mut self.attempt_token);
                // Timed from submission, not from acceptance
                let status_tx = self.start_timer(request, fallback_eta_secs, token.clone());
                self.attempt_status = Some(status_tx);
                let gateway = self.gateway.clone();
                let tx = self.tx.clone();
                info!(%request, offer_id = %config.offer.id, strategy = %config.strategy, "Starting provisioning");
                tokio::spawn(async move {
                    let result = gateway.start_provisioning(&config, &token).await;
                    let _ = tx.send(Action::ProvisioningStarted {
                        request,
                        result,
                        started_at: Utc::now(),
                    });
                });
            }
            Effect::MonitorAttempt {
                request,
                attempt_id,
            } => {
                let token = match &self.attempt_token {
                    Some(token) => token.clone(),
                    None => replace_token(&self.token, &mut self.attempt_token),
                };
                let status_tx = match self.attempt_status.take() {
                    Some(status_tx) => status_tx,
                    None => {
                        let fallback = self.state.selected_strategy().typical_setup_secs;
                        self.start_timer(request, fallback, token.clone())
                    }
                };
                self.monitor(request, attempt_id, status_tx, token);
            }
            Effect::StopMonitoring => {
                self.attempt_status = None;
                if let Some(token) = self.attempt_token.take() {
                    token.cancel();
                }
            }
            Effect::CancelReads => {
                for slot in [&mut self.offers_token, &mut self.balance_token] {
                    if let Some(token) = slot.take() {
                        token.cancel();
                    }
                }
            }
            Effect::CancelProvisioning { attempt_id } => {
                let gateway = self.gateway.clone();
                tokio::spawn(async move {
                    gateway.cancel_provisioning(&attempt_id).await;
                });
            }
            Effect::CancelAll => {
                self.token.cancel();
                self.token = CancellationToken::new();
                self.offers_token = None;
                self.balance_token = None;
                self.attempt_token = None;
                self.attempt_status = None;
            }
        }
    }

    /// Spawn the ETA timer for an attempt. The timer stops when `token`
    /// fires or when the returned sender is dropped.
    fn start_timer(
        &self,
        request: RequestId,
        fallback_eta_secs: u64,
        token: CancellationToken,
    ) -> watch::Sender<ProvisioningStatus> {
        let (status_tx, status_rx) = watch::channel(ProvisioningStatus::pending());
        let timer = ProvisioningTimer::start(self.tick_interval, fallback_eta_secs, token);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut ticks = Box::pin(timer.ticks(status_rx));
            while let Some(tick) = ticks.next().await {
                if tx.send(Action::ProvisioningTick { request, tick }).is_err() {
                    break;
                }
            }
        });
        status_tx
    }

    /// Spawn the status poller for an accepted attempt.
    ///
    /// The poller publishes every status on the timer's watch channel; when
    /// the poller ends, the timer emits its final tick and stops.
    fn monitor(
        &self,
        request: RequestId,
        attempt_id: AttemptId,
        status_tx: watch::Sender<ProvisioningStatus>,
        token: CancellationToken,
    ) {
        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        let poll_interval = self.poll_interval;
        tokio::spawn(async move {
            info!(%request, %attempt_id, "Monitoring provisioning attempt");
            loop {
                match gateway.poll_status(&attempt_id, &token).await {
                    Ok(status) if status.is_terminal() => {
                        info!(%attempt_id, phase = %status.phase, "Provisioning attempt finished");
                        status_tx.send_replace(status.clone());
                        let _ = tx.send(Action::ProvisioningTerminal { request, status });
                        break;
                    }
                    Ok(status) => {
                        debug!(%attempt_id, phase = %status.phase, progress = ?status.progress_percent, "Provisioning status");
                        status_tx.send_replace(status.clone());
                        if tx.send(Action::ProvisioningStatus { request, status }).is_err() {
                            break;
                        }
                    }
                    Err(GatewayError::Cancelled) => break,
                    Err(error) => {
                        warn!(%attempt_id, error = %error, "Status polling failed");
                        let _ = tx.send(Action::PollFailed { request, error });
                        break;
                    }
                }

                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(poll_interval) => {}
                }
            }
        });
    }
}

impl Drop for WizardSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Cancel the token in `slot` and install a fresh child of `parent`.
fn replace_token(
    parent: &CancellationToken,
    slot: &mut Option<CancellationToken>,
) -> CancellationToken {
    if let Some(old) = slot.take() {
        old.cancel();
    }
    let token = parent.child_token();
    *slot = Some(token.clone());
    token
}

fn has_pending_requests(state: &WizardState) -> bool {
    state.offers.pending_request().is_some()
        || matches!(state.balance, Balance::Loading { .. })
        || state
            .attempt
            .as_ref()
            .is_some_and(|attempt| attempt.attempt_id.is_none())
}
