//! The wizard transition function.
//!
//! [`reduce`] is pure: given a state and an action it returns the next state
//! plus the effects to run. It never performs I/O and never reads the clock;
//! time arrives as [`Action::ProvisioningTick`] and API results arrive as the
//! `*Loaded` / `Provisioning*` actions, each tagged with the [`RequestId`] it
//! answers. Results for requests the state no longer waits for are dropped.

use tracing::debug;

use crate::catalog::{locations_to_region_codes, Location};
use crate::error::{FailureReason, RequestKind, WizardError};
use crate::gateway::GatewayError;
use crate::providers::{MachineOffer, ProvisionPhase, ProvisioningStatus};
use crate::validation::{step_issues, validate_before_provisioning};

use super::action::{Action, Effect};
use super::state::{
    Balance, OffersCache, Outcome, ProvisioningAttempt, RequestId, Step, WizardState,
};

/// Apply `action` to `state`.
#[must_use]
pub fn reduce(mut state: WizardState, action: Action) -> (WizardState, Vec<Effect>) {
    let mut effects = Vec::new();

    match action {
        Action::SelectLocation(location) => {
            if !selections_locked(&mut state) {
                select_location(&mut state, &mut effects, location);
            }
        }
        Action::DeselectLocation(key) => {
            if !selections_locked(&mut state) {
                let before = state.locations.len();
                state.locations.retain(|l| l.key() != key);
                state.error = None;
                if state.locations.len() != before {
                    locations_changed(&mut state, &mut effects);
                }
            }
        }
        Action::SelectTier(tier) => {
            if !selections_locked(&mut state) {
                state.error = None;
                if state.tier != Some(tier) {
                    state.tier = Some(tier);
                    state.chosen_offer = None;
                    state.outcome = None;
                    if state.step >= Step::Hardware {
                        request_offers(&mut state, &mut effects);
                    }
                }
            }
        }
        Action::SelectOffer(id) => {
            if !selections_locked(&mut state) {
                let offer = state
                    .current_offers()
                    .and_then(|offers| offers.iter().find(|o| o.id == id && o.available))
                    .cloned();
                match offer {
                    Some(offer) if state.tier.is_some_and(|t| t.tier().matches(&offer)) => {
                        state.chosen_offer = Some(offer);
                        state.outcome = None;
                        state.error = None;
                    }
                    _ => state.error = Some(WizardError::UnknownOffer(id)),
                }
            }
        }
        Action::SelectStrategy(strategy) => {
            if !selections_locked(&mut state) {
                state.strategy = strategy;
                state.outcome = None;
                state.error = None;
                if state.step >= Step::Strategy {
                    request_balance(&mut state, &mut effects);
                }
            }
        }
        Action::SetPorts(ports) => {
            if !selections_locked(&mut state) {
                match normalize_ports(ports) {
                    Ok(ports) => {
                        state.ports = ports;
                        state.error = None;
                    }
                    Err(message) => state.error = Some(WizardError::InvalidPorts(message)),
                }
            }
        }
        Action::Advance => {
            if !selections_locked(&mut state) {
                let issues = step_issues(&state, state.step);
                if !issues.is_empty() {
                    state.error = Some(WizardError::StepIncomplete {
                        step: state.step,
                        issues,
                    });
                } else if let Some(next) = state.step.next() {
                    enter_step(&mut state, &mut effects, next);
                }
            }
        }
        Action::Retreat => {
            if !selections_locked(&mut state) {
                if let Some(previous) = state.step.previous() {
                    enter_step(&mut state, &mut effects, previous);
                }
            }
        }
        Action::StartProvisioning => start_provisioning(&mut state, &mut effects),
        Action::Cancel => {
            if state.attempt.is_some() {
                fail_attempt(
                    &mut state,
                    &mut effects,
                    FailureReason::Cancelled,
                    "cancelled by user".to_string(),
                    true,
                );
            } else {
                abandon_reads(&mut state, &mut effects);
            }
        }
        Action::Reset => {
            if let Some(attempt_id) = state.attempt.as_ref().and_then(|a| a.attempt_id.clone()) {
                effects.push(Effect::CancelProvisioning { attempt_id });
            }
            effects.push(Effect::CancelAll);
            state = state.reset();
        }

        Action::OffersLoaded { request, result } => offers_loaded(&mut state, request, result),
        Action::BalanceLoaded { request, result } => {
            if state.balance != (Balance::Loading { request }) {
                debug!(%request, "Dropping stale balance result");
            } else {
                match result {
                    Ok(balance) => state.balance = Balance::Known(balance),
                    Err(GatewayError::Cancelled) => state.balance = Balance::Unknown,
                    Err(e) => {
                        state.balance = Balance::Unknown;
                        state.error = Some(WizardError::from_gateway(RequestKind::Balance, &e));
                    }
                }
            }
        }
        Action::ProvisioningStarted {
            request,
            result,
            started_at,
        } => {
            let waiting = state
                .attempt
                .as_ref()
                .is_some_and(|a| a.request == request && a.attempt_id.is_none());
            match result {
                Ok(attempt_id) if !waiting => {
                    // Nobody is waiting for this machine any more
                    debug!(%request, %attempt_id, "Releasing stale provisioning attempt");
                    effects.push(Effect::CancelProvisioning { attempt_id });
                }
                Err(_) if !waiting => debug!(%request, "Dropping stale start result"),
                Ok(attempt_id) => {
                    if let Some(attempt) = state.attempt.as_mut() {
                        attempt.attempt_id = Some(attempt_id.clone());
                        attempt.started_at = Some(started_at);
                    }
                    effects.push(Effect::MonitorAttempt {
                        request,
                        attempt_id,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    fail_attempt(&mut state, &mut effects, e.reason(), message, false);
                    if let GatewayError::Auth(message) = e {
                        state.error = Some(WizardError::Unauthenticated(message));
                    }
                }
            }
        }
        Action::ProvisioningTick { request, tick } => {
            let timeout = state.policy.provisioning_timeout_secs;
            let timed_out = match current_attempt(&mut state, request) {
                Some(attempt) => {
                    attempt.elapsed_secs = tick.elapsed_secs;
                    attempt.estimated_remaining_secs = tick.estimated_remaining_secs;
                    tick.elapsed_secs >= timeout
                }
                None => false,
            };
            if timed_out {
                let message = format!("not ready after {timeout} seconds");
                fail_attempt(&mut state, &mut effects, FailureReason::Timeout, message, true);
            }
        }
        Action::ProvisioningStatus { request, status } => {
            if status.is_terminal() {
                attempt_finished(&mut state, &mut effects, request, status);
            } else if let Some(attempt) = current_attempt(&mut state, request) {
                if attempt.status.phase.allows(status.phase) {
                    attempt.status.phase = status.phase;
                }
                attempt.status.progress_percent = status.progress_percent;
                attempt.status.message = status.message;
            }
        }
        Action::ProvisioningTerminal { request, status } => {
            attempt_finished(&mut state, &mut effects, request, status);
        }
        Action::PollFailed { request, error } => {
            if current_attempt(&mut state, request).is_some()
                && error != GatewayError::Cancelled
            {
                let message = error.to_string();
                fail_attempt(&mut state, &mut effects, error.reason(), message, true);
            }
        }
    }

    (state, effects)
}

/// Reject selection changes while an attempt runs and after a machine was
/// provisioned.
fn selections_locked(state: &mut WizardState) -> bool {
    if state.attempt.is_some() {
        state.error = Some(WizardError::AttemptInFlight);
        true
    } else if provisioned(state) {
        state.error = Some(WizardError::AlreadyProvisioned);
        true
    } else {
        false
    }
}

fn provisioned(state: &WizardState) -> bool {
    matches!(state.outcome, Some(Outcome::Succeeded { .. }))
}

/// Drop pending offer and balance fetches. Their results will be stale.
fn abandon_reads(state: &mut WizardState, effects: &mut Vec<Effect>) {
    let offers_pending = state.offers.pending_request().is_some();
    let balance_pending = matches!(state.balance, Balance::Loading { .. });
    if offers_pending {
        state.offers = OffersCache::Empty;
    }
    if balance_pending {
        state.balance = Balance::Unknown;
    }
    if offers_pending || balance_pending {
        debug!("Abandoning pending reads");
        effects.push(Effect::CancelReads);
    }
}

fn select_location(state: &mut WizardState, effects: &mut Vec<Effect>, location: Location) {
    if locations_to_region_codes(std::slice::from_ref(&location)).is_empty() {
        state.error = Some(WizardError::UnknownLocation(location.key()));
        return;
    }
    state.error = None;
    let key = location.key();
    if state.locations.iter().any(|l| l.key() == key) {
        return;
    }
    state.locations.push(location);
    locations_changed(state, effects);
}

/// A different location set means a different offer query: drop the
/// chosen offer and the cache.
fn locations_changed(state: &mut WizardState, effects: &mut Vec<Effect>) {
    state.chosen_offer = None;
    state.offers = OffersCache::Empty;
    state.outcome = None;
    if state.step == Step::Hardware {
        request_offers(state, effects);
    }
}

fn enter_step(state: &mut WizardState, effects: &mut Vec<Effect>, step: Step) {
    state.step = step;
    state.furthest_step = state.furthest_step.max(step);
    state.outcome = None;
    state.error = None;
    match step {
        Step::Hardware => request_offers(state, effects),
        Step::Strategy | Step::Provision => request_balance(state, effects),
        Step::Location => {}
    }
}

fn request_offers(state: &mut WizardState, effects: &mut Vec<Effect>) {
    let Some(query) = state.offer_query() else {
        return;
    };
    if state.offers.offers_for(&query).is_some() || state.offers.is_loading_for(&query) {
        return;
    }
    let request = state.next_request_id();
    state.offers = OffersCache::Loading {
        request,
        query: query.clone(),
    };
    effects.push(Effect::FetchOffers { request, query });
}

fn request_balance(state: &mut WizardState, effects: &mut Vec<Effect>) {
    if state.balance != Balance::Unknown {
        return;
    }
    let request = state.next_request_id();
    state.balance = Balance::Loading { request };
    effects.push(Effect::FetchBalance { request });
}

fn offers_loaded(
    state: &mut WizardState,
    request: RequestId,
    result: Result<Vec<MachineOffer>, GatewayError>,
) {
    let query = match &state.offers {
        OffersCache::Loading { request: r, query } if *r == request => query.clone(),
        _ => {
            debug!(%request, "Dropping stale offers result");
            return;
        }
    };

    match result {
        Ok(offers) => {
            state.offers = OffersCache::Loaded { query, offers };
            let still_offered = state.chosen_offer.as_ref().is_some_and(|chosen| {
                state
                    .recommendations()
                    .iter()
                    .any(|r| r.offer.id == chosen.id)
            });
            if !still_offered {
                state.chosen_offer = state.recommendations().into_iter().next().map(|r| r.offer);
            }
            let issues = step_issues(state, Step::Hardware);
            if !issues.is_empty() {
                state.error = Some(WizardError::StepIncomplete {
                    step: Step::Hardware,
                    issues,
                });
            }
        }
        Err(GatewayError::Cancelled) => state.offers = OffersCache::Empty,
        Err(e) => {
            state.offers = OffersCache::Failed { query };
            state.error = Some(WizardError::from_gateway(RequestKind::Offers, &e));
        }
    }
}

fn start_provisioning(state: &mut WizardState, effects: &mut Vec<Effect>) {
    if state.attempt.is_some() {
        debug!("Provisioning already in flight, ignoring start");
        return;
    }
    if provisioned(state) {
        state.error = Some(WizardError::AlreadyProvisioned);
        return;
    }

    let report = validate_before_provisioning(state);
    let config = match state.provisioning_config() {
        Some(config) if report.passed() => config,
        _ => {
            state.error = Some(WizardError::NotReady {
                issues: report.issues,
            });
            return;
        }
    };

    let request = state.next_request_id();
    let fallback_eta_secs = state.selected_strategy().typical_setup_secs;
    state.step = Step::Provision;
    state.furthest_step = Step::Provision;
    state.chosen_offer = Some(config.offer.clone());
    state.outcome = None;
    state.error = None;
    state.attempt = Some(ProvisioningAttempt {
        request,
        attempt_id: None,
        config: config.clone(),
        status: ProvisioningStatus::pending(),
        elapsed_secs: 0,
        estimated_remaining_secs: Some(fallback_eta_secs),
        started_at: None,
    });
    effects.push(Effect::StartProvisioning {
        request,
        config,
        fallback_eta_secs,
    });
}

/// The in-flight attempt, if `request` started it.
fn current_attempt(state: &mut WizardState, request: RequestId) -> Option<&mut ProvisioningAttempt> {
    match state.attempt.as_mut() {
        Some(attempt) if attempt.request == request => Some(attempt),
        _ => {
            debug!(%request, "Dropping provisioning update for another attempt");
            None
        }
    }
}

fn attempt_finished(
    state: &mut WizardState,
    effects: &mut Vec<Effect>,
    request: RequestId,
    status: ProvisioningStatus,
) {
    if current_attempt(state, request).is_none() {
        return;
    }
    match status.phase {
        ProvisionPhase::Ready => {
            let Some(attempt) = state.attempt.take() else {
                return;
            };
            effects.push(Effect::StopMonitoring);
            if let Some(attempt_id) = attempt.attempt_id {
                state.outcome = Some(Outcome::Succeeded {
                    attempt_id,
                    config: attempt.config,
                    elapsed_secs: attempt.elapsed_secs,
                });
            }
            state.error = None;
        }
        ProvisionPhase::Failed => {
            let message = status
                .message
                .unwrap_or_else(|| "provider reported failure".to_string());
            fail_attempt(state, effects, FailureReason::ProviderRejected, message, false);
        }
        ProvisionPhase::Pending | ProvisionPhase::Connecting => {}
    }
}

/// End the in-flight attempt with `reason`. `release` asks the provider to
/// tear down the machine when it is known. The attempt may have been billed,
/// so the balance is fetched again before the next start.
fn fail_attempt(
    state: &mut WizardState,
    effects: &mut Vec<Effect>,
    reason: FailureReason,
    message: String,
    release: bool,
) {
    let Some(attempt) = state.attempt.take() else {
        return;
    };
    effects.push(Effect::StopMonitoring);
    if release {
        if let Some(attempt_id) = attempt.attempt_id.clone() {
            effects.push(Effect::CancelProvisioning { attempt_id });
        }
    }
    state.outcome = Some(Outcome::Failed {
        reason,
        attempt_id: attempt.attempt_id,
        elapsed_secs: attempt.elapsed_secs,
    });
    state.balance = Balance::Unknown;
    request_balance(state, effects);
    state.error = Some(WizardError::Provisioning { reason, message });
}

/// Drop duplicates, keep order, reject empty lists and port 0.
fn normalize_ports(ports: Vec<u16>) -> Result<Vec<u16>, String> {
    if ports.is_empty() {
        return Err("at least one port is required".to_string());
    }
    let mut normalized = Vec::with_capacity(ports.len());
    for port in ports {
        if port == 0 {
            return Err("port 0 is not valid".to_string());
        }
        if !normalized.contains(&port) {
            normalized.push(port);
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StrategyKind, TierKind};
    use crate::providers::AttemptId;
    use crate::timer::TimerTick;
    use crate::validation::ValidationIssue;
    use crate::wizard::WizardPhase;
    use chrono::Utc;

    fn offer(id: &str, gpus: u32, price: f64) -> MachineOffer {
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

    fn apply(state: WizardState, actions: Vec<Action>) -> (WizardState, Vec<Effect>) {
        let mut all = Vec::new();
        let state = actions.into_iter().fold(state, |state, action| {
            let (next, effects) = reduce(state, action);
            all.extend(effects);
            next
        });
        (state, all)
    }

    fn fetch_request(effects: &[Effect]) -> RequestId {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::FetchOffers { request, .. } => Some(*request),
                _ => None,
            })
            .expect("offers fetch")
    }

    fn balance_request(effects: &[Effect]) -> RequestId {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::FetchBalance { request } => Some(*request),
                _ => None,
            })
            .expect("balance fetch")
    }

    /// On step 2 with offers loaded.
    fn on_hardware(offers: Vec<MachineOffer>) -> WizardState {
        let (state, effects) = apply(
            WizardState::initial(),
            vec![
                Action::SelectLocation(Location::country("US").unwrap()),
                Action::SelectTier(TierKind::Standard),
                Action::Advance,
            ],
        );
        let request = fetch_request(&effects);
        let (state, _) = reduce(
            state,
            Action::OffersLoaded {
                request,
                result: Ok(offers),
            },
        );
        state
    }

    /// On step 4 with everything valid.
    fn ready() -> WizardState {
        let state = on_hardware(vec![offer("1", 1, 0.40), offer("2", 2, 0.90)]);
        let (state, effects) = reduce(state, Action::Advance);
        let request = balance_request(&effects);
        let (state, _) = apply(
            state,
            vec![
                Action::BalanceLoaded {
                    request,
                    result: Ok(50.0),
                },
                Action::Advance,
            ],
        );
        assert_eq!(state.phase(), WizardPhase::ReadyToProvision);
        state
    }

    /// Provisioning accepted with attempt ID "a-1".
    fn provisioning() -> (WizardState, RequestId) {
        let (state, effects) = reduce(ready(), Action::StartProvisioning);
        let request = match effects.as_slice() {
            [Effect::StartProvisioning { request, .. }] => *request,
            other => panic!("unexpected effects {other:?}"),
        };
        let (state, effects) = reduce(
            state,
            Action::ProvisioningStarted {
                request,
                result: Ok(AttemptId::from("a-1")),
                started_at: Utc::now(),
            },
        );
        assert!(matches!(effects.as_slice(), [Effect::MonitorAttempt { .. }]));
        (state, request)
    }

    fn tick(elapsed_secs: u64) -> TimerTick {
        TimerTick {
            elapsed_secs,
            estimated_remaining_secs: Some(100),
            progress_percent: None,
            is_final: false,
        }
    }

    #[test]
    fn test_cannot_advance_without_location() {
        let (state, effects) = reduce(WizardState::initial(), Action::Advance);
        assert_eq!(state.step, Step::Location);
        assert!(effects.is_empty());
        assert_eq!(
            state.error,
            Some(WizardError::StepIncomplete {
                step: Step::Location,
                issues: vec![ValidationIssue::NoLocations],
            })
        );
    }

    #[test]
    fn test_entering_hardware_fetches_offers_once() {
        let (state, effects) = apply(
            WizardState::initial(),
            vec![
                Action::SelectLocation(Location::country("BR").unwrap()),
                Action::SelectLocation(Location::region("usa").unwrap()),
                Action::SelectTier(TierKind::Budget),
                Action::Advance,
            ],
        );
        assert_eq!(state.step, Step::Hardware);
        let fetches: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::FetchOffers { query, .. } => Some(query.region_codes.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(fetches, vec![vec!["SA".to_string(), "US".to_string()]]);

        // Going back and forth reuses the in-flight fetch
        let (_, effects) = apply(state, vec![Action::Retreat, Action::Advance]);
        assert!(!effects.iter().any(|e| matches!(e, Effect::FetchOffers { .. })));
    }

    #[test]
    fn test_offers_loaded_picks_top_recommendation() {
        let state = on_hardware(vec![offer("1", 1, 0.90), offer("2", 1, 0.40)]);
        assert_eq!(state.chosen_offer.as_ref().map(|o| o.id.as_str()), Some("2"));
        assert!(state.error.is_none());
    }

    #[test]
    fn test_empty_offers_block_step_two() {
        let state = on_hardware(vec![]);
        assert_eq!(state.error.as_ref().and_then(WizardError::reason), Some(FailureReason::NoOffers));

        let (state, effects) = reduce(state, Action::Advance);
        assert_eq!(state.step, Step::Hardware);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_location_change_clears_chosen_offer_and_refetches() {
        let state = on_hardware(vec![offer("1", 1, 0.40)]);
        assert!(state.chosen_offer.is_some());

        let (state, effects) = reduce(
            state,
            Action::SelectLocation(Location::country("DE").unwrap()),
        );
        assert!(state.chosen_offer.is_none());
        assert!(state.current_offers().is_none());
        let request = fetch_request(&effects);
        assert_eq!(state.offers.pending_request(), Some(request));
    }

    #[test]
    fn test_stale_offers_are_dropped() {
        let (state, effects) = apply(
            WizardState::initial(),
            vec![
                Action::SelectLocation(Location::country("US").unwrap()),
                Action::SelectTier(TierKind::Standard),
                Action::Advance,
            ],
        );
        let old = fetch_request(&effects);
        let (state, effects) = reduce(
            state,
            Action::SelectLocation(Location::country("JP").unwrap()),
        );
        let new = fetch_request(&effects);
        assert_ne!(old, new);

        let (state, _) = reduce(
            state,
            Action::OffersLoaded {
                request: old,
                result: Ok(vec![offer("stale", 1, 0.4)]),
            },
        );
        assert_eq!(state.offers.pending_request(), Some(new));
        assert!(state.chosen_offer.is_none());
    }

    #[test]
    fn test_unknown_location_is_rejected() {
        let bogus = Location::Country {
            code: "XX".to_string(),
            name: "Nowhere".to_string(),
        };
        let (state, effects) = reduce(WizardState::initial(), Action::SelectLocation(bogus));
        assert!(state.locations.is_empty());
        assert!(effects.is_empty());
        assert_eq!(state.error, Some(WizardError::UnknownLocation("XX".to_string())));
    }

    #[test]
    fn test_select_offer() {
        let state = on_hardware(vec![offer("1", 1, 0.40), offer("2", 1, 0.90)]);
        let (state, _) = reduce(state, Action::SelectOffer("2".to_string()));
        assert_eq!(state.chosen_offer.as_ref().map(|o| o.id.as_str()), Some("2"));

        let (state, _) = reduce(state, Action::SelectOffer("nope".to_string()));
        assert_eq!(state.chosen_offer.as_ref().map(|o| o.id.as_str()), Some("2"));
        assert_eq!(state.error, Some(WizardError::UnknownOffer("nope".to_string())));
    }

    #[test]
    fn test_set_ports() {
        let (state, _) = reduce(WizardState::initial(), Action::SetPorts(vec![22, 443, 22]));
        assert_eq!(state.ports, vec![22, 443]);

        let (state, _) = reduce(state, Action::SetPorts(vec![0]));
        assert_eq!(state.ports, vec![22, 443]);
        assert!(matches!(state.error, Some(WizardError::InvalidPorts(_))));
    }

    #[test]
    fn test_strategy_step_fetches_balance() {
        let state = on_hardware(vec![offer("1", 1, 0.40)]);
        let (state, effects) = reduce(state, Action::Advance);
        assert_eq!(state.step, Step::Strategy);
        let request = balance_request(&effects);

        // Recurring cost needs a known balance
        let (state, _) = reduce(state, Action::Advance);
        assert_eq!(state.step, Step::Strategy);

        let (state, _) = reduce(
            state,
            Action::BalanceLoaded {
                request,
                result: Ok(10.0),
            },
        );
        let (state, _) = reduce(state, Action::Advance);
        assert_eq!(state.step, Step::Provision);
    }

    #[test]
    fn test_warm_pool_needs_multi_gpu_offer() {
        let state = ready();
        let (state, _) = apply(
            state,
            vec![Action::Retreat, Action::SelectStrategy(StrategyKind::WarmPool), Action::Advance],
        );
        assert_eq!(state.step, Step::Strategy);

        let (state, _) = apply(
            state,
            vec![Action::Retreat, Action::SelectOffer("2".to_string()), Action::Advance, Action::Advance],
        );
        assert_eq!(state.step, Step::Provision);
    }

    #[test]
    fn test_start_without_balance_never_creates_attempt() {
        let mut state = ready();
        state.balance = Balance::Known(0.01);
        let (state, effects) = reduce(state, Action::StartProvisioning);
        assert!(effects.is_empty());
        assert!(state.attempt.is_none());
        assert_eq!(
            state.error.as_ref().and_then(WizardError::reason),
            Some(FailureReason::BalanceInsufficient)
        );
    }

    #[test]
    fn test_second_start_is_a_no_op() {
        let (state, effects) = reduce(ready(), Action::StartProvisioning);
        assert_eq!(effects.len(), 1);
        let attempt = state.attempt.clone();

        let (state, effects) = reduce(state, Action::StartProvisioning);
        assert!(effects.is_empty());
        assert_eq!(state.attempt, attempt);
        assert_eq!(state.phase(), WizardPhase::Provisioning);
    }

    #[test]
    fn test_selections_locked_while_provisioning() {
        let (state, _) = provisioning();
        let before = state.clone();

        for action in [
            Action::SelectLocation(Location::country("DE").unwrap()),
            Action::SelectTier(TierKind::HighEnd),
            Action::SelectOffer("2".to_string()),
            Action::Retreat,
        ] {
            let (next, effects) = reduce(state.clone(), action);
            assert!(effects.is_empty());
            assert_eq!(next.chosen_offer, before.chosen_offer);
            assert_eq!(next.locations, before.locations);
            assert_eq!(next.step, Step::Provision);
            assert_eq!(next.error, Some(WizardError::AttemptInFlight));
        }
    }

    #[test]
    fn test_success_path() {
        let (state, request) = provisioning();
        let (state, _) = apply(
            state,
            vec![
                Action::ProvisioningStatus {
                    request,
                    status: ProvisioningStatus {
                        phase: ProvisionPhase::Connecting,
                        progress_percent: Some(40.0),
                        message: None,
                    },
                },
                Action::ProvisioningTick {
                    request,
                    tick: tick(30),
                },
            ],
        );
        let attempt = state.attempt.as_ref().unwrap();
        assert_eq!(attempt.status.phase, ProvisionPhase::Connecting);
        assert_eq!(attempt.elapsed_secs, 30);

        let (state, effects) = reduce(
            state,
            Action::ProvisioningTerminal {
                request,
                status: ProvisioningStatus::with_phase(ProvisionPhase::Ready),
            },
        );
        assert_eq!(effects, vec![Effect::StopMonitoring]);
        assert_eq!(state.phase(), WizardPhase::Succeeded);
        assert!(matches!(
            state.outcome,
            Some(Outcome::Succeeded { elapsed_secs: 30, .. })
        ));
    }

    #[test]
    fn test_phase_never_regresses() {
        let (state, request) = provisioning();
        let connecting = ProvisioningStatus::with_phase(ProvisionPhase::Connecting);
        let (state, _) = apply(
            state,
            vec![
                Action::ProvisioningStatus {
                    request,
                    status: connecting,
                },
                Action::ProvisioningStatus {
                    request,
                    status: ProvisioningStatus::pending(),
                },
            ],
        );
        assert_eq!(
            state.attempt.as_ref().unwrap().status.phase,
            ProvisionPhase::Connecting
        );
    }

    #[test]
    fn test_timeout_fails_and_releases_machine() {
        let (state, request) = provisioning();
        let (state, effects) = reduce(
            state,
            Action::ProvisioningTick {
                request,
                tick: tick(600),
            },
        );
        assert!(matches!(
            effects.as_slice(),
            [
                Effect::StopMonitoring,
                Effect::CancelProvisioning { attempt_id },
                Effect::FetchBalance { .. },
            ] if *attempt_id == AttemptId::from("a-1")
        ));
        assert_eq!(state.phase(), WizardPhase::Failed);
        assert_eq!(
            state.error.as_ref().and_then(WizardError::reason),
            Some(FailureReason::Timeout)
        );
        assert!(matches!(state.balance, Balance::Loading { .. }));

        // Selections are editable again
        let (state, _) = reduce(state, Action::SelectOffer("2".to_string()));
        assert_eq!(state.chosen_offer.as_ref().map(|o| o.id.as_str()), Some("2"));
    }

    #[test]
    fn test_provider_failure_and_cancel() {
        let (state, request) = provisioning();
        let (failed, effects) = reduce(
            state.clone(),
            Action::ProvisioningTerminal {
                request,
                status: ProvisioningStatus::with_phase(ProvisionPhase::Failed),
            },
        );
        assert!(matches!(
            effects.as_slice(),
            [Effect::StopMonitoring, Effect::FetchBalance { .. }]
        ));
        assert_eq!(
            failed.error.as_ref().and_then(WizardError::reason),
            Some(FailureReason::ProviderRejected)
        );

        let (cancelled, effects) = reduce(state, Action::Cancel);
        assert_eq!(effects.len(), 3);
        assert!(matches!(
            cancelled.outcome,
            Some(Outcome::Failed {
                reason: FailureReason::Cancelled,
                ..
            })
        ));
    }

    #[test]
    fn test_start_errors() {
        let (state, effects) = reduce(ready(), Action::StartProvisioning);
        let Effect::StartProvisioning { request, .. } = effects[0].clone() else {
            panic!("expected start");
        };

        let (rejected, effects) = reduce(
            state.clone(),
            Action::ProvisioningStarted {
                request,
                result: Err(GatewayError::Validation("offer taken".to_string())),
                started_at: Utc::now(),
            },
        );
        assert!(matches!(
            effects.as_slice(),
            [Effect::StopMonitoring, Effect::FetchBalance { .. }]
        ));
        assert_eq!(rejected.phase(), WizardPhase::Failed);

        let (flaky, _) = reduce(
            state.clone(),
            Action::ProvisioningStarted {
                request,
                result: Err(GatewayError::Transient {
                    attempts: 1,
                    message: "reset".to_string(),
                }),
                started_at: Utc::now(),
            },
        );
        assert_eq!(
            flaky.error.as_ref().and_then(WizardError::reason),
            Some(FailureReason::TransientExhausted)
        );

        let (unauth, _) = reduce(
            state,
            Action::ProvisioningStarted {
                request,
                result: Err(GatewayError::Auth("expired".to_string())),
                started_at: Utc::now(),
            },
        );
        assert_eq!(
            unauth.error,
            Some(WizardError::Unauthenticated("expired".to_string()))
        );
    }

    #[test]
    fn test_poll_failure_ends_attempt() {
        let (state, request) = provisioning();
        let (exhausted, effects) = reduce(
            state.clone(),
            Action::PollFailed {
                request,
                error: GatewayError::Transient {
                    attempts: 3,
                    message: "503".to_string(),
                },
            },
        );
        assert!(matches!(
            effects.as_slice(),
            [
                Effect::StopMonitoring,
                Effect::CancelProvisioning { .. },
                Effect::FetchBalance { .. },
            ]
        ));
        assert!(matches!(
            exhausted.outcome,
            Some(Outcome::Failed {
                reason: FailureReason::TransientExhausted,
                ..
            })
        ));

        let (gone, _) = reduce(
            state.clone(),
            Action::PollFailed {
                request,
                error: GatewayError::Validation("not found".to_string()),
            },
        );
        assert_eq!(
            gone.error.as_ref().and_then(WizardError::reason),
            Some(FailureReason::ProviderRejected)
        );

        // A cancelled poll is not a failure
        let (still_running, effects) = reduce(
            state,
            Action::PollFailed {
                request,
                error: GatewayError::Cancelled,
            },
        );
        assert!(effects.is_empty());
        assert_eq!(still_running.phase(), WizardPhase::Provisioning);
    }

    #[test]
    fn test_success_is_final_until_reset() {
        let (state, request) = provisioning();
        let (state, _) = reduce(
            state,
            Action::ProvisioningTerminal {
                request,
                status: ProvisioningStatus::with_phase(ProvisionPhase::Ready),
            },
        );
        assert_eq!(state.phase(), WizardPhase::Succeeded);

        let (state, effects) = reduce(state, Action::StartProvisioning);
        assert!(effects.is_empty());
        assert!(state.attempt.is_none());
        assert_eq!(state.error, Some(WizardError::AlreadyProvisioned));

        let (state, effects) = reduce(state, Action::SelectTier(TierKind::HighEnd));
        assert!(effects.is_empty());
        assert_eq!(state.tier, Some(TierKind::Standard));
        assert_eq!(state.phase(), WizardPhase::Succeeded);

        let (state, _) = reduce(state, Action::Reset);
        assert_eq!(state.phase(), WizardPhase::Idle);
    }

    #[test]
    fn test_cancel_without_attempt_abandons_reads() {
        let (state, effects) = apply(
            WizardState::initial(),
            vec![
                Action::SelectLocation(Location::country("US").unwrap()),
                Action::SelectTier(TierKind::Standard),
                Action::Advance,
            ],
        );
        let request = fetch_request(&effects);

        let (state, effects) = reduce(state, Action::Cancel);
        assert_eq!(effects, vec![Effect::CancelReads]);
        assert!(state.offers.pending_request().is_none());
        assert!(state.outcome.is_none());

        let (state, _) = reduce(
            state,
            Action::OffersLoaded {
                request,
                result: Ok(vec![offer("late", 1, 0.40)]),
            },
        );
        assert!(state.chosen_offer.is_none());

        // Nothing pending, nothing to cancel
        let (_, effects) = reduce(state, Action::Cancel);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_start_carries_fallback_eta() {
        let (state, effects) = reduce(ready(), Action::StartProvisioning);
        let fallback = state.selected_strategy().typical_setup_secs;
        assert!(matches!(
            effects.as_slice(),
            [Effect::StartProvisioning { fallback_eta_secs, .. }] if *fallback_eta_secs == fallback
        ));
        assert_eq!(
            state.attempt.as_ref().unwrap().estimated_remaining_secs,
            Some(fallback)
        );
    }

    #[test]
    fn test_reset_cancels_everything() {
        let (state, request) = provisioning();
        let (state, effects) = reduce(state, Action::Reset);
        assert_eq!(
            effects,
            vec![
                Effect::CancelProvisioning {
                    attempt_id: AttemptId::from("a-1")
                },
                Effect::CancelAll,
            ]
        );
        assert_eq!(state.phase(), WizardPhase::Idle);

        // A late start result for the abandoned attempt is released
        let (state, effects) = reduce(
            state,
            Action::ProvisioningStarted {
                request,
                result: Ok(AttemptId::from("a-2")),
                started_at: Utc::now(),
            },
        );
        assert_eq!(
            effects,
            vec![Effect::CancelProvisioning {
                attempt_id: AttemptId::from("a-2")
            }]
        );
        assert!(state.attempt.is_none());
    }
}
