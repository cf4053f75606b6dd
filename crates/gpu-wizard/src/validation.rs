//! Step gating and pre-provisioning checks.
//!
//! Every function here is a pure function of the state. Nothing is cached:
//! callers re-evaluate after each transition, so a selection change that
//! empties the offer list immediately invalidates step 2.

use serde::{Deserialize, Serialize};

use crate::error::FailureReason;
use crate::wizard::{Step, WizardState};

/// A reason a step (or the whole flow) cannot proceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// No location selected.
    NoLocations,
    /// No tier selected.
    NoTier,
    /// Offers for the current selection have not been fetched (yet).
    OffersNotLoaded,
    /// No available offer matches the tier.
    NoOffers,
    /// The strategy cannot be selected.
    StrategyUnavailable,
    /// The strategy needs a multi-GPU host and the offer has one GPU.
    StrategyNeedsMultiGpu,
    /// Balance has not been fetched.
    BalanceUnknown,
    /// Balance below the minimum commitment.
    BalanceInsufficient { required: f64, available: f64 },
}

impl ValidationIssue {
    /// Stable reason code, where one applies.
    #[must_use]
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            Self::NoOffers => Some(FailureReason::NoOffers),
            Self::BalanceUnknown | Self::BalanceInsufficient { .. } => {
                Some(FailureReason::BalanceInsufficient)
            }
            _ => None,
        }
    }
}

/// Result of [`validate_before_provisioning`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Every violation found.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Whether provisioning may start.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    /// Reason code of the first issue that has one.
    #[must_use]
    pub fn reason(&self) -> Option<FailureReason> {
        self.issues.iter().find_map(ValidationIssue::reason)
    }

    fn push(&mut self, issue: ValidationIssue) {
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }
}

/// Violations that keep `step` from being complete.
#[must_use]
pub fn step_issues(state: &WizardState, step: Step) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    match step {
        Step::Location => {
            if state.locations.is_empty() {
                issues.push(ValidationIssue::NoLocations);
            }
        }
        Step::Hardware => {
            let Some(tier) = state.tier else {
                issues.push(ValidationIssue::NoTier);
                return issues;
            };
            match state.current_offers() {
                None => issues.push(ValidationIssue::OffersNotLoaded),
                Some(offers) => {
                    let filter = tier.tier();
                    if !offers.iter().any(|o| o.available && filter.matches(o)) {
                        issues.push(ValidationIssue::NoOffers);
                    }
                }
            }
        }
        Step::Strategy => {
            let strategy = state.selected_strategy();
            if !strategy.available {
                issues.push(ValidationIssue::StrategyUnavailable);
            } else if strategy.requires_multi_gpu
                && state.effective_offer().map_or(true, |o| o.gpu_count < 2)
            {
                issues.push(ValidationIssue::StrategyNeedsMultiGpu);
            }
            if strategy.has_recurring_cost() && state.balance.known().is_none() {
                issues.push(ValidationIssue::BalanceUnknown);
            }
        }
        Step::Provision => {
            for prior in [Step::Location, Step::Hardware, Step::Strategy] {
                issues.extend(step_issues(state, prior));
            }
        }
    }
    issues
}

/// Whether `step` has everything it needs.
#[must_use]
pub fn is_step_complete(state: &WizardState, step: Step) -> bool {
    step_issues(state, step).is_empty()
}

/// Whether navigation to step number `target` is allowed.
///
/// The target must exist, be at most one past the furthest step reached,
/// and every step before it must be complete.
#[must_use]
pub fn can_proceed_to_step(state: &WizardState, target: u8) -> bool {
    let Some(target) = Step::from_number(target) else {
        return false;
    };
    if target.number() > state.furthest_step.number() + 1 {
        return false;
    }
    Step::ALL
        .iter()
        .take_while(|s| **s < target)
        .all(|s| is_step_complete(state, *s))
}

/// Balance needed to cover the minimum commitment of the current selection.
///
/// Uses the chosen (or top-ranked) offer's price, falling back to the tier's
/// price ceiling when no offer is known.
#[must_use]
pub fn required_balance(state: &WizardState) -> f64 {
    let machine_rate = state
        .effective_offer()
        .map(|o| o.price_per_hour)
        .or_else(|| state.tier.map(|t| t.tier().max_price_per_hour))
        .unwrap_or(0.0);
    (machine_rate + state.selected_strategy().hourly_cost) * state.policy.min_committed_hours
}

/// Whether the known balance covers [`required_balance`]. Unknown balance is `false`.
#[must_use]
pub fn has_minimum_balance(state: &WizardState) -> bool {
    state
        .balance
        .known()
        .is_some_and(|balance| balance >= required_balance(state))
}

/// All step checks plus the balance check, in one pass.
#[must_use]
pub fn validate_before_provisioning(state: &WizardState) -> ValidationReport {
    let mut report = ValidationReport::default();
    for issue in step_issues(state, Step::Provision) {
        report.push(issue);
    }
    if !has_minimum_balance(state) {
        match state.balance.known() {
            Some(available) => report.push(ValidationIssue::BalanceInsufficient {
                required: required_balance(state),
                available,
            }),
            None => report.push(ValidationIssue::BalanceUnknown),
        }
    }
    report
}
