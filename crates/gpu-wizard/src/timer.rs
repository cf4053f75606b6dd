//! Elapsed time and ETA for an in-flight provisioning attempt.

use std::time::Duration;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::providers::{ProvisionPhase, ProvisioningStatus};

/// One timer snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerTick {
    /// Seconds since the attempt started.
    pub elapsed_secs: u64,
    /// Estimated seconds until ready (`None` once failed).
    pub estimated_remaining_secs: Option<u64>,
    /// Progress the estimate was based on.
    pub progress_percent: Option<f64>,
    /// Last tick of this timer.
    pub is_final: bool,
}

/// Estimate remaining seconds.
///
/// Extrapolates from provider progress when it is strictly between 0 and
/// 100; otherwise counts down from the historical average `fallback_secs`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn estimate_remaining(elapsed_secs: u64, progress: Option<f64>, fallback_secs: u64) -> u64 {
    match progress {
        Some(p) if p >= 100.0 => 0,
        Some(p) if p > 0.0 => (elapsed_secs as f64 * (100.0 - p) / p).round() as u64,
        _ => fallback_secs.saturating_sub(elapsed_secs),
    }
}

/// Per-attempt timer. Never reused across attempts.
#[derive(Debug)]
pub struct ProvisioningTimer {
    started: Instant,
    interval: Duration,
    fallback_secs: u64,
    token: CancellationToken,
}

impl ProvisioningTimer {
    /// Start a timer now.
    #[must_use]
    pub fn start(interval: Duration, fallback_secs: u64, token: CancellationToken) -> Self {
        Self {
            started: Instant::now(),
            interval,
            fallback_secs,
            token,
        }
    }

    /// Seconds since start.
    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Snapshot for a given status.
    #[must_use]
    pub fn snapshot(&self, status: &ProvisioningStatus, is_final: bool) -> TimerTick {
        let elapsed_secs = self.elapsed_secs();
        let estimated_remaining_secs = match status.phase {
            ProvisionPhase::Ready => Some(0),
            ProvisionPhase::Failed => None,
            ProvisionPhase::Pending | ProvisionPhase::Connecting => Some(estimate_remaining(
                elapsed_secs,
                status.progress_percent,
                self.fallback_secs,
            )),
        };
        TimerTick {
            elapsed_secs,
            estimated_remaining_secs,
            progress_percent: status.progress_percent,
            is_final,
        }
    }

    /// Lazy periodic ticks.
    ///
    /// Nothing happens until the stream is polled. The stream ends after a
    /// final snapshot once the token is cancelled, the status turns terminal,
    /// or the status sender goes away.
    pub fn ticks(
        self,
        status: watch::Receiver<ProvisioningStatus>,
    ) -> impl Stream<Item = TimerTick> + Send + 'static {
        enum Event {
            Stop,
            StatusChanged,
            Tick,
        }

        stream::unfold(Some((self, status, None)), |state| async move {
            let (timer, mut status, interval) = state?;
            let mut interval = interval.unwrap_or_else(|| {
                let mut interval = tokio::time::interval(timer.interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });

            loop {
                let event = tokio::select! {
                    biased;
                    () = timer.token.cancelled() => Event::Stop,
                    changed = status.changed() => {
                        if changed.is_ok() { Event::StatusChanged } else { Event::Stop }
                    }
                    _ = interval.tick() => Event::Tick,
                };

                let current = status.borrow_and_update().clone();
                match event {
                    Event::Stop => return Some((timer.snapshot(&current, true), None)),
                    Event::StatusChanged if current.is_terminal() => {
                        return Some((timer.snapshot(&current, true), None));
                    }
                    Event::StatusChanged => {}
                    Event::Tick => {
                        let is_final = current.is_terminal();
                        let tick = timer.snapshot(&current, is_final);
                        let next = (!is_final).then_some((timer, status, Some(interval)));
                        return Some((tick, next));
                    }
                }
            }
        })
    }
}
