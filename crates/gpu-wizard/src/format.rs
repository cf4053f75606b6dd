//! Human-readable strings for presentation layers.

use crate::wizard::Step;

/// `45s`, `2m 05s`, `1h 02m`.
#[must_use]
pub fn format_duration(secs: u64) -> String {
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// ETA label; `None` means no estimate is available.
#[must_use]
pub fn format_eta(remaining_secs: Option<u64>) -> String {
    match remaining_secs {
        None => "unknown".to_string(),
        Some(0) => "any moment".to_string(),
        Some(secs) => format!("~{}", format_duration(secs)),
    }
}

/// `$0.450/h`; prices under a cent keep four decimals.
#[must_use]
pub fn format_price(per_hour: f64) -> String {
    if per_hour > 0.0 && per_hour < 0.01 {
        format!("${per_hour:.4}/h")
    } else {
        format!("${per_hour:.3}/h")
    }
}

/// `Step 2 of 4: Choose hardware`.
#[must_use]
pub fn format_step(step: Step) -> String {
    format!("Step {step} of {}: {}", Step::TOTAL_STEPS, step.title())
}
