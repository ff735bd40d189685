// ── Device liveness ──
//
// A device counts as online when the control plane reports it connected
// AND it checked in recently. The connected flag alone lags: it can stay
// set for a while after a node drops off.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default freshness window for `last_seen`.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Whether a device is live at `now`.
///
/// - `connected` must be true.
/// - `last_seen` must be known and no older than `window`; an age exactly
///   equal to `window` still counts as online.
/// - A `last_seen` in the future (clock skew) counts as age zero.
pub fn is_online(
    connected: bool,
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    if !connected {
        return false;
    }
    let Some(seen) = last_seen else {
        return false;
    };
    let age = (now - seen).to_std().unwrap_or(Duration::ZERO);
    age <= window
}

/// Liveness settings shared by the operations that derive device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessPolicy {
    pub window: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            window: DEFAULT_FRESHNESS_WINDOW,
        }
    }
}

impl LivenessPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn is_online(
        &self,
        connected: bool,
        last_seen: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        is_online(connected, last_seen, now, self.window)
    }
}
