//! Per-identity fixed-window admission control
//!
//! Each identity gets at most `max_requests` admitted requests per window.
//! The window starts with the first admitted request and resets once it has
//! fully elapsed. Rejected requests do not count against the quota.
//!
//! State is process-local and lost on restart.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::AdmissionConfig;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Admitted; `remaining` more requests fit in the current window
    Allowed { remaining: u32 },
    /// Quota used up until the window resets
    Denied { retry_after: Duration },
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct AdmissionWindow {
    count: u32,
    started_at: Instant,
}

/// Fixed-window request counter keyed by caller identity
pub struct AdmissionController {
    windows: DashMap<String, AdmissionWindow>,
    window: Duration,
    max_requests: u32,
}

impl AdmissionController {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_requests,
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs), config.max_requests)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Check and count a request for `identity`
    pub fn admit(&self, identity: &str) -> AdmissionDecision {
        self.admit_at(identity, Instant::now())
    }

    /// [`admit`](Self::admit) against an explicit clock reading
    pub fn admit_at(&self, identity: &str, now: Instant) -> AdmissionDecision {
        // The entry guard holds the shard lock, so check-and-increment is
        // atomic per identity.
        let mut entry = self
            .windows
            .entry(identity.to_string())
            .or_insert(AdmissionWindow {
                count: 0,
                started_at: now,
            });
        let window = entry.value_mut();

        let elapsed = now.saturating_duration_since(window.started_at);
        if window.count == 0 || elapsed >= self.window {
            *window = AdmissionWindow {
                count: 1,
                started_at: now,
            };
            return AdmissionDecision::Allowed {
                remaining: self.max_requests.saturating_sub(1),
            };
        }

        if window.count < self.max_requests {
            window.count += 1;
            AdmissionDecision::Allowed {
                remaining: self.max_requests - window.count,
            }
        } else {
            AdmissionDecision::Denied {
                retry_after: self.window - elapsed,
            }
        }
    }

    /// Time until the identity's window resets, without counting a request
    pub fn window_remaining(&self, identity: &str) -> Option<Duration> {
        self.window_remaining_at(identity, Instant::now())
    }

    pub fn window_remaining_at(&self, identity: &str, now: Instant) -> Option<Duration> {
        let window = self.windows.get(identity)?;
        self.window
            .checked_sub(now.saturating_duration_since(window.started_at))
            .filter(|d| !d.is_zero())
    }

    /// Drop windows that have fully elapsed; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started_at) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of identities currently tracked
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_eleventh_request_is_denied() {
        let controller = AdmissionController::new(HOUR, 10);
        let t0 = Instant::now();

        for i in 0..10 {
            let decision = controller.admit_at("10.0.0.1", t0 + Duration::from_secs(i));
            assert_eq!(decision, AdmissionDecision::Allowed { remaining: 9 - i as u32 });
        }

        let decision = controller.admit_at("10.0.0.1", t0 + Duration::from_secs(600));
        assert_eq!(
            decision,
            AdmissionDecision::Denied {
                retry_after: Duration::from_secs(3000)
            }
        );
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_denials_do_not_extend_the_window() {
        let controller = AdmissionController::new(HOUR, 2);
        let t0 = Instant::now();

        assert!(controller.admit_at("a", t0).is_allowed());
        assert!(controller.admit_at("a", t0).is_allowed());
        for minute in 1..60 {
            assert!(!controller.admit_at("a", t0 + Duration::from_secs(minute * 60)).is_allowed());
        }

        assert_eq!(
            controller.admit_at("a", t0 + HOUR),
            AdmissionDecision::Allowed { remaining: 1 }
        );
    }

    #[test]
    fn test_identities_are_independent() {
        let controller = AdmissionController::new(HOUR, 1);
        let t0 = Instant::now();

        assert!(controller.admit_at("a", t0).is_allowed());
        assert!(!controller.admit_at("a", t0).is_allowed());
        assert!(controller.admit_at("b", t0).is_allowed());
    }

    #[test]
    fn test_window_remaining_does_not_count() {
        let controller = AdmissionController::new(HOUR, 1);
        let t0 = Instant::now();

        assert_eq!(controller.window_remaining_at("a", t0), None);
        controller.admit_at("a", t0);
        assert_eq!(
            controller.window_remaining_at("a", t0 + Duration::from_secs(60)),
            Some(Duration::from_secs(3540))
        );
        assert_eq!(controller.window_remaining_at("a", t0 + HOUR), None);
        assert!(!controller.admit_at("a", t0 + Duration::from_secs(61)).is_allowed());
    }

    #[test]
    fn test_purge_drops_only_elapsed_windows() {
        let controller = AdmissionController::new(HOUR, 10);
        let t0 = Instant::now();

        controller.admit_at("old", t0);
        controller.admit_at("new", t0 + Duration::from_secs(1800));

        assert_eq!(controller.purge_expired_at(t0 + HOUR), 1);
        assert_eq!(controller.tracked(), 1);
        assert!(controller.window_remaining_at("new", t0 + HOUR).is_some());
    }

    #[test]
    fn test_concurrent_admissions_respect_ceiling() {
        let controller = Arc::new(AdmissionController::new(HOUR, 10));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let controller = controller.clone();
                std::thread::spawn(move || controller.admit("shared").is_allowed())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 10);
    }
}
