// SPDX-License-Identifier: Apache-2.0

use crate::error::GatewayError;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

struct GateState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Consecutive-failure gate shared by the HTTP clients. After
/// `threshold` failures in a row the gate refuses calls until the
/// cooldown elapses; one success closes it again.
pub(crate) struct FailureGate {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<GateState>,
}

impl FailureGate {
    pub(crate) fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(GateState {
                consecutive_failures: 0,
                open_until: None,
            }),
        }
    }

    pub(crate) fn check(&self, context: &str) -> Result<(), GatewayError> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(until) = state.open_until {
            if Instant::now() < until {
                return Err(GatewayError::breaker(format!(
                    "{context} calls suspended after {} consecutive failures",
                    state.consecutive_failures
                )));
            }
            // Cooldown elapsed: allow one probe through.
            state.open_until = None;
        }
        Ok(())
    }

    pub(crate) fn record_success(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    pub(crate) fn record_failure(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.threshold {
            if state.open_until.is_none() {
                warn!(
                    failures = state.consecutive_failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "gateway failure gate opened"
                );
            }
            state.open_until = Some(Instant::now() + self.cooldown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_and_recovers() {
        let gate = FailureGate::new(3, Duration::from_millis(10));
        assert!(gate.check("test").is_ok());
        gate.record_failure();
        gate.record_failure();
        assert!(gate.check("test").is_ok());
        gate.record_failure();
        let err = gate.check("test").unwrap_err();
        assert_eq!(err.code, crate::GatewayErrorCode::Breaker);

        std::thread::sleep(Duration::from_millis(15));
        // Cooldown elapsed: the probe goes through.
        assert!(gate.check("test").is_ok());
        gate.record_success();
        assert!(gate.check("test").is_ok());
    }

    #[test]
    fn success_resets_the_count() {
        let gate = FailureGate::new(2, Duration::from_secs(60));
        gate.record_failure();
        gate.record_success();
        gate.record_failure();
        assert!(gate.check("test").is_ok());
    }
}
