//! Circuit breaker to prevent cascade failures.
//!
//! When model calls from one call site fail repeatedly, the circuit opens
//! and subsequent calls from that site go straight to their deterministic
//! fallback. The breaker is shared across runs.

use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::time::Instant;
use tribunal_core::config::CircuitBreakerConfig;

use crate::generation::CallSite;

/// State of a circuit.
#[derive(Debug, Clone)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, all calls bypass
    Open { opened_at: Instant },

    /// Testing if circuit can close
    HalfOpen { successes: u32 },
}

/// Each call site has its own circuit to allow independent recovery.
pub struct CircuitBreaker {
    states: RwLock<HashMap<CallSite, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls from `site` should skip the model and fall back.
    pub fn is_open(&self, site: CallSite) -> bool {
        let states = self.states.read();
        match states.get(&site) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(site);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, site: CallSite) {
        let mut states = self.states.write();
        match states.get(&site).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(site, CircuitState::Closed { failures: 0 });
                    tracing::info!(call_site = %site, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        site,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(site, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, site: CallSite) {
        let mut states = self.states.write();
        let failures = match states.get(&site).cloned() {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    site,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(call_site = %site, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                site,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                call_site = %site,
                failures = failures,
                "Circuit opened after repeated failures"
            );
        } else {
            states.insert(site, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, site: CallSite) {
        let mut states = self.states.write();
        if matches!(states.get(&site), Some(CircuitState::Open { .. })) {
            states.insert(site, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(call_site = %site, "Circuit half-open for recovery test");
        }
    }

    pub fn state(&self, site: CallSite) -> CircuitState {
        self.states
            .read()
            .get(&site)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(failure_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        })
    }

    #[tokio::test]
    async fn test_circuit_starts_closed() {
        assert!(!CircuitBreaker::default().is_open(CallSite::ProFraud));
    }

    #[tokio::test]
    async fn test_circuit_opens_after_failures() {
        let cb = breaker(2);
        cb.record_failure(CallSite::ProFraud);
        assert!(!cb.is_open(CallSite::ProFraud));
        cb.record_failure(CallSite::ProFraud);
        assert!(cb.is_open(CallSite::ProFraud));
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let cb = CircuitBreaker::default();
        cb.record_failure(CallSite::Explanation);
        cb.record_failure(CallSite::Explanation);
        cb.record_success(CallSite::Explanation);
        cb.record_failure(CallSite::Explanation);
        cb.record_failure(CallSite::Explanation);
        assert!(!cb.is_open(CallSite::Explanation));
    }

    #[tokio::test]
    async fn test_call_sites_are_independent() {
        let cb = breaker(1);
        cb.record_failure(CallSite::ProFraud);
        assert!(cb.is_open(CallSite::ProFraud));
        assert!(!cb.is_open(CallSite::ProCustomer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_through_half_open() {
        let cb = breaker(1);
        cb.record_failure(CallSite::PolicyMatcher);
        assert!(cb.is_open(CallSite::PolicyMatcher));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!cb.is_open(CallSite::PolicyMatcher));
        assert!(matches!(
            cb.state(CallSite::PolicyMatcher),
            CircuitState::HalfOpen { .. }
        ));

        cb.record_success(CallSite::PolicyMatcher);
        assert!(matches!(
            cb.state(CallSite::PolicyMatcher),
            CircuitState::Closed { failures: 0 }
        ));
    }
}
