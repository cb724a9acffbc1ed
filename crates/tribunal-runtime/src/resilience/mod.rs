//! Resilience patterns for model calls.
//!
//! Retry with backoff lives in the `Generator`; this module holds the
//! per-call-site circuit breaker.

mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
