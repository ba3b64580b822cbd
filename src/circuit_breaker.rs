use failsafe::{
    backoff::{self, Exponential},
    failure_policy::{self, ConsecutiveFailures},
    Config, StateMachine,
};
use std::time::Duration;

/// Breaker guarding store writes.
pub type StoreCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for store writes so a failing database is not hammered.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Writes pass through.
/// - **OPEN**: Writes are dropped immediately.
/// - **HALF_OPEN**: One write is let through to probe the store.
///
/// # Returns
///
/// * `StoreCircuitBreaker` - Cheap to clone; clones share state.
pub fn create_store_circuit_breaker() -> StoreCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
