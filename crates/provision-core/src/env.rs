//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the registration runtime from system
//! time. The state machine itself never touches it; the driver uses it to
//! implement the poll delay and to time attempts. This enables:
//!
//! - Deterministic Simulation: Turmoil provides a virtual clock, so a
//!   registration that polls for minutes completes instantly and reproducibly.
//!
//! - Production Runtime: Tokio's timer and the system clock are used without
//!   any change to the protocol logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

/// Abstract environment providing time and the poll delay primitive.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. Sleep fidelity: `sleep(d)` does not complete before `d` has elapsed on
///    the clock `now()` reads
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: This method MUST return values that never decrease
    ///   within a single execution context.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not protocol logic). Dropping the returned future
    /// before it completes cancels the sleep.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Time elapsed since `earlier`, saturating at zero.
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}
