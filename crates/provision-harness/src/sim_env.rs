//! Simulated environment for deterministic testing.
//!
//! Reads turmoil's virtual clock through tokio's time driver, so a
//! registration that polls for minutes of simulated time finishes instantly
//! and identically on every run. Also usable under a paused tokio runtime
//! outside turmoil.

use std::time::{Duration, Instant};

use provision_core::env::Environment;

/// Environment backed by the simulation clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimEnv;

impl SimEnv {
    /// Create a simulated environment.
    ///
    /// Must be used from within a turmoil host or a tokio runtime.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_virtual_clock() {
        let env = SimEnv::new();
        let start = env.now();

        env.sleep(Duration::from_secs(30)).await;

        assert!(env.elapsed_since(start) >= Duration::from_secs(30));
    }
}
