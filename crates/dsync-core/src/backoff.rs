//! Randomized retry delay between contended acquisition attempts
//!
//! The delay is drawn uniformly from `[0, MAX_BACKOFF)` on every attempt with
//! no growth between attempts. Each client owns its own generator so competing
//! retriers desynchronize.

use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;

/// Exclusive upper bound of a single backoff interval
pub const MAX_BACKOFF: Duration = Duration::from_millis(10);

/// Produces the wait interval between failed acquisition attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    rng: StdRng,
}

impl Backoff {
    /// Backoff drawing from the given generator
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    /// Next interval to sleep before retrying
    pub fn next_delay(&mut self) -> Duration {
        let max_micros = MAX_BACKOFF.as_micros() as u64;
        Duration::from_micros(self.rng.random_range(0..max_micros))
    }
}
