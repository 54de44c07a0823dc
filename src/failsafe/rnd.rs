//! Random source for backoff jitter
//!
//! Not cryptographically secure; only used to spread retries apart.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone, Default)]
pub(crate) enum Rnd {
    /// Thread-local fastrand generator
    #[default]
    Real,

    /// Deterministic generator, shared by clones of the owning policy
    Seeded(Arc<Mutex<fastrand::Rng>>),

    #[cfg(test)]
    Test(Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl Debug for Rnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "Real"),
            Self::Seeded(_) => write!(f, "Seeded"),
            #[cfg(test)]
            Self::Test(_) => write!(f, "Test"),
        }
    }
}

impl Rnd {
    pub fn seeded(seed: u64) -> Self {
        Self::Seeded(Arc::new(Mutex::new(fastrand::Rng::with_seed(seed))))
    }

    #[cfg(test)]
    pub fn new_fixed(value: f64) -> Self {
        Self::Test(Arc::new(move || value))
    }

    /// Uniform value in `[0, 1)`
    pub fn next_f64(&self) -> f64 {
        match self {
            Self::Real => fastrand::f64(),
            Self::Seeded(rng) => rng.lock().f64(),
            #[cfg(test)]
            Self::Test(generator) => generator(),
        }
    }
}
