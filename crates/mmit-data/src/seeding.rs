//! Deterministic seeding scope over the process-wide generator.
//!
//! Augmentation draws its randomness from a single global [`StdRng`]. A
//! [`SeedScope`] locks that generator, optionally reseeds it from
//! `(seed, extra...)`, and restores the previous state when dropped. The lock
//! is held for the whole scope, so concurrent callers in one process are
//! serialized around "enter, assemble, exit".
//!
//! Scopes are not reentrant: entering a second scope on a thread that already
//! holds one deadlocks.

use parking_lot::{Mutex, MutexGuard};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::OnceLock;

/// Derived seeds are reduced into `[0, SEED_MODULUS)`.
const SEED_MODULUS: u64 = 1_000_000;

static GLOBAL_RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();

fn global_rng() -> &'static Mutex<StdRng> {
    GLOBAL_RNG.get_or_init(|| Mutex::new(StdRng::from_entropy()))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Combine a base seed with additional components.
///
/// With no extra components the base seed is used as is; otherwise the
/// components are mixed and reduced modulo one million.
pub fn derive_seed(seed: u64, extra: &[u64]) -> u64 {
    if extra.is_empty() {
        return seed;
    }
    let mixed = extra
        .iter()
        .fold(splitmix64(seed), |acc, &component| splitmix64(acc ^ component));
    mixed % SEED_MODULUS
}

/// Reseed the global generator outside of any scope.
pub fn seed_global_rng(seed: u64) {
    *global_rng().lock() = StdRng::seed_from_u64(seed);
}

/// Copy of the global generator's current state.
pub fn snapshot_global_rng() -> StdRng {
    global_rng().lock().clone()
}

/// Scoped, exclusive access to the global generator.
pub struct SeedScope {
    guard: MutexGuard<'static, StdRng>,
    saved: Option<StdRng>,
}

impl SeedScope {
    /// Lock the global generator, reseeding it when `seed` is given.
    ///
    /// With `seed == None` the scope only serializes access and leaves the
    /// generator state untouched.
    pub fn enter(seed: Option<u64>, extra: &[u64]) -> Self {
        let mut guard = global_rng().lock();
        let saved = seed.map(|seed| {
            let previous = guard.clone();
            *guard = StdRng::seed_from_u64(derive_seed(seed, extra));
            previous
        });
        Self { guard, saved }
    }

    /// Run `f` inside a scope and restore the generator afterwards.
    pub fn with<R>(seed: Option<u64>, extra: &[u64], f: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut scope = Self::enter(seed, extra);
        f(scope.rng())
    }

    /// The generator to draw from while the scope is alive.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.guard
    }

    /// Whether this scope reseeded the generator.
    pub fn is_seeded(&self) -> bool {
        self.saved.is_some()
    }
}

impl Drop for SeedScope {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.guard = saved;
        }
    }
}

impl std::fmt::Debug for SeedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedScope")
            .field("seeded", &self.is_seeded())
            .finish()
    }
}
