use crate::Generator;
use burrow_core::ShortCode;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of characters in a generated code.
pub const CODE_LENGTH: usize = 8;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates 8-letter codes drawn from `[a-zA-Z]`.
///
/// Each generator owns its random source, so tests can supply a seeded one
/// and get a fixed sequence.
#[derive(Debug)]
pub struct RandomGenerator<R = StdRng> {
    rng: Mutex<R>,
}

impl RandomGenerator<StdRng> {
    /// Creates a generator seeded from operating system entropy.
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a generator with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for RandomGenerator<StdRng> {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl<R: Rng> RandomGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    fn next_code(&self) -> String {
        let mut rng = self.rng.lock();
        (0..CODE_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

impl<R: Rng + Send + 'static> Generator for RandomGenerator<R> {
    type Output = ShortCode;

    fn generate(&self) -> Self::Output {
        ShortCode::new_unchecked(self.next_code())
    }
}
