// form-iofuzz/src/random.rs
//! Reseedable Park-Miller generator used to derive chunk masks
//!
//! The sequence must stay bit-identical across builds and platforms, so this
//! does not use `rand`: every corruption pattern is a pure function of the
//! seed fed to [`Prng::seed`].

const SEED_MIX: u32 = 0x1234_5678;

/// Minimal standard generator with Schrage's decomposition
#[derive(Debug, Clone)]
pub struct Prng {
    state: u32,
}

impl Default for Prng {
    fn default() -> Self {
        Self { state: 1 }
    }
}

impl Prng {
    /// Create a generator already seeded with `seed`
    pub fn new(seed: u32) -> Self {
        let mut prng = Self::default();
        prng.seed(seed);
        prng
    }

    /// Reset the internal state
    pub fn seed(&mut self, seed: u32) {
        self.state = seed ^ SEED_MIX;
    }

    /// Advance the generator and return a value in `[0, max)`.
    ///
    /// A `max` of zero still advances the state but always yields zero.
    pub fn next(&mut self, max: u32) -> u32 {
        let state = i64::from(self.state);
        let hi = state / 12773;
        let lo = state % 12773;
        let mut x = 16807 * lo - 2836 * hi;
        if x <= 0 {
            x += 0x7fff_ffff;
        }
        // x is in (0, 2^31) here
        self.state = x as u32;

        if max == 0 {
            return 0;
        }
        self.state % max
    }
}
