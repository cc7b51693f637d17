// form-iofuzz/src/ratio.rs
//! Per-resource ratio resolution

use crate::constants::{MAX_RATIO, MIN_RATIO};

/// Nibble permutation applied to the low nibble of the seed
const SHUFFLE: [u16; 16] = [0, 12, 2, 10, 14, 8, 15, 7, 9, 13, 3, 6, 4, 1, 11, 5];

/// Reassemble the low 16 bits of `seed` into an interpolation rate.
///
/// Consecutive seeds land far apart in `[0, 0xffff]`, so a seed sweep covers
/// the whole ratio band instead of creeping from one end of it.
fn shuffle_rate(seed: u32) -> u16 {
    let seed = seed as u16;
    let mut rate = SHUFFLE[usize::from(seed & 0xf)] << 12;
    rate |= (seed & 0xf0) << 4;
    rate |= (seed & 0xf00) >> 4;
    rate |= (seed & 0xf000) >> 12;
    rate
}

/// Map a seed onto a ratio between `min_ratio` and `max_ratio`, log-uniformly.
///
/// Equal bounds are returned untouched, which also keeps a ratio of zero
/// (corruption disabled) exactly zero.
pub fn resolve(seed: u32, min_ratio: f64, max_ratio: f64) -> f64 {
    if min_ratio == max_ratio {
        return min_ratio;
    }

    let rate = f64::from(shuffle_rate(seed));
    let min = min_ratio.ln();
    let max = max_ratio.ln();
    let cur = min + (max - min) * rate / f64::from(u16::MAX);

    cur.exp()
}

/// Clamp a ratio pair into `[MIN_RATIO, MAX_RATIO]` with `max >= min`.
///
/// `(0, 0)` is preserved as is: it switches corruption off.
pub fn clamp_ratios(min_ratio: f64, max_ratio: f64) -> (f64, f64) {
    if min_ratio == 0.0 && max_ratio == 0.0 {
        return (0.0, 0.0);
    }

    let min = clamp_one(min_ratio);
    let max = clamp_one(max_ratio);

    (min, max.max(min))
}

fn clamp_one(ratio: f64) -> f64 {
    if ratio.is_nan() || ratio < MIN_RATIO {
        MIN_RATIO
    } else if ratio > MAX_RATIO {
        MAX_RATIO
    } else {
        ratio
    }
}
