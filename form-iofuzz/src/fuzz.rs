// form-iofuzz/src/fuzz.rs
//! Chunk mask derivation and application
//!
//! A resource's byte-offset space is cut into aligned chunks of
//! [`CHUNK_BYTES`]. Each chunk owns a mask that depends only on the
//! resource's effective seed and ratio and on the chunk index, so a byte at a
//! given offset is always corrupted the same way no matter how the reads that
//! reach it are sized or ordered.

use crate::config::Config;
use crate::constants::{CHUNK_BYTES, MAGIC1, MAGIC2, MAGIC3};
use crate::random::Prng;
use log::trace;

/// Per-byte toggle masks for one chunk
pub type Mask = [u8; CHUNK_BYTES];

const CHUNK: i64 = CHUNK_BYTES as i64;

/// Fixed-point scale of the dithering draw
const DITHER: u32 = 1_000_000;

/// Seed of the generator that lays out the mask of chunk `index`
pub fn chunk_seed(seed: u32, ratio: f64, index: i64) -> u32 {
    // Every step is mod 2^32
    let mut chunk_seed = index as u32;
    chunk_seed ^= MAGIC2;
    chunk_seed = chunk_seed.wrapping_add((ratio * f64::from(MAGIC1)) as u64 as u32);
    chunk_seed ^= seed;
    chunk_seed.wrapping_add((index as u32).wrapping_mul(MAGIC3))
}

/// Fill `mask` for chunk `index` and return the number of bit flips drawn.
///
/// The flip count is `ratio * 8 * CHUNK_BYTES` plus a uniform fraction, then
/// truncated, so ratios below one bit per chunk still average out correctly.
pub fn derive_mask(seed: u32, ratio: f64, index: i64, mask: &mut Mask) -> u32 {
    let chunk_seed = chunk_seed(seed, ratio, index);
    let mut prng = Prng::new(chunk_seed);

    mask.fill(0);

    let scaled = ratio * (8 * CHUNK_BYTES) as f64 * f64::from(DITHER);
    let flips = ((scaled + f64::from(prng.next(DITHER))) / f64::from(DITHER)) as u32;

    for _ in 0..flips {
        let idx = prng.next(CHUNK_BYTES as u32) as usize;
        let bit = 1u8 << prng.next(8);
        mask[idx] ^= bit;
    }

    trace!(
        "Derived mask for chunk {} (chunk seed {:#010x}, {} flips)",
        index,
        chunk_seed,
        flips
    );

    flips
}

/// One-entry mask cache
#[derive(Clone)]
pub struct ChunkCache {
    index: Option<i64>,
    mask: Box<Mask>,
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self {
            index: None,
            mask: Box::new([0; CHUNK_BYTES]),
        }
    }
}

impl std::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCache")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl ChunkCache {
    /// Index of the cached chunk, if any
    pub fn index(&self) -> Option<i64> {
        self.index
    }

    /// Mask for chunk `index`, recomputed only when another chunk is cached
    pub fn get(&mut self, seed: u32, ratio: f64, index: i64) -> &Mask {
        if self.index != Some(index) {
            derive_mask(seed, ratio, index, &mut self.mask);
            self.index = Some(index);
        }
        &self.mask
    }

    pub fn invalidate(&mut self) {
        self.index = None;
    }
}

/// A byte handed back to the resource (`ungetc`), to be restored unmodified
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pushback {
    pub pending: bool,
    pub position: i64,
    pub byte: u8,
}

impl Pushback {
    /// Put the pushed-back byte at the front of `buf` if it was recorded at
    /// `position`. A pushback recorded anywhere else is stale and dropped.
    pub fn restore(self, buf: &mut [u8], position: i64) {
        if !self.pending || self.position != position {
            return;
        }
        if let Some(first) = buf.first_mut() {
            *first = self.byte;
        }
    }
}

/// Everything the fuzzer needs to know about one resource
#[derive(Debug, Clone)]
pub struct FuzzState {
    pub seed: u32,
    pub ratio: f64,
    pub cache: ChunkCache,
}

impl FuzzState {
    pub fn new(seed: u32, ratio: f64) -> Self {
        Self {
            seed,
            ratio,
            cache: ChunkCache::default(),
        }
    }
}

/// Corrupt `buf`, whose first byte lives at logical offset `position`.
///
/// Bytes outside the selected offsets, bytes whose value is protected, and
/// bytes whose corrupted value would be refused keep their original value.
/// Offsets stop at `i64::MAX`; bytes past it are left alone.
pub fn apply(config: &Config, state: &mut FuzzState, buf: &mut [u8], position: i64) {
    let len = i64::try_from(buf.len())
        .unwrap_or(i64::MAX)
        .min(i64::MAX.saturating_sub(position));
    if len <= 0 {
        return;
    }
    let end = position + len;

    let first = position.div_euclid(CHUNK);
    let last = (end - 1).div_euclid(CHUNK);

    for index in first..=last {
        let mask = state.cache.get(state.seed, state.ratio, index);

        let start = position.max(index.saturating_mul(CHUNK));
        let stop = end.min(index.saturating_add(1).saturating_mul(CHUNK));

        for offset in start..stop {
            if !config.selects_offset(offset) {
                continue;
            }

            let slot = &mut buf[(offset - position) as usize];
            let byte = *slot;
            if config.protect().contains(byte) {
                continue;
            }

            let mask_byte = mask[offset.rem_euclid(CHUNK) as usize];
            if mask_byte == 0 {
                continue;
            }

            let fuzzed = config.mode().apply(byte, mask_byte);
            if config.refuse().contains(fuzzed) {
                continue;
            }

            *slot = fuzzed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FuzzingMode;

    /// Non-zero bytes of the chunk 0 mask for seed 0, ratio 0.004
    const GOLDEN_CHUNK0: [(usize, u8); 32] = [
        (2, 2), (21, 2), (106, 2), (170, 32), (199, 1), (239, 4), (246, 128), (248, 16),
        (275, 1), (379, 64), (388, 4), (391, 128), (415, 8), (441, 4), (540, 1), (553, 64),
        (658, 64), (670, 1), (676, 4), (689, 1), (705, 64), (714, 128), (718, 128), (750, 1),
        (786, 8), (816, 16), (834, 1), (844, 128), (849, 1), (881, 16), (940, 16), (971, 16),
    ];

    fn config(mode: FuzzingMode, protect: Option<&str>, refuse: Option<&str>, bytes: Option<&str>) -> Config {
        Config::configure(0, 0.004, 0.004, mode, false, bytes, protect, refuse, None)
    }

    fn mask(seed: u32, ratio: f64, index: i64) -> Box<Mask> {
        let mut mask = Box::new([0u8; CHUNK_BYTES]);
        derive_mask(seed, ratio, index, &mut mask);
        mask
    }

    #[test]
    fn test_chunk_seed() {
        assert_eq!(chunk_seed(0, 0.004, 0), 0x7870_ec9c);
        // Ratios above 1.0 overflow 32 bits before wrapping
        let _ = chunk_seed(0, 5.0, i64::MAX);
    }

    #[test]
    fn test_golden_mask() {
        let mut buf = [0u8; CHUNK_BYTES];
        derive_mask(0, 0.004, 0, &mut buf);

        let nonzero: Vec<(usize, u8)> = buf
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b != 0)
            .map(|(i, &b)| (i, b))
            .collect();
        assert_eq!(nonzero, GOLDEN_CHUNK0.to_vec());
    }

    #[test]
    fn test_mask_is_deterministic() {
        for index in [0, 1, 7, 1 << 40] {
            assert_eq!(mask(1234, 0.02, index), mask(1234, 0.02, index));
        }
        assert_ne!(mask(1234, 0.02, 0), mask(1234, 0.02, 1));
        assert_ne!(mask(1234, 0.02, 0), mask(1235, 0.02, 0));
    }

    #[test]
    fn test_flip_count_follows_ratio() {
        let mut buf = [0u8; CHUNK_BYTES];
        assert_eq!(derive_mask(3, 0.5, 0, &mut buf), 4096);
        assert_eq!(derive_mask(3, 0.0, 0, &mut buf), 0);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_cache_reuses_mask() {
        let mut cache = ChunkCache::default();
        assert_eq!(cache.index(), None);

        let first = *cache.get(0, 0.004, 0);
        assert_eq!(cache.index(), Some(0));
        assert_eq!(first, *mask(0, 0.004, 0));

        cache.get(0, 0.004, 3);
        assert_eq!(cache.index(), Some(3));

        cache.invalidate();
        assert_eq!(*cache.get(0, 0.004, 0), first);
    }

    #[test]
    fn test_apply_xor_on_zero_chunk() {
        let config = config(FuzzingMode::Xor, None, None, None);
        let mut state = FuzzState::new(0, 0.004);
        let mut buf = vec![0u8; CHUNK_BYTES];

        apply(&config, &mut state, &mut buf, 0);

        let mut expected = vec![0u8; CHUNK_BYTES];
        for (offset, value) in GOLDEN_CHUNK0 {
            expected[offset] = value;
        }
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_apply_is_position_aligned() {
        let config = config(FuzzingMode::Xor, None, None, None);
        let input: Vec<u8> = (0..3000u32).map(|i| (i * 7) as u8).collect();

        let mut whole = input.clone();
        apply(&config, &mut FuzzState::new(0, 0.004), &mut whole, 0);

        let mut state = FuzzState::new(0, 0.004);
        let mut pieces = input.clone();
        let (head, tail) = pieces.split_at_mut(1500);
        apply(&config, &mut state, tail, 1500);
        apply(&config, &mut state, head, 0);

        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_protect_keeps_bytes() {
        let config = config(FuzzingMode::Xor, Some("\\x00"), None, None);
        let mut buf = vec![0u8; CHUNK_BYTES];
        apply(&config, &mut FuzzState::new(0, 0.004), &mut buf, 0);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_refuse_tests_the_output() {
        // Every golden flip turns a zero into a single-bit byte; refuse two of them
        let config = config(FuzzingMode::Xor, None, Some("\\x02\\x80"), None);
        let mut buf = vec![0u8; CHUNK_BYTES];
        apply(&config, &mut FuzzState::new(0, 0.004), &mut buf, 0);

        for (offset, value) in GOLDEN_CHUNK0 {
            let expected = if value == 2 || value == 128 { 0 } else { value };
            assert_eq!(buf[offset], expected, "offset {offset}");
        }
    }

    #[test]
    fn test_byte_ranges_limit_offsets() {
        let config = config(FuzzingMode::Xor, None, None, Some("0-199"));
        let mut buf = vec![0u8; CHUNK_BYTES];
        apply(&config, &mut FuzzState::new(0, 0.004), &mut buf, 0);

        for (offset, value) in GOLDEN_CHUNK0 {
            let expected = if offset < 200 { value } else { 0 };
            assert_eq!(buf[offset], expected, "offset {offset}");
        }
    }

    #[test]
    fn test_set_and_unset_modes() {
        let set = config(FuzzingMode::Set, None, None, None);
        let mut buf = vec![0xffu8; CHUNK_BYTES];
        apply(&set, &mut FuzzState::new(0, 0.004), &mut buf, 0);
        assert!(buf.iter().all(|&b| b == 0xff));

        let unset = config(FuzzingMode::Unset, None, None, None);
        let mut buf = vec![0xffu8; CHUNK_BYTES];
        apply(&unset, &mut FuzzState::new(0, 0.004), &mut buf, 0);
        for (offset, value) in GOLDEN_CHUNK0 {
            assert_eq!(buf[offset], 0xff & !value);
        }
    }

    #[test]
    fn test_pushback_is_restored_at_its_position() {
        let pushback = Pushback {
            pending: true,
            position: 2,
            byte: b'Z',
        };

        let mut buf = vec![0u8; 4];
        pushback.restore(&mut buf, 2);
        assert_eq!(buf[0], b'Z');
    }

    #[test]
    fn test_stale_pushback_is_dropped() {
        let pushback = Pushback {
            pending: true,
            position: 100,
            byte: b'Z',
        };

        let mut buf = vec![7u8; 4];
        pushback.restore(&mut buf, 2);
        assert_eq!(buf, [7; 4]);

        Pushback::default().restore(&mut buf, 0);
        assert_eq!(buf, [7; 4]);
        pushback.restore(&mut [], 100);
    }

    #[test]
    fn test_window_at_the_end_of_the_offset_space() {
        let config = config(FuzzingMode::Set, None, None, None);
        let mut state = FuzzState::new(0, 2.0);

        let mut buf = vec![0u8; 4];
        apply(&config, &mut state, &mut buf, i64::MAX - 2);
        // Offsets MAX-2 and MAX-1 are processed, the rest is out of range
        assert_eq!(&buf[2..], &[0, 0]);
        assert_eq!(state.cache.index(), Some(i64::MAX / CHUNK));

        let mut untouched = vec![0u8; 4];
        apply(&config, &mut state, &mut untouched, i64::MAX);
        assert_eq!(untouched, [0; 4]);
    }

    #[test]
    fn test_window_at_the_start_of_the_offset_space() {
        let config = config(FuzzingMode::Xor, None, None, None);
        let mut state = FuzzState::new(0, 0.004);

        let mut buf = vec![0u8; 8];
        apply(&config, &mut state, &mut buf, i64::MIN);
        assert_eq!(state.cache.index(), Some(i64::MIN / CHUNK));
    }

    #[test]
    fn test_malformed_byte_ranges_select_nothing() {
        let config = config(FuzzingMode::Xor, None, None, Some("abc"));
        let mut buf = vec![0u8; CHUNK_BYTES];
        apply(&config, &mut FuzzState::new(0, 0.004), &mut buf, 0);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_buffer() {
        let config = config(FuzzingMode::Xor, None, None, None);
        let mut state = FuzzState::new(0, 0.004);
        let mut buf: Vec<u8> = Vec::new();
        apply(&config, &mut state, &mut buf, 0);
        assert_eq!(state.cache.index(), None);
    }
}
