// form-iofuzz/src/constants.rs
//! Shared constants for the corruption engine

/// Size of one mask chunk, in bytes
pub const CHUNK_BYTES: usize = 1024;

/// Diffusion constants mixed into every chunk seed
pub const MAGIC1: u32 = 0x33ea_84f7;
pub const MAGIC2: u32 = 0x783b_c31f;
pub const MAGIC3: u32 = 0x9b5d_a2fb;

/// Smallest non-zero ratio accepted by the configuration
pub const MIN_RATIO: f64 = 0.000_000_000_01;

/// Largest ratio accepted by the configuration
pub const MAX_RATIO: f64 = 5.0;

/// Ratio used when nothing else is configured
pub const DEFAULT_RATIO: f64 = 0.004;

/// Seed used when nothing else is configured
pub const DEFAULT_SEED: u32 = 0;

/// Number of resource slots allocated up front
pub const INITIAL_SLOTS: usize = 32;

/// Environment variables read by `FuzzOptions::from_env`
pub mod env_vars {
    /// Global seed
    pub const SEED: &str = "FORM_IOFUZZ_SEED";
    /// Lower ratio bound
    pub const MINRATIO: &str = "FORM_IOFUZZ_MINRATIO";
    /// Upper ratio bound
    pub const MAXRATIO: &str = "FORM_IOFUZZ_MAXRATIO";
    /// Fuzzing mode (xor, set, unset)
    pub const FUZZING: &str = "FORM_IOFUZZ_FUZZING";
    /// Increment the seed for each registered resource
    pub const AUTOINC: &str = "FORM_IOFUZZ_AUTOINC";
    /// Byte offsets eligible for corruption
    pub const BYTES: &str = "FORM_IOFUZZ_BYTES";
    /// Byte values that are never modified
    pub const PROTECT: &str = "FORM_IOFUZZ_PROTECT";
    /// Byte values that are never produced
    pub const REFUSE: &str = "FORM_IOFUZZ_REFUSE";
    /// Resource ordinals selected for corruption
    pub const LIST: &str = "FORM_IOFUZZ_LIST";
}

/// Fuzzing mode names
pub mod modes {
    /// Toggle mask bits
    pub const XOR: &str = "xor";
    /// Force mask bits to one
    pub const SET: &str = "set";
    /// Force mask bits to zero
    pub const UNSET: &str = "unset";
}
