// Formation Network I/O Fuzzing
// Core library definition
//
// Corrupts bytes flowing through a program's I/O so that the same
// (seed, ratio) pair always reproduces the same corruption, no matter how
// the reads that carry those bytes are split, repeated or reordered.

pub mod constants;
pub mod error;

// Primitives
pub mod chars;
pub mod random;
pub mod ranges;
pub mod ratio;

// Engine
pub mod config;
pub mod fuzz;
pub mod tracker;

// Re-exports for convenience
pub use chars::CharacterSet;
pub use config::{Config, FuzzOptions, FuzzingMode};
pub use error::{FuzzError, Result};
pub use ranges::{HostList, Range, RangeSet};
pub use tracker::{LockTarget, RawHandle, ResourceState, Tracker};
