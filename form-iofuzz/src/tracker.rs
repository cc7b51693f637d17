// form-iofuzz/src/tracker.rs
//! Per-resource position and corruption state
//!
//! The interception layer registers every resource it wants corrupted, keeps
//! the tracked position in step with the real I/O calls, and hands each
//! buffer to [`Tracker::apply`] before returning it to the host program.

use crate::config::Config;
use crate::constants::INITIAL_SLOTS;
use crate::error::{FuzzError, Result};
use crate::fuzz::{self, FuzzState, Pushback};
use crate::ratio;
use log::debug;
use std::collections::HashMap;

/// Caller-supplied resource identifier (typically a file descriptor)
pub type RawHandle = i32;

/// What a lock applies to: one resource, or the process-wide sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockTarget {
    Global,
    Handle(RawHandle),
}

impl From<RawHandle> for LockTarget {
    fn from(handle: RawHandle) -> Self {
        Self::Handle(handle)
    }
}

/// State of one watched resource
#[derive(Debug, Clone)]
pub struct ResourceState {
    handle: RawHandle,
    ordinal: i64,
    active: bool,
    position: i64,
    lock_depth: u32,
    fuzz: FuzzState,
    /// Start of the window already corrupted
    already_pos: i64,
    /// Length of the window already corrupted
    already_fuzzed: usize,
    pushback: Pushback,
    line_buffer: Option<Vec<u8>>,
}

impl ResourceState {
    fn new(handle: RawHandle, ordinal: i64, active: bool, seed: u32, ratio: f64) -> Self {
        Self {
            handle,
            ordinal,
            active,
            position: 0,
            lock_depth: 0,
            fuzz: FuzzState::new(seed, ratio),
            already_pos: 0,
            already_fuzzed: 0,
            pushback: Pushback::default(),
            line_buffer: None,
        }
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    /// 1-based registration order, matched against the selection list
    pub fn ordinal(&self) -> i64 {
        self.ordinal
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn lock_depth(&self) -> u32 {
        self.lock_depth
    }

    pub fn seed(&self) -> u32 {
        self.fuzz.seed
    }

    pub fn ratio(&self) -> f64 {
        self.fuzz.ratio
    }

    pub fn cached_chunk(&self) -> Option<i64> {
        self.fuzz.cache.index()
    }

    pub fn pushback(&self) -> &Pushback {
        &self.pushback
    }

    /// End of the memo window, clamped to the offset space
    fn fuzzed_end(&self) -> i64 {
        self.already_pos.saturating_add(self.already_fuzzed as i64)
    }

    fn fuzzed_ahead(&self) -> usize {
        let end = self.fuzzed_end();
        if self.position < self.already_pos || self.position >= end {
            return 0;
        }
        (end - self.position) as usize
    }

    fn mark_fuzzed(&mut self, count: usize) {
        let start = self.position;
        let end = start.saturating_add(count as i64);
        // Never shrink the memo because of a re-probe inside it
        if start >= self.already_pos && end <= self.fuzzed_end() {
            return;
        }
        self.already_pos = start;
        self.already_fuzzed = count;
    }
}

/// Table of watched resources plus the configuration they share
#[derive(Debug)]
pub struct Tracker {
    config: Config,
    slots: Vec<Option<ResourceState>>,
    index: HashMap<RawHandle, usize>,
    next_seed: u32,
    registered: i64,
    global_lock: u32,
}

impl Tracker {
    pub fn new(config: Config) -> Self {
        Self {
            next_seed: config.seed(),
            config,
            slots: Vec::with_capacity(INITIAL_SLOTS),
            index: HashMap::with_capacity(INITIAL_SLOTS),
            registered: 0,
            global_lock: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the configuration; only allowed before the first registration
    pub fn reconfigure(&mut self, config: Config) -> Result<()> {
        if self.registered > 0 {
            return Err(FuzzError::ConfigurationLocked);
        }
        self.next_seed = config.seed();
        self.config = config;
        Ok(())
    }

    /// Start watching `handle`.
    ///
    /// Negative handles are reserved and ignored. Registering a handle that
    /// is already watched leaves its state untouched.
    pub fn register(&mut self, handle: RawHandle) -> Option<&ResourceState> {
        if handle < 0 {
            debug!("Ignoring reserved handle {}", handle);
            return None;
        }
        if let Some(&slot) = self.index.get(&handle) {
            return self.slots.get(slot).and_then(Option::as_ref);
        }

        let seed = self.next_seed;
        if self.config.auto_increment() {
            self.next_seed = self.next_seed.wrapping_add(1);
        }
        let ratio = ratio::resolve(seed, self.config.min_ratio(), self.config.max_ratio());

        self.registered += 1;
        let ordinal = self.registered;
        let active = self.config.selects_ordinal(ordinal);

        let state = ResourceState::new(handle, ordinal, active, seed, ratio);
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(state);
                free
            }
            None => {
                self.slots.push(Some(state));
                self.slots.len() - 1
            }
        };
        self.index.insert(handle, slot);

        debug!(
            "Registered handle {} (slot {}, ordinal {}, seed {}, ratio {}, active {})",
            handle, slot, ordinal, seed, ratio, active
        );

        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Stop watching `handle`, releasing its slot; unknown handles are ignored
    pub fn unregister(&mut self, handle: RawHandle) {
        if let Some(slot) = self.index.remove(&handle) {
            self.slots[slot] = None;
            debug!("Unregistered handle {} (slot {})", handle, slot);
        }
    }

    /// Unregister every resource
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.index.clear();
    }

    pub fn state(&self, handle: RawHandle) -> Option<&ResourceState> {
        let slot = *self.index.get(&handle)?;
        self.slots.get(slot)?.as_ref()
    }

    fn state_mut(&mut self, handle: RawHandle) -> Option<&mut ResourceState> {
        let slot = *self.index.get(&handle)?;
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Handles currently watched, in no particular order
    pub fn handles(&self) -> impl Iterator<Item = RawHandle> + '_ {
        self.index.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_watched(&self, handle: RawHandle) -> bool {
        self.index.contains_key(&handle)
    }

    /// Whether `handle` is selected for corruption; unknown handles report true
    pub fn is_active(&self, handle: RawHandle) -> bool {
        self.state(handle).map_or(true, ResourceState::is_active)
    }

    pub fn lock(&mut self, target: impl Into<LockTarget>) {
        match target.into() {
            LockTarget::Global => self.global_lock += 1,
            LockTarget::Handle(handle) => {
                if let Some(state) = self.state_mut(handle) {
                    state.lock_depth += 1;
                }
            }
        }
    }

    pub fn unlock(&mut self, target: impl Into<LockTarget>) {
        match target.into() {
            LockTarget::Global => self.global_lock = self.global_lock.saturating_sub(1),
            LockTarget::Handle(handle) => {
                if let Some(state) = self.state_mut(handle) {
                    state.lock_depth = state.lock_depth.saturating_sub(1);
                }
            }
        }
    }

    /// Current lock depth; callers bypass corruption and tracking while non-zero
    pub fn is_locked(&self, target: impl Into<LockTarget>) -> u32 {
        match target.into() {
            LockTarget::Global => self.global_lock,
            LockTarget::Handle(handle) => self.state(handle).map_or(0, ResourceState::lock_depth),
        }
    }

    pub fn get_position(&self, handle: RawHandle) -> i64 {
        self.state(handle).map_or(0, ResourceState::position)
    }

    pub fn set_position(&mut self, handle: RawHandle, position: i64) {
        if let Some(state) = self.state_mut(handle) {
            state.position = position;
        }
    }

    pub fn add_position(&mut self, handle: RawHandle, delta: i64) {
        if let Some(state) = self.state_mut(handle) {
            state.position = state.position.saturating_add(delta);
        }
    }

    /// Record that `count` bytes from the current position are corrupted
    pub fn set_fuzzed(&mut self, handle: RawHandle, count: usize) {
        if let Some(state) = self.state_mut(handle) {
            state.mark_fuzzed(count);
        }
    }

    /// Number of already corrupted bytes ahead of the current position
    pub fn get_fuzzed(&self, handle: RawHandle) -> usize {
        self.state(handle).map_or(0, ResourceState::fuzzed_ahead)
    }

    /// Model `ungetc`: step back one byte and remember what was pushed there
    pub fn push_back(&mut self, handle: RawHandle, byte: u8) {
        if let Some(state) = self.state_mut(handle) {
            state.position = state.position.saturating_sub(1);
            state.pushback = Pushback {
                pending: true,
                position: state.position,
                byte,
            };
        }
    }

    /// Scratch buffer owned by the resource, for line-oriented read emulation
    pub fn line_buffer(&mut self, handle: RawHandle) -> Option<&mut Vec<u8>> {
        self.state_mut(handle)
            .map(|state| state.line_buffer.get_or_insert_with(Vec::new))
    }

    /// Corrupt `buf`, which holds the bytes at the resource's current position.
    ///
    /// Bytes already corrupted by an earlier overlapping call are skipped, and
    /// the memo is extended to cover `buf`. The position is not advanced.
    pub fn apply(&mut self, handle: RawHandle, buf: &mut [u8]) {
        let Some(&slot) = self.index.get(&handle) else {
            return;
        };
        let Some(state) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };
        if !state.active {
            return;
        }

        let already = state.fuzzed_ahead().min(buf.len());
        if already < buf.len() {
            let position = state.position.saturating_add(already as i64);
            fuzz::apply(&self.config, &mut state.fuzz, &mut buf[already..], position);
        }

        // Consumed by every call, restored even when the memo skipped the front
        std::mem::take(&mut state.pushback).restore(buf, state.position);
        state.mark_fuzzed(buf.len());
    }
}
