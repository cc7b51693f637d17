// form-iofuzz/src/config.rs
//! Process-wide corruption settings and the loaders that produce them

use crate::chars::CharacterSet;
use crate::constants::{self, env_vars, modes};
use crate::error::{FuzzError, Result};
use crate::ranges::RangeSet;
use crate::ratio;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// How a mask byte is combined with the original byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FuzzingMode {
    /// Toggle the mask bits
    #[default]
    Xor,
    /// Force the mask bits to one
    Set,
    /// Force the mask bits to zero
    Unset,
}

impl FuzzingMode {
    #[inline]
    pub fn apply(self, byte: u8, mask: u8) -> u8 {
        match self {
            Self::Xor => byte ^ mask,
            Self::Set => byte | mask,
            Self::Unset => byte & !mask,
        }
    }
}

impl FromStr for FuzzingMode {
    type Err = FuzzError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            modes::XOR => Ok(Self::Xor),
            modes::SET => Ok(Self::Set),
            modes::UNSET => Ok(Self::Unset),
            _ => Err(FuzzError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for FuzzingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Xor => modes::XOR,
            Self::Set => modes::SET,
            Self::Unset => modes::UNSET,
        };
        f.write_str(name)
    }
}

/// Immutable corruption settings shared by every watched resource
#[derive(Debug, Clone)]
pub struct Config {
    seed: u32,
    min_ratio: f64,
    max_ratio: f64,
    mode: FuzzingMode,
    auto_increment: bool,
    bytes: Option<RangeSet>,
    list: Option<RangeSet>,
    protect: CharacterSet,
    refuse: CharacterSet,
}

impl Default for Config {
    fn default() -> Self {
        Self::configure(
            constants::DEFAULT_SEED,
            constants::DEFAULT_RATIO,
            constants::DEFAULT_RATIO,
            FuzzingMode::default(),
            false,
            None,
            None,
            None,
            None,
        )
    }
}

impl Config {
    /// Build a configuration, parsing the optional range and character specs.
    ///
    /// Ratios are clamped into the supported band; an empty `bytes` or `list`
    /// spec is treated as absent.
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        seed: u32,
        min_ratio: f64,
        max_ratio: f64,
        mode: FuzzingMode,
        auto_increment: bool,
        bytes: Option<&str>,
        protect: Option<&str>,
        refuse: Option<&str>,
        list: Option<&str>,
    ) -> Self {
        let (min_ratio, max_ratio) = ratio::clamp_ratios(min_ratio, max_ratio);
        let bytes = parse_selection(env_vars::BYTES, bytes);
        let list = parse_selection(env_vars::LIST, list);

        let config = Self {
            seed,
            min_ratio,
            max_ratio,
            mode,
            auto_increment,
            bytes,
            list,
            protect: protect.map(CharacterSet::parse).unwrap_or_default(),
            refuse: refuse.map(CharacterSet::parse).unwrap_or_default(),
        };

        debug!(
            "Configured seed={} ratio=[{}, {}] mode={} autoinc={} bytes={:?} list={:?} protect={} refuse={}",
            config.seed,
            config.min_ratio,
            config.max_ratio,
            config.mode,
            config.auto_increment,
            config.bytes.as_ref().map(ToString::to_string),
            config.list.as_ref().map(ToString::to_string),
            config.protect.len(),
            config.refuse.len(),
        );

        config
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn min_ratio(&self) -> f64 {
        self.min_ratio
    }

    pub fn max_ratio(&self) -> f64 {
        self.max_ratio
    }

    pub fn mode(&self) -> FuzzingMode {
        self.mode
    }

    pub fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Byte offsets eligible for corruption; `None` means all of them
    pub fn bytes(&self) -> Option<&RangeSet> {
        self.bytes.as_ref()
    }

    /// Registration ordinals selected for corruption; `None` means all of them
    pub fn list(&self) -> Option<&RangeSet> {
        self.list.as_ref()
    }

    /// Whether byte offset `offset` may be corrupted
    pub fn selects_offset(&self, offset: i64) -> bool {
        selects(self.bytes.as_ref(), offset)
    }

    /// Whether the resource registered `ordinal`-th is corrupted
    pub fn selects_ordinal(&self, ordinal: i64) -> bool {
        selects(self.list.as_ref(), ordinal)
    }

    pub fn protect(&self) -> &CharacterSet {
        &self.protect
    }

    pub fn refuse(&self) -> &CharacterSet {
        &self.refuse
    }
}

/// Parse an optional selection spec; blank specs select everything
fn parse_selection(name: &str, spec: Option<&str>) -> Option<RangeSet> {
    let spec = spec.filter(|s| !s.trim().is_empty())?;
    let set = RangeSet::parse(spec);
    if set.is_empty() {
        warn!("{} has no usable entries ({:?}), nothing will be selected", name, spec);
    }
    Some(set)
}

/// A configured selection with no usable entries matches nothing
fn selects(set: Option<&RangeSet>, value: i64) -> bool {
    set.map_or(true, |set| !set.is_empty() && set.contains(value))
}

/// Raw, unparsed options as a host would collect them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzOptions {
    pub seed: u32,
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub mode: FuzzingMode,
    pub auto_increment: bool,
    pub bytes: Option<String>,
    pub protect: Option<String>,
    pub refuse: Option<String>,
    pub list: Option<String>,
}

impl Default for FuzzOptions {
    fn default() -> Self {
        Self {
            seed: constants::DEFAULT_SEED,
            min_ratio: constants::DEFAULT_RATIO,
            max_ratio: constants::DEFAULT_RATIO,
            mode: FuzzingMode::default(),
            auto_increment: false,
            bytes: None,
            protect: None,
            refuse: None,
            list: None,
        }
    }
}

impl FuzzOptions {
    /// Read options from the `FORM_IOFUZZ_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read options through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(value) = lookup(env_vars::SEED) {
            options.seed = parse_setting(env_vars::SEED, &value)?;
        }
        if let Some(value) = lookup(env_vars::MINRATIO) {
            options.min_ratio = parse_setting(env_vars::MINRATIO, &value)?;
        }
        if let Some(value) = lookup(env_vars::MAXRATIO) {
            options.max_ratio = parse_setting(env_vars::MAXRATIO, &value)?;
        }
        if let Some(value) = lookup(env_vars::FUZZING) {
            options.mode = value.parse()?;
        }
        if let Some(value) = lookup(env_vars::AUTOINC) {
            options.auto_increment = value != "0" && value != "false";
        }

        options.bytes = lookup(env_vars::BYTES);
        options.protect = lookup(env_vars::PROTECT);
        options.refuse = lookup(env_vars::REFUSE);
        options.list = lookup(env_vars::LIST);

        Ok(options)
    }

    /// Read options from a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn build(&self) -> Config {
        Config::configure(
            self.seed,
            self.min_ratio,
            self.max_ratio,
            self.mode,
            self.auto_increment,
            self.bytes.as_deref(),
            self.protect.as_deref(),
            self.refuse.as_deref(),
            self.list.as_deref(),
        )
    }
}

/// Parse a `ratio` or `min:max` ratio string
pub fn parse_ratio_range(spec: &str) -> Result<(f64, f64)> {
    match spec.split_once(':') {
        Some((min, max)) => Ok((parse_setting("ratio", min)?, parse_setting("ratio", max)?)),
        None => {
            let ratio = parse_setting("ratio", spec)?;
            Ok((ratio, ratio))
        }
    }
}

fn parse_setting<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| FuzzError::invalid(name, value))
}
