// form-iofuzz/src/ranges.rs
//! Compact range lists ("1-5,8,10-") and IP address lists

use log::warn;
use std::fmt;
use std::net::IpAddr;

/// A half-open interval `[start, end)`; `end == None` means unbounded above
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub end: Option<i64>,
}

impl Range {
    /// Interval holding exactly `value`
    pub fn unit(value: i64) -> Self {
        Self {
            start: value,
            end: value.checked_add(1),
        }
    }

    /// Inclusive interval `[start, last]`
    pub fn inclusive(start: i64, last: i64) -> Self {
        Self {
            start,
            end: last.checked_add(1),
        }
    }

    /// Interval covering every value from `start` upwards
    pub fn open_ended(start: i64) -> Self {
        Self { start, end: None }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.start && self.end.map_or(true, |end| value < end)
    }

    fn parse(token: &str) -> Option<Self> {
        if let Some(last) = token.strip_prefix('-') {
            // "-b" selects the single value b
            return last.trim().parse().ok().map(Self::unit);
        }

        match token.split_once('-') {
            Some((start, "")) => start.trim().parse().ok().map(Self::open_ended),
            Some((start, last)) => {
                let start = start.trim().parse().ok()?;
                let last = last.trim().parse().ok()?;
                Some(Self::inclusive(start, last))
            }
            None => token.parse().ok().map(Self::unit),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            None => write!(f, "{}-", self.start),
            Some(end) if end.checked_sub(1) == Some(self.start) => write!(f, "{}", self.start),
            Some(end) => write!(f, "{}-{}", self.start, end - 1),
        }
    }
}

/// Ordered list of ranges; an empty set matches every value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    /// Parse a comma-separated list of `n`, `a-b`, `a-` and `-b` entries.
    ///
    /// Entries that are not integers are skipped; the rest of the list is
    /// still honoured.
    pub fn parse(spec: &str) -> Self {
        let mut ranges = Vec::new();

        for token in spec.split(',').map(str::trim) {
            if token.is_empty() {
                continue;
            }
            match Range::parse(token) {
                Some(range) => ranges.push(range),
                None => warn!("Skipping malformed range entry: {:?}", token),
            }
        }

        Self { ranges }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(value))
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

/// Comma-separated list of IP addresses, used for network allow/deny lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostList {
    hosts: Vec<IpAddr>,
}

impl HostList {
    /// Parse IPv4/IPv6 literals, skipping anything that is not an address
    pub fn parse(spec: &str) -> Self {
        let mut hosts = Vec::new();

        for token in spec.split(',').map(str::trim) {
            if token.is_empty() {
                continue;
            }
            match token.parse::<IpAddr>() {
                Ok(addr) => hosts.push(addr),
                Err(_) => warn!("Skipping malformed host entry: {:?}", token),
            }
        }

        Self { hosts }
    }

    /// Unlike [`RangeSet`], an empty list contains nothing
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.hosts.contains(addr)
    }

    pub fn hosts(&self) -> &[IpAddr] {
        &self.hosts
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
