// form-iofuzz/src/chars.rs
//! Byte-value sets written as character classes ("\n\t a-z\x00")

use std::fmt;

/// 256-entry membership table indexed by byte value
#[derive(Clone, PartialEq, Eq)]
pub struct CharacterSet {
    table: [bool; 256],
}

impl Default for CharacterSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl CharacterSet {
    pub fn empty() -> Self {
        Self { table: [false; 256] }
    }

    /// Parse a character class.
    ///
    /// Supports literal bytes, `\n`, `\r`, `\t`, `\\`, three-digit octal
    /// (`\101`), two-digit hex (`\x41`, `\X41`) and `a-b` ranges between two
    /// parsed values. An inverted range (`z-a`) contributes its three values
    /// as plain members.
    pub fn parse(spec: &str) -> Self {
        Self::parse_bytes(spec.as_bytes())
    }

    pub fn parse_bytes(spec: &[u8]) -> Self {
        let mut set = Self::empty();
        // The two most recently parsed values that are not yet committed
        let mut prev: Option<u8> = None;
        let mut last: Option<u8> = None;
        let mut i = 0;

        while i < spec.len() {
            let (value, consumed) = decode(&spec[i..]);
            i += consumed;

            match (prev, last) {
                (Some(lo), Some(b'-')) if lo <= value => {
                    set.insert_range(lo, value);
                    prev = None;
                    last = None;
                }
                _ => {
                    if let Some(byte) = prev {
                        set.insert(byte);
                    }
                    prev = last;
                    last = Some(value);
                }
            }
        }

        if let Some(byte) = prev {
            set.insert(byte);
        }
        if let Some(byte) = last {
            set.insert(byte);
        }

        set
    }

    pub fn insert(&mut self, byte: u8) {
        self.table[usize::from(byte)] = true;
    }

    pub fn insert_range(&mut self, lo: u8, hi: u8) {
        for byte in lo..=hi {
            self.insert(byte);
        }
    }

    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.table[usize::from(byte)]
    }

    pub fn len(&self) -> usize {
        self.table.iter().filter(|&&set| set).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.table.iter().any(|&set| set)
    }

    /// Member byte values in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&byte| self.contains(byte))
    }
}

impl fmt::Debug for CharacterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Decode one (possibly escaped) value; returns it with the number of input
/// bytes consumed.
fn decode(input: &[u8]) -> (u8, usize) {
    match input {
        [b'\\'] => (b'\\', 1),
        [b'\\', b'n', ..] => (b'\n', 2),
        [b'\\', b'r', ..] => (b'\r', 2),
        [b'\\', b't', ..] => (b'\t', 2),
        [b'\\', a @ b'0'..=b'7', b @ b'0'..=b'7', c @ b'0'..=b'7', ..] => {
            // \777 wraps like the C octal escape would
            let value = (u32::from(a - b'0') << 6) | (u32::from(b - b'0') << 3) | u32::from(c - b'0');
            (value as u8, 4)
        }
        [b'\\', b'x' | b'X', hi, lo, ..] if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
            (hex_value(*hi) << 4 | hex_value(*lo), 4)
        }
        [b'\\', other, ..] => (*other, 2),
        [byte, ..] => (*byte, 1),
        [] => (0, 1),
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}
