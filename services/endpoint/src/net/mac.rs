//! Link-layer (MAC) address parsing.

use std::fmt;
use std::str::FromStr;

/// A 48-bit link-layer address.
///
/// Parsing is case-insensitive and accepts `:`, `-` or `.` separators (or
/// none), so differently written forms of the same address compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut hex = String::with_capacity(12);
        for c in s.trim().chars() {
            match c {
                ':' | '-' | '.' => continue,
                c if c.is_ascii_hexdigit() => hex.push(c),
                other => return Err(MacParseError::InvalidChar(other)),
            }
        }
        if hex.len() != 12 {
            return Err(MacParseError::Length(hex.len()));
        }
        let mut out = [0u8; 6];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| MacParseError::InvalidChar('?'))?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacParseError {
    #[error("expected 12 hex digits, got {0}")]
    Length(usize),
    #[error("invalid character '{0}' in MAC address")]
    InvalidChar(char),
}
