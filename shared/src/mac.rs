//! Hardware addresses and SecureOn passwords
//!
//! Both are six bytes written as hex pairs. Accepted separators are `:` and
//! `-`; twelve bare hex digits are accepted too.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacParseError {
    #[error("expected 12 hex digits, got {0}")]
    BadLength(usize),

    #[error("invalid character {0:?}")]
    BadChar(char),
}

fn parse_six_bytes(s: &str) -> Result<[u8; 6], MacParseError> {
    let mut digits = [0u8; 12];
    let mut count = 0usize;

    for c in s.trim().chars() {
        if c == ':' || c == '-' {
            continue;
        }
        let nibble = c.to_digit(16).ok_or(MacParseError::BadChar(c))? as u8;
        if count < digits.len() {
            digits[count] = nibble;
        }
        count += 1;
    }

    if count != 12 {
        return Err(MacParseError::BadLength(count));
    }

    let mut out = [0u8; 6];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = (digits[i * 2] << 4) | digits[i * 2 + 1];
    }
    Ok(out)
}

/// A 48-bit hardware address
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_six_bytes(s).map(Self)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Password appended to a secured magic packet
///
/// Never printed: `Debug` is redacted so requests can be logged safely.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecureOnPassword([u8; 6]);

impl SecureOnPassword {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for SecureOnPassword {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_six_bytes(s).map(Self)
    }
}

impl fmt::Debug for SecureOnPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureOnPassword(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_separators() {
        let expected = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        for s in ["AA:BB:CC:DD:EE:FF", "aa-bb-cc-dd-ee-ff", "aabbccddeeff"] {
            let mac: MacAddress = s.parse().unwrap();
            assert_eq!(mac.octets(), expected, "{s}");
        }
    }

    #[test]
    fn test_display_is_upper_colon() {
        let mac: MacAddress = "11-22-33-44-55-6a".parse().unwrap();
        assert_eq!(mac.to_string(), "11:22:33:44:55:6A");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(
            "AA:BB:CC".parse::<MacAddress>(),
            Err(MacParseError::BadLength(6))
        );
        assert_eq!(
            "AA:BB:CC:DD:EE:FG".parse::<MacAddress>(),
            Err(MacParseError::BadChar('G'))
        );
        assert!("AA:BB:CC:DD:EE:FF:00".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let pw: SecureOnPassword = "01:02:03:04:05:06".parse().unwrap();
        assert_eq!(format!("{pw:?}"), "SecureOnPassword(***)");
        assert_eq!(pw.octets(), [1, 2, 3, 4, 5, 6]);
    }
}
