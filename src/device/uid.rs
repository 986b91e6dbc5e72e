//! Base58 UID encoding.
//!
//! Humans see UIDs in Tinkerforge's Base58 alphabet (no `0`, `O`, `I` or
//! `l`); the wire carries them as `u32`.

use crate::error::{ProtocolError, Result};

const ALPHABET: &[u8; 58] = b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// Decode a Base58-printed UID into its wire representation.
pub fn uid_from_base58(s: &str) -> Result<u32> {
    if s.is_empty() {
        return Err(ProtocolError::InvalidUid("empty string".into()).into());
    }

    let mut value: u64 = 0;
    for c in s.chars() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a as char == c)
            .ok_or_else(|| ProtocolError::InvalidUid(format!("invalid character {c:?}")))?;

        value = value * 58 + digit as u64;
        if value > u64::from(u32::MAX) {
            return Err(ProtocolError::InvalidUid(format!("{s:?} overflows 32 bits")).into());
        }
    }

    Ok(value as u32)
}

/// Encode a wire UID in Base58.
pub fn uid_to_base58(mut uid: u32) -> String {
    if uid == 0 {
        return "1".to_string();
    }

    let mut digits = Vec::new();
    while uid > 0 {
        digits.push(ALPHABET[(uid % 58) as usize]);
        uid /= 58;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
