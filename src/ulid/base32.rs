//! Crockford base-32 codec for 128-bit values
//!
//! The alphabet is in ascending ASCII order, so comparing two encodings
//! byte-wise gives the same result as comparing the numbers.

use crate::error::{FormatViolation, InvalidIdentifierFormat};

/// Encoded length: ceil(128 / 5)
pub const ENCODED_LEN: usize = 26;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const INVALID: u8 = 0xFF;

/// Byte -> digit lookup. Lower-case letters decode like upper-case ones;
/// `I`, `L`, `O` and `U` are not part of the alphabet.
const DECODE: [u8; 256] = build_decode_table();

const fn build_decode_table() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        let upper = ALPHABET[i];
        table[upper as usize] = i as u8;
        table[upper.to_ascii_lowercase() as usize] = i as u8;
        i += 1;
    }
    table
}

/// Encode all 128 bits; the first character carries the top 3 bits.
pub fn encode(mut value: u128) -> [u8; ENCODED_LEN] {
    let mut out = [b'0'; ENCODED_LEN];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(value & 0x1F) as usize];
        value >>= 5;
    }
    out
}

pub fn decode(input: &str) -> Result<u128, InvalidIdentifierFormat> {
    let len = input.chars().count();
    if len != ENCODED_LEN {
        return Err(InvalidIdentifierFormat::new(FormatViolation::Length(len)));
    }

    let mut value: u128 = 0;
    for (index, ch) in input.chars().enumerate() {
        let digit = if ch.is_ascii() { DECODE[ch as usize] } else { INVALID };
        if digit == INVALID {
            return Err(InvalidIdentifierFormat::new(FormatViolation::Character {
                ch,
                index,
            }));
        }
        if index == 0 && digit > 7 {
            return Err(InvalidIdentifierFormat::new(FormatViolation::Overflow));
        }
        value = (value << 5) | u128::from(digit);
    }

    Ok(value)
}
