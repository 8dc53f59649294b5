//! Sortable unique identifiers (ULID)
//!
//! A [`Ulid`] is 128 bits: a 48-bit Unix timestamp in milliseconds in the
//! high bits and 80 random bits below it. Its canonical text form is 26
//! characters of Crockford base-32, which sorts exactly like the numbers.
//!
//! ```text
//!  01ARZ3NDEK   TSV4RRFFQ69G5FAV
//!  |--------|   |--------------|
//!  timestamp       randomness
//!   48 bits         80 bits
//! ```
//!
//! Generation touches only the clock and a thread-local CSPRNG, so it is safe
//! to call from any thread without coordination.

pub mod base32;
mod persistence;

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::InvalidIdentifierFormat;

pub use base32::ENCODED_LEN;

const RANDOM_BITS: u32 = 80;
const RANDOM_MASK: u128 = (1 << RANDOM_BITS) - 1;

/// Largest timestamp representable in 48 bits
pub const MAX_TIMESTAMP_MS: u64 = (1 << 48) - 1;

/// Universally unique lexicographically sortable identifier
///
/// `Ord` compares the underlying integer, which is the same order as the
/// encoded strings.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ulid(u128);

impl Ulid {
    /// Generate a fresh identifier from the current wall clock
    pub fn generate() -> Self {
        Self::from_parts(current_millis(), rand::thread_rng().gen::<u128>())
    }

    /// Build an identifier from a timestamp and random payload.
    ///
    /// Bits outside 48 (timestamp) and 80 (random) are discarded.
    pub fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        let timestamp = u128::from(timestamp_ms & MAX_TIMESTAMP_MS);
        Self((timestamp << RANDOM_BITS) | (random & RANDOM_MASK))
    }

    pub const fn nil() -> Self {
        Self(0)
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn to_u128(self) -> u128 {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == 0
    }

    /// Milliseconds since the Unix epoch
    pub fn timestamp_ms(&self) -> u64 {
        (self.0 >> RANDOM_BITS) as u64
    }

    pub fn random(&self) -> u128 {
        self.0 & RANDOM_MASK
    }

    /// Creation time as a UTC datetime
    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms() as i64)
            .single()
            .unwrap_or_default()
    }

    /// Canonical 26-character representation
    pub fn encode(&self) -> String {
        let bytes = base32::encode(self.0);
        // The alphabet is pure ASCII
        bytes.iter().map(|&b| b as char).collect()
    }

    pub fn decode(input: &str) -> Result<Self, InvalidIdentifierFormat> {
        base32::decode(input).map(Self)
    }
}

/// Generate a fresh identifier
pub fn generate() -> Ulid {
    Ulid::generate()
}

pub fn encode(id: &Ulid) -> String {
    id.encode()
}

pub fn decode(input: &str) -> Result<Ulid, InvalidIdentifierFormat> {
    Ulid::decode(input)
}

/// Order two identifiers without decoding them
pub fn compare(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_ascii_uppercase().cmp(&b.to_ascii_uppercase())
}

/// Current time as Unix milliseconds
///
/// A clock set before 1970 is an unrecoverable environment fault.
fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is set before the Unix epoch")
        .as_millis() as u64
}

impl fmt::Display for Ulid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for Ulid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ulid({})", self.encode())
    }
}

impl FromStr for Ulid {
    type Err = InvalidIdentifierFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl TryFrom<&str> for Ulid {
    type Error = InvalidIdentifierFormat;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::decode(value)
    }
}

impl From<Ulid> for u128 {
    fn from(id: Ulid) -> Self {
        id.0
    }
}

impl From<u128> for Ulid {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl Serialize for Ulid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Ulid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::decode(&text).map_err(de::Error::custom)
    }
}
