//! Content addressing using BLAKE3.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Digest size in bytes (BLAKE3 produces 256-bit hashes).
pub const DIGEST_SIZE: usize = 32;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// BLAKE3 with 256-bit output.
    Blake3,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blake3 => "blake3-256",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blake3-256" => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }
}

/// A 32-byte BLAKE3 digest, the sole identity of a blob.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Create a Digest from raw bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }

    /// Create a Digest from a hex string (64 hex characters).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != DIGEST_SIZE * 2 {
            return Err(Error::invalid_digest(format!(
                "Expected {} hex characters, got {}",
                DIGEST_SIZE * 2,
                hex_str.len()
            )));
        }

        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::invalid_digest(format!("Invalid hex: {}", e)))?;

        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&bytes);
        Ok(Digest(digest))
    }

    /// Convert to hex string (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the first 2 hex characters (for directory sharding).
    pub fn prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Get the remaining 62 hex characters (for filename).
    pub fn suffix(&self) -> String {
        hex::encode(&self.0[1..])
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Hash raw bytes using BLAKE3.
    pub fn of(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Digest(*hash.as_bytes())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

// Digests travel through snapshot records as plain hex strings.

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let hex_str = String::deserialize(deserializer)?;
        Digest::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}
