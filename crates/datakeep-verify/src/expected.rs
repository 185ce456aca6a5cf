use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Result, VerificationError};

/// A digest announced alongside a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDigest(Vec<u8>);

impl ExpectedDigest {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self { Self(bytes.into()) }

    /// Parse a header value holding a digest of `len` bytes.
    ///
    /// `Content-MD5` is base64 per RFC 1864, but many servers send the hex
    /// form instead; both are accepted. A hex string of the right length
    /// can never be a valid base64 encoding of `len` bytes, so the two
    /// forms do not overlap.
    pub fn parse(value: &str, len: usize) -> Result<Self> {
        let value = value.trim();

        if value.len() == len * 2 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return hex::decode(value)
                .map(Self)
                .map_err(|_| VerificationError::InvalidDigest(value.to_string()));
        }

        match STANDARD.decode(value) {
            Ok(bytes) if bytes.len() == len => Ok(Self(bytes)),
            _ => Err(VerificationError::InvalidDigest(value.to_string())),
        }
    }

    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    pub fn verify(&self, actual: &[u8]) -> Result<()> {
        if self.0 == actual {
            Ok(())
        } else {
            Err(VerificationError::Mismatch {
                expected: self.0.clone(),
                actual:   actual.to_vec(),
            })
        }
    }
}
