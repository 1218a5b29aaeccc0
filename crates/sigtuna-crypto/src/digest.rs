#![forbid(unsafe_code)]

//! Digest (hash) methods.

use digest::Digest;
use sigtuna_core::{algorithm, Error, Result};
use subtle::ConstantTimeEq;

/// The digest method of a `Reference`, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestMethod {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestMethod {
    /// Get the algorithm URI for this method.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Sha1 => algorithm::SHA1,
            Self::Sha256 => algorithm::SHA256,
            Self::Sha384 => algorithm::SHA384,
            Self::Sha512 => algorithm::SHA512,
        }
    }

    /// Parse a method from an algorithm URI.
    pub fn from_uri(uri: &str) -> Result<Self> {
        match uri {
            algorithm::SHA1 => Ok(Self::Sha1),
            algorithm::SHA256 => Ok(Self::Sha256),
            algorithm::SHA384 => Ok(Self::Sha384),
            algorithm::SHA512 => Ok(Self::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(format!(
                "digest algorithm: {uri}"
            ))),
        }
    }

    /// The hash output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Compute the digest of `data` in one shot.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => sha1::Sha1::digest(data).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
            Self::Sha384 => sha2::Sha384::digest(data).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    /// Digest `data` and compare against `expected` in constant time.
    ///
    /// The comparison always covers the full hash output so an early
    /// mismatch does not leak its position through timing.
    pub fn verify(&self, data: &[u8], expected: &[u8]) -> bool {
        let actual = self.digest(data);
        if actual.len() != expected.len() {
            return false;
        }
        actual.ct_eq(expected).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_answer() {
        let result = DigestMethod::Sha256.digest(b"hello");
        assert_eq!(result.len(), 32);
        // Known SHA-256 of "hello"
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        let hex: String = result.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, expected);
    }

    #[test]
    fn output_lengths() {
        assert_eq!(DigestMethod::Sha1.digest(b"x").len(), 20);
        assert_eq!(DigestMethod::Sha384.digest(b"x").len(), 48);
        assert_eq!(DigestMethod::Sha512.digest(b"x").len(), 64);
    }

    #[test]
    fn verify_detects_mismatch() {
        let good = DigestMethod::Sha256.digest(b"payload");
        assert!(DigestMethod::Sha256.verify(b"payload", &good));
        assert!(!DigestMethod::Sha256.verify(b"tampered", &good));
        assert!(!DigestMethod::Sha256.verify(b"payload", &good[..31]));
    }

    #[test]
    fn unknown_uri_is_unsupported() {
        let err = DigestMethod::from_uri("urn:bogus").unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn uri_round_trip() {
        for m in [
            DigestMethod::Sha1,
            DigestMethod::Sha256,
            DigestMethod::Sha384,
            DigestMethod::Sha512,
        ] {
            assert_eq!(DigestMethod::from_uri(m.uri()).unwrap(), m);
            assert_eq!(m.output_len(), m.digest(b"").len());
        }
    }
}
