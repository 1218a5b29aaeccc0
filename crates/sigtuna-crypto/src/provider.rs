#![forbid(unsafe_code)]

//! Signature methods and the provider seam between the signature engine
//! and key material.

use sigtuna_core::{algorithm, Error, Result};
use signature::SignatureEncoding;

/// The signature method of a `SignedInfo`, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMethod {
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
    RsaSha1,
    RsaSha256,
    RsaSha384,
    RsaSha512,
}

impl SignatureMethod {
    /// Get the algorithm URI for this method.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::HmacSha1 => algorithm::HMAC_SHA1,
            Self::HmacSha256 => algorithm::HMAC_SHA256,
            Self::HmacSha384 => algorithm::HMAC_SHA384,
            Self::HmacSha512 => algorithm::HMAC_SHA512,
            Self::RsaSha1 => algorithm::RSA_SHA1,
            Self::RsaSha256 => algorithm::RSA_SHA256,
            Self::RsaSha384 => algorithm::RSA_SHA384,
            Self::RsaSha512 => algorithm::RSA_SHA512,
        }
    }

    /// Parse a method from an algorithm URI.
    pub fn from_uri(uri: &str) -> Result<Self> {
        match uri {
            algorithm::HMAC_SHA1 => Ok(Self::HmacSha1),
            algorithm::HMAC_SHA256 => Ok(Self::HmacSha256),
            algorithm::HMAC_SHA384 => Ok(Self::HmacSha384),
            algorithm::HMAC_SHA512 => Ok(Self::HmacSha512),
            algorithm::RSA_SHA1 => Ok(Self::RsaSha1),
            algorithm::RSA_SHA256 => Ok(Self::RsaSha256),
            algorithm::RSA_SHA384 => Ok(Self::RsaSha384),
            algorithm::RSA_SHA512 => Ok(Self::RsaSha512),
            _ => Err(Error::UnsupportedAlgorithm(format!(
                "signature algorithm: {uri}"
            ))),
        }
    }
}

/// Key material for signature operations.
#[derive(Clone)]
pub enum SigningKey {
    /// Shared secret for the HMAC methods.
    Hmac(Vec<u8>),
    /// RSA private key; signs and verifies.
    Rsa(Box<rsa::RsaPrivateKey>),
    /// RSA public key; verifies only.
    RsaPublic(Box<rsa::RsaPublicKey>),
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never appears in debug output.
        match self {
            Self::Hmac(_) => f.write_str("SigningKey::Hmac(..)"),
            Self::Rsa(_) => f.write_str("SigningKey::Rsa(..)"),
            Self::RsaPublic(_) => f.write_str("SigningKey::RsaPublic(..)"),
        }
    }
}

/// Seam between the signature engine and the cryptographic backend.
pub trait SignatureProvider {
    /// Sign `data` with `key` under `method`.
    fn sign(&self, method: SignatureMethod, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>>;

    /// Verify `signature` over `data`. `Ok(false)` is a well-formed
    /// mismatch; `Err` is a key or encoding problem.
    fn verify(
        &self,
        method: SignatureMethod,
        key: &SigningKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool>;
}

/// Default provider backed by the RustCrypto implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoProvider;

impl SignatureProvider for CryptoProvider {
    fn sign(&self, method: SignatureMethod, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>> {
        match method {
            SignatureMethod::HmacSha1
            | SignatureMethod::HmacSha256
            | SignatureMethod::HmacSha384
            | SignatureMethod::HmacSha512 => {
                let SigningKey::Hmac(key_bytes) = key else {
                    return Err(Error::Key("HMAC key required".into()));
                };
                compute_hmac(method, key_bytes, data)
            }
            SignatureMethod::RsaSha1
            | SignatureMethod::RsaSha256
            | SignatureMethod::RsaSha384
            | SignatureMethod::RsaSha512 => {
                let SigningKey::Rsa(private_key) = key else {
                    return Err(Error::Key("RSA private key required".into()));
                };
                rsa_sign(method, private_key, data)
            }
        }
    }

    fn verify(
        &self,
        method: SignatureMethod,
        key: &SigningKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        match method {
            SignatureMethod::HmacSha1
            | SignatureMethod::HmacSha256
            | SignatureMethod::HmacSha384
            | SignatureMethod::HmacSha512 => {
                let SigningKey::Hmac(key_bytes) = key else {
                    return Err(Error::Key("HMAC key required".into()));
                };
                let expected = compute_hmac(method, key_bytes, data)?;
                Ok(constant_time_eq(&expected, signature))
            }
            SignatureMethod::RsaSha1
            | SignatureMethod::RsaSha256
            | SignatureMethod::RsaSha384
            | SignatureMethod::RsaSha512 => {
                let public_key = match key {
                    SigningKey::Rsa(pk) => pk.to_public_key(),
                    SigningKey::RsaPublic(pk) => (**pk).clone(),
                    _ => return Err(Error::Key("RSA key required".into())),
                };
                rsa_verify(method, &public_key, data, signature)
            }
        }
    }
}

// ── HMAC ─────────────────────────────────────────────────────────────

fn compute_hmac(method: SignatureMethod, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    use hmac::{Hmac, Mac};
    macro_rules! hmac_compute {
        ($hasher:ty) => {{
            let mut mac = <Hmac<$hasher>>::new_from_slice(key)
                .map_err(|e| Error::Key(format!("HMAC key: {e}")))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }};
    }
    match method {
        SignatureMethod::HmacSha1 => hmac_compute!(sha1::Sha1),
        SignatureMethod::HmacSha256 => hmac_compute!(sha2::Sha256),
        SignatureMethod::HmacSha384 => hmac_compute!(sha2::Sha384),
        SignatureMethod::HmacSha512 => hmac_compute!(sha2::Sha512),
        _ => Err(Error::Key("HMAC method required".into())),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

// ── RSA PKCS#1 v1.5 ──────────────────────────────────────────────────

fn rsa_sign(
    method: SignatureMethod,
    private_key: &rsa::RsaPrivateKey,
    data: &[u8],
) -> Result<Vec<u8>> {
    use signature::Signer;
    macro_rules! do_sign {
        ($hasher:ty) => {{
            let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
            Ok(sk.sign(data).to_vec())
        }};
    }
    match method {
        SignatureMethod::RsaSha1 => do_sign!(sha1::Sha1),
        SignatureMethod::RsaSha256 => do_sign!(sha2::Sha256),
        SignatureMethod::RsaSha384 => do_sign!(sha2::Sha384),
        SignatureMethod::RsaSha512 => do_sign!(sha2::Sha512),
        _ => Err(Error::Key("RSA method required".into())),
    }
}

fn rsa_verify(
    method: SignatureMethod,
    public_key: &rsa::RsaPublicKey,
    data: &[u8],
    sig_bytes: &[u8],
) -> Result<bool> {
    use signature::Verifier;
    let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
        .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
    macro_rules! do_verify {
        ($hasher:ty) => {{
            let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
            Ok(vk.verify(data, &sig).is_ok())
        }};
    }
    match method {
        SignatureMethod::RsaSha1 => do_verify!(sha1::Sha1),
        SignatureMethod::RsaSha256 => do_verify!(sha2::Sha256),
        SignatureMethod::RsaSha384 => do_verify!(sha2::Sha384),
        SignatureMethod::RsaSha512 => do_verify!(sha2::Sha512),
        _ => Err(Error::Key("RSA method required".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use rsa::pkcs8::DecodePrivateKey;

    // Fixed 1024-bit test key (PKCS#8 DER, base64). Generated once so the
    // tests need no RNG; never use it outside this module.
    const TEST_RSA_PKCS8_B64: &str = concat!(
        "MIICdQIBADANBgkqhkiG9w0BAQEFAASCAl8wggJbAgEAAoGBAM3fJHktjnVyf8eS",
        "sEisjm+Hk5gYitqQbxyPxlQ/SMnCL7EFVqCqq0gxC4U06ye8nPPlusUMVARyH01S",
        "gpP1qD2+k0gMrILJozIoGSpZXnof2gmcIeZsQm9dlReJuIsJ7bfWejwgmrw/EkwU",
        "MmOf/eF+XV13DYR5Jzaco9TInHinAgMBAAECgYASlX4ZYj9l4rweK+O1672/26E7",
        "LZv7NuaQ0Xm5ySys6dacSDsVrdJgZe0ATVKc963DZo2BlCdRb2vb8wLOkHJrVttX",
        "EvGvTZFZvI0X1h4gR94lGTkWJMQAwjHrJqgzS9/7j8ZwIdPgxRz7OoF02l7rFV08",
        "7MBDC9YMD/GzUADJgQJBAPoVoMwNK0VMDk60f4uUJavD7g91utJto1nuFsIadhIN",
        "+IWOq3FxCJt3bsdl/uu/6e7T41VFhd7lfBB3Q23tJBcCQQDSvclAlu+yAgKInGKo",
        "1len6IsL+OBmVKT5Uv8GIYu0Zm+IOPC81ijzfyfAOEGTBMjQboyRBtW/xRu86L+r",
        "KtnxAkEA0+jxyRY7nUu2L/D4xuBxD1xF5CnBdb/blD+QX0em1uOpvBpJoiXCwmHw",
        "p9wAp+mGI46+aqovptFUUGuO4p34XwI/K6EfCUA2X6QK4j1+L3Ywr5J1NwVPb+AW",
        "R4fnRF2tjquma41eSboMwFyS3jjHWqii6oP4lg3UMt+b3oBRLh6xAkBi0fNX8fGj",
        "3Osr+PJpE+hreUoJIyM6gQsgK9Fo/o2ZC8Lts/V1AO9t3xBNxSMIhLnyAiQoYBAt",
        "9S4us6T/ubFD",
    );

    fn test_rsa_key() -> rsa::RsaPrivateKey {
        let der = STANDARD.decode(TEST_RSA_PKCS8_B64).unwrap();
        rsa::RsaPrivateKey::from_pkcs8_der(&der).unwrap()
    }

    #[test]
    fn rsa_sign_and_verify() {
        let provider = CryptoProvider;
        let private = test_rsa_key();
        let public = private.to_public_key();
        let key = SigningKey::Rsa(Box::new(private));

        let sig = provider
            .sign(SignatureMethod::RsaSha256, &key, b"signed info")
            .unwrap();
        assert_eq!(sig.len(), 128);
        assert!(provider
            .verify(SignatureMethod::RsaSha256, &key, b"signed info", &sig)
            .unwrap());

        // Verification needs only the public half.
        let verify_key = SigningKey::RsaPublic(Box::new(public));
        assert!(provider
            .verify(SignatureMethod::RsaSha256, &verify_key, b"signed info", &sig)
            .unwrap());
        assert!(!provider
            .verify(SignatureMethod::RsaSha256, &verify_key, b"tampered", &sig)
            .unwrap());
    }

    #[test]
    fn rsa_verify_rejects_flipped_signature_byte() {
        let provider = CryptoProvider;
        let key = SigningKey::Rsa(Box::new(test_rsa_key()));
        let mut sig = provider
            .sign(SignatureMethod::RsaSha256, &key, b"data")
            .unwrap();
        sig[0] ^= 0x01;
        assert!(!provider
            .verify(SignatureMethod::RsaSha256, &key, b"data", &sig)
            .unwrap());
    }

    #[test]
    fn rsa_public_key_cannot_sign() {
        let provider = CryptoProvider;
        let key = SigningKey::RsaPublic(Box::new(test_rsa_key().to_public_key()));
        let err = provider
            .sign(SignatureMethod::RsaSha256, &key, b"data")
            .unwrap_err();
        assert!(matches!(err, Error::Key(_)));
    }

    #[test]
    fn hmac_sign_and_verify() {
        let provider = CryptoProvider;
        let key = SigningKey::Hmac(b"0123456789abcdef".to_vec());
        let sig = provider
            .sign(SignatureMethod::HmacSha256, &key, b"signed info")
            .unwrap();
        assert_eq!(sig.len(), 32);
        assert!(provider
            .verify(SignatureMethod::HmacSha256, &key, b"signed info", &sig)
            .unwrap());
        assert!(!provider
            .verify(SignatureMethod::HmacSha256, &key, b"tampered", &sig)
            .unwrap());
    }

    #[test]
    fn hmac_verify_rejects_wrong_key() {
        let provider = CryptoProvider;
        let key = SigningKey::Hmac(b"0123456789abcdef".to_vec());
        let other = SigningKey::Hmac(b"fedcba9876543210".to_vec());
        let sig = provider
            .sign(SignatureMethod::HmacSha256, &key, b"data")
            .unwrap();
        assert!(!provider
            .verify(SignatureMethod::HmacSha256, &other, b"data", &sig)
            .unwrap());
    }

    #[test]
    fn key_mismatch_is_an_error() {
        let provider = CryptoProvider;
        let key = SigningKey::Hmac(b"secret".to_vec());
        let err = provider
            .sign(SignatureMethod::RsaSha256, &key, b"data")
            .unwrap_err();
        assert!(matches!(err, Error::Key(_)));
    }

    #[test]
    fn method_uri_round_trip() {
        for m in [
            SignatureMethod::HmacSha1,
            SignatureMethod::HmacSha256,
            SignatureMethod::HmacSha384,
            SignatureMethod::HmacSha512,
            SignatureMethod::RsaSha1,
            SignatureMethod::RsaSha256,
            SignatureMethod::RsaSha384,
            SignatureMethod::RsaSha512,
        ] {
            assert_eq!(SignatureMethod::from_uri(m.uri()).unwrap(), m);
        }
        assert!(matches!(
            SignatureMethod::from_uri("urn:bogus"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
