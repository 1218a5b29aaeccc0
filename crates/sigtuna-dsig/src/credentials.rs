#![forbid(unsafe_code)]

//! Signing credentials: the key material plus the algorithm choices the
//! writer bakes into `SignedInfo`.

use sigtuna_core::{Error, Result};
use sigtuna_crypto::{DigestMethod, SignatureMethod, SigningKey};

/// Everything the enveloped-signature writer needs to produce a signature.
#[derive(Debug, Clone)]
pub struct SigningCredentials {
    pub key: SigningKey,
    pub signature_method: SignatureMethod,
    pub digest_method: DigestMethod,
    /// When set, a `KeyInfo/KeyName` hint is emitted with the signature.
    pub key_name: Option<String>,
    /// When set, the reference targets the element carrying this `Id`
    /// attribute value instead of the whole document.
    pub reference_id: Option<String>,
    /// PrefixList carried on the reference's exclusive-C14N transform.
    pub inclusive_prefixes: Vec<String>,
}

impl SigningCredentials {
    pub fn new(
        key: SigningKey,
        signature_method: SignatureMethod,
        digest_method: DigestMethod,
    ) -> Self {
        Self {
            key,
            signature_method,
            digest_method,
            key_name: None,
            reference_id: None,
            inclusive_prefixes: Vec::new(),
        }
    }

    pub fn with_key_name(mut self, name: impl Into<String>) -> Self {
        self.key_name = Some(name.into());
        self
    }

    pub fn with_reference_id(mut self, id: impl Into<String>) -> Self {
        self.reference_id = Some(id.into());
        self
    }

    pub fn with_inclusive_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.inclusive_prefixes = prefixes;
        self
    }

    /// Reject credentials that cannot possibly sign.
    pub(crate) fn validate(&self) -> Result<()> {
        if let SigningKey::Hmac(bytes) = &self.key {
            if bytes.is_empty() {
                return Err(Error::ArgumentNull("signing key"));
            }
        }
        if matches!(&self.reference_id, Some(id) if id.is_empty()) {
            return Err(Error::ArgumentNull("reference id"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hmac_key_rejected() {
        let creds = SigningCredentials::new(
            SigningKey::Hmac(Vec::new()),
            SignatureMethod::HmacSha256,
            DigestMethod::Sha256,
        );
        assert!(matches!(
            creds.validate(),
            Err(Error::ArgumentNull("signing key"))
        ));
    }

    #[test]
    fn builder_sets_optional_fields() {
        let creds = SigningCredentials::new(
            SigningKey::Hmac(b"secret".to_vec()),
            SignatureMethod::HmacSha256,
            DigestMethod::Sha256,
        )
        .with_key_name("k1")
        .with_reference_id("body");
        assert_eq!(creds.key_name.as_deref(), Some("k1"));
        assert_eq!(creds.reference_id.as_deref(), Some("body"));
        assert!(creds.validate().is_ok());
    }
}
