#![forbid(unsafe_code)]

//! Streaming reader that verifies an enveloped signature while the
//! document is being consumed.
//!
//! The reader advances over the document one event at a time. A `Signature`
//! element is parsed in full and its subtree is excluded from the content
//! that token readers see. Verification runs only when the root element
//! ends: the reference digest is recomputed over the document minus the
//! signature subtree, and the `SignedInfo` canonical form is checked
//! against `SignatureValue`. Claimed tokens and the parsed signature are
//! withheld until verification has succeeded.

use crate::model::Signature;
use sigtuna_c14n::C14nMethod;
use sigtuna_core::{ns, Error, Result};
use sigtuna_crypto::{CryptoProvider, SignatureProvider, SigningKey};
use sigtuna_xml::{EventCursor, NodeSet, XmlEventKind};

/// A security token claimed by a token reader during the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedToken {
    pub local_name: String,
    pub namespace: Option<String>,
    /// The token subtree in exclusive canonical form.
    pub canonical_xml: Vec<u8>,
}

/// Pluggable recognizer for embedded tokens. Readers are consulted in
/// registration order; the first claim wins and the claimed subtree is
/// skipped for later readers.
pub trait TokenReader {
    fn try_claim(&mut self, node: roxmltree::Node<'_, '_>) -> Option<ClaimedToken>;
}

/// Forward-only reader that verifies the document it consumes.
pub struct EnvelopedSignatureReader<'input> {
    doc: roxmltree::Document<'input>,
    cursor: EventCursor,
    key: SigningKey,
    provider: Box<dyn SignatureProvider>,
    token_readers: Vec<Box<dyn TokenReader>>,
    root_id: roxmltree::NodeId,
    signature: Option<Signature>,
    signature_node: Option<roxmltree::NodeId>,
    tokens: Vec<ClaimedToken>,
    verified: bool,
}

impl<'input> EnvelopedSignatureReader<'input> {
    pub fn new(xml: &'input str, key: SigningKey) -> Result<Self> {
        if xml.is_empty() {
            return Err(Error::ArgumentNull("xml input"));
        }
        if let SigningKey::Hmac(bytes) = &key {
            if bytes.is_empty() {
                return Err(Error::ArgumentNull("verification key"));
            }
        }
        let doc = roxmltree::Document::parse_with_options(xml, sigtuna_xml::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        let cursor = EventCursor::new(&doc);
        let root_id = doc.root_element().id();
        Ok(Self {
            doc,
            cursor,
            key,
            provider: Box::new(CryptoProvider),
            token_readers: Vec::new(),
            root_id,
            signature: None,
            signature_node: None,
            tokens: Vec::new(),
            verified: false,
        })
    }

    /// Replace the default RustCrypto-backed provider.
    pub fn with_provider(mut self, provider: Box<dyn SignatureProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Register a token reader; consulted in registration order.
    pub fn add_token_reader(&mut self, reader: Box<dyn TokenReader>) {
        self.token_readers.push(reader);
    }

    /// Advance one step. Returns `false` once the document is exhausted.
    /// Verification runs when the root element's end is consumed.
    pub fn read(&mut self) -> Result<bool> {
        let Some(ev) = self.cursor.peek() else {
            return Ok(false);
        };

        match ev.kind {
            XmlEventKind::ElementStart => {
                let node = self
                    .doc
                    .get_node(ev.node_id)
                    .ok_or_else(|| Error::XmlStructure("dangling node in event stream".into()))?;

                if node.tag_name().namespace() == Some(ns::DSIG)
                    && node.tag_name().name() == ns::node::SIGNATURE
                {
                    if self.signature.is_some() {
                        return Err(Error::XmlStructure(
                            "document contains more than one Signature element".into(),
                        ));
                    }
                    let signature = Signature::read_from(&self.doc, &mut self.cursor)?;
                    tracing::debug!(
                        references = signature.signed_info.references.len(),
                        "signature parsed"
                    );
                    self.signature = Some(signature);
                    self.signature_node = Some(ev.node_id);
                    return Ok(true);
                }

                if ev.node_id != self.root_id {
                    for reader in &mut self.token_readers {
                        if let Some(token) = reader.try_claim(node) {
                            tracing::debug!(token = %token.local_name, "token claimed");
                            self.tokens.push(token);
                            self.cursor.next_event();
                            self.cursor.skip_subtree(ev.node_id);
                            return Ok(true);
                        }
                    }
                }

                self.cursor.next_event();
                Ok(true)
            }
            XmlEventKind::ElementEnd if ev.node_id == self.root_id => {
                self.cursor.next_event();
                self.verify()?;
                self.verified = true;
                Ok(true)
            }
            _ => {
                self.cursor.next_event();
                Ok(true)
            }
        }
    }

    /// Consume the whole document, verifying at the root's end.
    pub fn read_to_end(&mut self) -> Result<()> {
        while self.read()? {}
        if !self.verified {
            return Err(Error::XmlStructure(
                "document ended before the root element closed".into(),
            ));
        }
        Ok(())
    }

    /// True once the signature has been verified.
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// The parsed signature; withheld until verification succeeds.
    pub fn signature(&self) -> Result<&Signature> {
        if !self.verified {
            return Err(Error::InvalidOperation(
                "signature not yet verified".into(),
            ));
        }
        self.signature
            .as_ref()
            .ok_or_else(|| Error::XmlStructure("document contains no Signature element".into()))
    }

    /// Tokens claimed during the pass; withheld until verification
    /// succeeds.
    pub fn tokens(&self) -> Result<&[ClaimedToken]> {
        if !self.verified {
            return Err(Error::InvalidOperation(
                "tokens withheld until the signature is verified".into(),
            ));
        }
        Ok(&self.tokens)
    }

    fn verify(&self) -> Result<()> {
        let signature = self.signature.as_ref().ok_or_else(|| {
            Error::XmlStructure("document contains no Signature element".into())
        })?;
        let signature_id = self.signature_node.ok_or_else(|| {
            Error::XmlStructure("document contains no Signature element".into())
        })?;
        let signature_node = self
            .doc
            .get_node(signature_id)
            .ok_or_else(|| Error::XmlStructure("dangling node in event stream".into()))?;

        for reference in &signature.signed_info.references {
            self.verify_reference(reference, signature_node)?;
        }

        let si_canonical = self.canonical_signed_info(signature, signature_node)?;
        let ok = self.provider.verify(
            signature.signed_info.signature_method,
            &self.key,
            &si_canonical,
            &signature.signature_value,
        )?;
        if !ok {
            return Err(Error::SignatureInvalid(
                "SignatureValue does not match the canonical SignedInfo".into(),
            ));
        }
        tracing::debug!("enveloped signature verified");
        Ok(())
    }

    fn verify_reference(
        &self,
        reference: &crate::model::Reference,
        signature_node: roxmltree::Node<'_, '_>,
    ) -> Result<()> {
        let uri = reference.uri_or_empty();

        let mut node_set = match uri.strip_prefix('#') {
            None if uri.is_empty() => NodeSet::all_without_comments(&self.doc),
            None => return Err(Error::InvalidUri(uri.to_owned())),
            Some(id) => {
                let target = self
                    .doc
                    .descendants()
                    .find(|n| n.is_element() && n.attribute("Id") == Some(id))
                    .ok_or_else(|| Error::InvalidUri(uri.to_owned()))?;
                NodeSet::subtree_without_comments(target)
            }
        };

        // The enveloped-signature transform is what excludes the signature
        // subtree; a same-document reference without it cannot verify
        // against a document that contains its own signature.
        if node_set.contains(signature_node) {
            if !reference.has_enveloped_transform() {
                return Err(Error::XmlStructure(
                    "reference covers its own Signature but lacks the enveloped-signature transform"
                        .into(),
                ));
            }
            node_set.remove_subtree(signature_node);
        }

        let mut method = C14nMethod::Exclusive;
        let mut prefixes: &[String] = &[];
        for transform in &reference.transforms {
            match transform {
                crate::model::TransformKind::EnvelopedSignature => {}
                crate::model::TransformKind::ExclusiveC14n { inclusive_prefixes } => {
                    method = C14nMethod::Exclusive;
                    prefixes = inclusive_prefixes;
                }
                crate::model::TransformKind::ExclusiveC14nWithComments {
                    inclusive_prefixes,
                } => {
                    method = C14nMethod::ExclusiveWithComments;
                    prefixes = inclusive_prefixes;
                }
            }
        }

        let canonical = sigtuna_c14n::canonicalize(&self.doc, method, Some(&node_set), prefixes)?;
        if !reference
            .digest_method
            .verify(&canonical, &reference.digest_value)
        {
            tracing::debug!(reference_uri = %uri, "reference digest mismatch");
            return Err(Error::DigestMismatch {
                uri: uri.to_owned(),
            });
        }
        Ok(())
    }

    fn canonical_signed_info(
        &self,
        signature: &Signature,
        signature_node: roxmltree::Node<'_, '_>,
    ) -> Result<Vec<u8>> {
        let signed_info_node = signature_node
            .children()
            .find(|c| {
                c.is_element()
                    && c.tag_name().namespace() == Some(ns::DSIG)
                    && c.tag_name().name() == ns::node::SIGNED_INFO
            })
            .ok_or_else(|| Error::XmlStructure("Signature is missing SignedInfo".into()))?;
        let node_set = NodeSet::subtree_without_comments(signed_info_node);
        sigtuna_c14n::canonicalize(
            &self.doc,
            signature.signed_info.c14n_method,
            Some(&node_set),
            &signature.signed_info.inclusive_prefixes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SigningCredentials;
    use crate::writer::EnvelopedSignatureWriter;
    use sigtuna_crypto::{DigestMethod, SignatureMethod};

    fn key() -> SigningKey {
        SigningKey::Hmac(b"0123456789abcdef".to_vec())
    }

    fn signed_document() -> String {
        let creds = SigningCredentials::new(
            key(),
            SignatureMethod::HmacSha256,
            DigestMethod::Sha256,
        );
        let mut w = EnvelopedSignatureWriter::new(Vec::new(), creds).unwrap();
        w.start_element(None, "Root", None).unwrap();
        w.write_attribute("attr", "v").unwrap();
        w.start_element(None, "Child", None).unwrap();
        w.write_text("payload").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn verifies_writer_output() {
        let xml = signed_document();
        let mut reader = EnvelopedSignatureReader::new(&xml, key()).unwrap();
        reader.read_to_end().unwrap();
        assert!(reader.is_verified());
        assert!(reader.tokens().unwrap().is_empty());
        let sig = reader.signature().unwrap();
        assert_eq!(sig.signed_info.references.len(), 1);
    }

    #[test]
    fn content_tamper_fails_with_digest_mismatch() {
        let xml = signed_document().replace("payload", "pAyload");
        let mut reader = EnvelopedSignatureReader::new(&xml, key()).unwrap();
        let err = reader.read_to_end().unwrap_err();
        assert!(matches!(err, Error::DigestMismatch { .. }));
    }

    #[test]
    fn signature_value_tamper_fails_verification() {
        let xml = signed_document();
        // flip one base64 character inside SignatureValue
        let start = xml.find("<SignatureValue>").unwrap() + "<SignatureValue>".len();
        let mut bytes = xml.into_bytes();
        bytes[start] = if bytes[start] == b'A' { b'B' } else { b'A' };
        let xml = String::from_utf8(bytes).unwrap();
        let mut reader = EnvelopedSignatureReader::new(&xml, key()).unwrap();
        let err = reader.read_to_end().unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid(_)));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let xml = signed_document();
        let mut reader =
            EnvelopedSignatureReader::new(&xml, SigningKey::Hmac(b"wrong-key-material".to_vec()))
                .unwrap();
        let err = reader.read_to_end().unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid(_)));
    }

    #[test]
    fn tokens_withheld_before_verification() {
        let xml = signed_document();
        let mut reader = EnvelopedSignatureReader::new(&xml, key()).unwrap();
        reader.read().unwrap();
        assert!(matches!(
            reader.tokens(),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            reader.signature(),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn missing_signature_is_an_error() {
        let xml = "<Root><Child/></Root>";
        let mut reader = EnvelopedSignatureReader::new(xml, key()).unwrap();
        let err = reader.read_to_end().unwrap_err();
        assert!(matches!(err, Error::XmlStructure(_)));
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(
            EnvelopedSignatureReader::new("", key()),
            Err(Error::ArgumentNull(_))
        ));
    }

    struct ChildClaimer;

    impl TokenReader for ChildClaimer {
        fn try_claim(&mut self, node: roxmltree::Node<'_, '_>) -> Option<ClaimedToken> {
            if node.tag_name().name() != "Child" {
                return None;
            }
            Some(ClaimedToken {
                local_name: "Child".to_owned(),
                namespace: node.tag_name().namespace().map(|n| n.to_owned()),
                canonical_xml: Vec::new(),
            })
        }
    }

    #[test]
    fn token_reader_claims_are_exposed_after_verification() {
        let xml = signed_document();
        let mut reader = EnvelopedSignatureReader::new(&xml, key()).unwrap();
        reader.add_token_reader(Box::new(ChildClaimer));
        reader.read_to_end().unwrap();
        let tokens = reader.tokens().unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].local_name, "Child");
    }

    #[test]
    fn every_signature_placement_verifies() {
        // 0 = implicit at close, 1..=3 = explicit at increasing depth
        for placement in 0..4u8 {
            let creds = SigningCredentials::new(
                key(),
                SignatureMethod::HmacSha256,
                DigestMethod::Sha256,
            );
            let mut w = EnvelopedSignatureWriter::new(Vec::new(), creds).unwrap();
            w.start_element(None, "Root", None).unwrap();
            w.write_attribute("attr", "v").unwrap();
            if placement == 1 {
                w.write_signature().unwrap();
            }
            w.start_element(None, "Outer", None).unwrap();
            w.write_text("a").unwrap();
            if placement == 2 {
                w.write_signature().unwrap();
            }
            w.start_element(None, "Inner", None).unwrap();
            w.write_text("b").unwrap();
            if placement == 3 {
                w.write_signature().unwrap();
            }
            w.end_element().unwrap();
            w.end_element().unwrap();
            w.end_element().unwrap();
            let digest = w.signature().unwrap().signed_info.references[0]
                .digest_value
                .clone();
            let xml = String::from_utf8(w.into_inner()).unwrap();

            let mut reader = EnvelopedSignatureReader::new(&xml, key()).unwrap();
            reader.read_to_end().unwrap();
            assert!(reader.is_verified(), "placement {placement} failed");
            assert_eq!(
                reader.signature().unwrap().signed_info.references[0].digest_value,
                digest
            );
        }
    }

    #[test]
    fn id_reference_round_trip() {
        let creds = SigningCredentials::new(
            key(),
            SignatureMethod::HmacSha256,
            DigestMethod::Sha256,
        )
        .with_reference_id("body");
        let mut w = EnvelopedSignatureWriter::new(Vec::new(), creds).unwrap();
        w.start_element(None, "Envelope", None).unwrap();
        w.start_element(None, "Body", None).unwrap();
        w.write_attribute("Id", "body").unwrap();
        w.write_text("contents").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        let xml = String::from_utf8(w.into_inner()).unwrap();
        assert!(xml.contains(r##"URI="#body""##));

        let mut reader = EnvelopedSignatureReader::new(&xml, key()).unwrap();
        reader.read_to_end().unwrap();
        assert!(reader.is_verified());
    }

    #[test]
    fn id_reference_tamper_outside_target_still_verifies() {
        // only the referenced subtree is covered by the digest
        let creds = SigningCredentials::new(
            key(),
            SignatureMethod::HmacSha256,
            DigestMethod::Sha256,
        )
        .with_reference_id("body");
        let mut w = EnvelopedSignatureWriter::new(Vec::new(), creds).unwrap();
        w.start_element(None, "Envelope", None).unwrap();
        w.start_element(None, "Header", None).unwrap();
        w.write_text("meta").unwrap();
        w.end_element().unwrap();
        w.start_element(None, "Body", None).unwrap();
        w.write_attribute("Id", "body").unwrap();
        w.write_text("contents").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        let xml = String::from_utf8(w.into_inner()).unwrap();

        let outside = xml.replace("meta", "mEta");
        let mut reader = EnvelopedSignatureReader::new(&outside, key()).unwrap();
        reader.read_to_end().unwrap();
        assert!(reader.is_verified());

        let inside = xml.replace("contents", "cOntents");
        let mut reader = EnvelopedSignatureReader::new(&inside, key()).unwrap();
        let err = reader.read_to_end().unwrap_err();
        assert!(matches!(err, Error::DigestMismatch { .. }));
    }

    #[test]
    fn round_trip_preserves_signed_info() {
        let creds = SigningCredentials::new(
            key(),
            SignatureMethod::HmacSha256,
            DigestMethod::Sha256,
        )
        .with_key_name("unit-key");
        let mut w = EnvelopedSignatureWriter::new(Vec::new(), creds).unwrap();
        w.start_element(None, "Root", None).unwrap();
        w.end_element().unwrap();
        let produced = w.signature().unwrap().clone();
        let xml = String::from_utf8(w.into_inner()).unwrap();

        let mut reader = EnvelopedSignatureReader::new(&xml, key()).unwrap();
        reader.read_to_end().unwrap();
        let parsed = reader.signature().unwrap();
        assert_eq!(*parsed, produced);
        assert_eq!(
            parsed.key_info.as_ref().unwrap().key_name.as_deref(),
            Some("unit-key")
        );
    }
}
