#![forbid(unsafe_code)]

//! Streaming writer that embeds an enveloped signature into a document
//! while it is being produced.
//!
//! The document is captured in an internal buffer as the caller writes it.
//! The `Signature` element is never part of that buffer; a placement
//! offset records where it will be spliced in. When the root element
//! closes, the captured document is canonicalized and digested once,
//! `SignedInfo` is built and signed, and the serialized signature is
//! spliced at the recorded offset before the finished bytes are flushed
//! to the underlying sink. Digesting the signature-free capture makes the
//! digest independent of where the signature is placed.

use crate::credentials::SigningCredentials;
use crate::model::{KeyInfo, Reference, Signature, SignedInfo, TransformKind};
use sigtuna_c14n::C14nMethod;
use sigtuna_core::{Error, Result};
use sigtuna_crypto::{CryptoProvider, SignatureProvider};
use sigtuna_xml::{NodeSet, XmlWriter};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// An element is freshly open; attributes may still be written.
    Attributes,
    /// Child content is legal at the current position.
    Content,
    /// The root element has ended; no structural writes accepted.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    NotRequested,
    /// `write_signature()` fixed the insertion point mid-document.
    EmittedExplicitly(usize),
    /// The signature goes in as the last child of the root.
    EmittedAtClose(usize),
}

impl Placement {
    fn offset(self) -> Option<usize> {
        match self {
            Self::NotRequested => None,
            Self::EmittedExplicitly(o) | Self::EmittedAtClose(o) => Some(o),
        }
    }
}

/// Forward-only XML writer that signs the document it produces.
pub struct EnvelopedSignatureWriter<W: Write> {
    out: W,
    capture: XmlWriter,
    credentials: SigningCredentials,
    provider: Box<dyn SignatureProvider>,
    phase: Phase,
    placement: Placement,
    /// At least one attribute has been written on the open start tag.
    attrs_written: bool,
    signature: Option<Signature>,
}

impl<W: Write> EnvelopedSignatureWriter<W> {
    pub fn new(out: W, credentials: SigningCredentials) -> Result<Self> {
        credentials.validate()?;
        Ok(Self {
            out,
            capture: XmlWriter::new(),
            credentials,
            provider: Box::new(CryptoProvider),
            phase: Phase::Content,
            placement: Placement::NotRequested,
            attrs_written: false,
            signature: None,
        })
    }

    /// Replace the default RustCrypto-backed provider.
    pub fn with_provider(mut self, provider: Box<dyn SignatureProvider>) -> Self {
        self.provider = provider;
        self
    }

    fn check_open(&self) -> Result<()> {
        if self.phase == Phase::Closed {
            return Err(Error::InvalidOperation(
                "document is closed; no further writes accepted".into(),
            ));
        }
        Ok(())
    }

    pub fn start_element(
        &mut self,
        prefix: Option<&str>,
        local: &str,
        ns_uri: Option<&str>,
    ) -> Result<()> {
        self.check_open()?;
        self.capture.start_element(prefix, local, ns_uri)?;
        self.phase = Phase::Attributes;
        self.attrs_written = false;
        Ok(())
    }

    pub fn write_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        self.check_open()?;
        self.capture.write_attribute(name, value)?;
        self.attrs_written = true;
        Ok(())
    }

    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.check_open()?;
        if self.capture.depth() == 0 {
            return Err(Error::InvalidOperation(
                "text outside of the document element".into(),
            ));
        }
        self.capture.write_text(text)?;
        self.phase = Phase::Content;
        Ok(())
    }

    pub fn end_element(&mut self) -> Result<()> {
        self.check_open()?;
        if self.capture.depth() == 1 {
            // Root is closing. Fix the implicit placement right before the
            // root end tag unless an explicit call already chose a spot.
            if self.placement == Placement::NotRequested {
                self.capture.close_start_tag();
                self.placement = Placement::EmittedAtClose(self.capture.len());
            }
            self.capture.end_element()?;
            let offset = self
                .placement
                .offset()
                .ok_or_else(|| Error::InvalidOperation("signature placement unresolved".into()))?;
            self.finalize(offset)?;
        } else {
            self.capture.end_element()?;
            self.phase = Phase::Content;
        }
        Ok(())
    }

    /// Request the `Signature` element at the current position.
    ///
    /// Legal only once per document and only at a content position. A call
    /// on a freshly opened start tag (no attribute or content written yet)
    /// fails; a call after the document closed is ignored.
    pub fn write_signature(&mut self) -> Result<()> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        if self.placement != Placement::NotRequested {
            return Ok(());
        }
        if self.capture.depth() == 0 {
            return Err(Error::InvalidOperation(
                "signature requested before the document element".into(),
            ));
        }
        if self.phase == Phase::Attributes && !self.attrs_written {
            return Err(Error::InvalidOperation(
                "signature requested while the current element's attribute list is open".into(),
            ));
        }
        self.capture.close_start_tag();
        self.placement = Placement::EmittedExplicitly(self.capture.len());
        self.phase = Phase::Content;
        Ok(())
    }

    /// The signature produced at document close.
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Give back the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn finalize(&mut self, offset: usize) -> Result<()> {
        let signature = self.build_signature()?;

        let mut sig_writer = XmlWriter::new();
        signature.write_to(&mut sig_writer)?;
        let sig_bytes = sig_writer.into_bytes();

        let mut buf = std::mem::take(&mut self.capture).into_bytes();
        buf.splice(offset..offset, sig_bytes);

        self.out.write_all(&buf)?;
        self.out.flush()?;

        tracing::debug!(
            document_len = buf.len(),
            offset,
            "enveloped signature emitted"
        );
        self.signature = Some(signature);
        self.phase = Phase::Closed;
        Ok(())
    }

    /// Digest the captured document, build `SignedInfo`, and sign its
    /// canonical form.
    fn build_signature(&self) -> Result<Signature> {
        let text = std::str::from_utf8(self.capture.as_bytes())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        let doc = roxmltree::Document::parse_with_options(text, sigtuna_xml::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))?;

        let (node_set, uri) = match &self.credentials.reference_id {
            None => (None, String::new()),
            Some(id) => {
                let target = doc
                    .descendants()
                    .find(|n| n.is_element() && n.attribute("Id") == Some(id.as_str()))
                    .ok_or_else(|| Error::InvalidUri(format!("#{id}")))?;
                (
                    Some(NodeSet::subtree_without_comments(target)),
                    format!("#{id}"),
                )
            }
        };

        let canonical = sigtuna_c14n::canonicalize(
            &doc,
            C14nMethod::Exclusive,
            node_set.as_ref(),
            &self.credentials.inclusive_prefixes,
        )?;
        let digest_value = self.credentials.digest_method.digest(&canonical);
        tracing::debug!(
            reference_uri = %uri,
            canonical_len = canonical.len(),
            "reference digest computed"
        );

        // The PrefixList travels on the reference transform only. Putting it
        // on CanonicalizationMethod would make the SignedInfo canonical form
        // depend on namespace bindings of whatever document the signature is
        // spliced into, which the standalone signing pass cannot see.
        let signed_info = SignedInfo {
            c14n_method: C14nMethod::Exclusive,
            inclusive_prefixes: Vec::new(),
            signature_method: self.credentials.signature_method,
            references: vec![Reference {
                uri: Some(uri),
                transforms: vec![
                    TransformKind::EnvelopedSignature,
                    TransformKind::ExclusiveC14n {
                        inclusive_prefixes: self.credentials.inclusive_prefixes.clone(),
                    },
                ],
                digest_method: self.credentials.digest_method,
                digest_value,
            }],
        };

        let mut si_writer = XmlWriter::new();
        signed_info.write_to(&mut si_writer)?;
        let si_bytes = si_writer.into_bytes();
        let si_text =
            std::str::from_utf8(&si_bytes).map_err(|e| Error::XmlParse(e.to_string()))?;
        let si_canonical = sigtuna_c14n::canonicalize_str(
            si_text,
            signed_info.c14n_method,
            None,
            &signed_info.inclusive_prefixes,
        )?;

        let signature_value =
            self.provider
                .sign(signed_info.signature_method, &self.credentials.key, &si_canonical)?;

        Ok(Signature {
            signed_info,
            signature_value,
            key_info: self
                .credentials
                .key_name
                .as_ref()
                .map(|name| KeyInfo {
                    key_name: Some(name.clone()),
                }),
        })
    }
}
