#![forbid(unsafe_code)]

//! The XML Signature data model: `Signature`, `SignedInfo`, `Reference`,
//! transforms and `KeyInfo`, with strict-order parsing from an event
//! cursor and serialization to an `XmlWriter`.
//!
//! Parsing enforces the element sequence the schema mandates:
//! `SignedInfo` must open with `CanonicalizationMethod`, then
//! `SignatureMethod`, then one or more `Reference` elements; each
//! `Reference` holds optional `Transforms`, then `DigestMethod`, then
//! `DigestValue`. Anything out of place fails with a structured
//! [`Error::XmlRead`] carrying the expected name and what was found.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sigtuna_c14n::C14nMethod;
use sigtuna_core::{algorithm, ns, Error, Result};
use sigtuna_crypto::{DigestMethod, SignatureMethod};
use sigtuna_xml::{EventCursor, XmlEventKind, XmlWriter};

/// A `Transform` inside a `Reference`, a closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformKind {
    /// `http://www.w3.org/2000/09/xmldsig#enveloped-signature`
    EnvelopedSignature,
    /// Exclusive C14N with an optional InclusiveNamespaces PrefixList.
    ExclusiveC14n { inclusive_prefixes: Vec<String> },
    /// Exclusive C14N with comments.
    ExclusiveC14nWithComments { inclusive_prefixes: Vec<String> },
}

impl TransformKind {
    pub fn uri(&self) -> &'static str {
        match self {
            Self::EnvelopedSignature => algorithm::ENVELOPED_SIGNATURE,
            Self::ExclusiveC14n { .. } => algorithm::EXC_C14N,
            Self::ExclusiveC14nWithComments { .. } => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }
}

/// A `Reference`: what was digested and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The `URI` attribute. `Some("")` means the whole enveloping
    /// document; `Some("#id")` a same-document subtree; `None` when the
    /// attribute was absent (treated like the whole document).
    pub uri: Option<String>,
    pub transforms: Vec<TransformKind>,
    pub digest_method: DigestMethod,
    pub digest_value: Vec<u8>,
}

impl Reference {
    /// True when the transform chain contains the enveloped-signature
    /// transform.
    pub fn has_enveloped_transform(&self) -> bool {
        self.transforms
            .iter()
            .any(|t| matches!(t, TransformKind::EnvelopedSignature))
    }

    /// The URI for diagnostics; absent is reported as empty.
    pub fn uri_or_empty(&self) -> &str {
        self.uri.as_deref().unwrap_or("")
    }
}

/// The signed portion of a signature: algorithms plus references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInfo {
    pub c14n_method: C14nMethod,
    /// PrefixList of the InclusiveNamespaces parameter on
    /// `CanonicalizationMethod`, applied when canonicalizing `SignedInfo`
    /// itself.
    pub inclusive_prefixes: Vec<String>,
    pub signature_method: SignatureMethod,
    /// Digest order is wire order.
    pub references: Vec<Reference>,
}

/// Key-identifying material carried alongside the signature. Consumed by
/// the caller's key resolution, never by digest computation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyInfo {
    pub key_name: Option<String>,
}

/// A complete `Signature` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub signed_info: SignedInfo,
    pub signature_value: Vec<u8>,
    pub key_info: Option<KeyInfo>,
}

// ── Parsing ──────────────────────────────────────────────────────────

impl Signature {
    /// Parse a `Signature` element. The cursor must be positioned at its
    /// start event; on success the whole subtree has been consumed.
    pub fn read_from(doc: &roxmltree::Document<'_>, cursor: &mut EventCursor) -> Result<Self> {
        let signature = expect_start(doc, cursor, ns::node::SIGNATURE)?;

        let signed_info = SignedInfo::read_from(doc, cursor)?;

        let value_elem = expect_start(doc, cursor, ns::node::SIGNATURE_VALUE)?;
        let value_text = read_text_content(doc, cursor, value_elem)?;
        let signature_value = decode_base64(&value_text)?;
        if signature_value.is_empty() {
            return Err(Error::XmlStructure("SignatureValue is empty".into()));
        }

        let key_info = match peek_start(doc, cursor)? {
            Some(node)
                if node.tag_name().namespace() == Some(ns::DSIG)
                    && node.tag_name().name() == ns::node::KEY_INFO =>
            {
                cursor.next_event();
                let key_name = node
                    .children()
                    .find(|c| {
                        c.is_element()
                            && c.tag_name().namespace() == Some(ns::DSIG)
                            && c.tag_name().name() == ns::node::KEY_NAME
                    })
                    .and_then(|c| c.text())
                    .map(|t| t.to_owned());
                cursor.skip_subtree(node.id());
                Some(KeyInfo { key_name })
            }
            _ => None,
        };

        expect_end(doc, cursor, signature)?;

        Ok(Self {
            signed_info,
            signature_value,
            key_info,
        })
    }
}

impl SignedInfo {
    /// Parse a `SignedInfo` element with strict child ordering.
    pub fn read_from(doc: &roxmltree::Document<'_>, cursor: &mut EventCursor) -> Result<Self> {
        let signed_info = expect_start(doc, cursor, ns::node::SIGNED_INFO)?;

        let c14n_elem = expect_start(doc, cursor, ns::node::CANONICALIZATION_METHOD)?;
        let c14n_uri = require_algorithm(c14n_elem)?;
        let c14n_method = C14nMethod::from_uri(c14n_uri).ok_or_else(|| {
            Error::UnsupportedAlgorithm(format!("canonicalization algorithm: {c14n_uri}"))
        })?;
        let inclusive_prefixes = read_inclusive_prefixes(c14n_elem);
        cursor.skip_subtree(c14n_elem.id());

        let method_elem = expect_start(doc, cursor, ns::node::SIGNATURE_METHOD)?;
        let signature_method = SignatureMethod::from_uri(require_algorithm(method_elem)?)?;
        cursor.skip_subtree(method_elem.id());

        let mut references = vec![Reference::read_from(doc, cursor)?];
        while let Some(node) = peek_start(doc, cursor)? {
            if node.tag_name().namespace() == Some(ns::DSIG)
                && node.tag_name().name() == ns::node::REFERENCE
            {
                references.push(Reference::read_from(doc, cursor)?);
            } else {
                break;
            }
        }

        expect_end(doc, cursor, signed_info)?;

        Ok(Self {
            c14n_method,
            inclusive_prefixes,
            signature_method,
            references,
        })
    }
}

impl Reference {
    /// Parse a `Reference` element with strict child ordering.
    pub fn read_from(doc: &roxmltree::Document<'_>, cursor: &mut EventCursor) -> Result<Self> {
        let reference = expect_start(doc, cursor, ns::node::REFERENCE)?;
        let uri = reference.attribute(ns::attr::URI).map(|u| u.to_owned());

        let mut transforms = Vec::new();
        if let Some(node) = peek_start(doc, cursor)? {
            if node.tag_name().namespace() == Some(ns::DSIG)
                && node.tag_name().name() == ns::node::TRANSFORMS
            {
                cursor.next_event();
                let first = expect_start(doc, cursor, ns::node::TRANSFORM)?;
                transforms.push(read_transform(cursor, first)?);
                while let Some(next) = peek_start(doc, cursor)? {
                    if next.tag_name().namespace() == Some(ns::DSIG)
                        && next.tag_name().name() == ns::node::TRANSFORM
                    {
                        cursor.next_event();
                        transforms.push(read_transform(cursor, next)?);
                    } else {
                        break;
                    }
                }
                expect_end(doc, cursor, node)?;
            }
        }

        let digest_elem = expect_start(doc, cursor, ns::node::DIGEST_METHOD)?;
        let digest_method = DigestMethod::from_uri(require_algorithm(digest_elem)?)?;
        cursor.skip_subtree(digest_elem.id());

        let value_elem = expect_start(doc, cursor, ns::node::DIGEST_VALUE)?;
        let value_text = read_text_content(doc, cursor, value_elem)?;
        let digest_value = decode_base64(&value_text)?;
        if digest_value.len() != digest_method.output_len() {
            return Err(Error::XmlStructure(format!(
                "DigestValue is {} bytes, digest algorithm produces {}",
                digest_value.len(),
                digest_method.output_len()
            )));
        }

        expect_end(doc, cursor, reference)?;

        Ok(Self {
            uri,
            transforms,
            digest_method,
            digest_value,
        })
    }
}

fn read_transform(
    cursor: &mut EventCursor,
    node: roxmltree::Node<'_, '_>,
) -> Result<TransformKind> {
    let uri = require_algorithm(node)?;
    let kind = match uri {
        algorithm::ENVELOPED_SIGNATURE => TransformKind::EnvelopedSignature,
        algorithm::EXC_C14N => TransformKind::ExclusiveC14n {
            inclusive_prefixes: read_inclusive_prefixes(node),
        },
        algorithm::EXC_C14N_WITH_COMMENTS => TransformKind::ExclusiveC14nWithComments {
            inclusive_prefixes: read_inclusive_prefixes(node),
        },
        other => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "transform algorithm: {other}"
            )))
        }
    };
    cursor.skip_subtree(node.id());
    Ok(kind)
}

/// Read the PrefixList from an `InclusiveNamespaces` child, if present.
fn read_inclusive_prefixes(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    node.children()
        .find(|c| {
            c.is_element()
                && c.tag_name().namespace() == Some(ns::EXC_C14N)
                && c.tag_name().name() == ns::node::INCLUSIVE_NAMESPACES
        })
        .and_then(|c| c.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(|p| p.to_owned()).collect())
        .unwrap_or_default()
}

fn require_algorithm<'a>(node: roxmltree::Node<'a, '_>) -> Result<&'a str> {
    node.attribute(ns::attr::ALGORITHM).ok_or_else(|| {
        Error::XmlStructure(format!(
            "{} is missing the Algorithm attribute",
            node.tag_name().name()
        ))
    })
}

// ── Cursor helpers ───────────────────────────────────────────────────

/// Consume ignorable events (whitespace text, comments) until the next
/// structural event.
fn skip_ignorable(doc: &roxmltree::Document<'_>, cursor: &mut EventCursor) {
    while let Some(ev) = cursor.peek() {
        match ev.kind {
            XmlEventKind::Comment => {
                cursor.next_event();
            }
            XmlEventKind::Text => {
                let ws = doc
                    .get_node(ev.node_id)
                    .and_then(|n| n.text())
                    .is_some_and(|t| t.trim().is_empty());
                if ws {
                    cursor.next_event();
                } else {
                    return;
                }
            }
            _ => return,
        }
    }
}

/// Consume the next structural event, requiring the start of the named
/// dsig element.
fn expect_start<'a, 'i>(
    doc: &'a roxmltree::Document<'i>,
    cursor: &mut EventCursor,
    expected: &str,
) -> Result<roxmltree::Node<'a, 'i>> {
    skip_ignorable(doc, cursor);
    let position = cursor.position();
    match cursor.next_event() {
        Some(ev) if ev.kind == XmlEventKind::ElementStart => {
            let node = node_of(doc, ev.node_id)?;
            if node.tag_name().namespace() == Some(ns::DSIG)
                && node.tag_name().name() == expected
            {
                Ok(node)
            } else {
                Err(Error::XmlRead {
                    expected_ns: ns::DSIG.to_owned(),
                    expected: expected.to_owned(),
                    found: describe_element(node),
                    position,
                })
            }
        }
        Some(ev) => Err(Error::XmlRead {
            expected_ns: ns::DSIG.to_owned(),
            expected: expected.to_owned(),
            found: describe_event(doc, ev.kind, ev.node_id),
            position,
        }),
        None => Err(Error::XmlRead {
            expected_ns: ns::DSIG.to_owned(),
            expected: expected.to_owned(),
            found: "end of document".to_owned(),
            position,
        }),
    }
}

/// Peek the next structural event; `Some` when it starts an element.
fn peek_start<'a, 'i>(
    doc: &'a roxmltree::Document<'i>,
    cursor: &mut EventCursor,
) -> Result<Option<roxmltree::Node<'a, 'i>>> {
    skip_ignorable(doc, cursor);
    match cursor.peek() {
        Some(ev) if ev.kind == XmlEventKind::ElementStart => Ok(Some(node_of(doc, ev.node_id)?)),
        _ => Ok(None),
    }
}

/// Consume the end event of `elem`, rejecting trailing content.
fn expect_end(
    doc: &roxmltree::Document<'_>,
    cursor: &mut EventCursor,
    elem: roxmltree::Node<'_, '_>,
) -> Result<()> {
    skip_ignorable(doc, cursor);
    let position = cursor.position();
    match cursor.next_event() {
        Some(ev) if ev.kind == XmlEventKind::ElementEnd && ev.node_id == elem.id() => Ok(()),
        Some(ev) => Err(Error::XmlRead {
            expected_ns: ns::DSIG.to_owned(),
            expected: format!("end of {}", elem.tag_name().name()),
            found: describe_event(doc, ev.kind, ev.node_id),
            position,
        }),
        None => Err(Error::XmlRead {
            expected_ns: ns::DSIG.to_owned(),
            expected: format!("end of {}", elem.tag_name().name()),
            found: "end of document".to_owned(),
            position,
        }),
    }
}

/// Collect the text content of `elem`, consuming through its end event.
/// Child elements are structural errors.
fn read_text_content(
    doc: &roxmltree::Document<'_>,
    cursor: &mut EventCursor,
    elem: roxmltree::Node<'_, '_>,
) -> Result<String> {
    let mut text = String::new();
    loop {
        match cursor.next_event() {
            Some(ev) if ev.kind == XmlEventKind::ElementEnd && ev.node_id == elem.id() => {
                return Ok(text);
            }
            Some(ev) if ev.kind == XmlEventKind::Text => {
                if let Some(t) = node_of(doc, ev.node_id)?.text() {
                    text.push_str(t);
                }
            }
            Some(ev) if ev.kind == XmlEventKind::Comment => {}
            Some(ev) => {
                return Err(Error::XmlStructure(format!(
                    "unexpected {} inside {}",
                    describe_event(doc, ev.kind, ev.node_id),
                    elem.tag_name().name()
                )));
            }
            None => {
                return Err(Error::XmlStructure(format!(
                    "unterminated {}",
                    elem.tag_name().name()
                )));
            }
        }
    }
}

fn node_of<'a, 'i>(
    doc: &'a roxmltree::Document<'i>,
    id: roxmltree::NodeId,
) -> Result<roxmltree::Node<'a, 'i>> {
    doc.get_node(id)
        .ok_or_else(|| Error::XmlStructure("dangling node in event stream".into()))
}

fn describe_element(node: roxmltree::Node<'_, '_>) -> String {
    match node.tag_name().namespace() {
        Some(uri) => format!("{{{uri}}}{}", node.tag_name().name()),
        None => node.tag_name().name().to_owned(),
    }
}

fn describe_event(
    doc: &roxmltree::Document<'_>,
    kind: XmlEventKind,
    id: roxmltree::NodeId,
) -> String {
    match kind {
        XmlEventKind::ElementStart => doc
            .get_node(id)
            .map(describe_element)
            .unwrap_or_else(|| "element".to_owned()),
        XmlEventKind::ElementEnd => "end of element".to_owned(),
        XmlEventKind::Text => "text".to_owned(),
        XmlEventKind::Comment => "comment".to_owned(),
    }
}

// ── Base64 ───────────────────────────────────────────────────────────

pub(crate) fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|e| Error::Base64(e.to_string()))
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

// ── Serialization ────────────────────────────────────────────────────

impl Signature {
    pub fn write_to(&self, w: &mut XmlWriter) -> Result<()> {
        w.start_element(None, ns::node::SIGNATURE, Some(ns::DSIG))?;
        self.signed_info.write_to(w)?;

        w.start_element(None, ns::node::SIGNATURE_VALUE, Some(ns::DSIG))?;
        w.write_text(&encode_base64(&self.signature_value))?;
        w.end_element()?;

        if let Some(key_info) = &self.key_info {
            w.start_element(None, ns::node::KEY_INFO, Some(ns::DSIG))?;
            if let Some(name) = &key_info.key_name {
                w.start_element(None, ns::node::KEY_NAME, Some(ns::DSIG))?;
                w.write_text(name)?;
                w.end_element()?;
            }
            w.end_element()?;
        }

        w.end_element()?;
        Ok(())
    }
}

impl SignedInfo {
    pub fn write_to(&self, w: &mut XmlWriter) -> Result<()> {
        w.start_element(None, ns::node::SIGNED_INFO, Some(ns::DSIG))?;

        w.start_element(None, ns::node::CANONICALIZATION_METHOD, Some(ns::DSIG))?;
        w.write_attribute(ns::attr::ALGORITHM, self.c14n_method.uri())?;
        write_inclusive_namespaces(w, &self.inclusive_prefixes)?;
        w.end_element()?;

        w.start_element(None, ns::node::SIGNATURE_METHOD, Some(ns::DSIG))?;
        w.write_attribute(ns::attr::ALGORITHM, self.signature_method.uri())?;
        w.end_element()?;

        for reference in &self.references {
            reference.write_to(w)?;
        }

        w.end_element()?;
        Ok(())
    }
}

impl Reference {
    pub fn write_to(&self, w: &mut XmlWriter) -> Result<()> {
        w.start_element(None, ns::node::REFERENCE, Some(ns::DSIG))?;
        if let Some(uri) = &self.uri {
            w.write_attribute(ns::attr::URI, uri)?;
        }

        if !self.transforms.is_empty() {
            w.start_element(None, ns::node::TRANSFORMS, Some(ns::DSIG))?;
            for transform in &self.transforms {
                w.start_element(None, ns::node::TRANSFORM, Some(ns::DSIG))?;
                w.write_attribute(ns::attr::ALGORITHM, transform.uri())?;
                match transform {
                    TransformKind::ExclusiveC14n { inclusive_prefixes }
                    | TransformKind::ExclusiveC14nWithComments { inclusive_prefixes } => {
                        write_inclusive_namespaces(w, inclusive_prefixes)?;
                    }
                    TransformKind::EnvelopedSignature => {}
                }
                w.end_element()?;
            }
            w.end_element()?;
        }

        w.start_element(None, ns::node::DIGEST_METHOD, Some(ns::DSIG))?;
        w.write_attribute(ns::attr::ALGORITHM, self.digest_method.uri())?;
        w.end_element()?;

        w.start_element(None, ns::node::DIGEST_VALUE, Some(ns::DSIG))?;
        w.write_text(&encode_base64(&self.digest_value))?;
        w.end_element()?;

        w.end_element()?;
        Ok(())
    }
}

fn write_inclusive_namespaces(w: &mut XmlWriter, prefixes: &[String]) -> Result<()> {
    if prefixes.is_empty() {
        return Ok(());
    }
    w.start_element(
        Some(ns::EXC_C14N_PREFIX),
        ns::node::INCLUSIVE_NAMESPACES,
        Some(ns::EXC_C14N),
    )?;
    w.write_attribute(ns::attr::PREFIX_LIST, &prefixes.join(" "))?;
    w.end_element()?;
    Ok(())
}
