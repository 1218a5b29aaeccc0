#![forbid(unsafe_code)]

//! Forward-only XML writer producing UTF-8 bytes.
//!
//! Start tags are closed lazily: attributes may be appended until the first
//! child content arrives. Namespace declarations are deduplicated against
//! the enclosing scope so repeated `start_element` calls with the same
//! namespace do not re-declare it on every child.

use sigtuna_core::{Error, Result};
use std::collections::HashMap;

struct OpenElement {
    qname: String,
    /// Namespace bindings declared on this element (prefix → URI).
    ns_declared: HashMap<String, String>,
}

/// A forward-only XML writer over an in-memory buffer.
pub struct XmlWriter {
    buf: Vec<u8>,
    stack: Vec<OpenElement>,
    /// A start tag has been emitted but not yet closed with `>`.
    tag_open: bool,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            stack: Vec::new(),
            tag_open: false,
        }
    }

    /// Look up the in-scope binding for a prefix ("" = default namespace).
    fn in_scope(&self, prefix: &str) -> Option<&str> {
        self.stack
            .iter()
            .rev()
            .find_map(|e| e.ns_declared.get(prefix).map(|s| s.as_str()))
    }

    /// Start an element. When `ns_uri` is given, an `xmlns` declaration is
    /// emitted unless the same binding is already in scope.
    pub fn start_element(
        &mut self,
        prefix: Option<&str>,
        local: &str,
        ns_uri: Option<&str>,
    ) -> Result<()> {
        if local.is_empty() {
            return Err(Error::ArgumentNull("element local name"));
        }
        self.close_start_tag();

        let qname = match prefix {
            Some(p) if !p.is_empty() => format!("{p}:{local}"),
            _ => local.to_owned(),
        };
        self.buf.push(b'<');
        self.buf.extend_from_slice(qname.as_bytes());

        let mut declared = HashMap::new();
        if let Some(uri) = ns_uri {
            let pfx = prefix.unwrap_or("");
            if self.in_scope(pfx) != Some(uri) {
                if pfx.is_empty() {
                    self.buf.extend_from_slice(b" xmlns=\"");
                } else {
                    self.buf.extend_from_slice(b" xmlns:");
                    self.buf.extend_from_slice(pfx.as_bytes());
                    self.buf.extend_from_slice(b"=\"");
                }
                escape_attr_into(uri, &mut self.buf);
                self.buf.push(b'"');
                declared.insert(pfx.to_owned(), uri.to_owned());
            }
        }

        self.stack.push(OpenElement {
            qname,
            ns_declared: declared,
        });
        self.tag_open = true;
        Ok(())
    }

    /// Write an attribute on the currently open start tag.
    ///
    /// `xmlns` / `xmlns:prefix` attributes are tracked as namespace bindings
    /// so later `start_element` calls do not re-declare them.
    pub fn write_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::ArgumentNull("attribute name"));
        }
        if !self.tag_open {
            return Err(Error::InvalidOperation(format!(
                "attribute `{name}` written outside of a start tag"
            )));
        }
        self.buf.push(b' ');
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.extend_from_slice(b"=\"");
        escape_attr_into(value, &mut self.buf);
        self.buf.push(b'"');

        if let Some(rest) = name.strip_prefix("xmlns") {
            let prefix = rest.strip_prefix(':').unwrap_or("");
            if rest.is_empty() || !prefix.is_empty() {
                if let Some(top) = self.stack.last_mut() {
                    top.ns_declared.insert(prefix.to_owned(), value.to_owned());
                }
            }
        }
        Ok(())
    }

    /// Write escaped character data.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.close_start_tag();
        escape_text_into(text, &mut self.buf);
        Ok(())
    }

    /// End the current element. Elements with no content are emitted in the
    /// self-closing form.
    pub fn end_element(&mut self) -> Result<()> {
        let elem = self
            .stack
            .pop()
            .ok_or_else(|| Error::InvalidOperation("end_element with no open element".into()))?;
        if self.tag_open {
            self.buf.extend_from_slice(b"/>");
            self.tag_open = false;
        } else {
            self.buf.extend_from_slice(b"</");
            self.buf.extend_from_slice(elem.qname.as_bytes());
            self.buf.push(b'>');
        }
        Ok(())
    }

    /// Close a pending start tag, if any, without ending the element.
    pub fn close_start_tag(&mut self) {
        if self.tag_open {
            self.buf.push(b'>');
            self.tag_open = false;
        }
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Current length of the output buffer in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish writing and return the XML bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_text_into(s: &str, out: &mut Vec<u8>) {
    for ch in s.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            '\r' => out.extend_from_slice(b"&#xD;"),
            _ => {
                let mut b = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut b).as_bytes());
            }
        }
    }
}

fn escape_attr_into(s: &str, out: &mut Vec<u8>) {
    for ch in s.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '"' => out.extend_from_slice(b"&quot;"),
            '\t' => out.extend_from_slice(b"&#x9;"),
            '\n' => out.extend_from_slice(b"&#xA;"),
            '\r' => out.extend_from_slice(b"&#xD;"),
            _ => {
                let mut b = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut b).as_bytes());
            }
        }
    }
}
