#![forbid(unsafe_code)]

//! Pull-style event cursor over a parsed document.
//!
//! Flattens the tree into a forward-only sequence of start/text/comment/end
//! events identified by `NodeId`, which lets callers hold a position across
//! mutable-borrow boundaries without tying themselves to node lifetimes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEventKind {
    ElementStart,
    Text,
    Comment,
    ElementEnd,
}

#[derive(Debug, Clone, Copy)]
pub struct XmlEvent {
    pub kind: XmlEventKind,
    pub node_id: roxmltree::NodeId,
}

/// Forward-only cursor over the document's node events.
pub struct EventCursor {
    events: Vec<XmlEvent>,
    pos: usize,
}

impl EventCursor {
    /// Build the event sequence for a parsed document.
    pub fn new(doc: &roxmltree::Document<'_>) -> Self {
        let mut events = Vec::new();
        for child in doc.root().children() {
            collect(child, &mut events);
        }
        Self { events, pos: 0 }
    }

    /// The next event without consuming it.
    pub fn peek(&self) -> Option<XmlEvent> {
        self.events.get(self.pos).copied()
    }

    /// Consume and return the next event.
    pub fn next_event(&mut self) -> Option<XmlEvent> {
        let ev = self.events.get(self.pos).copied();
        if ev.is_some() {
            self.pos += 1;
        }
        ev
    }

    /// Index of the next event; used as the position in diagnostics.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Advance past the `ElementEnd` matching the given start node.
    ///
    /// The corresponding `ElementStart` may or may not have been consumed
    /// already; node identity disambiguates.
    pub fn skip_subtree(&mut self, start: roxmltree::NodeId) {
        while let Some(ev) = self.next_event() {
            if ev.kind == XmlEventKind::ElementEnd && ev.node_id == start {
                return;
            }
        }
    }

    /// True once every event has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.events.len()
    }
}

fn collect(node: roxmltree::Node<'_, '_>, events: &mut Vec<XmlEvent>) {
    match node.node_type() {
        roxmltree::NodeType::Element => {
            events.push(XmlEvent {
                kind: XmlEventKind::ElementStart,
                node_id: node.id(),
            });
            for child in node.children() {
                collect(child, events);
            }
            events.push(XmlEvent {
                kind: XmlEventKind::ElementEnd,
                node_id: node.id(),
            });
        }
        roxmltree::NodeType::Text => {
            events.push(XmlEvent {
                kind: XmlEventKind::Text,
                node_id: node.id(),
            });
        }
        roxmltree::NodeType::Comment => {
            events.push(XmlEvent {
                kind: XmlEventKind::Comment,
                node_id: node.id(),
            });
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_order() {
        let doc = roxmltree::Document::parse("<a><b>t</b><c/></a>").unwrap();
        let mut cur = EventCursor::new(&doc);
        let kinds: Vec<XmlEventKind> =
            std::iter::from_fn(|| cur.next_event().map(|e| e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                XmlEventKind::ElementStart, // a
                XmlEventKind::ElementStart, // b
                XmlEventKind::Text,
                XmlEventKind::ElementEnd, // b
                XmlEventKind::ElementStart, // c
                XmlEventKind::ElementEnd, // c
                XmlEventKind::ElementEnd, // a
            ]
        );
    }

    #[test]
    fn skip_subtree_lands_after_matching_end() {
        let doc = roxmltree::Document::parse("<a><b><x/><y/></b><c/></a>").unwrap();
        let mut cur = EventCursor::new(&doc);
        cur.next_event(); // <a>
        let b = cur.next_event().unwrap(); // <b>
        cur.skip_subtree(b.node_id);
        let next = cur.next_event().unwrap();
        assert_eq!(next.kind, XmlEventKind::ElementStart);
        let node = doc.get_node(next.node_id).unwrap();
        assert_eq!(node.tag_name().name(), "c");
    }
}
