//! Definition registry and deferred reference resolution.
//!
//! Ids are registered as elements are built; references to ids that have
//! not been seen yet are queued and bound by a single [`Defs::finalize`]
//! pass once the whole document exists.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::filters::FilterDefinition;
use crate::types::NodeId;

/// What an id can name.
#[derive(Debug, Clone)]
pub enum Definition {
    Node(NodeId),
    Filter(Rc<FilterDefinition>),
}

impl Definition {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Definition::Node(id) => Some(*id),
            Definition::Filter(_) => None,
        }
    }
}

/// A place that holds a reference, identified by the node that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkSlot {
    /// Target of an indirection (`use`).
    Use(NodeId),
    Filter(NodeId),
    ClipPath(NodeId),
    Mask(NodeId),
}

/// Storage that link slots live in.
pub trait LinkTarget {
    /// Writes `definition` into `slot`. Returns `false` when the definition
    /// has the wrong kind for the slot, leaving the slot empty.
    fn bind(&mut self, slot: LinkSlot, definition: &Definition) -> bool;

    /// Marks `slot` as permanently unresolved.
    fn mark_absent(&mut self, slot: LinkSlot);
}

/// Extracts the id from `#id`, `url(#id)` or a bare `id`.
pub fn parse_reference(reference: &str) -> Option<&str> {
    let mut s = reference.trim();
    if let Some(inner) = s.strip_prefix("url(").and_then(|r| r.strip_suffix(')')) {
        s = inner.trim().trim_matches(|c| c == '"' || c == '\'');
    }
    let id = s.strip_prefix('#').unwrap_or(s);
    (!id.is_empty() && !id.contains(char::is_whitespace)).then_some(id)
}

#[derive(Debug, Default)]
pub struct Defs {
    entries: HashMap<String, Definition>,
    pending: Vec<(LinkSlot, String)>,
    finalized: bool,
}

impl Defs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `definition` under `id`. A later registration of the same
    /// id replaces the earlier one.
    pub fn register(&mut self, id: &str, definition: Definition) {
        if self.entries.insert(id.to_string(), definition).is_some() {
            debug!(id, "duplicate id, keeping the latest definition");
        }
    }

    /// Looks up a reference in any of the accepted syntaxes.
    pub fn lookup(&self, reference: &str) -> Option<&Definition> {
        parse_reference(reference).and_then(|id| self.entries.get(id))
    }

    /// Binds `slot` now if `reference` is already registered, otherwise
    /// queues it for [`Defs::finalize`].
    pub fn request_link<T: LinkTarget>(&mut self, slot: LinkSlot, reference: &str, target: &mut T) {
        let Some(id) = parse_reference(reference) else {
            warn!(reference, "malformed reference");
            target.mark_absent(slot);
            return;
        };
        match self.entries.get(id) {
            Some(definition) => {
                if !target.bind(slot, definition) {
                    warn!(id, ?slot, "reference names a definition of the wrong kind");
                }
            }
            None if self.finalized => {
                warn!(id, ?slot, "unresolved reference");
                target.mark_absent(slot);
            }
            None => self.pending.push((slot, id.to_string())),
        }
    }

    /// Resolves every queued link. Links still unresolved become
    /// permanently absent. Later calls are no-ops.
    pub fn finalize<T: LinkTarget>(&mut self, target: &mut T) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        for (slot, id) in std::mem::take(&mut self.pending) {
            match self.entries.get(&id) {
                Some(definition) => {
                    if !target.bind(slot, definition) {
                        warn!(id, ?slot, "reference names a definition of the wrong kind");
                    }
                }
                None => {
                    warn!(id, ?slot, "unresolved reference");
                    target.mark_absent(slot);
                }
            }
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Slots {
        bound: HashMap<LinkSlot, NodeId>,
        absent: Vec<LinkSlot>,
    }

    impl LinkTarget for Slots {
        fn bind(&mut self, slot: LinkSlot, definition: &Definition) -> bool {
            match definition.node() {
                Some(node) => {
                    self.bound.insert(slot, node);
                    true
                }
                None => false,
            }
        }

        fn mark_absent(&mut self, slot: LinkSlot) {
            self.absent.push(slot);
        }
    }

    #[test]
    fn reference_syntaxes() {
        assert_eq!(parse_reference("#a"), Some("a"));
        assert_eq!(parse_reference("url(#blur)"), Some("blur"));
        assert_eq!(parse_reference("url( '#q' )"), Some("q"));
        assert_eq!(parse_reference("plain"), Some("plain"));
        assert_eq!(parse_reference("#"), None);
        assert_eq!(parse_reference(""), None);
    }

    #[test]
    fn forward_reference_binds_on_finalize() {
        let mut defs = Defs::new();
        let mut slots = Slots::default();
        defs.request_link(LinkSlot::Use(0), "#later", &mut slots);
        assert!(slots.bound.is_empty());
        assert_eq!(defs.pending_len(), 1);

        defs.register("later", Definition::Node(7));
        defs.finalize(&mut slots);
        assert_eq!(slots.bound.get(&LinkSlot::Use(0)), Some(&7));
        assert_eq!(defs.pending_len(), 0);
    }

    #[test]
    fn registration_order_does_not_change_result() {
        let mut early = (Defs::new(), Slots::default());
        early.0.register("t", Definition::Node(2));
        early.0.request_link(LinkSlot::Use(1), "#t", &mut early.1);
        early.0.finalize(&mut early.1);

        let mut late = (Defs::new(), Slots::default());
        late.0.request_link(LinkSlot::Use(1), "#t", &mut late.1);
        late.0.register("t", Definition::Node(2));
        late.0.finalize(&mut late.1);

        assert_eq!(early.1.bound, late.1.bound);
    }

    #[test]
    fn missing_target_becomes_absent_once() {
        let mut defs = Defs::new();
        let mut slots = Slots::default();
        defs.request_link(LinkSlot::Mask(3), "url(#nowhere)", &mut slots);
        defs.finalize(&mut slots);
        defs.finalize(&mut slots);
        assert_eq!(slots.absent, vec![LinkSlot::Mask(3)]);

        defs.register("nowhere", Definition::Node(9));
        assert!(slots.bound.is_empty(), "finalized links never rebind");
    }

    #[test]
    fn last_registration_wins() {
        let mut defs = Defs::new();
        defs.register("dup", Definition::Node(1));
        defs.register("dup", Definition::Node(2));
        assert_eq!(defs.lookup("#dup").and_then(Definition::node), Some(2));
        assert_eq!(defs.len(), 1);
    }
}
