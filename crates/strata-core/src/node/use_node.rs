use crate::defs::{Definition, Defs};
use crate::types::NodeId;
use crate::units::Length;

/// Resolution state of an indirection's target. Moves out of `Unresolved`
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Unresolved,
    Resolved(NodeId),
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseNode {
    pub href: String,
    pub link: LinkState,
    pub x: Length,
    pub y: Length,
    /// `None` fills the ambient viewport.
    pub width: Option<Length>,
    pub height: Option<Length>,
}

impl UseNode {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            link: LinkState::Unresolved,
            x: Length::ZERO,
            y: Length::ZERO,
            width: None,
            height: None,
        }
    }

    /// Target node, looking the reference up read-only if the link was
    /// never finalized.
    pub fn target(&self, defs: &Defs) -> Option<NodeId> {
        match self.link {
            LinkState::Resolved(id) => Some(id),
            LinkState::Absent => None,
            LinkState::Unresolved => defs.lookup(&self.href).and_then(Definition::node),
        }
    }

    /// An explicit zero width or height disables rendering.
    pub fn is_zero_sized(&self) -> bool {
        let zero = |l: &Option<Length>| l.map(|l| l.value == 0.0).unwrap_or(false);
        zero(&self.width) || zero(&self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_link_falls_back_to_lookup() {
        let mut defs = Defs::new();
        defs.register("t", Definition::Node(4));
        let node = UseNode::new("#t");
        assert_eq!(node.target(&defs), Some(4));

        let absent = UseNode {
            link: LinkState::Absent,
            ..UseNode::new("#t")
        };
        assert_eq!(absent.target(&defs), None);
    }

    #[test]
    fn zero_size_detection() {
        let mut node = UseNode::new("#t");
        assert!(!node.is_zero_sized());
        node.height = Some(Length::px(0.0));
        assert!(node.is_zero_sized());
    }
}
