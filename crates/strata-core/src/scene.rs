use crate::defs::{Definition, LinkSlot, LinkTarget};
use crate::node::{LinkState, NodeKind};
use crate::state::State;
use crate::types::NodeId;

/// A node of the drawable tree: variant data, declared state and
/// relationships.
#[derive(Debug, Clone)]
pub struct DrawableNode {
    pub kind: NodeKind,
    /// The state as declared on the element, before inheritance.
    pub state: State,
    /// Indices of child nodes, in document order.
    pub children: Vec<NodeId>,
    /// Index of parent node. Detached definitions (`defs`, `symbol`,
    /// `clipPath`, `mask`) keep their parent here but are not listed in
    /// the parent's children.
    pub parent: Option<NodeId>,
    pub id: Option<String>,
}

impl DrawableNode {
    pub fn new(kind: NodeKind, state: State) -> Self {
        Self {
            kind,
            state,
            children: Vec::new(),
            parent: None,
            id: None,
        }
    }
}

/// The Scene Graph data structure.
///
/// An arena of nodes. Parent links and references between nodes are
/// indices, so the arena alone owns every node and dropping it releases
/// the whole document.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    pub nodes: Vec<DrawableNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Adds a node to the arena and returns its ID.
    pub fn add_node(&mut self, node: DrawableNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        id
    }

    /// Establishes a parent-child relationship between two nodes.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(p_node) = self.nodes.get_mut(parent) {
            p_node.children.push(child);
        }
        self.set_parent(child, parent);
    }

    /// Records `parent` without listing `child` among its children.
    pub fn set_parent(&mut self, child: NodeId, parent: NodeId) {
        if let Some(c_node) = self.nodes.get_mut(child) {
            c_node.parent = Some(parent);
        }
    }

    pub fn get_node(&self, id: NodeId) -> Option<&DrawableNode> {
        self.nodes.get(id)
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut DrawableNode> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn kind_of(&self, id: NodeId) -> Option<&NodeKind> {
        self.get_node(id).map(|n| &n.kind)
    }
}

impl LinkTarget for SceneGraph {
    fn bind(&mut self, slot: LinkSlot, definition: &Definition) -> bool {
        match (slot, definition) {
            (LinkSlot::Use(owner), Definition::Node(target)) => {
                if let Some(NodeKind::Use(use_node)) = self.get_node_mut(owner).map(|n| &mut n.kind) {
                    use_node.link = LinkState::Resolved(*target);
                    return true;
                }
                false
            }
            (LinkSlot::Filter(owner), Definition::Filter(filter)) => match self.get_node_mut(owner) {
                Some(node) => {
                    node.state.filter = Some(filter.clone());
                    true
                }
                None => false,
            },
            (LinkSlot::ClipPath(owner), Definition::Node(target)) => {
                if !matches!(self.kind_of(*target), Some(NodeKind::ClipPath(_))) {
                    return false;
                }
                match self.get_node_mut(owner) {
                    Some(node) => {
                        node.state.clip_path = Some(*target);
                        true
                    }
                    None => false,
                }
            }
            (LinkSlot::Mask(owner), Definition::Node(target)) => {
                if !matches!(self.kind_of(*target), Some(NodeKind::Mask(_))) {
                    return false;
                }
                match self.get_node_mut(owner) {
                    Some(node) => {
                        node.state.mask = Some(*target);
                        true
                    }
                    None => false,
                }
            }
            _ => {
                self.mark_absent(slot);
                false
            }
        }
    }

    fn mark_absent(&mut self, slot: LinkSlot) {
        match slot {
            LinkSlot::Use(owner) => {
                if let Some(NodeKind::Use(use_node)) = self.get_node_mut(owner).map(|n| &mut n.kind) {
                    use_node.link = LinkState::Absent;
                }
            }
            LinkSlot::Filter(owner) => {
                if let Some(node) = self.get_node_mut(owner) {
                    node.state.filter = None;
                }
            }
            LinkSlot::ClipPath(owner) => {
                if let Some(node) = self.get_node_mut(owner) {
                    node.state.clip_path = None;
                }
            }
            LinkSlot::Mask(owner) => {
                if let Some(node) = self.get_node_mut(owner) {
                    node.state.mask = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ClipPathNode, UseNode};

    #[test]
    fn add_child_links_both_directions() {
        let mut scene = SceneGraph::new();
        let parent = scene.add_node(DrawableNode::new(NodeKind::Group, State::default()));
        let child = scene.add_node(DrawableNode::new(NodeKind::Group, State::default()));
        scene.add_child(parent, child);
        assert_eq!(scene.get_node(parent).map(|n| n.children.clone()), Some(vec![child]));
        assert_eq!(scene.get_node(child).and_then(|n| n.parent), Some(parent));
    }

    #[test]
    fn clip_path_slot_rejects_other_kinds() {
        let mut scene = SceneGraph::new();
        let owner = scene.add_node(DrawableNode::new(NodeKind::Group, State::default()));
        let group = scene.add_node(DrawableNode::new(NodeKind::Group, State::default()));
        let clip = scene.add_node(DrawableNode::new(
            NodeKind::ClipPath(ClipPathNode::default()),
            State::default(),
        ));
        assert!(!scene.bind(LinkSlot::ClipPath(owner), &Definition::Node(group)));
        assert!(scene.bind(LinkSlot::ClipPath(owner), &Definition::Node(clip)));
        assert_eq!(scene.get_node(owner).and_then(|n| n.state.clip_path), Some(clip));
    }

    #[test]
    fn use_slot_resolves_once() {
        let mut scene = SceneGraph::new();
        let owner = scene.add_node(DrawableNode::new(
            NodeKind::Use(UseNode::new("#x")),
            State::default(),
        ));
        scene.mark_absent(LinkSlot::Use(owner));
        match scene.get_node(owner).map(|n| &n.kind) {
            Some(NodeKind::Use(u)) => assert_eq!(u.link, LinkState::Absent),
            other => panic!("unexpected node {other:?}"),
        }
    }
}
