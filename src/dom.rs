//! Arena-backed document tree used for rendering and annotation.

use crate::tree::{NodeTree, TreeMut, closest};

/// Handle to a node slot. A released slot is handed out again under a new generation,
/// so handles kept from before the release stop resolving instead of aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// What a stale handle reads as: an empty, detached text node.
static VACANT: NodeData = NodeData {
    kind: NodeKind::Text(String::new()),
    parent: None,
    children: Vec::new(),
};

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<NodeData>,
}

/// A mutable element/text tree. Clearing children, replacing a node and discarding a
/// parse holder release the removed subtrees, so re-rendering the same regions reuses
/// slots instead of growing the arena.
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<usize>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        doc.root = doc.create_element("body");
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Live nodes, attached or not.
    pub fn node_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether `node` still refers to a live node of this document.
    pub fn contains(&self, node: NodeId) -> bool {
        self.slot(node).is_some()
    }

    fn slot(&self, id: NodeId) -> Option<&NodeData> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node(&self, id: NodeId) -> &NodeData {
        self.slot(id).unwrap_or(&VACANT)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let node = NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Detaches `node` and frees it together with its whole subtree. The root is never
    /// released.
    pub fn release(&mut self, node: NodeId) {
        if node == self.root || !self.contains(node) {
            return;
        }
        self.detach(node);
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            let Some(slot) = self.slots.get_mut(current.index) else {
                continue;
            };
            if slot.generation != current.generation {
                continue;
            }
            if let Some(data) = slot.node.take() {
                pending.extend(data.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
            }
        }
    }

    /// Appends `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if parent == child
            || !self.contains(parent)
            || !self.contains(child)
            || self.is_inclusive_ancestor(child, parent)
        {
            return;
        }
        self.detach(child);
        if let Some(data) = self.node_mut(child) {
            data.parent = Some(parent);
        }
        if let Some(data) = self.node_mut(parent) {
            data.children.push(child);
        }
    }

    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.node_mut(node).and_then(|data| data.parent.take()) else {
            return;
        };
        if let Some(data) = self.node_mut(parent) {
            data.children.retain(|&c| c != node);
        }
    }

    /// Removes and releases every child of `node`.
    pub fn clear_children(&mut self, node: NodeId) {
        let Some(data) = self.node_mut(node) else {
            return;
        };
        let children = std::mem::take(&mut data.children);
        for child in children {
            if let Some(data) = self.node_mut(child) {
                data.parent = None;
            }
            self.release(child);
        }
    }

    /// Puts `replacements` where `node` was and releases `node`.
    pub fn replace_with(&mut self, node: NodeId, replacements: &[NodeId]) {
        let Some(parent) = self.slot(node).and_then(|data| data.parent) else {
            return;
        };
        let replacements: Vec<NodeId> = replacements
            .iter()
            .copied()
            .filter(|&r| r != node && self.contains(r) && !self.is_inclusive_ancestor(r, parent))
            .collect();
        for &replacement in &replacements {
            self.detach(replacement);
            if let Some(data) = self.node_mut(replacement) {
                data.parent = Some(parent);
            }
        }
        if let Some(data) = self.node_mut(parent) {
            if let Some(index) = data.children.iter().position(|&c| c == node) {
                data.children.splice(index..=index, replacements);
            }
        }
        if let Some(data) = self.node_mut(node) {
            data.parent = None;
        }
        self.release(node);
    }

    /// Replaces all children with a single text node (none for an empty string). A
    /// lone text child is updated in place.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) {
        let Some(data) = self.node_mut(node) else {
            return;
        };
        if let NodeKind::Text(existing) = &mut data.kind {
            existing.clear();
            existing.push_str(text);
            return;
        }
        let only_child = match data.children.as_slice() {
            [only] if !text.is_empty() => Some(*only),
            _ => None,
        };
        if let Some(NodeData {
            kind: NodeKind::Text(existing),
            ..
        }) = only_child.and_then(|only| self.node_mut(only))
        {
            existing.clear();
            existing.push_str(text);
            return;
        }
        self.clear_children(node);
        if !text.is_empty() {
            let child = self.create_text(text);
            self.append_child(node, child);
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(NodeData {
            kind: NodeKind::Element { attrs, .. },
            ..
        }) = self.node_mut(node)
        {
            match attrs.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => {
                    existing.clear();
                    existing.push_str(value);
                }
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(NodeData {
            kind: NodeKind::Element { attrs, .. },
            ..
        }) = self.node_mut(node)
        {
            attrs.retain(|(key, _)| key != name);
        }
    }

    pub fn attributes(&self, node: NodeId) -> &[(String, String)] {
        match &self.node(node).kind {
            NodeKind::Element { attrs, .. } => attrs,
            NodeKind::Text(_) => &[],
        }
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let value = match self.attribute(node, "class").map(str::trim) {
            Some(existing) if !existing.is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        self.set_attribute(node, "class", &value);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        let Some(existing) = self.attribute(node, "class") else {
            return;
        };
        let kept: Vec<&str> = existing
            .split_ascii_whitespace()
            .filter(|c| *c != class)
            .collect();
        if kept.is_empty() {
            self.remove_attribute(node, "class");
        } else {
            let value = kept.join(" ");
            self.set_attribute(node, "class", &value);
        }
    }

    /// Swaps `from` for `to` in place, keeping the position of the class in the list.
    pub fn rename_class(&mut self, node: NodeId, from: &str, to: &str) {
        let Some(existing) = self.attribute(node, "class") else {
            return;
        };
        let mut seen_target = false;
        let mut classes = Vec::new();
        for class in existing.split_ascii_whitespace() {
            let class = if class == from { to } else { class };
            if class == to {
                if seen_target {
                    continue;
                }
                seen_target = true;
            }
            classes.push(class);
        }
        let value = classes.join(" ");
        self.set_attribute(node, "class", &value);
    }

    /// First element in the document whose `id` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.find_element(self.root, |doc, node| doc.attribute(node, "id") == Some(id))
    }

    /// First descendant element of `scope` with the given tag.
    pub fn element_by_tag(&self, scope: NodeId, tag: &str) -> Option<NodeId> {
        self.find_element(scope, |doc, node| doc.tag(node) == Some(tag))
    }

    fn find_element<F>(&self, scope: NodeId, mut pred: F) -> Option<NodeId>
    where
        F: FnMut(&Self, NodeId) -> bool,
    {
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if self.is_element(node) && pred(self, node) {
                return Some(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        None
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root, node)
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        closest(self, node, |_, candidate| candidate == ancestor).is_some()
    }
}

impl NodeTree for Document {
    type Node = NodeId;

    fn children(&self, node: NodeId) -> &[NodeId] {
        &self.node(node).children
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attributes(node)
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl TreeMut for Document {
    fn create_element(&mut self, tag: &str) -> NodeId {
        Document::create_element(self, tag)
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        Document::create_text(self, text)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        Document::append_child(self, parent, child)
    }

    fn replace_with(&mut self, node: NodeId, replacements: &[NodeId]) {
        Document::replace_with(self, node, replacements)
    }

    fn set_text_content(&mut self, node: NodeId, text: &str) {
        Document::set_text_content(self, node, text)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        Document::set_attribute(self, node, name, value)
    }

    fn rename_class(&mut self, node: NodeId, from: &str, to: &str) {
        Document::rename_class(self, node, from, to)
    }
}
