//! Read-only view over a document-like tree plus filtered depth-first traversal.

use std::fmt::Debug;

/// Outcome of a traversal filter for a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Yield the node and descend into it.
    Accept,
    /// Do not yield the node, but still visit its children.
    Skip,
    /// Neither yield the node nor visit anything below it.
    Reject,
}

pub trait NodeTree {
    type Node: Copy + Eq + Debug;

    fn children(&self, node: Self::Node) -> &[Self::Node];

    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Character data of a text node, `None` for elements.
    fn text(&self, node: Self::Node) -> Option<&str>;

    /// Lower-case tag name of an element, `None` for text nodes.
    fn tag(&self, node: Self::Node) -> Option<&str>;

    fn attribute(&self, node: Self::Node, name: &str) -> Option<&str>;

    fn has_class(&self, node: Self::Node, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|value| value.split_ascii_whitespace().any(|c| c == class))
    }

    fn is_element(&self, node: Self::Node) -> bool {
        self.tag(node).is_some()
    }

    /// Concatenated text of the node and all of its descendants.
    fn text_content(&self, node: Self::Node) -> String {
        let mut out = String::new();
        collect_text(self, node, &mut out);
        out
    }
}

fn collect_text<T: NodeTree + ?Sized>(tree: &T, node: T::Node, out: &mut String) {
    if let Some(text) = tree.text(node) {
        out.push_str(text);
        return;
    }
    for &child in tree.children(node) {
        collect_text(tree, child, out);
    }
}

/// Pre-order walk below `root` (the root itself is never yielded), honoring `filter`.
pub fn descendants<T, F>(tree: &T, root: T::Node, mut filter: F) -> Vec<T::Node>
where
    T: NodeTree + ?Sized,
    F: FnMut(&T, T::Node) -> Filter,
{
    let mut out = Vec::new();
    let mut stack: Vec<T::Node> = tree.children(root).iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        match filter(tree, node) {
            Filter::Reject => continue,
            Filter::Accept => out.push(node),
            Filter::Skip => {}
        }
        stack.extend(tree.children(node).iter().rev().copied());
    }
    out
}

/// Text nodes below `root` whose element ancestors all pass `keep`.
pub fn text_nodes<T, F>(tree: &T, root: T::Node, mut keep: F) -> Vec<T::Node>
where
    T: NodeTree + ?Sized,
    F: FnMut(&T, T::Node) -> bool,
{
    descendants(tree, root, |tree, node| {
        if tree.text(node).is_some() {
            Filter::Accept
        } else if keep(tree, node) {
            Filter::Skip
        } else {
            Filter::Reject
        }
    })
}

/// Elements below `root` carrying `class`, in document order.
pub fn elements_with_class<T>(tree: &T, root: T::Node, class: &str) -> Vec<T::Node>
where
    T: NodeTree + ?Sized,
{
    descendants(tree, root, |tree, node| {
        if tree.has_class(node, class) {
            Filter::Accept
        } else {
            Filter::Skip
        }
    })
}

/// Nearest inclusive ancestor of `node` matching `pred`.
pub fn closest<T, F>(tree: &T, node: T::Node, mut pred: F) -> Option<T::Node>
where
    T: NodeTree + ?Sized,
    F: FnMut(&T, T::Node) -> bool,
{
    let mut current = Some(node);
    while let Some(candidate) = current {
        if pred(tree, candidate) {
            return Some(candidate);
        }
        current = tree.parent(candidate);
    }
    None
}

/// The mutations the annotation passes need on top of [`NodeTree`].
pub trait TreeMut: NodeTree {
    fn create_element(&mut self, tag: &str) -> Self::Node;

    fn create_text(&mut self, text: &str) -> Self::Node;

    fn append_child(&mut self, parent: Self::Node, child: Self::Node);

    /// Puts `replacements` where `node` was and detaches `node`.
    fn replace_with(&mut self, node: Self::Node, replacements: &[Self::Node]);

    fn set_text_content(&mut self, node: Self::Node, text: &str);

    fn set_attribute(&mut self, node: Self::Node, name: &str, value: &str);

    fn rename_class(&mut self, node: Self::Node, from: &str, to: &str);
}
