//! Vocabulary annotation: makes sure every glossary word in rendered text carries a
//! tooltip, whatever state the markup arrived in.
//!
//! Three passes run in a fixed order:
//! 1. legacy marker classes are renamed to the current marker class;
//! 2. untagged text is scanned and headword occurrences are wrapped;
//! 3. marked elements without a tooltip get one, from attributes or parsed text.
//!
//! A second run over the same tree changes nothing.

use serde::Serialize;
use tracing::debug;

use crate::config::AnnotationConfig;
use crate::model::VocabEntry;
use crate::script::{GlossPattern, tooltip_text};
use crate::tree::{NodeTree, TreeMut, closest, elements_with_class, text_nodes};
use crate::vocab::{VocabMatcher, Vocabulary};

const OPAQUE_TAGS: &[&str] = &["script", "style", "template"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationReport {
    /// Legacy-marked elements renamed to the current marker class.
    pub normalized: usize,
    /// Text nodes replaced by annotated fragments.
    pub annotated_nodes: usize,
    /// Headword occurrences wrapped during auto-annotation.
    pub occurrences: usize,
    /// Marked elements that received a tooltip in the backfill pass.
    pub backfilled: usize,
    /// Marked elements left alone because their text could not be parsed.
    pub unparsed: usize,
}

impl AnnotationReport {
    /// Whether the pass modified the tree at all.
    pub fn changed(&self) -> bool {
        self.normalized + self.annotated_nodes + self.backfilled > 0
    }
}

#[derive(Debug, Clone)]
pub struct Annotator {
    config: AnnotationConfig,
    pattern: GlossPattern,
}

impl Annotator {
    pub fn new(config: AnnotationConfig) -> Result<Self, regex::Error> {
        let pattern = GlossPattern::new(&config.script_classes())?;
        Ok(Self { config, pattern })
    }

    pub fn config(&self) -> &AnnotationConfig {
        &self.config
    }

    /// Runs all three passes over the subtree below `root`.
    pub fn annotate<T: TreeMut>(
        &self,
        tree: &mut T,
        root: T::Node,
        vocabulary: &Vocabulary,
    ) -> AnnotationReport {
        let mut report = AnnotationReport {
            normalized: self.normalize_legacy(tree, root),
            ..AnnotationReport::default()
        };
        let matcher = vocabulary.matcher();
        if !matcher.is_empty() {
            self.auto_annotate(tree, root, &matcher, &mut report);
        }
        self.backfill(tree, root, &mut report);
        debug!(
            normalized = report.normalized,
            annotated_nodes = report.annotated_nodes,
            occurrences = report.occurrences,
            backfilled = report.backfilled,
            unparsed = report.unparsed,
            "annotation pass finished"
        );
        report
    }

    fn normalize_legacy<T: TreeMut>(&self, tree: &mut T, root: T::Node) -> usize {
        let legacy = &self.config.legacy_marker_class;
        if legacy.is_empty() || *legacy == self.config.marker_class {
            return 0;
        }
        let nodes = elements_with_class(&*tree, root, legacy);
        for &node in &nodes {
            tree.rename_class(node, legacy, &self.config.marker_class);
        }
        nodes.len()
    }

    fn auto_annotate<T: TreeMut>(
        &self,
        tree: &mut T,
        root: T::Node,
        matcher: &VocabMatcher,
        report: &mut AnnotationReport,
    ) {
        let marker = self.config.marker_class.as_str();
        let tooltip = self.config.tooltip_class.as_str();
        let candidates = text_nodes(&*tree, root, |tree, node| {
            !tree.has_class(node, marker)
                && !tree.has_class(node, tooltip)
                && !tree.tag(node).is_some_and(|tag| OPAQUE_TAGS.contains(&tag))
        });

        for node in candidates {
            let Some(text) = tree.text(node).map(str::to_string) else {
                continue;
            };
            let Some(segments) = matcher.segment(&text) else {
                continue;
            };
            let mut fragment = Vec::with_capacity(segments.len());
            for segment in segments {
                let piece = &text[segment.range];
                let built = match segment.entry {
                    Some(index) => {
                        report.occurrences += 1;
                        self.marked_span(tree, piece, matcher.entry(index))
                    }
                    None => tree.create_text(piece),
                };
                fragment.push(built);
            }
            tree.replace_with(node, &fragment);
            report.annotated_nodes += 1;
        }
    }

    fn marked_span<T: TreeMut>(&self, tree: &mut T, visible: &str, entry: &VocabEntry) -> T::Node {
        let span = tree.create_element("span");
        tree.set_attribute(span, "class", &self.config.marker_class);
        tree.set_attribute(
            span,
            &self.config.transliteration_attribute,
            entry.transliteration(),
        );
        tree.set_attribute(span, &self.config.gloss_attribute, entry.gloss());
        let text = tree.create_text(visible);
        tree.append_child(span, text);
        let tip = self.tooltip(tree, &tooltip_text(entry.transliteration(), entry.gloss()));
        tree.append_child(span, tip);
        span
    }

    fn tooltip<T: TreeMut>(&self, tree: &mut T, text: &str) -> T::Node {
        let tip = tree.create_element("span");
        tree.set_attribute(tip, "class", &self.config.tooltip_class);
        tree.set_text_content(tip, text);
        tip
    }

    fn backfill<T: TreeMut>(&self, tree: &mut T, root: T::Node, report: &mut AnnotationReport) {
        let marked = elements_with_class(&*tree, root, &self.config.marker_class);
        for node in marked {
            // An outer marked element may have rewritten its text and dropped this one.
            if closest(&*tree, node, |_, candidate| candidate == root).is_none() {
                continue;
            }
            if self.has_tooltip_child(&*tree, node) {
                continue;
            }
            let transliteration =
                self.attribute_or_empty(&*tree, node, &self.config.transliteration_attribute);
            let gloss = self.attribute_or_empty(&*tree, node, &self.config.gloss_attribute);
            if !transliteration.is_empty() || !gloss.is_empty() {
                let tip = self.tooltip(tree, &tooltip_text(&transliteration, &gloss));
                tree.append_child(node, tip);
                report.backfilled += 1;
                continue;
            }

            let visible = tree.text_content(node);
            match self.pattern.parse(&visible) {
                Some(parsed) => {
                    tree.set_text_content(node, &parsed.headword);
                    let tip = self.tooltip(tree, &parsed.tooltip());
                    tree.append_child(node, tip);
                    tree.set_attribute(
                        node,
                        &self.config.transliteration_attribute,
                        &parsed.transliteration,
                    );
                    tree.set_attribute(node, &self.config.gloss_attribute, &parsed.gloss);
                    report.backfilled += 1;
                }
                None => {
                    debug!(text = %visible, "marked element has no parseable gloss");
                    report.unparsed += 1;
                }
            }
        }
    }

    fn has_tooltip_child<T: NodeTree>(&self, tree: &T, node: T::Node) -> bool {
        tree.children(node)
            .iter()
            .any(|&child| tree.has_class(child, &self.config.tooltip_class))
    }

    fn attribute_or_empty<T: NodeTree>(&self, tree: &T, node: T::Node, name: &str) -> String {
        tree.attribute(node, name)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            config: AnnotationConfig::default(),
            pattern: crate::script::default_pattern().clone(),
        }
    }
}
