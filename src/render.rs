//! Builds the page regions (title, content, vocabulary table, lesson selector) from a
//! [`Lesson`]. Every render replaces what the previous one wrote.

use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::dom::{Document, NodeId};
use crate::layout::{DIVIDER_ID, SplitLayout, TEXT_PANE_ID, VOCAB_PANE_ID};
use crate::model::{Catalog, Image, InlineImage, Lesson, LessonContent, Paragraph, TrustedMarkup};
use crate::tree::{Filter, NodeTree, descendants};
use crate::vocab::Vocabulary;

/// What a render pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    pub title: Option<NodeId>,
    pub content: Option<NodeId>,
    /// Markup fragments that failed to parse and were shown as literal text.
    pub literal_fallbacks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ContentRenderer {
    config: RenderConfig,
}

impl ContentRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// A bare page with every region the renderer writes to, laid out as two panes.
    pub fn skeleton(&self) -> Document {
        let mut doc = Document::new();
        let root = doc.root();

        let select = doc.create_element("select");
        doc.set_attribute(select, "id", &self.config.lesson_select_id);
        doc.append_child(root, select);

        let split = doc.create_element("div");
        doc.set_attribute(split, "id", "split-root");
        doc.append_child(root, split);

        let text_pane = doc.create_element("div");
        doc.set_attribute(text_pane, "id", TEXT_PANE_ID);
        doc.append_child(split, text_pane);
        let title = doc.create_element("h1");
        doc.set_attribute(title, "id", &self.config.title_id);
        doc.append_child(text_pane, title);
        let content = doc.create_element("div");
        doc.set_attribute(content, "id", &self.config.content_id);
        doc.append_child(text_pane, content);

        let divider = doc.create_element("div");
        doc.set_attribute(divider, "id", DIVIDER_ID);
        let grip = doc.create_element("span");
        doc.set_attribute(grip, "class", "grip");
        doc.set_attribute(grip, "aria-hidden", "true");
        doc.append_child(divider, grip);
        doc.append_child(split, divider);

        let vocab_pane = doc.create_element("div");
        doc.set_attribute(vocab_pane, "id", VOCAB_PANE_ID);
        doc.append_child(split, vocab_pane);
        let table = doc.create_element("table");
        doc.set_attribute(table, "id", &self.config.vocab_table_id);
        let thead = doc.create_element("thead");
        let header = doc.create_element("tr");
        for label in ["Word", "Pinyin", "Meaning"] {
            let th = doc.create_element("th");
            doc.set_text_content(th, label);
            doc.append_child(header, th);
        }
        doc.append_child(thead, header);
        let tbody = doc.create_element("tbody");
        doc.append_child(table, thead);
        doc.append_child(table, tbody);
        doc.append_child(vocab_pane, table);

        SplitLayout::default().apply(&mut doc);
        doc
    }

    pub fn render(&self, doc: &mut Document, lesson: &Lesson) -> RenderOutcome {
        let mut outcome = RenderOutcome {
            title: self.render_title(doc, lesson),
            ..RenderOutcome::default()
        };
        outcome.content = self.render_content(doc, &lesson.content, &mut outcome.literal_fallbacks);
        self.render_vocab_table(doc, &Vocabulary::new(lesson.vocabulary.clone()));
        debug!(
            lesson = %lesson.id,
            shape = lesson.content.shape(),
            literal_fallbacks = outcome.literal_fallbacks,
            "rendered lesson"
        );
        outcome
    }

    pub fn render_title(&self, doc: &mut Document, lesson: &Lesson) -> Option<NodeId> {
        let title = doc.element_by_id(&self.config.title_id)?;
        doc.set_text_content(title, lesson.display_title());
        if let Some(src) = lesson.title_audio.as_deref() {
            self.append_button(doc, title, src);
        }
        Some(title)
    }

    pub fn render_content(
        &self,
        doc: &mut Document,
        content: &LessonContent,
        literal_fallbacks: &mut usize,
    ) -> Option<NodeId> {
        let region = doc.element_by_id(&self.config.content_id)?;
        match content {
            LessonContent::Legacy(markup) => {
                if !self.inject_legacy(doc, region, markup) {
                    *literal_fallbacks += 1;
                }
            }
            LessonContent::Structured { paragraphs, images } => {
                doc.clear_children(region);
                *literal_fallbacks += self.build_structured(doc, region, paragraphs, images);
            }
            LessonContent::Empty => doc.set_text_content(region, &self.config.no_content_message),
        }
        Some(region)
    }

    /// Replaces the content region with a load-failure message.
    pub fn show_load_failure(&self, doc: &mut Document) {
        self.show_message(doc, &self.config.load_failed_message);
    }

    pub fn show_message(&self, doc: &mut Document, message: &str) {
        if let Some(region) = doc.element_by_id(&self.config.content_id) {
            doc.set_text_content(region, message);
        }
    }

    pub fn render_vocab_table(&self, doc: &mut Document, vocabulary: &Vocabulary) {
        let Some(table) = doc.element_by_id(&self.config.vocab_table_id) else {
            return;
        };
        let Some(tbody) = doc.element_by_tag(table, "tbody") else {
            return;
        };
        doc.clear_children(tbody);
        for cells in vocabulary.rows() {
            let row = doc.create_element("tr");
            for cell in cells {
                let td = doc.create_element("td");
                doc.set_text_content(td, cell);
                doc.append_child(row, td);
            }
            doc.append_child(tbody, row);
        }
    }

    /// One option per catalog entry; `current` is marked selected.
    pub fn fill_lesson_select(&self, doc: &mut Document, catalog: &Catalog, current: Option<&str>) {
        let Some(select) = doc.element_by_id(&self.config.lesson_select_id) else {
            return;
        };
        doc.clear_children(select);
        for entry in &catalog.lessons {
            let option = doc.create_element("option");
            doc.set_attribute(option, "value", &entry.id);
            if current == Some(entry.id.as_str()) {
                doc.set_attribute(option, "selected", "selected");
            }
            doc.set_text_content(option, entry.label());
            doc.append_child(select, option);
        }
    }

    /// Every playback button under `scope`, in document order, whether the renderer built
    /// it or it arrived inside lesson markup.
    pub fn playback_buttons(&self, doc: &Document, scope: NodeId) -> Vec<NodeId> {
        descendants(doc, scope, |doc, node| {
            if doc.tag(node) == Some("button")
                && doc.attribute(node, &self.config.audio_attribute).is_some()
            {
                Filter::Accept
            } else {
                Filter::Skip
            }
        })
    }

    pub fn playback_button(&self, doc: &mut Document, src: &str) -> NodeId {
        let button = doc.create_element("button");
        doc.set_attribute(button, "class", &self.config.button_class);
        doc.set_attribute(button, &self.config.audio_attribute, src);
        let handler = format!("{}(this)", self.config.toggle_entry_point);
        doc.set_attribute(button, "onclick", &handler);
        doc.set_text_content(button, &self.config.play_icon);
        button
    }

    fn append_button(&self, doc: &mut Document, parent: NodeId, src: &str) {
        let gap = doc.create_text(" ");
        doc.append_child(parent, gap);
        let button = self.playback_button(doc, src);
        doc.append_child(parent, button);
    }

    /// Returns false when the markup could not be parsed and was shown literally.
    fn inject_legacy(&self, doc: &mut Document, region: NodeId, markup: &TrustedMarkup) -> bool {
        match doc.set_inner_html(region, markup.as_str()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "lesson markup is malformed, showing it as text");
                doc.set_text_content(region, markup.as_str());
                false
            }
        }
    }

    fn build_structured(
        &self,
        doc: &mut Document,
        region: NodeId,
        paragraphs: &[Paragraph],
        images: &[Image],
    ) -> usize {
        let mut literal_fallbacks = 0;
        for (index, paragraph) in paragraphs.iter().enumerate() {
            let position = index + 1;
            let p = doc.create_element("p");
            if !self.fill_paragraph(doc, p, paragraph) {
                literal_fallbacks += 1;
            }
            if let Some(src) = paragraph.audio_ref.as_deref().filter(|src| !src.is_empty()) {
                self.append_button(doc, p, src);
            }
            doc.append_child(region, p);

            if let Some(image) = &paragraph.inline_image {
                let img = self.inline_image(doc, image);
                doc.append_child(region, img);
            }
            for image in images
                .iter()
                .filter(|image| image.after_paragraph == Some(position))
            {
                let img = self.image(doc, image);
                doc.append_child(region, img);
            }
        }

        // Unpositioned images, plus positions past the last paragraph, go at the end.
        for image in images.iter().filter(|image| {
            image
                .after_paragraph
                .is_none_or(|position| position > paragraphs.len())
        }) {
            let img = self.image(doc, image);
            doc.append_child(region, img);
        }
        literal_fallbacks
    }

    fn fill_paragraph(&self, doc: &mut Document, p: NodeId, paragraph: &Paragraph) -> bool {
        if let Some(markup) = paragraph.inline_markup.as_deref().filter(|m| !m.is_empty()) {
            if let Err(err) = doc.set_inner_html(p, markup) {
                warn!(error = %err, "paragraph markup is malformed, showing it as text");
                doc.set_text_content(p, markup);
                return false;
            }
        } else if let Some(text) = paragraph.plain_text.as_deref().filter(|t| !t.is_empty()) {
            doc.set_text_content(p, text);
        }
        true
    }

    fn inline_image(&self, doc: &mut Document, image: &InlineImage) -> NodeId {
        let img = doc.create_element("img");
        doc.set_attribute(img, "src", &image.src);
        doc.set_attribute(img, "alt", image.alt.as_deref().unwrap_or_default());
        doc.set_attribute(img, "class", &self.config.inline_image_class);
        img
    }

    fn image(&self, doc: &mut Document, image: &Image) -> NodeId {
        let img = doc.create_element("img");
        doc.set_attribute(img, "src", &image.src);
        doc.set_attribute(img, "alt", image.alt());
        img
    }
}
