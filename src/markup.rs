//! Markup fragments in and out of a [`Document`].

use std::fmt;

use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape, resolve_predefined_entity};
use quick_xml::events::{BytesStart, Event};

use crate::dom::{Document, NodeId};
use crate::tree::NodeTree;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupError {
    pub position: u64,
    pub reason: String,
}

impl fmt::Display for MarkupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed markup at byte {}: {}", self.position, self.reason)
    }
}

impl std::error::Error for MarkupError {}

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

impl Document {
    /// Parses `markup` and appends the resulting nodes to `parent`. Nothing is appended
    /// when the fragment cannot be parsed.
    pub fn append_markup(&mut self, parent: NodeId, markup: &str) -> Result<(), MarkupError> {
        let holder = self.parse_detached(markup)?;
        let parsed = self.children(holder).to_vec();
        for node in parsed {
            self.append_child(parent, node);
        }
        self.release(holder);
        Ok(())
    }

    /// Replaces the children of `node` with the parsed fragment. On error `node` is left
    /// untouched.
    pub fn set_inner_html(&mut self, node: NodeId, markup: &str) -> Result<(), MarkupError> {
        let holder = self.parse_detached(markup)?;
        self.clear_children(node);
        let parsed = self.children(holder).to_vec();
        for child in parsed {
            self.append_child(node, child);
        }
        self.release(holder);
        Ok(())
    }

    /// Parses into a fresh holder element; the holder is released again on error.
    fn parse_detached(&mut self, markup: &str) -> Result<NodeId, MarkupError> {
        let holder = self.create_element("template");
        match self.parse_into(holder, markup) {
            Ok(()) => Ok(holder),
            Err(err) => {
                self.release(holder);
                Err(err)
            }
        }
    }

    fn parse_into(&mut self, holder: NodeId, markup: &str) -> Result<(), MarkupError> {
        let mut reader = Reader::from_str(markup);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.allow_dangling_amp = true;

        let mut stack: Vec<(String, NodeId)> = vec![(String::new(), holder)];
        loop {
            let position = reader.buffer_position() as u64;
            let fail = |reason: String| MarkupError { position, reason };
            let parent = stack.last().map(|(_, node)| *node).unwrap_or(holder);
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let (tag, node) = self.element_from_start(&e).map_err(fail)?;
                    self.append_child(parent, node);
                    if !is_void(&tag) {
                        stack.push((tag, node));
                    }
                }
                Ok(Event::Empty(e)) => {
                    let (_, node) = self.element_from_start(&e).map_err(fail)?;
                    self.append_child(parent, node);
                }
                Ok(Event::End(e)) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                    if let Some(index) = stack.iter().rposition(|(open, _)| *open == tag) {
                        if index > 0 {
                            stack.truncate(index);
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e.decode().map_err(|err| fail(format!("{err:?}")))?;
                    self.push_text(parent, &text);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    self.push_text(parent, &text);
                }
                Ok(Event::GeneralRef(e)) => {
                    let resolved = match e.resolve_char_ref() {
                        Ok(Some(ch)) => ch.to_string(),
                        _ => {
                            let name = e.decode().map_err(|err| fail(format!("{err:?}")))?;
                            resolve_named_entity(&name)
                                .map(str::to_string)
                                .unwrap_or_else(|| format!("&{name};"))
                        }
                    };
                    self.push_text(parent, &resolved);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(fail(err.to_string())),
            }
        }
        Ok(())
    }

    fn element_from_start(&mut self, start: &BytesStart<'_>) -> Result<(String, NodeId), String> {
        let tag = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
        let node = self.create_element(&tag);
        for attr in start.html_attributes().with_checks(false) {
            let attr = attr.map_err(|err| err.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            self.set_attribute(node, &key, &value);
        }
        Ok((tag, node))
    }

    /// Appends text to `parent`, merging with a trailing text node so entity references
    /// do not fragment a run of characters.
    fn push_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.children(parent).last() {
            if let Some(existing) = self.text(last) {
                let merged = format!("{existing}{text}");
                self.set_text_content(last, &merged);
                return;
            }
        }
        let node = self.create_text(text);
        self.append_child(parent, node);
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            self.write_node(child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        if let Some(text) = self.text(node) {
            out.push_str(&partial_escape(text));
            return;
        }
        let tag = self.tag(node).unwrap_or("span");
        out.push('<');
        out.push_str(tag);
        for (key, value) in self.attributes(node) {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        out.push('>');
        if is_void(tag) {
            return;
        }
        for &child in self.children(node) {
            self.write_node(child, out);
        }
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

fn resolve_named_entity(name: &str) -> Option<&'static str> {
    resolve_predefined_entity(name).or(match name {
        "nbsp" => Some("\u{a0}"),
        "mdash" => Some("—"),
        "ndash" => Some("–"),
        "middot" => Some("·"),
        "hellip" => Some("…"),
        _ => None,
    })
}
