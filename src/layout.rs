//! The two-pane split between lesson text and the vocabulary table, and the stored
//! preference that restores it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::dom::Document;

pub const MIN_PERCENT: f64 = 25.0;
pub const MAX_PERCENT: f64 = 80.0;
pub const DEFAULT_PERCENT: f64 = 62.0;

pub const TEXT_PANE_ID: &str = "text-pane";
pub const VOCAB_PANE_ID: &str = "vocab-pane";
pub const DIVIDER_ID: &str = "split-divider";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DividerKey {
    Left,
    Right,
    Home,
    End,
}

/// Width of the text pane as a percentage, always within `MIN_PERCENT..=MAX_PERCENT`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitLayout {
    percent: f64,
}

impl Default for SplitLayout {
    fn default() -> Self {
        Self {
            percent: DEFAULT_PERCENT,
        }
    }
}

impl SplitLayout {
    pub fn new(percent: f64) -> Self {
        if !percent.is_finite() {
            return Self::default();
        }
        Self {
            percent: percent.clamp(MIN_PERCENT, MAX_PERCENT),
        }
    }

    pub fn percent(self) -> f64 {
        self.percent
    }

    /// Keyboard adjustment; `coarse` is the shift-modified step.
    pub fn nudge(self, key: DividerKey, coarse: bool) -> Self {
        let step = if coarse { 5.0 } else { 2.0 };
        match key {
            DividerKey::Left => Self::new(self.percent - step),
            DividerKey::Right => Self::new(self.percent + step),
            DividerKey::Home => Self::new(MIN_PERCENT),
            DividerKey::End => Self::new(MAX_PERCENT),
        }
    }

    /// Pointer position inside the split container of the given width.
    pub fn from_pointer(offset: f64, width: f64) -> Self {
        if width <= 0.0 {
            return Self::default();
        }
        Self::new(offset / width * 100.0)
    }

    /// Writes pane widths and divider accessibility attributes. Missing elements are
    /// skipped.
    pub fn apply(self, doc: &mut Document) {
        let left = self.percent;
        let right = 100.0 - left;
        if let Some(pane) = doc.element_by_id(TEXT_PANE_ID) {
            doc.set_attribute(pane, "style", &format!("flex: 0 0 {left}%"));
        }
        if let Some(pane) = doc.element_by_id(VOCAB_PANE_ID) {
            doc.set_attribute(pane, "style", &format!("flex: 0 0 {right}%"));
        }
        if let Some(divider) = doc.element_by_id(DIVIDER_ID) {
            doc.set_attribute(divider, "role", "separator");
            doc.set_attribute(divider, "aria-orientation", "vertical");
            doc.set_attribute(divider, "aria-valuemin", &MIN_PERCENT.to_string());
            doc.set_attribute(divider, "aria-valuemax", &MAX_PERCENT.to_string());
            doc.set_attribute(divider, "aria-valuenow", &left.round().to_string());
            let title = format!("Split: {}% / {}%", left.round(), right.round());
            doc.set_attribute(divider, "title", &title);
        }
    }
}

/// UI preferences kept between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub split_percent: Option<f64>,
}

impl Preferences {
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), raw)?;
        Ok(())
    }

    pub fn layout(&self) -> SplitLayout {
        self.split_percent
            .map(SplitLayout::new)
            .unwrap_or_default()
    }

    pub fn remember(&mut self, layout: SplitLayout) {
        self.split_percent = Some(layout.percent());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeTree;

    #[test]
    fn percent_is_clamped() {
        assert_eq!(SplitLayout::new(10.0).percent(), MIN_PERCENT);
        assert_eq!(SplitLayout::new(95.0).percent(), MAX_PERCENT);
        assert_eq!(SplitLayout::new(f64::NAN).percent(), DEFAULT_PERCENT);
        assert_eq!(SplitLayout::from_pointer(300.0, 600.0).percent(), 50.0);
        assert_eq!(SplitLayout::from_pointer(10.0, 0.0), SplitLayout::default());
    }

    #[test]
    fn keyboard_steps() {
        let layout = SplitLayout::default();
        assert_eq!(layout.nudge(DividerKey::Left, false).percent(), 60.0);
        assert_eq!(layout.nudge(DividerKey::Right, true).percent(), 67.0);
        assert_eq!(layout.nudge(DividerKey::Home, false).percent(), MIN_PERCENT);
        assert_eq!(
            SplitLayout::new(79.0).nudge(DividerKey::Right, true).percent(),
            MAX_PERCENT
        );
    }

    #[test]
    fn apply_writes_panes_and_divider() {
        let mut doc = Document::new();
        let root = doc.root();
        doc.append_markup(
            root,
            r#"<div id="text-pane"></div><div id="split-divider"></div><div id="vocab-pane"></div>"#,
        )
        .unwrap();
        SplitLayout::new(62.5).apply(&mut doc);

        let left = doc.element_by_id(TEXT_PANE_ID).unwrap();
        let right = doc.element_by_id(VOCAB_PANE_ID).unwrap();
        let divider = doc.element_by_id(DIVIDER_ID).unwrap();
        assert_eq!(doc.attribute(left, "style"), Some("flex: 0 0 62.5%"));
        assert_eq!(doc.attribute(right, "style"), Some("flex: 0 0 37.5%"));
        assert_eq!(doc.attribute(divider, "aria-valuenow"), Some("63"));
        assert_eq!(doc.attribute(divider, "aria-valuemin"), Some("25"));
        assert_eq!(doc.attribute(divider, "title"), Some("Split: 63% / 38%"));
    }

    #[test]
    fn preferences_round_trip_through_a_file() {
        let path = std::env::temp_dir().join(format!("lessongloss-prefs-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        assert_eq!(Preferences::load(&path).unwrap().layout(), SplitLayout::default());

        let mut prefs = Preferences::default();
        prefs.remember(SplitLayout::new(140.0));
        prefs.save(&path).unwrap();
        let restored = Preferences::load(&path).unwrap();
        assert_eq!(restored.split_percent, Some(MAX_PERCENT));
        std::fs::remove_file(&path).unwrap();
    }
}
