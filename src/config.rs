use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::script::ScriptClasses;

/// Names and strings the renderer writes into the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub title_id: String,
    pub content_id: String,
    pub vocab_table_id: String,
    pub lesson_select_id: String,
    pub play_icon: String,
    pub pause_icon: String,
    pub button_class: String,
    pub inline_image_class: String,
    pub audio_attribute: String,
    /// Name of the page-global function every playback button calls.
    pub toggle_entry_point: String,
    pub no_content_message: String,
    pub load_failed_message: String,
    pub playback_failed_message: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title_id: "title".to_string(),
            content_id: "content".to_string(),
            vocab_table_id: "vocabTable".to_string(),
            lesson_select_id: "lessonSelect".to_string(),
            play_icon: "▶︎".to_string(),
            pause_icon: "⏸".to_string(),
            button_class: "play-button".to_string(),
            inline_image_class: "para-img".to_string(),
            audio_attribute: "data-audio".to_string(),
            toggle_entry_point: "togglePlay".to_string(),
            no_content_message: "(This lesson has no content yet.)".to_string(),
            load_failed_message: "Failed to load lesson data. Check the data directory and JSON files."
                .to_string(),
            playback_failed_message: "Audio playback failed: check the file path or name."
                .to_string(),
        }
    }
}

/// Class and attribute names shared by the annotator and existing lesson markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub legacy_marker_class: String,
    pub marker_class: String,
    pub tooltip_class: String,
    pub transliteration_attribute: String,
    pub gloss_attribute: String,
    pub headword_class: Option<String>,
    pub transliteration_class: Option<String>,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            legacy_marker_class: "vocab-word".to_string(),
            marker_class: "vocab".to_string(),
            tooltip_class: "tooltip".to_string(),
            transliteration_attribute: "data-translit".to_string(),
            gloss_attribute: "data-gloss".to_string(),
            headword_class: None,
            transliteration_class: None,
        }
    }
}

impl AnnotationConfig {
    pub fn script_classes(&self) -> ScriptClasses {
        let defaults = ScriptClasses::default();
        ScriptClasses {
            headword: self.headword_class.clone().unwrap_or(defaults.headword),
            transliteration: self
                .transliteration_class
                .clone()
                .unwrap_or(defaults.transliteration),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory holding `index.json` and one `<id>.json` per lesson.
    pub data_dir: PathBuf,
    /// When set, lessons are fetched from `<base_url>/index.json` instead.
    pub base_url: Option<String>,
    pub lesson_param: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            base_url: None,
            lesson_param: "lesson".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub render: RenderConfig,
    pub annotation: AnnotationConfig,
    pub source: SourceConfig,
    /// Location of the page; audio references resolve relative to it.
    pub page_url: String,
    /// File the pane split is restored from and saved to.
    pub preferences: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            render: RenderConfig::default(),
            annotation: AnnotationConfig::default(),
            source: SourceConfig::default(),
            page_url: "http://127.0.0.1:8080/index.html".to_string(),
            preferences: None,
        }
    }
}

impl ViewerConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn page_location(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.page_url).map_err(ConfigError::PageUrl)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    PageUrl(url::ParseError),
    Pattern(regex::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {err}"),
            ConfigError::Parse(err) => write!(f, "config parse error: {err}"),
            ConfigError::PageUrl(err) => write!(f, "invalid page url: {err}"),
            ConfigError::Pattern(err) => write!(f, "invalid script class: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        ConfigError::Parse(value)
    }
}

impl From<regex::Error> for ConfigError {
    fn from(value: regex::Error) -> Self {
        ConfigError::Pattern(value)
    }
}
