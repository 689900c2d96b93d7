use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One row of the lesson glossary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabEntry {
    #[serde(
        rename = "hz",
        alias = "headword",
        default,
        deserialize_with = "deserialize_text"
    )]
    pub headword: String,
    #[serde(
        rename = "py",
        alias = "transliteration",
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub transliteration: Option<String>,
    #[serde(
        rename = "en",
        alias = "gloss",
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub gloss: Option<String>,
}

impl VocabEntry {
    pub fn new(
        headword: impl Into<String>,
        transliteration: impl Into<String>,
        gloss: impl Into<String>,
    ) -> Self {
        Self {
            headword: headword.into(),
            transliteration: Some(transliteration.into()).filter(|s| !s.is_empty()),
            gloss: Some(gloss.into()).filter(|s| !s.is_empty()),
        }
    }

    pub fn transliteration(&self) -> &str {
        self.transliteration.as_deref().unwrap_or("")
    }

    pub fn gloss(&self) -> &str {
        self.gloss.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub src: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(
        rename = "html",
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub inline_markup: Option<String>,
    #[serde(
        rename = "text",
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub plain_text: Option<String>,
    #[serde(
        rename = "audio",
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub audio_ref: Option<String>,
    #[serde(rename = "image", default, skip_serializing_if = "Option::is_none")]
    pub inline_image: Option<InlineImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub src: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub alt: Option<String>,
    /// 1-based paragraph index the image follows.
    #[serde(
        rename = "after",
        default,
        deserialize_with = "deserialize_position",
        skip_serializing_if = "Option::is_none"
    )]
    pub after_paragraph: Option<usize>,
}

impl Image {
    pub fn alt(&self) -> &str {
        self.alt.as_deref().unwrap_or("")
    }
}

/// Strings pass through; null or any other JSON value reads as an empty string, so one
/// malformed field renders empty instead of failing the whole lesson.
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_text(deserializer)?.unwrap_or_default())
}

fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(Some(text)),
        _ => Ok(None),
    }
}

/// Accepts integral JSON numbers greater than zero; anything else leaves the image
/// unpositioned instead of failing the whole lesson.
fn deserialize_position<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(position_from_value))
}

fn position_from_value(value: &Value) -> Option<usize> {
    if let Some(index) = value.as_u64() {
        return usize::try_from(index).ok().filter(|index| *index > 0);
    }
    let float = value.as_f64()?;
    if float.fract() == 0.0 && float >= 1.0 && float <= usize::MAX as f64 {
        Some(float as usize)
    } else {
        None
    }
}

/// Lesson payload exactly as stored on disk or served over HTTP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LessonDocument {
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub title_audio: Option<String>,
    /// Older payloads name the title audio `coverAudio`; `title_audio` wins when both
    /// are non-empty.
    #[serde(
        rename = "coverAudio",
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_audio: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub content_html: Option<String>,
    #[serde(default)]
    pub paragraphs: Option<Vec<Paragraph>>,
    #[serde(default)]
    pub images: Option<Vec<Image>>,
    #[serde(default)]
    pub vocab: Option<Vec<VocabEntry>>,
}

/// Pre-rendered markup supplied by the lesson author and injected without rebuilding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedMarkup(String);

impl TrustedMarkup {
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonContent {
    Legacy(TrustedMarkup),
    Structured {
        paragraphs: Vec<Paragraph>,
        images: Vec<Image>,
    },
    Empty,
}

impl LessonContent {
    pub fn shape(&self) -> &'static str {
        match self {
            LessonContent::Legacy(_) => "legacy",
            LessonContent::Structured { .. } => "structured",
            LessonContent::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub id: String,
    pub title: Option<String>,
    pub title_audio: Option<String>,
    pub content: LessonContent,
    pub vocabulary: Vec<VocabEntry>,
}

impl Lesson {
    /// Builds a lesson from its wire document. `id` is the key it was requested under
    /// and wins over any id embedded in the payload.
    pub fn from_document(id: impl Into<String>, document: LessonDocument) -> Self {
        let content = match (document.content_html, document.paragraphs) {
            (Some(markup), _) if !markup.is_empty() => {
                LessonContent::Legacy(TrustedMarkup::new(markup))
            }
            (_, Some(paragraphs)) => LessonContent::Structured {
                paragraphs,
                images: document.images.unwrap_or_default(),
            },
            _ => LessonContent::Empty,
        };
        Self {
            id: id.into(),
            title: document.title.filter(|title| !title.is_empty()),
            title_audio: document
                .title_audio
                .filter(|src| !src.is_empty())
                .or(document.cover_audio.filter(|src| !src.is_empty())),
            content,
            vocabulary: document.vocab.unwrap_or_default(),
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl CatalogEntry {
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, deserialize_with = "deserialize_lessons")]
    pub lessons: Vec<CatalogEntry>,
}

fn deserialize_lessons<'de, D>(deserializer: D) -> Result<Vec<CatalogEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<CatalogEntry>>::deserialize(deserializer)?.unwrap_or_default())
}
