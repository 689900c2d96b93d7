//! Character classes for the two scripts of a glossary line and the parser that splits
//! `"<headword> <transliteration> — <gloss>"` text into its parts.

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator placed between transliteration and gloss in tooltip text.
pub const GLOSS_SEPARATOR: &str = " — ";

const EM_DASH: char = '—';

/// CJK unified ideographs (with Extension A), compatibility ideographs, and the paired
/// punctuation that appears inside headwords.
pub const LOGOGRAPHIC_CLASS: &str = "\u{3400}-\u{4DBF}\u{4E00}-\u{9FFF}\u{F900}-\u{FAFF}\
    （）《》〈〉「」『』【】〔〕“”";

/// Latin letters with the Latin-1/Extended diacritic blocks, combining marks used for
/// tone numbers and accents, interpunct and apostrophes.
pub const TRANSLITERATION_CLASS: &str = "A-Za-z\u{00C0}-\u{00D6}\u{00D8}-\u{00F6}\u{00F8}-\u{024F}\
    \u{1E00}-\u{1EFF}\u{0300}-\u{036F}·'ʼ’";

/// Regex class bodies (without the surrounding brackets) for headword and
/// transliteration characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptClasses {
    pub headword: String,
    pub transliteration: String,
}

impl Default for ScriptClasses {
    fn default() -> Self {
        Self {
            headword: LOGOGRAPHIC_CLASS.to_string(),
            transliteration: TRANSLITERATION_CLASS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGloss {
    pub headword: String,
    pub transliteration: String,
    pub gloss: String,
}

impl ParsedGloss {
    pub fn tooltip(&self) -> String {
        tooltip_text(&self.transliteration, &self.gloss)
    }
}

/// Compiled splitter for one pair of [`ScriptClasses`].
#[derive(Debug, Clone)]
pub struct GlossPattern {
    splitter: Regex,
}

impl GlossPattern {
    pub fn new(classes: &ScriptClasses) -> Result<Self, regex::Error> {
        let head = &classes.headword;
        let translit = &classes.transliteration;
        // Transliteration is the longest run anchored at the end; it may hold internal
        // spaces but must start and finish on a letter of its class.
        let source = format!(r"^([{head}]+)\s*([{translit}](?:[{translit}\s]*[{translit}])?)$");
        Ok(Self {
            splitter: Regex::new(&source)?,
        })
    }

    /// Splits the left side of a gloss line into `(headword, transliteration)`.
    pub fn split_headword(&self, left: &str) -> Option<(String, String)> {
        let caps = self.splitter.captures(left.trim())?;
        Some((caps[1].to_string(), caps[2].to_string()))
    }

    /// Parses a complete gloss line. Returns `None` when there is no separator or the
    /// left side does not decompose into headword and transliteration.
    pub fn parse(&self, text: &str) -> Option<ParsedGloss> {
        let (left, right) = split_on_separator(text)?;
        let (headword, transliteration) = self.split_headword(left)?;
        Some(ParsedGloss {
            headword,
            transliteration,
            gloss: right.trim().to_string(),
        })
    }
}

static DEFAULT_PATTERN: Lazy<GlossPattern> = Lazy::new(|| {
    GlossPattern::new(&ScriptClasses::default()).expect("built-in script classes compile")
});

pub fn default_pattern() -> &'static GlossPattern {
    &DEFAULT_PATTERN
}

/// [`GlossPattern::split_headword`] with the built-in classes.
pub fn split_headword(left: &str) -> Option<(String, String)> {
    DEFAULT_PATTERN.split_headword(left)
}

/// [`GlossPattern::parse`] with the built-in classes.
pub fn parse_gloss(text: &str) -> Option<ParsedGloss> {
    DEFAULT_PATTERN.parse(text)
}

/// First em-dash, falling back to the first plain hyphen.
fn split_on_separator(text: &str) -> Option<(&str, &str)> {
    text.split_once(EM_DASH).or_else(|| text.split_once('-'))
}

/// `"<transliteration> — <gloss>"`, or whichever side is non-empty.
pub fn tooltip_text(transliteration: &str, gloss: &str) -> String {
    let transliteration = transliteration.trim();
    let gloss = gloss.trim();
    match (transliteration.is_empty(), gloss.is_empty()) {
        (false, false) => format!("{transliteration}{GLOSS_SEPARATOR}{gloss}"),
        (false, true) => transliteration.to_string(),
        (true, false) => gloss.to_string(),
        (true, true) => String::new(),
    }
}
