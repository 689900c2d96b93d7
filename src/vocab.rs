//! The lesson glossary: static table rows and the longest-first headword matcher.

use std::collections::HashSet;
use std::ops::Range;

use regex::Regex;
use tracing::warn;

use crate::model::VocabEntry;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    entries: Vec<VocabEntry>,
}

impl Vocabulary {
    pub fn new(entries: Vec<VocabEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[VocabEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `[headword, transliteration, gloss]` per entry, in input order, duplicates kept.
    pub fn rows(&self) -> impl Iterator<Item = [&str; 3]> + '_ {
        self.entries
            .iter()
            .map(|entry| [entry.headword.as_str(), entry.transliteration(), entry.gloss()])
    }

    pub fn matcher(&self) -> VocabMatcher {
        VocabMatcher::new(&self.entries)
    }
}

impl From<Vec<VocabEntry>> for Vocabulary {
    fn from(entries: Vec<VocabEntry>) -> Self {
        Self::new(entries)
    }
}

/// A piece of scanned text: either untouched, or an occurrence of `entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub range: Range<usize>,
    pub entry: Option<usize>,
}

/// Headword patterns ordered by descending length. Each headword claims every
/// non-overlapping occurrence in text that no longer headword has claimed yet.
#[derive(Debug, Clone)]
pub struct VocabMatcher {
    entries: Vec<VocabEntry>,
    patterns: Vec<Regex>,
}

impl VocabMatcher {
    pub fn new(entries: &[VocabEntry]) -> Self {
        let mut seen = HashSet::new();
        let mut ordered: Vec<&VocabEntry> = entries
            .iter()
            .filter(|entry| !entry.headword.is_empty())
            .filter(|entry| seen.insert(entry.headword.as_str()))
            .collect();
        ordered.sort_by(|a, b| b.headword.chars().count().cmp(&a.headword.chars().count()));

        let mut kept = Vec::with_capacity(ordered.len());
        let mut patterns = Vec::with_capacity(ordered.len());
        for entry in ordered {
            match Regex::new(&regex::escape(&entry.headword)) {
                Ok(pattern) => {
                    kept.push(entry.clone());
                    patterns.push(pattern);
                }
                Err(err) => warn!(headword = %entry.headword, error = %err, "skipping unmatchable headword"),
            }
        }
        Self {
            entries: kept,
            patterns,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Entries in match priority order; [`Segment::entry`] indexes into this slice.
    pub fn entries(&self) -> &[VocabEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> &VocabEntry {
        &self.entries[index]
    }

    /// Splits `text` into ordered segments covering it completely. Returns `None` when
    /// no headword occurs.
    pub fn segment(&self, text: &str) -> Option<Vec<Segment>> {
        let mut segments = vec![Segment {
            range: 0..text.len(),
            entry: None,
        }];
        let mut matched = false;
        for (index, pattern) in self.patterns.iter().enumerate() {
            let mut next = Vec::with_capacity(segments.len());
            for segment in segments {
                if segment.entry.is_some() || segment.range.is_empty() {
                    next.push(segment);
                    continue;
                }
                let base = segment.range.start;
                let mut cursor = base;
                for found in pattern.find_iter(&text[segment.range.clone()]) {
                    let start = base + found.start();
                    let end = base + found.end();
                    if start > cursor {
                        next.push(Segment {
                            range: cursor..start,
                            entry: None,
                        });
                    }
                    next.push(Segment {
                        range: start..end,
                        entry: Some(index),
                    });
                    cursor = end;
                    matched = true;
                }
                if cursor < segment.range.end {
                    next.push(Segment {
                        range: cursor..segment.range.end,
                        entry: None,
                    });
                }
            }
            segments = next;
        }
        matched.then_some(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches<'a>(matcher: &'a VocabMatcher, text: &'a str) -> Vec<(&'a str, Option<&'a str>)> {
        matcher
            .segment(text)
            .unwrap_or_default()
            .into_iter()
            .map(|segment| {
                (
                    &text[segment.range],
                    segment.entry.map(|index| matcher.entry(index).headword.as_str()),
                )
            })
            .collect()
    }

    #[test]
    fn longer_headword_is_not_shadowed() {
        let matcher = Vocabulary::new(vec![
            VocabEntry::new("京", "jīng", "capital"),
            VocabEntry::new("北京", "Běijīng", "Beijing"),
        ])
        .matcher();
        assert_eq!(
            matches(&matcher, "我去北京。"),
            vec![("我去", None), ("北京", Some("北京")), ("。", None)]
        );
    }

    #[test]
    fn shorter_headword_still_matches_unclaimed_text() {
        let matcher = Vocabulary::new(vec![
            VocabEntry::new("京", "jīng", "capital"),
            VocabEntry::new("北京", "Běijīng", "Beijing"),
        ])
        .matcher();
        assert_eq!(
            matches(&matcher, "北京和东京"),
            vec![
                ("北京", Some("北京")),
                ("和东", None),
                ("京", Some("京"))
            ]
        );
    }

    #[test]
    fn overlapping_candidates_do_not_merge() {
        // "中国人" could be read as 中国+人 or 中+国人; the longer entries go first
        // and equal lengths keep input order.
        let matcher = Vocabulary::new(vec![
            VocabEntry::new("国人", "guórén", "compatriot"),
            VocabEntry::new("中国", "Zhōngguó", "China"),
            VocabEntry::new("人", "rén", "person"),
        ])
        .matcher();
        assert_eq!(
            matches(&matcher, "中国人"),
            vec![("中", None), ("国人", Some("国人"))]
        );
    }

    #[test]
    fn adjacent_occurrences_are_separate_segments() {
        let matcher = Vocabulary::new(vec![VocabEntry::new("好", "hǎo", "good")]).matcher();
        assert_eq!(
            matches(&matcher, "好好"),
            vec![("好", Some("好")), ("好", Some("好"))]
        );
    }

    #[test]
    fn duplicates_and_empty_headwords() {
        let matcher = Vocabulary::new(vec![
            VocabEntry::new("", "x", "y"),
            VocabEntry::new("茶", "chá", "tea"),
            VocabEntry::new("茶", "cha", "second"),
        ])
        .matcher();
        assert_eq!(matcher.entries().len(), 1);
        assert_eq!(matcher.entry(0).gloss(), "tea");
        assert!(matcher.segment("咖啡").is_none());
    }

    #[test]
    fn metacharacters_match_literally() {
        let matcher = Vocabulary::new(vec![
            VocabEntry::new("C++", "", "a language"),
            VocabEntry::new("(笑)", "xiào", "lol"),
        ])
        .matcher();
        assert_eq!(
            matches(&matcher, "C++ (笑) CCC"),
            vec![
                ("C++", Some("C++")),
                (" ", None),
                ("(笑)", Some("(笑)")),
                (" CCC", None)
            ]
        );
    }

    #[test]
    fn table_rows_keep_input_order_and_duplicates() {
        let vocab = Vocabulary::new(vec![
            VocabEntry::new("茶", "chá", "tea"),
            VocabEntry::new("水", "shuǐ", ""),
            VocabEntry::new("茶", "chá", "tea"),
        ]);
        let rows: Vec<_> = vocab.rows().collect();
        assert_eq!(
            rows,
            vec![["茶", "chá", "tea"], ["水", "shuǐ", ""], ["茶", "chá", "tea"]]
        );
    }
}
