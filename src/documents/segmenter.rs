//! Question Segmentation
//!
//! Splits page text into candidate question segments. Four independent
//! extractors scan the full text; they are not mutually exclusive, so the
//! same span can come back more than once under different patterns.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Segments shorter than this (after trimming, in chars) are discarded.
pub const MIN_SEGMENT_CHARS: usize = 50;

lazy_static! {
    static ref NUMBERED_LIST: Regex = Regex::new(r"\b\d+\.\s").unwrap();
    static ref Q_PREFIXED: Regex = Regex::new(r"\bQ\d+\.").unwrap();
    static ref PARENTHESIZED: Regex = Regex::new(r"\(\d+\)").unwrap();
    static ref EXAMPLE: Regex = Regex::new(r"\bExample\s+\d+").unwrap();
}

/// Marker pattern that produced a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentPattern {
    /// `12. ...`
    NumberedList,
    /// `Q3. ...`
    QPrefixed,
    /// `(4) ...`
    Parenthesized,
    /// `Example 7 ...`
    Example,
}

impl SegmentPattern {
    pub const ALL: [SegmentPattern; 4] = [
        SegmentPattern::NumberedList,
        SegmentPattern::QPrefixed,
        SegmentPattern::Parenthesized,
        SegmentPattern::Example,
    ];

    pub fn index(&self) -> u8 {
        match self {
            SegmentPattern::NumberedList => 0,
            SegmentPattern::QPrefixed => 1,
            SegmentPattern::Parenthesized => 2,
            SegmentPattern::Example => 3,
        }
    }

    fn regex(&self) -> &'static Regex {
        match self {
            SegmentPattern::NumberedList => &NUMBERED_LIST,
            SegmentPattern::QPrefixed => &Q_PREFIXED,
            SegmentPattern::Parenthesized => &PARENTHESIZED,
            SegmentPattern::Example => &EXAMPLE,
        }
    }
}

/// A candidate question span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub pattern: SegmentPattern,
}

impl Segment {
    pub fn word_count(&self) -> u32 {
        self.text.split_whitespace().count() as u32
    }
}

/// Run a single extractor. Each span runs from one marker to the next
/// marker of the same pattern, or to the end of the text.
pub fn extract_with(pattern: SegmentPattern, text: &str, min_chars: usize) -> Vec<Segment> {
    let starts: Vec<usize> = pattern.regex().find_iter(text).map(|m| m.start()).collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            let span = text[start..end].trim();
            if span.chars().count() < min_chars {
                return None;
            }
            Some(Segment {
                text: span.to_string(),
                pattern,
            })
        })
        .collect()
}

/// Run all four extractors over the page text, in pattern order.
pub fn segment_page(text: &str, min_chars: usize) -> Vec<Segment> {
    SegmentPattern::ALL
        .iter()
        .flat_map(|pattern| extract_with(*pattern, text, min_chars))
        .collect()
}

/// Lowercase and collapse whitespace.
pub fn normalize_segment_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops segments whose normalized text was already seen in this document.
#[derive(Debug, Default)]
pub struct SegmentDeduper {
    seen: HashSet<String>,
}

impl SegmentDeduper {
    /// Returns true the first time a normalized text is offered.
    pub fn admit(&mut self, segment: &Segment) -> bool {
        self.seen.insert(normalize_segment_text(&segment.text))
    }
}
