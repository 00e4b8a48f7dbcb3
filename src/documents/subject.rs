//! Subject Tagging
//!
//! Assigns a coarse topic label to pages from keyword heuristics. The label
//! is a running value: a page without any keyword inherits the subject of
//! the page before it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubjectError {
    #[error("Unknown subject: {0}")]
    Unknown(String),
}

impl Serialize for SubjectError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Coarse topic label for study material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    Physics,
    Chemistry,
    Mathematics,
    Biology,
}

/// Keyword table in priority order. The first matching row wins.
const SUBJECT_KEYWORDS: &[(&[&str], Subject)] = &[
    (&["physics"], Subject::Physics),
    (&["chemistry"], Subject::Chemistry),
    (&["math", "mathematics"], Subject::Mathematics),
    (&["biology"], Subject::Biology),
];

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Physics,
        Subject::Chemistry,
        Subject::Mathematics,
        Subject::Biology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Mathematics => "Mathematics",
            Subject::Biology => "Biology",
        }
    }

    /// Detect a subject keyword in already-lowercased page text.
    pub fn detect(lower_text: &str) -> Option<Subject> {
        SUBJECT_KEYWORDS
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lower_text.contains(k)))
            .map(|(_, subject)| *subject)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = SubjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "physics" => Ok(Subject::Physics),
            "chemistry" => Ok(Subject::Chemistry),
            "math" | "maths" | "mathematics" => Ok(Subject::Mathematics),
            "biology" => Ok(Subject::Biology),
            _ => Err(SubjectError::Unknown(s.to_string())),
        }
    }
}

/// Subject selector used by retrieval. `All` matches every record,
/// including records whose subject was never set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SubjectFilter {
    #[default]
    All,
    Only(Subject),
}

impl SubjectFilter {
    pub fn matches(&self, subject: Option<Subject>) -> bool {
        match self {
            SubjectFilter::All => true,
            SubjectFilter::Only(wanted) => subject == Some(*wanted),
        }
    }
}

impl FromStr for SubjectFilter {
    type Err = SubjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(SubjectFilter::All);
        }
        s.parse().map(SubjectFilter::Only)
    }
}

impl TryFrom<String> for SubjectFilter {
    type Error = SubjectError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SubjectFilter> for String {
    fn from(filter: SubjectFilter) -> Self {
        filter.to_string()
    }
}

impl fmt::Display for SubjectFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectFilter::All => f.write_str("All"),
            SubjectFilter::Only(subject) => subject.fmt(f),
        }
    }
}

/// Running subject state for one document scan.
#[derive(Debug, Default)]
pub struct SubjectTagger {
    current: Option<Subject>,
}

impl SubjectTagger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from a page's text and return the subject that applies to it.
    pub fn observe_page(&mut self, page_text: &str) -> Option<Subject> {
        if let Some(subject) = Subject::detect(&page_text.to_lowercase()) {
            self.current = Some(subject);
        }
        self.current
    }

    pub fn current(&self) -> Option<Subject> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert_eq!(Subject::detect("physics and chemistry"), Some(Subject::Physics));
        assert_eq!(Subject::detect("chemistry meets biology"), Some(Subject::Chemistry));
        assert_eq!(Subject::detect("applied mathematics"), Some(Subject::Mathematics));
        assert_eq!(Subject::detect("cell biology"), Some(Subject::Biology));
        assert_eq!(Subject::detect("nothing here"), None);
    }

    #[test]
    fn test_subject_carries_forward() {
        let mut tagger = SubjectTagger::new();
        assert_eq!(tagger.observe_page("Unit 1: PHYSICS"), Some(Subject::Physics));
        assert_eq!(tagger.observe_page("no keyword on this page"), Some(Subject::Physics));
        assert_eq!(tagger.observe_page("Organic Chemistry"), Some(Subject::Chemistry));
        assert_eq!(tagger.current(), Some(Subject::Chemistry));
    }

    #[test]
    fn test_unset_until_first_keyword() {
        let mut tagger = SubjectTagger::new();
        assert_eq!(tagger.observe_page("preface"), None);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("All".parse::<SubjectFilter>(), Ok(SubjectFilter::All));
        assert_eq!(
            "chemistry".parse::<SubjectFilter>(),
            Ok(SubjectFilter::Only(Subject::Chemistry))
        );
        assert!("history".parse::<SubjectFilter>().is_err());
    }

    #[test]
    fn test_filter_matching() {
        assert!(SubjectFilter::All.matches(None));
        assert!(SubjectFilter::Only(Subject::Physics).matches(Some(Subject::Physics)));
        assert!(!SubjectFilter::Only(Subject::Physics).matches(None));
        assert!(!SubjectFilter::Only(Subject::Physics).matches(Some(Subject::Biology)));
    }

    #[test]
    fn test_filter_serializes_as_string() {
        let json = serde_json::to_string(&SubjectFilter::Only(Subject::Biology)).unwrap();
        assert_eq!(json, "\"Biology\"");
        let all: SubjectFilter = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, SubjectFilter::All);
    }
}
