//! Corpus records
//!
//! Question segments, image records and the associations between them.
//! All three are immutable once created.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use ulid::Ulid;

use crate::documents::layout::Rect;
use crate::documents::segmenter::{Segment, SegmentPattern};
use crate::documents::subject::Subject;

/// Associations are only recorded above this cosine similarity.
pub const ASSOCIATION_THRESHOLD: f32 = 0.3;

/// Candidate quiz question cut from a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSegment {
    pub id: String,
    pub text: String,
    /// 1-based page number
    pub page: u32,
    pub source_document: String,
    pub subject: Option<Subject>,
    pub pattern: SegmentPattern,
    /// Index of `pattern` (0..=3)
    pub pattern_index: u8,
    pub word_count: u32,
}

impl QuestionSegment {
    pub fn new(segment: Segment, page: u32, source_document: &str, subject: Option<Subject>) -> Self {
        let word_count = segment.word_count();
        Self {
            id: Ulid::new().to_string(),
            page,
            source_document: source_document.to_string(),
            subject,
            pattern_index: segment.pattern.index(),
            pattern: segment.pattern,
            word_count,
            text: segment.text,
        }
    }
}

/// Figure extracted from a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub path: PathBuf,
    pub page: u32,
    pub source_document: String,
    pub subject: Option<Subject>,
    pub rect: Rect,
    /// Text printed near the image
    pub caption: String,
    /// Full text of the page the image sits on
    pub page_text: String,
}

/// Characters of page text appended to the caption for image embeddings.
pub const IMAGE_CONTEXT_CHARS: usize = 500;

impl ImageRecord {
    /// Text embedded into the image index: caption, then the start of the page.
    pub fn embedding_text(&self) -> String {
        let context: String = self.page_text.chars().take(IMAGE_CONTEXT_CHARS).collect();
        format!("{} {}", self.caption, context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationKind {
    Semantic,
}

/// Link between a question and an image on the same page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub question_id: String,
    pub image_id: String,
    /// Cosine similarity clamped to [0, 1]
    pub score: f32,
    pub kind: AssociationKind,
}

/// Outcome of ingesting one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub question_segments: Vec<QuestionSegment>,
    pub image_records: Vec<ImageRecord>,
    pub associations: Vec<Association>,
}

/// Corpus summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusStats {
    pub question_count: usize,
    pub image_count: usize,
    pub association_count: usize,
    /// Question segments per subject; unset subjects count under "Unassigned"
    pub subject_distribution: BTreeMap<String, usize>,
}

pub const UNASSIGNED_SUBJECT: &str = "Unassigned";
