//! Document Extraction
//!
//! Turns decoded page layouts into question segments and image records.
//! Subject tagging runs across the whole document in page order, so a
//! subject detected on one page carries over to the pages after it.

use tracing::{debug, info};
use ulid::Ulid;

use super::model::{ImageRecord, QuestionSegment};
use crate::config::ExtractionConfig;
use crate::documents::images::{ImageStore, ImageStoreError, StagedImage};
use crate::documents::layout::PageLayout;
use crate::documents::segmenter::{segment_page, SegmentDeduper};
use crate::documents::spatial::SpatialAssociator;
use crate::documents::subject::SubjectTagger;

/// Records cut from one document, not yet embedded
#[derive(Debug, Default)]
pub struct Extraction {
    pub questions: Vec<QuestionSegment>,
    pub images: Vec<ImageRecord>,
    /// Image files waiting to be promoted once the batch commits
    pub staged: Vec<StagedImage>,
}

/// Extract segments and figures from `pages`, staging figures in `image_store`.
///
/// Image records already carry their final path. If staging an image fails,
/// the files staged for this document are removed before the error is
/// returned.
pub fn extract_document(
    name: &str,
    pages: &[PageLayout],
    settings: &ExtractionConfig,
    image_store: &ImageStore,
) -> Result<Extraction, ImageStoreError> {
    let associator = SpatialAssociator::new(settings.proximity, settings.caption_distance);
    let mut tagger = SubjectTagger::new();
    let mut deduper = settings.dedupe_segments.then(SegmentDeduper::default);
    let mut out = Extraction::default();

    for page in pages {
        let subject = tagger.observe_page(&page.text);

        for segment in segment_page(&page.text, settings.min_segment_chars) {
            if let Some(deduper) = deduper.as_mut() {
                if !deduper.admit(&segment) {
                    continue;
                }
            }
            out.questions.push(QuestionSegment::new(segment, page.number, name, subject));
        }

        for placed in &page.images {
            let staged = match image_store.stage(name, page.number, placed.index, &placed.ext, &placed.bytes) {
                Ok(staged) => staged,
                Err(e) => {
                    image_store.discard(&out.staged);
                    return Err(e);
                }
            };

            out.images.push(ImageRecord {
                id: Ulid::new().to_string(),
                path: staged.target.clone(),
                page: page.number,
                source_document: name.to_string(),
                subject,
                rect: placed.rect,
                caption: associator.caption_for(&placed.rect, &page.words),
                page_text: page.text.clone(),
            });
            out.staged.push(staged);
        }

        debug!(document = %name, page = page.number, subject = ?subject, "Extracted page");
    }

    info!(
        document = %name,
        pages = pages.len(),
        questions = out.questions.len(),
        images = out.images.len(),
        "Extracted document"
    );
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::documents::layout::{PlacedImage, Rect, Word};
    use crate::documents::segmenter::SegmentPattern;
    use crate::documents::subject::Subject;

    /// Words laid out left to right on one line starting at (x, y).
    pub(crate) fn words_at(text: &str, x: f32, y: f32) -> Vec<Word> {
        let mut cursor = x;
        text.split_whitespace()
            .map(|w| {
                let width = w.len() as f32 * 5.0;
                let word = Word {
                    text: w.to_string(),
                    rect: Rect::new(cursor, y, width, 10.0),
                };
                cursor += width + 3.0;
                word
            })
            .collect()
    }

    /// Page with a question, a figure and the figure's caption just below it.
    pub(crate) fn scenario_page(number: u32) -> PageLayout {
        let mut words = words_at("This is physics content. 12. What is the unit of force?", 400.0, 600.0);
        words.extend(words_at("diagram of force measurement setup", 72.0, 265.0));
        PageLayout {
            number,
            text: "This is physics content. 12. What is the unit of force?\ndiagram of force measurement setup"
                .to_string(),
            words,
            images: vec![PlacedImage {
                index: 1,
                ext: "png".to_string(),
                bytes: vec![0x89, b'P', b'N', b'G'],
                rect: Rect::new(72.0, 100.0, 200.0, 150.0),
            }],
        }
    }

    pub(crate) fn text_page(number: u32, text: &str) -> PageLayout {
        PageLayout {
            number,
            text: text.to_string(),
            words: words_at(text, 72.0, 72.0),
            images: Vec::new(),
        }
    }

    #[test]
    fn test_scenario_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let out = extract_document("mock.pdf", &[scenario_page(1)], &ExtractionConfig::default(), &store).unwrap();

        assert_eq!(out.questions.len(), 1);
        assert_eq!(out.questions[0].pattern, SegmentPattern::NumberedList);
        assert_eq!(out.questions[0].subject, Some(Subject::Physics));

        assert_eq!(out.images.len(), 1);
        let image = &out.images[0];
        assert_eq!(image.caption, "diagram of force measurement setup");
        assert_eq!(image.subject, Some(Subject::Physics));
        assert!(image.path.ends_with("mock.pdf_p1_img1.png"));
        assert!(!image.path.exists());
        assert_eq!(out.staged.len(), 1);
        assert_eq!(out.staged[0].target, image.path);
        assert!(out.staged[0].staging.exists());
    }

    #[test]
    fn test_subject_carries_across_pages() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let pages = [
            text_page(1, "Unit one: physics basics. 1. State Newton's first law of motion with an example."),
            text_page(2, "2. Define momentum and give its SI unit along with a worked derivation here."),
        ];
        let out = extract_document("doc.pdf", &pages, &ExtractionConfig::default(), &store).unwrap();
        assert!(!out.questions.is_empty());
        assert!(out.questions.iter().all(|q| q.subject == Some(Subject::Physics)));
        assert!(out.questions.iter().any(|q| q.page == 2));
    }

    #[test]
    fn test_dedupe_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let text = "Q1. (1) Explain why the sky appears blue during the day and red at sunset.";
        let pages = [text_page(1, text), text_page(2, text)];

        let plain = extract_document("doc.pdf", &pages, &ExtractionConfig::default(), &store).unwrap();
        let deduped = extract_document(
            "doc.pdf",
            &pages,
            &ExtractionConfig {
                dedupe_segments: true,
                ..ExtractionConfig::default()
            },
            &store,
        )
        .unwrap();
        assert!(deduped.questions.len() < plain.questions.len());
    }
}
