//! Quiz Assembly
//!
//! Picks question segments from the corpus, asks the generator for an MCQ
//! per segment and attaches the segment's associated figure.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::generator::QuestionGenerator;
use super::mcq::{mcq_prompt, parse_mcq, rephrase_prompt};
use crate::corpus::{Corpus, CorpusError, ImageRecord, QuestionSegment};
use crate::documents::subject::{Subject, SubjectFilter};

/// Hard ceiling on questions per request.
pub const MAX_QUIZ_QUESTIONS: usize = 25;

const DEFAULT_QUIZ_QUESTIONS: usize = 10;

#[derive(Error, Debug)]
pub enum QuizError {
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),
    #[error("No material available for subject: {0}")]
    NoMaterial(SubjectFilter),
}

impl Serialize for QuizError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizRequest {
    pub subject: SubjectFilter,
    /// Free-text topic; when present, questions are chosen by similarity
    pub topic: Option<String>,
    pub count: usize,
}

impl Default for QuizRequest {
    fn default() -> Self {
        Self {
            subject: SubjectFilter::All,
            topic: None,
            count: DEFAULT_QUIZ_QUESTIONS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizItem {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub subject: Option<Subject>,
    pub source_question_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// `data:` URL of the associated figure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub questions: Vec<QuizItem>,
    pub subject: SubjectFilter,
    pub count: usize,
}

pub struct QuizService {
    corpus: Arc<Corpus>,
    generator: Arc<dyn QuestionGenerator>,
    max_questions: usize,
}

impl QuizService {
    pub fn new(corpus: Arc<Corpus>, generator: Arc<dyn QuestionGenerator>, max_questions: usize) -> Self {
        Self {
            corpus,
            generator,
            max_questions: max_questions.min(MAX_QUIZ_QUESTIONS),
        }
    }

    pub fn generate(&self, request: &QuizRequest) -> Result<Quiz, QuizError> {
        let count = request.count.min(self.max_questions);
        if count == 0 {
            return Ok(Quiz {
                questions: Vec::new(),
                subject: request.subject,
                count: 0,
            });
        }

        // Extra candidates cover items the generator fails on
        let pool = count.saturating_mul(2);
        let candidates = match request.topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(topic) => self.corpus.retrieve(topic, request.subject, pool)?,
            None => self.corpus.filter_by_subject(request.subject, pool),
        };
        if candidates.is_empty() {
            return Err(QuizError::NoMaterial(request.subject));
        }

        let mut questions = Vec::with_capacity(count);
        for segment in &candidates {
            if questions.len() >= count {
                break;
            }
            if let Some(item) = self.build_item(segment) {
                questions.push(item);
            }
        }

        info!(
            subject = %request.subject,
            candidates = candidates.len(),
            generated = questions.len(),
            "Assembled quiz"
        );
        Ok(Quiz {
            count: questions.len(),
            questions,
            subject: request.subject,
        })
    }

    fn build_item(&self, segment: &QuestionSegment) -> Option<QuizItem> {
        let image = self.corpus.find_associated_image(&segment.id);
        let caption = image.as_ref().map(|img| img.caption.clone());

        let raw = match self
            .generator
            .complete(&mcq_prompt(&segment.text, segment.subject, caption.as_deref()))
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(question = %segment.id, error = %e, "Generation failed, skipping");
                return None;
            }
        };

        let context = image.as_ref().map(|img| img.page_text.as_str()).unwrap_or(segment.text.as_str());
        let rephrased = self
            .generator
            .complete(&rephrase_prompt(&raw, context))
            .unwrap_or_else(|e| {
                debug!(question = %segment.id, error = %e, "Rephrase failed, keeping original");
                raw.clone()
            });

        let mcq = parse_mcq(&rephrased);
        if mcq.question.is_empty() {
            warn!(question = %segment.id, "Generated text had no question, skipping");
            return None;
        }

        let mut item = QuizItem {
            question: mcq.question,
            options: mcq.options,
            answer: mcq.answer,
            subject: segment.subject,
            source_question_id: segment.id.clone(),
            caption,
            ..QuizItem::default()
        };
        if let Some(image) = image {
            match encode_image(&image) {
                Ok(data) => item.image_data = Some(data),
                Err(e) => item.error = Some(format!("Could not encode image: {}", e)),
            }
        }
        Some(item)
    }
}

/// Read an image file into a base64 `data:` URL.
pub fn encode_image(image: &ImageRecord) -> Result<String, std::io::Error> {
    let bytes = fs::read(&image.path)?;
    Ok(format!("data:{};base64,{}", mime_for(&image.path), STANDARD.encode(bytes)))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("jp2") => "image/jp2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::corpus::ingest::tests::{scenario_page, text_page};
    use crate::corpus::RetrievalWindow;
    use crate::documents::embeddings::HashingEmbedder;
    use crate::documents::images::ImageStore;
    use crate::quiz::generator::GenerationError;
    use parking_lot::Mutex;

    const CANNED: &str = "Q: What is the SI unit of force?\nA. Joule\nB. Newton\nC. Watt\nD. Pascal\nAnswer: B. Newton";

    /// Replies from a script; prompts are recorded.
    struct ScriptedGenerator {
        replies: Mutex<Vec<Result<String, GenerationError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<String, GenerationError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn always(reply: &str) -> Self {
            Self::new((0..100).map(|_| Ok(reply.to_string())).collect())
        }
    }

    impl QuestionGenerator for ScriptedGenerator {
        fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().push(prompt.to_string());
            self.replies.lock().pop().unwrap_or(Err(GenerationError::EmptyResponse))
        }
    }

    fn corpus(dir: &Path) -> Arc<Corpus> {
        Arc::new(Corpus::with_parts(
            Arc::new(HashingEmbedder),
            ImageStore::new(dir),
            ExtractionConfig::default(),
            RetrievalWindow::Widening,
        ))
    }

    #[test]
    fn test_generate_attaches_image() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        corpus.ingest_pages("mock.pdf", &[scenario_page(1)]).unwrap();
        let question_id = corpus.filter_by_subject(SubjectFilter::All, 1)[0].id.clone();
        assert!(corpus.find_associated_image(&question_id).is_some());

        let generator = Arc::new(ScriptedGenerator::always(CANNED));
        let service = QuizService::new(corpus, generator.clone(), 25);
        let quiz = service.generate(&QuizRequest::default()).unwrap();

        assert_eq!(quiz.count, 1);
        let item = &quiz.questions[0];
        assert_eq!(item.question, "What is the SI unit of force?");
        assert_eq!(item.answer, "B. Newton");
        assert_eq!(item.subject, Some(Subject::Physics));
        assert!(item.image_data.as_deref().unwrap().starts_with("data:image/png;base64,"));
        assert!(generator.prompts.lock()[0].contains("diagram of force measurement setup"));
    }

    #[test]
    fn test_missing_image_file_sets_error() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        corpus.ingest_pages("mock.pdf", &[scenario_page(1)]).unwrap();
        let question_id = corpus.filter_by_subject(SubjectFilter::All, 1)[0].id.clone();
        let image = corpus.find_associated_image(&question_id).unwrap();
        fs::remove_file(&image.path).unwrap();

        let service = QuizService::new(corpus, Arc::new(ScriptedGenerator::always(CANNED)), 25);
        let quiz = service.generate(&QuizRequest::default()).unwrap();
        assert_eq!(quiz.count, 1);
        assert!(quiz.questions[0].image_data.is_none());
        assert!(quiz.questions[0].error.is_some());
    }

    #[test]
    fn test_failed_generation_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        corpus
            .ingest_pages(
                "doc.pdf",
                &[
                    text_page(1, "Physics. 1. First question long enough to pass the length filter easily."),
                    text_page(2, "2. Second question long enough to pass the length filter easily too."),
                ],
            )
            .unwrap();

        // first segment: generation fails; second: MCQ then a failed rephrase
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::EmptyResponse),
            Ok(CANNED.to_string()),
            Err(GenerationError::Http("timeout".to_string())),
        ]);
        let service = QuizService::new(corpus, Arc::new(generator), 25);
        let quiz = service
            .generate(&QuizRequest {
                count: 2,
                ..QuizRequest::default()
            })
            .unwrap();
        assert_eq!(quiz.count, 1);
        assert_eq!(quiz.questions[0].options.len(), 4);
    }

    #[test]
    fn test_unparseable_output_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        corpus.ingest_pages("mock.pdf", &[scenario_page(1)]).unwrap();
        let service = QuizService::new(corpus, Arc::new(ScriptedGenerator::always("no idea")), 25);
        assert_eq!(service.generate(&QuizRequest::default()).unwrap().count, 0);
    }

    #[test]
    fn test_no_material_for_subject() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        corpus.ingest_pages("mock.pdf", &[scenario_page(1)]).unwrap();
        let service = QuizService::new(corpus, Arc::new(ScriptedGenerator::always(CANNED)), 25);

        let request = QuizRequest {
            subject: SubjectFilter::Only(Subject::Chemistry),
            topic: Some("force".to_string()),
            count: 5,
        };
        assert!(matches!(service.generate(&request), Err(QuizError::NoMaterial(_))));
    }

    #[test]
    fn test_count_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        let pages: Vec<_> = (1..=30)
            .map(|n| text_page(n, &format!("Physics {n}. Question number {n} is long enough to pass the filter.")))
            .collect();
        corpus.ingest_pages("big.pdf", &pages).unwrap();

        let service = QuizService::new(corpus, Arc::new(ScriptedGenerator::always(CANNED)), 100);
        let quiz = service
            .generate(&QuizRequest {
                count: 50,
                ..QuizRequest::default()
            })
            .unwrap();
        assert_eq!(quiz.count, MAX_QUIZ_QUESTIONS);
    }

    #[test]
    fn test_mime_for_extensions() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a.bin")), "application/octet-stream");
    }
}
