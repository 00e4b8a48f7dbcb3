//! Corpus Repository
//!
//! Owns the question and image stores plus the association list. Readers
//! share a read lock. Writers are serialised by the ingest gate, do their
//! extraction and embedding without touching shared state, and publish a
//! whole document under a single write-lock acquisition.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::ingest::extract_document;
use super::linker::link;
use super::model::{
    Association, CorpusStats, ImageRecord, IngestResult, QuestionSegment, UNASSIGNED_SUBJECT,
};
use super::retriever::{self, RetrievalWindow, ScoredSegment};
use super::store::{StagedBatch, StoreError, VectorStore};
use crate::config::{Config, ExtractionConfig};
use crate::documents::embeddings::{Embedder, EmbeddingError};
use crate::documents::images::{ImageStore, ImageStoreError, StagedImage};
use crate::documents::layout::{read_pdf, LayoutError, PageLayout};
use crate::documents::subject::{Subject, SubjectFilter};

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("Image storage error: {0}")]
    Images(#[from] ImageStoreError),
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Vector store error: {0}")]
    Store(StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to ingest {name}: {source}")]
    Document {
        name: String,
        #[source]
        source: Box<CorpusError>,
    },
}

impl From<StoreError> for CorpusError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Embedding(inner) => CorpusError::Embedding(inner),
            other => CorpusError::Store(other),
        }
    }
}

impl Serialize for CorpusError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Per-document line of a rebuild report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub name: String,
    pub questions: usize,
    pub images: usize,
    pub associations: usize,
}

/// Outcome of a full reset and re-ingest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub documents: Vec<DocumentSummary>,
    pub stats: CorpusStats,
}

#[derive(Debug, Default)]
struct CorpusState {
    questions: VectorStore<QuestionSegment>,
    images: VectorStore<ImageRecord>,
    associations: Vec<Association>,
}

impl CorpusState {
    fn is_consistent(&self) -> bool {
        self.questions.is_consistent() && self.images.is_consistent()
    }
}

/// Fully embedded document waiting for the write lock
struct StagedDocument {
    questions: StagedBatch<QuestionSegment>,
    images: StagedBatch<ImageRecord>,
    associations: Vec<Association>,
}

pub struct Corpus {
    state: RwLock<CorpusState>,
    ingest_gate: Mutex<()>,
    embedder: Arc<dyn Embedder>,
    image_store: ImageStore,
    extraction: ExtractionConfig,
    window: RetrievalWindow,
}

impl Corpus {
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self::with_parts(
            embedder,
            ImageStore::new(&config.paths.images_dir),
            config.extraction.clone(),
            config.retrieval.window,
        )
    }

    pub fn with_parts(
        embedder: Arc<dyn Embedder>,
        image_store: ImageStore,
        extraction: ExtractionConfig,
        window: RetrievalWindow,
    ) -> Self {
        Self {
            state: RwLock::new(CorpusState::default()),
            ingest_gate: Mutex::new(()),
            embedder,
            image_store,
            extraction,
            window,
        }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn image_store(&self) -> &ImageStore {
        &self.image_store
    }

    // ============ Ingestion ============

    /// Decode a PDF and add its questions, images and associations.
    pub fn ingest_document(&self, bytes: &[u8], name: &str) -> Result<IngestResult, CorpusError> {
        let pages = read_pdf(bytes)?;
        self.ingest_pages(name, &pages)
    }

    /// Ingest a PDF file, named by its file name.
    pub fn ingest_file(&self, path: &Path) -> Result<IngestResult, CorpusError> {
        let bytes = fs::read(path)?;
        self.ingest_document(&bytes, &document_name(path))
    }

    /// Add already-decoded pages as one document.
    pub fn ingest_pages(&self, name: &str, pages: &[PageLayout]) -> Result<IngestResult, CorpusError> {
        let _gate = self.ingest_gate.lock();
        self.ingest_gated(name, pages)
    }

    /// Caller must hold the ingest gate.
    fn ingest_gated(&self, name: &str, pages: &[PageLayout]) -> Result<IngestResult, CorpusError> {
        let extraction = extract_document(name, pages, &self.extraction, &self.image_store)?;
        let files = extraction.staged;

        let staged = match self.stage(extraction.questions, extraction.images) {
            Ok(staged) => staged,
            Err(e) => {
                warn!(document = %name, error = %e, "Embedding failed, discarding batch");
                self.image_store.discard(&files);
                return Err(e);
            }
        };

        let result = IngestResult {
            question_segments: staged.questions.records().to_vec(),
            image_records: staged.images.records().to_vec(),
            associations: staged.associations.clone(),
        };

        if let Err(e) = self.publish(staged, &files) {
            error!(document = %name, error = %e, "Commit failed, discarding batch");
            self.image_store.discard(&files);
            return Err(e);
        }

        info!(
            document = %name,
            questions = result.question_segments.len(),
            images = result.image_records.len(),
            associations = result.associations.len(),
            "Ingested document"
        );
        Ok(result)
    }

    fn stage(
        &self,
        questions: Vec<QuestionSegment>,
        images: Vec<ImageRecord>,
    ) -> Result<StagedDocument, CorpusError> {
        let embedder = self.embedder.as_ref();
        let questions = StagedBatch::embed(questions, embedder, |q| q.text.clone())?;
        let images = StagedBatch::embed(images, embedder, ImageRecord::embedding_text)?;
        let associations = link(embedder, questions.records(), questions.vectors(), images.records());
        Ok(StagedDocument {
            questions,
            images,
            associations,
        })
    }

    /// Append a staged document under one write lock, all or nothing.
    /// Image files move to their final names before the lock is released.
    fn publish(&self, staged: StagedDocument, files: &[StagedImage]) -> Result<(), CorpusError> {
        let mut state = self.state.write();
        let questions_before = state.questions.len();
        let images_before = state.images.len();

        state.questions.commit(staged.questions)?;
        if let Err(e) = state.images.commit(staged.images) {
            state.questions.truncate(questions_before);
            return Err(e.into());
        }
        if let Err(e) = self.image_store.promote(files) {
            state.questions.truncate(questions_before);
            state.images.truncate(images_before);
            return Err(e.into());
        }
        state.associations.extend(staged.associations);

        debug_assert!(state.is_consistent());
        Ok(())
    }

    /// Drop every record. Image files are left in place.
    pub fn clear(&self) {
        let _gate = self.ingest_gate.lock();
        self.clear_gated();
    }

    fn clear_gated(&self) {
        let mut state = self.state.write();
        state.questions.clear();
        state.images.clear();
        state.associations.clear();
    }

    /// Clear the corpus and ingest `documents` in order, holding the ingest
    /// gate throughout. Stops at the first failing document; documents
    /// before it stay ingested.
    pub fn reset_and_reingest_all(&self, documents: &[(String, Vec<u8>)]) -> Result<RebuildReport, CorpusError> {
        let _gate = self.ingest_gate.lock();
        let started_at = Utc::now();
        self.clear_gated();

        let mut summaries = Vec::with_capacity(documents.len());
        for (name, bytes) in documents {
            let result = read_pdf(bytes)
                .map_err(CorpusError::from)
                .and_then(|pages| self.ingest_gated(name, &pages))
                .map_err(|e| CorpusError::Document {
                    name: name.clone(),
                    source: Box::new(e),
                })?;
            summaries.push(DocumentSummary {
                name: name.clone(),
                questions: result.question_segments.len(),
                images: result.image_records.len(),
                associations: result.associations.len(),
            });
        }

        let report = RebuildReport {
            started_at,
            completed_at: Utc::now(),
            documents: summaries,
            stats: self.stats(),
        };
        info!(
            documents = report.documents.len(),
            questions = report.stats.question_count,
            images = report.stats.image_count,
            "Rebuilt corpus"
        );
        Ok(report)
    }

    /// Rebuild from every `.pdf` in `dir`, in file-name order. A missing
    /// directory is created and yields an empty corpus.
    pub fn rebuild_from_dir(&self, dir: &Path) -> Result<RebuildReport, CorpusError> {
        fs::create_dir_all(dir)?;

        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_pdf(path))
            .collect();
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push((document_name(&path), fs::read(&path)?));
        }

        self.reset_and_reingest_all(&documents)
    }

    // ============ Queries ============

    /// Up to `k` questions nearest to `query` within `filter`.
    pub fn retrieve(&self, query: &str, filter: SubjectFilter, k: usize) -> Result<Vec<QuestionSegment>, CorpusError> {
        Ok(self
            .retrieve_scored(query, filter, k)?
            .into_iter()
            .map(|hit| hit.segment)
            .collect())
    }

    /// Like [`Corpus::retrieve`] with distances attached.
    ///
    /// The query is embedded before the read lock is taken, so a slow
    /// embedding backend never holds up ingestion.
    pub fn retrieve_scored(
        &self,
        query: &str,
        filter: SubjectFilter,
        k: usize,
    ) -> Result<Vec<ScoredSegment>, CorpusError> {
        if k == 0 || self.state.read().questions.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = retriever::embed_query(self.embedder.as_ref(), query)?;

        let state = self.state.read();
        Ok(retriever::rank(
            &state.questions,
            query_vec.as_deref(),
            filter,
            k,
            self.window,
        )?)
    }

    pub fn filter_by_subject(&self, filter: SubjectFilter, k: usize) -> Vec<QuestionSegment> {
        retriever::filter_by_subject(self.state.read().questions.records(), filter, k)
    }

    pub fn question(&self, question_id: &str) -> Option<QuestionSegment> {
        self.state
            .read()
            .questions
            .records()
            .iter()
            .find(|q| q.id == question_id)
            .cloned()
    }

    /// Image of the first association recorded for `question_id`.
    pub fn find_associated_image(&self, question_id: &str) -> Option<ImageRecord> {
        let state = self.state.read();
        let association = state.associations.iter().find(|a| a.question_id == question_id)?;
        state
            .images
            .records()
            .iter()
            .find(|img| img.id == association.image_id)
            .cloned()
    }

    pub fn stats(&self) -> CorpusStats {
        let state = self.state.read();
        let mut subject_distribution = BTreeMap::new();
        for q in state.questions.records() {
            let key = q
                .subject
                .map(|s| s.as_str())
                .unwrap_or(UNASSIGNED_SUBJECT)
                .to_string();
            *subject_distribution.entry(key).or_insert(0) += 1;
        }

        CorpusStats {
            question_count: state.questions.len(),
            image_count: state.images.len(),
            association_count: state.associations.len(),
            subject_distribution,
        }
    }

    /// Distinct subjects across questions and images.
    pub fn subjects(&self) -> Vec<Subject> {
        let state = self.state.read();
        let subjects: BTreeSet<Subject> = state
            .questions
            .records()
            .iter()
            .filter_map(|q| q.subject)
            .chain(state.images.records().iter().filter_map(|img| img.subject))
            .collect();
        subjects.into_iter().collect()
    }

    /// Both stores have as many vectors as metadata entries.
    pub fn is_consistent(&self) -> bool {
        self.state.read().is_consistent()
    }

    /// Vector counts `(questions, images)` as held by the indices.
    pub fn vector_counts(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.questions.vector_count(), state.images.vector_count())
    }
}

/// True for paths with a `.pdf` extension, any case.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
