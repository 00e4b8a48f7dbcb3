//! Question Corpus Module
//!
//! Vector stores, similarity linking and retrieval over the segments and
//! images extracted from ingested documents.

pub mod index;
pub mod ingest;
pub mod linker;
pub mod model;
pub mod repository;
pub mod retriever;
pub mod store;

// Re-export key public types
pub use model::{
    Association, AssociationKind, CorpusStats, ImageRecord, IngestResult, QuestionSegment,
    ASSOCIATION_THRESHOLD,
};
pub use repository::{Corpus, CorpusError, DocumentSummary, RebuildReport};
pub use retriever::{RetrievalWindow, ScoredSegment};
pub use store::StoreError;
