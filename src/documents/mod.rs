//! Source Document Processing Module
//!
//! Reads PDF page layouts and cuts them into subject-tagged question
//! segments and captioned figures, plus the embedding gateway used to
//! index them.

pub mod embeddings;
pub mod images;
pub mod layout;
pub mod segmenter;
pub mod spatial;
pub mod subject;

// Re-export key public types
pub use embeddings::{Embedder, Embedding, EmbeddingError, HashingEmbedder, HttpEmbedder, EMBEDDING_DIM};
pub use images::{ImageStore, ImageStoreError};
pub use layout::{read_pdf, LayoutError, PageLayout, PlacedImage, Rect, Word};
pub use segmenter::{Segment, SegmentPattern};
pub use spatial::{ProximityStrategy, SpatialAssociator};
pub use subject::{Subject, SubjectFilter, SubjectTagger};
