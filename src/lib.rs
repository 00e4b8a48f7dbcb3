// Quizcorpus Library
// Exports core modules for use by both the daemon and the CLI binary

pub mod config;
pub mod corpus;
pub mod documents;
pub mod quiz;
pub mod watcher;

// Re-export commonly used types for CLI
pub use config::{Config, ConfigError};
pub use corpus::{
    Association, Corpus, CorpusError, CorpusStats, ImageRecord, IngestResult, QuestionSegment,
    RebuildReport, RetrievalWindow,
};
pub use documents::embeddings::{build_embedder, Embedder, EmbeddingError};
pub use documents::subject::{Subject, SubjectFilter};
pub use quiz::{
    evaluate, parse_mcq, ChatCompletionsClient, Evaluation, EvaluationError, EvaluationRequest,
    Mcq, QuestionGenerator, Quiz, QuizRequest, QuizService,
};
