//! Quiz Module
//!
//! Turns retrieved question segments into multiple-choice questions via a
//! language model and grades submitted answers.

pub mod evaluate;
pub mod generator;
pub mod mcq;
pub mod service;

// Re-export key public types
pub use evaluate::{evaluate, Evaluation, EvaluationDetail, EvaluationError, EvaluationRequest, GradedQuestion};
pub use generator::{ChatCompletionsClient, GenerationError, QuestionGenerator};
pub use mcq::{parse_mcq, Mcq};
pub use service::{Quiz, QuizError, QuizItem, QuizRequest, QuizService, MAX_QUIZ_QUESTIONS};
