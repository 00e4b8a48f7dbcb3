//! Answer evaluation

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Serialize for EvaluationError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// The fields of a quiz item that grading needs. Extra fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradedQuestion {
    pub question: String,
    pub answer: String,
}

/// Payload accepted by `evaluate` from JSON
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluationRequest {
    pub questions: Vec<GradedQuestion>,
    pub user_answers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetail {
    pub question: String,
    pub correct_answer: String,
    pub user_answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub total: usize,
    pub score: usize,
    pub details: Vec<EvaluationDetail>,
}

/// Grade answers by exact match. Empty inputs or differing lengths are
/// rejected without scoring anything.
pub fn evaluate(questions: &[GradedQuestion], user_answers: &[String]) -> Result<Evaluation, EvaluationError> {
    if questions.is_empty() || user_answers.is_empty() {
        return Err(EvaluationError::InvalidInput("questions and answers must not be empty".to_string()));
    }
    if questions.len() != user_answers.len() {
        return Err(EvaluationError::InvalidInput(format!(
            "{} questions but {} answers",
            questions.len(),
            user_answers.len()
        )));
    }

    let details: Vec<EvaluationDetail> = questions
        .iter()
        .zip(user_answers)
        .map(|(q, ua)| EvaluationDetail {
            question: q.question.clone(),
            correct_answer: q.answer.clone(),
            user_answer: ua.clone(),
            is_correct: q.answer == *ua,
        })
        .collect();

    Ok(Evaluation {
        total: details.len(),
        score: details.iter().filter(|d| d.is_correct).count(),
        details,
    })
}

impl EvaluationRequest {
    pub fn evaluate(&self) -> Result<Evaluation, EvaluationError> {
        evaluate(&self.questions, &self.user_answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(question: &str, answer: &str) -> GradedQuestion {
        GradedQuestion {
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    #[test]
    fn test_scores_exact_matches() {
        let questions = [q("unit of force", "B. Newton"), q("unit of power", "C. Watt")];
        let answers = ["B. Newton".to_string(), "A. Joule".to_string()];
        let result = evaluate(&questions, &answers).unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.score, 1);
        assert!(result.details[0].is_correct);
        assert_eq!(result.details[1].user_answer, "A. Joule");
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        assert!(evaluate(&[], &[]).is_err());
        assert!(evaluate(&[q("a", "b")], &[]).is_err());
        let err = evaluate(&[q("a", "b")], &["b".to_string(), "c".to_string()]).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidInput(_)));
    }

    #[test]
    fn test_request_from_json() {
        let request: EvaluationRequest = serde_json::from_str(
            r#"{"questions": [{"question": "q", "answer": "A", "options": ["x"]}], "userAnswers": ["A"]}"#,
        )
        .unwrap();
        assert_eq!(request.evaluate().unwrap().score, 1);
    }
}
