//! MCQ prompts and parsing
//!
//! Generation output is free text in the `Q: / A. .. D. / Answer:` layout.
//! Parsing never fails; whatever section is missing comes back empty.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::documents::subject::Subject;

/// Page context passed to the rephrase prompt is cut to this many chars.
pub const CONTEXT_CHARS: usize = 1000;

const OPTION_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

lazy_static! {
    static ref QUESTION: Regex = Regex::new(r"(?s)Q:\s*(.*?)\s*A\.").unwrap();
    static ref ANSWER: Regex = Regex::new(r"Answer:\s*(.*)").unwrap();
    static ref OPTIONS: [Regex; 4] = OPTION_LETTERS.map(|letter| Regex::new(&format!(r"{}\.\s*(.*)", letter)).unwrap());
}

/// A parsed multiple-choice question
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mcq {
    pub question: String,
    /// Up to four options, in A..D order; missing letters are skipped
    pub options: Vec<String>,
    pub answer: String,
}

/// Parse `Q: ... A. ... B. ... C. ... D. ... Answer: ...`.
pub fn parse_mcq(text: &str) -> Mcq {
    let question = QUESTION
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let options = OPTIONS
        .iter()
        .filter_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| m.as_str().trim().lines().next().unwrap_or_default().to_string())
        .collect();

    let answer = ANSWER
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Mcq {
        question,
        options,
        answer,
    }
}

/// Prompt asking for one MCQ built from a question segment and, when the
/// segment has an associated figure, that figure's caption.
pub fn mcq_prompt(segment_text: &str, subject: Option<Subject>, caption: Option<&str>) -> String {
    let subject = subject.map(|s| s.as_str()).unwrap_or("science");
    let figure = match caption.map(str::trim).filter(|c| !c.is_empty()) {
        Some(caption) => format!("\nFigure caption:\n{}\n", caption),
        None => String::new(),
    };

    format!(
        "You are an expert JEE {subject} tutor. Based on the following study material, \
generate one meaningful and original MCQ with 4 options and clearly state the correct answer.

Material:
{segment_text}
{figure}
Format:
Q: ...
A. ...
B. ...
C. ...
D. ...
Answer: ..."
    )
}

/// Prompt asking to reword only the question so it matches the page context.
pub fn rephrase_prompt(mcq: &str, context: &str) -> String {
    let context: String = context.chars().take(CONTEXT_CHARS).collect();
    format!(
        "The following is a multiple-choice question:

{mcq}

Based on the following context, rephrase the question only to better align it with the content, \
keeping the options and answer the same.

Context:
{context}"
    )
}
