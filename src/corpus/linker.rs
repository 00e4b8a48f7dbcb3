//! Similarity Linker
//!
//! Scores every question against every image on the same page and keeps
//! the pairs that clear `ASSOCIATION_THRESHOLD`.

use std::collections::HashMap;
use tracing::{debug, warn};

use super::model::{Association, AssociationKind, ImageRecord, QuestionSegment, ASSOCIATION_THRESHOLD};
use crate::documents::embeddings::{cosine_similarity, Embedder, Embedding};

/// Cosine similarity of two texts, clamped to [0, 1]. Embedding failures score 0.
pub fn similarity_score(embedder: &dyn Embedder, a: &str, b: &str) -> f32 {
    match (embedder.embed(a), embedder.embed(b)) {
        (Ok(x), Ok(y)) => clamp_score(cosine_similarity(&x, &y)),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Similarity embedding failed, scoring 0");
            0.0
        }
    }
}

fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Link same-page questions and images in one pass.
///
/// `question_vectors[i]` is the already staged embedding of `questions[i]`;
/// only captions are embedded here.
pub fn link(
    embedder: &dyn Embedder,
    questions: &[QuestionSegment],
    question_vectors: &[Embedding],
    images: &[ImageRecord],
) -> Vec<Association> {
    if questions.is_empty() || images.is_empty() {
        return Vec::new();
    }

    // Caption vectors are shared by every question on the page
    let mut captions: HashMap<&str, Option<Embedding>> = HashMap::new();
    for image in images {
        captions.entry(image.id.as_str()).or_insert_with(|| {
            embedder
                .embed(&image.caption)
                .map_err(|e| warn!(image = %image.id, error = %e, "Caption embedding failed"))
                .ok()
        });
    }

    let mut associations = Vec::new();
    for (question, question_vec) in questions.iter().zip(question_vectors) {
        let same_page: Vec<&ImageRecord> = images
            .iter()
            .filter(|img| img.page == question.page && img.source_document == question.source_document)
            .collect();
        if same_page.is_empty() {
            continue;
        }

        for image in same_page {
            let score = match captions.get(image.id.as_str()).and_then(|c| c.as_ref()) {
                Some(caption) => clamp_score(cosine_similarity(question_vec, caption)),
                None => 0.0,
            };
            if score > ASSOCIATION_THRESHOLD {
                associations.push(Association {
                    question_id: question.id.clone(),
                    image_id: image.id.clone(),
                    score,
                    kind: AssociationKind::Semantic,
                });
            }
        }
    }

    debug!(
        questions = questions.len(),
        images = images.len(),
        associations = associations.len(),
        "Linked page content"
    );
    associations
}
