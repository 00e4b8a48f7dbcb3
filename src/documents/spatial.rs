//! Spatial Association
//!
//! Builds an image caption from the words printed near it. How "near" is
//! measured is a swappable strategy; callers only see `caption_for`.

use serde::{Deserialize, Serialize};

use super::layout::{Rect, Word};

/// Default caption distance threshold, in page units.
pub const DEFAULT_CAPTION_DISTANCE: f32 = 100.0;

/// Distance measure between a word box and an image box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityStrategy {
    /// Smallest single-axis edge gap. A word far away diagonally but
    /// aligned on one axis still counts as near.
    #[default]
    AxisGap,
    /// Euclidean gap between the rectangles, 0 when they overlap.
    Planar,
}

impl ProximityStrategy {
    pub fn distance(&self, word: &Rect, image: &Rect) -> f32 {
        match self {
            ProximityStrategy::AxisGap => axis_gap(word, image),
            ProximityStrategy::Planar => planar_gap(word, image),
        }
    }
}

fn axis_gap(word: &Rect, image: &Rect) -> f32 {
    [
        (word.x0() - image.x1()).abs(),
        (word.x1() - image.x0()).abs(),
        (word.y0() - image.y1()).abs(),
        (word.y1() - image.y0()).abs(),
    ]
    .into_iter()
    .fold(f32::INFINITY, f32::min)
}

fn planar_gap(word: &Rect, image: &Rect) -> f32 {
    let dx = (image.x0() - word.x1()).max(word.x0() - image.x1()).max(0.0);
    let dy = (image.y0() - word.y1()).max(word.y0() - image.y1()).max(0.0);
    dx.hypot(dy)
}

/// Caption builder for one page
#[derive(Debug, Clone, Copy)]
pub struct SpatialAssociator {
    pub strategy: ProximityStrategy,
    pub max_distance: f32,
}

impl Default for SpatialAssociator {
    fn default() -> Self {
        Self {
            strategy: ProximityStrategy::default(),
            max_distance: DEFAULT_CAPTION_DISTANCE,
        }
    }
}

impl SpatialAssociator {
    pub fn new(strategy: ProximityStrategy, max_distance: f32) -> Self {
        Self { strategy, max_distance }
    }

    /// Words within `max_distance` of the image, joined in scan order.
    pub fn caption_for(&self, image: &Rect, words: &[Word]) -> String {
        words
            .iter()
            .filter(|w| self.strategy.distance(&w.rect, image) <= self.max_distance)
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
