//! Contract errors raised at the boundaries of the core.

use thiserror::Error;

use crate::landmarks::LANDMARK_COUNT;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A hand pose must carry exactly 21 landmarks.
    #[error("expected {LANDMARK_COUNT} hand landmarks, got {got}")]
    LandmarkCount { got: usize },

    /// Particle populations cannot have a negative size.
    #[error("particle count must be non-negative, got {requested}")]
    NegativeCount { requested: i64 },

    /// Tint strings are `#rrggbb`.
    #[error("invalid tint '{0}': expected #rrggbb")]
    InvalidTint(String),
}

pub type Result<T> = std::result::Result<T, Error>;
