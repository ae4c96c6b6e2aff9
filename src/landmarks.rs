//! Hand landmarks and per-frame snapshots from the tracker.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

/// One tracked point in normalized camera space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance in the image plane; depth is ignored.
    pub fn planar_distance(&self, other: &Landmark) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<[f32; 3]> for Landmark {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// (tip, bend reference) indices. The thumb has no PIP joint, so its MCP is used.
    pub const fn joints(self) -> (usize, usize) {
        match self {
            Finger::Thumb => (THUMB_TIP, THUMB_MCP),
            Finger::Index => (INDEX_TIP, INDEX_PIP),
            Finger::Middle => (MIDDLE_TIP, MIDDLE_PIP),
            Finger::Ring => (RING_TIP, RING_PIP),
            Finger::Pinky => (PINKY_TIP, PINKY_PIP),
        }
    }
}

/// A validated single-hand pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandPose {
    points: [Landmark; LANDMARK_COUNT],
}

impl HandPose {
    pub const fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Validate a raw landmark list coming from a tracker.
    pub fn from_points(points: &[Landmark]) -> Result<Self> {
        let points: [Landmark; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| Error::LandmarkCount { got: points.len() })?;
        Ok(Self { points })
    }

    pub fn wrist(&self) -> &Landmark {
        &self.points[WRIST]
    }

    pub fn get(&self, idx: usize) -> &Landmark {
        &self.points[idx]
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }
}

/// What the tracker saw for one camera frame. `hand` is `None` when no hand
/// was detected; a `Some` list is unvalidated until turned into a [`HandPose`].
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    pub timestamp_ms: u64,
    pub hand: Option<Vec<Landmark>>,
}

impl LandmarkFrame {
    pub fn absent(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            hand: None,
        }
    }

    pub fn with_pose(timestamp_ms: u64, pose: &HandPose) -> Self {
        Self {
            timestamp_ms,
            hand: Some(pose.points().to_vec()),
        }
    }
}
