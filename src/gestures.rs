use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::landmarks::{Finger, HandPose};

pub const DEFAULT_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    #[default]
    None,
    Open,
    Closed,
    Pointing,
    Victory,
}

impl Gesture {
    pub const ALL: [Gesture; 5] = [
        Gesture::None,
        Gesture::Open,
        Gesture::Closed,
        Gesture::Pointing,
        Gesture::Victory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::None => "none",
            Gesture::Open => "open",
            Gesture::Closed => "closed",
            Gesture::Pointing => "pointing",
            Gesture::Victory => "victory",
        }
    }

    const fn slot(self) -> usize {
        match self {
            Gesture::None => 0,
            Gesture::Open => 1,
            Gesture::Closed => 2,
            Gesture::Pointing => 3,
            Gesture::Victory => 4,
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gesture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gesture::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown gesture '{s}'"))
    }
}

/// Per-finger "unbent" flags, thumb first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extension([bool; 5]);

impl Extension {
    /// A finger counts as extended when its tip is farther from the wrist than
    /// its bend joint in the image plane. Holds while the palm faces the camera.
    pub fn of(pose: &HandPose) -> Self {
        let wrist = pose.wrist();
        let mut out = [false; 5];
        for (slot, finger) in out.iter_mut().zip(Finger::ALL) {
            let (tip, bend) = finger.joints();
            *slot = pose.get(tip).planar_distance(wrist) > pose.get(bend).planar_distance(wrist);
        }
        Self(out)
    }

    pub fn is(&self, finger: Finger) -> bool {
        self.0[finger as usize]
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|e| **e).count()
    }
}

/// Single-frame classification. Never fails: degenerate poses fall through to `None`.
pub fn classify(pose: &HandPose) -> Gesture {
    let ext = Extension::of(pose);
    let n = ext.count();
    let thumb = ext.is(Finger::Thumb);
    let index = ext.is(Finger::Index);
    let middle = ext.is(Finger::Middle);
    let ring = ext.is(Finger::Ring);
    let pinky = ext.is(Finger::Pinky);

    if n == 5 || (n == 4 && !thumb) {
        return Gesture::Open;
    }
    if n == 0 || (n == 1 && thumb) {
        return Gesture::Closed;
    }
    if index && middle && !ring && !pinky {
        return Gesture::Victory;
    }
    if index && !middle && !ring && !pinky {
        return Gesture::Pointing;
    }
    Gesture::None
}

/// The last few single-frame labels, oldest first.
#[derive(Debug, Clone)]
pub struct DebounceWindow {
    labels: VecDeque<Gesture>,
    capacity: usize,
}

impl DebounceWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            labels: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, g: Gesture) {
        if self.labels.len() == self.capacity {
            self.labels.pop_front();
        }
        self.labels.push_back(g);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Majority vote; on a tie the label that first reached the winning count
    /// (scanning oldest to newest) wins.
    pub fn majority(&self) -> Option<Gesture> {
        let mut counts = [0usize; Gesture::ALL.len()];
        let mut best = None;
        let mut max = 0;
        for g in &self.labels {
            let c = &mut counts[g.slot()];
            *c += 1;
            if *c > max {
                max = *c;
                best = Some(*g);
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debounced {
    pub stable: Gesture,
    pub changed: bool,
}

/// Turns noisy per-frame labels into a stable gesture.
///
/// Losing the hand resets to [`Gesture::None`] at once, while a new pose has
/// to win the vote. The window is kept across a loss, so a returning hand
/// resumes voting against its old history.
#[derive(Debug, Clone)]
pub struct GestureDebouncer {
    window: DebounceWindow,
    stable: Gesture,
}

impl Default for GestureDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl GestureDebouncer {
    pub fn new(window: usize) -> Self {
        Self {
            window: DebounceWindow::new(window),
            stable: Gesture::None,
        }
    }

    pub fn stable(&self) -> Gesture {
        self.stable
    }

    pub fn window(&self) -> &DebounceWindow {
        &self.window
    }

    /// Feed one frame's observation; `None` means no hand was detected.
    pub fn observe(&mut self, label: Option<Gesture>) -> Debounced {
        let next = match label {
            None => Gesture::None,
            Some(g) => {
                self.window.push(g);
                self.window.majority().unwrap_or(g)
            }
        };
        let changed = next != self.stable;
        self.stable = next;
        Debounced {
            stable: next,
            changed,
        }
    }
}
