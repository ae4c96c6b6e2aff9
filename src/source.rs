//! Landmark sources: where per-frame hand landmarks come from.

use anyhow::{Result, anyhow};
use log::{debug, warn};
use serde::Deserialize;
use std::{
    fs::File,
    io::{BufRead, BufReader, ErrorKind},
    path::Path,
    thread,
    time::Duration,
};

use crate::gestures::Gesture;
use crate::landmarks::{HandPose, LANDMARK_COUNT, Landmark, LandmarkFrame};

/// Produces one [`LandmarkFrame`] per processed camera frame.
/// `None` means the source is exhausted.
pub trait LandmarkSource: Send {
    fn next_frame(&mut self) -> Option<LandmarkFrame>;
}

// --------- canonical poses ----------

const WRIST_AT: (f32, f32) = (0.5, 0.8);

/// An upright right hand, palm to camera, with each finger either straight
/// or curled (thumb first).
pub fn pose_from_fingers(extended: [bool; 5]) -> HandPose {
    let mut pts = [Landmark::default(); LANDMARK_COUNT];
    pts[0] = Landmark::new(WRIST_AT.0, WRIST_AT.1, 0.0);

    // thumb: cmc, mcp, ip, tip fanning out to the left
    pts[1] = Landmark::new(0.42, 0.75, -0.01);
    pts[2] = Landmark::new(0.36, 0.68, -0.02);
    pts[3] = Landmark::new(0.31, 0.63, -0.03);
    pts[4] = if extended[0] {
        Landmark::new(0.27, 0.58, -0.04)
    } else {
        Landmark::new(0.44, 0.70, -0.02)
    };

    // index..pinky: mcp, pip, dip, tip in a column each
    for (k, x) in [0.44f32, 0.50, 0.56, 0.62].into_iter().enumerate() {
        let base = 5 + 4 * k;
        pts[base] = Landmark::new(x, 0.65, -0.01);
        pts[base + 1] = Landmark::new(x, 0.55, -0.02);
        if extended[k + 1] {
            pts[base + 2] = Landmark::new(x, 0.50, -0.03);
            pts[base + 3] = Landmark::new(x, 0.45, -0.04);
        } else {
            pts[base + 2] = Landmark::new(x, 0.60, 0.01);
            pts[base + 3] = Landmark::new(x, 0.66, 0.02);
        }
    }
    HandPose::new(pts)
}

/// A pose that classifies as `g`, or `None` for an absent hand.
pub fn canonical_pose(g: Gesture) -> Option<HandPose> {
    let fingers = match g {
        Gesture::Open => [true; 5],
        Gesture::Closed => [false; 5],
        Gesture::Pointing => [false, true, false, false, false],
        Gesture::Victory => [false, true, true, false, false],
        Gesture::None => return None,
    };
    Some(pose_from_fingers(fingers))
}

// --------- synthetic ----------

/// Plays a fixed script of gestures, each held for a number of frames.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    script: Vec<(Gesture, u32)>,
    step: usize,
    held: u32,
    frame_ms: u64,
    timestamp_ms: u64,
    paced: bool,
    repeat: bool,
}

impl SyntheticSource {
    pub fn new(mut script: Vec<(Gesture, u32)>, frame_ms: u64) -> Self {
        script.retain(|(_, frames)| *frames > 0);
        Self {
            script,
            step: 0,
            held: 0,
            frame_ms,
            timestamp_ms: 0,
            paced: false,
            repeat: false,
        }
    }

    /// Cycles through every gesture, about two seconds each at 30 fps.
    pub fn demo() -> Self {
        let script = [
            Gesture::Open,
            Gesture::Closed,
            Gesture::Pointing,
            Gesture::Victory,
            Gesture::None,
        ]
        .into_iter()
        .map(|g| (g, 60))
        .collect();
        Self::new(script, 33).paced(true).repeating(true)
    }

    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn repeating(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }
}

impl LandmarkSource for SyntheticSource {
    fn next_frame(&mut self) -> Option<LandmarkFrame> {
        while self.step < self.script.len() && self.held >= self.script[self.step].1 {
            self.step += 1;
            self.held = 0;
            if self.step == self.script.len() && self.repeat {
                self.step = 0;
            }
        }
        let (g, _) = *self.script.get(self.step)?;
        self.held += 1;

        if self.paced && self.timestamp_ms > 0 {
            thread::sleep(Duration::from_millis(self.frame_ms));
        }
        let ts = self.timestamp_ms;
        self.timestamp_ms += self.frame_ms;

        Some(match canonical_pose(g) {
            Some(pose) => LandmarkFrame::with_pose(ts, &pose),
            None => LandmarkFrame::absent(ts),
        })
    }
}

// --------- replay ----------

#[derive(Debug, Deserialize)]
struct ReplayLine {
    timestamp_ms: u64,
    #[serde(default)]
    landmarks: Option<Vec<[f32; 3]>>,
}

/// Replays a JSON-lines landmark capture, one frame per line:
/// `{"timestamp_ms": 16, "landmarks": [[x, y, z], ...]}` or `"landmarks": null`.
pub struct ReplaySource {
    lines: std::io::Lines<BufReader<File>>,
    line_no: usize,
    last_ts: Option<u64>,
    paced: bool,
}

impl ReplaySource {
    pub fn open(path: &Path, paced: bool) -> Result<Self> {
        let f = File::open(path).map_err(|e| anyhow!("failed to open {}: {e}", path.display()))?;
        Ok(Self {
            lines: BufReader::new(f).lines(),
            line_no: 0,
            last_ts: None,
            paced,
        })
    }
}

impl LandmarkSource for ReplaySource {
    fn next_frame(&mut self) -> Option<LandmarkFrame> {
        loop {
            let next = self.lines.next()?;
            self.line_no += 1;
            let line = match next {
                Ok(l) => l,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    warn!("replay: skipping line {}: {e}", self.line_no);
                    continue;
                }
                Err(e) => {
                    warn!("replay: read failed at line {}: {e}", self.line_no);
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let rec: ReplayLine = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("replay: skipping line {}: {e}", self.line_no);
                    continue;
                }
            };

            if self.paced {
                if let Some(prev) = self.last_ts {
                    let gap = rec.timestamp_ms.saturating_sub(prev);
                    thread::sleep(Duration::from_millis(gap));
                }
            }
            self.last_ts = Some(rec.timestamp_ms);
            debug!("replay: frame at {} ms", rec.timestamp_ms);

            return Some(LandmarkFrame {
                timestamp_ms: rec.timestamp_ms,
                hand: rec
                    .landmarks
                    .map(|pts| pts.into_iter().map(Landmark::from).collect()),
            });
        }
    }
}
