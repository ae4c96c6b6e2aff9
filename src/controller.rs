//! Gesture-driven animation parameters.
//!
//! The controller holds a *current* and a *target* [`AnimationParameters`].
//! A stable-gesture change swaps the whole target tuple; every render tick
//! moves the current values a fixed fraction of the way toward it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gestures::Gesture;

pub const DEFAULT_LERP: f64 = 0.05;
pub const DEFAULT_REFERENCE_FPS: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationParameters {
    pub expansion: f64,
    pub speed: f64,
    pub vertical_flow: f64,
    pub disco: f64,
}

impl AnimationParameters {
    pub const fn new(expansion: f64, speed: f64, vertical_flow: f64, disco: f64) -> Self {
        Self {
            expansion,
            speed,
            vertical_flow,
            disco,
        }
    }

    fn lerp_toward(&mut self, target: &Self, t: f64) {
        self.expansion += (target.expansion - self.expansion) * t;
        self.speed += (target.speed - self.speed) * t;
        self.vertical_flow += (target.vertical_flow - self.vertical_flow) * t;
        self.disco += (target.disco - self.disco) * t;
    }

    /// Largest per-component distance to `other`.
    pub fn max_distance(&self, other: &Self) -> f64 {
        [
            self.expansion - other.expansion,
            self.speed - other.speed,
            self.vertical_flow - other.vertical_flow,
            self.disco - other.disco,
        ]
        .into_iter()
        .fold(0.0, |acc, d| acc.max(d.abs()))
    }

    /// Shader uniform order: expansion, speed, vertical flow, disco.
    pub fn as_uniforms(&self) -> [f32; 4] {
        [
            self.expansion as f32,
            self.speed as f32,
            self.vertical_flow as f32,
            self.disco as f32,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.as_uniforms().iter().all(|v| v.is_finite())
    }
}

/// Target parameters per gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetTable {
    rows: [AnimationParameters; 5],
}

impl Default for TargetTable {
    fn default() -> Self {
        Self {
            rows: [
                // none: idle drift
                AnimationParameters::new(0.0, 0.5, 0.0, 0.0),
                // open: burst outward, slow spin
                AnimationParameters::new(1.5, 0.2, 0.0, 0.0),
                // closed: contract and spin fast
                AnimationParameters::new(-0.4, 6.0, 0.0, 0.0),
                // pointing: upward spiral
                AnimationParameters::new(0.2, 2.0, 1.0, 0.0),
                // victory: disco
                AnimationParameters::new(0.1, 3.0, 0.0, 1.0),
            ],
        }
    }
}

impl TargetTable {
    pub fn get(&self, g: Gesture) -> AnimationParameters {
        self.rows[Self::row(g)]
    }

    pub fn set(&mut self, g: Gesture, params: AnimationParameters) {
        self.rows[Self::row(g)] = params;
    }

    fn row(g: Gesture) -> usize {
        Gesture::ALL
            .iter()
            .position(|x| *x == g)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ParameterController {
    table: TargetTable,
    lerp: f64,
    reference_fps: f64,
    current: AnimationParameters,
    target: AnimationParameters,
}

impl Default for ParameterController {
    fn default() -> Self {
        Self::new(TargetTable::default(), DEFAULT_LERP)
    }
}

impl ParameterController {
    /// Starts at rest on the idle targets.
    pub fn new(table: TargetTable, lerp: f64) -> Self {
        let idle = table.get(Gesture::None);
        Self {
            table,
            lerp: lerp.clamp(f64::EPSILON, 1.0),
            reference_fps: DEFAULT_REFERENCE_FPS,
            current: idle,
            target: idle,
        }
    }

    pub fn with_reference_fps(mut self, fps: f64) -> Self {
        if fps > 0.0 {
            self.reference_fps = fps;
        }
        self
    }

    /// Swap in a new table and factor without touching the current values.
    pub fn reconfigure(&mut self, table: TargetTable, lerp: f64, gesture: Gesture) {
        self.table = table;
        self.lerp = lerp.clamp(f64::EPSILON, 1.0);
        self.retarget(gesture);
    }

    /// New stable gesture: replace the whole target tuple.
    pub fn retarget(&mut self, g: Gesture) {
        self.target = self.table.get(g);
    }

    /// Advance one render frame.
    ///
    /// `None` applies the fixed ratio once per call. `Some(dt)` scales the
    /// ratio so that a frame at the reference rate matches the fixed step.
    pub fn tick(&mut self, dt: Option<Duration>) -> AnimationParameters {
        match dt {
            None => self.advance(self.lerp),
            Some(dt) => self.tick_scaled(dt.as_secs_f64() * self.reference_fps),
        }
    }

    /// Advance by `frames` reference frames: ratio `1 - (1 - lerp)^frames`.
    pub fn tick_scaled(&mut self, frames: f64) -> AnimationParameters {
        let t = 1.0 - (1.0 - self.lerp).powf(frames.max(0.0));
        self.advance(t)
    }

    fn advance(&mut self, t: f64) -> AnimationParameters {
        let target = self.target;
        self.current.lerp_toward(&target, t);
        self.current
    }

    pub fn current(&self) -> AnimationParameters {
        self.current
    }

    pub fn target(&self) -> AnimationParameters {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_matches_gestures() {
        let t = TargetTable::default();
        assert_eq!(t.get(Gesture::None), AnimationParameters::new(0.0, 0.5, 0.0, 0.0));
        assert_eq!(t.get(Gesture::Closed), AnimationParameters::new(-0.4, 6.0, 0.0, 0.0));
        assert_eq!(t.get(Gesture::Open), AnimationParameters::new(1.5, 0.2, 0.0, 0.0));
        assert_eq!(t.get(Gesture::Pointing), AnimationParameters::new(0.2, 2.0, 1.0, 0.0));
        assert_eq!(t.get(Gesture::Victory), AnimationParameters::new(0.1, 3.0, 0.0, 1.0));
    }

    #[test]
    fn test_single_tick_moves_five_percent() {
        let mut c = ParameterController::default();
        c.retarget(Gesture::Open);
        let p = c.tick(None);
        assert!((p.expansion - 0.075).abs() < 1e-12);
        assert!((p.speed - (0.5 - 0.3 * 0.05)).abs() < 1e-12);
    }

    #[test]
    fn test_distance_strictly_decreases_and_never_hits_target() {
        let mut c = ParameterController::default();
        c.retarget(Gesture::Closed);
        let target = c.target();
        let mut prev = c.current().max_distance(&target);
        for _ in 0..200 {
            let d = c.tick(None).max_distance(&target);
            assert!(d < prev, "distance went from {prev} to {d}");
            prev = d;
        }
        assert_ne!(c.current(), target);
    }

    #[test]
    fn test_converges_within_tolerance() {
        let mut c = ParameterController::default();
        c.retarget(Gesture::Closed);
        for _ in 0..400 {
            c.tick(None);
        }
        assert!(c.current().max_distance(&c.target()) < 1e-6);
    }

    #[test]
    fn test_retarget_mid_flight_is_continuous() {
        let mut c = ParameterController::default();
        c.retarget(Gesture::Open);
        for _ in 0..10 {
            c.tick(None);
        }
        let before = c.current();
        c.retarget(Gesture::Closed);
        // retargeting alone never moves the current values
        assert_eq!(c.current(), before);
        let after = c.tick(None);
        assert!(after.max_distance(&before) < 0.05 * 6.0);
    }

    #[test]
    fn test_scaled_step_matches_fixed_step() {
        let mut fixed = ParameterController::default();
        let mut scaled = ParameterController::default();
        fixed.retarget(Gesture::Victory);
        scaled.retarget(Gesture::Victory);
        let a = fixed.tick(None);
        let b = scaled.tick_scaled(1.0);
        assert!(a.max_distance(&b) < 1e-12);

        // two half-frames land where one full frame does
        let mut halves = ParameterController::default();
        halves.retarget(Gesture::Victory);
        halves.tick_scaled(0.5);
        let c = halves.tick_scaled(0.5);
        assert!(a.max_distance(&c) < 1e-12);

        let mut idle = ParameterController::default();
        idle.retarget(Gesture::Victory);
        assert_eq!(idle.tick_scaled(0.0), ParameterController::default().current());
    }

    #[test]
    fn test_elapsed_time_step_matches_reference_frame() {
        let mut fixed = ParameterController::default();
        let mut timed = ParameterController::default().with_reference_fps(60.0);
        fixed.retarget(Gesture::Victory);
        timed.retarget(Gesture::Victory);
        let a = fixed.tick(None);
        // a 1/60 s Duration is rounded to whole nanoseconds
        let b = timed.tick(Some(Duration::from_secs_f64(1.0 / 60.0)));
        assert!(a.max_distance(&b) < 1e-6);
    }

    #[test]
    fn test_reconfigure_keeps_current() {
        let mut c = ParameterController::default();
        c.retarget(Gesture::Open);
        c.tick(None);
        let before = c.current();
        let mut table = TargetTable::default();
        table.set(Gesture::Open, AnimationParameters::new(3.0, 1.0, 0.0, 0.0));
        c.reconfigure(table, 0.1, Gesture::Open);
        assert_eq!(c.current(), before);
        assert_eq!(c.target().expansion, 3.0);
    }
}
