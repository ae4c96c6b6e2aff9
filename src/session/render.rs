use log::info;
use std::time::Duration;

use crate::config::Profile;
use crate::controller::{AnimationParameters, ParameterController};
use crate::gestures::Gesture;

/// Per-frame state of the render side: the controller plus what the UI shows.
#[derive(Debug, Clone)]
pub struct RenderLoop {
    controller: ParameterController,
    frame_period: Duration,
    timed: bool,
    tint: String,
    gesture: Gesture,
}

impl RenderLoop {
    pub fn new(profile: &Profile) -> Self {
        let anim = &profile.animation;
        let controller = ParameterController::new(profile.target_table(), anim.lerp_factor)
            .with_reference_fps(anim.reference_fps);
        Self {
            controller,
            frame_period: frame_period(anim.fps),
            timed: anim.frame_rate_independent,
            tint: profile.tint.color.clone(),
            gesture: Gesture::None,
        }
    }

    /// Adopt a reloaded profile. Current parameter values carry over.
    pub fn apply_profile(&mut self, profile: &Profile) {
        let anim = &profile.animation;
        self.controller
            .reconfigure(profile.target_table(), anim.lerp_factor, self.gesture);
        self.frame_period = frame_period(anim.fps);
        self.timed = anim.frame_rate_independent;
        self.tint = profile.tint.color.clone();
    }

    /// Advance one frame. Returns the new parameters and whether `pending`
    /// changed the displayed gesture.
    pub fn step(&mut self, pending: Option<Gesture>, dt: Duration) -> (AnimationParameters, bool) {
        let mut changed = false;
        if let Some(g) = pending {
            if g != self.gesture {
                info!("gesture: {} -> {}", self.gesture, g);
                self.gesture = g;
                self.controller.retarget(g);
                changed = true;
            }
        }
        let params = self.controller.tick(self.timed.then_some(dt));
        (params, changed)
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    pub fn params(&self) -> AnimationParameters {
        self.controller.current()
    }

    pub fn tint(&self) -> &str {
        &self.tint
    }

    pub fn frame_period(&self) -> Duration {
        self.frame_period
    }
}

fn frame_period(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}
