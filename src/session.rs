//! A running session: the inference thread feeding the render loop.
//!
//! The inference side runs at the camera's pace and only ever publishes a
//! stable gesture; the render side runs at the display rate on the caller's
//! thread and owns the controller. They share nothing but a
//! [`GestureSlot`] and two flags.

mod handoff;
mod inference;
mod render;

pub use handoff::GestureSlot;
pub use inference::{InferenceStats, InferenceThread, observe_frame, run_inference};
pub use render::RenderLoop;

use anyhow::Result;
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crate::config::{Profile, ProfileReloader};
use crate::controller::AnimationParameters;
use crate::geometry::checked_count;
use crate::gestures::Gesture;
use crate::scene::Scene;
use crate::sink::{FrameSink, FrameSnapshot};
use crate::source::LandmarkSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after this many rendered frames.
    pub max_frames: Option<u64>,
    /// Frames still rendered once the source is exhausted, so the
    /// parameters can settle on the last gesture.
    pub linger_frames: u64,
    /// Render in real time. Unpaced runs use simulated time.
    pub paced: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_frames: None,
            linger_frames: 120,
            paced: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub gesture_changes: u64,
    pub final_gesture: Gesture,
    pub final_params: AnimationParameters,
    pub rejected_frames: u64,
}

/// Generate the scene, start inference and drive the render loop until the
/// source ends, `max_frames` is reached or `stop` is raised.
pub fn run(
    profile: &Profile,
    source: Box<dyn LandmarkSource>,
    sink: &mut dyn FrameSink,
    opts: RunOptions,
    mut reloader: Option<ProfileReloader>,
    stop: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let particles = checked_count(profile.tree.particle_count)?;
    let gifts = checked_count(profile.tree.gift_count)?;
    let mut rng = match profile.tree.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let scene = Scene::generate(particles, gifts, &mut rng);
    info!(
        "session: {} particles, {} gifts, {} fps",
        scene.particles.len(),
        scene.gifts.len(),
        profile.animation.fps
    );
    sink.scene(&scene)?;

    let slot = GestureSlot::new();
    let done = Arc::new(AtomicBool::new(false));
    let worker = InferenceThread::start(
        source,
        profile.gestures.window,
        slot.clone(),
        stop.clone(),
        done.clone(),
    )?;

    let mut render = RenderLoop::new(profile);
    let outcome = drive(&mut render, &slot, &done, &stop, sink, opts, reloader.as_mut());

    stop.store(true, Ordering::Relaxed);
    let stats = worker.join();
    let (frames, changes) = outcome?;

    let summary = RunSummary {
        frames,
        gesture_changes: changes,
        final_gesture: render.gesture(),
        final_params: render.params(),
        rejected_frames: stats.rejected,
    };
    info!(
        "session: {} frames, {} gesture changes, ended on {}",
        summary.frames, summary.gesture_changes, summary.final_gesture
    );
    Ok(summary)
}

/// The render side. Returns frames rendered and stable-gesture changes seen.
fn drive(
    render: &mut RenderLoop,
    slot: &GestureSlot,
    done: &AtomicBool,
    stop: &AtomicBool,
    sink: &mut dyn FrameSink,
    opts: RunOptions,
    mut reloader: Option<&mut ProfileReloader>,
) -> Result<(u64, u64)> {
    let mut frame = 0u64;
    let mut changes = 0u64;
    let mut lingered = 0u64;
    let start = Instant::now();
    let mut last = start;
    let mut sim_time = Duration::ZERO;

    while !stop.load(Ordering::Relaxed) {
        if opts.max_frames.is_some_and(|max| frame >= max) {
            debug!("session: frame limit reached");
            break;
        }
        // read before taking so the last publish is never left behind
        let finished = done.load(Ordering::SeqCst);
        let pending = slot.take();

        if let Some(p) = reloader.as_deref_mut().and_then(ProfileReloader::poll) {
            render.apply_profile(&p);
        }

        let (dt, time_s) = if opts.paced {
            let now = Instant::now();
            let dt = now - last;
            last = now;
            (dt, (now - start).as_secs_f64())
        } else {
            sim_time += render.frame_period();
            (render.frame_period(), sim_time.as_secs_f64())
        };

        let (params, changed) = render.step(pending, dt);
        if changed {
            changes += 1;
            sink.gesture(render.gesture())?;
        }
        sink.frame(&FrameSnapshot {
            frame,
            time_s,
            gesture: render.gesture(),
            params,
            tint: render.tint().to_string(),
        })?;
        frame += 1;

        if finished {
            if lingered >= opts.linger_frames {
                break;
            }
            lingered += 1;
        }

        if opts.paced {
            let deadline = last + render.frame_period();
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }
    }
    Ok((frame, changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::TargetTable;
    use crate::sink::{JsonLinesSink, NoopSink};
    use crate::source::SyntheticSource;

    fn small_profile() -> Profile {
        let mut p = Profile::embedded().unwrap();
        p.tree.particle_count = 200;
        p.tree.gift_count = 4;
        p.tree.seed = Some(1);
        p
    }

    fn unpaced(linger: u64) -> RunOptions {
        RunOptions {
            max_frames: None,
            linger_frames: linger,
            paced: false,
        }
    }

    #[test]
    fn test_fist_settles_on_closed() {
        let src = SyntheticSource::new(vec![(Gesture::Closed, 10)], 33);
        let summary = run(
            &small_profile(),
            Box::new(src),
            &mut NoopSink,
            unpaced(400),
            None,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        assert_eq!(summary.final_gesture, Gesture::Closed);
        assert_eq!(summary.gesture_changes, 1);
        assert!(summary.frames > 400);
        let target = TargetTable::default().get(Gesture::Closed);
        assert!(summary.final_params.max_distance(&target) < 1e-3);
    }

    #[test]
    fn test_frame_limit_and_stop() {
        let src = SyntheticSource::new(vec![(Gesture::Open, 1)], 1).repeating(true);
        let stop = Arc::new(AtomicBool::new(false));
        let summary = run(
            &small_profile(),
            Box::new(src),
            &mut NoopSink,
            RunOptions {
                max_frames: Some(25),
                linger_frames: 0,
                paced: false,
            },
            None,
            stop.clone(),
        )
        .unwrap();
        assert_eq!(summary.frames, 25);
        // the session raises the flag on the way out to stop inference
        assert!(stop.load(Ordering::Relaxed));
    }

    #[test]
    fn test_raised_stop_renders_nothing() {
        let src = SyntheticSource::new(vec![(Gesture::Open, 5)], 1);
        let summary = run(
            &small_profile(),
            Box::new(src),
            &mut NoopSink,
            unpaced(0),
            None,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.final_gesture, Gesture::None);
    }

    #[test]
    fn test_sink_sees_scene_then_frames() {
        let src = SyntheticSource::new(vec![(Gesture::Victory, 5)], 1);
        let mut sink = JsonLinesSink::new(Vec::new());
        let summary = run(
            &small_profile(),
            Box::new(src),
            &mut sink,
            unpaced(3),
            None,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let events: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events[0]["event"], "scene");
        assert_eq!(events[0]["particles"], 201);
        let frames = events.iter().filter(|e| e["event"] == "frame").count() as u64;
        assert_eq!(frames, summary.frames);
        assert!(events.iter().any(|e| e["gesture"] == "victory" && e["event"] == "gesture"));
    }
}
