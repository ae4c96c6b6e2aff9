//! The camera-paced loop: landmarks in, stable gestures out.

use anyhow::Result;
use log::{debug, info, warn};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use super::handoff::GestureSlot;
use crate::error;
use crate::gestures::{Debounced, GestureDebouncer, classify};
use crate::landmarks::{HandPose, LandmarkFrame};
use crate::source::LandmarkSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferenceStats {
    pub frames: u64,
    pub rejected: u64,
    pub changes: u64,
}

/// Validate, classify and debounce one frame. A frame without a hand is an
/// observation of absence; a frame with the wrong landmark count is rejected.
pub fn observe_frame(
    debouncer: &mut GestureDebouncer,
    frame: &LandmarkFrame,
) -> error::Result<Debounced> {
    let label = match &frame.hand {
        None => None,
        Some(points) => Some(classify(&HandPose::from_points(points)?)),
    };
    Ok(debouncer.observe(label))
}

/// Drain `source` until it ends or `stop` is raised, publishing each stable change.
pub fn run_inference(
    source: &mut dyn LandmarkSource,
    debouncer: &mut GestureDebouncer,
    slot: &GestureSlot,
    stop: &AtomicBool,
) -> InferenceStats {
    let mut stats = InferenceStats::default();
    while !stop.load(Ordering::Relaxed) {
        let Some(frame) = source.next_frame() else {
            break;
        };
        stats.frames += 1;
        match observe_frame(debouncer, &frame) {
            Ok(d) if d.changed => {
                stats.changes += 1;
                debug!("inference: {} at {} ms", d.stable, frame.timestamp_ms);
                slot.publish(d.stable);
            }
            Ok(_) => {}
            Err(e) => {
                stats.rejected += 1;
                warn!("inference: dropping frame at {} ms: {e}", frame.timestamp_ms);
            }
        }
    }
    stats
}

pub struct InferenceThread {
    handle: thread::JoinHandle<InferenceStats>,
}

impl InferenceThread {
    /// `done` is raised after the last publish, once the loop has exited.
    pub fn start(
        mut source: Box<dyn LandmarkSource>,
        window: usize,
        slot: GestureSlot,
        stop: Arc<AtomicBool>,
        done: Arc<AtomicBool>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("inference".into())
            .spawn(move || {
                let mut debouncer = GestureDebouncer::new(window);
                let stats = run_inference(source.as_mut(), &mut debouncer, &slot, &stop);
                info!(
                    "inference: stopped after {} frames ({} rejected, {} changes)",
                    stats.frames, stats.rejected, stats.changes
                );
                done.store(true, Ordering::SeqCst);
                stats
            })?;
        Ok(Self { handle })
    }

    pub fn join(self) -> InferenceStats {
        self.handle.join().unwrap_or_else(|_| {
            warn!("inference thread panicked");
            InferenceStats::default()
        })
    }
}
