//! Renderer boundary. Everything the core hands to the drawing side goes
//! through a [`FrameSink`].

use anyhow::Result;
use log::{debug, info};
use serde::Serialize;
use std::io::Write;

use crate::controller::AnimationParameters;
use crate::geometry::{GiftBuffers, ParticleBuffers, ParticleKind};
use crate::gestures::Gesture;
use crate::scene::Scene;

/// Per-frame output of the render loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub frame: u64,
    pub time_s: f64,
    pub gesture: Gesture,
    pub params: AnimationParameters,
    /// Passed through untouched from the UI.
    pub tint: String,
}

pub trait FrameSink: Send {
    /// Called once, before the first frame, with the immutable populations.
    fn scene(&mut self, scene: &Scene) -> Result<()>;
    /// Stable gesture changed (status display).
    fn gesture(&mut self, g: Gesture) -> Result<()>;
    fn frame(&mut self, snap: &FrameSnapshot) -> Result<()>;
}

pub struct NoopSink;

impl FrameSink for NoopSink {
    fn scene(&mut self, _scene: &Scene) -> Result<()> {
        Ok(())
    }
    fn gesture(&mut self, _g: Gesture) -> Result<()> {
        Ok(())
    }
    fn frame(&mut self, _snap: &FrameSnapshot) -> Result<()> {
        Ok(())
    }
}

/// Headless preview: logs a status line every `every` frames.
pub struct LogSink {
    every: u64,
    scene: Option<Scene>,
}

impl LogSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            scene: None,
        }
    }
}

impl FrameSink for LogSink {
    fn scene(&mut self, scene: &Scene) -> Result<()> {
        info!(
            "scene: {} particles ({:.1}% ornaments), {} gifts",
            scene.particles.len(),
            scene.ornament_share() * 100.0,
            scene.gifts.len()
        );
        self.scene = Some(scene.clone());
        Ok(())
    }

    fn gesture(&mut self, g: Gesture) -> Result<()> {
        info!("gesture: {g}");
        Ok(())
    }

    fn frame(&mut self, snap: &FrameSnapshot) -> Result<()> {
        if snap.frame % self.every != 0 {
            return Ok(());
        }
        let spread = self
            .scene
            .as_ref()
            .map(|s| s.spread(&snap.params, snap.time_s as f32, 64))
            .unwrap_or_default();
        let p = &snap.params;
        info!(
            "frame {:>6} [{}] expansion={:+.3} speed={:.3} flow={:.3} disco={:.3} spread={:.2}",
            snap.frame, snap.gesture, p.expansion, p.speed, p.vertical_flow, p.disco, spread
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Record<'a> {
    Scene {
        particles: usize,
        ornaments: usize,
        gifts: usize,
        buffers: SceneBuffers,
    },
    Gesture {
        gesture: Gesture,
    },
    Frame(&'a FrameSnapshot),
}

/// Attribute arrays the renderer uploads once.
#[derive(Serialize)]
struct SceneBuffers {
    particles: ParticleBuffers,
    gifts: GiftBuffers,
}

/// One JSON object per line, for an external renderer reading a pipe.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, rec: &Record<'_>) -> Result<()> {
        let line = serde_json::to_string(rec)? + "\n";
        self.out.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl<W: Write + Send> FrameSink for JsonLinesSink<W> {
    fn scene(&mut self, scene: &Scene) -> Result<()> {
        let ornaments = scene
            .particles
            .iter()
            .filter(|p| p.kind == ParticleKind::Ornament)
            .count();
        self.emit(&Record::Scene {
            particles: scene.particles.len(),
            ornaments,
            gifts: scene.gifts.len(),
            buffers: SceneBuffers {
                particles: ParticleBuffers::from_records(&scene.particles),
                gifts: GiftBuffers::from_records(&scene.gifts),
            },
        })
    }

    fn gesture(&mut self, g: Gesture) -> Result<()> {
        self.emit(&Record::Gesture { gesture: g })?;
        self.out.flush()?;
        Ok(())
    }

    fn frame(&mut self, snap: &FrameSnapshot) -> Result<()> {
        debug!("json sink: frame {}", snap.frame);
        self.emit(&Record::Frame(snap))
    }
}
