//! The generated scene and a CPU reference of the renderer's vertex motion.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::controller::AnimationParameters;
use crate::error::{Error, Result};
use crate::geometry::{self, GiftRecord, ParticleKind, ParticleRecord};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }
}

/// Parse a `#rrggbb` tint as picked in the UI.
pub fn parse_tint(s: &str) -> Result<Rgb> {
    let digits = s
        .trim()
        .strip_prefix('#')
        .filter(|d| d.len() == 6 && d.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| Error::InvalidTint(s.to_string()))?;
    let hex = u32::from_str_radix(digits, 16).map_err(|_| Error::InvalidTint(s.to_string()))?;
    Ok(Rgb::from_hex(hex))
}

/// Immutable populations handed to the renderer once at start.
#[derive(Debug, Clone)]
pub struct Scene {
    pub particles: Vec<ParticleRecord>,
    pub gifts: Vec<GiftRecord>,
}

impl Scene {
    pub fn generate<R: Rng + ?Sized>(particles: usize, gifts: usize, rng: &mut R) -> Self {
        let particles = geometry::generate_tree(particles, rng);
        let gifts = geometry::generate_gifts(gifts, rng);
        Self { particles, gifts }
    }

    pub fn ornament_share(&self) -> f64 {
        let regular = self.particles.len().saturating_sub(1);
        if regular == 0 {
            return 0.0;
        }
        let n = self
            .particles
            .iter()
            .filter(|p| p.kind == ParticleKind::Ornament)
            .count();
        n as f64 / regular as f64
    }

    /// Mean horizontal radius of every `stride`-th particle at time `t`.
    pub fn spread(&self, params: &AnimationParameters, t: f32, stride: usize) -> f32 {
        let mut acc = 0.0f32;
        let mut n = 0usize;
        for p in self.particles.iter().step_by(stride.max(1)) {
            let [x, _, z] = displace(p.position, p.random, p.kind == ParticleKind::Star, params, t);
            acc += x.hypot(z);
            n += 1;
        }
        if n == 0 { 0.0 } else { acc / n as f32 }
    }
}

/// Where a particle (or gift centre) is drawn at time `t`.
///
/// `anchored` damps the outward burst and lifts the point instead; the star uses it.
pub fn displace(
    position: [f32; 3],
    random: [f32; 3],
    anchored: bool,
    params: &AnimationParameters,
    t: f32,
) -> [f32; 3] {
    let [expansion, speed, flow, _] = params.as_uniforms();
    let [x, y, z] = position;

    let rotation_speed = (2.0 - expansion) * speed * 0.3;
    let angle = t * rotation_speed * (1.0 - y * 0.05);
    let (sa, ca) = angle.sin_cos();
    let mut rotated = [x * ca - z * sa, y, x * sa + z * ca];

    let horizontal = x.hypot(z);
    let dir = if horizontal < 0.1 {
        [0.0, 1.0, 0.0]
    } else {
        [x / horizontal, 0.0, z / horizontal]
    };
    let push = (random[0] * 6.0 + 2.0) * expansion;
    let mut offset = [dir[0] * push, dir[1] * push, dir[2] * push];
    offset[1] += (random[1] - 0.5) * 8.0 * expansion;

    if flow > 0.1 {
        let flow_height = (y + t * 5.0).rem_euclid(10.0) - 5.0;
        let mix = flow * 0.8;
        rotated[1] += (flow_height - rotated[1]) * mix;
        rotated[0] *= 1.0 + flow * 0.5;
        rotated[2] *= 1.0 + flow * 0.5;
    }

    if anchored {
        offset = offset.map(|o| o * 0.1);
        offset[1] += expansion * 2.0;
    }

    [
        rotated[0] + offset[0],
        rotated[1] + offset[1],
        rotated[2] + offset[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::TargetTable;
    use crate::gestures::Gesture;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_parse_tint() {
        let c = parse_tint("#00ff88").unwrap();
        assert_eq!(c.r, 0.0);
        assert_eq!(c.g, 1.0);
        assert!((c.b - 136.0 / 255.0).abs() < 1e-6);
        assert!(matches!(parse_tint("00ff88"), Err(Error::InvalidTint(_))));
        assert!(parse_tint("#00ff8").is_err());
        assert!(parse_tint("#zzzzzz").is_err());
    }

    #[test]
    fn test_rest_pose_at_time_zero() {
        let params = AnimationParameters::default();
        let p = displace([1.0, 2.0, 3.0], [0.5, 0.5, 0.5], false, &params, 0.0);
        assert_eq!(p, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_open_spreads_wider_than_idle() {
        let scene = Scene::generate(2000, 0, &mut StdRng::seed_from_u64(11));
        let table = TargetTable::default();
        let open = scene.spread(&table.get(Gesture::Open), 0.0, 4);
        let idle = scene.spread(&table.get(Gesture::None), 0.0, 4);
        assert!(open > idle + 1.0);
    }

    #[test]
    fn test_star_burst_is_damped() {
        let params = AnimationParameters::new(1.0, 0.0, 0.0, 0.0);
        let star = displace([0.0, 5.5, 0.0], [1.0, 0.5, 0.0], true, &params, 0.0);
        // (1*6+2) * 0.1 upward plus the 2.0 lift
        assert!((star[1] - (5.5 + 0.8 + 2.0)).abs() < 1e-5);
    }

    #[test]
    fn test_vertical_flow_wraps_height() {
        let params = AnimationParameters::new(0.0, 0.0, 1.0, 0.0);
        let p = displace([1.0, 4.0, 0.0], [0.0; 3], false, &params, 0.4);
        // (4 + 2) mod 10 - 5 = 1, mixed 80% of the way from 4
        assert!((p[1] - (4.0 + (1.0 - 4.0) * 0.8)).abs() < 1e-4);
        assert!((p[0] - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_ornament_share_on_scene() {
        let scene = Scene::generate(4000, 40, &mut StdRng::seed_from_u64(2));
        assert!((scene.ornament_share() - 0.15).abs() < 0.03);
        assert_eq!(scene.gifts.len(), 40);
    }
}
