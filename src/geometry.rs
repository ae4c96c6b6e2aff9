//! Procedural tree and gift populations.
//!
//! Both generators take the random source by reference, so a seeded
//! `StdRng` makes the output reproducible. Draw order is part of the
//! contract: changing it changes every seeded tree.

use std::f32::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scene::Rgb;

pub const DEFAULT_PARTICLE_COUNT: usize = 8000;
pub const DEFAULT_GIFT_COUNT: usize = 40;

pub const STAR_INDEX: usize = 0;
pub const STAR_POSITION: [f32; 3] = [0.0, 5.5, 0.0];

const ORNAMENT_THRESHOLD: f32 = 0.85;
const HEIGHT_BIAS: f32 = 0.8;
const BASE_RADIUS: f32 = 4.5;
const TIER_FREQUENCY: f32 = 25.0;
const SPIRAL_TWIST: f32 = 8.0;

/// Red, blue, green, purple as sRGB components in [0,1]. These are not
/// linearised; a colour-managed renderer converts them itself.
pub const GIFT_PALETTE: [Rgb; 4] = [
    Rgb::from_hex(0xef4444),
    Rgb::from_hex(0x3b82f6),
    Rgb::from_hex(0x22c55e),
    Rgb::from_hex(0xa855f7),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticleKind {
    Leaf,
    Ornament,
    Star,
}

impl ParticleKind {
    /// Value of the `aType` vertex attribute.
    pub fn attribute(self) -> f32 {
        match self {
            ParticleKind::Leaf => 0.0,
            ParticleKind::Ornament => 1.0,
            ParticleKind::Star => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub position: [f32; 3],
    pub random: [f32; 3],
    pub size: f32,
    pub kind: ParticleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GiftRecord {
    pub center_offset: [f32; 3],
    pub color: Rgb,
    pub random: [f32; 3],
}

/// Reject negative population sizes coming from the outside world.
pub fn checked_count(requested: i64) -> Result<usize> {
    usize::try_from(requested).map_err(|_| Error::NegativeCount { requested })
}

fn unit<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen_range(0.0f32..1.0)
}

fn triplet<R: Rng + ?Sized>(rng: &mut R) -> [f32; 3] {
    [unit(rng), unit(rng), unit(rng)]
}

/// Cone radius at normalized height, with sine-modulated branch tiers.
pub fn tiered_radius(norm_y: f32) -> f32 {
    let tier_wobble = (norm_y * TIER_FREQUENCY).sin();
    let tier_factor = 0.8 + 0.4 * tier_wobble.max(0.0);
    (1.0 - norm_y) * BASE_RADIUS * tier_factor
}

/// `count` regular particles plus the star at [`STAR_INDEX`].
pub fn generate_tree<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<ParticleRecord> {
    let mut out = Vec::with_capacity(count + 1);
    out.push(ParticleRecord {
        position: STAR_POSITION,
        random: triplet(rng),
        size: 1.0,
        kind: ParticleKind::Star,
    });

    for _ in 0..count {
        let kind = if unit(rng) > ORNAMENT_THRESHOLD {
            ParticleKind::Ornament
        } else {
            ParticleKind::Leaf
        };

        let h = unit(rng).powf(HEIGHT_BIAS);
        let y = h * 10.0 - 5.0;
        let norm_y = (y + 5.0) / 10.0;
        let radius = tiered_radius(norm_y);

        let angle = y * SPIRAL_TWIST + unit(rng) * TAU;

        // ornaments hug the surface, leaves fill the cross-section evenly
        let offset = match kind {
            ParticleKind::Ornament => 0.9 + unit(rng) * 0.2,
            _ => unit(rng).sqrt() * 0.95,
        };
        let r = radius * offset;

        let size = unit(rng);
        out.push(ParticleRecord {
            position: [angle.cos() * r, y, angle.sin() * r],
            random: triplet(rng),
            size,
            kind,
        });
    }
    out
}

/// Gift boxes on the outer edge of the tree, slightly below the full height.
pub fn generate_gifts<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<GiftRecord> {
    (0..count)
        .map(|_| {
            let h = unit(rng).powf(HEIGHT_BIAS);
            let y = h * 9.0 - 4.5;
            let norm_y = (y + 5.0) / 10.0;
            let r = tiered_radius(norm_y) * (0.8 + unit(rng) * 0.2);
            let angle = unit(rng) * TAU;
            let color = GIFT_PALETTE[rng.gen_range(0..GIFT_PALETTE.len())];
            GiftRecord {
                center_offset: [angle.cos() * r, y, angle.sin() * r],
                color,
                random: triplet(rng),
            }
        })
        .collect()
}

/// Flat vertex attribute arrays, as uploaded to the GPU.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParticleBuffers {
    pub positions: Vec<f32>,
    pub randoms: Vec<f32>,
    pub sizes: Vec<f32>,
    pub types: Vec<f32>,
}

impl ParticleBuffers {
    pub fn from_records(records: &[ParticleRecord]) -> Self {
        let n = records.len();
        let mut b = Self {
            positions: Vec::with_capacity(n * 3),
            randoms: Vec::with_capacity(n * 3),
            sizes: Vec::with_capacity(n),
            types: Vec::with_capacity(n),
        };
        for p in records {
            b.positions.extend_from_slice(&p.position);
            b.randoms.extend_from_slice(&p.random);
            b.sizes.push(p.size);
            b.types.push(p.kind.attribute());
        }
        b
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GiftBuffers {
    pub offsets: Vec<f32>,
    pub colors: Vec<f32>,
    pub randoms: Vec<f32>,
}

impl GiftBuffers {
    pub fn from_records(records: &[GiftRecord]) -> Self {
        let mut b = Self::default();
        for g in records {
            b.offsets.extend_from_slice(&g.center_offset);
            b.colors.extend_from_slice(&[g.color.r, g.color.g, g.color.b]);
            b.randoms.extend_from_slice(&g.random);
        }
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_same_seed_same_tree() {
        let a = generate_tree(8000, &mut StdRng::seed_from_u64(7));
        let b = generate_tree(8000, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.len(), 8001);
        assert!(a.iter().zip(&b).all(|(x, y)| {
            x.kind == y.kind
                && x.position.map(f32::to_bits) == y.position.map(f32::to_bits)
                && x.random.map(f32::to_bits) == y.random.map(f32::to_bits)
                && x.size.to_bits() == y.size.to_bits()
        }));
    }

    #[test]
    fn test_star_anchored_at_apex() {
        for seed in 0..4 {
            let tree = generate_tree(100, &mut StdRng::seed_from_u64(seed));
            assert_eq!(tree[STAR_INDEX].kind, ParticleKind::Star);
            assert_eq!(tree[STAR_INDEX].position, STAR_POSITION);
            assert_eq!(
                tree.iter().filter(|p| p.kind == ParticleKind::Star).count(),
                1
            );
        }
    }

    #[test]
    fn test_ornament_share_near_fifteen_percent() {
        let tree = generate_tree(8000, &mut StdRng::seed_from_u64(42));
        let ornaments = tree[1..]
            .iter()
            .filter(|p| p.kind == ParticleKind::Ornament)
            .count();
        let share = ornaments as f64 / 8000.0;
        assert!((share - 0.15).abs() < 0.03, "ornament share {share}");
    }

    #[test]
    fn test_particles_stay_inside_tiered_cone() {
        let tree = generate_tree(2000, &mut StdRng::seed_from_u64(3));
        for p in &tree[1..] {
            let [x, y, z] = p.position;
            assert!((-5.0..=5.0).contains(&y));
            let limit = tiered_radius((y + 5.0) / 10.0) * 1.1 + 1e-4;
            assert!(x.hypot(z) <= limit);
            assert!((0.0..1.0).contains(&p.size));
            assert!(p.random.iter().all(|r| (0.0..1.0).contains(r)));
        }
    }

    #[test]
    fn test_zero_count_yields_only_star() {
        let tree = generate_tree(0, &mut StdRng::seed_from_u64(1));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_checked_count_rejects_negative() {
        assert_eq!(checked_count(12), Ok(12));
        assert_eq!(
            checked_count(-1),
            Err(Error::NegativeCount { requested: -1 })
        );
    }

    #[test]
    fn test_gifts_use_palette_and_edge() {
        let gifts = generate_gifts(DEFAULT_GIFT_COUNT, &mut StdRng::seed_from_u64(9));
        assert_eq!(gifts.len(), 40);
        for g in &gifts {
            assert!(GIFT_PALETTE.contains(&g.color));
            let [x, y, z] = g.center_offset;
            assert!((-4.5..=4.5).contains(&y));
            let outer = tiered_radius((y + 5.0) / 10.0);
            let r = x.hypot(z);
            assert!(r >= outer * 0.8 - 1e-4 && r <= outer + 1e-4);
        }
    }

    #[test]
    fn test_palette_is_plain_srgb() {
        let red = GIFT_PALETTE[0];
        assert_eq!(red.r, 239.0 / 255.0);
        assert_eq!(red.g, 68.0 / 255.0);
        assert_eq!(red.b, 68.0 / 255.0);
    }

    #[test]
    fn test_buffers_flatten_in_order() {
        let tree = generate_tree(10, &mut StdRng::seed_from_u64(5));
        let b = ParticleBuffers::from_records(&tree);
        assert_eq!(b.len(), 11);
        assert_eq!(b.positions.len(), 33);
        assert_eq!(&b.positions[0..3], &STAR_POSITION);
        assert_eq!(b.types[0], 2.0);
        assert_eq!(b.positions[3..6], tree[1].position);
    }
}
