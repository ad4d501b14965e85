//! CPU side of the firefly shader.
//!
//! Every function here computes the same value as its counterpart in `render/firefly.wgsl`, so the
//! look of a firefly can be reasoned about (and tested) without a GPU.

use bevy_math::{Vec2, Vec3};

/// Default glow radius in quad UV units.
pub const DEFAULT_GLOW_RADIUS: f32 = 0.1;

/// Peak distance, in view space units, an instance drifts from its anchor.
pub const DRIFT_AMPLITUDE: f32 = 0.5;

/// Per-axis phase step applied per instance index.
pub const DRIFT_PHASES: Vec3 = Vec3::new(0.10, 0.15, 0.13);

pub const FLASH_SPEED: f32 = 3.0;
pub const FLASH_PHASE: f32 = 0.12;

/// Width of the soft edge around the bright core.
pub const DISK_EDGE: f32 = 0.01;

/// Outer edge of the glow halo, the quad border in UV units.
pub const GLOW_EDGE: f32 = 0.5;

pub const CORE_INTENSITY: f32 = 3.0;

/// Hermite interpolation between `edge0` (0) and `edge1` (1).
///
/// Reversed edges invert the ramp. Equal edges act as a step at `edge1`.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let span = edge1 - edge0;
    if span == 0.0 {
        return if x >= edge1 { 1.0 } else { 0.0 };
    }

    let t = ((x - edge0) / span).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// View space offset of instance `index` at `time`.
pub fn drift(index: u32, time: f32) -> Vec3 {
    let k = index as f32;
    let phase = Vec3::splat(time) + DRIFT_PHASES * k;

    DRIFT_AMPLITUDE * Vec3::new(phase.x.sin(), phase.y.sin(), phase.z.sin())
}

/// Brightness pulse of instance `index` at `time`, in `[0, 1]`.
pub fn flash(index: u32, time: f32) -> f32 {
    0.5 + 0.5 * (FLASH_SPEED * time + FLASH_PHASE * index as f32).sin()
}

/// Uniform inputs of the fragment stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlowParams {
    /// Linear RGB.
    pub color: Vec3,
    pub radius: f32,
    pub time: f32,
}

impl Default for GlowParams {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            radius: DEFAULT_GLOW_RADIUS,
            time: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlowSample {
    pub color: Vec3,
    pub alpha: f32,
}

/// Soft halo fading out towards the quad border.
pub fn glow(radius: f32, distance: f32) -> f32 {
    smoothstep(GLOW_EDGE, radius, distance)
}

/// Bright core of `radius` with a thin soft edge.
pub fn disk(radius: f32, distance: f32) -> f32 {
    smoothstep(radius, radius - DISK_EDGE, distance)
}

/// Shades the fragment at `uv` of instance `index`.
pub fn shade(uv: Vec2, params: &GlowParams, index: u32) -> GlowSample {
    let distance = uv.distance(Vec2::splat(0.5));

    let glow = glow(params.radius, distance);
    let disk = disk(params.radius, distance);
    let flash = flash(index, params.time);

    let core = params.color * CORE_INTENSITY;

    GlowSample {
        color: (core * flash).lerp(core, disk),
        alpha: ((glow + disk) * flash).clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const CENTER: Vec2 = Vec2::splat(0.5);

    #[test]
    fn smoothstep_follows_edge_order() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 0.5), 0.5);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);

        // Reversed edges ramp down.
        assert_eq!(smoothstep(1.0, 0.0, 2.0), 0.0);
        assert_eq!(smoothstep(1.0, 0.0, -1.0), 1.0);
    }

    #[test]
    fn smoothstep_with_equal_edges_is_a_step() {
        assert_eq!(smoothstep(0.5, 0.5, 0.49), 0.0);
        assert_eq!(smoothstep(0.5, 0.5, 0.5), 1.0);
        assert!(!glow(0.5, 0.3).is_nan());
    }

    #[test]
    fn disk_is_full_at_the_center() {
        for radius in [0.01, 0.1, 0.4] {
            assert_eq!(disk(radius, 0.0), 1.0, "radius {radius}");
        }

        // A core thinner than its edge never reaches full brightness.
        let thin = disk(0.005, 0.0);
        assert!(thin > 0.0 && thin < 1.0);

        assert_eq!(disk(0.1, 0.1), 0.0);
        assert_eq!(disk(0.1, 0.3), 0.0);
    }

    #[test]
    fn glow_fades_out_at_the_quad_border() {
        assert_eq!(glow(0.1, 0.5), 0.0);
        assert_eq!(glow(0.1, 0.6), 0.0);
        assert_eq!(glow(0.1, 0.05), 1.0);

        let mid = glow(0.1, 0.3);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn negative_radius_gives_an_empty_core() {
        let params = GlowParams {
            radius: -0.2,
            ..Default::default()
        };

        let sample = shade(CENTER, &params, 0);

        assert_eq!(disk(params.radius, 0.0), 0.0);
        assert!(sample.alpha.is_finite());
    }

    #[test]
    fn drift_is_bounded_and_out_of_phase() {
        assert_eq!(drift(0, 0.0), Vec3::ZERO);

        let t = FRAC_PI_2;
        assert!(drift(0, t).abs_diff_eq(Vec3::splat(DRIFT_AMPLITUDE), 1e-6));

        let other = drift(10, t);
        assert!(other.x != other.y && other.y != other.z);
        assert!(other.abs().max_element() <= DRIFT_AMPLITUDE);
    }

    #[test]
    fn flash_stays_in_unit_range() {
        for index in 0..64 {
            for step in 0..32 {
                let value = flash(index, step as f32 * 0.37);
                assert!((0.0..=1.0).contains(&value));
            }
        }

        assert_eq!(flash(0, 0.0), 0.5);
    }

    #[test]
    fn core_ignores_flash() {
        // flash(0, t) == 0 when 3t == -pi/2
        let params = GlowParams {
            color: Vec3::new(0.2, 0.4, 0.6),
            time: -FRAC_PI_2 / FLASH_SPEED,
            ..Default::default()
        };

        let sample = shade(CENTER, &params, 0);

        assert!(sample.color.abs_diff_eq(params.color * CORE_INTENSITY, 1e-6));
        assert!(sample.alpha.abs() < 1e-6);
    }

    #[test]
    fn alpha_is_clamped() {
        // Full glow and full disk overlap near the center.
        let params = GlowParams {
            time: FRAC_PI_2 / FLASH_SPEED,
            ..Default::default()
        };

        let sample = shade(CENTER, &params, 0);

        assert_eq!(sample.alpha, 1.0);
    }

    #[test]
    fn shading_is_deterministic() {
        let params = GlowParams {
            color: Vec3::new(1.0, 0.5, 0.0),
            radius: 0.15,
            time: 12.75,
        };
        let uv = Vec2::new(0.3, 0.62);

        let first = shade(uv, &params, 41);
        for _ in 0..8 {
            assert_eq!(shade(uv, &params, 41), first);
        }
    }

    #[test]
    fn outside_the_quad_circle_is_transparent() {
        let sample = shade(Vec2::ZERO, &GlowParams::default(), 7);

        assert_eq!(sample.alpha, 0.0);
    }
}
