//! Gaussian scatter of fireflies around their group centers.

use bevy_math::Vec3;
use rand::Rng;
use std::f32::consts::TAU;

use crate::components::InstanceData;

/// Groups, all sharing the same scatter radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupLayout {
    pub group_count: u32,
    pub particles_per_group: u32,
    pub group_radius: f32,
}

impl GroupLayout {
    /// Total number of instances. Zero is a valid, empty pool.
    ///
    /// Capped at `u32::MAX`, the largest index a firefly can carry.
    pub fn instance_count(&self) -> usize {
        (self.group_count as usize)
            .saturating_mul(self.particles_per_group as usize)
            .min(u32::MAX as usize)
    }

    /// Center of group `group`. Every group is currently centered on the origin.
    pub fn group_center(&self, _group: u32) -> Vec3 {
        Vec3::ZERO
    }
}

/// A standard normal sample (mean 0, variance 1) using the Box–Muller transform.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    let u = open_unit(rng);
    let v = open_unit(rng);

    (-2.0 * u.ln()).sqrt() * (TAU * v).cos()
}

/// Uniform in `(0, 1)`, redrawing zero so `ln` stays finite.
fn open_unit<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    loop {
        let sample: f32 = rng.random();
        if sample > 0.0 {
            return sample;
        }
    }
}

/// Independent normal draws on every axis.
pub fn gaussian_offset<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    let x = standard_normal(rng);
    let y = standard_normal(rng);
    let z = standard_normal(rng);
    Vec3::new(x, y, z)
}

/// Places every instance of `layout`.
///
/// Instance `group * particles_per_group + particle` lands at its group center plus a gaussian
/// offset scaled by the group radius.
pub fn place_fireflies<R: Rng + ?Sized>(layout: &GroupLayout, rng: &mut R) -> Vec<InstanceData> {
    let count = layout.instance_count();
    let mut instances = Vec::with_capacity(count);

    for slot in 0..count {
        let Ok(index) = u32::try_from(slot) else {
            break;
        };
        let center = layout.group_center(index / layout.particles_per_group);
        let position = center + gaussian_offset(rng) * layout.group_radius;

        instances.push(InstanceData::new(index, position));
    }

    instances
}
