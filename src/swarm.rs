use bevy_asset::{Assets, Handle};
use bevy_camera::primitives::Aabb;
use bevy_ecs::prelude::*;
use bevy_image::Image;
use bevy_math::{Vec3, primitives::Rectangle};
use bevy_mesh::{Mesh, Mesh3d};
use bevy_reflect::Reflect;
use bevy_time::Time;
use bevy_transform::components::Transform;
use bevy_utils::default;
use rand::Rng;

use crate::components::{InstanceData, InstanceMaterialData};
use crate::material::{FireflyMaterial, InstancedMeshMaterial};
use crate::placement::{GroupLayout, place_fireflies};
use crate::shading::DRIFT_AMPLITUDE;

#[cfg(feature = "trace")]
use tracing::{debug, warn};

/// Edge length of the quad every firefly is drawn on.
pub const QUAD_SIZE: f32 = 0.2;

/// A swarm of fireflies scattered in gaussian groups.
///
/// Kept on the spawned entity. Changing it afterwards has no effect, the pool is placed once.
#[derive(Component, Clone, Debug, Reflect)]
#[reflect(Component, Clone, Debug)]
pub struct FireflySwarm {
    pub group_count: u32,
    pub particles_per_group: u32,
    pub group_radius: f32,
    pub noise_texture: Option<Handle<Image>>,
}

impl Default for FireflySwarm {
    fn default() -> Self {
        Self {
            group_count: 1,
            particles_per_group: 50,
            group_radius: 5.0,
            noise_texture: None,
        }
    }
}

impl FireflySwarm {
    pub fn with_groups(mut self, group_count: u32, particles_per_group: u32) -> Self {
        self.group_count = group_count;
        self.particles_per_group = particles_per_group;
        self
    }

    pub fn with_radius(mut self, group_radius: f32) -> Self {
        self.group_radius = group_radius;
        self
    }

    pub fn with_noise_texture(mut self, noise_texture: Handle<Image>) -> Self {
        self.noise_texture = Some(noise_texture);
        self
    }

    pub fn layout(&self) -> GroupLayout {
        GroupLayout {
            group_count: self.group_count,
            particles_per_group: self.particles_per_group,
            group_radius: self.group_radius,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.layout().instance_count()
    }

    /// Places the swarm and spawns it as a single instanced entity.
    pub fn spawn<R: Rng + ?Sized>(
        self,
        commands: &mut Commands,
        meshes: &mut Assets<Mesh>,
        materials: &mut Assets<FireflyMaterial>,
        rng: &mut R,
    ) -> Entity {
        let instances = place_fireflies(&self.layout(), rng);

        #[cfg(feature = "trace")]
        if instances.is_empty() {
            warn!("Firefly swarm {:?} has no instances, nothing will be drawn.", self);
        } else {
            debug!("Spawning firefly swarm with {} instances", instances.len());
        }

        let mesh = meshes.add(Rectangle::new(QUAD_SIZE, QUAD_SIZE));
        let material = materials.add(FireflyMaterial {
            noise_texture: self.noise_texture.clone(),
            ..default()
        });
        let aabb = swarm_aabb(&instances);

        commands
            .spawn((
                Transform::default(),
                Mesh3d(mesh),
                InstancedMeshMaterial(material),
                InstanceMaterialData::new(instances),
                FireflyClock::default(),
                aabb,
                self,
            ))
            .id()
    }
}

/// Furthest a vertex can sit from its anchor: drift plus a quad corner.
///
/// Both are applied in view space, so the camera can turn the offset onto any world axis.
fn vertex_reach() -> f32 {
    (Vec3::splat(DRIFT_AMPLITUDE) + Vec3::new(QUAD_SIZE / 2.0, QUAD_SIZE / 2.0, 0.0)).length()
}

/// Bounds of every anchor, widened by how far a firefly can drift and the quad it is drawn on.
fn swarm_aabb(instances: &[InstanceData]) -> Aabb {
    let Some(first) = instances.first() else {
        return Aabb::from_min_max(Vec3::ZERO, Vec3::ZERO);
    };

    let (min, max) = instances
        .iter()
        .fold((first.position, first.position), |(min, max), instance| {
            (min.min(instance.position), max.max(instance.position))
        });

    let margin = Vec3::splat(vertex_reach());
    Aabb::from_min_max(min - margin, max + margin)
}

/// Animation time of a swarm.
#[derive(Component, Clone, Copy, Debug, Default, PartialEq, Reflect)]
#[reflect(Component, Clone, Debug)]
pub struct FireflyClock {
    elapsed: f32,
}

impl FireflyClock {
    /// Adds `delta_secs` and returns the new elapsed time.
    pub fn advance(&mut self, delta_secs: f32) -> f32 {
        self.elapsed += delta_secs;
        self.elapsed
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

/// Advances every swarm by the frame delta and pushes the time into its material.
pub fn advance_firefly_clocks(
    time: Res<Time>,
    mut swarms: Query<(&mut FireflyClock, &InstancedMeshMaterial<FireflyMaterial>)>,
    mut materials: ResMut<Assets<FireflyMaterial>>,
) {
    let delta = time.delta_secs();

    for (mut clock, material) in &mut swarms {
        let elapsed = clock.advance(delta);

        if let Some(material) = materials.get_mut(&material.0) {
            material.update_time(elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shading::drift;
    use bevy_ecs::system::RunSystemOnce;
    use bevy_math::Quat;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;

    fn world() -> World {
        let mut world = World::new();
        world.init_resource::<Assets<Mesh>>();
        world.init_resource::<Assets<FireflyMaterial>>();
        world.init_resource::<Time>();
        world
    }

    fn spawn(world: &mut World, swarm: FireflySwarm, seed: u64) -> Entity {
        world
            .run_system_once(
                move |mut commands: Commands,
                      mut meshes: ResMut<Assets<Mesh>>,
                      mut materials: ResMut<Assets<FireflyMaterial>>| {
                    let mut rng = StdRng::seed_from_u64(seed);
                    swarm
                        .clone()
                        .spawn(&mut commands, &mut meshes, &mut materials, &mut rng)
                },
            )
            .unwrap()
    }

    fn tick(world: &mut World, delta: Duration) {
        world.resource_mut::<Time>().advance_by(delta);
        world.run_system_once(advance_firefly_clocks).unwrap();
    }

    #[test]
    fn defaults_match_the_reference_scene() {
        let swarm = FireflySwarm::default();

        assert_eq!(swarm.group_count, 1);
        assert_eq!(swarm.particles_per_group, 50);
        assert_eq!(swarm.group_radius, 5.0);
        assert!(swarm.noise_texture.is_none());
        assert_eq!(swarm.instance_count(), 50);
    }

    #[test]
    fn spawned_pool_has_one_instance_per_slot() {
        let mut world = world();
        let entity = spawn(&mut world, FireflySwarm::default().with_groups(3, 4), 5);

        let pool = world.get::<InstanceMaterialData>(entity).unwrap();
        assert_eq!(pool.len(), 12);
        assert!(
            pool.instances
                .iter()
                .enumerate()
                .all(|(slot, instance)| instance.index as usize == slot)
        );

        assert!(world.get::<FireflyClock>(entity).is_some());
        assert!(world.get::<Mesh3d>(entity).is_some());
        assert_eq!(world.resource::<Assets<FireflyMaterial>>().len(), 1);
    }

    #[test]
    fn single_firefly_without_radius_sits_on_the_center() {
        let mut world = world();
        let swarm = FireflySwarm::default().with_groups(1, 1).with_radius(0.0);
        let entity = spawn(&mut world, swarm, 99);

        let pool = world.get::<InstanceMaterialData>(entity).unwrap();
        assert_eq!(pool.instances.as_slice(), &[InstanceData::new(0, Vec3::ZERO)]);
    }

    #[test]
    fn empty_swarm_spawns_an_empty_pool() {
        let mut world = world();
        let entity = spawn(&mut world, FireflySwarm::default().with_groups(0, 50), 0);

        assert!(world.get::<InstanceMaterialData>(entity).unwrap().is_empty());
        assert_eq!(
            *world.get::<Aabb>(entity).unwrap(),
            Aabb::from_min_max(Vec3::ZERO, Vec3::ZERO)
        );
    }

    #[test]
    fn aabb_covers_drift_and_quad() {
        let instances = [
            InstanceData::new(0, Vec3::new(-1.0, 0.0, 2.0)),
            InstanceData::new(1, Vec3::new(3.0, -2.0, 0.0)),
        ];

        let aabb = swarm_aabb(&instances);
        let min = Vec3::from(aabb.min());
        let max = Vec3::from(aabb.max());

        assert!(min.cmple(Vec3::new(-1.5, -2.5, -0.5)).all());
        assert!(max.cmpge(Vec3::new(3.5, 0.5, 2.5)).all());
    }

    #[test]
    fn aabb_covers_offsets_turned_by_the_camera() {
        let aabb = swarm_aabb(&[InstanceData::new(0, Vec3::ZERO)]);
        let max = Vec3::from(aabb.max()) + 1e-5;
        let min = Vec3::from(aabb.min()) - 1e-5;

        // Worst case view-space offset: every drift axis at its peak plus a quad corner.
        let corner = Vec3::new(QUAD_SIZE / 2.0, QUAD_SIZE / 2.0, 0.0);
        let offset = drift(0, std::f32::consts::FRAC_PI_2) + corner;

        let turns = [
            Quat::IDENTITY,
            Quat::from_rotation_arc(Vec3::ONE.normalize(), Vec3::X),
            Quat::from_rotation_arc(Vec3::ONE.normalize(), Vec3::NEG_Y),
            Quat::from_rotation_arc(Vec3::ONE.normalize(), Vec3::Z),
            Quat::from_rotation_y(1.0) * Quat::from_rotation_x(-0.4),
        ];

        for turn in turns {
            let vertex = turn * offset;
            assert!(vertex.cmple(max).all(), "{vertex} escapes {max}");
            assert!(vertex.cmpge(min).all(), "{vertex} escapes {min}");
        }
    }

    #[test]
    fn clock_sums_deltas() {
        let mut once = FireflyClock::default();
        once.advance(1.0);

        let mut often = FireflyClock::default();
        for _ in 0..10 {
            often.advance(0.1);
        }

        assert!((once.elapsed() - often.elapsed()).abs() < 1e-5);
        assert_eq!(FireflyClock::default().elapsed(), 0.0);
    }

    #[test]
    fn frames_push_elapsed_time_into_the_material() {
        let mut world = world();
        let entity = spawn(&mut world, FireflySwarm::default(), 1);

        tick(&mut world, Duration::from_millis(250));
        tick(&mut world, Duration::from_millis(500));

        let clock = *world.get::<FireflyClock>(entity).unwrap();
        assert!((clock.elapsed() - 0.75).abs() < 1e-6);

        let handle = world
            .get::<InstancedMeshMaterial<FireflyMaterial>>(entity)
            .unwrap()
            .0
            .clone();
        let materials = world.resource::<Assets<FireflyMaterial>>();
        assert_eq!(materials.get(&handle).unwrap().time(), clock.elapsed());
    }

    #[test]
    fn skipped_frames_only_slow_the_animation() {
        let mut world = world();
        let entity = spawn(&mut world, FireflySwarm::default(), 2);

        tick(&mut world, Duration::from_millis(100));
        tick(&mut world, Duration::ZERO);

        let clock = world.get::<FireflyClock>(entity).unwrap();
        assert!((clock.elapsed() - 0.1).abs() < 1e-6);
    }
}
