use bevy_ecs::prelude::*;
use bevy_ecs::query::QueryItem;
use bevy_math::{Mat4, Vec3};
use bevy_reflect::Reflect;
use bevy_render::extract_component::ExtractComponent;
use bevy_render::render_resource::{BindGroup, Buffer};
use bevy_transform::components::GlobalTransform;
use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::sync::Arc;

/// One firefly in the instance pool.
///
/// Uploaded as-is as a per-instance vertex buffer, `position` at location 8 and
/// `index` at location 9.
#[derive(Clone, Copy, Pod, Zeroable, Default, Debug, PartialEq)]
#[repr(C)]
pub struct InstanceData {
    pub position: Vec3,
    pub index: u32,
}

impl InstanceData {
    pub fn new(index: u32, position: Vec3) -> Self {
        Self { position, index }
    }

    /// The placement transform of this instance. Only ever a translation.
    pub fn transform(&self) -> Mat4 {
        Mat4::from_translation(self.position)
    }
}

/// The instance pool of a swarm, written once at spawn.
#[derive(Component, Clone, Reflect)]
#[reflect(Component, Clone, Debug)]
pub struct InstanceMaterialData {
    #[reflect(ignore)]
    pub instances: Arc<Vec<InstanceData>>,
}

impl InstanceMaterialData {
    pub fn new(instances: Vec<InstanceData>) -> Self {
        Self {
            instances: Arc::new(instances),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl fmt::Debug for InstanceMaterialData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceMaterialData")
            .field("instances", &self.instances.len())
            .finish()
    }
}

impl ExtractComponent for InstanceMaterialData {
    type QueryData = (&'static InstanceMaterialData, &'static GlobalTransform);
    type QueryFilter = ();
    type Out = ExtractedInstances;

    fn extract_component(
        (data, transform): QueryItem<'_, '_, Self::QueryData>,
    ) -> Option<Self::Out> {
        Some(ExtractedInstances {
            instances: data.instances.clone(),
            world_from_local: transform.to_matrix(),
        })
    }
}

/// Render world copy of [`InstanceMaterialData`] along with the model transform of its entity.
#[derive(Component, Clone)]
pub struct ExtractedInstances {
    pub instances: Arc<Vec<InstanceData>>,
    pub world_from_local: Mat4,
}

#[derive(Component)]
pub struct InstanceBuffer {
    pub buffer: Buffer,
    pub length: usize,
    /// The pool last written into `buffer`.
    pub source: Arc<Vec<InstanceData>>,
}

#[derive(Component)]
pub struct GpuDrawIndexedIndirect {
    pub buffer: Buffer,
    pub offset: u64,
}

/// Per-entity uniforms bound next to the material at
/// [`INSTANCE_BINDING_INDEX`](crate::render::prepare::INSTANCE_BINDING_INDEX).
#[derive(Clone, Copy, Pod, Zeroable, Default)]
#[repr(C)]
pub struct InstanceUniforms {
    pub world_from_local: Mat4,
}

impl From<&ExtractedInstances> for InstanceUniforms {
    fn from(value: &ExtractedInstances) -> Self {
        InstanceUniforms {
            world_from_local: value.world_from_local,
        }
    }
}

#[derive(Component)]
pub struct InstanceUniformBuffer {
    pub buffer: Buffer,
}

/// Material bindings and instance uniforms in a single group.
#[derive(Component)]
pub struct InstancedCombinedBindGroup(pub BindGroup);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_data_matches_vertex_layout() {
        assert_eq!(size_of::<InstanceData>(), 16);
        assert_eq!(size_of::<InstanceUniforms>(), 64);
    }

    #[test]
    fn placement_transform_is_a_translation() {
        let instance = InstanceData::new(3, Vec3::new(1.0, -2.0, 0.5));
        let (scale, rotation, translation) =
            instance.transform().to_scale_rotation_translation();

        assert_eq!(translation, Vec3::new(1.0, -2.0, 0.5));
        assert!(scale.abs_diff_eq(Vec3::ONE, 1e-6));
        assert!(rotation.is_near_identity());
    }
}
