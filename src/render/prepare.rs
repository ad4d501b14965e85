use crate::components::*;
use crate::material::{InstancedMaterial, InstancedMeshMaterial};
use crate::render::{
    pipeline::InstancedMaterialPipeline, prepared_material::PreparedInstancedMaterial,
};

use bevy_ecs::prelude::*;
use bevy_pbr::RenderMeshInstances;
use bevy_render::{
    mesh::allocator::MeshAllocator,
    mesh::{RenderMesh, RenderMeshBufferInfo},
    render_asset::RenderAssets,
    render_resource::{
        BindGroupEntry, BufferInitDescriptor, BufferUsages, DrawIndexedIndirectArgs,
    },
    renderer::{RenderDevice, RenderQueue},
    sync_world::MainEntity,
};

use bytemuck::bytes_of;
use std::sync::Arc;

/// Binding of [`InstanceUniforms`] inside the combined material bind group.
pub const INSTANCE_BINDING_INDEX: u32 = 100;

/// What happens to an entity's instance vertex buffer this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InstanceUpload {
    Create,
    Write,
    Keep,
}

/// Pools are shared by `Arc` from the main world, so an unchanged pointer means unchanged data.
fn instance_upload(
    uploaded: Option<&Arc<Vec<InstanceData>>>,
    instances: &Arc<Vec<InstanceData>>,
) -> InstanceUpload {
    match uploaded {
        None => InstanceUpload::Create,
        Some(uploaded) if Arc::ptr_eq(uploaded, instances) => InstanceUpload::Keep,
        Some(uploaded) if uploaded.len() != instances.len() => InstanceUpload::Create,
        Some(_) => InstanceUpload::Write,
    }
}

pub(crate) fn prepare_instance_buffer(
    mut cmd: Commands,
    query: Query<(Entity, &ExtractedInstances, Option<&InstanceBuffer>)>,
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
) {
    for (entity, instance_data, instance_buffer) in &query {
        let instances = &instance_data.instances;

        // Empty pools are never drawn.
        if instances.is_empty() {
            continue;
        }

        match instance_upload(instance_buffer.map(|buffer| &buffer.source), instances) {
            InstanceUpload::Keep => {}
            InstanceUpload::Create => create_buffer(&mut cmd, entity, instances, &render_device),
            InstanceUpload::Write => {
                let Some(instance_buffer) = instance_buffer else {
                    continue;
                };

                render_queue.write_buffer(
                    &instance_buffer.buffer,
                    0,
                    bytemuck::cast_slice(instances.as_slice()),
                );

                cmd.entity(entity).insert(InstanceBuffer {
                    buffer: instance_buffer.buffer.clone(),
                    length: instances.len(),
                    source: instances.clone(),
                });
            }
        }
    }
}

fn create_buffer(
    cmd: &mut Commands,
    entity: Entity,
    instances: &Arc<Vec<InstanceData>>,
    render_device: &RenderDevice,
) {
    let buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("instanced_material_data_buffer"),
        contents: bytemuck::cast_slice(instances.as_slice()),
        usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
    });

    cmd.entity(entity).insert(InstanceBuffer {
        buffer,
        length: instances.len(),
        source: instances.clone(),
    });
}

pub(crate) fn prepare_instanced_bind_group<M>(
    mut commands: Commands,
    query: Query<(
        Entity,
        &InstancedMeshMaterial<M>,
        &ExtractedInstances,
        Option<&InstanceUniformBuffer>,
    )>,
    render_materials: Res<RenderAssets<PreparedInstancedMaterial<M>>>,
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
    pipeline: Res<InstancedMaterialPipeline<M>>,
) where
    M: InstancedMaterial,
{
    for (entity, material_handle, instance_data, uniform_buffer) in &query {
        let Some(prepared_material) = render_materials.get(&material_handle.0) else {
            continue;
        };

        let uniforms = InstanceUniforms::from(instance_data);
        let contents = bytes_of(&uniforms);

        let buffer = uniform_buffer
            .map(|InstanceUniformBuffer { buffer }| {
                render_queue.write_buffer(buffer, 0, contents);
                buffer.clone()
            })
            .unwrap_or_else(|| {
                let buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
                    label: Some("instanced_material_uniform_buffer"),
                    contents,
                    usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                });

                commands.entity(entity).insert(InstanceUniformBuffer {
                    buffer: buffer.clone(),
                });

                buffer
            });

        let entries: Vec<BindGroupEntry> = prepared_material
            .bindings
            .iter()
            .map(|(index, resource)| BindGroupEntry {
                binding: *index,
                resource: resource.get_binding(),
            })
            .chain(std::iter::once(BindGroupEntry {
                binding: INSTANCE_BINDING_INDEX,
                resource: buffer.as_entire_binding(),
            }))
            .collect();

        let bind_group = render_device.create_bind_group(
            "instanced_material_combined_bind_group",
            &pipeline.combined_layout,
            &entries,
        );

        commands
            .entity(entity)
            .insert(InstancedCombinedBindGroup(bind_group));
    }
}

pub(crate) fn prepare_indirect_draw_buffer(
    mut cmd: Commands,
    query: Query<(
        Entity,
        &MainEntity,
        &InstanceBuffer,
        Option<&GpuDrawIndexedIndirect>,
    )>,
    render_mesh_instances: Res<RenderMeshInstances>,
    meshes: Res<RenderAssets<RenderMesh>>,
    mesh_allocator: Res<MeshAllocator>,
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
) {
    for ((entity, _, _, o_indirect_buffer), command) in query.iter().filter_map(|query_data| {
        let (_, main_entity, instance_buffer, ..) = query_data;
        let mesh_instance = render_mesh_instances.render_mesh_queue_data(*main_entity)?;
        let mesh_asset_id = mesh_instance.mesh_asset_id;

        let gpu_mesh = meshes.get(mesh_asset_id)?;
        let vertex_buffer_slice = mesh_allocator.mesh_vertex_slice(&mesh_asset_id)?;
        let index_buffer_slice = mesh_allocator.mesh_index_slice(&mesh_asset_id)?;

        if let RenderMeshBufferInfo::Indexed { count, .. } = gpu_mesh.buffer_info {
            let command = DrawIndexedIndirectArgs {
                index_count: count,
                instance_count: instance_buffer.length as u32,
                first_index: index_buffer_slice.range.start,
                base_vertex: vertex_buffer_slice.range.start as i32,
                first_instance: 0,
            };

            Some((query_data, command))
        } else {
            None
        }
    }) {
        let contents = command.as_bytes();

        if let Some(indirect_buffer) = o_indirect_buffer {
            render_queue.write_buffer(&indirect_buffer.buffer, 0, contents);
        } else {
            let buffer = render_device.create_buffer_with_data(&BufferInitDescriptor {
                label: Some("draw_indexed_indirect buffer"),
                contents,
                usage: BufferUsages::INDIRECT | BufferUsages::COPY_DST,
            });

            cmd.entity(entity)
                .insert(GpuDrawIndexedIndirect { buffer, offset: 0 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_math::Vec3;

    fn pool(len: u32) -> Arc<Vec<InstanceData>> {
        Arc::new((0..len).map(|i| InstanceData::new(i, Vec3::X * i as f32)).collect())
    }

    #[test]
    fn first_sight_of_a_pool_creates_its_buffer() {
        assert_eq!(instance_upload(None, &pool(4)), InstanceUpload::Create);
    }

    #[test]
    fn unchanged_pool_is_not_uploaded_again() {
        let instances = pool(4);
        let extracted_again = instances.clone();

        assert_eq!(
            instance_upload(Some(&instances), &extracted_again),
            InstanceUpload::Keep
        );
    }

    #[test]
    fn replaced_pool_is_rewritten_or_reallocated() {
        let uploaded = pool(4);

        assert_eq!(instance_upload(Some(&uploaded), &pool(4)), InstanceUpload::Write);
        assert_eq!(instance_upload(Some(&uploaded), &pool(9)), InstanceUpload::Create);
    }
}
