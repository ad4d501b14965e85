use bevy_core_pipeline::core_3d::Transparent3d;
use bevy_ecs::prelude::*;
use bevy_pbr::{MeshPipelineKey, RenderMeshInstances};
use bevy_render::{
    mesh::RenderMesh,
    render_asset::RenderAssets,
    render_phase::{DrawFunctions, PhaseItemExtraIndex, ViewSortedRenderPhases},
    render_resource::*,
    sync_world::MainEntity,
    view::{ExtractedView, Msaa},
};
use std::hash::Hash;

use crate::components::ExtractedInstances;
use crate::material::{InstancedMaterial, InstancedMeshMaterial};
use crate::render::draw::DrawInstancedMaterial;
use crate::render::pipeline::{InstancedMaterialPipeline, InstancedMaterialPipelineKey};
use crate::render::prepared_material::PreparedInstancedMaterial;

#[cfg(feature = "trace")]
use tracing::error;

/// Queues every non-empty pool into the transparent phase, after opaque geometry.
#[allow(clippy::too_many_arguments)]
pub(crate) fn queue_instanced_material<M>(
    transparent_3d_draw_functions: Res<DrawFunctions<Transparent3d>>,
    custom_pipeline: Res<InstancedMaterialPipeline<M>>,
    mut pipelines: ResMut<SpecializedMeshPipelines<InstancedMaterialPipeline<M>>>,
    pipeline_cache: Res<PipelineCache>,
    meshes: Res<RenderAssets<RenderMesh>>,
    render_mesh_instances: Res<RenderMeshInstances>,
    render_materials: Res<RenderAssets<PreparedInstancedMaterial<M>>>,
    material_meshes: Query<(
        Entity,
        &MainEntity,
        &InstancedMeshMaterial<M>,
        &ExtractedInstances,
    )>,
    mut transparent_render_phases: ResMut<ViewSortedRenderPhases<Transparent3d>>,
    views: Query<(&ExtractedView, &Msaa)>,
) where
    M: InstancedMaterial,
    M::Data: PartialEq + Eq + Hash + Clone,
{
    let draw_custom = transparent_3d_draw_functions
        .read()
        .id::<DrawInstancedMaterial>();

    for (view, msaa) in &views {
        let Some(transparent_phase) =
            transparent_render_phases.get_mut(&view.retained_view_entity)
        else {
            continue;
        };

        let view_key = MeshPipelineKey::from_msaa_samples(msaa.samples())
            | MeshPipelineKey::from_hdr(view.hdr);
        let rangefinder = view.rangefinder3d();

        for (entity, main_entity, h_material, instances) in &material_meshes {
            if instances.instances.is_empty() {
                continue;
            }

            let Some(mesh_instance) = render_mesh_instances.render_mesh_queue_data(*main_entity)
            else {
                continue;
            };
            let Some(mesh) = meshes.get(mesh_instance.mesh_asset_id) else {
                continue;
            };
            let Some(prepared_material) = render_materials.get(&h_material.0) else {
                continue;
            };

            let key = InstancedMaterialPipelineKey {
                mesh_key: view_key
                    | MeshPipelineKey::from_primitive_topology(mesh.primitive_topology()),
                bind_group_data: prepared_material.key.clone(),
            };

            let pipeline =
                match pipelines.specialize(&pipeline_cache, &custom_pipeline, key, &mesh.layout) {
                    Ok(pipeline) => pipeline,
                    Err(_err) => {
                        #[cfg(feature = "trace")]
                        error!("Failed to specialize instanced material pipeline: {_err}");
                        continue;
                    }
                };

            transparent_phase.add(Transparent3d {
                entity: (entity, *main_entity),
                pipeline,
                draw_function: draw_custom,
                distance: rangefinder.distance_translation(&mesh_instance.translation),
                batch_range: 0..1,
                extra_index: PhaseItemExtraIndex::None,
                indexed: mesh.indexed(),
            });
        }
    }
}
