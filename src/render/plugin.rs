use crate::components::InstanceMaterialData;
use crate::material::{InstancedMaterial, InstancedMeshMaterial};
use crate::render::{
    draw::DrawInstancedMaterial, pipeline::InstancedMaterialPipeline, prepare::*,
    prepared_material::PreparedInstancedMaterial, queue::*,
};

use std::hash::Hash;
use std::marker::PhantomData;

use bevy_app::{App, Plugin};
use bevy_asset::{AssetApp, embedded_asset};
use bevy_core_pipeline::core_3d::Transparent3d;
use bevy_ecs::prelude::*;
use bevy_render::{
    Render, RenderApp, RenderSystems, extract_component::ExtractComponentPlugin,
    render_asset::RenderAssetPlugin, render_phase::AddRenderCommand,
    render_resource::SpecializedMeshPipelines,
};

/// Shared render setup for every [`InstancedMaterial`]: the default shader and instance buffers.
pub struct InstancedMaterialCorePlugin;

impl Plugin for InstancedMaterialCorePlugin {
    fn build(&self, app: &mut App) {
        embedded_asset!(app, "firefly.wgsl");

        app.add_plugins(ExtractComponentPlugin::<InstanceMaterialData>::default());

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app.add_systems(
            Render,
            (prepare_instance_buffer, prepare_indirect_draw_buffer)
                .chain()
                .in_set(RenderSystems::PrepareResources),
        );
    }
}

pub struct InstancedMaterialPlugin<M: InstancedMaterial>(PhantomData<M>);

impl<M: InstancedMaterial> Default for InstancedMaterialPlugin<M> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<M> Plugin for InstancedMaterialPlugin<M>
where
    M: InstancedMaterial,
    M::Data: PartialEq + Eq + Hash + Clone,
{
    fn build(&self, app: &mut App) {
        app.init_asset::<M>();

        app.add_plugins((
            ExtractComponentPlugin::<InstancedMeshMaterial<M>>::default(),
            RenderAssetPlugin::<PreparedInstancedMaterial<M>>::default(),
        ));

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .add_render_command::<Transparent3d, DrawInstancedMaterial>()
            .init_resource::<SpecializedMeshPipelines<InstancedMaterialPipeline<M>>>()
            .add_systems(
                Render,
                (
                    queue_instanced_material::<M>.in_set(RenderSystems::QueueMeshes),
                    prepare_instanced_bind_group::<M>.in_set(RenderSystems::PrepareBindGroups),
                ),
            );
    }

    fn finish(&self, app: &mut App) {
        if let Some(render_app) = app.get_sub_app_mut(RenderApp) {
            render_app.init_resource::<InstancedMaterialPipeline<M>>();
        }
    }
}
