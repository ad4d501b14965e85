use bevy_asset::AssetId;
use bevy_ecs::system::SystemParamItem;
use bevy_ecs::system::lifetimeless::SRes;
use bevy_render::{
    render_asset::{PrepareAssetError, RenderAsset},
    render_resource::{AsBindGroup, AsBindGroupError, OwnedBindingResource},
    renderer::RenderDevice,
};
use std::marker::PhantomData;

use crate::material::InstancedMaterial;
use crate::render::pipeline::InstancedMaterialPipeline;

/// Owned bindings of an [`InstancedMaterial`], merged with the instance uniforms per entity.
pub struct PreparedInstancedMaterial<M: InstancedMaterial> {
    pub bindings: Vec<(u32, OwnedBindingResource)>,
    pub key: M::Data,
    _phantom: PhantomData<M>,
}

impl<M: InstancedMaterial> PreparedInstancedMaterial<M> {
    pub fn new(bindings: Vec<(u32, OwnedBindingResource)>, key: M::Data) -> Self {
        Self {
            bindings,
            key,
            _phantom: PhantomData,
        }
    }
}

impl<M: InstancedMaterial> RenderAsset for PreparedInstancedMaterial<M> {
    type SourceAsset = M;
    type Param = (
        SRes<RenderDevice>,
        SRes<InstancedMaterialPipeline<M>>,
        <M as AsBindGroup>::Param,
    );

    fn prepare_asset(
        source_asset: Self::SourceAsset,
        _asset_id: AssetId<Self::SourceAsset>,
        (render_device, pipeline, material_params): &mut SystemParamItem<Self::Param>,
        _previous_asset: Option<&Self>,
    ) -> Result<Self, PrepareAssetError<Self::SourceAsset>> {
        match source_asset.unprepared_bind_group(
            &pipeline.material_layout,
            render_device,
            material_params,
            false,
        ) {
            Ok(unprepared) => Ok(PreparedInstancedMaterial::new(
                unprepared.bindings.0,
                source_asset.bind_group_data(),
            )),
            Err(AsBindGroupError::RetryNextUpdate) => {
                Err(PrepareAssetError::RetryNextUpdate(source_asset))
            }
            Err(other) => Err(PrepareAssetError::AsBindGroupError(other)),
        }
    }
}
