use bevy_asset::{Asset, Handle};
use bevy_color::{Color, ColorToComponents, palettes::css};
use bevy_ecs::{prelude::*, query::QueryItem};
use bevy_image::Image;
use bevy_math::Vec4;
use bevy_mesh::MeshVertexBufferLayoutRef;
use bevy_reflect::{Reflect, TypePath};
use bevy_render::{
    batching::NoAutomaticBatching,
    extract_component::ExtractComponent,
    render_resource::{
        AsBindGroup, BlendComponent, BlendFactor, BlendOperation, BlendState,
        RenderPipelineDescriptor, ShaderType, SpecializedMeshPipelineError,
    },
};
use bevy_shader::ShaderRef;

use crate::shading::{DEFAULT_GLOW_RADIUS, GlowParams};

/// A material drawn once per instance of an [`InstanceMaterialData`](crate::components::InstanceMaterialData) pool.
pub trait InstancedMaterial: Asset + AsBindGroup + Clone + Sized + Send + Sync + 'static {
    /// The vertex shader. Defaults to the embedded firefly shader.
    fn vertex_shader() -> ShaderRef {
        ShaderRef::Default
    }

    /// The fragment shader. Defaults to the embedded firefly shader.
    fn fragment_shader() -> ShaderRef {
        ShaderRef::Default
    }

    /// Allow specializing the pipeline (e.g. blending or shader defs based on material settings).
    fn specialize(
        _descriptor: &mut RenderPipelineDescriptor,
        _layout: &MeshVertexBufferLayoutRef,
        _key: Self::Data,
    ) -> Result<(), SpecializedMeshPipelineError> {
        Ok(())
    }
}

#[derive(Component, Clone, Debug)]
#[require(NoAutomaticBatching)]
pub struct InstancedMeshMaterial<M>(pub Handle<M>)
where
    M: InstancedMaterial;

impl<M: InstancedMaterial> ExtractComponent for InstancedMeshMaterial<M> {
    type QueryData = &'static InstancedMeshMaterial<M>;
    type QueryFilter = ();
    type Out = Self;

    fn extract_component(item: QueryItem<'_, '_, Self::QueryData>) -> Option<Self> {
        Some(item.clone())
    }
}

/// Glowing, flashing billboard points.
///
/// Every field is read live by the renderer, so changes show up on the next frame.
/// Nothing is validated: a negative or oversized `radius` just collapses or inverts the glow.
#[derive(Asset, TypePath, AsBindGroup, Debug, Clone)]
#[uniform(0, FireflyMaterialUniform)]
pub struct FireflyMaterial {
    pub color: Color,
    /// Glow radius in quad UV units.
    pub radius: f32,
    /// Elapsed animation time in seconds, usually written by
    /// [`advance_firefly_clocks`](crate::swarm::advance_firefly_clocks).
    pub time: f32,

    /// Reserved for per-firefly variation, bound but not sampled yet.
    #[texture(1)]
    #[sampler(2)]
    pub noise_texture: Option<Handle<Image>>,
}

impl Default for FireflyMaterial {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            radius: DEFAULT_GLOW_RADIUS,
            time: 0.0,
            noise_texture: None,
        }
    }
}

impl FireflyMaterial {
    pub fn with_color(mut self, color: impl Into<Color>) -> Self {
        self.set_color(color);
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.set_radius(radius);
        self
    }

    pub fn with_noise_texture(mut self, noise_texture: Option<Handle<Image>>) -> Self {
        self.noise_texture = noise_texture;
        self
    }

    pub fn set_color(&mut self, color: impl Into<Color>) {
        self.color = color.into();
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    pub fn update_time(&mut self, time: f32) {
        self.time = time;
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// The uniform values as seen by [`shading::shade`](crate::shading::shade).
    pub fn glow_params(&self) -> GlowParams {
        GlowParams {
            color: self.color.to_linear().to_vec3(),
            radius: self.radius,
            time: self.time,
        }
    }
}

impl InstancedMaterial for FireflyMaterial {
    fn specialize(
        descriptor: &mut RenderPipelineDescriptor,
        _layout: &MeshVertexBufferLayoutRef,
        _key: Self::Data,
    ) -> Result<(), SpecializedMeshPipelineError> {
        // Fireflies add light on top of the scene and never occlude each other.
        descriptor.primitive.cull_mode = None;

        if let Some(depth_stencil) = descriptor.depth_stencil.as_mut() {
            depth_stencil.depth_write_enabled = false;
        }

        if let Some(fragment) = descriptor.fragment.as_mut() {
            for target in fragment.targets.iter_mut().flatten() {
                target.blend = Some(ADDITIVE_BLENDING);
            }
        }

        Ok(())
    }
}

const ADDITIVE_BLENDING: BlendState = BlendState {
    color: BlendComponent {
        src_factor: BlendFactor::SrcAlpha,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Add,
    },
    alpha: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Add,
    },
};

/// Corresponds to `material` in `firefly.wgsl`.
#[derive(Clone, Copy, Default, Debug, ShaderType)]
pub struct FireflyMaterialUniform {
    pub color: Vec4,
    pub time: f32,
    pub radius: f32,
}

impl<'a> From<&'a FireflyMaterial> for FireflyMaterialUniform {
    fn from(material: &'a FireflyMaterial) -> Self {
        Self {
            color: material.color.to_linear().to_vec4(),
            time: material.time,
            radius: material.radius,
        }
    }
}

/// Color presets offered by the reference scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum FireflyPalette {
    #[default]
    Teal,
    Lime,
    Orange,
}

impl FireflyPalette {
    pub const ALL: [FireflyPalette; 3] = [Self::Teal, Self::Lime, Self::Orange];

    pub fn color(self) -> Color {
        match self {
            Self::Teal => css::TEAL.into(),
            Self::Lime => css::LIME.into(),
            Self::Orange => css::ORANGE.into(),
        }
    }
}

impl From<FireflyPalette> for Color {
    fn from(palette: FireflyPalette) -> Self {
        palette.color()
    }
}
