use crate::components::InstanceMaterialData;
use crate::material::{FireflyMaterial, FireflyPalette};
use crate::render::plugin::{InstancedMaterialCorePlugin, InstancedMaterialPlugin};
use crate::swarm::{FireflyClock, FireflySwarm, advance_firefly_clocks};

use bevy_app::{App, Plugin, Update};

/// Renders [`FireflySwarm`]s and advances their animation every frame.
///
/// Spawn swarms with [`FireflySwarm::spawn`]. Colors and glow radius are changed through the
/// swarm's [`FireflyMaterial`].
pub struct FireflyPlugin;

impl Plugin for FireflyPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<InstancedMaterialCorePlugin>() {
            app.add_plugins(InstancedMaterialCorePlugin);
        }

        app.add_plugins(InstancedMaterialPlugin::<FireflyMaterial>::default())
            .register_type::<FireflySwarm>()
            .register_type::<FireflyClock>()
            .register_type::<FireflyPalette>()
            .register_type::<InstanceMaterialData>()
            .add_systems(Update, advance_firefly_clocks);
    }
}
