//! A few swarms of fireflies over a dark ground plane.
//!
//! Press `1`, `2` or `3` to switch between the teal, lime and orange presets.
//! `+` / `-` grow or shrink the glow radius.
//!
//! **NOTE:** Photosensitive Warning. This example contains flashing lights.

use bevy::post_process::bloom::Bloom;
use bevy::prelude::*;
use bevy::render::view::Hdr;
use bevy_fireflies::prelude::*;

fn main() -> AppExit {
    App::new()
        .add_plugins((DefaultPlugins, FireflyPlugin))
        .insert_resource(ClearColor(Color::srgb(0.01, 0.01, 0.03)))
        .add_systems(Startup, setup)
        .add_systems(Update, (apply_palette, adjust_radius))
        .run()
}

fn setup(
    mut cmd: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut standard_materials: ResMut<Assets<StandardMaterial>>,
    mut firefly_materials: ResMut<Assets<FireflyMaterial>>,
) {
    cmd.spawn((
        Camera3d::default(),
        Hdr,
        Bloom::NATURAL,
        Transform::from_xyz(-12.0, 6.0, 14.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    cmd.spawn((
        Mesh3d(meshes.add(Plane3d::default().mesh().size(40.0, 40.0))),
        MeshMaterial3d(standard_materials.add(Color::srgb(0.05, 0.08, 0.05))),
        Transform::from_xyz(0.0, -4.0, 0.0),
    ));

    let mut rng = rand::rng();

    FireflySwarm::default().spawn(&mut cmd, &mut meshes, &mut firefly_materials, &mut rng);

    FireflySwarm::default()
        .with_groups(4, 60)
        .with_radius(2.5)
        .spawn(&mut cmd, &mut meshes, &mut firefly_materials, &mut rng);

    for (_, material) in firefly_materials.iter_mut() {
        material.set_color(FireflyPalette::default());
    }
}

fn apply_palette(
    keys: Res<ButtonInput<KeyCode>>,
    swarms: Query<&InstancedMeshMaterial<FireflyMaterial>, With<FireflySwarm>>,
    mut materials: ResMut<Assets<FireflyMaterial>>,
) {
    let palette = if keys.just_pressed(KeyCode::Digit1) {
        FireflyPalette::Teal
    } else if keys.just_pressed(KeyCode::Digit2) {
        FireflyPalette::Lime
    } else if keys.just_pressed(KeyCode::Digit3) {
        FireflyPalette::Orange
    } else {
        return;
    };

    for handle in &swarms {
        if let Some(material) = materials.get_mut(&handle.0) {
            material.set_color(palette);
        }
    }
}

fn adjust_radius(
    keys: Res<ButtonInput<KeyCode>>,
    swarms: Query<&InstancedMeshMaterial<FireflyMaterial>, With<FireflySwarm>>,
    mut materials: ResMut<Assets<FireflyMaterial>>,
) {
    let step = if keys.just_pressed(KeyCode::Equal) {
        0.02
    } else if keys.just_pressed(KeyCode::Minus) {
        -0.02
    } else {
        return;
    };

    for handle in &swarms {
        if let Some(material) = materials.get_mut(&handle.0) {
            let radius = material.radius();
            material.set_radius(radius + step);
        }
    }
}
