pub mod components;
pub mod material;
pub mod placement;
pub mod plugin;
pub mod render;
pub mod shading;
pub mod swarm;

pub use plugin::*;

pub mod prelude {
    pub use super::plugin::*;
    pub use super::render::prelude::*;
    pub use super::{components::*, material::*, swarm::*};
}
