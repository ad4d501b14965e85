pub mod draw;
pub mod pipeline;
pub mod plugin;
pub mod prepare;
pub mod prepared_material;
pub mod queue;

pub mod prelude {
    pub use super::plugin::*;
    pub use super::prepared_material::*;
}
