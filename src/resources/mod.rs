//! CPU-side rendering resources
//!
//! Geometry, textures, materials and render targets as plain data. Nothing in
//! this module owns GPU state; the renderer derives that lazily and keys it by
//! each resource's version.

mod assets;
mod buffer;
mod frame;
mod geometry;
mod material;
pub mod primitives;
mod texture;

pub use assets::*;
pub use buffer::*;
pub use frame::*;
pub use geometry::*;
pub use material::*;
pub use texture::*;
