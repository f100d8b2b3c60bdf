/// Core voxel data model: blocks, materials, the registry, bit-packed
/// index layout, and chunk storage.
pub mod block;
pub mod chunk;
pub mod layout;
pub mod registry;

pub use block::{Block, BlockData, Material, MaterialData, MaybeMaterial, NO_MATERIAL};
pub use chunk::{Chunk, NEIGHBORS, NUM_NEIGHBORS};
pub use layout::{
    BUILD_HEIGHT, CHUNK_BITS, CHUNK_MASK, CHUNK_VOLUME, CHUNK_WIDTH, SUNLIGHT, WORLD_HEIGHT,
};
pub use registry::Registry;

/// A 2-D chunk/column coordinate. The vector's `y` component holds the
/// world z axis; chunks span the full world height.
pub type Point = glam::IVec2;
