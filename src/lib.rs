/// Streaming voxel world core: a moving window of chunk slots with
/// incremental two-stage lighting and greedy meshing, driven one frame at a
/// time by a host that owns the renderer.
pub mod circle;
pub mod lighting;
pub mod meshing;
pub mod perf;
pub mod renderer;
pub mod voxel;
pub mod world;
pub mod worldgen;

pub use circle::Circle;
pub use meshing::{unpack_quad, HeightmapEntry, HeightmapField, Mesher, Quad, UnpackedQuad};
pub use perf::{CounterSnapshot, FunctionCounters, FUNCTION_COUNTERS};
pub use renderer::{
    InstancedMeshHandle, LightTextureHandle, MeshPhase, NullRenderer, Renderer, VoxelMeshHandle,
};
pub use voxel::{
    Block, BlockData, Chunk, Material, MaterialData, MaybeMaterial, Point, Registry, BUILD_HEIGHT,
    CHUNK_BITS, CHUNK_MASK, CHUNK_WIDTH, NO_MATERIAL, SUNLIGHT, WORLD_HEIGHT,
};
pub use world::{World, WorldConfig};
pub use worldgen::Worldgen;
