/// Chunk storage: a 16 x 256 x 16 voxel column with its heightmap,
/// equilevel flags, lighting state, and renderer resources.
use std::collections::{HashMap, HashSet};

use super::block::Block;
use super::layout::{
    column_index, voxel_index, BUILD_HEIGHT, CHUNK_AREA, CHUNK_VOLUME, CHUNK_WIDTH, SUNLIGHT,
    WORLD_HEIGHT,
};
use super::registry::Registry;
use super::Point;
use crate::renderer::{InstancedMeshHandle, LightTextureHandle, Renderer, VoxelMeshHandle};

pub const NUM_NEIGHBORS: usize = 8;

/// The 8 Moore neighbors, cardinals first.
pub const NEIGHBORS: [Point; NUM_NEIGHBORS] = [
    Point::new(-1, 0),
    Point::new(1, 0),
    Point::new(0, -1),
    Point::new(0, 1),
    Point::new(-1, -1),
    Point::new(-1, 1),
    Point::new(1, -1),
    Point::new(1, 1),
];

/// A decoration voxel rendered as an instanced mesh instead of faces.
#[derive(Copy, Clone, Debug)]
pub struct Instance {
    pub block: Block,
    pub mesh: Option<InstancedMeshHandle>,
}

pub struct Chunk {
    pub(crate) point: Point,
    pub(crate) dirty: bool,
    pub(crate) ready: bool,
    pub(crate) stage2_dirty: bool,
    pub(crate) neighbors: u8,

    // Renderer resources, acquired at first meshing.
    pub(crate) light: Option<LightTextureHandle>,
    pub(crate) solid: Option<VoxelMeshHandle>,
    pub(crate) water: Option<VoxelMeshHandle>,
    pub(crate) instances: HashMap<i32, Instance>,

    // Lighting state. Stage 1 assumes dark neighbors; stage 2 overlays the
    // 3x3 neighborhood's contributions as a sparse delta.
    pub(crate) stage1_dirty: HashSet<i32>,
    pub(crate) stage1_edges: HashSet<i32>,
    pub(crate) stage2_lights: HashMap<i32, u8>,
    pub(crate) point_lights: HashMap<i32, i8>,

    // Large data arrays, in increasing order of size.
    pub(crate) equilevels: [u8; WORLD_HEIGHT as usize],
    pub(crate) heightmap: [u8; CHUNK_AREA],
    pub(crate) stage1_lights: Box<[u8; CHUNK_VOLUME]>,
    pub(crate) voxels: Box<[Block; CHUNK_VOLUME]>,
}

impl Default for Chunk {
    fn default() -> Self {
        Chunk {
            point: Point::ZERO,
            dirty: false,
            ready: false,
            stage2_dirty: false,
            neighbors: 0,
            light: None,
            solid: None,
            water: None,
            instances: HashMap::new(),
            stage1_dirty: HashSet::new(),
            stage1_edges: HashSet::new(),
            stage2_lights: HashMap::new(),
            point_lights: HashMap::new(),
            equilevels: [0; WORLD_HEIGHT as usize],
            heightmap: [0; CHUNK_AREA],
            stage1_lights: Box::new([0; CHUNK_VOLUME]),
            voxels: Box::new([Block::Air; CHUNK_VOLUME]),
        }
    }
}

impl Chunk {
    /// (Re)initialize a recycled slot from a column script. Neighbor
    /// notification and lighting init are the world's responsibility.
    pub fn init(&mut self, point: Point, data: &[u8], registry: &Registry) {
        debug_assert!(self.solid.is_none() && self.water.is_none());

        self.point = point;
        self.neighbors = 0;
        self.ready = false;

        self.instances.clear();
        self.point_lights.clear();
        self.stage1_dirty.clear();
        self.stage1_edges.clear();
        self.stage2_lights.clear();

        self.load(data, registry);
        self.dirty = true;
        self.stage2_dirty = true;
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Block {
        debug_assert!(x >= 0 && x < CHUNK_WIDTH);
        debug_assert!(z >= 0 && z < CHUNK_WIDTH);
        debug_assert!(y >= 0 && y < BUILD_HEIGHT);
        self.voxels[voxel_index(x, y, z) as usize]
    }

    /// The level a caller observes: the stage-2 overlay if present, else the
    /// stage-1 value, bumped by one for glowing decoration blocks.
    pub fn get_light_level(&self, x: i32, y: i32, z: i32, registry: &Registry) -> i32 {
        debug_assert!(x >= 0 && x < CHUNK_WIDTH);
        debug_assert!(z >= 0 && z < CHUNK_WIDTH);
        debug_assert!(y >= 0 && y < WORLD_HEIGHT);

        let index = voxel_index(x, y, z);
        let base = match self.stage2_lights.get(&index) {
            Some(&value) => value as i32,
            None => self.stage1_lights[index as usize] as i32,
        };

        let data = registry.block(self.voxels[index as usize]);
        (base + if data.mesh { 1 } else { 0 }).min(SUNLIGHT)
    }

    /// Height of the lowest all-Air suffix of a column.
    pub fn height_at(&self, x: i32, z: i32) -> u8 {
        self.heightmap[column_index(x, z) as usize]
    }

    pub fn is_equilevel(&self, y: i32) -> bool {
        self.equilevels[y as usize] == 1
    }

    /// The stage-1 (neighbors-dark) light value at a cell.
    pub fn stage1_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.stage1_lights[voxel_index(x, y, z) as usize]
    }

    /// The sparse stage-2 overlay at a cell, if any.
    pub fn stage2_light(&self, x: i32, y: i32, z: i32) -> Option<u8> {
        self.stage2_lights.get(&voxel_index(x, y, z)).copied()
    }

    pub fn has_edge_light(&self, x: i32, y: i32, z: i32) -> bool {
        self.stage1_edges.contains(&voxel_index(x, y, z))
    }

    /// The dense stage-1 buffer in index order, for snapshot comparisons.
    pub fn stage1_lights_raw(&self) -> &[u8] {
        &self.stage1_lights[..]
    }

    pub fn has_mesh(&self) -> bool {
        self.solid.is_some() || self.water.is_some()
    }

    pub fn needs_relight(&self) -> bool {
        self.stage2_dirty && self.ready && self.has_mesh()
    }

    pub fn needs_remesh(&self) -> bool {
        self.dirty && self.ready
    }

    pub(crate) fn check_ready(&self) -> bool {
        self.neighbors as usize == NUM_NEIGHBORS
    }

    /// Overwrite one voxel. Returns the displaced decoration mesh handle,
    /// if the edit replaced or removed a live instance; the caller frees it.
    pub fn set_block(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        block: Block,
        registry: &Registry,
    ) -> Option<InstancedMeshHandle> {
        debug_assert!(x >= 0 && x < CHUNK_WIDTH);
        debug_assert!(z >= 0 && z < CHUNK_WIDTH);
        debug_assert!(y >= 0 && y < BUILD_HEIGHT);

        let index = voxel_index(x, y, z);
        let old_block = self.voxels[index as usize];
        if old_block == block {
            return None;
        }

        self.voxels[index as usize] = block;
        self.stage1_dirty.insert(index);
        self.dirty = true;
        self.stage2_dirty = true;
        self.update_heightmap(x, z, y, 1, block, index);
        let displaced = self.update_instance(index, old_block, block, registry);
        self.equilevels[y as usize] = 0;
        displaced
    }

    pub fn set_point_light(&mut self, x: i32, y: i32, z: i32, level: i8) {
        debug_assert!(x >= 0 && x < CHUNK_WIDTH);
        debug_assert!(z >= 0 && z < CHUNK_WIDTH);
        debug_assert!(y >= 0 && y < WORLD_HEIGHT);

        let index = voxel_index(x, y, z);
        if level > 0 {
            self.point_lights.insert(index, level);
        } else {
            self.point_lights.remove(&index);
        }

        self.stage1_dirty.insert(index);
        self.stage2_dirty = true;
    }

    pub(crate) fn drop_meshes(&mut self, renderer: &mut dyn Renderer) {
        for instance in self.instances.values_mut() {
            if let Some(handle) = instance.mesh.take() {
                renderer.free_instanced_mesh(handle);
            }
        }
        if let Some(handle) = self.light.take() {
            renderer.free_light_texture(handle);
        }
        if let Some(handle) = self.solid.take() {
            renderer.free_voxel_mesh(handle);
        }
        if let Some(handle) = self.water.take() {
            renderer.free_voxel_mesh(handle);
        }
        self.dirty = true;
    }

    fn load(&mut self, data: &[u8], registry: &Registry) {
        let mut mismatches = [0i32; WORLD_HEIGHT as usize];
        self.heightmap.fill(0);

        let mut cursor = 0usize;
        for z in 0..CHUNK_WIDTH {
            for x in 0..CHUNK_WIDTH {
                detect_mismatches(data, &data[cursor..], &mut mismatches);

                let mut start = 0;
                while start < BUILD_HEIGHT {
                    let block = Block::from_u8(data[cursor]);
                    let limit = data[cursor + 1] as i32;
                    cursor += 2;
                    debug_assert!(limit > start, "column runs must strictly increase");
                    self.set_column(x, z, start, limit - start, block, registry);
                    start = limit;
                }

                let decorations = data[cursor] as usize;
                cursor += 1;
                for _ in 0..decorations {
                    let block = Block::from_u8(data[cursor]);
                    let y = data[cursor + 1] as i32;
                    cursor += 2;

                    let index = voxel_index(x, y, z);
                    let old_block = self.voxels[index as usize];
                    self.set_column(x, z, y, 1, block, registry);
                    let displaced = self.update_instance(index, old_block, block, registry);
                    debug_assert!(displaced.is_none());
                    mismatches[y as usize] += 1;
                    mismatches[y as usize + 1] -= 1;
                }
            }
        }
        debug_assert_eq!(cursor, data.len(), "column script length mismatch");

        let mut current = 0;
        for (y, count) in mismatches.iter().enumerate() {
            current += count;
            debug_assert!(current >= 0);
            self.equilevels[y] = (current == 0) as u8;
        }
        debug_assert_eq!(current, 0);
    }

    pub(crate) fn set_column(
        &mut self,
        x: i32,
        z: i32,
        start: i32,
        count: i32,
        block: Block,
        registry: &Registry,
    ) {
        debug_assert!(x >= 0 && x < CHUNK_WIDTH);
        debug_assert!(z >= 0 && z < CHUNK_WIDTH);
        debug_assert!(start >= 0 && start < BUILD_HEIGHT);

        let index = voxel_index(x, start, z);
        self.voxels[index as usize..(index + count) as usize].fill(block);

        if registry.block(block).light > 0 {
            for i in 0..count {
                self.stage1_dirty.insert(index + i);
            }
        }

        self.update_heightmap(x, z, start, count, block, index);
    }

    /// Maintain the height of the lowest all-Air suffix for one column.
    fn update_heightmap(
        &mut self,
        x: i32,
        z: i32,
        start: i32,
        count: i32,
        block: Block,
        index: i32,
    ) {
        let end = start + count;
        let offset = column_index(x, z) as usize;
        let height = self.heightmap[offset] as i32;

        if block == Block::Air && start < height && height <= end {
            // The edit may have exposed air below: scan down to the next
            // non-air voxel to find the new surface.
            let mut i = 0;
            while i < start {
                if self.voxels[(index - i - 1) as usize] != Block::Air {
                    break;
                }
                i += 1;
            }
            self.heightmap[offset] = (start - i) as u8;
        } else if block != Block::Air && height <= end {
            self.heightmap[offset] = end as u8;
        }
    }

    pub(crate) fn update_instance(
        &mut self,
        index: i32,
        old_block: Block,
        new_block: Block,
        registry: &Registry,
    ) -> Option<InstancedMeshHandle> {
        let old_mesh = registry.block(old_block).mesh;
        let new_mesh = registry.block(new_block).mesh;

        if new_mesh {
            self.instances
                .insert(
                    index,
                    Instance {
                        block: new_block,
                        mesh: None,
                    },
                )
                .and_then(|displaced| displaced.mesh)
        } else if old_mesh {
            self.instances
                .remove(&index)
                .and_then(|displaced| displaced.mesh)
        } else {
            None
        }
    }
}

/// Compare two columns' run scripts, bumping the per-height mismatch counter
/// at each height where the (un)match state flips. After every column is
/// folded in, heights with a zero prefix sum are equilevels.
fn detect_mismatches(base: &[u8], test: &[u8], mismatches: &mut [i32; WORLD_HEIGHT as usize]) {
    let mut matched = true;
    let mut base_start = 0;
    let mut test_start = 0;
    let mut base_cursor = 0usize;
    let mut test_cursor = 0usize;

    while base_start < BUILD_HEIGHT {
        if matched != (base[base_cursor] == test[test_cursor]) {
            let height = base_start.max(test_start);
            mismatches[height as usize] += if matched { 1 } else { -1 };
            matched = !matched;
        }

        let base_limit = base[base_cursor + 1] as i32;
        let test_limit = test[test_cursor + 1] as i32;
        if base_limit <= test_limit {
            base_start = base_limit;
            base_cursor += 2;
        }
        if test_limit <= base_limit {
            test_start = test_limit;
            test_cursor += 2;
        }
    }

    if !matched {
        mismatches[BUILD_HEIGHT as usize] -= 1;
    }

    debug_assert_eq!(base_start, test_start);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::block::BlockData;

    fn test_registry() -> Registry {
        let mut registry = Registry::new();
        registry.add_block(Block::Air, BlockData::AIR);
        registry.add_block(
            Block::Unknown,
            BlockData {
                opaque: true,
                solid: true,
                ..BlockData::AIR
            },
        );
        registry.add_block(
            Block::Bedrock,
            BlockData {
                opaque: true,
                solid: true,
                ..BlockData::AIR
            },
        );
        registry
    }

    /// One chunk of columns: Bedrock to the given height, then Air.
    fn flat_script(height: u8) -> Vec<u8> {
        let mut data = Vec::new();
        for _ in 0..CHUNK_WIDTH * CHUNK_WIDTH {
            data.extend_from_slice(&[Block::Bedrock as u8, height]);
            data.extend_from_slice(&[Block::Air as u8, BUILD_HEIGHT as u8]);
            data.push(0);
        }
        data
    }

    #[test]
    fn test_load_flat_terrain() {
        let registry = test_registry();
        let mut chunk = Chunk::default();
        chunk.init(Point::ZERO, &flat_script(10), &registry);

        assert_eq!(chunk.get_block(3, 5, 3), Block::Bedrock);
        assert_eq!(chunk.get_block(3, 10, 3), Block::Air);
        assert_eq!(chunk.heightmap[column_index(3, 3) as usize], 10);

        // A flat world is equilevel everywhere.
        assert!(chunk.equilevels.iter().all(|&level| level == 1));
    }

    #[test]
    fn test_set_block_updates_heightmap_and_equilevels() {
        let registry = test_registry();
        let mut chunk = Chunk::default();
        chunk.init(Point::ZERO, &flat_script(10), &registry);

        chunk.set_block(4, 20, 4, Block::Bedrock, &registry);
        assert_eq!(chunk.heightmap[column_index(4, 4) as usize], 21);
        assert_eq!(chunk.equilevels[20], 0);
        assert!(chunk.dirty && chunk.stage2_dirty);

        // Clearing it again re-scans the column down to the terrain surface.
        chunk.set_block(4, 20, 4, Block::Air, &registry);
        assert_eq!(chunk.heightmap[column_index(4, 4) as usize], 10);
    }

    #[test]
    fn test_set_block_noop_keeps_state() {
        let registry = test_registry();
        let mut chunk = Chunk::default();
        chunk.init(Point::ZERO, &flat_script(10), &registry);
        chunk.dirty = false;
        chunk.stage2_dirty = false;

        chunk.set_block(0, 5, 0, Block::Bedrock, &registry);
        assert!(!chunk.dirty && !chunk.stage2_dirty);
        assert!(chunk.stage1_dirty.is_empty());
    }

    #[test]
    fn test_decorations_clear_equilevels() {
        let registry = test_registry();
        let mut data = Vec::new();
        for z in 0..CHUNK_WIDTH {
            for x in 0..CHUNK_WIDTH {
                data.extend_from_slice(&[Block::Bedrock as u8, 10]);
                data.extend_from_slice(&[Block::Air as u8, BUILD_HEIGHT as u8]);
                if x == 0 && z == 0 {
                    data.push(1);
                    data.extend_from_slice(&[Block::Bedrock as u8, 42]);
                } else {
                    data.push(0);
                }
            }
        }

        let mut chunk = Chunk::default();
        chunk.init(Point::ZERO, &data, &registry);
        assert_eq!(chunk.get_block(0, 42, 0), Block::Bedrock);
        assert_eq!(chunk.equilevels[42], 0);
        assert_eq!(chunk.equilevels[43], 1);
        assert_eq!(chunk.heightmap[0], 43);
    }

    #[test]
    fn test_point_lights_insert_and_erase() {
        let registry = test_registry();
        let mut chunk = Chunk::default();
        chunk.init(Point::ZERO, &flat_script(10), &registry);

        chunk.set_point_light(1, 12, 1, 9);
        assert_eq!(chunk.point_lights.get(&voxel_index(1, 12, 1)), Some(&9));
        chunk.set_point_light(1, 12, 1, 0);
        assert!(chunk.point_lights.is_empty());
    }
}
