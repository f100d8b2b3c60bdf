/// World: the top-level frame loop over a moving window of chunks.
///
/// Per frame the host recenters the window, then `step` admits up to
/// `load_per_frame` new chunks and visits the rest in ascending distance
/// order, remeshing and relighting under per-frame budgets. The nine
/// nearest chunks form the visually critical neighborhood and may always
/// remesh; everything beyond is amortized.
use std::mem;

use log::debug;

use crate::circle::Circle;
use crate::count_call;
use crate::lighting::{
    lighting_init, lighting_stage1, lighting_stage2, set_light_texture, zone_points, LightScratch,
};
use crate::meshing::{Mesher, Quad, MESHER_OFFSETS};
use crate::perf::FUNCTION_COUNTERS;
use crate::renderer::{MeshPhase, Renderer, VoxelMeshHandle};
use crate::voxel::block::{Block, BlockData, Material, MaterialData};
use crate::voxel::chunk::{Chunk, NEIGHBORS};
use crate::voxel::layout::{
    column_index, index_to_coords, pad_column_index, pad_index, voxel_index, BUILD_HEIGHT,
    CHUNK_BITS, CHUNK_MASK, SUNLIGHT, WORLD_HEIGHT,
};
use crate::voxel::registry::Registry;
use crate::voxel::Point;
use crate::worldgen::Worldgen;

/// World configuration parameters.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Window radius in chunks around the viewpoint.
    pub radius: i32,
    /// Worldgen seed.
    pub seed: u32,
    /// Maximum chunk loads per frame.
    pub load_per_frame: usize,
    /// Maximum remeshes per frame beyond the nearest nine chunks.
    pub mesh_per_frame: usize,
    /// Maximum relights per frame.
    pub light_per_frame: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            radius: 12,
            seed: 0,
            load_per_frame: 1,
            mesh_per_frame: 1,
            light_per_frame: 4,
        }
    }
}

pub struct World {
    config: WorldConfig,
    registry: Registry,
    worldgen: Worldgen,
    mesher: Mesher,
    light_scratch: LightScratch,
    chunks: Circle<Chunk>,
    renderer: Box<dyn Renderer>,
    started: bool,

    // Reusable frame scratch.
    evicted: Vec<Point>,
    schedule: Vec<Point>,
}

impl World {
    pub fn new(config: WorldConfig, renderer: Box<dyn Renderer>) -> Self {
        let radius = config.radius as f64 + 0.5;
        let seed = config.seed;
        World {
            config,
            registry: Registry::new(),
            worldgen: Worldgen::new(seed),
            mesher: Mesher::new(),
            light_scratch: LightScratch::new(),
            chunks: Circle::new(radius),
            renderer,
            started: false,
            evicted: Vec::new(),
            schedule: Vec::new(),
        }
    }

    /// Register a block type. Registration is append-only and must finish
    /// before the first frame.
    pub fn register_block(&mut self, block: Block, data: BlockData) {
        assert!(!self.started, "registration must precede the first frame");
        self.registry.add_block(block, data);
    }

    pub fn register_material(&mut self, material: Material, data: MaterialData) {
        assert!(!self.started, "registration must precede the first frame");
        self.registry.add_material(material, data);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn chunk(&self, point: Point) -> Option<&Chunk> {
        self.chunks.get(point)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The block at world coordinates. Sentinels outside the window:
    /// Bedrock below the world, Air above it, Unknown where no chunk is
    /// loaded.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Block {
        if y < 0 {
            return Block::Bedrock;
        }
        if y >= BUILD_HEIGHT {
            return Block::Air;
        }

        match self.chunks.get(Point::new(x >> CHUNK_BITS, z >> CHUNK_BITS)) {
            Some(chunk) => chunk.get_block(x & CHUNK_MASK, y, z & CHUNK_MASK),
            None => Block::Unknown,
        }
    }

    /// The observed light level: 0 below the world, full sunlight above it
    /// and in unloaded space.
    pub fn get_light_level(&self, x: i32, y: i32, z: i32) -> i32 {
        if y < 0 {
            return 0;
        }
        if y >= WORLD_HEIGHT {
            return SUNLIGHT;
        }

        match self.chunks.get(Point::new(x >> CHUNK_BITS, z >> CHUNK_BITS)) {
            Some(chunk) => chunk.get_light_level(x & CHUNK_MASK, y, z & CHUNK_MASK, &self.registry),
            None => SUNLIGHT,
        }
    }

    /// Overwrite one voxel. Out-of-range heights are ignored; edits on a
    /// chunk edge also dirty the adjacent chunks so their border faces and
    /// lighting refresh.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: Block) {
        if !(0..BUILD_HEIGHT).contains(&y) {
            return;
        }

        let point = Point::new(x >> CHUNK_BITS, z >> CHUNK_BITS);
        let (xm, zm) = (x & CHUNK_MASK, z & CHUNK_MASK);

        let World {
            chunks,
            registry,
            renderer,
            ..
        } = self;
        let Some(chunk) = chunks.get_mut(point) else {
            return;
        };
        if chunk.get_block(xm, y, zm) == block {
            return;
        }
        if let Some(displaced) = chunk.set_block(xm, y, zm, block, registry) {
            renderer.free_instanced_mesh(displaced);
        }

        const M: i32 = CHUNK_MASK;
        let mut mark = |dx: i32, dz: i32| {
            if let Some(neighbor) = chunks.get_mut(point + Point::new(dx, dz)) {
                neighbor.dirty = true;
            }
        };
        if xm == 0 {
            mark(-1, 0);
        }
        if xm == M {
            mark(1, 0);
        }
        if zm == 0 {
            mark(0, -1);
        }
        if zm == M {
            mark(0, 1);
        }
        if xm == 0 && zm == 0 {
            mark(-1, -1);
        }
        if xm == 0 && zm == M {
            mark(-1, 1);
        }
        if xm == M && zm == 0 {
            mark(1, -1);
        }
        if xm == M && zm == M {
            mark(1, 1);
        }
    }

    /// Place or clear a user point light. Block lights cap one below full
    /// sunlight until the light channels are split.
    pub fn set_point_light(&mut self, x: i32, y: i32, z: i32, level: i32) {
        if !(0..WORLD_HEIGHT).contains(&y) {
            return;
        }

        let point = Point::new(x >> CHUNK_BITS, z >> CHUNK_BITS);
        let level = level.min(SUNLIGHT - 1);
        if let Some(chunk) = self.chunks.get_mut(point) {
            chunk.set_point_light(x & CHUNK_MASK, y, z & CHUNK_MASK, level as i8);
        }
    }

    /// Move the window to the chunk containing block coordinates `(x, z)`,
    /// destroying every chunk that falls out of range.
    pub fn recenter(&mut self, x: i32, z: i32) {
        let center = Point::new(x >> CHUNK_BITS, z >> CHUNK_BITS);
        if center == self.chunks.center() {
            return;
        }

        let mut evicted = mem::take(&mut self.evicted);
        self.chunks.evictions_into(center, &mut evicted);
        for &point in &evicted {
            self.destroy_chunk(point);
            self.chunks.remove(point);
        }
        self.chunks.set_center(center);
        self.evicted = evicted;
    }

    /// One frame of work: admit new chunks, then remesh and relight in
    /// distance order under the per-frame budgets.
    pub fn step(&mut self) {
        self.started = true;
        self.admit_chunks();
        self.remesh_chunks();
    }

    fn admit_chunks(&mut self) {
        for _ in 0..self.config.load_per_frame {
            let missing = self.chunks.points().find(|&p| !self.chunks.contains(p));
            match missing {
                Some(point) => self.load_chunk(point),
                None => break,
            }
        }
    }

    fn load_chunk(&mut self, point: Point) {
        count_call!(FUNCTION_COUNTERS.chunk_load_calls);
        let World {
            chunks,
            worldgen,
            registry,
            ..
        } = self;

        let mut neighbors = 0;
        for delta in NEIGHBORS {
            if let Some(neighbor) = chunks.get_mut(point + delta) {
                neighbor.neighbors += 1;
                neighbor.ready = neighbor.check_ready();
                neighbors += 1;
            }
        }

        let data = worldgen.chunk_columns(point);
        let chunk = chunks.insert(point);
        chunk.init(point, data, registry);
        chunk.neighbors = neighbors;
        chunk.ready = chunk.check_ready();
        lighting_init(chunk, registry);
        debug!("loaded chunk ({}, {})", point.x, point.y);
    }

    fn destroy_chunk(&mut self, point: Point) {
        let World {
            chunks, renderer, ..
        } = self;

        if let Some(chunk) = chunks.get_mut(point) {
            chunk.drop_meshes(renderer.as_mut());
        }

        // A neighbor losing its full ring can no longer hold a mesh.
        for delta in NEIGHBORS {
            if let Some(neighbor) = chunks.get_mut(point + delta) {
                debug_assert!(neighbor.neighbors > 0);
                neighbor.neighbors -= 1;
                let was_ready = neighbor.ready;
                neighbor.ready = neighbor.check_ready();
                if was_ready && !neighbor.ready {
                    neighbor.drop_meshes(renderer.as_mut());
                }
            }
        }
        debug!("evicted chunk ({}, {})", point.x, point.y);
    }

    fn remesh_chunks(&mut self) {
        {
            let World {
                chunks, schedule, ..
            } = self;
            schedule.clear();
            schedule.extend(chunks.points());
        }

        let mut lit = 0;
        let mut meshed = 0;
        for total in 1..=self.schedule.len() {
            let point = self.schedule[total - 1];
            let can_relight = lit < self.config.light_per_frame;
            let can_remesh = total <= 9 || meshed < self.config.mesh_per_frame;
            if !(can_relight || can_remesh) {
                break;
            }

            let Some(chunk) = self.chunks.get(point) else {
                continue;
            };
            if can_remesh && chunk.needs_remesh() {
                self.remesh_chunk(point);
                meshed += 1;
            } else if can_relight && chunk.needs_relight() {
                self.relight_chunk(point);
                lit += 1;
            }
        }
    }

    fn remesh_chunk(&mut self, point: Point) {
        count_call!(FUNCTION_COUNTERS.remesh_chunk_calls);
        self.remesh_sprites(point);
        self.remesh_terrain(point);
        self.relight_chunk(point);
        if let Some(chunk) = self.chunks.get_mut(point) {
            chunk.dirty = false;
        }
    }

    fn remesh_sprites(&mut self, point: Point) {
        let World {
            chunks, renderer, ..
        } = self;
        let Some(chunk) = chunks.get_mut(point) else {
            return;
        };

        let bx = point.x << CHUNK_BITS;
        let bz = point.y << CHUNK_BITS;
        for (&index, instance) in chunk.instances.iter_mut() {
            if instance.mesh.is_some() {
                continue;
            }
            let (x, y, z) = index_to_coords(index);
            instance.mesh = Some(renderer.add_instanced_mesh(instance.block, x + bx, y, z + bz));
        }
    }

    fn remesh_terrain(&mut self, point: Point) {
        let World {
            chunks,
            mesher,
            registry,
            renderer,
            ..
        } = self;
        let Some(center) = chunks.get(point) else {
            return;
        };

        mesher.equilevels[1..=WORLD_HEIGHT as usize].copy_from_slice(&center.equilevels);

        for offset in &MESHER_OFFSETS {
            let neighbor = chunks.get(point + offset.delta);
            match neighbor {
                Some(chunk) => {
                    copy_heightmap(mesher, offset.dst, chunk, offset.src, offset.size);
                    copy_voxels(mesher, offset.dst, chunk, offset.src, offset.size);
                }
                None => {
                    zero_heightmap(mesher, offset.dst, offset.size);
                    zero_voxels(mesher, offset.dst, offset.size);
                }
            }
            if offset.delta != Point::ZERO {
                copy_equilevels(mesher, center, neighbor, offset.src, offset.size);
            }
        }

        mesher.mesh_chunk(registry);

        let Some(chunk) = chunks.get_mut(point) else {
            return;
        };
        update_mesh(
            renderer.as_mut(),
            &mut chunk.solid,
            &mesher.solid_geo,
            MeshPhase::Solid,
            point,
        );
        update_mesh(
            renderer.as_mut(),
            &mut chunk.water,
            &mesher.water_geo,
            MeshPhase::Water,
            point,
        );
    }

    fn relight_chunk(&mut self, point: Point) {
        count_call!(FUNCTION_COUNTERS.relight_chunk_calls);
        let World {
            chunks,
            registry,
            light_scratch,
            renderer,
            ..
        } = self;

        // Stage 1 runs over the whole zone first; any chunk whose automaton
        // actually moved marks its ring stage-2 dirty.
        for delta in NEIGHBORS {
            let neighbor_point = point + delta;
            let changed = match chunks.get_mut(neighbor_point) {
                Some(chunk) => lighting_stage1(chunk, registry, light_scratch),
                None => false,
            };
            if changed {
                mark_ring_stage2_dirty(chunks, neighbor_point);
            }
        }
        let changed = match chunks.get_mut(point) {
            Some(chunk) => lighting_stage1(chunk, registry, light_scratch),
            None => false,
        };
        if changed {
            mark_ring_stage2_dirty(chunks, point);
        }

        if let Some(mut zone) = chunks.get_disjoint_mut(zone_points(point)) {
            lighting_stage2(&mut zone, registry, light_scratch);
        }

        if let Some(chunk) = chunks.get_mut(point) {
            set_light_texture(chunk, renderer.as_mut(), light_scratch);
        }
    }
}

fn mark_ring_stage2_dirty(chunks: &mut Circle<Chunk>, point: Point) {
    for delta in NEIGHBORS {
        if let Some(neighbor) = chunks.get_mut(point + delta) {
            neighbor.stage2_dirty = true;
        }
    }
}

fn update_mesh(
    renderer: &mut dyn Renderer,
    slot: &mut Option<VoxelMeshHandle>,
    quads: &[Quad],
    phase: MeshPhase,
    point: Point,
) {
    if quads.is_empty() {
        if let Some(handle) = slot.take() {
            renderer.free_voxel_mesh(handle);
        }
        return;
    }

    let handle = match *slot {
        Some(handle) => {
            renderer.set_voxel_mesh_geometry(handle, quads);
            handle
        }
        None => {
            let handle = renderer.add_voxel_mesh(quads, phase);
            *slot = Some(handle);
            handle
        }
    };
    renderer.set_voxel_mesh_position(handle, point.x << CHUNK_BITS, 0, point.y << CHUNK_BITS);
}

fn copy_heightmap(mesher: &mut Mesher, dst: Point, chunk: &Chunk, src: Point, size: Point) {
    for x in 0..size.x {
        for z in 0..size.y {
            let s = column_index(src.x + x, src.y + z) as usize;
            let d = pad_column_index(dst.x + x, dst.y + z);
            mesher.heightmap[d] = chunk.heightmap[s];
        }
    }
}

fn zero_heightmap(mesher: &mut Mesher, dst: Point, size: Point) {
    for x in 0..size.x {
        for z in 0..size.y {
            mesher.heightmap[pad_column_index(dst.x + x, dst.y + z)] = 0;
        }
    }
}

fn copy_voxels(mesher: &mut Mesher, dst: Point, chunk: &Chunk, src: Point, size: Point) {
    let height = WORLD_HEIGHT as usize;
    for x in 0..size.x {
        for z in 0..size.y {
            let s = voxel_index(src.x + x, 0, src.y + z) as usize;
            let d = pad_index(dst.x + x, 1, dst.y + z);
            mesher.voxels[d..d + height].copy_from_slice(&chunk.voxels[s..s + height]);
        }
    }
}

fn zero_voxels(mesher: &mut Mesher, dst: Point, size: Point) {
    let height = WORLD_HEIGHT as usize;
    for x in 0..size.x {
        for z in 0..size.y {
            let d = pad_index(dst.x + x, 1, dst.y + z);
            mesher.voxels[d..d + height].fill(Block::Air);
        }
    }
}

/// Conservatively AND the center's equilevels against one neighbor strip:
/// a level survives only if the neighbor's border row matches the center's
/// plane block. A missing neighbor zeroes every non-Air level.
fn copy_equilevels(
    mesher: &mut Mesher,
    center: &Chunk,
    neighbor: Option<&Chunk>,
    src: Point,
    size: Point,
) {
    let Some(chunk) = neighbor else {
        for i in 0..WORLD_HEIGHT as usize {
            if mesher.equilevels[i + 1] == 0 {
                continue;
            }
            if center.voxels[i] != Block::Air {
                mesher.equilevels[i + 1] = 0;
            }
        }
        return;
    };

    debug_assert!(size.x == 1 || size.y == 1);
    let stride = if size.x == 1 { 0x1000 } else { 0x0100 };
    let index = voxel_index(src.x, 0, src.y);
    let limit = stride * if size.x == 1 { size.y } else { size.x };

    for i in 0..WORLD_HEIGHT {
        if mesher.equilevels[(i + 1) as usize] == 0 {
            continue;
        }
        let base = center.voxels[i as usize];
        if chunk.equilevels[i as usize] == 1 && chunk.voxels[i as usize] == base {
            continue;
        }
        let mut offset = 0;
        while offset < limit {
            if chunk.voxels[(index + offset + i) as usize] != base {
                mesher.equilevels[(i + 1) as usize] = 0;
                break;
            }
            offset += stride;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::NullRenderer;
    use crate::voxel::block::{MaybeMaterial, NO_MATERIAL};

    /// Register the standard block set the generator emits.
    pub fn test_world(radius: i32) -> World {
        let config = WorldConfig {
            radius,
            ..WorldConfig::default()
        };
        let mut world = World::new(config, Box::new(NullRenderer::new()));

        let opaque = |material: Material| BlockData {
            mesh: false,
            opaque: true,
            solid: true,
            light: -1,
            faces: [MaybeMaterial::some(material); 6],
        };
        let sprite = || BlockData {
            mesh: true,
            opaque: false,
            solid: false,
            light: 0,
            faces: [NO_MATERIAL; 6],
        };

        // One opaque material and one translucent water material.
        world.register_material(
            Material(0),
            MaterialData {
                liquid: false,
                alpha_test: false,
                texture: 1,
                color: [1.0, 1.0, 1.0, 1.0],
            },
        );
        world.register_material(
            Material(1),
            MaterialData {
                liquid: true,
                alpha_test: false,
                texture: 2,
                color: [1.0, 1.0, 1.0, 0.8],
            },
        );

        let solid = opaque(Material(0));
        let water = BlockData {
            mesh: false,
            opaque: false,
            solid: false,
            light: 0,
            faces: [MaybeMaterial::some(Material(1)); 6],
        };

        world.register_block(Block::Air, BlockData::AIR);
        world.register_block(
            Block::Unknown,
            BlockData {
                opaque: true,
                ..BlockData::AIR
            },
        );
        world.register_block(Block::Bedrock, solid);
        world.register_block(Block::Bush, sprite());
        world.register_block(Block::Dirt, solid);
        world.register_block(Block::Fungi, sprite());
        world.register_block(Block::Grass, solid);
        world.register_block(Block::Rock, sprite());
        world.register_block(Block::Sand, solid);
        world.register_block(Block::Snow, solid);
        world.register_block(Block::Stone, solid);
        world.register_block(Block::Trunk, solid);
        world.register_block(Block::Water, water);
        world
    }

    #[test]
    fn test_streaming_fills_window() {
        let mut world = test_world(1);
        world.recenter(0, 0);

        let capacity = world.chunks.capacity();
        for _ in 0..capacity + 1 {
            world.step();
        }
        assert_eq!(world.chunk_count(), capacity);

        // Every admissible point is loaded and the center ring is ready.
        assert!(world.chunk(Point::ZERO).unwrap().ready);
        assert_eq!(world.get_block(0, -1, 0), Block::Bedrock);
        assert_ne!(world.get_block(0, 0, 0), Block::Unknown);
    }

    #[test]
    fn test_load_budget_is_one_chunk_per_step() {
        let mut world = test_world(2);
        world.recenter(0, 0);
        assert_eq!(world.chunk_count(), 0);
        world.step();
        assert_eq!(world.chunk_count(), 1);
        world.step();
        assert_eq!(world.chunk_count(), 2);
    }

    #[test]
    fn test_recenter_evicts_out_of_range() {
        let mut world = test_world(3);
        world.recenter(0, 0);
        for _ in 0..world.chunks.capacity() {
            world.step();
        }
        let full = world.chunk_count();

        // A five-chunk hop invalidates the far side of the disk at once.
        world.recenter(5 << CHUNK_BITS, 0);
        assert!(world.chunk_count() < full);
        for point in world.chunks.points() {
            if world.chunk(point).is_some() {
                assert!(world.chunks.in_range_of(point, world.chunks.center()));
            }
        }

        // Streaming refills the window from the new center.
        for _ in 0..world.chunks.capacity() {
            world.step();
        }
        assert_eq!(world.chunk_count(), world.chunks.capacity());
    }

    #[test]
    fn test_sentinel_reads() {
        let world = test_world(1);
        assert_eq!(world.get_block(0, -5, 0), Block::Bedrock);
        assert_eq!(world.get_block(0, BUILD_HEIGHT, 0), Block::Air);
        assert_eq!(world.get_block(1000, 10, 1000), Block::Unknown);
        assert_eq!(world.get_light_level(0, -1, 0), 0);
        assert_eq!(world.get_light_level(0, WORLD_HEIGHT, 0), SUNLIGHT);
        assert_eq!(world.get_light_level(1000, 10, 1000), SUNLIGHT);
    }

    #[test]
    fn test_set_block_marks_neighbors_dirty() {
        let mut world = test_world(2);
        world.recenter(0, 0);
        for _ in 0..world.chunks.capacity() + 16 {
            world.step();
        }

        // Clear dirtiness by stepping, then edit on the -x edge of (0, 0).
        let before = world.chunk(Point::new(-1, 0)).unwrap().dirty;
        world.set_block(0, 100, 5, Block::Stone);
        assert!(world.chunk(Point::ZERO).unwrap().dirty);
        assert!(world.chunk(Point::new(-1, 0)).unwrap().dirty || before);
    }

    #[test]
    #[should_panic(expected = "registration must precede")]
    fn test_registration_after_first_frame_panics() {
        let mut world = test_world(1);
        world.step();
        world.register_material(Material(2), MaterialData::default());
    }
}
