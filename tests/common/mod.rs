#![allow(dead_code)]
/// Shared fixtures: a fully registered world and a renderer double that
/// balances handle lifecycles.
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use voxel_world::*;

/// Build a world with the standard block and material set the generator
/// emits, backed by the given renderer.
pub fn build_world(radius: i32, renderer: Box<dyn Renderer>) -> World {
    let config = WorldConfig {
        radius,
        ..WorldConfig::default()
    };
    let mut world = World::new(config, renderer);

    world.register_material(
        Material(0),
        MaterialData {
            liquid: false,
            alpha_test: false,
            texture: 1,
            color: [0.6, 0.6, 0.6, 1.0],
        },
    );
    world.register_material(
        Material(1),
        MaterialData {
            liquid: true,
            alpha_test: false,
            texture: 2,
            color: [0.2, 0.4, 0.9, 0.8],
        },
    );

    let solid = BlockData {
        mesh: false,
        opaque: true,
        solid: true,
        light: -1,
        faces: [MaybeMaterial::some(Material(0)); 6],
    };
    let water = BlockData {
        mesh: false,
        opaque: false,
        solid: false,
        light: 0,
        faces: [MaybeMaterial::some(Material(1)); 6],
    };
    let sprite = BlockData {
        mesh: true,
        opaque: false,
        solid: false,
        light: 0,
        faces: [NO_MATERIAL; 6],
    };

    world.register_block(Block::Air, BlockData::AIR);
    world.register_block(Block::Unknown, solid);
    world.register_block(Block::Bedrock, solid);
    world.register_block(Block::Bush, sprite);
    world.register_block(Block::Dirt, solid);
    world.register_block(Block::Fungi, sprite);
    world.register_block(Block::Grass, solid);
    world.register_block(Block::Rock, sprite);
    world.register_block(Block::Sand, solid);
    world.register_block(Block::Snow, solid);
    world.register_block(Block::Stone, solid);
    world.register_block(Block::Trunk, solid);
    world.register_block(Block::Water, water);
    world
}

pub fn null_world(radius: i32) -> World {
    build_world(radius, Box::new(NullRenderer::new()))
}

/// Step until the window is fully populated, plus a few frames for the
/// mesh/light schedulers to settle.
pub fn settle(world: &mut World, extra: usize) {
    let mut guard = 0;
    loop {
        let before = world.chunk_count();
        world.step();
        if world.chunk_count() == before {
            break;
        }
        guard += 1;
        assert!(guard < 10_000, "world never filled its window");
    }
    for _ in 0..extra {
        world.step();
    }
}

#[derive(Default)]
pub struct RenderLog {
    pub live_light_textures: HashSet<u32>,
    pub live_voxel_meshes: HashSet<u32>,
    pub live_instanced_meshes: HashSet<u32>,
    pub voxel_meshes_added: usize,
    pub geometry_updates: usize,
    pub light_binds: usize,
}

/// Renderer double that tracks live handles and panics on any lifecycle
/// violation (double free, use of an unknown handle).
pub struct RecordingRenderer {
    next: u32,
    pub log: Rc<RefCell<RenderLog>>,
}

impl RecordingRenderer {
    pub fn new() -> (Self, Rc<RefCell<RenderLog>>) {
        let log = Rc::new(RefCell::new(RenderLog::default()));
        (
            RecordingRenderer {
                next: 1,
                log: log.clone(),
            },
            log,
        )
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Renderer for RecordingRenderer {
    fn add_light_texture(&mut self, levels: &[u8]) -> LightTextureHandle {
        assert_eq!(levels.len(), CHUNK_WIDTH as usize * CHUNK_WIDTH as usize * 256);
        let id = self.next_id();
        self.log.borrow_mut().live_light_textures.insert(id);
        LightTextureHandle(id)
    }

    fn free_light_texture(&mut self, handle: LightTextureHandle) {
        assert!(
            self.log.borrow_mut().live_light_textures.remove(&handle.0),
            "freed unknown light texture {}",
            handle.0
        );
    }

    fn add_voxel_mesh(&mut self, quads: &[Quad], _phase: MeshPhase) -> VoxelMeshHandle {
        assert!(!quads.is_empty(), "empty meshes are dropped, not added");
        let id = self.next_id();
        let mut log = self.log.borrow_mut();
        log.live_voxel_meshes.insert(id);
        log.voxel_meshes_added += 1;
        VoxelMeshHandle(id)
    }

    fn free_voxel_mesh(&mut self, handle: VoxelMeshHandle) {
        assert!(
            self.log.borrow_mut().live_voxel_meshes.remove(&handle.0),
            "freed unknown voxel mesh {}",
            handle.0
        );
    }

    fn set_voxel_mesh_geometry(&mut self, handle: VoxelMeshHandle, quads: &[Quad]) {
        let mut log = self.log.borrow_mut();
        assert!(log.live_voxel_meshes.contains(&handle.0));
        assert!(!quads.is_empty());
        log.geometry_updates += 1;
    }

    fn set_voxel_mesh_position(&mut self, handle: VoxelMeshHandle, _x: i32, _y: i32, _z: i32) {
        assert!(self.log.borrow().live_voxel_meshes.contains(&handle.0));
    }

    fn set_voxel_mesh_light(&mut self, handle: VoxelMeshHandle, light: LightTextureHandle) {
        let mut log = self.log.borrow_mut();
        assert!(log.live_voxel_meshes.contains(&handle.0));
        assert!(log.live_light_textures.contains(&light.0));
        log.light_binds += 1;
    }

    fn add_instanced_mesh(&mut self, _block: Block, _x: i32, _y: i32, _z: i32) -> InstancedMeshHandle {
        let id = self.next_id();
        self.log.borrow_mut().live_instanced_meshes.insert(id);
        InstancedMeshHandle(id)
    }

    fn free_instanced_mesh(&mut self, handle: InstancedMeshHandle) {
        assert!(
            self.log.borrow_mut().live_instanced_meshes.remove(&handle.0),
            "freed unknown instanced mesh {}",
            handle.0
        );
    }

    fn set_instanced_mesh_light(&mut self, handle: InstancedMeshHandle, level: u8) {
        assert!(self.log.borrow().live_instanced_meshes.contains(&handle.0));
        assert!(level as i32 <= SUNLIGHT);
    }
}
