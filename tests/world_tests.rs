/// Integration tests for streaming: window management, per-frame budgets,
/// eviction, and renderer handle lifecycles.
mod common;

use common::{build_world, null_world, settle, RecordingRenderer};
use voxel_world::*;

#[test]
fn test_streaming_fills_and_refills_window() {
    let mut world = null_world(3);
    world.recenter(0, 0);
    settle(&mut world, 0);
    let full = world.chunk_count();
    assert!(full > 9, "radius-3 window holds more than the center ring");

    // A five-chunk hop drops the far side in a single recenter call.
    world.recenter(5 << CHUNK_BITS, 0);
    let after = world.chunk_count();
    assert!(after < full);

    // One step admits exactly one chunk; settling refills everything.
    world.step();
    assert_eq!(world.chunk_count(), after + 1);
    settle(&mut world, 0);
    assert_eq!(world.chunk_count(), full);
}

#[test]
fn test_center_chunk_becomes_ready_and_meshed() {
    let mut world = null_world(1);
    world.recenter(0, 0);
    settle(&mut world, 2);

    let chunk = world.chunk(Point::ZERO).expect("center chunk is loaded");
    assert!(chunk.has_mesh(), "island terrain yields a mesh");
    assert!(!chunk.needs_remesh());
}

#[test]
fn test_block_edits_round_trip() {
    let mut world = null_world(1);
    world.recenter(0, 0);
    settle(&mut world, 1);

    assert_ne!(world.get_block(3, 20, 3), Block::Unknown);
    world.set_block(3, 20, 3, Block::Trunk);
    assert_eq!(world.get_block(3, 20, 3), Block::Trunk);
    world.set_block(3, 20, 3, Block::Air);
    assert_eq!(world.get_block(3, 20, 3), Block::Air);

    // Writes outside the build range or the window are ignored.
    world.set_block(3, -1, 3, Block::Trunk);
    world.set_block(3, BUILD_HEIGHT, 3, Block::Trunk);
    world.set_block(10_000, 20, 3, Block::Trunk);
    assert_eq!(world.get_block(10_000, 20, 3), Block::Unknown);
}

#[test]
fn test_heightmap_and_equilevel_invariants_hold() {
    let mut world = null_world(1);
    world.recenter(0, 0);
    settle(&mut world, 1);

    let chunk = world.chunk(Point::ZERO).unwrap();
    for x in 0..CHUNK_WIDTH {
        for z in 0..CHUNK_WIDTH {
            let height = chunk.height_at(x, z) as i32;
            for y in height..BUILD_HEIGHT {
                assert_eq!(
                    chunk.get_block(x, y, z),
                    Block::Air,
                    "everything at and above the height is air"
                );
            }
            if height > 0 {
                assert_ne!(chunk.get_block(x, height - 1, z), Block::Air);
            }
        }
    }

    for y in 0..BUILD_HEIGHT {
        if !chunk.is_equilevel(y) {
            continue;
        }
        let base = chunk.get_block(0, y, 0);
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                assert_eq!(chunk.get_block(x, y, z), base, "equilevel plane {y}");
            }
        }
    }
}

#[test]
fn test_renderer_handles_balance_on_eviction() {
    let (renderer, log) = RecordingRenderer::new();
    let mut world = build_world(2, Box::new(renderer));
    world.recenter(0, 0);
    settle(&mut world, 4);

    {
        let log = log.borrow();
        assert!(
            !log.live_voxel_meshes.is_empty(),
            "ready chunks acquire mesh handles"
        );
        assert!(!log.live_light_textures.is_empty());
        assert!(log.light_binds > 0, "meshes get their light textures bound");
    }

    // Moving the window far away destroys everything; every handle the
    // renderer handed out must come back.
    world.recenter(100 << CHUNK_BITS, 100 << CHUNK_BITS);
    let log = log.borrow();
    assert!(log.live_voxel_meshes.is_empty(), "voxel meshes leaked");
    assert!(log.live_light_textures.is_empty(), "light textures leaked");
    assert!(log.live_instanced_meshes.is_empty(), "instances leaked");
}

#[test]
fn test_edge_edit_dirties_the_neighbor() {
    let mut world = null_world(2);
    world.recenter(0, 0);
    settle(&mut world, 6);

    // Both chunks are ready and settled, so needs_remesh tracks dirtiness.
    assert!(!world.chunk(Point::ZERO).unwrap().needs_remesh());
    assert!(!world.chunk(Point::new(-1, 0)).unwrap().needs_remesh());

    world.set_block(0, 30, 5, Block::Trunk);
    assert!(world.chunk(Point::ZERO).unwrap().needs_remesh());
    assert!(world.chunk(Point::new(-1, 0)).unwrap().needs_remesh());
}

#[test]
fn test_window_capacity_is_stable_under_wandering() {
    let mut world = null_world(2);
    world.recenter(0, 0);
    settle(&mut world, 0);
    let full = world.chunk_count();

    // Wander along a line; the population returns to capacity each time.
    for i in 1..=4 {
        world.recenter(i * 24, i * 40);
        settle(&mut world, 0);
        assert_eq!(world.chunk_count(), full);
    }
}
