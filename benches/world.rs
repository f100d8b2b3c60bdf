/// Benchmark suite for the frame loop: streaming steps and idle scheduling.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use voxel_world::*;

fn build_world(radius: i32) -> World {
    let config = WorldConfig {
        radius,
        ..WorldConfig::default()
    };
    let mut world = World::new(config, Box::new(NullRenderer::new()));

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
        ..BlockData::AIR
    };

    for (block, data) in [
        (Block::Air, BlockData::AIR),
        (Block::Unknown, solid),
        (Block::Bedrock, solid),
        (Block::Bush, sprite),
        (Block::Dirt, solid),
        (Block::Fungi, sprite),
        (Block::Grass, solid),
        (Block::Rock, sprite),
        (Block::Sand, solid),
        (Block::Snow, solid),
        (Block::Stone, solid),
        (Block::Trunk, solid),
        (Block::Water, water),
    ] {
        world.register_block(block, data);
    }
    world
}

fn settle(world: &mut World) {
    loop {
        let before = world.chunk_count();
        world.step();
        if world.chunk_count() == before {
            break;
        }
    }
}

fn bench_streaming_steps(c: &mut Criterion) {
    c.bench_function("world_step_wandering", |b| {
        // Hop between two centers so every iteration evicts and reloads.
        let mut world = build_world(2);
        world.recenter(0, 0);
        settle(&mut world);

        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            let x = if flip { 200 << CHUNK_BITS } else { 0 };
            world.recenter(x, 0);
            for _ in 0..8 {
                world.step();
            }
            black_box(world.chunk_count())
        });
    });
}

fn bench_idle_step(c: &mut Criterion) {
    c.bench_function("world_step_idle", |b| {
        let mut world = build_world(3);
        world.recenter(0, 0);
        settle(&mut world);
        for _ in 0..8 {
            world.step();
        }

        b.iter(|| {
            world.step();
            black_box(world.chunk_count())
        });
    });
}

fn bench_block_edit_relight(c: &mut Criterion) {
    c.bench_function("world_edit_and_restep", |b| {
        let mut world = build_world(1);
        world.recenter(0, 0);
        settle(&mut world);
        for _ in 0..4 {
            world.step();
        }

        let mut on = false;
        b.iter(|| {
            on = !on;
            let block = if on { Block::Air } else { Block::Stone };
            world.set_block(8, 30, 8, block);
            world.step();
            black_box(world.get_light_level(8, 30, 8))
        });
    });
}

criterion_group!(
    benches,
    bench_streaming_steps,
    bench_idle_step,
    bench_block_edit_relight
);
criterion_main!(benches);
