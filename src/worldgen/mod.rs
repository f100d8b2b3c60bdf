/// Deterministic procedural column generator.
///
/// Heights come from a seeded multi-octave simplex stack with a ridge
/// variant, shaped by an island falloff; three superposed cave layers are
/// carved as Air decorations, and rocks, bushes, and fungi are scattered
/// via a per-point hash. The output is the compact column script the chunk
/// loader consumes; the noise primitives are the `noise` crate's.
pub mod column;

pub use column::ColumnScript;

use noise::{NoiseFn, OpenSimplex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::count_call;
use crate::perf::FUNCTION_COUNTERS;
use crate::voxel::block::Block;
use crate::voxel::layout::{CHUNK_BITS, CHUNK_WIDTH, WORLD_HEIGHT};
use crate::voxel::Point;

pub const SEA_LEVEL: i32 = WORLD_HEIGHT / 4;

const ISLAND_RADIUS: i32 = 1024;

const CAVE_LEVELS: usize = 3;
const CAVE_DELTA_Y: i32 = 0;
const CAVE_HEIGHT: f64 = 8.0;
const CAVE_RADIUS: f64 = 16.0;
const CAVE_CUTOFF: f64 = 0.25;
const CAVE_WAVE_HEIGHT: f64 = 16.0;
const CAVE_WAVE_RADIUS: f64 = 256.0;

const BUFFER: i32 = 1;
const EXPANDED: i32 = CHUNK_WIDTH + 2 * BUFFER;

const HASH_BITS: u32 = 10;

/// Minetest-style fractal noise: summed octaves with per-octave gain and
/// frequency scaling, then an affine map into the target range.
struct OctaveNoise {
    offset: f64,
    scale: f64,
    inverse_spread: f64,
    persistence: f64,
    lacunarity: f64,
    components: Vec<OpenSimplex>,
}

impl OctaveNoise {
    fn new(
        seed: &mut u32,
        offset: f64,
        scale: f64,
        spread: f64,
        octaves: usize,
        persistence: f64,
        lacunarity: f64,
    ) -> Self {
        OctaveNoise {
            offset,
            scale,
            inverse_spread: 1.0 / spread,
            persistence,
            lacunarity,
            components: seeded_components(seed, octaves),
        }
    }

    fn sample(&self, x: f64, y: f64) -> f64 {
        let mut s = self.inverse_spread;
        let mut g = 1.0;
        let mut result = 0.0;
        for component in &self.components {
            result += g * component.get([x * s, y * s]);
            g *= self.persistence;
            s *= self.lacunarity;
        }
        self.scale * result + self.offset
    }
}

/// Ridged noise: folds each octave around its extremes to carve crests.
struct RidgeNoise {
    inverse_spread: f64,
    persistence: f64,
    components: Vec<OpenSimplex>,
}

impl RidgeNoise {
    fn new(seed: &mut u32, octaves: usize, persistence: f64, spread: f64) -> Self {
        RidgeNoise {
            inverse_spread: 1.0 / spread,
            persistence,
            components: seeded_components(seed, octaves),
        }
    }

    fn sample(&self, x: f64, y: f64) -> f64 {
        let mut s = self.inverse_spread;
        let mut g = 1.0;
        let mut result = 0.0;
        for component in &self.components {
            result += (1.0 - component.get([x * s, y * s]).abs()) * g;
            g *= self.persistence;
            s *= 2.0;
        }
        result
    }
}

fn seeded_components(seed: &mut u32, octaves: usize) -> Vec<OpenSimplex> {
    (0..octaves)
        .map(|_| {
            let component = OpenSimplex::new(*seed);
            *seed = seed.wrapping_add(1);
            component
        })
        .collect()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct HeightmapSample {
    block: Block,
    height: i32,
    snow_depth: i32,
}

const EMPTY_SAMPLE: HeightmapSample = HeightmapSample {
    block: Block::Bedrock,
    height: 0,
    snow_depth: 0,
};

pub struct Worldgen {
    cliff_select: OctaveNoise,
    mountain_select: OctaveNoise,
    terrain_ground: OctaveNoise,
    terrain_cliff: OctaveNoise,
    mountain_ridge: RidgeNoise,
    cave_noises: Vec<OpenSimplex>,
    randomness: Vec<u16>,

    script: ColumnScript,
    heightmap_data: Vec<u32>,
    raw: Vec<HeightmapSample>,
    last_chunk: Point,
}

impl Worldgen {
    pub fn new(seed: u32) -> Self {
        let mut counter = seed;
        let cliff_select = OctaveNoise::new(&mut counter, 0.0, 1.0, 512.0, 4, 0.7, 2.0);
        let mountain_select = OctaveNoise::new(&mut counter, 0.0, 1.0, 512.0, 4, 0.7, 2.0);
        let terrain_ground = OctaveNoise::new(&mut counter, 2.0, 8.0, 512.0, 6, 0.6, 2.0);
        let terrain_cliff = OctaveNoise::new(&mut counter, 8.0, 16.0, 512.0, 6, 0.6, 2.0);
        let mountain_ridge = RidgeNoise::new(&mut counter, 4, 0.5, 500.0);
        let cave_noises = seeded_components(&mut counter, 2 * CAVE_LEVELS);

        let mut rng = ChaCha8Rng::seed_from_u64(seed as u64 + 17);
        let randomness = (0..1usize << (2 * HASH_BITS)).map(|_| rng.gen()).collect();

        Worldgen {
            cliff_select,
            mountain_select,
            terrain_ground,
            terrain_cliff,
            mountain_ridge,
            cave_noises,
            randomness,
            script: ColumnScript::new(),
            heightmap_data: Vec::new(),
            raw: vec![EMPTY_SAMPLE; (EXPANDED * EXPANDED) as usize],
            last_chunk: Point::new(i32::MAX, i32::MAX),
        }
    }

    /// Serialize every column of the chunk at `point`, z-major, into one
    /// back-to-back byte stream. The buffer is reused across calls.
    pub fn chunk_columns(&mut self, point: Point) -> &[u8] {
        count_call!(FUNCTION_COUNTERS.chunk_generation_calls);
        self.script.reset();
        let bx = point.x << CHUNK_BITS;
        let bz = point.y << CHUNK_BITS;
        for j in 0..CHUNK_WIDTH {
            for i in 0..CHUNK_WIDTH {
                self.load_column(i + bx, j + bz);
            }
        }
        self.script.as_bytes()
    }

    /// LOD heightmap samples for frontier meshing: one packed u32 per
    /// column holding `(block, height)` and, under the sea, the water
    /// surface in the upper bytes.
    pub fn heightmap_samples(&mut self, point: Point, level: i32) -> &[u32] {
        self.heightmap_data.clear();
        let bx = point.x << CHUNK_BITS;
        let bz = point.y << CHUNK_BITS;
        for j in 0..CHUNK_WIDTH {
            for i in 0..CHUNK_WIDTH {
                let ax = (2 * (i + bx) + 1) << level;
                let az = (2 * (j + bz) + 1) << level;
                let packed = self.pack_heightmap_data(ax, az);
                self.heightmap_data.push(packed);
            }
        }
        &self.heightmap_data
    }

    /// The terrain surface height at a world column, before caves.
    pub fn base_height(&self, x: i32, z: i32) -> i32 {
        self.heightmap_at(x, z).height
    }

    fn hash_point(&self, x: i32, z: i32) -> u16 {
        let mask = (1 << HASH_BITS) - 1;
        let x = x & mask;
        let z = z & mask;
        self.randomness[((x << HASH_BITS) | z) as usize]
    }

    fn heightmap_at(&self, x: i32, z: i32) -> HeightmapSample {
        let (xf, zf) = (x as f64, z as f64);
        let base = (xf * xf + zf * zf).sqrt() / ISLAND_RADIUS as f64;
        let falloff = 16.0 * base * base;
        if falloff >= SEA_LEVEL as f64 {
            return EMPTY_SAMPLE;
        }

        let cliff_select = self.cliff_select.sample(xf, zf);
        let cliff_x = (16.0 * cliff_select.abs() - 4.0).clamp(0.0, 1.0);

        let mountain_select = self.mountain_select.sample(xf, zf);
        let mountain_x = (8.0 * mountain_select).max(0.0).sqrt();

        let cliff = cliff_x - mountain_x;
        let mountain = -cliff;

        let height_ground = self.terrain_ground.sample(xf, zf);
        let height_cliff = if cliff > 0.0 {
            self.terrain_cliff.sample(xf, zf)
        } else {
            height_ground
        };
        let height_mountain = if mountain > 0.0 {
            height_ground + 64.0 * (self.mountain_ridge.sample(xf, zf) - 1.25).powf(1.5)
        } else {
            height_ground
        };

        let height = if height_mountain > height_ground {
            height_mountain * mountain + height_ground * (1.0 - mountain)
        } else if height_cliff > height_ground {
            height_cliff * cliff + height_ground * (1.0 - cliff)
        } else {
            height_ground
        };

        let truncated = (height - falloff) as i32;
        let abs_height = truncated + SEA_LEVEL;
        let snow_line = height - (72.0 - 8.0 * mountain);
        let block = if truncated < -1 {
            Block::Dirt
        } else if height_mountain > height_ground {
            if snow_line > 0.0 {
                Block::Snow
            } else {
                Block::Stone
            }
        } else if height_cliff > height_ground {
            Block::Dirt
        } else if truncated < 1 {
            Block::Sand
        } else {
            Block::Grass
        };

        HeightmapSample {
            block,
            height: abs_height,
            snow_depth: if block == Block::Snow {
                snow_line as i32
            } else {
                0
            },
        }
    }

    /// Carve up to three cave layers into the current column and return the
    /// highest carved y.
    fn carve_caves(&mut self, x: i32, z: i32, limit: i32, surface_height: i32) -> i32 {
        let mut max = 0;
        let mut min = WORLD_HEIGHT;
        let start = SEA_LEVEL as f64 - (CAVE_DELTA_Y * (CAVE_LEVELS as i32 - 1)) as f64 / 2.0;

        for i in 0..CAVE_LEVELS {
            let carver_noise = &self.cave_noises[2 * i];
            let height_noise = &self.cave_noises[2 * i + 1];
            let carver = carver_noise.get([x as f64 / CAVE_RADIUS, z as f64 / CAVE_RADIUS]);
            if carver <= CAVE_CUTOFF {
                continue;
            }

            let dy = start + (i as i32 * CAVE_DELTA_Y) as f64;
            let wave =
                height_noise.get([x as f64 / CAVE_WAVE_RADIUS, z as f64 / CAVE_WAVE_RADIUS]);
            let offset = (dy + CAVE_WAVE_HEIGHT * wave) as i32;
            let blocks = ((carver - CAVE_CUTOFF) * CAVE_HEIGHT) as i32;

            let ay = offset - blocks;
            let by = (offset + blocks + 3).min(limit);
            for y in ay..by {
                self.script.decorate(Block::Air, y);
            }
            max = max.max(by);
            min = min.min(ay);
        }

        if max < surface_height && max < limit && (self.hash_point(x, z) & 63) == 4 {
            self.script.decorate(Block::Fungi, min);
        }
        max
    }

    fn load_column(&mut self, x: i32, z: i32) {
        const NEIGHBOR_OFFSETS: [i32; 5] = [0, 1, -1, EXPANDED, -EXPANDED];

        let cx = x >> CHUNK_BITS;
        let cz = z >> CHUNK_BITS;
        let dx = (cx << CHUNK_BITS) - BUFFER;
        let dz = (cz << CHUNK_BITS) - BUFFER;
        let chunk = Point::new(cx, cz);

        if self.last_chunk != chunk {
            self.last_chunk = chunk;
            for j in 0..EXPANDED {
                for i in 0..EXPANDED {
                    self.raw[(i + j * EXPANDED) as usize] = self.heightmap_at(i + dx, j + dz);
                }
            }
        }

        let index = ((x - dx) + (z - dz) * EXPANDED) as usize;
        let cache = self.raw[index];
        if cache.block == Block::Snow {
            self.script.push(Block::Stone, cache.height - cache.snow_depth);
        } else if cache.block != Block::Stone {
            self.script.push(Block::Stone, cache.height - 4);
            self.script.push(Block::Dirt, cache.height - 1);
        }
        self.script.push(cache.block, cache.height);
        self.script.push(Block::Water, SEA_LEVEL);

        // Never carve caves through the floor of a nearby body of water.
        let mut limit = WORLD_HEIGHT - 1;
        for offset in NEIGHBOR_OFFSETS {
            let neighbor_height = self.raw[(index as i32 + offset) as usize].height;
            if neighbor_height >= SEA_LEVEL {
                continue;
            }
            limit = limit.min(neighbor_height - 1);
        }
        let cave_height = self.carve_caves(x, z, limit, cache.height);

        if cache.block == Block::Grass && cave_height < cache.height {
            let hash = self.hash_point(x, z) & 63;
            if hash < 2 {
                self.script.decorate(Block::Bush, cache.height);
            } else if hash < 4 {
                self.script.decorate(Block::Rock, cache.height);
            }
        }
        self.script.commit();
    }

    fn pack_heightmap_data(&self, x: i32, z: i32) -> u32 {
        let result = self.heightmap_at(x, z);
        let solid_block = result.block as u32;
        let solid_height = result.height.clamp(0x00, 0xff) as u32;

        if solid_height >= SEA_LEVEL as u32 {
            solid_block | (solid_height << 8)
        } else {
            solid_block
                | (solid_height << 8)
                | ((Block::Water as u32) << 16)
                | ((SEA_LEVEL as u32) << 24)
        }
    }
}
