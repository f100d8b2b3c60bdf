/// Two-stage voxel lighting.
///
/// Stage 1 is chunk-local: it assumes all neighboring chunks are dark and
/// keeps a dense per-voxel array at a fixpoint incrementally, driven by a
/// dirty set. Stage 2 overlays the 3x3 neighborhood: it propagates neighbor
/// edge lights and heightmap sunlight into the center chunk, mutating the
/// stage-1 buffers in place for speed and undoing every write from a delta
/// log before returning. The center's net gains are kept as a sparse map.
///
/// Both stages track cells by bit-packed indices: a 16-bit in-chunk index
/// (`y | x << 8 | z << 12`) for stage 1 and a 20-bit location (the index
/// plus a 2-bit chunk x and z in bits 16..20) for stage 2.
use std::collections::HashSet;
use std::mem;

use crate::count_call;
use crate::perf::FUNCTION_COUNTERS;
use crate::renderer::Renderer;
use crate::voxel::chunk::Chunk;
use crate::voxel::layout::{CHUNK_WIDTH, SUNLIGHT};
use crate::voxel::registry::Registry;
use crate::voxel::Point;

/// One cardinal spread direction over packed indices. An index is out of
/// bounds along the spread exactly when `index & mask == test`; otherwise
/// the neighbor is `index + diff`.
#[derive(Copy, Clone)]
pub(crate) struct LightSpread {
    pub diff: i32,
    pub mask: i32,
    pub test: i32,
}

pub(crate) const LIGHT_SPREAD: [LightSpread; 6] = [
    LightSpread { diff: -0x0100, mask: 0x0f00, test: 0x0000 },
    LightSpread { diff: 0x0100, mask: 0x0f00, test: 0x0f00 },
    LightSpread { diff: -0x1000, mask: 0xf000, test: 0x0000 },
    LightSpread { diff: 0x1000, mask: 0xf000, test: 0xf000 },
    LightSpread { diff: -0x0001, mask: 0x00ff, test: 0x0000 },
    LightSpread { diff: 0x0001, mask: 0x00ff, test: 0x00ff },
];

#[derive(Copy, Clone)]
struct LightDelta {
    location: i32,
    value: u8,
}

const NUM_BUCKETS: usize = (SUNLIGHT - 2) as usize;

/// Reusable buffers for both lighting stages. Owned by the world and reused
/// across calls; contents never outlive a single stage-2 run.
pub struct LightScratch {
    buckets: [Vec<i32>; NUM_BUCKETS],
    deltas: Vec<LightDelta>,
    next_dirty: HashSet<i32>,
}

impl Default for LightScratch {
    fn default() -> Self {
        LightScratch {
            buckets: std::array::from_fn(|_| Vec::new()),
            deltas: Vec::new(),
            next_dirty: HashSet::new(),
        }
    }
}

impl LightScratch {
    pub fn new() -> Self {
        LightScratch::default()
    }
}

// If the light at a cell changes from `prev` to `next`, these bounds give
// the exact inclusive range of neighbor light values that may need to be
// reconsidered:
//
//   - On a drop 8 -> 4, neighbors in {4..7} may also drop. 8 is excluded
//     because an equal neighbor has a different source; 3 is excluded
//     because this cell can still cast a 3.
//
//   - On a rise 4 -> 8, neighbors in {3..6} may rise. 7 is excluded because
//     the cast light caps at 7.
//
//   - A cell at full sunlight can raise the cell below it to full sunlight,
//     so the cap shifts by one when `max == SUNLIGHT`.
#[inline]
pub(crate) fn max_updated_neighbor_light(next: i32, prev: i32) -> i32 {
    let max = next.max(prev);
    max - (max < SUNLIGHT) as i32 - (next > prev) as i32
}

#[inline]
pub(crate) fn min_updated_neighbor_light(next: i32, prev: i32) -> i32 {
    next.min(prev) - (next > prev) as i32
}

/// True if the index sits on an x or z boundary of the chunk.
#[inline]
fn on_edge(index: i32) -> bool {
    let x_edge = (((index >> 8) + 1) & 0xf) < 2;
    let z_edge = (((index >> 12) + 1) & 0xf) < 2;
    x_edge || z_edge
}

/// The updated light value at an index. The previous value is never used:
/// it can be arbitrarily stale once the chunk contents change.
fn query(chunk: &Chunk, registry: &Registry, index: i32) -> i32 {
    let data = registry.block(chunk.voxels[index as usize]);
    let from_block = data.light as i32;
    if from_block < 0 {
        return 0;
    }

    let from_point = chunk.point_lights.get(&index).copied().unwrap_or(0) as i32;
    let base = from_block.max(from_point);

    let height = chunk.heightmap[(index >> 8) as usize] as i32;
    if (index & 0xff) >= height {
        return SUNLIGHT;
    }

    let mut max_neighbor = base + 1;
    for spread in &LIGHT_SPREAD {
        if index & spread.mask == spread.test {
            continue;
        }
        let neighbor = chunk.stage1_lights[(index + spread.diff) as usize] as i32;
        if neighbor > max_neighbor {
            max_neighbor = neighbor;
        }
    }
    max_neighbor - 1
}

/// Seed stage-1 state for a freshly loaded chunk: everything above the
/// heightmap is sunlit, everything below is dark, and the cells that can
/// receive light sideways (height gaps between adjacent columns, plus the
/// surface voxel under an overhang) start dirty.
pub fn lighting_init(chunk: &mut Chunk, registry: &Registry) {
    chunk.stage1_lights.fill(SUNLIGHT as u8);

    for x in 0..CHUNK_WIDTH {
        for z in 0..CHUNK_WIDTH {
            let index = (x << 8) | (z << 12);
            let height = chunk.heightmap[(index >> 8) as usize] as i32;

            for spread in &LIGHT_SPREAD[..4] {
                if index & spread.mask == spread.test {
                    continue;
                }
                let neighbor_index = index + spread.diff;
                let neighbor_height = chunk.heightmap[(neighbor_index >> 8) as usize] as i32;
                for y in height..neighbor_height {
                    chunk.stage1_dirty.insert(neighbor_index + y);
                }
            }

            if height > 0 {
                let below = index + height - 1;
                if !registry.opaque(chunk.voxels[below as usize]) {
                    chunk.stage1_dirty.insert(below);
                }
                chunk.stage1_lights[index as usize..(index + height) as usize].fill(0);
            }
        }
    }
}

/// Run the in-chunk automaton to its fixpoint. Returns true if any work was
/// done; the caller then marks the 8 neighbors stage-2 dirty.
pub fn lighting_stage1(
    chunk: &mut Chunk,
    registry: &Registry,
    scratch: &mut LightScratch,
) -> bool {
    if chunk.stage1_dirty.is_empty() {
        return false;
    }
    count_call!(FUNCTION_COUNTERS.lighting_stage1_calls);

    let next = &mut scratch.next_dirty;
    next.clear();

    while !chunk.stage1_dirty.is_empty() {
        let mut dirty = mem::take(&mut chunk.stage1_dirty);
        for &index in &dirty {
            let prev_level = chunk.stage1_lights[index as usize] as i32;
            let next_level = query(chunk, registry, index);
            if next_level == prev_level {
                continue;
            }

            chunk.stage1_lights[index as usize] = next_level as u8;

            if on_edge(index) {
                // The edge map only holds boundary cells that are neither
                // dark nor at full sunlight; the bright ones are implicit in
                // the heightmap.
                let next_in_map = 1 < next_level && next_level < SUNLIGHT;
                let prev_in_map = 1 < prev_level && prev_level < SUNLIGHT;
                if next_in_map != prev_in_map {
                    if next_in_map {
                        chunk.stage1_edges.insert(index);
                    } else {
                        chunk.stage1_edges.remove(&index);
                    }
                }
            }

            let hi = max_updated_neighbor_light(next_level, prev_level);
            let lo = min_updated_neighbor_light(next_level, prev_level);
            for spread in &LIGHT_SPREAD {
                if index & spread.mask == spread.test {
                    continue;
                }
                let neighbor_index = index + spread.diff;
                let neighbor = chunk.stage1_lights[neighbor_index as usize] as i32;
                if lo <= neighbor && neighbor <= hi {
                    next.insert(neighbor_index);
                }
            }
        }

        dirty.clear();
        chunk.stage1_dirty = mem::take(next);
        *next = dirty;
    }

    debug_assert!(chunk.stage1_dirty.is_empty());
    true
}

/// Zone slot for a stage-2 location: bits 16..18 hold the chunk x in 0..2,
/// bits 18..20 the chunk z.
#[inline]
fn zone_slot(location: i32) -> usize {
    (((location >> 16) & 0x3) + 3 * ((location >> 18) & 0x3)) as usize
}

/// The 9 chunk points of a stage-2 zone in slot order (`(dx+1) + 3*(dz+1)`).
pub(crate) fn zone_points(center: Point) -> [Point; 9] {
    let mut points = [Point::ZERO; 9];
    for dz in -1..=1 {
        for dx in -1..=1 {
            points[((dx + 1) + 3 * (dz + 1)) as usize] = center + Point::new(dx, dz);
        }
    }
    points
}

/// Center chunk's slot in the zone array.
pub(crate) const ZONE_CENTER: usize = 4;

/// Seeding and BFS both visit the zone center-first, cardinals before
/// diagonals, matching the chunk notification order.
const ZONE_VISIT_ORDER: [usize; 9] = [4, 3, 5, 1, 7, 0, 6, 2, 8];

/// Taxicab distance from a location to the center chunk. A cell at distance
/// `d` cannot usefully propagate below level `d` into the center.
#[inline]
fn distance(location: i32) -> i32 {
    let cx = (location >> 16) & 0x3;
    let x = (location >> 8) & 0xf;
    let dx = if cx == 0 {
        16 - x
    } else if cx == 1 {
        0
    } else {
        x - 31
    };

    let cz = (location >> 18) & 0x3;
    let z = (location >> 12) & 0xf;
    let dz = if cz == 0 {
        16 - z
    } else if cz == 1 {
        0
    } else {
        z - 31
    };

    dx + dz
}

/// Move a location one step along a spread, crossing chunk boundaries within
/// the 3x3 zone. Returns -1 if the move leaves the zone or the y range.
#[inline]
fn shift(location: i32, spread: &LightSpread) -> i32 {
    if location & spread.mask != spread.test {
        return location + spread.diff;
    }
    match spread.mask {
        0x00ff => -1,
        0x0f00 => {
            let x = ((location >> 16) & 0x3) + (spread.diff >> 8);
            if !(0..=2).contains(&x) {
                return -1;
            }
            ((location & 0xffff) ^ spread.mask) | (x << 16) | (location & (0x3 << 18))
        }
        0xf000 => {
            let z = ((location >> 18) & 0x3) + (spread.diff >> 12);
            if !(0..=2).contains(&z) {
                return -1;
            }
            ((location & 0xffff) ^ spread.mask) | (location & (0x3 << 16)) | (z << 18)
        }
        _ => unreachable!(),
    }
}

#[inline]
fn propagate(
    chunk: &mut Chunk,
    registry: &Registry,
    level: i32,
    neighbor_index: i32,
    neighbor_union: i32,
    buckets: &mut [Vec<i32>; NUM_BUCKETS],
    deltas: &mut Vec<LightDelta>,
) {
    let neighbor_level = chunk.stage1_lights[neighbor_index as usize] as i32;
    if level <= neighbor_level {
        return;
    }
    if neighbor_level == 0 && registry.opaque(chunk.voxels[neighbor_index as usize]) {
        return;
    }

    let neighbor_location = neighbor_index | neighbor_union;
    chunk.stage1_lights[neighbor_index as usize] = level as u8;
    deltas.push(LightDelta {
        location: neighbor_location,
        value: neighbor_level as u8,
    });
    if level <= 1 {
        return;
    }
    buckets[(SUNLIGHT - level - 1) as usize].push(neighbor_location);
}

/// Cross-chunk lighting over a 3x3 zone. `zone` is in slot order; the
/// center chunk's `stage2_lights` is rebuilt and every chunk's stage-1
/// buffer is byte-identical to its state on entry when this returns.
pub(crate) fn lighting_stage2(
    zone: &mut [&mut Chunk; 9],
    registry: &Registry,
    scratch: &mut LightScratch,
) {
    if !(zone[ZONE_CENTER].ready && zone[ZONE_CENTER].stage2_dirty) {
        return;
    }
    count_call!(FUNCTION_COUNTERS.lighting_stage2_calls);

    let LightScratch {
        buckets, deltas, ..
    } = scratch;
    for bucket in buckets.iter_mut() {
        bucket.clear();
    }
    deltas.clear();

    // Seed from each chunk's sparse edge lights and from the sunlight gaps
    // between adjacent columns at every shared border.
    for &slot in &ZONE_VISIT_ORDER {
        let cx = (slot % 3) as i32;
        let cz = (slot / 3) as i32;

        for spread in &LIGHT_SPREAD[..4] {
            let dx = if spread.mask == 0x0f00 { spread.diff >> 8 } else { 0 };
            let dz = if spread.mask == 0xf000 { spread.diff >> 12 } else { 0 };
            let (ncx, ncz) = (cx + dx, cz + dz);
            if !(0..=2).contains(&ncx) || !(0..=2).contains(&ncz) {
                continue;
            }

            let neighbor_slot = (ncx + 3 * ncz) as usize;
            let neighbor_union = (ncx << 16) | (ncz << 18);
            let [source, target] = zone
                .get_disjoint_mut([slot, neighbor_slot])
                .expect("zone slots are distinct");

            for &index in &source.stage1_edges {
                if index & spread.mask != spread.test {
                    continue;
                }
                let neighbor_index = index ^ spread.mask;
                let level = source.stage1_lights[index as usize] as i32 - 1;
                propagate(
                    target,
                    registry,
                    level,
                    neighbor_index,
                    neighbor_union,
                    buckets,
                    deltas,
                );
            }

            let source_test = spread.test;
            let target_test = source_test ^ spread.mask;
            let stride = if spread.mask == 0x0f00 { 0x1000 } else { 0x0100 };
            let mut offset = 0;
            for _ in 0..CHUNK_WIDTH {
                let height = source.heightmap[((source_test + offset) >> 8) as usize] as i32;
                let neighbor_height =
                    target.heightmap[((target_test + offset) >> 8) as usize] as i32;
                for y in height..neighbor_height {
                    propagate(
                        target,
                        registry,
                        SUNLIGHT - 1,
                        target_test + offset + y,
                        neighbor_union,
                        buckets,
                        deltas,
                    );
                }
                offset += stride;
            }
        }
    }

    // Bucketed BFS, brightest first. Cells at level {0, 1} never propagate.
    let max = SUNLIGHT - 2;
    for level in (1..=max).rev() {
        let prev_bucket = (max - level) as usize;
        let prev_level = level + 1;
        let (head, tail) = buckets.split_at_mut(prev_bucket + 1);
        let prev = &head[prev_bucket];
        let mut next = if level > 1 { Some(&mut tail[0]) } else { None };

        for &location in prev.iter() {
            if distance(location) > level {
                continue;
            }
            let index = (location & 0xffff) as usize;
            let current = zone[zone_slot(location)].stage1_lights[index] as i32;
            if current != prev_level {
                continue;
            }

            for spread in &LIGHT_SPREAD {
                let neighbor_location = shift(location, spread);
                if neighbor_location < 0 {
                    continue;
                }

                let chunk = &mut *zone[zone_slot(neighbor_location)];
                let neighbor_index = (neighbor_location & 0xffff) as usize;
                let neighbor_level = chunk.stage1_lights[neighbor_index] as i32;
                if level <= neighbor_level {
                    continue;
                }
                if neighbor_level == 0 && registry.opaque(chunk.voxels[neighbor_index]) {
                    continue;
                }

                chunk.stage1_lights[neighbor_index] = level as u8;
                deltas.push(LightDelta {
                    location: neighbor_location,
                    value: neighbor_level as u8,
                });
                if let Some(next) = next.as_mut() {
                    next.push(neighbor_location);
                }
            }
        }
    }

    // Keep the center's merged values as the sparse stage-2 overlay, then
    // replay the undo log in reverse to restore every stage-1 buffer.
    const CENTER_UNION: i32 = (1 << 16) | (1 << 18);
    {
        let center = &mut *zone[ZONE_CENTER];
        center.stage2_lights.clear();
        for delta in deltas.iter() {
            if delta.location & !0xffff != CENTER_UNION {
                continue;
            }
            let index = delta.location & 0xffff;
            center
                .stage2_lights
                .insert(index, center.stage1_lights[index as usize]);
        }
    }
    for delta in deltas.iter().rev() {
        let slot = zone_slot(delta.location);
        zone[slot].stage1_lights[(delta.location & 0xffff) as usize] = delta.value;
    }

    zone[ZONE_CENTER].stage2_dirty = false;
}

/// Upload the merged light values: stage-2 entries are swapped into the
/// stage-1 buffer, the texture is (re)created, and the swaps are undone.
pub(crate) fn set_light_texture(
    chunk: &mut Chunk,
    renderer: &mut dyn Renderer,
    scratch: &mut LightScratch,
) {
    if !chunk.has_mesh() {
        return;
    }

    scratch.deltas.clear();
    {
        let Chunk {
            stage2_lights,
            stage1_lights,
            ..
        } = chunk;
        for (&index, &value) in stage2_lights.iter() {
            scratch.deltas.push(LightDelta {
                location: index,
                value: stage1_lights[index as usize],
            });
            stage1_lights[index as usize] = value;
        }
    }

    if let Some(old) = chunk.light.take() {
        renderer.free_light_texture(old);
    }
    let texture = renderer.add_light_texture(&chunk.stage1_lights[..]);
    chunk.light = Some(texture);
    if let Some(solid) = chunk.solid {
        renderer.set_voxel_mesh_light(solid, texture);
    }
    if let Some(water) = chunk.water {
        renderer.set_voxel_mesh_light(water, texture);
    }

    for (&index, instance) in chunk.instances.iter() {
        if let Some(mesh) = instance.mesh {
            let base = chunk.stage1_lights[index as usize] as i32;
            renderer.set_instanced_mesh_light(mesh, (base + 1).min(SUNLIGHT) as u8);
        }
    }

    for delta in &scratch.deltas {
        chunk.stage1_lights[delta.location as usize] = delta.value;
    }
}
