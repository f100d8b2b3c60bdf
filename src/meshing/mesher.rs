/// Greedy mesher over a padded voxel tile.
///
/// The input buffers (voxels, heightmap, equilevels) carry a one-voxel
/// border copied from neighboring chunks; the y border is synthetic
/// (Bedrock below, Air above). They are process-wide scratch owned by the
/// world and reused for every chunk: callers must consume the output quad
/// streams before the next `mesh_chunk` call.
use super::quad::{add_quad, Quad, WAVE_VALUES};
use crate::count_call;
use crate::perf::FUNCTION_COUNTERS;
use crate::voxel::block::{Block, Material, MaterialData};
use crate::voxel::layout::{pad_index, PAD_AREA, PAD_HEIGHT, PAD_SHAPE, PAD_STRIDE, PAD_VOLUME};
use crate::voxel::registry::Registry;
use crate::voxel::Point;

/// One column sample of a frontier (LOD) heightmap: the surface block and
/// the height of the column below it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeightmapField {
    pub block: Block,
    pub height: u8,
}

/// A frontier heightmap entry: the solid surface and the water surface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeightmapEntry {
    pub fields: [HeightmapField; 2],
}

impl HeightmapEntry {
    /// Decode one packed worldgen LOD sample: bytes are (solid block,
    /// solid height, water block, water height), low to high.
    pub fn from_packed(packed: u32) -> Self {
        HeightmapEntry {
            fields: [
                HeightmapField {
                    block: Block::from_u8(packed as u8),
                    height: (packed >> 8) as u8,
                },
                HeightmapField {
                    block: Block::from_u8((packed >> 16) as u8),
                    height: (packed >> 24) as u8,
                },
            ],
        }
    }
}

const AIR_FIELD: HeightmapField = HeightmapField {
    block: Block::Air,
    height: 0,
};

pub struct Mesher {
    // mesh_chunk inputs: filled by the caller before the call.
    pub equilevels: [u8; PAD_HEIGHT as usize],
    pub heightmap: [u8; PAD_AREA],
    pub voxels: Box<[Block; PAD_VOLUME]>,

    // mesh_chunk outputs: consumed by the caller after the call.
    pub solid_geo: Vec<Quad>,
    pub water_geo: Vec<Quad>,

    mask_data: Vec<i32>,
    mask_union: Vec<i32>,
    height_mask: Vec<HeightmapField>,
}

impl Mesher {
    pub fn new() -> Self {
        let mut mesher = Mesher {
            equilevels: [1; PAD_HEIGHT as usize],
            heightmap: [0; PAD_AREA],
            voxels: vec![Block::Air; PAD_VOLUME].try_into().unwrap(),
            solid_geo: Vec::new(),
            water_geo: Vec::new(),
            mask_data: Vec::new(),
            mask_union: Vec::new(),
            height_mask: Vec::new(),
        };
        // The y border persists across calls: a solid floor below the world
        // and open air above it.
        let top = PAD_HEIGHT - 1;
        for x in 0..PAD_SHAPE[0] {
            for z in 0..PAD_SHAPE[2] {
                mesher.voxels[pad_index(x, 0, z)] = Block::Bedrock;
                mesher.voxels[pad_index(x, top, z)] = Block::Air;
            }
        }
        mesher
    }

    /// Mesh the padded tile into the solid and water quad streams.
    pub fn mesh_chunk(&mut self, registry: &Registry) {
        count_call!(FUNCTION_COUNTERS.mesh_chunk_calls);
        self.solid_geo.clear();
        self.water_geo.clear();

        let mut max_height = 0;
        for &entry in self.heightmap.iter() {
            max_height = max_height.max(entry as i32 + 1);
        }

        // Collapse homogeneous vertical runs: a level pair is skipped when
        // both planes are equilevel and either equal or mutually opaque.
        let limit = self.equilevels.len() - 1;
        let mut i = 0;
        while i < limit {
            if !self.skip_level(registry, i) {
                let mut j = i + 1;
                while j < limit && !self.skip_level(registry, j) {
                    j += 1;
                }
                let y_min = i as i32;
                let y_max = (j as i32).min(max_height) + 1;
                if y_min >= y_max {
                    break;
                }
                self.compute_chunk_geometry(registry, y_min, y_max);
                i = j;
            }
            i += 1;
        }
    }

    fn skip_level(&self, registry: &Registry, i: usize) -> bool {
        let el0 = self.equilevels[i];
        let el1 = self.equilevels[i + 1];
        if el0 + el1 != 2 {
            return false;
        }
        // Equilevel planes are uniform, so the border column stands in for
        // the whole plane.
        let block0 = self.voxels[i];
        let block1 = self.voxels[i + 1];
        if block0 == block1 {
            return true;
        }
        registry.block(block0).opaque && registry.block(block1).opaque
    }

    fn compute_chunk_geometry(&mut self, registry: &Registry, y_min: i32, y_max: i32) {
        let Mesher {
            voxels,
            solid_geo,
            water_geo,
            mask_data,
            mask_union,
            ..
        } = self;

        let stride = PAD_STRIDE;
        let shape = [PAD_SHAPE[0], y_max - y_min, PAD_SHAPE[2]];

        // d is the dimension the quad faces; u and v span its width and
        // height. (d, u, v) would normally be consecutive dimensions mod 3,
        // which is how the shader reads quads, but the d = 0 case swaps to
        // (u, v) = (2, 1) so the long, heightmap-limited y axis is the
        // contiguous inner loop. The *_fixed values translate back to
        // shader-standard coordinates at emission. y runs last so whole
        // planes clipped by max_height drop out before the sweep.
        for d in [0usize, 2, 1] {
            let face = 2 * d;
            let v = if d == 1 { 0 } else { 1 };
            let u = 3 - d - v;
            let (ld, lu, lv) = (shape[d] - 1, shape[u] - 2, shape[v] - 2);
            let (sd, su, sv) = (stride[d], stride[u], stride[v]);
            let base = su + sv + y_min * stride[1];

            let su_fixed = if d > 0 { su } else { sv };
            let sv_fixed = if d > 0 { sv } else { su };

            let area = (lu * lv) as usize;
            if mask_data.len() < area {
                mask_data.resize(area, 0);
            }
            if mask_union.len() < lu as usize {
                mask_union.resize(lu as usize, 0);
            }

            for id in 0..ld {
                let mut n = 0usize;
                let mut complete_union = 0;
                for iu in 0..lu {
                    mask_union[iu as usize] = 0;
                    let mut index = base + id * sd + iu * su;
                    for _iv in 0..lv {
                        // mask[n] is the face between (id, iu, iv) and
                        // (id + 1, iu, iv):
                        //   bits 0:8  packed AO (4 x 2 bits)
                        //   bit  8    dir (0 -> -1, 1 -> +1)
                        //   bits 9:24 material index
                        // Adjacent voxels that differ in any component stay
                        // separate quads in the greedy merge.
                        let block0 = voxels[index as usize];
                        let block1 = voxels[(index + sd) as usize];
                        if block0 != block1 {
                            let dir = face_dir(registry, block0, block1, face);
                            if dir != 0 {
                                let material = if dir > 0 {
                                    registry.block(block0).faces[face]
                                } else {
                                    registry.block(block1).faces[face + 1]
                                };
                                let ao = if dir > 0 {
                                    pack_ao_mask(voxels.as_slice(), registry, index + sd, su_fixed, sv_fixed)
                                } else {
                                    pack_ao_mask(voxels.as_slice(), registry, index, su_fixed, sv_fixed)
                                };
                                let mask = ((material.0 as i32) << 9)
                                    | if dir > 0 { 1 << 8 } else { 0 }
                                    | ao;

                                mask_data[n] = mask;
                                mask_union[iu as usize] |= mask;
                                complete_union |= mask;
                            }
                        }
                        n += 1;
                        index += sv;
                    }
                }
                if complete_union == 0 {
                    continue;
                }

                // The x and z borders belong to neighboring chunks. To avoid
                // meshing a face twice, only the face pointing into this
                // chunk is kept at each border. Meshing the outward face
                // would avoid z-fighting against frontier meshes, but the
                // light textures have no border cell yet, so the inward
                // choice stands.
                if d != 1 {
                    if id == 0 {
                        for slot in mask_data[..area].iter_mut() {
                            if *slot & 0x100 == 0 {
                                *slot = 0;
                            }
                        }
                    } else if id == ld - 1 {
                        for slot in mask_data[..area].iter_mut() {
                            if *slot & 0x100 != 0 {
                                *slot = 0;
                            }
                        }
                    }
                }

                let mut n = 0usize;
                for iu in 0..lu {
                    if mask_union[iu as usize] == 0 {
                        n += lv as usize;
                        continue;
                    }

                    let mut iv = 0;
                    while iv < lv {
                        let mask = mask_data[n];
                        if mask == 0 {
                            iv += 1;
                            n += 1;
                            continue;
                        }

                        let mut h = 1;
                        while h < lv - iv {
                            if mask != mask_data[n + h as usize] {
                                break;
                            }
                            h += 1;
                        }

                        let mut w = 1;
                        let mut nw = n + lv as usize;
                        'grow: while w < lu - iu {
                            for x in 0..h {
                                if mask != mask_data[nw + x as usize] {
                                    break 'grow;
                                }
                            }
                            w += 1;
                            nw += lv as usize;
                        }

                        let mut pos = [0i32; 3];
                        pos[d] = id;
                        pos[u] = iu;
                        pos[v] = iv;
                        pos[1] += y_min;

                        let ao = mask & 0xff;
                        let dir = if mask & 0x100 != 0 { 1 } else { -1 };
                        let material_id = Material(((mask >> 9) as u8).wrapping_sub(1));
                        let material = registry.material(material_id);
                        let geo = if material.color[3] < 1.0 {
                            &mut *water_geo
                        } else {
                            &mut *solid_geo
                        };

                        let w_fixed = if d > 0 { w } else { h };
                        let h_fixed = if d > 0 { h } else { w };

                        if material.liquid {
                            if d == 1 {
                                if dir > 0 {
                                    let wave = WAVE_VALUES[d];
                                    add_quad(geo, material, dir, ao, wave, d, w, h, pos);
                                    patch_liquid_surface_quads(
                                        voxels.as_slice(), registry, geo, ao, w, h, pos,
                                    );
                                } else {
                                    add_quad(geo, material, dir, ao, 0, d, w, h, pos);
                                }
                            } else {
                                let wave = WAVE_VALUES[d];
                                if h == lv - iv {
                                    add_quad(geo, material, dir, ao, wave, d, w_fixed, h_fixed, pos);
                                } else {
                                    split_liquid_side_quads(
                                        voxels.as_slice(), registry, geo, material, dir, ao, wave, d, w, h, pos,
                                    );
                                }
                            }
                        } else {
                            add_quad(geo, material, dir, ao, 0, d, w_fixed, h_fixed, pos);
                            if material.alpha_test {
                                // Alpha-tested faces draw from both sides to
                                // survive back-face culling.
                                add_quad(geo, material, -dir, ao, 0, d, w_fixed, h_fixed, pos);
                            }
                        }

                        let mut nw = n;
                        for _ in 0..w {
                            for hx in 0..h {
                                mask_data[nw + hx as usize] = 0;
                            }
                            nw += lv as usize;
                        }

                        iv += h;
                        n += h as usize;
                    }
                }
            }
        }
    }

    /// Mesh a frontier (LOD) tile from heightmap samples: four quadrants,
    /// each split into solid and water streams. The low byte of the last
    /// quad word carries the quadrant mask id.
    pub fn mesh_frontier(
        &mut self,
        registry: &Registry,
        entries: &[HeightmapEntry],
        n: usize,
        pos: Point,
        scale: i32,
        index: i32,
    ) {
        count_call!(FUNCTION_COUNTERS.mesh_frontier_calls);
        self.solid_geo.clear();
        self.water_geo.clear();

        debug_assert!(n % 2 == 0);
        let half = n / 2;

        for k in 0..4usize {
            let x_offset = if k & 1 != 0 { half } else { 0 };
            let z_offset = if k & 2 != 0 { half } else { 0 };
            let sub = Point::new(
                pos.x + x_offset as i32 * scale,
                pos.y + z_offset as i32 * scale,
            );
            let mask = 4 * index + k as i32;
            let origin = x_offset + n * z_offset;
            self.compute_frontier_geometry(registry, entries, origin, n, half, 0, sub, scale, mask, true);
            self.compute_frontier_geometry(registry, entries, origin, n, half, 1, sub, scale, mask, false);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_frontier_geometry(
        &mut self,
        registry: &Registry,
        entries: &[HeightmapEntry],
        origin: usize,
        row_stride: usize,
        n: usize,
        field: usize,
        pos: Point,
        scale: i32,
        mask: i32,
        solid: bool,
    ) {
        let Mesher {
            height_mask,
            solid_geo,
            water_geo,
            ..
        } = self;
        let quads = if solid { solid_geo } else { water_geo };

        let mask_byte = mask as u32 & 0xff;
        debug_assert_eq!(mask_byte as i32, mask);

        let size = n + 2;
        let area = size * size;
        if height_mask.len() < area {
            height_mask.resize(area, AIR_FIELD);
        }

        for z in 0..n {
            let source = origin + z * row_stride;
            let target = (z + 1) * size + 1;
            for x in 0..n {
                height_mask[target + x] = entries[source + x].fields[field];
            }
        }

        // 1-D greedy strips along the four horizontal faces. Border cells
        // stay at height 0, so the tile walls off against its neighbors.
        let start = if solid { 0 } else { 4 };
        for k in start..4usize {
            let d = if k & 2 != 0 { 2 } else { 0 };
            let dir = if k & 1 != 0 { -1 } else { 1 };

            let si = if d == 0 { 1 } else { size };
            let sj = size + 1 - si;

            let ao = if d == 0 { 0x82 } else { 0x0a };
            let di = if dir > 0 { si as isize } else { -(si as isize) };

            for i in 0..n {
                let ii = if dir > 0 { 1 } else { 0 };
                let mut offset = (i + 1) * si + sj;
                let mut j = 0;
                while j < n {
                    'column: {
                        let HeightmapField { block, height } = height_mask[offset];
                        if block == Block::Air {
                            break 'column;
                        }

                        // The top material is used for the sides as well:
                        // per-face materials muddle grass at a distance.
                        let id = registry.block(block).faces[2];
                        if id.is_none() {
                            break 'column;
                        }

                        let neighbor_height =
                            height_mask[(offset as isize + di) as usize].height;
                        if neighbor_height >= height {
                            break 'column;
                        }

                        let mut w = 1;
                        let limit = n - j;
                        let mut probe = offset + sj;
                        while w < limit {
                            let sample = height_mask[probe];
                            let matches = sample.block == block
                                && sample.height == height
                                && height_mask[(probe as isize + di) as usize].height
                                    == neighbor_height;
                            if !matches {
                                break;
                            }
                            w += 1;
                            probe += sj;
                        }

                        let (px, pz) = if d == 0 {
                            (((i + ii) * scale as usize) as i32, (j * scale as usize) as i32)
                        } else {
                            ((j * scale as usize) as i32, ((i + ii) * scale as usize) as i32)
                        };
                        let span = height as i32 - neighbor_height as i32;
                        let (wi, hi) = if d == 0 {
                            (span, w as i32 * scale)
                        } else {
                            (w as i32 * scale, span)
                        };

                        let tmp = [pos.x + px, neighbor_height as i32, pos.y + pz];
                        let material = registry.material(id.unwrap());
                        let wave = if material.liquid { 0b1111 } else { 0 };
                        add_quad(quads, material, dir, ao, wave, d, wi, hi, tmp);
                        quads.last_mut().unwrap()[3] |= mask_byte;

                        let extra = w - 1;
                        offset += extra * sj;
                        j += extra;
                    }
                    j += 1;
                    offset += sj;
                }
            }
        }

        // 2-D greedy merge of the top faces. This pass is destructive on
        // the height mask, so it runs after the side strips.
        for z in 0..n {
            let mut cursor = (z + 1) * size + 1;
            let mut x = 0;
            while x < n {
                'cell: {
                    let prev = height_mask[cursor];
                    if prev.block == Block::Air {
                        break 'cell;
                    }
                    let id = registry.block(prev.block).faces[2];
                    if id.is_none() {
                        break 'cell;
                    }

                    let matches = |sample: HeightmapField| {
                        sample.block == prev.block && sample.height == prev.height
                    };

                    let (lx, lz) = (n - x, n - z);
                    let mut w = 1;
                    let mut probe = cursor + size;
                    while w < lz && matches(height_mask[probe]) {
                        w += 1;
                        probe += size;
                    }
                    let mut h = 1;
                    'grow: while h < lx {
                        let mut probe = cursor + h;
                        for _ in 0..w {
                            if !matches(height_mask[probe]) {
                                break 'grow;
                            }
                            probe += size;
                        }
                        h += 1;
                    }

                    let tmp = [
                        pos.x + x as i32 * scale,
                        prev.height as i32,
                        pos.y + z as i32 * scale,
                    ];
                    let material = registry.material(id.unwrap());
                    let wave = if material.liquid { 0b1111 } else { 0 };
                    add_quad(
                        quads,
                        material,
                        1,
                        0,
                        wave,
                        1,
                        scale * w as i32,
                        scale * h as i32,
                        tmp,
                    );
                    quads.last_mut().unwrap()[3] |= mask_byte;

                    for wi in 0..w {
                        let target = cursor + wi * size;
                        for hi in 0..h {
                            height_mask[target + hi].block = Block::Air;
                        }
                    }

                    let extra = h - 1;
                    cursor += extra;
                    x += extra;
                }
                cursor += 1;
                x += 1;
            }
        }
    }
}

impl Default for Mesher {
    fn default() -> Self {
        Mesher::new()
    }
}

/// Which way the face between two adjacent voxels points: +1 toward block0,
/// -1 toward block1, 0 for no face.
fn face_dir(registry: &Registry, block0: Block, block1: Block, face: usize) -> i32 {
    let data0 = registry.block(block0);
    let data1 = registry.block(block1);
    if data0.opaque && data1.opaque {
        return 0;
    }
    if data0.opaque {
        return 1;
    }
    if data1.opaque {
        return -1;
    }

    let material0 = data0.faces[face];
    let material1 = data1.faces[face + 1];
    if material0 == material1 {
        return 0;
    }
    if material0.is_none() {
        return -1;
    }
    if material1.is_none() {
        return 1;
    }
    0
}

/// Pack ambient occlusion for the face at `ipos` over its 8 diagonal
/// neighbors, 2 bits per corner, in the vertex order used by `add_quad`.
fn pack_ao_mask(voxels: &[Block], registry: &Registry, ipos: i32, dj: i32, dk: i32) -> i32 {
    let at = |index: i32| voxels[index as usize];
    let opaque = |block: Block| registry.block(block).opaque;

    let mut a00 = 0;
    let mut a01 = 0;
    let mut a10 = 0;
    let mut a11 = 0;

    let b0 = at(ipos + dj);
    let b1 = at(ipos - dj);
    let b2 = at(ipos + dk);
    let b3 = at(ipos - dk);

    // Fast path for completely unoccluded faces: Air is block zero, so a
    // zero byte sum means all four sides are clear.
    let bsum = b0 as u32 + b1 as u32 + b2 as u32 + b3 as u32;
    if bsum == 0 {
        let d0 = at(ipos - dj - dk);
        let d1 = at(ipos - dj + dk);
        let d2 = at(ipos + dj - dk);
        let d3 = at(ipos + dj + dk);

        let dsum = d0 as u32 + d1 as u32 + d2 as u32 + d3 as u32;
        if dsum == 0 {
            return 0;
        }

        if opaque(d0) {
            a00 += 1;
        }
        if opaque(d1) {
            a01 += 1;
        }
        if opaque(d2) {
            a10 += 1;
        }
        if opaque(d3) {
            a11 += 1;
        }
        return (a01 << 6) | (a11 << 4) | (a10 << 2) | a00;
    }

    if opaque(b0) {
        a10 += 1;
        a11 += 1;
    }
    if opaque(b1) {
        a00 += 1;
        a01 += 1;
    }
    if opaque(b2) {
        a01 += 1;
        a11 += 1;
    }
    if opaque(b3) {
        a00 += 1;
        a10 += 1;
    }

    if a00 == 0 && opaque(at(ipos - dj - dk)) {
        a00 += 1;
    }
    if a01 == 0 && opaque(at(ipos - dj + dk)) {
        a01 += 1;
    }
    if a10 == 0 && opaque(at(ipos + dj - dk)) {
        a10 += 1;
    }
    if a11 == 0 && opaque(at(ipos + dj + dk)) {
        a11 += 1;
    }

    (a01 << 6) | (a11 << 4) | (a10 << 2) | a00
}

/// Seal the edges of a liquid's top surface. The wave attribute displaces
/// the surface downward, so wherever a solid ends right above the water a
/// small vertical patch hides the resulting gap.
///
/// The AO here is broadcast from the top quad rather than recomputed per
/// face; the error is invisible at the water line.
fn patch_liquid_surface_quads(
    voxels: &[Block],
    registry: &Registry,
    quads: &mut Vec<Quad>,
    ao: i32,
    w: i32,
    h: i32,
    pos: [i32; 3],
) {
    let [base_x, base_y, base_z] = pos;
    let water = voxels[pad_index(base_x + 1, base_y, base_z + 1)];
    let id = registry.block(water).faces[0];
    if id.is_none() {
        return;
    }

    let patch = |x: i32, z: i32, face: usize| -> bool {
        let ax = base_x + x + 1;
        let az = base_z + z + 1;

        let below = registry.block(voxels[pad_index(ax, base_y, az)]);
        if below.opaque || below.faces[face].is_none() {
            return false;
        }

        let above = registry.block(voxels[pad_index(ax, base_y + 1, az)]);
        above.opaque || !above.faces[3].is_none()
    };

    let material = registry.material(id.unwrap());

    for face in 4..6usize {
        let dz = if face == 4 { -1 } else { w };
        let wave = WAVE_VALUES[1] - WAVE_VALUES[2];
        let mut x = 0;
        while x < h {
            if !patch(x, dz, face) {
                x += 1;
                continue;
            }
            let start = x;
            x += 1;
            while x < h && patch(x, dz, face) {
                x += 1;
            }
            let mut tmp = pos;
            tmp[0] = base_x + start;
            tmp[2] = base_z + dz.max(0);
            add_quad(quads, material, 1, ao, wave, 2, x - start, 0, tmp);
        }
    }

    for face in 0..2usize {
        let dx = if face == 0 { -1 } else { h };
        let wave = WAVE_VALUES[1] - WAVE_VALUES[0];
        let mut z = 0;
        while z < w {
            if !patch(dx, z, face) {
                z += 1;
                continue;
            }
            let start = z;
            z += 1;
            while z < w && patch(dx, z, face) {
                z += 1;
            }
            let mut tmp = pos;
            tmp[0] = base_x + dx.max(0);
            tmp[2] = base_z + start;
            add_quad(quads, material, 1, ao, wave, 0, 0, z - start, tmp);
        }
    }
}

/// A vertical liquid face gets the wave effect only where the block above
/// the surface blocks the displaced top. That test can flip along the
/// quad's width, so the quad splits at every change.
#[allow(clippy::too_many_arguments)]
fn split_liquid_side_quads(
    voxels: &[Block],
    registry: &Registry,
    quads: &mut Vec<Quad>,
    material: &MaterialData,
    dir: i32,
    ao: i32,
    wave: u32,
    d: usize,
    w: i32,
    h: i32,
    pos: [i32; 3],
) {
    let [base_x, base_y, base_z] = pos;

    let ax = base_x + if d == 0 && dir > 0 { 0 } else { 1 };
    let az = base_z + if d == 2 && dir > 0 { 0 } else { 1 };
    let ay = base_y + h + 1;

    let test = |i: i32| -> bool {
        let above = if d == 0 {
            voxels[pad_index(ax, ay, az + i)]
        } else {
            voxels[pad_index(ax + i, ay, az)]
        };
        let data = registry.block(above);
        data.opaque || data.faces[3].is_none()
    };

    let mut tmp = pos;
    let mut last = test(0);
    let mut i = 0;
    while i < w {
        let mut j = i + 1;
        while j < w && test(j) == last {
            j += 1;
        }
        let w_fixed = if d > 0 { j - i } else { h };
        let h_fixed = if d > 0 { h } else { j - i };
        add_quad(
            quads,
            material,
            dir,
            ao,
            if last { wave } else { 0 },
            d,
            w_fixed,
            h_fixed,
            tmp,
        );
        tmp[2 - d] += j - i;
        last = !last;
        i = j;
    }
}
