/// Greedy meshing: padded-tile face sweep emitting packed quad streams.
pub mod mesher;
pub mod quad;

pub use mesher::{HeightmapEntry, HeightmapField, Mesher};
pub use quad::{unpack_quad, Quad, UnpackedQuad};

use crate::voxel::layout::CHUNK_WIDTH;
use crate::voxel::Point;

/// One copy rectangle used to assemble the mesher's padded inputs: the
/// neighbor at `delta` contributes `size` columns from `src` to `dst`.
#[derive(Copy, Clone)]
pub(crate) struct MesherOffset {
    pub delta: Point,
    pub dst: Point,
    pub src: Point,
    pub size: Point,
}

const W: i32 = CHUNK_WIDTH;
const L: i32 = CHUNK_WIDTH - 1;
const N: i32 = CHUNK_WIDTH + 1;

#[rustfmt::skip]
pub(crate) const MESHER_OFFSETS: [MesherOffset; 9] = [
    MesherOffset { delta: Point::new( 0,  0), dst: Point::new(1, 1), src: Point::new(0, 0), size: Point::new(W, W) },
    MesherOffset { delta: Point::new(-1,  0), dst: Point::new(0, 1), src: Point::new(L, 0), size: Point::new(1, W) },
    MesherOffset { delta: Point::new( 1,  0), dst: Point::new(N, 1), src: Point::new(0, 0), size: Point::new(1, W) },
    MesherOffset { delta: Point::new( 0, -1), dst: Point::new(1, 0), src: Point::new(0, L), size: Point::new(W, 1) },
    MesherOffset { delta: Point::new( 0,  1), dst: Point::new(1, N), src: Point::new(0, 0), size: Point::new(W, 1) },
    MesherOffset { delta: Point::new(-1, -1), dst: Point::new(0, 0), src: Point::new(L, L), size: Point::new(1, 1) },
    MesherOffset { delta: Point::new(-1,  1), dst: Point::new(0, N), src: Point::new(L, 0), size: Point::new(1, 1) },
    MesherOffset { delta: Point::new( 1, -1), dst: Point::new(N, 0), src: Point::new(0, L), size: Point::new(1, 1) },
    MesherOffset { delta: Point::new( 1,  1), dst: Point::new(N, N), src: Point::new(0, 0), size: Point::new(1, 1) },
];
