/// Block and material identity types.
/// Blocks are one byte so voxel arrays can be copied and scanned wholesale.

/// Block identity. Variant 0 is Air; variant 1 is the placeholder returned
/// for reads into unloaded chunks and never appears inside a loaded chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Block {
    Air = 0,
    Unknown = 1,
    Bedrock = 2,
    Bush = 3,
    Dirt = 4,
    Fungi = 5,
    Grass = 6,
    Rock = 7,
    Sand = 8,
    Snow = 9,
    Stone = 10,
    Trunk = 11,
    Water = 12,
}

pub const KNOWN_BLOCK_COUNT: usize = 13;
pub const MAX_BLOCKS: usize = 256;
pub const MAX_MATERIALS: usize = 256;

impl Block {
    /// Convert from a raw byte. Out-of-range values map to Unknown; the
    /// registry bounds-checks real lookups in debug builds.
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Block::Air,
            2 => Block::Bedrock,
            3 => Block::Bush,
            4 => Block::Dirt,
            5 => Block::Fungi,
            6 => Block::Grass,
            7 => Block::Rock,
            8 => Block::Sand,
            9 => Block::Snow,
            10 => Block::Stone,
            11 => Block::Trunk,
            12 => Block::Water,
            _ => Block::Unknown,
        }
    }

    #[inline]
    pub const fn is_air(self) -> bool {
        matches!(self, Block::Air)
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::Air
    }
}

/// A registered material index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Material(pub u8);

/// A possibly-absent material. User material `m` is stored as `m + 1`;
/// zero means "no face".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MaybeMaterial(pub u8);

pub const NO_MATERIAL: MaybeMaterial = MaybeMaterial(0);

impl MaybeMaterial {
    #[inline]
    pub const fn some(material: Material) -> Self {
        MaybeMaterial(material.0 + 1)
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn unwrap(self) -> Material {
        debug_assert!(!self.is_none());
        Material(self.0.wrapping_sub(1))
    }
}

/// Static per-block properties. `mesh = true` marks a decoration block that
/// renders as an instanced mesh rather than voxel faces.
#[derive(Copy, Clone, Debug)]
pub struct BlockData {
    pub mesh: bool,
    pub opaque: bool,
    pub solid: bool,
    /// Emitted light level. Negative excludes light from the block entirely;
    /// opaque blocks register as -1.
    pub light: i8,
    /// Face materials in `+x, -x, +y, -y, +z, -z` order.
    pub faces: [MaybeMaterial; 6],
}

impl BlockData {
    pub const AIR: BlockData = BlockData {
        mesh: false,
        opaque: false,
        solid: false,
        light: 0,
        faces: [NO_MATERIAL; 6],
    };
}

impl Default for BlockData {
    fn default() -> Self {
        BlockData::AIR
    }
}

/// Static per-material properties.
#[derive(Copy, Clone, Debug)]
pub struct MaterialData {
    pub liquid: bool,
    pub alpha_test: bool,
    pub texture: u8,
    pub color: [f64; 4],
}

impl Default for MaterialData {
    fn default() -> Self {
        MaterialData {
            liquid: false,
            alpha_test: false,
            texture: 0,
            color: [0.0; 4],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_is_one_byte() {
        assert_eq!(std::mem::size_of::<Block>(), 1);
        assert_eq!(std::mem::size_of::<MaybeMaterial>(), 1);
    }

    #[test]
    fn test_block_round_trip() {
        for raw in 0..KNOWN_BLOCK_COUNT as u8 {
            if raw == Block::Unknown as u8 {
                continue;
            }
            assert_eq!(Block::from_u8(raw) as u8, raw);
        }
        assert_eq!(Block::from_u8(200), Block::Unknown);
    }

    #[test]
    fn test_maybe_material_encoding() {
        assert!(NO_MATERIAL.is_none());
        let wrapped = MaybeMaterial::some(Material(7));
        assert_eq!(wrapped.0, 8);
        assert_eq!(wrapped.unwrap(), Material(7));
    }
}
