use super::block::{
    Block, BlockData, Material, MaterialData, MaybeMaterial, MAX_BLOCKS, MAX_MATERIALS,
};

/// Append-only tables of block and material properties.
///
/// Registration is indexed by the caller: ids must arrive in order, before
/// the first frame. Duplicate or out-of-order registration is a precondition
/// violation, not a recoverable error.
pub struct Registry {
    num_blocks: usize,
    num_materials: usize,
    blocks: Box<[BlockData; MAX_BLOCKS]>,
    materials: Box<[MaterialData; MAX_MATERIALS]>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            num_blocks: 0,
            num_materials: 0,
            blocks: Box::new([BlockData::AIR; MAX_BLOCKS]),
            materials: Box::new([MaterialData::default(); MAX_MATERIALS]),
        }
    }

    pub fn add_block(&mut self, block: Block, data: BlockData) {
        assert!(
            block as usize == self.num_blocks,
            "blocks must be registered in id order: expected {}, got {}",
            self.num_blocks,
            block as usize
        );
        assert!((block as usize) < MAX_BLOCKS);
        self.blocks[self.num_blocks] = data;
        self.num_blocks += 1;
    }

    pub fn add_material(&mut self, material: Material, data: MaterialData) {
        assert!(
            material.0 as usize == self.num_materials,
            "materials must be registered in id order: expected {}, got {}",
            self.num_materials,
            material.0 as usize
        );
        assert!((material.0 as usize) < MAX_MATERIALS);
        self.materials[self.num_materials] = data;
        self.num_materials += 1;
    }

    #[inline]
    pub fn block(&self, block: Block) -> &BlockData {
        debug_assert!((block as usize) < self.num_blocks);
        &self.blocks[block as usize]
    }

    #[inline]
    pub fn material(&self, material: Material) -> &MaterialData {
        debug_assert!((material.0 as usize) < self.num_materials);
        &self.materials[material.0 as usize]
    }

    #[inline]
    pub fn face_material(&self, block: Block, face: usize) -> MaybeMaterial {
        debug_assert!(face < 6);
        self.block(block).faces[face]
    }

    #[inline]
    pub fn opaque(&self, block: Block) -> bool {
        self.block(block).opaque
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn num_materials(&self) -> usize {
        self.num_materials
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}
