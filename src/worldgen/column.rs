/// Column script serialization.
///
/// Each column is a sequence of `(block, end_y)` run pairs with strictly
/// increasing `end_y` terminating at the build height, then a decoration
/// count byte, then `(block, y)` override pairs. Columns for a whole chunk
/// are packed back to back in one buffer.
use crate::voxel::block::Block;
use crate::voxel::layout::{BUILD_HEIGHT, WORLD_HEIGHT};

#[derive(Copy, Clone)]
struct Decoration {
    block: Block,
    decorated: bool,
    height: u8,
}

const EMPTY_DECORATION: Decoration = Decoration {
    block: Block::Air,
    decorated: false,
    height: 0,
};

/// Accumulates one chunk's worth of column scripts. `push` and `decorate`
/// describe the current column; `commit` serializes it and starts the next.
pub struct ColumnScript {
    height: i32,
    decorated: usize,
    serialized: Vec<u8>,
    // Doubles as a per-height slot table and, in the `height` field of the
    // first `decorated` entries, an insertion-ordered list of heights.
    decorations: Box<[Decoration; WORLD_HEIGHT as usize]>,
}

impl ColumnScript {
    pub fn new() -> Self {
        ColumnScript {
            height: 0,
            decorated: 0,
            serialized: Vec::new(),
            decorations: Box::new([EMPTY_DECORATION; WORLD_HEIGHT as usize]),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.serialized
    }

    /// Extend the current column with `block` up to (excluding) `limit`.
    pub fn push(&mut self, block: Block, limit: i32) {
        let limit = limit.min(WORLD_HEIGHT - 1);
        if limit <= self.height {
            return;
        }
        self.serialized.push(block as u8);
        self.serialized.push(limit as u8);
        self.height = limit;
    }

    /// Overwrite the single voxel at `height`. The last call per height
    /// wins; insertion order is preserved in the serialized stream.
    pub fn decorate(&mut self, block: Block, height: i32) {
        if !(0..WORLD_HEIGHT - 1).contains(&height) {
            return;
        }

        let slot = &mut self.decorations[height as usize];
        slot.block = block;
        if slot.decorated {
            return;
        }

        slot.decorated = true;
        self.decorations[self.decorated].height = height as u8;
        self.decorated += 1;
    }

    /// Seal the current column: pad it to the build height with Air, then
    /// append its decorations.
    pub fn commit(&mut self) {
        self.push(Block::Air, WORLD_HEIGHT);
        self.serialized.push(self.decorated as u8);
        for i in 0..self.decorated {
            let height = self.decorations[i].height;
            let block = self.decorations[height as usize].block;
            self.serialized.push(block as u8);
            self.serialized.push(height);
            clear_decoration(&mut self.decorations[height as usize]);
        }
        self.height = 0;
        self.decorated = 0;
    }

    /// Drop all buffered columns and any uncommitted column state.
    pub fn reset(&mut self) {
        for i in 0..self.decorated {
            let height = self.decorations[i].height;
            clear_decoration(&mut self.decorations[height as usize]);
        }
        self.height = 0;
        self.decorated = 0;
        self.serialized.clear();
    }
}

impl Default for ColumnScript {
    fn default() -> Self {
        ColumnScript::new()
    }
}

/// The slot's `height` field doubles as the insertion-order list, so only
/// the block and flag are reset here.
fn clear_decoration(slot: &mut Decoration) {
    slot.block = Block::Air;
    slot.decorated = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_column_runs() {
        let mut script = ColumnScript::new();
        script.push(Block::Stone, 60);
        script.push(Block::Grass, 64);
        script.commit();

        assert_eq!(
            script.as_bytes(),
            &[
                Block::Stone as u8,
                60,
                Block::Grass as u8,
                64,
                Block::Air as u8,
                BUILD_HEIGHT as u8,
                0,
            ]
        );
    }

    #[test]
    fn test_push_clamps_and_ignores_regressions() {
        let mut script = ColumnScript::new();
        script.push(Block::Stone, 60);
        script.push(Block::Dirt, 40); // no-op: below current height
        script.push(Block::Water, WORLD_HEIGHT + 5); // clamped to build height
        script.commit();

        assert_eq!(
            script.as_bytes(),
            &[
                Block::Stone as u8,
                60,
                Block::Water as u8,
                BUILD_HEIGHT as u8,
                0,
            ]
        );
    }

    #[test]
    fn test_decorations_last_write_wins() {
        let mut script = ColumnScript::new();
        script.push(Block::Stone, 10);
        script.decorate(Block::Bush, 10);
        script.decorate(Block::Rock, 10);
        script.decorate(Block::Fungi, 5);
        script.commit();

        let bytes = script.as_bytes();
        // Runs: (Stone, 10), (Air, 255); then two decorations in insertion
        // order, the height-10 slot overwritten by Rock.
        assert_eq!(bytes[4], 2);
        assert_eq!(&bytes[5..], &[Block::Rock as u8, 10, Block::Fungi as u8, 5]);
    }

    #[test]
    fn test_decoration_slot_aliasing_with_order_list() {
        // The slot at height 2 is also the third order-list entry; clearing
        // it while serializing must not lose the pending height.
        let mut script = ColumnScript::new();
        script.push(Block::Stone, 20);
        script.decorate(Block::Bush, 2);
        script.decorate(Block::Rock, 9);
        script.decorate(Block::Fungi, 5);
        script.commit();

        let bytes = script.as_bytes();
        assert_eq!(bytes[4], 3);
        assert_eq!(
            &bytes[5..],
            &[
                Block::Bush as u8,
                2,
                Block::Rock as u8,
                9,
                Block::Fungi as u8,
                5,
            ]
        );
    }

    #[test]
    fn test_decorate_out_of_range_ignored() {
        let mut script = ColumnScript::new();
        script.push(Block::Stone, 10);
        script.decorate(Block::Bush, -1);
        script.decorate(Block::Bush, WORLD_HEIGHT - 1);
        script.commit();
        assert_eq!(script.as_bytes()[4], 0);
    }

    #[test]
    fn test_commit_resets_column_state() {
        let mut script = ColumnScript::new();
        script.push(Block::Stone, 10);
        script.decorate(Block::Bush, 10);
        script.commit();
        script.push(Block::Sand, 8);
        script.commit();

        let bytes = script.as_bytes();
        let first_len = 4 + 1 + 2;
        assert_eq!(bytes[first_len..][..2], [Block::Sand as u8, 8]);
        // The second column has no decorations.
        assert_eq!(*bytes.last().unwrap(), 0);
    }
}
