// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use crate::{
    block::Block8x8,
    error::{Error, Result},
    util::tracing_wrappers::*,
};

/// A row-major 2D array of coefficient blocks.
pub struct BlockGrid {
    size: (usize, usize),
    data: Vec<Block8x8>,
}

impl Debug for BlockGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockGrid {}x{}", self.size.0, self.size.1)
    }
}

impl BlockGrid {
    /// Allocates a zeroed grid of `size.0` x `size.1` blocks.
    pub fn new(size: (usize, usize)) -> Result<BlockGrid> {
        let (xsize, ysize) = size;
        let total_size = xsize
            .checked_mul(ysize)
            .ok_or(Error::ImageSizeTooLarge(xsize, ysize))?;
        if xsize == 0 || ysize == 0 {
            return Err(Error::InvalidImageSize(xsize, ysize));
        }
        debug!(xsize, ysize, "allocating block grid");
        let mut data = vec![];
        data.try_reserve_exact(total_size)?;
        data.resize(total_size, Block8x8::default());
        Ok(BlockGrid { size, data })
    }

    /// Bytes of storage needed for a grid of `size` blocks.
    pub fn bytes_for(size: (usize, usize)) -> u64 {
        (size.0 as u64)
            .saturating_mul(size.1 as u64)
            .saturating_mul(std::mem::size_of::<Block8x8>() as u64)
    }

    /// (width, height) in blocks.
    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    pub fn row(&self, row: usize) -> &[Block8x8] {
        debug_assert!(row < self.size.1);
        let start = row * self.size.0;
        &self.data[start..start + self.size.0]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [Block8x8] {
        debug_assert!(row < self.size.1);
        let start = row * self.size.0;
        &mut self.data[start..start + self.size.0]
    }

    pub fn block(&self, x: usize, y: usize) -> &Block8x8 {
        &self.row(y)[x]
    }

    pub fn block_mut(&mut self, x: usize, y: usize) -> &mut Block8x8 {
        &mut self.row_mut(y)[x]
    }

    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(Block8x8::clear);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn huge_grid() {
        assert!(matches!(
            BlockGrid::new((usize::MAX, 2)),
            Err(Error::ImageSizeTooLarge(_, _))
        ));
        assert!(matches!(
            BlockGrid::new((0, 3)),
            Err(Error::InvalidImageSize(0, 3))
        ));
    }

    #[test]
    fn rows_are_disjoint() -> Result<()> {
        let mut grid = BlockGrid::new((3, 2))?;
        grid.block_mut(2, 1)[0] = 7;
        assert_eq!(grid.row(1)[2][0], 7);
        assert!(grid.row(0).iter().all(Block8x8::is_zero));
        grid.clear();
        assert!(grid.block(2, 1).is_zero());
        assert_eq!(BlockGrid::bytes_for((3, 2)), 6 * 128);
        Ok(())
    }
}
