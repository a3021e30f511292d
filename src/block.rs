// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;
use std::ops::{Index, IndexMut};

pub const BLOCK_DIM: usize = 8;
pub const BLOCK_SIZE: usize = BLOCK_DIM * BLOCK_DIM;

/// Maps zig-zag position to natural (row-major) position.
///
/// Has 16 extra entries pointing at the last coefficient, so that a corrupt
/// run length that skips past position 63 cannot write outside the block.
pub const ZIGZAG_TO_NATURAL: [u8; BLOCK_SIZE + 16] = [
    0, 1, 8, 16, 9, 2, 3, 10, //
    17, 24, 32, 25, 18, 11, 4, 5, //
    12, 19, 26, 33, 40, 48, 41, 34, //
    27, 20, 13, 6, 7, 14, 21, 28, //
    35, 42, 49, 56, 57, 50, 43, 36, //
    29, 22, 15, 23, 30, 37, 44, 51, //
    58, 59, 52, 45, 38, 31, 39, 46, //
    53, 60, 61, 54, 47, 55, 62, 63, //
    63, 63, 63, 63, 63, 63, 63, 63, //
    63, 63, 63, 63, 63, 63, 63, 63, //
];

/// 64 quantized DCT coefficients in natural order.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Block8x8 {
    data: [i16; BLOCK_SIZE],
}

impl Default for Block8x8 {
    fn default() -> Self {
        Self {
            data: [0; BLOCK_SIZE],
        }
    }
}

impl Debug for Block8x8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Block8x8 [")?;
        for row in self.data.chunks_exact(BLOCK_DIM) {
            writeln!(f, "  {row:?}")?;
        }
        write!(f, "]")
    }
}

impl Block8x8 {
    pub fn as_slice(&self) -> &[i16; BLOCK_SIZE] {
        &self.data
    }

    /// Coefficient at zig-zag position `k`.
    #[inline]
    pub fn zigzag(&self, k: usize) -> i16 {
        self.data[ZIGZAG_TO_NATURAL[k] as usize]
    }

    #[inline]
    pub fn zigzag_mut(&mut self, k: usize) -> &mut i16 {
        &mut self.data[ZIGZAG_TO_NATURAL[k] as usize]
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&c| c == 0)
    }

    pub fn clear(&mut self) {
        self.data = [0; BLOCK_SIZE];
    }
}

impl Index<usize> for Block8x8 {
    type Output = i16;
    fn index(&self, index: usize) -> &i16 {
        &self.data[index]
    }
}

impl IndexMut<usize> for Block8x8 {
    fn index_mut(&mut self, index: usize) -> &mut i16 {
        &mut self.data[index]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zigzag_table_is_a_permutation() {
        let mut seen = [false; BLOCK_SIZE];
        for &n in ZIGZAG_TO_NATURAL[..BLOCK_SIZE].iter() {
            assert!(!seen[n as usize], "{n} repeated");
            seen[n as usize] = true;
        }
        // Consecutive positions are neighbors on a diagonal or an edge.
        for pair in ZIGZAG_TO_NATURAL[..BLOCK_SIZE].windows(2) {
            let (a, b) = (pair[0] as i32, pair[1] as i32);
            let (dx, dy) = ((a % 8 - b % 8).abs(), (a / 8 - b / 8).abs());
            assert!(dx <= 1 && dy <= 1, "{a} -> {b}");
        }
        assert!(ZIGZAG_TO_NATURAL[BLOCK_SIZE..].iter().all(|&n| n == 63));
    }

    #[test]
    fn zigzag_access() {
        let mut block = Block8x8::default();
        *block.zigzag_mut(2) = 5;
        assert_eq!(block[8], 5);
        assert_eq!(block.zigzag(2), 5);
        // Overrunning positions alias the last coefficient.
        *block.zigzag_mut(70) = -3;
        assert_eq!(block[63], -3);
        block.clear();
        assert!(block.is_zero());
    }
}
