// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    block::BLOCK_DIM,
    error::{Error, Result},
    frame::block_grid::BlockGrid,
};

/// A component as described by the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Component identifier `Ci`.
    pub id: u8,
    /// Horizontal sampling factor `Hi`, 1..=4.
    pub h_samp_factor: u8,
    /// Vertical sampling factor `Vi`, 1..=4.
    pub v_samp_factor: u8,
    /// Quantization table selector `Tqi`.
    pub quant_idx: u8,
}

/// Per-component state owned by the arithmetic decoder's model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArithmeticComponent {
    /// DC conditioning context, the first DC statistics bin to use.
    pub dc_context: usize,
    /// Index of the component's DC statistics in the decoder.
    pub dc_statistics: Option<usize>,
    /// Index of the component's AC statistics in the decoder.
    pub ac_statistics: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentCoding {
    Huffman,
    Arithmetic(ArithmeticComponent),
}

#[derive(Debug)]
pub struct JpegComponent {
    pub id: u8,
    /// Position of the component within the frame header.
    pub index: usize,
    pub h_samp_factor: usize,
    pub v_samp_factor: usize,
    pub quant_idx: u8,
    pub dc_table_id: u8,
    pub ac_table_id: u8,
    /// Size of the component's own data area, in blocks.
    pub width_in_blocks: usize,
    pub height_in_blocks: usize,
    /// Size of the block grid covered by the frame's MCUs.
    pub size_in_blocks: (usize, usize),
    /// Ratio of the maximum sampling factors to this component's.
    pub sub_sampling_divisors: (usize, usize),
    pub dc_predictor: i32,
    pub coding: ComponentCoding,
    pub(crate) spectral_blocks: Option<BlockGrid>,
}

impl JpegComponent {
    pub fn new(info: &ComponentInfo, index: usize, arithmetic: bool) -> Result<JpegComponent> {
        let (h, v) = (info.h_samp_factor, info.v_samp_factor);
        if !(1..=4).contains(&h) || !(1..=4).contains(&v) {
            return Err(Error::InvalidSamplingFactors(h, v));
        }
        Ok(JpegComponent {
            id: info.id,
            index,
            h_samp_factor: h as usize,
            v_samp_factor: v as usize,
            quant_idx: info.quant_idx,
            dc_table_id: 0,
            ac_table_id: 0,
            width_in_blocks: 0,
            height_in_blocks: 0,
            size_in_blocks: (0, 0),
            sub_sampling_divisors: (1, 1),
            dc_predictor: 0,
            coding: if arithmetic {
                ComponentCoding::Arithmetic(ArithmeticComponent::default())
            } else {
                ComponentCoding::Huffman
            },
            spectral_blocks: None,
        })
    }

    /// Computes the component geometry for a frame of `frame_size` pixels
    /// whose MCU grid is `mcus` and whose largest sampling factors are
    /// `max_samp_factors`.
    pub fn init(
        &mut self,
        frame_size: (usize, usize),
        mcus: (usize, usize),
        max_samp_factors: (usize, usize),
    ) -> Result<()> {
        let (max_h, max_v) = max_samp_factors;
        if self.h_samp_factor > max_h || self.v_samp_factor > max_v {
            return Err(Error::InvalidSamplingFactors(
                self.h_samp_factor as u8,
                self.v_samp_factor as u8,
            ));
        }
        // Blocks covering ceil(X * H / Hmax) samples (T.81 A.1.1).
        self.width_in_blocks = (frame_size.0 * self.h_samp_factor).div_ceil(max_h * BLOCK_DIM);
        self.height_in_blocks = (frame_size.1 * self.v_samp_factor).div_ceil(max_v * BLOCK_DIM);
        self.size_in_blocks = (mcus.0 * self.h_samp_factor, mcus.1 * self.v_samp_factor);
        self.sub_sampling_divisors = (max_h / self.h_samp_factor, max_v / self.v_samp_factor);
        Ok(())
    }

    /// Size of the block storage for a full or a one-MCU-row allocation.
    pub fn spectral_size(&self, full_scan: bool) -> (usize, usize) {
        let height = if full_scan {
            self.size_in_blocks.1
        } else {
            self.v_samp_factor
        };
        (self.size_in_blocks.0, height)
    }

    /// Allocates block storage unless storage of the right size exists.
    ///
    /// Returns whether a new grid was allocated.
    pub fn allocate_spectral(&mut self, full_scan: bool) -> Result<bool> {
        let size = self.spectral_size(full_scan);
        if self.spectral_blocks.as_ref().map(BlockGrid::size) == Some(size) {
            return Ok(false);
        }
        self.spectral_blocks = Some(BlockGrid::new(size)?);
        Ok(true)
    }

    pub fn spectral_blocks(&self) -> Option<&BlockGrid> {
        self.spectral_blocks.as_ref()
    }

    pub fn spectral_blocks_mut(&mut self) -> Option<&mut BlockGrid> {
        self.spectral_blocks.as_mut()
    }

    /// Mutable access to the arithmetic coding state.
    pub(crate) fn arithmetic_mut(&mut self) -> Result<&mut ArithmeticComponent> {
        match &mut self.coding {
            ComponentCoding::Arithmetic(state) => Ok(state),
            ComponentCoding::Huffman => Err(Error::CodingMismatch),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn component(h: u8, v: u8) -> JpegComponent {
        let info = ComponentInfo {
            id: 1,
            h_samp_factor: h,
            v_samp_factor: v,
            quant_idx: 0,
        };
        JpegComponent::new(&info, 0, false).unwrap()
    }

    #[test]
    fn subsampled_geometry() -> Result<()> {
        // 4:2:0 chroma of a 33x17 image: MCUs are 16x16 pixels.
        let mut c = component(1, 1);
        c.init((33, 17), (3, 2), (2, 2))?;
        assert_eq!((c.width_in_blocks, c.height_in_blocks), (3, 2));
        assert_eq!(c.size_in_blocks, (3, 2));
        assert_eq!(c.sub_sampling_divisors, (2, 2));

        let mut y = component(2, 2);
        y.init((33, 17), (3, 2), (2, 2))?;
        assert_eq!((y.width_in_blocks, y.height_in_blocks), (5, 3));
        assert_eq!(y.size_in_blocks, (6, 4));
        assert_eq!(y.spectral_size(false), (6, 2));
        assert_eq!(y.spectral_size(true), (6, 4));
        Ok(())
    }

    #[test]
    fn geometry_with_sampling_factor_three() -> Result<()> {
        // 33 samples at 2/3 horizontal resolution are 22 samples, 3 blocks.
        // Rounding the frame to 5 blocks first would give 4.
        let mut c = component(2, 1);
        c.init((33, 8), (2, 1), (3, 1))?;
        assert_eq!((c.width_in_blocks, c.height_in_blocks), (3, 1));
        assert_eq!(c.size_in_blocks, (4, 1));
        Ok(())
    }

    #[test]
    fn rejects_bad_sampling() {
        let info = ComponentInfo {
            id: 1,
            h_samp_factor: 5,
            v_samp_factor: 1,
            quant_idx: 0,
        };
        assert!(JpegComponent::new(&info, 0, false).is_err());
        let mut c = component(3, 1);
        assert!(c.init((16, 16), (1, 1), (2, 1)).is_err());
        // Non-integral ratios keep the truncated divisor.
        c.init((16, 16), (1, 1), (4, 1)).unwrap();
        assert_eq!(c.sub_sampling_divisors, (1, 1));
    }

    #[test]
    fn allocates_once() -> Result<()> {
        let mut c = component(1, 1);
        c.init((16, 16), (2, 2), (1, 1))?;
        assert!(c.allocate_spectral(false)?);
        c.spectral_blocks_mut().unwrap().block_mut(1, 0)[0] = 3;
        assert!(!c.allocate_spectral(false)?);
        assert_eq!(c.spectral_blocks().unwrap().block(1, 0)[0], 3);
        // Switching to full storage replaces the stride buffer.
        assert!(c.allocate_spectral(true)?);
        assert_eq!(c.spectral_blocks().unwrap().size(), (2, 2));
        assert!(c.arithmetic_mut().is_err());
        Ok(())
    }
}
