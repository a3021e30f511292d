// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::{
    api::DecoderLimits,
    block::BLOCK_DIM,
    error::{Error, Result},
    util::tracing_wrappers::*,
};

pub mod block_grid;
pub mod component;

pub use block_grid::BlockGrid;
pub use component::{ArithmeticComponent, ComponentCoding, ComponentInfo, JpegComponent};

/// Maximum number of components in a frame or a scan.
pub const MAX_COMPONENTS: usize = 4;

/// The DCT-based start-of-frame markers.
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Baseline = 0xC0,
    ExtendedHuffman = 0xC1,
    ProgressiveHuffman = 0xC2,
    ExtendedArithmetic = 0xC9,
    ProgressiveArithmetic = 0xCA,
}

impl TryFrom<u8> for FrameKind {
    type Error = Error;

    fn try_from(marker: u8) -> Result<Self> {
        Self::from_u8(marker).ok_or(Error::InvalidFrameMarker(marker))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyCoding {
    Huffman,
    Arithmetic,
}

impl FrameKind {
    pub fn is_progressive(self) -> bool {
        matches!(
            self,
            FrameKind::ProgressiveHuffman | FrameKind::ProgressiveArithmetic
        )
    }

    pub fn coding(self) -> EntropyCoding {
        match self {
            FrameKind::ExtendedArithmetic | FrameKind::ProgressiveArithmetic => {
                EntropyCoding::Arithmetic
            }
            _ => EntropyCoding::Huffman,
        }
    }
}

/// A frame and the coefficient storage of its components.
#[derive(Debug)]
pub struct JpegFrame {
    pub kind: FrameKind,
    /// Sample precision in bits, 8 or 12.
    pub precision: u8,
    pub width: usize,
    pub height: usize,
    pub components: Vec<JpegComponent>,
    /// Frame component indices of the current scan, in scan order.
    pub component_order: Vec<usize>,
    /// Set when a baseline frame is coded in several non-interleaved scans,
    /// which requires full coefficient storage.
    pub multi_scan: bool,
    /// Keeps every decoded block in the frame even when the frame could be
    /// converted row by row.
    pub retain_coefficients: bool,
    pub mcus_per_line: usize,
    pub mcus_per_column: usize,
    pub max_samp_factors: (usize, usize),
}

impl JpegFrame {
    /// Creates a frame from its SOF header and computes its geometry.
    pub fn new(
        kind: FrameKind,
        precision: u8,
        width: usize,
        height: usize,
        components: &[ComponentInfo],
        limits: &DecoderLimits,
    ) -> Result<JpegFrame> {
        if precision != 8 && precision != 12 {
            return Err(Error::InvalidPrecision(precision));
        }
        if kind == FrameKind::Baseline && precision != 8 {
            return Err(Error::InvalidPrecision(precision));
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidImageSize(width, height));
        }
        limits.check_pixels(width, height)?;
        if components.is_empty() || components.len() > MAX_COMPONENTS {
            return Err(Error::InvalidComponentCount(components.len()));
        }
        for (i, c) in components.iter().enumerate() {
            if components[..i].iter().any(|o| o.id == c.id) {
                return Err(Error::DuplicateComponentId(c.id));
            }
        }
        let arithmetic = kind.coding() == EntropyCoding::Arithmetic;
        let components = components
            .iter()
            .enumerate()
            .map(|(i, c)| JpegComponent::new(c, i, arithmetic))
            .collect::<Result<Vec<_>>>()?;

        let max_h = components.iter().map(|c| c.h_samp_factor).max().unwrap_or(1);
        let max_v = components.iter().map(|c| c.v_samp_factor).max().unwrap_or(1);
        let mut frame = JpegFrame {
            kind,
            precision,
            width,
            height,
            components,
            component_order: vec![],
            multi_scan: false,
            retain_coefficients: false,
            mcus_per_line: 0,
            mcus_per_column: 0,
            max_samp_factors: (max_h, max_v),
        };
        frame.init(max_h, max_v)?;
        Ok(frame)
    }

    /// Computes the MCU grid for the given maximum sampling factors and the
    /// geometry of every component.
    pub fn init(&mut self, max_h: usize, max_v: usize) -> Result<()> {
        if max_h == 0 || max_v == 0 {
            return Err(Error::InvalidSamplingFactors(max_h as u8, max_v as u8));
        }
        self.max_samp_factors = (max_h, max_v);
        self.mcus_per_line = self.width.div_ceil(max_h * BLOCK_DIM);
        self.mcus_per_column = self.height.div_ceil(max_v * BLOCK_DIM);
        let frame_size = (self.width, self.height);
        let mcus = (self.mcus_per_line, self.mcus_per_column);
        for c in self.components.iter_mut() {
            c.init(frame_size, mcus, (max_h, max_v))?;
        }
        debug!(
            kind = ?self.kind,
            width = self.width,
            height = self.height,
            mcus_per_line = self.mcus_per_line,
            mcus_per_column = self.mcus_per_column,
            "frame geometry"
        );
        Ok(())
    }

    pub fn is_progressive(&self) -> bool {
        self.kind.is_progressive()
    }

    pub fn coding(&self) -> EntropyCoding {
        self.kind.coding()
    }

    /// Whether decoded coefficients stay resident for the whole frame, as
    /// opposed to being converted one MCU row at a time.
    pub fn needs_full_storage(&self) -> bool {
        self.is_progressive() || self.multi_scan || self.retain_coefficients
    }

    /// Makes sure every component has coefficient storage for the current
    /// decoding mode, within the memory budget of `limits`.
    pub fn allocate_components(&mut self, limits: &DecoderLimits) -> Result<()> {
        limits.check_pixels(self.width, self.height)?;
        let full_scan = self.needs_full_storage();
        let bytes = self
            .components
            .iter()
            .map(|c| BlockGrid::bytes_for(c.spectral_size(full_scan)))
            .fold(0u64, u64::saturating_add);
        limits.check_memory(bytes)?;
        for c in self.components.iter_mut() {
            if c.allocate_spectral(full_scan)? {
                debug!(component = c.id, full_scan, "allocated coefficient storage");
            }
        }
        Ok(())
    }
}
