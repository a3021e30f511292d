// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{error::Result, frame::JpegFrame};

/// Consumer of decoded coefficient blocks.
///
/// Frames whose coefficients are not kept for the whole frame (baseline
/// frames coded in a single interleaved scan) are handed over one row of
/// MCUs at a time: after [`SpectralConverter::convert_stride_baseline`]
/// returns, the stride buffers of every component are cleared and reused.
/// Progressive and multi-scan frames keep their coefficients in the frame's
/// components; the caller converts them once the last scan is decoded.
pub trait SpectralConverter {
    /// Called once per frame, after its geometry is known.
    fn inject_frame_data(&mut self, frame: &JpegFrame) -> Result<()>;

    /// Called before the first MCU row of a row-by-row scan.
    fn prepare_for_decoding(&mut self, frame: &JpegFrame) -> Result<()>;

    /// Called after every decoded row of MCUs of a row-by-row scan, and
    /// once more for the partial row when a scan ends early.
    fn convert_stride_baseline(&mut self, frame: &JpegFrame) -> Result<()>;

    /// Called after the last row of a row-by-row scan.
    fn commit_conversion(&mut self, frame: &JpegFrame) -> Result<()>;
}

/// Ignores every stride. Useful when all coefficients are retained in the
/// frame.
#[derive(Debug, Default)]
pub struct DiscardingConverter;

impl SpectralConverter for DiscardingConverter {
    fn inject_frame_data(&mut self, _frame: &JpegFrame) -> Result<()> {
        Ok(())
    }

    fn prepare_for_decoding(&mut self, _frame: &JpegFrame) -> Result<()> {
        Ok(())
    }

    fn convert_stride_baseline(&mut self, _frame: &JpegFrame) -> Result<()> {
        Ok(())
    }

    fn commit_conversion(&mut self, _frame: &JpegFrame) -> Result<()> {
        Ok(())
    }
}
