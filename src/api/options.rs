// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    api::{CancellationToken, DecoderLimits},
    bit_reader::DEFAULT_MAX_STARVED_FILLS,
};

/// Options shared by the Huffman and arithmetic scan decoders.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ScanDecoderOptions {
    /// Number of reads past the end of an entropy-coded segment (end of
    /// input, or a marker) that are answered with zero bits before the
    /// decoder stops early.
    /// Default: [`DEFAULT_MAX_STARVED_FILLS`].
    pub max_starved_fills: usize,
    /// Limits on frame size and coefficient storage, checked whenever a scan
    /// allocates coefficient storage for its frame.
    pub limits: DecoderLimits,
    /// Checked between rows of MCUs or blocks.
    pub cancellation_token: Option<CancellationToken>,
}

impl ScanDecoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: DecoderLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    pub fn with_max_starved_fills(mut self, max_starved_fills: usize) -> Self {
        self.max_starved_fills = max_starved_fills;
        self
    }
}

impl Default for ScanDecoderOptions {
    fn default() -> Self {
        Self {
            max_starved_fills: DEFAULT_MAX_STARVED_FILLS,
            limits: DecoderLimits::default(),
            cancellation_token: None,
        }
    }
}
