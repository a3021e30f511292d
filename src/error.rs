// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::entropy_coding::TableClass;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Bad Huffman table: code lengths overflow the code space")]
    BadHuffmanTable,
    #[error("Huffman table defines {0} symbols but only {1} values were given")]
    HuffmanValuesMismatch(usize, usize),
    #[error("Bad Huffman code")]
    BadHuffmanCode,
    #[error("Bad progression parameters: Ss={0} Se={1} Ah={2} Al={3}")]
    BadProgressiveScan(u8, u8, u8, u8),
    #[error("Invalid arithmetic code")]
    InvalidArithmeticCode,
    #[error("Invalid arithmetic conditioning {1} for {0:?} table")]
    InvalidArithmeticConditioning(TableClass, u8),
    #[error("Missing {0:?} Huffman table {1}")]
    MissingHuffmanTable(TableClass, u8),
    #[error("Missing {0:?} arithmetic statistics for table {1}")]
    MissingArithmeticTable(TableClass, u8),
    #[error("Invalid table destination {0}, expected 0..=3")]
    InvalidTableDestination(u8),
    #[error("Invalid table class {0}")]
    InvalidTableClass(u8),
    #[error("Invalid SOF marker {0:#04x}")]
    InvalidFrameMarker(u8),
    #[error("Invalid image size: {0}x{1}")]
    InvalidImageSize(usize, usize),
    #[error("Image size too large: {0}x{1}")]
    ImageSizeTooLarge(usize, usize),
    #[error("Invalid sample precision {0}")]
    InvalidPrecision(u8),
    #[error("Invalid component count {0}")]
    InvalidComponentCount(usize),
    #[error("Invalid sampling factors {0}x{1}")]
    InvalidSamplingFactors(u8, u8),
    #[error("Duplicate component id {0}")]
    DuplicateComponentId(u8),
    #[error("Invalid scan component {0}")]
    InvalidScanComponent(usize),
    #[error("Invalid number of scan components: {0}")]
    InvalidScanComponentCount(usize),
    #[error("Scan decoder does not match the frame's entropy coding")]
    CodingMismatch,
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
    #[error("Memory limit exceeded: {0} bytes requested, {1} allowed")]
    MemoryLimitExceeded(u64, u64),
    #[error("Decoding cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
