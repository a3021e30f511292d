// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Decoding of the entropy-coded segments of JPEG (ITU T.81) scans into
//! quantized DCT coefficient blocks.
//!
//! Huffman coding (baseline, extended and progressive frames) and
//! arithmetic coding (ITU T.851 / T.81 Annex D) are supported. Marker
//! parsing, dequantization and the inverse DCT are left to the caller:
//! frame and scan parameters come in as [`frame::JpegFrame`] and
//! [`scan::ScanInfo`], and decoded blocks go out either through a
//! [`scan::SpectralConverter`] one row of MCUs at a time, or stay in the
//! frame for progressive and multi-scan images.

#![deny(unsafe_code)]
pub mod api;
pub mod bit_reader;
pub mod block;
pub mod entropy_coding;
pub mod error;
pub mod frame;
pub mod scan;
pub mod util;
