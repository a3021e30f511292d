// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Resource limits and cancellation support for scan decoding.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Configurable resource limits for coefficient decoding.
///
/// Coefficient storage is the only allocation whose size is controlled by the
/// input: a frame header can request up to 65535x65535 pixels per component.
///
/// # Example
///
/// ```
/// use jpeg_entropy::api::DecoderLimits;
///
/// // Trusted content.
/// let limits = DecoderLimits::default();
///
/// // Untrusted content.
/// let limits = DecoderLimits::restrictive();
/// assert_eq!(limits.max_pixels, Some(100_000_000));
/// ```
#[derive(Clone, Debug, Default)]
pub struct DecoderLimits {
    /// Maximum frame area (width * height).
    /// Default: `None` (unlimited).
    /// Recommended safe: `1 << 30`.
    pub max_pixels: Option<usize>,

    /// Maximum bytes of coefficient storage for a frame.
    /// Default: `None` (unlimited).
    pub max_memory_bytes: Option<u64>,
}

impl DecoderLimits {
    /// Returns limits with recommended safe defaults.
    pub fn default_safe() -> Self {
        Self {
            max_pixels: Some(1 << 30),
            max_memory_bytes: None,
        }
    }

    /// Returns restrictive limits suitable for untrusted content.
    pub fn restrictive() -> Self {
        Self {
            max_pixels: Some(100_000_000),
            max_memory_bytes: Some(1 << 30),
        }
    }

    /// Returns limits with all restrictions disabled.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub(crate) fn check_pixels(&self, width: usize, height: usize) -> Result<()> {
        match (self.max_pixels, width.checked_mul(height)) {
            (_, None) => Err(Error::ImageSizeTooLarge(width, height)),
            (Some(max), Some(pixels)) if pixels > max => {
                Err(Error::ImageSizeTooLarge(width, height))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn check_memory(&self, bytes: u64) -> Result<()> {
        match self.max_memory_bytes {
            Some(max) if bytes > max => Err(Error::MemoryLimitExceeded(bytes, max)),
            _ => Ok(()),
        }
    }
}

/// A thread-safe token for cooperative cancellation of scan decoding.
///
/// Scan decoders check the token once per row of MCUs or blocks and return
/// [`Error::Cancelled`] once it is set.
///
/// ```
/// use jpeg_entropy::api::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every decode holding a clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Clears a previous request so the token can be reused.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pixel_limit() {
        let limits = DecoderLimits::restrictive();
        assert!(limits.check_pixels(10_000, 10_000).is_ok());
        assert!(matches!(
            limits.check_pixels(10_001, 10_000),
            Err(Error::ImageSizeTooLarge(10_001, 10_000))
        ));
        assert!(DecoderLimits::unlimited().check_pixels(65535, 65535).is_ok());
    }

    #[test]
    fn memory_limit() {
        let limits = DecoderLimits::restrictive();
        assert!(limits.check_memory(1 << 30).is_ok());
        assert!(limits.check_memory((1 << 30) + 1).is_err());
        assert!(DecoderLimits::default_safe().check_memory(u64::MAX).is_ok());
    }

    #[test]
    fn cancellation_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(Error::Cancelled)));
        token.reset();
        assert!(!clone.is_cancelled());
    }
}
