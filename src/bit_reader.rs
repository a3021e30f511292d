// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use byteorder::{BigEndian, ByteOrder};

use crate::{
    entropy_coding::huffman::{HuffmanTable, LOOKUP_BITS, MAX_CODE_SENTINEL, SLOW_BITS},
    error::{Error, Result},
    util::tracing_wrappers::*,
};

/// Number of bits the accumulator is kept above before a read.
pub const MIN_BITS: usize = 16;

/// Bytes appended to the accumulator per fill.
const FILL_BYTES: usize = 6;

/// Marker value meaning "no marker seen yet".
pub const NO_MARKER: u8 = 0xFF;

/// Default number of fills that may synthesize data past the end of the
/// segment before [`BitReader::no_data`] is raised.
pub const DEFAULT_MAX_STARVED_FILLS: usize = 2;

/// Reads bits from the entropy-coded segment of a JPEG scan.
///
/// Stuffed bytes (`FF 00`) are collapsed to `FF`. The first marker encountered
/// stops consumption of the input: its code and position are recorded and
/// zero bits are produced from then on, so that the block currently being
/// decoded can be completed.
#[derive(Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    bit_buf: u64,
    bits_in_buf: usize,
    marker: u8,
    marker_position: usize,
    bad_data: bool,
    starved_fills: usize,
    max_starved_fills: usize,
    no_data: bool,
}

impl Debug for BitReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BitReader{{ data: [{} bytes], position: {}, bit_buf: {:0width$b}, marker: {:#04x}, no_data: {} }}",
            self.data.len(),
            self.position,
            self.bit_buf & ((1u64 << self.bits_in_buf) - 1),
            self.marker,
            self.no_data,
            width = self.bits_in_buf
        )
    }
}

impl<'a> BitReader<'a> {
    /// Constructs a BitReader that starts reading `data` at byte `position`.
    pub fn new(data: &'a [u8], position: usize) -> BitReader<'a> {
        BitReader {
            data,
            position: position.min(data.len()),
            bit_buf: 0,
            bits_in_buf: 0,
            marker: NO_MARKER,
            marker_position: 0,
            bad_data: false,
            starved_fills: 0,
            max_starved_fills: DEFAULT_MAX_STARVED_FILLS,
            no_data: false,
        }
    }

    /// Sets how many fills past the end of the segment are tolerated before
    /// [`BitReader::no_data`] reports exhaustion.
    pub fn with_max_starved_fills(mut self, max_starved_fills: usize) -> Self {
        self.max_starved_fills = max_starved_fills;
        self
    }

    /// Byte offset of the next unread byte of the input.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    /// The marker that stopped consumption, or [`NO_MARKER`].
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// Offset of the `FF` byte introducing [`BitReader::marker`].
    pub fn marker_position(&self) -> usize {
        self.marker_position
    }

    /// Whether the data of the current segment has been exhausted.
    pub fn no_data(&self) -> bool {
        self.no_data
    }

    pub fn has_restart_marker(&self) -> bool {
        is_restart_marker(self.marker)
    }

    /// Whether a marker other than RST0..RST7 has been read.
    pub fn has_bad_marker(&self) -> bool {
        self.marker != NO_MARKER && !self.has_restart_marker()
    }

    /// Clears the accumulator and all marker state, keeping the position.
    pub fn reset(&mut self) {
        self.bit_buf = 0;
        self.bits_in_buf = 0;
        self.marker = NO_MARKER;
        self.marker_position = 0;
        self.bad_data = false;
        self.starved_fills = 0;
        self.no_data = false;
    }

    fn read_byte(&mut self) -> u8 {
        if self.bad_data {
            return 0;
        }
        match self.data.get(self.position) {
            Some(&b) => {
                self.position += 1;
                b
            }
            None => {
                trace!(position = self.position, "end of data");
                self.bad_data = true;
                0
            }
        }
    }

    /// Appends [`FILL_BYTES`] bytes to the accumulator.
    ///
    /// ```
    /// # use jpeg_entropy::bit_reader::BitReader;
    /// let mut br = BitReader::new(&[0xAB, 0xFF, 0x00, 0x12], 0);
    /// br.fill();
    /// assert_eq!(br.get_bits(8), 0xAB);
    /// assert_eq!(br.get_bits(8), 0xFF);
    /// assert_eq!(br.get_bits(8), 0x12);
    /// ```
    pub fn fill(&mut self) {
        if self.bad_data {
            self.starved_fills += 1;
            if self.starved_fills > self.max_starved_fills {
                self.no_data = true;
            }
        } else if let Some(bytes) = self.data.get(self.position..self.position + FILL_BYTES) {
            if !bytes.contains(&0xFF) {
                self.bit_buf = (self.bit_buf << (FILL_BYTES * 8)) | BigEndian::read_u48(bytes);
                self.bits_in_buf += FILL_BYTES * 8;
                self.position += FILL_BYTES;
                return;
            }
        }
        self.fill_slow();
    }

    #[inline(never)]
    fn fill_slow(&mut self) {
        for _ in 0..FILL_BYTES {
            let mut b = self.read_byte();
            if b == 0xFF {
                let mut c = self.read_byte();
                while c == 0xFF {
                    c = self.read_byte();
                }
                if c != 0 {
                    self.marker = c;
                    self.marker_position = self.position - 2;
                    self.bad_data = true;
                    b = 0;
                    debug!(marker = c, position = self.marker_position, "marker in entropy-coded data");
                }
            }
            self.bit_buf = (self.bit_buf << 8) | b as u64;
        }
        self.bits_in_buf += FILL_BYTES * 8;
    }

    /// Makes sure at least [`MIN_BITS`] bits are buffered.
    #[inline]
    pub fn check_bits(&mut self) {
        if self.bits_in_buf < MIN_BITS {
            self.fill();
        }
    }

    /// Reads `num` bits (at most [`MIN_BITS`]) most significant bit first.
    #[inline]
    pub fn get_bits(&mut self, num: usize) -> u32 {
        debug_assert!(num <= MIN_BITS);
        self.check_bits();
        let ret = self.peek_bits(num);
        self.bits_in_buf -= num;
        ret
    }

    #[inline]
    pub fn get_bit(&mut self) -> u32 {
        self.get_bits(1)
    }

    /// Returns the next `num` bits without consuming them. The caller must
    /// have called [`BitReader::check_bits`].
    #[inline]
    pub fn peek_bits(&self, num: usize) -> u32 {
        ((self.bit_buf >> (self.bits_in_buf - num)) & ((1u64 << num) - 1)) as u32
    }

    /// Reads an `num`-bit magnitude and maps it to its signed value (T.81 F.2.2.1).
    ///
    /// ```
    /// # use jpeg_entropy::bit_reader::BitReader;
    /// let mut br = BitReader::new(&[0b0110_0000], 0);
    /// assert_eq!(br.receive_extend(3), -4);
    /// ```
    #[inline]
    pub fn receive_extend(&mut self, num: usize) -> i32 {
        if num == 0 {
            return 0;
        }
        let v = self.get_bits(num) as i32;
        v - ((((v + v) >> num) - 1) & ((1 << num) - 1))
    }

    /// Decodes one Huffman-coded symbol.
    #[inline]
    pub fn decode_huffman(&mut self, table: &HuffmanTable) -> Result<u8> {
        self.check_bits();
        let index = self.peek_bits(LOOKUP_BITS) as usize;
        let size = table.lookahead_size[index] as usize;
        if size < SLOW_BITS {
            self.bits_in_buf -= size;
            return Ok(table.lookahead_value[index]);
        }
        self.decode_huffman_slow(table)
    }

    #[inline(never)]
    fn decode_huffman_slow(&mut self, table: &HuffmanTable) -> Result<u8> {
        let code = self.bit_buf << (64 - self.bits_in_buf);
        let mut size = SLOW_BITS;
        // Lengths without codes have a zero maximum and never match.
        while code > table.max_code[size] || table.max_code[size] == 0 {
            size += 1;
        }
        if size >= MAX_CODE_SENTINEL {
            return Err(Error::BadHuffmanCode);
        }
        self.bits_in_buf -= size;
        let index = (table.val_offset[size] + (code >> (64 - size)) as i32) as usize;
        Ok(table.values[index & 0xFF])
    }

    /// Scans the raw input for the next marker and consumes it.
    ///
    /// Returns false if the input ends first. Stuffed bytes and fill bytes
    /// are skipped.
    pub fn find_next_marker(&mut self) -> bool {
        while self.position < self.data.len() {
            if self.data[self.position] != 0xFF {
                self.position += 1;
                continue;
            }
            let start = self.position;
            let mut next = start + 1;
            while next < self.data.len() && self.data[next] == 0xFF {
                next += 1;
            }
            let Some(&m) = self.data.get(next) else {
                break;
            };
            if m != 0 {
                self.marker = m;
                self.marker_position = next - 1;
                self.position = next + 1;
                return true;
            }
            self.position = next + 1;
        }
        self.position = self.data.len();
        false
    }
}

pub fn is_restart_marker(marker: u8) -> bool {
    (0xD0..=0xD7).contains(&marker)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::test::HuffmanBitWriter;
    use test_log::test;

    #[test]
    fn destuffs_ff00() {
        let data = [0xFF, 0x00, 0x7F, 0xFF, 0x00, 0x80];
        let mut br = BitReader::new(&data, 0);
        assert_eq!(br.get_bits(8), 0xFF);
        assert_eq!(br.get_bits(8), 0x7F);
        assert_eq!(br.get_bits(8), 0xFF);
        assert_eq!(br.get_bits(8), 0x80);
        assert_eq!(br.marker(), NO_MARKER);
        assert!(!br.has_bad_marker());
        assert!(!br.has_restart_marker());
    }

    #[test]
    fn fast_fill_is_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
        let mut br = BitReader::new(&data, 0);
        assert_eq!(br.get_bits(16), 0x1234);
        assert_eq!(br.get_bits(4), 0x5);
        assert_eq!(br.get_bits(12), 0x678);
        assert_eq!(br.get_bits(16), 0x9ABC);
        // One fast fill of six bytes so far.
        assert_eq!(br.position(), 6);
        // The last byte needs a byte-wise fill.
        assert_eq!(br.get_bits(8), 0xDE);
        assert_eq!(br.position(), 7);
    }

    #[test]
    fn marker_stops_consumption() {
        let data = [0xA5, 0xFF, 0xFF, 0xD9, 0x12, 0x34];
        let mut br = BitReader::new(&data, 0);
        assert_eq!(br.get_bits(8), 0xA5);
        assert_eq!(br.marker(), 0xD9);
        assert_eq!(br.marker_position(), 2);
        assert!(br.has_bad_marker());
        // Everything after the marker reads as zero.
        assert_eq!(br.get_bits(16), 0);
        assert_eq!(br.get_bits(16), 0);
        assert_eq!(br.position(), 4);
    }

    macro_rules! restart_marker_test {
        ($($n:literal),*) => {
            paste::paste! {
                $(
                    #[test]
                    fn [<restart_marker_ $n>]() {
                        let data = [0x00, 0xFF, 0xD0 + $n, 0x55];
                        let mut br = BitReader::new(&data, 0);
                        assert_eq!(br.get_bits(8), 0);
                        assert_eq!(br.marker(), 0xD0 + $n);
                        assert!(br.has_restart_marker());
                        assert!(!br.has_bad_marker());
                        br.reset();
                        assert_eq!(br.get_bits(8), 0x55);
                    }
                )*
            }
        };
    }

    restart_marker_test!(0, 1, 2, 3, 4, 5, 6, 7);

    #[test]
    fn non_restart_markers_are_bad() {
        for m in [0x01u8, 0xC4, 0xCC, 0xD8, 0xD9, 0xDA, 0xDD, 0xFE] {
            let data = [0xFF, m];
            let mut br = BitReader::new(&data, 0);
            br.check_bits();
            assert_eq!(br.marker(), m);
            assert!(br.has_bad_marker(), "marker {m:#04x}");
            assert!(!br.has_restart_marker(), "marker {m:#04x}");
        }
    }

    #[test]
    fn no_data_after_starved_fills() {
        let mut br = BitReader::new(&[0x01], 0).with_max_starved_fills(1);
        assert_eq!(br.get_bits(8), 0x01);
        assert!(!br.no_data());
        for _ in 0..(FILL_BYTES * 8 * 2 / 16) {
            br.get_bits(16);
        }
        assert!(br.no_data());
        br.reset();
        assert!(!br.no_data());
    }

    #[test]
    fn receive_extend_sign() {
        // 1 -> 1, 0 -> -1 for one bit; 10 -> 2, 01 -> -2 for two bits.
        let mut br = BitReader::new(&[0b1010_0100], 0);
        assert_eq!(br.receive_extend(1), 1);
        assert_eq!(br.receive_extend(1), -1);
        assert_eq!(br.receive_extend(2), 2);
        assert_eq!(br.receive_extend(2), -2);
        assert_eq!(br.receive_extend(0), 0);
    }

    #[test]
    fn find_next_marker_skips_stuffing() {
        let data = [0x12, 0xFF, 0x00, 0x34, 0xFF, 0xFF, 0xD3, 0x56];
        let mut br = BitReader::new(&data, 0);
        assert!(br.find_next_marker());
        assert_eq!(br.marker(), 0xD3);
        assert_eq!(br.marker_position(), 5);
        assert_eq!(br.position(), 7);
        br.reset();
        assert!(!br.find_next_marker());
    }

    #[test]
    fn bit_writer_roundtrip() {
        let mut w = HuffmanBitWriter::new();
        w.write_bits(0xFF, 8);
        w.write_bits(0b101, 3);
        w.write_bits(0x3FFF, 14);
        let data = w.finish();
        let mut br = BitReader::new(&data, 0);
        assert_eq!(br.get_bits(8), 0xFF);
        assert_eq!(br.get_bits(3), 0b101);
        assert_eq!(br.get_bits(14), 0x3FFF);
        assert_eq!(br.marker(), NO_MARKER);
    }
}
