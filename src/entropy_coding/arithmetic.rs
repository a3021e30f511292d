// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    entropy_coding::{NUM_TABLE_DESTINATIONS, TableClass, check_destination},
    error::{Error, Result},
    util::tracing_wrappers::*,
};

/// One row of the probability estimation state machine (T.81 Table D.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QeEntry {
    pub qe: u16,
    pub next_lps: u8,
    pub next_mps: u8,
    /// Whether the MPS sense flips after an LPS.
    pub switch: bool,
}

const fn qe(qe: u16, next_lps: u8, next_mps: u8, switch: u8) -> QeEntry {
    QeEntry {
        qe,
        next_lps,
        next_mps,
        switch: switch != 0,
    }
}

/// Index of the non-adapting state with Qe = 0.5, used for sign and
/// refinement decisions.
pub const FIXED_BIN_STATE: u8 = 113;

/// The 113 adaptive states followed by the fixed 0.5 state.
pub static QE_TABLE: [QeEntry; FIXED_BIN_STATE as usize + 1] = [
    qe(0x5a1d, 1, 1, 1),
    qe(0x2586, 14, 2, 0),
    qe(0x1114, 16, 3, 0),
    qe(0x080b, 18, 4, 0),
    qe(0x03d8, 20, 5, 0),
    qe(0x01da, 23, 6, 0),
    qe(0x00e5, 25, 7, 0),
    qe(0x006f, 28, 8, 0),
    qe(0x0036, 30, 9, 0),
    qe(0x001a, 33, 10, 0),
    qe(0x000d, 35, 11, 0),
    qe(0x0006, 9, 12, 0),
    qe(0x0003, 10, 13, 0),
    qe(0x0001, 12, 13, 0),
    qe(0x5a7f, 15, 15, 1),
    qe(0x3f25, 36, 16, 0),
    qe(0x2cf2, 38, 17, 0),
    qe(0x207c, 39, 18, 0),
    qe(0x17b9, 40, 19, 0),
    qe(0x1182, 42, 20, 0),
    qe(0x0cef, 43, 21, 0),
    qe(0x09a1, 45, 22, 0),
    qe(0x072f, 46, 23, 0),
    qe(0x055c, 48, 24, 0),
    qe(0x0406, 49, 25, 0),
    qe(0x0303, 51, 26, 0),
    qe(0x0240, 52, 27, 0),
    qe(0x01b1, 54, 28, 0),
    qe(0x0144, 56, 29, 0),
    qe(0x00f5, 57, 30, 0),
    qe(0x00b7, 59, 31, 0),
    qe(0x008a, 60, 32, 0),
    qe(0x0068, 62, 33, 0),
    qe(0x004e, 63, 34, 0),
    qe(0x003b, 32, 35, 0),
    qe(0x002c, 33, 9, 0),
    qe(0x5ae1, 37, 37, 1),
    qe(0x484c, 64, 38, 0),
    qe(0x3a0d, 65, 39, 0),
    qe(0x2ef1, 67, 40, 0),
    qe(0x261f, 68, 41, 0),
    qe(0x1f33, 69, 42, 0),
    qe(0x19a8, 70, 43, 0),
    qe(0x1518, 72, 44, 0),
    qe(0x1177, 73, 45, 0),
    qe(0x0e74, 74, 46, 0),
    qe(0x0bfb, 75, 47, 0),
    qe(0x09f8, 77, 48, 0),
    qe(0x0861, 78, 49, 0),
    qe(0x0706, 79, 50, 0),
    qe(0x05cd, 48, 51, 0),
    qe(0x04de, 50, 52, 0),
    qe(0x040f, 50, 53, 0),
    qe(0x0363, 51, 54, 0),
    qe(0x02d4, 52, 55, 0),
    qe(0x025c, 53, 56, 0),
    qe(0x01f8, 54, 57, 0),
    qe(0x01a4, 55, 58, 0),
    qe(0x0160, 56, 59, 0),
    qe(0x0125, 57, 60, 0),
    qe(0x00f6, 58, 61, 0),
    qe(0x00cb, 59, 62, 0),
    qe(0x00ab, 61, 63, 0),
    qe(0x008f, 61, 32, 0),
    qe(0x5b12, 65, 65, 1),
    qe(0x4d04, 80, 66, 0),
    qe(0x412c, 81, 67, 0),
    qe(0x37d8, 82, 68, 0),
    qe(0x2fe8, 83, 69, 0),
    qe(0x293c, 84, 70, 0),
    qe(0x2379, 86, 71, 0),
    qe(0x1edf, 87, 72, 0),
    qe(0x1aa9, 87, 73, 0),
    qe(0x174e, 72, 74, 0),
    qe(0x1424, 72, 75, 0),
    qe(0x119c, 74, 76, 0),
    qe(0x0f6b, 74, 77, 0),
    qe(0x0d51, 75, 78, 0),
    qe(0x0bb6, 77, 79, 0),
    qe(0x0a40, 77, 48, 0),
    qe(0x5832, 80, 81, 1),
    qe(0x4d1c, 88, 82, 0),
    qe(0x438e, 89, 83, 0),
    qe(0x3bdd, 90, 84, 0),
    qe(0x34ee, 91, 85, 0),
    qe(0x2eae, 92, 86, 0),
    qe(0x299a, 93, 87, 0),
    qe(0x2516, 86, 71, 0),
    qe(0x5570, 88, 89, 1),
    qe(0x4ca9, 95, 90, 0),
    qe(0x44d9, 96, 91, 0),
    qe(0x3e22, 97, 92, 0),
    qe(0x3824, 99, 93, 0),
    qe(0x32b4, 99, 94, 0),
    qe(0x2e17, 93, 86, 0),
    qe(0x56a8, 95, 96, 1),
    qe(0x4f46, 101, 97, 0),
    qe(0x47e5, 102, 98, 0),
    qe(0x41cf, 103, 99, 0),
    qe(0x3c3d, 104, 100, 0),
    qe(0x375e, 99, 93, 0),
    qe(0x5231, 105, 102, 0),
    qe(0x4c0f, 106, 103, 0),
    qe(0x4639, 107, 104, 0),
    qe(0x415e, 103, 99, 0),
    qe(0x5627, 105, 106, 1),
    qe(0x50e7, 108, 107, 0),
    qe(0x4b85, 109, 103, 0),
    qe(0x5597, 110, 109, 0),
    qe(0x504f, 111, 107, 0),
    qe(0x5a10, 110, 111, 1),
    qe(0x5522, 112, 109, 0),
    qe(0x59eb, 112, 111, 1),
    qe(0x5a1d, 113, 113, 0),
];

/// Number of statistics bins of a DC table (T.81 F.1.4.4.1.3).
pub const DC_STATISTICS_SIZE: usize = 64;
/// Number of statistics bins of an AC table (T.81 F.1.4.4.2.1).
pub const AC_STATISTICS_SIZE: usize = 256;

/// First bin of the DC magnitude category chain.
pub const DC_MAGNITUDE_BIN: usize = 20;
/// First bins of the AC magnitude category chains below and above Kx.
pub const AC_LOW_MAGNITUDE_BIN: usize = 189;
pub const AC_HIGH_MAGNITUDE_BIN: usize = 217;

/// Conditioning parameters of one arithmetic coding table, as set by DAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticDecodingTable {
    pub class: TableClass,
    pub destination: u8,
    /// DC lower bound L.
    pub dc_l: u8,
    /// DC upper bound U.
    pub dc_u: u8,
    /// AC band split Kx.
    pub ac_kx: u8,
}

impl ArithmeticDecodingTable {
    /// A table with the default conditioning (L = 0, U = 1, Kx = 5).
    pub fn new(class: TableClass, destination: u8) -> Self {
        Self {
            class,
            destination,
            dc_l: 0,
            dc_u: 1,
            ac_kx: 5,
        }
    }

    /// Applies the conditioning byte `Cs` of a DAC segment.
    pub fn configure(&mut self, conditioning: u8) -> Result<()> {
        match self.class {
            TableClass::Dc => {
                let (l, u) = (conditioning & 0x0F, conditioning >> 4);
                if l > u {
                    return Err(Error::InvalidArithmeticConditioning(self.class, conditioning));
                }
                self.dc_l = l;
                self.dc_u = u;
            }
            TableClass::Ac => {
                if !(1..=63).contains(&conditioning) {
                    return Err(Error::InvalidArithmeticConditioning(self.class, conditioning));
                }
                self.ac_kx = conditioning;
            }
        }
        Ok(())
    }
}

/// The arithmetic conditioning tables of a frame, by class and destination.
#[derive(Debug, Clone)]
pub struct ArithmeticTables {
    dc: [ArithmeticDecodingTable; NUM_TABLE_DESTINATIONS],
    ac: [ArithmeticDecodingTable; NUM_TABLE_DESTINATIONS],
}

impl Default for ArithmeticTables {
    fn default() -> Self {
        Self {
            dc: array_init::array_init(|i| ArithmeticDecodingTable::new(TableClass::Dc, i as u8)),
            ac: array_init::array_init(|i| ArithmeticDecodingTable::new(TableClass::Ac, i as u8)),
        }
    }
}

impl ArithmeticTables {
    pub fn configure(&mut self, class: TableClass, destination: u8, conditioning: u8) -> Result<()> {
        let index = check_destination(destination)?;
        let table = match class {
            TableClass::Dc => &mut self.dc[index],
            TableClass::Ac => &mut self.ac[index],
        };
        table.configure(conditioning)?;
        debug!(?table, "configured arithmetic conditioning");
        Ok(())
    }

    pub fn get(&self, class: TableClass, destination: u8) -> Result<&ArithmeticDecodingTable> {
        let slots = match class {
            TableClass::Dc => &self.dc,
            TableClass::Ac => &self.ac,
        };
        slots
            .get(destination as usize)
            .ok_or(Error::MissingArithmeticTable(class, destination))
    }
}

/// Adaptive probability states of one table, one byte per bin: the low
/// seven bits index [`QE_TABLE`], the top bit is the MPS sense.
#[derive(Debug, Clone)]
pub struct ArithmeticStatistics {
    pub class: TableClass,
    pub identifier: u8,
    bins: Vec<u8>,
}

impl ArithmeticStatistics {
    pub fn new(class: TableClass, identifier: u8) -> Self {
        let size = match class {
            TableClass::Dc => DC_STATISTICS_SIZE,
            TableClass::Ac => AC_STATISTICS_SIZE,
        };
        Self {
            class,
            identifier,
            bins: vec![0; size],
        }
    }

    pub fn reset(&mut self) {
        self.bins.fill(0);
    }

    #[inline]
    pub fn bin_mut(&mut self, index: usize) -> &mut u8 {
        &mut self.bins[index]
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }
}

/// The registers of the QM decoder (T.81 D.2).
#[derive(Debug, Clone)]
pub struct QmDecoder {
    c: i32,
    a: i32,
    ct: i32,
}

impl Default for QmDecoder {
    fn default() -> Self {
        Self { c: 0, a: 0, ct: -16 }
    }
}

impl QmDecoder {
    /// Restarts the decoder; the next decision primes the code register.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Decodes one binary decision with the probability state `st`,
    /// updating the state in place.
    #[inline]
    pub fn decode(&mut self, reader: &mut BitReader, st: &mut u8) -> u8 {
        // Renormalization and byte input (D.2.6, D.2.7).
        while self.a < 0x8000 {
            self.ct -= 1;
            if self.ct < 0 {
                let data = reader.get_bits(8) as i32;
                self.c = (self.c << 8) | data;
                self.ct += 8;
                if self.ct < 0 {
                    // Priming: two bytes enter before the interval opens.
                    self.ct += 1;
                    if self.ct == 0 {
                        self.a = 0x8000;
                    }
                }
            }
            self.a <<= 1;
        }

        let mut sv = *st;
        let entry = &QE_TABLE[(sv & 0x7F) as usize];
        let qe = entry.qe as i32;
        let nl = entry.next_lps | ((entry.switch as u8) << 7);
        let nm = entry.next_mps;

        // Conditional exchange (D.2.4, D.2.5).
        self.a -= qe;
        let temp = self.a << self.ct;
        if self.c >= temp {
            self.c -= temp;
            if self.a < qe {
                self.a = qe;
                *st = (sv & 0x80) ^ nm;
            } else {
                self.a = qe;
                *st = (sv & 0x80) ^ nl;
                sv ^= 0x80;
            }
        } else if self.a < 0x8000 {
            if self.a < qe {
                *st = (sv & 0x80) ^ nl;
                sv ^= 0x80;
            } else {
                *st = (sv & 0x80) ^ nm;
            }
        }

        sv >> 7
    }
}
