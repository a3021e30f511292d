// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use crate::{
    entropy_coding::{NUM_TABLE_DESTINATIONS, TableClass, check_destination},
    error::{Error, Result},
    util::tracing_wrappers::*,
};

/// Longest code length allowed by T.81.
pub const MAX_CODE_LENGTH: usize = 16;

/// Number of bits resolved by a single lookahead table access.
pub const LOOKUP_BITS: usize = 8;

/// Lookahead size meaning "code is longer than [`LOOKUP_BITS`]".
pub const SLOW_BITS: usize = LOOKUP_BITS + 1;

/// Index of the `max_code` entry that terminates every slow-path search.
pub const MAX_CODE_SENTINEL: usize = MAX_CODE_LENGTH + 1;

const REGISTER_SIZE: usize = 64;

/// Contents of one table definition of a DHT segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanCodeSpec {
    pub class: TableClass,
    /// Destination identifier, 0..=3.
    pub destination: u8,
    /// Number of codes of each length 1..=16.
    pub counts: [u8; MAX_CODE_LENGTH],
    /// Symbols in order of increasing code length.
    pub values: Vec<u8>,
}

/// A canonical JPEG Huffman decoding table.
///
/// Codes of up to [`LOOKUP_BITS`] bits are resolved with a single table
/// access; longer codes fall back to the bit-serial search of T.81 F.2.2.3
/// against left-justified maximum codes.
#[derive(Clone)]
pub struct HuffmanTable {
    pub(crate) values: [u8; 256],
    /// Largest code of each length, left-justified in 64 bits and padded
    /// with ones. Zero for lengths without codes.
    pub(crate) max_code: [u64; MAX_CODE_SENTINEL + 1],
    /// Offset from a code to the index of its symbol in `values`.
    pub(crate) val_offset: [i32; MAX_CODE_SENTINEL + 2],
    pub(crate) lookahead_size: [u8; 1 << LOOKUP_BITS],
    pub(crate) lookahead_value: [u8; 1 << LOOKUP_BITS],
}

impl Debug for HuffmanTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lengths: Vec<usize> = (1..=MAX_CODE_LENGTH)
            .filter(|&l| self.max_code[l] != 0)
            .collect();
        write!(f, "HuffmanTable {{ code lengths: {lengths:?} }}")
    }
}

impl HuffmanTable {
    /// Builds a table from the code counts per length and the symbols.
    ///
    /// ```
    /// # use jpeg_entropy::entropy_coding::huffman::HuffmanTable;
    /// let mut counts = [0u8; 16];
    /// counts[1] = 3;
    /// let _table = HuffmanTable::new(&counts, &[0, 1, 2])?;
    /// # Ok::<(), jpeg_entropy::error::Error>(())
    /// ```
    pub fn new(counts: &[u8; MAX_CODE_LENGTH], values: &[u8]) -> Result<HuffmanTable> {
        let num_symbols: usize = counts.iter().map(|&c| c as usize).sum();
        if num_symbols > 256 {
            return Err(Error::BadHuffmanTable);
        }
        if num_symbols > values.len() {
            return Err(Error::HuffmanValuesMismatch(num_symbols, values.len()));
        }

        let mut table = HuffmanTable {
            values: [0; 256],
            max_code: [0; MAX_CODE_SENTINEL + 1],
            val_offset: [0; MAX_CODE_SENTINEL + 2],
            lookahead_size: [SLOW_BITS as u8; 1 << LOOKUP_BITS],
            lookahead_value: [0; 1 << LOOKUP_BITS],
        };
        table.values[..num_symbols].copy_from_slice(&values[..num_symbols]);

        // Canonical code assignment (T.81 C.2).
        let mut codes = [0u32; 256];
        let mut code = 0u32;
        let mut p = 0;
        for length in 1..=MAX_CODE_LENGTH {
            for _ in 0..counts[length - 1] {
                codes[p] = code;
                code += 1;
                p += 1;
            }
            if code >= 1 << length {
                return Err(Error::BadHuffmanTable);
            }
            code <<= 1;
        }

        // Decoding tables for the bit-serial path (T.81 F.15).
        p = 0;
        for length in 1..=MAX_CODE_LENGTH {
            let count = counts[length - 1] as usize;
            if count == 0 {
                continue;
            }
            table.val_offset[length] = p as i32 - codes[p] as i32;
            p += count;
            let shift = REGISTER_SIZE - length;
            table.max_code[length] = ((codes[p - 1] as u64) << shift) | ((1u64 << shift) - 1);
        }
        table.max_code[MAX_CODE_SENTINEL] = u64::MAX;

        // Lookahead tables.
        p = 0;
        for length in 1..=LOOKUP_BITS {
            let shift = LOOKUP_BITS - length;
            for _ in 0..counts[length - 1] {
                let first = (codes[p] << shift) as usize;
                for index in first..first + (1 << shift) {
                    table.lookahead_size[index] = length as u8;
                    table.lookahead_value[index] = table.values[p];
                }
                p += 1;
            }
        }

        Ok(table)
    }
}

/// The Huffman tables installed by DHT segments, by class and destination.
#[derive(Debug, Default)]
pub struct HuffmanTables {
    dc: [Option<HuffmanTable>; NUM_TABLE_DESTINATIONS],
    ac: [Option<HuffmanTable>; NUM_TABLE_DESTINATIONS],
}

impl HuffmanTables {
    /// Builds and installs a table, replacing any table at the same slot.
    pub fn define(&mut self, spec: &HuffmanCodeSpec) -> Result<()> {
        let destination = check_destination(spec.destination)?;
        let table = HuffmanTable::new(&spec.counts, &spec.values)?;
        debug!(class = ?spec.class, destination, ?table, "defining Huffman table");
        match spec.class {
            TableClass::Dc => self.dc[destination] = Some(table),
            TableClass::Ac => self.ac[destination] = Some(table),
        }
        Ok(())
    }

    pub fn get(&self, class: TableClass, destination: u8) -> Result<&HuffmanTable> {
        let slots = match class {
            TableClass::Dc => &self.dc,
            TableClass::Ac => &self.ac,
        };
        slots
            .get(destination as usize)
            .and_then(|t| t.as_ref())
            .ok_or(Error::MissingHuffmanTable(class, destination))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        bit_reader::BitReader,
        util::test::{HuffmanBitWriter, canonical_codes, random_huffman_spec},
    };
    use rand::SeedableRng;
    use test_log::test;

    fn counts(lengths: &[(usize, u8)]) -> [u8; 16] {
        let mut counts = [0u8; 16];
        for &(length, count) in lengths {
            counts[length - 1] = count;
        }
        counts
    }

    #[test]
    fn rejects_overfull_code_space() {
        // Three codes of length 1 do not fit.
        let result = HuffmanTable::new(&counts(&[(1, 3)]), &[0, 1, 2]);
        assert!(matches!(result, Err(Error::BadHuffmanTable)));
        // Two codes of length 1 would require the all-ones code.
        let result = HuffmanTable::new(&counts(&[(1, 2)]), &[0, 1]);
        assert!(matches!(result, Err(Error::BadHuffmanTable)));
    }

    #[test]
    fn rejects_missing_values() {
        let result = HuffmanTable::new(&counts(&[(2, 3)]), &[0, 1]);
        assert!(matches!(result, Err(Error::HuffmanValuesMismatch(3, 2))));
    }

    #[test]
    fn decodes_short_and_long_codes() -> Result<()> {
        // 00, 01, 100, then a run of long codes down to 16 bits.
        let mut c = counts(&[(2, 2), (3, 1)]);
        for length in 9..=16 {
            c[length - 1] = 1;
        }
        let values: Vec<u8> = (0..11).map(|v| v * 7).collect();
        let table = HuffmanTable::new(&c, &values)?;
        let codes = canonical_codes(&c, &values);
        let mut writer = HuffmanBitWriter::new();
        for &v in values.iter().rev() {
            let (code, length) = codes[v as usize].unwrap();
            writer.write_bits(code as u32, length);
        }
        let data = writer.finish();
        let mut br = BitReader::new(&data, 0);
        for &v in values.iter().rev() {
            assert_eq!(br.decode_huffman(&table)?, v);
        }
        Ok(())
    }

    #[test]
    fn sentinel_reports_bad_code() -> Result<()> {
        // Only one code: 0 (length 1). All ones is not a valid prefix.
        let table = HuffmanTable::new(&counts(&[(1, 1)]), &[42])?;
        let data = [0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00];
        let mut br = BitReader::new(&data, 0);
        assert!(matches!(
            br.decode_huffman(&table),
            Err(Error::BadHuffmanCode)
        ));
        Ok(())
    }

    #[test]
    fn prefix_free_roundtrip() {
        arbtest::arbtest(|u| {
            let seed: u64 = u.arbitrary()?;
            let mut rng = rand_xorshift::XorShiftRng::seed_from_u64(seed);
            let spec = random_huffman_spec(&mut rng, TableClass::Ac, 0);
            let table = HuffmanTable::new(&spec.counts, &spec.values).unwrap();
            let codes = canonical_codes(&spec.counts, &spec.values);

            let num_symbols: usize = u.int_in_range(1..=200)?;
            let mut symbols = vec![];
            let mut writer = HuffmanBitWriter::new();
            for _ in 0..num_symbols {
                let v = *u.choose(&spec.values)?;
                let (code, length) = codes[v as usize].unwrap();
                writer.write_bits(code as u32, length);
                symbols.push(v);
            }
            let data = writer.finish();
            let mut br = BitReader::new(&data, 0);
            for v in symbols {
                assert_eq!(br.decode_huffman(&table).unwrap(), v);
            }
            assert!(!br.has_bad_marker());
            Ok(())
        });
    }

    #[test]
    fn tables_by_slot() -> Result<()> {
        let mut tables = HuffmanTables::default();
        assert!(matches!(
            tables.get(TableClass::Dc, 1),
            Err(Error::MissingHuffmanTable(TableClass::Dc, 1))
        ));
        tables.define(&HuffmanCodeSpec {
            class: TableClass::Dc,
            destination: 1,
            counts: counts(&[(2, 1)]),
            values: vec![7],
        })?;
        assert!(tables.get(TableClass::Dc, 1).is_ok());
        assert!(tables.get(TableClass::Ac, 1).is_err());
        assert!(
            tables
                .define(&HuffmanCodeSpec {
                    class: TableClass::Ac,
                    destination: 4,
                    counts: counts(&[(2, 1)]),
                    values: vec![7],
                })
                .is_err()
        );
        Ok(())
    }
}
