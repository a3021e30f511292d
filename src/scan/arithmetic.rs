// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    api::ScanDecoderOptions,
    bit_reader::BitReader,
    block::Block8x8,
    entropy_coding::{
        NUM_TABLE_DESTINATIONS, TableClass,
        arithmetic::{
            AC_HIGH_MAGNITUDE_BIN, AC_LOW_MAGNITUDE_BIN, ArithmeticDecodingTable,
            ArithmeticStatistics, ArithmeticTables, DC_MAGNITUDE_BIN, FIXED_BIN_STATE, QmDecoder,
        },
    },
    error::{Error, Result},
    frame::{ArithmeticComponent, ComponentCoding, EntropyCoding, JpegFrame},
    scan::{
        BlockDecoder, BlockKind, ComponentState, ScanInfo, ScanOutcome, SpectralConverter,
        walk_scan,
    },
    util::tracing_wrappers::*,
};

/// Magnitude categories above this overflow a 16-bit coefficient.
const MAGNITUDE_OVERFLOW: i32 = 0x8000;

/// Decodes the scans of an arithmetic-coded frame (T.81 F.2.4 and G.2).
///
/// Statistics are owned by the decoder, one DC and one AC table per
/// destination; components refer to them by index.
#[derive(Debug)]
pub struct ArithmeticScanDecoder {
    tables: ArithmeticTables,
    options: ScanDecoderOptions,
    dc_statistics: [ArithmeticStatistics; NUM_TABLE_DESTINATIONS],
    ac_statistics: [ArithmeticStatistics; NUM_TABLE_DESTINATIONS],
    qm: QmDecoder,
}

impl Default for ArithmeticScanDecoder {
    fn default() -> Self {
        Self::new(ScanDecoderOptions::default())
    }
}

impl ArithmeticScanDecoder {
    pub fn new(options: ScanDecoderOptions) -> Self {
        Self {
            tables: ArithmeticTables::default(),
            options,
            dc_statistics: array_init::array_init(|i| {
                ArithmeticStatistics::new(TableClass::Dc, i as u8)
            }),
            ac_statistics: array_init::array_init(|i| {
                ArithmeticStatistics::new(TableClass::Ac, i as u8)
            }),
            qm: QmDecoder::default(),
        }
    }

    pub fn configure_arithmetic_table(
        &mut self,
        class: TableClass,
        destination: u8,
        conditioning: u8,
    ) -> Result<()> {
        self.tables.configure(class, destination, conditioning)
    }

    pub fn inject_frame_data(
        &mut self,
        frame: &JpegFrame,
        converter: &mut dyn SpectralConverter,
    ) -> Result<()> {
        if frame.coding() != EntropyCoding::Arithmetic {
            return Err(Error::CodingMismatch);
        }
        converter.inject_frame_data(frame)
    }

    /// Decodes the entropy-coded segment of `scan`, which starts at
    /// `data[position]`, into the coefficient storage of `frame`.
    pub fn parse_entropy_coded_data(
        &mut self,
        frame: &mut JpegFrame,
        scan: &ScanInfo,
        data: &[u8],
        position: usize,
        converter: &mut dyn SpectralConverter,
    ) -> Result<ScanOutcome> {
        if frame.coding() != EntropyCoding::Arithmetic {
            return Err(Error::CodingMismatch);
        }
        let mode = scan.prepare(frame, &self.options.limits)?;
        let kind = BlockKind::select(frame, scan);
        let mut conditioning = Vec::with_capacity(scan.components.len());
        for sc in scan.components.iter() {
            let dc = if kind.uses_dc_table() {
                *self.tables.get(TableClass::Dc, sc.dc_table_id)?
            } else {
                ArithmeticDecodingTable::new(TableClass::Dc, sc.dc_table_id)
            };
            let ac = if kind.uses_ac_table() {
                *self.tables.get(TableClass::Ac, sc.ac_table_id)?
            } else {
                ArithmeticDecodingTable::new(TableClass::Ac, sc.ac_table_id)
            };
            let state = frame.components[sc.component_index].arithmetic_mut()?;
            state.dc_statistics = kind.uses_dc_table().then_some(sc.dc_table_id as usize);
            state.ac_statistics = kind.uses_ac_table().then_some(sc.ac_table_id as usize);
            conditioning.push((dc, ac));
        }

        let mut decoder = ArithmeticBlockDecoder {
            dc_statistics: &mut self.dc_statistics,
            ac_statistics: &mut self.ac_statistics,
            qm: &mut self.qm,
            fixed_bin: FIXED_BIN_STATE,
            conditioning,
            kind,
            ss: scan.ss as usize,
            se: scan.se as usize,
            al: scan.al as u32,
        };
        decoder.reset_models(frame)?;
        let mut reader = BitReader::new(data, position)
            .with_max_starved_fills(self.options.max_starved_fills);
        walk_scan(
            &mut decoder,
            mode,
            frame,
            &mut reader,
            scan,
            &self.options,
            converter,
        )
    }
}

struct ArithmeticBlockDecoder<'s> {
    dc_statistics: &'s mut [ArithmeticStatistics; NUM_TABLE_DESTINATIONS],
    ac_statistics: &'s mut [ArithmeticStatistics; NUM_TABLE_DESTINATIONS],
    qm: &'s mut QmDecoder,
    fixed_bin: u8,
    /// DC and AC conditioning of each scan component.
    conditioning: Vec<(ArithmeticDecodingTable, ArithmeticDecodingTable)>,
    kind: BlockKind,
    ss: usize,
    se: usize,
    al: u32,
}

impl ArithmeticBlockDecoder<'_> {
    /// Clears the statistics used by the scan's components and restarts the
    /// QM decoder. Called at the start of a scan and at every restart.
    fn reset_models(&mut self, frame: &mut JpegFrame) -> Result<()> {
        for i in 0..frame.component_order.len() {
            let state = frame.components[frame.component_order[i]].arithmetic_mut()?;
            if let Some(table) = state.dc_statistics {
                self.dc_statistics[table].reset();
                state.dc_context = 0;
            }
            if let Some(table) = state.ac_statistics {
                self.ac_statistics[table].reset();
            }
        }
        self.qm.reset();
        Ok(())
    }

    /// Decodes a DC difference (T.81 F.1.4.4.1) and adds it to the
    /// predictor.
    fn decode_dc_diff(
        &mut self,
        reader: &mut BitReader,
        scan_index: usize,
        state: &mut ArithmeticComponent,
        predictor: &mut i32,
    ) -> Result<()> {
        let table = &self.conditioning[scan_index].0;
        let (dc_l, dc_u) = (table.dc_l, table.dc_u);
        let index = state
            .dc_statistics
            .ok_or(Error::MissingArithmeticTable(TableClass::Dc, table.destination))?;
        let stats = &mut self.dc_statistics[index];
        let qm = &mut *self.qm;

        let s0 = state.dc_context;
        if qm.decode(reader, stats.bin_mut(s0)) == 0 {
            state.dc_context = 0;
            return Ok(());
        }
        let sign = qm.decode(reader, stats.bin_mut(s0 + 1)) as usize;
        let mut st = s0 + 2 + sign;
        let mut m = qm.decode(reader, stats.bin_mut(st)) as i32;
        if m != 0 {
            st = DC_MAGNITUDE_BIN;
            while qm.decode(reader, stats.bin_mut(st)) != 0 {
                m <<= 1;
                if m == MAGNITUDE_OVERFLOW {
                    return Err(Error::InvalidArithmeticCode);
                }
                st += 1;
            }
        }

        state.dc_context = if m < (1 << dc_l) >> 1 {
            0
        } else if m > (1 << dc_u) >> 1 {
            12 + sign * 4
        } else {
            4 + sign * 4
        };

        let mut v = m;
        st += 14;
        m >>= 1;
        while m != 0 {
            if qm.decode(reader, stats.bin_mut(st)) != 0 {
                v |= m;
            }
            m >>= 1;
        }
        v += 1;
        if sign != 0 {
            v = -v;
        }
        *predictor = predictor.wrapping_add(v);
        Ok(())
    }

    /// Decodes coefficients `ss..=se` of a sequential block or a first AC
    /// scan (T.81 F.1.4.4.2), scaled by the point transform `al`.
    #[allow(clippy::too_many_arguments)]
    fn decode_ac(
        &mut self,
        reader: &mut BitReader,
        scan_index: usize,
        state: &ArithmeticComponent,
        block: &mut Block8x8,
        ss: usize,
        se: usize,
        al: u32,
    ) -> Result<()> {
        let table = &self.conditioning[scan_index].1;
        let kx = table.ac_kx as usize;
        let index = state
            .ac_statistics
            .ok_or(Error::MissingArithmeticTable(TableClass::Ac, table.destination))?;
        let stats = &mut self.ac_statistics[index];
        let qm = &mut *self.qm;

        let mut k = ss - 1;
        while k < se {
            let mut st = 3 * k;
            // End of block.
            if qm.decode(reader, stats.bin_mut(st)) != 0 {
                break;
            }
            loop {
                k += 1;
                if qm.decode(reader, stats.bin_mut(st + 1)) != 0 {
                    break;
                }
                st += 3;
                if k >= se {
                    return Err(Error::InvalidArithmeticCode);
                }
            }
            let sign = qm.decode(reader, &mut self.fixed_bin);
            st += 2;
            let mut m = qm.decode(reader, stats.bin_mut(st)) as i32;
            if m != 0 && qm.decode(reader, stats.bin_mut(st)) != 0 {
                m <<= 1;
                st = if k <= kx {
                    AC_LOW_MAGNITUDE_BIN
                } else {
                    AC_HIGH_MAGNITUDE_BIN
                };
                while qm.decode(reader, stats.bin_mut(st)) != 0 {
                    m <<= 1;
                    if m == MAGNITUDE_OVERFLOW {
                        return Err(Error::InvalidArithmeticCode);
                    }
                    st += 1;
                }
            }
            let mut v = m;
            st += 14;
            m >>= 1;
            while m != 0 {
                if qm.decode(reader, stats.bin_mut(st)) != 0 {
                    v |= m;
                }
                m >>= 1;
            }
            v += 1;
            if sign != 0 {
                v = -v;
            }
            *block.zigzag_mut(k) = (v << al) as i16;
        }
        Ok(())
    }

    /// Decodes the correction bits and newly nonzero coefficients of an AC
    /// refinement scan (T.81 G.1.3.3).
    fn decode_ac_refine(
        &mut self,
        reader: &mut BitReader,
        scan_index: usize,
        state: &ArithmeticComponent,
        block: &mut Block8x8,
    ) -> Result<()> {
        let table = &self.conditioning[scan_index].1;
        let index = state
            .ac_statistics
            .ok_or(Error::MissingArithmeticTable(TableClass::Ac, table.destination))?;
        let stats = &mut self.ac_statistics[index];
        let qm = &mut *self.qm;
        let (ss, se) = (self.ss, self.se);
        let p1: i16 = 1 << self.al;
        let m1: i16 = -1 << self.al;

        // End of block of the previous stage.
        let mut kex = se;
        while kex > 0 && block.zigzag(kex) == 0 {
            kex -= 1;
        }

        let mut k = ss - 1;
        while k < se {
            let mut st = 3 * k;
            if k >= kex && qm.decode(reader, stats.bin_mut(st)) != 0 {
                break;
            }
            loop {
                k += 1;
                let coef = block.zigzag_mut(k);
                if *coef != 0 {
                    if qm.decode(reader, stats.bin_mut(st + 2)) != 0 {
                        *coef = coef.wrapping_add(if *coef < 0 { m1 } else { p1 });
                    }
                    break;
                }
                if qm.decode(reader, stats.bin_mut(st + 1)) != 0 {
                    *coef = if qm.decode(reader, &mut self.fixed_bin) != 0 {
                        m1
                    } else {
                        p1
                    };
                    break;
                }
                st += 3;
                if k >= se {
                    return Err(Error::InvalidArithmeticCode);
                }
            }
        }
        Ok(())
    }
}

impl BlockDecoder for ArithmeticBlockDecoder<'_> {
    fn decode_block(
        &mut self,
        reader: &mut BitReader,
        scan_index: usize,
        component: ComponentState,
        block: &mut Block8x8,
    ) -> Result<()> {
        let ComponentState {
            dc_predictor,
            coding,
        } = component;
        let ComponentCoding::Arithmetic(state) = coding else {
            return Err(Error::CodingMismatch);
        };
        match self.kind {
            BlockKind::Sequential => {
                self.decode_dc_diff(reader, scan_index, state, dc_predictor)?;
                block[0] = *dc_predictor as i16;
                self.decode_ac(reader, scan_index, state, block, 1, 63, 0)
            }
            BlockKind::DcFirst => {
                self.decode_dc_diff(reader, scan_index, state, dc_predictor)?;
                block[0] = (*dc_predictor << self.al) as i16;
                Ok(())
            }
            BlockKind::DcRefine => {
                if self.qm.decode(reader, &mut self.fixed_bin) != 0 {
                    block[0] |= 1 << self.al;
                }
                Ok(())
            }
            BlockKind::AcFirst => {
                let (ss, se, al) = (self.ss, self.se, self.al);
                self.decode_ac(reader, scan_index, state, block, ss, se, al)
            }
            BlockKind::AcRefine => self.decode_ac_refine(reader, scan_index, state, block),
        }
    }

    fn restart(&mut self, frame: &mut JpegFrame) -> Result<()> {
        trace!("resetting arithmetic statistics");
        self.reset_models(frame)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        api::DecoderLimits,
        block::BLOCK_SIZE,
        frame::{ComponentInfo, FrameKind},
        scan::{DiscardingConverter, ScanComponent, Termination},
        util::test::ArithmeticEncoder,
    };
    use rand::{Rng, SeedableRng};
    use test_log::test;

    fn frame(kind: FrameKind, width: usize, height: usize, num_components: u8) -> JpegFrame {
        let components: Vec<_> = (0..num_components)
            .map(|id| ComponentInfo {
                id,
                h_samp_factor: 1,
                v_samp_factor: 1,
                quant_idx: 0,
            })
            .collect();
        let mut frame =
            JpegFrame::new(kind, 8, width, height, &components, &DecoderLimits::default())
                .unwrap();
        frame.retain_coefficients = true;
        frame
    }

    fn scan(components: usize, ss: u8, se: u8, ah: u8, al: u8) -> ScanInfo {
        ScanInfo {
            components: (0..components)
                .map(|i| ScanComponent {
                    component_index: i,
                    dc_table_id: i as u8,
                    ac_table_id: i as u8,
                })
                .collect(),
            ss,
            se,
            ah,
            al,
            restart_interval: 0,
        }
    }

    fn random_block(rng: &mut impl Rng, density: f64) -> Block8x8 {
        let mut block = Block8x8::default();
        block[0] = rng.random_range(-1000..=1000);
        for k in 1..BLOCK_SIZE {
            if rng.random_bool(density) {
                let magnitude = 1i16 << rng.random_range(0..10u32);
                let v = rng.random_range(1..=magnitude);
                *block.zigzag_mut(k) = if rng.random_bool(0.5) { v } else { -v };
            }
        }
        block
    }

    #[test]
    fn sequential_roundtrip() -> Result<()> {
        let mut rng = rand_xorshift::XorShiftRng::seed_from_u64(7);
        let (width, height) = (24, 16);
        let blocks: Vec<Block8x8> = (0..6).map(|_| random_block(&mut rng, 0.3)).collect();

        let mut encoder = ArithmeticEncoder::new();
        encoder.set_dc_conditioning(1, 3);
        encoder.set_ac_conditioning(10);
        for block in blocks.iter() {
            encoder.encode_sequential(0, block);
        }
        let data = encoder.finish();

        let mut frame = frame(FrameKind::ExtendedArithmetic, width, height, 1);
        let mut decoder = ArithmeticScanDecoder::default();
        decoder.configure_arithmetic_table(TableClass::Dc, 0, 0x31)?;
        decoder.configure_arithmetic_table(TableClass::Ac, 0, 10)?;
        let outcome = decoder.parse_entropy_coded_data(
            &mut frame,
            &scan(1, 0, 63, 0, 0),
            &data,
            0,
            &mut DiscardingConverter,
        )?;
        assert_eq!(outcome.termination, Termination::Completed);
        let grid = frame.components[0].spectral_blocks().unwrap();
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(grid.block(i % 3, i / 3), block, "block {i}");
        }
        Ok(())
    }

    #[test]
    fn sequential_ignores_point_transform() -> Result<()> {
        let mut block = Block8x8::default();
        block[0] = 12;
        *block.zigzag_mut(1) = -3;
        *block.zigzag_mut(9) = 5;
        let mut encoder = ArithmeticEncoder::new();
        encoder.encode_sequential(0, &block);
        let data = encoder.finish();

        // Al is only meaningful in progressive scans.
        let mut frame = frame(FrameKind::ExtendedArithmetic, 8, 8, 1);
        let outcome = ArithmeticScanDecoder::default().parse_entropy_coded_data(
            &mut frame,
            &scan(1, 0, 63, 0, 2),
            &data,
            0,
            &mut DiscardingConverter,
        )?;
        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(frame.components[0].spectral_blocks().unwrap().block(0, 0), &block);
        Ok(())
    }

    #[test]
    fn restarts_reset_statistics() -> Result<()> {
        let mut rng = rand_xorshift::XorShiftRng::seed_from_u64(5);
        let blocks: Vec<Block8x8> = (0..3).map(|_| random_block(&mut rng, 0.4)).collect();

        // One block per interval, RST0 and RST1 in between.
        let mut encoder = ArithmeticEncoder::new();
        let mut data = vec![];
        for (i, block) in blocks.iter().enumerate() {
            encoder.encode_sequential(0, block);
            data.extend(encoder.finish_interval());
            if i + 1 < blocks.len() {
                data.extend([0xFF, 0xD0 + i as u8]);
            }
        }
        let eoi = data.len();
        data.extend([0xFF, 0xD9]);

        let mut frame = frame(FrameKind::ExtendedArithmetic, 24, 8, 1);
        let mut decoder = ArithmeticScanDecoder::default();
        let mut scan = scan(1, 0, 63, 0, 0);
        scan.restart_interval = 1;
        let outcome =
            decoder.parse_entropy_coded_data(&mut frame, &scan, &data, 0, &mut DiscardingConverter)?;
        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(outcome.position, eoi);
        let grid = frame.components[0].spectral_blocks().unwrap();
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(grid.block(i, 0), block, "block {i}");
        }
        Ok(())
    }

    #[test]
    fn progressive_roundtrip() -> Result<()> {
        let mut rng = rand_xorshift::XorShiftRng::seed_from_u64(11);
        let blocks: Vec<Block8x8> = (0..4).map(|_| random_block(&mut rng, 0.2)).collect();
        let al = 1;
        let mut frame = frame(FrameKind::ProgressiveArithmetic, 32, 8, 1);
        let mut decoder = ArithmeticScanDecoder::default();

        // DC first at Al=1, then the DC refinement bit.
        let mut encoder = ArithmeticEncoder::new();
        for block in blocks.iter() {
            encoder.encode_dc_first(block[0] >> al);
        }
        decoder.parse_entropy_coded_data(
            &mut frame,
            &scan(1, 0, 0, 0, al),
            &encoder.finish(),
            0,
            &mut DiscardingConverter,
        )?;
        let mut encoder = ArithmeticEncoder::new();
        for block in blocks.iter() {
            encoder.encode_refinement_bit(((block[0] >> (al - 1)) & 1) as u8);
        }
        decoder.parse_entropy_coded_data(
            &mut frame,
            &scan(1, 0, 0, 1, 0),
            &encoder.finish(),
            0,
            &mut DiscardingConverter,
        )?;

        // AC first over two bands at full precision.
        for (ss, se) in [(1, 5), (6, 63)] {
            let mut encoder = ArithmeticEncoder::new();
            for block in blocks.iter() {
                encoder.encode_ac_first(block, ss, se);
            }
            let outcome = decoder.parse_entropy_coded_data(
                &mut frame,
                &scan(1, ss as u8, se as u8, 0, 0),
                &encoder.finish(),
                0,
                &mut DiscardingConverter,
            )?;
            assert_eq!(outcome.termination, Termination::Completed);
        }

        let grid = frame.components[0].spectral_blocks().unwrap();
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(grid.block(i, 0), block, "block {i}");
        }
        Ok(())
    }

    #[test]
    fn ac_refinement_roundtrip() -> Result<()> {
        let mut rng = rand_xorshift::XorShiftRng::seed_from_u64(3);
        let blocks: Vec<Block8x8> = (0..2).map(|_| random_block(&mut rng, 0.4)).collect();
        let mut frame = frame(FrameKind::ProgressiveArithmetic, 16, 8, 1);
        let mut decoder = ArithmeticScanDecoder::default();

        // First pass at Al=1, refined to full precision. Coefficients are
        // divided with rounding towards zero.
        let coarse: Vec<Block8x8> = blocks
            .iter()
            .map(|b| {
                let mut c = Block8x8::default();
                for k in 1..BLOCK_SIZE {
                    let v = b.zigzag(k);
                    *c.zigzag_mut(k) = if v < 0 { -(-v >> 1) } else { v >> 1 };
                }
                c
            })
            .collect();
        let mut encoder = ArithmeticEncoder::new();
        for block in coarse.iter() {
            encoder.encode_ac_first(block, 1, 63);
        }
        decoder.parse_entropy_coded_data(
            &mut frame,
            &scan(1, 1, 63, 0, 1),
            &encoder.finish(),
            0,
            &mut DiscardingConverter,
        )?;
        let mut encoder = ArithmeticEncoder::new();
        for block in blocks.iter() {
            encoder.encode_ac_refine(block, 1, 63, 0);
        }
        decoder.parse_entropy_coded_data(
            &mut frame,
            &scan(1, 1, 63, 1, 0),
            &encoder.finish(),
            0,
            &mut DiscardingConverter,
        )?;

        let grid = frame.components[0].spectral_blocks().unwrap();
        for (i, block) in blocks.iter().enumerate() {
            for k in 1..BLOCK_SIZE {
                assert_eq!(grid.block(i, 0).zigzag(k), block.zigzag(k), "block {i} k {k}");
            }
        }
        Ok(())
    }

    #[test]
    fn statistics_follow_scan_tables() -> Result<()> {
        let mut frame = frame(FrameKind::ExtendedArithmetic, 8, 8, 2);
        let mut decoder = ArithmeticScanDecoder::default();
        let mut s = scan(2, 0, 63, 0, 0);
        s.components[1].dc_table_id = 3;
        let mut encoder = ArithmeticEncoder::with_components(2);
        encoder.encode_sequential(0, &Block8x8::default());
        let mut block = Block8x8::default();
        block[0] = -3;
        encoder.encode_sequential(1, &block);
        let data = encoder.finish();
        let outcome =
            decoder.parse_entropy_coded_data(&mut frame, &s, &data, 0, &mut DiscardingConverter)?;
        assert_eq!(outcome.termination, Termination::Completed);
        let grid = frame.components[1].spectral_blocks().unwrap();
        assert_eq!(grid.block(0, 0)[0], -3);
        let ComponentCoding::Arithmetic(state) = &frame.components[1].coding else {
            panic!("arithmetic frame with Huffman component");
        };
        assert_eq!(state.dc_statistics, Some(3));
        assert_eq!(state.ac_statistics, Some(1));

        s.components[0].ac_table_id = 4;
        assert!(matches!(
            decoder.parse_entropy_coded_data(&mut frame, &s, &data, 0, &mut DiscardingConverter),
            Err(Error::MissingArithmeticTable(TableClass::Ac, 4))
        ));
        Ok(())
    }

    #[test]
    fn rejects_huffman_frame() {
        let mut frame = frame(FrameKind::Baseline, 8, 8, 1);
        assert!(matches!(
            ArithmeticScanDecoder::default().parse_entropy_coded_data(
                &mut frame,
                &scan(1, 0, 63, 0, 0),
                &[0],
                0,
                &mut DiscardingConverter
            ),
            Err(Error::CodingMismatch)
        ));
    }
}
