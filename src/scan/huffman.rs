// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    api::ScanDecoderOptions,
    bit_reader::BitReader,
    block::{BLOCK_SIZE, Block8x8},
    entropy_coding::{
        TableClass,
        huffman::{HuffmanCodeSpec, HuffmanTable, HuffmanTables},
    },
    error::{Error, Result},
    frame::{EntropyCoding, JpegFrame},
    scan::{
        BlockDecoder, BlockKind, ComponentState, ScanInfo, ScanOutcome, SpectralConverter,
        walk_scan,
    },
    util::tracing_wrappers::*,
};

/// Largest DC difference category (T.81 Table F.1, 12-bit samples).
const MAX_DC_CATEGORY: usize = 15;

/// Decodes the scans of a Huffman-coded frame (T.81 F.2.2 and G.2).
#[derive(Debug, Default)]
pub struct HuffmanScanDecoder {
    tables: HuffmanTables,
    options: ScanDecoderOptions,
}

impl HuffmanScanDecoder {
    pub fn new(options: ScanDecoderOptions) -> Self {
        Self {
            tables: HuffmanTables::default(),
            options,
        }
    }

    pub fn define_huffman_table(&mut self, spec: &HuffmanCodeSpec) -> Result<()> {
        self.tables.define(spec)
    }

    pub fn inject_frame_data(
        &mut self,
        frame: &JpegFrame,
        converter: &mut dyn SpectralConverter,
    ) -> Result<()> {
        if frame.coding() != EntropyCoding::Huffman {
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
        if frame.coding() != EntropyCoding::Huffman {
            return Err(Error::CodingMismatch);
        }
        let mode = scan.prepare(frame, &self.options.limits)?;
        let kind = BlockKind::select(frame, scan);
        let mut selected = Vec::with_capacity(scan.components.len());
        for sc in scan.components.iter() {
            let dc = if kind.uses_dc_table() {
                Some(self.tables.get(TableClass::Dc, sc.dc_table_id)?)
            } else {
                None
            };
            let ac = if kind.uses_ac_table() {
                Some(self.tables.get(TableClass::Ac, sc.ac_table_id)?)
            } else {
                None
            };
            selected.push(SelectedTables { dc, ac });
        }
        let mut decoder = HuffmanBlockDecoder {
            tables: selected,
            kind,
            ss: scan.ss as usize,
            se: scan.se as usize,
            al: scan.al as u32,
            eobrun: 0,
        };
        let mut reader = BitReader::new(data, position)
            .with_max_starved_fills(self.options.max_starved_fills);
        let outcome = walk_scan(
            &mut decoder,
            mode,
            frame,
            &mut reader,
            scan,
            &self.options,
            converter,
        )?;
        if decoder.eobrun > 0 {
            trace!(eobrun = decoder.eobrun, "end-of-band run left at end of scan");
        }
        Ok(outcome)
    }
}

struct SelectedTables<'t> {
    dc: Option<&'t HuffmanTable>,
    ac: Option<&'t HuffmanTable>,
}

struct HuffmanBlockDecoder<'t> {
    tables: Vec<SelectedTables<'t>>,
    kind: BlockKind,
    ss: usize,
    se: usize,
    al: u32,
    /// Blocks left in the current end-of-band run.
    eobrun: u32,
}

impl<'t> HuffmanBlockDecoder<'t> {
    fn dc_table(&self, scan_index: usize) -> Result<&'t HuffmanTable> {
        self.tables[scan_index].dc.ok_or(Error::BadHuffmanTable)
    }

    fn ac_table(&self, scan_index: usize) -> Result<&'t HuffmanTable> {
        self.tables[scan_index].ac.ok_or(Error::BadHuffmanTable)
    }
}

impl BlockDecoder for HuffmanBlockDecoder<'_> {
    fn decode_block(
        &mut self,
        reader: &mut BitReader,
        scan_index: usize,
        component: ComponentState,
        block: &mut Block8x8,
    ) -> Result<()> {
        match self.kind {
            BlockKind::Sequential => decode_block_sequential(
                reader,
                self.dc_table(scan_index)?,
                self.ac_table(scan_index)?,
                component.dc_predictor,
                block,
            ),
            BlockKind::DcFirst => decode_block_dc_first(
                reader,
                self.dc_table(scan_index)?,
                component.dc_predictor,
                block,
                self.al,
            ),
            BlockKind::DcRefine => {
                if reader.get_bit() != 0 {
                    block[0] |= 1 << self.al;
                }
                Ok(())
            }
            BlockKind::AcFirst => {
                let table = self.ac_table(scan_index)?;
                decode_block_ac_first(reader, table, &mut self.eobrun, block, self.ss, self.se, self.al)
            }
            BlockKind::AcRefine => {
                let table = self.ac_table(scan_index)?;
                decode_block_ac_refine(reader, table, &mut self.eobrun, block, self.ss, self.se, self.al)
            }
        }
    }

    fn restart(&mut self, _frame: &mut JpegFrame) -> Result<()> {
        self.eobrun = 0;
        Ok(())
    }
}

/// Decodes a DC difference and adds it to the predictor.
fn decode_dc_diff(reader: &mut BitReader, table: &HuffmanTable, predictor: &mut i32) -> Result<()> {
    let category = reader.decode_huffman(table)? as usize;
    if category > MAX_DC_CATEGORY {
        return Err(Error::BadHuffmanCode);
    }
    let diff = reader.receive_extend(category);
    *predictor = predictor.wrapping_add(diff);
    Ok(())
}

fn decode_block_sequential(
    reader: &mut BitReader,
    dc: &HuffmanTable,
    ac: &HuffmanTable,
    predictor: &mut i32,
    block: &mut Block8x8,
) -> Result<()> {
    decode_dc_diff(reader, dc, predictor)?;
    block[0] = *predictor as i16;

    let mut k = 1;
    while k < BLOCK_SIZE {
        let rs = reader.decode_huffman(ac)?;
        let (r, s) = ((rs >> 4) as usize, (rs & 15) as usize);
        if s != 0 {
            k += r;
            *block.zigzag_mut(k) = reader.receive_extend(s) as i16;
            k += 1;
        } else if r == 15 {
            k += 16;
        } else {
            break;
        }
    }
    Ok(())
}

fn decode_block_dc_first(
    reader: &mut BitReader,
    dc: &HuffmanTable,
    predictor: &mut i32,
    block: &mut Block8x8,
    al: u32,
) -> Result<()> {
    decode_dc_diff(reader, dc, predictor)?;
    block[0] = (*predictor << al) as i16;
    Ok(())
}

fn decode_block_ac_first(
    reader: &mut BitReader,
    ac: &HuffmanTable,
    eobrun: &mut u32,
    block: &mut Block8x8,
    ss: usize,
    se: usize,
    al: u32,
) -> Result<()> {
    if *eobrun > 0 {
        *eobrun -= 1;
        return Ok(());
    }
    let mut k = ss;
    while k <= se {
        let rs = reader.decode_huffman(ac)?;
        let (r, s) = ((rs >> 4) as usize, (rs & 15) as usize);
        k += r;
        if s != 0 {
            *block.zigzag_mut(k) = (reader.receive_extend(s) << al) as i16;
        } else if r != 15 {
            // EOBr: this block ends the run.
            *eobrun = read_eobrun(reader, r) - 1;
            break;
        }
        k += 1;
    }
    Ok(())
}

/// Length of an end-of-band run coded with run length `r` (T.81 G.1.2.2).
fn read_eobrun(reader: &mut BitReader, r: usize) -> u32 {
    let mut run = 1 << r;
    if r != 0 {
        run += reader.get_bits(r);
    }
    run
}

/// Appends a correction bit to a coefficient that is already nonzero.
fn refine_nonzero(reader: &mut BitReader, coef: &mut i16, p1: i16, m1: i16) {
    if reader.get_bit() != 0 && (*coef & p1) == 0 {
        *coef = coef.wrapping_add(if *coef >= 0 { p1 } else { m1 });
    }
}

fn decode_block_ac_refine(
    reader: &mut BitReader,
    ac: &HuffmanTable,
    eobrun: &mut u32,
    block: &mut Block8x8,
    ss: usize,
    se: usize,
    al: u32,
) -> Result<()> {
    let p1: i16 = 1 << al;
    let m1: i16 = -1 << al;
    let mut k = ss;
    if *eobrun == 0 {
        while k <= se {
            let rs = reader.decode_huffman(ac)?;
            let (mut r, s) = ((rs >> 4) as i32, rs & 15);
            let mut value = 0;
            if s != 0 {
                if s != 1 {
                    return Err(Error::BadHuffmanCode);
                }
                value = if reader.get_bit() != 0 { p1 } else { m1 };
            } else if r != 15 {
                *eobrun = read_eobrun(reader, r as usize);
                break;
            }
            // Skip r zero coefficients, refining the nonzero ones on the way.
            while k <= se {
                let coef = block.zigzag_mut(k);
                if *coef != 0 {
                    refine_nonzero(reader, coef, p1, m1);
                } else {
                    r -= 1;
                    if r < 0 {
                        break;
                    }
                }
                k += 1;
            }
            if value != 0 {
                *block.zigzag_mut(k) = value;
            }
            k += 1;
        }
    }
    if *eobrun > 0 {
        while k <= se {
            let coef = block.zigzag_mut(k);
            if *coef != 0 {
                refine_nonzero(reader, coef, p1, m1);
            }
            k += 1;
        }
        *eobrun -= 1;
    }
    Ok(())
}
