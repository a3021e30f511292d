// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Scan parameters and the MCU traversal shared by both entropy decoders.

use crate::{
    api::{CancellationToken, DecoderLimits, ScanDecoderOptions},
    bit_reader::{BitReader, NO_MARKER},
    block::Block8x8,
    entropy_coding::{TableClass, huffman::HuffmanCodeSpec},
    error::{Error, Result},
    frame::{BlockGrid, ComponentCoding, EntropyCoding, JpegComponent, JpegFrame, MAX_COMPONENTS},
    util::tracing_wrappers::*,
};

pub mod arithmetic;
pub mod converter;
pub mod huffman;

pub use arithmetic::ArithmeticScanDecoder;
pub use converter::{DiscardingConverter, SpectralConverter};
pub use huffman::HuffmanScanDecoder;

/// Largest successive approximation bit position.
pub const MAX_SUCCESSIVE_LOW: u8 = 13;

/// A component taking part in a scan, with its table selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanComponent {
    /// Index of the component in the frame header.
    pub component_index: usize,
    pub dc_table_id: u8,
    pub ac_table_id: u8,
}

/// The parameters of one SOS segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanInfo {
    pub components: Vec<ScanComponent>,
    /// Spectral selection start `Ss`.
    pub ss: u8,
    /// Spectral selection end `Se`.
    pub se: u8,
    /// Successive approximation high bit `Ah`.
    pub ah: u8,
    /// Successive approximation low bit `Al`.
    pub al: u8,
    /// Restart interval in MCUs, 0 if restarts are disabled.
    pub restart_interval: usize,
}

impl ScanInfo {
    /// A sequential scan over the given components.
    pub fn sequential(components: Vec<ScanComponent>, restart_interval: usize) -> Self {
        Self {
            components,
            ss: 0,
            se: 63,
            ah: 0,
            al: 0,
            restart_interval,
        }
    }

    fn validate_components(&self, frame: &JpegFrame) -> Result<()> {
        let n = self.components.len();
        if n == 0 || n > MAX_COMPONENTS {
            return Err(Error::InvalidScanComponentCount(n));
        }
        for (i, c) in self.components.iter().enumerate() {
            if c.component_index >= frame.components.len()
                || self.components[..i]
                    .iter()
                    .any(|o| o.component_index == c.component_index)
            {
                return Err(Error::InvalidScanComponent(c.component_index));
            }
        }
        Ok(())
    }

    /// Checks the progression parameters against T.81 G.1.1.1.
    pub fn validate_progression(&self) -> Result<()> {
        let (ss, se, ah, al) = (self.ss, self.se, self.ah, self.al);
        let bad = if ss == 0 {
            se != 0
        } else {
            se < ss || se > 63 || self.components.len() != 1
        };
        if bad || (ah != 0 && ah.wrapping_sub(1) != al) || al > MAX_SUCCESSIVE_LOW {
            return Err(Error::BadProgressiveScan(ss, se, ah, al));
        }
        Ok(())
    }

    /// Validates the scan against `frame`, selects the traversal mode and
    /// prepares the frame's components for decoding.
    pub(crate) fn prepare(&self, frame: &mut JpegFrame, limits: &DecoderLimits) -> Result<ScanMode> {
        self.validate_components(frame)?;
        if frame.is_progressive() {
            self.validate_progression()?;
        } else if self.components.len() != frame.components.len() {
            frame.multi_scan = true;
        }
        frame.component_order = self.components.iter().map(|c| c.component_index).collect();
        for sc in self.components.iter() {
            let component = &mut frame.components[sc.component_index];
            component.dc_table_id = sc.dc_table_id;
            component.ac_table_id = sc.ac_table_id;
            component.dc_predictor = 0;
        }
        frame.allocate_components(limits)?;
        let mode = ScanMode::select(frame, self);
        debug!(
            ?mode,
            components = ?frame.component_order,
            ss = self.ss,
            se = self.se,
            ah = self.ah,
            al = self.al,
            restart_interval = self.restart_interval,
            "starting scan"
        );
        Ok(mode)
    }
}

/// How a scan's blocks are laid out in the entropy-coded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Several components, MCUs of `h x v` blocks per component.
    BaselineInterleaved,
    /// The only component of the frame, converted row by row.
    BaselineSingleComponent,
    /// One of several components of a frame, kept for the whole frame.
    BaselineNonInterleaved,
    ProgressiveInterleavedDc,
    ProgressiveNonInterleavedDc,
    ProgressiveAc,
}

impl ScanMode {
    pub fn select(frame: &JpegFrame, scan: &ScanInfo) -> ScanMode {
        let single = scan.components.len() == 1;
        match (frame.is_progressive(), single) {
            (false, false) => ScanMode::BaselineInterleaved,
            (false, true) if frame.components.len() == 1 => ScanMode::BaselineSingleComponent,
            (false, true) => ScanMode::BaselineNonInterleaved,
            (true, false) => ScanMode::ProgressiveInterleavedDc,
            (true, true) if scan.ss == 0 => ScanMode::ProgressiveNonInterleavedDc,
            (true, true) => ScanMode::ProgressiveAc,
        }
    }

    pub fn is_progressive(self) -> bool {
        matches!(
            self,
            ScanMode::ProgressiveInterleavedDc
                | ScanMode::ProgressiveNonInterleavedDc
                | ScanMode::ProgressiveAc
        )
    }
}

/// The coefficients a scan codes for each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    /// DC and all AC coefficients.
    Sequential,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

impl BlockKind {
    pub(crate) fn select(frame: &JpegFrame, scan: &ScanInfo) -> BlockKind {
        match (frame.is_progressive(), scan.ss == 0, scan.ah == 0) {
            (false, _, _) => BlockKind::Sequential,
            (true, true, true) => BlockKind::DcFirst,
            (true, true, false) => BlockKind::DcRefine,
            (true, false, true) => BlockKind::AcFirst,
            (true, false, false) => BlockKind::AcRefine,
        }
    }

    pub(crate) fn uses_dc_table(self) -> bool {
        matches!(self, BlockKind::Sequential | BlockKind::DcFirst)
    }

    pub(crate) fn uses_ac_table(self) -> bool {
        matches!(
            self,
            BlockKind::Sequential | BlockKind::AcFirst | BlockKind::AcRefine
        )
    }
}

/// Why decoding of a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every MCU of the scan was decoded.
    Completed,
    /// A marker other than the expected restart marker was found.
    UnexpectedMarker(u8),
    /// The entropy-coded data ended early.
    EndOfData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Byte offset at which marker parsing resumes.
    pub position: usize,
    pub termination: Termination,
}

/// The parts of a component a block decoder may update.
pub(crate) struct ComponentState<'a> {
    pub dc_predictor: &'a mut i32,
    pub coding: &'a mut ComponentCoding,
}

impl ComponentState<'_> {
    fn reborrow(&mut self) -> ComponentState<'_> {
        ComponentState {
            dc_predictor: &mut *self.dc_predictor,
            coding: &mut *self.coding,
        }
    }
}

/// Entropy decoding of single blocks, driven by [`walk_scan`].
pub(crate) trait BlockDecoder {
    /// Decodes one block of the `scan_index`-th component of the scan.
    fn decode_block(
        &mut self,
        reader: &mut BitReader,
        scan_index: usize,
        component: ComponentState,
        block: &mut Block8x8,
    ) -> Result<()>;

    /// Resets the decoder-specific state at a restart marker. Predictors and
    /// the bit reader are reset by the caller.
    fn restart(&mut self, frame: &mut JpegFrame) -> Result<()>;
}

enum RestartAction {
    Continue,
    Restarted,
    Stop(Termination),
}

/// Counts MCUs down to the next expected restart marker.
struct RestartCounter {
    interval: usize,
    todo: usize,
    next_index: u8,
}

impl RestartCounter {
    fn new(interval: usize) -> Self {
        Self {
            interval,
            todo: interval,
            next_index: 0,
        }
    }

    fn after_mcu(&mut self, reader: &mut BitReader) -> RestartAction {
        if self.interval == 0 {
            return RestartAction::Continue;
        }
        self.todo -= 1;
        if self.todo > 0 {
            return RestartAction::Continue;
        }
        if reader.marker() == NO_MARKER && !reader.find_next_marker() {
            debug!("no restart marker before the end of data");
            return RestartAction::Stop(Termination::EndOfData);
        }
        self.todo = self.interval;
        if !reader.has_restart_marker() {
            warn!(
                marker = reader.marker(),
                position = reader.marker_position(),
                "unexpected marker at restart boundary"
            );
            return RestartAction::Stop(Termination::UnexpectedMarker(reader.marker()));
        }
        let index = reader.marker() - 0xD0;
        if index != self.next_index {
            warn!(
                expected = self.next_index,
                found = index,
                "restart marker out of sequence"
            );
        }
        self.next_index = (index + 1) % 8;
        reader.reset();
        RestartAction::Restarted
    }
}

fn check_cancelled(token: Option<&CancellationToken>) -> Result<()> {
    token.map_or(Ok(()), CancellationToken::check)
}

fn stopped(reader: &BitReader) -> Termination {
    if reader.has_bad_marker() {
        Termination::UnexpectedMarker(reader.marker())
    } else {
        Termination::EndOfData
    }
}

/// Resolves the position at which marker parsing resumes.
fn finish(reader: &mut BitReader, termination: Termination) -> ScanOutcome {
    if reader.marker() == NO_MARKER {
        reader.find_next_marker();
    }
    let position = if reader.marker() != NO_MARKER {
        reader.marker_position()
    } else {
        reader.position()
    };
    trace!(position, ?termination, "scan finished");
    ScanOutcome {
        position,
        termination,
    }
}

/// Splits a component into its block storage and the state a block decoder
/// may update.
fn split_component(component: &mut JpegComponent) -> Result<(&mut BlockGrid, ComponentState<'_>)> {
    let JpegComponent {
        index,
        spectral_blocks,
        dc_predictor,
        coding,
        ..
    } = component;
    let grid = spectral_blocks
        .as_mut()
        .ok_or(Error::InvalidScanComponent(*index))?;
    Ok((grid, ComponentState { dc_predictor, coding }))
}

struct ScanWalker<'a, 'd, D: BlockDecoder> {
    decoder: &'a mut D,
    frame: &'a mut JpegFrame,
    reader: &'a mut BitReader<'d>,
    restart: RestartCounter,
    cancellation_token: Option<&'a CancellationToken>,
}

impl<D: BlockDecoder> ScanWalker<'_, '_, D> {
    fn restart_after_mcu(&mut self) -> Result<Option<Termination>> {
        match self.restart.after_mcu(self.reader) {
            RestartAction::Continue => Ok(None),
            RestartAction::Restarted => {
                trace!("restart");
                for c in self.frame.components.iter_mut() {
                    c.dc_predictor = 0;
                }
                self.decoder.restart(self.frame)?;
                Ok(None)
            }
            RestartAction::Stop(termination) => Ok(Some(termination)),
        }
    }

    /// Decodes the MCU at (`mcu_col`, `mcu_row`). Row-by-row storage holds a
    /// single row of MCUs. Returns false if the data ran out first.
    fn decode_interleaved_mcu(
        &mut self,
        mcu_col: usize,
        mcu_row: usize,
        pipelined: bool,
    ) -> Result<bool> {
        for k in 0..self.frame.component_order.len() {
            let component = &mut self.frame.components[self.frame.component_order[k]];
            let (h, v) = (component.h_samp_factor, component.v_samp_factor);
            let row_base = if pipelined { 0 } else { mcu_row * v };
            let (grid, mut state) = split_component(component)?;
            for y in 0..v {
                let row = grid.row_mut(row_base + y);
                for x in 0..h {
                    if self.reader.no_data() {
                        return Ok(false);
                    }
                    let block = &mut row[mcu_col * h + x];
                    self.decoder
                        .decode_block(self.reader, k, state.reborrow(), block)?;
                }
            }
        }
        Ok(true)
    }

    fn convert_stride(&mut self, converter: &mut dyn SpectralConverter) -> Result<()> {
        converter.convert_stride_baseline(self.frame)?;
        for c in self.frame.components.iter_mut() {
            if let Some(grid) = c.spectral_blocks_mut() {
                grid.clear();
            }
        }
        Ok(())
    }

    fn walk_interleaved(&mut self, converter: &mut dyn SpectralConverter) -> Result<Termination> {
        let pipelined = !self.frame.needs_full_storage();
        if pipelined {
            converter.prepare_for_decoding(self.frame)?;
        }
        let termination = self.walk_interleaved_rows(pipelined, converter)?;
        if pipelined {
            converter.commit_conversion(self.frame)?;
        }
        Ok(termination)
    }

    fn walk_interleaved_rows(
        &mut self,
        pipelined: bool,
        converter: &mut dyn SpectralConverter,
    ) -> Result<Termination> {
        let (mcus_per_line, mcus_per_column) = (self.frame.mcus_per_line, self.frame.mcus_per_column);
        let total = mcus_per_line * mcus_per_column;
        let mut mcu = 0;
        for mcu_row in 0..mcus_per_column {
            check_cancelled(self.cancellation_token)?;
            for mcu_col in 0..mcus_per_line {
                let mut termination = None;
                if !self.decode_interleaved_mcu(mcu_col, mcu_row, pipelined)? {
                    termination = Some(stopped(self.reader));
                } else {
                    mcu += 1;
                    if mcu < total {
                        termination = self.restart_after_mcu()?;
                    }
                }
                if let Some(termination) = termination {
                    debug!(mcu_row, mcu_col, ?termination, "scan stopped early");
                    if pipelined {
                        self.convert_stride(converter)?;
                    }
                    return Ok(termination);
                }
            }
            if pipelined {
                self.convert_stride(converter)?;
            }
        }
        Ok(Termination::Completed)
    }

    /// Decodes the only component of a frame, converting every `v` block
    /// rows.
    fn walk_single_component(&mut self, converter: &mut dyn SpectralConverter) -> Result<Termination> {
        converter.prepare_for_decoding(self.frame)?;
        let termination = self.walk_single_component_rows(converter)?;
        converter.commit_conversion(self.frame)?;
        Ok(termination)
    }

    fn walk_single_component_rows(&mut self, converter: &mut dyn SpectralConverter) -> Result<Termination> {
        let index = self.frame.component_order[0];
        let mcus_per_column = self.frame.mcus_per_column;
        let component = &self.frame.components[index];
        let (width, height, v) = (
            component.width_in_blocks,
            component.height_in_blocks,
            component.v_samp_factor,
        );
        let total = width * height;
        let mut decoded = 0;
        for mcu_row in 0..mcus_per_column {
            check_cancelled(self.cancellation_token)?;
            for y in 0..v {
                if mcu_row * v + y >= height {
                    break;
                }
                for x in 0..width {
                    let mut termination = None;
                    if self.reader.no_data() {
                        termination = Some(stopped(self.reader));
                    } else {
                        let (grid, state) = split_component(&mut self.frame.components[index])?;
                        self.decoder
                            .decode_block(self.reader, 0, state, grid.block_mut(x, y))?;
                        decoded += 1;
                        if decoded < total {
                            termination = self.restart_after_mcu()?;
                        }
                    }
                    if let Some(termination) = termination {
                        debug!(mcu_row, x, y, ?termination, "scan stopped early");
                        self.convert_stride(converter)?;
                        return Ok(termination);
                    }
                }
            }
            self.convert_stride(converter)?;
        }
        Ok(Termination::Completed)
    }

    /// Decodes one component of a frame with full coefficient storage, one
    /// block per MCU.
    fn walk_non_interleaved(&mut self) -> Result<Termination> {
        let index = self.frame.component_order[0];
        let component = &self.frame.components[index];
        let (width, height) = (component.width_in_blocks, component.height_in_blocks);
        let total = width * height;
        let mut decoded = 0;
        for y in 0..height {
            check_cancelled(self.cancellation_token)?;
            for x in 0..width {
                if self.reader.no_data() {
                    let termination = stopped(self.reader);
                    debug!(x, y, ?termination, "scan stopped early");
                    return Ok(termination);
                }
                let (grid, state) = split_component(&mut self.frame.components[index])?;
                self.decoder
                    .decode_block(self.reader, 0, state, grid.block_mut(x, y))?;
                decoded += 1;
                if decoded < total {
                    if let Some(termination) = self.restart_after_mcu()? {
                        return Ok(termination);
                    }
                }
            }
        }
        Ok(Termination::Completed)
    }
}

/// Decodes every block of a prepared scan with `decoder`.
pub(crate) fn walk_scan<D: BlockDecoder>(
    decoder: &mut D,
    mode: ScanMode,
    frame: &mut JpegFrame,
    reader: &mut BitReader,
    scan: &ScanInfo,
    options: &ScanDecoderOptions,
    converter: &mut dyn SpectralConverter,
) -> Result<ScanOutcome> {
    let cancellation_token = options.cancellation_token.as_ref();
    check_cancelled(cancellation_token)?;
    let mut walker = ScanWalker {
        decoder,
        frame,
        reader,
        restart: RestartCounter::new(scan.restart_interval),
        cancellation_token,
    };
    let termination = match mode {
        ScanMode::BaselineInterleaved | ScanMode::ProgressiveInterleavedDc => {
            walker.walk_interleaved(converter)?
        }
        ScanMode::BaselineSingleComponent if !walker.frame.needs_full_storage() => {
            walker.walk_single_component(converter)?
        }
        ScanMode::BaselineSingleComponent
        | ScanMode::BaselineNonInterleaved
        | ScanMode::ProgressiveNonInterleavedDc
        | ScanMode::ProgressiveAc => walker.walk_non_interleaved()?,
    };
    Ok(finish(walker.reader, termination))
}

/// The entropy decoder of a frame, chosen by its SOF marker.
#[derive(Debug)]
pub enum ScanDecoder {
    Huffman(HuffmanScanDecoder),
    Arithmetic(ArithmeticScanDecoder),
}

impl ScanDecoder {
    pub fn for_frame(frame: &JpegFrame, options: ScanDecoderOptions) -> ScanDecoder {
        match frame.coding() {
            EntropyCoding::Huffman => ScanDecoder::Huffman(HuffmanScanDecoder::new(options)),
            EntropyCoding::Arithmetic => {
                ScanDecoder::Arithmetic(ArithmeticScanDecoder::new(options))
            }
        }
    }

    /// Installs a DHT table definition.
    pub fn define_huffman_table(&mut self, spec: &HuffmanCodeSpec) -> Result<()> {
        match self {
            ScanDecoder::Huffman(decoder) => decoder.define_huffman_table(spec),
            ScanDecoder::Arithmetic(_) => Err(Error::CodingMismatch),
        }
    }

    /// Applies a DAC conditioning byte.
    pub fn configure_arithmetic_table(
        &mut self,
        class: TableClass,
        destination: u8,
        conditioning: u8,
    ) -> Result<()> {
        match self {
            ScanDecoder::Arithmetic(decoder) => {
                decoder.configure_arithmetic_table(class, destination, conditioning)
            }
            ScanDecoder::Huffman(_) => Err(Error::CodingMismatch),
        }
    }

    pub fn inject_frame_data(
        &mut self,
        frame: &JpegFrame,
        converter: &mut dyn SpectralConverter,
    ) -> Result<()> {
        match self {
            ScanDecoder::Huffman(decoder) => decoder.inject_frame_data(frame, converter),
            ScanDecoder::Arithmetic(decoder) => decoder.inject_frame_data(frame, converter),
        }
    }

    /// Decodes the entropy-coded segment of `scan` starting at
    /// `data[position]`.
    pub fn parse_entropy_coded_data(
        &mut self,
        frame: &mut JpegFrame,
        scan: &ScanInfo,
        data: &[u8],
        position: usize,
        converter: &mut dyn SpectralConverter,
    ) -> Result<ScanOutcome> {
        match self {
            ScanDecoder::Huffman(decoder) => {
                decoder.parse_entropy_coded_data(frame, scan, data, position, converter)
            }
            ScanDecoder::Arithmetic(decoder) => {
                decoder.parse_entropy_coded_data(frame, scan, data, position, converter)
            }
        }
    }
}
