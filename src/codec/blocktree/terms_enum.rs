// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::codec::blocktree::frame::SegmentTermsFrame;
use crate::codec::blocktree::{
    TermBuffer, OUTPUT_FLAGS_NUM_BITS, OUTPUT_FLAG_HAS_TERMS, OUTPUT_FLAG_IS_FLOOR,
};
use crate::codec::{
    BlockTermState, FieldInfo, PostingIterator, PostingsReader, SeekStatus,
};
use crate::error::ErrorKind::IllegalArgument;
use crate::error::Result;
use crate::store::{ByteArrayDataInput, DataInput, IndexInput};
use crate::util::fst::{
    ByteSequenceOutput, ByteSequenceOutputFactory, Fst, FstArc, Output, OutputFactory,
    ReverseBytesReader,
};
use crate::util::UnsignedShift;

use std::cmp::Ordering;
use std::sync::Arc;

/// Iterates through the terms of one field.
///
/// The cursor walks the field's FST index to the deepest indexed prefix
/// of a target, keeping a stack of block frames (one per prefix length)
/// and an arc stack parallel to the consumed target bytes. Both stacks
/// are retained across seeks so that consecutive targets sharing a
/// prefix reuse the earlier descent.
pub struct SegmentTermsEnum {
    field_info: Arc<FieldInfo>,
    index: Arc<Fst<ByteSequenceOutputFactory>>,
    root_code: Vec<u8>,
    postings_reader: Arc<dyn PostingsReader>,
    terms_in: Arc<dyn IndexInput>,
    /// Lazily cloned view of the terms file; fast misses never touch it.
    input: Option<Box<dyn IndexInput>>,

    /// stack[0] is a sentinel used before any seek (and to hold a term
    /// state imported via `seek_exact_state`); real frames start at 1.
    stack: Vec<SegmentTermsFrame>,
    /// Index of the current frame in the stack, 0 when unpositioned.
    current: usize,

    term: TermBuffer,
    /// Ordinal (sentinel = -1) of the current frame when the running
    /// seek started; reused frames at or below it skip their rewind.
    target_before_current_length: isize,
    /// How many leading bytes of `term` are known reachable through the
    /// FST without IO.
    valid_index_prefix: usize,

    // assert only:
    eof: bool,

    fst_reader: ReverseBytesReader<Arc<Vec<u8>>>,
    arcs: Vec<FstArc<ByteSequenceOutput>>,

    arc_lookups: u64,
}

impl SegmentTermsEnum {
    pub(crate) fn new(
        field_info: Arc<FieldInfo>,
        index: Arc<Fst<ByteSequenceOutputFactory>>,
        root_code: Vec<u8>,
        postings_reader: Arc<dyn PostingsReader>,
        terms_in: Arc<dyn IndexInput>,
    ) -> SegmentTermsEnum {
        let fst_reader = index.bytes_reader();
        let arcs = vec![index.root_arc()];
        let mut state = postings_reader.new_term_state();
        state.total_term_freq = -1;
        let stack = vec![SegmentTermsFrame::new(0, state)];

        SegmentTermsEnum {
            field_info,
            index,
            root_code,
            postings_reader,
            terms_in,
            input: None,
            stack,
            current: 0,
            term: TermBuffer::new(),
            target_before_current_length: 0,
            valid_index_prefix: 0,
            eof: false,
            fst_reader,
            arcs,
            arc_lookups: 0,
        }
    }

    /// The current term. Must not be called once iteration hit the end
    /// of the field.
    #[inline]
    pub fn term(&self) -> &[u8] {
        debug_assert!(!self.eof);
        self.term.term()
    }

    /// True when the cursor points at an exact term (rather than a block
    /// boundary left behind by a failed seek).
    pub fn term_exists(&self) -> bool {
        self.term.exists
    }

    /// Diagnostic: how many FST arc resolutions this cursor performed.
    pub fn arc_lookup_count(&self) -> u64 {
        self.arc_lookups
    }

    fn init_index_input(&mut self) -> Result<()> {
        if self.input.is_none() {
            self.input = Some((*self.terms_in).clone()?);
        }
        Ok(())
    }

    fn get_frame(&mut self, ord: usize) -> usize {
        while self.stack.len() <= ord {
            let next_ord = self.stack.len();
            let mut state = self.postings_reader.new_term_state();
            state.total_term_freq = -1;
            self.stack.push(SegmentTermsFrame::new(next_ord, state));
        }
        debug_assert_eq!(self.stack[ord].ord, ord);
        ord
    }

    fn add_arc(&mut self, arc: FstArc<ByteSequenceOutput>, index: usize) {
        if index < self.arcs.len() {
            self.arcs[index] = arc;
        } else {
            while self.arcs.len() < index {
                self.arcs.push(FstArc::empty());
            }
            self.arcs.push(arc);
        }
    }

    /// Pushes a frame we seek'd to: decodes the block pointer and flags
    /// out of the accumulated FST output.
    fn push_frame_by_data(
        &mut self,
        arc: Option<FstArc<ByteSequenceOutput>>,
        frame_data: &[u8],
        length: usize,
    ) -> Result<usize> {
        let mut scratch = ByteArrayDataInput::new(frame_data);
        let code = scratch.read_vlong()?;
        let fp_seek = code.unsigned_shift(OUTPUT_FLAGS_NUM_BITS);
        let ord = self.get_frame(1 + self.current);
        {
            let frame = &mut self.stack[ord];
            frame.has_terms = (code & OUTPUT_FLAG_HAS_TERMS) != 0;
            frame.has_terms_orig = frame.has_terms;
            frame.is_floor = (code & OUTPUT_FLAG_IS_FLOOR) != 0;
            if frame.is_floor {
                frame.set_floor_data(&mut scratch, frame_data)?;
            }
        }
        self.push_frame_by_fp(arc, fp_seek, length)?;
        Ok(ord)
    }

    /// Pushes a next'd or seek'd frame; the block itself is lazily
    /// loaded only when needed.
    fn push_frame_by_fp(
        &mut self,
        arc: Option<FstArc<ByteSequenceOutput>>,
        fp: i64,
        length: usize,
    ) -> Result<usize> {
        let ord = self.get_frame(1 + self.current);
        let target_before_current_length = self.target_before_current_length;
        let frame = &mut self.stack[ord];
        frame.arc = arc;
        if frame.fp_orig == fp && frame.next_ent != -1 {
            // reuse of a still-loaded frame from an earlier seek
            if frame.prefix as isize > target_before_current_length {
                frame.rewind()?;
            }
            debug_assert_eq!(length, frame.prefix);
        } else {
            frame.next_ent = -1;
            frame.prefix = length;
            frame.state.term_block_ord = 0;
            frame.fp = fp;
            frame.fp_orig = fp;
            frame.last_sub_fp = -1;
        }
        Ok(ord)
    }

    fn load_current_block(&mut self) -> Result<()> {
        self.init_index_input()?;
        let ord = self.current;
        let input = self.input.as_mut().unwrap();
        self.stack[ord].load_block(input.as_mut(), &*self.postings_reader, &self.field_info)
    }

    fn scan_current_to_term(&mut self, target: &[u8], exact_only: bool) -> Result<SeekStatus> {
        let ord = self.current;
        self.stack[ord].scan_to_term(target, exact_only, &mut self.term)
    }

    /// Advances the current frame by one entry; true when it stopped on
    /// a sub-block.
    fn next_current_entry(&mut self) -> Result<bool> {
        let ord = self.current;
        let input = self.input.as_mut().unwrap();
        self.stack[ord].next(
            &mut self.term,
            input.as_mut(),
            &*self.postings_reader,
            &self.field_info,
        )
    }

    fn decode_current_metadata(&mut self) -> Result<()> {
        let ord = self.current;
        self.stack[ord].decode_metadata(&*self.postings_reader, &self.field_info)
    }

    /// Seeks to exactly `target`, returning true when present. When the
    /// FST proves absence (the descent lands on a block carrying no
    /// terms), no terms-file IO happens at all.
    pub fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        self.term.grow(target.len());
        let outputs = ByteSequenceOutputFactory::new();

        self.eof = false;
        let mut arc_idx = 0;
        let mut output;
        let mut target_upto;
        self.target_before_current_length = self.current as isize - 1;

        if self.current != 0 {
            // We are already seek'd; find the common prefix of the new
            // target vs the current term and reuse the corresponding
            // seek state. For example, if the app first seeks to foobar,
            // then seeks to foobaz, we reuse the seek state for the
            // first 5 bytes.
            output = self.arcs[0]
                .output
                .clone()
                .unwrap_or_else(|| outputs.empty());
            target_upto = 0;
            let mut last_frame_idx = 1;
            debug_assert!(self.valid_index_prefix <= self.term.len);
            let target_limit = target.len().min(self.valid_index_prefix);

            let mut cmp = Ordering::Equal;

            // first compare up to the valid seek frames
            while target_upto < target_limit {
                cmp = self.term.bytes[target_upto].cmp(&target[target_upto]);
                if cmp != Ordering::Equal {
                    break;
                }
                arc_idx = target_upto + 1;
                debug_assert_eq!(
                    self.arcs[arc_idx].label,
                    i32::from(target[target_upto]),
                    "arc stack out of sync with the current term"
                );
                if let Some(ref out) = self.arcs[arc_idx].output {
                    if !out.is_empty() {
                        output = outputs.add(&output, out);
                    }
                }
                if self.arcs[arc_idx].is_final() {
                    last_frame_idx += 1;
                }
                target_upto += 1;
            }

            if cmp == Ordering::Equal {
                let target_upto_mid = target_upto;

                // second, compare the rest of both terms, only to learn
                // whether the target is before, equal to or after the
                // current term; arc/output/frame state is not advanced
                let target_limit2 = target.len().min(self.term.len);
                while target_upto < target_limit2 {
                    cmp = self.term.bytes[target_upto].cmp(&target[target_upto]);
                    if cmp != Ordering::Equal {
                        break;
                    }
                    target_upto += 1;
                }
                if cmp == Ordering::Equal {
                    cmp = self.term.len.cmp(&target.len());
                }
                target_upto = target_upto_mid;
            }

            match cmp {
                Ordering::Less => {
                    // common case: the target is after the current term,
                    // ie the app seeks multiple terms in sorted order
                    self.current = last_frame_idx;
                }
                Ordering::Greater => {
                    // uncommon case: the target is before the current
                    // term; the frame can be kept but must be rewound so
                    // scanning restarts from the block top
                    self.target_before_current_length = 0;
                    self.current = last_frame_idx;
                    self.stack[self.current].rewind()?;
                }
                Ordering::Equal => {
                    debug_assert_eq!(self.term.len, target.len());
                    if self.term.exists {
                        return Ok(true);
                    }
                }
            }
        } else {
            self.target_before_current_length = -1;
            let arc = self.index.root_arc();
            // the empty-string prefix must have an output (block) in the
            // index
            debug_assert!(arc.is_final());
            debug_assert!(arc.next_final_output.is_some());
            self.arcs[0] = arc;
            arc_idx = 0;

            output = self.arcs[0]
                .output
                .clone()
                .unwrap_or_else(|| outputs.empty());
            target_upto = 0;
            let frame_output = match self.arcs[0].next_final_output {
                Some(ref out) => outputs.add(&output, out),
                None => output.clone(),
            };
            let root_arc = Some(self.arcs[0].clone());
            self.current = self.push_frame_by_data(root_arc, frame_output.inner(), 0)?;
        }

        // Done sharing the common prefix with the incoming target; now
        // continue walking the index:
        while target_upto < target.len() {
            let target_label = i32::from(target[target_upto]);
            self.arc_lookups += 1;
            let next_arc =
                self.index
                    .find_target_arc(target_label, &self.arcs[arc_idx], &mut self.fst_reader)?;
            match next_arc {
                Some(next_arc) => {
                    // follow this arc, aggregating output as we go
                    self.term.bytes[target_upto] = target_label as u8;
                    if let Some(ref out) = next_arc.output {
                        if !out.is_empty() {
                            output = outputs.add(&output, out);
                        }
                    }
                    target_upto += 1;
                    if next_arc.is_final() {
                        let frame_output = match next_arc.next_final_output {
                            Some(ref out) => outputs.add(&output, out),
                            None => output.clone(),
                        };
                        self.current = self.push_frame_by_data(
                            Some(next_arc.clone()),
                            frame_output.inner(),
                            target_upto,
                        )?;
                    }
                    self.add_arc(next_arc, target_upto);
                    arc_idx = target_upto;
                }
                None => {
                    // the index is exhausted
                    debug_assert!(self.current > 0);
                    self.valid_index_prefix = self.stack[self.current].prefix;
                    self.stack[self.current].scan_to_floor_frame(target)?;

                    if !self.stack[self.current].has_terms {
                        self.term.exists = false;
                        self.term.bytes[target_upto] = target_label as u8;
                        self.term.len = target_upto + 1;
                        trace!("fast not-found, index proves absence");
                        return Ok(false);
                    }

                    self.load_current_block()?;
                    let status = self.scan_current_to_term(target, true)?;
                    return Ok(status == SeekStatus::Found);
                }
            }
        }

        self.valid_index_prefix = self.stack[self.current].prefix;
        self.stack[self.current].scan_to_floor_frame(target)?;

        // the target term is entirely contained in the index
        if !self.stack[self.current].has_terms {
            self.term.exists = false;
            self.term.len = target_upto;
            trace!("fast not-found, index proves absence");
            return Ok(false);
        }

        self.load_current_block()?;
        let status = self.scan_current_to_term(target, true)?;
        Ok(status == SeekStatus::Found)
    }

    /// Seeks to the smallest term greater than or equal to `target`.
    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        self.term.grow(target.len());
        let outputs = ByteSequenceOutputFactory::new();

        self.eof = false;
        let mut arc_idx = 0;
        let mut output;
        let mut target_upto;
        self.target_before_current_length = self.current as isize - 1;

        if self.current != 0 {
            // reuse the seek state for the prefix shared with the
            // current term, exactly as in seek_exact
            output = self.arcs[0]
                .output
                .clone()
                .unwrap_or_else(|| outputs.empty());
            target_upto = 0;
            let mut last_frame_idx = 1;
            debug_assert!(self.valid_index_prefix <= self.term.len);
            let target_limit = target.len().min(self.valid_index_prefix);

            let mut cmp = Ordering::Equal;

            while target_upto < target_limit {
                cmp = self.term.bytes[target_upto].cmp(&target[target_upto]);
                if cmp != Ordering::Equal {
                    break;
                }
                arc_idx = target_upto + 1;
                debug_assert_eq!(self.arcs[arc_idx].label, i32::from(target[target_upto]));
                if let Some(ref out) = self.arcs[arc_idx].output {
                    if !out.is_empty() {
                        output = outputs.add(&output, out);
                    }
                }
                if self.arcs[arc_idx].is_final() {
                    last_frame_idx += 1;
                }
                target_upto += 1;
            }

            if cmp == Ordering::Equal {
                let target_upto_mid = target_upto;
                let target_limit2 = target.len().min(self.term.len);
                while target_upto < target_limit2 {
                    cmp = self.term.bytes[target_upto].cmp(&target[target_upto]);
                    if cmp != Ordering::Equal {
                        break;
                    }
                    target_upto += 1;
                }
                if cmp == Ordering::Equal {
                    cmp = self.term.len.cmp(&target.len());
                }
                target_upto = target_upto_mid;
            }

            match cmp {
                Ordering::Less => {
                    self.current = last_frame_idx;
                }
                Ordering::Greater => {
                    self.target_before_current_length = 0;
                    self.current = last_frame_idx;
                    self.stack[self.current].rewind()?;
                }
                Ordering::Equal => {
                    debug_assert_eq!(self.term.len, target.len());
                    if self.term.exists {
                        return Ok(SeekStatus::Found);
                    }
                }
            }
        } else {
            self.target_before_current_length = -1;
            let arc = self.index.root_arc();
            debug_assert!(arc.is_final());
            debug_assert!(arc.next_final_output.is_some());
            self.arcs[0] = arc;
            arc_idx = 0;

            output = self.arcs[0]
                .output
                .clone()
                .unwrap_or_else(|| outputs.empty());
            target_upto = 0;
            let frame_output = match self.arcs[0].next_final_output {
                Some(ref out) => outputs.add(&output, out),
                None => output.clone(),
            };
            let root_arc = Some(self.arcs[0].clone());
            self.current = self.push_frame_by_data(root_arc, frame_output.inner(), 0)?;
        }

        while target_upto < target.len() {
            let target_label = i32::from(target[target_upto]);
            self.arc_lookups += 1;
            let next_arc =
                self.index
                    .find_target_arc(target_label, &self.arcs[arc_idx], &mut self.fst_reader)?;
            match next_arc {
                Some(next_arc) => {
                    self.term.bytes[target_upto] = target_label as u8;
                    if let Some(ref out) = next_arc.output {
                        if !out.is_empty() {
                            output = outputs.add(&output, out);
                        }
                    }
                    target_upto += 1;
                    if next_arc.is_final() {
                        let frame_output = match next_arc.next_final_output {
                            Some(ref out) => outputs.add(&output, out),
                            None => output.clone(),
                        };
                        self.current = self.push_frame_by_data(
                            Some(next_arc.clone()),
                            frame_output.inner(),
                            target_upto,
                        )?;
                    }
                    self.add_arc(next_arc, target_upto);
                    arc_idx = target_upto;
                }
                None => {
                    // the index is exhausted; position within the block
                    debug_assert!(self.current > 0);
                    self.valid_index_prefix = self.stack[self.current].prefix;
                    self.stack[self.current].scan_to_floor_frame(target)?;
                    self.load_current_block()?;
                    let status = self.scan_current_to_term(target, false)?;
                    return self.finish_ceil(target, status);
                }
            }
        }

        self.valid_index_prefix = self.stack[self.current].prefix;
        self.stack[self.current].scan_to_floor_frame(target)?;
        self.load_current_block()?;
        let status = self.scan_current_to_term(target, false)?;
        self.finish_ceil(target, status)
    }

    /// Completes a non-exact positioning after a block scan: descends
    /// into a sub-block the scan stopped on, or walks into the next
    /// block when the scan ran off the end.
    fn finish_ceil(&mut self, target: &[u8], status: SeekStatus) -> Result<SeekStatus> {
        match status {
            SeekStatus::Found => Ok(SeekStatus::Found),
            SeekStatus::NotFound => {
                if !self.term.exists {
                    // the scan stopped on a sub-block entry; the first
                    // term after the target lives in (or below) it
                    let fp = self.stack[self.current].last_sub_fp;
                    let length = self.term.len;
                    self.current = self.push_frame_by_fp(None, fp, length)?;
                    self.load_current_block()?;
                    while self.next_current_entry()? {
                        let fp = self.stack[self.current].last_sub_fp;
                        let length = self.term.len;
                        self.current = self.push_frame_by_fp(None, fp, length)?;
                        self.load_current_block()?;
                    }
                }
                Ok(SeekStatus::NotFound)
            }
            SeekStatus::End => {
                self.term.copy_from(target);
                self.term.exists = false;
                if self.next()?.is_some() {
                    Ok(SeekStatus::NotFound)
                } else {
                    Ok(SeekStatus::End)
                }
            }
        }
    }

    /// Advances to the next term in lexicographic order, descending into
    /// sub-blocks and ascending at block ends; `None` once the field is
    /// exhausted. Decodes only the term bytes; stats and postings
    /// metadata are caught up lazily when asked for.
    pub fn next(&mut self) -> Result<Option<Vec<u8>>> {
        if self.current == 0 && self.term.exists {
            // A seek by term state cached the term without frames;
            // re-seek so the internal state catches up.
            let term = self.term.term().to_vec();
            let result = self.seek_exact(&term)?;
            debug_assert!(result);
        } else if self.input.is_none() {
            // fresh cursor: seek to the first term
            self.init_index_input()?;
            self.current = 0;
            let root_arc = Some(self.index.root_arc());
            let root_code = self.root_code.clone();
            self.current = self.push_frame_by_data(root_arc, &root_code, 0)?;
            self.load_current_block()?;
        }

        self.target_before_current_length = self.current as isize - 1;
        debug_assert!(!self.eof);

        // pop finished blocks
        debug_assert!(self.current > 0);
        while self.stack[self.current].next_ent == self.stack[self.current].ent_count {
            if !self.stack[self.current].is_last_in_floor {
                // advance to the next floor sub-block
                let ord = self.current;
                let input = self.input.as_mut().unwrap();
                self.stack[ord].load_next_floor_block(
                    input.as_mut(),
                    &*self.postings_reader,
                    &self.field_info,
                )?;
                break;
            } else {
                if self.current == 1 {
                    self.eof = true;
                    self.term.set_len(0);
                    self.term.exists = false;
                    self.valid_index_prefix = 0;
                    self.stack[1].rewind()?;
                    return Ok(None);
                }

                let last_fp = self.stack[self.current].fp_orig;
                self.current -= 1;

                let ord = self.current;
                if self.stack[ord].next_ent == -1 || self.stack[ord].last_sub_fp != last_fp {
                    // we popped into a frame that is not loaded yet or
                    // not scanned to the right entry
                    self.stack[ord].scan_to_floor_frame(&self.term.bytes[..self.term.len])?;
                    self.load_current_block()?;
                    self.stack[ord].scan_to_sub_block(last_fp)?;
                }

                // the seek state is invalidated beyond this depth
                self.valid_index_prefix = self.valid_index_prefix.min(self.stack[ord].prefix);
            }
        }

        loop {
            if self.next_current_entry()? {
                // descend into the sub-block. This is a "next" frame:
                // even if it is floor'd we must not scan to a floor
                // sub-block.
                let fp = self.stack[self.current].last_sub_fp;
                let length = self.term.len;
                self.current = self.push_frame_by_fp(None, fp, length)?;
                self.load_current_block()?;
            } else {
                return Ok(Some(self.term.term().to_vec()));
            }
        }
    }

    /// How many documents contain the current term.
    pub fn doc_freq(&mut self) -> Result<i32> {
        debug_assert!(!self.eof);
        self.decode_current_metadata()?;
        Ok(self.stack[self.current].state.doc_freq)
    }

    /// Total occurrences of the current term, -1 when frequencies were
    /// not indexed.
    pub fn total_term_freq(&mut self) -> Result<i64> {
        debug_assert!(!self.eof);
        self.decode_current_metadata()?;
        Ok(self.stack[self.current].state.total_term_freq)
    }

    /// Document iterator over the current term's postings.
    pub fn docs(&mut self, flags: u16) -> Result<Box<dyn PostingIterator>> {
        debug_assert!(!self.eof);
        self.decode_current_metadata()?;
        self.postings_reader
            .postings(&self.field_info, &self.stack[self.current].state, flags)
    }

    /// Document-and-positions iterator over the current term's postings.
    pub fn docs_and_positions(&mut self, flags: u16) -> Result<Box<dyn PostingIterator>> {
        debug_assert!(!self.eof);
        if !self.field_info.index_options.has_positions() {
            bail!(IllegalArgument(format!(
                "field {} was not indexed with positions",
                self.field_info.name
            )));
        }
        self.decode_current_metadata()?;
        self.postings_reader.postings_with_positions(
            &self.field_info,
            &self.stack[self.current].state,
            flags,
        )
    }

    /// Exports the current term's fully decoded state, usable later with
    /// `seek_exact_state`.
    pub fn term_state(&mut self) -> Result<BlockTermState> {
        debug_assert!(!self.eof);
        self.decode_current_metadata()?;
        Ok(self.stack[self.current].state.clone())
    }

    /// Re-positions the cursor onto a term whose state was previously
    /// exported; no IO happens until iteration continues.
    pub fn seek_exact_state(&mut self, term: &[u8], state: &BlockTermState) -> Result<()> {
        self.eof = false;
        if term != self.term.term() || !self.term.exists {
            self.current = 0;
            self.stack[0].state.copy_from(state);
            self.stack[0].metadata_upto = self.stack[0].get_term_block_ord();
            self.term.copy_from(term);
            self.term.exists = true;
            self.valid_index_prefix = 0;
            debug_assert!(self.stack[0].metadata_upto > 0);
        }
        Ok(())
    }
}
