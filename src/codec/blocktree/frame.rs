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

use crate::codec::blocktree::TermBuffer;
use crate::codec::{BlockTermState, FieldInfo, IndexOptions, PostingsReader, SeekStatus};
use crate::error::Result;
use crate::store::{ByteArrayDataInput, DataInput, IndexInput};
use crate::util::fst::{ByteSequenceOutput, FstArc};
use crate::util::UnsignedShift;

use std::cmp::Ordering;

/// One level of the cursor's block stack: a decoded block plus the scan
/// position inside it. Frames are plain values owned by the cursor; every
/// operation takes its collaborators explicitly.
pub(crate) struct SegmentTermsFrame {
    /// Our index in the cursor's stack.
    pub ord: usize,

    pub has_terms: bool,
    pub has_terms_orig: bool,
    pub is_floor: bool,

    pub arc: Option<FstArc<ByteSequenceOutput>>,

    /// File pointer where this block was loaded from.
    pub fp: i64,
    pub fp_orig: i64,
    pub fp_end: i64,

    suffixes: ByteArrayDataInput<Vec<u8>>,
    stats: ByteArrayDataInput<Vec<u8>>,
    floor_data: ByteArrayDataInput<Vec<u8>>,

    /// Length of prefix shared by all terms in this block.
    pub prefix: usize,
    /// Number of entries (term or sub-block) in this block.
    pub ent_count: i32,
    /// Which entry we will next read, or -1 if the block isn't loaded
    /// yet.
    pub next_ent: i32,

    /// True if this block is either not a floor block, or the last
    /// sub-block of a floor block.
    pub is_last_in_floor: bool,
    /// True if all entries are terms.
    pub is_leaf_block: bool,

    pub last_sub_fp: i64,

    next_floor_label: i32,
    num_follow_floor_blocks: i32,

    /// Next term to decode metadata for; metadata is decoded lazily so
    /// that scanning to find a match stays cheap and decoding happens
    /// only when stats or postings are actually requested.
    pub metadata_upto: i32,

    pub state: BlockTermState,

    start_byte_pos: usize,
    suffix: usize,
    sub_code: i64,
}

impl SegmentTermsFrame {
    pub fn new(ord: usize, state: BlockTermState) -> SegmentTermsFrame {
        SegmentTermsFrame {
            ord,
            has_terms: false,
            has_terms_orig: false,
            is_floor: false,
            arc: None,
            fp: 0,
            fp_orig: 0,
            fp_end: 0,
            suffixes: ByteArrayDataInput::new(Vec::new()),
            stats: ByteArrayDataInput::new(Vec::new()),
            floor_data: ByteArrayDataInput::new(Vec::new()),
            prefix: 0,
            ent_count: 0,
            next_ent: 0,
            is_last_in_floor: false,
            is_leaf_block: false,
            last_sub_fp: 0,
            next_floor_label: 0,
            num_follow_floor_blocks: 0,
            metadata_upto: 0,
            state,
            start_byte_pos: 0,
            suffix: 0,
            sub_code: 0,
        }
    }

    /// Copies the floor metadata that trails the block pointer in an FST
    /// output.
    pub fn set_floor_data(
        &mut self,
        input: &mut ByteArrayDataInput<&[u8]>,
        source: &[u8],
    ) -> Result<()> {
        let pos = input.position();
        debug_assert!(pos < source.len());
        self.floor_data
            .buffer_mut(source.len() - pos)
            .copy_from_slice(&source[pos..]);
        self.num_follow_floor_blocks = self.floor_data.read_vint()?;
        self.next_floor_label = i32::from(self.floor_data.read_byte()?);
        Ok(())
    }

    pub fn get_term_block_ord(&self) -> i32 {
        if self.is_leaf_block {
            self.next_ent
        } else {
            self.state.term_block_ord
        }
    }

    pub fn load_next_floor_block(
        &mut self,
        input: &mut dyn IndexInput,
        postings: &dyn PostingsReader,
        field: &FieldInfo,
    ) -> Result<()> {
        debug_assert!(self.arc.is_none() || self.is_floor);
        self.fp = self.fp_end;
        self.next_ent = -1;
        self.load_block(input, postings, field)
    }

    /// Does the initial decode of a block: entry count, the suffix and
    /// stats blobs, and the postings reader's block hook. Stats and
    /// postings metadata stay undecoded until some term in this block has
    /// its metadata requested.
    pub fn load_block(
        &mut self,
        input: &mut dyn IndexInput,
        postings: &dyn PostingsReader,
        field: &FieldInfo,
    ) -> Result<()> {
        if self.next_ent != -1 {
            // already loaded
            return Ok(());
        }
        input.seek(self.fp)?;
        let mut code = input.read_vint()?;
        self.ent_count = code.unsigned_shift(1);
        debug_assert!(self.ent_count > 0);
        self.is_last_in_floor = (code & 1) != 0;
        // a seek'd block is floor-split or terminal; only floor
        // sub-blocks reached by scanning may be neither
        debug_assert!(self.arc.is_none() || self.is_floor || self.is_last_in_floor);

        // term suffixes
        code = input.read_vint()?;
        self.is_leaf_block = (code & 1) != 0;
        let num_bytes = code.unsigned_shift(1) as usize;
        input.read_exact(self.suffixes.buffer_mut(num_bytes))?;

        // stats
        let num_bytes = input.read_vint()? as usize;
        input.read_exact(self.stats.buffer_mut(num_bytes))?;
        self.metadata_upto = 0;

        self.state.term_block_ord = 0;
        self.state.block_file_pointer = self.fp;
        self.next_ent = 0;
        self.last_sub_fp = -1;

        postings.read_terms_block(input, field, &mut self.state)?;

        // sub-blocks of a single floor block are written one after
        // another
        self.fp_end = input.file_pointer();
        trace!(
            "loaded block fp={} ent_count={} prefix={} leaf={}",
            self.fp,
            self.ent_count,
            self.prefix,
            self.is_leaf_block
        );
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<()> {
        // force reload
        self.fp = self.fp_orig;
        self.next_ent = -1;
        self.has_terms = self.has_terms_orig;
        if self.is_floor {
            self.floor_data.rewind();
            self.num_follow_floor_blocks = self.floor_data.read_vint()?;
            debug_assert!(self.num_follow_floor_blocks > 0);
            self.next_floor_label = i32::from(self.floor_data.read_byte()?);
        }
        Ok(())
    }

    /// Decodes the next entry; returns true if it is a sub-block.
    pub fn next(
        &mut self,
        term: &mut TermBuffer,
        input: &mut dyn IndexInput,
        postings: &dyn PostingsReader,
        field: &FieldInfo,
    ) -> Result<bool> {
        if self.is_leaf_block {
            self.next_leaf(term)?;
            Ok(false)
        } else {
            self.next_non_leaf(term, input, postings, field)
        }
    }

    pub fn next_leaf(&mut self, term: &mut TermBuffer) -> Result<()> {
        debug_assert!(self.next_ent != -1 && self.next_ent < self.ent_count);
        self.next_ent += 1;
        self.suffix = self.suffixes.read_vint()? as usize;
        self.start_byte_pos = self.suffixes.position();
        term.set_len(self.prefix + self.suffix);
        self.suffixes
            .read_bytes(&mut term.bytes, self.prefix, self.suffix)?;
        term.exists = true;
        Ok(())
    }

    pub fn next_non_leaf(
        &mut self,
        term: &mut TermBuffer,
        input: &mut dyn IndexInput,
        postings: &dyn PostingsReader,
        field: &FieldInfo,
    ) -> Result<bool> {
        loop {
            if self.next_ent == self.ent_count {
                debug_assert!(self.arc.is_none() || (self.is_floor && !self.is_last_in_floor));
                self.load_next_floor_block(input, postings, field)?;
                if self.is_leaf_block {
                    self.next_leaf(term)?;
                    return Ok(false);
                } else {
                    continue;
                }
            }

            debug_assert!(self.next_ent != -1 && self.next_ent < self.ent_count);
            self.next_ent += 1;
            let code = self.suffixes.read_vint()?;
            self.suffix = code.unsigned_shift(1) as usize;
            self.start_byte_pos = self.suffixes.position();
            term.set_len(self.prefix + self.suffix);
            self.suffixes
                .read_bytes(&mut term.bytes, self.prefix, self.suffix)?;
            if (code & 1) == 0 {
                // a normal term
                term.exists = true;
                self.sub_code = 0;
                self.state.term_block_ord += 1;
                return Ok(false);
            } else {
                // a sub-block; make the sub fp absolute
                term.exists = false;
                self.sub_code = self.suffixes.read_vlong()?;
                self.last_sub_fp = self.fp - self.sub_code;
                return Ok(true);
            }
        }
    }

    /// When the block is floor-split, walk the inline label table to the
    /// sub-block covering the target's next byte.
    pub fn scan_to_floor_frame(&mut self, target: &[u8]) -> Result<()> {
        if !self.is_floor || target.len() <= self.prefix {
            return Ok(());
        }

        let target_label = i32::from(target[self.prefix]);
        if target_label < self.next_floor_label {
            return Ok(());
        }

        debug_assert!(self.num_follow_floor_blocks > 0);
        let mut new_fp;
        loop {
            let code = self.floor_data.read_vlong()?;
            new_fp = self.fp_orig + code.unsigned_shift(1);
            self.has_terms = (code & 1) != 0;
            self.is_last_in_floor = self.num_follow_floor_blocks == 1;
            self.num_follow_floor_blocks -= 1;
            if self.is_last_in_floor {
                self.next_floor_label = 256;
                break;
            } else {
                self.next_floor_label = i32::from(self.floor_data.read_byte()?);
                if target_label < self.next_floor_label {
                    break;
                }
            }
        }

        if new_fp != self.fp {
            // force re-load of the block
            self.next_ent = -1;
            self.fp = new_fp;
        }
        Ok(())
    }

    pub fn decode_metadata(
        &mut self,
        postings: &dyn PostingsReader,
        field: &FieldInfo,
    ) -> Result<()> {
        // lazily catch up on metadata decode
        let limit = self.get_term_block_ord();
        let mut absolute = self.metadata_upto == 0;
        debug_assert!(limit > 0);

        while self.metadata_upto < limit {
            // stats
            self.state.doc_freq = self.stats.read_vint()?;
            if field.index_options != IndexOptions::Docs {
                self.state.total_term_freq =
                    i64::from(self.state.doc_freq) + self.stats.read_vlong()?;
            }
            // postings pointers
            postings.finalize_term(field, &mut self.state, absolute)?;
            self.metadata_upto += 1;
            absolute = false;
        }
        self.state.term_block_ord = self.metadata_upto;
        Ok(())
    }

    // Used only by asserts.
    fn prefix_matches(&self, target: &[u8], term: &TermBuffer) -> bool {
        target[..self.prefix] == term.bytes[..self.prefix]
    }

    /// Re-positions a popped parent frame onto the sub-block entry whose
    /// child has this fp; only called while iterating. NOTE: does not set
    /// start_byte_pos/suffix as a side effect.
    pub fn scan_to_sub_block(&mut self, sub_fp: i64) -> Result<()> {
        debug_assert!(!self.is_leaf_block);
        if self.last_sub_fp == sub_fp {
            return Ok(());
        }
        debug_assert!(sub_fp < self.fp);
        let target_sub_code = self.fp - sub_fp;
        loop {
            debug_assert!(self.next_ent < self.ent_count);
            self.next_ent += 1;
            let code = self.suffixes.read_vint()?;
            self.suffixes
                .skip_bytes(code.unsigned_shift(1) as usize)?;
            if (code & 1) != 0 {
                let sub_code = self.suffixes.read_vlong()?;
                if target_sub_code == sub_code {
                    self.last_sub_fp = sub_fp;
                    return Ok(());
                }
            } else {
                self.state.term_block_ord += 1;
            }
        }
    }

    /// NOTE: sets start_byte_pos/suffix as a side effect.
    pub fn scan_to_term(
        &mut self,
        target: &[u8],
        exact_only: bool,
        term: &mut TermBuffer,
    ) -> Result<SeekStatus> {
        if self.is_leaf_block {
            self.scan_to_term_leaf(target, exact_only, term)
        } else {
            self.scan_to_term_non_leaf(target, exact_only, term)
        }
    }

    /// The target's prefix matches this block's prefix; scan the entries
    /// comparing suffixes. Ties between a term and a prefix of it go to
    /// the longer one.
    fn scan_to_term_leaf(
        &mut self,
        target: &[u8],
        exact_only: bool,
        term: &mut TermBuffer,
    ) -> Result<SeekStatus> {
        debug_assert!(self.next_ent != -1);

        term.exists = true;
        self.sub_code = 0;

        if self.next_ent == self.ent_count {
            if exact_only {
                self.fill_term(term);
            }
            return Ok(SeekStatus::End);
        }

        debug_assert!(self.prefix_matches(target, term));

        // loop over each entry in this block
        'next_term: loop {
            self.next_ent += 1;
            self.suffix = self.suffixes.read_vint()? as usize;

            let term_len = self.prefix + self.suffix;
            self.start_byte_pos = self.suffixes.position();
            self.suffixes.skip_bytes(self.suffix)?;

            let target_limit = target.len().min(term_len);
            let mut target_pos = self.prefix;
            let mut byte_pos = self.start_byte_pos;

            // compare the suffix bytes to the target
            loop {
                let (cmp, stop) = if target_pos < target_limit {
                    let c = self.suffixes.bytes()[byte_pos].cmp(&target[target_pos]);
                    byte_pos += 1;
                    target_pos += 1;
                    (c, false)
                } else {
                    debug_assert_eq!(target_pos, target_limit);
                    (term_len.cmp(&target.len()), true)
                };

                if cmp == Ordering::Less {
                    // this entry is still before the target; keep
                    // scanning
                    if self.next_ent == self.ent_count {
                        // we are done scanning this block
                        break 'next_term;
                    } else {
                        continue 'next_term;
                    }
                } else if cmp == Ordering::Greater {
                    // the entry is past the target
                    self.fill_term(term);
                    return Ok(SeekStatus::NotFound);
                } else if stop {
                    // exact match; this cannot be a sub-block because
                    // the index would have led there from the start
                    debug_assert!(term.exists);
                    self.fill_term(term);
                    return Ok(SeekStatus::Found);
                }
            }
        }

        // It is possible (and OK) that the terms index pointed us at this
        // block, but the target sorts after the last entry in it while
        // still before the next block's first term.
        if exact_only {
            self.fill_term(term);
        }
        Ok(SeekStatus::End)
    }

    fn scan_to_term_non_leaf(
        &mut self,
        target: &[u8],
        exact_only: bool,
        term: &mut TermBuffer,
    ) -> Result<SeekStatus> {
        debug_assert_ne!(self.next_ent, -1);

        if self.next_ent == self.ent_count {
            if exact_only {
                self.fill_term(term);
                term.exists = self.sub_code == 0;
            }
            return Ok(SeekStatus::End);
        }

        debug_assert!(self.prefix_matches(target, term));

        'next_term: while self.next_ent < self.ent_count {
            self.next_ent += 1;

            let code = self.suffixes.read_vint()?;
            self.suffix = code.unsigned_shift(1) as usize;

            let term_len = self.prefix + self.suffix;
            self.start_byte_pos = self.suffixes.position();
            self.suffixes.skip_bytes(self.suffix)?;
            if (code & 1) == 0 {
                // a normal term
                term.exists = true;
                self.state.term_block_ord += 1;
                self.sub_code = 0;
            } else {
                // a sub-block; make the sub fp absolute
                term.exists = false;
                self.sub_code = self.suffixes.read_vlong()?;
                self.last_sub_fp = self.fp - self.sub_code;
            }

            let target_limit = target.len().min(term_len);
            let mut target_pos = self.prefix;
            let mut byte_pos = self.start_byte_pos;

            loop {
                let (cmp, stop) = if target_pos < target_limit {
                    let c = self.suffixes.bytes()[byte_pos].cmp(&target[target_pos]);
                    byte_pos += 1;
                    target_pos += 1;
                    (c, false)
                } else {
                    debug_assert_eq!(target_pos, target_limit);
                    (term_len.cmp(&target.len()), true)
                };

                if cmp == Ordering::Less {
                    // this entry is still before the target; keep
                    // scanning
                    continue 'next_term;
                } else if cmp == Ordering::Greater {
                    // the entry is past the target. When the caller is
                    // not exact-only and we stopped on a sub-block, the
                    // cursor recurses into it to find the first term
                    // after the target.
                    self.fill_term(term);
                    return Ok(SeekStatus::NotFound);
                } else if stop {
                    // exact match; cannot be a sub-block, the index
                    // would have led there from the start
                    debug_assert!(term.exists);
                    self.fill_term(term);
                    return Ok(SeekStatus::Found);
                }
            }
        }

        if exact_only {
            self.fill_term(term);
        }
        Ok(SeekStatus::End)
    }

    fn fill_term(&self, term: &mut TermBuffer) {
        let term_length = self.prefix + self.suffix;
        term.set_len(term_length);
        term.bytes[self.prefix..term_length].copy_from_slice(
            &self.suffixes.bytes()[self.start_byte_pos..self.start_byte_pos + self.suffix],
        );
    }
}
