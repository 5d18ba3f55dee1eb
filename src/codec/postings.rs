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

use crate::codec::FieldInfo;
use crate::error::Result;
use crate::store::IndexInput;

pub type DocId = i32;

/// Sentinel doc id returned once a posting iterator is exhausted.
pub const NO_MORE_DOCS: DocId = i32::max_value();

/// Holds all state required for a `PostingsReader` to produce a
/// `PostingIterator` without re-seeking the term dictionary.
#[derive(Clone, Debug)]
pub struct BlockTermState {
    /// Term ordinal, i.e. its position in the full list of sorted terms.
    pub ord: i64,
    /// How many docs have this term.
    pub doc_freq: i32,
    /// Total number of occurrences of this term, -1 when frequencies were
    /// not indexed.
    pub total_term_freq: i64,
    /// The term's ord in the current block.
    pub term_block_ord: i32,
    /// fp of the terms-dict block holding this term.
    pub block_file_pointer: i64,
    /// fp into the postings stream, decoded by the postings reader.
    pub doc_start_fp: i64,
    /// fp into the positions stream, decoded by the postings reader.
    pub pos_start_fp: i64,
    /// Opaque per-block postings metadata stashed by `read_terms_block`
    /// and consumed one term at a time by `finalize_term`.
    pub metadata: Vec<u8>,
    pub metadata_pos: usize,
}

impl BlockTermState {
    pub fn new() -> BlockTermState {
        BlockTermState {
            ord: 0,
            doc_freq: 0,
            total_term_freq: 0,
            term_block_ord: 0,
            block_file_pointer: 0,
            doc_start_fp: 0,
            pos_start_fp: 0,
            metadata: Vec::new(),
            metadata_pos: 0,
        }
    }

    pub fn copy_from(&mut self, other: &BlockTermState) {
        self.ord = other.ord;
        self.doc_freq = other.doc_freq;
        self.total_term_freq = other.total_term_freq;
        self.term_block_ord = other.term_block_ord;
        self.block_file_pointer = other.block_file_pointer;
        self.doc_start_fp = other.doc_start_fp;
        self.pos_start_fp = other.pos_start_fp;
        self.metadata.clear();
        self.metadata.extend_from_slice(&other.metadata);
        self.metadata_pos = other.metadata_pos;
    }
}

impl Default for BlockTermState {
    fn default() -> Self {
        BlockTermState::new()
    }
}

/// Iterates the documents (and optionally frequencies) of one term.
pub trait PostingIterator {
    fn doc_id(&self) -> DocId;
    fn next_doc(&mut self) -> Result<DocId>;
    fn freq(&self) -> Result<i32>;
}

/// Decodes per-term postings metadata blobs and produces document
/// iterators. The term dictionary invokes it at three hooks: once at
/// dictionary open (`init`), whenever a block is loaded
/// (`read_terms_block`), and per term while catching up metadata
/// (`finalize_term`).
pub trait PostingsReader: Send + Sync {
    /// Called once when the dictionary is opened; may read a small prelude
    /// from the terms file.
    fn init(&mut self, terms_in: &mut dyn IndexInput) -> Result<()>;

    fn new_term_state(&self) -> BlockTermState {
        BlockTermState::new()
    }

    /// Called after a block's term suffixes and stats were read; may
    /// consume an opaque blob of bytes and stash it in `state`.
    fn read_terms_block(
        &self,
        terms_in: &mut dyn IndexInput,
        field: &FieldInfo,
        state: &mut BlockTermState,
    ) -> Result<()>;

    /// Decode the next term's postings pointers out of the stashed block
    /// metadata. `absolute` is true for the first term decoded since the
    /// block was (re)loaded.
    fn finalize_term(
        &self,
        field: &FieldInfo,
        state: &mut BlockTermState,
        absolute: bool,
    ) -> Result<()>;

    fn postings(
        &self,
        field: &FieldInfo,
        state: &BlockTermState,
        flags: u16,
    ) -> Result<Box<dyn PostingIterator>>;

    fn postings_with_positions(
        &self,
        field: &FieldInfo,
        state: &BlockTermState,
        flags: u16,
    ) -> Result<Box<dyn PostingIterator>>;
}
