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

//! Test tooling: a declarative segment writer producing bit-exact
//! `.tim`/`.tip` files from explicit block trees, a stub postings reader
//! speaking a tiny self-describing blob protocol, and an IO-counting
//! directory wrapper.

#![allow(dead_code)]

use termdex::codec::blocktree::{
    TERMS_CODEC_NAME, TERMS_EXTENSION, TERMS_INDEX_CODEC_NAME, TERMS_INDEX_EXTENSION,
};
use termdex::codec::{
    self, BlockTermState, DocId, FieldInfo, IndexOptions, PostingIterator, PostingsReader,
    NO_MORE_DOCS,
};
use termdex::error::{ErrorKind, Result};
use termdex::store::{DataInput, DataOutput, Directory, IndexInput, IoContext, RamDirectory};
use termdex::util::fst::{ByteSequenceOutput, ByteSequenceOutputFactory, FstBuilder, InputType};

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const POSTINGS_PRELUDE: &str = "SimplePostings";

// ---------------------------------------------------------------------
// stub postings reader

/// Postings collaborator used by the fixtures: the per-block metadata
/// blob is a vInt length followed by one vLong per term carrying the
/// term's postings fp (absolute for the first term of a block, delta
/// afterwards). Document iterators synthesize doc ids `0..doc_freq`.
pub struct SimplePostingsReader;

impl PostingsReader for SimplePostingsReader {
    fn init(&mut self, terms_in: &mut dyn IndexInput) -> Result<()> {
        let prelude = terms_in.read_string()?;
        if prelude != POSTINGS_PRELUDE {
            return Err(
                ErrorKind::CorruptIndex(format!("unexpected postings prelude: {}", prelude))
                    .into(),
            );
        }
        Ok(())
    }

    fn read_terms_block(
        &self,
        terms_in: &mut dyn IndexInput,
        _field: &FieldInfo,
        state: &mut BlockTermState,
    ) -> Result<()> {
        let num_bytes = terms_in.read_vint()? as usize;
        state.metadata.resize(num_bytes, 0);
        terms_in.read_exact(&mut state.metadata)?;
        state.metadata_pos = 0;
        Ok(())
    }

    fn finalize_term(
        &self,
        _field: &FieldInfo,
        state: &mut BlockTermState,
        absolute: bool,
    ) -> Result<()> {
        let mut slice: &[u8] = &state.metadata[state.metadata_pos..];
        let before = slice.len();
        let value = slice.read_vlong()?;
        let consumed = before - slice.len();
        state.metadata_pos += consumed;
        if absolute {
            state.doc_start_fp = value;
        } else {
            state.doc_start_fp += value;
        }
        Ok(())
    }

    fn postings(
        &self,
        _field: &FieldInfo,
        state: &BlockTermState,
        _flags: u16,
    ) -> Result<Box<dyn PostingIterator>> {
        Ok(Box::new(SimplePostingIterator {
            doc: -1,
            doc_freq: state.doc_freq,
        }))
    }

    fn postings_with_positions(
        &self,
        field: &FieldInfo,
        state: &BlockTermState,
        flags: u16,
    ) -> Result<Box<dyn PostingIterator>> {
        self.postings(field, state, flags)
    }
}

pub struct SimplePostingIterator {
    doc: DocId,
    doc_freq: i32,
}

impl PostingIterator for SimplePostingIterator {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.doc + 1 >= self.doc_freq {
            self.doc = NO_MORE_DOCS;
        } else {
            self.doc += 1;
        }
        Ok(self.doc)
    }

    fn freq(&self) -> Result<i32> {
        Ok(1)
    }
}

// ---------------------------------------------------------------------
// declarative block trees

pub struct TermSpec {
    pub suffix: Vec<u8>,
    pub doc_freq: i32,
    pub total_term_freq: i64,
    pub postings_fp: i64,
}

pub enum Entry {
    Term(TermSpec),
    /// A pointer to a nested block; `suffix` extends the parent's prefix
    /// to the child's prefix.
    Block { suffix: Vec<u8>, spec: BlockSpec },
}

impl Entry {
    fn leading_byte(&self) -> u8 {
        match self {
            Entry::Term(t) => t.suffix[0],
            Entry::Block { suffix, .. } => suffix[0],
        }
    }
}

/// One indexed node of the block tree. More than one segment means the
/// block is floor-split; each segment becomes its own on-disk block and
/// the leading suffix byte of every following segment's first entry is
/// its floor label.
pub struct BlockSpec {
    pub segments: Vec<Vec<Entry>>,
}

pub fn term(suffix: &[u8], doc_freq: i32, postings_fp: i64) -> Entry {
    Entry::Term(TermSpec {
        suffix: suffix.to_vec(),
        doc_freq,
        total_term_freq: i64::from(doc_freq) * 2,
        postings_fp,
    })
}

pub fn sub_block(suffix: &[u8], spec: BlockSpec) -> Entry {
    Entry::Block {
        suffix: suffix.to_vec(),
        spec,
    }
}

pub fn block(entries: Vec<Entry>) -> BlockSpec {
    BlockSpec {
        segments: vec![entries],
    }
}

pub fn floor_block(segments: Vec<Vec<Entry>>) -> BlockSpec {
    BlockSpec { segments }
}

/// A flat fixture: every term in one leaf root block, postings fps
/// assigned by `flat_postings_fp`.
pub fn flat_block(terms: &[&[u8]]) -> BlockSpec {
    let entries = terms
        .iter()
        .enumerate()
        .map(|(i, t)| term(t, (i + 1) as i32, flat_postings_fp(i)))
        .collect();
    block(entries)
}

pub fn flat_postings_fp(ordinal: usize) -> i64 {
    (ordinal as i64 + 1) * 8
}

impl BlockSpec {
    fn count_terms(&self) -> i64 {
        let mut n = 0;
        for segment in &self.segments {
            for entry in segment {
                match entry {
                    Entry::Term(_) => n += 1,
                    Entry::Block { spec, .. } => n += spec.count_terms(),
                }
            }
        }
        n
    }

    fn sum_doc_freq(&self) -> i64 {
        let mut n = 0;
        for segment in &self.segments {
            for entry in segment {
                match entry {
                    Entry::Term(t) => n += i64::from(t.doc_freq),
                    Entry::Block { spec, .. } => n += spec.sum_doc_freq(),
                }
            }
        }
        n
    }

    fn sum_total_term_freq(&self) -> i64 {
        let mut n = 0;
        for segment in &self.segments {
            for entry in segment {
                match entry {
                    Entry::Term(t) => n += t.total_term_freq,
                    Entry::Block { spec, .. } => n += spec.sum_total_term_freq(),
                }
            }
        }
        n
    }

    fn max_doc_freq(&self) -> i32 {
        let mut n = 0;
        for segment in &self.segments {
            for entry in segment {
                match entry {
                    Entry::Term(t) => n = n.max(t.doc_freq),
                    Entry::Block { spec, .. } => n = n.max(spec.max_doc_freq()),
                }
            }
        }
        n
    }
}

pub struct FieldFixture {
    pub field_info: FieldInfo,
    pub root: BlockSpec,
    pub num_terms: i64,
    pub sum_doc_freq: i64,
    pub sum_total_term_freq: i64,
    pub doc_count: i32,
}

impl FieldFixture {
    pub fn new(field_info: FieldInfo, root: BlockSpec) -> FieldFixture {
        let num_terms = root.count_terms();
        let sum_doc_freq = root.sum_doc_freq();
        let sum_total_term_freq = if field_info.index_options == IndexOptions::Docs {
            -1
        } else {
            root.sum_total_term_freq()
        };
        let doc_count = root.max_doc_freq();
        FieldFixture {
            field_info,
            root,
            num_terms,
            sum_doc_freq,
            sum_total_term_freq,
            doc_count,
        }
    }
}

// ---------------------------------------------------------------------
// segment writer

struct WrittenBlock {
    fp_orig: i64,
    /// vLong code plus trailing floor metadata; the FST output of the
    /// block, and for the root block also the directory's root code.
    output: Vec<u8>,
}

fn segment_has_terms(segment: &[Entry]) -> bool {
    segment.iter().any(|e| match e {
        Entry::Term(_) => true,
        Entry::Block { .. } => false,
    })
}

fn write_block(
    spec: &BlockSpec,
    prefix: &[u8],
    out: &mut Vec<u8>,
    field: &FieldInfo,
    fst_entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
) -> WrittenBlock {
    // children first, so parent entries can encode backwards deltas
    let mut child_fps: Vec<Vec<i64>> = Vec::new();
    for segment in &spec.segments {
        let mut fps = Vec::new();
        for entry in segment {
            if let Entry::Block { suffix, spec } = entry {
                let mut child_prefix = prefix.to_vec();
                child_prefix.extend_from_slice(suffix);
                let written = write_block(spec, &child_prefix, out, field, fst_entries);
                fps.push(written.fp_orig);
            }
        }
        child_fps.push(fps);
    }

    let is_floor = spec.segments.len() > 1;
    let last_segment = spec.segments.len() - 1;
    let mut segment_fps = Vec::new();
    let mut segment_has = Vec::new();

    for (i, segment) in spec.segments.iter().enumerate() {
        assert!(!segment.is_empty(), "a block segment may not be empty");
        let fp = out.len() as i64;
        segment_fps.push(fp);
        segment_has.push(segment_has_terms(segment));

        let ent_count = segment.len() as i32;
        let is_last = i == last_segment;
        out.write_vint((ent_count << 1) | (is_last as i32)).unwrap();

        let is_leaf = segment.iter().all(|e| match e {
            Entry::Term(_) => true,
            Entry::Block { .. } => false,
        });

        // suffix blob
        let mut suffixes: Vec<u8> = Vec::new();
        let mut child_it = child_fps[i].iter();
        for entry in segment {
            match entry {
                Entry::Term(t) => {
                    if is_leaf {
                        suffixes.write_vint(t.suffix.len() as i32).unwrap();
                    } else {
                        suffixes.write_vint((t.suffix.len() as i32) << 1).unwrap();
                    }
                    suffixes.extend_from_slice(&t.suffix);
                }
                Entry::Block { suffix, .. } => {
                    let child_fp = *child_it.next().unwrap();
                    suffixes
                        .write_vint(((suffix.len() as i32) << 1) | 1)
                        .unwrap();
                    suffixes.extend_from_slice(suffix);
                    suffixes.write_vlong(fp - child_fp).unwrap();
                }
            }
        }
        out.write_vint(((suffixes.len() as i32) << 1) | (is_leaf as i32))
            .unwrap();
        out.extend_from_slice(&suffixes);

        // stats blob
        let mut stats: Vec<u8> = Vec::new();
        for entry in segment {
            if let Entry::Term(t) = entry {
                stats.write_vint(t.doc_freq).unwrap();
                if field.index_options.has_freqs() {
                    stats
                        .write_vlong(t.total_term_freq - i64::from(t.doc_freq))
                        .unwrap();
                }
            }
        }
        out.write_vint(stats.len() as i32).unwrap();
        out.extend_from_slice(&stats);

        // postings metadata blob: absolute fp first, deltas after
        let mut metadata: Vec<u8> = Vec::new();
        let mut prev_fp = 0;
        let mut first = true;
        for entry in segment {
            if let Entry::Term(t) = entry {
                if first {
                    metadata.write_vlong(t.postings_fp).unwrap();
                    first = false;
                } else {
                    assert!(t.postings_fp >= prev_fp, "postings fps must not decrease");
                    metadata.write_vlong(t.postings_fp - prev_fp).unwrap();
                }
                prev_fp = t.postings_fp;
            }
        }
        out.write_vint(metadata.len() as i32).unwrap();
        out.extend_from_slice(&metadata);
    }

    let fp_orig = segment_fps[0];
    let mut code = fp_orig << 2;
    if segment_has[0] {
        code |= 0x2;
    }
    if is_floor {
        code |= 0x1;
    }
    let mut output: Vec<u8> = Vec::new();
    output.write_vlong(code).unwrap();
    if is_floor {
        output.write_vint((spec.segments.len() - 1) as i32).unwrap();
        output
            .write_byte(spec.segments[1][0].leading_byte())
            .unwrap();
        for k in 1..spec.segments.len() {
            let delta = segment_fps[k] - fp_orig;
            output
                .write_vlong((delta << 1) | (segment_has[k] as i64))
                .unwrap();
            if k + 1 < spec.segments.len() {
                output
                    .write_byte(spec.segments[k + 1][0].leading_byte())
                    .unwrap();
            }
        }
    }

    fst_entries.push((prefix.to_vec(), output.clone()));

    WrittenBlock { fp_orig, output }
}

/// Writes one segment (tim + tip) into the directory.
pub fn write_segment(
    dir: &RamDirectory,
    segment: &str,
    version: i32,
    fields: &[FieldFixture],
) -> Result<()> {
    let mut tim: Vec<u8> = Vec::new();
    codec::write_header(&mut tim, TERMS_CODEC_NAME, version)?;
    let tim_offset_slot = tim.len();
    if version == 0 {
        tim.extend_from_slice(&[0u8; 8]);
    }
    // the postings reader's prelude, consumed by its init hook
    tim.write_string(POSTINGS_PRELUDE)?;

    let mut per_field: Vec<(WrittenBlock, Vec<(Vec<u8>, Vec<u8>)>)> = Vec::new();
    for fixture in fields {
        let mut fst_entries = Vec::new();
        let written = write_block(
            &fixture.root,
            &[],
            &mut tim,
            &fixture.field_info,
            &mut fst_entries,
        );
        fst_entries.sort_by(|a, b| a.0.cmp(&b.0));
        per_field.push((written, fst_entries));
    }

    // directory
    let dir_offset = tim.len() as i64;
    tim.write_vint(fields.len() as i32)?;
    for (fixture, (written, _)) in fields.iter().zip(per_field.iter()) {
        tim.write_vint(fixture.field_info.number as i32)?;
        tim.write_vlong(fixture.num_terms)?;
        tim.write_vint(written.output.len() as i32)?;
        tim.extend_from_slice(&written.output);
        if fixture.field_info.index_options != IndexOptions::Docs {
            tim.write_vlong(fixture.sum_total_term_freq)?;
        }
        tim.write_vlong(fixture.sum_doc_freq)?;
        tim.write_vint(fixture.doc_count)?;
    }
    if version >= 1 {
        tim.write_long(dir_offset)?;
    } else {
        tim[tim_offset_slot..tim_offset_slot + 8].copy_from_slice(&dir_offset.to_be_bytes());
    }

    // terms index
    let mut tip: Vec<u8> = Vec::new();
    codec::write_header(&mut tip, TERMS_INDEX_CODEC_NAME, version)?;
    let tip_offset_slot = tip.len();
    if version == 0 {
        tip.extend_from_slice(&[0u8; 8]);
    }
    let mut index_start_fps = Vec::new();
    for (_, fst_entries) in &per_field {
        index_start_fps.push(tip.len() as i64);
        let mut builder = FstBuilder::new(InputType::Byte1, ByteSequenceOutputFactory::new());
        for (prefix, output) in fst_entries {
            builder.add(prefix, ByteSequenceOutput::new(output.clone()))?;
        }
        let fst = builder.finish()?;
        fst.save(&mut tip)?;
    }
    let index_dir_offset = tip.len() as i64;
    for fp in index_start_fps {
        tip.write_vlong(fp)?;
    }
    if version >= 1 {
        tip.write_long(index_dir_offset)?;
    } else {
        tip[tip_offset_slot..tip_offset_slot + 8]
            .copy_from_slice(&index_dir_offset.to_be_bytes());
    }

    dir.add_file(&format!("{}.{}", segment, TERMS_EXTENSION), tim);
    dir.add_file(&format!("{}.{}", segment, TERMS_INDEX_EXTENSION), tip);
    Ok(())
}

// ---------------------------------------------------------------------
// IO observability

/// Wraps a directory and counts read calls and seeks against the terms
/// file, shared across every clone of the opened inputs.
pub struct CountingDirectory {
    inner: RamDirectory,
    pub reads: Arc<AtomicU64>,
    pub seeks: Arc<AtomicU64>,
}

impl CountingDirectory {
    pub fn new(inner: RamDirectory) -> CountingDirectory {
        CountingDirectory {
            inner,
            reads: Arc::new(AtomicU64::new(0)),
            seeks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn seek_count(&self) -> u64 {
        self.seeks.load(Ordering::SeqCst)
    }
}

impl Directory for CountingDirectory {
    fn open_input(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexInput>> {
        let inner = self.inner.open_input(name, context)?;
        if name.ends_with(TERMS_EXTENSION) {
            Ok(Box::new(CountingInput {
                inner,
                reads: Arc::clone(&self.reads),
                seeks: Arc::clone(&self.seeks),
            }))
        } else {
            Ok(inner)
        }
    }
}

pub struct CountingInput {
    inner: Box<dyn IndexInput>,
    reads: Arc<AtomicU64>,
    seeks: Arc<AtomicU64>,
}

impl Read for CountingInput {
    fn read(&mut self, buf: &mut [u8]) -> ::std::io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(buf)
    }
}

impl DataInput for CountingInput {}

impl IndexInput for CountingInput {
    fn clone(&self) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(CountingInput {
            inner: self.inner.clone()?,
            reads: Arc::clone(&self.reads),
            seeks: Arc::clone(&self.seeks),
        }))
    }

    fn file_pointer(&self) -> i64 {
        self.inner.file_pointer()
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        self.seeks.fetch_add(1, Ordering::SeqCst);
        self.inner.seek(pos)
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
