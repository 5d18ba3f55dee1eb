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

use crate::codec::blocktree::{
    SegmentTermsEnum, OUTPUT_FLAGS_NUM_BITS, TERMS_CODEC_NAME, TERMS_EXTENSION,
    TERMS_INDEX_CODEC_NAME, TERMS_INDEX_EXTENSION, VERSION_APPEND_ONLY, VERSION_CURRENT,
    VERSION_START,
};
use crate::codec::{
    self, segment_file_name, FieldInfo, IndexOptions, PostingsReader, SegmentReadState,
};
use crate::error::ErrorKind::CorruptIndex;
use crate::error::Result;
use crate::store::{DataInput, IndexInput};
use crate::util::fst::{ByteSequenceOutputFactory, Fst};
use crate::util::UnsignedShift;

use std::collections::BTreeMap;
use std::sync::Arc;

type FstRef = Arc<Fst<ByteSequenceOutputFactory>>;

/// A block-based terms dictionary that assigns terms to variable length
/// blocks according to how they share prefixes.
///
/// The terms index is a prefix trie whose leaves are term blocks. The
/// advantage of this approach is that `seek_exact` is often able to
/// determine that a term cannot exist without doing any IO. The data
/// structure is very similar to a burst trie
/// (http://citeseer.ist.psu.edu/viewdoc/summary?doi=10.1.1.18.3499), but
/// with added logic to break up too-large blocks of all terms sharing a
/// given prefix into smaller ones.
pub struct BlockTreeTermsReader {
    /// Open input to the main terms dict file, kept for the lifetime of
    /// the reader; cursors clone it on demand.
    terms_in: Arc<dyn IndexInput>,
    postings_reader: Arc<dyn PostingsReader>,
    fields: BTreeMap<String, Arc<FieldReader>>,
    segment: String,
    version: i32,
}

impl BlockTreeTermsReader {
    pub fn new<P: PostingsReader + 'static>(
        mut postings_reader: P,
        state: &SegmentReadState<'_>,
    ) -> Result<BlockTreeTermsReader> {
        let segment = state.segment_info.name.clone();
        let terms_name = segment_file_name(&segment, &state.segment_suffix, TERMS_EXTENSION);
        let mut terms_in = state.directory.open_input(&terms_name, state.context)?;
        let version = codec::check_header(
            terms_in.as_mut(),
            TERMS_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
        )?;
        let mut dir_offset = 0;
        if version < VERSION_APPEND_ONLY {
            dir_offset = terms_in.read_long()?;
        }

        let index_name = segment_file_name(&segment, &state.segment_suffix, TERMS_INDEX_EXTENSION);
        let mut index_in = state.directory.open_input(&index_name, state.context)?;
        let index_version = codec::check_header(
            index_in.as_mut(),
            TERMS_INDEX_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
        )?;
        if index_version != version {
            bail!(CorruptIndex(format!(
                "mismatched version files: {}={} != {}={}",
                terms_name, version, index_name, index_version
            )));
        }
        let mut index_dir_offset = 0;
        if index_version < VERSION_APPEND_ONLY {
            index_dir_offset = index_in.read_long()?;
        }

        // have the postings reader init itself
        postings_reader.init(terms_in.as_mut())?;
        let postings_reader: Arc<dyn PostingsReader> = Arc::new(postings_reader);

        // read the per-field details
        Self::seek_dir(terms_in.as_mut(), version, dir_offset)?;
        Self::seek_dir(index_in.as_mut(), version, index_dir_offset)?;

        let num_fields = terms_in.read_vint()?;
        if num_fields < 0 {
            bail!(CorruptIndex(format!(
                "invalid num_fields: {} (resource={})",
                num_fields, terms_name
            )));
        }
        debug!("opening {}: {} fields", terms_name, num_fields);

        let shared_terms_in: Arc<dyn IndexInput> = Arc::from(terms_in.clone()?);
        let mut fields = BTreeMap::new();

        for _ in 0..num_fields {
            let field_number = terms_in.read_vint()?;
            let num_terms = terms_in.read_vlong()?;
            if num_terms <= 0 {
                bail!(CorruptIndex(format!(
                    "illegal num_terms {} for field number {} (resource={})",
                    num_terms, field_number, terms_name
                )));
            }
            let num_bytes = terms_in.read_vint()?;
            if num_bytes < 0 {
                bail!(CorruptIndex(format!(
                    "invalid root_code for field number {}: num_bytes={} (resource={})",
                    field_number, num_bytes, terms_name
                )));
            }
            let mut root_code = vec![0u8; num_bytes as usize];
            terms_in.read_exact(&mut root_code)?;

            let field_info = match state.field_infos.by_number.get(&(field_number as u32)) {
                Some(info) => Arc::clone(info),
                None => bail!(CorruptIndex(format!(
                    "invalid field number: {} (resource={})",
                    field_number, terms_name
                ))),
            };
            let sum_total_term_freq = if field_info.index_options == IndexOptions::Docs {
                -1
            } else {
                terms_in.read_vlong()?
            };
            let sum_doc_freq = terms_in.read_vlong()?;
            let doc_count = terms_in.read_vint()?;
            if doc_count < 0 || doc_count > state.segment_info.max_doc {
                // #docs with this field must be <= #docs
                bail!(CorruptIndex(format!(
                    "invalid doc_count: {} max_doc: {} (resource={})",
                    doc_count, state.segment_info.max_doc, terms_name
                )));
            }
            if sum_doc_freq < i64::from(doc_count) {
                // #postings must be >= #docs with this field
                bail!(CorruptIndex(format!(
                    "invalid sum_doc_freq: {} doc_count: {} (resource={})",
                    sum_doc_freq, doc_count, terms_name
                )));
            }
            if sum_total_term_freq != -1 && sum_total_term_freq < sum_doc_freq {
                // #positions must be >= #postings
                bail!(CorruptIndex(format!(
                    "invalid sum_total_term_freq: {} sum_doc_freq: {} (resource={})",
                    sum_total_term_freq, sum_doc_freq, terms_name
                )));
            }
            let index_start_fp = index_in.read_vlong()?;
            if fields.contains_key(&field_info.name) {
                bail!(CorruptIndex(format!(
                    "duplicate field: {} (resource={})",
                    field_info.name, terms_name
                )));
            }
            debug!(
                "  field {} num_terms={} doc_count={}",
                field_info.name, num_terms, doc_count
            );

            let reader = FieldReader::new(
                field_info.clone(),
                num_terms,
                root_code,
                sum_total_term_freq,
                sum_doc_freq,
                doc_count,
                index_start_fp,
                index_in.as_mut(),
                Arc::clone(&shared_terms_in),
                Arc::clone(&postings_reader),
            )?;
            fields.insert(field_info.name.clone(), Arc::new(reader));
        }

        // the index input is dropped here: every field's FST is memory
        // resident now
        Ok(BlockTreeTermsReader {
            terms_in: shared_terms_in,
            postings_reader,
            fields,
            segment,
            version,
        })
    }

    /// Seek `input` to its directory. The append-only format stores the
    /// directory offset in the last 8 bytes of the file; before that it
    /// sat right behind the header.
    fn seek_dir(input: &mut dyn IndexInput, version: i32, dir_offset: i64) -> Result<()> {
        let dir_offset = if version >= VERSION_APPEND_ONLY {
            input.seek(input.len() as i64 - 8)?;
            input.read_long()?
        } else {
            dir_offset
        };
        input.seek(dir_offset)
    }

    /// The per-field terms, or `None` when the field is unknown.
    pub fn terms(&self, field: &str) -> Option<Arc<FieldReader>> {
        self.fields.get(field).map(Arc::clone)
    }

    pub fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.fields.len()
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn postings_reader(&self) -> &Arc<dyn PostingsReader> {
        &self.postings_reader
    }

    pub fn terms_in(&self) -> &Arc<dyn IndexInput> {
        &self.terms_in
    }
}

/// Per-field entry point of the terms dictionary: the field's statistics
/// plus its FST index, from which cursors are constructed.
pub struct FieldReader {
    field_info: Arc<FieldInfo>,
    num_terms: i64,
    sum_total_term_freq: i64,
    sum_doc_freq: i64,
    doc_count: i32,
    index_start_fp: i64,
    root_block_fp: i64,
    root_code: Vec<u8>,
    index: FstRef,
    terms_in: Arc<dyn IndexInput>,
    postings_reader: Arc<dyn PostingsReader>,
}

impl FieldReader {
    #[allow(clippy::too_many_arguments)]
    fn new(
        field_info: Arc<FieldInfo>,
        num_terms: i64,
        root_code: Vec<u8>,
        sum_total_term_freq: i64,
        sum_doc_freq: i64,
        doc_count: i32,
        index_start_fp: i64,
        index_in: &mut dyn IndexInput,
        terms_in: Arc<dyn IndexInput>,
        postings_reader: Arc<dyn PostingsReader>,
    ) -> Result<FieldReader> {
        debug_assert!(num_terms > 0);
        let root_block_fp = root_code
            .as_slice()
            .read_vlong()?
            .unsigned_shift(OUTPUT_FLAGS_NUM_BITS);

        let mut clone = index_in.clone()?;
        clone.seek(index_start_fp)?;
        let index = Arc::new(Fst::from_input(
            clone.as_mut(),
            ByteSequenceOutputFactory::new(),
        )?);

        Ok(FieldReader {
            field_info,
            num_terms,
            root_code,
            sum_total_term_freq,
            sum_doc_freq,
            doc_count,
            index_start_fp,
            root_block_fp,
            index,
            terms_in,
            postings_reader,
        })
    }

    /// A new cursor over this field's terms.
    pub fn iterator(&self) -> Result<SegmentTermsEnum> {
        Ok(SegmentTermsEnum::new(
            Arc::clone(&self.field_info),
            Arc::clone(&self.index),
            self.root_code.clone(),
            Arc::clone(&self.postings_reader),
            Arc::clone(&self.terms_in),
        ))
    }

    pub fn field_info(&self) -> &FieldInfo {
        &self.field_info
    }

    pub fn size(&self) -> i64 {
        self.num_terms
    }

    pub fn sum_total_term_freq(&self) -> i64 {
        self.sum_total_term_freq
    }

    pub fn sum_doc_freq(&self) -> i64 {
        self.sum_doc_freq
    }

    pub fn doc_count(&self) -> i32 {
        self.doc_count
    }

    pub fn has_freqs(&self) -> bool {
        self.field_info.index_options.has_freqs()
    }

    pub fn has_positions(&self) -> bool {
        self.field_info.index_options.has_positions()
    }

    pub fn index_start_fp(&self) -> i64 {
        self.index_start_fp
    }

    pub fn root_block_fp(&self) -> i64 {
        self.root_block_fp
    }
}
