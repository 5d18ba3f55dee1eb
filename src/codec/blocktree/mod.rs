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

mod frame;
mod reader;
mod terms_enum;

pub use self::reader::*;
pub use self::terms_enum::*;

/// Extension of the terms dictionary file.
pub const TERMS_EXTENSION: &str = "tim";
pub const TERMS_CODEC_NAME: &str = "BLOCK_TREE_TERMS_DICT";

/// Initial terms format.
pub const VERSION_START: i32 = 0;

/// Append-only terms format: the directory offset moved to the last 8
/// bytes of the file.
pub const VERSION_APPEND_ONLY: i32 = 1;

/// Current terms format.
pub const VERSION_CURRENT: i32 = VERSION_APPEND_ONLY;

/// Extension of the terms index file.
pub const TERMS_INDEX_EXTENSION: &str = "tip";
pub const TERMS_INDEX_CODEC_NAME: &str = "BLOCK_TREE_TERMS_INDEX";

/// An encoded block pointer carries two flags in its low bits; the fp is
/// the remaining high bits.
pub const OUTPUT_FLAGS_NUM_BITS: usize = 2;
pub const OUTPUT_FLAG_IS_FLOOR: i64 = 0x1;
pub const OUTPUT_FLAG_HAS_TERMS: i64 = 0x2;

/// The cursor's current-term buffer, shared with its frames. `exists`
/// records whether the scan position is an exact term (as opposed to a
/// sub-block boundary or a proven miss).
pub struct TermBuffer {
    pub(crate) bytes: Vec<u8>,
    pub(crate) len: usize,
    pub(crate) exists: bool,
}

impl TermBuffer {
    pub(crate) fn new() -> TermBuffer {
        TermBuffer {
            bytes: Vec::new(),
            len: 0,
            exists: false,
        }
    }

    #[inline]
    pub fn term(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub(crate) fn set_len(&mut self, len: usize) {
        if self.bytes.len() < len {
            self.bytes.resize(len, 0);
        }
        self.len = len;
    }

    pub(crate) fn grow(&mut self, capacity: usize) {
        if self.bytes.len() < capacity {
            self.bytes.resize(capacity, 0);
        }
    }

    pub(crate) fn copy_from(&mut self, term: &[u8]) {
        self.set_len(term.len());
        self.bytes[..term.len()].copy_from_slice(term);
    }
}
