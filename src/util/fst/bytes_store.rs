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

use crate::store::DataOutput;

use std::io::{self, Write};

/// Growable byte buffer an FST is serialized into while it is built.
/// Supports the in-place edits node freezing needs: reversing a node's
/// bytes, sliding arcs into a fixed-width array, and patching a header.
#[derive(Default)]
pub struct BytesStore {
    bytes: Vec<u8>,
}

impl BytesStore {
    pub fn new() -> BytesStore {
        BytesStore { bytes: Vec::new() }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Extend with `count` zero bytes.
    pub fn skip_bytes(&mut self, count: usize) {
        self.bytes.resize(self.bytes.len() + count, 0);
    }

    /// Reverse bytes in the inclusive range `[start, end]`.
    pub fn reverse(&mut self, start: usize, end: usize) {
        debug_assert!(end < self.bytes.len());
        self.bytes[start..=end].reverse();
    }

    /// Move `len` bytes from `src` to `dest`; ranges may overlap.
    pub fn copy_bytes_local(&mut self, src: usize, dest: usize, len: usize) {
        debug_assert!(src < dest);
        self.bytes.copy_within(src..src + len, dest);
    }

    /// Overwrite already-written bytes at `dest`.
    pub fn write_bytes_local(&mut self, dest: usize, bytes: &[u8]) {
        self.bytes[dest..dest + bytes.len()].copy_from_slice(bytes);
    }
}

impl Write for BytesStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DataOutput for BytesStore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_edits() {
        let mut store = BytesStore::new();
        store.write_byte(9).unwrap();
        store.write_bytes(&[1, 2, 3, 4], 0, 4).unwrap();
        store.reverse(1, 4);
        assert_eq!(store.as_slice(), &[9, 4, 3, 2, 1]);
        store.skip_bytes(2);
        store.copy_bytes_local(1, 5, 2);
        assert_eq!(store.as_slice(), &[9, 4, 3, 2, 1, 4, 3]);
        store.write_bytes_local(0, &[7]);
        assert_eq!(store.position(), 7);
        assert_eq!(store.as_slice()[0], 7);
    }
}
