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

mod bytes_output;
mod bytes_store;
mod fst_builder;
mod fst_reader;

pub use self::bytes_output::*;
pub use self::bytes_store::*;
pub use self::fst_builder::*;
pub use self::fst_reader::*;

use crate::error::Result;
use crate::store::{DataInput, DataOutput};

use std::fmt::Debug;
use std::hash::Hash;
use std::io;

/// An FST arc output value.
pub trait Output: Clone + Eq + Hash + Debug {
    fn is_empty(&self) -> bool;
}

/// The output algebra of an FST: an identity element plus an append
/// operation, and the codec for arc outputs. The dictionary instantiates
/// it exactly once, with byte-sequence outputs.
pub trait OutputFactory: Clone {
    type Value: Output;

    /// Return an empty output.
    fn empty(&self) -> Self::Value;

    /// Longest shared prefix of two outputs; used while building.
    fn common(&self, o1: &Self::Value, o2: &Self::Value) -> Self::Value;

    /// Remove `o2` (a prefix of `o1`) from the front of `o1`.
    fn subtract(&self, o1: &Self::Value, o2: &Self::Value) -> Self::Value;

    /// Append `output` to `prefix`.
    fn add(&self, prefix: &Self::Value, output: &Self::Value) -> Self::Value;

    /// Decode an output value previously written with `write`.
    fn read<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<Self::Value>;

    /// Encode an output value into a `DataOutput`.
    fn write<T: DataOutput + ?Sized>(&self, output: &Self::Value, data_out: &mut T) -> Result<()>;

    /// Decode an output stored on a final arc. By default this just calls
    /// `read`.
    fn read_final_output<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<Self::Value> {
        self.read(data_in)
    }

    /// Encode a final-arc output. By default this just calls `write`.
    fn write_final_output<T: DataOutput + ?Sized>(
        &self,
        output: &Self::Value,
        data_out: &mut T,
    ) -> Result<()> {
        self.write(output, data_out)
    }

    /// Skip an output; defaults to reading and discarding.
    fn skip_output<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<()> {
        self.read(data_in).map(|_| ())
    }

    fn skip_final_output<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<()> {
        self.skip_output(data_in)
    }
}

/// Positionable reader over an FST's node bytes.
pub trait BytesReader: DataInput {
    fn position(&self) -> usize;

    fn set_position(&mut self, pos: usize);
}

/// Bridges byte-holding types that don't have a direct `AsRef<[u8]>` impl
/// (e.g. `Arc<Vec<u8>>`) to a common byte-slice view.
pub trait AsByteSlice {
    fn as_byte_slice(&self) -> &[u8];
}

impl<'a> AsByteSlice for &'a [u8] {
    fn as_byte_slice(&self) -> &[u8] {
        self
    }
}

impl AsByteSlice for std::sync::Arc<Vec<u8>> {
    fn as_byte_slice(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Reads FST node bytes, which are serialized in reverse: every read
/// steps the position backwards, so multi-byte values come back in their
/// original order.
pub struct ReverseBytesReader<T: AsByteSlice> {
    bytes: T,
    pos: isize,
}

impl<T: AsByteSlice> ReverseBytesReader<T> {
    pub fn new(bytes: T) -> ReverseBytesReader<T> {
        ReverseBytesReader { bytes, pos: 0 }
    }
}

impl<T: AsByteSlice> BytesReader for ReverseBytesReader<T> {
    fn position(&self) -> usize {
        self.pos.max(0) as usize
    }

    fn set_position(&mut self, pos: usize) {
        self.pos = pos as isize;
    }
}

impl<T: AsByteSlice> io::Read for ReverseBytesReader<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes = self.bytes.as_byte_slice();
        let len = buf.len().min((self.pos + 1).max(0) as usize);
        for slot in buf.iter_mut().take(len) {
            *slot = bytes[self.pos as usize];
            self.pos -= 1;
        }
        Ok(len)
    }
}

impl<T: AsByteSlice> DataInput for ReverseBytesReader<T> {
    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        self.pos -= count as isize;
        Ok(())
    }
}
