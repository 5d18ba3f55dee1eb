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

use crate::error::Result;
use crate::store::{DataInput, DataOutput};
use crate::util::fst::{Output, OutputFactory};

use std::cmp::min;

/// Arc output carrying a byte sequence; the append operation is
/// concatenation and the identity is the empty sequence.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ByteSequenceOutput {
    bytes: Vec<u8>,
}

impl ByteSequenceOutput {
    pub fn new(bytes: Vec<u8>) -> ByteSequenceOutput {
        ByteSequenceOutput { bytes }
    }

    pub fn empty() -> ByteSequenceOutput {
        ByteSequenceOutput {
            bytes: Vec::with_capacity(0),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn inner(&self) -> &[u8] {
        &self.bytes
    }

    fn starts_with(&self, other: &ByteSequenceOutput) -> bool {
        self.bytes.starts_with(&other.bytes)
    }
}

impl Output for ByteSequenceOutput {
    #[inline]
    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Clone, Copy, Default)]
pub struct ByteSequenceOutputFactory;

impl ByteSequenceOutputFactory {
    pub fn new() -> ByteSequenceOutputFactory {
        ByteSequenceOutputFactory {}
    }
}

impl OutputFactory for ByteSequenceOutputFactory {
    type Value = ByteSequenceOutput;

    fn empty(&self) -> Self::Value {
        ByteSequenceOutput::empty()
    }

    fn common(&self, o1: &Self::Value, o2: &Self::Value) -> Self::Value {
        let stop = min(o1.len(), o2.len());
        let mut pos = 0;
        while pos < stop && o1.bytes[pos] == o2.bytes[pos] {
            pos += 1;
        }
        if pos == 0 {
            self.empty()
        } else {
            ByteSequenceOutput::new(o1.bytes[..pos].to_vec())
        }
    }

    fn subtract(&self, o1: &Self::Value, o2: &Self::Value) -> Self::Value {
        if o2.is_empty() {
            o1.clone()
        } else {
            debug_assert!(o1.starts_with(o2));
            if o1.len() == o2.len() {
                self.empty()
            } else {
                ByteSequenceOutput::new(o1.bytes[o2.len()..].to_vec())
            }
        }
    }

    fn add(&self, prefix: &Self::Value, output: &Self::Value) -> Self::Value {
        if prefix.is_empty() {
            output.clone()
        } else if output.is_empty() {
            prefix.clone()
        } else {
            let mut result = Vec::with_capacity(prefix.len() + output.len());
            result.extend_from_slice(&prefix.bytes);
            result.extend_from_slice(&output.bytes);
            ByteSequenceOutput::new(result)
        }
    }

    fn read<T: DataInput + ?Sized>(&self, data_in: &mut T) -> Result<ByteSequenceOutput> {
        let len = data_in.read_vint()?;
        if len != 0 {
            let mut buffer = vec![0u8; len as usize];
            data_in.read_exact(&mut buffer)?;
            Ok(ByteSequenceOutput::new(buffer))
        } else {
            Ok(self.empty())
        }
    }

    fn write<T: DataOutput + ?Sized>(
        &self,
        output: &ByteSequenceOutput,
        data_out: &mut T,
    ) -> Result<()> {
        data_out.write_vint(output.bytes.len() as i32)?;
        data_out.write_bytes(&output.bytes, 0, output.bytes.len())
    }
}
