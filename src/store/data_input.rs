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

use crate::error::ErrorKind::*;
use crate::error::Result;

use std::io::{self, Read};

/// Sequential read access to Lucene's low-level data types.
///
/// Multi-byte fixed-width values are big-endian; vInt/vLong use 7 payload
/// bits per byte with the high bit as continuation marker.
pub trait DataInput: Read {
    fn read_byte(&mut self) -> Result<u8> {
        let mut buffer = [0u8; 1];
        if self.read(&mut buffer)? != 1 {
            bail!(UnexpectedEOF(
                "reached EOF when a single byte is expected".to_owned()
            ))
        } else {
            Ok(buffer[0])
        }
    }

    fn read_bytes(&mut self, b: &mut [u8], offset: usize, length: usize) -> Result<()> {
        let end = offset + length;
        if b.len() < end {
            bail!(IllegalArgument(format!(
                "buffer too small: writing [{}, {}) to [0, {})",
                offset,
                end,
                b.len(),
            )));
        }

        let mut blob = &mut b[offset..end];
        if self.read(&mut blob)? != length {
            bail!(UnexpectedEOF(format!(
                "reached EOF when {} bytes are expected",
                length
            )))
        } else {
            Ok(())
        }
    }

    fn read_short(&mut self) -> Result<i16> {
        let mut buffer = [0u8; 2];
        self.read_exact(&mut buffer)?;
        Ok(i16::from_be_bytes(buffer))
    }

    fn read_int(&mut self) -> Result<i32> {
        let mut buffer = [0u8; 4];
        self.read_exact(&mut buffer)?;
        Ok(i32::from_be_bytes(buffer))
    }

    fn read_long(&mut self) -> Result<i64> {
        let mut buffer = [0u8; 8];
        self.read_exact(&mut buffer)?;
        Ok(i64::from_be_bytes(buffer))
    }

    /// At most 5 bytes; the 5th byte carries only 4 payload bits.
    fn read_vint(&mut self) -> Result<i32> {
        let mut b = self.read_byte()?;
        let mut i = i32::from(b & 0x7f);
        let mut shift = 7;
        while b & 0x80 != 0 {
            b = self.read_byte()?;
            if shift == 28 && (b & 0xf0) != 0 {
                bail!(IllegalState("invalid vInt detected".to_owned()));
            }
            i |= i32::from(b & 0x7f) << shift;
            shift += 7;
        }
        Ok(i)
    }

    /// At most 9 bytes, unsigned interpretation when shifted.
    fn read_vlong(&mut self) -> Result<i64> {
        let mut b = self.read_byte()?;
        let mut i = i64::from(b & 0x7f);
        let mut shift = 7;
        while b & 0x80 != 0 {
            if shift > 56 {
                bail!(IllegalState("invalid vLong detected".to_owned()));
            }
            b = self.read_byte()?;
            i |= i64::from(b & 0x7f) << shift;
            shift += 7;
        }
        Ok(i)
    }

    fn read_string(&mut self) -> Result<String> {
        let length = self.read_vint()?;
        if length < 0 {
            bail!(IllegalState("invalid string length detected".to_owned()));
        }
        let mut buffer = vec![0u8; length as usize];
        self.read_exact(&mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        const SKIP_BUFFER_SIZE: usize = 1024;
        let mut skip_buffer = [0u8; SKIP_BUFFER_SIZE];
        let mut skipped = 0;
        while skipped < count {
            let step = SKIP_BUFFER_SIZE.min(count - skipped);
            self.read_bytes(&mut skip_buffer, 0, step)?;
            skipped += step;
        }
        Ok(())
    }
}

impl<'a> DataInput for &'a [u8] {
    fn read_byte(&mut self) -> Result<u8> {
        if self.is_empty() {
            bail!(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "failed to fill whole buffer"
            ));
        }
        let b = self[0];
        *self = &self[1..];
        Ok(b)
    }

    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        if self.len() < count {
            bail!(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "failed to fill whole buffer"
            ));
        }
        *self = &self[count..];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DataOutput;

    #[test]
    fn test_var_int_round_trip() {
        let values = vec![0i32, 1, 127, 128, 16383, 16384, 1 << 28, i32::max_value()];
        let mut out: Vec<u8> = vec![];
        for v in &values {
            out.write_vint(*v).unwrap();
        }
        let mut input: &[u8] = &out;
        for v in &values {
            assert_eq!(input.read_vint().unwrap(), *v);
        }
    }

    #[test]
    fn test_var_long_round_trip() {
        let values = vec![0i64, 1, 127, 128, 1 << 35, i64::max_value()];
        let mut out: Vec<u8> = vec![];
        for v in &values {
            out.write_vlong(*v).unwrap();
        }
        let mut input: &[u8] = &out;
        for v in &values {
            assert_eq!(input.read_vlong().unwrap(), *v);
        }
    }

    #[test]
    fn test_fixed_width_round_trip() {
        let mut out: Vec<u8> = vec![];
        out.write_short(-2).unwrap();
        out.write_int(0x3FD7_6C17).unwrap();
        out.write_long(-42).unwrap();
        out.write_string("hello").unwrap();
        let mut input: &[u8] = &out;
        assert_eq!(input.read_short().unwrap(), -2);
        assert_eq!(input.read_int().unwrap(), 0x3FD7_6C17);
        assert_eq!(input.read_long().unwrap(), -42);
        assert_eq!(input.read_string().unwrap(), "hello");
    }
}
