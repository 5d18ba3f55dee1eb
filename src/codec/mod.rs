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

pub mod blocktree;
mod field_infos;
mod postings;
mod segment;

pub use self::field_infos::*;
pub use self::postings::*;
pub use self::segment::*;

use crate::error::ErrorKind::{CorruptIndex, IllegalArgument};
use crate::error::Result;
use crate::store::{DataInput, DataOutput};

pub const CODEC_MAGIC: i32 = 0x3FD7_6C17;

/// Outcome of positioning a cursor relative to a target term.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeekStatus {
    /// The cursor moved past the last entry without reaching the target.
    End,
    /// The cursor is positioned exactly on the target.
    Found,
    /// The cursor is positioned on the smallest entry greater than the
    /// target.
    NotFound,
}

pub fn write_header<T: DataOutput + ?Sized>(out: &mut T, codec: &str, version: i32) -> Result<()> {
    let clen = codec.len();
    if clen >= 128 {
        bail!(IllegalArgument(format!(
            "codec must be simple ASCII less than 128 characters, got {}[length={}]",
            codec, clen,
        )));
    }
    out.write_int(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_int(version)
}

pub fn check_header<T: DataInput + ?Sized>(
    data_input: &mut T,
    codec: &str,
    min_ver: i32,
    max_ver: i32,
) -> Result<i32> {
    let actual_header = data_input.read_int()?;
    if actual_header != CODEC_MAGIC {
        bail!(CorruptIndex(format!(
            "codec header mismatch: actual=0x{:X}, expected=0x{:X}",
            actual_header, CODEC_MAGIC
        )));
    }
    check_header_no_magic(data_input, codec, min_ver, max_ver)
}

pub fn check_header_no_magic<T: DataInput + ?Sized>(
    data_input: &mut T,
    codec: &str,
    min_ver: i32,
    max_ver: i32,
) -> Result<i32> {
    let actual_codec = data_input.read_string()?;
    if actual_codec != codec {
        bail!(CorruptIndex(format!(
            "codec mismatch: actual={}, expected={}",
            actual_codec, codec
        )));
    }
    let actual_ver = data_input.read_int()?;
    if actual_ver < min_ver || actual_ver > max_ver {
        bail!(CorruptIndex(format!(
            "index format either too new or too old: {} <= {} <= {} doesn't hold",
            min_ver, actual_ver, max_ver
        )));
    }
    Ok(actual_ver)
}

/// On-disk size of a header written by `write_header`: magic + codec
/// string + version.
pub fn header_length(codec: &str) -> usize {
    9 + codec.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut out: Vec<u8> = vec![];
        write_header(&mut out, "TEST_CODEC", 2).unwrap();
        assert_eq!(out.len(), header_length("TEST_CODEC"));
        let mut input: &[u8] = &out;
        assert_eq!(check_header(&mut input, "TEST_CODEC", 0, 3).unwrap(), 2);
    }

    #[test]
    fn test_header_mismatch() {
        let mut out: Vec<u8> = vec![];
        write_header(&mut out, "TEST_CODEC", 5).unwrap();
        let mut input: &[u8] = &out;
        assert!(check_header(&mut input, "OTHER", 0, 5).is_err());
        let mut input: &[u8] = &out;
        assert!(check_header(&mut input, "TEST_CODEC", 0, 3).is_err());
    }
}
