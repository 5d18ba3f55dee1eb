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

use crate::error::ErrorKind::UnexpectedEOF;
use crate::error::Result;
use crate::store::{DataInput, Directory, IndexInput, IoContext};

use memmap::Mmap;

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// File-system directory whose inputs are memory-mapped. Clones share the
/// mapping.
pub struct MmapDirectory {
    path: PathBuf,
}

impl MmapDirectory {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        MmapDirectory { path: path.into() }
    }
}

impl Directory for MmapDirectory {
    fn open_input(&self, name: &str, _context: IoContext) -> Result<Box<dyn IndexInput>> {
        let file = File::open(self.path.join(name))?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Box::new(MmapIndexInput {
            name: name.to_string(),
            data: Arc::new(mmap),
            pos: 0,
        }))
    }
}

pub struct MmapIndexInput {
    name: String,
    data: Arc<Mmap>,
    pos: usize,
}

impl Read for MmapIndexInput {
    fn read(&mut self, buf: &mut [u8]) -> ::std::io::Result<usize> {
        let size = buf.len().min(self.data.len() - self.pos);
        buf[..size].copy_from_slice(&self.data[self.pos..self.pos + size]);
        self.pos += size;
        Ok(size)
    }
}

impl DataInput for MmapIndexInput {}

impl IndexInput for MmapIndexInput {
    fn clone(&self) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(MmapIndexInput {
            name: self.name.clone(),
            data: Arc::clone(&self.data),
            pos: self.pos,
        }))
    }

    fn file_pointer(&self) -> i64 {
        self.pos as i64
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        if pos < 0 || pos as usize > self.data.len() {
            bail!(UnexpectedEOF(format!(
                "seek past EOF: pos={} length={} (resource={})",
                pos,
                self.data.len(),
                self.name
            )));
        }
        self.pos = pos as usize;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn name(&self) -> &str {
        &self.name
    }
}
