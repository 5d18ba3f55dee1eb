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

use crate::error::ErrorKind::{IllegalArgument, UnexpectedEOF};
use crate::error::Result;
use crate::store::{DataInput, Directory, IndexInput, IoContext};

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, RwLock};

/// A memory-resident directory. Each file is an immutable byte array;
/// inputs share the storage and carry their own position.
#[derive(Default)]
pub struct RamDirectory {
    files: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl RamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, name: &str, bytes: Vec<u8>) {
        self.files
            .write()
            .unwrap()
            .insert(name.to_string(), Arc::new(bytes));
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Copies a file from another in-memory directory; storage is
    /// shared, not duplicated.
    pub fn copy_from(&self, other: &RamDirectory, src: &str, dest: &str) -> Result<()> {
        let data = match other.files.read().unwrap().get(src) {
            Some(data) => Arc::clone(data),
            None => bail!(IllegalArgument(format!("file not found: {}", src))),
        };
        self.files.write().unwrap().insert(dest.to_string(), data);
        Ok(())
    }
}

impl Directory for RamDirectory {
    fn open_input(&self, name: &str, _context: IoContext) -> Result<Box<dyn IndexInput>> {
        let files = self.files.read().unwrap();
        match files.get(name) {
            Some(data) => Ok(Box::new(RamIndexInput {
                name: name.to_string(),
                data: Arc::clone(data),
                pos: 0,
            })),
            None => bail!(IllegalArgument(format!("file not found: {}", name))),
        }
    }
}

pub struct RamIndexInput {
    name: String,
    data: Arc<Vec<u8>>,
    pos: usize,
}

impl Read for RamIndexInput {
    fn read(&mut self, buf: &mut [u8]) -> ::std::io::Result<usize> {
        let size = buf.len().min(self.data.len() - self.pos);
        buf[..size].copy_from_slice(&self.data[self.pos..self.pos + size]);
        self.pos += size;
        Ok(size)
    }
}

impl DataInput for RamIndexInput {}

impl IndexInput for RamIndexInput {
    fn clone(&self) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(RamIndexInput {
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
