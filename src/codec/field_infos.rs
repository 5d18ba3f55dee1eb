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

use crate::error::ErrorKind::IllegalArgument;
use crate::error::Result;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// How much occurrence data was indexed for a field.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum IndexOptions {
    Docs,
    DocsAndFreqs,
    DocsAndFreqsAndPositions,
    DocsAndFreqsAndPositionsAndOffsets,
}

impl IndexOptions {
    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    pub fn has_positions(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositions
    }

    pub fn has_offsets(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    }
}

/// Resolved per-field descriptor, produced by the segment's field-infos
/// codec.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub index_options: IndexOptions,
    pub has_store_payloads: bool,
}

impl FieldInfo {
    pub fn new(name: &str, number: u32, index_options: IndexOptions) -> FieldInfo {
        FieldInfo {
            name: name.to_string(),
            number,
            index_options,
            has_store_payloads: false,
        }
    }
}

/// All field descriptors of one segment, addressable by number and by
/// name.
pub struct FieldInfos {
    pub by_number: BTreeMap<u32, Arc<FieldInfo>>,
    pub by_name: HashMap<String, Arc<FieldInfo>>,
}

impl FieldInfos {
    pub fn new(infos: Vec<FieldInfo>) -> Result<FieldInfos> {
        let mut by_number = BTreeMap::new();
        let mut by_name = HashMap::new();
        for info in infos {
            let info = Arc::new(info);
            if by_number.contains_key(&info.number) {
                bail!(IllegalArgument(format!(
                    "duplicate field number: {}",
                    info.number
                )));
            }
            if by_name.contains_key(&info.name) {
                bail!(IllegalArgument(format!("duplicate field name: {}", info.name)));
            }
            by_number.insert(info.number, Arc::clone(&info));
            by_name.insert(info.name.clone(), info);
        }
        Ok(FieldInfos { by_number, by_name })
    }
}
