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

use crate::codec::FieldInfos;
use crate::store::{Directory, IoContext};

use std::sync::Arc;

/// The slice of segment metadata the term dictionary consumes.
pub struct SegmentInfo {
    pub name: String,
    pub max_doc: i32,
}

impl SegmentInfo {
    pub fn new(name: &str, max_doc: i32) -> SegmentInfo {
        SegmentInfo {
            name: name.to_string(),
            max_doc,
        }
    }
}

/// Everything a format reader needs to open its files for one segment.
pub struct SegmentReadState<'a> {
    pub directory: &'a dyn Directory,
    pub segment_info: &'a SegmentInfo,
    pub field_infos: Arc<FieldInfos>,
    pub context: IoContext,
    pub segment_suffix: String,
}

impl<'a> SegmentReadState<'a> {
    pub fn new(
        directory: &'a dyn Directory,
        segment_info: &'a SegmentInfo,
        field_infos: Arc<FieldInfos>,
        context: IoContext,
        segment_suffix: &str,
    ) -> SegmentReadState<'a> {
        SegmentReadState {
            directory,
            segment_info,
            field_infos,
            context,
            segment_suffix: segment_suffix.to_string(),
        }
    }
}

/// Builds a per-segment file name: `<segment>[_<suffix>].<ext>`.
pub fn segment_file_name(name: &str, suffix: &str, ext: &str) -> String {
    debug_assert!(!ext.starts_with('.'));
    let mut filename = String::with_capacity(name.len() + 2 + suffix.len() + ext.len());
    filename.push_str(name);
    if !suffix.is_empty() {
        filename.push('_');
        filename.push_str(suffix);
    }
    if !ext.is_empty() {
        filename.push('.');
        filename.push_str(ext);
    }
    filename
}
