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
use crate::store::IndexInput;

/// Hint describing how an opened file will be consumed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IoContext {
    Default,
    Read,
    ReadOnce,
}

/// Read surface of an index directory: a flat namespace of files opened
/// as `IndexInput`s.
pub trait Directory: Send + Sync {
    fn open_input(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexInput>>;
}
