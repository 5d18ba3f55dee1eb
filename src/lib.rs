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

//! A block-tree term dictionary reader for Lucene-compatible search
//! indexes.
//!
//! The terms index is a prefix trie whose internal nodes are encoded as a
//! finite state transducer and whose leaves are variable length blocks of
//! terms sharing a common prefix. `seek_exact` is often able to prove a
//! term cannot exist without doing any IO at all: the FST descent lands on
//! a block known to carry no terms.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate memmap;

pub mod codec;
pub mod error;
pub mod store;
pub mod util;
