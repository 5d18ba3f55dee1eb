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

use crate::codec;
use crate::error::ErrorKind::{CorruptIndex, IllegalState};
use crate::error::Result;
use crate::store::{DataInput, DataOutput};
use crate::util::fst::bytes_store::BytesStore;
use crate::util::fst::fst_builder::{Node, UnCompiledNode};
use crate::util::fst::{BytesReader, Output, OutputFactory, ReverseBytesReader};

use std::sync::Arc;

const BIT_FINAL_ARC: u8 = 1;
const BIT_LAST_ARC: u8 = 1 << 1;
const BIT_TARGET_NEXT: u8 = 1 << 2;
const BIT_STOP_NODE: u8 = 1 << 3;
const BIT_ARC_HAS_OUTPUT: u8 = 1 << 4;
const BIT_ARC_HAS_FINAL_OUTPUT: u8 = 1 << 5;

/// We use this as a marker (because this one flag is illegal by
/// itself...): arcs stored as a fixed-size array so lookups can binary
/// search by label.
const ARCS_AS_FIXED_ARRAY: u8 = BIT_ARC_HAS_FINAL_OUTPUT;

const FIXED_ARRAY_SHALLOW_DISTANCE: i32 = 3;
const FIXED_ARRAY_NUM_ARCS_SHALLOW: usize = 5;
const FIXED_ARRAY_NUM_ARCS_DEEP: usize = 10;

const FILE_FORMAT_NAME: &str = "FST";

const VERSION_PACKED: i32 = 3;
const VERSION_VINT_TARGET: i32 = 4;
const VERSION_NO_NODE_ARC_COUNTS: i32 = 5;
const VERSION_PACKED_REMOVED: i32 = 6;
const VERSION_CURRENT: i32 = VERSION_PACKED_REMOVED;

pub const FINAL_END_NODE: CompiledAddress = -1;
pub const NON_FINAL_END_NODE: CompiledAddress = 0;

fn flag(flags: u8, bit: u8) -> bool {
    (flags & bit) != 0
}

pub type Label = i32;
pub type CompiledAddress = i64;

#[derive(Clone, Copy)]
pub enum InputType {
    Byte1,
    Byte2,
    Byte4,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FstArc<T: Output> {
    pub flags: u8,
    pub label: Label,
    pub output: Option<T>,
    pub next_final_output: Option<T>,
    pub next_arc: Option<CompiledAddress>,
    /// To node.
    pub target: CompiledAddress,
    /// Where the first arc in the array starts; only valid if
    /// bytes_per_arc != 0.
    pub arc_start_position: usize,
    /// Non-zero if this arc is part of a fixed-width array, which allows
    /// random access by index.
    pub bytes_per_arc: usize,
    /// Where we are in the array; only valid if bytes_per_arc != 0.
    pub arc_index: usize,
    /// How many arcs in the array; only valid if bytes_per_arc != 0.
    pub num_arcs: usize,
}

impl<T: Output> FstArc<T> {
    pub fn empty() -> FstArc<T> {
        FstArc {
            flags: 0,
            label: 0,
            output: None,
            next_final_output: None,
            next_arc: None,
            target: 0,
            arc_start_position: 0,
            bytes_per_arc: 0,
            arc_index: 0,
            num_arcs: 0,
        }
    }

    pub fn is_last(&self) -> bool {
        flag(self.flags, BIT_LAST_ARC)
    }

    pub fn is_final(&self) -> bool {
        flag(self.flags, BIT_FINAL_ARC)
    }
}

enum FstData {
    /// Still being built, node bytes in a growable store.
    Building(BytesStore),
    /// Immutable, loaded or finished; shared with every reader.
    Loaded(Arc<Vec<u8>>),
}

/// An immutable, minimal, acyclic byte-labelled automaton whose arc
/// outputs compose along each accepted path.
pub struct Fst<F: OutputFactory> {
    pub input_type: InputType,
    /// If set, this FST accepts the empty string and produces this
    /// output.
    pub empty_output: Option<F::Value>,
    data: FstData,
    start_node: CompiledAddress,
    version: i32,
    outputs: F,
}

impl<F: OutputFactory> Fst<F> {
    pub fn new(input_type: InputType, outputs: F) -> Self {
        let mut store = BytesStore::new();
        // pad byte: address 0 is reserved as the non-final end-node marker
        let _ = store.write_byte(0);
        Fst {
            input_type,
            empty_output: None,
            data: FstData::Building(store),
            start_node: -1,
            version: VERSION_CURRENT,
            outputs,
        }
    }

    pub fn from_input<I: DataInput + ?Sized>(data_in: &mut I, outputs: F) -> Result<Self> {
        // Only reads the most recent formats; FSTs carry no back-compat
        // promise.
        let version =
            codec::check_header(data_in, FILE_FORMAT_NAME, VERSION_PACKED, VERSION_CURRENT)?;

        if version < VERSION_PACKED_REMOVED && data_in.read_byte()? == 1 {
            bail!(CorruptIndex("cannot read packed FSTs anymore".into()));
        }

        let empty_output = if data_in.read_byte()? == 1 {
            // accepts the empty string; the output bytes are stored
            // reversed
            let num_bytes = data_in.read_vint()? as usize;
            let mut bytes = vec![0u8; num_bytes];
            data_in.read_exact(&mut bytes)?;
            let mut reader = ReverseBytesReader::new(bytes.as_slice());
            if num_bytes > 0 {
                reader.set_position(num_bytes - 1);
            }
            Some(outputs.read_final_output(&mut reader)?)
        } else {
            None
        };

        let input_type = match data_in.read_byte()? {
            0 => InputType::Byte1,
            1 => InputType::Byte2,
            2 => InputType::Byte4,
            x => bail!(IllegalState(format!("invalid input type: {}", x))),
        };
        let start_node = data_in.read_vlong()? as CompiledAddress;
        if version < VERSION_NO_NODE_ARC_COUNTS {
            data_in.read_vlong()?;
            data_in.read_vlong()?;
            data_in.read_vlong()?;
        }

        let num_bytes = data_in.read_vlong()? as usize;
        let mut node_bytes = vec![0u8; num_bytes];
        data_in.read_exact(&mut node_bytes)?;

        Ok(Fst {
            input_type,
            empty_output,
            data: FstData::Loaded(Arc::new(node_bytes)),
            start_node,
            version,
            outputs,
        })
    }

    pub fn outputs(&self) -> &F {
        &self.outputs
    }

    pub fn set_empty_output(&mut self, v: F::Value) {
        debug_assert!(self.empty_output.is_none());
        self.empty_output = Some(v);
    }

    fn node_bytes(&self) -> &[u8] {
        match self.data {
            FstData::Building(ref store) => store.as_slice(),
            FstData::Loaded(ref bytes) => bytes,
        }
    }

    pub(crate) fn store_mut(&mut self) -> &mut BytesStore {
        match self.data {
            FstData::Building(ref mut store) => store,
            FstData::Loaded(_) => panic!("FST is frozen"),
        }
    }

    pub(crate) fn builder_position(&self) -> usize {
        match self.data {
            FstData::Building(ref store) => store.position(),
            FstData::Loaded(ref bytes) => bytes.len(),
        }
    }

    /// Reader over the node bytes for long-lived consumers; the storage
    /// is shared, the position is private.
    pub fn bytes_reader(&self) -> ReverseBytesReader<Arc<Vec<u8>>> {
        match self.data {
            FstData::Loaded(ref bytes) => ReverseBytesReader::new(Arc::clone(bytes)),
            FstData::Building(_) => panic!("FST is still being built"),
        }
    }

    /// Borrowing reader, usable while the FST is still being built.
    pub(crate) fn building_reader(&self) -> ReverseBytesReader<&[u8]> {
        ReverseBytesReader::new(self.node_bytes())
    }

    /// Follows the `bytes` path through the automaton and returns the
    /// composed output, or `None` when the path is not accepted. Used by
    /// debug assertions and tests.
    pub fn get(&self, bytes: &[u8]) -> Result<Option<F::Value>> {
        let mut arc = self.root_arc();
        let mut output = self.outputs.empty();
        let mut reader = self.building_reader();

        for label in bytes {
            match self.find_target_arc(Label::from(*label), &arc, &mut reader)? {
                Some(next) => {
                    arc = next;
                    if let Some(ref out) = arc.output {
                        if !out.is_empty() {
                            output = self.outputs.add(&output, out);
                        }
                    }
                }
                None => return Ok(None),
            }
        }

        if arc.is_final() {
            if let Some(ref out) = arc.next_final_output {
                if !out.is_empty() {
                    output = self.outputs.add(&output, out);
                }
            }
            Ok(Some(output))
        } else {
            Ok(None)
        }
    }

    /// The incoming arc of the start node. It is final whenever the FST
    /// accepts the empty string.
    pub fn root_arc(&self) -> FstArc<F::Value> {
        let mut arc = FstArc::empty();
        if let Some(ref empty_output) = self.empty_output {
            arc.flags = BIT_FINAL_ARC | BIT_LAST_ARC;
            arc.next_final_output = Some(empty_output.clone());
            if !empty_output.is_empty() {
                arc.flags |= BIT_ARC_HAS_FINAL_OUTPUT;
            }
        } else {
            arc.flags = BIT_LAST_ARC;
            arc.next_final_output = Some(self.outputs.empty());
        }
        arc.output = Some(self.outputs.empty());
        // if there are no nodes, ie the FST only accepts the empty
        // string, then start_node is 0
        arc.target = self.start_node;
        arc
    }

    /// Resolve the outgoing arc of `follow`'s target node labelled
    /// `label`, or `None` when the node has no such arc.
    pub fn find_target_arc(
        &self,
        label: Label,
        follow: &FstArc<F::Value>,
        reader: &mut dyn BytesReader,
    ) -> Result<Option<FstArc<F::Value>>> {
        if !self.target_has_arcs(follow.target) {
            return Ok(None);
        }

        reader.set_position(follow.target as usize);

        if reader.read_byte()? == ARCS_AS_FIXED_ARRAY {
            // arcs are a full array; do binary search
            let mut arc = FstArc::empty();
            arc.num_arcs = reader.read_vint()? as usize;
            arc.bytes_per_arc = if self.version >= VERSION_VINT_TARGET {
                reader.read_vint()? as usize
            } else {
                reader.read_int()? as usize
            };
            arc.arc_start_position = reader.position();
            let mut low = 0usize;
            let mut high = arc.num_arcs - 1;
            while low <= high {
                let mid = (low + high) >> 1;
                reader.set_position(arc.arc_start_position);
                reader.skip_bytes(arc.bytes_per_arc * mid + 1)?;
                let current_label = self.read_label(reader)?;
                if current_label < label {
                    low = mid + 1;
                } else if current_label > label {
                    if mid == 0 {
                        break;
                    }
                    high = mid - 1;
                } else {
                    arc.arc_index = mid;
                    self.read_next_real_arc(&mut arc, reader)?;
                    return Ok(Some(arc));
                }
            }
            return Ok(None);
        }

        // linear scan
        let mut arc = self.read_first_real_arc(follow.target, reader)?;
        loop {
            if arc.label == label {
                return Ok(Some(arc));
            } else if arc.label > label || arc.is_last() {
                return Ok(None);
            } else {
                self.read_next_real_arc(&mut arc, reader)?;
            }
        }
    }

    fn target_has_arcs(&self, target: CompiledAddress) -> bool {
        target > 0
    }

    fn read_label(&self, reader: &mut dyn BytesReader) -> Result<Label> {
        match self.input_type {
            InputType::Byte1 => reader.read_byte().map(Label::from),
            InputType::Byte2 => reader.read_short().map(Label::from),
            InputType::Byte4 => reader.read_vint(),
        }
    }

    pub fn read_first_real_arc(
        &self,
        node: CompiledAddress,
        reader: &mut dyn BytesReader,
    ) -> Result<FstArc<F::Value>> {
        reader.set_position(node as usize);

        let mut arc = FstArc::empty();
        if reader.read_byte()? == ARCS_AS_FIXED_ARRAY {
            arc.num_arcs = reader.read_vint()? as usize;
            arc.bytes_per_arc = if self.version >= VERSION_VINT_TARGET {
                reader.read_vint()? as usize
            } else {
                reader.read_int()? as usize
            };
            arc.arc_start_position = reader.position();
            arc.arc_index = 0;
        } else {
            arc.next_arc = Some(node);
        }
        self.read_next_real_arc(&mut arc, reader)?;
        Ok(arc)
    }

    pub fn read_next_real_arc(
        &self,
        arc: &mut FstArc<F::Value>,
        reader: &mut dyn BytesReader,
    ) -> Result<()> {
        if arc.bytes_per_arc > 0 {
            debug_assert!(arc.arc_index < arc.num_arcs);
            reader.set_position(arc.arc_start_position);
            reader.skip_bytes(arc.arc_index * arc.bytes_per_arc)?;
            arc.arc_index += 1;
        } else {
            debug_assert!(arc.next_arc.is_some());
            reader.set_position(arc.next_arc.unwrap() as usize);
        }

        arc.flags = reader.read_byte()?;
        arc.label = self.read_label(reader)?;
        arc.output = if flag(arc.flags, BIT_ARC_HAS_OUTPUT) {
            Some(self.outputs.read(reader)?)
        } else {
            None
        };
        arc.next_final_output = if flag(arc.flags, BIT_ARC_HAS_FINAL_OUTPUT) {
            Some(self.outputs.read_final_output(reader)?)
        } else {
            None
        };
        if flag(arc.flags, BIT_STOP_NODE) {
            arc.target = FINAL_END_NODE;
            arc.next_arc = Some(reader.position() as i64);
        } else if flag(arc.flags, BIT_TARGET_NEXT) {
            arc.next_arc = Some(reader.position() as i64);
            if !flag(arc.flags, BIT_LAST_ARC) {
                if arc.bytes_per_arc > 0 {
                    reader.set_position(arc.arc_start_position);
                    reader.skip_bytes(arc.bytes_per_arc * arc.num_arcs)?;
                } else {
                    self.seek_to_next_node(reader)?;
                }
            }
            arc.target = reader.position() as CompiledAddress;
        } else {
            arc.target = self.read_unpacked_node(reader)?;
            arc.next_arc = Some(reader.position() as i64);
        }
        Ok(())
    }

    fn seek_to_next_node(&self, reader: &mut dyn BytesReader) -> Result<()> {
        loop {
            let flags = reader.read_byte()?;
            self.read_label(reader)?;

            if flag(flags, BIT_ARC_HAS_OUTPUT) {
                self.outputs.skip_output(reader)?;
            }
            if flag(flags, BIT_ARC_HAS_FINAL_OUTPUT) {
                self.outputs.skip_final_output(reader)?;
            }
            if !flag(flags, BIT_STOP_NODE) && !flag(flags, BIT_TARGET_NEXT) {
                self.read_unpacked_node(reader)?;
            }
            if flag(flags, BIT_LAST_ARC) {
                return Ok(());
            }
        }
    }

    fn read_unpacked_node(&self, reader: &mut dyn BytesReader) -> Result<CompiledAddress> {
        if self.version < VERSION_VINT_TARGET {
            reader.read_int().map(CompiledAddress::from)
        } else {
            reader.read_vlong()
        }
    }

    // build side

    /// Serializes a frozen node by appending its bytes (reversed) to the
    /// store, returning its address.
    pub(crate) fn add_node(
        &mut self,
        node: &UnCompiledNode<F>,
        last_frozen_node: CompiledAddress,
        allow_array_arcs: bool,
        reused_bytes_per_arc: &mut Vec<usize>,
    ) -> Result<CompiledAddress> {
        if node.num_arcs == 0 {
            return if node.is_final {
                Ok(FINAL_END_NODE)
            } else {
                Ok(NON_FINAL_END_NODE)
            };
        }
        let start_address = self.builder_position();
        let outputs = self.outputs.clone();

        let do_fixed_array = Self::should_expand(node, allow_array_arcs);
        if do_fixed_array && reused_bytes_per_arc.len() < node.num_arcs {
            reused_bytes_per_arc.resize(node.num_arcs, 0);
        }

        let last_arc = node.num_arcs - 1;
        let mut last_arc_start = start_address;
        let mut max_bytes_per_arc = 0;
        for idx in 0..node.num_arcs {
            let arc = &node.arcs[idx];
            let target = match arc.target {
                Node::Compiled(c) => c,
                Node::UnCompiled(_) => unreachable!(),
            };
            let mut flags = 0u8;
            if idx == last_arc {
                flags += BIT_LAST_ARC;
            }
            if last_frozen_node == target && !do_fixed_array {
                flags += BIT_TARGET_NEXT;
            }
            if arc.is_final {
                flags += BIT_FINAL_ARC;
                if !arc.next_final_output.is_empty() {
                    flags += BIT_ARC_HAS_FINAL_OUTPUT;
                }
            } else {
                debug_assert!(arc.next_final_output.is_empty());
            }
            let target_has_arcs = target > 0;
            if !target_has_arcs {
                flags += BIT_STOP_NODE;
            }
            if !arc.output.is_empty() {
                flags += BIT_ARC_HAS_OUTPUT;
            }

            self.store_mut().write_byte(flags)?;
            self.write_label(arc.label)?;
            if !arc.output.is_empty() {
                outputs.write(&arc.output, self.store_mut())?;
            }
            if !arc.next_final_output.is_empty() {
                outputs.write_final_output(&arc.next_final_output, self.store_mut())?;
            }
            if target_has_arcs && (flags & BIT_TARGET_NEXT) == 0 {
                debug_assert!(target > 0);
                self.store_mut().write_vlong(target)?;
            }

            // on the first pass just record how many bytes each arc took
            if do_fixed_array {
                let length = self.builder_position() - last_arc_start;
                reused_bytes_per_arc[idx] = length;
                last_arc_start = self.builder_position();
                max_bytes_per_arc = max_bytes_per_arc.max(length);
            }
        }

        if do_fixed_array {
            debug_assert!(max_bytes_per_arc > 0);
            // 2nd pass expands all arcs to a fixed byte size
            let mut header: Vec<u8> = Vec::with_capacity(11);
            header.write_byte(ARCS_AS_FIXED_ARRAY)?;
            header.write_vint(node.num_arcs as i32)?;
            header.write_vint(max_bytes_per_arc as i32)?;
            let fixed_array_start = start_address + header.len();

            // expand the arcs in place, backwards
            let mut src_pos = self.builder_position();
            let mut dest_pos = fixed_array_start + node.num_arcs * max_bytes_per_arc;
            debug_assert!(dest_pos >= src_pos);
            if dest_pos > src_pos {
                self.store_mut().skip_bytes(dest_pos - src_pos);
                for i in 0..node.num_arcs {
                    let arc_idx = node.num_arcs - 1 - i;
                    dest_pos -= max_bytes_per_arc;
                    src_pos -= reused_bytes_per_arc[arc_idx];
                    if src_pos != dest_pos {
                        debug_assert!(dest_pos > src_pos);
                        self.store_mut().copy_bytes_local(
                            src_pos,
                            dest_pos,
                            reused_bytes_per_arc[arc_idx],
                        );
                    }
                }
            }
            self.store_mut().write_bytes_local(start_address, &header);
        }

        let this_node_address = self.builder_position() - 1;
        self.store_mut().reverse(start_address, this_node_address);
        Ok(this_node_address as CompiledAddress)
    }

    fn write_label(&mut self, v: Label) -> Result<()> {
        debug_assert!(v >= 0);
        match self.input_type {
            InputType::Byte1 => {
                debug_assert!(v <= 255);
                self.store_mut().write_byte(v as u8)
            }
            InputType::Byte2 => {
                debug_assert!(v <= 65535);
                self.store_mut().write_short(v as i16)
            }
            InputType::Byte4 => self.store_mut().write_vint(v),
        }
    }

    /// Nodes are expanded into a fixed-width arc array when they are
    /// shallow with moderate fan-out, or have large fan-out anywhere.
    /// The array wastes bytes but turns lookups into a binary search.
    fn should_expand(node: &UnCompiledNode<F>, allow_array_arcs: bool) -> bool {
        allow_array_arcs
            && ((node.depth <= FIXED_ARRAY_SHALLOW_DISTANCE
                && node.num_arcs >= FIXED_ARRAY_NUM_ARCS_SHALLOW)
                || node.num_arcs >= FIXED_ARRAY_NUM_ARCS_DEEP)
    }

    pub(crate) fn finish(&mut self, new_start_node: CompiledAddress) -> Result<()> {
        if self.start_node != -1 {
            bail!(IllegalState("already finished".into()));
        }
        self.start_node = if new_start_node == FINAL_END_NODE {
            0
        } else {
            new_start_node
        };
        let store = ::std::mem::replace(&mut self.data, FstData::Loaded(Arc::new(Vec::new())));
        if let FstData::Building(store) = store {
            self.data = FstData::Loaded(Arc::new(store.into_bytes()));
        }
        Ok(())
    }

    pub fn save(&self, out: &mut impl DataOutput) -> Result<()> {
        if self.start_node == -1 {
            bail!(IllegalState("call finish first!".into()));
        }
        codec::write_header(out, FILE_FORMAT_NAME, VERSION_CURRENT)?;
        if let Some(ref empty_output) = self.empty_output {
            out.write_byte(1)?;
            // serialize the empty-string output in reverse
            let mut empty_output_bytes: Vec<u8> = Vec::new();
            self.outputs
                .write_final_output(empty_output, &mut empty_output_bytes)?;
            empty_output_bytes.reverse();
            out.write_vint(empty_output_bytes.len() as i32)?;
            out.write_bytes(&empty_output_bytes, 0, empty_output_bytes.len())?;
        } else {
            out.write_byte(0)?;
        }
        let t = match self.input_type {
            InputType::Byte1 => 0,
            InputType::Byte2 => 1,
            InputType::Byte4 => 2,
        };
        out.write_byte(t)?;
        out.write_vlong(self.start_node)?;
        let bytes = self.node_bytes();
        out.write_vlong(bytes.len() as i64)?;
        out.write_bytes(bytes, 0, bytes.len())?;
        Ok(())
    }
}
