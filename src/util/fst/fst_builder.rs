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

use crate::error::ErrorKind::UnsupportedOperation;
use crate::error::Result;
use crate::util::fst::fst_reader::{CompiledAddress, Fst, InputType};
use crate::util::fst::{Output, OutputFactory};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Builds a minimal FST from pre-sorted byte-string inputs with outputs.
/// The FST is written on the fly into a compact serialized byte array
/// which can be saved to / loaded from a directory.
///
/// The algorithm is described at
/// http://citeseerx.ist.psu.edu/viewdoc/summary?doi=10.1.1.24.3698
pub struct FstBuilder<F: OutputFactory> {
    dedup: Option<NodeHash>,
    fst: Fst<F>,
    no_output: F::Value,
    last_input: Vec<u8>,
    // current "frontier": one pending node per prefix length of the last
    // input
    frontier: Vec<UnCompiledNode<F>>,
    // Used for the BIT_TARGET_NEXT optimization (whereby instead of
    // storing the address of the target node for a given arc, we mark a
    // single bit noting that the next node in the bytes is the target
    // node):
    last_frozen_node: CompiledAddress,
    reused_bytes_per_arc: Vec<usize>,
    allow_array_arcs: bool,
}

impl<F: OutputFactory> FstBuilder<F> {
    pub fn new(input_type: InputType, outputs: F) -> Self {
        let no_output = outputs.empty();
        let fst = Fst::new(input_type, outputs);
        let mut frontier = Vec::with_capacity(10);
        for i in 0..10 {
            frontier.push(UnCompiledNode::new(no_output.clone(), i as i32));
        }
        FstBuilder {
            dedup: Some(NodeHash::new()),
            fst,
            no_output,
            last_input: Vec::new(),
            frontier,
            last_frozen_node: 0,
            reused_bytes_per_arc: Vec::with_capacity(4),
            allow_array_arcs: true,
        }
    }

    fn compile_node(&mut self, idx: usize) -> Result<CompiledAddress> {
        let bytes_pos_start = self.fst.builder_position();
        let node;
        if self.frontier[idx].num_arcs == 0 {
            // end-state sentinel, nothing gets serialized
            node = self.fst.add_node(
                &self.frontier[idx],
                self.last_frozen_node,
                self.allow_array_arcs,
                &mut self.reused_bytes_per_arc,
            )?;
        } else if let Some(mut dedup) = self.dedup.take() {
            let res = dedup.add(
                &mut self.fst,
                &self.frontier[idx],
                self.last_frozen_node,
                self.allow_array_arcs,
                &mut self.reused_bytes_per_arc,
            );
            self.dedup = Some(dedup);
            node = res?;
        } else {
            node = self.fst.add_node(
                &self.frontier[idx],
                self.last_frozen_node,
                self.allow_array_arcs,
                &mut self.reused_bytes_per_arc,
            )?;
        }
        if self.fst.builder_position() != bytes_pos_start {
            // the fst appended a new node
            self.last_frozen_node = node;
        }
        let no_output = self.no_output.clone();
        self.frontier[idx].clear(no_output);
        Ok(node)
    }

    /// Freeze (compile) all frontier nodes deeper than the prefix shared
    /// with the next input.
    fn freeze_tail(&mut self, prefix_len_plus1: usize) -> Result<()> {
        let down_to = prefix_len_plus1.max(1);
        if self.last_input.len() < down_to {
            return Ok(());
        }
        for i in 0..=(self.last_input.len() - down_to) {
            let idx = self.last_input.len() - i;
            let next_final_output = self.frontier[idx].output.clone();
            let is_final = self.frontier[idx].is_final || self.frontier[idx].num_arcs == 0;
            let node = self.compile_node(idx)?;
            let label = i32::from(self.last_input[idx - 1]);
            self.frontier[idx - 1].replace_last(
                label,
                Node::Compiled(node),
                next_final_output,
                is_final,
            );
        }
        Ok(())
    }

    /// Add the next input/output pair. Inputs must arrive in strictly
    /// increasing byte-lexicographic order.
    pub fn add(&mut self, input: &[u8], output: F::Value) -> Result<()> {
        debug_assert!(self.last_input.is_empty() || input > self.last_input.as_slice());

        if self.frontier.len() < input.len() + 1 {
            for i in self.frontier.len()..=input.len() + 1 {
                self.frontier
                    .push(UnCompiledNode::new(self.no_output.clone(), i as i32));
            }
        }

        if input.is_empty() {
            // empty input: only allowed as the first input; 'finalness'
            // is stored on the incoming arc, not the node, so this is
            // special-cased as the FST's empty output
            self.frontier[0].is_final = true;
            self.fst.set_empty_output(output);
            return Ok(());
        }

        // shared prefix with the previous input
        let stop = self.last_input.len().min(input.len());
        let mut prefix_len = 0;
        while prefix_len < stop && self.last_input[prefix_len] == input[prefix_len] {
            prefix_len += 1;
        }
        let prefix_len_plus1 = prefix_len + 1;

        // minimize/compile states from the previous input's orphaned
        // suffix
        self.freeze_tail(prefix_len_plus1)?;

        // init tail states for the current input
        for i in prefix_len_plus1..=input.len() {
            let no_output = self.no_output.clone();
            self.frontier[i - 1].add_arc(i32::from(input[i - 1]), Node::UnCompiled(i), no_output);
        }

        if self.last_input.len() != input.len() || prefix_len_plus1 != input.len() + 1 {
            let last_idx = input.len();
            self.frontier[last_idx].is_final = true;
            self.frontier[last_idx].output = self.no_output.clone();
        }

        // push conflicting outputs forward, only as far as needed
        let mut output = output;
        for i in 1..prefix_len_plus1 {
            let label = i32::from(input[i - 1]);
            let last_output = self.frontier[i - 1].last_output(label).clone();
            let common_output_prefix = if last_output != self.no_output {
                let common = self.fst.outputs().common(&output, &last_output);
                let word_suffix = self.fst.outputs().subtract(&last_output, &common);
                let outputs = self.fst.outputs().clone();
                self.frontier[i].prepend_output(&word_suffix, &outputs);
                common
            } else {
                self.no_output.clone()
            };
            output = self.fst.outputs().subtract(&output, &common_output_prefix);
            if last_output != self.no_output {
                self.frontier[i - 1].set_last_output(label, common_output_prefix);
            }
        }

        if self.last_input.len() == input.len() && prefix_len_plus1 == input.len() + 1 {
            bail!(UnsupportedOperation(
                "duplicate inputs are not supported".into()
            ));
        }
        // this new arc is private to this new input; set its arc output
        // to the leftover output
        self.frontier[prefix_len_plus1 - 1]
            .set_last_output(i32::from(input[prefix_len_plus1 - 1]), output);

        self.last_input.clear();
        self.last_input.extend_from_slice(input);
        Ok(())
    }

    /// Compile the remaining frontier and return the finished FST.
    pub fn finish(mut self) -> Result<Fst<F>> {
        // minimize nodes in the last input's suffix
        self.freeze_tail(0)?;
        let node = self.compile_node(0)?;
        self.fst.finish(node)?;
        Ok(self.fst)
    }
}

/// Dedups frozen states so the automaton stays minimal: maps a node's
/// structure to the address it was already serialized at.
struct NodeHash {
    table: Vec<i64>,
    count: usize,
    mask: usize,
}

impl NodeHash {
    fn new() -> NodeHash {
        NodeHash {
            table: vec![0; 16],
            count: 0,
            mask: 15,
        }
    }

    fn hash_code<Y: Hash>(v: &Y) -> u64 {
        let mut state = DefaultHasher::new();
        v.hash(&mut state);
        state.finish()
    }

    fn hash_uncompiled<F: OutputFactory>(node: &UnCompiledNode<F>) -> u64 {
        let prime = 31u64;
        let mut h = 0u64;
        for arc in &node.arcs[0..node.num_arcs] {
            h = prime.wrapping_mul(h).wrapping_add(arc.label as u64);
            if let Node::Compiled(n) = arc.target {
                if n != 0 {
                    h = prime.wrapping_mul(h).wrapping_add((n ^ (n >> 32)) as u64);
                }
            }
            if !arc.output.is_empty() {
                h = prime.wrapping_mul(h).wrapping_add(Self::hash_code(&arc.output));
            }
            if !arc.next_final_output.is_empty() {
                h = prime
                    .wrapping_mul(h)
                    .wrapping_add(Self::hash_code(&arc.next_final_output));
            }
            if arc.is_final {
                h = h.wrapping_add(17);
            }
        }
        h
    }

    fn hash_compiled<F: OutputFactory>(fst: &Fst<F>, node: CompiledAddress) -> Result<u64> {
        let prime = 31u64;
        let mut h = 0u64;
        let mut reader = fst.building_reader();
        let mut arc = fst.read_first_real_arc(node, &mut reader)?;
        loop {
            h = prime.wrapping_mul(h).wrapping_add(arc.label as u64);
            if arc.target != 0 {
                h = prime
                    .wrapping_mul(h)
                    .wrapping_add((arc.target ^ (arc.target >> 32)) as u64);
            }
            if let Some(ref output) = arc.output {
                h = prime.wrapping_mul(h).wrapping_add(Self::hash_code(output));
            }
            if let Some(ref output) = arc.next_final_output {
                h = prime.wrapping_mul(h).wrapping_add(Self::hash_code(output));
            }
            if arc.is_final() {
                h = h.wrapping_add(17);
            }
            if arc.is_last() {
                break;
            }
            fst.read_next_real_arc(&mut arc, &mut reader)?;
        }
        Ok(h)
    }

    fn nodes_equal<F: OutputFactory>(
        fst: &Fst<F>,
        node: &UnCompiledNode<F>,
        address: CompiledAddress,
    ) -> Result<bool> {
        let mut reader = fst.building_reader();
        let mut scratch_arc = fst.read_first_real_arc(address, &mut reader)?;
        if scratch_arc.bytes_per_arc > 0 && node.num_arcs != scratch_arc.num_arcs {
            return Ok(false);
        }

        for idx in 0..node.num_arcs {
            let arc = &node.arcs[idx];
            if arc.label != scratch_arc.label || arc.is_final != scratch_arc.is_final() {
                return Ok(false);
            }
            match scratch_arc.output {
                Some(ref output) => {
                    if *output != arc.output {
                        return Ok(false);
                    }
                }
                None => {
                    if !arc.output.is_empty() {
                        return Ok(false);
                    }
                }
            }
            match scratch_arc.next_final_output {
                Some(ref output) => {
                    if *output != arc.next_final_output {
                        return Ok(false);
                    }
                }
                None => {
                    if !arc.next_final_output.is_empty() {
                        return Ok(false);
                    }
                }
            }
            if let Node::Compiled(target) = arc.target {
                if target != scratch_arc.target {
                    return Ok(false);
                }
            }
            if scratch_arc.is_last() {
                return Ok(idx == node.num_arcs - 1);
            }
            fst.read_next_real_arc(&mut scratch_arc, &mut reader)?;
        }
        Ok(false)
    }

    fn add<F: OutputFactory>(
        &mut self,
        fst: &mut Fst<F>,
        node: &UnCompiledNode<F>,
        last_frozen_node: CompiledAddress,
        allow_array_arcs: bool,
        reused_bytes_per_arc: &mut Vec<usize>,
    ) -> Result<CompiledAddress> {
        let h = Self::hash_uncompiled(node);
        let mut pos = h as usize & self.mask;
        let mut c = 0usize;
        loop {
            let v = self.table[pos];
            if v == 0 {
                // freeze and add
                let address =
                    fst.add_node(node, last_frozen_node, allow_array_arcs, reused_bytes_per_arc)?;
                debug_assert_eq!(Self::hash_compiled(fst, address)?, h);
                self.count += 1;
                self.table[pos] = address;
                // rehash at 2/3 occupancy
                if self.count > 2 * self.table.len() / 3 {
                    self.rehash(fst)?;
                }
                return Ok(address);
            } else if Self::nodes_equal(fst, node, v)? {
                // the same node is already here
                return Ok(v);
            }
            // quadratic probe
            c += 1;
            pos = (pos + c) & self.mask;
        }
    }

    fn rehash<F: OutputFactory>(&mut self, fst: &Fst<F>) -> Result<()> {
        let old_table = ::std::mem::replace(&mut self.table, vec![0; 0]);
        self.table = vec![0; old_table.len() * 2];
        self.mask = self.table.len() - 1;
        for address in old_table {
            if address != 0 {
                let hash = Self::hash_compiled(fst, address)? as usize;
                let mut pos = hash & self.mask;
                let mut c = 0usize;
                loop {
                    if self.table[pos] == 0 {
                        self.table[pos] = address;
                        break;
                    }
                    c += 1;
                    pos = (pos + c) & self.mask;
                }
            }
        }
        Ok(())
    }
}

/// NOTE: not many instances of Node or CompiledNode are in memory while
/// the FST is being built; it's only the current "frontier":
#[derive(Clone)]
pub enum Node {
    Compiled(CompiledAddress),
    UnCompiled(usize), // index in the builder's frontier
}

pub struct BuilderArc<F: OutputFactory> {
    pub label: i32,
    pub target: Node,
    pub is_final: bool,
    pub output: F::Value,
    pub next_final_output: F::Value,
}

/// A pending (seen but not yet serialized) node.
pub struct UnCompiledNode<F: OutputFactory> {
    pub num_arcs: usize,
    pub arcs: Vec<BuilderArc<F>>,
    pub output: F::Value,
    pub is_final: bool,
    /// This node's depth, starting from the automaton root.
    pub depth: i32,
}

impl<F: OutputFactory> UnCompiledNode<F> {
    pub fn new(no_output: F::Value, depth: i32) -> Self {
        UnCompiledNode {
            num_arcs: 0,
            arcs: Vec::with_capacity(1),
            output: no_output,
            is_final: false,
            depth,
        }
    }

    fn clear(&mut self, no_output: F::Value) {
        self.num_arcs = 0;
        self.is_final = false;
        self.output = no_output;
        // depth never changes for nodes on the frontier, even when reused
    }

    fn last_output(&self, label_to_match: i32) -> &F::Value {
        debug_assert!(self.num_arcs > 0);
        debug_assert_eq!(self.arcs[self.num_arcs - 1].label, label_to_match);
        &self.arcs[self.num_arcs - 1].output
    }

    fn set_last_output(&mut self, label_to_match: i32, new_output: F::Value) {
        debug_assert!(self.num_arcs > 0);
        debug_assert_eq!(self.arcs[self.num_arcs - 1].label, label_to_match);
        self.arcs[self.num_arcs - 1].output = new_output;
    }

    fn add_arc(&mut self, label: i32, target: Node, no_output: F::Value) {
        debug_assert!(label >= 0);
        debug_assert!(self.num_arcs == 0 || label > self.arcs[self.num_arcs - 1].label);
        let new_arc = BuilderArc {
            label,
            target,
            is_final: false,
            output: no_output.clone(),
            next_final_output: no_output,
        };
        if self.num_arcs == self.arcs.len() {
            self.arcs.push(new_arc);
        } else {
            self.arcs[self.num_arcs] = new_arc;
        }
        self.num_arcs += 1;
    }

    fn replace_last(
        &mut self,
        label_to_match: i32,
        target: Node,
        next_final_output: F::Value,
        is_final: bool,
    ) {
        debug_assert!(self.num_arcs > 0);
        let arc = &mut self.arcs[self.num_arcs - 1];
        debug_assert_eq!(arc.label, label_to_match);
        arc.target = target;
        arc.next_final_output = next_final_output;
        arc.is_final = is_final;
    }

    fn prepend_output(&mut self, output_prefix: &F::Value, outputs: &F) {
        for i in 0..self.num_arcs {
            self.arcs[i].output = outputs.add(output_prefix, &self.arcs[i].output);
        }
        if self.is_final {
            self.output = outputs.add(output_prefix, &self.output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::fst::{ByteSequenceOutput, ByteSequenceOutputFactory};

    fn build_sample() -> Fst<ByteSequenceOutputFactory> {
        let mut builder = FstBuilder::new(InputType::Byte1, ByteSequenceOutputFactory::new());
        let input_values = vec!["cat", "dag", "dbg", "dcg", "ddg", "deg", "dog", "dogs"];
        let output_values = vec![5u8, 7, 12, 13, 14, 15, 16, 17];
        for i in 0..input_values.len() {
            let output = ByteSequenceOutput::new(vec![output_values[i]]);
            builder.add(input_values[i].as_bytes(), output).unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn test_fst_get() {
        let fst = build_sample();
        let input_values = vec!["cat", "dag", "dbg", "dcg", "ddg", "deg", "dog", "dogs"];
        let output_values = vec![5u8, 7, 12, 13, 14, 15, 16, 17];
        for i in 0..input_values.len() {
            let value = fst.get(input_values[i].as_bytes()).unwrap().unwrap();
            assert_eq!(value, ByteSequenceOutput::new(vec![output_values[i]]));
        }
        assert!(fst.get(b"dew").unwrap().is_none());
        assert!(fst.get(b"ca").unwrap().is_none());
        assert!(fst.get(b"dogss").unwrap().is_none());
    }

    #[test]
    fn test_fst_save_load() {
        let fst = build_sample();
        let mut bytes: Vec<u8> = vec![];
        fst.save(&mut bytes).unwrap();
        let mut input: &[u8] = &bytes;
        let loaded = Fst::from_input(&mut input, ByteSequenceOutputFactory::new()).unwrap();
        assert_eq!(
            loaded.get(b"dogs").unwrap().unwrap(),
            ByteSequenceOutput::new(vec![17])
        );
        assert!(loaded.get(b"dog s").unwrap().is_none());
    }

    #[test]
    fn test_fst_wide_fan_out() {
        // enough outgoing arcs that the root node is stored as a
        // fixed-width array and looked up by binary search
        let mut builder = FstBuilder::new(InputType::Byte1, ByteSequenceOutputFactory::new());
        let mut inputs = Vec::new();
        for b in 0u8..12 {
            inputs.push(vec![b'a' + 2 * b, b'x']);
        }
        for (i, input) in inputs.iter().enumerate() {
            builder
                .add(input, ByteSequenceOutput::new(vec![i as u8 + 1]))
                .unwrap();
        }
        let fst = builder.finish().unwrap();
        for (i, input) in inputs.iter().enumerate() {
            assert_eq!(
                fst.get(input).unwrap().unwrap(),
                ByteSequenceOutput::new(vec![i as u8 + 1])
            );
        }
        // absent labels between, before and after the stored arcs
        assert!(fst.get(b"bx").unwrap().is_none());
        assert!(fst.get(b"`x").unwrap().is_none());
        assert!(fst.get(b"zx").unwrap().is_none());
    }

    #[test]
    fn test_fst_empty_input_output() {
        let mut builder = FstBuilder::new(InputType::Byte1, ByteSequenceOutputFactory::new());
        builder
            .add(b"", ByteSequenceOutput::new(vec![42]))
            .unwrap();
        builder
            .add(b"ab", ByteSequenceOutput::new(vec![7]))
            .unwrap();
        let fst = builder.finish().unwrap();
        assert_eq!(
            fst.empty_output.as_ref().unwrap(),
            &ByteSequenceOutput::new(vec![42])
        );
        assert_eq!(fst.get(b"ab").unwrap().unwrap(), ByteSequenceOutput::new(vec![7]));
        let root = fst.root_arc();
        assert!(root.is_final());
    }
}
