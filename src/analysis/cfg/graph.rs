//! Control flow graph construction over CODE regions.
//!
//! One CFG is built per CODE region. Leader identification follows the classic
//! rules: the first instruction of the region, every resolved branch or call
//! target, and every instruction following a control transfer. Blocks are kept in
//! a `BTreeMap` keyed by leader address so all iteration is in ascending address
//! order, and edges are emitted in the fixed kind order defined by
//! [`EdgeKind::rank`](crate::analysis::cfg::EdgeKind::rank).
//!
//! Resolved targets that do not land on a decoded instruction get a synthetic
//! `external-ref` block; no decoding is attempted there.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::{
    analysis::{
        cfg::{BasicBlock, BlockKind, Edge, TerminatorKind},
        classifier::{Region, RegionKind},
    },
    assembly::{FlowType, Instruction},
};

/// The control flow graph of one CODE region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    /// Start address of the region this CFG covers.
    pub region_start: u64,
    /// End address (exclusive) of the region.
    pub region_end: u64,
    /// Blocks keyed and iterated by ascending leader address.
    pub blocks: BTreeMap<u64, BasicBlock>,
    /// Addresses of terminators with an UNRESOLVED edge, ascending.
    pub unresolved_sites: Vec<u64>,
}

impl ControlFlowGraph {
    /// The block whose span contains `address`, if any.
    #[must_use]
    pub fn block_containing(&self, address: u64) -> Option<&BasicBlock> {
        self.blocks
            .range(..=address)
            .next_back()
            .map(|(_, block)| block)
            .filter(|block| address < block.end || block.leader == address)
    }

    /// Number of non-synthetic blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.values().filter(|b| !b.is_external_ref()).count()
    }
}

/// Build one CFG per CODE region.
///
/// `entry_hints` (declared entry points) are forced to be leaders so that
/// procedure inference can root bodies at them even when nothing branches there.
#[must_use]
pub fn build_cfgs(
    regions: &[Region],
    instructions: &[Instruction],
    entry_hints: &[u64],
) -> Vec<ControlFlowGraph> {
    let code_regions: Vec<&Region> = regions.iter().filter(|r| r.kind == RegionKind::Code).collect();

    // Instruction starts across all CODE regions.
    let mut instr_index: FxHashMap<u64, usize> = FxHashMap::default();
    let mut region_ranges: Vec<(usize, usize)> = Vec::with_capacity(code_regions.len());
    for region in &code_regions {
        let lo = instructions.partition_point(|i| i.address < region.start);
        let hi = instructions.partition_point(|i| i.address < region.end);
        for (idx, instr) in instructions.iter().enumerate().take(hi).skip(lo) {
            instr_index.insert(instr.address, idx);
        }
        region_ranges.push((lo, hi));
    }

    // First pass: identify leaders globally so cross-region edges resolve.
    let mut leaders: Vec<std::collections::BTreeSet<u64>> = Vec::with_capacity(code_regions.len());
    for (region, &(lo, hi)) in code_regions.iter().zip(&region_ranges) {
        let mut set = std::collections::BTreeSet::new();
        if lo < hi {
            set.insert(instructions[lo].address);
        }
        for idx in lo..hi {
            let instr = &instructions[idx];
            if instr.is_terminal() && idx + 1 < hi {
                set.insert(instructions[idx + 1].address);
            }
            // A decode gap breaks straight-line flow the same way a leader does.
            if idx + 1 < hi && instructions[idx + 1].address != instr.end_address() {
                set.insert(instructions[idx + 1].address);
            }
        }
        for &hint in entry_hints {
            if region.contains(hint) && instr_index.contains_key(&hint) {
                set.insert(hint);
            }
        }
        leaders.push(set);
    }
    // Resolved branch and call targets are leaders wherever they land in code.
    for &(lo, hi) in &region_ranges {
        for instr in &instructions[lo..hi] {
            if instr.flow == FlowType::Sequential {
                continue;
            }
            let Some(target) = instr.target else { continue };
            if instr_index.contains_key(&target) {
                for (region, set) in code_regions.iter().zip(leaders.iter_mut()) {
                    if region.contains(target) {
                        set.insert(target);
                    }
                }
            }
        }
    }

    let global_leaders: std::collections::BTreeSet<u64> =
        leaders.iter().flat_map(|set| set.iter().copied()).collect();

    // Second pass: form blocks and wire edges.
    let mut cfgs = Vec::with_capacity(code_regions.len());
    for ((region, &(lo, hi)), region_leaders) in
        code_regions.iter().zip(&region_ranges).zip(&leaders)
    {
        let mut cfg = ControlFlowGraph {
            region_start: region.start,
            region_end: region.end,
            blocks: BTreeMap::new(),
            unresolved_sites: Vec::new(),
        };

        for &leader in region_leaders {
            let Some(&start_idx) = instr_index.get(&leader) else {
                continue;
            };
            let mut idx = start_idx;
            loop {
                let instr = &instructions[idx];
                let last = idx + 1 >= hi
                    || instr.is_terminal()
                    || region_leaders.contains(&instructions[idx + 1].address);
                if last {
                    break;
                }
                idx += 1;
            }

            let last_instr = &instructions[idx];
            let terminator_kind = match last_instr.flow {
                FlowType::ConditionalBranch => TerminatorKind::Conditional,
                FlowType::UnconditionalBranch => TerminatorKind::Unconditional,
                FlowType::Call => TerminatorKind::CallWithFallthrough,
                FlowType::Return => TerminatorKind::Return,
                FlowType::Indirect => TerminatorKind::Indirect,
                FlowType::Sequential | FlowType::Unknown => TerminatorKind::Fallthrough,
            };

            let block = BasicBlock {
                leader,
                terminator: last_instr.address,
                end: last_instr.end_address(),
                instructions: start_idx..idx + 1,
                terminator_kind,
                kind: BlockKind::Normal,
                edges: Vec::new(),
            };
            cfg.blocks.insert(leader, block);
        }
        cfgs.push(cfg);
    }

    // Edge construction, with synthetic external-ref blocks for resolved targets
    // that decoded code does not cover.
    for cfg in &mut cfgs {
        let block_leaders: Vec<u64> = cfg.blocks.keys().copied().collect();
        let mut synthetic: Vec<u64> = Vec::new();

        for leader in block_leaders {
            let block = &cfg.blocks[&leader];
            let last_instr = &instructions[block.instructions.end - 1];
            let continuation = global_leaders.contains(&block.end).then_some(block.end);

            let mut edges: Vec<Edge> = Vec::new();
            match block.terminator_kind {
                TerminatorKind::Conditional => {
                    match last_instr.target {
                        Some(target) => {
                            if !global_leaders.contains(&target) {
                                synthetic.push(target);
                            }
                            edges.push(Edge::taken(target));
                        }
                        None => edges.push(Edge::unresolved()),
                    }
                    if let Some(next) = continuation {
                        edges.push(Edge::not_taken(next));
                    }
                }
                TerminatorKind::Unconditional => match last_instr.target {
                    Some(target) => {
                        if !global_leaders.contains(&target) {
                            synthetic.push(target);
                        }
                        edges.push(Edge::unconditional(target));
                    }
                    None => edges.push(Edge::unresolved()),
                },
                TerminatorKind::CallWithFallthrough => {
                    match last_instr.target {
                        Some(target) => {
                            if !global_leaders.contains(&target) {
                                synthetic.push(target);
                            }
                            edges.push(Edge::call(target));
                        }
                        None => edges.push(Edge::unresolved()),
                    }
                    if let Some(next) = continuation {
                        edges.push(Edge::fallthrough(next));
                    }
                }
                TerminatorKind::Indirect => edges.push(Edge::unresolved()),
                TerminatorKind::Return => {}
                TerminatorKind::Fallthrough => {
                    if let Some(next) = continuation {
                        edges.push(Edge::fallthrough(next));
                    }
                }
            }

            edges.sort_by_key(|e| e.kind.rank());
            if edges.iter().any(|e| e.target.is_none()) {
                cfg.unresolved_sites.push(block.terminator);
            }
            cfg.blocks.get_mut(&leader).expect("block exists").edges = edges;
        }

        for target in synthetic {
            cfg.blocks
                .entry(target)
                .or_insert_with(|| BasicBlock::external_ref(target));
        }
        cfg.unresolved_sites.sort_unstable();
        cfg.unresolved_sites.dedup();
    }

    cfgs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{cfg::EdgeKind, classifier::classify},
        artifact::Section,
        assembly::{decode_section, NativeDecoder},
        AnalysisConfig,
    };

    fn build(bytes: Vec<u8>) -> (Vec<ControlFlowGraph>, Vec<Instruction>) {
        let section = Section { base: 0, bytes };
        let outcome = decode_section(&NativeDecoder, &section);
        let config = AnalysisConfig::default();
        let regions = classify(
            std::slice::from_ref(&section),
            &outcome.instructions,
            &config,
        );
        let cfgs = build_cfgs(&regions, &outcome.instructions, &[]);
        (cfgs, outcome.instructions)
    }

    #[test]
    fn straight_line_single_block() {
        // LA 3,10 / BCR 15,14
        let (cfgs, _) = build(vec![0x41, 0x30, 0x00, 0x0A, 0x07, 0xFE]);
        assert_eq!(cfgs.len(), 1);
        let cfg = &cfgs[0];
        assert_eq!(cfg.blocks.len(), 1);

        let block = &cfg.blocks[&0];
        assert_eq!(block.terminator_kind, TerminatorKind::Return);
        assert_eq!(block.instruction_count(), 2);
        assert!(block.edges.is_empty());
    }

    #[test]
    fn call_splits_block_and_falls_through() {
        // BALR 14,15 / BCR 15,14
        let (cfgs, _) = build(vec![0x05, 0xEF, 0x07, 0xFE]);
        let cfg = &cfgs[0];
        assert_eq!(cfg.blocks.len(), 2);

        let first = &cfg.blocks[&0];
        assert_eq!(first.terminator_kind, TerminatorKind::CallWithFallthrough);
        assert_eq!(first.edges.len(), 2);
        assert_eq!(first.edges[0].kind, EdgeKind::Fallthrough);
        assert_eq!(first.edges[0].target, Some(2));
        assert_eq!(first.edges[1].kind, EdgeKind::Unresolved);
        assert_eq!(first.edges[1].target, None);
        assert_eq!(cfg.unresolved_sites, vec![0]);

        let second = &cfg.blocks[&2];
        assert_eq!(second.terminator_kind, TerminatorKind::Return);
    }

    #[test]
    fn conditional_with_absolute_target() {
        // 0x00: LTR 2,2
        // 0x02: BC 8,0x0A(0)   taken -> 0x0A
        // 0x06: LA 2,1          not-taken path
        // 0x0A: BCR 15,14       common return
        let (cfgs, instructions) = build(vec![
            0x12, 0x22, 0x47, 0x80, 0x00, 0x0A, 0x41, 0x20, 0x00, 0x01, 0x07, 0xFE,
        ]);
        let cfg = &cfgs[0];
        assert_eq!(cfg.blocks.len(), 3);

        let head = &cfg.blocks[&0];
        assert_eq!(head.terminator_kind, TerminatorKind::Conditional);
        assert_eq!(head.edges[0].kind, EdgeKind::BranchTaken);
        assert_eq!(head.edges[0].target, Some(0x0A));
        assert_eq!(head.edges[1].kind, EdgeKind::BranchNotTaken);
        assert_eq!(head.edges[1].target, Some(0x06));

        // Block integrity: only the last instruction of a block is terminal.
        for block in cfg.blocks.values() {
            let body = &instructions[block.instructions.start..block.instructions.end - 1];
            assert!(body.iter().all(|i| !i.is_terminal()));
        }
        assert!(cfg.unresolved_sites.is_empty());
    }

    #[test]
    fn external_ref_for_out_of_code_target() {
        // BC 15,0x100(0): resolved target far outside the two decoded bytes.
        let (cfgs, _) = build(vec![0x47, 0xF0, 0x01, 0x00, 0x07, 0xFE]);
        let cfg = &cfgs[0];

        let external = cfg.blocks.get(&0x100).expect("synthetic block");
        assert!(external.is_external_ref());

        let head = &cfg.blocks[&0];
        assert_eq!(head.edges[0].kind, EdgeKind::Unconditional);
        assert_eq!(head.edges[0].target, Some(0x100));
    }

    #[test]
    fn entry_hint_forces_leader() {
        // LA 3,1 / LA 3,2 / BCR 15,14 with a declared entry at 0x04.
        let section = Section {
            base: 0,
            bytes: vec![0x41, 0x30, 0x00, 0x01, 0x41, 0x30, 0x00, 0x02, 0x07, 0xFE],
        };
        let outcome = decode_section(&NativeDecoder, &section);
        let config = AnalysisConfig::default();
        let regions = classify(
            std::slice::from_ref(&section),
            &outcome.instructions,
            &config,
        );
        let cfgs = build_cfgs(&regions, &outcome.instructions, &[0x04]);

        assert!(cfgs[0].blocks.contains_key(&0x04));
        // The preceding block must fall through into the forced leader.
        let first = &cfgs[0].blocks[&0];
        assert_eq!(first.edges[0].kind, EdgeKind::Fallthrough);
        assert_eq!(first.edges[0].target, Some(0x04));
    }

    #[test]
    fn block_containing_lookup() {
        let (cfgs, _) = build(vec![0x05, 0xEF, 0x07, 0xFE]);
        let cfg = &cfgs[0];
        assert_eq!(cfg.block_containing(0).unwrap().leader, 0);
        assert_eq!(cfg.block_containing(1).unwrap().leader, 0);
        assert_eq!(cfg.block_containing(2).unwrap().leader, 2);
        assert!(cfg.block_containing(0x50).is_none());
    }
}
