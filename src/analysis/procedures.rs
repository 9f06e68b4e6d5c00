//! Procedure inference from linkage patterns, call targets, and declared entries.
//!
//! Entry candidates come from four sources in descending priority: header-declared
//! entry points, resolved call targets, the standard save-registers prologue
//! (`STM 14,12,12(13)`, optionally followed by base establishment), and finally the
//! first block of each CODE region as a low-confidence fallback. Bodies are formed
//! by forward reachability over intraprocedural edges, with block ownership granted
//! first-come first-served in ascending entry-address order. Blocks left over in a
//! region are gathered into a synthetic `PROC_ORPHAN_<region-start>` procedure so
//! nothing is silently dropped.

use std::collections::{BTreeMap, BTreeSet};

use strum::Display;
use tracing::debug;

use crate::{
    analysis::{
        cfg::{BasicBlock, ControlFlowGraph, EdgeKind, TerminatorKind},
        Confidence,
    },
    artifact::Artifact,
    assembly::{Instruction, Operand},
};

/// Register-usage convention detected for a procedure.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Save-area prologue and `BR 14` epilogue.
    #[strum(serialize = "standard")]
    Standard,
    /// Standard linkage with a base established in register 12.
    #[strum(serialize = "le-conformant")]
    LeConformant,
    /// No recognisable convention.
    #[strum(serialize = "unknown")]
    Unknown,
}

/// How a procedure entry was detected.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum DetectionReason {
    /// Declared in the artifact header.
    #[strum(serialize = "declared")]
    Declared,
    /// Target of a resolved call edge.
    #[strum(serialize = "call-target")]
    CallTarget,
    /// Matched the save-registers prologue pattern.
    #[strum(serialize = "prologue-pattern")]
    ProloguePattern,
    /// First block of a CODE region, nothing better known.
    #[strum(serialize = "region-start-fallback")]
    RegionStartFallback,
    /// Synthetic container for blocks no entry reached.
    #[strum(serialize = "orphan")]
    Orphan,
}

/// An inferred procedure: a connected set of basic blocks rooted at an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    /// Synthetic identifier (`PROC_<hex-addr>` or `PROC_ORPHAN_<region-start>`).
    pub name: String,
    /// Entry block leader address.
    pub entry: u64,
    /// Addresses of return terminators, ascending.
    pub exits: Vec<u64>,
    /// Leader addresses of owned blocks, ascending.
    pub blocks: Vec<u64>,
    /// Detected register-usage convention.
    pub linkage: Linkage,
    /// Detection confidence.
    pub confidence: Confidence,
    /// Which heuristic produced the entry.
    pub reason: DetectionReason,
}

impl Procedure {
    /// End address (exclusive) of the highest owned block.
    #[must_use]
    pub fn end(&self, cfgs: &[ControlFlowGraph]) -> u64 {
        self.blocks
            .iter()
            .filter_map(|leader| find_block(cfgs, *leader))
            .map(|b| b.end)
            .max()
            .unwrap_or(self.entry)
    }
}

/// Look up a block by exact leader address across all CFGs.
#[must_use]
pub fn find_block<'a>(cfgs: &'a [ControlFlowGraph], leader: u64) -> Option<&'a BasicBlock> {
    cfgs.iter().find_map(|cfg| cfg.blocks.get(&leader))
}

/// Returns true for the standard save-registers prologue `STM 14,12,12(13)`.
fn is_prologue_store(instr: &Instruction) -> bool {
    instr.mnemonic == "STM"
        && instr.operands.len() == 3
        && instr.operands[0] == Operand::Register(14)
        && instr.operands[1] == Operand::Register(12)
        && instr.operands[2] == Operand::BaseDisp { base: 13, disp: 12 }
}

/// The register a base-establishment idiom loads, if this is one.
///
/// Recognizes `BALR Rn,0` and `LR Rn,15` (register 15 holds the entry address
/// at call time under standard linkage).
fn established_base(instr: &Instruction) -> Option<u8> {
    match (instr.mnemonic, instr.operands.as_slice()) {
        ("BALR", [Operand::Register(r), Operand::Register(0)]) => Some(*r),
        ("LR", [Operand::Register(r), Operand::Register(15)]) => Some(*r),
        _ => None,
    }
}

/// Infer procedures and claim every block of every CFG.
#[must_use]
pub fn infer_procedures(
    cfgs: &[ControlFlowGraph],
    instructions: &[Instruction],
    artifact: &Artifact,
) -> Vec<Procedure> {
    // Candidate entries in priority order; first insertion wins per address.
    let mut candidates: BTreeMap<u64, (Confidence, DetectionReason)> = BTreeMap::new();

    for &entry in &artifact.entry_points {
        if find_block(cfgs, entry).is_some() {
            candidates
                .entry(entry)
                .or_insert((Confidence::High, DetectionReason::Declared));
        }
    }

    for cfg in cfgs {
        for block in cfg.blocks.values() {
            for edge in &block.edges {
                if edge.kind == EdgeKind::Call {
                    if let Some(target) = edge.target {
                        if find_block(cfgs, target).is_some_and(|b| !b.is_external_ref()) {
                            candidates
                                .entry(target)
                                .or_insert((Confidence::High, DetectionReason::CallTarget));
                        }
                    }
                }
            }
        }
    }

    for cfg in cfgs {
        for block in cfg.blocks.values() {
            if block.is_external_ref() {
                continue;
            }
            let first = &instructions[block.instructions.start];
            if is_prologue_store(first) {
                candidates
                    .entry(block.leader)
                    .or_insert((Confidence::Medium, DetectionReason::ProloguePattern));
            }
        }
    }

    for cfg in cfgs {
        if let Some(block) = cfg.blocks.values().find(|b| !b.is_external_ref()) {
            candidates
                .entry(block.leader)
                .or_insert((Confidence::Low, DetectionReason::RegionStartFallback));
        }
    }

    let mut procedures: Vec<Procedure> = Vec::new();
    let mut claimed: BTreeMap<u64, usize> = BTreeMap::new();

    for (&entry, &(confidence, reason)) in &candidates {
        if claimed.contains_key(&entry) {
            continue;
        }

        let body = collect_body(cfgs, entry, &claimed);
        if body.is_empty() {
            continue;
        }

        let index = procedures.len();
        for &leader in &body {
            claimed.insert(leader, index);
        }

        let exits: Vec<u64> = body
            .iter()
            .filter_map(|leader| find_block(cfgs, *leader))
            .filter(|b| b.terminator_kind == TerminatorKind::Return)
            .map(|b| b.terminator)
            .collect();

        let linkage = classify_linkage(cfgs, instructions, entry, !exits.is_empty());
        debug!(entry, %reason, %linkage, blocks = body.len(), "inferred procedure");

        procedures.push(Procedure {
            name: format!("PROC_{entry:08X}"),
            entry,
            exits,
            blocks: body.into_iter().collect(),
            linkage,
            confidence,
            reason,
        });
    }

    // Blocks no entry reached: one synthetic container per region.
    for cfg in cfgs {
        let orphans: Vec<u64> = cfg
            .blocks
            .values()
            .filter(|b| !b.is_external_ref() && !claimed.contains_key(&b.leader))
            .map(|b| b.leader)
            .collect();
        if orphans.is_empty() {
            continue;
        }

        let index = procedures.len();
        for &leader in &orphans {
            claimed.insert(leader, index);
        }

        let exits: Vec<u64> = orphans
            .iter()
            .filter_map(|leader| find_block(cfgs, *leader))
            .filter(|b| b.terminator_kind == TerminatorKind::Return)
            .map(|b| b.terminator)
            .collect();

        procedures.push(Procedure {
            name: format!("PROC_ORPHAN_{:08X}", cfg.region_start),
            entry: orphans[0],
            exits,
            blocks: orphans,
            linkage: Linkage::Unknown,
            confidence: Confidence::Low,
            reason: DetectionReason::Orphan,
        });
    }

    procedures
}

/// Forward reachability over intraprocedural edges, stopping at claimed blocks.
fn collect_body(
    cfgs: &[ControlFlowGraph],
    entry: u64,
    claimed: &BTreeMap<u64, usize>,
) -> BTreeSet<u64> {
    let mut body = BTreeSet::new();
    let mut stack = vec![entry];

    while let Some(leader) = stack.pop() {
        if body.contains(&leader) || claimed.contains_key(&leader) {
            continue;
        }
        let Some(block) = find_block(cfgs, leader) else {
            continue;
        };
        if block.is_external_ref() {
            continue;
        }
        body.insert(leader);

        for edge in &block.edges {
            if edge.kind.is_intraprocedural() {
                if let Some(target) = edge.target {
                    stack.push(target);
                }
            }
        }
    }

    body
}

fn classify_linkage(
    cfgs: &[ControlFlowGraph],
    instructions: &[Instruction],
    entry: u64,
    has_epilogue: bool,
) -> Linkage {
    let Some(block) = find_block(cfgs, entry) else {
        return Linkage::Unknown;
    };
    if block.is_external_ref() || block.instructions.is_empty() {
        return Linkage::Unknown;
    }

    let instrs = &instructions[block.instructions.clone()];
    if !is_prologue_store(&instrs[0]) || !has_epilogue {
        return Linkage::Unknown;
    }

    let base12 = instrs
        .iter()
        .skip(1)
        .take(2)
        .filter_map(established_base)
        .any(|r| r == 12);

    if base12 {
        Linkage::LeConformant
    } else {
        Linkage::Standard
    }
}
