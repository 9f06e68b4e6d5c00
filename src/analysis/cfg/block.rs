//! Basic block representation.
//!
//! Blocks reference instructions by index range into the artifact-wide instruction
//! vector and identify each other by leader address (the arena + address model):
//! no block owns another, so the graph has no reference cycles.

use std::ops::Range;

use strum::Display;

use crate::analysis::cfg::Edge;

/// How a basic block ends.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum TerminatorKind {
    /// The block ends because the next instruction is another block's leader
    /// (or the region ends); control simply falls through.
    #[strum(serialize = "fallthrough")]
    Fallthrough,
    /// Ends with a conditional branch.
    #[strum(serialize = "conditional")]
    Conditional,
    /// Ends with an unconditional direct branch.
    #[strum(serialize = "unconditional")]
    Unconditional,
    /// Ends with a call; execution is assumed to resume after it.
    #[strum(serialize = "call-with-fallthrough")]
    CallWithFallthrough,
    /// Ends with a return.
    #[strum(serialize = "return")]
    Return,
    /// Ends with an indirect branch.
    #[strum(serialize = "indirect")]
    Indirect,
}

/// Distinguishes decoded blocks from synthetic placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// A block of decoded instructions.
    Normal,
    /// A synthetic placeholder for a resolved target outside any CODE region;
    /// no decoding is attempted there.
    ExternalRef,
}

/// A maximal straight-line instruction sequence within a CODE region.
///
/// Only the leader may be a branch target, and only the last instruction may
/// transfer control. The `instructions` range indexes the artifact-wide
/// instruction vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Address of the first instruction; the block's unique identifier.
    pub leader: u64,
    /// Address of the last instruction.
    pub terminator: u64,
    /// End address, exclusive.
    pub end: u64,
    /// Index range into the artifact instruction vector.
    pub instructions: Range<usize>,
    /// How the block ends.
    pub terminator_kind: TerminatorKind,
    /// Normal or synthetic external reference.
    pub kind: BlockKind,
    /// Out-edges in fixed kind order.
    pub edges: Vec<Edge>,
}

impl BasicBlock {
    /// A synthetic block standing in for a resolved target outside the CODE space.
    #[must_use]
    pub fn external_ref(address: u64) -> Self {
        BasicBlock {
            leader: address,
            terminator: address,
            end: address,
            instructions: 0..0,
            terminator_kind: TerminatorKind::Fallthrough,
            kind: BlockKind::ExternalRef,
            edges: Vec::new(),
        }
    }

    /// Returns true for synthetic external reference blocks.
    #[must_use]
    pub fn is_external_ref(&self) -> bool {
        self.kind == BlockKind::ExternalRef
    }

    /// Number of instructions in the block.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Successor leader addresses, in edge order; unresolved edges contribute nothing.
    pub fn successors(&self) -> impl Iterator<Item = u64> + '_ {
        self.edges.iter().filter_map(|e| e.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::EdgeKind;

    #[test]
    fn external_ref_block() {
        let block = BasicBlock::external_ref(0x2000);
        assert!(block.is_external_ref());
        assert_eq!(block.leader, 0x2000);
        assert_eq!(block.instruction_count(), 0);
        assert_eq!(block.successors().count(), 0);
    }

    #[test]
    fn successors_skip_unresolved() {
        let block = BasicBlock {
            leader: 0,
            terminator: 0,
            end: 2,
            instructions: 0..1,
            terminator_kind: TerminatorKind::CallWithFallthrough,
            kind: BlockKind::Normal,
            edges: vec![Edge::unresolved(), Edge::fallthrough(2)],
        };
        assert_eq!(block.successors().collect::<Vec<_>>(), vec![2]);
        assert_eq!(block.edges[0].kind, EdgeKind::Unresolved);
    }

    #[test]
    fn terminator_kind_display() {
        assert_eq!(
            TerminatorKind::CallWithFallthrough.to_string(),
            "call-with-fallthrough"
        );
        assert_eq!(TerminatorKind::Return.to_string(), "return");
    }
}
