//! Control flow edge types for the CFG.
//!
//! Edges store target *addresses*, not block references: blocks live in ordered
//! maps keyed by leader address, so an address is a stable identifier and no
//! owning cycles can form. `UNRESOLVED` edges carry no target at all.

use strum::Display;

/// The kind of control flow represented by an edge.
///
/// Edges out of a block are always emitted in the fixed order
/// `TAKEN, NOT_TAKEN, FALLTHROUGH, UNCONDITIONAL, CALL, UNRESOLVED, RETURN`,
/// which [`EdgeKind::rank`] encodes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The taken side of a conditional branch.
    #[strum(serialize = "BRANCH_TAKEN")]
    BranchTaken,
    /// The fall-through side of a conditional branch.
    #[strum(serialize = "BRANCH_NOT_TAKEN")]
    BranchNotTaken,
    /// Sequential fall-through into the next block.
    #[strum(serialize = "FALLTHROUGH")]
    Fallthrough,
    /// An unconditional direct branch.
    #[strum(serialize = "UNCONDITIONAL")]
    Unconditional,
    /// A call edge to the callee entry; the caller also falls through.
    #[strum(serialize = "CALL")]
    Call,
    /// A branch or call whose destination cannot be determined statically.
    #[strum(serialize = "UNRESOLVED")]
    Unresolved,
    /// Reserved for explicit return edges; returns normally produce no out-edge.
    #[strum(serialize = "RETURN")]
    Return,
}

impl EdgeKind {
    /// Fixed emission rank of this edge kind within a block.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            EdgeKind::BranchTaken => 0,
            EdgeKind::BranchNotTaken => 1,
            EdgeKind::Fallthrough => 2,
            EdgeKind::Unconditional => 3,
            EdgeKind::Call => 4,
            EdgeKind::Unresolved => 5,
            EdgeKind::Return => 6,
        }
    }

    /// Returns true for edges a procedure body walk follows.
    ///
    /// Call edges enter another procedure and unresolved edges have no target,
    /// so neither extends a body.
    #[must_use]
    pub const fn is_intraprocedural(&self) -> bool {
        matches!(
            self,
            EdgeKind::BranchTaken
                | EdgeKind::BranchNotTaken
                | EdgeKind::Fallthrough
                | EdgeKind::Unconditional
        )
    }
}

/// A directed control flow edge out of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// The kind of control flow this edge represents.
    pub kind: EdgeKind,
    /// Target block leader address; absent for [`EdgeKind::Unresolved`].
    pub target: Option<u64>,
}

impl Edge {
    /// Creates a taken edge of a conditional branch.
    #[must_use]
    pub const fn taken(target: u64) -> Self {
        Edge {
            kind: EdgeKind::BranchTaken,
            target: Some(target),
        }
    }

    /// Creates a not-taken edge of a conditional branch.
    #[must_use]
    pub const fn not_taken(target: u64) -> Self {
        Edge {
            kind: EdgeKind::BranchNotTaken,
            target: Some(target),
        }
    }

    /// Creates a sequential fall-through edge.
    #[must_use]
    pub const fn fallthrough(target: u64) -> Self {
        Edge {
            kind: EdgeKind::Fallthrough,
            target: Some(target),
        }
    }

    /// Creates an unconditional branch edge.
    #[must_use]
    pub const fn unconditional(target: u64) -> Self {
        Edge {
            kind: EdgeKind::Unconditional,
            target: Some(target),
        }
    }

    /// Creates a call edge.
    #[must_use]
    pub const fn call(target: u64) -> Self {
        Edge {
            kind: EdgeKind::Call,
            target: Some(target),
        }
    }

    /// Creates an unresolved edge: the destination is statically unknown.
    #[must_use]
    pub const fn unresolved() -> Self {
        Edge {
            kind: EdgeKind::Unresolved,
            target: None,
        }
    }
}
