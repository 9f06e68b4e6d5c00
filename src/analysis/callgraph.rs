//! Inter-procedural call graph with per-site evidence.
//!
//! Every CALL edge whose target lies inside a procedure contributes a resolved
//! call-graph edge labeled with the call-site address; indirect and otherwise
//! unresolvable call sites are recorded with an `UNRESOLVED` target rather than
//! dropped. Edges are kept in ascending (caller, site) order.

use std::collections::BTreeMap;

use crate::analysis::{
    cfg::{ControlFlowGraph, EdgeKind, TerminatorKind},
    procedures::Procedure,
    Confidence,
};

/// Resolved destination of a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// The entry address of the callee procedure.
    Resolved(u64),
    /// The destination cannot be determined statically.
    Unresolved,
}

/// One call site: a labeled edge of the call graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Entry address of the calling procedure.
    pub caller: u64,
    /// Address of the call instruction.
    pub site: u64,
    /// The callee, when known.
    pub target: CallTarget,
    /// Confidence in the resolution.
    pub confidence: Confidence,
}

/// Directed graph over procedures, represented as its labeled edge list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallGraph {
    /// All call sites in ascending (caller, site) order.
    pub edges: Vec<CallSite>,
}

impl CallGraph {
    /// Build the call graph from the CFGs and the inferred procedures.
    #[must_use]
    pub fn build(cfgs: &[ControlFlowGraph], procedures: &[Procedure]) -> Self {
        // Block leader -> owning procedure entry.
        let mut owner: BTreeMap<u64, u64> = BTreeMap::new();
        for procedure in procedures {
            for &leader in &procedure.blocks {
                owner.insert(leader, procedure.entry);
            }
        }

        let mut edges = Vec::new();
        for procedure in procedures {
            for &leader in &procedure.blocks {
                let Some(block) = cfgs.iter().find_map(|cfg| cfg.blocks.get(&leader)) else {
                    continue;
                };
                if block.terminator_kind != TerminatorKind::CallWithFallthrough {
                    continue;
                }

                for edge in &block.edges {
                    match edge.kind {
                        EdgeKind::Call => {
                            if let Some(target) = edge.target {
                                let callee = owner.get(&target).copied();
                                edges.push(CallSite {
                                    caller: procedure.entry,
                                    site: block.terminator,
                                    target: callee
                                        .map_or(CallTarget::Unresolved, CallTarget::Resolved),
                                    confidence: if callee.is_some() {
                                        Confidence::High
                                    } else {
                                        Confidence::Low
                                    },
                                });
                            }
                        }
                        EdgeKind::Unresolved => {
                            edges.push(CallSite {
                                caller: procedure.entry,
                                site: block.terminator,
                                target: CallTarget::Unresolved,
                                confidence: Confidence::Low,
                            });
                        }
                        _ => {}
                    }
                }
            }
        }

        edges.sort_by_key(|e| (e.caller, e.site));
        CallGraph { edges }
    }

    /// Entry addresses of procedures `caller` calls, in site order.
    #[must_use]
    pub fn callees(&self, caller: u64) -> Vec<u64> {
        self.edges
            .iter()
            .filter(|e| e.caller == caller)
            .filter_map(|e| match e.target {
                CallTarget::Resolved(entry) => Some(entry),
                CallTarget::Unresolved => None,
            })
            .collect()
    }

    /// Entry addresses of procedures that call `callee`.
    #[must_use]
    pub fn callers(&self, callee: u64) -> Vec<u64> {
        self.edges
            .iter()
            .filter(|e| e.target == CallTarget::Resolved(callee))
            .map(|e| e.caller)
            .collect()
    }

    /// Number of call sites whose destination is unknown.
    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.edges
            .iter()
            .filter(|e| e.target == CallTarget::Unresolved)
            .count()
    }
}
