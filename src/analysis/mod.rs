//! Program analysis: region classification, control flow, procedures, and the call graph.
//!
//! This module hosts the enrichment stages that sit between the instruction decoder
//! and the renderers:
//!
//! - [`classifier`] - Partitions the address space into CODE / DATA / UNKNOWN regions
//! - [`cfg`] - Basic blocks and typed control flow edges per CODE region
//! - [`procedures`] - Procedure inference from linkage patterns and call targets
//! - [`callgraph`] - Inter-procedural call relationships with per-site evidence
//!
//! All iteration orders are deterministic: regions and blocks are kept in ascending
//! address order, and edges are emitted in a fixed kind order.

pub mod callgraph;
pub mod cfg;
pub mod classifier;
pub mod procedures;

use strum::Display;

/// Confidence attached to an inference.
///
/// A three-valued ordered scale, never a probability: comparisons use the ordering
/// (`LOW < MEDIUM < HIGH`), no arithmetic is ever performed on it.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    /// Heuristic guess.
    #[strum(serialize = "LOW")]
    Low,
    /// Pattern-based inference.
    #[strum(serialize = "MEDIUM")]
    Medium,
    /// Direct evidence, no inference.
    #[strum(serialize = "HIGH")]
    High,
}
