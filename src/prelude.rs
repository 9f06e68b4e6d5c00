//! Convenient re-exports of the most commonly used types and traits.
//!
//! This module provides a curated selection of the most frequently used types
//! from across the zoscope library, allowing for convenient glob imports.
//!
//! # Usage Examples
//!
//! ```rust
//! use zoscope::prelude::*;
//!
//! let result = analyze(&[0x07, 0xFE], "RET", &[], &AnalysisConfig::default());
//! assert_eq!(result.status, AnalysisStatus::Success);
//! ```

pub use crate::{
    analysis::{
        callgraph::{CallGraph, CallSite, CallTarget},
        cfg::{BasicBlock, ControlFlowGraph, Edge, EdgeKind, TerminatorKind},
        classifier::{Region, RegionKind},
        procedures::{DetectionReason, Linkage, Procedure},
        Confidence,
    },
    analyze, analyze_file,
    artifact::{Artifact, ArtifactFormat, Section},
    assembly::{
        decode_instruction, decode_section, Decode, Decoded, FlowType, InstrFormat, Instruction,
        NativeDecoder, Operand, UnknownReason, UnknownSpan,
    },
    file::File,
    AnalysisConfig, AnalysisResult, AnalysisStatus, Error, PseudocodeStyle, Result, Statistics,
};
