// Copyright 2025-2026 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
// - 'file/mod.rs' uses mmap to map a file into memory

//! # zoscope
//!
//! A cross-platform framework for analyzing z/OS executable artifacts. Built in pure
//! Rust, `zoscope` ingests a load module or program object, recovers its program
//! structure, and emits traceable reconstructed assembler and structured pseudocode,
//! without requiring a mainframe or any runtime state.
//!
//! Every emitted artifact is anchored to concrete byte ranges in the input so that a
//! reviewer can audit the chain of inference from raw bytes to recovered structure:
//! undecodable bytes are marked, indirect branch targets are never guessed, and the
//! whole pipeline is deterministic byte-for-byte.
//!
//! # Architecture
//!
//! The core is a sequential enrichment pipeline; each stage takes an immutable input
//! and produces a more richly annotated intermediate:
//!
//! ```text
//! Bytes -> Ingestor -> Decoder -> Classifier -> CFG Builder -> Procedure Inferencer -> {Asm, Pseudo}
//! ```
//!
//! - **File Layer**: Memory-mapped file access and big-endian parsing
//! - **Artifact Layer**: Format detection, sectioning, and metadata extraction
//! - **Assembly Layer**: z/Architecture instruction decoding with total byte accounting
//! - **Analysis Layer**: Region classification, control flow graphs, procedures, call graph
//! - **Render Layer**: Deterministic assembler and pseudocode listings with evidence links
//!
//! ## Key Components
//!
//! - [`analyze`] / [`analyze_file`] - The sole analysis entry points
//! - [`AnalysisResult`] - The complete owned result tree
//! - [`AnalysisConfig`] - Explicit configuration (no process-global state)
//! - [`crate::assembly`] - Instruction decoding: every input byte is accounted for
//! - [`crate::analysis`] - Regions, CFGs, procedures, and the call graph
//! - [`crate::prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling
//!
//! # Usage Examples
//!
//! ## Quick Start
//!
//! ```rust
//! use zoscope::prelude::*;
//!
//! // BALR 12,15 / STM 14,12,12(13) / BCR 15,14
//! let bytes = [0x05, 0xCF, 0x90, 0xEC, 0xD0, 0x0C, 0x07, 0xFE];
//! let config = AnalysisConfig::default();
//! let result = analyze(&bytes, "SAMPLE", &[], &config);
//!
//! assert_eq!(result.status, AnalysisStatus::Success);
//! println!("{}", result.render_assembly(&config));
//! println!("{}", result.render_pseudocode(&config));
//! ```
//!
//! ## Analyzing a File
//!
//! ```rust,no_run
//! use zoscope::{analyze_file, AnalysisConfig};
//!
//! let config = AnalysisConfig::default();
//! let result = analyze_file("MYMOD.bin", &config)?;
//! for procedure in &result.procedures {
//!     println!("{} at 0x{:08X} ({})", procedure.name, procedure.entry, procedure.linkage);
//! }
//! # Ok::<(), zoscope::Error>(())
//! ```
//!
//! # Guarantees
//!
//! - **Byte accounting**: instructions plus unknown spans cover the input exactly
//! - **No speculation**: indirect targets render as the literal `UNRESOLVED_TARGET`
//! - **Determinism**: identical input and configuration give byte-identical output
//! - **Purity**: no persisted state, no temporary files, no shared state across artifacts
//!
//! # Thread Safety
//!
//! Analysis of a single artifact is strictly sequential. All result types are
//! [`Send`] and [`Sync`]; callers may analyze different artifacts on different
//! threads with no coordination.

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod artifact;
pub mod assembly;
pub mod file;
pub mod prelude;
pub mod render;

mod pipeline;

/// `zoscope` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`crate::Error`]. This is used consistently throughout the crate for all fallible
/// operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `zoscope` Error type.
///
/// The main error type for all operations in this crate. Provides detailed error
/// information for file access and artifact parsing. Analysis itself never fails;
/// see [`AnalysisStatus`] for how degraded inputs are reported.
pub use error::Error;

pub use file::parser::Parser;
pub use pipeline::{
    analyze, analyze_file, AnalysisConfig, AnalysisResult, AnalysisStatus, PseudocodeStyle,
    Statistics,
};
