//! The analysis pipeline: ingestion through procedure inference.
//!
//! [`analyze`] is the sole entry point of the core. It is a pure function over the
//! input bytes: the same bytes and configuration produce a byte-identical result
//! tree on every run, process, and platform. Analysis of one artifact is strictly
//! sequential and single-threaded, holds no shared state, and persists nothing.
//!
//! ```text
//! Bytes -> Ingestor -> Decoder -> Classifier -> CFG Builder -> Procedure Inferencer
//! ```
//!
//! # Example
//!
//! ```rust
//! use zoscope::{analyze, AnalysisConfig};
//!
//! let result = analyze(&[0x07, 0xFE], "RETMOD", &[], &AnalysisConfig::default());
//! assert_eq!(result.status.to_string(), "success");
//! assert_eq!(result.statistics.decoded_instruction_count, 1);
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use strum::Display;
use tracing::debug;

use crate::{
    analysis::{
        callgraph::CallGraph,
        cfg::{build_cfgs, ControlFlowGraph},
        classifier::{classify, Region, RegionKind},
        procedures::{infer_procedures, Procedure},
    },
    artifact::Artifact,
    assembly::{
        decode_section, FlowType, Instruction, NativeDecoder, UnknownReason, UnknownSpan,
    },
    file::File,
    render, Result,
};

/// Decode-rate bound above which an analysis counts as a success.
const STATUS_SUCCESS_RATE: f64 = 0.80;
/// Decode-rate bound below which an analysis counts as a failure.
const STATUS_FAILURE_RATE: f64 = 0.20;

/// Output dialect of the pseudocode renderer.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum PseudocodeStyle {
    /// Braced blocks, `while (cond) { ... }`.
    #[strum(serialize = "c-like")]
    CLike,
    /// Indentation blocks, `while cond:`.
    #[strum(serialize = "python-like")]
    PythonLike,
}

/// Configuration of the analysis pipeline and renderers.
///
/// Thresholds are passed explicitly rather than read from process-global state;
/// the classification thresholds here are distinct from the fixed status
/// thresholds (`0.80` / `0.20`) and must not be conflated with them.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Classifier window size in bytes.
    pub window_size: usize,
    /// Decode rate at or above which a window is CODE.
    pub code_threshold: f64,
    /// Decode rate at or below which a window is DATA.
    pub data_threshold: f64,
    /// Include the raw-byte hex column in the assembler listing.
    pub emit_hex: bool,
    /// Pseudocode output dialect.
    pub pseudocode_style: PseudocodeStyle,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            window_size: 64,
            code_threshold: 0.70,
            data_threshold: 0.30,
            emit_hex: true,
            pseudocode_style: PseudocodeStyle::CLike,
        }
    }
}

/// Overall outcome of an analysis, derived from the decode rate.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    /// Decode rate above `0.80`.
    #[strum(serialize = "success")]
    Success,
    /// Decode rate between `0.20` and `0.80`.
    #[strum(serialize = "partial")]
    Partial,
    /// Decode rate below `0.20`, or nothing to analyze.
    #[strum(serialize = "failure")]
    Failure,
}

/// Aggregate statistics over one analysis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statistics {
    /// Number of decoded instructions.
    pub decoded_instruction_count: usize,
    /// Bytes covered by instructions.
    pub decoded_byte_count: usize,
    /// Bytes covered by unknown spans.
    pub unknown_byte_count: usize,
    /// `decoded / (decoded + unknown)`; zero for empty input.
    pub decode_rate: f64,
    /// Number of branch instructions (conditional, unconditional, indirect).
    pub branch_count: usize,
    /// Number of call instructions.
    pub call_count: usize,
    /// Number of return instructions.
    pub return_count: usize,
    /// Instruction counts per mnemonic, in lexicographic order.
    pub mnemonic_histogram: BTreeMap<&'static str, usize>,
}

/// The complete result tree of one artifact analysis.
///
/// Owned, immutable, and self-contained: renderers consume it read-only and
/// nothing escapes the analysis scope.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// The ingested artifact.
    pub artifact: Artifact,
    /// Decoded instructions in ascending address order.
    pub instructions: Vec<Instruction>,
    /// Unknown spans in ascending address order.
    pub unknown_spans: Vec<UnknownSpan>,
    /// Region partition of the artifact byte space.
    pub regions: Vec<Region>,
    /// One CFG per CODE region.
    pub cfgs: Vec<ControlFlowGraph>,
    /// Inferred procedures in ascending entry order.
    pub procedures: Vec<Procedure>,
    /// The inter-procedural call graph.
    pub call_graph: CallGraph,
    /// Aggregate statistics.
    pub statistics: Statistics,
    /// Overall outcome.
    pub status: AnalysisStatus,
    /// Non-fatal observations worth surfacing to the operator.
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    /// Render the HLASM-style assembler listing.
    #[must_use]
    pub fn render_assembly(&self, config: &AnalysisConfig) -> String {
        render::asm::render_assembly(self, config)
    }

    /// Render the structured pseudocode listing.
    #[must_use]
    pub fn render_pseudocode(&self, config: &AnalysisConfig) -> String {
        render::pseudo::render_pseudocode(self, config)
    }
}

/// Analyze one artifact from raw bytes.
///
/// This is the sole core entry point. It never fails: degenerate input produces
/// an empty but well-formed result with `failure` status. Entry hints are merged
/// with header-declared entry points at the ingestion boundary.
///
/// # Arguments
///
/// * `data` - The complete artifact bytes
/// * `name` - Identifier for reports, normally the filename stem
/// * `entry_hints` - Additional entry addresses supplied by the caller
/// * `config` - Pipeline configuration
#[must_use]
pub fn analyze(data: &[u8], name: &str, entry_hints: &[u64], config: &AnalysisConfig) -> AnalysisResult {
    let artifact = Artifact::ingest(data, name, entry_hints);

    let decoder = NativeDecoder;
    let mut instructions = Vec::new();
    let mut unknown_spans = Vec::new();
    for section in &artifact.sections {
        let outcome = decode_section(&decoder, section);
        instructions.extend(outcome.instructions);
        unknown_spans.extend(outcome.unknown_spans);
    }
    instructions.sort_by_key(|i| i.address);
    unknown_spans.sort_by_key(|s| s.start);

    let regions = classify(&artifact.sections, &instructions, config);

    // Instructions the classifier ruled data are not code after all: fold them
    // back into unknown spans so the byte accounting stays total. Instructions
    // in UNKNOWN regions are kept; the uncertainty is the finding.
    let (instructions, unknown_spans) = fold_data_regions(instructions, unknown_spans, &regions);

    let cfgs = build_cfgs(&regions, &instructions, &artifact.entry_points);
    let procedures = infer_procedures(&cfgs, &instructions, &artifact);
    let call_graph = CallGraph::build(&cfgs, &procedures);

    let statistics = compute_statistics(&instructions, &unknown_spans);
    let status = derive_status(&statistics);
    debug!(name, %status, rate = statistics.decode_rate, "analysis complete");

    let mut warnings = Vec::new();
    if !data.is_empty() && statistics.decode_rate < 0.5 {
        warnings.push(format!(
            "low decode rate ({:.1}%): input may not be z/Architecture code or uses unsupported instructions",
            statistics.decode_rate * 100.0
        ));
    }
    let unresolved: usize = cfgs.iter().map(|c| c.unresolved_sites.len()).sum();
    if unresolved > 10 {
        warnings.push(format!(
            "{unresolved} unresolved branch targets: control flow recovery may be incomplete"
        ));
    }

    AnalysisResult {
        artifact,
        instructions,
        unknown_spans,
        regions,
        cfgs,
        procedures,
        call_graph,
        statistics,
        status,
        warnings,
    }
}

/// Analyze an artifact from disk.
///
/// The filename stem becomes the artifact name.
///
/// # Errors
///
/// Returns [`crate::Error::FileError`] if the file cannot be read; everything
/// past that point is infallible.
pub fn analyze_file<P: AsRef<Path>>(path: P, config: &AnalysisConfig) -> Result<AnalysisResult> {
    let path = path.as_ref();
    let file = File::from_path(path)?;
    let name = path
        .file_stem()
        .map_or_else(|| "artifact".to_string(), |s| s.to_string_lossy().into_owned());
    Ok(analyze(file.data(), &name, &[], config))
}

fn fold_data_regions(
    instructions: Vec<Instruction>,
    mut unknown_spans: Vec<UnknownSpan>,
    regions: &[Region],
) -> (Vec<Instruction>, Vec<UnknownSpan>) {
    let mut kept = Vec::with_capacity(instructions.len());
    let mut folded: Vec<UnknownSpan> = Vec::new();

    for instruction in instructions {
        let in_data = regions
            .iter()
            .any(|r| r.kind == RegionKind::Data && r.contains(instruction.address));
        if in_data {
            match folded.last_mut() {
                Some(last) if last.end() == instruction.address => {
                    last.bytes.extend_from_slice(&instruction.bytes);
                }
                _ => folded.push(UnknownSpan {
                    start: instruction.address,
                    bytes: instruction.bytes,
                    reason: UnknownReason::ClassifiedData,
                }),
            }
        } else {
            kept.push(instruction);
        }
    }

    unknown_spans.extend(folded);
    unknown_spans.sort_by_key(|s| s.start);
    (kept, unknown_spans)
}

fn compute_statistics(instructions: &[Instruction], unknown_spans: &[UnknownSpan]) -> Statistics {
    let decoded_byte_count: usize = instructions.iter().map(Instruction::size).sum();
    let unknown_byte_count: usize = unknown_spans.iter().map(UnknownSpan::len).sum();
    let total = decoded_byte_count + unknown_byte_count;

    let mut mnemonic_histogram = BTreeMap::new();
    for instruction in instructions {
        *mnemonic_histogram.entry(instruction.mnemonic).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    let decode_rate = if total == 0 {
        0.0
    } else {
        decoded_byte_count as f64 / total as f64
    };

    Statistics {
        decoded_instruction_count: instructions.len(),
        decoded_byte_count,
        unknown_byte_count,
        decode_rate,
        branch_count: instructions.iter().filter(|i| i.is_branch()).count(),
        call_count: instructions.iter().filter(|i| i.flow == FlowType::Call).count(),
        return_count: instructions
            .iter()
            .filter(|i| i.flow == FlowType::Return)
            .count(),
        mnemonic_histogram,
    }
}

fn derive_status(statistics: &Statistics) -> AnalysisStatus {
    let total = statistics.decoded_byte_count + statistics.unknown_byte_count;
    if total == 0 || statistics.decode_rate < STATUS_FAILURE_RATE {
        AnalysisStatus::Failure
    } else if statistics.decode_rate > STATUS_SUCCESS_RATE {
        AnalysisStatus::Success
    } else {
        AnalysisStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = AnalysisConfig::default();
        assert_eq!(config.window_size, 64);
        assert!((config.code_threshold - 0.70).abs() < f64::EPSILON);
        assert!((config.data_threshold - 0.30).abs() < f64::EPSILON);
        assert!(config.emit_hex);
        assert_eq!(config.pseudocode_style, PseudocodeStyle::CLike);
    }

    #[test]
    fn status_thresholds() {
        let stats = |rate: f64, total: usize| Statistics {
            decoded_byte_count: total,
            decode_rate: rate,
            ..Statistics::default()
        };
        assert_eq!(derive_status(&stats(1.0, 10)), AnalysisStatus::Success);
        assert_eq!(derive_status(&stats(0.81, 10)), AnalysisStatus::Success);
        assert_eq!(derive_status(&stats(0.80, 10)), AnalysisStatus::Partial);
        assert_eq!(derive_status(&stats(0.5, 10)), AnalysisStatus::Partial);
        assert_eq!(derive_status(&stats(0.20, 10)), AnalysisStatus::Partial);
        assert_eq!(derive_status(&stats(0.19, 10)), AnalysisStatus::Failure);
        assert_eq!(derive_status(&stats(0.0, 0)), AnalysisStatus::Failure);
    }

    #[test]
    fn status_display() {
        assert_eq!(AnalysisStatus::Success.to_string(), "success");
        assert_eq!(AnalysisStatus::Partial.to_string(), "partial");
        assert_eq!(AnalysisStatus::Failure.to_string(), "failure");
    }

    #[test]
    fn pseudocode_style_display() {
        assert_eq!(PseudocodeStyle::CLike.to_string(), "c-like");
        assert_eq!(PseudocodeStyle::PythonLike.to_string(), "python-like");
    }
}
