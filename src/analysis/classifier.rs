//! Region classification: partitioning the address space into CODE / DATA / UNKNOWN.
//!
//! The classifier slides fixed-size windows across each section and scores them by
//! decode rate (decoded bytes over window bytes). Windows at or above the code
//! threshold are CODE, at or below the data threshold DATA, anything between UNKNOWN.
//! Adjacent windows of the same kind coalesce, region boundaries snap to instruction
//! boundaries, and constant pools embedded in code are carved out as DATA.
//!
//! The resulting regions tile the section byte space exactly: no gap, no overlap.

use strum::Display;
use tracing::debug;

use crate::{
    analysis::Confidence,
    artifact::Section,
    assembly::Instruction,
    AnalysisConfig,
};

/// Classification of a region of the address space.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Executable instructions.
    #[strum(serialize = "CODE")]
    Code,
    /// Non-executable data.
    #[strum(serialize = "DATA")]
    Data,
    /// Could not be determined.
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

/// A classified span of the address space.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Region classification.
    pub kind: RegionKind,
    /// First address of the region.
    pub start: u64,
    /// End address, exclusive.
    pub end: u64,
    /// How certain the classification is.
    pub confidence: Confidence,
    /// Short textual rationale for the verdict.
    pub rationale: String,
}

impl Region {
    /// Length of the region in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns true if the region is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns true if `address` falls inside this region.
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }
}

/// Minimum length of an address-like word run to be treated as a constant pool.
const CONSTANT_POOL_MIN_BYTES: u64 = 16;

/// Classify the sections of an artifact given its decoded instruction stream.
///
/// Regions are returned in ascending address order and tile each section exactly.
#[must_use]
pub fn classify(
    sections: &[Section],
    instructions: &[Instruction],
    config: &AnalysisConfig,
) -> Vec<Region> {
    let mut regions = Vec::new();
    for section in sections {
        classify_section(section, instructions, config, &mut regions);
    }
    regions
}

fn classify_section(
    section: &Section,
    instructions: &[Instruction],
    config: &AnalysisConfig,
    out: &mut Vec<Region>,
) {
    if section.bytes.is_empty() {
        return;
    }

    let window = config.window_size.max(1) as u64;
    let instrs = section_instructions(section, instructions);

    // Window verdicts, with the prior window's kind breaking exact-threshold ties.
    let mut kinds: Vec<(RegionKind, u64, u64)> = Vec::new();
    let mut start = section.base;
    while start < section.end() {
        let end = (start + window).min(section.end());
        let decoded = decoded_bytes_in(instrs, start, end);
        #[allow(clippy::cast_precision_loss)]
        let rate = decoded as f64 / (end - start) as f64;

        let prior = kinds.last().map(|&(kind, _, _)| kind);
        let kind = window_kind(rate, config, prior);

        match kinds.last_mut() {
            Some(last) if last.0 == kind => last.2 = end,
            _ => kinds.push((kind, start, end)),
        }
        start = end;
    }

    // On a kind change, place the boundary at the first instruction boundary
    // within the transitioning window rather than mid-instruction.
    let mut snapped: Vec<(RegionKind, u64, u64)> = Vec::new();
    for (kind, mut region_start, region_end) in kinds {
        if let Some(last) = snapped.last() {
            region_start = last.2;
        }
        if region_start >= region_end {
            continue;
        }
        let mut region_end = region_end;
        if region_end < section.end() {
            if let Some(spanning) = instrs
                .iter()
                .find(|i| i.address < region_end && i.end_address() > region_end)
            {
                region_end = spanning.end_address().min(section.end());
            }
        }
        match snapped.last_mut() {
            Some(last) if last.0 == kind => last.2 = region_end,
            _ => snapped.push((kind, region_start, region_end)),
        }
    }

    for (kind, start, end) in snapped {
        let decoded = decoded_bytes_in(instrs, start, end);
        #[allow(clippy::cast_precision_loss)]
        let rate = decoded as f64 / (end - start) as f64;
        debug!(kind = %kind, start, end, rate, "classified region");

        if kind == RegionKind::Code {
            carve_constant_pools(section, instrs, kind, start, end, rate, config, out);
        } else {
            out.push(make_region(kind, start, end, rate, config));
        }
    }
}

/// Instructions whose addresses fall inside the section.
fn section_instructions<'a>(section: &Section, instructions: &'a [Instruction]) -> &'a [Instruction] {
    let lo = instructions.partition_point(|i| i.address < section.base);
    let hi = instructions.partition_point(|i| i.address < section.end());
    &instructions[lo..hi]
}

/// Bytes covered by instructions within `[start, end)`, counting partial overlap.
fn decoded_bytes_in(instructions: &[Instruction], start: u64, end: u64) -> u64 {
    instructions
        .iter()
        .filter(|i| i.end_address() > start && i.address < end)
        .map(|i| i.end_address().min(end) - i.address.max(start))
        .sum()
}

fn window_kind(rate: f64, config: &AnalysisConfig, prior: Option<RegionKind>) -> RegionKind {
    if rate == config.code_threshold || rate == config.data_threshold {
        if let Some(prior) = prior {
            return prior;
        }
    }
    if rate >= config.code_threshold {
        RegionKind::Code
    } else if rate <= config.data_threshold {
        RegionKind::Data
    } else {
        RegionKind::Unknown
    }
}

fn make_region(kind: RegionKind, start: u64, end: u64, rate: f64, config: &AnalysisConfig) -> Region {
    let (confidence, rationale) = match kind {
        RegionKind::Code => (
            Confidence::High,
            format!("decode_rate={rate:.2} >= {:.2}", config.code_threshold),
        ),
        RegionKind::Data => (
            Confidence::Medium,
            format!("decode_rate={rate:.2} <= {:.2}", config.data_threshold),
        ),
        RegionKind::Unknown => (
            Confidence::Low,
            format!("decode_rate={rate:.2} in uncertain range"),
        ),
    };
    Region {
        kind,
        start,
        end,
        confidence,
        rationale,
    }
}

/// Detect constant pools inside a would-be CODE region and downgrade them to DATA.
///
/// A constant pool is a run of at least [`CONSTANT_POOL_MIN_BYTES`] bytes of aligned
/// 4-byte words whose values look like section-relative addresses. The run bounds
/// are snapped to instruction boundaries so the tiling stays clean.
#[allow(clippy::too_many_arguments)]
fn carve_constant_pools(
    section: &Section,
    instrs: &[Instruction],
    kind: RegionKind,
    start: u64,
    end: u64,
    rate: f64,
    config: &AnalysisConfig,
    out: &mut Vec<Region>,
) {
    let section_len = section.bytes.len() as u64;
    let mut pools: Vec<(u64, u64)> = Vec::new();

    let mut addr = start.next_multiple_of(4);
    let mut run_start: Option<u64> = None;
    while addr + 4 <= end {
        let offset = (addr - section.base) as usize;
        let word = u32::from_be_bytes([
            section.bytes[offset],
            section.bytes[offset + 1],
            section.bytes[offset + 2],
            section.bytes[offset + 3],
        ]);
        let address_like = word > 0 && u64::from(word) < section_len;

        if address_like {
            run_start.get_or_insert(addr);
        } else if let Some(rs) = run_start.take() {
            record_pool(rs, addr, instrs, start, end, &mut pools);
        }
        addr += 4;
    }
    if let Some(rs) = run_start {
        record_pool(rs, addr.min(end), instrs, start, end, &mut pools);
    }

    if pools.is_empty() {
        out.push(make_region(kind, start, end, rate, config));
        return;
    }

    let mut cursor = start;
    for (pool_start, pool_end) in pools {
        if pool_start > cursor {
            out.push(make_region(kind, cursor, pool_start, rate, config));
        }
        debug!(start = pool_start, end = pool_end, "constant pool carved from code");
        out.push(Region {
            kind: RegionKind::Data,
            start: pool_start,
            end: pool_end,
            confidence: Confidence::Medium,
            rationale: "constant-pool".to_string(),
        });
        cursor = pool_end;
    }
    if cursor < end {
        out.push(make_region(kind, cursor, end, rate, config));
    }
}

fn record_pool(
    run_start: u64,
    run_end: u64,
    instrs: &[Instruction],
    region_start: u64,
    region_end: u64,
    pools: &mut Vec<(u64, u64)>,
) {
    // Snap inward to instruction boundaries so no instruction is bisected.
    let snapped_start = instrs
        .iter()
        .find(|i| i.address < run_start && i.end_address() > run_start)
        .map_or(run_start, Instruction::end_address)
        .max(region_start);
    let snapped_end = instrs
        .iter()
        .find(|i| i.address < run_end && i.end_address() > run_end)
        .map_or(run_end, |i| i.address)
        .min(region_end);

    if snapped_end > snapped_start && snapped_end - snapped_start >= CONSTANT_POOL_MIN_BYTES {
        pools.push((snapped_start, snapped_end));
    }
}
