//! Deterministic, evidence-preserving renderers.
//!
//! Two text renderers consume the analysis result read-only:
//!
//! - [`asm`] - HLASM-style assembler listing with synthetic labels and hex evidence
//! - [`pseudo`] - Structured pseudocode recovered from the CFG
//!
//! Both emit UTF-8 with LF line endings and are byte-for-byte deterministic for a
//! given input and configuration. Renderers never fail: anything unknown is marked
//! (`UNRESOLVED_TARGET`, unknown-region dumps) and rendering continues.

pub mod asm;
pub mod pseudo;

use std::collections::BTreeMap;

use crate::{
    analysis::{cfg::EdgeKind, Confidence},
    assembly::Instruction,
    AnalysisResult,
};

/// The literal token marking any branch or call whose destination cannot be
/// determined statically. No output line ever presents a speculative target.
pub const UNRESOLVED_TARGET: &str = "UNRESOLVED_TARGET";

/// The evidence behind one rendered line: where the bytes came from and how
/// certain the inference is.
///
/// Not a separate phase; every enrichment step carries its addresses and raw
/// bytes forward, and the renderers materialize them per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceLink {
    /// Address of the first evidencing byte.
    pub start: u64,
    /// Uppercase hex of the exact input bytes.
    pub hex: String,
    /// Confidence of the inference the line states.
    pub confidence: Confidence,
}

impl EvidenceLink {
    /// Evidence for a single decoded instruction.
    #[must_use]
    pub fn from_instruction(instruction: &Instruction) -> Self {
        EvidenceLink {
            start: instruction.address,
            hex: instruction.hex_bytes(),
            confidence: Confidence::High,
        }
    }
}

/// Uppercase hex rendering of arbitrary bytes.
#[must_use]
pub(crate) fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Synthetic label for an in-procedure branch target.
#[must_use]
pub(crate) fn loc_label(address: u64) -> String {
    format!("LOC_{address:08X}")
}

/// Synthetic label for a data region.
#[must_use]
pub(crate) fn data_label(address: u64) -> String {
    format!("DATA_{address:08X}")
}

/// The synthetic label map of one analysis: procedure entries and branch targets.
///
/// Procedure entries take their procedure name; every other address that a
/// resolved branch or call points at gets a `LOC_<hex>` label.
#[derive(Debug, Clone, Default)]
pub(crate) struct Labels {
    map: BTreeMap<u64, String>,
}

impl Labels {
    pub(crate) fn build(result: &AnalysisResult) -> Self {
        let mut map = BTreeMap::new();
        for procedure in &result.procedures {
            map.insert(procedure.entry, procedure.name.clone());
        }
        for cfg in &result.cfgs {
            for block in cfg.blocks.values() {
                for edge in &block.edges {
                    if matches!(
                        edge.kind,
                        EdgeKind::BranchTaken | EdgeKind::Unconditional | EdgeKind::Call
                    ) {
                        if let Some(target) = edge.target {
                            map.entry(target).or_insert_with(|| loc_label(target));
                        }
                    }
                }
            }
        }
        Labels { map }
    }

    pub(crate) fn get(&self, address: u64) -> Option<&str> {
        self.map.get(&address).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_naming() {
        assert_eq!(loc_label(0x12), "LOC_00000012");
        assert_eq!(data_label(0x40), "DATA_00000040");
    }

    #[test]
    fn hex_rendering() {
        assert_eq!(hex_bytes(&[0x07, 0xFE]), "07FE");
        assert_eq!(hex_bytes(&[]), "");
    }

    #[test]
    fn evidence_from_instruction() {
        let instruction = Instruction {
            address: 0x10,
            bytes: vec![0x05, 0xEF],
            mnemonic: "BALR",
            format: crate::assembly::InstrFormat::RR,
            operands: vec![],
            flow: crate::assembly::FlowType::Call,
            target: None,
            indirect: true,
            valid: true,
        };
        let evidence = EvidenceLink::from_instruction(&instruction);
        assert_eq!(evidence.start, 0x10);
        assert_eq!(evidence.hex, "05EF");
        assert_eq!(evidence.confidence, Confidence::High);
    }
}
