//! Instruction representation, operand types, and decoding metadata.
//!
//! This module defines the type system for decoded z/Architecture instructions. It provides
//! strongly-typed representations for operands, control flow behavior, and the spans of bytes
//! that could not be decoded, enabling static analysis with a complete byte-level audit trail.
//!
//! # Key Components
//!
//! - [`Instruction`] - Complete decoded instruction representation
//! - [`Operand`] - Closed operand union (register, immediate, base+displacement, ...)
//! - [`FlowType`] - Control flow category
//! - [`InstrFormat`] - z/Architecture encoding format (RR, RX, SS, RIL, ...)
//! - [`UnknownSpan`] / [`UnknownReason`] - Accounting for bytes outside any instruction
//! - [`ConditionMask`] - The 4-bit condition-code mask used by BC/BCR/BRC
//!
//! # Usage Examples
//!
//! ```rust
//! use zoscope::assembly::{decode_instruction, Decoded, FlowType};
//!
//! let bytecode = [0x07, 0xFE]; // BCR 15,14
//! let (decoded, consumed) = decode_instruction(&bytecode, 0x0);
//! assert_eq!(consumed, 2);
//! match decoded {
//!     Decoded::Instruction(instr) => {
//!         assert_eq!(instr.mnemonic, "BCR");
//!         assert_eq!(instr.flow, FlowType::Return);
//!     }
//!     Decoded::Unknown(_) => panic!("expected an instruction"),
//! }
//! ```

use std::fmt;

use bitflags::bitflags;
use strum::Display;

bitflags! {
    /// The 4-bit condition-code mask carried by BC, BCR, BRC, and BRCL.
    ///
    /// Each bit selects one of the four condition codes the branch fires on.
    /// Mask `0` is a no-op, mask `15` branches unconditionally.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConditionMask: u8 {
        /// Condition code 0 (equal / zero).
        const EQUAL = 0b1000;
        /// Condition code 1 (low / first operand less).
        const LOW = 0b0100;
        /// Condition code 2 (high / first operand greater).
        const HIGH = 0b0010;
        /// Condition code 3 (overflow / ones).
        const OVERFLOW = 0b0001;
    }
}

impl ConditionMask {
    /// Returns true if the mask never selects a branch (mask `0`).
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.bits() == 0
    }

    /// Returns true if the mask branches on every condition code (mask `15`).
    #[must_use]
    pub const fn is_always(&self) -> bool {
        self.bits() == 0b1111
    }

    /// A human-readable name for the condition selected by this mask.
    ///
    /// Covers the masks the common extended mnemonics stand for; anything
    /// else falls back to `condition_mask_<n>`.
    #[must_use]
    pub fn condition_name(&self) -> String {
        match self.bits() {
            15 => "always".to_string(),
            8 => "equal".to_string(),
            6 | 7 => "not_equal".to_string(),
            4 => "less_than".to_string(),
            2 => "greater_than".to_string(),
            11 => "less_or_equal".to_string(),
            13 => "greater_or_equal".to_string(),
            1 => "overflow".to_string(),
            14 => "no_overflow".to_string(),
            other => format!("condition_mask_{other}"),
        }
    }
}

/// z/Architecture instruction encoding formats.
///
/// The format determines how operands are laid out within the instruction bytes;
/// operand extraction is mechanical once the format is known.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum InstrFormat {
    /// Register-Register (2 bytes).
    RR,
    /// Register-Index-Storage (4 bytes).
    RX,
    /// Register-Storage (4 bytes).
    RS,
    /// Storage-Immediate (4 bytes).
    SI,
    /// Storage operand only (4 bytes).
    S,
    /// Storage-Storage with length (6 bytes).
    SS,
    /// Register-Register Extended, two-byte opcode (4 bytes).
    RRE,
    /// Register-Immediate (4 bytes, `A7` family).
    RI,
    /// Register-Immediate Long (6 bytes, `C0` family).
    RIL,
    /// Register-Index-Storage with 20-bit displacement (6 bytes, `E3` family).
    RXY,
    /// Register-Storage with 20-bit displacement (6 bytes, `EB` family).
    RSY,
}

/// A single decoded operand.
///
/// This is a closed union; pattern matching over it is exhaustive. `Opaque` covers
/// the length-qualified storage operand of SS-format instructions, which has no
/// structured counterpart that later stages consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A register number (0-15). Also used for the mask position of conditional
    /// branches, where the value is the raw 4-bit condition mask.
    Register(u8),
    /// An immediate integer value.
    Immediate(i64),
    /// Base register plus displacement.
    BaseDisp {
        /// Base register (0 means no base: the displacement is absolute).
        base: u8,
        /// Displacement. 12-bit unsigned for classic formats, 20-bit signed for RXY/RSY.
        disp: i32,
    },
    /// Base register, index register, and displacement.
    BaseIndexDisp {
        /// Base register.
        base: u8,
        /// Index register.
        index: u8,
        /// Displacement.
        disp: i32,
    },
    /// A PC-relative offset in halfwords, as encoded.
    PcRelative(i32),
    /// An operand with no structured representation, pre-rendered for listings.
    Opaque(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{r}"),
            Operand::Immediate(v) => write!(f, "{v}"),
            Operand::BaseDisp { base, disp } => write!(f, "{disp}({base})"),
            Operand::BaseIndexDisp { base, index, disp } => {
                write!(f, "{disp}({index},{base})")
            }
            Operand::PcRelative(halfwords) => {
                let bytes = i64::from(*halfwords) * 2;
                write!(f, "*{bytes:+}")
            }
            Operand::Opaque(text) => write!(f, "{text}"),
        }
    }
}

/// How an instruction affects control flow.
///
/// This is the category every downstream stage keys on: block termination,
/// edge construction, and procedure detection all derive from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to the next instruction.
    Sequential,
    /// Conditional branch; may fall through.
    ConditionalBranch,
    /// Always branches to a (possibly unresolved) direct target.
    UnconditionalBranch,
    /// Branch-and-link style call; execution is assumed to resume after it.
    Call,
    /// Returns from the current procedure (`BCR 15,14`, the `BR 14` idiom).
    Return,
    /// Unconditional branch through a register; the target is never known statically.
    Indirect,
    /// Category could not be determined.
    Unknown,
}

/// A decoded z/Architecture instruction with all metadata needed for analysis.
///
/// Carries the complete evidence chain: the address, the exact raw bytes, and the
/// decoded interpretation. Instruction lengths are 2, 4, or 6 bytes, determined by
/// the first two bits of the opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the first byte.
    pub address: u64,
    /// The exact raw bytes (2, 4, or 6).
    pub bytes: Vec<u8>,
    /// Instruction mnemonic from the closed opcode table.
    pub mnemonic: &'static str,
    /// Encoding format.
    pub format: InstrFormat,
    /// Decoded operands in listing order.
    pub operands: Vec<Operand>,
    /// Control flow category.
    pub flow: FlowType,
    /// Resolved absolute target for direct branches and calls, when statically known.
    pub target: Option<u64>,
    /// True when the branch or call target is held in a register.
    pub indirect: bool,
    /// Decoder validity flag. The native decoder only emits fully decoded
    /// instructions; alternative decoders may set this to false for best-effort
    /// output whose operands are incomplete.
    pub valid: bool,
}

impl Instruction {
    /// Size of this instruction in bytes (2, 4, or 6).
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Address of the byte immediately after this instruction.
    #[must_use]
    pub fn end_address(&self) -> u64 {
        self.address + self.bytes.len() as u64
    }

    /// Uppercase hex rendering of the raw bytes.
    #[must_use]
    pub fn hex_bytes(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02X}")).collect()
    }

    /// Check if this instruction is a branch (conditional, unconditional, or indirect).
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Indirect
        )
    }

    /// Check if this instruction ends a basic block.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Call
                | FlowType::Return
                | FlowType::Indirect
        )
    }

    /// Render the operand list the way a listing prints it: comma separated.
    #[must_use]
    pub fn operand_string(&self) -> String {
        self.operands
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Why a span of bytes is not covered by an instruction.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum UnknownReason {
    /// The opcode was unrecognized or the bytes were too short for the declared length.
    #[strum(serialize = "decode-failed")]
    DecodeFailed,
    /// The bytes decoded, but the region classifier ruled them data.
    #[strum(serialize = "classified-data")]
    ClassifiedData,
    /// The bytes sit at an alignment no decode run reaches.
    #[strum(serialize = "misaligned")]
    Misaligned,
    /// The bytes belong to overlapping decode runs.
    #[strum(serialize = "overlapping")]
    Overlapping,
}

/// A contiguous region of bytes that could not be decoded or was classified as non-code.
///
/// Together with [`Instruction`]s, unknown spans keep the byte accounting total:
/// every input byte belongs to exactly one or the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSpan {
    /// Address of the first byte.
    pub start: u64,
    /// The raw bytes of the span.
    pub bytes: Vec<u8>,
    /// Why these bytes are not instructions.
    pub reason: UnknownReason,
}

impl UnknownSpan {
    /// Length of the span in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the span is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Address of the byte immediately after this span.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_mask_properties() {
        assert!(ConditionMask::from_bits_truncate(0).is_noop());
        assert!(ConditionMask::from_bits_truncate(15).is_always());
        assert!(!ConditionMask::EQUAL.is_noop());
        assert!(!ConditionMask::EQUAL.is_always());
    }

    #[test]
    fn condition_mask_names() {
        assert_eq!(ConditionMask::from_bits_truncate(8).condition_name(), "equal");
        assert_eq!(ConditionMask::from_bits_truncate(15).condition_name(), "always");
        assert_eq!(ConditionMask::from_bits_truncate(7).condition_name(), "not_equal");
        assert_eq!(
            ConditionMask::from_bits_truncate(9).condition_name(),
            "condition_mask_9"
        );
    }

    #[test]
    fn operand_display() {
        assert_eq!(Operand::Register(15).to_string(), "15");
        assert_eq!(Operand::Immediate(-1).to_string(), "-1");
        assert_eq!(Operand::BaseDisp { base: 13, disp: 12 }.to_string(), "12(13)");
        assert_eq!(
            Operand::BaseIndexDisp {
                base: 12,
                index: 3,
                disp: 256
            }
            .to_string(),
            "256(3,12)"
        );
        assert_eq!(Operand::PcRelative(8).to_string(), "*+16");
        assert_eq!(Operand::PcRelative(-4).to_string(), "*-8");
        assert_eq!(Operand::Opaque("12(7,13)".to_string()).to_string(), "12(7,13)");
    }

    #[test]
    fn instruction_accessors() {
        let instr = Instruction {
            address: 0x10,
            bytes: vec![0x07, 0xFE],
            mnemonic: "BCR",
            format: InstrFormat::RR,
            operands: vec![Operand::Register(15), Operand::Register(14)],
            flow: FlowType::Return,
            target: None,
            indirect: false,
            valid: true,
        };

        assert_eq!(instr.size(), 2);
        assert_eq!(instr.end_address(), 0x12);
        assert_eq!(instr.hex_bytes(), "07FE");
        assert_eq!(instr.operand_string(), "15,14");
        assert!(instr.is_terminal());
        assert!(!instr.is_branch());
    }

    #[test]
    fn unknown_span_accounting() {
        let span = UnknownSpan {
            start: 0x4,
            bytes: vec![0xFF, 0xFF],
            reason: UnknownReason::DecodeFailed,
        };
        assert_eq!(span.len(), 2);
        assert_eq!(span.end(), 0x6);
        assert!(!span.is_empty());
        assert_eq!(span.reason.to_string(), "decode-failed");
    }

    #[test]
    fn unknown_reason_tags() {
        assert_eq!(UnknownReason::ClassifiedData.to_string(), "classified-data");
        assert_eq!(UnknownReason::Misaligned.to_string(), "misaligned");
        assert_eq!(UnknownReason::Overlapping.to_string(), "overlapping");
    }
}
