//! Instruction decoding engine: bytes to instructions with total byte accounting.
//!
//! The decoder performs a linear sweep over section bytes. Instruction length comes
//! from the first two bits of the opcode byte; when an opcode is outside the closed
//! table or the remaining bytes are too short for the declared length, the decoder
//! emits a one-byte [`UnknownSpan`] and resynchronizes at the next byte. Every input
//! byte ends up in exactly one instruction or one unknown span; decoding never fails.
//!
//! # Key Components
//!
//! - [`Decode`] - The pluggable decoder capability: `decode(bytes, addr) → (Decoded, consumed)`
//! - [`NativeDecoder`] - The built-in table-driven implementation
//! - [`decode_instruction`] - Decode a single instruction with the native decoder
//! - [`decode_section`] - Linear sweep over one section
//!
//! # Usage Examples
//!
//! ```rust
//! use zoscope::artifact::Section;
//! use zoscope::assembly::{decode_section, NativeDecoder};
//!
//! let section = Section { base: 0, bytes: vec![0x05, 0xEF, 0x07, 0xFE] };
//! let outcome = decode_section(&NativeDecoder, &section);
//! assert_eq!(outcome.instructions.len(), 2);
//! assert!(outcome.unknown_spans.is_empty());
//! ```

use crate::{
    artifact::Section,
    assembly::{
        instruction::{FlowType, InstrFormat, Instruction, Operand, UnknownReason, UnknownSpan},
        opcodes::{self, OpKind, OpcodeDef},
    },
};

/// The outcome of decoding one unit of bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The bytes decoded into an instruction.
    Instruction(Instruction),
    /// The bytes could not be decoded.
    Unknown(UnknownSpan),
}

/// The decoder capability.
///
/// An implementation maps a byte prefix at a given address to either an
/// [`Instruction`] or an [`UnknownSpan`], reporting how many bytes it consumed.
/// Implementations must consume at least one byte for non-empty input so that a
/// sweep always terminates, and must never consume bytes they did not account for.
/// Selection between implementations is a construction-time switch; no runtime
/// plugin machinery exists.
pub trait Decode {
    /// Decode the unit starting at `bytes[0]`, located at `address`.
    fn decode(&self, bytes: &[u8], address: u64) -> (Decoded, usize);
}

/// The built-in table-driven z/Architecture decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeDecoder;

impl Decode for NativeDecoder {
    fn decode(&self, bytes: &[u8], address: u64) -> (Decoded, usize) {
        decode_instruction(bytes, address)
    }
}

/// All instructions and unknown spans recovered from one section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodeOutcome {
    /// Decoded instructions in ascending address order.
    pub instructions: Vec<Instruction>,
    /// Unknown spans in ascending address order, adjacent same-reason spans merged.
    pub unknown_spans: Vec<UnknownSpan>,
}

/// Decode a single instruction at `address` with the native decoder.
///
/// Returns the decoded unit and the number of bytes consumed (at least one for
/// non-empty input; zero only for empty input).
#[must_use]
pub fn decode_instruction(bytes: &[u8], address: u64) -> (Decoded, usize) {
    let Some(&first) = bytes.first() else {
        return (
            Decoded::Unknown(UnknownSpan {
                start: address,
                bytes: Vec::new(),
                reason: UnknownReason::DecodeFailed,
            }),
            0,
        );
    };

    let length = opcodes::instruction_length(first);
    if bytes.len() < length {
        return (unknown_byte(bytes[0], address), 1);
    }

    let Some(def) = opcodes::lookup(&bytes[..length]) else {
        return (unknown_byte(bytes[0], address), 1);
    };

    let raw = &bytes[..length];
    let instruction = match def.format {
        InstrFormat::RR => decode_rr(def, raw, address),
        InstrFormat::RX => decode_rx(def, raw, address),
        InstrFormat::RS => decode_rs(def, raw, address),
        InstrFormat::SI => decode_si(def, raw, address),
        InstrFormat::S => decode_s(def, raw, address),
        InstrFormat::SS => decode_ss(def, raw, address),
        InstrFormat::RRE => decode_rre(def, raw, address),
        InstrFormat::RI => decode_ri(def, raw, address),
        InstrFormat::RIL => decode_ril(def, raw, address),
        InstrFormat::RXY => decode_rxy(def, raw, address),
        InstrFormat::RSY => decode_rsy(def, raw, address),
    };

    (Decoded::Instruction(instruction), length)
}

/// Linear-sweep decode of an entire section.
///
/// Every byte of the section is accounted for in either an instruction or an
/// unknown span; adjacent one-byte decode failures merge into a single span.
#[must_use]
pub fn decode_section(decoder: &dyn Decode, section: &Section) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();
    let data = &section.bytes;
    let mut offset = 0usize;

    while offset < data.len() {
        let address = section.base + offset as u64;
        let (decoded, consumed) = decoder.decode(&data[offset..], address);

        match decoded {
            Decoded::Instruction(instruction) => outcome.instructions.push(instruction),
            Decoded::Unknown(span) => match outcome.unknown_spans.last_mut() {
                Some(last) if last.end() == span.start && last.reason == span.reason => {
                    last.bytes.extend_from_slice(&span.bytes);
                }
                _ => outcome.unknown_spans.push(span),
            },
        }

        // A decoder must make progress; guard against a zero-consumption bug.
        offset += consumed.max(1);
    }

    outcome
}

fn unknown_byte(byte: u8, address: u64) -> Decoded {
    Decoded::Unknown(UnknownSpan {
        start: address,
        bytes: vec![byte],
        reason: UnknownReason::DecodeFailed,
    })
}

fn make(
    def: OpcodeDef,
    raw: &[u8],
    address: u64,
    operands: Vec<Operand>,
    flow: FlowType,
    target: Option<u64>,
    indirect: bool,
) -> Instruction {
    Instruction {
        address,
        bytes: raw.to_vec(),
        mnemonic: def.mnemonic,
        format: def.format,
        operands,
        flow,
        target,
        indirect,
        valid: true,
    }
}

/// Flow category for a mask-driven branch once the mask is known.
///
/// Mask 0 never branches (the canonical no-op), mask 15 always branches.
fn mask_flow(mask: u8, always: FlowType) -> FlowType {
    match mask {
        0 => FlowType::Sequential,
        15 => always,
        _ => FlowType::ConditionalBranch,
    }
}

fn decode_rr(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let r1 = raw[1] >> 4;
    let r2 = raw[1] & 0x0F;
    let operands = vec![Operand::Register(r1), Operand::Register(r2)];

    let (flow, indirect) = match def.kind {
        OpKind::CondBranch => {
            // BCR: a mask of 0 or a target of register 0 never branches.
            if r1 == 0 || r2 == 0 {
                (FlowType::Sequential, false)
            } else if r1 == 15 && r2 == 14 {
                (FlowType::Return, false)
            } else if r1 == 15 {
                (FlowType::Indirect, true)
            } else {
                (FlowType::ConditionalBranch, true)
            }
        }
        // BALR/BASR with R2=0 only establishes linkage, no branch occurs.
        OpKind::Link => {
            if r2 == 0 {
                (FlowType::Sequential, false)
            } else {
                (FlowType::Call, true)
            }
        }
        OpKind::CountBranch => {
            if r2 == 0 {
                (FlowType::Sequential, false)
            } else {
                (FlowType::ConditionalBranch, true)
            }
        }
        _ => (FlowType::Sequential, false),
    };

    make(def, raw, address, operands, flow, None, indirect)
}

fn decode_rx(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let r1 = raw[1] >> 4;
    let x2 = raw[1] & 0x0F;
    let b2 = raw[2] >> 4;
    let d2 = i32::from(raw[2] & 0x0F) << 8 | i32::from(raw[3]);

    let storage = if x2 != 0 {
        Operand::BaseIndexDisp {
            base: b2,
            index: x2,
            disp: d2,
        }
    } else {
        Operand::BaseDisp { base: b2, disp: d2 }
    };
    let operands = vec![Operand::Register(r1), storage];

    // Only a zero base and index make the displacement an absolute address;
    // anything else depends on register contents and stays unresolved.
    let direct_target = (x2 == 0 && b2 == 0).then_some(d2 as u64);

    let (flow, target) = match def.kind {
        OpKind::CondBranch => (mask_flow(r1, FlowType::UnconditionalBranch), direct_target),
        OpKind::Link => (FlowType::Call, direct_target),
        OpKind::CountBranch => (FlowType::ConditionalBranch, direct_target),
        _ => (FlowType::Sequential, None),
    };
    let target = if flow == FlowType::Sequential { None } else { target };

    make(def, raw, address, operands, flow, target, false)
}

fn decode_rs(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let r1 = raw[1] >> 4;
    let r3 = raw[1] & 0x0F;
    let b2 = raw[2] >> 4;
    let d2 = i32::from(raw[2] & 0x0F) << 8 | i32::from(raw[3]);

    let operands = vec![
        Operand::Register(r1),
        Operand::Register(r3),
        Operand::BaseDisp { base: b2, disp: d2 },
    ];

    let (flow, target) = match def.kind {
        OpKind::IndexBranch => (
            FlowType::ConditionalBranch,
            (b2 == 0).then_some(d2 as u64),
        ),
        _ => (FlowType::Sequential, None),
    };

    make(def, raw, address, operands, flow, target, false)
}

fn decode_si(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let i2 = raw[1];
    let b1 = raw[2] >> 4;
    let d1 = i32::from(raw[2] & 0x0F) << 8 | i32::from(raw[3]);

    let operands = vec![
        Operand::BaseDisp { base: b1, disp: d1 },
        Operand::Immediate(i64::from(i2)),
    ];

    make(def, raw, address, operands, FlowType::Sequential, None, false)
}

fn decode_s(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let b2 = raw[2] >> 4;
    let d2 = i32::from(raw[2] & 0x0F) << 8 | i32::from(raw[3]);

    let operands = vec![Operand::BaseDisp { base: b2, disp: d2 }];
    make(def, raw, address, operands, FlowType::Sequential, None, false)
}

fn decode_ss(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let length_code = raw[1];
    let b1 = raw[2] >> 4;
    let d1 = u32::from(raw[2] & 0x0F) << 8 | u32::from(raw[3]);
    let b2 = raw[4] >> 4;
    let d2 = i32::from(raw[4] & 0x0F) << 8 | i32::from(raw[5]);

    let operands = vec![
        Operand::Opaque(format!("{d1}({length_code},{b1})")),
        Operand::BaseDisp { base: b2, disp: d2 },
    ];

    make(def, raw, address, operands, FlowType::Sequential, None, false)
}

fn decode_rre(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let r1 = raw[3] >> 4;
    let r2 = raw[3] & 0x0F;
    let operands = vec![Operand::Register(r1), Operand::Register(r2)];
    make(def, raw, address, operands, FlowType::Sequential, None, false)
}

fn decode_ri(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let r1 = raw[1] >> 4;
    let i2 = i16::from_be_bytes([raw[2], raw[3]]);
    let relative_target = relative(address, i64::from(i2));

    let (operands, flow, target) = match def.kind {
        OpKind::CondBranch => (
            vec![Operand::Register(r1), Operand::PcRelative(i32::from(i2))],
            mask_flow(r1, FlowType::UnconditionalBranch),
            Some(relative_target),
        ),
        OpKind::Link => (
            vec![Operand::Register(r1), Operand::PcRelative(i32::from(i2))],
            FlowType::Call,
            Some(relative_target),
        ),
        OpKind::CountBranch => (
            vec![Operand::Register(r1), Operand::PcRelative(i32::from(i2))],
            FlowType::ConditionalBranch,
            Some(relative_target),
        ),
        _ => (
            vec![Operand::Register(r1), Operand::Immediate(i64::from(i2))],
            FlowType::Sequential,
            None,
        ),
    };
    let target = if flow == FlowType::Sequential { None } else { target };

    make(def, raw, address, operands, flow, target, false)
}

fn decode_ril(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let r1 = raw[1] >> 4;
    let i2 = i32::from_be_bytes([raw[2], raw[3], raw[4], raw[5]]);
    let relative_target = relative(address, i64::from(i2));

    let (operands, flow, target) = match def.kind {
        OpKind::CondBranch => (
            vec![Operand::Register(r1), Operand::PcRelative(i2)],
            mask_flow(r1, FlowType::UnconditionalBranch),
            Some(relative_target),
        ),
        OpKind::Link => (
            vec![Operand::Register(r1), Operand::PcRelative(i2)],
            FlowType::Call,
            Some(relative_target),
        ),
        _ if def.mnemonic == "LARL" => (
            vec![Operand::Register(r1), Operand::PcRelative(i2)],
            FlowType::Sequential,
            None,
        ),
        _ => (
            vec![Operand::Register(r1), Operand::Immediate(i64::from(i2))],
            FlowType::Sequential,
            None,
        ),
    };
    let target = if flow == FlowType::Sequential { None } else { target };

    make(def, raw, address, operands, flow, target, false)
}

fn decode_rxy(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let r1 = raw[1] >> 4;
    let x2 = raw[1] & 0x0F;
    let b2 = raw[2] >> 4;
    let disp = long_displacement(raw);

    let storage = if x2 != 0 {
        Operand::BaseIndexDisp {
            base: b2,
            index: x2,
            disp,
        }
    } else {
        Operand::BaseDisp { base: b2, disp }
    };

    let operands = vec![Operand::Register(r1), storage];
    make(def, raw, address, operands, FlowType::Sequential, None, false)
}

fn decode_rsy(def: OpcodeDef, raw: &[u8], address: u64) -> Instruction {
    let r1 = raw[1] >> 4;
    let r3 = raw[1] & 0x0F;
    let b2 = raw[2] >> 4;
    let disp = long_displacement(raw);

    let operands = vec![
        Operand::Register(r1),
        Operand::Register(r3),
        Operand::BaseDisp { base: b2, disp },
    ];
    make(def, raw, address, operands, FlowType::Sequential, None, false)
}

/// Sign-extended 20-bit displacement of the RXY/RSY formats (DL2 low, DH2 high).
fn long_displacement(raw: &[u8]) -> i32 {
    let low = i32::from(raw[2] & 0x0F) << 8 | i32::from(raw[3]);
    let mut disp = i32::from(raw[4]) << 12 | low;
    if disp & 0x8_0000 != 0 {
        disp -= 0x10_0000;
    }
    disp
}

/// Relative-branch target: halfword offset from the instruction address.
fn relative(address: u64, halfwords: i64) -> u64 {
    address.wrapping_add_signed(halfwords * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(bytes: &[u8], address: u64) -> Instruction {
        match decode_instruction(bytes, address) {
            (Decoded::Instruction(instruction), _) => instruction,
            (Decoded::Unknown(span), _) => panic!("expected instruction, got {span:?}"),
        }
    }

    #[test]
    fn decode_return() {
        let i = instr(&[0x07, 0xFE], 0);
        assert_eq!(i.mnemonic, "BCR");
        assert_eq!(i.flow, FlowType::Return);
        assert_eq!(i.operand_string(), "15,14");
        assert_eq!(i.hex_bytes(), "07FE");
    }

    #[test]
    fn decode_bcr_variants() {
        // BCR 0,1: mask 0 is a no-op
        assert_eq!(instr(&[0x07, 0x01], 0).flow, FlowType::Sequential);
        // BCR 15,15: unconditional through a register
        let br = instr(&[0x07, 0xFF], 0);
        assert_eq!(br.flow, FlowType::Indirect);
        assert!(br.indirect);
        // BCR 8,14: conditional through a register
        let cond = instr(&[0x07, 0x8E], 0);
        assert_eq!(cond.flow, FlowType::ConditionalBranch);
        assert!(cond.indirect);
        assert_eq!(cond.target, None);
        // BCR 8,0: register 0 never branches
        assert_eq!(instr(&[0x07, 0x80], 0).flow, FlowType::Sequential);
    }

    #[test]
    fn decode_balr_call_and_base_idiom() {
        // BALR 14,15: indirect call
        let call = instr(&[0x05, 0xEF], 0);
        assert_eq!(call.flow, FlowType::Call);
        assert!(call.indirect);
        assert_eq!(call.target, None);

        // BALR 12,0: base establishment, no branch
        let base = instr(&[0x05, 0xC0], 0);
        assert_eq!(base.flow, FlowType::Sequential);
        assert!(!base.indirect);
    }

    #[test]
    fn decode_bc_mask_variants() {
        // BC 15,0x028(12): unconditional, base-relative so unresolved
        let b = instr(&[0x47, 0xF0, 0xC0, 0x28], 0x16);
        assert_eq!(b.flow, FlowType::UnconditionalBranch);
        assert_eq!(b.target, None);
        assert_eq!(b.operand_string(), "15,40(12)");

        // BC 8,0x020(0): conditional, absolute target
        let cond = instr(&[0x47, 0x80, 0x00, 0x20], 0x0E);
        assert_eq!(cond.flow, FlowType::ConditionalBranch);
        assert_eq!(cond.target, Some(0x20));

        // BC 0,...: never taken
        assert_eq!(instr(&[0x47, 0x00, 0x00, 0x20], 0).flow, FlowType::Sequential);
    }

    #[test]
    fn decode_indexed_branch_stays_unresolved() {
        // BC 8,32(3,0): zero base but a live index register, so the effective
        // target is R3 + 32 and is not statically known.
        let i = instr(&[0x47, 0x83, 0x00, 0x20], 0);
        assert_eq!(i.flow, FlowType::ConditionalBranch);
        assert_eq!(i.target, None);
        assert_eq!(i.operand_string(), "8,32(3,0)");
    }

    #[test]
    fn decode_stm_prologue() {
        let i = instr(&[0x90, 0xEC, 0xD0, 0x0C], 0x2);
        assert_eq!(i.mnemonic, "STM");
        assert_eq!(i.format, InstrFormat::RS);
        assert_eq!(i.operand_string(), "14,12,12(13)");
        assert_eq!(i.flow, FlowType::Sequential);
    }

    #[test]
    fn decode_rx_with_index() {
        // L 4,256(3,12)
        let i = instr(&[0x58, 0x43, 0xC1, 0x00], 0);
        assert_eq!(i.mnemonic, "L");
        assert_eq!(i.operand_string(), "4,256(3,12)");
    }

    #[test]
    fn decode_si_and_ss() {
        // CLI 0(5),0x40
        let cli = instr(&[0x95, 0x40, 0x50, 0x00], 0);
        assert_eq!(cli.mnemonic, "CLI");
        assert_eq!(cli.operand_string(), "0(5),64");

        // MVC 16(8,13),32(12)
        let mvc = instr(&[0xD2, 0x07, 0xD0, 0x10, 0xC0, 0x20], 0);
        assert_eq!(mvc.mnemonic, "MVC");
        assert_eq!(mvc.size(), 6);
        assert_eq!(mvc.operand_string(), "16(7,13),32(12)");
    }

    #[test]
    fn decode_brc_relative() {
        // BRC 8,*+8 at 0x10 -> target 0x18
        let i = instr(&[0xA7, 0x84, 0x00, 0x04], 0x10);
        assert_eq!(i.mnemonic, "BRC");
        assert_eq!(i.flow, FlowType::ConditionalBranch);
        assert_eq!(i.target, Some(0x18));
        assert_eq!(i.operand_string(), "8,*+8");

        // BRC 15,*-4 at 0x10 -> unconditional backward
        let back = instr(&[0xA7, 0xF4, 0xFF, 0xFE], 0x10);
        assert_eq!(back.flow, FlowType::UnconditionalBranch);
        assert_eq!(back.target, Some(0x0C));
    }

    #[test]
    fn decode_brasl_relative_call() {
        // BRASL 14,*+8 at 0x100 -> call to 0x108
        let i = instr(&[0xC0, 0xE5, 0x00, 0x00, 0x00, 0x04], 0x100);
        assert_eq!(i.mnemonic, "BRASL");
        assert_eq!(i.flow, FlowType::Call);
        assert_eq!(i.target, Some(0x108));
        assert!(!i.indirect);
    }

    #[test]
    fn decode_lhi_immediate() {
        // LHI 3,-1
        let i = instr(&[0xA7, 0x38, 0xFF, 0xFF], 0);
        assert_eq!(i.mnemonic, "LHI");
        assert_eq!(i.flow, FlowType::Sequential);
        assert_eq!(i.operand_string(), "3,-1");
        assert_eq!(i.target, None);
    }

    #[test]
    fn decode_long_displacement() {
        // LG 1,-8(13): dl2=0xFF8, dh2=0xFF -> -8
        let i = instr(&[0xE3, 0x10, 0xDF, 0xF8, 0xFF, 0x04], 0);
        assert_eq!(i.mnemonic, "LG");
        assert_eq!(i.operand_string(), "1,-8(13)");
    }

    #[test]
    fn decode_unknown_opcode_resyncs() {
        let (decoded, consumed) = decode_instruction(&[0xFF, 0x07, 0xFE], 0);
        assert_eq!(consumed, 1);
        match decoded {
            Decoded::Unknown(span) => {
                assert_eq!(span.start, 0);
                assert_eq!(span.len(), 1);
                assert_eq!(span.reason, UnknownReason::DecodeFailed);
            }
            Decoded::Instruction(_) => panic!("expected unknown span"),
        }
    }

    #[test]
    fn decode_truncated_instruction() {
        // 0x47 declares 4 bytes, only 2 available
        let (decoded, consumed) = decode_instruction(&[0x47, 0xF0], 0x10);
        assert_eq!(consumed, 1);
        assert!(matches!(decoded, Decoded::Unknown(_)));
    }

    #[test]
    fn decode_section_accounts_every_byte() {
        let section = Section {
            base: 0,
            bytes: vec![0xFF, 0x07, 0xFE],
        };
        let outcome = decode_section(&NativeDecoder, &section);

        assert_eq!(outcome.instructions.len(), 1);
        assert_eq!(outcome.instructions[0].address, 1);
        assert_eq!(outcome.instructions[0].mnemonic, "BCR");
        assert_eq!(outcome.unknown_spans.len(), 1);
        assert_eq!(outcome.unknown_spans[0].start, 0);
        assert_eq!(outcome.unknown_spans[0].len(), 1);

        let decoded: usize = outcome.instructions.iter().map(Instruction::size).sum();
        let unknown: usize = outcome.unknown_spans.iter().map(UnknownSpan::len).sum();
        assert_eq!(decoded + unknown, section.bytes.len());
    }

    #[test]
    fn decode_section_merges_adjacent_failures() {
        let section = Section {
            base: 0x20,
            bytes: vec![0x00, 0x00, 0x00, 0x00],
        };
        let outcome = decode_section(&NativeDecoder, &section);

        assert!(outcome.instructions.is_empty());
        assert_eq!(outcome.unknown_spans.len(), 1);
        assert_eq!(outcome.unknown_spans[0].start, 0x20);
        assert_eq!(outcome.unknown_spans[0].len(), 4);
    }

    #[test]
    fn decode_section_contiguous_addresses() {
        // BALR 12,15 / STM 14,12,12(13) / LA 3,256(12) / BCR 15,14
        let section = Section {
            base: 0,
            bytes: vec![
                0x05, 0xCF, 0x90, 0xEC, 0xD0, 0x0C, 0x41, 0x30, 0xC1, 0x00, 0x07, 0xFE,
            ],
        };
        let outcome = decode_section(&NativeDecoder, &section);

        assert_eq!(outcome.instructions.len(), 4);
        for pair in outcome.instructions.windows(2) {
            assert_eq!(pair[0].end_address(), pair[1].address);
        }
    }

    #[test]
    fn decode_empty_input() {
        let (decoded, consumed) = decode_instruction(&[], 0);
        assert_eq!(consumed, 0);
        assert!(matches!(decoded, Decoded::Unknown(span) if span.is_empty()));
    }
}
