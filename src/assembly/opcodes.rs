//! The closed z/Architecture opcode table.
//!
//! Instruction length is fixed by the first two bits of the opcode byte
//! (`00` → 2 bytes, `01`/`10` → 4 bytes, `11` → 6 bytes); this module maps opcode
//! bytes to `{mnemonic, format, kind}`. Primary single-byte opcodes cover the
//! classic ESA/390 set; the extended families (`A7` RI, `B9` RRE, `C0` RIL,
//! `E3` RXY, `EB` RSY) are keyed by their secondary opcode.
//!
//! The table is static, closed, and deterministic: an opcode outside it does not
//! decode, and the decoder resynchronizes one byte later.

use crate::assembly::instruction::InstrFormat;

/// Coarse control-flow role of an opcode, refined by the decoder once the
/// operands are known (masks, register 0 idioms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// No control flow effect.
    Normal,
    /// Branch on condition mask (BC, BCR, BRC, BRCL).
    CondBranch,
    /// Branch on count (BCT, BCTR, BRCT, BRCTG).
    CountBranch,
    /// Branch on index (BXH, BXLE).
    IndexBranch,
    /// Branch-and-link call (BAL, BALR, BAS, BASR, BRAS, BRASL).
    Link,
}

/// One entry of the opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeDef {
    /// HLASM mnemonic.
    pub mnemonic: &'static str,
    /// Encoding format, which drives operand extraction.
    pub format: InstrFormat,
    /// Coarse control-flow role.
    pub kind: OpKind,
}

const fn def(mnemonic: &'static str, format: InstrFormat, kind: OpKind) -> OpcodeDef {
    OpcodeDef {
        mnemonic,
        format,
        kind,
    }
}

/// Instruction length in bytes, from the first two bits of the opcode byte.
///
/// `00` → 2, `01`/`10` → 4, `11` → 6.
#[must_use]
pub const fn instruction_length(opcode: u8) -> usize {
    match opcode >> 6 {
        0b00 => 2,
        0b01 | 0b10 => 4,
        _ => 6,
    }
}

/// Look up the opcode table entry for the instruction starting at `bytes[0]`.
///
/// Extended-family opcodes consume their secondary opcode from the following
/// bytes; `None` is returned when the opcode is outside the closed table or the
/// secondary opcode byte is missing.
#[must_use]
pub fn lookup(bytes: &[u8]) -> Option<OpcodeDef> {
    let first = *bytes.first()?;
    match first {
        0xA7 => lookup_a7(*bytes.get(1)? & 0x0F),
        0xB9 => lookup_b9(*bytes.get(1)?),
        0xC0 => lookup_c0(*bytes.get(1)? & 0x0F),
        0xE3 => lookup_e3(*bytes.get(5)?),
        0xEB => lookup_eb(*bytes.get(5)?),
        _ => lookup_primary(first),
    }
}

/// Primary single-byte opcodes.
fn lookup_primary(opcode: u8) -> Option<OpcodeDef> {
    use InstrFormat::{RR, RS, RX, S, SI, SS};
    use OpKind::{CondBranch, CountBranch, IndexBranch, Link, Normal};

    let entry = match opcode {
        // RR format (2 bytes)
        0x05 => def("BALR", RR, Link),
        0x06 => def("BCTR", RR, CountBranch),
        0x07 => def("BCR", RR, CondBranch),
        0x0D => def("BASR", RR, Link),
        0x10 => def("LPR", RR, Normal),
        0x11 => def("LNR", RR, Normal),
        0x12 => def("LTR", RR, Normal),
        0x13 => def("LCR", RR, Normal),
        0x14 => def("NR", RR, Normal),
        0x15 => def("CLR", RR, Normal),
        0x16 => def("OR", RR, Normal),
        0x17 => def("XR", RR, Normal),
        0x18 => def("LR", RR, Normal),
        0x19 => def("CR", RR, Normal),
        0x1A => def("AR", RR, Normal),
        0x1B => def("SR", RR, Normal),
        0x1C => def("MR", RR, Normal),
        0x1D => def("DR", RR, Normal),
        0x1E => def("ALR", RR, Normal),
        0x1F => def("SLR", RR, Normal),

        // RX format (4 bytes)
        0x40 => def("STH", RX, Normal),
        0x41 => def("LA", RX, Normal),
        0x42 => def("STC", RX, Normal),
        0x43 => def("IC", RX, Normal),
        0x44 => def("EX", RX, Normal),
        0x45 => def("BAL", RX, Link),
        0x46 => def("BCT", RX, CountBranch),
        0x47 => def("BC", RX, CondBranch),
        0x48 => def("LH", RX, Normal),
        0x49 => def("CH", RX, Normal),
        0x4A => def("AH", RX, Normal),
        0x4B => def("SH", RX, Normal),
        0x4C => def("MH", RX, Normal),
        0x4D => def("BAS", RX, Link),
        0x4E => def("CVD", RX, Normal),
        0x4F => def("CVB", RX, Normal),
        0x50 => def("ST", RX, Normal),
        0x54 => def("N", RX, Normal),
        0x55 => def("CL", RX, Normal),
        0x56 => def("O", RX, Normal),
        0x57 => def("X", RX, Normal),
        0x58 => def("L", RX, Normal),
        0x59 => def("C", RX, Normal),
        0x5A => def("A", RX, Normal),
        0x5B => def("S", RX, Normal),
        0x5C => def("M", RX, Normal),
        0x5D => def("D", RX, Normal),
        0x5E => def("AL", RX, Normal),
        0x5F => def("SL", RX, Normal),

        // RS format (4 bytes)
        0x86 => def("BXH", RS, IndexBranch),
        0x87 => def("BXLE", RS, IndexBranch),
        0x88 => def("SRL", RS, Normal),
        0x89 => def("SLL", RS, Normal),
        0x8A => def("SRA", RS, Normal),
        0x8B => def("SLA", RS, Normal),
        0x8C => def("SRDL", RS, Normal),
        0x8D => def("SLDL", RS, Normal),
        0x8E => def("SRDA", RS, Normal),
        0x8F => def("SLDA", RS, Normal),
        0x90 => def("STM", RS, Normal),
        0x98 => def("LM", RS, Normal),

        // SI format (4 bytes)
        0x91 => def("TM", SI, Normal),
        0x92 => def("MVI", SI, Normal),
        0x94 => def("NI", SI, Normal),
        0x95 => def("CLI", SI, Normal),
        0x96 => def("OI", SI, Normal),
        0x97 => def("XI", SI, Normal),

        // S format (4 bytes)
        0x93 => def("TS", S, Normal),

        // SS format (6 bytes)
        0xD1 => def("MVN", SS, Normal),
        0xD2 => def("MVC", SS, Normal),
        0xD3 => def("MVZ", SS, Normal),
        0xD4 => def("NC", SS, Normal),
        0xD5 => def("CLC", SS, Normal),
        0xD6 => def("OC", SS, Normal),
        0xD7 => def("XC", SS, Normal),
        0xD9 => def("MVCK", SS, Normal),
        0xDA => def("MVCP", SS, Normal),
        0xDB => def("MVCS", SS, Normal),
        0xDC => def("TR", SS, Normal),
        0xDD => def("TRT", SS, Normal),
        0xDE => def("ED", SS, Normal),
        0xDF => def("EDMK", SS, Normal),
        0xF0 => def("SRP", SS, Normal),
        0xF1 => def("MVO", SS, Normal),
        0xF2 => def("PACK", SS, Normal),
        0xF3 => def("UNPK", SS, Normal),
        0xF8 => def("ZAP", SS, Normal),
        0xF9 => def("CP", SS, Normal),
        0xFA => def("AP", SS, Normal),
        0xFB => def("SP", SS, Normal),
        0xFC => def("MP", SS, Normal),
        0xFD => def("DP", SS, Normal),

        _ => return None,
    };
    Some(entry)
}

/// `A7` family, RI format, keyed by the low nibble of byte 1.
fn lookup_a7(op2: u8) -> Option<OpcodeDef> {
    use InstrFormat::RI;
    use OpKind::{CondBranch, CountBranch, Link, Normal};

    let entry = match op2 {
        0x0 => def("TMLH", RI, Normal),
        0x1 => def("TMLL", RI, Normal),
        0x2 => def("TMHH", RI, Normal),
        0x3 => def("TMHL", RI, Normal),
        0x4 => def("BRC", RI, CondBranch),
        0x5 => def("BRAS", RI, Link),
        0x6 => def("BRCT", RI, CountBranch),
        0x7 => def("BRCTG", RI, CountBranch),
        0x8 => def("LHI", RI, Normal),
        0x9 => def("LGHI", RI, Normal),
        0xA => def("AHI", RI, Normal),
        0xB => def("AGHI", RI, Normal),
        0xC => def("MHI", RI, Normal),
        0xD => def("MGHI", RI, Normal),
        0xE => def("CHI", RI, Normal),
        0xF => def("CGHI", RI, Normal),
        _ => return None,
    };
    Some(entry)
}

/// `B9` family, RRE format, keyed by byte 1.
fn lookup_b9(op2: u8) -> Option<OpcodeDef> {
    use InstrFormat::RRE;
    use OpKind::Normal;

    let entry = match op2 {
        0x02 => def("LTGR", RRE, Normal),
        0x04 => def("LGR", RRE, Normal),
        0x08 => def("AGR", RRE, Normal),
        0x09 => def("SGR", RRE, Normal),
        0x20 => def("CGR", RRE, Normal),
        0x21 => def("CLGR", RRE, Normal),
        0x80 => def("NGR", RRE, Normal),
        0x81 => def("OGR", RRE, Normal),
        0x82 => def("XGR", RRE, Normal),
        _ => return None,
    };
    Some(entry)
}

/// `C0` family, RIL format, keyed by the low nibble of byte 1.
fn lookup_c0(op2: u8) -> Option<OpcodeDef> {
    use InstrFormat::RIL;
    use OpKind::{CondBranch, Link, Normal};

    let entry = match op2 {
        0x0 => def("LARL", RIL, Normal),
        0x1 => def("LGFI", RIL, Normal),
        0x4 => def("BRCL", RIL, CondBranch),
        0x5 => def("BRASL", RIL, Link),
        _ => return None,
    };
    Some(entry)
}

/// `E3` family, RXY format, keyed by byte 5.
fn lookup_e3(op2: u8) -> Option<OpcodeDef> {
    use InstrFormat::RXY;
    use OpKind::Normal;

    let entry = match op2 {
        0x02 => def("LTG", RXY, Normal),
        0x04 => def("LG", RXY, Normal),
        0x14 => def("LGF", RXY, Normal),
        0x16 => def("LLGF", RXY, Normal),
        0x24 => def("STG", RXY, Normal),
        _ => return None,
    };
    Some(entry)
}

/// `EB` family, RSY format, keyed by byte 5.
fn lookup_eb(op2: u8) -> Option<OpcodeDef> {
    use InstrFormat::RSY;
    use OpKind::Normal;

    let entry = match op2 {
        0x04 => def("LMG", RSY, Normal),
        0x0C => def("SRLG", RSY, Normal),
        0x0D => def("SLLG", RSY, Normal),
        0x24 => def("STMG", RSY, Normal),
        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_from_opcode_bits() {
        assert_eq!(instruction_length(0x07), 2);
        assert_eq!(instruction_length(0x3F), 2);
        assert_eq!(instruction_length(0x47), 4);
        assert_eq!(instruction_length(0xA7), 4);
        assert_eq!(instruction_length(0xC0), 6);
        assert_eq!(instruction_length(0xD2), 6);
        assert_eq!(instruction_length(0xFF), 6);
    }

    #[test]
    fn lookup_primary_entries() {
        assert_eq!(lookup(&[0x07, 0xFE]).unwrap().mnemonic, "BCR");
        assert_eq!(lookup(&[0x05, 0xEF]).unwrap().mnemonic, "BALR");
        assert_eq!(lookup(&[0x47, 0xF0]).unwrap().mnemonic, "BC");
        assert_eq!(lookup(&[0x90, 0xEC]).unwrap().mnemonic, "STM");
        assert_eq!(lookup(&[0xD2, 0x07]).unwrap().mnemonic, "MVC");
    }

    #[test]
    fn lookup_extended_entries() {
        // BRC 8,*+8  (A7 84 0004)
        let brc = lookup(&[0xA7, 0x84, 0x00, 0x04]).unwrap();
        assert_eq!(brc.mnemonic, "BRC");
        assert_eq!(brc.format, InstrFormat::RI);

        // BRASL 14,...  (C0 E5 ...)
        let brasl = lookup(&[0xC0, 0xE5, 0x00, 0x00, 0x00, 0x04]).unwrap();
        assert_eq!(brasl.mnemonic, "BRASL");
        assert_eq!(brasl.format, InstrFormat::RIL);

        // LGR 1,2  (B9 04 00 12)
        let lgr = lookup(&[0xB9, 0x04, 0x00, 0x12]).unwrap();
        assert_eq!(lgr.mnemonic, "LGR");

        // LG 1,0(0,13)  (E3 10 D0 00 00 04)
        let lg = lookup(&[0xE3, 0x10, 0xD0, 0x00, 0x00, 0x04]).unwrap();
        assert_eq!(lg.mnemonic, "LG");

        // STMG 14,12,8(13)  (EB EC D0 08 00 24)
        let stmg = lookup(&[0xEB, 0xEC, 0xD0, 0x08, 0x00, 0x24]).unwrap();
        assert_eq!(stmg.mnemonic, "STMG");
    }

    #[test]
    fn lookup_unrecognized() {
        assert!(lookup(&[0x00, 0x00]).is_none());
        assert!(lookup(&[0xFF, 0x00, 0x00, 0x00, 0x00, 0x00]).is_none());
        assert!(lookup(&[0xB9, 0xFF, 0x00, 0x00]).is_none());
        assert!(lookup(&[0xC0, 0x0F, 0x00, 0x00, 0x00, 0x00]).is_none());
        assert!(lookup(&[]).is_none());
    }

    #[test]
    fn lookup_extended_needs_secondary_byte() {
        // The E3/EB secondary opcode lives in byte 5; a short slice cannot resolve.
        assert!(lookup(&[0xE3, 0x10, 0xD0]).is_none());
        assert!(lookup(&[0xA7]).is_none());
    }
}
