//! z/Architecture instruction processing: decoding and byte-accurate disassembly.
//!
//! This module provides the instruction layer of the analysis pipeline: the closed
//! opcode table, the typed instruction representation, and the never-failing linear
//! sweep decoder that maps every section byte into either an [`Instruction`] or an
//! [`UnknownSpan`].
//!
//! # Key Types
//! - [`Instruction`] - A decoded instruction with address, raw bytes, operands, and flow
//! - [`Operand`] - Closed operand union
//! - [`FlowType`] - Control flow category driving block and edge construction
//! - [`UnknownSpan`] - Bytes outside any instruction, with a reason tag
//!
//! # Main Functions
//! - [`decode_instruction`] - Decode a single instruction
//! - [`decode_section`] - Sweep a whole section with total byte accounting
//!
//! # Example
//! ```rust
//! use zoscope::assembly::{decode_instruction, Decoded};
//! let (decoded, consumed) = decode_instruction(&[0x05, 0xEF], 0x0); // BALR 14,15
//! assert_eq!(consumed, 2);
//! assert!(matches!(decoded, Decoded::Instruction(i) if i.mnemonic == "BALR"));
//! ```

mod decoder;
mod instruction;
mod opcodes;

pub use decoder::{decode_instruction, decode_section, Decode, DecodeOutcome, Decoded, NativeDecoder};
pub use instruction::{
    ConditionMask, FlowType, InstrFormat, Instruction, Operand, UnknownReason, UnknownSpan,
};
pub use opcodes::{instruction_length, lookup, OpKind, OpcodeDef};
