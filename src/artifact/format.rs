//! Format detection and header parsing for z/OS executable artifacts.
//!
//! Two artifact shapes are recognized: the classic load module produced by the linkage
//! editor, and the binder-produced program object. Detection is best-effort by leading-byte
//! heuristics; anything unrecognizable is treated as a single flat text section at `0x0`.
//!
//! # Key Components
//!
//! - [`ArtifactFormat`] - The detected format tag
//! - [`ProgramObjectHeader`] - Parsed program object header fields
//! - [`detect`] - Leading-byte format classification
//! - [`ebcdic_to_ascii`] - EBCDIC member/symbol name recovery

use strum::Display;

use crate::{file::parser::Parser, Result};

/// Magic bytes of a binder-produced program object.
pub(crate) const PROGRAM_OBJECT_MAGIC: [u8; 2] = [0x00, 0x03];

/// Size of a PDS directory entry prefix, when the member was extracted with one.
pub(crate) const PDS_HEADER_SIZE: usize = 20;

/// Leading byte patterns that suggest a classic load module: common first instructions
/// of CSECT entry code.
const LOAD_MODULE_ENTRY_PATTERNS: [[u8; 2]; 4] = [
    [0x47, 0xF0], // BC 15,... (unconditional branch around the eyecatcher)
    [0x90, 0xEC], // STM 14,12,... (save registers)
    [0x18, 0x0F], // LR 0,15
    [0x05, 0xC0], // BALR 12,0 (establish base)
];

/// The detected format of an input artifact.
///
/// Format detection is a heuristic: a wrong guess degrades gracefully because the
/// decoder and classifier operate on raw bytes regardless. `Unknown` artifacts are
/// analyzed as a single section based at address `0x0`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Classic load module (linkage editor output).
    #[strum(serialize = "load-module")]
    LoadModule,
    /// Program object (binder output).
    #[strum(serialize = "program-object")]
    ProgramObject,
    /// Unrecognized input, analyzed as one flat section.
    #[strum(serialize = "unknown")]
    Unknown,
}

/// Parsed fixed header of a program object.
///
/// The layout follows the simplified binder header: magic, version, flags, text size,
/// entry offset, and the external-symbol and section table counts, all big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramObjectHeader {
    /// Format version from the header.
    pub version: u16,
    /// Binder attribute flags.
    pub flags: u16,
    /// Declared size of the text (code) segment in bytes.
    pub text_size: u32,
    /// Entry point, as an offset into the text segment.
    pub entry_offset: u32,
    /// Number of external symbol entries following the header.
    pub external_count: u16,
    /// Number of section entries following the external symbols.
    pub section_count: u16,
}

/// Size of the fixed program object header in bytes.
pub(crate) const PROGRAM_OBJECT_HEADER_SIZE: usize = 32;
/// Size of one external symbol entry (8 name bytes + 8 attribute bytes).
pub(crate) const EXTERNAL_ENTRY_SIZE: usize = 16;
/// Size of one section entry (offset, size, 12 reserved bytes).
pub(crate) const SECTION_ENTRY_SIZE: usize = 20;

impl ProgramObjectHeader {
    /// Parse the fixed header from the start of the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if fewer than
    /// [`PROGRAM_OBJECT_HEADER_SIZE`] bytes are available.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PROGRAM_OBJECT_HEADER_SIZE {
            return Err(malformed_error!(
                "program object too small for header: {} bytes",
                data.len()
            ));
        }

        let mut parser = Parser::new(data);
        parser.advance_by(2)?; // magic
        let version = parser.read_be::<u16>()?;
        let flags = parser.read_be::<u16>()?;
        parser.advance_by(2)?; // reserved
        let text_size = parser.read_be::<u32>()?;
        let entry_offset = parser.read_be::<u32>()?;
        let external_count = parser.read_be::<u16>()?;
        let section_count = parser.read_be::<u16>()?;

        Ok(ProgramObjectHeader {
            version,
            flags,
            text_size,
            entry_offset,
            external_count,
            section_count,
        })
    }

    /// Offset of the text segment: the fixed header plus the symbol and section tables.
    #[must_use]
    pub fn text_offset(&self) -> usize {
        PROGRAM_OBJECT_HEADER_SIZE
            + self.external_count as usize * EXTERNAL_ENTRY_SIZE
            + self.section_count as usize * SECTION_ENTRY_SIZE
    }
}

/// Detect the artifact format from its leading bytes.
///
/// Checks the program object magic first, then the classic load-module entry
/// patterns. Inputs shorter than two bytes, or matching neither shape, are `Unknown`.
#[must_use]
pub fn detect(data: &[u8]) -> ArtifactFormat {
    if data.len() < 2 {
        return ArtifactFormat::Unknown;
    }

    if data[0..2] == PROGRAM_OBJECT_MAGIC {
        return ArtifactFormat::ProgramObject;
    }

    if looks_like_load_module(data) {
        return ArtifactFormat::LoadModule;
    }

    ArtifactFormat::Unknown
}

/// Heuristic check for the classic load module shape.
///
/// Load modules carry no reliable magic; the text usually begins directly with
/// CSECT entry code, optionally preceded by a PDS directory entry when the member
/// was extracted together with its directory record.
#[must_use]
pub(crate) fn looks_like_load_module(data: &[u8]) -> bool {
    if has_pds_header(data) {
        return true;
    }

    LOAD_MODULE_ENTRY_PATTERNS
        .iter()
        .any(|pattern| data.starts_with(pattern))
}

/// Best-effort entry scan for an unrecognized artifact.
///
/// Walks the first 256 bytes at halfword offsets and returns the first offset
/// holding a save-registers store (`STM 14,12,...`) or a BALR/BASR link opcode.
/// `None` when nothing matches; no entry is invented for pattern-free input.
#[must_use]
pub(crate) fn scan_entry_pattern(data: &[u8]) -> Option<u64> {
    let limit = data.len().saturating_sub(2).min(256);
    (0..limit)
        .step_by(2)
        .find(|&offset| {
            data[offset..offset + 2] == [0x90, 0xEC] || matches!(data[offset], 0x05 | 0x0D)
        })
        .map(|offset| offset as u64)
}

/// Check whether the artifact starts with a PDS directory entry.
///
/// The first eight bytes of a directory entry are the member name in EBCDIC,
/// padded with EBCDIC spaces (`0x40`).
#[must_use]
pub(crate) fn has_pds_header(data: &[u8]) -> bool {
    if data.len() < PDS_HEADER_SIZE {
        return false;
    }

    data[0..8]
        .iter()
        .all(|&byte| byte == 0x40 || is_ebcdic_alnum(byte))
}

fn is_ebcdic_alnum(byte: u8) -> bool {
    matches!(byte, 0xC1..=0xC9 | 0xD1..=0xD9 | 0xE2..=0xE9 | 0xF0..=0xF9)
}

/// Recover an ASCII string from EBCDIC name bytes.
///
/// Only the alphanumeric subset used in member and symbol names is mapped;
/// anything else becomes `.`. Trailing spaces are not trimmed here so that the
/// caller controls padding.
#[must_use]
pub fn ebcdic_to_ascii(ebcdic: &[u8]) -> String {
    ebcdic
        .iter()
        .map(|&byte| match byte {
            0x40 => ' ',
            0xC1..=0xC9 => (b'A' + (byte - 0xC1)) as char,
            0xD1..=0xD9 => (b'J' + (byte - 0xD1)) as char,
            0xE2..=0xE9 => (b'S' + (byte - 0xE2)) as char,
            0xF0..=0xF9 => (b'0' + (byte - 0xF0)) as char,
            _ => '.',
        })
        .collect()
}
