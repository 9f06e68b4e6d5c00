//! Artifact ingestion: format detection, sectioning, and metadata extraction.
//!
//! The [`Artifact`] is the immutable root of every analysis. Ingestion never fails:
//! unrecognizable input degrades to a single flat section at address `0x0`, and a
//! zero-length input yields an artifact with no sections at all (downstream stages
//! then produce an empty but well-formed result).
//!
//! # Key Components
//!
//! - [`Artifact`] - Identifier, content digest, format tag, sections, entry points
//! - [`Section`] - A base address plus its byte slice
//! - [`crate::artifact::format`] - Format detection and header parsing
//!
//! # Example
//!
//! ```rust
//! use zoscope::artifact::Artifact;
//!
//! let artifact = Artifact::ingest(&[0x07, 0xFE], "RETMOD", &[]);
//! assert_eq!(artifact.format.to_string(), "unknown");
//! assert_eq!(artifact.sections.len(), 1);
//! ```

pub mod format;

use sha1::{Digest, Sha1};
use tracing::debug;

pub use format::{ArtifactFormat, ProgramObjectHeader};

use format::{
    ebcdic_to_ascii, has_pds_header, EXTERNAL_ENTRY_SIZE, PDS_HEADER_SIZE,
    PROGRAM_OBJECT_HEADER_SIZE, SECTION_ENTRY_SIZE,
};

/// A contiguous byte range of the artifact at a known base address.
///
/// Sections partition the analyzed address space; every downstream address refers
/// into exactly one section. For flat inputs there is a single section based at `0x0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Base address of the first byte.
    pub base: u64,
    /// The raw bytes of this section.
    pub bytes: Vec<u8>,
}

impl Section {
    /// End address (exclusive) of this section.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    /// Returns true if `address` falls inside this section.
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }
}

/// A single input binary treated as one analysis unit.
///
/// Immutable after ingestion. Carries everything later stages need: the detected
/// format, the sectioned byte space, declared entry points, and identity metadata
/// (name and content digest) for report traceability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Identifier, normally the filename stem.
    pub name: String,
    /// Lowercase hex SHA-1 digest of the complete input bytes.
    pub digest: String,
    /// Detected artifact format.
    pub format: ArtifactFormat,
    /// Ordered sections covering the analyzed byte space.
    pub sections: Vec<Section>,
    /// Entry addresses, ascending and deduplicated: header-declared, recovered
    /// by the entry-pattern scan for unrecognized formats, or supplied as caller
    /// hints. Empty when none of those produced anything.
    pub entry_points: Vec<u64>,
    /// Recovered PDS member name, when the input carried a directory entry.
    pub pds_member: Option<String>,
    /// External symbol names from a program object header.
    pub external_symbols: Vec<String>,
    /// Addressing mode attribute (24, 31, or 64) for recognized formats.
    pub amode: Option<u8>,
    /// Residency mode attribute for recognized formats.
    pub rmode: Option<String>,
}

impl Artifact {
    /// Ingest raw bytes into an [`Artifact`].
    ///
    /// Performs format detection, section extraction, and entry point collection.
    /// Entry hints from the caller (e.g. operator knowledge fed through the CLI
    /// boundary) are merged with header-declared entries.
    ///
    /// # Arguments
    ///
    /// * `data` - The complete artifact bytes
    /// * `name` - Identifier for reports, normally the filename stem
    /// * `entry_hints` - Additional entry addresses to inject at this boundary
    #[must_use]
    pub fn ingest(data: &[u8], name: &str, entry_hints: &[u64]) -> Self {
        let digest = {
            let mut hasher = Sha1::new();
            hasher.update(data);
            hasher
                .finalize()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>()
        };

        let format = format::detect(data);
        debug!(name, %format, bytes = data.len(), "ingesting artifact");

        let mut artifact = Artifact {
            name: name.to_string(),
            digest,
            format,
            sections: Vec::new(),
            entry_points: Vec::new(),
            pds_member: None,
            external_symbols: Vec::new(),
            amode: None,
            rmode: None,
        };

        if data.is_empty() {
            return artifact;
        }

        match format {
            ArtifactFormat::LoadModule => artifact.ingest_load_module(data),
            ArtifactFormat::ProgramObject => artifact.ingest_program_object(data),
            ArtifactFormat::Unknown => artifact.ingest_unknown(data),
        }

        let mut entries = std::mem::take(&mut artifact.entry_points);
        entries.extend_from_slice(entry_hints);
        entries.sort_unstable();
        entries.dedup();
        entries.retain(|&addr| artifact.sections.iter().any(|s| s.contains(addr)));
        artifact.entry_points = entries;

        artifact
    }

    /// Unrecognized input: one flat section at `0x0`.
    ///
    /// The leading bytes are still scanned for the common entry patterns; a hit
    /// becomes an entry-point hint, a miss leaves the entry list empty.
    fn ingest_unknown(&mut self, data: &[u8]) {
        self.sections.push(Section {
            base: 0,
            bytes: data.to_vec(),
        });
        if let Some(entry) = format::scan_entry_pattern(data) {
            self.entry_points.push(entry);
        }
    }

    /// Classic load module: optional PDS directory entry, then text.
    fn ingest_load_module(&mut self, data: &[u8]) {
        let mut text_start = 0usize;

        if has_pds_header(data) {
            self.pds_member = Some(ebcdic_to_ascii(&data[0..8]).trim_end().to_string());
            text_start = PDS_HEADER_SIZE;
        }

        if text_start < data.len() {
            self.sections.push(Section {
                base: text_start as u64,
                bytes: data[text_start..].to_vec(),
            });
            self.entry_points.push(text_start as u64);
        }

        // Modern linkage-editor defaults; nothing in the classic format records these.
        self.amode = Some(31);
        self.rmode = Some("ANY".to_string());
    }

    /// Program object: fixed header, external symbol table, section table, text.
    fn ingest_program_object(&mut self, data: &[u8]) {
        let Ok(header) = ProgramObjectHeader::parse(data) else {
            // Too short for its own header: degrade to a flat section.
            self.sections.push(Section {
                base: 0,
                bytes: data.to_vec(),
            });
            return;
        };

        let mut offset = PROGRAM_OBJECT_HEADER_SIZE;
        for _ in 0..header.external_count {
            if offset + EXTERNAL_ENTRY_SIZE > data.len() {
                break;
            }
            let symbol = ebcdic_to_ascii(&data[offset..offset + 8]).trim_end().to_string();
            if !symbol.is_empty() {
                self.external_symbols.push(symbol);
            }
            offset += EXTERNAL_ENTRY_SIZE;
        }

        let text_start = header.text_offset().min(data.len());
        let text_end = text_start
            .saturating_add(header.text_size as usize)
            .min(data.len());

        let mut declared_sections = Vec::new();
        let mut section_table_offset =
            PROGRAM_OBJECT_HEADER_SIZE + header.external_count as usize * EXTERNAL_ENTRY_SIZE;
        for _ in 0..header.section_count {
            if section_table_offset + SECTION_ENTRY_SIZE > data.len() {
                break;
            }
            let entry = &data[section_table_offset..];
            let sect_offset = u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]) as usize;
            let sect_size = u32::from_be_bytes([entry[4], entry[5], entry[6], entry[7]]) as usize;
            section_table_offset += SECTION_ENTRY_SIZE;

            let start = text_start.saturating_add(sect_offset);
            let end = start.saturating_add(sect_size).min(text_end);
            if start < end {
                declared_sections.push(Section {
                    base: start as u64,
                    bytes: data[start..end].to_vec(),
                });
            }
        }

        if declared_sections.is_empty() {
            if text_start < text_end {
                self.sections.push(Section {
                    base: text_start as u64,
                    bytes: data[text_start..text_end].to_vec(),
                });
            }
        } else {
            declared_sections.sort_by_key(|s| s.base);
            self.sections = declared_sections;
        }

        let entry = text_start as u64 + u64::from(header.entry_offset);
        self.entry_points.push(entry);
        self.amode = Some(31);
        self.rmode = Some("ANY".to_string());
    }

    /// Total number of bytes across all sections.
    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.sections.iter().map(|s| s.bytes.len()).sum()
    }

    /// Find the section containing `address`, if any.
    #[must_use]
    pub fn section_at(&self, address: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains(address))
    }
}
