//! Memory-mapped and in-memory file access for artifact bytes.
//!
//! This module provides the [`File`] type, the byte-level entry point for analysis.
//! Files loaded from disk are memory-mapped for zero-copy access; in-memory buffers
//! are supported for synthetic or already-extracted artifacts.
//!
//! # Key Components
//!
//! - [`File`] - Owning wrapper around the raw artifact bytes
//! - [`crate::Parser`] - Cursor-based reader used by the decoder and format readers
//!
//! # Example
//!
//! ```rust,no_run
//! use zoscope::file::File;
//!
//! let file = File::from_path("MYMOD.bin")?;
//! println!("{} bytes", file.data().len());
//! # Ok::<(), zoscope::Error>(())
//! ```

pub(crate) mod io;
pub mod parser;

use std::path::Path;

use memmap2::Mmap;

use crate::Result;

/// Backing storage for a [`File`].
enum Backing {
    /// Memory-mapped view of a file on disk.
    Mapped(Mmap),
    /// Heap-allocated buffer.
    Buffer(Vec<u8>),
}

/// An input artifact opened for analysis.
///
/// `File` owns the raw bytes of a load module or program object, either as a
/// memory-mapped view (for on-disk files) or as an owned buffer (for in-memory data).
/// All downstream stages borrow from this storage; nothing is copied.
///
/// # Thread Safety
///
/// `File` is [`Send`] and [`Sync`]; the underlying storage is immutable after creation.
pub struct File {
    backing: Backing,
}

impl File {
    /// Open a file from disk, memory-mapping its contents.
    ///
    /// Empty files are mapped as empty buffers rather than failing, since a
    /// zero-length artifact is a well-formed (if degenerate) analysis input.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the artifact on disk
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let meta = file.metadata()?;
        if meta.len() == 0 {
            return Ok(File {
                backing: Backing::Buffer(Vec::new()),
            });
        }

        // SAFETY: the mapping is read-only and held for the lifetime of `File`;
        // concurrent truncation of the underlying file is outside our contract.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(File {
            backing: Backing::Mapped(mmap),
        })
    }

    /// Wrap an in-memory buffer.
    ///
    /// # Arguments
    ///
    /// * `data` - The artifact bytes
    #[must_use]
    pub fn from_mem(data: Vec<u8>) -> Self {
        File {
            backing: Backing::Buffer(data),
        }
    }

    /// Borrow the raw artifact bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(mmap) => mmap,
            Backing::Buffer(buf) => buf,
        }
    }

    /// Returns the length of the artifact in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Returns true if the artifact is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}
