//! Input file access and low-level binary reading.
//!
//! This module maps executables and SYM files from disk and provides the primitives every
//! fixed-layout reader in the crate is built on.
//!
//! # Key Components
//!
//! ## Core Types
//! - [`crate::file::File`] - A loaded input file
//! - [`crate::file::Backend`] - Trait for data sources of an input file
//! - [`crate::file::source::ByteSource`] - Bounds-checked, base-biased view of a loaded image
//!
//! ## Parsing Infrastructure
//! - [`crate::file::parser::Parser`] - Cursor-based reader for headers and records
//! - [`crate::file::io`] - Little-endian primitive reads and writes
//!
//! # Examples
//!
//! ```rust,no_run
//! use lescope::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("VMM.386"))?;
//! println!("Loaded {} bytes", file.len());
//! # Ok::<(), lescope::Error>(())
//! ```

pub mod io;
pub mod parser;
pub mod source;

mod physical;

use std::path::Path;

use crate::{Error::Empty, Result};
use physical::Physical;

/// Backend trait for file data sources.
///
/// Implemented by the memory-mapped file backend.
pub trait Backend: Send + Sync {
    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;

    /// Consumes the backend and returns an owned copy of its data.
    fn into_data(self: Box<Self>) -> Vec<u8>;
}

/// A loaded input file.
///
/// `File` only guarantees that the input is non-empty; interpreting the bytes is left to
/// [`crate::format::Executable`] and [`crate::symbols::SymbolFile`].
pub struct File {
    /// The underlying data source.
    data: Box<dyn Backend>,
}

impl File {
    /// Loads a file from the given path, memory mapping it.
    ///
    /// # Arguments
    ///
    /// * `file` - Path to the file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or if it is empty.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(data),
        })
    }

    /// Returns the total size of the loaded file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the file has a length of zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Returns the complete file contents.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Consumes the file and returns its contents as an owned buffer.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data.into_data()
    }
}
