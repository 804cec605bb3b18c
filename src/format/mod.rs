//! Executable front-end.
//!
//! Detects what kind of file is being disassembled and turns it into a [`ByteSource`] plus the
//! roots and segment starts the explorer should be seeded with.
//!
//! # Supported inputs
//!
//! - **LE / VxD modules**: DOS stub, `LE` header at `e_lfanew`, object table and fixups. The
//!   enumerated data pages are relocated to the requested base and the module entry point
//!   becomes a 32-bit protected-mode root named `Entry`.
//! - **DOS executables**: everything after the paragraph-scaled header, loaded at 0, with a
//!   16-bit real-mode root `Start` at `CS:IP`.
//! - **Raw images**: the whole file at a caller-chosen base, without roots.
//!
//! # Example
//!
//! ```rust,no_run
//! use lescope::{disassembler::{AnalysisOptions, Explorer}, format::Executable};
//! use std::path::Path;
//!
//! let exe = Executable::load(Path::new("VMM.386"), 0x8000_1000)?;
//! let options = AnalysisOptions::default();
//! let mut explorer = Explorer::new(exe.source(), &options);
//! exe.seed(&mut explorer);
//! explorer.analyze()?;
//! # Ok::<(), lescope::Error>(())
//! ```

pub mod le;
pub mod mz;

use std::path::Path;

use strum::Display;

use crate::{
    disassembler::{CodeMode, Explorer},
    file::{io::read_le, source::ByteSource, File},
    relocation::{FixupTable, RelocationStats},
    symbols::Symbol,
    Error, Result,
};

use le::{LeHeader, ObjectEntry, LE_SIGNATURE};
use mz::DosHeader;

/// Files below this size are rejected
pub const MIN_FILE_SIZE: usize = 0x100;

/// Detected input format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ExecutableKind {
    /// Linear Executable, usually a VxD
    Le,
    /// Plain DOS executable
    Mz,
    /// Flat image without headers
    Raw,
}

/// Initial root provided by the file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    /// Flat offset
    pub offset: u32,
    /// Mode the code starts in
    pub mode: CodeMode,
    /// Label of the root
    pub name: &'static str,
}

/// A loaded and, for LE modules, relocated executable
#[derive(Debug)]
pub struct Executable {
    kind: ExecutableKind,
    dos: Option<DosHeader>,
    lfanew: Option<u32>,
    le: Option<LeHeader>,
    objects: Vec<ObjectEntry>,
    relocation_base: u32,
    relocation: Option<RelocationStats>,
    entry: Option<EntryPoint>,
    source: ByteSource,
}

impl Executable {
    /// Read and parse the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, otherwise see
    /// [`Executable::parse`].
    pub fn load(path: &Path, relocation_base: u32) -> Result<Executable> {
        let file = File::from_file(path)?;
        Executable::parse(file.data(), relocation_base)
    }

    /// Parse an LE module or DOS executable.
    ///
    /// ## Arguments
    /// * 'data'            - The complete file
    /// * 'relocation_base' - Address LE modules are relocated to, ignored for DOS executables
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for files that are too small or have inconsistent
    /// headers, and [`crate::Error::Fixup`] if the LE fixups cannot be applied.
    pub fn parse(data: &[u8], relocation_base: u32) -> Result<Executable> {
        if data.len() < MIN_FILE_SIZE {
            return Err(malformed_error!("File is too small ({} bytes)", data.len()));
        }

        let dos = DosHeader::read(data)?;
        if DosHeader::SIZE + dos.header_size() as usize >= data.len() {
            return Err(malformed_error!("Invalid header"));
        }

        let lfanew = DosHeader::read_lfanew(data)?;
        let le_start = lfanew as usize;
        if le_start + LeHeader::SIZE < data.len() && read_le::<u32>(&data[le_start..])? == LE_SIGNATURE
        {
            return Executable::parse_le(data, dos, lfanew, relocation_base);
        }

        log::debug!("no LE header at {lfanew:#X}, loading as a DOS executable");
        Ok(Executable::parse_mz(data, dos))
    }

    /// Read the file at `path` as a flat image loaded at `base`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read and
    /// [`crate::Error::Empty`] if it is empty.
    pub fn load_raw(path: &Path, base: u32) -> Result<Executable> {
        let file = File::from_file(path)?;
        Ok(Executable::raw(file.into_data(), base))
    }

    /// Wrap a flat image loaded at `base`.
    #[must_use]
    pub fn raw(data: Vec<u8>, base: u32) -> Executable {
        Executable {
            kind: ExecutableKind::Raw,
            dos: None,
            lfanew: None,
            le: None,
            objects: Vec::new(),
            relocation_base: base,
            relocation: None,
            entry: None,
            source: ByteSource::new(data, base),
        }
    }

    fn parse_le(
        data: &[u8],
        dos: DosHeader,
        lfanew: u32,
        relocation_base: u32,
    ) -> Result<Executable> {
        let header = LeHeader::read(&data[lfanew as usize..])?;
        if header.datapage as usize > data.len() {
            return Err(malformed_error!("Invalid data page offset {:#X}", header.datapage));
        }
        if header.startobj == 0 || header.startobj > header.objcnt {
            return Err(malformed_error!(
                "Bad start object {} ({} objects)",
                header.startobj,
                header.objcnt
            ));
        }

        let objtab = lfanew as usize + header.objtab as usize;
        let objects = ObjectEntry::read_table(data.get(objtab..).unwrap_or(&[]), header.objcnt)?;

        // Pages are assumed to be mapped in file order
        let mut image = data[header.datapage as usize..].to_vec();
        let fixups = FixupTable::read(data, lfanew, &header)?;
        let stats = fixups.relocate(&mut image, relocation_base)?;

        let start = &objects[header.startobj as usize - 1];
        let entry = EntryPoint {
            offset: start
                .relocation_base
                .wrapping_add(relocation_base)
                .wrapping_add(header.eip),
            mode: CodeMode::protected32(),
            name: "Entry",
        };

        log::info!(
            "LE module: {} objects, {} pages, entry {:08X}, image {:#X} bytes at {:08X}",
            header.objcnt,
            header.mpages,
            entry.offset,
            image.len(),
            relocation_base
        );

        Ok(Executable {
            kind: ExecutableKind::Le,
            dos: Some(dos),
            lfanew: Some(lfanew),
            le: Some(header),
            objects,
            relocation_base,
            relocation: Some(stats),
            entry: Some(entry),
            source: ByteSource::new(image, relocation_base),
        })
    }

    fn parse_mz(data: &[u8], dos: DosHeader) -> Executable {
        let image = data[dos.header_size() as usize..].to_vec();
        let entry = EntryPoint {
            offset: dos.entry_offset(),
            mode: CodeMode::real16(),
            name: "Start",
        };

        log::info!(
            "DOS executable: {:#X} byte image, entry {:04X}:{:04X}",
            image.len(),
            dos.cs,
            dos.ip
        );

        Executable {
            kind: ExecutableKind::Mz,
            dos: Some(dos),
            lfanew: None,
            le: None,
            objects: Vec::new(),
            relocation_base: 0,
            relocation: None,
            entry: Some(entry),
            source: ByteSource::new(image, 0),
        }
    }

    /// Detected format
    #[must_use]
    pub fn kind(&self) -> ExecutableKind {
        self.kind
    }

    /// The DOS header, absent for raw images
    #[must_use]
    pub fn dos_header(&self) -> Option<&DosHeader> {
        self.dos.as_ref()
    }

    /// File offset of the LE header
    #[must_use]
    pub fn lfanew(&self) -> Option<u32> {
        self.lfanew
    }

    /// The LE header of LE modules
    #[must_use]
    pub fn le_header(&self) -> Option<&LeHeader> {
        self.le.as_ref()
    }

    /// The object table of LE modules
    #[must_use]
    pub fn objects(&self) -> &[ObjectEntry] {
        &self.objects
    }

    /// Address the image is loaded at
    #[must_use]
    pub fn relocation_base(&self) -> u32 {
        self.relocation_base
    }

    /// What relocation did, for LE modules
    #[must_use]
    pub fn relocation_stats(&self) -> Option<RelocationStats> {
        self.relocation
    }

    /// Entry point provided by the file header
    #[must_use]
    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.entry
    }

    /// The loaded image
    #[must_use]
    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    /// Load address of every object
    #[must_use]
    pub fn segment_starts(&self) -> Vec<u32> {
        self.objects
            .iter()
            .map(|object| object.relocation_base.wrapping_add(self.relocation_base))
            .collect()
    }

    /// Register segment starts and the entry point with `explorer`
    pub fn seed(&self, explorer: &mut Explorer) {
        for start in self.segment_starts() {
            explorer.add_segment_start(start);
        }
        if let Some(entry) = self.entry {
            explorer.add_root(entry.offset, entry.mode, Some(entry.name));
        }
    }

    /// Flat address of a symbol from a `.SYM` file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Symbol`] if the symbol's segment is not an object of the module
    /// and [`crate::Error::NotSupported`] for inputs without an object table.
    pub fn symbol_address(&self, symbol: &Symbol) -> Result<u32> {
        if self.kind != ExecutableKind::Le {
            return Err(Error::NotSupported(format!(
                "symbols can only be mapped onto LE modules, not {} files",
                self.kind
            )));
        }

        let object = usize::from(symbol.segment_number)
            .checked_sub(1)
            .and_then(|index| self.objects.get(index));
        let Some(object) = object else {
            return Err(Error::Symbol(format!(
                "Bad symbol {} in segment {} ({} objects)",
                symbol.name,
                symbol.segment_number,
                self.objects.len()
            )));
        };

        Ok(object
            .relocation_base
            .wrapping_add(self.relocation_base)
            .wrapping_add(symbol.offset))
    }
}
