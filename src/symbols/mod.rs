//! MAPSYM `.SYM` symbol files.
//!
//! A SYM file starts with a map header naming the module, followed by a chain of paragraph
//! aligned segment blocks. Every block lists `(offset, name)` pairs for one segment of the
//! module. Only 32-bit segment blocks (type 1) as produced for VxDs are understood.
//!
//! ```text
//! +0  u32  size of the file after this field, in paragraphs
//! +4  u16  entry segment
//! +6  u16  symbols in segment 0, must be 0
//! +8  u16  header size (unused)
//! +A  u16  number of segment blocks
//! +C  u16  paragraph of the first segment block
//! +E  u8   reserved
//! +F  str  module name (length prefixed)
//! ```

use std::path::Path;

use crate::{
    file::{parser::Parser, File},
    format::mz::PARAGRAPH_SIZE,
    Error, Result,
};

/// Segment block type of 32-bit segments
pub const SEGMENT_TYPE_32BIT: u8 = 1;

/// Smallest possible segment block
const SEGMENT_BLOCK_MIN_SIZE: usize = 32;

/// A named offset in one segment of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name
    pub name: String,
    /// 1-based segment (LE object) number
    pub segment_number: u16,
    /// Offset inside the segment
    pub offset: u32,
}

/// One segment block of a SYM file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSegment {
    /// 1-based segment number
    pub number: u16,
    /// Segment name, e.g. `_LTEXT`
    pub name: String,
    /// Symbols in file order
    pub symbols: Vec<Symbol>,
}

/// A parsed SYM file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFile {
    /// Module name from the map header
    pub module_name: String,
    /// Entry segment from the map header
    pub entry_segment: u16,
    /// Segment blocks in chain order
    pub segments: Vec<SymbolSegment>,
}

impl SymbolFile {
    /// Read and parse the SYM file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, otherwise see
    /// [`SymbolFile::parse`].
    pub fn load(path: &Path) -> Result<SymbolFile> {
        let file = File::from_file(path)?;
        SymbolFile::parse(file.data())
    }

    /// Parse a SYM file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Symbol`] if the size field does not match the data, the file has
    /// symbols in segment 0, a block is not a 32-bit segment or the number of blocks differs from
    /// the header. Truncated structures give [`crate::Error::OutOfBounds`].
    pub fn parse(data: &[u8]) -> Result<SymbolFile> {
        let mut parser = Parser::new(data);

        let length = u64::from(parser.read_le::<u32>()?) * u64::from(PARAGRAPH_SIZE);
        if length + 4 != data.len() as u64 {
            return Err(Error::Symbol(format!(
                "Invalid SYM file: length {:#X}, expected {:#X}",
                length,
                data.len().saturating_sub(4)
            )));
        }

        let entry_segment = parser.read_le::<u16>()?;
        let symbols_in_segment_zero = parser.read_le::<u16>()?;
        let _header_size = parser.read_le::<u16>()?;
        let segment_count = parser.read_le::<u16>()?;
        let first_segment = paragraphs(parser.read_le::<u16>()?);
        parser.advance()?;
        let module_name = parser.read_prefixed_string()?;

        log::debug!(
            "SYM module {module_name:?}: entry segment {entry_segment}, {segment_count} segments, first block at {first_segment:#X}"
        );

        if symbols_in_segment_zero != 0 {
            return Err(Error::Symbol(format!(
                "{symbols_in_segment_zero} symbols in segment 0 are not supported"
            )));
        }

        parser.seek(first_segment)?;
        let mut segments = Vec::new();
        while parser.pos() + SEGMENT_BLOCK_MIN_SIZE < data.len() {
            let (segment, next) = read_segment(&mut parser)?;
            segments.push(segment);

            if next < parser.pos() {
                break;
            }
            parser.seek(next)?;
        }

        if segments.len() != usize::from(segment_count) {
            return Err(Error::Symbol(format!(
                "Found {} segment blocks, header declares {}",
                segments.len(),
                segment_count
            )));
        }

        Ok(SymbolFile {
            module_name,
            entry_segment,
            segments,
        })
    }

    /// All symbols of all segments in file order
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.segments.iter().flat_map(|segment| segment.symbols.iter())
    }

    /// Number of symbols in the file
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.segments.iter().map(|segment| segment.symbols.len()).sum()
    }
}

fn paragraphs(count: u16) -> usize {
    usize::from(count) * PARAGRAPH_SIZE as usize
}

/// Read one segment block, returning it with the position of the next block
fn read_segment(parser: &mut Parser) -> Result<(SymbolSegment, usize)> {
    let next = paragraphs(parser.read_le::<u16>()?);
    let symbol_count = parser.read_le::<u16>()?;
    let _symbol_size = parser.read_le::<u16>()?;
    let number = parser.read_le::<u16>()?;
    parser.advance_by(6)?;
    let kind = parser.read_le::<u8>()?;
    parser.advance_by(5)?;
    let name = parser.read_prefixed_string()?;

    log::debug!("SYM segment {number} {name:?}: type {kind}, {symbol_count} symbols, next {next:#X}");

    if kind != SEGMENT_TYPE_32BIT {
        return Err(Error::Symbol(format!(
            "Segment {name:?} has unsupported type {kind}"
        )));
    }

    let mut symbols = Vec::with_capacity(usize::from(symbol_count));
    for _ in 0..symbol_count {
        let offset = parser.read_le::<u32>()?;
        let name = parser.read_prefixed_string()?;
        log::trace!("  {offset:08X} {name}");
        symbols.push(Symbol {
            name,
            segment_number: number,
            offset,
        });
    }

    Ok((
        SymbolSegment {
            number,
            name,
            symbols,
        },
        next,
    ))
}
