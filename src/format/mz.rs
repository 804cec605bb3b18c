//! DOS MZ executable header.
//!
//! Every LE/VxD module starts with a DOS stub, and plain DOS programs consist of nothing else.
//! [`crate::format::mz::DosHeader`] reads the 28 byte header in its on-disk field order; the
//! offset of the extended header (`e_lfanew`) lives outside of it at `0x3C` and is read with
//! [`crate::format::mz::DosHeader::read_lfanew`].

use crate::{file::io::read_le, file::parser::Parser, Error::OutOfBounds, Result};

/// `MZ`
pub const DOS_SIGNATURE: u16 = 0x5A4D;

/// File offset of the `e_lfanew` field
pub const LFANEW_OFFSET: usize = 0x3C;

/// Size of a paragraph, the unit of `cparhdr` and of real-mode segments
pub const PARAGRAPH_SIZE: u32 = 16;

/// The DOS `.EXE` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosHeader {
    /// Magic number
    pub magic: u16,
    /// Bytes on last page of file
    pub cblp: u16,
    /// Pages in file
    pub cp: u16,
    /// Relocations
    pub crlc: u16,
    /// Size of header in paragraphs
    pub cparhdr: u16,
    /// Minimum extra paragraphs needed
    pub minalloc: u16,
    /// Maximum extra paragraphs needed
    pub maxalloc: u16,
    /// Initial (relative) SS value
    pub ss: u16,
    /// Initial SP value
    pub sp: u16,
    /// Checksum
    pub csum: u16,
    /// Initial IP value
    pub ip: u16,
    /// Initial (relative) CS value
    pub cs: u16,
    /// File address of relocation table
    pub lfarlc: u16,
    /// Overlay number
    pub ovno: u16,
}

/// A segment:offset entry of the DOS relocation table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosRelocation {
    /// Segment, relative to the start of the load image
    pub segment: u16,
    /// Offset within `segment`
    pub offset: u16,
}

impl DosHeader {
    /// Size of the header on disk
    pub const SIZE: usize = 0x1C;

    /// Read a DOS header from the start of `data`, checking the `MZ` signature.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short and [`crate::Error::Malformed`]
    /// if the signature does not match.
    pub fn read(data: &[u8]) -> Result<DosHeader> {
        if data.len() < Self::SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let magic = parser.read_le::<u16>()?;
        if magic != DOS_SIGNATURE {
            return Err(malformed_error!(
                "Unknown signature {:04X} '{}{}'",
                magic,
                char::from((magic & 0xFF) as u8),
                char::from((magic >> 8) as u8)
            ));
        }

        Ok(DosHeader {
            magic,
            cblp: parser.read_le::<u16>()?,
            cp: parser.read_le::<u16>()?,
            crlc: parser.read_le::<u16>()?,
            cparhdr: parser.read_le::<u16>()?,
            minalloc: parser.read_le::<u16>()?,
            maxalloc: parser.read_le::<u16>()?,
            ss: parser.read_le::<u16>()?,
            sp: parser.read_le::<u16>()?,
            csum: parser.read_le::<u16>()?,
            ip: parser.read_le::<u16>()?,
            cs: parser.read_le::<u16>()?,
            lfarlc: parser.read_le::<u16>()?,
            ovno: parser.read_le::<u16>()?,
        })
    }

    /// Header size in bytes (`cparhdr` paragraphs)
    #[must_use]
    pub fn header_size(&self) -> u32 {
        u32::from(self.cparhdr) * PARAGRAPH_SIZE
    }

    /// Entry point as a flat offset into the load image (`cs * 16 + ip`)
    #[must_use]
    pub fn entry_offset(&self) -> u32 {
        u32::from(self.cs) * PARAGRAPH_SIZE + u32::from(self.ip)
    }

    /// Read the `e_lfanew` field at `0x3C`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the file ends before it.
    pub fn read_lfanew(data: &[u8]) -> Result<u32> {
        let field = data.get(LFANEW_OFFSET..).ok_or(OutOfBounds)?;
        read_le::<u32>(field)
    }

    /// Read the DOS relocation table described by `lfarlc`/`crlc`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the table extends beyond the file.
    pub fn relocations(&self, data: &[u8]) -> Result<Vec<DosRelocation>> {
        let start = usize::from(self.lfarlc);
        let end = start + usize::from(self.crlc) * 4;
        if end > data.len() {
            return Err(malformed_error!("Relocation table out of range"));
        }

        let mut parser = Parser::new(&data[start..end]);
        let mut relocations = Vec::with_capacity(usize::from(self.crlc));
        while parser.has_more_data() {
            let offset = parser.read_le::<u16>()?;
            let segment = parser.read_le::<u16>()?;
            relocations.push(DosRelocation { segment, offset });
        }

        Ok(relocations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[rustfmt::skip]
    const HEADER: [u8; 0x24] = [
        0x4D, 0x5A, // magic = MZ
        0x90, 0x00, // cblp = 0x90
        0x03, 0x00, // cp = 3
        0x02, 0x00, // crlc = 2
        0x04, 0x00, // cparhdr = 4
        0x00, 0x00, // minalloc = 0
        0xFF, 0xFF, // maxalloc = 0xFFFF
        0x10, 0x00, // ss = 0x10
        0x00, 0x01, // sp = 0x100
        0x00, 0x00, // csum = 0
        0x34, 0x00, // ip = 0x34
        0x02, 0x00, // cs = 2
        0x1C, 0x00, // lfarlc = 0x1C
        0x00, 0x00, // ovno = 0
        0x05, 0x00, 0x00, 0x00, // reloc 0000:0005
        0x10, 0x00, 0x01, 0x00, // reloc 0001:0010
    ];

    #[test]
    fn crafted() {
        let header = DosHeader::read(&HEADER).unwrap();

        assert_eq!(header.magic, DOS_SIGNATURE);
        assert_eq!(header.cblp, 0x90);
        assert_eq!(header.cp, 3);
        assert_eq!(header.crlc, 2);
        assert_eq!(header.cparhdr, 4);
        assert_eq!(header.maxalloc, 0xFFFF);
        assert_eq!(header.ss, 0x10);
        assert_eq!(header.sp, 0x100);
        assert_eq!(header.ip, 0x34);
        assert_eq!(header.cs, 2);
        assert_eq!(header.lfarlc, 0x1C);
        assert_eq!(header.header_size(), 0x40);
        assert_eq!(header.entry_offset(), 0x54);
    }

    #[test]
    fn relocations() {
        let header = DosHeader::read(&HEADER).unwrap();
        let relocations = header.relocations(&HEADER).unwrap();

        assert_eq!(
            relocations,
            vec![
                DosRelocation {
                    segment: 0,
                    offset: 5
                },
                DosRelocation {
                    segment: 1,
                    offset: 0x10
                },
            ]
        );

        assert!(header.relocations(&HEADER[..0x20]).is_err());
    }

    #[test]
    fn bad_signature() {
        let mut data = HEADER;
        data[0] = b'Z';
        data[1] = b'M';
        assert!(matches!(
            DosHeader::read(&data),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn truncated() {
        assert!(matches!(
            DosHeader::read(&HEADER[..0x10]),
            Err(Error::OutOfBounds)
        ));
        assert!(matches!(
            DosHeader::read_lfanew(&HEADER),
            Err(Error::OutOfBounds)
        ));
    }
}
