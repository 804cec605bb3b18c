//! Linear Executable (LE) header and object table.
//!
//! Windows 3.x/9x virtual device drivers (VxDs) are LE modules: a DOS stub whose `e_lfanew`
//! points at an `LE` header. The header locates the object table, the fixup tables consumed by
//! [`crate::relocation`] and the enumerated data pages that form the module image.
//!
//! All structures are read field by field in their on-disk order, reserved areas included, so
//! the byte layout is preserved exactly.

use bitflags::bitflags;

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// `LE` as a 32-bit little-endian value, the byte and word order bytes must be zero
pub const LE_SIGNATURE: u32 = 0x454C;

/// The LE/VxD module header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeHeader {
    /// Magic number (`LE`)
    pub magic: u16,
    /// Byte ordering, 0 = little-endian
    pub border: u8,
    /// Word ordering, 0 = little-endian
    pub worder: u8,
    /// Format level, always 0
    pub level: u32,
    /// CPU type
    pub cpu: u16,
    /// OS type
    pub os: u16,
    /// Module version
    pub ver: u32,
    /// Module flags
    pub mflags: u32,
    /// Number of pages in the module
    pub mpages: u32,
    /// Object number of the initial instruction pointer
    pub startobj: u32,
    /// Initial instruction pointer, relative to `startobj`
    pub eip: u32,
    /// Object number of the initial stack pointer
    pub stackobj: u32,
    /// Initial stack pointer
    pub esp: u32,
    /// Page size
    pub pagesize: u32,
    /// Size of the last page
    pub lastpagesize: u32,
    /// Fixup section size
    pub fixupsize: u32,
    /// Fixup section checksum
    pub fixupsum: u32,
    /// Loader section size
    pub ldrsize: u32,
    /// Loader section checksum
    pub ldrsum: u32,
    /// Object table offset, relative to the LE header
    pub objtab: u32,
    /// Number of objects
    pub objcnt: u32,
    /// Object page map offset
    pub objmap: u32,
    /// Object iterated data map offset
    pub itermap: u32,
    /// Resource table offset
    pub rsrctab: u32,
    /// Number of resource entries
    pub rsrccnt: u32,
    /// Resident name table offset
    pub restab: u32,
    /// Entry table offset
    pub enttab: u32,
    /// Module directive table offset
    pub dirtab: u32,
    /// Number of module directives
    pub dircnt: u32,
    /// Fixup page table offset, relative to the LE header
    pub fpagetab: u32,
    /// Fixup record table offset, relative to the LE header
    pub frectab: u32,
    /// Import module name table offset
    pub impmod: u32,
    /// Number of import modules
    pub impmodcnt: u32,
    /// Import procedure name table offset
    pub impproc: u32,
    /// Per-page checksum table offset
    pub pagesum: u32,
    /// File offset of the enumerated data pages
    pub datapage: u32,
    /// Number of preload pages
    pub preload: u32,
    /// Non-resident name table offset (file relative)
    pub nrestab: u32,
    /// Size of the non-resident name table
    pub cbnrestab: u32,
    /// Non-resident name table checksum
    pub nressum: u32,
    /// Object number of the automatic data object
    pub autodata: u32,
    /// Debug information offset
    pub debuginfo: u32,
    /// Debug information length
    pub debuglen: u32,
    /// Instance pages in the preload section
    pub instpreload: u32,
    /// Instance pages in the demand load section
    pub instdemand: u32,
    /// Heap size, 16-bit modules only
    pub heapsize: u32,
    /// Reserved
    pub res3: [u8; 12],
    /// Windows resource offset
    pub winresoff: u32,
    /// Windows resource length
    pub winreslen: u32,
    /// VxD device id
    pub devid: u16,
    /// DDK version the VxD was built with
    pub ddkver: u16,
}

impl LeHeader {
    /// Size of the header on disk
    pub const SIZE: usize = 0xC4;

    /// Read an LE header from the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short and [`crate::Error::Malformed`]
    /// if the signature (including the byte/word order bytes) does not match.
    pub fn read(data: &[u8]) -> Result<LeHeader> {
        if data.len() < Self::SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let signature = parser.peek_le::<u32>()?;
        if signature != LE_SIGNATURE {
            return Err(malformed_error!(
                "Expected VxD file, found signature {:08X}",
                signature
            ));
        }

        let magic = parser.read_le::<u16>()?;
        let border = parser.read_le::<u8>()?;
        let worder = parser.read_le::<u8>()?;
        let level = parser.read_le::<u32>()?;
        let cpu = parser.read_le::<u16>()?;
        let os = parser.read_le::<u16>()?;
        let ver = parser.read_le::<u32>()?;
        let mflags = parser.read_le::<u32>()?;
        let mpages = parser.read_le::<u32>()?;
        let startobj = parser.read_le::<u32>()?;
        let eip = parser.read_le::<u32>()?;
        let stackobj = parser.read_le::<u32>()?;
        let esp = parser.read_le::<u32>()?;
        let pagesize = parser.read_le::<u32>()?;
        let lastpagesize = parser.read_le::<u32>()?;
        let fixupsize = parser.read_le::<u32>()?;
        let fixupsum = parser.read_le::<u32>()?;
        let ldrsize = parser.read_le::<u32>()?;
        let ldrsum = parser.read_le::<u32>()?;
        let objtab = parser.read_le::<u32>()?;
        let objcnt = parser.read_le::<u32>()?;
        let objmap = parser.read_le::<u32>()?;
        let itermap = parser.read_le::<u32>()?;
        let rsrctab = parser.read_le::<u32>()?;
        let rsrccnt = parser.read_le::<u32>()?;
        let restab = parser.read_le::<u32>()?;
        let enttab = parser.read_le::<u32>()?;
        let dirtab = parser.read_le::<u32>()?;
        let dircnt = parser.read_le::<u32>()?;
        let fpagetab = parser.read_le::<u32>()?;
        let frectab = parser.read_le::<u32>()?;
        let impmod = parser.read_le::<u32>()?;
        let impmodcnt = parser.read_le::<u32>()?;
        let impproc = parser.read_le::<u32>()?;
        let pagesum = parser.read_le::<u32>()?;
        let datapage = parser.read_le::<u32>()?;
        let preload = parser.read_le::<u32>()?;
        let nrestab = parser.read_le::<u32>()?;
        let cbnrestab = parser.read_le::<u32>()?;
        let nressum = parser.read_le::<u32>()?;
        let autodata = parser.read_le::<u32>()?;
        let debuginfo = parser.read_le::<u32>()?;
        let debuglen = parser.read_le::<u32>()?;
        let instpreload = parser.read_le::<u32>()?;
        let instdemand = parser.read_le::<u32>()?;
        let heapsize = parser.read_le::<u32>()?;

        let mut res3 = [0_u8; 12];
        res3.copy_from_slice(parser.read_bytes(12)?);

        let winresoff = parser.read_le::<u32>()?;
        let winreslen = parser.read_le::<u32>()?;
        let devid = parser.read_le::<u16>()?;
        let ddkver = parser.read_le::<u16>()?;

        Ok(LeHeader {
            magic,
            border,
            worder,
            level,
            cpu,
            os,
            ver,
            mflags,
            mpages,
            startobj,
            eip,
            stackobj,
            esp,
            pagesize,
            lastpagesize,
            fixupsize,
            fixupsum,
            ldrsize,
            ldrsum,
            objtab,
            objcnt,
            objmap,
            itermap,
            rsrctab,
            rsrccnt,
            restab,
            enttab,
            dirtab,
            dircnt,
            fpagetab,
            frectab,
            impmod,
            impmodcnt,
            impproc,
            pagesum,
            datapage,
            preload,
            nrestab,
            cbnrestab,
            nressum,
            autodata,
            debuginfo,
            debuglen,
            instpreload,
            instdemand,
            heapsize,
            res3,
            winresoff,
            winreslen,
            devid,
            ddkver,
        })
    }
}

bitflags! {
    #[derive(PartialEq, Debug, Clone, Copy)]
    /// Object table entry flags
    pub struct ObjectFlags: u32 {
        /// Readable object
        const READABLE = 0x0001;
        /// Writable object
        const WRITABLE = 0x0002;
        /// Executable object
        const EXECUTABLE = 0x0004;
        /// Resource object
        const RESOURCE = 0x0008;
        /// Discardable object
        const DISCARDABLE = 0x0010;
        /// Object is shared
        const SHARED = 0x0020;
        /// Object has preload pages
        const PRELOAD = 0x0040;
        /// Object has invalid pages
        const INVALID = 0x0080;
        /// Object has zero-filled pages
        const ZERO_FILLED = 0x0100;
        /// Object is resident
        const RESIDENT = 0x0200;
        /// Object is resident and long-lockable
        const LONG_LOCKABLE = 0x0400;
        /// 16:16 alias required
        const ALIAS_16_16 = 0x1000;
        /// Default operand and address size is 32 bits
        const BIG = 0x2000;
        /// Conforming code object
        const CONFORMING = 0x4000;
        /// I/O privilege level
        const IO_PRIVILEGE = 0x8000;
    }
}

/// One entry of the object table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Virtual size in bytes
    pub virtual_size: u32,
    /// Preferred load address, relative to the relocation base
    pub relocation_base: u32,
    /// Raw object flags, see [`ObjectFlags`]
    pub flags: u32,
    /// 1-based index of the object's first page map entry
    pub page_map_index: u32,
    /// Number of page map entries
    pub page_map_entries: u32,
    /// Reserved
    pub reserved: u32,
}

impl ObjectEntry {
    /// Size of one object table entry on disk
    pub const SIZE: usize = 24;

    /// Read an object table entry from the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
    pub fn read(data: &[u8]) -> Result<ObjectEntry> {
        let mut parser = Parser::new(data);

        Ok(ObjectEntry {
            virtual_size: parser.read_le::<u32>()?,
            relocation_base: parser.read_le::<u32>()?,
            flags: parser.read_le::<u32>()?,
            page_map_index: parser.read_le::<u32>()?,
            page_map_entries: parser.read_le::<u32>()?,
            reserved: parser.read_le::<u32>()?,
        })
    }

    /// Known flags of this object
    #[must_use]
    pub fn object_flags(&self) -> ObjectFlags {
        ObjectFlags::from_bits_truncate(self.flags)
    }

    /// Read `count` consecutive entries from the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the table extends beyond `data`.
    pub fn read_table(data: &[u8], count: u32) -> Result<Vec<ObjectEntry>> {
        let count = usize::try_from(count).map_err(|_| OutOfBounds)?;
        let size = count.checked_mul(Self::SIZE).ok_or(OutOfBounds)?;
        let table = data.get(..size).ok_or(OutOfBounds)?;

        table.chunks_exact(Self::SIZE).map(ObjectEntry::read).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::LeBuilder, Error};

    #[test]
    fn crafted() {
        let file = LeBuilder::new()
            .object(0x2000, 0x1000, 0x2045)
            .object(0x100, 0x3000, 0x0003)
            .entry(1, 0x10)
            .page(vec![0xC3])
            .build();
        let lfanew = LeBuilder::LFANEW as usize;

        let header = LeHeader::read(&file[lfanew..]).unwrap();
        assert_eq!(header.magic, 0x454C);
        assert_eq!(header.border, 0);
        assert_eq!(header.worder, 0);
        assert_eq!(header.cpu, 2);
        assert_eq!(header.os, 4);
        assert_eq!(header.mpages, 1);
        assert_eq!(header.startobj, 1);
        assert_eq!(header.eip, 0x10);
        assert_eq!(header.pagesize, 0x1000);
        assert_eq!(header.objtab, LeHeader::SIZE as u32);
        assert_eq!(header.objcnt, 2);
        assert_eq!(header.devid, 0x0001);
        assert_eq!(header.ddkver, 0x030A);
        assert_eq!(header.datapage as usize, file.len() - 1);

        let objects =
            ObjectEntry::read_table(&file[lfanew + header.objtab as usize..], header.objcnt)
                .unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].virtual_size, 0x2000);
        assert_eq!(objects[0].relocation_base, 0x1000);
        assert_eq!(
            objects[0].object_flags(),
            ObjectFlags::READABLE
                | ObjectFlags::EXECUTABLE
                | ObjectFlags::PRELOAD
                | ObjectFlags::BIG
        );
        assert_eq!(objects[1].relocation_base, 0x3000);
    }

    #[test]
    fn object_entry() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x10, 0x00, 0x00, // virtual_size = 0x1000
            0x00, 0x00, 0x01, 0x00, // relocation_base = 0x10000
            0x05, 0x20, 0x00, 0x00, // flags = READABLE | EXECUTABLE | BIG
            0x01, 0x00, 0x00, 0x00, // page_map_index = 1
            0x01, 0x00, 0x00, 0x00, // page_map_entries = 1
            0x00, 0x00, 0x00, 0x00, // reserved
        ];

        let entry = ObjectEntry::read(&data).unwrap();
        assert_eq!(entry.virtual_size, 0x1000);
        assert_eq!(entry.relocation_base, 0x10000);
        assert!(entry.object_flags().contains(ObjectFlags::BIG));
        assert_eq!(entry.page_map_index, 1);

        assert!(matches!(
            ObjectEntry::read(&data[..20]),
            Err(Error::OutOfBounds)
        ));
        assert!(matches!(
            ObjectEntry::read_table(&data, 2),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn bad_signature() {
        let mut data = [0_u8; LeHeader::SIZE];
        data[0] = b'L';
        data[1] = b'E';
        data[2] = 1; // big-endian byte order
        assert!(matches!(
            LeHeader::read(&data),
            Err(Error::Malformed { .. })
        ));

        data[0] = b'N';
        data[2] = 0;
        assert!(matches!(
            LeHeader::read(&data),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn truncated() {
        let data = [b'L', b'E', 0, 0];
        assert!(matches!(LeHeader::read(&data), Err(Error::OutOfBounds)));
    }
}
