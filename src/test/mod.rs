//! Builders for synthetic LE modules and SYM files used by the unit tests.

/// Assembles a minimal but well-formed LE module: DOS stub, LE header, object table,
/// fixup page table, fixup records and data pages.
pub struct LeBuilder {
    pagesize: u32,
    objects: Vec<(u32, u32, u32)>,
    startobj: u32,
    eip: u32,
    pages: Vec<Vec<u8>>,
    fixups: Vec<Vec<u8>>,
}

impl LeBuilder {
    /// File offset of the LE header
    pub const LFANEW: u32 = 0x40;

    pub fn new() -> Self {
        LeBuilder {
            pagesize: 0x1000,
            objects: Vec::new(),
            startobj: 1,
            eip: 0,
            pages: Vec::new(),
            fixups: Vec::new(),
        }
    }

    pub fn pagesize(mut self, pagesize: u32) -> Self {
        self.pagesize = pagesize;
        self
    }

    pub fn object(mut self, virtual_size: u32, relocation_base: u32, flags: u32) -> Self {
        self.objects.push((virtual_size, relocation_base, flags));
        self
    }

    pub fn entry(mut self, startobj: u32, eip: u32) -> Self {
        self.startobj = startobj;
        self.eip = eip;
        self
    }

    /// Append a data page; every page but the last is padded to the page size
    pub fn page(mut self, data: Vec<u8>) -> Self {
        self.pages.push(data);
        self.fixups.push(Vec::new());
        self
    }

    /// Append raw fixup record bytes to the most recently added page
    pub fn fixup(mut self, record: &[u8]) -> Self {
        if let Some(last) = self.fixups.last_mut() {
            last.extend_from_slice(record);
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mpages = self.pages.len() as u32;
        let objtab = 0xC4_u32;
        let fpagetab = objtab + self.objects.len() as u32 * 24;
        let frectab = fpagetab + (mpages + 1) * 4;
        let records: usize = self.fixups.iter().map(Vec::len).sum();
        let datapage = Self::LFANEW + frectab + records as u32;
        let lastpagesize = self.pages.last().map_or(0, |p| p.len() as u32);

        let mut out = vec![0_u8; Self::LFANEW as usize];
        out[0..2].copy_from_slice(b"MZ");
        out[8..10].copy_from_slice(&4_u16.to_le_bytes()); // cparhdr
        out[0x18..0x1A].copy_from_slice(&0x40_u16.to_le_bytes()); // lfarlc
        out[0x3C..0x40].copy_from_slice(&Self::LFANEW.to_le_bytes());

        let mut header = Vec::with_capacity(0xC4);
        header.extend_from_slice(b"LE\0\0");
        let push32 = |header: &mut Vec<u8>, v: u32| header.extend_from_slice(&v.to_le_bytes());
        push32(&mut header, 0); // level
        header.extend_from_slice(&2_u16.to_le_bytes()); // cpu = 80386
        header.extend_from_slice(&4_u16.to_le_bytes()); // os = Windows 386
        push32(&mut header, 0); // ver
        push32(&mut header, 0x0003_8000); // mflags
        push32(&mut header, mpages);
        push32(&mut header, self.startobj);
        push32(&mut header, self.eip);
        push32(&mut header, 0); // stackobj
        push32(&mut header, 0); // esp
        push32(&mut header, self.pagesize);
        push32(&mut header, lastpagesize);
        push32(&mut header, (mpages + 1) * 4 + records as u32); // fixupsize
        push32(&mut header, 0); // fixupsum
        push32(&mut header, 0); // ldrsize
        push32(&mut header, 0); // ldrsum
        push32(&mut header, objtab);
        push32(&mut header, self.objects.len() as u32);
        for _ in 0..8 {
            // objmap, itermap, rsrctab, rsrccnt, restab, enttab, dirtab, dircnt
            push32(&mut header, 0);
        }
        push32(&mut header, fpagetab);
        push32(&mut header, frectab);
        for _ in 0..4 {
            // impmod, impmodcnt, impproc, pagesum
            push32(&mut header, 0);
        }
        push32(&mut header, datapage);
        for _ in 0..10 {
            // preload .. heapsize
            push32(&mut header, 0);
        }
        header.extend_from_slice(&[0; 12]); // res3
        push32(&mut header, 0); // winresoff
        push32(&mut header, 0); // winreslen
        header.extend_from_slice(&1_u16.to_le_bytes()); // devid = VMM
        header.extend_from_slice(&0x030A_u16.to_le_bytes()); // ddkver
        assert_eq!(header.len(), 0xC4);
        out.extend_from_slice(&header);

        for (virtual_size, relocation_base, flags) in &self.objects {
            for value in [*virtual_size, *relocation_base, *flags, 1, mpages, 0] {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }

        let mut cumulative = 0_u32;
        out.extend_from_slice(&cumulative.to_le_bytes());
        for records in &self.fixups {
            cumulative += records.len() as u32;
            out.extend_from_slice(&cumulative.to_le_bytes());
        }
        for records in &self.fixups {
            out.extend_from_slice(records);
        }

        assert_eq!(out.len(), datapage as usize);
        for (index, page) in self.pages.iter().enumerate() {
            out.extend_from_slice(page);
            if index + 1 < self.pages.len() {
                out.resize(out.len() + self.pagesize as usize - page.len(), 0);
            }
        }

        if out.len() < 0x100 {
            // Files below 0x100 bytes are rejected, grow the last page
            out.resize(0x100, 0);
        }

        out
    }
}

/// A segment block of a synthetic SYM file
pub struct SymSegment {
    pub number: u16,
    pub kind: u8,
    pub name: &'static str,
    pub symbols: Vec<(u32, &'static str)>,
}

/// Assembles a SYM file with paragraph aligned segment blocks
pub struct SymBuilder {
    pub module: &'static str,
    pub entry_segment: u16,
    pub symbols_in_segment_zero: u16,
    pub declared_segments: Option<u16>,
    pub segments: Vec<SymSegment>,
}

impl SymBuilder {
    pub fn new(module: &'static str) -> Self {
        SymBuilder {
            module,
            entry_segment: 0,
            symbols_in_segment_zero: 0,
            declared_segments: None,
            segments: Vec::new(),
        }
    }

    pub fn segment(
        mut self,
        number: u16,
        name: &'static str,
        symbols: Vec<(u32, &'static str)>,
    ) -> Self {
        self.segments.push(SymSegment {
            number,
            kind: 1,
            name,
            symbols,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        fn pascal(out: &mut Vec<u8>, s: &str) {
            out.push(s.len() as u8);
            out.extend_from_slice(s.as_bytes());
        }
        fn align(out: &mut Vec<u8>) {
            while out.len() % 16 != 0 {
                out.push(0);
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0_u32.to_le_bytes()); // paragraphs, patched below
        out.extend_from_slice(&self.entry_segment.to_le_bytes());
        out.extend_from_slice(&self.symbols_in_segment_zero.to_le_bytes());
        out.extend_from_slice(&0_u16.to_le_bytes()); // header size
        let declared = self
            .declared_segments
            .unwrap_or(self.segments.len() as u16);
        out.extend_from_slice(&declared.to_le_bytes());
        out.extend_from_slice(&0_u16.to_le_bytes()); // first segment, patched below
        out.push(0); // reserved
        pascal(&mut out, self.module);
        align(&mut out);

        let first = (out.len() / 16) as u16;
        out[12..14].copy_from_slice(&first.to_le_bytes());

        for (index, segment) in self.segments.iter().enumerate() {
            let start = out.len();
            out.extend_from_slice(&0_u16.to_le_bytes()); // next, patched below
            out.extend_from_slice(&(segment.symbols.len() as u16).to_le_bytes());
            out.extend_from_slice(&0_u16.to_le_bytes()); // symbol size
            out.extend_from_slice(&segment.number.to_le_bytes());
            out.extend_from_slice(&[0; 6]);
            out.push(segment.kind);
            out.extend_from_slice(&[0; 5]);
            pascal(&mut out, segment.name);
            for (address, name) in &segment.symbols {
                out.extend_from_slice(&address.to_le_bytes());
                pascal(&mut out, name);
            }
            if out.len() - start < 32 {
                out.resize(start + 32, 0);
            }
            align(&mut out);

            if index + 1 < self.segments.len() {
                let next = (out.len() / 16) as u16;
                out[start..start + 2].copy_from_slice(&next.to_le_bytes());
            }
        }

        // total length must be 4 + paragraphs * 16
        out.extend_from_slice(&[0; 4]);
        let paragraphs = ((out.len() - 4) / 16) as u32;
        out[0..4].copy_from_slice(&paragraphs.to_le_bytes());

        out
    }
}

/// Encode a single-source fixup record
pub fn fixup_single(address_type: u8, source: i16, object: u8, target: u32) -> Vec<u8> {
    let relocation_type = if target > 0xFFFF { 0x10 } else { 0x00 };
    let mut record = vec![address_type, relocation_type];
    record.extend_from_slice(&source.to_le_bytes());
    record.push(object);
    if relocation_type & 0x10 != 0 {
        record.extend_from_slice(&target.to_le_bytes());
    } else {
        record.extend_from_slice(&(target as u16).to_le_bytes());
    }
    record
}

/// Encode a fixup record with a source offset list
pub fn fixup_list(address_type: u8, sources: &[i16], object: u8, target: u16) -> Vec<u8> {
    let mut record = vec![address_type | 0x20, 0x00, sources.len() as u8, object];
    record.extend_from_slice(&target.to_le_bytes());
    for source in sources {
        record.extend_from_slice(&source.to_le_bytes());
    }
    record
}
