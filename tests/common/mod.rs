//! Synthetic VxD modules and SYM files for the integration tests.

#![allow(dead_code)]

/// Load address used by all tests
pub const BASE: u32 = 0x8000_1000;

const LFANEW: usize = 0x80;
const LE_HEADER_SIZE: usize = 0xC4;
const OBJECT_ENTRY_SIZE: usize = 24;

/// One code/data object backed by a single data page
pub struct Object {
    pub relocation_base: u32,
    pub page: Vec<u8>,
    /// `(source offset, target offset)` 32-bit offset fixups into object 1
    pub fixups: Vec<(u16, u16)>,
}

/// Builds an LE module in which object *n* occupies data page *n*
pub struct Vxd {
    pub page_size: u32,
    pub start_object: u32,
    pub eip: u32,
    pub objects: Vec<Object>,
}

impl Vxd {
    pub fn new(code: &[u8]) -> Self {
        Vxd {
            page_size: 0x1000,
            start_object: 1,
            eip: 0,
            objects: vec![Object {
                relocation_base: 0,
                page: code.to_vec(),
                fixups: Vec::new(),
            }],
        }
    }

    pub fn entry(mut self, eip: u32) -> Self {
        self.eip = eip;
        self
    }

    pub fn fixup(mut self, source: u16, target: u16) -> Self {
        if let Some(object) = self.objects.last_mut() {
            object.fixups.push((source, target));
        }
        self
    }

    pub fn object(mut self, relocation_base: u32, page: &[u8]) -> Self {
        self.objects.push(Object {
            relocation_base,
            page: page.to_vec(),
            fixups: Vec::new(),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let pages = self.objects.len();
        let objtab = LE_HEADER_SIZE;
        let fpagetab = objtab + pages * OBJECT_ENTRY_SIZE;
        let frectab = fpagetab + (pages + 1) * 4;

        let mut records = Vec::new();
        let mut page_offsets = vec![0_u32];
        for object in &self.objects {
            for (source, target) in &object.fixups {
                // 32-bit offset, internal reference to object 1, 16-bit target offset
                records.extend_from_slice(&[0x07, 0x00]);
                records.extend_from_slice(&source.to_le_bytes());
                records.push(1);
                records.extend_from_slice(&target.to_le_bytes());
            }
            page_offsets.push(records.len() as u32);
        }
        let datapage = LFANEW + frectab + records.len();

        let mut out = vec![0_u8; LFANEW];
        out[0..2].copy_from_slice(b"MZ");
        out[8..10].copy_from_slice(&4_u16.to_le_bytes());
        out[0x3C..0x40].copy_from_slice(&(LFANEW as u32).to_le_bytes());

        let mut header = vec![0_u8; LE_HEADER_SIZE];
        let mut put = |at: usize, value: u32| header[at..at + 4].copy_from_slice(&value.to_le_bytes());
        put(0x00, 0x454C);
        put(0x14, pages as u32);
        put(0x18, self.start_object);
        put(0x1C, self.eip);
        put(0x28, self.page_size);
        put(0x2C, self.objects.last().map_or(0, |o| o.page.len() as u32));
        put(0x40, objtab as u32);
        put(0x44, pages as u32);
        put(0x68, fpagetab as u32);
        put(0x6C, frectab as u32);
        put(0x80, datapage as u32);
        header[0x08..0x0A].copy_from_slice(&2_u16.to_le_bytes());
        header[0x0A..0x0C].copy_from_slice(&4_u16.to_le_bytes());
        out.extend_from_slice(&header);

        for (index, object) in self.objects.iter().enumerate() {
            let entry = [
                self.page_size,
                object.relocation_base,
                0x2005,
                index as u32 + 1,
                1,
                0,
            ];
            for value in entry {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        for offset in page_offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out.extend_from_slice(&records);

        assert_eq!(out.len(), datapage);
        for (index, object) in self.objects.iter().enumerate() {
            out.extend_from_slice(&object.page);
            if index + 1 < self.objects.len() {
                out.resize(datapage + (index + 1) * self.page_size as usize, 0);
            }
        }
        if out.len() < 0x100 {
            out.resize(0x100, 0);
        }
        out
    }
}

/// A DOS program whose load image starts at file offset 0x40
pub fn dos_program(code: &[u8], cs: u16, ip: u16) -> Vec<u8> {
    let mut out = vec![0_u8; 0x40];
    out[0..2].copy_from_slice(b"MZ");
    out[8..10].copy_from_slice(&4_u16.to_le_bytes());
    out[0x14..0x16].copy_from_slice(&ip.to_le_bytes());
    out[0x16..0x18].copy_from_slice(&cs.to_le_bytes());
    out.extend_from_slice(code);
    if out.len() < 0x100 {
        out.resize(0x100, 0);
    }
    out
}

/// A SYM file with one 32-bit block per `(segment, name, symbols)` entry
pub fn sym_file(module: &str, segments: &[(u16, &str, &[(u32, &str)])]) -> Vec<u8> {
    fn name(out: &mut Vec<u8>, s: &str) {
        out.push(s.len() as u8);
        out.extend_from_slice(s.as_bytes());
    }
    fn pad(out: &mut Vec<u8>, min: usize) {
        if out.len() < min {
            out.resize(min, 0);
        }
        out.resize(out.len().next_multiple_of(16), 0);
    }

    let mut out = vec![0_u8; 15];
    out[10..12].copy_from_slice(&(segments.len() as u16).to_le_bytes());
    name(&mut out, module);
    pad(&mut out, 0);
    let first = (out.len() / 16) as u16;
    out[12..14].copy_from_slice(&first.to_le_bytes());

    for (index, (number, segment, symbols)) in segments.iter().enumerate() {
        let start = out.len();
        out.extend_from_slice(&[0; 2]);
        out.extend_from_slice(&(symbols.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0; 2]);
        out.extend_from_slice(&number.to_le_bytes());
        out.extend_from_slice(&[0; 6]);
        out.push(1);
        out.extend_from_slice(&[0; 5]);
        name(&mut out, segment);
        for (offset, symbol) in symbols.iter() {
            out.extend_from_slice(&offset.to_le_bytes());
            name(&mut out, symbol);
        }
        pad(&mut out, start + 32);

        if index + 1 < segments.len() {
            let next = (out.len() / 16) as u16;
            out[start..start + 2].copy_from_slice(&next.to_le_bytes());
        }
    }

    out.extend_from_slice(&[0; 4]);
    let paragraphs = ((out.len() - 4) / 16) as u32;
    out[0..4].copy_from_slice(&paragraphs.to_le_bytes());
    out
}
