//! LE fixup processing.
//!
//! Before a VxD image can be disassembled, every absolute address inside it has to be rebased
//! to the address the module is assumed to be loaded at. The LE format stores the fixups per
//! page: a fixup page table (`mpages + 1` cumulative offsets) indexes into a flat fixup record
//! stream, see [`crate::relocation::record`].
//!
//! # Key Components
//!
//! - [`crate::relocation::FixupTable`] - The page table plus record stream of one module
//! - [`crate::relocation::FixupTable::relocate`] - Applies all fixups to the module image
//! - [`crate::relocation::RelocationStats`] - What was patched
//!
//! # Semantics
//!
//! Offset fixups add the relocation base to the 32-bit value already present at the patch site.
//! EIP-relative fixups leave the image untouched, the encoded displacement is correct as is.
//! Any malformed or unsupported record aborts relocation with [`crate::Error::Fixup`], a
//! partially relocated image is never returned.

pub mod record;

pub use record::{parse_records, FixupKind, FixupRecord, FixupTarget, SourceFlags, TargetFlags};

use crate::{
    file::{
        io::{read_le, write_le},
        parser::Parser,
    },
    format::le::LeHeader,
    Result,
};

use record::fixup_error;

/// Counters collected while relocating an image
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelocationStats {
    /// Pages with at least one fixup record
    pub pages: u32,
    /// Decoded fixup records
    pub records: u32,
    /// Patch sites that had the base added
    pub patched: u32,
    /// EIP-relative patch sites left untouched
    pub relative: u32,
    /// Negative source offsets skipped, they were handled with the previous page
    pub cross_page: u32,
}

/// Fixup page table and record stream of an LE module
pub struct FixupTable<'a> {
    page_offsets: Vec<u32>,
    records: &'a [u8],
    page_size: u32,
}

impl<'a> FixupTable<'a> {
    /// Locate the fixup tables of the module described by `header`.
    ///
    /// # Arguments
    /// * `data` - The complete file
    /// * `lfanew` - File offset of the LE header
    /// * `header` - The parsed LE header
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tables lie outside of the file or the page table
    /// is not ascending.
    pub fn read(data: &'a [u8], lfanew: u32, header: &LeHeader) -> Result<FixupTable<'a>> {
        let fpagetab = lfanew as usize + header.fpagetab as usize;
        let frectab = lfanew as usize + header.frectab as usize;

        let Some(table) = data.get(fpagetab..) else {
            return Err(malformed_error!(
                "Fixup page table at {:#X} is outside of the file",
                fpagetab
            ));
        };

        let mut parser = Parser::new(table);
        let mut page_offsets = Vec::new();
        for _ in 0..=header.mpages {
            page_offsets.push(parser.read_le::<u32>()?);
        }

        if page_offsets.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(malformed_error!("Fixup page table is not ascending"));
        }

        let records_len = page_offsets.last().copied().unwrap_or(0) as usize;
        let Some(records) = data.get(frectab..frectab + records_len) else {
            return Err(malformed_error!(
                "Fixup record table at {:#X} (+{:#X}) is outside of the file",
                frectab,
                records_len
            ));
        };

        Ok(FixupTable {
            page_offsets,
            records,
            page_size: header.pagesize,
        })
    }

    /// Number of pages covered by the table
    #[must_use]
    pub fn page_count(&self) -> u32 {
        (self.page_offsets.len() - 1) as u32
    }

    /// The raw record bytes of `page`
    #[must_use]
    pub fn page_records(&self, page: u32) -> &'a [u8] {
        let page = page as usize;
        match (self.page_offsets.get(page), self.page_offsets.get(page + 1)) {
            (Some(&start), Some(&end)) => &self.records[start as usize..end as usize],
            _ => &[],
        }
    }

    /// Decode the fixup records of `page`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Fixup`] if a record is malformed or unsupported.
    pub fn records(&self, page: u32) -> Result<Vec<FixupRecord>> {
        parse_records(page, self.page_records(page))
    }

    /// Apply every fixup to `image`, adding `base` at offset patch sites.
    ///
    /// `image` holds the module's data pages back to back, page `n` starting at
    /// `n * page size`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Fixup`] if a record is malformed, if a source offset lies beyond
    /// the page, or if a patch site lies beyond the image.
    pub fn relocate(&self, image: &mut [u8], base: u32) -> Result<RelocationStats> {
        let mut stats = RelocationStats::default();

        for page in 0..self.page_count() {
            let raw = self.page_records(page);
            if raw.is_empty() {
                continue;
            }

            stats.pages += 1;
            for record in parse_records(page, raw)? {
                stats.records += 1;
                log::trace!(
                    "page {:X} +{:04X}: {:?} -> {:02X}:{:08X} {:?}",
                    page,
                    record.position,
                    record.kind,
                    record.target.object,
                    record.target.offset,
                    record.sources
                );

                for &source in &record.sources {
                    self.apply(image, base, page, raw, &record, source, &mut stats)?;
                }
            }
        }

        log::debug!(
            "relocated {} records on {} pages ({} patched, {} relative, {} cross-page)",
            stats.records,
            stats.pages,
            stats.patched,
            stats.relative,
            stats.cross_page
        );

        Ok(stats)
    }

    fn apply(
        &self,
        image: &mut [u8],
        base: u32,
        page: u32,
        raw: &[u8],
        record: &FixupRecord,
        source: i16,
        stats: &mut RelocationStats,
    ) -> Result<()> {
        let Ok(source) = u32::try_from(source) else {
            stats.cross_page += 1;
            return Ok(());
        };

        if source >= self.page_size {
            return Err(fixup_error(
                page,
                raw,
                record.position,
                format!(
                    "source offset {:#X} is outside of the {:#X} byte page",
                    source, self.page_size
                ),
            ));
        }

        if record.kind == FixupKind::Relative32 {
            stats.relative += 1;
            return Ok(());
        }

        let site = u64::from(page) * u64::from(self.page_size) + u64::from(source);
        let Some(bytes) = usize::try_from(site)
            .ok()
            .and_then(|site| image.get_mut(site..site + 4))
        else {
            return Err(fixup_error(
                page,
                raw,
                record.position,
                format!("patch site {site:#X} is outside of the image"),
            ));
        };

        let value = read_le::<u32>(bytes)?;
        write_le(bytes, value.wrapping_add(base))?;
        stats.patched += 1;

        Ok(())
    }
}
