//! Fixup record decoding.
//!
//! A page's fixup records are a packed byte stream. Each record starts with a source byte
//! (address type nibble plus flags) and a target byte (target flags), followed either by one
//! source offset and the target, or by a source count, the target and the source offset list.
//! Only internal references with 32-bit offset or 32-bit EIP-relative sources are supported.

use bitflags::bitflags;

use crate::{file::parser::Parser, utils::hex_dump, Error, Result};

bitflags! {
    #[derive(PartialEq, Debug, Clone, Copy)]
    /// Flags in the high nibble of the source byte
    pub struct SourceFlags: u8 {
        /// The fixup targets a 16:16 alias of the object
        const ALIAS_16_16 = 0x10;
        /// The record carries a list of source offsets instead of a single one
        const SOURCE_LIST = 0x20;
    }
}

bitflags! {
    #[derive(PartialEq, Debug, Clone, Copy)]
    /// Flags of the target byte
    pub struct TargetFlags: u8 {
        /// The target offset is stored as 32 bits instead of 16
        const TARGET_OFFSET_32 = 0x10;
    }
}

const SOURCE_TYPE_MASK: u8 = 0x0F;

/// The kind of location a fixup patches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupKind {
    /// 32-bit absolute offset, the load base is added at the patch site
    Offset32,
    /// 32-bit displacement relative to EIP, already correct in the image
    Relative32,
}

impl FixupKind {
    fn from_source(source: u8) -> Option<FixupKind> {
        match source & SOURCE_TYPE_MASK {
            7 => Some(FixupKind::Offset32),
            8 => Some(FixupKind::Relative32),
            _ => None,
        }
    }
}

/// Object and offset a fixup refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixupTarget {
    /// 1-based object number
    pub object: u8,
    /// Offset within the object
    pub offset: u32,
}

/// A decoded fixup record: one target, one or more patch sites in the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixupRecord {
    /// Position of the record within the page's record stream
    pub position: usize,
    /// How the patch sites are fixed up
    pub kind: FixupKind,
    /// Referenced object/offset
    pub target: FixupTarget,
    /// Page relative patch sites. Negative offsets belong to a fixup that begins on the
    /// previous page.
    pub sources: Vec<i16>,
}

/// Decode all fixup records of one page.
///
/// # Arguments
/// * `page` - Zero based page index, used for diagnostics
/// * `records` - The page's slice of the fixup record table
///
/// # Errors
/// Returns [`crate::Error::Fixup`] for unsupported address or relocation types and for
/// records that run past the end of `records`.
pub fn parse_records(page: u32, records: &[u8]) -> Result<Vec<FixupRecord>> {
    let mut parser = Parser::new(records);
    let mut result = Vec::new();

    while parser.has_more_data() {
        let position = parser.pos();
        let record = parse_record(&mut parser, position)
            .map_err(|message| fixup_error(page, records, position, message))?;
        result.push(record);
    }

    Ok(result)
}

fn parse_record(parser: &mut Parser, position: usize) -> std::result::Result<FixupRecord, String> {
    let truncated = |_: Error| "record runs past the end of the fixup record stream".to_string();

    let source = parser.read_le::<u8>().map_err(truncated)?;
    let target_flags = parser.read_le::<u8>().map_err(truncated)?;

    let Some(kind) = FixupKind::from_source(source) else {
        return Err(format!(
            "Unsupported addressType {:02X} ({:04b}`{:04b})",
            source,
            source >> 4,
            source & 0xF
        ));
    };

    let source_flags = SourceFlags::from_bits_truncate(source);
    if source_flags.contains(SourceFlags::ALIAS_16_16) {
        return Err(format!(
            "Unsupported addressType {source:02X}, 16:16 alias fixups are not supported"
        ));
    }

    let Some(target_flags) = TargetFlags::from_bits(target_flags) else {
        return Err(format!(
            "Unsupported relocationType {:02X} ({:04b}`{:04b})",
            target_flags,
            target_flags >> 4,
            target_flags & 0xF
        ));
    };

    let read_target = |parser: &mut Parser| -> Result<FixupTarget> {
        let object = parser.read_le::<u8>()?;
        let offset = if target_flags.contains(TargetFlags::TARGET_OFFSET_32) {
            parser.read_le::<u32>()?
        } else {
            u32::from(parser.read_le::<u16>()?)
        };
        Ok(FixupTarget { object, offset })
    };

    let (target, sources) = if source_flags.contains(SourceFlags::SOURCE_LIST) {
        let count = parser.read_le::<u8>().map_err(truncated)?;
        let target = read_target(parser).map_err(truncated)?;
        let sources = (0..count)
            .map(|_| parser.read_le::<i16>())
            .collect::<Result<Vec<_>>>()
            .map_err(truncated)?;
        (target, sources)
    } else {
        let source = parser.read_le::<i16>().map_err(truncated)?;
        (read_target(parser).map_err(truncated)?, vec![source])
    };

    Ok(FixupRecord {
        position,
        kind,
        target,
        sources,
    })
}

pub(crate) fn fixup_error(page: u32, records: &[u8], position: usize, message: String) -> Error {
    let start = position.min(records.len());
    let end = (start + 16).min(records.len());

    Error::Fixup {
        page,
        position,
        message,
        dump: hex_dump(0, &records[start..end]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_source() {
        #[rustfmt::skip]
        let data = [
            0x07,       // source = OFS32
            0x00,       // target flags = 16-bit offset
            0x10, 0x00, // source offset = 0x10
            0x01,       // object = 1
            0x34, 0x12, // target offset = 0x1234
            0x08,       // source = REL32
            0x10,       // target flags = 32-bit offset
            0xFE, 0xFF, // source offset = -2
            0x02,       // object = 2
            0x78, 0x56, 0x34, 0x12, // target offset = 0x12345678
        ];

        let records = parse_records(0, &data).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].position, 0);
        assert_eq!(records[0].kind, FixupKind::Offset32);
        assert_eq!(
            records[0].target,
            FixupTarget {
                object: 1,
                offset: 0x1234
            }
        );
        assert_eq!(records[0].sources, vec![0x10]);

        assert_eq!(records[1].position, 7);
        assert_eq!(records[1].kind, FixupKind::Relative32);
        assert_eq!(records[1].target.offset, 0x1234_5678);
        assert_eq!(records[1].sources, vec![-2]);
    }

    #[test]
    fn source_list() {
        #[rustfmt::skip]
        let data = [
            0x27,       // source = OFS32 | SOURCE_LIST
            0x00,       // target flags
            0x03,       // count = 3
            0x01,       // object = 1
            0x00, 0x20, // target offset = 0x2000
            0x00, 0x00, // source 0
            0x08, 0x00, // source 8
            0xFC, 0x0F, // source 0xFFC
        ];

        let records = parse_records(3, &data).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sources, vec![0, 8, 0xFFC]);
        assert_eq!(records[0].target.offset, 0x2000);
    }

    #[test]
    fn unsupported_address_type() {
        // 0x05 = 16-bit offset
        let data = [0x05, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        match parse_records(1, &data) {
            Err(Error::Fixup {
                page,
                position,
                message,
                dump,
            }) => {
                assert_eq!(page, 1);
                assert_eq!(position, 0);
                assert!(message.contains("addressType 05"));
                assert!(dump.starts_with("0000  05 00 00 00 01 00 00"));
            }
            other => panic!("Expected fixup error, got {other:?}"),
        }
    }

    #[test]
    fn alias_rejected() {
        let data = [0x17, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        assert!(matches!(
            parse_records(0, &data),
            Err(Error::Fixup { .. })
        ));
    }

    #[test]
    fn unsupported_relocation_type() {
        // 0x04 = additive fixup
        let data = [0x07, 0x04, 0x00, 0x00, 0x01, 0x00, 0x00];
        match parse_records(0, &data) {
            Err(Error::Fixup { message, .. }) => {
                assert!(message.contains("relocationType 04"));
            }
            other => panic!("Expected fixup error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_record() {
        let data = [0x07, 0x00, 0x10, 0x00, 0x01, 0x34, 0x12, 0x07, 0x00, 0x10];
        match parse_records(0, &data) {
            Err(Error::Fixup {
                position, dump, ..
            }) => {
                assert_eq!(position, 7);
                assert!(dump.starts_with("0000  07 00 10"));
            }
            other => panic!("Expected fixup error, got {other:?}"),
        }
    }
}
