//! Cosmetic `segment:offset` addresses for the listing.
//!
//! Flat offsets are mapped back to a synthetic segmented address purely for display. 16-bit code
//! derives a real-mode style segment from the high word, 32-bit code uses the 1-based index of the
//! last registered segment start at or below the offset.

use std::fmt;

use crate::disassembler::mode::OperandWidth;

/// Ordered segment base offsets
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SegmentMap {
    starts: Vec<u32>,
}

impl SegmentMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> SegmentMap {
        SegmentMap::default()
    }

    /// Register the start of a segment
    pub fn add_start(&mut self, start: u32) {
        self.starts.push(start);
    }

    /// Registered starts in insertion order
    #[must_use]
    pub fn starts(&self) -> &[u32] {
        &self.starts
    }

    /// Segmented form of `offset` as seen by code of the given `width`
    #[must_use]
    pub fn address(&self, offset: u32, width: OperandWidth) -> SegmentedAddress {
        match width {
            OperandWidth::Bits16 => SegmentedAddress {
                segment: ((offset >> 16) << 12) as u16,
                offset: offset & 0xFFFF,
                width,
            },
            OperandWidth::Bits32 => {
                let mut segment = 0;
                for (index, start) in self.starts.iter().enumerate() {
                    if offset >= *start {
                        segment = (index + 1) as u16;
                    }
                }

                SegmentedAddress {
                    segment,
                    offset,
                    width,
                }
            }
        }
    }
}

/// A `segment:offset` pair, printed as `SSSS:OOOO` or `SSSS:OOOOOOOO`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentedAddress {
    /// Segment or segment index
    pub segment: u16,
    /// Offset within the segment
    pub offset: u32,
    /// Determines the printed offset width and wrap around
    pub width: OperandWidth,
}

impl SegmentedAddress {
    /// The address `count` bytes further, wrapping within a 16-bit segment
    #[must_use]
    pub fn advance(self, count: u32) -> SegmentedAddress {
        let offset = match self.width {
            OperandWidth::Bits16 => self.offset.wrapping_add(count) & 0xFFFF,
            OperandWidth::Bits32 => self.offset.wrapping_add(count),
        };

        SegmentedAddress { offset, ..self }
    }
}

impl fmt::Display for SegmentedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = usize::from(self.width.bytes()) * 2;
        let text = format!("{:04X}:{:0digits$X}", self.segment, self.offset);
        f.pad(&text)
    }
}
