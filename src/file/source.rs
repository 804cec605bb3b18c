//! Base-biased, bounds-checked view over a loaded image.
//!
//! A [`crate::file::source::ByteSource`] owns the bytes the explorer and renderer disassemble
//! (either a raw file or the relocated module image) together with the address the first byte
//! lives at. All addresses handed to it are biased by that base, and every access outside
//! `base..base + len` fails with [`crate::Error::AddressOutOfRange`].
//!
//! # Example
//!
//! ```rust
//! use lescope::ByteSource;
//!
//! let source = ByteSource::new(vec![0xCD, 0x20, 0x01, 0x00, 0x01, 0x00], 0x8000_1000);
//! assert_eq!(source.get_u8(0x8000_1000)?, 0xCD);
//! assert_eq!(source.read_u16(0x8000_1002)?, 0x0001);
//! assert!(source.get_u8(0x8000_1006).is_err());
//! # Ok::<(), lescope::Error>(())
//! ```

use crate::{file::io::read_le, Error::AddressOutOfRange, Result};

/// Bounds-checked byte buffer mapped at a fixed base address.
#[derive(Debug, Clone)]
pub struct ByteSource {
    data: Vec<u8>,
    base: u32,
}

impl ByteSource {
    /// Create a source whose first byte lives at address `base`.
    #[must_use]
    pub fn new(data: Vec<u8>, base: u32) -> Self {
        ByteSource { data, base }
    }

    /// Address of the first byte.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Address one past the last byte.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.base) + self.data.len() as u64
    }

    /// Number of bytes in the image.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the image has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if `offset` addresses a byte of the image.
    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        offset >= u64::from(self.base) && offset < self.end()
    }

    /// The unbiased image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Fetch the byte at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::AddressOutOfRange`] if `offset` is outside the image.
    pub fn get_u8(&self, offset: u64) -> Result<u8> {
        let index = self.index(offset)?;
        Ok(self.data[index])
    }

    /// Read a little-endian `u16` at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::AddressOutOfRange`] if any byte is outside the image.
    pub fn read_u16(&self, offset: u64) -> Result<u16> {
        read_le::<u16>(self.bytes(offset, 2)?)
    }

    /// Read a little-endian `u32` at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::AddressOutOfRange`] if any byte is outside the image.
    pub fn read_u32(&self, offset: u64) -> Result<u32> {
        read_le::<u32>(self.bytes(offset, 4)?)
    }

    /// Borrow `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::AddressOutOfRange`] naming the first address that is outside
    /// the image.
    pub fn bytes(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let start = self.index(offset)?;
        let end = start + len;
        if end > self.data.len() {
            return Err(AddressOutOfRange {
                offset: self.end().max(offset),
            });
        }

        Ok(&self.data[start..end])
    }

    fn index(&self, offset: u64) -> Result<usize> {
        if !self.contains(offset) {
            return Err(AddressOutOfRange { offset });
        }

        usize::try_from(offset - u64::from(self.base)).map_err(|_| AddressOutOfRange { offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn biased_access() {
        let source = ByteSource::new(vec![0xEB, 0xFE, 0x34, 0x12, 0x78, 0x56], 0x1000);

        assert_eq!(source.base(), 0x1000);
        assert_eq!(source.end(), 0x1006);
        assert_eq!(source.len(), 6);
        assert_eq!(source.get_u8(0x1000).unwrap(), 0xEB);
        assert_eq!(source.read_u16(0x1002).unwrap(), 0x1234);
        assert_eq!(source.read_u32(0x1002).unwrap(), 0x5678_1234);
        assert_eq!(source.bytes(0x1004, 2).unwrap(), &[0x78, 0x56]);
    }

    #[test]
    fn out_of_range() {
        let source = ByteSource::new(vec![0x90; 4], 0x100);

        assert!(matches!(
            source.get_u8(0xFF),
            Err(Error::AddressOutOfRange { offset: 0xFF })
        ));
        assert!(matches!(
            source.get_u8(0x104),
            Err(Error::AddressOutOfRange { offset: 0x104 })
        ));
        assert!(matches!(
            source.read_u32(0x102),
            Err(Error::AddressOutOfRange { offset: 0x104 })
        ));
        assert!(!source.contains(0x104));
        assert!(source.contains(0x103));
    }

    #[test]
    fn top_of_address_space() {
        let source = ByteSource::new(vec![0xC3; 2], 0xFFFF_FFFE);

        assert_eq!(source.end(), 0x1_0000_0000);
        assert_eq!(source.get_u8(0xFFFF_FFFF).unwrap(), 0xC3);
        assert!(source.get_u8(0x1_0000_0000).is_err());
    }
}
