//! Small formatting helpers shared across the crate.

mod hexdump;

pub use hexdump::{hex_bytes, hex_dump};
