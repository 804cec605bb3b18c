//! Hex formatting of raw bytes for diagnostics.

use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;

/// Render `data` as a classic hex dump, 16 bytes per line.
///
/// Each line holds the address of its first byte, the bytes in lower-case hex and the
/// printable ASCII characters (others shown as `.`). `addr` is the address of `data[0]`.
///
/// ```rust,ignore
/// let dump = hex_dump(0x10, &[0x07, 0x00, 0x41]);
/// assert!(dump.starts_with("0010  07 00 41"));
/// ```
#[must_use]
pub fn hex_dump(addr: u64, data: &[u8]) -> String {
    let mut out = String::new();

    for (line, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        let _ = write!(out, "{:04X} ", addr + (line * BYTES_PER_LINE) as u64);
        for byte in chunk {
            let _ = write!(out, " {byte:02x}");
        }
        for _ in chunk.len()..BYTES_PER_LINE {
            out.push_str("   ");
        }
        out.push_str("  ");
        out.extend(chunk.iter().map(|&b| {
            if (b' '..0x7F).contains(&b) {
                char::from(b)
            } else {
                '.'
            }
        }));
        out.push('\n');
    }

    out
}

/// Upper-case hex of `data` separated by spaces, e.g. `"0F 22 C0"`.
#[must_use]
pub fn hex_bytes(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_partial_line() {
        let dump = hex_dump(0x20, &[0x07, 0x00, 0x41, 0x7F]);
        let expected = format!("0020  07 00 41 7f{}  ..A.\n", "   ".repeat(12));
        assert_eq!(dump, expected);
    }

    #[test]
    fn multiple_lines() {
        let data: Vec<u8> = (0x30..0x48).collect();
        let dump = hex_dump(0, &data);
        let lines: Vec<&str> = dump.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000  30 31 32"));
        assert!(lines[0].ends_with("  0123456789:;<=>?"));
        assert!(lines[1].starts_with("0010  40 41"));
        assert!(lines[1].ends_with("  @ABCDEFG"));
    }

    #[test]
    fn empty() {
        assert_eq!(hex_dump(0, &[]), "");
        assert_eq!(hex_bytes(&[]), "");
    }

    #[test]
    fn bytes() {
        assert_eq!(hex_bytes(&[0x0F, 0x22, 0xC0]), "0F 22 C0");
    }
}
