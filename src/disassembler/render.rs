//! Listing output.
//!
//! The [`Renderer`] walks the explorer's visited map in address order. Every visited offset is
//! decoded again and printed as an instruction line; the bytes between two instructions are
//! printed as `DB` rows, or summarized when the gap is too large to be worth dumping.
//!
//! ```text
//!     Entry:
//! 0001:80001000          CD2001000100     INT     0x20    ; VxdCall 0x0001,0x0001 VMM Get_Cur_VM_Handle
//! 0001:80001006          C3               RET
//!     lab_80001007:
//!     DB  0x41,0x42,0x00  ; 80001007 'AB\x00'
//! ```

use std::io::Write;

use crate::{
    disassembler::{decoder::DecodedInstruction, explorer::label_name, Explorer},
    Result,
};

/// Listing layout settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Gaps larger than this many bytes are summarized instead of dumped
    pub skip_threshold: u32,
    /// Bytes per `DB` row and per instruction byte line
    pub bytes_per_row: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            skip_threshold: 0x100,
            bytes_per_row: 8,
        }
    }
}

/// Prints the result of an [`Explorer`] run
pub struct Renderer<'a, 'b> {
    explorer: &'b Explorer<'a>,
    options: RenderOptions,
}

impl<'a, 'b> Renderer<'a, 'b> {
    /// Create a renderer over a finished exploration
    #[must_use]
    pub fn new(explorer: &'b Explorer<'a>, options: RenderOptions) -> Renderer<'a, 'b> {
        Renderer { explorer, options }
    }

    /// Write the listing to `out`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if writing fails, and decoder or out of range errors
    /// if the image changed since exploration.
    pub fn render<W: Write>(&self, out: &mut W) -> Result<()> {
        let source = self.explorer.source();
        let mut last = u64::from(source.base());

        for (&offset, record) in self.explorer.visited() {
            if u64::from(offset) > last {
                self.render_gap(out, last as u32, (u64::from(offset) - last) as u32)?;
            }

            let mut instr = self
                .explorer
                .decoder()
                .decode_at(source, offset, record.mode.width)?;

            if record.is_branch_target || self.explorer.labels().contains_key(&offset) {
                self.render_label(out, offset)?;
            }

            let mut annotation = None;
            if let Some(trailing) = self.explorer.service_call_trailing(&instr, record.mode) {
                let bytes = source.bytes(u64::from(instr.next_offset()), trailing as usize)?;
                annotation = self
                    .explorer
                    .service_call()
                    .and_then(|service_call| service_call.annotate(bytes));
                instr.bytes.extend_from_slice(bytes);
            }

            self.render_instruction(out, &instr)?;
            if let Some(annotation) = annotation {
                out.write_all(annotation.as_bytes())?;
            }
            writeln!(out)?;

            last = u64::from(offset) + instr.bytes.len() as u64;
        }

        Ok(())
    }

    /// Render the listing into a string.
    ///
    /// # Errors
    /// See [`Renderer::render`].
    pub fn render_to_string(&self) -> Result<String> {
        let mut out = Vec::new();
        self.render(&mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn render_label<W: Write>(&self, out: &mut W, offset: u32) -> Result<()> {
        let name = self
            .explorer
            .label_for(offset)
            .unwrap_or_else(|| label_name(offset));
        writeln!(out, "\t{name}:")?;
        Ok(())
    }

    fn render_instruction<W: Write>(&self, out: &mut W, instr: &DecodedInstruction) -> Result<()> {
        let per_row = self.options.bytes_per_row.max(1);
        let address = self.explorer.segments().address(instr.offset, instr.width);

        for (row, chunk) in instr.bytes.chunks(per_row).enumerate() {
            if row > 0 {
                writeln!(out)?;
            }
            write!(out, "{:22} ", address.advance((row * per_row) as u32))?;
            for byte in chunk {
                write!(out, "{byte:02X}")?;
            }
        }

        let used = instr.bytes.len() % per_row;
        if used != 0 {
            for _ in used..per_row {
                out.write_all(b"  ")?;
            }
        }

        let label = instr
            .relative_target()
            .and_then(|target| self.explorer.label_for(target));
        write!(out, " {}", instr.format(label.as_deref()))?;
        Ok(())
    }

    fn render_gap<W: Write>(&self, out: &mut W, offset: u32, size: u32) -> Result<()> {
        self.render_label(out, offset)?;

        if size > self.options.skip_threshold {
            writeln!(out, "; Skipping 0x{size:X} bytes")?;
            return Ok(());
        }

        let source = self.explorer.source();
        let bytes = source.bytes(u64::from(offset), size as usize)?;
        let per_row = self.options.bytes_per_row.max(1);

        for (row, chunk) in bytes.chunks(per_row).enumerate() {
            out.write_all(b"\tDB")?;
            for (index, byte) in chunk.iter().enumerate() {
                let separator = if index == 0 { '\t' } else { ',' };
                write!(out, "{separator}0x{byte:02X}")?;
            }

            let row_offset = offset as usize + row * per_row;
            write!(out, "\t; {row_offset:06X} '")?;
            for &byte in chunk {
                if (0x20..=0x7F).contains(&byte) {
                    write!(out, "{}", char::from(byte))?;
                } else {
                    write!(out, "\\x{byte:02X}")?;
                }
            }
            writeln!(out, "'")?;
        }

        Ok(())
    }
}
