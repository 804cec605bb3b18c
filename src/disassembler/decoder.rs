//! x86 instruction decoding for the explorer and the renderer.
//!
//! Decoding is delegated to `iced-x86`. This module adapts it to the explorer's needs: bytes are
//! pulled through a fetch callback so that reads past the image surface as
//! [`crate::Error::AddressOutOfRange`], the operands are reduced to the handful of shapes the
//! traversal rules look at, and instructions the selected [`CpuModel`] does not implement are
//! rejected.
//!
//! # Example
//!
//! ```rust
//! use lescope::disassembler::{CpuModel, InstructionDecoder, Mnemonic, OperandWidth};
//!
//! let code = [0xEB, 0xFE]; // jmp $
//! let decoder = InstructionDecoder::new(CpuModel::I80386);
//! let instr = decoder.decode(0x100, OperandWidth::Bits16, |at| {
//!     code.get((at - 0x100) as usize)
//!         .copied()
//!         .ok_or(lescope::Error::AddressOutOfRange { offset: at })
//! })?;
//! assert_eq!(instr.mnemonic, Mnemonic::Jmp);
//! assert_eq!(instr.relative_target(), Some(0x100));
//! # Ok::<(), lescope::Error>(())
//! ```

use iced_x86::{
    Code, CpuidFeature, Decoder, DecoderError, DecoderOptions, Formatter, FormatterOutput,
    FormatterTextKind, Instruction, IntelFormatter, OpKind, Register,
};
use strum::{Display, EnumIter, EnumString};

use crate::{
    disassembler::mode::OperandWidth, file::source::ByteSource, utils::hex_bytes, Error, Result,
};

/// Longest possible x86 instruction
pub const MAX_INSTRUCTION_LENGTH: usize = 15;

const PREFIXES: [u8; 11] = [
    0x26, 0x2E, 0x36, 0x3E, 0x64, 0x65, 0x66, 0x67, 0xF0, 0xF2, 0xF3,
];

/// The processor whose instruction set is accepted
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, EnumString, Display, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum CpuModel {
    /// Intel 8088
    I8088,
    /// Intel 8086
    I8086,
    /// Intel 80186
    I80186,
    /// Intel 80286
    I80286,
    /// Intel 80386SX
    I80386sx,
    /// Intel 80386
    #[default]
    I80386,
    /// Intel 80486
    I80486,
    /// Intel Pentium
    I80586,
}

impl CpuModel {
    fn generation(self) -> u8 {
        match self {
            CpuModel::I8088 | CpuModel::I8086 => 0,
            CpuModel::I80186 => 1,
            CpuModel::I80286 => 2,
            CpuModel::I80386sx | CpuModel::I80386 => 3,
            CpuModel::I80486 => 4,
            CpuModel::I80586 => 5,
        }
    }
}

/// Generation of a model that cannot run any instruction
const NO_GENERATION: u8 = u8::MAX;

fn feature_generation(feature: CpuidFeature) -> u8 {
    match feature {
        CpuidFeature::INTEL8086 | CpuidFeature::INTEL8086_ONLY | CpuidFeature::FPU => 0,
        CpuidFeature::INTEL186 => 1,
        CpuidFeature::INTEL286
        | CpuidFeature::INTEL286_ONLY
        | CpuidFeature::FPU287
        | CpuidFeature::FPU287XL_ONLY => 2,
        CpuidFeature::INTEL386
        | CpuidFeature::INTEL386_ONLY
        | CpuidFeature::INTEL386_A0_ONLY
        | CpuidFeature::FPU387
        | CpuidFeature::FPU387SL_ONLY => 3,
        CpuidFeature::INTEL486 | CpuidFeature::INTEL486_A_ONLY | CpuidFeature::CPUID => 4,
        CpuidFeature::TSC | CpuidFeature::MSR | CpuidFeature::CX8 | CpuidFeature::SMM => 5,
        // MMX, SSE, SYSCALL and later extensions
        _ => NO_GENERATION,
    }
}

/// Coarse instruction class, as far as control flow is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    /// `MOV`, including moves to and from control registers
    Mov,
    /// `INT imm8`
    Int,
    /// Near jump
    Jmp,
    /// Far jump, direct or through memory
    JmpFar,
    /// Near call
    Call,
    /// Far call, direct or through memory
    CallFar,
    /// Conditional jump, including `JCXZ`/`JECXZ`
    Jcc,
    /// `LOOP`, `LOOPE`, `LOOPNE`
    Loop,
    /// Near return
    Ret,
    /// Far return
    Retf,
    /// `IRET`/`IRETD`
    Iret,
    /// Anything else, falls through to the next instruction
    Other,
}

/// Operand shapes the traversal distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// General purpose or segment register
    Register(Register),
    /// `CRn`
    ControlRegister(u8),
    /// Memory reference
    Memory,
    /// Immediate value
    Immediate(u64),
    /// Displacement relative to the next instruction
    Relative {
        /// Sign extended displacement
        displacement: i32,
        /// Encoded width of the displacement in bytes (1, 2 or 4)
        width: u8,
    },
    /// `ptr16:16`
    Far16 {
        /// Segment or selector
        selector: u16,
        /// Offset
        offset: u16,
    },
    /// `ptr16:32`
    Far32 {
        /// Selector
        selector: u16,
        /// Offset
        offset: u32,
    },
}

/// A decoded instruction at a flat offset
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    /// Flat offset of the first byte
    pub offset: u32,
    /// Width it was decoded with
    pub width: OperandWidth,
    /// Raw instruction bytes
    pub bytes: Vec<u8>,
    /// Control flow class
    pub mnemonic: Mnemonic,
    /// Explicit operands
    pub operands: Vec<Operand>,
    instruction: Instruction,
}

impl DecodedInstruction {
    /// Length of the instruction in bytes
    #[must_use]
    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Always `false`, decoded instructions are at least one byte long
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset of the instruction that follows
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset.wrapping_add(self.len())
    }

    /// First explicit operand
    #[must_use]
    pub fn first_operand(&self) -> Option<&Operand> {
        self.operands.first()
    }

    /// Destination of a relative branch, `next + displacement` without segment wrap around
    #[must_use]
    pub fn relative_target(&self) -> Option<u32> {
        match self.first_operand() {
            Some(Operand::Relative { displacement, .. }) => {
                Some(self.next_offset().wrapping_add(*displacement as u32))
            }
            _ => None,
        }
    }

    /// `MOV CR0, reg`
    #[must_use]
    pub fn writes_cr0(&self) -> bool {
        self.mnemonic == Mnemonic::Mov
            && matches!(self.first_operand(), Some(Operand::ControlRegister(0)))
    }

    /// The vector of an `INT imm8`
    #[must_use]
    pub fn interrupt_vector(&self) -> Option<u8> {
        match (self.mnemonic, self.first_operand()) {
            (Mnemonic::Int, Some(Operand::Immediate(vector))) => Some((*vector & 0xFF) as u8),
            _ => None,
        }
    }

    /// The underlying `iced-x86` instruction
    #[must_use]
    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    /// Intel syntax text without label substitution
    #[must_use]
    pub fn text(&self) -> String {
        self.format(None)
    }

    /// Intel syntax text. When `target_label` is given it replaces the printed branch target.
    #[must_use]
    pub fn format(&self, target_label: Option<&str>) -> String {
        let mut formatter = IntelFormatter::new();
        let options = formatter.options_mut();
        options.set_uppercase_mnemonics(true);
        options.set_uppercase_registers(true);
        options.set_uppercase_keywords(true);
        options.set_uppercase_prefixes(true);
        options.set_uppercase_hex(true);
        options.set_hex_prefix("0x");
        options.set_hex_suffix("");
        options.set_space_after_operand_separator(true);
        options.set_branch_leading_zeros(false);
        options.set_show_branch_size(false);

        let mut output = TextOutput {
            text: String::new(),
            target_label,
            after_mnemonic: false,
        };
        formatter.format(&self.instruction, &mut output);

        if target_label.is_none() {
            if let Some(target) = self.relative_target() {
                // The formatter computes 16-bit targets modulo 64K, print the flat one instead
                output.replace_branch_target(target);
            }
        }

        output.text
    }
}

struct TextOutput<'a> {
    text: String,
    target_label: Option<&'a str>,
    after_mnemonic: bool,
}

impl TextOutput<'_> {
    fn replace_branch_target(&mut self, target: u32) {
        if let Some(position) = self.text.rfind("0x") {
            self.text.truncate(position);
            self.text.push_str(&format!("0x{target:X}"));
        }
    }
}

impl FormatterOutput for TextOutput<'_> {
    fn write(&mut self, text: &str, kind: FormatterTextKind) {
        match kind {
            FormatterTextKind::Mnemonic => {
                self.text.push_str(text);
                self.after_mnemonic = true;
                return;
            }
            FormatterTextKind::LabelAddress | FormatterTextKind::FunctionAddress => {
                if let Some(label) = self.target_label {
                    self.text.push_str(label);
                    self.after_mnemonic = false;
                    return;
                }
            }
            FormatterTextKind::Text if self.after_mnemonic && text.trim().is_empty() => {
                self.text.push('\t');
                self.after_mnemonic = false;
                return;
            }
            _ => {}
        }

        self.after_mnemonic = false;
        self.text.push_str(text);
    }
}

/// Decodes single instructions for a fixed CPU model
#[derive(Debug, Clone, Copy, Default)]
pub struct InstructionDecoder {
    cpu: CpuModel,
}

impl InstructionDecoder {
    /// Create a decoder accepting the instruction set of `cpu`
    #[must_use]
    pub fn new(cpu: CpuModel) -> InstructionDecoder {
        InstructionDecoder { cpu }
    }

    /// The accepted CPU model
    #[must_use]
    pub fn cpu(&self) -> CpuModel {
        self.cpu
    }

    /// Decode one instruction from `source` at the flat `offset`.
    ///
    /// # Errors
    /// See [`InstructionDecoder::decode`].
    pub fn decode_at(
        &self,
        source: &ByteSource,
        offset: u32,
        width: OperandWidth,
    ) -> Result<DecodedInstruction> {
        self.decode(offset, width, |at| source.get_u8(at))
    }

    /// Decode one instruction at `offset`, pulling bytes through `fetch`.
    ///
    /// Up to 15 bytes are fetched ahead; a failing fetch only matters if the instruction
    /// actually extends into the failing byte.
    ///
    /// ## Arguments
    /// * 'offset' - Flat offset of the first byte
    /// * 'width'  - Default operand and address size
    /// * 'fetch'  - Returns the byte at a flat offset
    ///
    /// # Errors
    /// Returns the fetch error if the instruction runs into unreadable bytes,
    /// [`crate::Error::InvalidInstruction`] for undefined opcodes and
    /// [`crate::Error::UnsupportedInstruction`] if the CPU model lacks the instruction.
    pub fn decode<F>(&self, offset: u32, width: OperandWidth, mut fetch: F) -> Result<DecodedInstruction>
    where
        F: FnMut(u64) -> Result<u8>,
    {
        let mut buffer = Vec::with_capacity(MAX_INSTRUCTION_LENGTH);
        let mut fetch_error = None;
        for index in 0..MAX_INSTRUCTION_LENGTH as u64 {
            match fetch(u64::from(offset) + index) {
                Ok(byte) => buffer.push(byte),
                Err(error) => {
                    fetch_error = Some(error);
                    break;
                }
            }
        }

        let ip = match width {
            OperandWidth::Bits16 => u64::from(offset & 0xFFFF),
            OperandWidth::Bits32 => u64::from(offset),
        };

        let mut decoder = Decoder::with_ip(width.bitness(), &buffer, ip, DecoderOptions::NONE);
        let instruction = decoder.decode();
        if instruction.is_invalid() {
            if decoder.last_error() == DecoderError::NoMoreBytes {
                if let Some(error) = fetch_error {
                    return Err(error);
                }
            }

            return Err(Error::InvalidInstruction {
                offset: u64::from(offset),
                bytes: hex_bytes(&buffer),
            });
        }

        let bytes = buffer[..instruction.len()].to_vec();
        let operands = (0..instruction.op_count())
            .map(|index| convert_operand(&instruction, index, &bytes))
            .collect();

        let decoded = DecodedInstruction {
            offset,
            width,
            mnemonic: classify(&instruction),
            operands,
            bytes,
            instruction,
        };

        let required = decoded
            .instruction
            .cpuid_features()
            .iter()
            .map(|feature| feature_generation(*feature))
            .max()
            .unwrap_or(0);
        if required > self.cpu.generation() {
            return Err(Error::UnsupportedInstruction {
                offset: u64::from(offset),
                cpu: self.cpu.to_string(),
                text: decoded.text(),
            });
        }

        Ok(decoded)
    }
}

fn classify(instruction: &Instruction) -> Mnemonic {
    use iced_x86::Mnemonic as M;

    let far = matches!(
        instruction.op0_kind(),
        OpKind::FarBranch16 | OpKind::FarBranch32
    ) || matches!(
        instruction.code(),
        Code::Jmp_m1616 | Code::Jmp_m1632 | Code::Call_m1616 | Code::Call_m1632
    );

    match instruction.mnemonic() {
        M::Mov => Mnemonic::Mov,
        M::Int => Mnemonic::Int,
        M::Jmp if far => Mnemonic::JmpFar,
        M::Jmp => Mnemonic::Jmp,
        M::Call if far => Mnemonic::CallFar,
        M::Call => Mnemonic::Call,
        M::Jo
        | M::Jno
        | M::Jb
        | M::Jae
        | M::Je
        | M::Jne
        | M::Jbe
        | M::Ja
        | M::Js
        | M::Jns
        | M::Jp
        | M::Jnp
        | M::Jl
        | M::Jge
        | M::Jle
        | M::Jg
        | M::Jcxz
        | M::Jecxz => Mnemonic::Jcc,
        M::Loop | M::Loope | M::Loopne => Mnemonic::Loop,
        M::Ret => Mnemonic::Ret,
        M::Retf => Mnemonic::Retf,
        M::Iret | M::Iretd => Mnemonic::Iret,
        _ => Mnemonic::Other,
    }
}

fn convert_operand(instruction: &Instruction, index: u32, bytes: &[u8]) -> Operand {
    match instruction.op_kind(index) {
        OpKind::Register => {
            let register = instruction.op_register(index);
            if register.is_cr() {
                Operand::ControlRegister((register as u32 - Register::CR0 as u32) as u8)
            } else {
                Operand::Register(register)
            }
        }
        kind @ (OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64) => {
            let width = displacement_width(bytes, kind);
            Operand::Relative {
                displacement: displacement(bytes, width),
                width,
            }
        }
        OpKind::FarBranch16 => Operand::Far16 {
            selector: instruction.far_branch_selector(),
            offset: instruction.far_branch16(),
        },
        OpKind::FarBranch32 => Operand::Far32 {
            selector: instruction.far_branch_selector(),
            offset: instruction.far_branch32(),
        },
        OpKind::Immediate8
        | OpKind::Immediate8_2nd
        | OpKind::Immediate16
        | OpKind::Immediate32
        | OpKind::Immediate64
        | OpKind::Immediate8to16
        | OpKind::Immediate8to32
        | OpKind::Immediate8to64
        | OpKind::Immediate32to64 => Operand::Immediate(instruction.immediate(index)),
        _ => Operand::Memory,
    }
}

fn displacement_width(bytes: &[u8], kind: OpKind) -> u8 {
    let opcode = bytes.iter().copied().find(|byte| !PREFIXES.contains(byte));
    match opcode {
        Some(0xEB | 0x70..=0x7F | 0xE0..=0xE3) => 1,
        _ if kind == OpKind::NearBranch16 => 2,
        _ => 4,
    }
}

// Relative displacements are always the trailing bytes of the encoding
fn displacement(bytes: &[u8], width: u8) -> i32 {
    let tail = &bytes[bytes.len().saturating_sub(usize::from(width))..];
    match *tail {
        [b0] => i32::from(b0 as i8),
        [b0, b1] => i32::from(i16::from_le_bytes([b0, b1])),
        [b0, b1, b2, b3] => i32::from_le_bytes([b0, b1, b2, b3]),
        _ => 0,
    }
}
