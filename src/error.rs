use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant is fatal for the analysis run that produced it. Recoverable conditions (such as
/// far branches that cannot be resolved in protected mode) are never reported through this type,
/// they are collected as [`crate::disassembler::Diagnostic`] entries instead.
///
/// # Error Categories
///
/// ## File Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a buffer
/// - [`Error::NotSupported`] - Unsupported file format or feature
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - I/O failure while reading an input file
///
/// ## Load-time Integrity Errors
/// - [`Error::Fixup`] - Malformed or unsupported relocation record
/// - [`Error::Symbol`] - Unsupported or inconsistent SYM file layout
///
/// ## Disassembly Errors
/// - [`Error::AddressOutOfRange`] - Instruction fetch outside of the loaded image
/// - [`Error::InvalidInstruction`] - Undecodable opcode bytes
/// - [`Error::UnsupportedInstruction`] - Instruction not implemented by the selected CPU model
/// - [`Error::UnsupportedFarTarget`] - Far branch operand shape without a traversal rule
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing a buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A byte was requested from an address that is not covered by the loaded image.
    ///
    /// Raised when the explorer or renderer fetches instruction bytes outside of the image,
    /// which means roots were seeded incorrectly. The whole run stops.
    #[error("offset {offset:#X} is out of range during disassembly")]
    AddressOutOfRange {
        /// The biased address that was requested
        offset: u64,
    },

    /// This file type or feature is not supported.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A fixup record could not be applied.
    ///
    /// Partially relocated images can not be disassembled safely, so this aborts loading.
    /// `dump` holds a hex dump of the record bytes starting at the offending position.
    #[error("Fixup error on page {page} at record offset {position:#X}: {message}\n{dump}")]
    Fixup {
        /// Zero based page index whose fixups failed
        page: u32,
        /// Position within the page's fixup record stream
        position: usize,
        /// What was wrong with the record
        message: String,
        /// Hex dump of the offending record bytes
        dump: String,
    },

    /// The SYM file uses a layout that is not supported or is inconsistent.
    #[error("Invalid SYM file: {0}")]
    Symbol(String),

    /// The decoder could not decode the bytes at `offset`.
    #[error("Invalid instruction at offset {offset:#X}: {bytes}")]
    InvalidInstruction {
        /// Address of the first byte of the instruction
        offset: u64,
        /// The bytes that failed to decode, as hex
        bytes: String,
    },

    /// The instruction exists, but not on the selected CPU model.
    #[error("{text} at offset {offset:#X} is not available on the {cpu}")]
    UnsupportedInstruction {
        /// Address of the first byte of the instruction
        offset: u64,
        /// CPU model used for decoding
        cpu: String,
        /// Formatted instruction
        text: String,
    },

    /// A far control transfer uses an operand shape the explorer has no rule for.
    #[error("{address} {text} -- unsupported far branch target")]
    UnsupportedFarTarget {
        /// Display address of the instruction
        address: String,
        /// Formatted instruction
        text: String,
    },

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
