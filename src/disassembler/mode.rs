//! Traversal state attached to roots and visited offsets.
//!
//! The decoder only cares about the default operand/address size. The explorer additionally
//! tracks whether it believes the code runs in protected mode, a heuristic flag that is flipped
//! whenever `CR0` is written. Both travel together as a [`CodeMode`].

use std::fmt;

/// Default operand and address size of a code region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperandWidth {
    /// 16-bit code
    Bits16,
    /// 32-bit code
    Bits32,
}

impl OperandWidth {
    /// Operand size in bytes (2 or 4)
    #[must_use]
    pub fn bytes(self) -> u8 {
        match self {
            OperandWidth::Bits16 => 2,
            OperandWidth::Bits32 => 4,
        }
    }

    /// Decoder bitness (16 or 32)
    #[must_use]
    pub fn bitness(self) -> u32 {
        match self {
            OperandWidth::Bits16 => 16,
            OperandWidth::Bits32 => 32,
        }
    }
}

/// Operand width plus the protected-mode assumption of the traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeMode {
    /// Width handed to the decoder
    pub width: OperandWidth,
    /// Whether the explorer assumes protected mode at this point. Never affects decoding.
    pub assumed_protected: bool,
}

impl CodeMode {
    /// Create a new mode
    #[must_use]
    pub fn new(width: OperandWidth, assumed_protected: bool) -> CodeMode {
        CodeMode {
            width,
            assumed_protected,
        }
    }

    /// 16-bit real-mode code, the state of a freshly reset x86
    #[must_use]
    pub fn real16() -> CodeMode {
        CodeMode::new(OperandWidth::Bits16, false)
    }

    /// 32-bit protected-mode code, the state VxD code runs in
    #[must_use]
    pub fn protected32() -> CodeMode {
        CodeMode::new(OperandWidth::Bits32, true)
    }

    /// The same width with the protected-mode assumption flipped
    #[must_use]
    pub fn toggled(self) -> CodeMode {
        CodeMode {
            width: self.width,
            assumed_protected: !self.assumed_protected,
        }
    }
}

impl fmt::Display for CodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.width.bitness())?;
        if self.assumed_protected {
            write!(f, "pm")?;
        }
        Ok(())
    }
}

/// A queued starting point of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressedRoot {
    /// Flat, relocation-biased offset
    pub offset: u32,
    /// Mode to start the walk in
    pub mode: CodeMode,
}

/// What the explorer recorded about a decoded offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitRecord {
    /// Mode the instruction was decoded in
    pub mode: CodeMode,
    /// Reached as a root or branch destination. Only ever goes from `false` to `true`.
    pub is_branch_target: bool,
}
