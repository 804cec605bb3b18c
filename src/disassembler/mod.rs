//! Control flow directed x86 disassembler.
//!
//! This module turns a loaded image into a labelled listing. It covers 16- and 32-bit code in
//! real and protected mode, including the mixed-mode start-up code of boot loaders and the
//! `INT 20h` service calls of Windows VxDs.
//!
//! # Key Types
//! - [`Explorer`] - Walks the reachable code from a set of roots
//! - [`Renderer`] - Prints the explored code and the data gaps between it
//! - [`InstructionDecoder`] - Single instruction decoding with CPU model gating
//! - [`CodeMode`] - Operand width plus the protected-mode assumption
//! - [`ServiceCall`] - Pluggable inline-data interrupt convention
//!
//! # Example
//! ```rust
//! use lescope::{
//!     disassembler::{AnalysisOptions, CodeMode, Explorer, Renderer},
//!     ByteSource,
//! };
//!
//! let source = ByteSource::new(vec![0xEB, 0x00], 0); // jmp short +0
//! let options = AnalysisOptions::default();
//!
//! let mut explorer = Explorer::new(&source, &options);
//! explorer.add_root(0, CodeMode::real16(), None);
//! explorer.analyze()?;
//!
//! let listing = Renderer::new(&explorer, options.render).render_to_string()?;
//! assert!(listing.starts_with("\tlab_000000:\n"));
//! # Ok::<(), lescope::Error>(())
//! ```

mod address;
mod decoder;
mod explorer;
mod mode;
mod render;
mod servicecall;

use std::sync::Arc;

pub use address::{SegmentMap, SegmentedAddress};
pub use decoder::{CpuModel, DecodedInstruction, InstructionDecoder, Mnemonic, Operand};
pub use explorer::{label_name, Diagnostic, Explorer, ExplorerStats};
pub use mode::{AddressedRoot, CodeMode, OperandWidth, VisitRecord};
pub use render::{RenderOptions, Renderer};
pub use servicecall::{
    vmm_service_name, vxd_name, ServiceCall, VxdServiceCall, VMM_DEVICE_ID, VXD_CALL_VECTOR,
};

/// Default load address LE modules are relocated to
pub const DEFAULT_RELOCATION_BASE: u32 = 0x8000_1000;

/// Settings of one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Instruction set accepted by the decoder
    pub cpu: CpuModel,
    /// Address LE modules are relocated to
    pub relocation_base: u32,
    /// Inline-data interrupt convention, `None` to treat every `INT` as a plain instruction
    pub service_call: Option<Arc<dyn ServiceCall>>,
    /// Listing layout
    pub render: RenderOptions,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            cpu: CpuModel::default(),
            relocation_base: DEFAULT_RELOCATION_BASE,
            service_call: Some(Arc::new(VxdServiceCall::default())),
            render: RenderOptions::default(),
        }
    }
}
