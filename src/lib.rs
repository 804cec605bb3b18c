// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # lescope
//!
//! A control flow directed disassembler for legacy x86 code: DOS programs, boot loaders, flat
//! firmware images and Windows 3.x/9x virtual device drivers (VxDs) in the Linear Executable
//! format.
//!
//! Instead of sweeping linearly through an image, `lescope` starts from a set of roots and only
//! decodes what is reachable through jumps, calls and conditional branches. Everything in
//! between is shown as data. The walk tracks the operand width and whether protected mode is
//! believed to be enabled, so the mixed 16/32-bit start-up code of a boot loader is decoded
//! in the mode the CPU would actually be in.
//!
//! ## Features
//!
//! - **LE loader** - DOS stub, LE header, object table and fixup records, relocated to a
//!   configurable base
//! - **SYM files** - MAPSYM symbol files turned into labels or additional roots
//! - **Mode tracking** - `MOV CR0` toggles protected mode, far jumps switch segments in real mode
//! - **VxD service calls** - `INT 20h` inline data is skipped and annotated with device and
//!   service names
//! - **CPU gating** - reject instructions the selected processor does not implement
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lescope::{
//!     disassembler::{AnalysisOptions, Explorer, Renderer},
//!     format::Executable,
//! };
//! use std::path::Path;
//!
//! let options = AnalysisOptions::default();
//! let exe = Executable::load(Path::new("VMM.386"), options.relocation_base)?;
//!
//! let mut explorer = Explorer::new(exe.source(), &options);
//! exe.seed(&mut explorer);
//! explorer.analyze()?;
//!
//! let renderer = Renderer::new(&explorer, options.render);
//! renderer.render(&mut std::io::stdout())?;
//! # Ok::<(), lescope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - Input files, the [`Parser`] cursor and the [`ByteSource`] image view
//! - [`format`] - DOS and LE headers and the [`format::Executable`] front-end
//! - [`relocation`] - LE fixup records and image relocation
//! - [`symbols`] - `.SYM` symbol file parsing
//! - [`disassembler`] - Decoding, exploration and listing output
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Structural problems in input files are
//! reported as [`Error::Malformed`], [`Error::Fixup`] or [`Error::Symbol`]; problems found while
//! walking code as [`Error::InvalidInstruction`], [`Error::UnsupportedInstruction`] or
//! [`Error::AddressOutOfRange`].

#[macro_use]
pub(crate) mod error;

#[cfg(test)]
pub(crate) mod test;

/// Input files and binary reading primitives.
pub mod file;

/// Executable headers and the loading front-end.
pub mod format;

/// Linear Executable fixups.
pub mod relocation;

/// MAPSYM symbol files.
pub mod symbols;

/// Control flow directed x86 disassembly.
pub mod disassembler;

/// Shared formatting helpers.
pub mod utils;

/// `lescope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `lescope` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use lescope::{format::Executable, Error};
///
/// match Executable::load(std::path::Path::new("BROKEN.386"), 0x8000_1000) {
///     Ok(exe) => println!("Loaded {} file", exe.kind()),
///     Err(Error::Fixup { page, message, .. }) => println!("Fixup on page {page}: {message}"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {message}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;

/// Low-level file access.
///
/// # Example
///
/// ```rust
/// use lescope::Parser;
///
/// let data = [0x4C, 0x45, 0x00, 0x00];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_le::<u16>()?, 0x454C);
/// # Ok::<(), lescope::Error>(())
/// ```
pub use file::{parser::Parser, source::ByteSource, File};
