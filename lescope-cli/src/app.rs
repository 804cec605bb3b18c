use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// lescope - control flow directed disassembler for DOS programs and LE/VxD drivers
#[derive(Debug, Parser)]
#[command(name = "lescope", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    ///
    /// The JSON goes to stdout. Warnings, such as far branch targets that could not be
    /// followed, are still logged to stderr.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the DOS header, LE header and object table of an executable.
    Info {
        /// Path to the executable.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Dump the segments and symbols of a MAPSYM .SYM file.
    Symbols {
        /// Path to the .SYM file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// LE module the symbols belong to; adds the relocated address of every symbol.
        #[arg(long, value_name = "FILE")]
        exe: Option<PathBuf>,

        /// Relocation base used with --exe (hex like 0x80001000 or decimal).
        #[arg(long, value_name = "ADDR")]
        base: Option<String>,
    },

    /// Disassemble the code reachable from the entry point, symbols and extra roots.
    Disasm(DisasmArgs),
}

#[derive(Debug, Args)]
pub struct DisasmArgs {
    /// Path to the executable or raw image.
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// CPU model whose instruction set is accepted (i8088 .. i80586).
    #[arg(long, default_value = "i80386")]
    pub cpu: String,

    /// Load address for LE modules and raw images (hex like 0x80001000 or decimal).
    #[arg(long, value_name = "ADDR")]
    pub base: Option<String>,

    /// Treat the input as a flat image without headers.
    #[arg(long)]
    pub raw: bool,

    /// MAPSYM .SYM file with symbols for the module.
    #[arg(long, value_name = "FILE")]
    pub sym: Option<PathBuf>,

    /// Also start exploring at every symbol from --sym.
    #[arg(long, requires = "sym")]
    pub symbol_roots: bool,

    /// Additional root, e.g. 0x7C00:16=boot or 0x80001234:32:pm (repeatable).
    #[arg(long, value_name = "ADDR[:16|:32][:pm][=NAME]")]
    pub root: Vec<String>,

    /// Name an address without exploring it, e.g. 0x80001000=Init (repeatable).
    #[arg(long, value_name = "ADDR=NAME")]
    pub label: Vec<String>,

    /// Do not start at the entry point from the file header.
    #[arg(long)]
    pub no_entry: bool,

    /// Treat every INT as a plain instruction.
    #[arg(long)]
    pub no_service_calls: bool,

    /// Interrupt vector of VxD service calls.
    #[arg(long, value_name = "N", default_value = "0x20")]
    pub service_vector: String,

    /// Data gaps larger than this many bytes are summarized.
    #[arg(long, value_name = "N", default_value = "0x100")]
    pub skip_threshold: String,
}
