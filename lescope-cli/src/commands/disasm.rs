use std::{
    io::{self, BufWriter, Write},
    sync::Arc,
};

use anyhow::{bail, Context};
use lescope::{
    disassembler::{
        AnalysisOptions, CodeMode, CpuModel, Explorer, OperandWidth, RenderOptions, Renderer,
        ServiceCall, VxdServiceCall, DEFAULT_RELOCATION_BASE,
    },
    format::ExecutableKind,
};
use log::info;
use serde::Serialize;

use crate::{
    app::{DisasmArgs, GlobalOptions},
    commands::common::{file_display_name, load_executable, load_raw, load_symbols, parse_number},
    output::print_output,
};

/// A `--root` argument
#[derive(Debug, PartialEq, Eq)]
pub struct RootArg {
    pub offset: u32,
    pub mode: CodeMode,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DisasmReport {
    pub file: String,
    pub kind: String,
    pub base: String,
    pub cpu: String,
    pub decoded: u64,
    pub roots_queued: u64,
    pub visited: usize,
    pub labels: usize,
    pub diagnostics: Vec<String>,
    pub listing: String,
}

/// Parse `ADDR[:16|:32][:pm][=NAME]`.
///
/// Without modifiers the root gets `default`; with modifiers it runs in real mode unless `pm`
/// is given.
pub fn parse_root(arg: &str, default: CodeMode) -> anyhow::Result<RootArg> {
    let (location, name) = match arg.split_once('=') {
        Some((location, name)) if !name.is_empty() => (location, Some(name.to_string())),
        Some(_) => bail!("empty root name in '{arg}'"),
        None => (arg, None),
    };

    let mut parts = location.split(':');
    let offset = parse_number(parts.next().unwrap_or_default())?;

    let mut mode = default;
    let mut modifiers = false;
    let mut protected = false;
    for part in parts {
        modifiers = true;
        match part.to_ascii_lowercase().as_str() {
            "16" => mode.width = OperandWidth::Bits16,
            "32" => mode.width = OperandWidth::Bits32,
            "pm" => protected = true,
            "rm" => protected = false,
            other => bail!("unknown root modifier '{other}' in '{arg}'"),
        }
    }
    if modifiers {
        mode.assumed_protected = protected;
    }

    Ok(RootArg { offset, mode, name })
}

/// Parse `ADDR=NAME`.
pub fn parse_label(arg: &str) -> anyhow::Result<(u32, String)> {
    match arg.split_once('=') {
        Some((address, name)) if !name.is_empty() => Ok((parse_number(address)?, name.to_string())),
        _ => bail!("expected ADDR=NAME, got '{arg}'"),
    }
}

fn analysis_options(args: &DisasmArgs, base: u32) -> anyhow::Result<AnalysisOptions> {
    let cpu: CpuModel = args
        .cpu
        .parse()
        .with_context(|| format!("unknown CPU model: {}", args.cpu))?;

    let service_call: Option<Arc<dyn ServiceCall>> = if args.no_service_calls {
        None
    } else {
        let vector = u8::try_from(parse_number(&args.service_vector)?)
            .with_context(|| format!("service vector out of range: {}", args.service_vector))?;
        Some(Arc::new(VxdServiceCall::with_vector(vector)))
    };

    Ok(AnalysisOptions {
        cpu,
        relocation_base: base,
        service_call,
        render: RenderOptions {
            skip_threshold: parse_number(&args.skip_threshold)?,
            ..RenderOptions::default()
        },
    })
}

pub fn run(args: &DisasmArgs, opts: &GlobalOptions) -> anyhow::Result<()> {
    let base = args.base.as_deref().map(parse_number).transpose()?;
    let exe = if args.raw {
        load_raw(&args.path, base.unwrap_or(0))?
    } else {
        load_executable(&args.path, base.unwrap_or(DEFAULT_RELOCATION_BASE))?
    };
    let options = analysis_options(args, exe.relocation_base())?;

    let mut explorer = Explorer::new(exe.source(), &options);
    if args.no_entry {
        for start in exe.segment_starts() {
            explorer.add_segment_start(start);
        }
    } else {
        exe.seed(&mut explorer);
    }

    if let Some(sym) = &args.sym {
        let symbols = load_symbols(sym)?;
        for symbol in symbols.symbols() {
            let address = exe.symbol_address(symbol)?;
            if args.symbol_roots {
                explorer.add_root(address, CodeMode::protected32(), Some(&symbol.name));
            } else {
                explorer.add_label(address, symbol.name.clone());
            }
        }
        info!(
            "{} symbols of module {} from {}",
            symbols.symbol_count(),
            symbols.module_name,
            file_display_name(sym)
        );
    }

    for label in &args.label {
        let (offset, name) = parse_label(label)?;
        explorer.add_label(offset, name);
    }

    let default_mode = if exe.kind() == ExecutableKind::Le {
        CodeMode::protected32()
    } else {
        CodeMode::real16()
    };
    for root in &args.root {
        let root = parse_root(root, default_mode)?;
        explorer.add_root(root.offset, root.mode, root.name.as_deref());
    }

    if explorer.pending() == 0 {
        bail!("nothing to disassemble: no entry point and no --root given");
    }

    explorer
        .analyze()
        .with_context(|| format!("failed to disassemble {}", args.path.display()))?;

    let renderer = Renderer::new(&explorer, options.render);
    if opts.json {
        let stats = explorer.stats();
        let report = DisasmReport {
            file: file_display_name(&args.path),
            kind: exe.kind().to_string(),
            base: format!("0x{:08X}", exe.source().base()),
            cpu: options.cpu.to_string(),
            decoded: stats.decoded,
            roots_queued: stats.roots_queued,
            visited: explorer.visited().len(),
            labels: explorer.labels().len(),
            diagnostics: explorer.diagnostics().iter().map(ToString::to_string).collect(),
            listing: renderer.render_to_string()?,
        };
        return print_output(&report, opts, |_| {});
    }

    let stdout = io::stdout();
    let mut w = BufWriter::new(stdout.lock());
    renderer.render(&mut w)?;
    w.flush()?;
    Ok(())
}
