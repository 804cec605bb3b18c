use std::path::Path;

use lescope::disassembler::DEFAULT_RELOCATION_BASE;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_executable, load_symbols, parse_number},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct SymbolReport {
    pub file: String,
    pub module: String,
    pub entry_segment: u16,
    pub segments: Vec<SegmentInfo>,
}

#[derive(Debug, Serialize)]
pub struct SegmentInfo {
    pub number: u16,
    pub name: String,
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Serialize)]
pub struct SymbolInfo {
    pub offset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub name: String,
}

fn display(report: &SymbolReport) {
    println!("Module {} ({})", report.module, report.file);

    for segment in &report.segments {
        println!();
        println!(
            "Segment {} {} ({} symbols)",
            segment.number,
            segment.name,
            segment.symbols.len()
        );
        if segment.symbols.is_empty() {
            continue;
        }

        let with_address = segment.symbols.iter().any(|s| s.address.is_some());
        let mut columns = vec![("Offset", Align::Left)];
        if with_address {
            columns.push(("Address", Align::Left));
        }
        columns.push(("Name", Align::Left));

        let mut table = TabWriter::new(&columns).indent("  ");
        for symbol in &segment.symbols {
            let mut row = vec![symbol.offset.clone()];
            if with_address {
                row.push(symbol.address.clone().unwrap_or_default());
            }
            row.push(symbol.name.clone());
            table.row(row);
        }
        table.print();
    }
}

pub fn run(
    path: &Path,
    exe: Option<&Path>,
    base: Option<&str>,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let file = load_symbols(path)?;

    let base = base.map(parse_number).transpose()?;
    let exe = exe
        .map(|exe| load_executable(exe, base.unwrap_or(DEFAULT_RELOCATION_BASE)))
        .transpose()?;

    let mut segments = Vec::with_capacity(file.segments.len());
    for segment in &file.segments {
        let mut symbols = Vec::with_capacity(segment.symbols.len());
        for symbol in &segment.symbols {
            let address = match &exe {
                Some(exe) => Some(format!("0x{:08X}", exe.symbol_address(symbol)?)),
                None => None,
            };
            symbols.push(SymbolInfo {
                offset: format!("0x{:08X}", symbol.offset),
                address,
                name: symbol.name.clone(),
            });
        }
        segments.push(SegmentInfo {
            number: segment.number,
            name: segment.name.clone(),
            symbols,
        });
    }

    let report = SymbolReport {
        file: file_display_name(path),
        module: file.module_name.clone(),
        entry_segment: file.entry_segment,
        segments,
    };
    print_output(&report, opts, display)
}
