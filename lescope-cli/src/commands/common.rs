use std::path::Path;

use anyhow::Context;
use lescope::{format::Executable, symbols::SymbolFile};

/// Load and, for LE modules, relocate an executable.
pub fn load_executable(path: &Path, base: u32) -> anyhow::Result<Executable> {
    Executable::load(path, base)
        .with_context(|| format!("failed to load executable: {}", path.display()))
}

/// Load a file as a headerless image at `base`.
pub fn load_raw(path: &Path, base: u32) -> anyhow::Result<Executable> {
    Executable::load_raw(path, base)
        .with_context(|| format!("failed to read image: {}", path.display()))
}

/// Load a MAPSYM symbol file.
pub fn load_symbols(path: &Path) -> anyhow::Result<SymbolFile> {
    SymbolFile::load(path)
        .with_context(|| format!("failed to load symbol file: {}", path.display()))
}

/// Parse a number supporting hex (0x...) and decimal.
pub fn parse_number(s: &str) -> anyhow::Result<u32> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).with_context(|| format!("invalid hex number: {s}"))
    } else {
        trimmed
            .parse::<u32>()
            .with_context(|| format!("invalid number: {s}"))
    }
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
