use std::path::Path;

use lescope::format::{le::ObjectEntry, Executable};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_executable},
    output::{print_fields, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct ExecutableInfo {
    pub file: String,
    pub kind: String,
    pub image_base: String,
    pub image_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dos: Option<DosInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub le: Option<LeInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<ObjectInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relocation: Option<RelocationInfo>,
}

#[derive(Debug, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub address: String,
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct DosInfo {
    pub bytes_in_last_page: u16,
    pub pages: u16,
    pub relocations: u16,
    pub header_paragraphs: u16,
    pub min_alloc: u16,
    pub max_alloc: u16,
    pub ss_sp: String,
    pub cs_ip: String,
    pub relocation_table: String,
    pub overlay: u16,
}

#[derive(Debug, Serialize)]
pub struct LeInfo {
    pub lfanew: String,
    pub cpu: u16,
    pub os: u16,
    pub module_flags: String,
    pub pages: u32,
    pub page_size: String,
    pub last_page_size: String,
    pub start_object: u32,
    pub eip: String,
    pub object_table: String,
    pub fixup_page_table: String,
    pub fixup_record_table: String,
    pub data_pages: String,
    pub device_id: String,
    pub ddk_version: String,
}

#[derive(Debug, Serialize)]
pub struct ObjectInfo {
    pub index: usize,
    pub virtual_size: String,
    pub relocation_base: String,
    pub address: String,
    pub flags: String,
    pub first_page: u32,
    pub page_count: u32,
}

#[derive(Debug, Serialize)]
pub struct RelocationInfo {
    pub pages: u32,
    pub records: u32,
    pub patched: u32,
    pub relative: u32,
    pub cross_page: u32,
}

fn format_flags(object: &ObjectEntry) -> String {
    let names: Vec<&str> = object.object_flags().iter_names().map(|(name, _)| name).collect();
    if names.is_empty() {
        format!("0x{:04X}", object.flags)
    } else {
        format!("0x{:04X} {}", object.flags, names.join("|"))
    }
}

fn collect(path: &Path, exe: &Executable) -> ExecutableInfo {
    let dos = exe.dos_header().map(|dos| DosInfo {
        bytes_in_last_page: dos.cblp,
        pages: dos.cp,
        relocations: dos.crlc,
        header_paragraphs: dos.cparhdr,
        min_alloc: dos.minalloc,
        max_alloc: dos.maxalloc,
        ss_sp: format!("{:04X}:{:04X}", dos.ss, dos.sp),
        cs_ip: format!("{:04X}:{:04X}", dos.cs, dos.ip),
        relocation_table: format!("0x{:04X}", dos.lfarlc),
        overlay: dos.ovno,
    });

    let le = exe.le_header().map(|le| LeInfo {
        lfanew: format!("0x{:X}", exe.lfanew().unwrap_or_default()),
        cpu: le.cpu,
        os: le.os,
        module_flags: format!("0x{:08X}", le.mflags),
        pages: le.mpages,
        page_size: format!("0x{:X}", le.pagesize),
        last_page_size: format!("0x{:X}", le.lastpagesize),
        start_object: le.startobj,
        eip: format!("0x{:08X}", le.eip),
        object_table: format!("0x{:X}", le.objtab),
        fixup_page_table: format!("0x{:X}", le.fpagetab),
        fixup_record_table: format!("0x{:X}", le.frectab),
        data_pages: format!("0x{:X}", le.datapage),
        device_id: format!("0x{:04X}", le.devid),
        ddk_version: format!("{}.{:02}", le.ddkver >> 8, le.ddkver & 0xFF),
    });

    let objects = exe
        .objects()
        .iter()
        .zip(exe.segment_starts())
        .enumerate()
        .map(|(index, (object, address))| ObjectInfo {
            index: index + 1,
            virtual_size: format!("0x{:X}", object.virtual_size),
            relocation_base: format!("0x{:08X}", object.relocation_base),
            address: format!("0x{address:08X}"),
            flags: format_flags(object),
            first_page: object.page_map_index,
            page_count: object.page_map_entries,
        })
        .collect();

    ExecutableInfo {
        file: file_display_name(path),
        kind: exe.kind().to_string(),
        image_base: format!("0x{:08X}", exe.source().base()),
        image_size: exe.source().len(),
        entry: exe.entry_point().map(|entry| EntryInfo {
            name: entry.name.to_string(),
            address: format!("0x{:08X}", entry.offset),
            mode: entry.mode.to_string(),
        }),
        dos,
        le,
        objects,
        relocation: exe.relocation_stats().map(|stats| RelocationInfo {
            pages: stats.pages,
            records: stats.records,
            patched: stats.patched,
            relative: stats.relative,
            cross_page: stats.cross_page,
        }),
    }
}

fn display(info: &ExecutableInfo) {
    let mut fields = vec![
        ("File", info.file.clone()),
        ("Format", info.kind.clone()),
        ("Image", format!("{} (0x{:X} bytes)", info.image_base, info.image_size)),
    ];
    if let Some(entry) = &info.entry {
        fields.push((
            "Entry",
            format!("{} {} ({})", entry.name, entry.address, entry.mode),
        ));
    }
    print_fields("Executable", &fields);

    if let Some(dos) = &info.dos {
        println!();
        print_fields(
            "DOS header",
            &[
                ("Last page bytes", dos.bytes_in_last_page.to_string()),
                ("Pages", dos.pages.to_string()),
                ("Relocations", dos.relocations.to_string()),
                ("Header paragraphs", dos.header_paragraphs.to_string()),
                ("Min alloc", dos.min_alloc.to_string()),
                ("Max alloc", dos.max_alloc.to_string()),
                ("SS:SP", dos.ss_sp.clone()),
                ("CS:IP", dos.cs_ip.clone()),
                ("Relocation table", dos.relocation_table.clone()),
                ("Overlay", dos.overlay.to_string()),
            ],
        );
    }

    if let Some(le) = &info.le {
        println!();
        print_fields(
            "LE header",
            &[
                ("Offset", le.lfanew.clone()),
                ("CPU / OS", format!("{} / {}", le.cpu, le.os)),
                ("Module flags", le.module_flags.clone()),
                ("Pages", le.pages.to_string()),
                ("Page size", le.page_size.clone()),
                ("Last page size", le.last_page_size.clone()),
                ("Start object", le.start_object.to_string()),
                ("EIP", le.eip.clone()),
                ("Object table", le.object_table.clone()),
                ("Fixup page table", le.fixup_page_table.clone()),
                ("Fixup records", le.fixup_record_table.clone()),
                ("Data pages", le.data_pages.clone()),
                ("Device id", le.device_id.clone()),
                ("DDK version", le.ddk_version.clone()),
            ],
        );
    }

    if !info.objects.is_empty() {
        println!();
        println!("Objects");
        let mut table = TabWriter::new(&[
            ("#", Align::Right),
            ("Size", Align::Right),
            ("Base", Align::Left),
            ("Address", Align::Left),
            ("Pages", Align::Left),
            ("Flags", Align::Left),
        ])
        .indent("  ");
        for object in &info.objects {
            table.row(vec![
                object.index.to_string(),
                object.virtual_size.clone(),
                object.relocation_base.clone(),
                object.address.clone(),
                format!("{}+{}", object.first_page, object.page_count),
                object.flags.clone(),
            ]);
        }
        table.print();
    }

    if let Some(relocation) = &info.relocation {
        println!();
        print_fields(
            "Relocation",
            &[
                ("Pages", relocation.pages.to_string()),
                ("Records", relocation.records.to_string()),
                ("Patched", relocation.patched.to_string()),
                ("Relative", relocation.relative.to_string()),
                ("Cross page", relocation.cross_page.to_string()),
            ],
        );
    }
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let exe = load_executable(path, lescope::disassembler::DEFAULT_RELOCATION_BASE)?;
    let info = collect(path, &exe);
    print_output(&info, opts, display)
}
