//! File-format layer: decode/encode between on-disk formats and
//! `AVRMEM` buffers.

pub mod anymem;
pub mod elf;
pub mod ihex;
pub mod raw;
pub mod srec;
pub mod text;

use std::path::Path;

use crate::error::{AvrError, AvrResult};
use crate::model::{AvrPart, FileFormat, Update};
use crate::urboot;

/// Sniff a file's format from its extension and leading bytes, used when
/// an `Update`'s format is `FileFormat::Auto`.
pub fn detect_format(path: &Path, contents: &[u8]) -> FileFormat {
    if contents.starts_with(b"\x7fELF") {
        return FileFormat::Elf;
    }
    if contents.first() == Some(&b':') {
        return FileFormat::IntelHex;
    }
    if contents.first() == Some(&b'#') && contents.iter().any(|b| *b == b':') {
        return FileFormat::IntelHexComment;
    }
    if contents.first() == Some(&b'S') && contents.get(1).is_some_and(u8::is_ascii_digit) {
        return FileFormat::SRecord;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("hex" | "ihx") => FileFormat::IntelHex,
        Some("srec" | "s19" | "s28" | "s37") => FileFormat::SRecord,
        Some("elf") => FileFormat::Elf,
        Some("bin" | "raw") => FileFormat::Raw,
        _ => FileFormat::Raw,
    }
}

/// `(memory name, local offset, byte)` triples produced by decoding a
/// multi-region format like Intel Hex or ELF, after projecting flat
/// addresses back onto the part's declared memories.
struct Placement<'a> {
    mem_name: &'a str,
    local_addr: u32,
    data: Vec<u8>,
}

fn project_flat_runs<'p>(runs: Vec<(u32, Vec<u8>)>) -> Vec<Placement<'p>> {
    runs.into_iter()
        .map(|(flat_addr, data)| {
            let (mem_name, local_addr) = anymem::from_flat(flat_addr);
            Placement { mem_name, local_addr, data }
        })
        .collect()
}

/// Read `update.filename` and apply it to `part`'s memories in place,
/// marking every touched byte `Tag::ALLOCATED`.
///
/// A filename of the form `urboot:<feature string>` is not a path at all:
/// it's synthesized by the urboot bootloader generator instead of being
/// read off disk.
pub fn read_update(update: &Update, part: &mut AvrPart) -> AvrResult<()> {
    if let Some(feature_string) = update.filename.to_str().filter(|s| s.starts_with("urboot:")) {
        let catalogue = urboot::built_in_catalogue();
        let (offset, image) = urboot::generate(part, feature_string, &catalogue)?;
        let flash_name = part
            .find_mem_like(|m| m.is_flash_like())
            .map(|m| m.name.to_string())
            .ok_or_else(|| AvrError::unsupported("part has no flash memory"))?;
        return apply_single_memory(part, &flash_name, offset, &image);
    }

    let format = resolve_format(update)?;
    match format {
        FileFormat::Raw | FileFormat::Binary => {
            let contents = std::fs::read(&update.filename).map_err(|e| AvrError::file(e.to_string()))?;
            apply_single_memory(part, &update.memtype, 0, &raw::decode(&contents))
        }
        FileFormat::Decimal | FileFormat::Hex | FileFormat::Octal => {
            let contents = std::fs::read_to_string(&update.filename).map_err(|e| AvrError::file(e.to_string()))?;
            let radix = match format {
                FileFormat::Decimal => text::Radix::Decimal,
                FileFormat::Hex => text::Radix::Hex,
                FileFormat::Octal => text::Radix::Octal,
                _ => unreachable!(),
            };
            let data = text::decode(&contents, radix)?;
            apply_single_memory(part, &update.memtype, 0, &data)
        }
        FileFormat::Immediate => {
            let spec = update
                .filename
                .to_str()
                .ok_or_else(|| AvrError::file("immediate value spec is not valid UTF-8"))?;
            let data = text::decode_immediate(spec)?;
            apply_single_memory(part, &update.memtype, 0, &data)
        }
        FileFormat::IntelHex => {
            let contents = std::fs::read_to_string(&update.filename).map_err(|e| AvrError::file(e.to_string()))?;
            let runs = ihex::decode(&contents)?;
            apply_flat_runs(part, runs)
        }
        FileFormat::IntelHexComment => {
            let contents = std::fs::read_to_string(&update.filename).map_err(|e| AvrError::file(e.to_string()))?;
            let runs = ihex::decode_lenient(&contents)?;
            apply_flat_runs(part, runs)
        }
        FileFormat::SRecord => {
            let contents = std::fs::read_to_string(&update.filename).map_err(|e| AvrError::file(e.to_string()))?;
            let runs = srec::decode(&contents)?;
            apply_flat_runs(part, runs)
        }
        FileFormat::Elf => {
            let contents = std::fs::read(&update.filename).map_err(|e| AvrError::file(e.to_string()))?;
            let segs = elf::decode(&contents)?;
            let runs = segs.into_iter().map(|s| (s.addr, s.data)).collect();
            apply_flat_runs(part, runs)
        }
        FileFormat::Auto => unreachable!("resolved by resolve_format"),
    }
}

fn resolve_format(update: &Update) -> AvrResult<FileFormat> {
    if update.format != FileFormat::Auto {
        return Ok(update.format);
    }
    let contents = std::fs::read(&update.filename).map_err(|e| AvrError::file(e.to_string()))?;
    Ok(detect_format(&update.filename, &contents))
}

fn apply_single_memory(part: &mut AvrPart, mem_name: &str, base: u32, data: &[u8]) -> AvrResult<()> {
    let mem = part
        .find_mem_mut(mem_name)
        .ok_or_else(|| AvrError::not_found(format!("memory {mem_name:?}")))?;
    let start = base as usize;
    let end = start + data.len();
    if end > mem.buf.len() {
        return Err(AvrError::file(format!(
            "file content ({} bytes at offset {}) does not fit memory {:?} (size {})",
            data.len(),
            start,
            mem.name,
            mem.buf.len()
        )));
    }
    mem.buf[start..end].copy_from_slice(data);
    mem.mark_allocated(start..end);
    Ok(())
}

fn apply_flat_runs(part: &mut AvrPart, runs: Vec<(u32, Vec<u8>)>) -> AvrResult<()> {
    for placement in project_flat_runs(runs) {
        apply_single_memory(part, placement.mem_name, placement.local_addr, &placement.data)?;
    }
    Ok(())
}

/// Serialize `part`'s memory named by `update.memtype` back out to
/// `update.filename` in the requested format.
pub fn write_update(update: &Update, part: &AvrPart) -> AvrResult<()> {
    let mem = part
        .find_mem(&update.memtype)
        .ok_or_else(|| AvrError::not_found(format!("memory {:?}", update.memtype)))?;
    let format = if update.format == FileFormat::Auto { FileFormat::IntelHex } else { update.format };
    let base = anymem::to_flat(&mem.name, 0);

    let text_or_bytes: Vec<u8> = match format {
        FileFormat::Raw | FileFormat::Binary => raw::encode(&mem.buf),
        FileFormat::Decimal => text::encode_decimal(&mem.buf).into_bytes(),
        FileFormat::IntelHex => ihex::encode(base, &mem.buf).into_bytes(),
        FileFormat::IntelHexComment => ihex::encode_commented(base, &mem.buf).into_bytes(),
        FileFormat::SRecord => srec::encode(base, &mem.buf).into_bytes(),
        other => return Err(AvrError::unsupported(format!("cannot write memory contents as {other:?}"))),
    };
    std::fs::write(&update.filename, text_or_bytes).map_err(|e| AvrError::file(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AvrMem, Op};
    use std::io::Write;

    fn part_with_flash(size: usize) -> AvrPart {
        let mut part = AvrPart::new("m328p", "ATmega328P");
        part.mem.push(AvrMem::new("flash", size));
        part
    }

    #[test]
    fn raw_update_marks_allocated_bytes() {
        let mut part = part_with_flash(8);
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[1, 2, 3, 4]).unwrap();
        let update = Update::new("flash", Op::Write, f.path(), FileFormat::Raw);
        read_update(&update, &mut part).unwrap();
        let mem = part.find_mem("flash").unwrap();
        assert_eq!(&mem.buf[0..4], &[1, 2, 3, 4]);
        assert!(mem.is_allocated(0));
        assert!(!mem.is_allocated(5));
    }

    #[test]
    fn ihex_update_projects_through_flat_address_space() {
        let mut part = part_with_flash(8);
        let text = ihex::encode(0, &[9, 9, 9]);
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        let update = Update::new("flash", Op::Write, f.path(), FileFormat::IntelHex);
        read_update(&update, &mut part).unwrap();
        assert_eq!(&part.find_mem("flash").unwrap().buf[0..3], &[9, 9, 9]);
    }

    #[test]
    fn detect_format_sniffs_intel_hex_colon() {
        assert_eq!(detect_format(Path::new("x.bin"), b":1000"), FileFormat::IntelHex);
    }

    #[test]
    fn urboot_pseudo_filename_routes_to_the_generator() {
        let mut part = AvrPart::new("atmega328p", "ATmega328P");
        part.mem.push(AvrMem::new("flash", 32 * 1024));
        let update = Update::new("flash", Op::Write, "urboot:16MHz_uart0_115200_ee_ce", FileFormat::Auto);
        read_update(&update, &mut part).unwrap();
        let mem = part.find_mem("flash").unwrap();
        assert!(mem.buf.iter().enumerate().any(|(i, _)| mem.is_allocated(i)));
    }

    #[test]
    fn ihxc_checksum_mismatch_is_a_warning_not_fatal() {
        let mut part = part_with_flash(8);
        let text = ":0100000000AA\n:00000001FF\n";
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        let update = Update::new("flash", Op::Write, f.path(), FileFormat::IntelHexComment);
        assert!(read_update(&update, &mut part).is_ok());
    }
}
