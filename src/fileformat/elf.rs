//! Minimal 32-bit ELF reader: walk `PT_LOAD` segments (or, failing that,
//! `SHT_PROGBITS` sections with `SHF_ALLOC`) and return their load
//! addresses and bytes.
//!
//! AVR ELF is little-endian; AVR32 ELF is big-endian, so we read
//! `e_ident[EI_DATA]` rather than assuming one.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{AvrError, AvrResult};

const EI_NIDENT: usize = 16;
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;
const PT_LOAD: u32 = 1;
const SHT_PROGBITS: u32 = 1;
const SHF_ALLOC: u32 = 0x2;

#[derive(Clone, Copy)]
enum Endian {
    Little,
    Big,
}

fn u16_at(buf: &[u8], off: usize, e: Endian) -> AvrResult<u16> {
    let s = buf.get(off..off + 2).ok_or_else(|| AvrError::file("ELF: truncated header"))?;
    Ok(match e {
        Endian::Little => LittleEndian::read_u16(s),
        Endian::Big => BigEndian::read_u16(s),
    })
}

fn u32_at(buf: &[u8], off: usize, e: Endian) -> AvrResult<u32> {
    let s = buf.get(off..off + 4).ok_or_else(|| AvrError::file("ELF: truncated header"))?;
    Ok(match e {
        Endian::Little => LittleEndian::read_u32(s),
        Endian::Big => BigEndian::read_u32(s),
    })
}

/// One loadable region: its link/load address and raw bytes.
pub struct LoadSegment {
    pub addr: u32,
    pub data: Vec<u8>,
}

pub fn decode(buf: &[u8]) -> AvrResult<Vec<LoadSegment>> {
    if buf.len() < EI_NIDENT + 36 || &buf[0..4] != b"\x7fELF" {
        return Err(AvrError::file("not an ELF file"));
    }
    if buf[4] != ELFCLASS32 {
        return Err(AvrError::unsupported("only 32-bit ELF is supported"));
    }
    let endian = match buf[5] {
        ELFDATA2LSB => Endian::Little,
        ELFDATA2MSB => Endian::Big,
        other => return Err(AvrError::file(format!("ELF: unknown data encoding {other}"))),
    };

    let e_phoff = u32_at(buf, EI_NIDENT + 12, endian)? as usize;
    let e_shoff = u32_at(buf, EI_NIDENT + 16, endian)? as usize;
    let e_phentsize = u16_at(buf, EI_NIDENT + 26, endian)? as usize;
    let e_phnum = u16_at(buf, EI_NIDENT + 28, endian)? as usize;
    let e_shentsize = u16_at(buf, EI_NIDENT + 30, endian)? as usize;
    let e_shnum = u16_at(buf, EI_NIDENT + 32, endian)? as usize;

    let mut segments = Vec::new();

    for i in 0..e_phnum {
        let base = e_phoff + i * e_phentsize;
        let p_type = u32_at(buf, base, endian)?;
        if p_type != PT_LOAD {
            continue;
        }
        let p_offset = u32_at(buf, base + 4, endian)? as usize;
        let p_paddr = u32_at(buf, base + 12, endian)?;
        let p_filesz = u32_at(buf, base + 16, endian)? as usize;
        if p_filesz == 0 {
            continue;
        }
        let data = buf
            .get(p_offset..p_offset + p_filesz)
            .ok_or_else(|| AvrError::file("ELF: program header points past end of file"))?
            .to_vec();
        segments.push(LoadSegment { addr: p_paddr, data });
    }

    if !segments.is_empty() {
        return Ok(segments);
    }

    // No program headers (common in unlinked .o-style ELF produced by some
    // toolchains): fall back to allocatable PROGBITS sections.
    for i in 0..e_shnum {
        let base = e_shoff + i * e_shentsize;
        let sh_type = u32_at(buf, base + 4, endian)?;
        let sh_flags = u32_at(buf, base + 8, endian)?;
        if sh_type != SHT_PROGBITS || sh_flags & SHF_ALLOC == 0 {
            continue;
        }
        let sh_addr = u32_at(buf, base + 12, endian)?;
        let sh_offset = u32_at(buf, base + 16, endian)? as usize;
        let sh_size = u32_at(buf, base + 20, endian)? as usize;
        if sh_size == 0 {
            continue;
        }
        let data = buf
            .get(sh_offset..sh_offset + sh_size)
            .ok_or_else(|| AvrError::file("ELF: section header points past end of file"))?
            .to_vec();
        segments.push(LoadSegment { addr: sh_addr, data });
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_elf_le(phdrs: &[(u32, u32, u32, u32)]) -> Vec<u8> {
        // e_ident + a fixed-size Ehdr, then one Phdr per entry, then data.
        let ehdr_size = 52usize;
        let phdr_size = 32usize;
        let data_off = ehdr_size + phdrs.len() * phdr_size;
        let mut buf = vec![0u8; data_off];
        buf[0..4].copy_from_slice(b"\x7fELF");
        buf[4] = ELFCLASS32;
        buf[5] = ELFDATA2LSB;
        LittleEndian::write_u32(&mut buf[EI_NIDENT + 12..], ehdr_size as u32); // e_phoff
        LittleEndian::write_u16(&mut buf[EI_NIDENT + 26..], phdr_size as u16); // e_phentsize
        LittleEndian::write_u16(&mut buf[EI_NIDENT + 28..], phdrs.len() as u16); // e_phnum

        for (i, (p_type, p_offset, p_paddr, p_filesz)) in phdrs.iter().enumerate() {
            let base = ehdr_size + i * phdr_size;
            LittleEndian::write_u32(&mut buf[base..], *p_type);
            LittleEndian::write_u32(&mut buf[base + 4..], *p_offset);
            LittleEndian::write_u32(&mut buf[base + 12..], *p_paddr);
            LittleEndian::write_u32(&mut buf[base + 16..], *p_filesz);
        }
        buf
    }

    #[test]
    fn reads_single_pt_load_segment() {
        let payload = vec![0xDEu8, 0xAD, 0xBE, 0xEF];
        let mut buf = minimal_elf_le(&[(PT_LOAD, 52, 0x0, payload.len() as u32)]);
        buf.extend_from_slice(&payload);
        let segs = decode(&buf).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].addr, 0);
        assert_eq!(segs[0].data, payload);
    }

    #[test]
    fn rejects_non_elf_files() {
        assert!(decode(b"not an elf").is_err());
    }
}
