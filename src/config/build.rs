//! Converts the raw parsed AST into typed `AvrPart`/`Programmer` values.
//!
//! This is where required-field checks, the paged-size invariant, and the
//! `devicecode` → `stk500_devcode` deprecation are enforced.

use std::path::Path;

use crate::error::{AvrError, AvrResult, SourceLoc};
use crate::model::{AvrMem, AvrPart, OpKind, Opcode, PinDef, Programmer, ProgModes, ProgType};

use super::parser::{PropValue, RawBlock, RawFile, RawMemory, RawPart, RawProgrammer, RawProp};

fn loc(file: &Path, line: usize) -> SourceLoc {
    SourceLoc { file: file.to_path_buf(), line }
}

fn fatal(file: &Path, line: usize, msg: impl Into<String>) -> AvrError {
    AvrError::config(loc(file, line), msg)
}

fn find<'a>(props: &'a [RawProp], key: &str) -> Option<&'a RawProp> {
    props.iter().rev().find(|p| p.key == key)
}

fn require<'a>(props: &'a [RawProp], key: &str, file: &Path, line: usize) -> AvrResult<&'a RawProp> {
    find(props, key).ok_or_else(|| fatal(file, line, format!("missing required property {key:?}")))
}

fn prop_str(p: &RawProp, file: &Path) -> AvrResult<String> {
    p.first()
        .and_then(PropValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| fatal(file, p.line, format!("property {:?} must be a string", p.key)))
}

fn prop_int(p: &RawProp, file: &Path) -> AvrResult<u64> {
    p.first()
        .and_then(PropValue::as_int)
        .ok_or_else(|| fatal(file, p.line, format!("property {:?} must be an integer", p.key)))
}

fn prop_bool(p: &RawProp, file: &Path) -> AvrResult<bool> {
    match p.first() {
        Some(PropValue::Ident(s)) if s == "yes" || s == "true" => Ok(true),
        Some(PropValue::Ident(s)) if s == "no" || s == "false" => Ok(false),
        _ => Err(fatal(file, p.line, format!("property {:?} must be yes/no", p.key))),
    }
}

fn prop_int_list(p: &RawProp, file: &Path) -> AvrResult<Vec<u64>> {
    p.values
        .iter()
        .map(|v| v.as_int().ok_or_else(|| fatal(file, p.line, format!("property {:?} values must be integers", p.key))))
        .collect()
}

/// Build a `Config` from every block in `file`.
pub fn build_file(raw: RawFile, file: &Path) -> AvrResult<crate::model::Config> {
    let mut cfg = crate::model::Config::new();
    for block in raw.blocks {
        match block {
            RawBlock::Programmer(p) => cfg.programmers.push(build_programmer(p, file)?),
            RawBlock::Part(p) => cfg.parts.push(build_part(p, file)?),
        }
    }
    Ok(cfg)
}

fn build_programmer(raw: RawProgrammer, file: &Path) -> AvrResult<Programmer> {
    let id_prop = require(&raw.props, "id", file, raw.line)?;
    let id = prop_str(id_prop, file)?;
    let desc = find(&raw.props, "desc").map(|p| prop_str(p, file)).transpose()?.unwrap_or_default();
    let mut prog = Programmer::new(&id, &desc);

    if let Some(p) = find(&raw.props, "id") {
        for v in &p.values[1..] {
            if let PropValue::Str(alias) = v {
                prog.aliases.push(crate::intern::intern(alias));
            }
        }
    }

    let type_prop = require(&raw.props, "type", file, raw.line)?;
    for v in &type_prop.values {
        let name = v.as_ident().ok_or_else(|| fatal(file, type_prop.line, "type values must be identifiers"))?;
        prog.prog_type |= parse_prog_type(name).ok_or_else(|| {
            fatal(file, type_prop.line, format!("unknown programmer type {name:?}"))
        })?;
    }

    if let Some(p) = find(&raw.props, "baudrate") {
        prog.baudrate = Some(prop_int(p, file)? as u32);
    }
    if let Some(p) = find(&raw.props, "bitclock") {
        prog.bitclock_hz = Some(prop_int(p, file)? as u32);
    }
    if let Some(p) = find(&raw.props, "stk500_devcode") {
        prog.stk500_devcode = Some(prop_int(p, file)? as u8);
    }
    if let Some(p) = find(&raw.props, "avr910_devcode") {
        prog.avr910_devcode = Some(prop_int(p, file)? as u8);
    }
    if find(&raw.props, "devicecode").is_some() {
        return Err(fatal(
            file,
            raw.line,
            "'devicecode' is no longer supported; use 'stk500_devcode' or 'avr910_devcode'",
        ));
    }

    if let Some(p) = find(&raw.props, "reset") {
        prog.pins.reset = parse_pin_def(p, file)?;
    }
    if let Some(p) = find(&raw.props, "sck") {
        prog.pins.sck = parse_pin_def(p, file)?;
    }
    if let Some(p) = find(&raw.props, "mosi") {
        prog.pins.mosi = parse_pin_def(p, file)?;
    }
    if let Some(p) = find(&raw.props, "miso") {
        prog.pins.miso = parse_pin_def(p, file)?;
    }

    if let Some(p) = find(&raw.props, "usbvid") {
        prog.usb.vid = Some(prop_int(p, file)? as u16);
    }
    if let Some(p) = find(&raw.props, "usbpid") {
        prog.usb.pid = Some(prop_int(p, file)? as u16);
    }
    if let Some(p) = find(&raw.props, "usbsn") {
        prog.usb.serial = Some(crate::intern::intern(&prop_str(p, file)?));
    }

    Ok(prog)
}

fn parse_prog_type(name: &str) -> Option<ProgType> {
    Some(match name {
        "isp" => ProgType::ISP,
        "stk500v1" => ProgType::STK500V1,
        "stk500v2" => ProgType::STK500V2,
        "jtag" => ProgType::JTAG,
        "updi" => ProgType::UPDI,
        "usb" => ProgType::USB,
        "serial" => ProgType::SERIAL,
        _ => return None,
    })
}

fn parse_pin_def(p: &RawProp, file: &Path) -> AvrResult<PinDef> {
    let ints = prop_int_list(p, file)?;
    let mut pins = PinDef::default();
    for (i, v) in ints.iter().take(2).enumerate() {
        pins.pins[i] = *v as i8;
    }
    Ok(pins)
}

fn build_part(raw: RawPart, file: &Path) -> AvrResult<AvrPart> {
    let id_prop = require(&raw.props, "id", file, raw.line)?;
    let id = prop_str(id_prop, file)?;
    let desc = find(&raw.props, "desc").map(|p| prop_str(p, file)).transpose()?.unwrap_or_default();
    let mut part = AvrPart::new(&id, &desc);

    if let Some(p) = find(&raw.props, "signature") {
        let ints = prop_int_list(p, file)?;
        if ints.len() != 3 {
            return Err(fatal(file, p.line, "signature must have exactly 3 bytes"));
        }
        for (i, v) in ints.iter().enumerate() {
            part.signature[i] = *v as u8;
        }
    }

    if let Some(p) = find(&raw.props, "family_id") {
        part.family_id = Some(crate::intern::intern(&prop_str(p, file)?));
    }
    if let Some(p) = find(&raw.props, "stk500_devcode") {
        part.stk500_devcode = Some(prop_int(p, file)? as u8);
    }
    if let Some(p) = find(&raw.props, "avr910_devcode") {
        part.avr910_devcode = Some(prop_int(p, file)? as u8);
    }
    if find(&raw.props, "devicecode").is_some() {
        return Err(fatal(
            file,
            raw.line,
            "'devicecode' is no longer supported; use 'stk500_devcode' or 'avr910_devcode'",
        ));
    }
    if let Some(p) = find(&raw.props, "chip_erase_delay") {
        part.chip_erase_delay_us = prop_int(p, file)? as u32;
    }

    if let Some(p) = find(&raw.props, "prog_modes") {
        for v in &p.values {
            let name = v.as_ident().ok_or_else(|| fatal(file, p.line, "prog_modes values must be identifiers"))?;
            part.prog_modes |= parse_prog_modes(name)
                .ok_or_else(|| fatal(file, p.line, format!("unknown prog_modes value {name:?}")))?;
        }
    }

    for raw_mem in raw.memories {
        part.mem.push(build_memory(raw_mem, file)?);
    }

    Ok(part)
}

fn parse_prog_modes(name: &str) -> Option<ProgModes> {
    Some(match name {
        "isp" => ProgModes::ISP,
        "pdi" => ProgModes::PDI,
        "updi" => ProgModes::UPDI,
        "tpi" => ProgModes::TPI,
        "hvpp" => ProgModes::HVPP,
        "hvsp" => ProgModes::HVSP,
        "jtag" => ProgModes::JTAG,
        "debugwire" => ProgModes::DEBUGWIRE,
        "awire" => ProgModes::AWIRE,
        "spm" => ProgModes::SPM,
        _ => return None,
    })
}

fn build_memory(raw: RawMemory, file: &Path) -> AvrResult<AvrMem> {
    let size_prop = require(&raw.props, "size", file, raw.line)?;
    let size = prop_int(size_prop, file)? as usize;
    let mut mem = AvrMem::new(&raw.name, size);

    if let Some(p) = find(&raw.props, "paged") {
        mem.paged = prop_bool(p, file)?;
    }
    if let Some(p) = find(&raw.props, "page_size") {
        mem.page_size = prop_int(p, file)? as usize;
    }
    if let Some(p) = find(&raw.props, "num_pages") {
        mem.num_pages = prop_int(p, file)? as usize;
    }
    if let Some(p) = find(&raw.props, "min_write_delay") {
        mem.min_write_delay = prop_int(p, file)? as u32;
    }
    if let Some(p) = find(&raw.props, "max_write_delay") {
        mem.max_write_delay = prop_int(p, file)? as u32;
    }
    if let Some(p) = find(&raw.props, "readback_p1") {
        mem.readback_p1 = prop_int(p, file)? as u8;
    }
    if let Some(p) = find(&raw.props, "readback_p2") {
        mem.readback_p2 = prop_int(p, file)? as u8;
    }
    if let Some(p) = find(&raw.props, "offset") {
        mem.offset = prop_int(p, file)? as u32;
    }
    if let Some(p) = find(&raw.props, "bitmask") {
        mem.bitmask = Some(prop_int(p, file)? as u8);
    }

    for (key, kind) in [
        ("read", OpKind::Read),
        ("write", OpKind::Write),
        ("read_lo", OpKind::ReadLo),
        ("read_hi", OpKind::ReadHi),
        ("write_lo", OpKind::WriteLo),
        ("write_hi", OpKind::WriteHi),
        ("loadext_addr", OpKind::LoadExtAddr),
        ("chip_erase", OpKind::ChipErase),
        ("pgm_enable", OpKind::PgmEnable),
        ("poll", OpKind::Poll),
    ] {
        if let Some(p) = find(&raw.props, key) {
            let pattern = prop_str(p, file)?;
            let op = Opcode::parse_pattern(&pattern).map_err(|e| fatal(file, p.line, e.to_string()))?;
            mem.set_op(kind, op);
        }
    }

    mem.validate().map_err(|e| fatal(file, raw.line, e.to_string()))?;
    Ok(mem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::lexer::tokenize;
    use crate::config::parser::parse;
    use std::path::{Path, PathBuf};

    fn build_src(src: &str) -> AvrResult<crate::model::Config> {
        let toks = tokenize(src, Path::new("test.conf")).unwrap();
        let raw = parse(&toks, PathBuf::from("test.conf")).unwrap();
        build_file(raw, Path::new("test.conf"))
    }

    #[test]
    fn builds_part_with_memory() {
        let cfg = build_src(
            r#"
part
  id = "m328p";
  desc = "ATmega328P";
  signature = 0x1e, 0x95, 0x0f;
  memory "flash"
    size = 4;
    paged = no;
  ;
;
"#,
        )
        .unwrap();
        assert_eq!(cfg.parts.len(), 1);
        assert_eq!(cfg.parts[0].signature, [0x1e, 0x95, 0x0f]);
        assert_eq!(cfg.parts[0].mem[0].size, 4);
    }

    #[test]
    fn missing_id_is_fatal() {
        let err = build_src("part\n  desc = \"x\";\n;").unwrap_err();
        assert!(matches!(err, AvrError::Config { .. }));
    }

    #[test]
    fn devicecode_is_rejected() {
        let err = build_src(
            r#"programmer
  id = "x";
  type = stk500v1;
  devicecode = 1;
;"#,
        )
        .unwrap_err();
        match err {
            AvrError::Config { message, .. } => assert!(message.contains("stk500_devcode")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn programmer_without_type_is_fatal() {
        let err = build_src(r#"programmer
  id = "x";
;"#)
        .unwrap_err();
        assert!(matches!(err, AvrError::Config { .. }));
    }

    #[test]
    fn bad_paged_size_is_fatal() {
        let err = build_src(
            r#"part
  id = "m328p";
  memory "flash"
    size = 100;
    paged = yes;
    page_size = 64;
    num_pages = 1;
  ;
;"#,
        )
        .unwrap_err();
        assert!(matches!(err, AvrError::Config { .. }));
    }
}
