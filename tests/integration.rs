//! End-to-end tests that exercise the config parser, the ISP engine, and
//! the file-format layer together against an in-memory fake target,
//! without needing real hardware attached.

use avrtool::config;
use avrtool::dispatch::ProgrammerDriver;
use avrtool::engine;
use avrtool::error::AvrResult;
use avrtool::fileformat;
use avrtool::model::{AvrMem, AvrPart, FileFormat, Op, Update};

const SAMPLE_CONFIG: &str = r#"
programmer
  id = "arduino", "stk500v1";
  desc = "Arduino as ISP";
  type = stk500v1;
  baudrate = 115200;
;

part
  id = "m328p";
  desc = "ATmega328P";
  signature = 0x1e, 0x95, 0x0f;
  prog_modes = isp;
  chip_erase_delay = 9000;

  memory "flash"
    size = 32768;
    paged = yes;
    page_size = 128;
    num_pages = 256;
    read = "0 0 1 0 0 0 0 0  0 0 0 0 0 0 0 0  a a a a a a a a  o o o o o o o o";
    write = "0 1 0 0 0 0 0 0  0 0 0 0 0 0 0 0  a a a a a a a a  i i i i i i i i";
    chip_erase = "1 0 1 0 1 1 0 0  1 0 0 1 0 1 0 1  0 1 1 0 0 0 0 0  0 0 0 0 0 0 0 0";
  ;

  memory "eeprom"
    size = 1024;
    paged = no;
    read = "0 0 1 0 0 0 0 0  0 0 0 1 0 0 0 0  0 0 0 0 0 a a a  o o o o o o o o";
    write = "0 1 0 0 0 0 0 0  0 0 0 1 0 0 0 0  0 0 0 0 0 a a a  i i i i i i i i";
  ;
;
"#;

/// A fully in-memory `ProgrammerDriver` standing in for a real chip: every
/// byte read/write goes straight to a `Vec<u8>` per memory name.
struct FakeChip {
    memories: std::collections::HashMap<String, Vec<u8>>,
    signature: [u8; 3],
    enabled: bool,
}

impl FakeChip {
    fn new(part: &AvrPart, signature: [u8; 3]) -> Self {
        let memories = part.mem.iter().map(|m| (m.name.to_string(), vec![0xffu8; m.size])).collect();
        FakeChip { memories, signature, enabled: false }
    }
}

impl ProgrammerDriver for FakeChip {
    fn open(&mut self, _part: &AvrPart) -> AvrResult<()> {
        Ok(())
    }

    fn close(&mut self) -> AvrResult<()> {
        Ok(())
    }

    fn program_enable(&mut self, _part: &AvrPart) -> AvrResult<()> {
        self.enabled = true;
        Ok(())
    }

    fn chip_erase(&mut self, _part: &AvrPart, mem: &AvrMem) -> AvrResult<()> {
        if let Some(buf) = self.memories.get_mut(&*mem.name) {
            buf.fill(0xff);
        }
        Ok(())
    }

    fn read_byte(&mut self, _part: &AvrPart, mem: &AvrMem, addr: u32) -> AvrResult<u8> {
        Ok(self.memories[&*mem.name][addr as usize])
    }

    fn write_byte(&mut self, _part: &AvrPart, mem: &AvrMem, addr: u32, value: u8) -> AvrResult<()> {
        self.memories.get_mut(&*mem.name).unwrap()[addr as usize] = value;
        Ok(())
    }

    fn read_signature(&mut self, _part: &AvrPart) -> AvrResult<[u8; 3]> {
        Ok(self.signature)
    }
}

#[test]
fn parses_config_and_locates_part_and_programmer() {
    let cfg = config::parse_str(SAMPLE_CONFIG, std::path::Path::new("sample.conf")).unwrap();
    let part = cfg.locate_part("m328p").unwrap();
    assert_eq!(part.signature, [0x1e, 0x95, 0x0f]);
    assert_eq!(part.mem.len(), 2);

    let programmer = cfg.locate_programmer("stk500v1").unwrap();
    assert_eq!(programmer.desc.as_ref(), "Arduino as ISP");
}

#[test]
fn full_write_then_verify_cycle_against_fake_chip() {
    let cfg = config::parse_str(SAMPLE_CONFIG, std::path::Path::new("sample.conf")).unwrap();
    let mut part = cfg.locate_part("m328p").unwrap().duplicate();

    let mut driver = FakeChip::new(&part, part.signature);
    engine::program_enable(&mut driver, &part, false).unwrap();

    let eeprom = part.find_mem_mut("eeprom").unwrap();
    for (addr, byte) in [(0u32, 0xAAu8), (1, 0xBB), (2, 0xCC)] {
        eeprom.buf[addr as usize] = byte;
        eeprom.mark_allocated(addr as usize..addr as usize + 1);
    }
    let eeprom = part.find_mem("eeprom").unwrap().clone();

    for addr in 0..3u32 {
        engine::avr_write_byte(&mut driver, &part, &eeprom, addr, eeprom.buf[addr as usize]).unwrap();
    }

    let mut readback = vec![0u8; eeprom.size];
    for addr in 0..eeprom.size as u32 {
        readback[addr as usize] = engine::avr_read_byte(&mut driver, &part, &eeprom, addr).unwrap();
    }
    engine::verify_memory(&eeprom, &readback).unwrap();
}

#[test]
fn mismatched_signature_without_force_is_rejected() {
    let cfg = config::parse_str(SAMPLE_CONFIG, std::path::Path::new("sample.conf")).unwrap();
    let part = cfg.locate_part("m328p").unwrap().duplicate();
    let mut driver = FakeChip::new(&part, [0xde, 0xad, 0xbe]);
    assert!(engine::program_enable(&mut driver, &part, false).is_err());
    assert!(engine::program_enable(&mut driver, &part, true).is_ok());
}

#[test]
fn paged_flash_write_and_verify_through_engine() {
    let cfg = config::parse_str(SAMPLE_CONFIG, std::path::Path::new("sample.conf")).unwrap();
    let mut part = cfg.locate_part("m328p").unwrap().duplicate();
    let mut driver = FakeChip::new(&part, part.signature);
    engine::program_enable(&mut driver, &part, false).unwrap();

    let flash = part.find_mem_mut("flash").unwrap();
    let image: Vec<u8> = (0..256u32).map(|i| i as u8).collect();
    flash.buf[0..image.len()].copy_from_slice(&image);
    flash.mark_allocated(0..image.len());
    let flash = part.find_mem("flash").unwrap().clone();

    engine::paged_write(&mut driver, &part, &flash, &flash.buf).unwrap();

    let mut readback = vec![0u8; flash.size];
    engine::paged_load(&mut driver, &part, &flash, &mut readback).unwrap();
    engine::verify_memory(&flash, &readback).unwrap();
}

#[test]
fn ihex_file_round_trips_through_an_update() {
    let cfg = config::parse_str(SAMPLE_CONFIG, std::path::Path::new("sample.conf")).unwrap();
    let mut part = cfg.locate_part("m328p").unwrap().duplicate();

    let tmp = tempfile::NamedTempFile::new().unwrap();
    let text = avrtool::fileformat::ihex::encode(0, &[1, 2, 3, 4, 5]);
    std::fs::write(tmp.path(), text).unwrap();

    let write_update = Update::new("flash", Op::Write, tmp.path(), FileFormat::IntelHex);
    fileformat::read_update(&write_update, &mut part).unwrap();
    let flash = part.find_mem("flash").unwrap();
    assert_eq!(&flash.buf[0..5], &[1, 2, 3, 4, 5]);

    let out = tempfile::NamedTempFile::new().unwrap();
    let read_update = Update::new("flash", Op::Read, out.path(), FileFormat::IntelHex);
    fileformat::write_update(&read_update, &part).unwrap();
    let written = std::fs::read_to_string(out.path()).unwrap();
    assert!(written.starts_with(':'));
}

#[test]
fn urboot_catalogue_lookup_survives_update_level_fallback() {
    use avrtool::urboot::{find_with_level_fallback, tokens, CatalogueEntry, TemplateSites};

    let catalogue = vec![CatalogueEntry {
        name: "urboot_atmega328p_16MHz_uart0_115200_u2.hex".to_string(),
        bytes: vec![0xAA; 8],
        sites: TemplateSites { brrlo_word: None, brrhi_word: None, led_word: None, cs_word: None, insync_word: 0, ok_word: 1 },
        mcuid: 1,
    }];
    let wanted = tokens::parse_catalogue_name("atmega328p_16MHz_uart0_115200");
    let found = find_with_level_fallback(&catalogue, &wanted, 4).unwrap();
    assert_eq!(found.bytes, vec![0xAA; 8]);
}
