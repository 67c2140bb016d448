//! `avrtool`: programmer and verifier for AVR/AVR32 non-volatile memories.
//!
//! Pipeline: parse CLI → load config DB → locate part and programmer →
//! open transport → program-enable + signature check → [chip erase] →
//! run each `-U` update → unified exit (powerdown, disable, close) even
//! on partial failure.

mod cli;

use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;

use avrtool::dispatch::{isp::IspDriver, isp::SerialBitbangLink, stk500v1::Stk500v1Driver, ProgrammerDriver};
use avrtool::engine;
use avrtool::fileformat;
use avrtool::log::{self, MsgKind};
use avrtool::model::{AvrPart, Op, Programmer, ProgType, Update};

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    log::init(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::message(MsgKind::ExtError, &format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = avrtool::config::load_default(cli.config.as_deref()).context("loading configuration")?;

    let part_template = cfg.locate_part(&cli.part).context("locating part")?;
    let programmer = cfg.locate_programmer(&cli.programmer).context("locating programmer")?;
    let mut part = part_template.duplicate();

    if cli.show_config {
        print_config(&part, programmer);
        return Ok(());
    }

    let updates: Vec<Update> = cli.updates.iter().cloned().map(cli::RawUpdate::into_update).collect();

    for update in &updates {
        if update.is_write() {
            fileformat::read_update(update, &mut part).with_context(|| {
                format!("reading {} for memory {:?}", update.filename.display(), update.memtype)
            })?;
        }
    }

    let mut driver = open_driver(programmer, cli.baudrate, cli.port.as_deref())
        .context("opening connection to programmer")?;

    let result = drive(&mut *driver, &mut part, &cli, &updates);

    // Unified exit path: always attempt powerdown/close, even if the
    // programming run itself failed.
    let _ = driver.powerdown();
    let _ = driver.close();

    result
}

fn drive(
    driver: &mut dyn ProgrammerDriver,
    part: &mut AvrPart,
    cli: &Cli,
    updates: &[Update],
) -> anyhow::Result<()> {
    driver.open(part).context("opening programmer session")?;
    engine::program_enable(driver, part, cli.force).context("enabling programming mode")?;

    let writing_flash = updates.iter().any(|u| {
        u.is_write() && part.find_mem(&u.memtype).is_some_and(|m| m.is_flash_like())
    });
    if cli.erase || (writing_flash && !cli.disable_auto_erase) {
        log::message(MsgKind::Info, "erasing chip");
        engine::chip_erase(driver, part).context("erasing chip")?;
    }

    for update in updates {
        apply_update(driver, part, update, cli)?;
    }

    Ok(())
}

fn apply_update(
    driver: &mut dyn ProgrammerDriver,
    part: &mut AvrPart,
    update: &Update,
    cli: &Cli,
) -> anyhow::Result<()> {
    let mem = part
        .find_mem(&update.memtype)
        .with_context(|| format!("memory {:?} not defined for this part", update.memtype))?
        .clone();

    match update.op {
        Op::Write => {
            log::message(MsgKind::Info, &format!("writing {:?}", mem.name));
            if !cli.no_write {
                write_memory(driver, part, &mem)?;
            }
            if !cli.no_verify {
                log::message(MsgKind::Info, &format!("verifying {:?}", mem.name));
                verify_memory(driver, part, &mem)?;
            }
        }
        Op::Verify => {
            log::message(MsgKind::Info, &format!("verifying {:?}", mem.name));
            verify_memory(driver, part, &mem)?;
        }
        Op::Read => {
            log::message(MsgKind::Info, &format!("reading {:?}", mem.name));
            let mut device_mem = read_memory(driver, part, &mem)?;
            if cli.hi_trim {
                let trimmed = device_mem.iter().rposition(|&b| b != 0xff).map_or(0, |i| i + 1);
                device_mem.truncate(trimmed);
            }
            let read_update =
                Update::new(&update.memtype, Op::Write, update.filename.clone(), update.format);
            let mut tmp_part = part.duplicate();
            if let Some(m) = tmp_part.find_mem_mut(&update.memtype) {
                m.buf = device_mem;
                m.mark_allocated(0..m.size);
            }
            fileformat::write_update(&read_update, &tmp_part)
                .with_context(|| format!("writing {}", update.filename.display()))?;
        }
    }
    Ok(())
}

fn write_memory(driver: &mut dyn ProgrammerDriver, part: &AvrPart, mem: &avrtool::model::AvrMem) -> anyhow::Result<()> {
    let total = mem.buf.iter().enumerate().filter(|(i, _)| mem.is_allocated(*i)).count();
    let mut progress = log::ProgressReporter::new(format!("writing {}", mem.name), total.max(1));
    let mut done = 0usize;

    if mem.paged && mem.page_size > 0 {
        engine::paged_write(driver, part, mem, &mem.buf).context("paged write failed")?;
        progress.finish();
        return Ok(());
    }

    for (addr, &byte) in mem.buf.iter().enumerate() {
        if !mem.is_allocated(addr) {
            continue;
        }
        engine::avr_write_byte(driver, part, mem, addr as u32, byte)
            .with_context(|| format!("writing byte at 0x{addr:06x}"))?;
        done += 1;
        progress.update(done);
    }
    progress.finish();
    Ok(())
}

fn read_memory(driver: &mut dyn ProgrammerDriver, part: &AvrPart, mem: &avrtool::model::AvrMem) -> anyhow::Result<Vec<u8>> {
    let mut out = vec![0u8; mem.size];
    if mem.paged && mem.page_size > 0 {
        engine::paged_load(driver, part, mem, &mut out).context("paged read failed")?;
        return Ok(out);
    }
    for (addr, slot) in out.iter_mut().enumerate() {
        *slot = engine::avr_read_byte(driver, part, mem, addr as u32).with_context(|| format!("reading byte at 0x{addr:06x}"))?;
    }
    Ok(out)
}

fn verify_memory(driver: &mut dyn ProgrammerDriver, part: &AvrPart, mem: &avrtool::model::AvrMem) -> anyhow::Result<()> {
    let device = read_memory(driver, part, mem)?;
    engine::verify_memory(mem, &device).map_err(anyhow::Error::from).context("verification failed")
}

fn open_driver(
    programmer: &Programmer,
    baud_override: Option<u32>,
    port_override: Option<&str>,
) -> anyhow::Result<Box<dyn ProgrammerDriver>> {
    let port_name = port_override
        .map(str::to_string)
        .or_else(|| programmer.usb.serial.as_ref().map(|s| s.to_string()))
        .context("no port specified (-P) and programmer has no default")?;
    let baud = baud_override.or(programmer.baudrate).unwrap_or(115_200);

    if programmer.prog_type.contains(ProgType::STK500V1) {
        let port = serialport::new(&port_name, baud)
            .timeout(std::time::Duration::from_millis(2000))
            .open()
            .with_context(|| format!("opening serial port {port_name}"))?;
        return Ok(Box::new(Stk500v1Driver::new(port)));
    }

    if programmer.prog_type.contains(ProgType::ISP) {
        let port = serialport::new(&port_name, baud)
            .timeout(std::time::Duration::from_millis(2000))
            .open()
            .with_context(|| format!("opening serial port {port_name}"))?;
        let bitclock = programmer.bitclock_hz.unwrap_or(100_000);
        let link = SerialBitbangLink::new(port, bitclock);
        return Ok(Box::new(IspDriver::new(link)));
    }

    bail!("programmer {:?} has no supported protocol in this build (type = {:?})", programmer.id, programmer.prog_type)
}

fn print_config(part: &AvrPart, programmer: &Programmer) {
    println!("part id         = {}", part.id);
    println!("part desc       = {}", part.desc);
    println!("signature       = {:02x} {:02x} {:02x}", part.signature[0], part.signature[1], part.signature[2]);
    println!("programmer id   = {}", programmer.id);
    println!("programmer type = {:?}", programmer.prog_type);
    for mem in &part.mem {
        println!(
            "memory {:<12} size={:<8} paged={:<5} page_size={}",
            &*mem.name, mem.size, mem.paged, mem.page_size
        );
    }
}
