//! Memory-operation engine: read, write (with completion polling), paged
//! transfer, chip erase, verify, cycle counters, program-enable retry.

mod completion;
mod cycles;
mod paged;
mod program_enable;
mod verify;

pub use completion::{wait_for_write_complete, CompletionStrategy};
pub use cycles::{get_cycle_count, put_cycle_count};
pub use paged::{paged_load, paged_write};
pub use program_enable::program_enable;
pub use verify::verify_memory;

use crate::dispatch::ProgrammerDriver;
use crate::error::{AvrError, AvrResult, DeviceError};
use crate::model::{AvrMem, AvrPart, OpKind};

/// Read one byte at `addr` from `mem` via the part's `read` opcode.
pub fn avr_read_byte(
    driver: &mut dyn ProgrammerDriver,
    part: &AvrPart,
    mem: &AvrMem,
    addr: u32,
) -> AvrResult<u8> {
    driver.read_byte(part, mem, addr)
}

/// Write one byte at `addr` into `mem`, then poll for completion using the
/// tiered strategy described in `completion`.
pub fn avr_write_byte(
    driver: &mut dyn ProgrammerDriver,
    part: &AvrPart,
    mem: &AvrMem,
    addr: u32,
    value: u8,
) -> AvrResult<()> {
    driver.write_byte(part, mem, addr, value)?;
    wait_for_write_complete(driver, part, mem, addr, value)
}

/// Erase the whole chip using the part's `chip_erase` primitive (on
/// whichever memory declares it, conventionally `flash`).
pub fn chip_erase(driver: &mut dyn ProgrammerDriver, part: &AvrPart) -> AvrResult<()> {
    let mem = part
        .mem
        .iter()
        .find(|m| m.op(OpKind::ChipErase).is_some())
        .ok_or_else(|| AvrError::Device(DeviceError::NoEraseOpcode))?;
    driver.chip_erase(part, mem)
}
