//! EEPROM erase/write cycle counter, stored in the last 4 bytes of the
//! `eeprom` memory as a big-endian `u32`. `0xffffffff` means
//! "untracked" — never read back as a real count.

use crate::dispatch::ProgrammerDriver;
use crate::error::AvrResult;
use crate::model::{AvrMem, AvrPart};

const COUNTER_LEN: u32 = 4;

fn counter_addr(mem: &AvrMem) -> Option<u32> {
    if mem.size as u32 >= COUNTER_LEN {
        Some(mem.size as u32 - COUNTER_LEN)
    } else {
        None
    }
}

/// Read the cycle counter, or `None` if the memory is too small or the
/// counter is unset (all `0xff`).
pub fn get_cycle_count(
    driver: &mut dyn ProgrammerDriver,
    part: &AvrPart,
    mem: &AvrMem,
) -> AvrResult<Option<u32>> {
    let Some(addr) = counter_addr(mem) else { return Ok(None) };
    let mut bytes = [0u8; 4];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = driver.read_byte(part, mem, addr + i as u32)?;
    }
    let value = u32::from_be_bytes(bytes);
    Ok((value != 0xffff_ffff).then_some(value))
}

pub fn put_cycle_count(
    driver: &mut dyn ProgrammerDriver,
    part: &AvrPart,
    mem: &AvrMem,
    count: u32,
) -> AvrResult<()> {
    let Some(addr) = counter_addr(mem) else {
        return Err(crate::error::AvrError::unsupported("memory too small for a cycle counter"));
    };
    for (i, byte) in count.to_be_bytes().iter().enumerate() {
        crate::engine::avr_write_byte(driver, part, mem, addr + i as u32, *byte)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_addr_needs_four_bytes() {
        let small = AvrMem::new("eeprom", 2);
        assert_eq!(counter_addr(&small), None);
        let ok = AvrMem::new("eeprom", 1024);
        assert_eq!(counter_addr(&ok), Some(1020));
    }
}
