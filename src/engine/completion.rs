//! Write-completion polling.
//!
//! A write's completion can be detected three ways, in order of
//! preference: reading back the written byte until it matches (or until it
//! stops reading as the memory's blank value), watching the top bit of a
//! read toggle (classic "data polling" on some parts' flash), or — when
//! neither applies — sleeping for the memory's declared maximum write
//! delay. When a memory's write delay is zero and both readback bytes are
//! zero, neither polling strategy applies; that ambiguous case falls
//! through to the fixed-delay path (a no-op sleep here, since the delay is
//! also zero), reproducing the documented legacy behavior rather than
//! treating a zero readback byte as a meaningful poll target.

use std::thread;
use std::time::{Duration, Instant};

use crate::dispatch::ProgrammerDriver;
use crate::error::{AvrError, AvrResult, DeviceError};
use crate::model::{AvrMem, AvrPart};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStrategy {
    /// Poll by reading the byte back until it differs from both blank
    /// values, or matches what we wrote.
    ReadBack { expected: u8 },
    /// Poll by watching the top bit of a read (data polling).
    BitMonitor,
    /// No readback signal available: sleep for `max_write_delay`.
    FixedDelay,
}

/// Choose the completion strategy for one write.
pub fn choose_strategy(mem: &AvrMem, written: u8) -> CompletionStrategy {
    let zero_delay = mem.max_write_delay == 0 && mem.min_write_delay == 0;
    let readback_declared = mem.readback_p1 != 0xff || mem.readback_p2 != 0xff;

    // Both readback bytes zero with no declared delay is the documented
    // ambiguous case: neither polling strategy applies, so it falls
    // through to the (here instantaneous) fixed-delay path.
    if zero_delay && mem.readback_p1 == 0 && mem.readback_p2 == 0 {
        return CompletionStrategy::FixedDelay;
    }
    if readback_declared {
        CompletionStrategy::ReadBack { expected: written }
    } else if zero_delay {
        CompletionStrategy::FixedDelay
    } else {
        CompletionStrategy::BitMonitor
    }
}

pub fn wait_for_write_complete(
    driver: &mut dyn ProgrammerDriver,
    part: &AvrPart,
    mem: &AvrMem,
    addr: u32,
    written: u8,
) -> AvrResult<()> {
    let strategy = choose_strategy(mem, written);
    match strategy {
        CompletionStrategy::FixedDelay => {
            if mem.max_write_delay > 0 {
                thread::sleep(Duration::from_micros(mem.max_write_delay as u64));
            }
            Ok(())
        }
        CompletionStrategy::ReadBack { expected } => {
            let deadline = Instant::now() + Duration::from_micros(mem.max_write_delay.max(1) as u64);
            if mem.min_write_delay > 0 {
                thread::sleep(Duration::from_micros(mem.min_write_delay as u64));
            }
            loop {
                let readback = driver.read_byte(part, mem, addr)?;
                if readback == expected || (readback != mem.readback_p1 && readback != mem.readback_p2) {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(AvrError::Device(DeviceError::WritePollTimeout {
                        addr,
                        max_delay_us: mem.max_write_delay,
                    }));
                }
            }
        }
        CompletionStrategy::BitMonitor => {
            let deadline = Instant::now() + Duration::from_micros(mem.max_write_delay.max(1) as u64);
            loop {
                let readback = driver.read_byte(part, mem, addr)?;
                if readback & 0x80 == written & 0x80 {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(AvrError::Device(DeviceError::WritePollTimeout {
                        addr,
                        max_delay_us: mem.max_write_delay,
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_prefers_readback_when_declared() {
        let mut mem = AvrMem::new("eeprom", 4);
        mem.readback_p1 = 0xff;
        mem.readback_p2 = 0x7f;
        assert_eq!(choose_strategy(&mem, 0xaa), CompletionStrategy::ReadBack { expected: 0xaa });
    }

    #[test]
    fn zero_timing_and_no_readback_is_fixed_delay_noop() {
        let mem = AvrMem::new("sram", 4);
        assert_eq!(choose_strategy(&mem, 0), CompletionStrategy::FixedDelay);
    }

    #[test]
    fn zero_timing_and_both_readback_bytes_zero_falls_through_to_fixed_delay() {
        let mut mem = AvrMem::new("sram", 4);
        mem.readback_p1 = 0x00;
        mem.readback_p2 = 0x00;
        assert_eq!(choose_strategy(&mem, 0xaa), CompletionStrategy::FixedDelay);
    }

    #[test]
    fn nonzero_timing_with_both_readback_bytes_zero_still_polls_readback() {
        let mut mem = AvrMem::new("eeprom", 4);
        mem.readback_p1 = 0x00;
        mem.readback_p2 = 0x00;
        mem.max_write_delay = 4500;
        assert_eq!(choose_strategy(&mem, 0xaa), CompletionStrategy::ReadBack { expected: 0xaa });
    }

    #[test]
    fn nonzero_timing_without_readback_is_bit_monitor() {
        let mut mem = AvrMem::new("flash", 4);
        mem.max_write_delay = 4500;
        assert_eq!(choose_strategy(&mem, 0), CompletionStrategy::BitMonitor);
    }
}
