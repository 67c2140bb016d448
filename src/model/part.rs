//! `AVRPART`: one supported MCU.

use bitflags::bitflags;

use crate::intern::{intern, IStr};

use super::mem::AvrMem;

bitflags! {
    /// Programming-mode bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProgModes: u16 {
        const ISP        = 1 << 0;
        const PDI        = 1 << 1;
        const UPDI       = 1 << 2;
        const TPI        = 1 << 3;
        const HVPP       = 1 << 4;
        const HVSP       = 1 << 5;
        const JTAG       = 1 << 6;
        const DEBUGWIRE  = 1 << 7;
        const AWIRE      = 1 << 8;
        const SPM        = 1 << 9;
    }
}

/// MCU registers visible from outside the chip, as declared by the config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub idr: Option<u8>,
    pub rampz: Option<u8>,
    pub spmcr: Option<u8>,
    pub eecr: Option<u8>,
    pub eind: Option<u8>,
}

/// Base addresses used by HV/JTAG/UPDI drivers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseAddresses {
    pub nvm_base: Option<u32>,
    pub ocd_base: Option<u32>,
    pub syscfg_base: Option<u32>,
}

/// Timing parameters used by HV/JTAG drivers; stored even though the core
/// engine (ISP + STK500) only consumes `chip_erase_delay` directly — the
/// rest round-trips through the config store for completeness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HvTiming {
    pub hventerstabdelay_us: u32,
    pub progmodedelay_us: u32,
    pub latchcycles: u32,
    pub togglevtg_us: u32,
    pub poweroffdelay_us: u32,
    pub resetdelayms: u32,
    pub resetdelayus: u32,
}

#[derive(Debug, Clone)]
pub struct AvrPart {
    pub id: IStr,
    pub desc: IStr,
    pub family_id: Option<IStr>,
    pub prog_modes: ProgModes,
    pub signature: [u8; 3],
    pub stk500_devcode: Option<u8>,
    pub avr910_devcode: Option<u8>,
    pub chip_erase_delay_us: u32,
    pub hv_timing: HvTiming,
    pub registers: Registers,
    pub base_addrs: BaseAddresses,
    /// Ordered list of memories owned by the part (config iteration order).
    pub mem: Vec<AvrMem>,
}

impl AvrPart {
    pub fn new(id: &str, desc: &str) -> Self {
        AvrPart {
            id: intern(id),
            desc: intern(desc),
            family_id: None,
            prog_modes: ProgModes::empty(),
            signature: [0, 0, 0],
            stk500_devcode: None,
            avr910_devcode: None,
            chip_erase_delay_us: 0,
            hv_timing: HvTiming::default(),
            registers: Registers::default(),
            base_addrs: BaseAddresses::default(),
            mem: Vec::new(),
        }
    }

    pub fn find_mem(&self, name: &str) -> Option<&AvrMem> {
        self.mem.iter().find(|m| &*m.name == name)
    }

    pub fn find_mem_mut(&mut self, name: &str) -> Option<&mut AvrMem> {
        self.mem.iter_mut().find(|m| &*m.name == name)
    }

    /// Matches any memory satisfying a predicate set rather than exact
    /// equality.
    pub fn find_mem_like(&self, predicate: impl Fn(&AvrMem) -> bool) -> Option<&AvrMem> {
        self.mem.iter().find(|m| predicate(m))
    }

    /// Deep-copy `buf`/`tags`/opcode arrays for each memory but share the
    /// interned strings. Since `IStr = Arc<str>`, `Clone` on the whole struct
    /// already does exactly this: `Vec<u8>`/`Vec<Tag>`/`[Option<Opcode>; N]`
    /// are deep-copied while every `Arc<str>` clone is a refcount bump.
    pub fn duplicate(&self) -> AvrPart {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_shares_interned_strings_but_not_buffers() {
        let mut p = AvrPart::new("m328p", "ATmega328P");
        p.mem.push(AvrMem::new("flash", 4));
        let mut dup = p.duplicate();
        assert!(std::sync::Arc::ptr_eq(&p.id, &dup.id));
        dup.mem[0].buf[0] = 0xAA;
        assert_ne!(p.mem[0].buf[0], dup.mem[0].buf[0]);
    }
}
