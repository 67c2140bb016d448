//! `PROGRAMMER`: a hardware/firmware adapter description.

use bitflags::bitflags;

use crate::intern::{intern, IStr};

bitflags! {
    /// Which wire protocols a programmer entry can speak.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProgType: u16 {
        const ISP      = 1 << 0;
        const STK500V1 = 1 << 1;
        const STK500V2 = 1 << 2;
        const JTAG     = 1 << 3;
        const UPDI     = 1 << 4;
        const USB      = 1 << 5;
        const SERIAL   = 1 << 6;
    }
}

/// One pin assignment: either a GPIO/bit-bang pin number set or "not wired".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinDef {
    pub pins: [i8; 2],
    pub inverse: [bool; 2],
}

/// Pin table, one slot per ISP/bit-bang signal.
#[derive(Debug, Clone, Default)]
pub struct PinTable {
    pub reset: PinDef,
    pub sck: PinDef,
    pub mosi: PinDef,
    pub miso: PinDef,
    pub led_err: PinDef,
    pub led_rdy: PinDef,
    pub led_pgm: PinDef,
    pub led_vfy: PinDef,
}

#[derive(Debug, Clone, Default)]
pub struct UsbInfo {
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial: Option<IStr>,
    pub strings: Vec<IStr>,
}

#[derive(Debug, Clone)]
pub struct Programmer {
    pub id: IStr,
    pub aliases: Vec<IStr>,
    pub desc: IStr,
    pub prog_type: ProgType,
    pub pins: PinTable,
    pub usb: UsbInfo,
    pub baudrate: Option<u32>,
    pub bitclock_hz: Option<u32>,
    pub stk500_devcode: Option<u8>,
    pub avr910_devcode: Option<u8>,
}

impl Programmer {
    pub fn new(id: &str, desc: &str) -> Self {
        Programmer {
            id: intern(id),
            aliases: Vec::new(),
            desc: intern(desc),
            prog_type: ProgType::empty(),
            pins: PinTable::default(),
            usb: UsbInfo::default(),
            baudrate: None,
            bitclock_hz: None,
            stk500_devcode: None,
            avr910_devcode: None,
        }
    }

    /// True if `name` is either the canonical id or a declared alias.
    pub fn matches_name(&self, name: &str) -> bool {
        &*self.id == name || self.aliases.iter().any(|a| &**a == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_matching() {
        let mut p = Programmer::new("arduino", "Arduino bootloader");
        p.aliases.push(intern("stk500v1"));
        assert!(p.matches_name("arduino"));
        assert!(p.matches_name("stk500v1"));
        assert!(!p.matches_name("usbasp"));
    }
}
