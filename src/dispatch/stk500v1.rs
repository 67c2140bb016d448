//! STK500v1 / Arduino bootloader protocol driver.
//!
//! Frames every command as `Cmd_STK_* [params...] Sync_CRC_EOP`; a correct
//! reply starts with `Resp_STK_INSYNC` and ends with `Resp_STK_OK`
//! (`Resp_STK_NOSYNC` means the bootloader and host have lost lockstep and
//! must resynchronize). DTR/RTS are pulsed low to reset an Arduino into
//! its bootloader before the first sync attempt.

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{AvrError, AvrResult};
use crate::model::{AvrMem, AvrPart};

use super::ProgrammerDriver;

#[allow(dead_code)]
mod proto {
    pub const CMD_STK_GET_SYNC: u8 = 0x30;
    pub const CMD_STK_GET_PARAMETER: u8 = 0x41;
    pub const CMD_STK_ENTER_PROGMODE: u8 = 0x50;
    pub const CMD_STK_LEAVE_PROGMODE: u8 = 0x51;
    pub const CMD_STK_LOAD_ADDRESS: u8 = 0x55;
    pub const CMD_STK_PROG_PAGE: u8 = 0x64;
    pub const CMD_STK_READ_PAGE: u8 = 0x74;
    pub const CMD_STK_READ_SIGN: u8 = 0x75;
    pub const SYNC_CRC_EOP: u8 = 0x20;
    pub const RESP_STK_OK: u8 = 0x10;
    pub const RESP_STK_INSYNC: u8 = 0x14;
    pub const RESP_STK_NOSYNC: u8 = 0x15;
}
use proto::*;

pub struct Stk500v1Driver {
    port: Box<dyn serialport::SerialPort>,
    /// Arduino bootloaders report a fixed chip-erase-on-open and have no
    /// real `chip_erase` opcode to send.
    pub emulates_chip_erase: bool,
}

impl Stk500v1Driver {
    pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
        Stk500v1Driver { port, emulates_chip_erase: true }
    }

    fn send(&mut self, bytes: &[u8]) -> AvrResult<()> {
        self.port.write_all(bytes).map_err(|e| AvrError::transport(e.to_string()))
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> AvrResult<()> {
        self.port.read_exact(buf).map_err(|e| AvrError::transport(e.to_string()))
    }

    /// Send a command, then expect `INSYNC <payload...> OK`.
    fn command(&mut self, cmd: &[u8], resp_len: usize) -> AvrResult<Vec<u8>> {
        let mut frame = cmd.to_vec();
        frame.push(SYNC_CRC_EOP);
        self.send(&frame)?;

        let mut insync = [0u8; 1];
        self.recv_exact(&mut insync)?;
        if insync[0] != RESP_STK_INSYNC {
            return Err(AvrError::protocol(format!(
                "expected INSYNC (0x{RESP_STK_INSYNC:02x}), got 0x{:02x}",
                insync[0]
            )));
        }

        let mut payload = vec![0u8; resp_len];
        self.recv_exact(&mut payload)?;

        let mut ok = [0u8; 1];
        self.recv_exact(&mut ok)?;
        if ok[0] != RESP_STK_OK {
            return Err(AvrError::protocol(format!("expected OK (0x{RESP_STK_OK:02x}), got 0x{:02x}", ok[0])));
        }

        Ok(payload)
    }

    /// Pulse DTR/RTS low to force an Arduino into its bootloader, then
    /// retry `GET_SYNC` until the bootloader answers or attempts run out.
    pub fn sync(&mut self) -> AvrResult<()> {
        let _ = self.port.write_data_terminal_ready(false);
        let _ = self.port.write_request_to_send(false);
        std::thread::sleep(Duration::from_millis(50));
        let _ = self.port.write_data_terminal_ready(true);
        let _ = self.port.write_request_to_send(true);
        std::thread::sleep(Duration::from_millis(50));

        const ATTEMPTS: u32 = 10;
        for _ in 0..ATTEMPTS {
            if self.command(&[CMD_STK_GET_SYNC], 0).is_ok() {
                return Ok(());
            }
        }
        Err(AvrError::transport("could not sync with STK500v1 bootloader"))
    }

    fn load_address(&mut self, word_addr: u32) -> AvrResult<()> {
        let lo = (word_addr & 0xff) as u8;
        let hi = ((word_addr >> 8) & 0xff) as u8;
        self.command(&[CMD_STK_LOAD_ADDRESS, lo, hi], 0)?;
        Ok(())
    }
}

impl ProgrammerDriver for Stk500v1Driver {
    fn open(&mut self, _part: &AvrPart) -> AvrResult<()> {
        self.sync()
    }

    fn close(&mut self) -> AvrResult<()> {
        self.command(&[CMD_STK_LEAVE_PROGMODE], 0)?;
        Ok(())
    }

    fn program_enable(&mut self, _part: &AvrPart) -> AvrResult<()> {
        self.command(&[CMD_STK_ENTER_PROGMODE], 0)?;
        Ok(())
    }

    /// Arduino bootloaders erase the whole chip automatically the moment a
    /// new image is flashed; there is no discrete erase command to send
    ///, so this is a documented no-op.
    fn chip_erase(&mut self, _part: &AvrPart, _mem: &AvrMem) -> AvrResult<()> {
        if self.emulates_chip_erase {
            crate::log::message(crate::log::MsgKind::Debug, "STK500v1: chip erase is implicit, skipping");
            Ok(())
        } else {
            Err(AvrError::unsupported("chip erase not supported over STK500v1"))
        }
    }

    fn read_signature(&mut self, _part: &AvrPart) -> AvrResult<[u8; 3]> {
        let payload = self.command(&[CMD_STK_READ_SIGN], 3)?;
        Ok([payload[0], payload[1], payload[2]])
    }

    fn read_byte(&mut self, part: &AvrPart, mem: &AvrMem, addr: u32) -> AvrResult<u8> {
        let mut buf = [0u8; 1];
        self.paged_load(part, mem, addr, &mut buf)?;
        Ok(buf[0])
    }

    fn write_byte(&mut self, part: &AvrPart, mem: &AvrMem, addr: u32, value: u8) -> AvrResult<()> {
        self.paged_write(part, mem, addr, &[value])
    }

    fn paged_write(&mut self, _part: &AvrPart, mem: &AvrMem, addr: u32, data: &[u8]) -> AvrResult<()> {
        let word_addr = if mem.is_flash_like() { addr / 2 } else { addr };
        self.load_address(word_addr)?;
        let len_hi = ((data.len() >> 8) & 0xff) as u8;
        let len_lo = (data.len() & 0xff) as u8;
        let memtype = if mem.is_flash_like() { b'F' } else { b'E' };
        let mut cmd = vec![CMD_STK_PROG_PAGE, len_hi, len_lo, memtype];
        cmd.extend_from_slice(data);
        self.command(&cmd, 0)?;
        Ok(())
    }

    fn paged_load(&mut self, _part: &AvrPart, mem: &AvrMem, addr: u32, out: &mut [u8]) -> AvrResult<()> {
        let word_addr = if mem.is_flash_like() { addr / 2 } else { addr };
        self.load_address(word_addr)?;
        let len_hi = ((out.len() >> 8) & 0xff) as u8;
        let len_lo = (out.len() & 0xff) as u8;
        let memtype = if mem.is_flash_like() { b'F' } else { b'E' };
        let payload = self.command(&[CMD_STK_READ_PAGE, len_hi, len_lo, memtype], out.len())?;
        out.copy_from_slice(&payload);
        Ok(())
    }

    fn powerdown(&mut self) -> AvrResult<()> {
        let _ = self.command(&[CMD_STK_LEAVE_PROGMODE], 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::proto::*;

    /// `SYNC_CRC_EOP`/`RESP_STK_*` must keep their historical values since
    /// they're wire-compatible with real Arduino bootloaders.
    #[test]
    fn protocol_constants_match_stk500v1() {
        assert_eq!(CMD_STK_GET_SYNC, 0x30);
        assert_eq!(SYNC_CRC_EOP, 0x20);
        assert_eq!(RESP_STK_INSYNC, 0x14);
        assert_eq!(RESP_STK_OK, 0x10);
        assert_eq!(RESP_STK_NOSYNC, 0x15);
    }
}
