//! Program-enable with signature check, including the override escape
//! hatch.

use crate::dispatch::ProgrammerDriver;
use crate::error::{AvrError, AvrResult, DeviceError};
use crate::model::AvrPart;

/// Enable programming mode and verify the device signature matches the
/// selected part. `force` mirrors `-F`: proceed even on a mismatch or an
/// all-zero/all-`0xff` signature, logging a warning instead of failing.
pub fn program_enable(driver: &mut dyn ProgrammerDriver, part: &AvrPart, force: bool) -> AvrResult<()> {
    driver.program_enable(part)?;

    let sig = driver.read_signature(part)?;
    if sig == [0x00, 0x00, 0x00] || sig == [0xff, 0xff, 0xff] {
        if force {
            crate::log::message(crate::log::MsgKind::Warning, "no device signature found, proceeding due to -F");
            return Ok(());
        }
        return Err(AvrError::Device(DeviceError::NoSignature));
    }

    if sig != part.signature {
        if force {
            crate::log::message(
                crate::log::MsgKind::Warning,
                &format!(
                    "signature mismatch: expected {:02x?}, got {:02x?}; proceeding due to -F",
                    part.signature, sig
                ),
            );
            return Ok(());
        }
        return Err(AvrError::Device(DeviceError::SignatureMismatch { expected: part.signature, actual: sig }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AvrMem;

    struct FixedSigDriver {
        sig: [u8; 3],
    }

    impl ProgrammerDriver for FixedSigDriver {
        fn open(&mut self, _: &AvrPart) -> AvrResult<()> {
            Ok(())
        }
        fn close(&mut self) -> AvrResult<()> {
            Ok(())
        }
        fn program_enable(&mut self, _: &AvrPart) -> AvrResult<()> {
            Ok(())
        }
        fn chip_erase(&mut self, _: &AvrPart, _: &AvrMem) -> AvrResult<()> {
            Ok(())
        }
        fn read_byte(&mut self, _: &AvrPart, _: &AvrMem, _: u32) -> AvrResult<u8> {
            Ok(0)
        }
        fn write_byte(&mut self, _: &AvrPart, _: &AvrMem, _: u32, _: u8) -> AvrResult<()> {
            Ok(())
        }
        fn read_signature(&mut self, _: &AvrPart) -> AvrResult<[u8; 3]> {
            Ok(self.sig)
        }
    }

    #[test]
    fn mismatch_without_force_errors() {
        let mut part = AvrPart::new("m328p", "ATmega328P");
        part.signature = [0x1e, 0x95, 0x0f];
        let mut drv = FixedSigDriver { sig: [0x1e, 0x95, 0x02] };
        assert!(program_enable(&mut drv, &part, false).is_err());
    }

    #[test]
    fn mismatch_with_force_succeeds() {
        let mut part = AvrPart::new("m328p", "ATmega328P");
        part.signature = [0x1e, 0x95, 0x0f];
        let mut drv = FixedSigDriver { sig: [0x1e, 0x95, 0x02] };
        assert!(program_enable(&mut drv, &part, true).is_ok());
    }
}
