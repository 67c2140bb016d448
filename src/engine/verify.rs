//! Verify: compare only the bytes an `Update` actually wrote
//! (`Tag::ALLOCATED`), not the whole buffer.

use crate::error::{AvrError, AvrResult, DeviceError};
use crate::model::AvrMem;

/// Compare `device` against `mem.buf`, restricted to allocated bytes.
/// Returns the first mismatch, if any.
pub fn verify_memory(mem: &AvrMem, device: &[u8]) -> AvrResult<()> {
    if device.len() != mem.buf.len() {
        return Err(AvrError::file(format!(
            "verify buffer length {} does not match memory size {}",
            device.len(),
            mem.buf.len()
        )));
    }
    let mask = mem.bitmask.unwrap_or(0xff);
    for i in 0..mem.buf.len() {
        if !mem.is_allocated(i) {
            continue;
        }
        if (mem.buf[i] & mask) != (device[i] & mask) {
            return Err(AvrError::Device(DeviceError::VerifyMismatch {
                addr: i as u32,
                expected: mem.buf[i],
                actual: device[i],
            }));
        }
    }
    Ok(())
}
