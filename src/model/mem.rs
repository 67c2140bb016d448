//! `AVRMEM`: one named memory region of a part.

use bitflags::bitflags;

use crate::error::{AvrError, AvrResult};
use crate::intern::IStr;

use super::opcode::{OpKind, Opcode, OP_MAX};

bitflags! {
    /// Per-byte tag: whether a byte in `buf` has a defined value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Tag: u8 {
        const ALLOCATED = 0x01;
    }
}

/// One named memory of a part: flash, eeprom, lfuse/hfuse/efuse/fuse, lock,
/// signature, calibration, sigrow, usersig/userrow, bootrow, application,
/// apptable, boot, io, sram.
#[derive(Debug, Clone)]
pub struct AvrMem {
    pub name: IStr,
    pub paged: bool,
    pub size: usize,
    pub page_size: usize,
    pub num_pages: usize,
    pub min_write_delay: u32,
    pub max_write_delay: u32,
    pub readback_p1: u8,
    pub readback_p2: u8,
    /// Offset of this memory inside the flat "any memory" address space
    ///; for `flash` sub-regions this is the offset within the
    /// flash region itself.
    pub offset: u32,
    pub initval: u8,
    pub bitmask: Option<u8>,
    pub buf: Vec<u8>,
    pub tags: Vec<Tag>,
    pub op: [Option<Opcode>; OP_MAX],
}

impl AvrMem {
    pub fn new(name: &str, size: usize) -> Self {
        AvrMem {
            name: crate::intern::intern(name),
            paged: false,
            size,
            page_size: 0,
            num_pages: 0,
            min_write_delay: 0,
            max_write_delay: 0,
            readback_p1: 0xff,
            readback_p2: 0xff,
            offset: 0,
            initval: 0xff,
            bitmask: None,
            buf: vec![0u8; size],
            tags: vec![Tag::empty(); size],
            op: [None; OP_MAX],
        }
    }

    /// Validate the paged-size invariant:
    /// `paged ⇒ page_size * num_pages == size`.
    pub fn validate(&self) -> AvrResult<()> {
        if self.paged && self.page_size.checked_mul(self.num_pages) != Some(self.size) {
            return Err(AvrError::config_free(format!(
                "memory {:?}: paged but page_size({}) * num_pages({}) != size({})",
                self.name, self.page_size, self.num_pages, self.size
            )));
        }
        if self.buf.len() != self.size || self.tags.len() != self.size {
            return Err(AvrError::config_free(format!(
                "memory {:?}: buf/tags length does not match size", self.name
            )));
        }
        Ok(())
    }

    pub fn op(&self, kind: OpKind) -> Option<&Opcode> {
        self.op[kind as usize].as_ref().filter(|o| !o.is_absent())
    }

    pub fn set_op(&mut self, kind: OpKind, op: Opcode) {
        self.op[kind as usize] = Some(op);
    }

    pub fn is_allocated(&self, i: usize) -> bool {
        self.tags.get(i).is_some_and(|t| t.contains(Tag::ALLOCATED))
    }

    pub fn mark_allocated(&mut self, range: std::ops::Range<usize>) {
        for t in &mut self.tags[range] {
            *t |= Tag::ALLOCATED;
        }
    }

    /// True if this memory's name matches one of the "any kind of flash"
    /// predicate set.
    pub fn is_flash_like(&self) -> bool {
        matches!(&*self.name, "flash" | "application" | "apptable" | "boot")
    }

    pub fn is_eeprom(&self) -> bool {
        &*self.name == "eeprom"
    }

    pub fn is_fuse_like(&self) -> bool {
        matches!(&*self.name, "lfuse" | "hfuse" | "efuse" | "fuse")
    }

    pub fn is_sigrow_like(&self) -> bool {
        matches!(&*self.name, "signature" | "calibration" | "sigrow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_invariant_holds() {
        let mut m = AvrMem::new("flash", 8192);
        m.paged = true;
        m.page_size = 64;
        m.num_pages = 128;
        assert!(m.validate().is_ok());
        m.num_pages = 127;
        assert!(m.validate().is_err());
    }

    #[test]
    fn verify_compares_only_allocated_bytes() {
        let mut m = AvrMem::new("eeprom", 4);
        m.mark_allocated(0..2);
        assert!(m.is_allocated(0));
        assert!(!m.is_allocated(2));
    }
}
