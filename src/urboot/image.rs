//! Assembly of the final bootloader image from its five segments
//!: vector table stub, bootloader body, baud/pin
//! configuration block, version/feature footer, and the application reset
//! vector redirect.

use crate::error::{AvrError, AvrResult};
use crate::model::AvrPart;

pub struct ImageSegments {
    pub vector_stub: Vec<u8>,
    pub body: Vec<u8>,
    pub config_block: Vec<u8>,
    pub footer: Vec<u8>,
    pub reset_redirect: Vec<u8>,
}

impl ImageSegments {
    /// Total size; must fit within the part's flash minus the application
    /// area the bootloader leaves for user code.
    pub fn total_len(&self) -> usize {
        self.vector_stub.len() + self.body.len() + self.config_block.len() + self.footer.len() + self.reset_redirect.len()
    }

    /// Concatenate the five segments in boot-execution order.
    pub fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        out.extend_from_slice(&self.vector_stub);
        out.extend_from_slice(&self.body);
        out.extend_from_slice(&self.config_block);
        out.extend_from_slice(&self.footer);
        out.extend_from_slice(&self.reset_redirect);
        out
    }
}

/// Place the assembled image at the top of `part`'s flash (the
/// conventional bootloader section) and return the resulting
/// `(flash_offset, bytes)` pair ready for `fileformat::write_update`-style
/// output.
pub fn place_in_flash(part: &AvrPart, segments: &ImageSegments) -> AvrResult<(u32, Vec<u8>)> {
    let flash = part
        .find_mem_like(|m| m.is_flash_like())
        .ok_or_else(|| AvrError::unsupported("part has no flash memory"))?;
    let image = segments.assemble();
    if image.len() > flash.size {
        return Err(AvrError::file(format!(
            "urboot image ({} bytes) does not fit in flash ({} bytes)",
            image.len(),
            flash.size
        )));
    }
    let offset = (flash.size - image.len()) as u32;
    Ok((offset, image))
}
