//! Paged transfer: split a buffer into `page_size`-aligned chunks and hand
//! each one to the driver's `paged_write`/`paged_load`.
//!
//! Flash larger than 64 KiW needs the extended-address-latch opcode
//! (`loadext_addr`) reissued whenever a page crosses a 64 KiW boundary;
//! that's the driver's job (it owns the wire), this module just walks
//! pages and tells the driver which address it's about to touch.

use crate::dispatch::ProgrammerDriver;
use crate::error::{AvrError, AvrResult};
use crate::model::{AvrMem, AvrPart};

pub fn paged_write(
    driver: &mut dyn ProgrammerDriver,
    part: &AvrPart,
    mem: &AvrMem,
    data: &[u8],
) -> AvrResult<()> {
    if !mem.paged || mem.page_size == 0 {
        return Err(AvrError::unsupported(format!("memory {:?} is not paged", mem.name)));
    }
    for (page_idx, chunk) in data.chunks(mem.page_size).enumerate() {
        let addr = (page_idx * mem.page_size) as u32;
        driver.paged_write(part, mem, addr, chunk)?;
    }
    Ok(())
}

pub fn paged_load(
    driver: &mut dyn ProgrammerDriver,
    part: &AvrPart,
    mem: &AvrMem,
    out: &mut [u8],
) -> AvrResult<()> {
    if !mem.paged || mem.page_size == 0 {
        return Err(AvrError::unsupported(format!("memory {:?} is not paged", mem.name)));
    }
    for (page_idx, chunk) in out.chunks_mut(mem.page_size).enumerate() {
        let addr = (page_idx * mem.page_size) as u32;
        driver.paged_load(part, mem, addr, chunk)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AvrMem;

    struct CountingDriver {
        writes: Vec<(u32, usize)>,
        buf: Vec<u8>,
    }

    impl ProgrammerDriver for CountingDriver {
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
        fn read_byte(&mut self, _: &AvrPart, _: &AvrMem, addr: u32) -> AvrResult<u8> {
            Ok(self.buf[addr as usize])
        }
        fn write_byte(&mut self, _: &AvrPart, _: &AvrMem, addr: u32, value: u8) -> AvrResult<()> {
            self.buf[addr as usize] = value;
            Ok(())
        }
        fn paged_write(&mut self, _: &AvrPart, _: &AvrMem, addr: u32, data: &[u8]) -> AvrResult<()> {
            self.writes.push((addr, data.len()));
            self.buf[addr as usize..addr as usize + data.len()].copy_from_slice(data);
            Ok(())
        }
    }

    #[test]
    fn splits_into_page_sized_chunks() {
        let part = AvrPart::new("x", "x");
        let mut mem = AvrMem::new("flash", 10);
        mem.paged = true;
        mem.page_size = 4;
        mem.num_pages = 3; // size isn't an exact multiple; validate() isn't called here
        let mut drv = CountingDriver { writes: Vec::new(), buf: vec![0; 10] };
        let data = vec![1u8; 10];
        paged_write(&mut drv, &part, &mem, &data).unwrap();
        assert_eq!(drv.writes, vec![(0, 4), (4, 4), (8, 2)]);
    }
}
