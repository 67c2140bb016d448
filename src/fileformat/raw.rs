//! Raw binary: the file *is* the memory image, starting at offset 0.

pub fn decode(buf: &[u8]) -> Vec<u8> {
    buf.to_vec()
}

pub fn encode(buf: &[u8]) -> Vec<u8> {
    buf.to_vec()
}
