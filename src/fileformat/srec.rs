//! Motorola S-Record encode/decode.
//!
//! `S0` header, `S1`/`S2`/`S3` data with 16/24/32-bit addresses, `S5`/`S6`
//! record counts, `S7`/`S8`/`S9` start-address/termination. The encoder
//! picks the narrowest address width (S1 unless the address needs more
//! bits) the way `srec_cat`-style tools do.

use crate::error::{AvrError, AvrResult};

pub fn decode(text: &str) -> AvrResult<Vec<(u32, Vec<u8>)>> {
    let mut runs = Vec::new();
    let mut data_record_count = 0u32;
    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let rec = parse_line(line).map_err(|e| AvrError::file(format!("line {}: {e}", lineno + 1)))?;
        match rec {
            Line::Data(addr, data) => {
                runs.push((addr, data));
                data_record_count += 1;
            }
            Line::Count(declared) => {
                if declared != data_record_count {
                    return Err(AvrError::file(format!(
                        "line {}: S5/S6 record declares {declared} data records, but {data_record_count} were seen",
                        lineno + 1
                    )));
                }
            }
            Line::Other => {}
        }
    }
    Ok(runs)
}

enum Line {
    Data(u32, Vec<u8>),
    Count(u32),
    Other,
}

fn parse_line(line: &str) -> Result<Line, String> {
    let mut chars = line.chars();
    if chars.next() != Some('S') {
        return Err("record must start with 'S'".to_string());
    }
    let rectype = chars.next().ok_or("missing record type digit")?;
    let rest = &line[2..];
    let bytes = hex_bytes(rest)?;
    if bytes.is_empty() {
        return Err("record has no length byte".to_string());
    }
    let len = bytes[0] as usize;
    if bytes.len() != len + 1 {
        return Err(format!("length field {len} does not match record size"));
    }
    let checksum = *bytes.last().unwrap();
    let sum = bytes[..bytes.len() - 1].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    let computed = !sum;
    if computed != checksum {
        return Err(format!("checksum mismatch in S{rectype} record"));
    }
    let addr_width = match rectype {
        '0' | '1' | '5' | '9' => 2,
        '2' | '6' | '8' => 3,
        '3' | '7' => 4,
        _ => return Err(format!("unsupported record type S{rectype}")),
    };
    let payload = &bytes[1..bytes.len() - 1];
    if payload.len() < addr_width {
        return Err("record shorter than its address field".to_string());
    }
    let mut addr: u32 = 0;
    for b in &payload[..addr_width] {
        addr = (addr << 8) | *b as u32;
    }
    let data = payload[addr_width..].to_vec();
    match rectype {
        '1' | '2' | '3' => Ok(Line::Data(addr, data)),
        '5' | '6' => Ok(Line::Count(addr)),
        _ => Ok(Line::Other),
    }
}

fn hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| format!("invalid hex byte {:?}", &s[i..i + 2])))
        .collect()
}

/// Encode `(base_addr, buf)` choosing S1 (16-bit), S2 (24-bit), or S3
/// (32-bit) data records based on the highest address touched.
pub fn encode(base_addr: u32, buf: &[u8]) -> String {
    const CHUNK: usize = 16;
    let highest = base_addr + buf.len() as u32;
    let (rectype, addr_width) = if highest <= 0xffff {
        ('1', 2)
    } else if highest <= 0xff_ffff {
        ('2', 3)
    } else {
        ('3', 4)
    };

    let mut out = String::new();
    emit_header(&mut out);
    let mut count = 0u32;
    for (i, chunk) in buf.chunks(CHUNK).enumerate() {
        let addr = base_addr + (i * CHUNK) as u32;
        emit_data(&mut out, rectype, addr_width, addr, chunk);
        count += 1;
    }
    emit_footer(&mut out, rectype, count, base_addr, addr_width);
    out
}

fn emit_header(out: &mut String) {
    let mut payload = vec![0u8, 0u8];
    payload.extend_from_slice(b"avrtool");
    emit_record(out, '0', &payload);
}

fn emit_data(out: &mut String, rectype: char, addr_width: usize, addr: u32, data: &[u8]) {
    let mut payload = addr.to_be_bytes()[4 - addr_width..].to_vec();
    payload.extend_from_slice(data);
    emit_record(out, rectype, &payload);
}

fn emit_footer(out: &mut String, data_rectype: char, count: u32, start_addr: u32, addr_width: usize) {
    let count_rectype = match data_rectype {
        '1' => '5',
        '2' => '6',
        _ => '6',
    };
    emit_record(out, count_rectype, &count.to_be_bytes()[2..]);

    let term_rectype = match data_rectype {
        '1' => '9',
        '2' => '8',
        _ => '7',
    };
    let payload = start_addr.to_be_bytes()[4 - addr_width..].to_vec();
    emit_record(out, term_rectype, &payload);
}

fn emit_record(out: &mut String, rectype: char, payload: &[u8]) {
    let len = (payload.len() + 1) as u8;
    let mut bytes = vec![len];
    bytes.extend_from_slice(payload);
    let checksum = !bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    out.push('S');
    out.push(rectype);
    for b in &bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out.push_str(&format!("{checksum:02X}\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_small_buffer_as_s1() {
        let data = b"motorola s-record test".to_vec();
        let text = encode(0x200, &data);
        assert!(text.lines().next().unwrap().starts_with("S0"));
        let runs = decode(&text).unwrap();
        assert_eq!(runs, vec![(0x200, data)]);
    }

    #[test]
    fn large_address_uses_s3_records() {
        let data = vec![0x11u8; 8];
        let text = encode(0x0100_0000, &data);
        assert!(text.contains("S3"));
        assert!(text.contains("S7"));
    }

    #[test]
    fn correct_s5_count_is_accepted() {
        let text = encode(0x200, &vec![1u8; 40]); // three S1 chunks (16+16+8 bytes)
        assert!(decode(&text).is_ok());
    }

    #[test]
    fn s5_count_mismatch_is_fatal() {
        // One real S1 record, but the S5 count record claims two.
        let text = "S0060000617672B0\nS1090200010203040506DF\nS5030002FA\nS9030000FC\n";
        assert!(decode(text).is_err());
    }
}
