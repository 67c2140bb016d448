//! Intel Hex encode/decode, including the `IHXC` comment-record variant.
//!
//! Record types: `00` data, `01` end-of-file, `02` extended segment
//! address (`addr16 << 4`), `04` extended linear address (`addr16 << 16`).
//! `03`/`05` (start addresses) are accepted and discarded. `IHXC` is the
//! same grammar but tolerates a leading `#`-prefixed comment line, treats a
//! bad checksum as a warning instead of a fatal error, and appends a
//! trailing `#`-comment to each emitted data record (address, ASCII dump,
//! memory-region name, and — for a signature at the foot of sigrow — the
//! MCU names sharing it).

use crate::error::{AvrError, AvrResult};
use crate::log::{self, MsgKind};

use super::anymem;

const REC_DATA: u8 = 0x00;
const REC_EOF: u8 = 0x01;
const REC_EXT_SEG_ADDR: u8 = 0x02;
const REC_START_SEG_ADDR: u8 = 0x03;
const REC_EXT_LINEAR_ADDR: u8 = 0x04;
const REC_START_LINEAR_ADDR: u8 = 0x05;

/// Decode strict Intel Hex text into a sparse set of `(address, bytes)`
/// runs. A checksum mismatch is fatal.
pub fn decode(text: &str) -> AvrResult<Vec<(u32, Vec<u8>)>> {
    decode_with(text, false)
}

/// Decode `IHXC`: a checksum mismatch is a warning, not a fatal error, and
/// trailing `#`-comments on a record line are ignored.
pub fn decode_lenient(text: &str) -> AvrResult<Vec<(u32, Vec<u8>)>> {
    decode_with(text, true)
}

fn decode_with(text: &str, lenient: bool) -> AvrResult<Vec<(u32, Vec<u8>)>> {
    let mut runs = Vec::new();
    let mut upper = 0u32;
    let mut seen_eof = false;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if seen_eof {
            break;
        }
        let data_line = line.split('#').next().unwrap_or(line).trim_end();
        let rec = match parse_record(data_line, lenient) {
            Ok(rec) => rec,
            Err(e) => return Err(AvrError::file(format!("line {}: {e}", lineno + 1))),
        };
        match rec.rectype {
            REC_DATA => {
                let addr = upper + rec.addr as u32;
                runs.push((addr, rec.data));
            }
            REC_EXT_SEG_ADDR => {
                if rec.data.len() != 2 {
                    return Err(AvrError::file(format!("line {}: bad extended segment address record", lineno + 1)));
                }
                upper = (u16::from_be_bytes([rec.data[0], rec.data[1]]) as u32) << 4;
            }
            REC_EXT_LINEAR_ADDR => {
                if rec.data.len() != 2 {
                    return Err(AvrError::file(format!("line {}: bad extended linear address record", lineno + 1)));
                }
                upper = (u16::from_be_bytes([rec.data[0], rec.data[1]]) as u32) << 16;
            }
            REC_START_SEG_ADDR | REC_START_LINEAR_ADDR => {
                // Start addresses describe where a loader should jump on
                // boot; we have no loader to hand that to, so discard.
            }
            REC_EOF => seen_eof = true,
            other => return Err(AvrError::file(format!("line {}: unsupported record type {other:02x}", lineno + 1))),
        }
    }
    if !seen_eof {
        return Err(AvrError::file("missing Intel Hex end-of-file record".to_string()));
    }
    Ok(runs)
}

struct Record {
    rectype: u8,
    addr: u16,
    data: Vec<u8>,
}

fn parse_record(line: &str, lenient: bool) -> Result<Record, String> {
    let line = line.strip_prefix(':').ok_or("record must start with ':'")?;
    let bytes = hex_bytes(line)?;
    if bytes.len() < 5 {
        return Err("record too short".to_string());
    }
    let len = bytes[0] as usize;
    if bytes.len() != len + 5 {
        return Err(format!("length field {len} does not match record size"));
    }
    let addr = u16::from_be_bytes([bytes[1], bytes[2]]);
    let rectype = bytes[3];
    let data = bytes[4..4 + len].to_vec();
    let checksum = bytes[4 + len];
    let computed = bytes[..4 + len].iter().fold(0u8, |acc, b| acc.wrapping_add(*b)).wrapping_neg();
    if computed != checksum {
        if lenient {
            log::message(
                MsgKind::Warning,
                &format!("IHXC checksum mismatch: expected {checksum:02x}, computed {computed:02x}"),
            );
        } else {
            return Err(format!("checksum mismatch: expected {checksum:02x}, computed {computed:02x}"));
        }
    }
    Ok(Record { rectype, addr, data })
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

/// Well-known AVR signature bytes and the MCU names sharing them, used by
/// the `IHXC` sigrow comment. A signature not in this small built-in table
/// simply gets no MCU comment: this is not a complete device database.
const SIGNATURE_CATALOGUE: &[([u8; 3], &[&str])] = &[
    ([0x1e, 0x95, 0x0f], &["atmega328p"]),
    ([0x1e, 0x95, 0x14], &["atmega328"]),
    ([0x1e, 0x93, 0x07], &["atmega8"]),
    ([0x1e, 0x94, 0x06], &["atmega168", "atmega168a"]),
    ([0x1e, 0x97, 0x02], &["atmega1280"]),
    ([0x1e, 0x98, 0x01], &["atmega2560"]),
];

fn mcu_names_for_signature(sig: [u8; 3]) -> Option<&'static [&'static str]> {
    SIGNATURE_CATALOGUE.iter().find(|(s, _)| *s == sig).map(|(_, names)| *names)
}

/// Encode `(base_addr, buf)` as strict Intel Hex text, emitting an extended
/// linear address record whenever the 64 KiB segment changes.
pub fn encode(base_addr: u32, buf: &[u8]) -> String {
    encode_with(base_addr, buf, None)
}

/// Encode as `IHXC`: each data record gets a trailing `#`-comment with its
/// address, an ASCII dump, the memory region it lands in, and (for a
/// signature at the start of sigrow) the MCU names sharing it.
pub fn encode_commented(base_addr: u32, buf: &[u8]) -> String {
    encode_with(base_addr, buf, Some(()))
}

const CHUNK: usize = 32;

fn encode_with(base_addr: u32, buf: &[u8], commented: Option<()>) -> String {
    let mut out = String::new();
    let mut last_upper: Option<u32> = None;

    for (i, chunk) in buf.chunks(CHUNK).enumerate() {
        let addr = base_addr + (i * CHUNK) as u32;
        let upper = addr >> 16;
        if last_upper != Some(upper) {
            emit_record(&mut out, 0, REC_EXT_LINEAR_ADDR, &(upper as u16).to_be_bytes(), None);
            last_upper = Some(upper);
        }
        let comment = commented.map(|()| record_comment(addr, chunk));
        emit_record(&mut out, (addr & 0xffff) as u16, REC_DATA, chunk, comment.as_deref());
    }
    emit_record(&mut out, 0, REC_EOF, &[], None);
    out
}

fn record_comment(addr: u32, chunk: &[u8]) -> String {
    let (region, _local) = anymem::from_flat(addr);
    let ascii: String = chunk
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect();
    let mut comment = format!("{addr:06x} {ascii} [{region}]");
    if region == "signature" && chunk.len() >= 3 {
        if let Some(names) = mcu_names_for_signature([chunk[0], chunk[1], chunk[2]]) {
            comment.push_str(&format!(" ({})", names.join(", ")));
        }
    }
    comment
}

fn emit_record(out: &mut String, addr: u16, rectype: u8, data: &[u8], comment: Option<&str>) {
    let mut bytes = vec![data.len() as u8];
    bytes.extend_from_slice(&addr.to_be_bytes());
    bytes.push(rectype);
    bytes.extend_from_slice(data);
    let checksum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)).wrapping_neg();
    out.push(':');
    for b in &bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out.push_str(&format!("{checksum:02X}"));
    if let Some(c) = comment {
        out.push_str(" #");
        out.push_str(c);
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_short_buffer() {
        let data = b"hello world, avr!".to_vec();
        let text = encode(0x100, &data);
        let runs = decode(&text).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0], (0x100, data));
    }

    #[test]
    fn extended_linear_address_record_on_segment_crossing() {
        let data = vec![0xAAu8; 32];
        let text = encode(0x1_fff0, &data);
        assert!(text.contains(":02000004"));
    }

    #[test]
    fn default_record_length_is_32() {
        let data = vec![0xAAu8; 64];
        let text = encode(0, &data);
        let data_lines: Vec<&str> = text.lines().filter(|l| l.len() > 8 && &l[7..9] == "00").collect();
        assert_eq!(data_lines.len(), 2);
        assert_eq!(&data_lines[0][1..3], "20");
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let text = ":0100000000AA\n:00000001FF\n";
        assert!(decode(text).is_err());
    }

    #[test]
    fn bad_checksum_is_a_warning_under_lenient_decode() {
        let text = ":0100000000AA\n:00000001FF\n";
        assert!(decode_lenient(text).is_ok());
    }

    #[test]
    fn missing_eof_record_is_rejected() {
        let text = ":0100000000FF\n";
        assert!(decode(text).is_err());
    }

    #[test]
    fn leading_comment_line_is_ignored() {
        let text = "# generated by avrtool\n:00000001FF\n";
        assert!(decode(text).is_ok());
    }

    #[test]
    fn start_address_records_are_discarded_not_fatal() {
        let text = ":0400000300000000F9\n:00000001FF\n";
        let runs = decode(text).unwrap();
        assert!(runs.is_empty());
    }

    #[test]
    fn extended_start_linear_address_record_is_discarded_not_fatal() {
        let text = ":0400000500000000F7\n:00000001FF\n";
        let runs = decode(text).unwrap();
        assert!(runs.is_empty());
    }

    #[test]
    fn commented_encode_appends_trailing_comment() {
        let text = encode_commented(0, &[0x41, 0x42, 0x43]);
        assert!(text.lines().next().unwrap().contains("#000000 ABC [flash]"));
    }

    #[test]
    fn commented_decode_ignores_trailing_comment() {
        let text = encode_commented(0, &[1, 2, 3]);
        let runs = decode_lenient(&text).unwrap();
        assert_eq!(runs[0], (0, vec![1, 2, 3]));
    }
}
