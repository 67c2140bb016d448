//! Textual number-list formats: decimal, hex, octal, binary, free-form
//! (auto-detected per token), and "immediate" (values embedded directly in
//! the `-U` argument instead of a file).

use crate::error::{AvrError, AvrResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    Decimal,
    Hex,
    Octal,
    Binary,
    /// Auto-detect per token: `0x`/`0X` hex, `0b`/`0B` binary, leading `0`
    /// with more digits octal, otherwise decimal.
    Auto,
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',').filter(|s| !s.is_empty())
}

fn parse_token(tok: &str, radix: Radix) -> AvrResult<u8> {
    let effective = match radix {
        Radix::Auto => detect_radix(tok),
        other => other,
    };
    let (digits, base) = match effective {
        Radix::Hex => (tok.trim_start_matches("0x").trim_start_matches("0X"), 16),
        Radix::Binary => (tok.trim_start_matches("0b").trim_start_matches("0B"), 2),
        Radix::Octal => (tok.trim_start_matches('0'), 8),
        Radix::Decimal => (tok, 10),
        Radix::Auto => unreachable!("resolved above"),
    };
    let digits = if digits.is_empty() { "0" } else { digits };
    u32::from_str_radix(digits, base)
        .ok()
        .filter(|v| *v <= 0xff)
        .map(|v| v as u8)
        .ok_or_else(|| AvrError::file(format!("invalid number {tok:?}")))
}

fn detect_radix(tok: &str) -> Radix {
    if tok.starts_with("0x") || tok.starts_with("0X") {
        Radix::Hex
    } else if tok.starts_with("0b") || tok.starts_with("0B") {
        Radix::Binary
    } else if tok.len() > 1 && tok.starts_with('0') {
        Radix::Octal
    } else {
        Radix::Decimal
    }
}

pub fn decode(text: &str, radix: Radix) -> AvrResult<Vec<u8>> {
    tokens(text).map(|t| parse_token(t, radix)).collect()
}

/// Encode bytes as a one-per-line decimal list, the canonical textual
/// readback format.
pub fn encode_decimal(buf: &[u8]) -> String {
    buf.iter().map(|b| b.to_string()).collect::<Vec<_>>().join("\n") + "\n"
}

/// Parse the `-U memtype:w:<values>:m` immediate form: a comma-separated
/// list with auto radix detection, taken straight from the argument
/// instead of a file.
pub fn decode_immediate(spec: &str) -> AvrResult<Vec<u8>> {
    decode(spec, Radix::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_decimal_list() {
        assert_eq!(decode("1 2 3", Radix::Decimal).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn decodes_hex_list_with_commas() {
        assert_eq!(decode("0x1e,0x95,0x0f", Radix::Hex).unwrap(), vec![0x1e, 0x95, 0x0f]);
    }

    #[test]
    fn auto_radix_mixes_formats() {
        assert_eq!(decode_immediate("0x0a, 012, 10, 0b11").unwrap(), vec![10, 10, 10, 3]);
    }

    #[test]
    fn out_of_range_byte_errors() {
        assert!(decode("256", Radix::Decimal).is_err());
    }
}
