//! ISP opcode templates.
//!
//! A 32-bit command/response template, one classification per bit, read
//! MSB-first (bit index 0 == the first bit sent on the wire == bit 31 of
//! the resulting 4-byte command).

use crate::error::{AvrError, AvrResult};

/// Classification of one opcode bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpBit {
    /// Fixed 0 or 1.
    Value(bool),
    /// Don't-care on output, 0 on output, ignored on input.
    Ignore,
    /// Contributes bit `n` of the target address.
    Address(u8),
    /// Command bit position of a data byte being sent (output direction).
    Output(u8),
    /// Response bit position (input direction).
    Input(u8),
}

/// One 32-bit ISP opcode template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    /// `bits[0]` is the first bit transmitted (MSB of byte 0) and `bits[31]`
    /// is the last bit transmitted (LSB of byte 3).
    pub bits: [OpBit; 32],
}

impl Opcode {
    /// An opcode template with every bit fixed at 0 — the sentinel for "not
    /// present" before the absence check collapses it to `None`.
    pub const EMPTY: Opcode = Opcode { bits: [OpBit::Value(false); 32] };

    /// True if this opcode carries no information (all-zero `VALUE` bits,
    /// no `ADDRESS`/`INPUT`/`OUTPUT` bits) — the config-file convention for
    /// "this primitive is not supported by the part".
    pub fn is_absent(&self) -> bool {
        self.bits.iter().all(|b| matches!(b, OpBit::Value(false) | OpBit::Ignore))
    }

    /// Assemble the 4-byte outgoing command for the given target address
    /// and/or input data byte.
    pub fn assemble(&self, addr: u32, input: u8) -> [u8; 4] {
        let mut out = [0u8; 4];
        for (i, bit) in self.bits.iter().enumerate() {
            let v = match *bit {
                OpBit::Value(v) => v,
                OpBit::Ignore | OpBit::Input(_) => false,
                OpBit::Address(n) => (addr >> n) & 1 != 0,
                OpBit::Output(n) => (input >> n) & 1 != 0,
            };
            if v {
                out[i / 8] |= 1 << (7 - (i % 8));
            }
        }
        out
    }

    /// Extract the result byte from a 4-byte response by gathering `INPUT`
    /// bits into their declared positions.
    pub fn extract(&self, response: [u8; 4]) -> u8 {
        let mut out = 0u8;
        for (i, bit) in self.bits.iter().enumerate() {
            if let OpBit::Input(n) = *bit {
                let byte = response[i / 8];
                let bitval = (byte >> (7 - (i % 8))) & 1;
                out |= bitval << n;
            }
        }
        out
    }

    /// Parse a whitespace/comma-separated bit-pattern string:
    /// `'0'`/`'1'` literal, `'x'` ignore, `'a'` address (auto-numbered,
    /// descending from the highest bit seen so far), `a<n>` explicit
    /// address bit, `i` input, `o` output (auto-numbered, descending).
    pub fn parse_pattern(pattern: &str) -> AvrResult<Opcode> {
        let tokens: Vec<&str> = pattern
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect();
        if tokens.len() != 32 {
            return Err(AvrError::config_free(format!(
                "opcode bit pattern must have exactly 32 bits, got {}: {pattern:?}",
                tokens.len()
            )));
        }
        let mut bits = [OpBit::Value(false); 32];
        let mut next_addr_bit: i16 = -1;
        let mut next_out_bit: i16 = -1;
        let mut next_in_bit: i16 = -1;
        for (i, tok) in tokens.iter().enumerate() {
            bits[i] = match *tok {
                "0" => OpBit::Value(false),
                "1" => OpBit::Value(true),
                "x" | "X" => OpBit::Ignore,
                "i" | "I" => {
                    let n = if next_in_bit < 0 { 7 } else { next_in_bit };
                    next_in_bit = n - 1;
                    OpBit::Input(n as u8)
                }
                "o" | "O" => {
                    let n = if next_out_bit < 0 { 7 } else { next_out_bit };
                    next_out_bit = n - 1;
                    OpBit::Output(n as u8)
                }
                t if t.eq_ignore_ascii_case("a") => {
                    let n = if next_addr_bit < 0 { 31 } else { next_addr_bit };
                    next_addr_bit = n - 1;
                    OpBit::Address(n as u8)
                }
                t if (t.starts_with('a') || t.starts_with('A')) && t[1..].parse::<u8>().is_ok() => {
                    let n: u8 = t[1..].parse().unwrap();
                    next_addr_bit = n as i16 - 1;
                    OpBit::Address(n)
                }
                other => {
                    return Err(AvrError::config_free(format!(
                        "invalid opcode bit token {other:?} in pattern {pattern:?}"
                    )))
                }
            };
        }
        Ok(Opcode { bits })
    }
}

/// The named primitives a memory's opcode table may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Read = 0,
    Write = 1,
    ReadLo = 2,
    ReadHi = 3,
    WriteLo = 4,
    WriteHi = 5,
    LoadExtAddr = 6,
    ChipErase = 7,
    PgmEnable = 8,
    /// Polled-readback style completion opcode, where distinct from `Read`.
    Poll = 9,
}

pub const OP_MAX: usize = 10;

impl OpKind {
    pub fn from_config_name(name: &str) -> Option<OpKind> {
        Some(match name {
            "read" => OpKind::Read,
            "write" => OpKind::Write,
            "read_lo" => OpKind::ReadLo,
            "read_hi" => OpKind::ReadHi,
            "write_lo" => OpKind::WriteLo,
            "write_hi" => OpKind::WriteHi,
            "loadext_addr" | "load_ext_addr" => OpKind::LoadExtAddr,
            "chip_erase" => OpKind::ChipErase,
            "pgm_enable" => OpKind::PgmEnable,
            "poll" => OpKind::Poll,
            _ => return None,
        })
    }
}

impl AvrError {
    /// Helper for opcode-pattern errors that don't have a source location
    /// at the point they're raised (pure parsing of an already-extracted
    /// string); the config layer wraps these with a `SourceLoc` before
    /// propagating.
    pub fn config_free(message: impl Into<String>) -> AvrError {
        AvrError::Config {
            loc: crate::error::SourceLoc { file: "<opcode>".into(), line: 0 },
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_read_lo() -> Opcode {
        // classic AVR "read low byte" ISP opcode:
        // 0010 0000  0000 aaaa  aaaa aaaa  oooo oooo
        Opcode::parse_pattern(
            "0 0 1 0 0 0 0 0  0 0 0 0 a a a a  a a a a a a a a  o o o o o o o o",
        )
        .unwrap()
    }

    #[test]
    fn assembles_address_bits_positionally() {
        let op = simple_read_lo();
        let cmd = op.assemble(0x1234, 0);
        // low 12 address bits occupy the low 12 bits of the 32-bit word here.
        let word = u32::from_be_bytes(cmd);
        assert_eq!(word & 0xFFF, 0x234);
        assert_eq!(word >> 24, 0b0010_0000);
    }

    #[test]
    fn extracts_input_bits() {
        let op = Opcode::parse_pattern(
            "0 0 1 0 0 0 0 0  0 0 0 0 0 0 0 0  0 0 0 0 0 0 0 0  i i i i i i i i",
        )
        .unwrap();
        let resp = [0x20, 0, 0, 0xA5];
        assert_eq!(op.extract(resp), 0xA5);
    }

    #[test]
    fn absent_opcode_is_all_zero() {
        let op = Opcode::parse_pattern(
            "0 0 0 0 0 0 0 0  0 0 0 0 0 0 0 0  0 0 0 0 0 0 0 0  0 0 0 0 0 0 0 0",
        )
        .unwrap();
        assert!(op.is_absent());
        assert!(!simple_read_lo().is_absent());
    }

    #[test]
    fn wrong_length_pattern_errors() {
        assert!(Opcode::parse_pattern("0 1 x").is_err());
    }

    proptest::proptest! {
        #[test]
        fn address_substitution_is_positional(addr_a in 0u32..0xFFFFFF, addr_b in 0u32..0xFFFFFF) {
            let op = simple_read_lo();
            let cmd_a = op.assemble(addr_a, 0);
            let cmd_b = op.assemble(addr_b, 0);
            // Only the bits the template declares ADDRESS should differ.
            let mut expected = cmd_a;
            for (i, bit) in op.bits.iter().enumerate() {
                if let OpBit::Address(n) = *bit {
                    let v = (addr_b >> n) & 1 != 0;
                    let byte = i / 8;
                    let mask = 1u8 << (7 - (i % 8));
                    if v {
                        expected[byte] |= mask;
                    } else {
                        expected[byte] &= !mask;
                    }
                }
            }
            proptest::prop_assert_eq!(expected, cmd_b);
        }
    }
}
