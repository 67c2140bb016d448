//! `Update`: one requested file↔device transfer.

use std::path::PathBuf;

use crate::intern::IStr;

/// Direction of an `Update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
    Verify,
}

/// File format, as named on the `-U` flag or auto-detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Auto,
    IntelHex,
    IntelHexComment,
    SRecord,
    Raw,
    Elf,
    Decimal,
    Hex,
    Octal,
    Binary,
    Immediate,
}

impl FileFormat {
    pub fn from_flag(c: char) -> Option<FileFormat> {
        Some(match c {
            'a' => FileFormat::Auto,
            'i' => FileFormat::IntelHex,
            'I' => FileFormat::IntelHexComment,
            's' => FileFormat::SRecord,
            'r' => FileFormat::Raw,
            'e' => FileFormat::Elf,
            'd' => FileFormat::Decimal,
            'h' => FileFormat::Hex,
            'o' => FileFormat::Octal,
            'b' => FileFormat::Binary,
            'm' => FileFormat::Immediate,
            _ => return None,
        })
    }
}

/// One `-U memtype:op:filename[:format]` request.
#[derive(Debug, Clone)]
pub struct Update {
    pub memtype: IStr,
    pub op: Op,
    pub filename: PathBuf,
    pub format: FileFormat,
}

impl Update {
    pub fn new(memtype: &str, op: Op, filename: impl Into<PathBuf>, format: FileFormat) -> Self {
        Update { memtype: crate::intern::intern(memtype), op, filename: filename.into(), format }
    }

    /// `true` for the `-U <memtype>:w:filename:i` style that both writes
    /// and then immediately verifies.
    pub fn is_write(&self) -> bool {
        self.op == Op::Write
    }
}
