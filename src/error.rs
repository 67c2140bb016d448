//! Error taxonomy for the core.
//!
//! Kinds, not types: a single enum carries every failure category so that
//! callers match on `AvrError` rather than juggling per-component error
//! types. Library code always returns `Result<T, AvrError>`; the CLI
//! boundary (`main.rs`) is the only place that converts to `anyhow::Error`.

use std::fmt;
use std::path::PathBuf;

/// A `(file, line)` coordinate used by the config grammar's fatal errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: PathBuf,
    pub line: usize,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// The top-level error kinds: callers match on these rather than on
/// per-component error types.
#[derive(Debug, thiserror::Error)]
pub enum AvrError {
    /// Grammar, missing required field, inconsistent paged size.
    #[error("{loc}: {message}")]
    Config { loc: SourceLoc, message: String },

    /// Unknown part/programmer id, missing memory.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport open/read/write/timeout/sync loss.
    #[error("transport error: {0}")]
    Transport(String),

    /// Unexpected response byte, checksum mismatch, bad record type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Program-enable failure, signature mismatch, verify mismatch, write
    /// polling exceeded max delay.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// File open/read/write, malformed record, address out of range.
    #[error("file error: {0}")]
    File(String),

    /// Primitive not defined for this part or programmer.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Device-level failures carry enough structure for the scenarios in §8 to
/// assert on (expected vs. actual bytes, failing address).
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("program enable failed after {attempts} attempts")]
    ProgramEnableFailed { attempts: u32 },

    #[error(
        "signature mismatch: expected {expected:02x?}, got {actual:02x?}"
    )]
    SignatureMismatch { expected: [u8; 3], actual: [u8; 3] },

    #[error("no device signature found (read all 0x00 or all 0xff)")]
    NoSignature,

    #[error("verify mismatch at address 0x{addr:06x}: expected 0x{expected:02x}, got 0x{actual:02x}")]
    VerifyMismatch { addr: u32, expected: u8, actual: u8 },

    #[error("write polling exceeded max delay ({max_delay_us} us) at address 0x{addr:06x}")]
    WritePollTimeout { addr: u32, max_delay_us: u32 },

    #[error("chip erase opcode not defined for this part")]
    NoEraseOpcode,
}

impl AvrError {
    pub fn config(loc: SourceLoc, message: impl Into<String>) -> Self {
        AvrError::Config { loc, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AvrError::NotFound(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        AvrError::Transport(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        AvrError::Protocol(message.into())
    }

    pub fn file(message: impl Into<String>) -> Self {
        AvrError::File(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        AvrError::Unsupported(message.into())
    }
}

pub type AvrResult<T> = Result<T, AvrError>;
