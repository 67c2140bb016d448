//! Command-line surface: a flat set of single-letter flags in
//! the tradition of the tools this one follows, parsed with `clap`'s
//! derive API.

use std::path::PathBuf;

use clap::Parser;

use avrtool::model::{FileFormat, Op, Update};

#[derive(Debug, Parser)]
#[command(name = "avrtool", about = "Programmer and verifier for AVR/AVR32 non-volatile memories")]
pub struct Cli {
    /// Part id (`-p <partno>`).
    #[arg(short = 'p', long = "part")]
    pub part: String,

    /// Programmer id (`-c <programmer-id>`).
    #[arg(short = 'c', long = "programmer")]
    pub programmer: String,

    /// Port/device the programmer is attached to.
    #[arg(short = 'P', long = "port")]
    pub port: Option<String>,

    /// Override bit-clock period or frequency.
    #[arg(short = 'B', long = "bitclock")]
    pub bitclock: Option<String>,

    /// Override baud rate.
    #[arg(short = 'b', long = "baudrate")]
    pub baudrate: Option<u32>,

    /// Config file to load instead of the default search path.
    #[arg(short = 'C', long = "config")]
    pub config: Option<PathBuf>,

    /// One or more `memtype:op:filename[:format]` memory operations.
    #[arg(short = 'U', long = "update", value_parser = parse_update_arg)]
    pub updates: Vec<RawUpdate>,

    /// Erase the chip before writing.
    #[arg(short = 'e', long = "erase")]
    pub erase: bool,

    /// Disable automatic verify-after-write.
    #[arg(short = 'V', long = "no-verify")]
    pub no_verify: bool,

    /// Don't write anything, just show what would happen.
    #[arg(short = 'n', long = "no-write")]
    pub no_write: bool,

    /// Override an inconsistent or unknown device signature.
    #[arg(short = 'F', long = "force")]
    pub force: bool,

    /// Increase logging verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all but warnings and errors.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Disable the automatic chip erase that a flash write otherwise
    /// triggers.
    #[arg(short = 'D', long = "disable-auto-erase")]
    pub disable_auto_erase: bool,

    /// When reading, trim the result to the address of the last non-0xff
    /// byte plus one instead of returning the whole memory.
    #[arg(long = "hi-trim")]
    pub hi_trim: bool,

    /// Print the resolved part/programmer/memory configuration and exit.
    #[arg(long = "show-config")]
    pub show_config: bool,
}

/// A not-yet-typed `-U` argument, resolved against the chosen part once
/// it's known (a memtype name alone isn't enough to build an `Update`
/// until the config DB confirms it exists).
#[derive(Debug, Clone)]
pub struct RawUpdate {
    pub memtype: String,
    pub op: Op,
    pub filename: PathBuf,
    pub format: FileFormat,
}

impl RawUpdate {
    pub fn into_update(self) -> Update {
        Update::new(&self.memtype, self.op, self.filename, self.format)
    }
}

fn parse_update_arg(s: &str) -> Result<RawUpdate, String> {
    let parts: Vec<&str> = s.splitn(4, ':').collect();
    if parts.len() < 3 {
        return Err(format!("expected memtype:op:filename[:format], got {s:?}"));
    }
    let memtype = parts[0].to_string();
    let op = match parts[1] {
        "r" => Op::Read,
        "w" => Op::Write,
        "v" => Op::Verify,
        other => return Err(format!("unknown update op {other:?} (expected r, w, or v)")),
    };
    let filename = PathBuf::from(parts[2]);
    let format = match parts.get(3) {
        None => FileFormat::Auto,
        Some(f) => {
            let c = f.chars().next().ok_or("empty format specifier")?;
            FileFormat::from_flag(c).ok_or_else(|| format!("unknown format flag {c:?}"))?
        }
    };
    Ok(RawUpdate { memtype, op, filename, format })
}
