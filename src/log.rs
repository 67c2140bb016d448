//! Structured logging facility.
//!
//! A thin adapter over `tracing` that maps the historical message-kind
//! taxonomy (`MSG_EXT_ERROR`, `MSG_ERROR`, `MSG_WARNING`, `MSG_INFO`,
//! `MSG_NOTICE`, `MSG_DEBUG`/`MSG_TRACE`) onto `tracing` levels, and tracks
//! a process-global quell level set once from CLI flags via an
//! `AtomicU8` initialized exactly once at startup.

use std::sync::atomic::{AtomicU8, Ordering};

/// Message kind, ordered from least to most severe quell priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MsgKind {
    Trace = 0,
    Debug = 1,
    Notice = 2,
    Info = 3,
    Warning = 4,
    Error = 5,
    ExtError = 6,
}

/// Process-global quell level: kinds strictly below this are suppressed.
/// Quell flags suppress "from the bottom up": raising the level
/// hides `Trace`, then `Debug`, then `Notice`, etc., but `ExtError` is never
/// suppressed.
static QUELL_LEVEL: AtomicU8 = AtomicU8::new(MsgKind::Info as u8);

/// Initialize the quell level from repeated `-v`/`-q` CLI flags and install
/// the `tracing_subscriber` formatter. Call exactly once, from `main`.
pub fn init(verbose_count: u8, quiet: bool) {
    let level = if quiet {
        MsgKind::Warning
    } else {
        match verbose_count {
            0 => MsgKind::Info,
            1 => MsgKind::Notice,
            2 => MsgKind::Debug,
            _ => MsgKind::Trace,
        }
    };
    QUELL_LEVEL.store(level as u8, Ordering::Relaxed);

    let filter = match level {
        MsgKind::Trace => "trace",
        MsgKind::Debug => "debug",
        MsgKind::Notice => "info",
        MsgKind::Info => "info",
        MsgKind::Warning | MsgKind::Error | MsgKind::ExtError => "warn",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .without_time()
        .try_init();
}

/// Returns `true` if a message of `kind` would currently be emitted.
pub fn enabled(kind: MsgKind) -> bool {
    kind as u8 >= QUELL_LEVEL.load(Ordering::Relaxed)
}

/// Emit a message at the given kind, honoring the quell level.
///
/// Quell flags suppress from the bottom up: `ExtError` always prints
/// regardless of quell level, the top of the stack is never quelled.
pub fn message(kind: MsgKind, msg: &str) {
    if kind == MsgKind::ExtError || enabled(kind) {
        match kind {
            MsgKind::ExtError | MsgKind::Error => tracing::error!("{msg}"),
            MsgKind::Warning => tracing::warn!("{msg}"),
            MsgKind::Info => tracing::info!("{msg}"),
            MsgKind::Notice => tracing::debug!("{msg}"),
            MsgKind::Debug | MsgKind::Trace => tracing::trace!("{msg}"),
        }
    }
}

/// Report progress for a long operation at fixed completion percentages
/// (0, 10, 20, … 100), suppressing repeats of the same percentage.
pub struct ProgressReporter {
    label: String,
    total: usize,
    last_pct: i8,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, total: usize) -> Self {
        Self { label: label.into(), total: total.max(1), last_pct: -1 }
    }

    /// Update with the number of units completed so far.
    pub fn update(&mut self, done: usize) {
        let pct = ((done as u64 * 100) / self.total as u64) as i8;
        let bucket = (pct / 10) * 10;
        if bucket != self.last_pct {
            self.last_pct = bucket;
            message(MsgKind::Info, &format!("{} ... {}%", self.label, bucket));
        }
    }

    pub fn finish(&mut self) {
        if self.last_pct < 100 {
            self.last_pct = 100;
            message(MsgKind::Info, &format!("{} ... 100%", self.label));
        }
    }
}
