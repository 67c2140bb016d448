//! Programmer and verifier for AVR/AVR32 non-volatile memories: flash,
//! EEPROM, fuses, lock bits, and the rest of the memories a config file
//! declares.
//!
//! The binary (`main.rs`) is a thin CLI wrapper; everything it does goes
//! through this library so the core logic stays usable and testable
//! independent of `clap`/`serialport`.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fileformat;
pub mod intern;
pub mod log;
pub mod model;
pub mod urboot;
