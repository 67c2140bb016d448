//! Urboot feature-string grammar and catalogue pseudo-filename tokens.
//!
//! Two distinct grammars live here: [`parse_feature_string`] parses the
//! `urboot:<token>_<token>...` request a user types on the command line
//! (§4.6 of the bootloader generator); [`parse_catalogue_name`] parses the
//! `urboot_<mcu>_<clock>_...` pseudo-filenames the built-in template
//! catalogue is keyed by. They don't share a token set: the feature
//! string never names an MCU (that comes from the already-selected `-p`
//! part), while the catalogue name always starts with one.

use crate::error::{AvrError, AvrResult};

/// A pin reference: port letter `a..h`, bit `0..7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin {
    pub port: char,
    pub bit: u8,
}

impl Pin {
    fn parse(s: &str) -> AvrResult<Pin> {
        let mut chars = s.chars();
        let port = chars.next().ok_or_else(|| AvrError::file("empty pin spec"))?;
        let bit_ch = chars.next().ok_or_else(|| AvrError::file(format!("pin {s:?} missing bit digit")))?;
        if chars.next().is_some() {
            return Err(AvrError::file(format!("pin {s:?} has trailing characters")));
        }
        if !('a'..='h').contains(&port) {
            return Err(AvrError::file(format!("pin {s:?}: port {port:?} out of range a..h")));
        }
        let bit = bit_ch.to_digit(10).ok_or_else(|| AvrError::file(format!("pin {s:?}: bit {bit_ch:?} is not a digit")))?;
        if bit > 7 {
            return Err(AvrError::file(format!("pin {s:?}: bit {bit} not bit-addressable (0..7)")));
        }
        Ok(Pin { port, bit: bit as u8 })
    }

    /// I/O-space address (as used by `SBI`/`CBI`/`SBIC`/`SBIS`, range
    /// `0x00..0x20`) of this pin's `PIN<port>` register, under the
    /// conventional sequential `PINx`/`DDRx`/`PORTx` layout (port `a` ->
    /// `0x00`, `b` -> `0x03`, ...).
    pub fn pin_io_addr(self) -> u8 {
        3 * (self.port as u8 - b'a')
    }

    pub fn ddr_io_addr(self) -> u8 {
        self.pin_io_addr() + 1
    }

    pub fn port_io_addr(self) -> u8 {
        self.pin_io_addr() + 2
    }
}

/// Oscillator correction applied to a requested `F_CPU`: `x`/`i` carry no
/// numeric correction (they just record external vs. internal), `a..h`
/// slow the nominal frequency by `1.25% * step`, `j..q` speed it up by the
/// same per-letter step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OscCorrection {
    External,
    Internal,
    Slow(u8),
    Fast(u8),
    #[default]
    None,
}

impl OscCorrection {
    fn from_letter(c: char) -> Option<OscCorrection> {
        match c {
            'x' => Some(OscCorrection::External),
            'i' => Some(OscCorrection::Internal),
            'a'..='h' => Some(OscCorrection::Slow(c as u8 - b'a' + 1)),
            'j'..='q' => Some(OscCorrection::Fast(c as u8 - b'j' + 1)),
            _ => None,
        }
    }

    /// Apply the correction to a nominal frequency in Hz.
    pub fn apply(self, nominal_hz: u32) -> u32 {
        match self {
            OscCorrection::External | OscCorrection::Internal | OscCorrection::None => nominal_hz,
            OscCorrection::Slow(step) => {
                (nominal_hz as f64 * (1.0 - 0.0125 * step as f64)).round() as u32
            }
            OscCorrection::Fast(step) => {
                (nominal_hz as f64 * (1.0 + 0.0125 * step as f64)).round() as u32
            }
        }
    }
}

/// LED pin polarity: `led+<pin>` is active-high, `led-<pin>` active-low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    /// No LED code patched in at all (template placeholders left as nop).
    Nop,
    /// LED feature present but disabled (`no-led`).
    Disabled,
    Pin { pin: Pin, active_high: bool },
}

/// The parsed `urboot:<token>...` feature request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRequest {
    pub wdt_timeout_ms: Option<u32>,
    pub autobaud: bool,
    pub uart: Option<u8>,
    pub alt: Option<u8>,
    pub baud: Option<u32>,
    pub fcpu_nominal_hz: Option<u32>,
    pub fcpu_correction: OscCorrection,
    pub swio: bool,
    pub rx_pin: Option<Pin>,
    pub tx_pin: Option<Pin>,
    pub led: Option<LedMode>,
    pub dual: bool,
    pub cs_pin: Option<Pin>,
    pub hw: bool,
    pub pr: bool,
    pub ee: bool,
    pub ce: bool,
    pub update_level: Option<u8>,
    pub vector: Option<String>,
    pub serialno: Option<String>,
    pub fill: Option<String>,
    pub save: Option<(Option<String>, Option<String>)>,
    pub best: bool,
    pub show: bool,
    pub list: bool,
    pub help: bool,
}

impl FeatureRequest {
    /// The effective `F_CPU` after applying the oscillator correction, if
    /// a clock was requested at all.
    pub fn fcpu_hz(&self) -> Option<u32> {
        self.fcpu_nominal_hz.map(|hz| self.fcpu_correction.apply(hz))
    }
}

/// Parse a `urboot:<token>(_<token>)*(.hex)?` feature string (the part
/// after the `urboot:` prefix, if still present, is stripped).
pub fn parse_feature_string(s: &str) -> AvrResult<FeatureRequest> {
    let s = s.strip_prefix("urboot:").unwrap_or(s);
    let s = s.strip_suffix(".hex").unwrap_or(s);
    let mut req = FeatureRequest { fcpu_correction: OscCorrection::None, ..Default::default() };

    for tok in s.split('_').filter(|t| !t.is_empty()) {
        parse_token(tok, &mut req)?;
    }
    Ok(req)
}

fn parse_token(tok: &str, req: &mut FeatureRequest) -> AvrResult<()> {
    match tok {
        "250ms" => return set_wdt(req, 250),
        "500ms" => return set_wdt(req, 500),
        "1s" => return set_wdt(req, 1000),
        "2s" => return set_wdt(req, 2000),
        "4s" => return set_wdt(req, 4000),
        "8s" => return set_wdt(req, 8000),
        "autobaud" => {
            req.autobaud = true;
            return Ok(());
        }
        "swio" => {
            req.swio = true;
            return Ok(());
        }
        "lednop" => {
            req.led = Some(LedMode::Nop);
            return Ok(());
        }
        "no-led" => {
            req.led = Some(LedMode::Disabled);
            return Ok(());
        }
        "dual" => {
            req.dual = true;
            return Ok(());
        }
        "hw" => {
            req.hw = true;
            return Ok(());
        }
        "pr" => {
            req.pr = true;
            return Ok(());
        }
        "ee" => {
            req.ee = true;
            return Ok(());
        }
        "ce" => {
            req.ce = true;
            return Ok(());
        }
        "best" => {
            req.best = true;
            return Ok(());
        }
        "show" => {
            req.show = true;
            return Ok(());
        }
        "list" => {
            req.list = true;
            return Ok(());
        }
        "help" => {
            req.help = true;
            return Ok(());
        }
        _ => {}
    }

    if let Some(rest) = tok.strip_prefix("uart") {
        if let Ok(n) = rest.parse::<u8>() {
            req.uart = Some(n);
            return Ok(());
        }
    }
    if let Some(rest) = tok.strip_prefix("alt") {
        if let Ok(n) = rest.parse::<u8>() {
            req.alt = Some(n);
            return Ok(());
        }
    }
    if let Some(rest) = tok.strip_prefix("rx") {
        if let Ok(pin) = Pin::parse(rest) {
            req.rx_pin = Some(pin);
            return Ok(());
        }
    }
    if let Some(rest) = tok.strip_prefix("tx") {
        if let Ok(pin) = Pin::parse(rest) {
            req.tx_pin = Some(pin);
            return Ok(());
        }
    }
    if let Some(rest) = tok.strip_prefix("cs") {
        if let Ok(pin) = Pin::parse(rest) {
            req.cs_pin = Some(pin);
            return Ok(());
        }
    }
    if let Some(rest) = tok.strip_prefix("led+") {
        req.led = Some(LedMode::Pin { pin: Pin::parse(rest)?, active_high: true });
        return Ok(());
    }
    if let Some(rest) = tok.strip_prefix("led-") {
        req.led = Some(LedMode::Pin { pin: Pin::parse(rest)?, active_high: false });
        return Ok(());
    }
    if let Some(rest) = tok.strip_prefix('u') {
        if let Ok(n @ 0..=4) = rest.parse::<u8>() {
            req.update_level = Some(n);
            return Ok(());
        }
    }
    if let Some(rest) = tok.strip_prefix('v') {
        if !rest.is_empty() {
            req.vector = Some(rest.to_string());
            return Ok(());
        }
    }
    if let Some(rest) = tok.strip_prefix("serialno=") {
        req.serialno = Some(rest.to_string());
        return Ok(());
    }
    if let Some(rest) = tok.strip_prefix("fill=") {
        req.fill = Some(rest.to_string());
        return Ok(());
    }
    if tok == "save" {
        req.save = Some((None, None));
        return Ok(());
    }
    if let Some(rest) = tok.strip_prefix("save=") {
        let (file, fmt) = match rest.split_once(':') {
            Some((f, fmt)) => (f.to_string(), Some(fmt.to_string())),
            None => (rest.to_string(), None),
        };
        req.save = Some((Some(file), fmt));
        return Ok(());
    }
    if let Some(baud) = parse_baud_token(tok) {
        req.baud = Some(baud);
        return Ok(());
    }
    if let Some((nominal, correction)) = parse_fcpu_token(tok) {
        req.fcpu_nominal_hz = Some(nominal);
        req.fcpu_correction = correction;
        return Ok(());
    }

    Err(AvrError::file(format!("unrecognized urboot feature token {tok:?}")))
}

fn set_wdt(req: &mut FeatureRequest, ms: u32) -> AvrResult<()> {
    req.wdt_timeout_ms = Some(ms);
    Ok(())
}

/// `115k2` (1152 00, 'k' marks the thousands digit split) or `19200baud`.
fn parse_baud_token(tok: &str) -> Option<u32> {
    if let Some(digits) = tok.strip_suffix("baud") {
        return digits.parse::<u32>().ok();
    }
    if let Some(k_pos) = tok.find('k') {
        if tok.ends_with(|c: char| c.is_ascii_digit()) {
            let (whole, frac) = tok.split_at(k_pos);
            let frac = &frac[1..];
            let whole: u32 = whole.parse().ok()?;
            if frac.is_empty() {
                return Some(whole * 1000);
            }
            let frac: u32 = frac.parse().ok()?;
            let scale = 10u32.checked_pow(frac.to_string().len() as u32)?;
            return Some(whole * 1000 + frac * 1000 / scale);
        }
    }
    None
}

/// `16MHz`, `x8m0`, `i1MHz`: an optional correction-letter prefix, a
/// number (where `m` may stand in for a decimal point, e.g. `8m0` = 8.0),
/// and an optional `MHz`/`Hz` suffix.
fn parse_fcpu_token(tok: &str) -> Option<(u32, OscCorrection)> {
    let mut chars = tok.chars();
    let first = chars.next()?;
    let (correction, rest) = match OscCorrection::from_letter(first) {
        Some(c) if tok.len() > 1 && tok.as_bytes()[1].is_ascii_digit() => (c, &tok[first.len_utf8()..]),
        _ => (OscCorrection::None, tok),
    };

    let lower = rest.to_ascii_lowercase();
    let (numeric, is_mhz) = if let Some(n) = lower.strip_suffix("mhz") {
        (n, true)
    } else if let Some(n) = lower.strip_suffix("hz") {
        (n, false)
    } else if lower.contains('m') && lower.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        // No explicit unit suffix: `8m0` is shorthand for `8.0MHz`, the
        // `m` standing in for the decimal point.
        (lower.as_str(), true)
    } else {
        return None;
    };
    if numeric.is_empty() {
        return None;
    }
    let normalized = numeric.replacen('m', ".", 1);
    let value: f64 = normalized.parse().ok()?;
    let hz = if is_mhz { value * 1_000_000.0 } else { value };
    Some((hz.round() as u32, correction))
}

/// Catalogue pseudo-filename tokens: `urboot_<mcu>_<clock>_<uart>_<baud>_<feature>...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrbootTokens {
    pub mcu: Option<String>,
    pub clock_hz: Option<u32>,
    pub uart: Option<String>,
    pub baud: Option<u32>,
    pub features: Vec<String>,
}

/// Parse a pseudo-filename (with or without a path/extension) into its
/// token set.
pub fn parse_catalogue_name(name: &str) -> UrbootTokens {
    let stem = name
        .rsplit('/')
        .next()
        .unwrap_or(name)
        .strip_suffix(".hex")
        .or_else(|| name.strip_suffix(".bin"))
        .unwrap_or(name);
    let stem = stem.strip_prefix("urboot_").unwrap_or(stem);

    let mut out = UrbootTokens::default();
    for (i, tok) in stem.split('_').enumerate() {
        if tok.is_empty() {
            continue;
        }
        if i == 0 {
            out.mcu = Some(tok.to_ascii_lowercase());
            continue;
        }
        if let Some(mhz) = tok.strip_suffix("MHz").or_else(|| tok.strip_suffix("mhz")) {
            if let Ok(v) = mhz.parse::<f64>() {
                out.clock_hz = Some((v * 1_000_000.0) as u32);
                continue;
            }
        }
        if tok.starts_with("uart") {
            out.uart = Some(tok.to_string());
            continue;
        }
        if let Ok(v) = tok.parse::<u32>() {
            if v >= 300 {
                out.baud = Some(v);
                continue;
            }
        }
        out.features.push(tok.to_string());
    }
    out
}
