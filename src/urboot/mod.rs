//! Urboot bootloader generator: catalogue search, baud/opcode patching,
//! and image assembly.
//!
//! [`generate`] is the end-to-end entry point: parse a `urboot:<feature
//! string>`, pick the closest-matching catalogue template, patch its baud
//! registers, pin assignments, and `INSYNC`/`OK` bytes, and place the
//! result at the top of the part's flash.

pub mod baud;
pub mod image;
pub mod template;
pub mod tokens;

use crate::error::{AvrError, AvrResult};
use crate::model::AvrPart;

use tokens::{FeatureRequest, LedMode, UrbootTokens};

/// Word offsets (into a [`CatalogueEntry::bytes`]) of the patchable
/// instruction slots a template carries. `None` means the template has no
/// such slot (e.g. a part with no chip-select line).
#[derive(Debug, Clone, Copy)]
pub struct TemplateSites {
    pub brrlo_word: Option<usize>,
    pub brrhi_word: Option<usize>,
    pub led_word: Option<usize>,
    pub cs_word: Option<usize>,
    pub insync_word: usize,
    pub ok_word: usize,
}

/// One entry in the urboot catalogue: a pseudo-filename, the raw bytes of
/// that prebuilt template image, the word offsets of its patch sites, and
/// the `mcuid` urboot's own device table assigns this part.
pub struct CatalogueEntry {
    pub name: String,
    pub bytes: Vec<u8>,
    pub sites: TemplateSites,
    pub mcuid: u32,
}

/// A small built-in set of synthetic templates, standing in for urboot's
/// real prebuilt release images (which this exercise has no way to
/// fetch). See `DESIGN.md` for why these are placeholders rather than
/// real urboot binaries.
pub fn built_in_catalogue() -> Vec<CatalogueEntry> {
    let sites = TemplateSites { brrlo_word: Some(0), brrhi_word: Some(1), led_word: Some(2), cs_word: Some(3), insync_word: 4, ok_word: 5 };
    vec![
        CatalogueEntry {
            name: "urboot_atmega328p_16MHz_uart0_115200_u4.hex".to_string(),
            bytes: synthetic_template(64),
            sites,
            mcuid: 1,
        },
        CatalogueEntry {
            name: "urboot_atmega2560_16MHz_uart0_115200_u4.hex".to_string(),
            bytes: synthetic_template(64),
            sites,
            mcuid: 2,
        },
        CatalogueEntry {
            name: "urboot_atmega328p_8MHz_uart0_9600_u0.hex".to_string(),
            bytes: synthetic_template(64),
            sites,
            mcuid: 1,
        },
    ]
}

/// Build a `total_words`-word template: `nop` (`MOV R0,R0`, `0x2C00`)
/// everywhere except the six fixed patch slots, which start out as
/// bare `LDI`/`SBI` opcodes ready for their immediate/port-bit fields to
/// be overwritten.
fn synthetic_template(total_words: usize) -> Vec<u8> {
    let mut words = vec![0x2C00u16; total_words];
    words[0] = 0xE000; // LDI (UBRRL)
    words[1] = 0xE000; // LDI (UBRRH)
    words[2] = 0x9800; // SBI/CBI (LED)
    words[3] = 0x9800; // SBI/CBI (CS)
    words[4] = 0xE000; // LDI (INSYNC)
    words[5] = 0xE000; // LDI (OK)
    words.into_iter().flat_map(u16::to_le_bytes).collect()
}

/// Find the catalogue entry whose tokens best match `wanted`, preferring
/// an exact match over progressively looser ones, and falling back
/// through update levels `u4..u0` when `wanted.features` requests a
/// specific update level that isn't available.
pub fn find_best<'a>(catalogue: &'a [CatalogueEntry], wanted: &UrbootTokens) -> AvrResult<&'a CatalogueEntry> {
    let mut best: Option<(&'a CatalogueEntry, u32)> = None;
    for entry in catalogue {
        let tok = tokens::parse_catalogue_name(&entry.name);
        let Some(score) = score_match(wanted, &tok) else { continue };
        if best.as_ref().is_none_or(|(_, s)| score > *s) {
            best = Some((entry, score));
        }
    }
    best.map(|(e, _)| e).ok_or_else(|| {
        AvrError::not_found(format!(
            "no urboot image in the catalogue matches mcu={:?} clock={:?} uart={:?} baud={:?}",
            wanted.mcu, wanted.clock_hz, wanted.uart, wanted.baud
        ))
    })
}

/// Score a candidate against the request; `None` if it's outright
/// disqualified (wrong MCU or clock).
fn score_match(wanted: &UrbootTokens, candidate: &UrbootTokens) -> Option<u32> {
    if let (Some(w), Some(c)) = (&wanted.mcu, &candidate.mcu) {
        if w != c {
            return None;
        }
    }
    if let (Some(w), Some(c)) = (wanted.clock_hz, candidate.clock_hz) {
        if w != c {
            return None;
        }
    }
    let mut score = 1;
    if wanted.uart.is_some() && wanted.uart == candidate.uart {
        score += 2;
    }
    if wanted.baud.is_some() && wanted.baud == candidate.baud {
        score += 2;
    }
    score += update_level(candidate).unwrap_or(0);
    Some(score)
}

/// Extract the `u0`..`u4` update-level feature token, if present.
fn update_level(tok: &UrbootTokens) -> Option<u32> {
    tok.features.iter().find_map(|f| {
        f.strip_prefix('u').and_then(|n| n.parse::<u32>().ok()).filter(|n| *n <= 4)
    })
}

/// Given a requested update level that has no exact catalogue match,
/// widen the search by stepping the level down from `u4` to `u0` and
/// retrying.
pub fn find_with_level_fallback<'a>(
    catalogue: &'a [CatalogueEntry],
    wanted: &UrbootTokens,
    requested_level: u32,
) -> AvrResult<&'a CatalogueEntry> {
    for level in (0..=requested_level).rev() {
        let mut w = wanted.clone();
        w.features.retain(|f| !f.starts_with('u'));
        w.features.push(format!("u{level}"));
        if let Ok(entry) = find_best(catalogue, &w) {
            return Ok(entry);
        }
    }
    find_best(catalogue, wanted)
}

/// Bitmask summarising the boolean feature tokens, folded into the
/// `INSYNC`/`OK` remap and the version/feature footer.
fn feature_bits(req: &FeatureRequest) -> u32 {
    let mut bits = 0u32;
    if req.autobaud {
        bits |= 1 << 0;
    }
    if req.swio {
        bits |= 1 << 1;
    }
    if req.dual {
        bits |= 1 << 2;
    }
    if req.hw {
        bits |= 1 << 3;
    }
    if req.pr {
        bits |= 1 << 4;
    }
    if req.ee {
        bits |= 1 << 5;
    }
    if req.ce {
        bits |= 1 << 6;
    }
    bits
}

/// The fixed 6-byte version/feature table urboot appends at the very end
/// of the image.
fn version_feature_table(req: &FeatureRequest, insync: u8, ok: u8) -> [u8; 6] {
    let bits = feature_bits(req);
    [insync, ok, req.uart.unwrap_or(0), req.update_level.unwrap_or(4), (bits & 0xff) as u8, ((bits >> 8) & 0xff) as u8]
}

/// Parse a `urboot:<feature string>`, search `catalogue` for the closest
/// template, patch its baud registers, LED/chip-select pins, and
/// `INSYNC`/`OK` bytes, and return `(flash_offset, image_bytes)` ready for
/// `fileformat`-style output.
pub fn generate(part: &AvrPart, feature_string: &str, catalogue: &[CatalogueEntry]) -> AvrResult<(u32, Vec<u8>)> {
    let req = tokens::parse_feature_string(feature_string)?;
    if req.help || req.list || req.show {
        return Err(AvrError::unsupported("urboot: show/list/help tokens are informational, not an image request"));
    }

    let level = req.update_level.unwrap_or(4);
    let wanted = UrbootTokens {
        mcu: Some(part.id.to_ascii_lowercase()),
        clock_hz: req.fcpu_hz(),
        uart: req.uart.map(|n| format!("uart{n}")),
        baud: req.baud,
        features: vec![format!("u{level}")],
    };
    let entry = find_with_level_fallback(catalogue, &wanted, level as u32)?;

    let mut body = entry.bytes.clone();

    let f_cpu = req.fcpu_hz().unwrap_or(16_000_000);
    let baud = req.baud.unwrap_or(115_200);
    let (ubrr, _u2x) = baud::best_ubrr(f_cpu, baud, true, false);
    if let Some(w) = entry.sites.brrlo_word {
        template::patch_ldi(&mut body, w, (ubrr & 0xff) as u8)?;
    }
    if let Some(w) = entry.sites.brrhi_word {
        template::patch_ldi(&mut body, w, (ubrr >> 8) as u8)?;
    }

    if let (Some(w), Some(LedMode::Pin { pin, .. })) = (entry.sites.led_word, req.led) {
        template::patch_port_bit(&mut body, w, pin.port_io_addr(), pin.bit)?;
    }
    if let (Some(w), Some(pin)) = (entry.sites.cs_word, req.cs_pin) {
        template::patch_port_bit(&mut body, w, pin.port_io_addr(), pin.bit)?;
    }

    let (insync, ok) = template::insync_ok_for_mcu(feature_bits(&req), entry.mcuid);
    template::patch_ldi(&mut body, entry.sites.insync_word, insync)?;
    template::patch_ldi(&mut body, entry.sites.ok_word, ok)?;

    let fill = req.fill.as_ref().map(|s| s.as_bytes().to_vec()).unwrap_or_default();
    let mut footer = Vec::new();
    if let Some(serial) = &req.serialno {
        footer.extend_from_slice(serial.as_bytes());
    }
    footer.extend_from_slice(&version_feature_table(&req, insync, ok));

    let segments = image::ImageSegments {
        vector_stub: Vec::new(),
        body,
        config_block: fill,
        footer,
        reset_redirect: Vec::new(),
    };
    image::place_in_flash(part, &segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AvrMem;

    fn entry(name: &str) -> CatalogueEntry {
        CatalogueEntry {
            name: name.to_string(),
            bytes: synthetic_template(64),
            sites: TemplateSites { brrlo_word: Some(0), brrhi_word: Some(1), led_word: Some(2), cs_word: Some(3), insync_word: 4, ok_word: 5 },
            mcuid: 0,
        }
    }

    #[test]
    fn finds_exact_mcu_clock_match() {
        let cat = vec![
            entry("urboot_atmega328p_16MHz_uart0_115200_u4.hex"),
            entry("urboot_atmega2560_16MHz_uart0_115200_u4.hex"),
        ];
        let wanted = tokens::parse_catalogue_name("atmega328p_16MHz_uart0_115200");
        let best = find_best(&cat, &wanted).unwrap();
        assert!(best.name.contains("atmega328p"));
    }

    #[test]
    fn falls_back_to_lower_update_level() {
        let cat = vec![entry("urboot_atmega328p_16MHz_uart0_115200_u1.hex")];
        let wanted = tokens::parse_catalogue_name("atmega328p_16MHz_uart0_115200");
        let best = find_with_level_fallback(&cat, &wanted, 4).unwrap();
        assert!(best.name.contains("u1"));
    }

    #[test]
    fn no_match_is_not_found_error() {
        let cat = vec![entry("urboot_attiny85_8MHz_uart0_9600_u0.hex")];
        let wanted = tokens::parse_catalogue_name("atmega328p_16MHz_uart0_115200");
        assert!(find_best(&cat, &wanted).is_err());
    }

    fn part_with_flash(id: &str, size: usize) -> AvrPart {
        let mut part = AvrPart::new(id, id);
        part.mem.push(AvrMem::new("flash", size));
        part
    }

    #[test]
    fn generate_produces_an_image_that_fits_flash() {
        let part = part_with_flash("atmega328p", 32 * 1024);
        let cat = built_in_catalogue();
        let (offset, image) = generate(&part, "urboot:16MHz_115k2_uart0_led+b5_ee_ce", &cat).unwrap();
        assert!(offset as usize + image.len() <= 32 * 1024);
        assert!(!image.is_empty());
    }

    #[test]
    fn generate_patches_baud_registers_into_the_body() {
        let part = part_with_flash("atmega328p", 32 * 1024);
        let cat = built_in_catalogue();
        let (_, image) = generate(&part, "urboot:16MHz_19200baud_uart0", &cat).unwrap();
        let word0 = u16::from_le_bytes([image[0], image[1]]);
        assert_eq!(word0 & 0xF000, 0xE000); // still an LDI
        let expected_ubrr = baud::classic_ubrr(16_000_000, 19_200);
        let k = (((word0 & 0x0F00) >> 4) | (word0 & 0x000F)) as u8;
        assert_eq!(k, (expected_ubrr & 0xff) as u8);
    }

    #[test]
    fn generate_rejects_list_and_show_tokens() {
        let part = part_with_flash("atmega328p", 32 * 1024);
        let cat = built_in_catalogue();
        assert!(generate(&part, "urboot:list", &cat).is_err());
        assert!(generate(&part, "urboot:show", &cat).is_err());
    }

    #[test]
    fn generate_fails_when_no_mcu_match_in_catalogue() {
        let part = part_with_flash("attiny13", 1024);
        let cat = built_in_catalogue();
        assert!(generate(&part, "urboot:16MHz_uart0_115200", &cat).is_err());
    }
}
