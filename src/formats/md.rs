//! Sega Mega Drive / Genesis cartridge ROMs.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, u16_be, u32_be};
use crate::render::{Pairs, checksum};
use serde::{Deserialize, Serialize};

const MIN_SIZE: u64 = 0x200;

pub const SRAM_AVAILABLE: u8 = 0x01;
pub const SRAM_BACKUP: u8 = 0x02;
pub const SRAM_ODD_BYTES: u8 = 0x04;
pub const SRAM_EVEN_BYTES: u8 = 0x08;
pub const SRAM_EEPROM: u8 = 0x10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdRecord {
    pub system: String,
    pub copyright: String,
    pub domestic_name: String,
    pub international_name: String,
    pub serial: String,
    pub checksum: u16,
    pub computed_checksum: u16,
    pub devices: String,
    pub rom_start: u32,
    pub rom_end: u32,
    pub ram_start: u32,
    pub ram_end: u32,
    pub sram_flags: u8,
    pub sram_start: u32,
    pub sram_end: u32,
    pub modem: String,
    pub region_codes: String,
}

/// How the three region bytes at 0x1F0 are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionCode {
    /// One hex digit holding a bitmask (1 Japan, 4 Americas, 8 Europe).
    Bitmask(u8),
    /// Any mix of the letters `J`, `U` and `E`.
    Letters(String),
    /// Anything else, shown as written.
    Raw(String),
}

/// Decides between the bitmask and letter conventions.
pub fn classify_region(code: &str) -> RegionCode {
    let bytes = code.as_bytes();
    if let [digit @ (b'0'..=b'9' | b'A'..=b'D' | b'F')] = bytes {
        let value = match *digit {
            d @ b'0'..=b'9' => d - b'0',
            d => d - b'A' + 0xA,
        };
        return RegionCode::Bitmask(value);
    }
    if bytes.iter().all(|b| matches!(b, b'J' | b'U' | b'E')) {
        RegionCode::Letters(code.to_string())
    } else {
        RegionCode::Raw(code.to_string())
    }
}

impl RegionCode {
    pub fn describe(&self) -> String {
        match self {
            RegionCode::Bitmask(value) => {
                let mut parts = Vec::new();
                if value & 0x01 != 0 {
                    parts.push("Japó, Corea del Sud, Taiwan");
                }
                if value & 0x04 != 0 {
                    parts.push("Estats Units d'Amèrica, Brasil");
                }
                if value & 0x08 != 0 {
                    parts.push("Europa, Hong Kong");
                }
                parts.join(", ")
            }
            RegionCode::Letters(letters) => letters
                .chars()
                .map(|c| match c {
                    'J' => "Japó",
                    'U' => "Amèrica",
                    _ => "Europa",
                })
                .collect::<Vec<_>>()
                .join(", "),
            RegionCode::Raw(code) => code.clone(),
        }
    }
}

fn header_text(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    String::from_utf8_lossy(&raw[..end]).trim().to_string()
}

/// Game names may be Shift-JIS; undecodable bytes fall back to raw text.
fn header_name(raw: &[u8]) -> String {
    match encoding_rs::SHIFT_JIS.decode_without_bom_handling_and_without_replacement(raw) {
        Some(text) => text.trim_end_matches('\0').trim().to_string(),
        None => header_text(raw),
    }
}

pub fn rom_checksum(data: &[u8]) -> u16 {
    data[MIN_SIZE as usize..]
        .chunks(2)
        .map(|w| u16::from_be_bytes([w[0], *w.get(1).unwrap_or(&0)]))
        .fold(0u16, u16::wrapping_add)
}

fn sram_flags(raw: &[u8]) -> u8 {
    let valid = raw[0] == b'R'
        && raw[1] == b'A'
        && raw[2] & 0xA7 == 0xA0
        && (raw[3] == 0x20 || raw[3] == 0x40);
    if !valid {
        return 0;
    }
    let mut flags = SRAM_AVAILABLE;
    if raw[2] & 0x40 != 0 {
        flags |= SRAM_BACKUP;
    }
    if raw[3] == 0x40 {
        flags |= SRAM_EEPROM;
    }
    match (raw[2] & 0x18) >> 3 {
        0 => flags |= SRAM_ODD_BYTES | SRAM_EVEN_BYTES,
        2 => flags |= SRAM_EVEN_BYTES,
        3 => flags |= SRAM_ODD_BYTES,
        _ => {}
    }
    flags
}

pub fn extract(source: &dyn ByteSource) -> Result<MdRecord> {
    let window = ByteWindow::whole(source);
    let size = window.len();
    if size < MIN_SIZE || size % 2 != 0 {
        return Err(Error::mismatch(format!(
            "{size} bytes is not a plausible Mega Drive ROM size"
        )));
    }
    let data = window.read_all()?;
    Ok(parse(&data))
}

/// Decodes a ROM already in memory; `data` holds at least 0x200 bytes.
pub fn parse(data: &[u8]) -> MdRecord {
    let sram_flags = sram_flags(&data[0x1B0..0x1B4]);
    let (sram_start, sram_end) = if sram_flags & SRAM_AVAILABLE != 0 {
        (u32_be(data, 0x1B4), u32_be(data, 0x1B8))
    } else {
        (0, 0)
    };

    MdRecord {
        system: header_text(&data[0x100..0x110]),
        copyright: header_text(&data[0x110..0x120]),
        domestic_name: header_name(&data[0x120..0x150]),
        international_name: header_name(&data[0x150..0x180]),
        serial: header_text(&data[0x180..0x18E]),
        checksum: u16_be(data, 0x18E),
        computed_checksum: rom_checksum(data),
        devices: header_text(&data[0x190..0x1A0]),
        rom_start: u32_be(data, 0x1A0),
        rom_end: u32_be(data, 0x1A4),
        ram_start: u32_be(data, 0x1A8),
        ram_end: u32_be(data, 0x1AC),
        sram_flags,
        sram_start,
        sram_end,
        modem: header_text(&data[0x1BC..0x1C8]),
        region_codes: header_text(&data[0x1F0..0x1F3]),
    }
}

impl MdRecord {
    fn sram_description(&self) -> String {
        let mut text = String::from(if self.sram_flags & SRAM_EEPROM != 0 {
            "EEPROM"
        } else {
            "RAM estàtica"
        });
        if self.sram_flags & SRAM_BACKUP != 0 {
            text.push_str(", sols backup");
        }
        if self.sram_flags & SRAM_ODD_BYTES != 0 {
            text.push_str(", bytes imparells");
        }
        if self.sram_flags & SRAM_EVEN_BYTES != 0 {
            text.push_str(", bytes parells");
        }
        text
    }

    pub fn render(&self, out: &mut Pairs) {
        out.push("Sistema", self.system.as_str());
        out.push("Copyright i data", self.copyright.as_str());
        out.push("Nom domèstic", self.domestic_name.as_str());
        out.push("Nom internacional", self.international_name.as_str());
        out.push("Codi de sèrie", self.serial.as_str());
        out.push(
            "Checksum",
            checksum(
                u64::from(self.checksum),
                u64::from(self.computed_checksum),
                4,
            ),
        );
        out.push_nonempty("Dispositius suportats", &self.devices);
        out.push("Inici ROM", format!("{:08x}", self.rom_start));
        out.push("Fi ROM", format!("{:08x}", self.rom_end));
        out.push("Inici RAM", format!("{:08x}", self.ram_start));
        out.push("Fi RAM", format!("{:08x}", self.ram_end));
        if self.sram_flags & SRAM_AVAILABLE != 0 {
            out.push("Memòria addicional", self.sram_description());
            out.push("Inici Mem. Add.", format!("{:08x}", self.sram_start));
            out.push("Fi Mem. Add.", format!("{:08x}", self.sram_end));
        }
        out.push_nonempty("Mòdem", &self.modem);
        if !self.region_codes.is_empty() {
            out.push("Regió", classify_region(&self.region_codes).describe());
        }
    }
}
