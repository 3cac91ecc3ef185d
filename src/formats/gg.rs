//! Sega 8-bit (Game Gear / Master System) cartridge ROMs.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, u16_le};
use crate::render::Pairs;
use serde::{Deserialize, Serialize};

pub const BANK_SIZE: u64 = 16 * 1024;

const SIGNATURE: &[u8; 8] = b"TMR SEGA";
const HEADER_LEN: usize = 16;
const HEADER_OFFSETS: [u64; 3] = [0x1FF0, 0x3FF0, 0x7FF0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    SmsJapan,
    SmsExport,
    GgJapan,
    GgExport,
    GgInternational,
    Unknown,
}

impl Region {
    fn from_code(code: u8) -> Self {
        match code {
            3 => Region::SmsJapan,
            4 => Region::SmsExport,
            5 => Region::GgJapan,
            6 => Region::GgExport,
            7 => Region::GgInternational,
            _ => Region::Unknown,
        }
    }

    fn label(self) -> Option<&'static str> {
        Some(match self {
            Region::SmsJapan => "SMS Japó",
            Region::SmsExport => "SMS Exportació",
            Region::GgJapan => "GG Japó",
            Region::GgExport => "GG Exportació",
            Region::GgInternational => "GG Internacional",
            Region::Unknown => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GgHeader {
    pub checksum: u16,
    pub product_code: u32,
    pub version: u8,
    pub region: Region,
    /// Declared ROM size in KiB.
    pub rom_size_kb: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GgRecord {
    pub header: Option<GgHeader>,
}

fn rom_size_kb(code: u8) -> Option<u32> {
    Some(match code {
        0x0 => 256,
        0x1 => 512,
        0x2 => 1024,
        0xA => 8,
        0xB => 16,
        0xC => 32,
        0xD => 48,
        0xE => 64,
        0xF => 128,
        _ => return None,
    })
}

/// Decodes the 16 bytes starting at the signature.
pub fn parse_header(raw: &[u8; HEADER_LEN]) -> GgHeader {
    let product_code = u32::from(raw[0xC] & 0xF)
        + u32::from(raw[0xC] >> 4) * 10
        + u32::from(raw[0xD] & 0xF) * 100
        + u32::from(raw[0xD] >> 4) * 1000
        + u32::from(raw[0xE] >> 4) * 10000;
    GgHeader {
        checksum: u16_le(raw, 0xA),
        product_code,
        version: raw[0xE] & 0xF,
        region: Region::from_code(raw[0xF] >> 4),
        rom_size_kb: rom_size_kb(raw[0xF] & 0xF),
    }
}

pub fn extract(source: &dyn ByteSource) -> Result<GgRecord> {
    let window = ByteWindow::whole(source);
    let size = window.len();
    if size == 0 || size % BANK_SIZE != 0 {
        return Err(Error::mismatch(format!(
            "{size} bytes is not a whole number of 16 KiB banks"
        )));
    }
    let banks = size / BANK_SIZE;

    for (i, &offset) in HEADER_OFFSETS.iter().enumerate() {
        if i == 2 && banks < 2 {
            break;
        }
        let raw: [u8; HEADER_LEN] = window.read_array(offset)?;
        if &raw[..8] == SIGNATURE {
            tracing::debug!(offset, "found Sega header");
            return Ok(GgRecord {
                header: Some(parse_header(&raw)),
            });
        }
    }

    Ok(GgRecord { header: None })
}

impl GgRecord {
    pub fn render(&self, out: &mut Pairs) {
        let Some(header) = &self.header else {
            return;
        };
        out.push("Checksum", format!("{:04x}", header.checksum));
        out.push("Codi", header.product_code.to_string());
        out.push("Versió", header.version.to_string());
        if let Some(region) = header.region.label() {
            out.push("Regió", region);
        }
        if let Some(kb) = header.rom_size_kb {
            out.push("Grandària (segons capçalera)", format!("{kb} KB"));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::MemoryReader;

    fn rom(banks: usize, header_at: usize) -> Vec<u8> {
        let mut data = vec![0u8; banks * BANK_SIZE as usize];
        let h = &mut data[header_at..header_at + 16];
        h[..8].copy_from_slice(SIGNATURE);
        h[0xA..0xC].copy_from_slice(&0xBEEFu16.to_le_bytes());
        h[0xC] = 0x45;
        h[0xD] = 0x23;
        h[0xE] = 0x12;
        h[0xF] = 0x6C;
        data
    }

    pub(crate) fn sample_rom() -> Vec<u8> {
        rom(2, 0x7FF0)
    }

    #[test]
    fn test_header_fields() {
        let source = MemoryReader::new(sample_rom());
        let header = extract(&source).unwrap().header.unwrap();
        assert_eq!(header.checksum, 0xBEEF);
        assert_eq!(header.product_code, 12345);
        assert_eq!(header.version, 2);
        assert_eq!(header.region, Region::GgExport);
        assert_eq!(header.rom_size_kb, Some(32));
    }

    #[test]
    fn test_render_order() {
        let source = MemoryReader::new(rom(1, 0x3FF0));
        let mut out = Pairs::new();
        extract(&source).unwrap().render(&mut out);
        let labels: Vec<_> = out.into_vec().into_iter().map(|p| p.label).collect();
        assert_eq!(
            labels,
            ["Checksum", "Codi", "Versió", "Regió", "Grandària (segons capçalera)"]
        );
    }

    #[test]
    fn test_last_offset_needs_two_banks() {
        let mut data = vec![0u8; BANK_SIZE as usize];
        data[0x3FF0..0x3FF8].fill(0);
        let source = MemoryReader::new(data);
        let record = extract(&source).unwrap();
        assert!(record.header.is_none());

        let mut out = Pairs::new();
        record.render(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_bank_size_rules() {
        assert!(extract(&MemoryReader::new(Vec::new())).is_err());
        assert!(extract(&MemoryReader::new(vec![0u8; 1000])).is_err());
        assert!(extract(&MemoryReader::new(vec![0u8; 3 * BANK_SIZE as usize])).is_ok());
    }

    #[test]
    fn test_unknown_region_and_size_omitted() {
        let mut data = rom(1, 0x1FF0);
        data[0x1FFF] = 0x13;
        let source = MemoryReader::new(data);
        let mut out = Pairs::new();
        extract(&source).unwrap().render(&mut out);
        assert_eq!(out.len(), 3);
    }
}
