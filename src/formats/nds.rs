//! Nintendo DS cartridge ROMs.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, str_trim_nul, u16_le, u32_le, utf16le_until_nul};
use crate::picture::{NDS_ICON_BITMAP_SIZE, NDS_ICON_PALETTE_SIZE, NdsIcon, Picture};
use crate::render::{Pairs, checksum, size_to_text};
use serde::{Deserialize, Serialize};

const HEADER_SIZE: usize = 0x1000;
const CRC_SPAN: usize = 0x15E;
const BANNER_OFFSET: u64 = 0x68;
const BANNER_BITMAP: usize = 0x20;
const BANNER_PALETTE: usize = 0x220;
const BANNER_TITLES: usize = 0x240;
const TITLE_SIZE: usize = 0x100;
/// Capacity code 0 is 128 KiB.
const CAPACITY_BASE_SHIFT: u32 = 17;

const TITLE_LANGUAGES: [&str; 8] = [
    "Japonès", "Anglès", "Francès", "Alemany", "Italià", "Espanyol", "Xinès", "Coreà",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdsRecord {
    pub title: String,
    pub game_code: String,
    pub maker_code: String,
    pub unit_code: u8,
    /// Device capacity code: the cartridge holds `128 KiB << code`.
    pub capacity_code: u8,
    pub region: u8,
    pub rom_version: u8,
    pub header_checksum: u16,
    pub computed_header_checksum: u16,
    /// Banner titles in `TITLE_LANGUAGES` order; absent languages are empty.
    pub titles: Vec<String>,
}

/// Header CRC-16 as the DS boot ROM computes it.
pub fn crc16(data: &[u8]) -> u16 {
    const VAL: [u32; 8] = [0xC0C1, 0xC181, 0xC301, 0xC601, 0xCC01, 0xD801, 0xF001, 0xA001];
    let mut crc: u32 = 0xFFFF;
    for &b in data {
        crc ^= u32::from(b);
        for (j, v) in VAL.iter().enumerate() {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ (v << (7 - j));
            } else {
                crc >>= 1;
            }
        }
    }
    crc as u16
}

/// Size of the banner for a given banner version.
fn banner_size(version: u16) -> usize {
    match version {
        0 | 1 => 0x840,
        2 => 0x940,
        _ => 0x1240,
    }
}

/// Reads the icon/title banner, or `None` when the ROM has none.
fn read_banner(window: ByteWindow<'_>) -> Result<Option<Vec<u8>>> {
    let raw: [u8; 4] = window.read_array(BANNER_OFFSET)?;
    let offset = u64::from(u32_le(&raw, 0));
    if offset == 0 {
        return Ok(None);
    }
    let version: [u8; 2] = window.read_array(offset)?;
    let size = banner_size(u16_le(&version, 0));
    window.read_vec(window.base() + offset, size).map(Some)
}

fn banner_titles(banner: &[u8]) -> Vec<String> {
    let version = u16_le(banner, 0);
    let count = match version {
        0 | 1 => 6,
        2 => 7,
        _ => 8,
    };
    (0..count)
        .map(|i| {
            let start = BANNER_TITLES + i * TITLE_SIZE;
            utf16le_until_nul(&banner[start..start + TITLE_SIZE])
        })
        .collect()
}

pub fn extract(source: &dyn ByteSource) -> Result<NdsRecord> {
    let window = ByteWindow::whole(source);
    if window.len() < HEADER_SIZE as u64 {
        return Err(Error::mismatch("file too small for a Nintendo DS ROM"));
    }
    let header: [u8; HEADER_SIZE] = window.read_array(0)?;

    let titles = match read_banner(window)? {
        Some(banner) => banner_titles(&banner),
        None => Vec::new(),
    };

    Ok(NdsRecord {
        title: str_trim_nul(&header[..0x0C]),
        game_code: String::from_utf8_lossy(&header[0x0C..0x10]).into_owned(),
        maker_code: String::from_utf8_lossy(&header[0x10..0x12]).into_owned(),
        unit_code: header[0x12],
        capacity_code: header[0x14],
        region: header[0x1D],
        rom_version: header[0x1E],
        header_checksum: u16_le(&header, CRC_SPAN),
        computed_header_checksum: crc16(&header[..CRC_SPAN]),
        titles,
    })
}

/// Decodes the 32x32 banner icon.
pub fn image(source: &dyn ByteSource) -> Result<Picture> {
    let window = ByteWindow::whole(source);
    if window.len() < HEADER_SIZE as u64 {
        return Err(Error::mismatch("file too small for a Nintendo DS ROM"));
    }
    let banner = read_banner(window)?.ok_or_else(|| Error::mismatch("ROM has no banner"))?;
    let icon = NdsIcon::new(
        &banner[BANNER_BITMAP..BANNER_BITMAP + NDS_ICON_BITMAP_SIZE],
        &banner[BANNER_PALETTE..BANNER_PALETTE + NDS_ICON_PALETTE_SIZE],
    )?;
    Ok(Picture::Nds(icon))
}

impl NdsRecord {
    /// Capacity in bytes, or `None` when the code does not fit in 64 bits.
    pub fn capacity_bytes(&self) -> Option<u64> {
        let shift = u32::from(self.capacity_code) + CAPACITY_BASE_SHIFT;
        (shift < u64::BITS).then(|| 1u64 << shift)
    }

    pub fn render(&self, out: &mut Pairs) {
        out.push("Títol capçalera", self.title.as_str());
        out.push("Codi", self.game_code.as_str());
        out.push("Codi fabricant", self.maker_code.as_str());
        let device = match self.unit_code {
            0x00 => Some("Nintendo DS"),
            0x02 => Some("Nintendo DS/DSi"),
            0x03 => Some("Nintendo DSi"),
            _ => None,
        };
        if let Some(device) = device {
            out.push("Dispositiu", device);
        }
        let capacity = match self.capacity_bytes() {
            Some(bytes) => size_to_text(bytes),
            None => format!("codi {:#04x}", self.capacity_code),
        };
        out.push("Grandària (capçalera)", capacity);
        let region = match self.region {
            0x00 => Some("Normal"),
            0x80 => Some("Xina"),
            0x40 => Some("Corea"),
            _ => None,
        };
        if let Some(region) = region {
            out.push("Regió consola", region);
        }
        out.push("Versió ROM", format!("{:02x}", self.rom_version));
        out.push(
            "Checksum",
            checksum(
                u64::from(self.header_checksum),
                u64::from(self.computed_header_checksum),
                4,
            ),
        );
        for (title, language) in self.titles.iter().zip(TITLE_LANGUAGES) {
            if !title.is_empty() {
                out.push(&format!("Títol ({language})"), title.replace('\n', " | "));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::MemoryReader;

    fn utf16(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    pub(crate) fn sample_rom(with_banner: bool) -> Vec<u8> {
        let mut data = vec![0u8; 0x2000];
        data[..8].copy_from_slice(b"SUPERGAME");
        data[0x0C..0x10].copy_from_slice(b"ASMP");
        data[0x10..0x12].copy_from_slice(b"01");
        data[0x14] = 7;
        data[0x1E] = 1;
        if with_banner {
            data[0x68..0x6C].copy_from_slice(&0x1000u32.to_le_bytes());
            let banner = &mut data[0x1000..0x1840];
            banner[0..2].copy_from_slice(&1u16.to_le_bytes());
            banner[BANNER_BITMAP] = 0x11;
            banner[BANNER_PALETTE + 2..BANNER_PALETTE + 4].copy_from_slice(&0x7FFFu16.to_le_bytes());
            let english = utf16("Super Game\nNintendo");
            let start = BANNER_TITLES + TITLE_SIZE;
            banner[start..start + english.len()].copy_from_slice(&english);
        }
        let crc = crc16(&data[..CRC_SPAN]);
        data[CRC_SPAN..CRC_SPAN + 2].copy_from_slice(&crc.to_le_bytes());
        data
    }

    #[test]
    fn test_header_fields() {
        let source = MemoryReader::new(sample_rom(true));
        let record = extract(&source).unwrap();
        assert_eq!(record.title, "SUPERGAM");
        assert_eq!(record.game_code, "ASMP");
        assert_eq!(record.capacity_bytes(), Some(16 * 1024 * 1024));
        assert_eq!(record.header_checksum, record.computed_header_checksum);
        assert_eq!(record.titles.len(), 6);
        assert_eq!(record.titles[1], "Super Game\nNintendo");

        let mut out = Pairs::new();
        record.render(&mut out);
        let pairs = out.into_vec();
        assert_eq!(pairs[3].value, "Nintendo DS");
        assert_eq!(pairs[4].value, "16.0 MB (16777216 B)");
        let title = pairs.last().unwrap();
        assert_eq!(title.label, "Títol (Anglès)");
        assert_eq!(title.value, "Super Game | Nintendo");
    }

    #[test]
    fn test_icon() {
        let source = MemoryReader::new(sample_rom(true));
        let picture = image(&source).unwrap();
        assert_eq!(picture.dimensions(), (32, 32));
        assert_eq!(picture.pixel(0, 0).0, [0xffff, 0xffff, 0xffff, 0xffff]);
        assert_eq!(picture.pixel(0, 1).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_without_banner() {
        let source = MemoryReader::new(sample_rom(false));
        assert!(extract(&source).unwrap().titles.is_empty());
        let err = image(&source).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FormatMismatch);
    }

    #[test]
    fn test_crc_detects_change() {
        let data = sample_rom(false);
        let mut other = data.clone();
        other[0] ^= 1;
        assert_ne!(crc16(&data[..CRC_SPAN]), crc16(&other[..CRC_SPAN]));
    }

    #[test]
    fn test_huge_capacity_codes() {
        for (code, expected) in [
            (0x2E, "8589934592.0 GB"),
            (0x2F, "codi 0x2f"),
            (0x30, "codi 0x30"),
            (0x3F, "codi 0x3f"),
            (0xFF, "codi 0xff"),
        ] {
            let mut data = vec![0u8; 0x1000];
            data[0x14] = code;
            let record = extract(&MemoryReader::new(data)).unwrap();
            let mut out = Pairs::new();
            record.render(&mut out);
            let pairs = out.into_vec();
            let size = pairs.iter().find(|p| p.label == "Grandària (capçalera)").unwrap();
            assert!(size.value.contains(expected), "{code:#x}: {}", size.value);
        }
    }

    #[test]
    fn test_too_small() {
        assert!(extract(&MemoryReader::new(vec![0u8; 0x800])).is_err());
    }
}
