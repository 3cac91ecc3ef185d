//! Game Boy and Game Boy Color cartridge ROMs.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, u16_be};
use crate::render::{Pairs, checksum, yes_no};
use serde::{Deserialize, Serialize};

pub const BANK_SIZE: u64 = 16 * 1024;

const NINTENDO_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

const TITLE: usize = 0x134;
const MANUFACTURER: usize = 0x13F;
const CGB_FLAG: usize = 0x143;
const OLD_LICENSEE_NEW_FORMAT: u8 = 0x33;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CgbSupport {
    GbcOnly,
    GbcCompatible,
    Gb,
}

impl CgbSupport {
    fn label(self) -> &'static str {
        match self {
            CgbSupport::GbcOnly => "GBC",
            CgbSupport::GbcCompatible => "GBC/GB",
            CgbSupport::Gb => "GB",
        }
    }

    pub fn is_color(self) -> bool {
        self != CgbSupport::Gb
    }
}

/// Classifies the CGB flag byte at 0x143.
///
/// Any flag with bit 7 set also satisfies `flag & 0xC0 != 0`, so every
/// colour cartridge lands on [`CgbSupport::GbcOnly`]. Catalogued entries
/// depend on that result, so it is kept.
pub fn classify_cgb(flag: u8) -> CgbSupport {
    if flag & 0x80 != 0 {
        if flag & 0xC0 != 0 {
            CgbSupport::GbcOnly
        } else {
            CgbSupport::GbcCompatible
        }
    } else {
        CgbSupport::Gb
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GbcRecord {
    pub title: String,
    pub manufacturer: String,
    pub cgb: CgbSupport,
    pub old_licensee: u8,
    pub new_licensee: String,
    pub sgb: bool,
    pub mapper: String,
    /// Declared ROM size in 16 KiB banks.
    pub rom_banks: Option<u32>,
    pub ram_kb: Option<u32>,
    pub japanese: bool,
    pub version: u8,
    pub header_checksum: u8,
    pub computed_header_checksum: u8,
    pub global_checksum: u16,
    pub computed_global_checksum: u16,
    pub nintendo_logo: bool,
}

fn mapper_name(code: u8) -> String {
    let name = match code {
        0x00 => "ROM",
        0x01 => "MBC1",
        0x02 => "MBC1+RAM",
        0x03 => "MBC1+RAM+BATTERY",
        0x05 => "MBC2",
        0x06 => "MBC2+BATTERY",
        0x08 => "ROM+RAM",
        0x09 => "ROM+RAM+BATTERY",
        0x0B => "MMM01",
        0x0C => "MMM01+RAM",
        0x0D => "MMM01+RAM+BATTERY",
        0x0F => "MBC3+TIMER+BATTERY",
        0x10 => "MBC3+TIMER+RAM+BATTERY",
        0x11 => "MBC3",
        0x12 => "MBC3+RAM",
        0x13 => "MBC3+RAM+BATTERY",
        0x15 => "MBC4",
        0x16 => "MBC4+RAM",
        0x17 => "MBC4+RAM+BATTERY",
        0x19 => "MBC5",
        0x1A => "MBC5+RAM",
        0x1B => "MBC5+RAM+BATTERY",
        0x1C => "MBC5+RUMBLE",
        0x1D => "MBC5+RUMBLE+RAM",
        0x1E => "MBC5+RUMBLE+RAM+BATTERY",
        0xFC => "POCKET CAMERA",
        0xFD => "BANDAI TAMA5",
        0xFE => "HuC3",
        0xFF => "HuC1+RAM+BATTERY",
        _ => return format!("UNK ({code:02X})"),
    };
    name.to_string()
}

fn rom_banks(code: u8) -> Option<u32> {
    match code {
        0..8 => Some(2 << code),
        0x52 => Some(72),
        0x53 => Some(80),
        0x54 => Some(96),
        _ => None,
    }
}

fn ram_kb(code: u8) -> Option<u32> {
    match code {
        0 => Some(0),
        1 => Some(2),
        2 => Some(8),
        3 => Some(32),
        _ => None,
    }
}

pub fn header_checksum(data: &[u8]) -> u8 {
    data[0x134..=0x14C]
        .iter()
        .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1))
}

pub fn global_checksum(data: &[u8]) -> u16 {
    data.iter()
        .enumerate()
        .filter(|&(i, _)| i != 0x14E && i != 0x14F)
        .fold(0u16, |acc, (_, &b)| acc.wrapping_add(u16::from(b)))
}

/// Splits the title area into title and manufacturer code.
fn title_and_manufacturer(data: &[u8], cgb: CgbSupport) -> (String, String) {
    let area = &data[TITLE..TITLE + 16];
    if !cgb.is_color() {
        // Monochrome titles stop at the first byte that is not A-Z.
        let end = area
            .iter()
            .position(|b| !b.is_ascii_uppercase())
            .unwrap_or(16);
        let title = String::from_utf8_lossy(&area[..end]).into_owned();
        return (title, String::new());
    }

    let len = area[..15]
        .iter()
        .position(|&b| !(b.is_ascii_uppercase() || b == b' '))
        .unwrap_or(15);
    let mut title = String::from_utf8_lossy(&area[..len]).into_owned();

    let code = &data[MANUFACTURER..MANUFACTURER + 4];
    let mut manufacturer = String::new();
    if (len <= 11 || len == 15) && code.iter().all(u8::is_ascii_uppercase) {
        manufacturer = String::from_utf8_lossy(code).into_owned();
        if manufacturer.len() < title.len() && title.ends_with(&manufacturer) {
            title.truncate(title.len() - manufacturer.len());
        }
    }
    (title, manufacturer)
}

pub fn extract(source: &dyn ByteSource) -> Result<GbcRecord> {
    let window = ByteWindow::whole(source);
    let size = window.len();
    if size == 0 || size % BANK_SIZE != 0 {
        return Err(Error::mismatch(format!(
            "{size} bytes is not a whole number of 16 KiB banks"
        )));
    }
    let data = window.read_all()?;
    Ok(parse(&data))
}

/// Decodes a full ROM image already in memory; `data` spans at least one bank.
pub fn parse(data: &[u8]) -> GbcRecord {
    let cgb = classify_cgb(data[CGB_FLAG]);
    let (title, manufacturer) = title_and_manufacturer(data, cgb);
    let old_licensee = data[0x14B];
    let new_licensee = if old_licensee == OLD_LICENSEE_NEW_FORMAT {
        String::from_utf8_lossy(&data[0x144..0x146]).into_owned()
    } else {
        String::new()
    };

    GbcRecord {
        title,
        manufacturer,
        cgb,
        old_licensee,
        new_licensee,
        sgb: data[0x146] == 0x03,
        mapper: mapper_name(data[0x147]),
        rom_banks: rom_banks(data[0x148]),
        ram_kb: ram_kb(data[0x149]),
        japanese: data[0x14A] == 0,
        version: data[0x14C],
        header_checksum: data[0x14D],
        computed_header_checksum: header_checksum(data),
        global_checksum: u16_be(data, 0x14E),
        computed_global_checksum: global_checksum(data),
        nintendo_logo: data[0x104..0x134] == NINTENDO_LOGO,
    }
}

impl GbcRecord {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Títol", self.title.as_str());
        out.push_nonempty("Fabricant", &self.manufacturer);
        out.push("Compatibilitat", self.cgb.label());
        let license = if self.old_licensee == OLD_LICENSEE_NEW_FORMAT {
            self.new_licensee.clone()
        } else {
            format!("{:02x}", self.old_licensee)
        };
        out.push("Llicència", license);
        out.push_yes_no("Suport SGB", self.sgb);
        out.push("Mapper", self.mapper.as_str());
        if let Some(banks) = self.rom_banks {
            out.push("Grandària (segons capçalera)", format!("{} KB", banks * 16));
        }
        if let Some(kb) = self.ram_kb {
            out.push("Grandària SRAM", format!("{kb} KB"));
        }
        out.push("ROM japonesa", yes_no(self.japanese));
        out.push(
            "Checksum",
            checksum(
                u64::from(self.header_checksum),
                u64::from(self.computed_header_checksum),
                2,
            ),
        );
        out.push(
            "Checksum global",
            checksum(
                u64::from(self.global_checksum),
                u64::from(self.computed_global_checksum),
                4,
            ),
        );
        out.push_yes_no("Logo Nintendo", self.nintendo_logo);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::MemoryReader;

    /// A one-bank colour ROM with valid checksums.
    pub(crate) fn sample_rom() -> Vec<u8> {
        let mut data = vec![0u8; BANK_SIZE as usize];
        data[0x104..0x134].copy_from_slice(&NINTENDO_LOGO);
        data[TITLE..TITLE + 11].copy_from_slice(b"POKEMONAAXJ");
        data[MANUFACTURER..MANUFACTURER + 4].copy_from_slice(b"AAXJ");
        data[CGB_FLAG] = 0x80;
        data[0x144..0x146].copy_from_slice(b"01");
        data[0x146] = 0x03;
        data[0x147] = 0x1B;
        data[0x148] = 0x00;
        data[0x149] = 0x03;
        data[0x14A] = 0x01;
        data[0x14B] = 0x33;
        data[0x14D] = header_checksum(&data);
        let global = global_checksum(&data);
        data[0x14E..0x150].copy_from_slice(&global.to_be_bytes());
        data
    }

    #[test]
    fn test_classify_cgb() {
        assert_eq!(classify_cgb(0x00), CgbSupport::Gb);
        assert_eq!(classify_cgb(0x80), CgbSupport::GbcOnly);
        assert_eq!(classify_cgb(0xC0), CgbSupport::GbcOnly);
        assert_eq!(classify_cgb(0x40), CgbSupport::Gb);
    }

    #[test]
    fn test_colour_rom_fields() {
        let source = MemoryReader::new(sample_rom());
        let record = extract(&source).unwrap();
        assert_eq!(record.title, "POKEMON");
        assert_eq!(record.manufacturer, "AAXJ");
        assert_eq!(record.new_licensee, "01");
        assert_eq!(record.mapper, "MBC5+RAM+BATTERY");
        assert_eq!(record.rom_banks, Some(2));
        assert_eq!(record.ram_kb, Some(32));
        assert!(record.nintendo_logo);
        assert_eq!(record.header_checksum, record.computed_header_checksum);
        assert_eq!(record.global_checksum, record.computed_global_checksum);

        let mut out = Pairs::new();
        record.render(&mut out);
        let pairs = out.into_vec();
        let labels: Vec<_> = pairs.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(
            labels,
            [
                "Títol",
                "Fabricant",
                "Compatibilitat",
                "Llicència",
                "Suport SGB",
                "Mapper",
                "Grandària (segons capçalera)",
                "Grandària SRAM",
                "ROM japonesa",
                "Checksum",
                "Checksum global",
                "Logo Nintendo",
            ]
        );
        assert_eq!(pairs[6].value, "32 KB");
        assert!(pairs[9].value.ends_with("(Sí)"));
    }

    #[test]
    fn test_corrupted_checksum_is_data() {
        let mut data = sample_rom();
        let good = data[0x14D];
        data[0x14D] = good.wrapping_add(1);
        let source = MemoryReader::new(data.clone());
        let record = extract(&source).unwrap();

        let mut out = Pairs::new();
        record.render(&mut out);
        let pairs = out.into_vec();
        let line = &pairs.iter().find(|p| p.label == "Checksum").unwrap().value;
        assert_eq!(
            line,
            &format!("{:02x} (No != {:02x})", good.wrapping_add(1), good)
        );
    }

    #[test]
    fn test_mono_title_and_unknown_mapper() {
        let mut data = vec![0u8; 2 * BANK_SIZE as usize];
        data[TITLE..TITLE + 8].copy_from_slice(b"TETRIS  ");
        data[0x147] = 0x42;
        data[0x148] = 0x99;
        let record = parse(&data);
        assert_eq!(record.cgb, CgbSupport::Gb);
        assert_eq!(record.title, "TETRIS");
        assert_eq!(record.mapper, "UNK (42)");
        assert_eq!(record.rom_banks, None);
        assert!(!record.nintendo_logo);
    }

    #[test]
    fn test_mono_title_stops_at_first_non_letter() {
        let mut data = vec![0u8; BANK_SIZE as usize];
        data[TITLE..TITLE + 15].copy_from_slice(b"SUPER MARIOLAND");
        assert_eq!(parse(&data).title, "SUPER");

        data[TITLE..TITLE + 16].copy_from_slice(b"ZELDA-DX16CHARSS");
        assert_eq!(parse(&data).title, "ZELDA");

        data[TITLE..TITLE + 16].copy_from_slice(b"SIXTEENUPPERCASE");
        assert_eq!(parse(&data).title, "SIXTEENUPPERCASE");
    }

    #[test]
    fn test_bank_multiple_required() {
        assert!(extract(&MemoryReader::new(vec![0u8; 100])).is_err());
    }
}
