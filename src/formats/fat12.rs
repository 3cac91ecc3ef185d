//! Floppy images formatted with FAT12.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, str_trim_nul, u16_le, u32_le};
use crate::render::Pairs;
use serde::{Deserialize, Serialize};

const SECTOR_SIZE: usize = 512;
const EXTENDED_BPB: u8 = 0x29;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLabel {
    pub id: u32,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fat12Record {
    pub oem: String,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub fats: u8,
    pub total_sectors: u32,
    pub media: u8,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub hidden_sectors: u32,
    /// Present when the boot sector carries an extended BPB.
    pub volume: Option<VolumeLabel>,
}

fn text(raw: &[u8]) -> String {
    str_trim_nul(raw).trim_end().to_string()
}

/// Decodes a FAT12 boot sector.
pub fn parse_boot_sector(data: &[u8; SECTOR_SIZE]) -> Result<Fat12Record> {
    if data[0] != 0xE9 && data[0] != 0xEB {
        return Err(Error::mismatch("boot sector does not start with a jump"));
    }
    if data[510..512] != [0x55, 0xAA] {
        return Err(Error::mismatch("boot sector lacks the 55AA signature"));
    }

    let volume = if data[38] == EXTENDED_BPB {
        let fs_type = text(&data[54..62]);
        if !matches!(fs_type.as_str(), "FAT12" | "FAT" | "") {
            return Err(Error::mismatch(format!("unknown filesystem type '{fs_type}'")));
        }
        Some(VolumeLabel {
            id: u32_le(data, 39),
            label: text(&data[43..54]),
        })
    } else {
        None
    };

    let total_sectors = match u16_le(data, 19) {
        0 => u32_le(data, 32),
        n => u32::from(n),
    };

    Ok(Fat12Record {
        oem: text(&data[3..11]),
        bytes_per_sector: u16_le(data, 11),
        sectors_per_cluster: data[13],
        fats: data[16],
        total_sectors,
        media: data[21],
        sectors_per_track: u16_le(data, 24),
        heads: u16_le(data, 26),
        hidden_sectors: u32_le(data, 28),
        volume,
    })
}

pub fn extract(source: &dyn ByteSource) -> Result<Fat12Record> {
    let window = ByteWindow::whole(source);
    if window.len() < SECTOR_SIZE as u64 {
        return Err(Error::mismatch("file too small for a floppy image"));
    }
    parse_boot_sector(&window.read_array(0)?)
}

impl Fat12Record {
    pub fn render(&self, out: &mut Pairs) {
        out.push_nonempty("OEM", &self.oem);
        out.push("Bytes per sector", self.bytes_per_sector.to_string());
        out.push("Sectors per cluster", self.sectors_per_cluster.to_string());
        out.push("Nre. de FATs", self.fats.to_string());
        out.push("Nre. de sectors", self.total_sectors.to_string());
        out.push("Media", format!("{:02X}", self.media));
        out.push("Sectors per track", self.sectors_per_track.to_string());
        out.push("Nre. de capçals", self.heads.to_string());
        out.push("Sectors ocults", self.hidden_sectors.to_string());
        if let Some(volume) = &self.volume {
            out.push("Id. volum", format!("{:08X}", volume.id));
            out.push("Etiqueta volum", volume.label.as_str());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::MemoryReader;

    /// Boot sector of a 1.44 MB DOS floppy.
    pub(crate) fn sample_floppy() -> Vec<u8> {
        let mut data = vec![0u8; 1_474_560];
        data[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        data[3..11].copy_from_slice(b"MSDOS5.0");
        data[11..13].copy_from_slice(&512u16.to_le_bytes());
        data[13] = 1;
        data[16] = 2;
        data[19..21].copy_from_slice(&2880u16.to_le_bytes());
        data[21] = 0xF0;
        data[24..26].copy_from_slice(&18u16.to_le_bytes());
        data[26..28].copy_from_slice(&2u16.to_le_bytes());
        data[38] = EXTENDED_BPB;
        data[39..43].copy_from_slice(&0x1234ABCDu32.to_le_bytes());
        data[43..54].copy_from_slice(b"GAMES DISK ");
        data[54..62].copy_from_slice(b"FAT12   ");
        data[510] = 0x55;
        data[511] = 0xAA;
        data
    }

    #[test]
    fn test_extract() {
        let record = extract(&MemoryReader::new(sample_floppy())).unwrap();
        assert_eq!(record.oem, "MSDOS5.0");
        assert_eq!(record.total_sectors, 2880);
        assert_eq!(record.volume.as_ref().unwrap().label, "GAMES DISK");

        let mut out = Pairs::new();
        record.render(&mut out);
        let pairs = out.into_vec();
        assert_eq!(pairs.len(), 11);
        assert_eq!(pairs[5].value, "F0");
        assert_eq!(pairs[9].value, "1234ABCD");
    }

    #[test]
    fn test_large_sector_count_and_no_label() {
        let mut data = sample_floppy();
        data[19..21].fill(0);
        data[32..36].copy_from_slice(&70_000u32.to_le_bytes());
        data[38] = 0;
        let record = extract(&MemoryReader::new(data)).unwrap();
        assert_eq!(record.total_sectors, 70_000);
        assert!(record.volume.is_none());
    }

    #[test]
    fn test_rejections() {
        let mut data = sample_floppy();
        data[0] = 0;
        assert!(extract(&MemoryReader::new(data)).is_err());

        let mut data = sample_floppy();
        data[511] = 0;
        assert!(extract(&MemoryReader::new(data)).is_err());

        let mut data = sample_floppy();
        data[54..62].copy_from_slice(b"FAT16   ");
        assert!(extract(&MemoryReader::new(data)).is_err());
    }
}
