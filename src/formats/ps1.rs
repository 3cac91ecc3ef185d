//! PlayStation CD images.

use crate::error::{Error, Result};
use crate::formats::optical::{self, Disc, DiscRecord};
use crate::io::ByteSource;
use crate::media::cd::SECTOR_SIZE;
use crate::render::Pairs;
use serde::{Deserialize, Serialize};

const LICENSE_SECTOR: u64 = 4;
const LICENSE: &[u8; 60] = b"          Licensed  by          Sony Computer Entertainment ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    #[default]
    Europe,
    Japan,
    America,
}

impl Region {
    /// Classifies the 10 bytes that follow the license text.
    pub fn from_license_tail(tail: &[u8]) -> Option<Self> {
        match tail {
            b"Euro pe   " => Some(Region::Europe),
            b"Amer  ica " => Some(Region::America),
            _ if tail.starts_with(b"Inc.") => Some(Region::Japan),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Region::Europe => "Europa",
            Region::Japan => "Japó",
            Region::America => "Amèrica",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ps1Record {
    pub id: String,
    pub region: Region,
    pub disc: DiscRecord,
}

fn read_region(disc: &Disc<'_>) -> Result<Region> {
    let mut sector = [0u8; SECTOR_SIZE];
    disc.track.read_sector(LICENSE_SECTOR, &mut sector)?;
    if &sector[..60] != LICENSE {
        return Err(Error::mismatch("disc lacks the Sony license string"));
    }
    Region::from_license_tail(&sector[60..70]).ok_or_else(|| {
        Error::mismatch(format!(
            "unknown PlayStation region '{}'",
            String::from_utf8_lossy(&sector[60..70])
        ))
    })
}

pub fn extract(source: &dyn ByteSource) -> Result<Ps1Record> {
    let disc = Disc::open(source)?;
    let region = read_region(&disc)?;
    let cnf = optical::read_system_cnf(&disc)?;
    let id = cnf
        .get("BOOT")
        .and_then(|path| optical::boot_id(path, "cdrom:"))
        .ok_or_else(|| Error::mismatch("SYSTEM.CNF has no BOOT entry"))?;
    Ok(Ps1Record {
        id,
        region,
        disc: disc.record,
    })
}

impl Ps1Record {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Identificador", self.id.as_str());
        out.push("Regió", self.region.label());
        self.disc.render(out);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::MemoryReader;
    use crate::media::cd::tests::to_raw_mode2;
    use crate::media::iso9660::tests::IsoBuilder;

    pub(crate) fn sample_disc(region: &[u8; 10], cnf: &str) -> Vec<u8> {
        let mut image = IsoBuilder::new("SLUS_00434")
            .file("SYSTEM.CNF;1", cnf.as_bytes())
            .file("SLUS_004.34;1", &[0u8; 16])
            .build();
        let at = LICENSE_SECTOR as usize * SECTOR_SIZE;
        image[at..at + 60].copy_from_slice(LICENSE);
        image[at + 60..at + 70].copy_from_slice(region);
        to_raw_mode2(&image)
    }

    #[test]
    fn test_extract() {
        let data = sample_disc(
            b"Amer  ica ",
            "BOOT = cdrom:\\SLUS_004.34;1\r\nTCB = 4\r\nEVENT = 10\r\n",
        );
        let record = extract(&MemoryReader::new(data)).unwrap();
        assert_eq!(record.id, "SLUS-00434");
        assert_eq!(record.region, Region::America);

        let mut out = Pairs::new();
        record.render(&mut out);
        let pairs = out.into_vec();
        assert_eq!(pairs[0].value, "SLUS-00434");
        assert_eq!(pairs[1].value, "Amèrica");
        assert_eq!(pairs[2].label, "Format imatge");
    }

    #[test]
    fn test_reordered_cnf() {
        let data = sample_disc(b"Inc.\0\0\0\0\0\0", "STACK=801FFFF0\nBOOT=cdrom:SCPS_100.01;1\n");
        let record = extract(&MemoryReader::new(data)).unwrap();
        assert_eq!(record.id, "SCPS-10001");
        assert_eq!(record.region, Region::Japan);
    }

    #[test]
    fn test_missing_boot() {
        let data = sample_disc(b"Euro pe   ", "TCB = 4\n");
        let err = extract(&MemoryReader::new(data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatMismatch);
    }

    #[test]
    fn test_unknown_region() {
        let data = sample_disc(b"Mars      ", "BOOT = cdrom:\\X_1;1\n");
        let err = extract(&MemoryReader::new(data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatMismatch);
    }
}
