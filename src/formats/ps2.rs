//! PlayStation 2 DVD images.

use crate::error::{Error, Result};
use crate::formats::optical::{self, Disc, DiscRecord};
use crate::io::ByteSource;
use crate::render::Pairs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ps2Record {
    pub id: String,
    pub version: String,
    pub video_mode: String,
    pub disc: DiscRecord,
}

pub fn extract(source: &dyn ByteSource) -> Result<Ps2Record> {
    let disc = Disc::open(source)?;
    let mut cnf = optical::read_system_cnf(&disc)?;
    let id = cnf
        .get("BOOT2")
        .and_then(|path| optical::boot_id(path, "cdrom0:"))
        .ok_or_else(|| Error::mismatch("SYSTEM.CNF has no BOOT2 entry"))?;
    Ok(Ps2Record {
        id,
        version: cnf.remove("VER").unwrap_or_default(),
        video_mode: cnf.remove("VMODE").unwrap_or_default(),
        disc: disc.record,
    })
}

impl Ps2Record {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Identificador", self.id.as_str());
        out.push_nonempty("Versió", &self.version);
        out.push_nonempty("Mode vídeo", &self.video_mode);
        self.disc.render(out);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::MemoryReader;
    use crate::media::iso9660::tests::IsoBuilder;

    pub(crate) fn sample_disc(cnf: &str) -> Vec<u8> {
        IsoBuilder::new("SLES_50330")
            .file("SYSTEM.CNF;1", cnf.as_bytes())
            .build()
    }

    #[test]
    fn test_extract() {
        let data = sample_disc("BOOT2 = cdrom0:\\SLES_503.30;1\nVER = 1.00\nVMODE = PAL\n");
        let record = extract(&MemoryReader::new(data)).unwrap();
        assert_eq!(record.id, "SLES-50330");
        assert_eq!(record.version, "1.00");
        assert_eq!(record.video_mode, "PAL");

        let mut out = Pairs::new();
        record.render(&mut out);
        let pairs = out.into_vec();
        assert_eq!(pairs[1].label, "Versió");
        assert_eq!(pairs[2].label, "Mode vídeo");
        assert_eq!(pairs[3].label, "Format imatge");
    }

    #[test]
    fn test_optional_fields() {
        let data = sample_disc("  vmode=NTSC\r\n\r\nboot2=cdrom0:\\slus_203.12;1  \r\n");
        let record = extract(&MemoryReader::new(data)).unwrap();
        assert_eq!(record.id, "SLUS-20312");
        assert!(record.version.is_empty());

        let mut out = Pairs::new();
        record.render(&mut out);
        assert!(out.into_vec().iter().all(|p| p.label != "Versió"));
    }

    #[test]
    fn test_missing_boot2() {
        let data = sample_disc("BOOT = cdrom:\\SLUS_004.34;1\n");
        let err = extract(&MemoryReader::new(data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatMismatch);
    }

    #[test]
    fn test_missing_system_cnf() {
        let data = IsoBuilder::new("EMPTY").build();
        let err = extract(&MemoryReader::new(data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatMismatch);
    }
}
