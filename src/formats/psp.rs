//! PlayStation Portable UMD images.

use crate::error::{Error, Result};
use crate::formats::optical::{Disc, DiscRecord};
use crate::io::ByteSource;
use crate::media::iso9660::find_entry;
use crate::picture::{Picture, decode_bitmap};
use crate::render::Pairs;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

const GAME_DIR: &str = "PSP_GAME";
const UMD_DATA: &str = "UMD_DATA.BIN";
const ICON: &str = "ICON0.PNG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PspRecord {
    pub id: String,
    pub disc: DiscRecord,
}

/// Game id from the first line of `UMD_DATA.BIN`, `ID|KEY|...`.
pub fn parse_umd_data(data: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(data);
    let line = text.lines().next()?;
    let mut fields = line.split('|');
    let id = fields.next()?;
    fields.next()?;
    Some(id.trim().to_ascii_uppercase())
}

pub fn extract(source: &dyn ByteSource) -> Result<PspRecord> {
    let disc = Disc::open(source)?;
    match disc.fs.find_in_root(GAME_DIR)? {
        Some(entry) if entry.is_dir() => {}
        Some(_) => return Err(Error::mismatch("PSP_GAME is not a directory")),
        None => return Err(Error::mismatch("no PSP_GAME directory")),
    }
    let umd = disc
        .read_root_file(UMD_DATA)?
        .ok_or_else(|| Error::mismatch("no UMD_DATA.BIN file"))?;
    let id = parse_umd_data(&umd).ok_or_else(|| {
        Error::mismatch(format!(
            "malformed UMD_DATA.BIN: '{}'",
            String::from_utf8_lossy(&umd[..umd.len().min(64)])
        ))
    })?;
    Ok(PspRecord {
        id,
        disc: disc.record,
    })
}

/// Decodes `PSP_GAME/ICON0.PNG`.
pub fn image(source: &dyn ByteSource) -> Result<Picture> {
    let disc = Disc::open(source)?;
    let game = disc
        .fs
        .find_in_root(GAME_DIR)?
        .filter(|e| e.is_dir())
        .ok_or_else(|| Error::mismatch("no PSP_GAME directory"))?;
    let icon = find_entry(disc.fs.dir(&game), ICON)?
        .ok_or_else(|| Error::mismatch("no PSP_GAME/ICON0.PNG file"))?;
    let data = disc.read_file(&icon)?;
    decode_bitmap(Cursor::new(data), ImageFormat::Png)
}

impl PspRecord {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Identificador", self.id.as_str());
        self.disc.render(out);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::formats::png::tests::sample_png;
    use crate::io::MemoryReader;
    use crate::media::iso9660::tests::{IsoBuilder, Node};

    pub(crate) fn sample_umd() -> Vec<u8> {
        IsoBuilder::new("UCES00001")
            .file("UMD_DATA.BIN;1", b"uces-00001|0123456789ABCDEF|0001|G")
            .dir(
                "PSP_GAME",
                vec![
                    ("PARAM.SFO;1".into(), Node::File(vec![0; 32])),
                    ("ICON0.PNG;1".into(), Node::File(sample_png())),
                ],
            )
            .build()
    }

    #[test]
    fn test_extract() {
        let record = extract(&MemoryReader::new(sample_umd())).unwrap();
        assert_eq!(record.id, "UCES-00001");
        let mut out = Pairs::new();
        record.render(&mut out);
        assert_eq!(out.into_vec()[0].label, "Identificador");
    }

    #[test]
    fn test_icon() {
        let picture = image(&MemoryReader::new(sample_umd())).unwrap();
        assert_eq!(picture.dimensions(), (2, 2));
    }

    #[test]
    fn test_requires_game_directory() {
        let data = IsoBuilder::new("X")
            .file("UMD_DATA.BIN;1", b"ULUS-10041|00|0001|G")
            .build();
        let err = extract(&MemoryReader::new(data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatMismatch);
    }

    #[test]
    fn test_umd_data_fields() {
        assert_eq!(parse_umd_data(b"ulus-10041|X").as_deref(), Some("ULUS-10041"));
        assert_eq!(parse_umd_data(b"ULUS-10041"), None);
        assert_eq!(parse_umd_data(b""), None);
    }
}
