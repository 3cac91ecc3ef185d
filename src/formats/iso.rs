//! Generic ISO-9660 CD images.

use crate::error::Result;
use crate::formats::optical::{Disc, DiscRecord};
use crate::io::ByteSource;

pub fn extract(source: &dyn ByteSource) -> Result<DiscRecord> {
    Ok(Disc::open(source)?.record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::media::cd::tests::to_raw_mode2;
    use crate::media::iso9660::tests::IsoBuilder;
    use crate::render::Pairs;

    #[test]
    fn test_cooked_image() {
        let image = IsoBuilder::new("BACKUP_2003").file("A.TXT;1", b"a").build();
        let record = extract(&MemoryReader::new(image)).unwrap();
        assert_eq!(record.cd.sessions, 1);
        assert_eq!(record.cd.tracks, 1);
        assert_eq!(record.volume.volume_id, "BACKUP_2003");

        let mut out = Pairs::new();
        record.render(&mut out);
        let pairs = out.into_vec();
        let labels: Vec<&str> = pairs.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(
            labels,
            [
                "Format imatge",
                "Nº sessions",
                "Nº pistes",
                "Identificador sistema",
                "Identificador volum",
                "Data creació",
                "Grandària volum",
            ]
        );
    }

    #[test]
    fn test_raw_image() {
        let image = IsoBuilder::new("RAW").build();
        let record = extract(&MemoryReader::new(to_raw_mode2(&image))).unwrap();
        assert_eq!(record.volume.volume_id, "RAW");
    }

    #[test]
    fn test_not_iso() {
        assert!(extract(&MemoryReader::new(vec![0u8; 2048 * 20])).is_err());
    }
}
