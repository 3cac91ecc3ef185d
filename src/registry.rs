//! Format ids and the static table of per-format descriptors.
//!
//! Ids are stable: they are stored next to every catalog entry, so a value
//! is never reassigned to a different format.

use crate::error::{Error, Result};
use crate::formats::{
    cxi, fat12, gbc, gg, iso, jpeg, md, n3ds, nds, nes, pdf, png, ps1, ps2, psp, sfz, tar, zblorb,
    zip,
};
use crate::io::{ByteSource, ByteWindow, Reader};
use crate::metadata::{self, MetadataRecord};
use crate::picture::Picture;
use crate::render::{DisplayPair, Pairs, size_to_text};
use md5::{Digest, Md5};
use sha1::Sha1;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Identifier of a recognized file format, namespaced by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum FormatId {
    Png = 0x100,
    Jpeg = 0x101,
    Gg = 0x200,
    Gbc = 0x201,
    Md = 0x202,
    Nes = 0x203,
    Nds = 0x204,
    N3ds = 0x205,
    Zip = 0x300,
    Tar = 0x301,
    Sfz = 0x400,
    Zblorb = 0x401,
    Cxi = 0x402,
    Ps1Aux = 0x500,
    Iso = 0x600,
    Ps1 = 0x601,
    Ps2 = 0x602,
    Psp = 0x603,
    Fat12 = 0x700,
    Pdf = 0x800,
    Bin = 0x900,
}

impl FormatId {
    /// Every id, grouped by category, generic binary last.
    pub const ALL: [FormatId; 21] = [
        FormatId::Png,
        FormatId::Jpeg,
        FormatId::Gg,
        FormatId::Gbc,
        FormatId::Md,
        FormatId::Nes,
        FormatId::Nds,
        FormatId::N3ds,
        FormatId::Zip,
        FormatId::Tar,
        FormatId::Sfz,
        FormatId::Zblorb,
        FormatId::Cxi,
        FormatId::Ps1Aux,
        FormatId::Iso,
        FormatId::Ps1,
        FormatId::Ps2,
        FormatId::Psp,
        FormatId::Fat12,
        FormatId::Pdf,
        FormatId::Bin,
    ];

    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.raw() == raw)
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    pub fn file_type(self) -> &'static FileType {
        &FILE_TYPES[self.index()]
    }

    fn index(self) -> usize {
        // ALL and FILE_TYPES share one order.
        match self {
            FormatId::Png => 0,
            FormatId::Jpeg => 1,
            FormatId::Gg => 2,
            FormatId::Gbc => 3,
            FormatId::Md => 4,
            FormatId::Nes => 5,
            FormatId::Nds => 6,
            FormatId::N3ds => 7,
            FormatId::Zip => 8,
            FormatId::Tar => 9,
            FormatId::Sfz => 10,
            FormatId::Zblorb => 11,
            FormatId::Cxi => 12,
            FormatId::Ps1Aux => 13,
            FormatId::Iso => 14,
            FormatId::Ps1 => 15,
            FormatId::Ps2 => 16,
            FormatId::Psp => 17,
            FormatId::Fat12 => 18,
            FormatId::Pdf => 19,
            FormatId::Bin => 20,
        }
    }
}

impl TryFrom<u32> for FormatId {
    type Error = Error;

    fn try_from(raw: u32) -> Result<Self> {
        FormatId::from_raw(raw).ok_or(Error::UnknownFormat(raw))
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#05x})", self.file_type().short_name, self.raw())
    }
}

/// Stateless descriptor of one format.
#[derive(Debug)]
pub struct FileType {
    id: FormatId,
    name: &'static str,
    short_name: &'static str,
    is_image: bool,
}

static FILE_TYPES: [FileType; 21] = [
    FileType::new(FormatId::Png, "Imatge PNG", "PNG", true),
    FileType::new(FormatId::Jpeg, "Imatge JPEG", "JPEG", true),
    FileType::new(FormatId::Gg, "ROM de Game Gear", "GG", false),
    FileType::new(FormatId::Gbc, "ROM de Game Boy (Color)", "GBC", false),
    FileType::new(FormatId::Md, "ROM de Mega Drive / Genesis", "MD", false),
    FileType::new(
        FormatId::Nes,
        "ROM de Nintendo Entertainment System (iNES/NES 2.0)",
        "NES",
        false,
    ),
    FileType::new(FormatId::Nds, "ROM de Nintendo DS", "NDS", true),
    FileType::new(FormatId::N3ds, "Imatge de cartutx de Nintendo 3DS", "3DS", true),
    FileType::new(FormatId::Zip, "Fitxer d'emmagatzemament ZIP", "ZIP", false),
    FileType::new(
        FormatId::Tar,
        "Fitxer d'emmagatzemament TAR (Tape ARchives)",
        "TAR",
        false,
    ),
    FileType::new(FormatId::Sfz, "Fitxer d'història de la Màquina Z", "SFZ", false),
    FileType::new(
        FormatId::Zblorb,
        "Fitxer d'història Blorb (Màquina Z)",
        "ZBLORB",
        true,
    ),
    FileType::new(FormatId::Cxi, "CTR Executable Image", "CXI", true),
    FileType::new(
        FormatId::Ps1Aux,
        "Fitxer auxiliar d'imatge de CD de PlayStation",
        "PS1",
        false,
    ),
    FileType::new(FormatId::Iso, "CD ISO 9660", "ISO", false),
    FileType::new(FormatId::Ps1, "CD de PlayStation", "PS1", false),
    FileType::new(FormatId::Ps2, "DVD de PlayStation 2", "PS2", false),
    FileType::new(FormatId::Psp, "UMD de PlayStation Portable", "PSP", true),
    FileType::new(FormatId::Fat12, "Disquet FAT12 (MS-DOS)", "FAT12", false),
    FileType::new(FormatId::Pdf, "Document PDF", "PDF", false),
    FileType::new(FormatId::Bin, "Fitxer binari", "BIN", false),
];

/// Descriptor for a raw id, `UnknownFormat` outside the enumeration.
pub fn get(raw: u32) -> Result<&'static FileType> {
    Ok(FormatId::try_from(raw)?.file_type())
}

/// Every published id in display order.
pub fn all_ids() -> &'static [FormatId] {
    &FormatId::ALL
}

impl FileType {
    const fn new(id: FormatId, name: &'static str, short_name: &'static str, is_image: bool) -> Self {
        Self {
            id,
            name,
            short_name,
            is_image,
        }
    }

    pub fn id(&self) -> FormatId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Upper-case name without spaces. Not unique across formats.
    pub fn short_name(&self) -> &'static str {
        self.short_name
    }

    pub fn is_image(&self) -> bool {
        self.is_image
    }

    /// Validates the file at `path` and extracts its record.
    pub fn extract(&self, path: impl AsRef<Path>) -> Result<MetadataRecord> {
        let path = path.as_ref();
        tracing::debug!(format = %self.id, path = %path.display(), "extracting metadata");
        let reader = Reader::open(path)?;
        self.extract_from(&reader)
    }

    /// Same as [`FileType::extract`] over an already opened source.
    pub fn extract_from(&self, source: &dyn ByteSource) -> Result<MetadataRecord> {
        use MetadataRecord as M;
        Ok(match self.id {
            FormatId::Png => M::Png(png::extract(source)?),
            FormatId::Jpeg => M::Jpeg(jpeg::extract(source)?),
            FormatId::Gg => M::Gg(gg::extract(source)?),
            FormatId::Gbc => M::Gbc(gbc::extract(source)?),
            FormatId::Md => M::Md(md::extract(source)?),
            FormatId::Nes => M::Nes(nes::extract(source)?),
            FormatId::Nds => M::Nds(nds::extract(source)?),
            FormatId::N3ds => M::N3ds(n3ds::extract(source)?),
            FormatId::Zip => M::Zip(zip::extract(source)?),
            FormatId::Tar => M::Tar(tar::extract(source)?),
            FormatId::Sfz => M::Sfz(sfz::extract(source)?),
            FormatId::Zblorb => M::Zblorb(zblorb::extract(source)?),
            FormatId::Cxi => M::Cxi(cxi::extract(source)?),
            FormatId::Ps1Aux => M::Ps1Aux {},
            FormatId::Iso => M::Iso(iso::extract(source)?),
            FormatId::Ps1 => M::Ps1(ps1::extract(source)?),
            FormatId::Ps2 => M::Ps2(ps2::extract(source)?),
            FormatId::Psp => M::Psp(psp::extract(source)?),
            FormatId::Fat12 => M::Fat12(fat12::extract(source)?),
            FormatId::Pdf => M::Pdf(pdf::extract(source)?),
            FormatId::Bin => M::Bin {},
        })
    }

    /// Extracts and encodes the record as a stored blob.
    pub fn metadata(&self, path: impl AsRef<Path>) -> Result<String> {
        metadata::encode(&self.extract(path)?)
    }

    /// Display pairs of a blob stored under this format.
    pub fn render(&self, blob: &str) -> Vec<DisplayPair> {
        metadata::render(self.id, blob)
    }

    /// Appends the display pairs of `blob` to `pairs`.
    pub fn parse_metadata(&self, pairs: Vec<DisplayPair>, blob: &str) -> Vec<DisplayPair> {
        let mut out = Pairs::from_vec(pairs);
        metadata::render_into(self.id, blob, &mut out);
        out.into_vec()
    }

    /// Decodes the embedded icon, cover or the picture itself.
    pub fn image(&self, path: impl AsRef<Path>) -> Result<Picture> {
        let path = path.as_ref();
        tracing::debug!(format = %self.id, path = %path.display(), "decoding image");
        let reader = Reader::open(path)?;
        self.image_from(&reader)
    }

    pub fn image_from(&self, source: &dyn ByteSource) -> Result<Picture> {
        match self.id {
            FormatId::Png => png::image(source),
            FormatId::Jpeg => jpeg::image(source),
            FormatId::Nds => nds::image(source),
            FormatId::N3ds => n3ds::image(source),
            FormatId::Zblorb => zblorb::image(source),
            FormatId::Cxi => cxi::image(source),
            FormatId::Psp => psp::image(source),
            _ => Err(Error::mismatch(format!("{} has no image", self.id))),
        }
    }
}

/// The pairs every catalog entry starts with: whole-file md5, sha1 and size.
pub fn file_summary(path: impl AsRef<Path>) -> Result<Vec<DisplayPair>> {
    let reader = Reader::open(path)?;
    source_summary(&reader)
}

pub fn source_summary(source: &dyn ByteSource) -> Result<Vec<DisplayPair>> {
    let window = ByteWindow::whole(source);
    let mut input = window.reader();
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        md5.update(&buf[..n]);
        sha1.update(&buf[..n]);
    }
    Ok(vec![
        DisplayPair::new("md5", hex::encode(md5.finalize())),
        DisplayPair::new("sha1", hex::encode(sha1.finalize())),
        DisplayPair::new("Grandària", size_to_text(window.len())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::formats::{
        cxi::tests::sample_smdh, fat12::tests::sample_floppy, gbc::tests::sample_rom as sample_gbc,
        gg::tests::sample_rom as sample_gg, jpeg::tests::sample_jpeg,
        md::tests::sample_rom as sample_md, n3ds::tests::sample_cart,
        nds::tests::sample_rom as sample_nds, nes::tests::sample_rom as sample_nes,
        pdf::tests::sample_pdf, png::tests::sample_png, ps1::tests::sample_disc as sample_ps1,
        ps2::tests::sample_disc as sample_ps2, psp::tests::sample_umd, sfz::tests::sample_story,
        tar::tests::sample_tar, zblorb::tests::sample_blorb, zip::tests::sample_zip,
    };
    use crate::io::MemoryReader;
    use crate::media::ctr::tests::build_ncch;
    use crate::media::iso9660::tests::IsoBuilder;
    use std::collections::HashSet;

    fn samples() -> Vec<(FormatId, Vec<u8>)> {
        vec![
            (FormatId::Png, sample_png()),
            (FormatId::Jpeg, sample_jpeg(16, 8)),
            (FormatId::Gg, sample_gg()),
            (FormatId::Gbc, sample_gbc()),
            (FormatId::Md, sample_md()),
            (FormatId::Nes, sample_nes()),
            (FormatId::Nds, sample_nds(true)),
            (FormatId::N3ds, sample_cart()),
            (FormatId::Zip, sample_zip(2, "")),
            (FormatId::Tar, sample_tar()),
            (FormatId::Sfz, sample_story(3, 2048)),
            (FormatId::Zblorb, sample_blorb()),
            (FormatId::Cxi, build_ncch(&sample_smdh())),
            (FormatId::Ps1Aux, b"FILE \"GAME.BIN\" BINARY\n".to_vec()),
            (FormatId::Iso, IsoBuilder::new("DATA").build()),
            (
                FormatId::Ps1,
                sample_ps1(b"Euro pe   ", "BOOT = cdrom:\\SLUS_004.34;1\r\n"),
            ),
            (
                FormatId::Ps2,
                sample_ps2("BOOT2 = cdrom0:\\SLES_501.23;1\nVER = 1.00\nVMODE = PAL\n"),
            ),
            (FormatId::Psp, sample_umd()),
            (FormatId::Fat12, sample_floppy()),
            (FormatId::Pdf, sample_pdf()),
            (FormatId::Bin, vec![0xAB; 100]),
        ]
    }

    #[test]
    fn test_every_format_round_trips_through_blob() {
        let samples = samples();
        assert_eq!(samples.len(), FormatId::ALL.len());
        for (id, data) in samples {
            let file_type = id.file_type();
            let record = file_type.extract_from(&MemoryReader::new(data)).unwrap();
            assert_eq!(record.format(), id);
            let blob = metadata::encode(&record).unwrap();
            assert_eq!(file_type.render(&blob), record.to_pairs(), "{id}");
        }
    }

    #[test]
    fn test_image_capable_formats_decode() {
        for (id, data) in samples() {
            let result = id.file_type().image_from(&MemoryReader::new(data));
            if id.file_type().is_image() {
                let picture = result.unwrap_or_else(|e| panic!("{id}: {e}"));
                let (w, h) = picture.dimensions();
                assert!(w > 0 && h > 0);
            } else {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::FormatMismatch);
            }
        }
    }

    #[test]
    fn test_blob_of_one_format_renders_nothing_under_another() {
        let record = FormatId::Zip
            .file_type()
            .extract_from(&MemoryReader::new(sample_zip(1, "x")))
            .unwrap();
        let blob = metadata::encode(&record).unwrap();
        assert!(!FormatId::Zip.file_type().render(&blob).is_empty());
        assert!(FormatId::Tar.file_type().render(&blob).is_empty());
    }

    #[test]
    fn test_get() {
        assert_eq!(get(0x401).unwrap().short_name(), "ZBLORB");
        assert_eq!(get(0x900).unwrap().id(), FormatId::Bin);
        assert_eq!(get(0x102).unwrap_err().kind(), ErrorKind::UnknownFormat);
        assert_eq!(get(0).unwrap_err().kind(), ErrorKind::UnknownFormat);
    }

    #[test]
    fn test_all_ids() {
        let ids = all_ids();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ids.last(), Some(&FormatId::Bin));
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(id.index(), i);
            assert_eq!(id.file_type().id(), *id);
            assert_eq!(FormatId::from_raw(id.raw()), Some(*id));
        }
        // Values published before the format list grew.
        let published = [0x100, 0x101, 0x200, 0x201, 0x202, 0x203, 0x300, 0x400, 0x401];
        for raw in published {
            assert!(ids.iter().any(|id| id.raw() == raw));
        }
    }

    #[test]
    fn test_generic_formats_are_not_images() {
        for id in [FormatId::Bin, FormatId::Zip, FormatId::Tar, FormatId::Pdf] {
            assert!(!id.file_type().is_image());
        }
    }

    #[test]
    fn test_parse_metadata_appends_after_summary() {
        let source = MemoryReader::new(sample_story(3, 2048));
        let summary = source_summary(&source).unwrap();
        assert_eq!(summary[2].value, "2.0 KB (2048 B)");
        let blob = metadata::encode(&FormatId::Sfz.file_type().extract_from(&source).unwrap())
            .unwrap();
        let pairs = FormatId::Sfz.file_type().parse_metadata(summary, &blob);
        let labels: Vec<_> = pairs.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(&labels[..4], ["md5", "sha1", "Grandària", "Versió de la Màquina-Z"]);
    }

    #[test]
    fn test_summary_hashes() {
        let summary = source_summary(&MemoryReader::new(b"abc".to_vec())).unwrap();
        assert_eq!(summary[0].value, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(summary[1].value, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(summary[2].value, "3 B");
    }
}
