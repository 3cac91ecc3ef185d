//! Pieces shared by the optical-disc decoders: the disc-level summary, the
//! ISO-9660 volume fields and the `SYSTEM.CNF` boot file of PlayStation discs.

use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::media::cd::{DiscImage, OpticalImage, Track};
use crate::media::iso9660::{DirEntry, Iso9660, VolumeInfo};
use crate::render::{Pairs, size_to_text};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Largest boot or descriptor file read into memory.
const MAX_TEXT_FILE: u64 = 64 * 1024;

/// Disc-level facts reported by the optical reader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdInfo {
    pub format: String,
    pub sessions: u32,
    pub tracks: u32,
}

impl CdInfo {
    pub fn from_image(image: &dyn OpticalImage) -> Self {
        let sessions = image.sessions();
        Self {
            format: image.format_name(),
            sessions: sessions.len() as u32,
            tracks: sessions.iter().map(|s| s.tracks.len() as u32).sum(),
        }
    }

    pub fn render(&self, out: &mut Pairs) {
        out.push("Format imatge", self.format.as_str());
        out.push("Nº sessions", self.sessions.to_string());
        out.push("Nº pistes", self.tracks.to_string());
    }
}

/// Disc summary plus the primary volume descriptor of the first data track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscRecord {
    pub cd: CdInfo,
    pub volume: VolumeInfo,
}

impl DiscRecord {
    pub fn render(&self, out: &mut Pairs) {
        self.cd.render(out);
        let v = &self.volume;
        out.push_nonempty("Identificador sistema", &v.system_id);
        out.push_nonempty("Identificador volum", &v.volume_id);
        out.push_nonempty("Conjunt de volums", &v.volume_set_id);
        out.push_nonempty("Editor", &v.publisher_id);
        out.push_nonempty("Preparador de dades", &v.preparer_id);
        out.push_nonempty("Aplicació", &v.application_id);
        out.push_nonempty("Data creació", &v.creation_date);
        out.push_nonempty("Data modificació", &v.modification_date);
        if v.volume_size > 0 {
            out.push("Grandària volum", size_to_text(v.volume_size));
        }
    }
}

/// An opened disc with its ISO-9660 file system on session 0, track 0.
pub struct Disc<'a> {
    pub track: Track<'a>,
    pub fs: Iso9660<'a>,
    pub record: DiscRecord,
}

impl<'a> Disc<'a> {
    pub fn open(source: &'a dyn ByteSource) -> Result<Self> {
        let image = DiscImage::open(source)?;
        let cd = CdInfo::from_image(&image);
        let track = image.data_track();
        let fs = Iso9660::open(track)?;
        let record = DiscRecord {
            cd,
            volume: fs.info().clone(),
        };
        Ok(Self { track, fs, record })
    }

    /// Reads a small file of the root directory, or `None` when absent.
    pub fn read_root_file(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.fs.find_in_root(name)? {
            Some(entry) if !entry.is_dir() => self.read_file(&entry).map(Some),
            _ => Ok(None),
        }
    }

    pub fn read_file(&self, entry: &DirEntry) -> Result<Vec<u8>> {
        if u64::from(entry.size()) > MAX_TEXT_FILE {
            return Err(Error::mismatch(format!(
                "'{}' is {} bytes, too large for a descriptor file",
                entry.id(),
                entry.size()
            )));
        }
        let mut data = Vec::with_capacity(entry.size() as usize);
        self.fs.file_reader(entry).read_to_end(&mut data)?;
        Ok(data)
    }
}

/// `KEY = VALUE` lines of a PlayStation `SYSTEM.CNF`, keys uppercased.
/// Lines without `=` are skipped.
pub fn parse_system_cnf(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_ascii_uppercase(), value.trim().to_string()))
        })
        .collect()
}

/// Game identifier from a boot path such as `cdrom:\SLUS_004.34;1`:
/// separators and dots dropped, `_` turned into `-`, uppercased.
pub fn boot_id(path: &str, device: &str) -> Option<String> {
    let (_, file) = path.split_once(device)?;
    let file = file.split(';').next().unwrap_or(file);
    let id: String = file
        .chars()
        .filter(|&c| c != '.' && c != '\\' && c != '/')
        .map(|c| if c == '_' { '-' } else { c.to_ascii_uppercase() })
        .collect();
    let id = id.trim().to_string();
    (!id.is_empty()).then_some(id)
}

/// Parses `SYSTEM.CNF` from the root of the disc.
pub fn read_system_cnf(disc: &Disc<'_>) -> Result<BTreeMap<String, String>> {
    let data = disc
        .read_root_file("SYSTEM.CNF")?
        .ok_or_else(|| Error::mismatch("no SYSTEM.CNF in the root directory"))?;
    Ok(parse_system_cnf(&String::from_utf8_lossy(&data)))
}
