//! ISO-9660 volume descriptor and directory-tree reading.

use super::cd::{SECTOR_SIZE, Track, TrackReader};
use crate::error::{Error, Result};
use crate::io::{u32_le, str_trim_nul};
use serde::{Deserialize, Serialize};

const PVD_SECTOR: u64 = 16;
const STANDARD_ID: &[u8; 5] = b"CD001";
const FLAG_DIRECTORY: u8 = 0x02;

/// Fields of the primary volume descriptor kept for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub system_id: String,
    pub volume_id: String,
    pub volume_set_id: String,
    pub publisher_id: String,
    pub preparer_id: String,
    pub application_id: String,
    pub creation_date: String,
    pub modification_date: String,
    pub volume_size: u64,
}

fn a_chars(raw: &[u8]) -> String {
    str_trim_nul(raw).trim_end().to_string()
}

/// `YYYYMMDDHHMMSScc` + zone into `YYYY-MM-DD HH:MM:SS`; empty when unset.
fn volume_date(raw: &[u8]) -> String {
    let digits = &raw[..14];
    if !digits.iter().all(u8::is_ascii_digit) || digits.iter().all(|&b| b == b'0') {
        return String::new();
    }
    let s = String::from_utf8_lossy(digits);
    format!(
        "{}-{}-{} {}:{}:{}",
        &s[0..4],
        &s[4..6],
        &s[6..8],
        &s[8..10],
        &s[10..12],
        &s[12..14]
    )
}

/// One directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    id: String,
    flags: u8,
    extent: u32,
    size: u32,
}

impl DirEntry {
    fn parse(record: &[u8]) -> Option<Self> {
        if record.len() < 34 {
            return None;
        }
        let name_len = record[32] as usize;
        if 33 + name_len > record.len() {
            return None;
        }
        let name = &record[33..33 + name_len];
        let id = match name {
            [0] => ".".to_string(),
            [1] => "..".to_string(),
            _ => String::from_utf8_lossy(name).into_owned(),
        };
        Some(Self {
            id,
            flags: record[25],
            extent: u32_le(record, 2),
            size: u32_le(record, 10),
        })
    }

    /// Identifier as stored, e.g. `SYSTEM.CNF;1`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier without the `;version` suffix.
    pub fn name(&self) -> &str {
        self.id.split(';').next().unwrap_or(&self.id)
    }

    pub fn is_dir(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    pub fn extent(&self) -> u32 {
        self.extent
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    fn is_self_or_parent(&self) -> bool {
        self.id == "." || self.id == ".."
    }
}

/// An opened ISO-9660 file system on one track.
#[derive(Debug, Clone)]
pub struct Iso9660<'a> {
    track: Track<'a>,
    info: VolumeInfo,
    root: DirEntry,
}

impl<'a> Iso9660<'a> {
    pub fn open(track: Track<'a>) -> Result<Self> {
        let mut pvd = [0u8; SECTOR_SIZE];
        track.read_sector(PVD_SECTOR, &mut pvd)?;
        if pvd[0] != 1 || &pvd[1..6] != STANDARD_ID || pvd[6] != 1 {
            return Err(Error::mismatch("no ISO-9660 primary volume descriptor"));
        }
        let block_size = u16::from_le_bytes([pvd[128], pvd[129]]);
        if block_size as usize != SECTOR_SIZE {
            return Err(Error::mismatch(format!(
                "unsupported ISO-9660 logical block size {block_size}"
            )));
        }
        let root = DirEntry::parse(&pvd[156..190])
            .filter(DirEntry::is_dir)
            .ok_or_else(|| Error::mismatch("invalid ISO-9660 root directory record"))?;

        let info = VolumeInfo {
            system_id: a_chars(&pvd[8..40]),
            volume_id: a_chars(&pvd[40..72]),
            volume_set_id: a_chars(&pvd[190..318]),
            publisher_id: a_chars(&pvd[318..446]),
            preparer_id: a_chars(&pvd[446..574]),
            application_id: a_chars(&pvd[574..702]),
            creation_date: volume_date(&pvd[813..830]),
            modification_date: volume_date(&pvd[830..847]),
            volume_size: u64::from(u32_le(&pvd, 80)) * SECTOR_SIZE as u64,
        };

        Ok(Self { track, info, root })
    }

    pub fn info(&self) -> &VolumeInfo {
        &self.info
    }

    pub fn root(&self) -> DirIter<'a> {
        self.dir(&self.root)
    }

    /// Iterates the children of a directory entry.
    pub fn dir(&self, entry: &DirEntry) -> DirIter<'a> {
        DirIter {
            track: self.track,
            next_lba: u64::from(entry.extent),
            remaining: u64::from(entry.size),
            sector: Box::new([0u8; SECTOR_SIZE]),
            sector_len: 0,
            pos: 0,
            failed: false,
        }
    }

    /// Bounded reader over a file's bytes.
    pub fn file_reader(&self, entry: &DirEntry) -> TrackReader<'a> {
        self.track
            .reader_at(u64::from(entry.extent), u64::from(entry.size))
    }

    /// Looks a name up in the root, ignoring case and the version suffix.
    pub fn find_in_root(&self, name: &str) -> Result<Option<DirEntry>> {
        find_entry(self.root(), name)
    }
}

pub fn find_entry(iter: DirIter<'_>, name: &str) -> Result<Option<DirEntry>> {
    for entry in iter {
        let entry = entry?;
        if entry.name().eq_ignore_ascii_case(name) {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Forward iterator over the records of one directory extent.
pub struct DirIter<'a> {
    track: Track<'a>,
    next_lba: u64,
    remaining: u64,
    sector: Box<[u8; SECTOR_SIZE]>,
    sector_len: usize,
    pos: usize,
    failed: bool,
}

impl DirIter<'_> {
    fn load_next_sector(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        self.track.read_sector(self.next_lba, &mut self.sector)?;
        self.sector_len = self.remaining.min(SECTOR_SIZE as u64) as usize;
        self.remaining -= self.sector_len as u64;
        self.next_lba += 1;
        self.pos = 0;
        Ok(true)
    }
}

impl Iterator for DirIter<'_> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.pos >= self.sector_len || self.sector[self.pos] == 0 {
                match self.load_next_sector() {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }
            let len = self.sector[self.pos] as usize;
            let end = self.pos + len;
            if end > self.sector_len {
                self.failed = true;
                return Some(Err(Error::mismatch("directory record crosses a sector")));
            }
            let parsed = DirEntry::parse(&self.sector[self.pos..end]);
            self.pos = end;
            match parsed {
                Some(entry) if entry.is_self_or_parent() => continue,
                Some(entry) => return Some(Ok(entry)),
                None => {
                    self.failed = true;
                    return Some(Err(Error::mismatch("malformed ISO-9660 directory record")));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::media::cd::{DiscImage, OpticalImage};
    use std::io::Read;

    /// Builds a minimal cooked ISO-9660 image with one level of nesting.
    pub(crate) struct IsoBuilder {
        pub volume_id: String,
        pub root: Vec<(String, Node)>,
    }

    pub(crate) enum Node {
        File(Vec<u8>),
        Dir(Vec<(String, Node)>),
    }

    fn record(name: &[u8], extent: u32, size: u32, dir: bool) -> Vec<u8> {
        let mut len = 33 + name.len();
        if len % 2 == 1 {
            len += 1;
        }
        let mut r = vec![0u8; len];
        r[0] = len as u8;
        r[2..6].copy_from_slice(&extent.to_le_bytes());
        r[6..10].copy_from_slice(&extent.to_be_bytes());
        r[10..14].copy_from_slice(&size.to_le_bytes());
        r[14..18].copy_from_slice(&size.to_be_bytes());
        r[25] = if dir { FLAG_DIRECTORY } else { 0 };
        r[32] = name.len() as u8;
        r[33..33 + name.len()].copy_from_slice(name);
        r
    }

    impl IsoBuilder {
        pub(crate) fn new(volume_id: &str) -> Self {
            Self {
                volume_id: volume_id.to_string(),
                root: Vec::new(),
            }
        }

        pub(crate) fn file(mut self, name: &str, data: &[u8]) -> Self {
            self.root.push((name.to_string(), Node::File(data.to_vec())));
            self
        }

        pub(crate) fn dir(mut self, name: &str, children: Vec<(String, Node)>) -> Self {
            self.root.push((name.to_string(), Node::Dir(children)));
            self
        }

        fn layout(
            sectors: &mut Vec<[u8; SECTOR_SIZE]>,
            children: &[(String, Node)],
            self_lba: u32,
            parent_lba: u32,
        ) {
            let mut records = Vec::new();
            records.extend(record(&[0], self_lba, SECTOR_SIZE as u32, true));
            records.extend(record(&[1], parent_lba, SECTOR_SIZE as u32, true));
            for (name, node) in children {
                match node {
                    Node::File(data) => {
                        let lba = sectors.len() as u32;
                        for chunk in data.chunks(SECTOR_SIZE) {
                            let mut s = [0u8; SECTOR_SIZE];
                            s[..chunk.len()].copy_from_slice(chunk);
                            sectors.push(s);
                        }
                        if data.is_empty() {
                            sectors.push([0u8; SECTOR_SIZE]);
                        }
                        records.extend(record(name.as_bytes(), lba, data.len() as u32, false));
                    }
                    Node::Dir(grandchildren) => {
                        let lba = sectors.len() as u32;
                        sectors.push([0u8; SECTOR_SIZE]);
                        Self::layout(sectors, grandchildren, lba, self_lba);
                        records.extend(record(name.as_bytes(), lba, SECTOR_SIZE as u32, true));
                    }
                }
            }
            let mut dir_sector = [0u8; SECTOR_SIZE];
            dir_sector[..records.len()].copy_from_slice(&records);
            sectors[self_lba as usize] = dir_sector;
        }

        pub(crate) fn build(&self) -> Vec<u8> {
            let mut sectors = vec![[0u8; SECTOR_SIZE]; 19];
            Self::layout(&mut sectors, &self.root, 18, 18);

            let mut pvd = [0u8; SECTOR_SIZE];
            pvd[0] = 1;
            pvd[1..6].copy_from_slice(STANDARD_ID);
            pvd[6] = 1;
            pvd[8..40].fill(b' ');
            pvd[8..19].copy_from_slice(b"PLAYSTATION");
            pvd[40..72].fill(b' ');
            pvd[40..40 + self.volume_id.len()].copy_from_slice(self.volume_id.as_bytes());
            pvd[80..84].copy_from_slice(&(sectors.len() as u32).to_le_bytes());
            pvd[128..130].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
            pvd[156..190].copy_from_slice(&record(&[0], 18, SECTOR_SIZE as u32, true));
            pvd[813..829].copy_from_slice(b"1999123123595900");
            sectors[16] = pvd;
            sectors[17][0] = 0xFF;
            sectors[17][1..6].copy_from_slice(STANDARD_ID);

            sectors.concat()
        }
    }

    #[test]
    fn test_reads_volume_info_and_root() {
        let image = IsoBuilder::new("MY_DISC")
            .file("README.TXT;1", b"hello")
            .dir("DATA", vec![("X.BIN;1".into(), Node::File(vec![7; 3000]))])
            .build();
        let source = MemoryReader::new(image);
        let disc = DiscImage::open(&source).unwrap();
        let iso = Iso9660::open(disc.track(0, 0).unwrap()).unwrap();

        assert_eq!(iso.info().volume_id, "MY_DISC");
        assert_eq!(iso.info().system_id, "PLAYSTATION");
        assert_eq!(iso.info().creation_date, "1999-12-31 23:59:59");
        assert_eq!(iso.info().modification_date, "");

        let names: Vec<String> = iso.root().map(|e| e.unwrap().id().to_string()).collect();
        assert_eq!(names, vec!["README.TXT;1", "DATA"]);

        let readme = iso.find_in_root("readme.txt").unwrap().unwrap();
        let mut text = String::new();
        iso.file_reader(&readme).read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello");

        let data = iso.find_in_root("DATA").unwrap().unwrap();
        assert!(data.is_dir());
        let x = find_entry(iso.dir(&data), "X.BIN").unwrap().unwrap();
        let mut bytes = Vec::new();
        iso.file_reader(&x).read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 3000);
    }

    #[test]
    fn test_rejects_missing_descriptor() {
        let source = MemoryReader::new(vec![0u8; SECTOR_SIZE * 20]);
        let disc = DiscImage::open(&source).unwrap();
        let err = Iso9660::open(disc.track(0, 0).unwrap()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FormatMismatch);
    }
}
