//! Z-machine story files.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, u16_be};
use crate::render::{KB, Pairs};
use serde::{Deserialize, Serialize};

const HEADER_SIZE: usize = 64;
const SERIAL: std::ops::Range<usize> = 0x12..0x18;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfzRecord {
    pub version: u8,
    pub release: u16,
    /// Empty for version 1 stories.
    pub serial: String,
}

/// Largest story a given Z-machine version can address.
pub fn max_story_size(version: u8) -> Option<u64> {
    match version {
        1..=3 => Some(128 * KB),
        4 | 5 => Some(256 * KB),
        6..=8 => Some(512 * KB),
        _ => None,
    }
}

/// Decodes a story from `window`, which may be a chunk of a larger file.
pub fn extract_window(window: ByteWindow<'_>) -> Result<SfzRecord> {
    let size = window.len();
    if size < HEADER_SIZE as u64 {
        return Err(Error::mismatch("story file has no 64-byte header"));
    }
    let header: [u8; HEADER_SIZE] = window.read_array(0)?;
    let version = header[0];
    let max = max_story_size(version)
        .ok_or_else(|| Error::mismatch(format!("unknown Z-machine version {version}")))?;
    if size > max {
        return Err(Error::mismatch(format!(
            "{size} bytes exceeds the {} KB limit of version {version} stories",
            max / KB
        )));
    }

    let serial = if version == 1 {
        String::new()
    } else {
        String::from_utf8_lossy(&header[SERIAL]).into_owned()
    };

    Ok(SfzRecord {
        version,
        release: u16_be(&header, 2),
        serial,
    })
}

pub fn extract(source: &dyn ByteSource) -> Result<SfzRecord> {
    extract_window(ByteWindow::whole(source))
}

impl SfzRecord {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Versió de la Màquina-Z", self.version.to_string());
        out.push("Versió", self.release.to_string());
        out.push_nonempty("Codi de sèrie", &self.serial);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::MemoryReader;

    pub(crate) fn sample_story(version: u8, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[0] = version;
        data[2..4].copy_from_slice(&88u16.to_be_bytes());
        data[SERIAL].copy_from_slice(b"840726");
        data
    }

    #[test]
    fn test_extract_v3() {
        let source = MemoryReader::new(sample_story(3, 1024));
        let record = extract(&source).unwrap();
        assert_eq!(record.version, 3);
        assert_eq!(record.release, 88);
        assert_eq!(record.serial, "840726");

        let mut out = Pairs::new();
        record.render(&mut out);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_v1_has_no_serial() {
        let source = MemoryReader::new(sample_story(1, 128));
        let record = extract(&source).unwrap();
        assert!(record.serial.is_empty());
        let mut out = Pairs::new();
        record.render(&mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_size_limits() {
        let too_big = sample_story(3, 128 * 1024 + 1);
        assert!(extract(&MemoryReader::new(too_big)).is_err());
        let fits = sample_story(5, 200 * 1024);
        assert!(extract(&MemoryReader::new(fits)).is_ok());
        assert!(extract(&MemoryReader::new(sample_story(9, 100))).is_err());
        assert!(extract(&MemoryReader::new(vec![3u8; 63])).is_err());
    }
}
