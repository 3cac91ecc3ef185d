//! ZIP archives, described from their end-of-central-directory record.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, u16_le, u32_le, u64_le};
use crate::render::Pairs;
use memchr::memmem;
use serde::{Deserialize, Serialize};

const EOCD_MAGIC: &[u8; 4] = b"PK\x05\x06";
const EOCD_SIZE: usize = 22;
const MAX_COMMENT: usize = 0xFFFF;
const ZIP64_LOCATOR_MAGIC: &[u8; 4] = b"PK\x06\x07";
const ZIP64_LOCATOR_SIZE: u64 = 20;
const ZIP64_EOCD_MAGIC: &[u8; 4] = b"PK\x06\x06";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipRecord {
    pub comment: String,
    pub entries: u64,
}

/// Finds the end-of-central-directory record in `tail`, the last bytes of a
/// file of `file_size` bytes. Returns its offset within `tail`.
fn find_eocd(tail: &[u8], file_size: u64) -> Option<usize> {
    let tail_start = file_size - tail.len() as u64;
    let mut limit = tail.len();
    while let Some(pos) = memmem::rfind(&tail[..limit], EOCD_MAGIC) {
        if pos + EOCD_SIZE <= tail.len() {
            let comment_len = usize::from(u16_le(tail, pos + 20));
            let cd_size = u64::from(u32_le(tail, pos + 12));
            let cd_offset = u64::from(u32_le(tail, pos + 16));
            let record_end = pos + EOCD_SIZE + comment_len;
            let eocd_abs = tail_start + pos as u64;
            if record_end <= tail.len()
                && (cd_offset == u64::from(u32::MAX) || cd_offset + cd_size <= eocd_abs)
            {
                return Some(pos);
            }
        }
        if pos == 0 {
            break;
        }
        limit = pos + EOCD_MAGIC.len() - 1;
    }
    None
}

/// Entry count from the ZIP64 end-of-central-directory record, which is
/// reached through the locator right before the classic record.
fn zip64_entries(window: ByteWindow<'_>, eocd_abs: u64) -> Result<Option<u64>> {
    let Some(locator_abs) = eocd_abs.checked_sub(ZIP64_LOCATOR_SIZE) else {
        return Ok(None);
    };
    let locator: [u8; ZIP64_LOCATOR_SIZE as usize] = window.read_array(locator_abs)?;
    if &locator[..4] != ZIP64_LOCATOR_MAGIC {
        return Ok(None);
    }
    let record_abs = u64_le(&locator, 8);
    let record: [u8; 56] = window
        .read_array(record_abs)
        .map_err(|_| Error::malformed("ZIP64 end of central directory lies outside the file"))?;
    if &record[..4] != ZIP64_EOCD_MAGIC {
        return Err(Error::malformed("bad ZIP64 end of central directory signature"));
    }
    Ok(Some(u64_le(&record, 32)))
}

pub fn extract(source: &dyn ByteSource) -> Result<ZipRecord> {
    let window = ByteWindow::whole(source);
    let size = window.len();
    if size < EOCD_SIZE as u64 {
        return Err(Error::mismatch("file too small for a ZIP archive"));
    }
    let tail_len = size.min((EOCD_SIZE + MAX_COMMENT) as u64);
    let tail = window.read_vec(size - tail_len, tail_len as usize)?;
    let pos = find_eocd(&tail, size)
        .ok_or_else(|| Error::mismatch("no end of central directory record"))?;

    let record = &tail[pos..];
    let comment_len = usize::from(u16_le(record, 20));
    let comment =
        String::from_utf8_lossy(&record[EOCD_SIZE..EOCD_SIZE + comment_len]).into_owned();

    let mut entries = u64::from(u16_le(record, 10));
    if entries == 0xFFFF {
        let eocd_abs = size - tail_len + pos as u64;
        if let Some(wide) = zip64_entries(window, eocd_abs)? {
            entries = wide;
        }
    }

    Ok(ZipRecord { comment, entries })
}

impl ZipRecord {
    pub fn render(&self, out: &mut Pairs) {
        out.push_nonempty("Comentari", &self.comment);
        out.push("Nº Fitxers", self.entries.to_string());
    }
}
