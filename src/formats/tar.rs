//! Tape archives, plain or gzip-compressed.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow};
use crate::render::Pairs;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader, Read};

const BLOCK: usize = 512;
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const CHECKSUM: std::ops::Range<usize> = 148..156;
const SIZE: std::ops::Range<usize> = 124..136;
const TYPE_FLAG: usize = 156;

/// Header types that describe the next entry rather than being one.
const META_TYPES: [u8; 4] = [b'L', b'K', b'x', b'g'];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarRecord {
    pub entries: u64,
}

/// Parses a numeric header field: octal text, or base-256 when the high
/// bit of the first byte is set.
fn parse_number(field: &[u8]) -> Option<u64> {
    if field.first().is_some_and(|b| b & 0x80 != 0) {
        return field.iter().enumerate().try_fold(0u64, |acc, (i, &b)| {
            let b = if i == 0 { b & 0x7F } else { b };
            acc.checked_mul(256)?.checked_add(u64::from(b))
        });
    }
    let text: Vec<u8> = field
        .iter()
        .copied()
        .filter(|&b| b != 0 && b != b' ')
        .collect();
    if text.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(std::str::from_utf8(&text).ok()?, 8).ok()
}

/// Unsigned header sum with the checksum field read as spaces.
pub fn header_checksum(block: &[u8; BLOCK]) -> u64 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM.contains(&i) { 32 } else { u64::from(b) })
        .sum()
}

fn is_valid_header(block: &[u8; BLOCK]) -> bool {
    parse_number(&block[CHECKSUM]).is_some_and(|stored| stored == header_checksum(block))
}

/// Fills `buf` completely, or returns `false` on a clean end of stream.
fn read_block(reader: &mut impl Read, buf: &mut [u8; BLOCK]) -> Result<bool> {
    let mut filled = 0;
    while filled < BLOCK {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(false),
        BLOCK => Ok(true),
        _ => Err(Error::malformed("tar stream ends inside a block")),
    }
}

/// Counts the entries of a tar stream.
pub fn count_entries(mut reader: impl Read) -> Result<u64> {
    let mut block = [0u8; BLOCK];
    let mut entries = 0u64;
    let mut headers = 0u64;

    while read_block(&mut reader, &mut block)? {
        if block.iter().all(|&b| b == 0) {
            break;
        }
        if !is_valid_header(&block) {
            return Err(if headers == 0 {
                Error::mismatch("no valid tar header")
            } else {
                Error::malformed(format!("bad tar header checksum after {headers} headers"))
            });
        }
        headers += 1;
        if !META_TYPES.contains(&block[TYPE_FLAG]) {
            entries += 1;
        }

        let size = parse_number(&block[SIZE])
            .ok_or_else(|| Error::malformed("unreadable tar entry size"))?;
        let padded = size.div_ceil(BLOCK as u64) * BLOCK as u64;
        let skipped = io::copy(&mut (&mut reader).take(padded), &mut io::sink())?;
        if skipped != padded {
            return Err(Error::malformed("tar entry data is truncated"));
        }
    }

    if headers == 0 {
        return Err(Error::mismatch("no valid tar header"));
    }
    Ok(entries)
}

pub fn extract(source: &dyn ByteSource) -> Result<TarRecord> {
    let window = ByteWindow::whole(source);
    let compressed = window.len() >= 2 && window.read_array::<2>(0)? == GZIP_MAGIC;
    let reader = BufReader::new(window.reader());
    let entries = if compressed {
        tracing::debug!("walking gzip-compressed tar stream");
        count_entries(MultiGzDecoder::new(reader))
    } else {
        count_entries(reader)
    }?;
    Ok(TarRecord { entries })
}

impl TarRecord {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Nº Fitxers", self.entries.to_string());
    }
}
