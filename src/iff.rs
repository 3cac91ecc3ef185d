//! Lazy reader for IFF-family chunk containers.
//!
//! A container is a tree of chunks. Each chunk is a 4-byte tag, a big-endian
//! 32-bit payload length and the payload, padded to an even length. Chunks
//! tagged `FORM`, `LIST`, `CAT ` or `PROP` are directories of further chunks.

use crate::error::{Error, Result};
use crate::io::{ByteWindow, SubfileReader};

pub const GROUP_TAGS: [&[u8; 4]; 4] = [b"FORM", b"CAT ", b"LIST", b"PROP"];

const CHUNK_HEADER_SIZE: u64 = 8;
const GROUP_HEADER_SIZE: u64 = 12;

#[inline]
pub fn is_group_tag(tag: &[u8; 4]) -> bool {
    GROUP_TAGS.iter().any(|g| *g == tag)
}

fn decode_length(raw: [u8; 4], offset: u64) -> Result<u64> {
    let len = i32::from_be_bytes(raw);
    if len < 0 {
        return Err(Error::malformed(format!(
            "negative chunk length {len} at offset {offset}"
        )));
    }
    Ok(len as u64)
}

/// Tag to printable text, for logs and error messages.
pub fn tag_str(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// The children of one grouping chunk.
#[derive(Debug, Clone, Copy)]
pub struct Directory<'a> {
    window: ByteWindow<'a>,
    kind: [u8; 4],
    sub_kind: [u8; 4],
    offset: u64,
    nbytes: u64,
}

impl<'a> Directory<'a> {
    /// Reads the 12-byte group header at the start of `window`.
    pub fn open_root(window: ByteWindow<'a>) -> Result<Self> {
        let header: [u8; 12] = window.read_array(0)?;
        let mut kind = [0u8; 4];
        kind.copy_from_slice(&header[0..4]);
        if !is_group_tag(&kind) {
            return Err(Error::malformed(format!(
                "unknown IFF group chunk '{}'",
                tag_str(&kind)
            )));
        }
        let size = decode_length([header[4], header[5], header[6], header[7]], window.base())?;
        if size < 4 {
            return Err(Error::malformed(format!(
                "group chunk '{}' too small ({size} bytes)",
                tag_str(&kind)
            )));
        }
        let mut sub_kind = [0u8; 4];
        sub_kind.copy_from_slice(&header[8..12]);

        let offset = window.base() + GROUP_HEADER_SIZE;
        let nbytes = size - 4;
        if offset + nbytes > window.end() {
            return Err(Error::malformed(format!(
                "group chunk '{}' declares {size} bytes but only {} are available",
                tag_str(&kind),
                window.len().saturating_sub(CHUNK_HEADER_SIZE)
            )));
        }

        Ok(Self {
            window,
            kind,
            sub_kind,
            offset,
            nbytes,
        })
    }

    /// Group tag (`FORM`, `LIST`, ...).
    pub fn kind(&self) -> [u8; 4] {
        self.kind
    }

    /// Type tag that follows the group header, e.g. `IFRS` for Blorb.
    pub fn sub_kind(&self) -> [u8; 4] {
        self.sub_kind
    }

    pub fn begin(&self) -> Result<ChunkIter<'a>> {
        let mut it = ChunkIter {
            dir: *self,
            offset: self.offset,
            kind: [0; 4],
            nbytes: 0,
            index: 0,
        };
        if !it.is_end() {
            it.load()?;
        }
        Ok(it)
    }

    fn end(&self) -> u64 {
        self.offset + self.nbytes
    }
}

/// Forward-only cursor over the chunks of a [`Directory`].
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    dir: Directory<'a>,
    offset: u64,
    kind: [u8; 4],
    nbytes: u64,
    index: usize,
}

impl<'a> ChunkIter<'a> {
    fn load(&mut self) -> Result<()> {
        if self.offset + CHUNK_HEADER_SIZE > self.dir.end() {
            return Err(Error::malformed(format!(
                "truncated chunk header at offset {}",
                self.offset
            )));
        }
        let mut header = [0u8; 8];
        self.dir.window.read_at(self.offset, &mut header)?;
        self.kind.copy_from_slice(&header[0..4]);
        self.nbytes = decode_length([header[4], header[5], header[6], header[7]], self.offset)?;
        if self.offset + CHUNK_HEADER_SIZE + self.nbytes > self.dir.end() {
            return Err(Error::malformed(format!(
                "chunk '{}' at offset {} overruns its directory",
                tag_str(&self.kind),
                self.offset
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.offset >= self.dir.end()
    }

    /// Moves to the next sibling, skipping the pad byte of odd payloads.
    pub fn advance(&mut self) -> Result<()> {
        let mut next = self.offset + CHUNK_HEADER_SIZE + self.nbytes;
        if self.nbytes % 2 == 1 {
            next += 1;
        }
        self.index += 1;
        self.offset = next;
        if !self.is_end() {
            self.load()?;
        }
        Ok(())
    }

    pub fn kind(&self) -> [u8; 4] {
        self.kind
    }

    /// Payload length, excluding the pad byte.
    pub fn len(&self) -> u64 {
        self.nbytes
    }

    pub fn is_empty(&self) -> bool {
        self.nbytes == 0
    }

    /// 0-based position among its siblings.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Absolute offset of the chunk header.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Absolute offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + CHUNK_HEADER_SIZE
    }

    /// True when the chunk is a nested directory rather than a leaf.
    pub fn is_directory(&self) -> bool {
        is_group_tag(&self.kind)
    }

    pub fn directory(&self) -> Result<Directory<'a>> {
        let window = self
            .dir
            .window
            .sub(self.offset, CHUNK_HEADER_SIZE + self.nbytes)?;
        Directory::open_root(window)
    }

    pub fn payload(&self) -> Result<ByteWindow<'a>> {
        self.dir.window.sub(self.payload_offset(), self.nbytes)
    }

    pub fn file_reader(&self) -> Result<SubfileReader<'a>> {
        Ok(self.payload()?.reader())
    }
}

/// Reads the 8-byte chunk header at an absolute offset, as used when a
/// resource index points straight at a chunk.
pub fn chunk_at<'a>(window: ByteWindow<'a>, offset: u64) -> Result<([u8; 4], ByteWindow<'a>)> {
    let mut header = [0u8; 8];
    window.read_at(offset, &mut header)?;
    let mut kind = [0u8; 4];
    kind.copy_from_slice(&header[0..4]);
    let nbytes = decode_length([header[4], header[5], header[6], header[7]], offset)?;
    let payload = window.sub(offset + CHUNK_HEADER_SIZE, nbytes).map_err(|_| {
        Error::malformed(format!(
            "chunk '{}' at offset {offset} overruns the file",
            tag_str(&kind)
        ))
    })?;
    Ok((kind, payload))
}
