//! Random-access byte sources and bounds-checked windows over them.
//!
//! Every decoder reads through a [`ByteWindow`]: a `(base, len)` region of a
//! [`ByteSource`]. Windows nest without copying, so a chunk inside a chunk
//! inside a file is just another window over the same source.

use crate::error::{Error, Result};
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A randomly readable source of bytes, typically a file on disk.
///
/// Reads are positioned, so a shared reference is enough to read from
/// any offset. A source is still meant to be confined to one extraction
/// call at a time.
pub trait ByteSource {
    /// Reads up to `buffer.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is smaller than the buffer
    /// only when the end of the source is reached.
    fn read_chunk(&self, offset: u64, buffer: &mut [u8]) -> Result<usize>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;
}

/// Positioned reader over a regular file.
pub struct DiskReader {
    file: File,
    size: u64,
}

impl DiskReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).open(path.as_ref())?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{Advice, fadvise};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
        }

        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        Ok(Self { file, size })
    }

    #[cfg(unix)]
    fn pread(&self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buffer, offset)
    }

    #[cfg(windows)]
    fn pread(&self, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buffer, offset)
    }
}

impl ByteSource for DiskReader {
    fn read_chunk(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buffer.len() {
            match self.pread(offset + total as u64, &mut buffer[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Read-only memory map of a whole file.
pub struct MmapReader {
    mmap: Mmap,
}

impl MmapReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;

        if file.metadata()?.len() == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty file",
            )));
        }

        // SAFETY: the mapping is read-only and the catalog never writes to
        // the files it inspects while an extraction is running.
        let mmap = unsafe { Mmap::map(&file) }?;

        Ok(Self { mmap })
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }
}

impl ByteSource for MmapReader {
    fn read_chunk(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        Ok(copy_from_slice(&self.mmap, offset, buffer))
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}

/// Owned in-memory bytes, used for decompressed streams and fixtures.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl ByteSource for MemoryReader {
    fn read_chunk(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        Ok(copy_from_slice(&self.data, offset, buffer))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

fn copy_from_slice(data: &[u8], offset: u64, buffer: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }
    let end = start.saturating_add(buffer.len()).min(data.len());
    let len = end - start;
    buffer[..len].copy_from_slice(&data[start..end]);
    len
}

/// The source the registry opens for a path.
pub enum Reader {
    Mmap(MmapReader),
    Disk(DiskReader),
}

impl Reader {
    /// Maps the file when possible and falls back to positioned reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match MmapReader::new(path) {
            Ok(reader) => Ok(Reader::Mmap(reader)),
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "mmap unavailable, using disk reader");
                Ok(Reader::Disk(DiskReader::new(path)?))
            }
        }
    }
}

impl ByteSource for Reader {
    fn read_chunk(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        match self {
            Reader::Mmap(r) => r.read_chunk(offset, buffer),
            Reader::Disk(r) => r.read_chunk(offset, buffer),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Reader::Mmap(r) => r.size(),
            Reader::Disk(r) => r.size(),
        }
    }
}

/// A bounds-checked `[base, base + len)` region of a [`ByteSource`].
///
/// Offsets passed to [`ByteWindow::read_at`] are absolute source offsets,
/// so nested windows agree on addressing with their parents.
#[derive(Clone, Copy)]
pub struct ByteWindow<'a> {
    source: &'a dyn ByteSource,
    base: u64,
    len: u64,
}

impl<'a> ByteWindow<'a> {
    pub fn new(source: &'a dyn ByteSource, base: u64, len: u64) -> Self {
        Self { source, base, len }
    }

    /// A window covering the whole source.
    pub fn whole(source: &'a dyn ByteSource) -> Self {
        Self::new(source, 0, source.size())
    }

    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.base + self.len
    }

    pub fn source(&self) -> &'a dyn ByteSource {
        self.source
    }

    fn check(&self, offset: u64, len: usize) -> Result<()> {
        let fits = offset >= self.base
            && offset
                .checked_add(len as u64)
                .is_some_and(|stop| stop <= self.end());
        if fits {
            Ok(())
        } else {
            Err(Error::OutOfBounds {
                offset,
                len,
                base: self.base,
                end: self.end(),
            })
        }
    }

    /// Fills `buf` from absolute `offset`, failing unless every byte arrives.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check(offset, buf.len())?;
        let actual = self.source.read_chunk(offset, buf)?;
        if actual != buf.len() {
            return Err(Error::ShortRead {
                offset,
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    pub fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.check(offset, len)?;
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Reads `N` bytes at `offset` relative to the window base.
    pub fn read_array<const N: usize>(&self, rel: u64) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_at(self.base + rel, &mut buf)?;
        Ok(buf)
    }

    /// Reads the entire window into memory.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let len = usize::try_from(self.len).map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "window too large to load",
            ))
        })?;
        self.read_vec(self.base, len)
    }

    /// A nested window at absolute `offset`; must lie inside this one.
    pub fn sub(&self, offset: u64, len: u64) -> Result<ByteWindow<'a>> {
        let fits = offset >= self.base
            && offset
                .checked_add(len)
                .is_some_and(|stop| stop <= self.end());
        if !fits {
            return Err(Error::OutOfBounds {
                offset,
                len: usize::try_from(len).unwrap_or(usize::MAX),
                base: self.base,
                end: self.end(),
            });
        }
        Ok(ByteWindow::new(self.source, offset, len))
    }

    pub fn reader(&self) -> SubfileReader<'a> {
        SubfileReader::new(*self)
    }
}

impl std::fmt::Debug for ByteWindow<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteWindow")
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}

/// Sequential `Read`/`Seek` view of a window, built only on `read_at`.
#[derive(Debug, Clone)]
pub struct SubfileReader<'a> {
    window: ByteWindow<'a>,
    pos: u64,
}

impl<'a> SubfileReader<'a> {
    pub fn new(window: ByteWindow<'a>) -> Self {
        Self { window, pos: 0 }
    }

    pub fn size(&self) -> u64 {
        self.window.len()
    }

    pub fn window(&self) -> ByteWindow<'a> {
        self.window
    }
}

impl Read for SubfileReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remain = self.window.len().saturating_sub(self.pos);
        if remain == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = buf.len().min(usize::try_from(remain).unwrap_or(usize::MAX));
        self.window
            .read_at(self.window.base() + self.pos, &mut buf[..n])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SubfileReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.window.len().checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        match target {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of subfile",
            )),
        }
    }
}

#[inline]
pub fn u16_le(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

#[inline]
pub fn u16_be(data: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([data[off], data[off + 1]])
}

#[inline]
pub fn u32_le(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

#[inline]
pub fn u32_be(data: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

#[inline]
pub fn u64_le(data: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[off..off + 8]);
    u64::from_le_bytes(raw)
}

/// Bytes up to the first NUL, lossily decoded.
pub fn str_until_nul(data: &[u8]) -> String {
    let end = memchr::memchr(0, data).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Bytes with trailing NULs removed, lossily decoded.
pub fn str_trim_nul(data: &[u8]) -> String {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// UTF-16LE text up to the first NUL code unit.
pub fn utf16le_until_nul(data: &[u8]) -> String {
    let units = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0);
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
