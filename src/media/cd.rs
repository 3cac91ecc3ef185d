//! CD image access: session/track enumeration and user-data readers.
//!
//! Only single-track images are understood: "cooked" 2048-byte sector dumps
//! (`.iso`) and raw 2352-byte sector dumps (`.bin`) in Mode 1 or Mode 2
//! Form 1.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};

pub const SECTOR_SIZE: usize = 2048;
pub const RAW_SECTOR_SIZE: usize = 2352;

const SYNC_PATTERN: [u8; 12] = [
    0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
];

/// The smallest image that can hold a volume descriptor at sector 16.
const MIN_SECTORS: u64 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectorLayout {
    Cooked,
    RawMode1,
    RawMode2Form1,
}

impl SectorLayout {
    #[inline]
    pub fn stride(self) -> u64 {
        match self {
            SectorLayout::Cooked => SECTOR_SIZE as u64,
            SectorLayout::RawMode1 | SectorLayout::RawMode2Form1 => RAW_SECTOR_SIZE as u64,
        }
    }

    /// Offset of the 2048 user-data bytes inside a stored sector.
    #[inline]
    pub fn data_offset(self) -> u64 {
        match self {
            SectorLayout::Cooked => 0,
            SectorLayout::RawMode1 => 16,
            SectorLayout::RawMode2Form1 => 24,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SectorLayout::Cooked => "ISO (2048 bytes/sector)",
            SectorLayout::RawMode1 => "BIN (2352 bytes/sector, Mode 1)",
            SectorLayout::RawMode2Form1 => "BIN (2352 bytes/sector, Mode 2)",
        }
    }
}

/// Inspects the first sector and the image size to pick a layout.
pub fn detect_layout(window: ByteWindow<'_>) -> Result<SectorLayout> {
    let size = window.len();
    let raw = RAW_SECTOR_SIZE as u64;
    if size >= raw * MIN_SECTORS && size % raw == 0 {
        let head: [u8; 16] = window.read_array(0)?;
        if head[..12] == SYNC_PATTERN {
            return match head[15] {
                1 => Ok(SectorLayout::RawMode1),
                2 => Ok(SectorLayout::RawMode2Form1),
                mode => Err(Error::mismatch(format!("unsupported CD sector mode {mode}"))),
            };
        }
    }
    if size >= SECTOR_SIZE as u64 * MIN_SECTORS {
        return Ok(SectorLayout::Cooked);
    }
    Err(Error::mismatch(format!(
        "{size} bytes is not a recognised CD image size"
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfo {
    pub number: u32,
    pub sectors: u64,
    pub layout: SectorLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub tracks: Vec<TrackInfo>,
}

/// What the engine needs from an opened optical image.
pub trait OpticalImage {
    fn format_name(&self) -> String;
    fn sessions(&self) -> Vec<SessionInfo>;
    fn track(&self, session: usize, track: usize) -> Result<Track<'_>>;
}

/// A single-session, single-track disc image.
pub struct DiscImage<'a> {
    window: ByteWindow<'a>,
    layout: SectorLayout,
}

impl<'a> DiscImage<'a> {
    pub fn open(source: &'a dyn ByteSource) -> Result<Self> {
        let window = ByteWindow::whole(source);
        let layout = detect_layout(window)?;
        tracing::debug!(layout = layout.name(), size = window.len(), "opened CD image");
        Ok(Self { window, layout })
    }

    pub fn layout(&self) -> SectorLayout {
        self.layout
    }

    /// The only track, tied to the source rather than to `self`.
    pub fn data_track(&self) -> Track<'a> {
        Track {
            window: self.window,
            layout: self.layout,
            sectors: self.sector_count(),
        }
    }

    fn sector_count(&self) -> u64 {
        self.window.len() / self.layout.stride()
    }
}

impl OpticalImage for DiscImage<'_> {
    fn format_name(&self) -> String {
        self.layout.name().to_string()
    }

    fn sessions(&self) -> Vec<SessionInfo> {
        vec![SessionInfo {
            tracks: vec![TrackInfo {
                number: 1,
                sectors: self.sector_count(),
                layout: self.layout,
            }],
        }]
    }

    fn track(&self, session: usize, track: usize) -> Result<Track<'_>> {
        if session != 0 || track != 0 {
            return Err(Error::mismatch(format!(
                "image has no session {session} track {track}"
            )));
        }
        Ok(self.data_track())
    }
}

/// User-data view of one data track.
#[derive(Debug, Clone, Copy)]
pub struct Track<'a> {
    window: ByteWindow<'a>,
    layout: SectorLayout,
    sectors: u64,
}

impl<'a> Track<'a> {
    pub fn sectors(&self) -> u64 {
        self.sectors
    }

    /// Reads the 2048 user-data bytes of sector `lba`.
    pub fn read_sector(&self, lba: u64, buf: &mut [u8; SECTOR_SIZE]) -> Result<()> {
        if lba >= self.sectors {
            return Err(Error::OutOfBounds {
                offset: lba,
                len: SECTOR_SIZE,
                base: 0,
                end: self.sectors,
            });
        }
        let offset = self.window.base() + lba * self.layout.stride() + self.layout.data_offset();
        self.window.read_at(offset, buf)
    }

    /// Sequential reader over the whole track, positioned at sector 0.
    pub fn reader(&self) -> TrackReader<'a> {
        TrackReader {
            track: *self,
            pos: 0,
            end: self.sectors * SECTOR_SIZE as u64,
        }
    }

    /// Sequential reader over `len` bytes of user data from sector `lba`.
    pub fn reader_at(&self, lba: u64, len: u64) -> TrackReader<'a> {
        let start = lba * SECTOR_SIZE as u64;
        let limit = self.sectors * SECTOR_SIZE as u64;
        TrackReader {
            track: *self,
            pos: start.min(limit),
            end: start.saturating_add(len).min(limit),
        }
    }
}

/// `Read` over a contiguous run of user data, crossing sector boundaries.
#[derive(Debug, Clone)]
pub struct TrackReader<'a> {
    track: Track<'a>,
    pos: u64,
    end: u64,
}

impl TrackReader<'_> {
    /// Moves to the start of sector `lba`.
    pub fn seek_sector(&mut self, lba: u64) {
        self.pos = (lba * SECTOR_SIZE as u64).min(self.end);
    }

    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.pos)
    }
}

impl Read for TrackReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end || buf.is_empty() {
            return Ok(0);
        }
        let sector_len = SECTOR_SIZE as u64;
        let lba = self.pos / sector_len;
        let within = (self.pos % sector_len) as usize;
        let mut sector = [0u8; SECTOR_SIZE];
        self.track.read_sector(lba, &mut sector)?;

        let n = buf
            .len()
            .min(SECTOR_SIZE - within)
            .min(usize::try_from(self.remaining()).unwrap_or(usize::MAX));
        buf[..n].copy_from_slice(&sector[within..within + n]);
        self.pos += n as u64;
        Ok(n)
    }
}
