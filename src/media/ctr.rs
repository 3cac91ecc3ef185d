//! Nintendo 3DS containers: NCSD cartridge images, NCCH partitions and the
//! ExeFS embedded in executable partitions.

use crate::error::{Error, Result};
use crate::io::{ByteWindow, str_trim_nul, u16_le, u32_le, u64_le};
use serde::{Deserialize, Serialize};

pub const MEDIA_UNIT: u64 = 0x200;

const NCSD_MAGIC: &[u8; 4] = b"NCSD";
const NCCH_MAGIC: &[u8; 4] = b"NCCH";
const HEADER_SIZE: usize = 0x200;
const CARD_HEADER_SIZE: usize = 0x400;
const EXEFS_HEADER_SIZE: u64 = 0x200;
const EXEFS_ENTRIES: usize = 10;

const CONTENT_TYPE_EXECUTABLE: u8 = 0x02;
const FLAG_NO_CRYPTO: u8 = 0x04;

/// NCSD header plus the card-info fields that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcsdHeader {
    pub size: u64,
    pub media_id: u64,
    /// `(offset, size)` in bytes for each of the 8 partitions.
    pub partitions: [(u64, u64); 8],
    pub title_version: u16,
    pub card_revision: u16,
    pub cver_title_id: u64,
    pub cver_version: u16,
}

impl NcsdHeader {
    pub fn read(window: ByteWindow<'_>) -> Result<Self> {
        if window.len() < CARD_HEADER_SIZE as u64 {
            return Err(Error::mismatch("file too small for an NCSD header"));
        }
        let buf: [u8; CARD_HEADER_SIZE] = window.read_array(0)?;
        if &buf[0x100..0x104] != NCSD_MAGIC {
            return Err(Error::mismatch("missing NCSD magic at 0x100"));
        }

        let mut partitions = [(0u64, 0u64); 8];
        for (i, partition) in partitions.iter_mut().enumerate() {
            let base = 0x120 + i * 8;
            *partition = (
                u64::from(u32_le(&buf, base)) * MEDIA_UNIT,
                u64::from(u32_le(&buf, base + 4)) * MEDIA_UNIT,
            );
        }

        Ok(Self {
            size: u64::from(u32_le(&buf, 0x104)) * MEDIA_UNIT,
            media_id: u64_le(&buf, 0x108),
            partitions,
            title_version: u16_le(&buf, 0x310),
            card_revision: u16_le(&buf, 0x312),
            cver_title_id: u64_le(&buf, 0x320),
            cver_version: u16_le(&buf, 0x328),
        })
    }

    /// Window over partition `index`, which must be present.
    pub fn partition<'a>(&self, window: ByteWindow<'a>, index: usize) -> Result<ByteWindow<'a>> {
        let (offset, size) = self.partitions[index];
        if size == 0 {
            return Err(Error::mismatch(format!("partition {index} is empty")));
        }
        window
            .sub(window.base() + offset, size)
            .map_err(|_| Error::mismatch(format!("partition {index} lies outside the image")))
    }
}

/// The NCCH fields shown in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcchHeader {
    pub size: u64,
    pub id: u64,
    pub maker_code: String,
    pub version: u16,
    pub program_id: u64,
    pub product_code: String,
    pub content_type: u8,
    pub no_crypto: bool,
    pub exefs_offset: u64,
    pub exefs_size: u64,
}

impl NcchHeader {
    pub fn read(window: ByteWindow<'_>) -> Result<Self> {
        if window.len() < HEADER_SIZE as u64 {
            return Err(Error::mismatch("file too small for an NCCH header"));
        }
        let buf: [u8; HEADER_SIZE] = window.read_array(0)?;
        if &buf[0x100..0x104] != NCCH_MAGIC {
            return Err(Error::mismatch("missing NCCH magic at 0x100"));
        }
        let flags = &buf[0x188..0x190];

        Ok(Self {
            size: u64::from(u32_le(&buf, 0x104)) * MEDIA_UNIT,
            id: u64_le(&buf, 0x108),
            maker_code: str_trim_nul(&buf[0x110..0x112]),
            version: u16_le(&buf, 0x112),
            program_id: u64_le(&buf, 0x118),
            product_code: str_trim_nul(&buf[0x150..0x160]),
            content_type: flags[5],
            no_crypto: flags[7] & FLAG_NO_CRYPTO != 0,
            exefs_offset: u64::from(u32_le(&buf, 0x1A0)) * MEDIA_UNIT,
            exefs_size: u64::from(u32_le(&buf, 0x1A4)) * MEDIA_UNIT,
        })
    }

    /// CXI partitions carry code; CFA partitions only data.
    pub fn is_executable(&self) -> bool {
        self.content_type & CONTENT_TYPE_EXECUTABLE != 0
    }

    /// Opens the ExeFS, or `None` when the partition has none.
    pub fn exefs<'a>(&self, window: ByteWindow<'a>) -> Result<Option<ExeFs<'a>>> {
        if self.exefs_offset == 0 || self.exefs_size == 0 {
            return Ok(None);
        }
        if !self.no_crypto {
            return Err(Error::mismatch("encrypted NCCH partitions are not supported"));
        }
        let exefs = window
            .sub(window.base() + self.exefs_offset, self.exefs_size)
            .map_err(|_| Error::mismatch("ExeFS lies outside the partition"))?;
        ExeFs::read(exefs).map(Some)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExeFsEntry {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

/// Executable file system: a 0x200-byte header of named entries.
#[derive(Debug, Clone)]
pub struct ExeFs<'a> {
    window: ByteWindow<'a>,
    entries: Vec<ExeFsEntry>,
}

impl<'a> ExeFs<'a> {
    pub fn read(window: ByteWindow<'a>) -> Result<Self> {
        let header: [u8; EXEFS_HEADER_SIZE as usize] = window.read_array(0)?;
        let entries = header[..EXEFS_ENTRIES * 16]
            .chunks_exact(16)
            .filter(|raw| raw[0] != 0)
            .map(|raw| ExeFsEntry {
                name: str_trim_nul(&raw[..8]),
                offset: u64::from(u32_le(raw, 8)),
                size: u64::from(u32_le(raw, 12)),
            })
            .collect();
        Ok(Self { window, entries })
    }

    pub fn entries(&self) -> &[ExeFsEntry] {
        &self.entries
    }

    /// Window over the entry called `name`, compared case-insensitively.
    pub fn open(&self, name: &str) -> Result<Option<ByteWindow<'a>>> {
        let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
        else {
            return Ok(None);
        };
        let start = self.window.base() + EXEFS_HEADER_SIZE + entry.offset;
        self.window
            .sub(start, entry.size)
            .map(Some)
            .map_err(|_| Error::mismatch(format!("ExeFS entry '{}' overruns the ExeFS", entry.name)))
    }
}
