use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, u16_be};
use crate::picture::{Picture, decode_bitmap};
use crate::render::Pairs;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

const MAX_SEGMENTS: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JpegRecord {
    pub width: u16,
    pub height: u16,
    pub has_jfif: bool,
    pub has_exif: bool,
}

/// Walks marker segments from SOI until a baseline/progressive SOF gives
/// the frame size. Scan data is never entered.
pub fn extract(source: &dyn ByteSource) -> Result<JpegRecord> {
    let window = ByteWindow::whole(source);
    if window.len() < 4 {
        return Err(Error::mismatch("file too small for a JPEG"));
    }
    let head: [u8; 3] = window.read_array(0)?;
    if head[..2] != JPEG_SOI || head[2] != 0xFF {
        return Err(Error::mismatch("missing JPEG SOI marker"));
    }

    let mut record = JpegRecord::default();
    let mut pos = window.base() + 2;

    for _ in 0..MAX_SEGMENTS {
        if pos + 4 > window.end() {
            break;
        }
        let mut marker = [0u8; 4];
        window.read_at(pos, &mut marker)?;
        if marker[0] != 0xFF {
            break;
        }

        match marker[1] {
            0xFF => {
                pos += 1;
                continue;
            }
            0x00 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            0xD9 | 0xDA => break,
            _ => {}
        }

        let seg_len = u64::from(u16_be(&marker, 2));
        if seg_len < 2 {
            break;
        }

        match marker[1] {
            0xC0..=0xC3 => {
                if pos + 9 > window.end() {
                    break;
                }
                let sof: [u8; 9] = window.read_array(pos - window.base())?;
                record.height = u16_be(&sof, 5);
                record.width = u16_be(&sof, 7);
                if record.width == 0 || record.height == 0 {
                    return Err(Error::mismatch("JPEG frame with a zero dimension"));
                }
                return Ok(record);
            }
            0xE0 if seg_len >= 7 && pos + 9 <= window.end() => {
                let tag: [u8; 5] = window.read_array(pos + 4 - window.base())?;
                record.has_jfif |= &tag == b"JFIF\0";
            }
            0xE1 if seg_len >= 8 && pos + 10 <= window.end() => {
                let tag: [u8; 6] = window.read_array(pos + 4 - window.base())?;
                record.has_exif |= &tag == b"Exif\0\0";
            }
            _ => {}
        }

        pos += 2 + seg_len;
    }

    Err(Error::mismatch("no JPEG frame header before the scan data"))
}

pub fn image(source: &dyn ByteSource) -> Result<Picture> {
    decode_bitmap(ByteWindow::whole(source).reader(), ImageFormat::Jpeg)
}

impl JpegRecord {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Dimensions", format!("{} x {}", self.width, self.height));
    }
}
