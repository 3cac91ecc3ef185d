use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, u32_be};
use crate::picture::{Picture, decode_bitmap};
use crate::render::Pairs;
use image::ImageFormat;
use serde::{Deserialize, Serialize};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

const HEADER_LEN: usize = 33;
const MAX_CHUNKS: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PngRecord {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlaced: bool,
    pub has_text_chunks: bool,
    pub has_icc_profile: bool,
    pub has_physical_dimensions: bool,
}

/// Checks the signature and the IHDR chunk, CRC included.
pub fn validate_png_header(data: &[u8]) -> Result<PngRecord> {
    if data.len() < HEADER_LEN {
        return Err(Error::mismatch("file too small for a PNG header"));
    }
    if data[..8] != PNG_SIGNATURE {
        return Err(Error::mismatch("missing PNG signature"));
    }
    if &data[12..16] != b"IHDR" || u32_be(data, 8) != 13 {
        return Err(Error::mismatch("first PNG chunk is not a 13-byte IHDR"));
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[12..29]);
    let calculated = hasher.finalize();
    let stored = u32_be(data, 29);
    if calculated != stored {
        return Err(Error::mismatch(format!(
            "IHDR CRC mismatch: stored {stored:08x}, computed {calculated:08x}"
        )));
    }

    let width = u32_be(data, 16);
    let height = u32_be(data, 20);
    if width == 0 || height == 0 {
        return Err(Error::mismatch("PNG with a zero dimension"));
    }

    Ok(PngRecord {
        width,
        height,
        bit_depth: data[24],
        color_type: data[25],
        interlaced: data[28] != 0,
        ..PngRecord::default()
    })
}

/// Walks chunk headers after IHDR, noting the ancillary chunks present.
fn scan_chunks(window: ByteWindow<'_>, record: &mut PngRecord) -> Result<()> {
    let mut pos = window.base() + HEADER_LEN as u64;
    for _ in 0..MAX_CHUNKS {
        if pos + 12 > window.end() {
            break;
        }
        let mut head = [0u8; 8];
        window.read_at(pos, &mut head)?;
        let length = u64::from(u32_be(&head, 0));
        match &head[4..8] {
            b"tEXt" | b"iTXt" | b"zTXt" => record.has_text_chunks = true,
            b"iCCP" => record.has_icc_profile = true,
            b"pHYs" => record.has_physical_dimensions = true,
            b"IEND" => break,
            _ => {}
        }
        pos += 12 + length;
    }
    Ok(())
}

pub fn extract(source: &dyn ByteSource) -> Result<PngRecord> {
    let window = ByteWindow::whole(source);
    if window.len() < HEADER_LEN as u64 {
        return Err(Error::mismatch("file too small for a PNG header"));
    }
    let header: [u8; HEADER_LEN] = window.read_array(0)?;
    let mut record = validate_png_header(&header)?;
    scan_chunks(window, &mut record)?;
    Ok(record)
}

pub fn image(source: &dyn ByteSource) -> Result<Picture> {
    decode_bitmap(ByteWindow::whole(source).reader(), ImageFormat::Png)
}

fn color_type_name(color_type: u8) -> Option<&'static str> {
    Some(match color_type {
        0 => "Escala de grisos",
        2 => "RGB",
        3 => "Paleta",
        4 => "Escala de grisos amb alfa",
        6 => "RGBA",
        _ => return None,
    })
}

impl PngRecord {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Dimensions", format!("{} x {}", self.width, self.height));
        out.push("Profunditat de color", format!("{} bits", self.bit_depth));
        if let Some(name) = color_type_name(self.color_type) {
            out.push("Tipus de color", name);
        }
        out.push_yes_no("Entrellaçat", self.interlaced);
        out.push_yes_no("Text", self.has_text_chunks);
        out.push_yes_no("Perfil ICC", self.has_icc_profile);
        out.push_yes_no("Dimensions físiques", self.has_physical_dimensions);
    }
}
