//! Cover and icon images.
//!
//! Packed console icons are never expanded up front: [`NdsIcon`] and
//! [`SmdhIcon`] keep the raw tile bytes and compute each pixel on request.

use crate::error::{Error, Result};
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgba};
use std::io::{BufReader, Read, Seek};

pub type Rgba16Image = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// Size in bytes of the 4bpp tile data of a Nintendo DS banner icon.
pub const NDS_ICON_BITMAP_SIZE: usize = 0x200;
/// Size in bytes of the 16-entry BGR555 palette that follows it.
pub const NDS_ICON_PALETTE_SIZE: usize = 0x20;
pub const NDS_ICON_SIDE: u32 = 32;

/// Size in bytes of the large (48x48 RGB565) icon inside an SMDH.
pub const SMDH_ICON_SIZE: usize = 0x1200;
pub const SMDH_ICON_SIDE: u32 = 48;

#[inline]
fn scale(value: u16, max: u16) -> u16 {
    ((u32::from(value) * 65535) / u32::from(max)) as u16
}

/// 32x32 banner icon: 4x4 tiles of 8x8 pixels, 4 bits per pixel, with a
/// 16-colour BGR555 palette in which entry 0 is transparent.
#[derive(Debug, Clone)]
pub struct NdsIcon {
    bitmap: Box<[u8; NDS_ICON_BITMAP_SIZE]>,
    palette: [Rgba<u16>; 16],
}

impl NdsIcon {
    /// Builds the icon from the 0x200 tile bytes and the 0x20 palette bytes.
    pub fn new(bitmap: &[u8], palette: &[u8]) -> Result<Self> {
        if bitmap.len() < NDS_ICON_BITMAP_SIZE || palette.len() < NDS_ICON_PALETTE_SIZE {
            return Err(Error::ShortRead {
                offset: 0,
                expected: NDS_ICON_BITMAP_SIZE + NDS_ICON_PALETTE_SIZE,
                actual: bitmap.len().min(NDS_ICON_BITMAP_SIZE) + palette.len(),
            });
        }
        let mut raw = Box::new([0u8; NDS_ICON_BITMAP_SIZE]);
        raw.copy_from_slice(&bitmap[..NDS_ICON_BITMAP_SIZE]);

        let mut colors = [Rgba([0u16; 4]); 16];
        for (i, color) in colors.iter_mut().enumerate().skip(1) {
            let v = u16::from_le_bytes([palette[i * 2], palette[i * 2 + 1]]);
            *color = Rgba([
                scale(v & 0x1f, 31),
                scale((v >> 5) & 0x1f, 31),
                scale((v >> 10) & 0x1f, 31),
                0xffff,
            ]);
        }

        Ok(Self {
            bitmap: raw,
            palette: colors,
        })
    }

    fn palette_index(&self, x: u32, y: u32) -> usize {
        let (x, y) = (x as usize, y as usize);
        let offset = (y / 8) * 4 * 32 + (x / 8) * 32 + (y % 8) * 4 + (x % 8) / 2;
        let byte = self.bitmap[offset];
        if x % 2 == 0 {
            (byte & 0x0f) as usize
        } else {
            (byte >> 4) as usize
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (NDS_ICON_SIDE, NDS_ICON_SIDE)
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Rgba<u16> {
        self.palette[self.palette_index(x, y)]
    }
}

/// 48x48 SMDH icon: 6x6 tiles of 8x8 RGB565 pixels, with pixels inside a
/// tile stored in recursive 2x2 quadrant order.
#[derive(Debug, Clone)]
pub struct SmdhIcon {
    data: Box<[u8; SMDH_ICON_SIZE]>,
}

impl SmdhIcon {
    pub fn new(data: &[u8]) -> Result<Self> {
        if data.len() < SMDH_ICON_SIZE {
            return Err(Error::ShortRead {
                offset: 0,
                expected: SMDH_ICON_SIZE,
                actual: data.len(),
            });
        }
        let mut raw = Box::new([0u8; SMDH_ICON_SIZE]);
        raw.copy_from_slice(&data[..SMDH_ICON_SIZE]);
        Ok(Self { data: raw })
    }

    /// Byte offset of pixel `(x, y)`.
    pub fn pixel_offset(x: u32, y: u32) -> usize {
        const TILES_PER_ROW: usize = 6;
        const TILE_SIZE: usize = 8 * 8 * 2;

        let (x, y) = (x as usize, y as usize);
        let tile = (y / 8) * TILES_PER_ROW + (x / 8);
        let mut offset = tile * TILE_SIZE;

        let (mut px, mut py) = (x % 8, y % 8);
        offset += (((py >> 2) << 1) + (px >> 2)) << 5;
        px &= 0x3;
        py &= 0x3;
        offset += (((py >> 1) << 1) + (px >> 1)) << 3;
        px &= 0x1;
        py &= 0x1;
        offset += ((py << 1) + px) << 1;
        offset
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (SMDH_ICON_SIDE, SMDH_ICON_SIDE)
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Rgba<u16> {
        let offset = Self::pixel_offset(x, y);
        let v = u16::from_le_bytes([self.data[offset], self.data[offset + 1]]);
        Rgba([
            scale((v >> 11) & 0x1f, 31),
            scale((v >> 5) & 0x3f, 63),
            scale(v & 0x1f, 31),
            0xffff,
        ])
    }
}

/// The result of decoding a file's cover or icon.
#[derive(Debug, Clone)]
pub enum Picture {
    Nds(NdsIcon),
    Smdh(SmdhIcon),
    Bitmap(DynamicImage),
}

impl Picture {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Picture::Nds(icon) => icon.dimensions(),
            Picture::Smdh(icon) => icon.dimensions(),
            Picture::Bitmap(img) => img.dimensions(),
        }
    }

    /// Colour of one pixel, 16 bits per channel.
    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u16> {
        match self {
            Picture::Nds(icon) => icon.get_pixel(x, y),
            Picture::Smdh(icon) => icon.get_pixel(x, y),
            Picture::Bitmap(img) => {
                let Rgba([r, g, b, a]) = img.get_pixel(x, y);
                Rgba([
                    u16::from(r) * 257,
                    u16::from(g) * 257,
                    u16::from(b) * 257,
                    u16::from(a) * 257,
                ])
            }
        }
    }

    /// Expands the picture into an owned RGBA buffer.
    pub fn to_rgba16(&self) -> Rgba16Image {
        match self {
            Picture::Nds(icon) => ImageBuffer::from_fn(NDS_ICON_SIDE, NDS_ICON_SIDE, |x, y| {
                icon.get_pixel(x, y)
            }),
            Picture::Smdh(icon) => {
                ImageBuffer::from_fn(SMDH_ICON_SIDE, SMDH_ICON_SIDE, |x, y| {
                    icon.get_pixel(x, y)
                })
            }
            Picture::Bitmap(img) => img.to_rgba16(),
        }
    }
}

/// Decodes an embedded PNG or JPEG stream.
pub fn decode_bitmap<R: Read + Seek>(reader: R, format: ImageFormat) -> Result<Picture> {
    let img = image::load(BufReader::new(reader), format)?;
    Ok(Picture::Bitmap(img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_nds_icon_all_zero_is_transparent() {
        let icon = NdsIcon::new(&[0u8; 0x200], &[0u8; 0x20]).unwrap();
        assert_eq!(icon.dimensions(), (32, 32));
        for y in 0..NDS_ICON_SIDE {
            for x in 0..NDS_ICON_SIDE {
                assert_eq!(icon.get_pixel(x, y), Rgba([0, 0, 0, 0]));
            }
        }
    }

    #[test]
    fn test_nds_icon_nibble_order() {
        let mut bitmap = [0u8; 0x200];
        bitmap[0] = 0x21;
        let mut palette = [0u8; 0x20];
        palette[2..4].copy_from_slice(&0x001fu16.to_le_bytes());
        palette[4..6].copy_from_slice(&0x7c00u16.to_le_bytes());
        let icon = NdsIcon::new(&bitmap, &palette).unwrap();

        assert_eq!(icon.get_pixel(0, 0), Rgba([0xffff, 0, 0, 0xffff]));
        assert_eq!(icon.get_pixel(1, 0), Rgba([0, 0, 0xffff, 0xffff]));
        assert_eq!(icon.get_pixel(2, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_nds_icon_rejects_short_input() {
        let err = NdsIcon::new(&[0u8; 0x100], &[0u8; 0x20]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[test]
    fn test_smdh_offsets_cover_every_pixel_once() {
        let mut seen = HashSet::new();
        for y in 0..SMDH_ICON_SIDE {
            for x in 0..SMDH_ICON_SIDE {
                let off = SmdhIcon::pixel_offset(x, y);
                assert!(off + 1 < SMDH_ICON_SIZE);
                assert_eq!(off % 2, 0);
                assert!(seen.insert(off));
            }
        }
        assert_eq!(seen.len(), 48 * 48);
    }

    #[test]
    fn test_smdh_quadrant_addressing() {
        assert_eq!(SmdhIcon::pixel_offset(0, 0), 0);
        assert_eq!(SmdhIcon::pixel_offset(1, 0), 2);
        assert_eq!(SmdhIcon::pixel_offset(0, 1), 4);
        assert_eq!(SmdhIcon::pixel_offset(2, 0), 8);
        assert_eq!(SmdhIcon::pixel_offset(4, 0), 32);
        assert_eq!(SmdhIcon::pixel_offset(0, 4), 64);
        assert_eq!(SmdhIcon::pixel_offset(8, 0), 128);
        assert_eq!(SmdhIcon::pixel_offset(0, 8), 6 * 128);
    }

    #[test]
    fn test_smdh_colour_scaling() {
        let mut data = vec![0u8; SMDH_ICON_SIZE];
        data[0..2].copy_from_slice(&0xf800u16.to_le_bytes());
        data[2..4].copy_from_slice(&0x07e0u16.to_le_bytes());
        let icon = SmdhIcon::new(&data).unwrap();
        assert_eq!(icon.get_pixel(0, 0), Rgba([0xffff, 0, 0, 0xffff]));
        assert_eq!(icon.get_pixel(1, 0), Rgba([0, 0xffff, 0, 0xffff]));
        assert_eq!(icon.get_pixel(47, 47), Rgba([0, 0, 0, 0xffff]));
    }

    #[test]
    fn test_picture_to_rgba16() {
        let pic = Picture::Smdh(SmdhIcon::new(&[0u8; SMDH_ICON_SIZE]).unwrap());
        let buf = pic.to_rgba16();
        assert_eq!(buf.dimensions(), (48, 48));
    }
}
