//! One decoder module per recognized file format.
//!
//! Each module exposes `extract(&dyn ByteSource)` returning its record type,
//! a `render` method on that record and, for image-capable formats, an
//! `image(&dyn ByteSource)` function. The registry ties them to format ids.

pub mod cxi;
pub mod fat12;
pub mod gbc;
pub mod gg;
pub mod iso;
pub mod jpeg;
pub mod md;
pub mod n3ds;
pub mod nds;
pub mod nes;
pub mod optical;
pub mod pdf;
pub mod png;
pub mod ps1;
pub mod ps2;
pub mod psp;
pub mod sfz;
pub mod tar;
pub mod zblorb;
pub mod zip;
