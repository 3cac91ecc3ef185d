//! Readers for the disc and cartridge containers some formats live in.

pub mod cd;
pub mod ctr;
pub mod iso9660;

pub use cd::{DiscImage, OpticalImage, Track, TrackReader};
pub use iso9660::{DirEntry, Iso9660, VolumeInfo};
