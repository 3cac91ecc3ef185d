pub mod error;
pub mod formats;
pub mod iff;
pub mod io;
pub mod media;
pub mod metadata;
pub mod picture;
pub mod registry;
pub mod render;

pub use error::{Error, ErrorKind, Result};
pub use io::{ByteSource, ByteWindow, Reader};
pub use metadata::MetadataRecord;
pub use picture::Picture;
pub use registry::{FileType, FormatId, all_ids, file_summary, get};
pub use render::DisplayPair;
