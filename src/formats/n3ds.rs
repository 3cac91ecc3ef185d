//! Nintendo 3DS cartridge images (CCI).

use crate::error::Result;
use crate::formats::cxi::{self, CxiRecord};
use crate::io::{ByteSource, ByteWindow};
use crate::media::ctr::NcsdHeader;
use crate::picture::Picture;
use crate::render::{Pairs, size_to_text};
use serde::{Deserialize, Serialize};

/// Partition holding the game executable.
const GAME_PARTITION: usize = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct N3dsRecord {
    pub size: u64,
    pub media_id: u64,
    pub title_version: u16,
    pub card_revision: u16,
    pub cver_title_id: u64,
    pub cver_version: u16,
    pub game: CxiRecord,
}

pub fn extract(source: &dyn ByteSource) -> Result<N3dsRecord> {
    let window = ByteWindow::whole(source);
    let header = NcsdHeader::read(window)?;
    let game = cxi::extract_window(header.partition(window, GAME_PARTITION)?)?;
    Ok(N3dsRecord {
        size: header.size,
        media_id: header.media_id,
        title_version: header.title_version,
        card_revision: header.card_revision,
        cver_title_id: header.cver_title_id,
        cver_version: header.cver_version,
        game,
    })
}

pub fn image(source: &dyn ByteSource) -> Result<Picture> {
    let window = ByteWindow::whole(source);
    let header = NcsdHeader::read(window)?;
    cxi::image_window(header.partition(window, GAME_PARTITION)?)
}

impl N3dsRecord {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Grandària cartutx (capçalera)", size_to_text(self.size));
        out.push("Identificador (cartutx)", format!("{:016x}", self.media_id));
        out.push("Versió (cartutx)", format!("{:04x}", self.title_version));
        out.push("Revisió", self.card_revision.to_string());
        out.push("Title ID (CVer)", format!("{:016x}", self.cver_title_id));
        out.push("Versió (CVer)", format!("{:04x}", self.cver_version));
        self.game.render(out);
    }
}
