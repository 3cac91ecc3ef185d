//! CTR executable images (a bare executable NCCH partition) and the SMDH
//! icon file stored in their ExeFS.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow, u32_le, utf16le_until_nul};
use crate::media::ctr::{ExeFs, NcchHeader};
use crate::picture::{Picture, SMDH_ICON_SIZE, SmdhIcon};
use crate::render::{Pairs, join_list, size_to_text};
use serde::{Deserialize, Serialize};

const SMDH_MAGIC: &[u8; 4] = b"SMDH";
const SMDH_SIZE: usize = 0x36C0;
const SMDH_TITLES: usize = 0x008;
const SMDH_TITLE_SIZE: usize = 0x200;
const SMDH_LARGE_ICON: usize = 0x24C0;

const TITLE_LANGUAGES: [&str; 12] = [
    "Japonès",
    "Anglès",
    "Francès",
    "Alemany",
    "Italià",
    "Espanyol",
    "Xinès simplificat",
    "Coreà",
    "Neerlandès",
    "Portuguès",
    "Rus",
    "Xinès tradicional",
];

/// Rating boards and the SMDH offset of their byte.
const RATING_BOARDS: [(&str, usize); 9] = [
    ("CERO", 0x2008),
    ("ESRB", 0x2009),
    ("USK", 0x200B),
    ("PEGI", 0x200C),
    ("PEGI (Portugal)", 0x200E),
    ("PEGI (Regne Unit)", 0x200F),
    ("COB", 0x2010),
    ("GRB", 0x2011),
    ("CGSRR", 0x2012),
];

const ALL_REGIONS: u32 = 0x7FFF_FFFF;
const REGIONS: [(u32, &str); 7] = [
    (0x01, "Japó"),
    (0x02, "Estats Units"),
    (0x04, "Europa"),
    (0x08, "Austràlia"),
    (0x10, "Xina"),
    (0x20, "Corea"),
    (0x40, "Taiwan"),
];

const FLAGS: [(u32, &str); 3] = [
    (0x0008, "Requereix EULA"),
    (0x0040, "Requereix qualificació d'edat"),
    (0x1000, "Exclusiu New 3DS"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub short: String,
    pub long: String,
    pub publisher: String,
}

impl Title {
    fn parse(raw: &[u8]) -> Self {
        Self {
            short: utf16le_until_nul(&raw[..0x80]),
            long: utf16le_until_nul(&raw[0x80..0x180]),
            publisher: utf16le_until_nul(&raw[0x180..0x200]),
        }
    }

    fn is_empty(&self) -> bool {
        self.short.is_empty() && self.long.is_empty() && self.publisher.is_empty()
    }

    fn display(&self) -> String {
        format!(
            "{} / {} ({})",
            self.short.replace('\n', " ~ "),
            self.long.replace('\n', " ~ "),
            self.publisher.replace('\n', " ~ ")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeRating {
    Unused,
    Pending,
    NoRestrictions,
    MinAge(u8),
}

impl AgeRating {
    pub fn from_byte(value: u8) -> Self {
        if value & 0x80 == 0 {
            AgeRating::Unused
        } else if value & 0x40 != 0 {
            AgeRating::Pending
        } else if value & 0x20 != 0 {
            AgeRating::NoRestrictions
        } else {
            AgeRating::MinAge(value & 0x1F)
        }
    }

    fn display(self) -> Option<String> {
        match self {
            AgeRating::Unused => None,
            AgeRating::Pending => Some("Pendent".to_owned()),
            AgeRating::NoRestrictions | AgeRating::MinAge(0) => {
                Some("Sense restriccions d'edat".to_owned())
            }
            AgeRating::MinAge(age) => Some(format!("+{age}")),
        }
    }
}

/// Application data from the SMDH `icon` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Smdh {
    /// One entry per language, in `TITLE_LANGUAGES` order.
    pub titles: Vec<Title>,
    /// One entry per board, in `RATING_BOARDS` order.
    pub ratings: Vec<AgeRating>,
    pub region_lockout: u32,
    pub flags: u32,
    pub eula_major: u8,
    pub eula_minor: u8,
}

impl Smdh {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < SMDH_SIZE || &data[..4] != SMDH_MAGIC {
            return Err(Error::mismatch("'icon' is not an SMDH file"));
        }
        let titles = (0..TITLE_LANGUAGES.len())
            .map(|i| {
                let start = SMDH_TITLES + i * SMDH_TITLE_SIZE;
                Title::parse(&data[start..start + SMDH_TITLE_SIZE])
            })
            .collect();
        let ratings = RATING_BOARDS
            .iter()
            .map(|&(_, offset)| AgeRating::from_byte(data[offset]))
            .collect();

        Ok(Self {
            titles,
            ratings,
            region_lockout: u32_le(data, 0x2018),
            flags: u32_le(data, 0x2028),
            eula_minor: data[0x202C],
            eula_major: data[0x202D],
        })
    }

    fn regions(&self) -> String {
        if self.region_lockout == ALL_REGIONS {
            return "Totes les regions".to_owned();
        }
        join_list(
            REGIONS
                .iter()
                .filter(|(bit, _)| self.region_lockout & bit != 0)
                .map(|&(_, name)| name),
        )
    }

    fn flags_text(&self) -> String {
        let names: Vec<_> = FLAGS
            .iter()
            .filter(|(bit, _)| self.flags & bit != 0)
            .map(|&(_, name)| name)
            .collect();
        if names.is_empty() {
            format!("{:08x}", self.flags)
        } else {
            format!("{:02x} ({})", self.flags, names.join(", "))
        }
    }

    pub fn render(&self, out: &mut Pairs) {
        for (title, language) in self.titles.iter().zip(TITLE_LANGUAGES) {
            if !title.is_empty() {
                out.push(&format!("Títol ({language})"), title.display());
            }
        }
        for (rating, (board, _)) in self.ratings.iter().zip(RATING_BOARDS) {
            if let Some(text) = rating.display() {
                out.push(board, text);
            }
        }
        out.push("Regions", self.regions());
        out.push("Flags", self.flags_text());
        out.push("EULA", format!("{}.{}", self.eula_major, self.eula_minor));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CxiRecord {
    pub header: NcchHeader,
    /// Absent when the ExeFS has no `icon` entry.
    pub smdh: Option<Smdh>,
}

/// Reads the raw SMDH file, or `None` when there is no `icon` entry.
fn read_smdh(exefs: &ExeFs<'_>) -> Result<Option<Vec<u8>>> {
    let Some(icon) = exefs.open("icon")? else {
        return Ok(None);
    };
    if icon.len() < SMDH_SIZE as u64 {
        return Err(Error::mismatch(format!(
            "'icon' holds {} bytes, SMDH needs {SMDH_SIZE}",
            icon.len()
        )));
    }
    let data = icon.read_vec(icon.base(), SMDH_SIZE)?;
    if &data[..4] != SMDH_MAGIC {
        return Err(Error::mismatch("'icon' is not an SMDH file"));
    }
    Ok(Some(data))
}

/// Opens the ExeFS of an executable partition.
fn open_executable(window: ByteWindow<'_>) -> Result<(NcchHeader, ExeFs<'_>)> {
    let header = NcchHeader::read(window)?;
    if !header.is_executable() {
        return Err(Error::mismatch("NCCH partition is not executable (CXI)"));
    }
    let exefs = header
        .exefs(window)?
        .ok_or_else(|| Error::mismatch("NCCH partition has no ExeFS"))?;
    Ok((header, exefs))
}

/// Decodes the executable partition occupying `window`.
pub fn extract_window(window: ByteWindow<'_>) -> Result<CxiRecord> {
    let (header, exefs) = open_executable(window)?;
    let smdh = read_smdh(&exefs)?
        .map(|data| Smdh::parse(&data))
        .transpose()?;
    if smdh.is_none() {
        tracing::debug!(product = %header.product_code, "ExeFS without an icon file");
    }
    Ok(CxiRecord { header, smdh })
}

/// Decodes the large SMDH icon of the partition occupying `window`.
pub fn image_window(window: ByteWindow<'_>) -> Result<Picture> {
    let (_, exefs) = open_executable(window)?;
    let data = read_smdh(&exefs)?.ok_or_else(|| Error::mismatch("ExeFS has no icon"))?;
    let icon = SmdhIcon::new(&data[SMDH_LARGE_ICON..SMDH_LARGE_ICON + SMDH_ICON_SIZE])?;
    Ok(Picture::Smdh(icon))
}

pub fn extract(source: &dyn ByteSource) -> Result<CxiRecord> {
    extract_window(ByteWindow::whole(source))
}

pub fn image(source: &dyn ByteSource) -> Result<Picture> {
    image_window(ByteWindow::whole(source))
}

impl CxiRecord {
    pub fn render(&self, out: &mut Pairs) {
        let h = &self.header;
        out.push("Grandària capçalera", size_to_text(h.size));
        out.push("Identificador", format!("{:016x}", h.id));
        out.push("Codi fabricant", h.maker_code.as_str());
        out.push("Versió", format!("{:04x}", h.version));
        out.push("Codi producte", h.product_code.as_str());
        if let Some(smdh) = &self.smdh {
            smdh.render(out);
        }
    }
}
