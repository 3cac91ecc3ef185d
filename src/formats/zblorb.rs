//! Blorb-packaged Z-machine stories.
//!
//! The container is an IFF `FORM` of type `IFRS`. Its first chunk is the
//! resource index; the story itself lives in a `ZCOD` chunk, bibliographic
//! data in an `IFmd` chunk of iFiction XML, and an optional `Fspc` chunk names
//! the cover picture.

use crate::error::{Error, Result};
use crate::formats::sfz::{self, SfzRecord};
use crate::iff::{self, Directory};
use crate::io::{ByteSource, ByteWindow, u32_be};
use crate::picture::{Picture, decode_bitmap};
use crate::render::Pairs;
use image::ImageFormat;
use memchr::memmem;
use serde::{Deserialize, Serialize};

const INDEX_ENTRY_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Pict,
    Snd,
    Data,
    Exec,
    Unknown,
}

impl Usage {
    fn from_tag(tag: &[u8]) -> Self {
        match tag {
            b"Pict" => Usage::Pict,
            b"Snd " => Usage::Snd,
            b"Data" => Usage::Data,
            b"Exec" => Usage::Exec,
            _ => Usage::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub usage: Usage,
    /// Absolute offset of the resource chunk.
    pub offset: u64,
}

/// iFiction fields that are shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryInfo {
    pub ifid: String,
    pub tuid: String,
    pub title: String,
    pub author: String,
    pub language: String,
    pub headline: String,
    pub first_published: String,
    pub genre: String,
    pub group: String,
    pub forgiveness: String,
    pub description: String,
    pub generator: String,
    pub generator_version: String,
    pub originated: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZblorbRecord {
    pub story: SfzRecord,
    #[serde(default)]
    pub info: StoryInfo,
}

/// Parses an `RIdx` payload into a table indexed by resource number.
pub fn parse_index(data: &[u8]) -> Result<Vec<Resource>> {
    if data.len() < 4 {
        return Err(Error::malformed("RIdx chunk is truncated"));
    }
    let count = u32_be(data, 0) as usize;
    if count == 0 {
        return Err(Error::malformed("Blorb file holds no resources"));
    }
    let entries = &data[4..];
    if entries.len() / INDEX_ENTRY_SIZE < count {
        return Err(Error::malformed(format!(
            "RIdx chunk declares {count} resources but holds {}",
            entries.len() / INDEX_ENTRY_SIZE
        )));
    }

    let mut table = vec![
        Resource {
            usage: Usage::Unknown,
            offset: 0,
        };
        count
    ];
    for entry in entries.chunks_exact(INDEX_ENTRY_SIZE).take(count) {
        let number = u32_be(entry, 4) as usize;
        let slot = table.get_mut(number).ok_or_else(|| {
            Error::malformed(format!("RIdx resource {number} out of range"))
        })?;
        *slot = Resource {
            usage: Usage::from_tag(&entry[0..4]),
            offset: u64::from(u32_be(entry, 8)),
        };
    }
    Ok(table)
}

/// Opens the container and checks that the resource index comes first.
fn open(window: ByteWindow<'_>) -> Result<(Directory<'_>, Vec<Resource>)> {
    let root = Directory::open_root(window)?;
    if &root.kind() != b"FORM" || &root.sub_kind() != b"IFRS" {
        return Err(Error::malformed(format!(
            "not a Blorb file: '{}' of type '{}'",
            iff::tag_str(&root.kind()),
            iff::tag_str(&root.sub_kind())
        )));
    }
    let first = root.begin()?;
    if first.is_end() || &first.kind() != b"RIdx" {
        return Err(Error::malformed("not a Blorb file: RIdx chunk missing"));
    }
    let index = parse_index(&first.payload()?.read_all()?)?;
    Ok((root, index))
}

pub fn extract(source: &dyn ByteSource) -> Result<ZblorbRecord> {
    let (root, _) = open(ByteWindow::whole(source))?;

    let mut story = None;
    let mut info = StoryInfo::default();
    let mut it = root.begin()?;
    while !it.is_end() {
        match &it.kind() {
            b"ZCOD" => story = Some(sfz::extract_window(it.payload()?)?),
            b"IFmd" => {
                let xml = it.payload()?.read_all()?;
                info = parse_ifiction(&String::from_utf8_lossy(&xml))?;
            }
            _ => {}
        }
        it.advance()?;
    }

    let story = story.ok_or_else(|| Error::malformed("Blorb file has no Z-machine story"))?;
    Ok(ZblorbRecord { story, info })
}

/// Decodes the frontispiece picture.
pub fn image(source: &dyn ByteSource) -> Result<Picture> {
    let window = ByteWindow::whole(source);
    let (root, index) = open(window)?;

    let mut it = root.begin()?;
    while !it.is_end() && &it.kind() != b"Fspc" {
        it.advance()?;
    }
    if it.is_end() {
        return Err(Error::mismatch("Blorb file has no frontispiece"));
    }
    let raw: [u8; 4] = it.payload()?.read_array(0)?;
    let number = u32::from_be_bytes(raw) as usize;
    let resource = index
        .get(number)
        .filter(|r| r.usage == Usage::Pict)
        .ok_or_else(|| Error::malformed(format!("frontispiece resource {number} is not a picture")))?;

    let (kind, payload) = iff::chunk_at(window, resource.offset)?;
    let format = match &kind {
        b"PNG " => ImageFormat::Png,
        b"JPEG" => ImageFormat::Jpeg,
        other => {
            return Err(Error::malformed(format!(
                "unknown picture chunk '{}'",
                iff::tag_str(other)
            )));
        }
    };
    decode_bitmap(payload.reader(), format)
}

/// Body of the first `<name>` element inside `xml`, if any.
fn element<'x>(xml: &'x str, name: &str) -> Option<&'x str> {
    let open = format!("<{name}");
    let close = format!("</{name}>");
    let finder = memmem::Finder::new(open.as_bytes());
    let bytes = xml.as_bytes();

    let mut from = 0;
    while let Some(pos) = finder.find(&bytes[from..]) {
        let after = from + pos + open.len();
        match bytes.get(after) {
            Some(b'>') => {
                let body = after + 1;
                let end = memmem::find(&bytes[body..], close.as_bytes())?;
                return Some(&xml[body..body + end]);
            }
            Some(b'/') => return Some(""),
            Some(c) if c.is_ascii_whitespace() => {
                let gt = memchr::memchr(b'>', &bytes[after..])? + after;
                if bytes[gt - 1] == b'/' {
                    return Some("");
                }
                let end = memmem::find(&bytes[gt + 1..], close.as_bytes())?;
                return Some(&xml[gt + 1..gt + 1 + end]);
            }
            _ => from = after,
        }
    }
    None
}

/// Character data of an element body: markup is dropped, `<br/>` becomes
/// a newline and entities are decoded.
fn text(body: &str) -> String {
    let mut plain = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(lt) = rest.find('<') {
        plain.push_str(&rest[..lt]);
        let Some(gt) = rest[lt..].find('>') else {
            rest = "";
            break;
        };
        let tag = &rest[lt + 1..lt + gt];
        if tag.trim_end_matches('/').trim() == "br" {
            plain.push('\n');
        }
        rest = &rest[lt + gt + 1..];
    }
    plain.push_str(rest);
    decode_entities(plain.trim())
}

fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let name = &tail[1..semi];
            let ch = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let code = if let Some(hex) = name.strip_prefix("#x") {
                        u32::from_str_radix(hex, 16).ok()
                    } else if let Some(dec) = name.strip_prefix('#') {
                        dec.parse().ok()
                    } else {
                        None
                    };
                    code.and_then(char::from_u32)
                }
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, used)) => {
                out.push(c);
                rest = &tail[used..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Extracts the displayed fields of an iFiction record. A record without
/// `<story>` yields no fields; an unterminated one is malformed.
pub fn parse_ifiction(xml: &str) -> Result<StoryInfo> {
    let Some(story) = element(xml, "story") else {
        if xml.contains("<story") {
            return Err(Error::malformed("iFiction <story> element is not terminated"));
        }
        tracing::warn!("iFiction metadata without a <story> element");
        return Ok(StoryInfo::default());
    };
    let section = |name: &str| element(story, name).unwrap_or("");
    let field = |section: &str, name: &str| element(section, name).map(text).unwrap_or_default();

    let ident = section("identification");
    let biblio = section("bibliographic");
    let colophon = section("colophon");
    Ok(StoryInfo {
        ifid: field(ident, "ifid"),
        tuid: field(ident, "tuid"),
        title: field(biblio, "title"),
        author: field(biblio, "author"),
        language: field(biblio, "language"),
        headline: field(biblio, "headline"),
        first_published: field(biblio, "firstpublished"),
        genre: field(biblio, "genre"),
        group: field(biblio, "group"),
        forgiveness: field(biblio, "forgiveness"),
        description: field(biblio, "description"),
        generator: field(colophon, "generator"),
        generator_version: field(colophon, "generatorversion"),
        originated: field(colophon, "originated"),
    })
}

impl StoryInfo {
    pub fn render(&self, out: &mut Pairs) {
        out.push_nonempty("IFID", &self.ifid);
        out.push_nonempty("Interactive Fiction Database identifier", &self.tuid);
        if !self.title.is_empty() {
            let title = if self.headline.is_empty() {
                self.title.clone()
            } else {
                format!("{}: {}", self.title, self.headline)
            };
            out.push("Títol", title);
        }
        out.push_nonempty("Autor", &self.author);
        out.push_nonempty("Idioma", &self.language);
        out.push_nonempty("Data publicació", &self.first_published);
        out.push_nonempty("Gènere", &self.genre);
        out.push_nonempty("Col·lecció", &self.group);
        out.push_nonempty("Dificultat", &self.forgiveness);
        out.push_nonempty("Descripció", &self.description);
        if !self.generator.is_empty() {
            let compiler = if self.generator_version.is_empty() {
                self.generator.clone()
            } else {
                format!("{} - {}", self.generator, self.generator_version)
            };
            out.push("Compilador", compiler);
        }
        out.push_nonempty("Data compilació", &self.originated);
    }
}

impl ZblorbRecord {
    pub fn render(&self, out: &mut Pairs) {
        self.story.render(out);
        self.info.render(out);
    }
}
