//! PDF documents: header version and the document information dictionary.

use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteWindow};
use crate::render::Pairs;
use flate2::read::ZlibDecoder;
use memchr::memmem;
use serde::{Deserialize, Serialize};
use std::io::Read;

const HEADER: &[u8] = b"%PDF-";
/// How far into the file the header may start.
const HEADER_WINDOW: usize = 1024;
/// Largest inflated object stream.
const MAX_OBJECT_STREAM: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfRecord {
    pub version: String,
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
    pub creator: String,
    pub producer: String,
    pub creation_date: String,
    pub mod_date: String,
}

/// A parsed PDF object, reduced to what the info dictionary needs.
#[derive(Debug, Clone, PartialEq)]
enum Object {
    Str(Vec<u8>),
    Name(Vec<u8>),
    Ref(u32, u16),
    Int(u64),
    Dict(Vec<(Vec<u8>, Object)>),
    Other,
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

struct Lexer<'d> {
    data: &'d [u8],
    pos: usize,
}

impl<'d> Lexer<'d> {
    fn new(data: &'d [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip_space(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while self.peek().is_some_and(|c| c != b'\n' && c != b'\r') {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn eat(&mut self, token: &[u8]) -> bool {
        if self.data[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn regular_token(&mut self) -> &'d [u8] {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !is_whitespace(b) && !is_delimiter(b))
        {
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    fn unsigned(&mut self) -> Option<u64> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    /// `N G R` starting at the current position; restores it on failure.
    fn reference(&mut self) -> Option<(u32, u16)> {
        let start = self.pos;
        let parsed = (|| {
            let num = u32::try_from(self.unsigned()?).ok()?;
            self.skip_space();
            let generation = u16::try_from(self.unsigned()?).ok()?;
            self.skip_space();
            (self.eat(b"R") && self.peek().is_none_or(|b| !b.is_ascii_alphanumeric()))
                .then_some((num, generation))
        })();
        if parsed.is_none() {
            self.pos = start;
        }
        parsed
    }

    fn literal_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut depth = 1;
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                b'\\' => self.escape(&mut out),
                _ => out.push(b),
            }
        }
        out
    }

    fn escape(&mut self, out: &mut Vec<u8>) {
        let Some(b) = self.peek() else { return };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'\r' => {
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            b'0'..=b'7' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            other => out.push(other),
        }
    }

    fn hex_string(&mut self) -> Vec<u8> {
        let mut digits = Vec::new();
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'>' {
                break;
            }
            if let Some(d) = (b as char).to_digit(16) {
                digits.push(d as u8);
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(0);
        }
        digits.chunks(2).map(|p| (p[0] << 4) | p[1]).collect()
    }

    fn name(&mut self) -> Vec<u8> {
        let raw = self.regular_token();
        let mut out = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'#' {
                if let Some(v) = raw
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                {
                    out.push(v);
                    i += 3;
                    continue;
                }
            }
            out.push(raw[i]);
            i += 1;
        }
        out
    }

    fn object(&mut self, depth: usize) -> Option<Object> {
        self.skip_space();
        let b = self.peek()?;
        if depth > 32 {
            return None;
        }
        Some(match b {
            b'/' => {
                self.pos += 1;
                Object::Name(self.name())
            }
            b'(' => {
                self.pos += 1;
                Object::Str(self.literal_string())
            }
            b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
                self.pos += 2;
                self.dict_body(depth)?
            }
            b'<' => {
                self.pos += 1;
                Object::Str(self.hex_string())
            }
            b'[' => {
                self.pos += 1;
                loop {
                    self.skip_space();
                    match self.peek()? {
                        b']' => {
                            self.pos += 1;
                            break;
                        }
                        _ => {
                            self.object(depth + 1)?;
                        }
                    }
                }
                Object::Other
            }
            b'0'..=b'9' => match self.reference() {
                Some((num, generation)) => Object::Ref(num, generation),
                None => std::str::from_utf8(self.regular_token())
                    .ok()
                    .and_then(|token| token.parse().ok())
                    .map_or(Object::Other, Object::Int),
            },
            _ if is_delimiter(b) => {
                self.pos += 1;
                Object::Other
            }
            _ => {
                self.regular_token();
                Object::Other
            }
        })
    }

    /// Dictionary entries up to the closing `>>`; the opening one is consumed.
    fn dict_body(&mut self, depth: usize) -> Option<Object> {
        let mut entries = Vec::new();
        loop {
            self.skip_space();
            if self.eat(b">>") {
                return Some(Object::Dict(entries));
            }
            let key = match self.object(depth + 1)? {
                Object::Name(key) => key,
                _ => return None,
            };
            let value = self.object(depth + 1)?;
            entries.push((key, value));
        }
    }
}

fn dict_get<'o>(entries: &'o [(Vec<u8>, Object)], key: &[u8]) -> Option<&'o Object> {
    entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Version from a `%PDF-x.y` header near the start of the file.
fn header_version(data: &[u8]) -> Option<String> {
    let head = &data[..data.len().min(HEADER_WINDOW)];
    let at = memmem::find(head, HEADER)? + HEADER.len();
    let version: String = data[at..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();
    (version.contains('.') && !version.starts_with('.')).then_some(version)
}

/// The `/Info` reference of the last trailer or cross-reference stream
/// dictionary in the file.
fn info_reference(data: &[u8]) -> Option<(u32, u16)> {
    let mut limit = data.len();
    while let Some(at) = memmem::rfind(&data[..limit], b"/Info") {
        let mut lexer = Lexer::new(data, at + b"/Info".len());
        if lexer.peek().is_some_and(|b| is_whitespace(b) || b.is_ascii_digit()) {
            lexer.skip_space();
            if let Some(reference) = lexer.reference() {
                return Some(reference);
            }
        }
        limit = at;
    }
    None
}

/// Looks an object up as a top-level definition, then inside the
/// compressed object streams of the file.
fn resolve(data: &[u8], num: u32, generation: u16) -> Option<Object> {
    resolve_direct(data, num, generation).or_else(|| {
        // Objects inside object streams always have generation 0.
        (generation == 0)
            .then(|| resolve_in_object_streams(data, num))
            .flatten()
    })
}

/// Parses the last `N G obj` definition of an object.
fn resolve_direct(data: &[u8], num: u32, generation: u16) -> Option<Object> {
    let marker = format!("{num} {generation} obj");
    let finder = memmem::FinderRev::new(marker.as_bytes());
    let mut limit = data.len();
    while let Some(at) = finder.rfind(&data[..limit]) {
        let boundary = at == 0 || !data[at - 1].is_ascii_digit();
        if boundary {
            let mut lexer = Lexer::new(data, at + marker.len());
            return lexer.object(0);
        }
        limit = at;
    }
    None
}

/// Start of the `N G obj` header that precedes `at`, skipping `endobj`.
fn object_header_before(data: &[u8], at: usize) -> Option<usize> {
    let mut limit = at;
    loop {
        let found = memmem::rfind(&data[..limit], b"obj")?;
        if !data[..found].ends_with(b"end") {
            return Some(found + b"obj".len());
        }
        limit = found;
    }
}

/// Payload of the stream whose dictionary ends at the lexer position,
/// inflated when the filter is `FlateDecode`.
fn stream_payload(lexer: &mut Lexer<'_>, dict: &[(Vec<u8>, Object)]) -> Option<Vec<u8>> {
    lexer.skip_space();
    if !lexer.eat(b"stream") {
        return None;
    }
    lexer.eat(b"\r");
    lexer.eat(b"\n");
    let data = lexer.data;
    let start = lexer.pos;
    let end = match dict_get(dict, b"Length") {
        Some(Object::Int(len)) => start.saturating_add(usize::try_from(*len).ok()?).min(data.len()),
        _ => start + memmem::find(&data[start..], b"endstream")?,
    };
    let raw = &data[start..end];

    match dict_get(dict, b"Filter") {
        None => Some(raw.to_vec()),
        Some(Object::Name(filter)) if filter == b"FlateDecode" => {
            let mut out = Vec::new();
            let inflated = ZlibDecoder::new(raw)
                .take(MAX_OBJECT_STREAM)
                .read_to_end(&mut out);
            if let Err(err) = inflated {
                tracing::warn!(%err, "cannot inflate PDF object stream");
                return None;
            }
            Some(out)
        }
        Some(_) => {
            tracing::debug!("PDF object stream with an unsupported filter");
            None
        }
    }
}

/// Finds object `num` in any `/Type /ObjStm` stream of the file.
fn resolve_in_object_streams(data: &[u8], num: u32) -> Option<Object> {
    let mut from = 0;
    while let Some(found) = memmem::find(&data[from..], b"/ObjStm") {
        let at = from + found;
        from = at + b"/ObjStm".len();
        if let Some(object) = object_header_before(data, at)
            .and_then(|header| find_in_object_stream(data, header, num))
        {
            return Some(object);
        }
    }
    None
}

/// Searches the object stream whose dictionary starts at `header`.
fn find_in_object_stream(data: &[u8], header: usize, num: u32) -> Option<Object> {
    let mut lexer = Lexer::new(data, header);
    let Object::Dict(dict) = lexer.object(0)? else {
        return None;
    };
    if !matches!(dict_get(&dict, b"Type"), Some(Object::Name(kind)) if kind == b"ObjStm") {
        return None;
    }
    let (Some(Object::Int(count)), Some(Object::Int(first))) =
        (dict_get(&dict, b"N"), dict_get(&dict, b"First"))
    else {
        return None;
    };
    let body = stream_payload(&mut lexer, &dict)?;
    let first = usize::try_from(*first).ok()?;

    // The stream opens with `count` pairs of object number and offset.
    let mut index = Lexer::new(&body, 0);
    for _ in 0..*count {
        index.skip_space();
        let object_num = index.unsigned()?;
        index.skip_space();
        let offset = usize::try_from(index.unsigned()?).ok()?;
        if object_num == u64::from(num) {
            let at = first.checked_add(offset)?;
            if at >= body.len() {
                return None;
            }
            return Lexer::new(&body, at).object(0);
        }
    }
    None
}

/// Text string: UTF-16BE with a byte-order mark, otherwise one byte per
/// character.
pub fn decode_text(raw: &[u8]) -> String {
    let text = match raw {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|p| u16::from_be_bytes([p[0], p[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => raw.iter().map(|&b| b as char).collect(),
    };
    text.trim_end_matches('\0').to_string()
}

/// `D:YYYYMMDDHHmmSS...` as `YYYY-MM-DD HH:MM:SS`. Missing trailing fields
/// take their lowest value; text that is not a date is kept as is.
pub fn format_date(text: &str) -> String {
    let raw = text.trim();
    let digits: String = raw
        .strip_prefix("D:")
        .unwrap_or(raw)
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.len() < 4 {
        return raw.to_string();
    }
    let field = |range: std::ops::Range<usize>, default: &'static str| {
        digits.get(range).unwrap_or(default).to_string()
    };
    format!(
        "{}-{}-{} {}:{}:{}",
        field(0..4, "0000"),
        field(4..6, "01"),
        field(6..8, "01"),
        field(8..10, "00"),
        field(10..12, "00"),
        field(12..14, "00"),
    )
}

pub fn extract(source: &dyn ByteSource) -> Result<PdfRecord> {
    let data = ByteWindow::whole(source).read_all()?;
    let version = header_version(&data).ok_or_else(|| Error::mismatch("missing %PDF- header"))?;
    let mut record = PdfRecord {
        version,
        ..PdfRecord::default()
    };

    let info = info_reference(&data).and_then(|(num, generation)| resolve(&data, num, generation));
    let Some(Object::Dict(entries)) = info else {
        tracing::debug!("PDF without a readable info dictionary");
        return Ok(record);
    };

    let text = |key: &[u8]| -> String {
        let value = match dict_get(&entries, key) {
            Some(Object::Ref(num, generation)) => resolve(&data, *num, *generation),
            other => other.cloned(),
        };
        match value {
            Some(Object::Str(raw)) => decode_text(&raw),
            _ => String::new(),
        }
    };
    let date = |key: &[u8]| {
        let raw = text(key);
        if raw.is_empty() { raw } else { format_date(&raw) }
    };

    record.title = text(b"Title");
    record.author = text(b"Author");
    record.subject = text(b"Subject");
    record.keywords = text(b"Keywords");
    record.creator = text(b"Creator");
    record.producer = text(b"Producer");
    record.creation_date = date(b"CreationDate");
    record.mod_date = date(b"ModDate");
    Ok(record)
}

impl PdfRecord {
    pub fn render(&self, out: &mut Pairs) {
        out.push("Versió PDF", self.version.as_str());
        out.push_nonempty("Títol", &self.title);
        out.push_nonempty("Autor", &self.author);
        out.push_nonempty("Tema", &self.subject);
        out.push_nonempty("Paraules claus", &self.keywords);
        out.push_nonempty("Creat amb", &self.creator);
        out.push_nonempty("Convertit amb", &self.producer);
        out.push_nonempty("Data creació", &self.creation_date);
        out.push_nonempty("Data modificació", &self.mod_date);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::MemoryReader;

    pub(crate) fn sample_pdf() -> Vec<u8> {
        let mut out = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
        out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        out.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
        out.extend_from_slice(
            b"3 0 obj\n<< /Title (Manual \\(2a ed.\\)) /Author <FEFF00C0006E006E0061>\n\
              /Subject 4 0 R /Producer (Ghostscript 9.5\\n)\n\
              /CreationDate (D:20210314150926+01'00') /ModDate (D:2021)\n\
              /Custom [ (x) << /Nested true >> ] >>\nendobj\n",
        );
        out.extend_from_slice(b"4 0 obj\n(Caf\\351)\nendobj\n");
        out.extend_from_slice(b"xref\n0 5\n0000000000 65535 f \n");
        out.extend_from_slice(b"trailer\n<< /Size 5 /Root 1 0 R /Info 3 0 R >>\nstartxref\n0\n%%EOF\n");
        out
    }

    #[test]
    fn test_extract() {
        let record = extract(&MemoryReader::new(sample_pdf())).unwrap();
        assert_eq!(record.version, "1.4");
        assert_eq!(record.title, "Manual (2a ed.)");
        assert_eq!(record.author, "Ànna");
        assert_eq!(record.subject, "Café");
        assert_eq!(record.producer, "Ghostscript 9.5\n");
        assert_eq!(record.creation_date, "2021-03-14 15:09:26");
        assert_eq!(record.mod_date, "2021-01-01 00:00:00");
        assert!(record.keywords.is_empty());

        let mut out = Pairs::new();
        record.render(&mut out);
        let labels: Vec<String> = out.into_vec().into_iter().map(|p| p.label).collect();
        assert_eq!(
            labels,
            [
                "Versió PDF",
                "Títol",
                "Autor",
                "Tema",
                "Convertit amb",
                "Data creació",
                "Data modificació"
            ]
        );
    }

    #[test]
    fn test_xref_stream_dictionary() {
        let mut data = b"%PDF-1.5\n".to_vec();
        data.extend_from_slice(b"7 0 obj\n<</Title(Report)>>\nendobj\n");
        data.extend_from_slice(b"9 0 obj\n<</Type/XRef/Size 10/Info 7 0 R/Root 1 0 R/Length 0>>stream\n\nendstream\nendobj\n");
        data.extend_from_slice(b"startxref\n0\n%%EOF\n");
        let record = extract(&MemoryReader::new(data)).unwrap();
        assert_eq!(record.version, "1.5");
        assert_eq!(record.title, "Report");
    }

    /// A 1.5 file whose info dictionary lives in object 3 of an object
    /// stream, referenced from a cross-reference stream.
    fn object_stream_pdf(flate: bool) -> Vec<u8> {
        let objects = b"<< /Title (Hidden) /Author 4 0 R >> (Nobody)";
        let offsets = format!("3 0 4 {} ", objects.len() - b"(Nobody)".len());
        let mut plain = offsets.as_bytes().to_vec();
        plain.extend_from_slice(objects);

        let (payload, filter) = if flate {
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            std::io::Write::write_all(&mut encoder, &plain).unwrap();
            (encoder.finish().unwrap(), "/Filter /FlateDecode ")
        } else {
            (plain, "")
        };

        let mut data = b"%PDF-1.5\n1 0 obj\n<< /Type /Catalog >>\nendobj\n".to_vec();
        data.extend_from_slice(
            format!(
                "2 0 obj\n<< /Type /ObjStm /N 2 /First {} {filter}/Length {} >>\nstream\n",
                offsets.len(),
                payload.len()
            )
            .as_bytes(),
        );
        data.extend_from_slice(&payload);
        data.extend_from_slice(b"\nendstream\nendobj\n");
        data.extend_from_slice(
            b"5 0 obj\n<< /Type /XRef /Size 6 /Root 1 0 R /Info 3 0 R /Length 0 >>\nstream\n\nendstream\nendobj\n",
        );
        data.extend_from_slice(b"startxref\n0\n%%EOF\n");
        data
    }

    #[test]
    fn test_info_in_object_stream() {
        let record = extract(&MemoryReader::new(object_stream_pdf(false))).unwrap();
        assert_eq!(record.title, "Hidden");
        assert_eq!(record.author, "Nobody");
    }

    #[test]
    fn test_info_in_compressed_object_stream() {
        let record = extract(&MemoryReader::new(object_stream_pdf(true))).unwrap();
        assert_eq!(record.version, "1.5");
        assert_eq!(record.title, "Hidden");
        assert_eq!(record.author, "Nobody");
    }

    #[test]
    fn test_corrupt_object_stream_leaves_fields_empty() {
        let mut data = object_stream_pdf(true);
        let at = memmem::find(&data, b"stream\n").unwrap() + b"stream\n".len();
        data[at..at + 4].copy_from_slice(b"XXXX");
        let record = extract(&MemoryReader::new(data)).unwrap();
        assert!(record.title.is_empty());
    }

    #[test]
    fn test_without_info() {
        let data = b"%PDF-2.0\n1 0 obj\n<< >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n".to_vec();
        let record = extract(&MemoryReader::new(data)).unwrap();
        assert_eq!(record.version, "2.0");
        assert!(record.title.is_empty());
        let mut out = Pairs::new();
        record.render(&mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_not_pdf() {
        let err = extract(&MemoryReader::new(b"hello world".to_vec())).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FormatMismatch);
    }

    #[test]
    fn test_object_number_boundary() {
        let data = b"%PDF-1.3\n13 0 obj\n<< /Title (Wrong) >>\nendobj\n3 0 obj\n<< /Title (Right) >>\nendobj\ntrailer << /Info 3 0 R >>".to_vec();
        assert_eq!(extract(&MemoryReader::new(data)).unwrap().title, "Right");
    }

    #[test]
    fn test_dates() {
        assert_eq!(format_date("D:19991231235959Z"), "1999-12-31 23:59:59");
        assert_eq!(format_date("D:202402"), "2024-02-01 00:00:00");
        assert_eq!(format_date("yesterday"), "yesterday");
    }
}
