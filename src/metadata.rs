//! The tagged union of per-format records and the blob it is stored as.
//!
//! A blob looks like `{"schema":1,"record":{"<tag>":{...}}}`. The catalog
//! keeps it opaque and hands it back for [`render`], which never fails:
//! anything it cannot make sense of renders as no fields.

use crate::error::{Error, Result};
use crate::formats::cxi::CxiRecord;
use crate::formats::fat12::Fat12Record;
use crate::formats::gbc::GbcRecord;
use crate::formats::gg::GgRecord;
use crate::formats::jpeg::JpegRecord;
use crate::formats::md::MdRecord;
use crate::formats::n3ds::N3dsRecord;
use crate::formats::nds::NdsRecord;
use crate::formats::nes::NesRecord;
use crate::formats::optical::DiscRecord;
use crate::formats::pdf::PdfRecord;
use crate::formats::png::PngRecord;
use crate::formats::ps1::Ps1Record;
use crate::formats::ps2::Ps2Record;
use crate::formats::psp::PspRecord;
use crate::formats::sfz::SfzRecord;
use crate::formats::tar::TarRecord;
use crate::formats::zblorb::ZblorbRecord;
use crate::formats::zip::ZipRecord;
use crate::registry::FormatId;
use crate::render::{DisplayPair, Pairs};
use serde::{Deserialize, Serialize};

/// Version written into every blob. Blobs of any other version render empty.
pub const SCHEMA_VERSION: u32 = 1;

/// Structured extraction result, one variant per format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataRecord {
    Png(PngRecord),
    Jpeg(JpegRecord),
    Gg(GgRecord),
    Gbc(GbcRecord),
    Md(MdRecord),
    Nes(NesRecord),
    Nds(NdsRecord),
    N3ds(N3dsRecord),
    Zip(ZipRecord),
    Tar(TarRecord),
    Sfz(SfzRecord),
    Zblorb(ZblorbRecord),
    Cxi(CxiRecord),
    Ps1Aux {},
    Iso(DiscRecord),
    Ps1(Ps1Record),
    Ps2(Ps2Record),
    Psp(PspRecord),
    Fat12(Fat12Record),
    Pdf(PdfRecord),
    Bin {},
}

impl MetadataRecord {
    /// The format whose decoder produces this variant.
    pub fn format(&self) -> FormatId {
        match self {
            MetadataRecord::Png(_) => FormatId::Png,
            MetadataRecord::Jpeg(_) => FormatId::Jpeg,
            MetadataRecord::Gg(_) => FormatId::Gg,
            MetadataRecord::Gbc(_) => FormatId::Gbc,
            MetadataRecord::Md(_) => FormatId::Md,
            MetadataRecord::Nes(_) => FormatId::Nes,
            MetadataRecord::Nds(_) => FormatId::Nds,
            MetadataRecord::N3ds(_) => FormatId::N3ds,
            MetadataRecord::Zip(_) => FormatId::Zip,
            MetadataRecord::Tar(_) => FormatId::Tar,
            MetadataRecord::Sfz(_) => FormatId::Sfz,
            MetadataRecord::Zblorb(_) => FormatId::Zblorb,
            MetadataRecord::Cxi(_) => FormatId::Cxi,
            MetadataRecord::Ps1Aux {} => FormatId::Ps1Aux,
            MetadataRecord::Iso(_) => FormatId::Iso,
            MetadataRecord::Ps1(_) => FormatId::Ps1,
            MetadataRecord::Ps2(_) => FormatId::Ps2,
            MetadataRecord::Psp(_) => FormatId::Psp,
            MetadataRecord::Fat12(_) => FormatId::Fat12,
            MetadataRecord::Pdf(_) => FormatId::Pdf,
            MetadataRecord::Bin {} => FormatId::Bin,
        }
    }

    /// Appends the record's fields in their fixed display order.
    pub fn render(&self, out: &mut Pairs) {
        match self {
            MetadataRecord::Png(r) => r.render(out),
            MetadataRecord::Jpeg(r) => r.render(out),
            MetadataRecord::Gg(r) => r.render(out),
            MetadataRecord::Gbc(r) => r.render(out),
            MetadataRecord::Md(r) => r.render(out),
            MetadataRecord::Nes(r) => r.render(out),
            MetadataRecord::Nds(r) => r.render(out),
            MetadataRecord::N3ds(r) => r.render(out),
            MetadataRecord::Zip(r) => r.render(out),
            MetadataRecord::Tar(r) => r.render(out),
            MetadataRecord::Sfz(r) => r.render(out),
            MetadataRecord::Zblorb(r) => r.render(out),
            MetadataRecord::Cxi(r) => r.render(out),
            MetadataRecord::Iso(r) => r.render(out),
            MetadataRecord::Ps1(r) => r.render(out),
            MetadataRecord::Ps2(r) => r.render(out),
            MetadataRecord::Psp(r) => r.render(out),
            MetadataRecord::Fat12(r) => r.render(out),
            MetadataRecord::Pdf(r) => r.render(out),
            MetadataRecord::Ps1Aux {} | MetadataRecord::Bin {} => {}
        }
    }

    pub fn to_pairs(&self) -> Vec<DisplayPair> {
        let mut out = Pairs::new();
        self.render(&mut out);
        out.into_vec()
    }
}

#[derive(Serialize)]
struct BlobOut<'a> {
    schema: u32,
    record: &'a MetadataRecord,
}

#[derive(Deserialize)]
struct BlobIn {
    schema: u32,
    record: serde_json::Value,
}

/// Serializes a record into its stored blob form.
pub fn encode(record: &MetadataRecord) -> Result<String> {
    Ok(serde_json::to_string(&BlobOut {
        schema: SCHEMA_VERSION,
        record,
    })?)
}

/// Parses a stored blob, checking the schema version before the record.
pub fn decode(blob: &str) -> Result<MetadataRecord> {
    let raw: BlobIn = serde_json::from_str(blob)?;
    if raw.schema != SCHEMA_VERSION {
        return Err(Error::BlobDecode(format!(
            "schema version {} is not {SCHEMA_VERSION}",
            raw.schema
        )));
    }
    Ok(serde_json::from_value(raw.record)?)
}

/// Renders a blob stored under `id`, appending its fields to `out`.
pub fn render_into(id: FormatId, blob: &str, out: &mut Pairs) {
    if blob.trim().is_empty() {
        tracing::debug!(format = %id, "empty metadata blob");
        return;
    }
    let record = match decode(blob) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(format = %id, %err, "cannot decode metadata blob");
            return;
        }
    };
    if record.format() != id {
        tracing::warn!(
            format = %id,
            found = %record.format(),
            "metadata blob belongs to another format"
        );
        return;
    }
    record.render(out);
}

/// Renders a blob stored under `id` into display pairs.
pub fn render(id: FormatId, blob: &str) -> Vec<DisplayPair> {
    let mut out = Pairs::new();
    render_into(id, blob, &mut out);
    out.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{self, sfz::tests::sample_story};
    use crate::io::MemoryReader;

    fn sfz_record() -> MetadataRecord {
        let source = MemoryReader::new(sample_story(5, 1024));
        MetadataRecord::Sfz(formats::sfz::extract(&source).unwrap())
    }

    #[test]
    fn test_blob_shape() {
        let blob = encode(&MetadataRecord::Zip(ZipRecord {
            comment: String::new(),
            entries: 4,
        }))
        .unwrap();
        assert_eq!(blob, r#"{"schema":1,"record":{"zip":{"comment":"","entries":4}}}"#);
        assert_eq!(
            encode(&MetadataRecord::Bin {}).unwrap(),
            r#"{"schema":1,"record":{"bin":{}}}"#
        );
        assert_eq!(
            encode(&MetadataRecord::Ps1Aux {}).unwrap(),
            r#"{"schema":1,"record":{"ps1_aux":{}}}"#
        );
    }

    #[test]
    fn test_round_trip() {
        let record = sfz_record();
        let blob = encode(&record).unwrap();
        assert_eq!(decode(&blob).unwrap(), record);
        assert_eq!(render(FormatId::Sfz, &blob), record.to_pairs());
    }

    #[test]
    fn test_wrong_format_renders_nothing() {
        let blob = encode(&sfz_record()).unwrap();
        assert!(render(FormatId::Zblorb, &blob).is_empty());
    }

    #[test]
    fn test_bad_blobs_render_nothing() {
        assert!(render(FormatId::Sfz, "").is_empty());
        assert!(render(FormatId::Sfz, "not json").is_empty());
        assert!(render(FormatId::Sfz, r#"{"schema":1,"record":{"sfz":{}}}"#).is_empty());
        let blob = encode(&sfz_record()).unwrap().replace(r#""schema":1"#, r#""schema":2"#);
        assert!(render(FormatId::Sfz, &blob).is_empty());
        assert_eq!(decode(&blob).unwrap_err().kind(), crate::error::ErrorKind::BlobDecode);
    }

    #[test]
    fn test_render_into_appends() {
        let mut out = Pairs::new();
        out.push("md5", "x");
        render_into(FormatId::Sfz, &encode(&sfz_record()).unwrap(), &mut out);
        let pairs = out.into_vec();
        assert_eq!(pairs[0].label, "md5");
        assert_eq!(pairs[1].label, "Versió de la Màquina-Z");
    }
}
