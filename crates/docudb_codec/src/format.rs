//! Document encodings.
//!
//! | Format   | Extension | Layout                                              |
//! |----------|-----------|-----------------------------------------------------|
//! | `json`   | `.json`   | JSON text                                           |
//! | `binary` | `.bin`    | checksum frame over the JSON text                   |
//! | `hybrid` | `.hybrid` | hybrid frame: metadata JSON + checksummed side data |
//!
//! With compression enabled the encoded bytes are wrapped in a gzip
//! stream and the file name gains a `.gz` suffix.

use crate::error::{CodecError, CodecResult};
use crate::frame::{seal, ChecksumFrame, HybridFrame};
use crate::value::{Document, ValueType};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Fields whose serialized JSON is larger than this are split out by the
/// hybrid encoding.
pub const HYBRID_SPLIT_THRESHOLD: usize = 1000;

/// Suffix appended to compressed document files.
pub const GZIP_SUFFIX: &str = ".gz";

/// On-disk document encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Plain JSON text.
    #[default]
    Json,
    /// JSON text behind a SHA-256 checksum.
    Binary,
    /// Small fields as JSON metadata, large fields in a checksummed side payload.
    Hybrid,
}

impl StorageFormat {
    /// All supported formats.
    pub const ALL: [StorageFormat; 3] = [Self::Json, Self::Binary, Self::Hybrid];

    /// Returns the format name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "binary",
            Self::Hybrid => "hybrid",
        }
    }

    /// Returns the file extension, without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "bin",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown format name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported storage format: {}", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for StorageFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "binary" => Ok(Self::Binary),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Serializes documents for one format/compression pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentCodec {
    format: StorageFormat,
    compression: bool,
}

impl DocumentCodec {
    /// Creates a codec.
    #[must_use]
    pub const fn new(format: StorageFormat, compression: bool) -> Self {
        Self {
            format,
            compression,
        }
    }

    /// Returns the format.
    #[must_use]
    pub const fn format(&self) -> StorageFormat {
        self.format
    }

    /// Returns whether gzip is applied.
    #[must_use]
    pub const fn compression(&self) -> bool {
        self.compression
    }

    /// File name for the document with `id`.
    #[must_use]
    pub fn file_name(&self, id: &str) -> String {
        let mut name = format!("{id}.{}", self.format.extension());
        if self.compression {
            name.push_str(GZIP_SUFFIX);
        }
        name
    }

    /// Extracts the document id from a file name written by this codec.
    #[must_use]
    pub fn parse_file_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let rest = if self.compression {
            file_name.strip_suffix(GZIP_SUFFIX)?
        } else {
            file_name
        };
        let id = rest
            .strip_suffix(self.format.extension())?
            .strip_suffix('.')?;
        (!id.is_empty()).then_some(id)
    }

    /// Encodes a document.
    pub fn encode(&self, doc: &Document) -> CodecResult<Vec<u8>> {
        let bytes = match self.format {
            StorageFormat::Json => serde_json::to_vec(doc)?,
            StorageFormat::Binary => encode_binary(doc)?,
            StorageFormat::Hybrid => encode_hybrid(doc)?,
        };
        if self.compression {
            gzip(&bytes)
        } else {
            Ok(bytes)
        }
    }

    /// Decodes a document.
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<Document> {
        if self.compression {
            let raw = gunzip(bytes)?;
            self.decode_raw(&raw)
        } else {
            self.decode_raw(bytes)
        }
    }

    fn decode_raw(&self, bytes: &[u8]) -> CodecResult<Document> {
        match self.format {
            StorageFormat::Json => parse_document(bytes),
            StorageFormat::Binary => decode_binary(bytes),
            StorageFormat::Hybrid => decode_hybrid(bytes),
        }
    }
}

fn parse_document(bytes: &[u8]) -> CodecResult<Document> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        other => Err(CodecError::invalid_document(format!(
            "expected an object, found {}",
            ValueType::of(&other)
        ))),
    }
}

fn encode_binary(doc: &Document) -> CodecResult<Vec<u8>> {
    let payload = serde_json::to_vec(doc)?;
    Ok(seal(&payload))
}

fn decode_binary(bytes: &[u8]) -> CodecResult<Document> {
    parse_document(ChecksumFrame::open(bytes)?)
}

fn placeholder(value: &Value) -> Value {
    let mut map = Map::new();
    map.insert("binary".to_string(), Value::Bool(true));
    map.insert(
        "type".to_string(),
        Value::String(ValueType::of(value).name().to_string()),
    );
    Value::Object(map)
}

fn encode_hybrid(doc: &Document) -> CodecResult<Vec<u8>> {
    let mut metadata = Map::with_capacity(doc.len());
    let mut side = Map::new();
    for (key, value) in doc {
        if serde_json::to_vec(value)?.len() > HYBRID_SPLIT_THRESHOLD {
            metadata.insert(key.clone(), placeholder(value));
            side.insert(key.clone(), value.clone());
        } else {
            metadata.insert(key.clone(), value.clone());
        }
    }

    let metadata = serde_json::to_vec(&metadata)?;
    let side = if side.is_empty() {
        Vec::new()
    } else {
        encode_binary(&side)?
    };
    HybridFrame {
        metadata: &metadata,
        side: &side,
    }
    .to_bytes()
}

fn decode_hybrid(bytes: &[u8]) -> CodecResult<Document> {
    let frame = HybridFrame::parse(bytes)?;
    let mut doc = parse_document(frame.metadata)?;
    if frame.side.is_empty() {
        return Ok(doc);
    }
    let mut side = decode_binary(frame.side)?;
    for (key, value) in doc.iter_mut() {
        if let Some(full) = side.remove(key) {
            *value = full;
        }
    }
    if let Some(key) = side.keys().next() {
        return Err(CodecError::invalid_document(format!(
            "hybrid side payload field '{key}' has no placeholder"
        )));
    }
    Ok(doc)
}

/// Gzip-compresses `bytes`.
pub fn gzip(bytes: &[u8]) -> CodecResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Decompresses a complete gzip stream into memory.
pub fn gunzip(bytes: &[u8]) -> CodecResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::CHECKSUM_LEN;
    use serde_json::json;

    fn sample() -> Document {
        let big = "x".repeat(HYBRID_SPLIT_THRESHOLD + 10);
        match json!({
            "_id": "doc-1",
            "name": "Alice",
            "age": 30,
            "score": 0.1,
            "tags": ["a", "b"],
            "blob": big,
            "nested": {"deep": {"list": [1, 2.5, null]}},
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn every_format_roundtrips() {
        let doc = sample();
        for format in StorageFormat::ALL {
            for compression in [false, true] {
                let codec = DocumentCodec::new(format, compression);
                let bytes = codec.encode(&doc).unwrap();
                let back = codec.decode(&bytes).unwrap();
                assert_eq!(back, doc, "{format} compression={compression}");
                assert_eq!(
                    back.keys().collect::<Vec<_>>(),
                    doc.keys().collect::<Vec<_>>()
                );
            }
        }
    }

    #[test]
    fn binary_layout_is_checksum_then_json() {
        let doc = sample();
        let bytes = DocumentCodec::new(StorageFormat::Binary, false)
            .encode(&doc)
            .unwrap();
        let payload = &bytes[CHECKSUM_LEN..];
        assert_eq!(payload, serde_json::to_vec(&doc).unwrap().as_slice());
    }

    #[test]
    fn binary_corruption_is_detected() {
        let codec = DocumentCodec::new(StorageFormat::Binary, false);
        let mut bytes = codec.encode(&sample()).unwrap();
        let mid = CHECKSUM_LEN + 5;
        bytes[mid] ^= 0x20;
        assert!(codec.decode(&bytes).unwrap_err().is_corruption());
    }

    #[test]
    fn hybrid_splits_only_large_fields() {
        let doc = sample();
        let bytes = DocumentCodec::new(StorageFormat::Hybrid, false)
            .encode(&doc)
            .unwrap();
        let frame = HybridFrame::parse(&bytes).unwrap();
        let metadata: Value = serde_json::from_slice(frame.metadata).unwrap();
        assert_eq!(metadata["blob"], json!({"binary": true, "type": "string"}));
        assert_eq!(metadata["name"], json!("Alice"));
        assert!(!frame.side.is_empty());
    }

    #[test]
    fn hybrid_without_large_fields_has_empty_side() {
        let mut doc = sample();
        doc.shift_remove("blob");
        let codec = DocumentCodec::new(StorageFormat::Hybrid, false);
        let bytes = codec.encode(&doc).unwrap();
        assert!(HybridFrame::parse(&bytes).unwrap().side.is_empty());
        assert_eq!(codec.decode(&bytes).unwrap(), doc);
    }

    #[test]
    fn hybrid_side_corruption_is_detected() {
        let codec = DocumentCodec::new(StorageFormat::Hybrid, false);
        let mut bytes = codec.encode(&sample()).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0x01;
        assert!(codec.decode(&bytes).unwrap_err().is_corruption());
    }

    #[test]
    fn hybrid_keeps_literal_placeholder_lookalikes() {
        let doc = match json!({"_id": "p", "f": {"binary": true, "type": "string"}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let codec = DocumentCodec::new(StorageFormat::Hybrid, true);
        assert_eq!(codec.decode(&codec.encode(&doc).unwrap()).unwrap(), doc);
    }

    #[test]
    fn compressed_output_is_gzip() {
        let bytes = DocumentCodec::new(StorageFormat::Json, true)
            .encode(&sample())
            .unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn decode_rejects_non_object() {
        let codec = DocumentCodec::new(StorageFormat::Json, false);
        assert!(matches!(
            codec.decode(b"[1,2]"),
            Err(CodecError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn file_names() {
        let plain = DocumentCodec::new(StorageFormat::Binary, false);
        assert_eq!(plain.file_name("abc"), "abc.bin");
        assert_eq!(plain.parse_file_name("abc.bin"), Some("abc"));
        assert_eq!(plain.parse_file_name("abc.json"), None);

        let gz = DocumentCodec::new(StorageFormat::Json, true);
        assert_eq!(gz.file_name("a.b"), "a.b.json.gz");
        assert_eq!(gz.parse_file_name("a.b.json.gz"), Some("a.b"));
        assert_eq!(gz.parse_file_name("a.b.json"), None);
        assert_eq!(gz.parse_file_name(".json.gz"), None);
    }

    #[test]
    fn format_names_parse_case_insensitively() {
        assert_eq!("HYBRID".parse::<StorageFormat>(), Ok(StorageFormat::Hybrid));
        assert_eq!("json".parse::<StorageFormat>(), Ok(StorageFormat::Json));
        assert!("bson".parse::<StorageFormat>().is_err());
    }
}
