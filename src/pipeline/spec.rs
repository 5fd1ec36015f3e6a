//! Compressor and filter specs as they appear in dataset metadata.
//!
//! Both are tagged JSON objects keyed by `"id"`. Unknown ids are preserved
//! rather than rejected at parse time, so metadata for a dataset the caller
//! never reads does not poison the whole group. The decode driver fails on an
//! unknown id only when the chunk is actually decoded.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::codecs::qfc::QfcCompressionOpts;

//==================================================================================
// 1. Compressor spec
//==================================================================================

/// The outermost codec applied to a stored chunk.
#[derive(Debug, Clone)]
pub enum CompressorSpec {
    Zstd { level: i32 },
    Gzip { level: u32 },
    Qfc(QfcCompressionOpts),
    /// Recognized in metadata but decoding is not available.
    Mp4,
    Unknown(String),
}

impl CompressorSpec {
    pub fn id(&self) -> &str {
        match self {
            Self::Zstd { .. } => "zstd",
            Self::Gzip { .. } => "gzip",
            Self::Qfc(_) => "qfc",
            Self::Mp4 => "mp4",
            Self::Unknown(id) => id,
        }
    }
}

impl<'de> Deserialize<'de> for CompressorSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("id"))?;
        let spec = match id {
            "zstd" => Self::Zstd {
                level: value.get("level").and_then(Value::as_i64).unwrap_or(3) as i32,
            },
            "gzip" => Self::Gzip {
                level: value.get("level").and_then(Value::as_u64).unwrap_or(6) as u32,
            },
            "qfc" => {
                // Every codec option is mandatory.
                let opts: QfcCompressionOpts =
                    serde_json::from_value(value.clone()).map_err(D::Error::custom)?;
                Self::Qfc(opts)
            }
            "mp4" => Self::Mp4,
            other => Self::Unknown(other.to_string()),
        };
        Ok(spec)
    }
}

impl Serialize for CompressorSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = match self {
            Self::Zstd { level } => json!({ "id": "zstd", "level": level }),
            Self::Gzip { level } => json!({ "id": "gzip", "level": level }),
            Self::Qfc(opts) => {
                let mut v = serde_json::to_value(opts).map_err(serde::ser::Error::custom)?;
                if let Value::Object(map) = &mut v {
                    map.insert("id".to_string(), Value::from("qfc"));
                }
                v
            }
            Self::Mp4 => json!({ "id": "mp4" }),
            Self::Unknown(id) => json!({ "id": id }),
        };
        value.serialize(serializer)
    }
}

//==================================================================================
// 2. Filter spec
//==================================================================================

/// One stage of the pre-compression filter chain. Listed in metadata in
/// application order; decoding walks the list back to front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    Zlib,
    Zstd,
    Shuffle { elementsize: usize },
    VlenUtf8,
    VlenBytes,
    Json2,
    Unknown(String),
}

impl FilterSpec {
    pub fn id(&self) -> &str {
        match self {
            Self::Zlib => "zlib",
            Self::Zstd => "zstd",
            Self::Shuffle { .. } => "shuffle",
            Self::VlenUtf8 => "vlen-utf8",
            Self::VlenBytes => "vlen-bytes",
            Self::Json2 => "json2",
            Self::Unknown(id) => id,
        }
    }
}

impl<'de> Deserialize<'de> for FilterSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("id"))?;
        let spec = match id {
            "zlib" => Self::Zlib,
            "zstd" => Self::Zstd,
            "shuffle" => Self::Shuffle {
                elementsize: value.get("elementsize").and_then(Value::as_u64).unwrap_or(4)
                    as usize,
            },
            "vlen-utf8" => Self::VlenUtf8,
            "vlen-bytes" => Self::VlenBytes,
            "json2" => Self::Json2,
            other => Self::Unknown(other.to_string()),
        };
        Ok(spec)
    }
}

impl Serialize for FilterSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = match self {
            Self::Shuffle { elementsize } => {
                json!({ "id": "shuffle", "elementsize": elementsize })
            }
            other => json!({ "id": other.id() }),
        };
        value.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::qfc::{QfcCompressionMethod, QfcDtype};

    #[test]
    fn test_compressor_from_metadata() {
        let spec: CompressorSpec =
            serde_json::from_str(r#"{ "id": "gzip", "level": 4 }"#).unwrap();
        assert!(matches!(spec, CompressorSpec::Gzip { level: 4 }));

        let spec: CompressorSpec = serde_json::from_str(r#"{ "id": "lz77" }"#).unwrap();
        assert!(matches!(spec, CompressorSpec::Unknown(ref id) if id == "lz77"));
    }

    #[test]
    fn test_qfc_compressor_requires_all_options() {
        let full = r#"{
            "id": "qfc",
            "compression_method": "zlib",
            "dtype": "int16",
            "quant_scale_factor": 100.0,
            "segment_length": 300,
            "zlib_level": 6,
            "zstd_level": 3
        }"#;
        let spec: CompressorSpec = serde_json::from_str(full).unwrap();
        match spec {
            CompressorSpec::Qfc(opts) => {
                assert_eq!(opts.compression_method, QfcCompressionMethod::Zlib);
                assert_eq!(opts.dtype, QfcDtype::Int16);
                assert_eq!(opts.segment_length, 300);
            }
            other => panic!("expected qfc, got {:?}", other),
        }

        let partial = r#"{ "id": "qfc", "dtype": "int16" }"#;
        assert!(serde_json::from_str::<CompressorSpec>(partial).is_err());
    }

    #[test]
    fn test_filter_from_metadata() {
        let filters: Vec<FilterSpec> = serde_json::from_str(
            r#"[
                { "id": "json2" },
                { "id": "shuffle", "elementsize": 8 },
                { "id": "zlib" },
                { "id": "mystery" }
            ]"#,
        )
        .unwrap();
        assert_eq!(filters[0], FilterSpec::Json2);
        assert_eq!(filters[1], FilterSpec::Shuffle { elementsize: 8 });
        assert_eq!(filters[2], FilterSpec::Zlib);
        assert_eq!(filters[3], FilterSpec::Unknown("mystery".to_string()));
    }

    #[test]
    fn test_filter_roundtrips_through_json() {
        let filter = FilterSpec::Shuffle { elementsize: 2 };
        let text = serde_json::to_string(&filter).unwrap();
        let back: FilterSpec = serde_json::from_str(&text).unwrap();
        assert_eq!(filter, back);
    }
}
