//! PixelRTS metadata
//!
//! The metadata record is written twice: compact JSON inside the container's
//! `PixelRTS` text field and pretty JSON in a `<container>.meta.json` sidecar.
//! Either copy may be missing. When both are present they must be identical.

use crate::container::write_atomic;
use crate::error::{PixelRtsError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Format generation written by this crate
pub const FORMAT_VERSION: u32 = 2;

/// Keyword of the embedded text field, also the legacy text prefix
pub const TEXT_KEYWORD: &str = "PixelRTS";

/// Suffix appended to a container path to locate its sidecar
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Keys owned by the codec; caller overrides never replace them.
const RESERVED_KEYS: &[&str] = &[
    "format",
    "format_version",
    "grid_size",
    "encoding_mode",
    "data_size",
    "data_hash",
    "content_version",
    "instructions",
];

fn default_format() -> String {
    format!("PixelRTS-{FORMAT_VERSION}.0")
}

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

/// How payload bytes were prepared before packing.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Payload bytes packed as-is
    #[default]
    #[serde(alias = "RGBA-dense", alias = "standard")]
    #[value(alias = "standard")]
    Dense,
    /// Payload is a semantic token stream (see [`crate::tokenizer`])
    #[serde(alias = "RGBA-code")]
    Code,
}

impl EncodingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingMode::Dense => "dense",
            EncodingMode::Code => "code",
        }
    }
}

impl std::fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named byte range of the original content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub offset: u64,
    pub size: u64,
    pub sha256: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Segment {
    /// Segment covering all of `data`, starting at `offset`.
    pub fn describe(offset: u64, data: &[u8]) -> Self {
        Segment {
            offset,
            size: data.len() as u64,
            sha256: hash_data(data),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Metadata record describing one container
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub grid_size: u32,
    #[serde(default)]
    pub encoding_mode: EncodingMode,
    pub data_size: u64,
    pub data_hash: String,
    /// Caller-supplied `version`, renamed to stay clear of `format_version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_version: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub segments: BTreeMap<String, Segment>,
    /// Token dictionary for code mode: entry `i` is the word of token `i + 1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<u32>>,
    /// Any other caller-supplied fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Caller-supplied metadata merged into the record at encode time
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataOverrides {
    pub content_type: Option<String>,
    pub name: Option<String>,
    /// Stored as `content_version`
    pub version: Option<String>,
    pub description: Option<String>,
    pub segments: BTreeMap<String, Segment>,
    pub extra: BTreeMap<String, Value>,
}

impl MetadataOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_segment(mut self, name: impl Into<String>, segment: Segment) -> Self {
        self.segments.insert(name.into(), segment);
        self
    }

    /// Build overrides from a free-form JSON object.
    ///
    /// `version` becomes the content version. Codec-owned keys are dropped.
    pub fn from_json(map: serde_json::Map<String, Value>) -> Result<Self> {
        let mut overrides = MetadataOverrides::default();
        for (key, value) in map {
            match key.as_str() {
                "type" => overrides.content_type = Some(json_string(value)),
                "name" => overrides.name = Some(json_string(value)),
                "version" => overrides.version = Some(json_string(value)),
                "description" => overrides.description = Some(json_string(value)),
                "segments" => overrides.segments = serde_json::from_value(value)?,
                k if RESERVED_KEYS.contains(&k) => {
                    debug!(key = k, "ignoring reserved metadata override");
                }
                _ => {
                    overrides.extra.insert(key, value);
                }
            }
        }
        Ok(overrides)
    }
}

fn json_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl Metadata {
    /// Fresh record for a payload laid out on a `grid_size` grid.
    pub fn new(grid_size: u32, encoding_mode: EncodingMode, payload: &[u8]) -> Self {
        Self::with_hash(grid_size, encoding_mode, payload.len() as u64, hash_data(payload))
    }

    /// Record for a payload whose size and hash were computed elsewhere.
    pub fn with_hash(
        grid_size: u32,
        encoding_mode: EncodingMode,
        data_size: u64,
        data_hash: String,
    ) -> Self {
        Metadata {
            format: default_format(),
            format_version: FORMAT_VERSION,
            grid_size,
            encoding_mode,
            data_size,
            data_hash,
            content_version: None,
            content_type: None,
            name: None,
            description: None,
            segments: BTreeMap::new(),
            instructions: None,
            extra: BTreeMap::new(),
        }
    }

    /// Merge caller-supplied fields without touching codec-owned ones.
    pub fn apply_overrides(&mut self, overrides: &MetadataOverrides) {
        if let Some(v) = &overrides.content_type {
            self.content_type = Some(v.clone());
        }
        if let Some(v) = &overrides.name {
            self.name = Some(v.clone());
        }
        if let Some(v) = &overrides.version {
            self.content_version = Some(v.clone());
        }
        if let Some(v) = &overrides.description {
            self.description = Some(v.clone());
        }
        for (name, segment) in &overrides.segments {
            self.segments.insert(name.clone(), segment.clone());
        }
        for (key, value) in &overrides.extra {
            let known = matches!(
                key.as_str(),
                "type" | "name" | "description" | "segments" | "version"
            );
            if RESERVED_KEYS.contains(&key.as_str()) || known {
                continue;
            }
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Payload capacity of the described grid in bytes
    pub fn capacity(&self) -> u64 {
        crate::grid::capacity_of(self.grid_size)
    }

    /// Percentage of the grid capacity occupied by payload
    pub fn usage_percent(&self) -> f64 {
        let capacity = self.capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.data_size as f64 / capacity as f64 * 100.0
    }

    /// Compact JSON for the embedded text field.
    pub fn to_embedded_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an embedded text field, with or without the legacy magic prefix.
    pub fn from_embedded_text(text: &str) -> Result<Self> {
        let json = text.strip_prefix(TEXT_KEYWORD).unwrap_or(text);
        Ok(serde_json::from_str(json)?)
    }

    /// Write `<container_path>.meta.json`.
    pub fn save_sidecar<P: AsRef<Path>>(&self, container_path: P) -> Result<PathBuf> {
        let path = sidecar_path(container_path);
        write_atomic(&path, |w| {
            serde_json::to_writer_pretty(&mut *w, self)?;
            w.write_all(b"\n")?;
            Ok(())
        })?;
        Ok(path)
    }

    /// Read the sidecar of `container_path` if one exists.
    pub fn load_sidecar<P: AsRef<Path>>(container_path: P) -> Result<Option<Self>> {
        let path = sidecar_path(container_path);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "loading sidecar metadata");
        Ok(Some(serde_json::from_reader(BufReader::new(file))?))
    }
}

/// Sidecar location for a container path.
///
/// # Examples
///
/// ```
/// use pixelrts::metadata::sidecar_path;
///
/// assert_eq!(
///     sidecar_path("kernel.rts.png").to_str(),
///     Some("kernel.rts.png.meta.json")
/// );
/// ```
pub fn sidecar_path<P: AsRef<Path>>(container_path: P) -> PathBuf {
    let mut os = container_path.as_ref().as_os_str().to_os_string();
    os.push(SIDECAR_SUFFIX);
    PathBuf::from(os)
}

/// Pick the authoritative record from an external copy and an embedded copy.
///
/// Returns whichever exists; fails with `MetadataConflict` if both exist and
/// differ.
pub fn reconcile(external: Option<Metadata>, embedded: Option<Metadata>) -> Result<Option<Metadata>> {
    match (external, embedded) {
        (Some(a), Some(b)) if a != b => Err(PixelRtsError::MetadataConflict),
        (Some(a), _) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn hash_data(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Compare the SHA-256 of `data` with `expected_hex`, ignoring case.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> bool {
    hash_data(data).eq_ignore_ascii_case(expected_hex.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash_data(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(verify_hash(
            b"",
            "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855"
        ));
    }

    #[test]
    fn test_overrides_rename_version() {
        let overrides = MetadataOverrides::from_json(
            json!({
                "version": "1.2.3",
                "name": "kernel",
                "format_version": 99,
                "data_size": 1,
                "arch": "riscv32"
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .unwrap();

        let mut meta = Metadata::new(2, EncodingMode::Dense, b"abcd");
        meta.apply_overrides(&overrides);

        assert_eq!(meta.content_version.as_deref(), Some("1.2.3"));
        assert_eq!(meta.format_version, FORMAT_VERSION);
        assert_eq!(meta.data_size, 4);
        assert_eq!(meta.name.as_deref(), Some("kernel"));
        assert_eq!(meta.extra.get("arch"), Some(&json!("riscv32")));
        assert!(!meta.extra.contains_key("version"));
    }

    #[test]
    fn test_json_shape() {
        let mut meta = Metadata::new(1, EncodingMode::Code, b"ab");
        meta.content_type = Some("wasm".into());
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["encoding_mode"], "code");
        assert_eq!(value["type"], "wasm");
        assert_eq!(value["format"], "PixelRTS-2.0");
        assert!(value.get("segments").is_none());
        assert!(value.get("name").is_none());
    }

    #[test]
    fn test_reads_legacy_mode_names() {
        let text = r#"{"grid_size":2,"encoding_mode":"RGBA-dense","data_size":3,"data_hash":"00","encoding":{"type":"RGBA-dense"}}"#;
        let meta = Metadata::from_embedded_text(text).unwrap();
        assert_eq!(meta.encoding_mode, EncodingMode::Dense);
        assert_eq!(meta.format_version, FORMAT_VERSION);
        assert!(meta.extra.contains_key("encoding"));

        let prefixed = format!("{TEXT_KEYWORD}{text}");
        assert_eq!(Metadata::from_embedded_text(&prefixed).unwrap(), meta);
    }

    #[test]
    fn test_embedded_text_round_trip() {
        let mut meta = Metadata::new(4, EncodingMode::Dense, b"payload");
        meta.segments.insert("boot".into(), Segment::describe(0, b"payload").with_kind("kernel"));
        meta.instructions = Some(vec![0x13, 0x33]);
        let text = meta.to_embedded_text().unwrap();
        assert_eq!(Metadata::from_embedded_text(&text).unwrap(), meta);
    }

    #[test]
    fn test_reconcile() {
        let a = Metadata::new(1, EncodingMode::Dense, b"a");
        let b = Metadata::new(1, EncodingMode::Dense, b"b");
        assert_eq!(reconcile(Some(a.clone()), None).unwrap(), Some(a.clone()));
        assert_eq!(reconcile(None, Some(b.clone())).unwrap(), Some(b.clone()));
        assert_eq!(reconcile(Some(a.clone()), Some(a.clone())).unwrap(), Some(a.clone()));
        assert!(matches!(
            reconcile(Some(a), Some(b)),
            Err(PixelRtsError::MetadataConflict)
        ));
        assert_eq!(reconcile(None, None).unwrap(), None);
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("blob.rts.png");
        assert!(Metadata::load_sidecar(&container).unwrap().is_none());

        let meta = Metadata::new(8, EncodingMode::Dense, &[7u8; 100]);
        let written = meta.save_sidecar(&container).unwrap();
        assert_eq!(written, dir.path().join("blob.rts.png.meta.json"));
        assert_eq!(Metadata::load_sidecar(&container).unwrap(), Some(meta));
    }
}
