//! Standard PixelRTS codec
//!
//! Dense byte packing over a Hilbert-ordered grid:
//! - Pixel `d` of the curve carries payload bytes `4d..4d+4`
//! - Code mode packs the semantic token stream instead of the raw bytes
//! - The final partial pixel is zero padded; padding is never decoded
//! - SHA-256 of the payload is recorded for integrity checks

use crate::config::EncodeOptions;
use crate::container::{self, write_atomic};
use crate::error::{PixelRtsError, Result};
use crate::grid::{self, pixels_needed, PixelGrid, BYTES_PER_PIXEL};
use crate::hilbert::{lut_for, HilbertLut};
use crate::metadata::{self, reconcile, EncodingMode, Metadata, MetadataOverrides, Segment};
use crate::tokenizer::{SemanticTokenizer, SOURCE_SEGMENT};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Output of [`PixelRtsEncoder::encode`]
#[derive(Clone, Debug)]
pub struct EncodedContainer {
    /// PNG bytes, metadata embedded unless disabled in the options
    pub container: Vec<u8>,
    pub metadata: Metadata,
}

/// Write `payload` onto `grid` in curve order.
pub(crate) fn pack_payload(grid: &mut PixelGrid, lut: &HilbertLut, payload: &[u8]) {
    for (d, chunk) in payload.chunks(BYTES_PER_PIXEL).enumerate() {
        let (x, y) = lut[d];
        let mut rgba = [0u8; 4];
        rgba[..chunk.len()].copy_from_slice(chunk);
        grid.set_pixel(x, y, rgba);
    }
}

/// Number of bytes a decode should produce.
///
/// Explicit size wins, then the metadata's `data_size`. With neither, the
/// whole grid capacity is returned, trailing zero padding included.
pub(crate) fn target_len(expected: Option<u64>, meta: Option<&Metadata>, capacity: u64) -> Result<u64> {
    let target = expected
        .or_else(|| meta.map(|m| m.data_size))
        .unwrap_or(capacity);
    if target > capacity {
        return Err(PixelRtsError::CapacityExceeded {
            requested: target,
            capacity,
        });
    }
    Ok(target)
}

/// Ensure metadata describes the grid it came with.
pub(crate) fn check_grid_matches(meta: Option<&Metadata>, grid_size: u32) -> Result<()> {
    match meta {
        Some(m) if m.grid_size != grid_size => Err(PixelRtsError::MalformedContainer(format!(
            "metadata grid_size {} does not match {grid_size}x{grid_size} image",
            m.grid_size
        ))),
        _ => Ok(()),
    }
}

/// Encoder for in-memory payloads
///
/// # Examples
///
/// ```
/// use pixelrts::{EncodeOptions, MetadataOverrides, PixelRtsDecoder, PixelRtsEncoder};
///
/// let mut encoder = PixelRtsEncoder::new(EncodeOptions::default());
/// let encoded = encoder.encode(b"hello, grid", &MetadataOverrides::new()).unwrap();
/// assert_eq!(encoded.metadata.grid_size, 2);
///
/// let mut decoder = PixelRtsDecoder::new();
/// let data = decoder.decode(&encoded.container, None).unwrap();
/// assert_eq!(data, b"hello, grid");
/// ```
#[derive(Clone, Debug, Default)]
pub struct PixelRtsEncoder {
    options: EncodeOptions,
    last_metadata: Option<Metadata>,
}

impl PixelRtsEncoder {
    pub fn new(options: EncodeOptions) -> Self {
        PixelRtsEncoder {
            options,
            last_metadata: None,
        }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    pub fn mode(&self) -> EncodingMode {
        self.options.mode
    }

    fn resolve_grid_size(&self, data_size: u64) -> Result<u32> {
        match self.options.grid_size {
            Some(size) => {
                grid::validate_grid_size(size, data_size)?;
                Ok(size)
            }
            None => Ok(grid::grid_size_for(data_size)),
        }
    }

    /// Lay `payload` onto a fresh grid and build its metadata.
    ///
    /// In code mode `payload` is an instruction stream; it is tokenized first
    /// and the token dictionary lands in the metadata.
    pub fn encode_grid(
        &self,
        payload: &[u8],
        overrides: &MetadataOverrides,
    ) -> Result<(PixelGrid, Metadata)> {
        match self.options.mode {
            EncodingMode::Dense => self.pack(payload, EncodingMode::Dense, overrides),
            EncodingMode::Code => self.pack_program(payload, overrides),
        }
    }

    fn pack(
        &self,
        payload: &[u8],
        mode: EncodingMode,
        overrides: &MetadataOverrides,
    ) -> Result<(PixelGrid, Metadata)> {
        let grid_size = self.resolve_grid_size(payload.len() as u64)?;
        let mut grid = PixelGrid::new(grid_size)?;
        let lut = lut_for(grid.order())?;
        pack_payload(&mut grid, &lut, payload);

        let mut meta = Metadata::new(grid_size, mode, payload);
        meta.apply_overrides(overrides);

        debug!(bytes = payload.len(), grid_size, mode = %mode, "packed payload");
        Ok((grid, meta))
    }

    /// Tokenize `program` and pack the token stream, whatever the configured
    /// mode.
    pub(crate) fn pack_program(
        &self,
        program: &[u8],
        overrides: &MetadataOverrides,
    ) -> Result<(PixelGrid, Metadata)> {
        let mut tokenizer = SemanticTokenizer::new();
        let stream = tokenizer.tokenize_stream(program)?;
        let (grid, mut meta) = self.pack(&stream, EncodingMode::Code, overrides)?;

        meta.instructions = Some(tokenizer.into_dictionary().into_words());
        meta.segments.insert(
            SOURCE_SEGMENT.to_string(),
            Segment::describe(0, program).with_kind("program"),
        );
        Ok((grid, meta))
    }

    /// Encode `payload` into PNG container bytes.
    pub fn encode(&mut self, payload: &[u8], overrides: &MetadataOverrides) -> Result<EncodedContainer> {
        let (grid, meta) = self.encode_grid(payload, overrides)?;
        self.finish(&grid, meta)
    }

    /// Serialize an already packed grid, remembering its metadata.
    pub(crate) fn finish(&mut self, grid: &PixelGrid, meta: Metadata) -> Result<EncodedContainer> {
        let embedded = self.options.embed_metadata.then_some(&meta);
        let container = container::encode_png(grid, embedded)?;
        self.last_metadata = Some(meta.clone());
        Ok(EncodedContainer {
            container,
            metadata: meta,
        })
    }

    /// Encode and write the container, plus its sidecar when enabled.
    pub fn save<P: AsRef<Path>>(
        &mut self,
        payload: &[u8],
        output_path: P,
        overrides: &MetadataOverrides,
    ) -> Result<Metadata> {
        let encoded = self.encode(payload, overrides)?;
        self.write_outputs(output_path.as_ref(), &encoded)?;
        Ok(encoded.metadata)
    }

    pub(crate) fn write_outputs(&self, output_path: &Path, encoded: &EncodedContainer) -> Result<()> {
        write_atomic(output_path, |w| Ok(w.write_all(&encoded.container)?))?;
        if self.options.write_sidecar {
            encoded.metadata.save_sidecar(output_path)?;
        }
        info!(
            path = %output_path.display(),
            grid_size = encoded.metadata.grid_size,
            bytes = encoded.metadata.data_size,
            "wrote container"
        );
        Ok(())
    }

    /// Metadata of the last successful encode
    pub fn get_metadata(&self) -> Option<&Metadata> {
        self.last_metadata.as_ref()
    }
}

/// Decoder for in-memory containers
#[derive(Clone, Debug, Default)]
pub struct PixelRtsDecoder {
    external: Option<Metadata>,
    resolved: Option<Metadata>,
}

impl PixelRtsDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply metadata from outside the container, e.g. a sidecar.
    ///
    /// It must agree with any metadata embedded in the containers decoded
    /// afterwards.
    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.external = Some(metadata);
    }

    /// Metadata in effect for the last decode, or the externally supplied one
    pub fn get_metadata(&self) -> Option<&Metadata> {
        self.resolved.as_ref().or(self.external.as_ref())
    }

    /// Decode PNG bytes back into the payload.
    ///
    /// The output length is `expected_size` when given, else the metadata's
    /// `data_size`. Without either the whole `N²·4` capacity is returned,
    /// including any zero padding past the real payload.
    pub fn decode(&mut self, container: &[u8], expected_size: Option<u64>) -> Result<Vec<u8>> {
        self.resolved = None;
        let parsed = container::decode_png(container)?;
        let meta = reconcile(self.external.clone(), parsed.embedded)?;
        check_grid_matches(meta.as_ref(), parsed.grid.size())?;

        let target = target_len(expected_size, meta.as_ref(), parsed.grid.capacity())?;
        self.resolved = meta;
        Self::decode_grid(&parsed.grid, target)
    }

    /// Read `target_len` payload bytes off a grid in curve order.
    pub fn decode_grid(grid: &PixelGrid, target_len: u64) -> Result<Vec<u8>> {
        let capacity = grid.capacity();
        if target_len > capacity {
            return Err(PixelRtsError::CapacityExceeded {
                requested: target_len,
                capacity,
            });
        }
        let lut = lut_for(grid.order())?;
        let target = target_len as usize;
        let mut out = Vec::with_capacity(target);
        for d in 0..pixels_needed(target_len) as usize {
            let (x, y) = lut[d];
            let rgba = grid.pixel(x, y);
            let take = (target - out.len()).min(BYTES_PER_PIXEL);
            out.extend_from_slice(&rgba[..take]);
        }
        Ok(out)
    }

    /// Read a container file, using its sidecar when present.
    pub fn load<P: AsRef<Path>>(&mut self, input_path: P, verify: bool) -> Result<Vec<u8>> {
        let input_path = input_path.as_ref();
        if let Some(sidecar) = Metadata::load_sidecar(input_path)? {
            self.set_metadata(sidecar);
        }
        let bytes = fs::read(input_path)?;
        let data = self.decode(&bytes, None)?;

        if verify {
            let meta = self
                .get_metadata()
                .ok_or_else(|| PixelRtsError::MissingMetadata(input_path.to_path_buf()))?;
            check_hash(&data, &meta.data_hash)?;
            debug!(path = %input_path.display(), "hash verified");
        }
        Ok(data)
    }

    /// Metadata of a container file, if it has any: sidecar first, embedded
    /// field second. Only the PNG header chunks are read.
    pub fn peek_metadata<P: AsRef<Path>>(input_path: P) -> Result<Option<Metadata>> {
        let input_path = input_path.as_ref();
        let sidecar = Metadata::load_sidecar(input_path)?;
        let embedded = container::read_png_metadata(input_path)?;
        reconcile(sidecar, embedded)
    }

    /// Like [`peek_metadata`](Self::peek_metadata), but `MissingMetadata`
    /// when the container has none.
    pub fn info<P: AsRef<Path>>(input_path: P) -> Result<Metadata> {
        let input_path = input_path.as_ref();
        Self::peek_metadata(input_path)?
            .ok_or_else(|| PixelRtsError::MissingMetadata(input_path.to_path_buf()))
    }
}

/// `IntegrityMismatch` unless `data` hashes to `expected_hex`.
pub fn check_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    if metadata::verify_hash(data, expected_hex) {
        return Ok(());
    }
    Err(PixelRtsError::IntegrityMismatch {
        expected: expected_hex.to_ascii_lowercase(),
        actual: metadata::hash_data(data),
    })
}
