//! Streaming codec for payloads too large to buffer
//!
//! - Input is memory-mapped (or read in chunks) instead of copied
//! - Coordinates are computed per pixel; no `N²`-entry lookup table is built
//! - The payload hash is accumulated chunk by chunk
//! - Decoded bytes go straight to the output file in curve order
//!
//! The pixel grid itself is still materialized; its size (`N²·4`) is bounded
//! by the payload size. Code mode tokenizes the mapped input through the
//! standard encoder.

use crate::codec::{check_grid_matches, target_len, PixelRtsEncoder};
use crate::config::{EncodeOptions, StreamConfig};
use crate::container::{self, write_atomic};
use crate::error::{PixelRtsError, Result};
use crate::grid::{self, pixels_needed, PixelGrid, BYTES_PER_PIXEL};
use crate::hilbert::d2xy;
use crate::metadata::{reconcile, EncodingMode, Metadata, MetadataOverrides};
use crate::mmap::InputView;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

/// Result of [`StreamingCodec::decode_file`]
#[derive(Clone, Debug)]
pub struct DecodeSummary {
    pub bytes_written: u64,
    /// Metadata the decode was driven by, if the container had any
    pub metadata: Option<Metadata>,
    /// Whether the output hash was checked against the metadata
    pub verified: bool,
}

/// File-to-file encoder/decoder
#[derive(Clone, Debug, Default)]
pub struct StreamingCodec {
    options: EncodeOptions,
    config: StreamConfig,
}

impl StreamingCodec {
    pub fn new(options: EncodeOptions, config: StreamConfig) -> Self {
        StreamingCodec { options, config }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn chunk_size(&self, chunk_hint: Option<usize>) -> usize {
        let mut cfg = self.config.clone();
        if let Some(hint) = chunk_hint {
            cfg.chunk_hint = hint;
        }
        cfg.effective_chunk()
    }

    /// Encode `input_path` into a container at `output_path`.
    ///
    /// `chunk_hint` overrides the configured chunk size for this call. Output
    /// is byte-identical across runs for the same input and options.
    pub fn encode_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
        chunk_hint: Option<usize>,
        overrides: &MetadataOverrides,
    ) -> Result<Metadata> {
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();
        let chunk = self.chunk_size(chunk_hint);

        let view = InputView::open(input_path, self.config.use_mmap, chunk)?;
        let data = view.as_slice();
        let data_size = data.len() as u64;
        debug!(
            path = %input_path.display(),
            bytes = data_size,
            mapped = view.is_mapped(),
            chunk,
            "opened streaming input"
        );

        if self.options.mode == EncodingMode::Code {
            // Tokenization needs the whole program in view
            let mut encoder = PixelRtsEncoder::new(self.options.clone());
            return encoder.save(data, output_path, overrides);
        }

        let grid_size = match self.options.grid_size {
            Some(size) => {
                grid::validate_grid_size(size, data_size)?;
                size
            }
            None => grid::grid_size_for(data_size),
        };
        let mut grid = PixelGrid::new(grid_size)?;
        let order = grid.order();

        let mut hasher = Sha256::new();
        let mut d = 0u64;
        for block in data.chunks(chunk) {
            hasher.update(block);
            for px in block.chunks(BYTES_PER_PIXEL) {
                let (x, y) = d2xy(order, d);
                let mut rgba = [0u8; 4];
                rgba[..px.len()].copy_from_slice(px);
                grid.set_pixel(x, y, rgba);
                d += 1;
            }
        }
        drop(view);

        let mut meta = Metadata::with_hash(
            grid_size,
            self.options.mode,
            data_size,
            format!("{:x}", hasher.finalize()),
        );
        meta.apply_overrides(overrides);

        let embedded = self.options.embed_metadata.then_some(&meta);
        write_atomic(output_path, |w| container::write_png(w, &grid, embedded))?;
        if self.options.write_sidecar {
            meta.save_sidecar(output_path)?;
        }

        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            grid_size,
            bytes = data_size,
            "stream-encoded file"
        );
        Ok(meta)
    }

    /// Decode the container at `input_path` into `output_path`.
    ///
    /// Metadata comes from the sidecar, else the embedded field; when both
    /// exist they must agree. With `verify_hash` the output is only moved into
    /// place if its SHA-256 matches the metadata.
    pub fn decode_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
        verify_hash: bool,
    ) -> Result<DecodeSummary> {
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();

        let sidecar = Metadata::load_sidecar(input_path)?;
        let parsed = container::read_png_file(input_path)?;
        let meta = reconcile(sidecar, parsed.embedded)?;
        check_grid_matches(meta.as_ref(), parsed.grid.size())?;

        let expected_hash = match (&meta, verify_hash) {
            (Some(m), true) => Some(m.data_hash.clone()),
            (None, true) => return Err(PixelRtsError::MissingMetadata(input_path.to_path_buf())),
            (_, false) => None,
        };

        let grid = &parsed.grid;
        let target = target_len(None, meta.as_ref(), grid.capacity())?;
        let order = grid.order();

        write_atomic(output_path, |w| {
            let mut hasher = Sha256::new();
            let mut remaining = target;
            for d in 0..pixels_needed(target) {
                let (x, y) = d2xy(order, d);
                let rgba = grid.pixel(x, y);
                let take = remaining.min(BYTES_PER_PIXEL as u64) as usize;
                w.write_all(&rgba[..take])?;
                hasher.update(&rgba[..take]);
                remaining -= take as u64;
            }
            if let Some(expected) = &expected_hash {
                let actual = format!("{:x}", hasher.finalize());
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(PixelRtsError::IntegrityMismatch {
                        expected: expected.to_ascii_lowercase(),
                        actual,
                    });
                }
            }
            Ok(())
        })?;

        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            bytes = target,
            verified = verify_hash,
            "stream-decoded container"
        );
        Ok(DecodeSummary {
            bytes_written: target,
            metadata: meta,
            verified: verify_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_small_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let container = dir.path().join("in.rts.png");
        let output = dir.path().join("out.bin");
        let data: Vec<u8> = (0..1001u32).map(|i| (i % 251) as u8).collect();
        fs::write(&input, &data).unwrap();

        let codec = StreamingCodec::new(EncodeOptions::default(), StreamConfig::small_chunks());
        let meta = codec
            .encode_file(&input, &container, Some(64), &MetadataOverrides::new())
            .unwrap();
        assert_eq!(meta.data_size, 1001);

        let summary = codec.decode_file(&container, &output, true).unwrap();
        assert!(summary.verified);
        assert_eq!(summary.bytes_written, 1001);
        assert_eq!(fs::read(&output).unwrap(), data);
    }

    #[test]
    fn test_chunk_size_does_not_change_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        fs::write(&input, vec![0xA5u8; 777]).unwrap();

        let codec = StreamingCodec::default();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        codec.encode_file(&input, &a, Some(5), &MetadataOverrides::new()).unwrap();
        codec.encode_file(&input, &b, Some(1 << 16), &MetadataOverrides::new()).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn test_verify_without_metadata_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let container = dir.path().join("in.png");
        fs::write(&input, b"abc").unwrap();

        let codec = StreamingCodec::new(
            EncodeOptions {
                write_sidecar: false,
                embed_metadata: false,
                ..EncodeOptions::default()
            },
            StreamConfig::default(),
        );
        codec.encode_file(&input, &container, None, &MetadataOverrides::new()).unwrap();

        let out = dir.path().join("out.bin");
        assert!(matches!(
            codec.decode_file(&container, &out, true),
            Err(PixelRtsError::MissingMetadata(_))
        ));

        // Without metadata the full capacity comes back
        let summary = codec.decode_file(&container, &out, false).unwrap();
        assert_eq!(summary.bytes_written, 4);
        assert_eq!(fs::read(&out).unwrap(), b"abc\0");
    }

    #[test]
    fn test_extreme_chunk_hint() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let container = dir.path().join("in.png");
        fs::write(&input, b"hello streaming").unwrap();

        let codec = StreamingCodec::new(
            EncodeOptions::default(),
            StreamConfig {
                chunk_hint: usize::MAX,
                use_mmap: false,
            },
        );
        let meta = codec
            .encode_file(&input, &container, Some(usize::MAX), &MetadataOverrides::new())
            .unwrap();
        assert_eq!(meta.data_size, 15);
        let meta = codec
            .encode_file(&input, &container, Some(0), &MetadataOverrides::new())
            .unwrap();
        assert_eq!(meta.data_size, 15);
    }

    #[test]
    fn test_code_mode_is_tokenized() {
        use crate::tokenizer::decode_program;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("prog.bin");
        let container = dir.path().join("prog.rts.png");
        let program = [0x13u8, 0, 0, 0, 0x73, 0, 0, 0];
        fs::write(&input, program).unwrap();

        let codec = StreamingCodec::new(
            EncodeOptions::with_mode(EncodingMode::Code),
            StreamConfig::default(),
        );
        let meta = codec
            .encode_file(&input, &container, None, &MetadataOverrides::new())
            .unwrap();
        assert!(meta.instructions.is_some());

        let bytes = fs::read(&container).unwrap();
        let mut decoder = crate::codec::PixelRtsDecoder::new();
        assert_eq!(decode_program(&mut decoder, &bytes).unwrap(), program);
    }
}
