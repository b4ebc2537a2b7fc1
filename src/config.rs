//! Codec configuration

use crate::metadata::EncodingMode;
use serde::{Deserialize, Serialize};

/// Options fixed when an encoder is constructed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// Payload preparation recorded in the metadata
    pub mode: EncodingMode,
    /// Explicit grid side; sized from the payload when `None`
    pub grid_size: Option<u32>,
    /// Write `<output>.meta.json` next to saved containers
    pub write_sidecar: bool,
    /// Embed metadata in the container's `PixelRTS` text field
    pub embed_metadata: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            mode: EncodingMode::Dense,
            grid_size: None,
            write_sidecar: true,
            embed_metadata: true,
        }
    }
}

impl EncodeOptions {
    /// Defaults with the given encoding mode
    pub fn with_mode(mode: EncodingMode) -> Self {
        EncodeOptions {
            mode,
            ..Self::default()
        }
    }

    pub fn grid_size(mut self, grid_size: u32) -> Self {
        self.grid_size = Some(grid_size);
        self
    }
}

/// Largest chunk a streaming call works in (1 GiB)
pub const MAX_CHUNK: usize = 1 << 30;

/// Configuration for file-streaming encode/decode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Bytes hashed or read per step. Rounded up to a multiple of 4.
    pub chunk_hint: usize,
    /// Map the input with mmap where the platform supports it
    pub use_mmap: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            chunk_hint: 1 << 20, // 1 MiB
            use_mmap: true,
        }
    }
}

impl StreamConfig {
    /// Small steps for memory-constrained hosts
    pub fn small_chunks() -> Self {
        StreamConfig {
            chunk_hint: 64 << 10,
            use_mmap: true,
        }
    }

    /// Large steps for bulk conversion of multi-gigabyte images
    pub fn large_chunks() -> Self {
        StreamConfig {
            chunk_hint: 16 << 20,
            use_mmap: true,
        }
    }

    /// Chunk size actually used: pixel aligned, between one pixel and
    /// [`MAX_CHUNK`]
    pub fn effective_chunk(&self) -> usize {
        self.chunk_hint.clamp(4, MAX_CHUNK).next_multiple_of(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_chunk_alignment() {
        let mut cfg = StreamConfig::default();
        assert_eq!(cfg.effective_chunk(), 1 << 20);
        cfg.chunk_hint = 0;
        assert_eq!(cfg.effective_chunk(), 4);
        cfg.chunk_hint = 4097;
        assert_eq!(cfg.effective_chunk(), 4100);
    }

    #[test]
    fn test_effective_chunk_extremes() {
        let mut cfg = StreamConfig::default();
        cfg.chunk_hint = usize::MAX;
        assert_eq!(cfg.effective_chunk(), MAX_CHUNK);
        cfg.chunk_hint = MAX_CHUNK + 1;
        assert_eq!(cfg.effective_chunk(), MAX_CHUNK);
        cfg.chunk_hint = 1;
        assert_eq!(cfg.effective_chunk(), 4);
    }

    #[test]
    fn test_options_defaults() {
        let opts = EncodeOptions::default();
        assert_eq!(opts.mode, EncodingMode::Dense);
        assert!(opts.write_sidecar && opts.embed_metadata);
        assert_eq!(EncodeOptions::with_mode(EncodingMode::Code).grid_size(8).grid_size, Some(8));
    }
}
