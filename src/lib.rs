//! PixelRTS - binary to image serialization
//!
//! Arbitrary bytes are packed into a square, power-of-two RGBA image, four
//! bytes per pixel, in Hilbert curve order so that bytes close together in
//! the file stay close together on screen.
//!
//! - [`hilbert`]: curve mapping, cached lookup tables, locality checks
//! - [`grid`]: grid sizing and the RGBA raster
//! - [`codec`]: in-memory encoder/decoder with SHA-256 integrity
//! - [`tokenizer`]: instruction-stream tokenization for code mode
//! - [`streaming`]: file-to-file codec over mmapped input
//! - [`metadata`], [`container`]: JSON metadata, PNG container and sidecars

pub mod analysis;
pub mod cli;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod grid;
pub mod hilbert;
pub mod metadata;
pub mod mmap;
pub mod streaming;
pub mod tokenizer;

// Re-export main types for convenience
pub use codec::{check_hash, EncodedContainer, PixelRtsDecoder, PixelRtsEncoder};
pub use config::{EncodeOptions, StreamConfig};
pub use error::{PixelRtsError, Result};
pub use grid::{grid_size_for, PixelGrid};
pub use hilbert::{coord_to_index, generate_lut, index_to_coord, lut_for, HilbertLut};
pub use metadata::{hash_data, verify_hash, EncodingMode, Metadata, MetadataOverrides, Segment};
pub use streaming::{DecodeSummary, StreamingCodec};
pub use tokenizer::{Category, SemanticTokenizer, TokenDictionary, TokenId};
