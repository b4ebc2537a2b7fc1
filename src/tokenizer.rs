//! Semantic tokenizer for fixed-width instruction streams
//!
//! Programs made of 32-bit RV32-style instruction words are deduplicated
//! through a content-addressed dictionary and annotated with a coarse visual
//! category before dense packing. Each word becomes one pixel:
//!
//! ```text
//! [category index, token id hi, token id lo, 0xFF]
//! ```
//!
//! The category alone does not identify the word; the dictionary is stored in
//! the container metadata (`instructions`) so the exact program can be
//! rebuilt.

use crate::codec::{check_hash, EncodedContainer, PixelRtsDecoder, PixelRtsEncoder};
use crate::error::{PixelRtsError, Result};
use crate::metadata::{EncodingMode, MetadataOverrides};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Token identifier. Zero is reserved.
pub type TokenId = u16;

/// Bytes per instruction word
pub const WORD_BYTES: usize = 4;

/// Alpha byte marking a token pixel
pub const TOKEN_MARKER: u8 = 0xFF;

/// Segment describing the original program in code-mode metadata
pub const SOURCE_SEGMENT: &str = "source";

/// Visual category of an instruction word
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Category {
    Unknown = 0,
    /// Register-register ALU
    AluReg = 1,
    /// Multiply/divide (register ALU with funct7 = 1)
    MulDiv = 2,
    AluImm = 3,
    Load = 4,
    Store = 5,
    Branch = 6,
    Jal = 7,
    Jalr = 8,
    Lui = 9,
    Auipc = 10,
    Fence = 11,
    /// ecall / ebreak
    Env = 12,
    /// CSR access (SYSTEM with funct3 != 0)
    Csr = 13,
}

impl Category {
    pub const ALL: [Category; 14] = [
        Category::Unknown,
        Category::AluReg,
        Category::MulDiv,
        Category::AluImm,
        Category::Load,
        Category::Store,
        Category::Branch,
        Category::Jal,
        Category::Jalr,
        Category::Lui,
        Category::Auipc,
        Category::Fence,
        Category::Env,
        Category::Csr,
    ];

    /// Byte written into the red channel
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Category> {
        Self::ALL.get(index as usize).copied()
    }

    /// One-character label for dumps and trace views
    pub fn symbol(self) -> char {
        match self {
            Category::Unknown => '?',
            Category::AluReg => 'R',
            Category::MulDiv => 'M',
            Category::AluImm => 'I',
            Category::Load => 'L',
            Category::Store => 'S',
            Category::Branch => 'B',
            Category::Jal => 'J',
            Category::Jalr => 'K',
            Category::Lui => 'U',
            Category::Auipc => 'A',
            Category::Fence => 'F',
            Category::Env => 'E',
            Category::Csr => 'C',
        }
    }
}

/// Classify an instruction word by opcode, then funct7/funct3 where one
/// opcode covers several categories.
pub fn classify(word: u32) -> Category {
    let opcode = word & 0x7F;
    let funct3 = (word >> 12) & 0x7;
    let funct7 = word >> 25;
    match opcode {
        0x33 if funct7 == 0x01 => Category::MulDiv,
        0x33 => Category::AluReg,
        0x13 => Category::AluImm,
        0x03 => Category::Load,
        0x23 => Category::Store,
        0x63 => Category::Branch,
        0x6F => Category::Jal,
        0x67 => Category::Jalr,
        0x37 => Category::Lui,
        0x17 => Category::Auipc,
        0x0F => Category::Fence,
        0x73 if funct3 == 0 => Category::Env,
        0x73 => Category::Csr,
        _ => Category::Unknown,
    }
}

/// Bidirectional `word <-> TokenId` mapping, IDs assigned from 1 in
/// first-seen order.
#[derive(Clone, Debug)]
pub struct TokenDictionary {
    next_id: u32,
    ids: HashMap<u32, TokenId>,
    words: Vec<u32>,
}

impl Default for TokenDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenDictionary {
    pub fn new() -> Self {
        TokenDictionary {
            next_id: 1,
            ids: HashMap::new(),
            words: Vec::new(),
        }
    }

    /// Rebuild a dictionary from its ordered word list.
    pub fn from_words(words: Vec<u32>) -> Result<Self> {
        let mut dict = TokenDictionary::new();
        for word in words {
            if dict.lookup(word).is_some() {
                return Err(PixelRtsError::MalformedTokenStream(format!(
                    "word {word:#010x} listed twice in dictionary"
                )));
            }
            dict.tokenize(word)?;
        }
        Ok(dict)
    }

    /// Existing ID of `word`, or the next free one.
    pub fn tokenize(&mut self, word: u32) -> Result<TokenId> {
        if let Some(&id) = self.ids.get(&word) {
            return Ok(id);
        }
        if self.next_id > TokenId::MAX as u32 {
            return Err(PixelRtsError::TokenSpaceExhausted);
        }
        let id = self.next_id as TokenId;
        self.next_id += 1;
        self.ids.insert(word, id);
        self.words.push(word);
        Ok(id)
    }

    pub fn lookup(&self, word: u32) -> Option<TokenId> {
        self.ids.get(&word).copied()
    }

    pub fn resolve(&self, id: TokenId) -> Option<u32> {
        if id == 0 {
            return None;
        }
        self.words.get(id as usize - 1).copied()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words in token order: entry `i` belongs to token `i + 1`
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u32> {
        self.words
    }
}

/// Turns instruction streams into annotated token pixels
#[derive(Clone, Debug, Default)]
pub struct SemanticTokenizer {
    dictionary: TokenDictionary,
}

impl SemanticTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, word: u32) -> Category {
        classify(word)
    }

    pub fn tokenize(&mut self, word: u32) -> Result<TokenId> {
        self.dictionary.tokenize(word)
    }

    /// Encode one word as its 4-byte token pixel.
    pub fn token_pixel(&mut self, word: u32) -> Result<[u8; 4]> {
        let id = self.tokenize(word)?;
        let [hi, lo] = id.to_be_bytes();
        Ok([classify(word).index(), hi, lo, TOKEN_MARKER])
    }

    /// Tokenize a little-endian word stream. A trailing partial word is zero
    /// padded.
    pub fn tokenize_stream(&mut self, program: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(program.len().next_multiple_of(WORD_BYTES));
        for chunk in program.chunks(WORD_BYTES) {
            let mut raw = [0u8; WORD_BYTES];
            raw[..chunk.len()].copy_from_slice(chunk);
            out.extend_from_slice(&self.token_pixel(u32::from_le_bytes(raw))?);
        }
        debug!(
            words = out.len() / WORD_BYTES,
            distinct = self.dictionary.len(),
            "tokenized program"
        );
        Ok(out)
    }

    pub fn dictionary(&self) -> &TokenDictionary {
        &self.dictionary
    }

    pub fn into_dictionary(self) -> TokenDictionary {
        self.dictionary
    }
}

/// Rebuild the original program bytes from a token stream.
pub fn detokenize(stream: &[u8], instructions: &[u32], source_len: u64) -> Result<Vec<u8>> {
    if stream.len() % WORD_BYTES != 0 {
        return Err(PixelRtsError::MalformedTokenStream(format!(
            "length {} is not a multiple of {WORD_BYTES}",
            stream.len()
        )));
    }
    let dictionary = TokenDictionary::from_words(instructions.to_vec())?;
    let mut out = Vec::with_capacity(stream.len());
    for (i, px) in stream.chunks_exact(WORD_BYTES).enumerate() {
        if px[3] != TOKEN_MARKER {
            return Err(PixelRtsError::MalformedTokenStream(format!(
                "token {i} has marker {:#04x}",
                px[3]
            )));
        }
        let id = TokenId::from_be_bytes([px[1], px[2]]);
        let word = dictionary.resolve(id).ok_or(PixelRtsError::UnknownToken(id))?;
        if classify(word).index() != px[0] {
            return Err(PixelRtsError::MalformedTokenStream(format!(
                "token {i} category {} does not match word {word:#010x}",
                px[0]
            )));
        }
        out.extend_from_slice(&word.to_le_bytes());
    }
    if source_len > out.len() as u64 {
        return Err(PixelRtsError::MalformedTokenStream(format!(
            "stream holds {} bytes, program needs {source_len}",
            out.len()
        )));
    }
    out.truncate(source_len as usize);
    Ok(out)
}

/// Tokenize `program` and encode the token stream in code mode, even when
/// `encoder` is configured for dense packing.
///
/// The dictionary lands in `instructions` and a `source` segment records the
/// size and hash of the original program.
pub fn encode_program(
    encoder: &mut PixelRtsEncoder,
    program: &[u8],
    overrides: &MetadataOverrides,
) -> Result<EncodedContainer> {
    let (grid, meta) = encoder.pack_program(program, overrides)?;
    encoder.finish(&grid, meta)
}

/// [`encode_program`] and write the container plus sidecar.
pub fn save_program<P: AsRef<Path>>(
    encoder: &mut PixelRtsEncoder,
    program: &[u8],
    output_path: P,
    overrides: &MetadataOverrides,
) -> Result<EncodedContainer> {
    let encoded = encode_program(encoder, program, overrides)?;
    encoder.write_outputs(output_path.as_ref(), &encoded)?;
    Ok(encoded)
}

/// Decode a code-mode container back into the original program.
pub fn decode_program(decoder: &mut PixelRtsDecoder, container: &[u8]) -> Result<Vec<u8>> {
    let stream = decoder.decode(container, None)?;
    let meta = decoder.get_metadata().ok_or_else(|| {
        PixelRtsError::MalformedTokenStream("container carries no metadata".into())
    })?;
    if meta.encoding_mode != EncodingMode::Code {
        return Err(PixelRtsError::MalformedTokenStream(format!(
            "container is in {} mode",
            meta.encoding_mode
        )));
    }
    let instructions = meta.instructions.as_deref().ok_or_else(|| {
        PixelRtsError::MalformedTokenStream("no instruction dictionary in metadata".into())
    })?;
    let source = meta.segments.get(SOURCE_SEGMENT).ok_or_else(|| {
        PixelRtsError::MalformedTokenStream("no source segment in metadata".into())
    })?;

    let program = detokenize(&stream, instructions, source.size)?;
    check_hash(&program, &source.sha256)?;
    Ok(program)
}
