//! CLI interface for PixelRTS
//!
//! Provides command-line interface for:
//! - Converting binaries into `.rts.png` containers (dense or code mode)
//! - Extracting payloads back out, with optional hash verification
//! - Inspecting container metadata, Hilbert traces and entropy heatmaps
//! - Checking Hilbert curve locality

use crate::analysis::{self, ContainerReport};
use crate::codec::{PixelRtsDecoder, PixelRtsEncoder};
use crate::config::{EncodeOptions, StreamConfig};
use crate::container::{self, write_atomic};
use crate::hilbert::{self, MAX_ORDER};
use crate::metadata::{EncodingMode, Metadata, MetadataOverrides, Segment};
use crate::streaming::StreamingCodec;
use crate::tokenizer;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pixelrts")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Store binaries as Hilbert-ordered RGBA images")]
#[command(
    long_about = "PixelRTS - binary to image serialization\n\n\
    PixelRTS packs arbitrary bytes into a square power-of-two RGBA PNG, laying\n\
    consecutive bytes along a Hilbert curve so neighbouring data stays visually\n\
    adjacent. Metadata (size, SHA-256, content description) travels inside the\n\
    PNG and in a <output>.meta.json sidecar.\n\n\
    Key Features:\n\
    • Exact round trip with SHA-256 verification\n\
    • Code mode: RV32 instruction streams tokenized and colour coded by category\n\
    • Streaming conversion of large files through mmap\n\
    • Trace and entropy views of container layout\n\n\
    Examples:\n\
      pixelrts convert kernel.bin kernel.rts.png --type kernel --name linux -v\n\
      pixelrts extract kernel.rts.png -o kernel.bin --verify\n\
      pixelrts info kernel.rts.png --json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a binary file into a PixelRTS container
    #[command(
        long_about = "Convert a binary file into a PixelRTS container\n\n\
        The grid side is the smallest power of two whose N×N RGBA pixels hold\n\
        the input, unless --grid-size is given. In code mode the input is read\n\
        as little-endian 32-bit instruction words and tokenized first; the\n\
        token dictionary is stored in the metadata.\n\n\
        Example:\n\
          pixelrts convert vmlinuz vmlinuz.rts.png --type kernel --version 6.1\n\
          pixelrts convert firmware.bin fw.rts.png --mode code\n\
          pixelrts convert disk.img disk.rts.png --streaming --chunk-size 16777216"
    )]
    Convert {
        /// Input binary file
        #[arg(value_name = "INPUT", help_heading = "Required")]
        input: PathBuf,

        /// Output container (.rts.png)
        #[arg(value_name = "OUTPUT", help_heading = "Required")]
        output: PathBuf,

        /// Content type recorded in metadata (e.g. kernel, os, wasm)
        #[arg(long = "type", value_name = "TYPE")]
        content_type: Option<String>,

        /// Content name; also names the segment describing the input
        #[arg(long)]
        name: Option<String>,

        /// Content version
        #[arg(long = "version", value_name = "VERSION")]
        content_version: Option<String>,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,

        /// Explicit grid side (power of two, large enough for the input)
        #[arg(long, value_name = "N")]
        grid_size: Option<u32>,

        /// Payload preparation
        #[arg(long, value_enum, default_value_t = EncodingMode::Dense)]
        mode: EncodingMode,

        /// Do not write <OUTPUT>.meta.json
        #[arg(long)]
        no_sidecar: bool,

        /// Map the input instead of reading it into memory
        #[arg(long)]
        streaming: bool,

        /// Bytes hashed per step when streaming
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<usize>,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Extract the payload from a PixelRTS container
    #[command(
        long_about = "Extract the payload from a PixelRTS container\n\n\
        Metadata is taken from <INPUT>.meta.json when present, otherwise from\n\
        the PNG itself. Code-mode containers are detokenized back into the\n\
        original program and checked against its recorded hash.\n\n\
        Example:\n\
          pixelrts extract kernel.rts.png -o kernel.bin --verify"
    )]
    Extract {
        /// Container to read
        #[arg(value_name = "INPUT", help_heading = "Required")]
        input: PathBuf,

        /// Output file (default: <INPUT>.extracted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Check the payload SHA-256 against the metadata
        #[arg(long)]
        verify: bool,

        /// Write decoded bytes straight to the output file
        #[arg(long)]
        streaming: bool,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show container metadata, capacity and usage
    Info {
        /// Container to inspect
        #[arg(value_name = "INPUT", help_heading = "Required")]
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dump the Hilbert trace of a container's payload as JSON
    Trace {
        /// Container to trace
        #[arg(value_name = "INPUT", help_heading = "Required")]
        input: PathBuf,

        /// Write the trace here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print container statistics and optionally render analysis images
    #[command(
        long_about = "Print container statistics and optionally render analysis images\n\n\
        --visualize paints the payload bytes along the curve (opaque).\n\
        --entropy paints windowed byte entropy, blue for low and red for high.\n\
        Without a path the images go to <INPUT>_viz.png and <INPUT>_entropy.png.\n\n\
        Example:\n\
          pixelrts analyze kernel.rts.png --visualize --entropy heat.png"
    )]
    Analyze {
        /// Container to analyze
        #[arg(value_name = "INPUT", help_heading = "Required")]
        input: PathBuf,

        /// Render the payload along the curve
        #[arg(long, value_name = "PNG", num_args = 0..=1)]
        visualize: Option<Option<PathBuf>>,

        /// Render a windowed-entropy heatmap
        #[arg(long, value_name = "PNG", num_args = 0..=1)]
        entropy: Option<Option<PathBuf>>,
    },

    /// Check Hilbert curve locality for an order
    Locality {
        /// Curve order (grid side 2^order)
        #[arg(long, value_name = "K")]
        order: u32,

        /// Random adjacent pairs to measure
        #[arg(long, default_value_t = 1000)]
        samples: usize,

        /// Seed for pair sampling
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Skip the exhaustive continuity walk
        #[arg(long)]
        skip_exhaustive: bool,
    },
}

impl Cli {
    /// Whether the chosen subcommand asked for verbose output
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Convert { verbose, .. } | Commands::Extract { verbose, .. } => *verbose,
            _ => false,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = OsString::from(path.as_os_str());
    os.push(suffix);
    PathBuf::from(os)
}

/// Segment describing the whole input file, hashed without loading it.
fn describe_file(path: &Path) -> Result<Segment> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)?;
    Ok(Segment {
        offset: 0,
        size,
        sha256: format!("{:x}", hasher.finalize()),
        kind: None,
    })
}

fn segment_name(name: Option<&str>, input: &Path) -> String {
    name.map(str::to_string)
        .or_else(|| input.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "data".to_string())
}

fn load_payload(input: &Path) -> Result<(Vec<u8>, Option<Metadata>)> {
    let mut decoder = PixelRtsDecoder::new();
    let data = decoder
        .load(input, false)
        .with_context(|| format!("decoding {}", input.display()))?;
    Ok((data, decoder.get_metadata().cloned()))
}

fn print_metadata(meta: &Metadata) {
    println!("  Grid: {0}x{0}", meta.grid_size);
    println!("  Mode: {}", meta.encoding_mode);
    println!("  Data size: {} bytes", meta.data_size);
    println!("  SHA-256: {}", meta.data_hash);
}

fn print_descriptors(meta: &Metadata) {
    if let Some(t) = &meta.content_type {
        println!("  Type: {t}");
    }
    if let Some(n) = &meta.name {
        println!("  Name: {n}");
    }
    if let Some(v) = &meta.content_version {
        println!("  Version: {v}");
    }
    if let Some(d) = &meta.description {
        println!("  Description: {d}");
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Convert {
            input,
            output,
            content_type,
            name,
            content_version,
            description,
            grid_size,
            mode,
            no_sidecar,
            streaming,
            chunk_size,
            verbose,
        } => {
            if verbose {
                println!("PixelRTS v{} - Convert", env!("CARGO_PKG_VERSION"));
                println!("=========================");
            }

            let options = EncodeOptions {
                mode,
                grid_size,
                write_sidecar: !no_sidecar,
                embed_metadata: true,
            };
            let mut overrides = MetadataOverrides {
                content_type,
                name: name.clone(),
                version: content_version,
                description,
                ..MetadataOverrides::default()
            };
            let segment = segment_name(name.as_deref(), &input);

            let meta = if streaming {
                overrides = overrides.with_segment(segment, describe_file(&input)?);
                let mut config = StreamConfig::default();
                if let Some(chunk) = chunk_size {
                    config.chunk_hint = chunk;
                }
                StreamingCodec::new(options, config)
                    .encode_file(&input, &output, None, &overrides)
                    .with_context(|| format!("converting {}", input.display()))?
            } else {
                let data =
                    fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
                overrides = overrides.with_segment(segment, Segment::describe(0, &data));
                let mut encoder = PixelRtsEncoder::new(options);
                match mode {
                    EncodingMode::Dense => encoder.save(&data, &output, &overrides)?,
                    EncodingMode::Code => {
                        tokenizer::save_program(&mut encoder, &data, &output, &overrides)?.metadata
                    }
                }
            };

            println!("Wrote {}", output.display());
            if verbose {
                print_metadata(&meta);
                println!("  Usage: {:.2}%", meta.usage_percent());
                if !no_sidecar {
                    println!("  Sidecar: {}", with_suffix(&output, ".meta.json").display());
                }
            }
            Ok(())
        }

        Commands::Extract {
            input,
            output,
            verify,
            streaming,
            verbose,
        } => {
            if verbose {
                println!("PixelRTS v{} - Extract", env!("CARGO_PKG_VERSION"));
                println!("=========================");
            }

            let output = output.unwrap_or_else(|| with_suffix(&input, ".extracted"));
            let mode = PixelRtsDecoder::peek_metadata(&input)
                .with_context(|| format!("reading metadata of {}", input.display()))?
                .map(|m| m.encoding_mode)
                .unwrap_or_default();

            let written = match mode {
                EncodingMode::Code => {
                    let mut decoder = PixelRtsDecoder::new();
                    if let Some(sidecar) = Metadata::load_sidecar(&input)? {
                        decoder.set_metadata(sidecar);
                    }
                    let bytes = fs::read(&input)?;
                    let program = tokenizer::decode_program(&mut decoder, &bytes)
                        .with_context(|| format!("decoding program in {}", input.display()))?;
                    write_atomic(&output, |w| Ok(w.write_all(&program)?))?;
                    program.len() as u64
                }
                EncodingMode::Dense if streaming => {
                    StreamingCodec::default()
                        .decode_file(&input, &output, verify)
                        .with_context(|| format!("extracting {}", input.display()))?
                        .bytes_written
                }
                EncodingMode::Dense => {
                    let data = PixelRtsDecoder::new()
                        .load(&input, verify)
                        .with_context(|| format!("extracting {}", input.display()))?;
                    write_atomic(&output, |w| Ok(w.write_all(&data)?))?;
                    data.len() as u64
                }
            };

            println!("Extracted {} bytes to {}", written, output.display());
            if verbose && (verify || mode == EncodingMode::Code) {
                println!("  Hash verified");
            }
            Ok(())
        }

        Commands::Info { input, json } => {
            let meta = PixelRtsDecoder::info(&input)
                .with_context(|| format!("reading metadata of {}", input.display()))?;
            let report = ContainerReport::from_metadata(meta);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            let meta = &report.metadata;
            println!("Container: {}", input.display());
            println!("  Format: {} (v{})", meta.format, meta.format_version);
            print_metadata(meta);
            println!("  Capacity: {} bytes", report.capacity);
            println!("  Usage: {:.2}%", report.usage_percent);
            print_descriptors(meta);
            if let Some(words) = &meta.instructions {
                println!("  Distinct instructions: {}", words.len());
            }
            for (name, seg) in &meta.segments {
                println!(
                    "  Segment {name}: offset {} size {} sha256 {}",
                    seg.offset, seg.size, seg.sha256
                );
            }
            Ok(())
        }

        Commands::Trace { input, output } => {
            let (data, meta) = load_payload(&input)?;
            let trace = analysis::hilbert_trace(&data, meta.map(|m| m.grid_size))?;
            let json = serde_json::to_string_pretty(&trace)?;

            match output {
                Some(path) => {
                    write_atomic(&path, |w| Ok(w.write_all(json.as_bytes())?))?;
                    println!(
                        "Wrote {} trace points to {}",
                        trace.stats.total_points,
                        path.display()
                    );
                }
                None => println!("{json}"),
            }
            Ok(())
        }

        Commands::Analyze {
            input,
            visualize,
            entropy,
        } => {
            let meta = PixelRtsDecoder::peek_metadata(&input)
                .with_context(|| format!("reading metadata of {}", input.display()))?;

            println!("PixelRTS Container Analysis");
            println!("===========================");
            println!("File: {}", input.display());
            match &meta {
                Some(meta) => {
                    let report = ContainerReport::from_metadata(meta.clone());
                    println!("  Format: {} (v{})", meta.format, meta.format_version);
                    print_metadata(meta);
                    print_descriptors(meta);
                    println!("  Capacity: {} bytes", report.capacity);
                    println!("  Usage: {:.2}%", report.usage_percent);
                }
                None => println!("  No metadata found"),
            }

            if visualize.is_none() && entropy.is_none() {
                return Ok(());
            }
            let (data, _) = load_payload(&input)?;

            if let Some(path) = visualize {
                let path = path.unwrap_or_else(|| with_suffix(&input, "_viz.png"));
                let image = analysis::visualize(&data, meta.as_ref().map(|m| m.grid_size))?;
                write_atomic(&path, |w| container::write_png(w, &image, None))?;
                println!("Wrote {0}x{0} visualization to {1}", image.size(), path.display());
            }
            if let Some(path) = entropy {
                let path = path.unwrap_or_else(|| with_suffix(&input, "_entropy.png"));
                let heatmap = analysis::entropy_heatmap(&data)?;
                write_atomic(&path, |w| container::write_png(w, &heatmap, None))?;
                println!(
                    "Wrote {0}x{0} entropy heatmap to {1} (window {2} bytes)",
                    heatmap.size(),
                    path.display(),
                    analysis::entropy_window(data.len())
                );
            }
            Ok(())
        }

        Commands::Locality {
            order,
            samples,
            seed,
            skip_exhaustive,
        } => {
            if order > MAX_ORDER {
                bail!("order {order} exceeds maximum {MAX_ORDER}");
            }
            let assumed = hilbert::assumed_locality(order);
            let measured = hilbert::measured_locality(order, samples, seed)?;

            println!("Hilbert order {order} ({0}x{0} grid)", 1u64 << order);
            println!(
                "  Assumed:  mean {:.4}  max {:.4}  efficiency {:.4}",
                assumed.mean_distance, assumed.max_distance, assumed.efficiency
            );
            println!(
                "  Measured: mean {:.4}  max {:.4}  variance {:.6}  efficiency {:.4}  ({} samples)",
                measured.mean_distance,
                measured.max_distance,
                measured.variance,
                measured.efficiency,
                measured.samples
            );

            if skip_exhaustive {
                return Ok(());
            }
            match hilbert::find_discontinuity(order)? {
                Some(d) => bail!("curve breaks between index {d} and {}", d + 1),
                None => println!("  Exhaustive walk: continuous"),
            }
            Ok(())
        }
    }
}
