//! PNG container I/O
//!
//! A PixelRTS container is a square RGBA8 PNG. Metadata travels in an
//! uncompressed `tEXt` chunk keyed [`TEXT_KEYWORD`].

use crate::error::{PixelRtsError, Result};
use crate::grid::PixelGrid;
use crate::metadata::{Metadata, TEXT_KEYWORD};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A decoded container: pixels plus the embedded metadata, if any.
#[derive(Clone, Debug)]
pub struct Container {
    pub grid: PixelGrid,
    pub embedded: Option<Metadata>,
}

/// Serialize a grid as PNG, embedding `metadata` when given.
pub fn write_png<W: Write>(writer: W, grid: &PixelGrid, metadata: Option<&Metadata>) -> Result<()> {
    let mut encoder = png::Encoder::new(writer, grid.size(), grid.size());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    if let Some(meta) = metadata {
        let text = meta.to_embedded_text()?;
        if text.is_ascii() {
            encoder.add_text_chunk(TEXT_KEYWORD.to_string(), text)?;
        } else {
            encoder.add_itxt_chunk(TEXT_KEYWORD.to_string(), text)?;
        }
    }
    let mut png_writer = encoder.write_header()?;
    png_writer.write_image_data(grid.as_rgba())?;
    png_writer.finish()?;
    Ok(())
}

/// Encode a grid into an in-memory PNG.
pub fn encode_png(grid: &PixelGrid, metadata: Option<&Metadata>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_png(&mut out, grid, metadata)?;
    Ok(out)
}

/// Parse a PNG into a square power-of-two RGBA grid.
pub fn read_png<R: Read>(reader: R) -> Result<Container> {
    let mut decoder = png::Decoder::new(reader);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;

    let (width, height) = {
        let info = reader.info();
        (info.width, info.height)
    };
    if width != height {
        return Err(PixelRtsError::MalformedContainer(format!(
            "image must be square, got {width}x{height}"
        )));
    }
    if !width.is_power_of_two() {
        return Err(PixelRtsError::MalformedContainer(format!(
            "grid side {width} is not a power of two"
        )));
    }

    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf)?;
    buf.truncate(frame.buffer_size());
    let rgba = to_rgba8(buf, frame.color_type)?;

    let embedded = embedded_metadata(reader.info());

    debug!(grid_size = width, has_metadata = embedded.is_some(), "decoded container");
    Ok(Container {
        grid: PixelGrid::from_rgba(width, rgba)?,
        embedded,
    })
}

/// First readable `PixelRTS` text field of a PNG header.
fn embedded_metadata(info: &png::Info) -> Option<Metadata> {
    let latin1 = info
        .uncompressed_latin1_text
        .iter()
        .filter(|c| c.keyword == TEXT_KEYWORD)
        .map(|c| c.text.clone());
    let utf8 = info
        .utf8_text
        .iter()
        .filter(|c| c.keyword == TEXT_KEYWORD)
        .filter_map(|c| c.get_text().ok());

    for text in latin1.chain(utf8) {
        match Metadata::from_embedded_text(&text) {
            Ok(meta) => return Some(meta),
            Err(e) => warn!("ignoring unreadable embedded metadata: {e}"),
        }
    }
    None
}

/// Embedded metadata of a PNG file, read from the chunks ahead of the image
/// data without decoding any pixels.
pub fn read_png_metadata<P: AsRef<Path>>(path: P) -> Result<Option<Metadata>> {
    let decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    let reader = decoder.read_info()?;
    Ok(embedded_metadata(reader.info()))
}

/// Parse an in-memory PNG.
pub fn decode_png(bytes: &[u8]) -> Result<Container> {
    read_png(bytes)
}

/// Open and parse a PNG file.
pub fn read_png_file<P: AsRef<Path>>(path: P) -> Result<Container> {
    read_png(BufReader::new(File::open(path)?))
}

/// Expand any 8-bit colour layout to RGBA. Missing alpha becomes opaque.
fn to_rgba8(buf: Vec<u8>, color: png::ColorType) -> Result<Vec<u8>> {
    use png::ColorType;
    let rgba = match color {
        ColorType::Rgba => buf,
        ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        ColorType::Indexed => {
            return Err(PixelRtsError::MalformedContainer(
                "indexed colour was not expanded".into(),
            ))
        }
    };
    Ok(rgba)
}

/// Write `path` through a temp file in the same directory, renamed into
/// place only after `write` succeeds.
pub fn write_atomic<P, F>(path: P, write: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        write(&mut out)?;
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EncodingMode;

    fn sample_grid() -> PixelGrid {
        let mut grid = PixelGrid::new(4).unwrap();
        grid.set_pixel(0, 0, [1, 2, 3, 4]);
        grid.set_pixel(3, 3, [255, 0, 128, 0]);
        grid
    }

    #[test]
    fn test_png_round_trip_with_metadata() {
        let grid = sample_grid();
        let meta = Metadata::new(4, EncodingMode::Dense, b"xyz");
        let bytes = encode_png(&grid, Some(&meta)).unwrap();
        let container = decode_png(&bytes).unwrap();
        assert_eq!(container.grid, grid);
        assert_eq!(container.embedded, Some(meta));
    }

    #[test]
    fn test_header_metadata_without_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.png");
        let meta = Metadata::new(4, EncodingMode::Code, b"xyz");
        std::fs::write(&path, encode_png(&sample_grid(), Some(&meta)).unwrap()).unwrap();
        assert_eq!(read_png_metadata(&path).unwrap(), Some(meta));

        std::fs::write(&path, encode_png(&sample_grid(), None).unwrap()).unwrap();
        assert_eq!(read_png_metadata(&path).unwrap(), None);

        std::fs::write(&path, b"junk").unwrap();
        assert!(read_png_metadata(&path).is_err());
    }

    #[test]
    fn test_non_ascii_metadata_survives() {
        let grid = sample_grid();
        let mut meta = Metadata::new(4, EncodingMode::Dense, b"xyz");
        meta.name = Some("noyau-µ".into());
        let container = decode_png(&encode_png(&grid, Some(&meta)).unwrap()).unwrap();
        assert_eq!(container.embedded, Some(meta));
    }

    #[test]
    fn test_png_without_metadata() {
        let bytes = encode_png(&sample_grid(), None).unwrap();
        assert!(decode_png(&bytes).unwrap().embedded.is_none());
    }

    #[test]
    fn test_rejects_non_square() {
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, 4, 2);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0u8; 32]).unwrap();
        writer.finish().unwrap();

        assert!(matches!(
            decode_png(&out),
            Err(PixelRtsError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_rgb_input_gets_opaque_alpha() {
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, 2, 2);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[9u8; 12]).unwrap();
        writer.finish().unwrap();

        let container = decode_png(&out).unwrap();
        assert_eq!(container.grid.pixel(1, 1), [9, 9, 9, 255]);
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decode_png(b"definitely not a png"),
            Err(PixelRtsError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_write_atomic_leaves_nothing_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let result = write_atomic(&target, |w| {
            w.write_all(b"partial")?;
            Err(PixelRtsError::MalformedContainer("boom".into()))
        });
        assert!(result.is_err());
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        write_atomic(&target, |w| Ok(w.write_all(b"done")?)).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"done");
    }
}
