//! Container inspection
//!
//! - [`ContainerReport`]: capacity and usage derived from metadata
//! - [`hilbert_trace`]: the curve position of every payload pixel
//! - [`entropy_heatmap`]: windowed byte entropy painted along the curve
//! - [`visualize`]: payload bytes painted along the curve, fully opaque

use crate::error::Result;
use crate::grid::{self, pixels_needed, PixelGrid, BYTES_PER_PIXEL};
use crate::hilbert::lut_for;
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};

/// Largest window used by [`entropy_heatmap`]
pub const MAX_ENTROPY_WINDOW: usize = 256;

/// Summary printed by `info`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerReport {
    pub metadata: Metadata,
    /// Payload capacity of the grid in bytes
    pub capacity: u64,
    pub pixels_used: u64,
    pub usage_percent: f64,
}

impl ContainerReport {
    pub fn from_metadata(metadata: Metadata) -> Self {
        ContainerReport {
            capacity: metadata.capacity(),
            pixels_used: pixels_needed(metadata.data_size),
            usage_percent: metadata.usage_percent(),
            metadata,
        }
    }
}

/// One payload pixel on the curve
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracePoint {
    pub x: u32,
    pub y: u32,
    /// Curve index `d`
    pub index: u64,
    /// First payload byte stored in the pixel
    pub byte_value: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceStats {
    pub total_points: u64,
    pub data_size: u64,
    pub unique_bytes: u32,
    /// Distinct byte values over payload length; 0 for an empty payload
    pub entropy_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HilbertTrace {
    pub grid_size: u32,
    pub points: Vec<TracePoint>,
    pub stats: TraceStats,
}

/// Trace `data` along the curve of a `grid_size` grid.
///
/// Pass the container's own grid size to follow the layout the codec used;
/// `None` sizes the grid from the payload.
pub fn hilbert_trace(data: &[u8], grid_size: Option<u32>) -> Result<HilbertTrace> {
    let data_size = data.len() as u64;
    let grid_size = match grid_size {
        Some(size) => {
            grid::validate_grid_size(size, data_size)?;
            size
        }
        None => grid::grid_size_for(data_size),
    };
    let lut = lut_for(grid_size.trailing_zeros())?;

    let points: Vec<TracePoint> = data
        .chunks(BYTES_PER_PIXEL)
        .enumerate()
        .map(|(d, px)| {
            let (x, y) = lut[d];
            TracePoint {
                x,
                y,
                index: d as u64,
                byte_value: px[0],
            }
        })
        .collect();

    let mut seen = [false; 256];
    for &b in data {
        seen[b as usize] = true;
    }
    let unique_bytes = seen.iter().filter(|&&s| s).count() as u32;
    let entropy_score = if data.is_empty() {
        0.0
    } else {
        unique_bytes as f64 / data.len() as f64
    };

    Ok(HilbertTrace {
        grid_size,
        stats: TraceStats {
            total_points: points.len() as u64,
            data_size,
            unique_bytes,
            entropy_score,
        },
        points,
    })
}

/// Shannon entropy of `window` in bits per byte (0.0 ..= 8.0).
pub fn shannon_entropy(window: &[u8]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for &b in window {
        counts[b as usize] += 1;
    }
    let len = window.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Window size for a payload of `len` bytes: a tenth of it, within 1..=256
pub fn entropy_window(len: usize) -> usize {
    (len / 10).clamp(1, MAX_ENTROPY_WINDOW)
}

/// Paint windowed entropy along the curve.
///
/// Pixel `d` is coloured by the entropy of the window starting at byte `4d`:
/// `[e, 0, 255 - e, 255]` with `e` the entropy scaled to `0..=255`. Low
/// entropy shows blue, high entropy red. Pixels past the payload stay
/// transparent black.
pub fn entropy_heatmap(data: &[u8]) -> Result<PixelGrid> {
    let grid_size = grid::grid_size_for(data.len() as u64);
    let mut grid = PixelGrid::new(grid_size)?;
    let lut = lut_for(grid.order())?;
    let window = entropy_window(data.len());

    for d in 0..pixels_needed(data.len() as u64) as usize {
        let start = d * BYTES_PER_PIXEL;
        let end = (start + window).min(data.len());
        let e = (shannon_entropy(&data[start..end]) / 8.0 * 255.0).round() as u8;
        let (x, y) = lut[d];
        grid.set_pixel(x, y, [e, 0, 255 - e, 255]);
    }
    Ok(grid)
}

/// Paint the payload along the curve of a `grid_size` grid (`None` sizes it
/// from the payload). Colour channels carry the payload bytes as the codec
/// lays them out; alpha is always 255 so every payload pixel is visible.
pub fn visualize(data: &[u8], grid_size: Option<u32>) -> Result<PixelGrid> {
    let grid_size = match grid_size {
        Some(size) => {
            grid::validate_grid_size(size, data.len() as u64)?;
            size
        }
        None => grid::grid_size_for(data.len() as u64),
    };
    let mut grid = PixelGrid::new(grid_size)?;
    let lut = lut_for(grid.order())?;

    for (d, px) in data.chunks(BYTES_PER_PIXEL).enumerate() {
        let mut rgba = [0, 0, 0, 255];
        let rgb = px.len().min(3);
        rgba[..rgb].copy_from_slice(&px[..rgb]);
        let (x, y) = lut[d];
        grid.set_pixel(x, y, rgba);
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::index_to_coord;
    use crate::metadata::EncodingMode;

    #[test]
    fn test_report_usage() {
        let meta = Metadata::new(4, EncodingMode::Dense, &[0u8; 16]);
        let report = ContainerReport::from_metadata(meta);
        assert_eq!(report.capacity, 64);
        assert_eq!(report.pixels_used, 4);
        assert!((report.usage_percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_trace_points_follow_curve() {
        let data: Vec<u8> = (0..10).collect();
        let trace = hilbert_trace(&data, None).unwrap();
        assert_eq!(trace.grid_size, 2);
        assert_eq!(trace.points.len(), 3);
        for p in &trace.points {
            assert_eq!(index_to_coord(1, p.index).unwrap(), (p.x, p.y));
            assert_eq!(p.byte_value, (p.index * 4) as u8);
        }
        assert_eq!(trace.stats.unique_bytes, 10);
        assert_eq!(trace.stats.entropy_score, 1.0);
    }

    #[test]
    fn test_trace_empty_and_explicit_grid() {
        let trace = hilbert_trace(&[], None).unwrap();
        assert!(trace.points.is_empty());
        assert_eq!(trace.stats.entropy_score, 0.0);

        let trace = hilbert_trace(b"aaaa", Some(8)).unwrap();
        assert_eq!(trace.grid_size, 8);
        assert_eq!(trace.stats.unique_bytes, 1);
        assert!(hilbert_trace(&[0u8; 20], Some(2)).is_err());
    }

    #[test]
    fn test_shannon_entropy_bounds() {
        assert_eq!(shannon_entropy(&[]), 0.0);
        assert_eq!(shannon_entropy(&[7; 64]), 0.0);
        let all: Vec<u8> = (0..=255).collect();
        assert!((shannon_entropy(&all) - 8.0).abs() < 1e-9);
        assert!((shannon_entropy(&[0, 1]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_window_clamped() {
        assert_eq!(entropy_window(0), 1);
        assert_eq!(entropy_window(50), 5);
        assert_eq!(entropy_window(1 << 20), MAX_ENTROPY_WINDOW);
    }

    #[test]
    fn test_heatmap_colours() {
        let data = vec![0u8; 64];
        let grid = entropy_heatmap(&data).unwrap();
        assert_eq!(grid.size(), 4);
        let (x, y) = index_to_coord(2, 0).unwrap();
        assert_eq!(grid.pixel(x, y), [0, 0, 255, 255]);

        let noisy: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let grid = entropy_heatmap(&noisy).unwrap();
        let (x, y) = index_to_coord(grid.order(), 0).unwrap();
        assert_eq!(grid.pixel(x, y), [255, 0, 0, 255]);
    }

    #[test]
    fn test_visualize_is_opaque_on_payload() {
        let data = [1u8, 2, 3, 0, 9];
        let grid = visualize(&data, Some(4)).unwrap();
        assert_eq!(grid.size(), 4);
        let (x, y) = index_to_coord(2, 0).unwrap();
        assert_eq!(grid.pixel(x, y), [1, 2, 3, 255]);
        let (x, y) = index_to_coord(2, 1).unwrap();
        assert_eq!(grid.pixel(x, y), [9, 0, 0, 255]);
        let (x, y) = index_to_coord(2, 2).unwrap();
        assert_eq!(grid.pixel(x, y), [0, 0, 0, 0]);

        assert_eq!(visualize(&[7u8; 10], None).unwrap().size(), 2);
        assert!(visualize(&[0u8; 20], Some(2)).is_err());
    }
}
