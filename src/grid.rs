//! Grid sizing and the RGBA pixel raster

use crate::error::{PixelRtsError, Result};

/// Bytes carried by one RGBA pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Pixels needed to carry `data_size` bytes.
pub fn pixels_needed(data_size: u64) -> u64 {
    data_size.div_ceil(BYTES_PER_PIXEL as u64)
}

/// Smallest `s` with `s * s >= n`.
fn ceil_sqrt(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut s = (n as f64).sqrt() as u64;
    while (s as u128) * (s as u128) < n as u128 {
        s += 1;
    }
    while s > 0 && ((s - 1) as u128) * ((s - 1) as u128) >= n as u128 {
        s -= 1;
    }
    s
}

/// Minimal power-of-two grid side able to hold `data_size` bytes.
///
/// # Examples
///
/// ```
/// use pixelrts::grid::grid_size_for;
///
/// assert_eq!(grid_size_for(0), 1);
/// assert_eq!(grid_size_for(16), 2);
/// assert_eq!(grid_size_for(1024), 16);
/// ```
pub fn grid_size_for(data_size: u64) -> u32 {
    let side = ceil_sqrt(pixels_needed(data_size)).max(1);
    // ceil(sqrt(2^62)) = 2^31, so the power of two always fits in u32
    side.next_power_of_two() as u32
}

/// Total payload capacity of a grid in bytes (`N² · 4`), saturating at
/// `u64::MAX` for the 2^31 side.
pub fn capacity_of(grid_size: u32) -> u64 {
    let pixels = (grid_size as u64) * (grid_size as u64);
    pixels.saturating_mul(BYTES_PER_PIXEL as u64)
}

/// Check an explicitly requested grid side against a payload size.
pub fn validate_grid_size(grid_size: u32, data_size: u64) -> Result<()> {
    if grid_size == 0 || !grid_size.is_power_of_two() {
        return Err(PixelRtsError::InvalidGridSize {
            grid_size,
            reason: "must be a power of two".into(),
        });
    }
    let capacity = capacity_of(grid_size);
    if data_size > capacity {
        return Err(PixelRtsError::InvalidGridSize {
            grid_size,
            reason: format!("holds {capacity} bytes, payload is {data_size}"),
        });
    }
    Ok(())
}

/// Square RGBA8 raster, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    size: u32,
    pixels: Vec<u8>,
}

impl PixelGrid {
    /// Zero-filled grid of side `size`.
    pub fn new(size: u32) -> Result<Self> {
        if size == 0 || !size.is_power_of_two() {
            return Err(PixelRtsError::InvalidGridSize {
                grid_size: size,
                reason: "must be a power of two".into(),
            });
        }
        let len = usize::try_from(capacity_of(size)).map_err(|_| PixelRtsError::OutOfRange {
            what: "grid bytes",
            value: capacity_of(size),
            limit: usize::MAX as u64,
        })?;
        Ok(PixelGrid {
            size,
            pixels: vec![0; len],
        })
    }

    /// Wrap an existing RGBA buffer.
    pub fn from_rgba(size: u32, pixels: Vec<u8>) -> Result<Self> {
        if size == 0 || !size.is_power_of_two() {
            return Err(PixelRtsError::MalformedContainer(format!(
                "grid side {size} is not a power of two"
            )));
        }
        if pixels.len() as u64 != capacity_of(size) {
            return Err(PixelRtsError::MalformedContainer(format!(
                "expected {} RGBA bytes for a {size}x{size} grid, got {}",
                capacity_of(size),
                pixels.len()
            )));
        }
        Ok(PixelGrid { size, pixels })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Hilbert order of the grid (`log2(size)`)
    pub fn order(&self) -> u32 {
        self.size.trailing_zeros()
    }

    pub fn capacity(&self) -> u64 {
        capacity_of(self.size)
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.size as usize + x as usize) * BYTES_PER_PIXEL
    }

    /// RGBA value at column `x`, row `y`. Panics outside the grid.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let o = self.offset(x, y);
        [
            self.pixels[o],
            self.pixels[o + 1],
            self.pixels[o + 2],
            self.pixels[o + 3],
        ]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let o = self.offset(x, y);
        self.pixels[o..o + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_size_table() {
        let table = [(0, 1), (4, 1), (5, 2), (16, 2), (17, 4), (64, 4), (256, 8), (1024, 16)];
        for (size, expected) in table {
            assert_eq!(grid_size_for(size), expected, "data_size {size}");
        }
    }

    #[test]
    fn test_grid_size_huge_payload() {
        assert_eq!(grid_size_for(4 << 40), 1 << 20);
        assert_eq!(grid_size_for(u64::MAX), 1 << 31);
    }

    #[test]
    fn test_ceil_sqrt_exact_squares() {
        for s in [1u64, 2, 3, 1000, 65_535, 1 << 31] {
            assert_eq!(ceil_sqrt(s * s), s);
            assert_eq!(ceil_sqrt(s * s + 1), s + 1);
        }
    }

    #[test]
    fn test_validate_grid_size() {
        assert!(validate_grid_size(4, 64).is_ok());
        assert!(matches!(
            validate_grid_size(3, 1),
            Err(PixelRtsError::InvalidGridSize { grid_size: 3, .. })
        ));
        assert!(validate_grid_size(0, 0).is_err());
        assert!(validate_grid_size(4, 65).is_err());
    }

    #[test]
    fn test_pixel_access() {
        let mut grid = PixelGrid::new(4).unwrap();
        grid.set_pixel(3, 1, [1, 2, 3, 4]);
        assert_eq!(grid.pixel(3, 1), [1, 2, 3, 4]);
        assert_eq!(&grid.as_rgba()[(4 + 3) * 4..(4 + 3) * 4 + 4], &[1, 2, 3, 4]);
        assert_eq!(grid.order(), 2);
        assert_eq!(grid.capacity(), 64);
    }

    #[test]
    fn test_from_rgba_rejects_wrong_length() {
        assert!(PixelGrid::from_rgba(2, vec![0; 15]).is_err());
        assert!(PixelGrid::from_rgba(3, vec![0; 36]).is_err());
        assert!(PixelGrid::from_rgba(2, vec![0; 16]).is_ok());
    }
}
