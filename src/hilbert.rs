//! Hilbert space-filling curve
//!
//! Bijective mapping between a linear pixel index and 2D grid coordinates on
//! an `N×N` grid, `N = 2^order`:
//! - Iterative bit-pair walk with quadrant rotate/reflect
//! - Forward lookup tables, cached per order
//! - Locality diagnostics (assumed and measured)
//!
//! Coordinates are reported column-first (`x` is the image column), which is
//! the orientation PixelRTS v2 containers have always been written in.

use crate::error::{PixelRtsError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Largest supported curve order. `4^31` indices still fit in a `u64`.
pub const MAX_ORDER: u32 = 31;

/// Orders whose lookup tables are kept in the process-wide cache.
///
/// Order 12 is a 4096×4096 grid (16M entries, 128 MiB of coordinates). Larger
/// tables are built on demand and dropped with their last user.
pub const CACHED_ORDERS: u32 = 12;

/// Number of indices on a curve of the given order.
pub fn point_count(order: u32) -> Result<u64> {
    check_order(order)?;
    Ok(1u64 << (2 * order))
}

/// Side length of the grid for a curve of the given order.
pub fn side_len(order: u32) -> Result<u32> {
    check_order(order)?;
    Ok(1u32 << order)
}

fn check_order(order: u32) -> Result<()> {
    if order > MAX_ORDER {
        return Err(PixelRtsError::OutOfRange {
            what: "curve order",
            value: order as u64,
            limit: MAX_ORDER as u64,
        });
    }
    Ok(())
}

/// Rotate/reflect a quadrant so sub-curves connect end to end.
#[inline]
fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Map a linear index to `(x, y)` without bounds checks. `d < 4^order`.
#[inline]
pub(crate) fn d2xy(order: u32, d: u64) -> (u32, u32) {
    let n = 1u64 << order;
    let (mut x, mut y) = (0u64, 0u64);
    let mut t = d;
    let mut s = 1u64;
    while s < n {
        let rx = 1 & (t >> 1);
        let ry = 1 & (t ^ rx);
        rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        t >>= 2;
        s <<= 1;
    }
    // Column-first orientation
    (y as u32, x as u32)
}

#[inline]
fn xy2d(order: u32, col: u32, row: u32) -> u64 {
    let n = 1u64 << order;
    // Undo the column-first swap applied in d2xy
    let (mut x, mut y) = (row as u64, col as u64);
    let mut d = 0u64;
    let mut s = n >> 1;
    while s > 0 {
        let rx = u64::from(x & s != 0);
        let ry = u64::from(y & s != 0);
        d += s * s * ((3 * rx) ^ ry);
        rotate(n, &mut x, &mut y, rx, ry);
        s >>= 1;
    }
    d
}

/// Convert a curve index into grid coordinates.
///
/// # Examples
///
/// ```
/// use pixelrts::hilbert::index_to_coord;
///
/// assert_eq!(index_to_coord(1, 0).unwrap(), (0, 0));
/// assert!(index_to_coord(1, 4).is_err());
/// ```
pub fn index_to_coord(order: u32, d: u64) -> Result<(u32, u32)> {
    let limit = point_count(order)?;
    if d >= limit {
        return Err(PixelRtsError::OutOfRange {
            what: "curve index",
            value: d,
            limit,
        });
    }
    Ok(d2xy(order, d))
}

/// Convert grid coordinates back into a curve index.
///
/// `index_to_coord(order, coord_to_index(order, x, y)?)? == (x, y)` for all
/// `x, y < 2^order`.
pub fn coord_to_index(order: u32, x: u32, y: u32) -> Result<u64> {
    let n = side_len(order)?;
    for (what, value) in [("x coordinate", x), ("y coordinate", y)] {
        if value >= n {
            return Err(PixelRtsError::OutOfRange {
                what,
                value: value as u64,
                limit: n as u64,
            });
        }
    }
    Ok(xy2d(order, x, y))
}

/// Forward lookup table for one curve order.
#[derive(Clone, Debug)]
pub struct HilbertLut {
    order: u32,
    coords: Vec<(u32, u32)>,
}

impl HilbertLut {
    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn side(&self) -> u32 {
        1u32 << self.order
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Coordinates of index `d`, or `None` past the end of the curve.
    pub fn get(&self, d: usize) -> Option<(u32, u32)> {
        self.coords.get(d).copied()
    }

    pub fn as_slice(&self) -> &[(u32, u32)] {
        &self.coords
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.coords.iter().copied()
    }
}

impl std::ops::Index<usize> for HilbertLut {
    type Output = (u32, u32);

    fn index(&self, d: usize) -> &Self::Output {
        &self.coords[d]
    }
}

/// Build the full forward table for `order`. O(N²) time and space.
pub fn generate_lut(order: u32) -> Result<HilbertLut> {
    let count = point_count(order)?;
    let count = usize::try_from(count).map_err(|_| PixelRtsError::OutOfRange {
        what: "lookup table size",
        value: count,
        limit: usize::MAX as u64,
    })?;

    debug!(order, entries = count, "generating Hilbert LUT");
    let coords = (0..count as u64).map(|d| d2xy(order, d)).collect();
    let lut = HilbertLut { order, coords };

    #[cfg(feature = "strict-curve")]
    if let Some(d) = lut_discontinuity(&lut) {
        panic!("Hilbert curve of order {order} is discontinuous at index {d}");
    }

    Ok(lut)
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: OnceLock<Arc<HilbertLut>> = OnceLock::new();
static LUT_CACHE: [OnceLock<Arc<HilbertLut>>; CACHED_ORDERS as usize + 1] =
    [EMPTY_SLOT; CACHED_ORDERS as usize + 1];

/// Shared lookup table for `order`.
///
/// Cached orders are built once and published; concurrent callers racing on
/// an empty slot all observe the single published table.
pub fn lut_for(order: u32) -> Result<Arc<HilbertLut>> {
    check_order(order)?;
    if order > CACHED_ORDERS {
        return generate_lut(order).map(Arc::new);
    }
    let slot = &LUT_CACHE[order as usize];
    if let Some(lut) = slot.get() {
        return Ok(Arc::clone(lut));
    }
    let built = Arc::new(generate_lut(order)?);
    Ok(Arc::clone(slot.get_or_init(|| built)))
}

// ============================================================================
// Locality diagnostics
// ============================================================================

/// Distance statistics between consecutive curve indices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalityReport {
    pub order: u32,
    pub mean_distance: f64,
    pub max_distance: f64,
    pub variance: f64,
    /// `1 / mean_distance`; 1.0 for a continuous curve
    pub efficiency: f64,
    /// Number of sampled pairs. Zero for the analytic report.
    pub samples: usize,
}

/// Analytic locality of a correctly constructed curve.
///
/// Does not look at the curve at all and therefore cannot detect a broken
/// implementation; use [`measured_locality`] or [`find_discontinuity`] for that.
pub fn assumed_locality(order: u32) -> LocalityReport {
    LocalityReport {
        order,
        mean_distance: 1.0,
        max_distance: 1.0,
        variance: 0.0,
        efficiency: 1.0,
        samples: 0,
    }
}

fn distance(a: (u32, u32), b: (u32, u32)) -> f64 {
    let dx = a.0 as f64 - b.0 as f64;
    let dy = a.1 as f64 - b.1 as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Empirical locality from `samples` random adjacent index pairs.
pub fn measured_locality(order: u32, samples: usize, seed: u64) -> Result<LocalityReport> {
    let count = point_count(order)?;
    if count < 2 || samples == 0 {
        return Ok(assumed_locality(order));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut distances = Vec::with_capacity(samples);
    for _ in 0..samples {
        let d = rng.gen_range(0..count - 1);
        distances.push(distance(d2xy(order, d), d2xy(order, d + 1)));
    }

    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    let max = distances.iter().copied().fold(0.0, f64::max);
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

    Ok(LocalityReport {
        order,
        mean_distance: mean,
        max_distance: max,
        variance,
        efficiency: if mean > 0.0 { 1.0 / mean } else { 0.0 },
        samples,
    })
}

/// Exhaustively walk the curve and return the first index whose successor is
/// not an orthogonal neighbour.
pub fn find_discontinuity(order: u32) -> Result<Option<u64>> {
    let count = point_count(order)?;
    let mut prev = d2xy(order, 0);
    for d in 1..count {
        let next = d2xy(order, d);
        if prev.0.abs_diff(next.0) + prev.1.abs_diff(next.1) != 1 {
            return Ok(Some(d - 1));
        }
        prev = next;
    }
    Ok(None)
}

#[cfg(feature = "strict-curve")]
fn lut_discontinuity(lut: &HilbertLut) -> Option<u64> {
    lut.as_slice()
        .windows(2)
        .position(|w| w[0].0.abs_diff(w[1].0) + w[0].1.abs_diff(w[1].1) != 1)
        .map(|d| d as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_order_one_layout() {
        let coords: Vec<_> = (0..4).map(|d| index_to_coord(1, d).unwrap()).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (1, 1), (0, 1)]);
    }

    #[test]
    fn test_order_zero_is_single_pixel() {
        assert_eq!(index_to_coord(0, 0).unwrap(), (0, 0));
        assert_eq!(coord_to_index(0, 0, 0).unwrap(), 0);
        assert!(index_to_coord(0, 1).is_err());
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            index_to_coord(2, 16),
            Err(PixelRtsError::OutOfRange { limit: 16, .. })
        ));
        assert!(matches!(
            coord_to_index(2, 4, 0),
            Err(PixelRtsError::OutOfRange { limit: 4, .. })
        ));
        assert!(coord_to_index(2, 0, 4).is_err());
        assert!(index_to_coord(MAX_ORDER + 1, 0).is_err());
    }

    #[test]
    fn test_lut_is_bijection() {
        for order in 0..=5 {
            let lut = generate_lut(order).unwrap();
            let unique: HashSet<_> = lut.iter().collect();
            assert_eq!(unique.len(), lut.len());
            for (d, &(x, y)) in lut.as_slice().iter().enumerate() {
                assert_eq!(coord_to_index(order, x, y).unwrap(), d as u64);
            }
        }
    }

    #[test]
    fn test_curve_is_continuous() {
        for order in 0..=7 {
            assert_eq!(find_discontinuity(order).unwrap(), None, "order {order}");
        }
    }

    #[test]
    fn test_lut_cache_shares_table() {
        let a = lut_for(4).unwrap();
        let b = lut_for(4).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 256);
    }

    #[test]
    fn test_measured_matches_assumed_for_correct_curve() {
        let measured = measured_locality(6, 500, 7).unwrap();
        assert_eq!(measured.samples, 500);
        assert!((measured.mean_distance - 1.0).abs() < 1e-12);
        assert_eq!(measured.max_distance, 1.0);
        assert_eq!(measured.variance, 0.0);
        assert_eq!(measured.efficiency, 1.0);

        let assumed = assumed_locality(6);
        assert_eq!(assumed.samples, 0);
        assert_eq!(assumed.mean_distance, measured.mean_distance);
    }

    #[test]
    fn test_measured_locality_degenerate_order() {
        let report = measured_locality(0, 100, 1).unwrap();
        assert_eq!(report, assumed_locality(0));
    }
}
