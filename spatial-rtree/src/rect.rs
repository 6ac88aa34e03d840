//! Axis-aligned bounding rectangles of configurable dimensionality.
//!
//! A [`Rect`] stores its corners inline (no heap allocation) for up to
//! [`MAX_DIMS`] dimensions, so branches can be copied freely while the
//! tree is being rebalanced. All predicates treat intervals as closed:
//! two rectangles that only share an edge or a corner overlap.

use std::f64::consts::PI;
use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::MAX_DIMS;
use crate::errors::{RTreeError, RTreeResult};

/// Volume of the unit ball, indexed by dimension.
const UNIT_SPHERE_VOLUMES: [f64; MAX_DIMS + 1] = [
    1.0,
    2.0,
    PI,
    4.0 * PI / 3.0,
    PI * PI / 2.0,
    8.0 * PI * PI / 15.0,
    PI * PI * PI / 6.0,
    16.0 * PI * PI * PI / 105.0,
    PI * PI * PI * PI / 24.0,
];

/// Checks that `ndims` is a usable dimensionality.
pub(crate) fn check_ndims(ndims: usize) -> RTreeResult<()> {
    if ndims == 0 || ndims > MAX_DIMS {
        return Err(RTreeError::InvalidConfiguration(format!(
            "dimensionality must be between 1 and {}, got {}",
            MAX_DIMS, ndims
        )));
    }
    Ok(())
}

/// An n-dimensional axis-aligned bounding rectangle.
///
/// Coordinates beyond `ndims` are always zero so that derived equality
/// compares only the meaningful part.
///
/// # Examples
///
/// ```rust
/// use spatial_rtree::Rect;
///
/// let a = Rect::new(&[0.0, 0.0], &[2.0, 2.0]).unwrap();
/// let b = Rect::new(&[2.0, 1.0], &[3.0, 3.0]).unwrap();
///
/// assert!(a.overlaps(&b)); // shared edge counts as overlap
/// assert_eq!(a.combine(&b), Rect::new(&[0.0, 0.0], &[3.0, 3.0]).unwrap());
/// ```
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    ndims: usize,
    low: [f64; MAX_DIMS],
    high: [f64; MAX_DIMS],
}

impl Rect {
    /// Creates a rectangle from its low and high corners.
    ///
    /// Fails if the corners differ in length, the dimensionality is out of
    /// range, or any `low[d] > high[d]` (NaN coordinates are rejected too).
    pub fn new(low: &[f64], high: &[f64]) -> RTreeResult<Self> {
        if low.len() != high.len() {
            return Err(RTreeError::DimensionMismatch {
                expected: low.len(),
                actual: high.len(),
            });
        }
        let ndims = low.len();
        if ndims == 0 || ndims > MAX_DIMS {
            return Err(RTreeError::InvalidOperation(format!(
                "rectangle must have between 1 and {} dimensions, got {}",
                MAX_DIMS, ndims
            )));
        }

        let mut rect = Rect::zeroed(ndims);
        for d in 0..ndims {
            if low[d].is_nan() || high[d].is_nan() || low[d] > high[d] {
                return Err(RTreeError::InvalidOperation(format!(
                    "low[{d}] = {} is not <= high[{d}] = {}",
                    low[d], high[d]
                )));
            }
            rect.low[d] = low[d];
            rect.high[d] = high[d];
        }
        Ok(rect)
    }

    /// Creates a degenerate rectangle covering a single point.
    pub fn point(coords: &[f64]) -> RTreeResult<Self> {
        Self::new(coords, coords)
    }

    /// The null rectangle: covers nothing, overlaps nothing, and is the
    /// identity of [`Rect::combine`].
    pub fn null(ndims: usize) -> Self {
        let ndims = ndims.min(MAX_DIMS);
        let mut rect = Rect::zeroed(ndims);
        for d in 0..ndims {
            rect.low[d] = f64::INFINITY;
            rect.high[d] = f64::NEG_INFINITY;
        }
        rect
    }

    fn zeroed(ndims: usize) -> Self {
        Rect {
            ndims,
            low: [0.0; MAX_DIMS],
            high: [0.0; MAX_DIMS],
        }
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.ndims
    }

    #[inline]
    pub fn low(&self) -> &[f64] {
        &self.low[..self.ndims]
    }

    #[inline]
    pub fn high(&self) -> &[f64] {
        &self.high[..self.ndims]
    }

    pub fn is_null(&self) -> bool {
        self.ndims == 0 || self.low[0] > self.high[0]
    }

    /// Product of the extents (area in 2D, volume in 3D).
    pub fn area(&self) -> f64 {
        if self.is_null() {
            return 0.0;
        }
        (0..self.ndims).map(|d| self.high[d] - self.low[d]).product()
    }

    /// Sum of the extents.
    pub fn margin(&self) -> f64 {
        if self.is_null() {
            return 0.0;
        }
        (0..self.ndims).map(|d| self.high[d] - self.low[d]).sum()
    }

    /// Volume of the smallest ball enclosing this rectangle.
    ///
    /// The ball is centred on the rectangle's centre with a radius of half
    /// the diagonal.
    pub fn spherical_volume(&self) -> f64 {
        if self.is_null() {
            return 0.0;
        }
        let sum_of_squares: f64 = (0..self.ndims)
            .map(|d| {
                let half_extent = (self.high[d] - self.low[d]) / 2.0;
                half_extent * half_extent
            })
            .sum();
        let radius = sum_of_squares.sqrt();
        radius.powi(self.ndims as i32) * UNIT_SPHERE_VOLUMES[self.ndims]
    }

    /// Centre coordinate along `dim`.
    #[inline]
    pub fn center(&self, dim: usize) -> f64 {
        (self.low[dim] + self.high[dim]) / 2.0
    }

    /// Squared distance between the centres of two rectangles.
    pub fn center_distance_sq(&self, other: &Rect) -> f64 {
        (0..self.ndims)
            .map(|d| {
                let delta = self.center(d) - other.center(d);
                delta * delta
            })
            .sum()
    }

    /// Tightest rectangle containing both `self` and `other`.
    pub fn combine(&self, other: &Rect) -> Rect {
        if self.is_null() {
            return *other;
        }
        if other.is_null() {
            return *self;
        }
        debug_assert_eq!(self.ndims, other.ndims);
        let mut rect = *self;
        rect.expand(other);
        rect
    }

    /// Grows `self` in place to contain `other`.
    pub fn expand(&mut self, other: &Rect) {
        if other.is_null() {
            return;
        }
        if self.is_null() {
            *self = *other;
            return;
        }
        for d in 0..self.ndims {
            self.low[d] = self.low[d].min(other.low[d]);
            self.high[d] = self.high[d].max(other.high[d]);
        }
    }

    /// Closed-interval intersection test on every dimension.
    pub fn overlaps(&self, other: &Rect) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        (0..self.ndims).all(|d| self.low[d] <= other.high[d] && other.low[d] <= self.high[d])
    }

    /// Returns true if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        (0..self.ndims).all(|d| self.low[d] <= other.low[d] && other.high[d] <= self.high[d])
    }

    /// Squared distance from a point to the nearest point of this rectangle.
    /// Zero when the point is inside.
    pub fn min_distance_sq(&self, point: &[f64]) -> f64 {
        (0..self.ndims.min(point.len()))
            .map(|d| {
                let closest = point[d].clamp(self.low[d], self.high[d]);
                let delta = point[d] - closest;
                delta * delta
            })
            .sum()
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rect")
            .field("low", &self.low())
            .field("high", &self.high())
            .finish()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "Rect(null)");
        }
        write!(f, "Rect({:?} - {:?})", self.low(), self.high())
    }
}

// Pages only carry the used dimensions: lows then highs.
impl Serialize for Rect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2 * self.ndims))?;
        for value in self.low().iter().chain(self.high()) {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

struct RectVisitor;

impl<'de> Visitor<'de> for RectVisitor {
    type Value = Rect;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an even number of at most {} coordinates", 2 * MAX_DIMS)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Rect, A::Error> {
        let mut coords = [0.0f64; 2 * MAX_DIMS];
        let mut len = 0;
        while let Some(value) = seq.next_element::<f64>()? {
            if len == coords.len() {
                return Err(de::Error::invalid_length(len + 1, &self));
            }
            coords[len] = value;
            len += 1;
        }
        if len == 0 || len % 2 != 0 {
            return Err(de::Error::invalid_length(len, &self));
        }

        let ndims = len / 2;
        let mut rect = Rect::zeroed(ndims);
        rect.low[..ndims].copy_from_slice(&coords[..ndims]);
        rect.high[..ndims].copy_from_slice(&coords[ndims..len]);
        Ok(rect)
    }
}

impl<'de> Deserialize<'de> for Rect {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(RectVisitor)
    }
}

/// The measure used to compare rectangles when choosing branches and
/// splitting nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoverMetric {
    /// Product of extents.
    #[default]
    Volume,
    /// Volume of the enclosing ball; favours square-ish covers.
    SphericalVolume,
}

impl CoverMetric {
    #[inline]
    pub fn measure(self, rect: &Rect) -> f64 {
        match self {
            CoverMetric::Volume => rect.area(),
            CoverMetric::SphericalVolume => rect.spherical_volume(),
        }
    }

    /// How much `base` grows when it has to cover `added` as well.
    #[inline]
    pub fn enlargement(self, base: &Rect, added: &Rect) -> f64 {
        self.measure(&base.combine(added)) - self.measure(base)
    }

    /// Dead space created by covering `a` and `b` with one rectangle.
    #[inline]
    pub fn waste(self, a: &Rect, b: &Rect) -> f64 {
        self.measure(&a.combine(b)) - self.measure(a) - self.measure(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect2(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
        Rect::new(&[x0, y0], &[x1, y1]).unwrap()
    }

    #[test]
    fn test_new_rejects_inverted_and_nan() {
        assert!(Rect::new(&[1.0, 0.0], &[0.0, 1.0]).is_err());
        assert!(Rect::new(&[f64::NAN], &[1.0]).is_err());
        assert!(matches!(
            Rect::new(&[0.0, 0.0], &[1.0]),
            Err(RTreeError::DimensionMismatch { .. })
        ));
        assert!(Rect::new(&[], &[]).is_err());
        assert!(Rect::new(&[0.0; MAX_DIMS + 1], &[1.0; MAX_DIMS + 1]).is_err());
    }

    #[test]
    fn test_area_and_margin() {
        let r = rect2(0.0, 0.0, 2.0, 3.0);
        assert_eq!(r.area(), 6.0);
        assert_eq!(r.margin(), 5.0);

        let cube = Rect::new(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(cube.area(), 6.0);
        assert_eq!(cube.margin(), 6.0);
    }

    #[test]
    fn test_spherical_volume() {
        let unit = rect2(0.0, 0.0, 1.0, 1.0);
        // radius^2 = 0.5, so area of the circle is pi / 2
        assert!((unit.spherical_volume() - PI / 2.0).abs() < 1e-12);

        let segment = Rect::new(&[0.0], &[4.0]).unwrap();
        assert!((segment.spherical_volume() - 4.0).abs() < 1e-12);

        let point = Rect::point(&[3.0, 3.0]).unwrap();
        assert_eq!(point.spherical_volume(), 0.0);
    }

    #[test]
    fn test_null_rect_behaviour() {
        let null = Rect::null(2);
        let r = rect2(1.0, 1.0, 2.0, 2.0);

        assert!(null.is_null());
        assert_eq!(null.area(), 0.0);
        assert_eq!(null.combine(&r), r);
        assert_eq!(r.combine(&null), r);
        assert!(!null.overlaps(&r));
        assert!(!r.contains(&null));

        let mut grown = Rect::null(2);
        grown.expand(&r);
        assert_eq!(grown, r);
    }

    #[test]
    fn test_combine() {
        let a = rect2(0.0, 0.0, 1.0, 1.0);
        let b = rect2(4.0, -1.0, 5.0, 0.5);
        assert_eq!(a.combine(&b), rect2(0.0, -1.0, 5.0, 1.0));
    }

    #[test]
    fn test_touching_rects_overlap() {
        let a = rect2(0.0, 0.0, 1.0, 1.0);
        let edge = rect2(1.0, 0.0, 2.0, 1.0);
        let corner = rect2(1.0, 1.0, 2.0, 2.0);
        let apart = rect2(1.5, 0.0, 2.0, 1.0);

        assert!(a.overlaps(&edge));
        assert!(a.overlaps(&corner));
        assert!(!a.overlaps(&apart));
        assert!(edge.overlaps(&a));
    }

    #[test]
    fn test_point_rect() {
        let p = Rect::point(&[1.0, 1.0]).unwrap();
        let a = rect2(0.0, 0.0, 1.0, 1.0);
        assert_eq!(p.area(), 0.0);
        assert!(p.overlaps(&a));
        assert!(a.contains(&p));
        assert!(p.overlaps(&p));
    }

    #[test]
    fn test_contains() {
        let outer = rect2(0.0, 0.0, 10.0, 10.0);
        let inner = rect2(2.0, 2.0, 3.0, 3.0);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));
    }

    #[test]
    fn test_min_distance() {
        let r = rect2(0.0, 0.0, 1.0, 1.0);
        assert_eq!(r.min_distance_sq(&[0.5, 0.5]), 0.0);
        assert_eq!(r.min_distance_sq(&[4.0, 1.0]), 9.0);
        assert_eq!(r.min_distance_sq(&[4.0, 5.0]), 25.0);
    }

    #[test]
    fn test_cover_metric() {
        let a = rect2(0.0, 0.0, 1.0, 1.0);
        let b = rect2(2.0, 0.0, 3.0, 1.0);
        assert_eq!(CoverMetric::Volume.enlargement(&a, &b), 2.0);
        assert_eq!(CoverMetric::Volume.waste(&a, &b), 1.0);
        assert_eq!(CoverMetric::Volume.enlargement(&a, &a), 0.0);
        assert!(CoverMetric::SphericalVolume.waste(&a, &b) > 0.0);
    }

    #[test]
    fn test_serialization_keeps_only_used_dims() {
        let r = Rect::new(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        let bytes = bincode::serde::encode_to_vec(r, bincode::config::legacy()).unwrap();
        assert_eq!(bytes.len(), 8 + 6 * 8);

        let (decoded, _): (Rect, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::legacy()).unwrap();
        assert_eq!(decoded, r);
        assert_eq!(decoded.ndims(), 3);
    }

    #[test]
    fn test_deserialize_rejects_odd_coordinate_count() {
        let coords = vec![1.0f64, 2.0, 3.0];
        let bytes = bincode::serde::encode_to_vec(&coords, bincode::config::legacy()).unwrap();
        let result: Result<(Rect, usize), _> =
            bincode::serde::decode_from_slice(&bytes, bincode::config::legacy());
        assert!(result.is_err());
    }

    #[test]
    fn test_display() {
        let r = rect2(0.0, 0.0, 1.0, 1.0);
        assert_eq!(r.to_string(), "Rect([0.0, 0.0] - [1.0, 1.0])");
        assert_eq!(Rect::null(2).to_string(), "Rect(null)");
    }
}
