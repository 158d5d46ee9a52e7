//! # Regions of interest
//!
//! Contraction of a time-resolved detector frame `(time bin, y, x)` to one count per time bin,
//! summing the pixels of a region of interest.
//!
//! ## Overview
//! -----------------
//! A [`RoiSpec`] is given in exactly one of three addressing modes:
//!
//! * `lbwh` – `[left, bottom, width, height]`,
//! * `lrbt` – `[left, right, bottom, top]`, half-open on the right and top,
//! * an explicit pixel mask. The mode is accepted but extraction reports
//!   [`ReductionError::NotImplemented`].
//!
//! `left`/`right` index the last (x) axis and `bottom`/`top` the middle (y) axis. Boundaries are
//! clamped to the frame, so a window partly outside the detector sums only the pixels it covers
//! and a window entirely outside it sums to zero.
use std::fmt;
use std::ops::Range;

use ndarray::{s, Array2, ArrayView3};

use crate::constants::DETECTOR_PIXELS;
use crate::nredux_errors::ReductionError;

/// Region of interest on a detector frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RoiSpec {
    /// `[left, bottom, width, height]`
    Lbwh([i64; 4]),
    /// `[left, right, bottom, top]`
    Lrbt([i64; 4]),
    /// Per-pixel weights, `(y, x)`.
    Mask(Array2<f64>),
}

impl RoiSpec {
    /// Build a ROI from optional addressing modes, exactly one of which must be given.
    ///
    /// Return
    /// ----------
    /// * The ROI in the given mode, or `Err(ReductionError::InvalidRoiSpecification)` when no mode
    ///   or more than one mode is given.
    pub fn from_modes(
        lbwh: Option<[i64; 4]>,
        lrbt: Option<[i64; 4]>,
        mask: Option<Array2<f64>>,
    ) -> Result<Self, ReductionError> {
        match (lbwh, lrbt, mask) {
            (Some(v), None, None) => Ok(RoiSpec::Lbwh(v)),
            (None, Some(v), None) => Ok(RoiSpec::Lrbt(v)),
            (None, None, Some(m)) => Ok(RoiSpec::Mask(m)),
            (None, None, None) => Err(ReductionError::InvalidRoiSpecification(
                "a ROI specification is required (lbwh, lrbt or mask)".into(),
            )),
            _ => Err(ReductionError::InvalidRoiSpecification(
                "lbwh, lrbt and mask are mutually exclusive".into(),
            )),
        }
    }

    /// `[left, right, bottom, top]` of a rectangular ROI.
    pub fn bounds(&self) -> Option<[i64; 4]> {
        match *self {
            RoiSpec::Lbwh([l, b, w, h]) => Some([l, l + w, b, b + h]),
            RoiSpec::Lrbt(v) => Some(v),
            RoiSpec::Mask(_) => None,
        }
    }

    /// Pixel ranges `(y, x)` covered on a `ny × nx` frame.
    fn window(&self, ny: usize, nx: usize) -> Result<(Range<usize>, Range<usize>), ReductionError> {
        let Some([left, right, bottom, top]) = self.bounds() else {
            return Err(ReductionError::NotImplemented(
                "mask based ROI extraction".into(),
            ));
        };
        Ok((clamp_range(bottom, top, ny), clamp_range(left, right, nx)))
    }

    /// Sum the ROI of every time bin.
    ///
    /// Arguments
    /// -----------------
    /// * `frames` – `(time bin, y, x)` counts of one detection channel.
    ///
    /// Return
    /// ----------
    /// * One summed count per time bin.
    pub fn extract<A>(&self, frames: ArrayView3<A>) -> Result<Vec<f64>, ReductionError>
    where
        A: Copy + Into<f64>,
    {
        let (_, ny, nx) = frames.dim();
        let (rows, cols) = self.window(ny, nx)?;
        Ok(frames
            .outer_iter()
            .map(|frame| {
                frame
                    .slice(s![rows.clone(), cols.clone()])
                    .iter()
                    .map(|&c| Into::<f64>::into(c))
                    .sum::<f64>()
            })
            .collect())
    }
}

fn clamp_range(start: i64, end: i64, len: usize) -> Range<usize> {
    let clamp = |v: i64| v.clamp(0, len as i64) as usize;
    let start = clamp(start);
    start..clamp(end).max(start)
}

impl fmt::Display for RoiSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoiSpec::Lbwh(v) => write!(f, "lbwh{v:?}"),
            RoiSpec::Lrbt(v) => write!(f, "lrbt{v:?}"),
            RoiSpec::Mask(m) => write!(f, "mask{:?}", m.shape()),
        }
    }
}

/// Default ROI around a beam centre `(c0, c1)` (axis 0 = y, axis 1 = x):
/// `lrbt = [⌊c1⌋ − 7, ⌊c1⌋ + 2, ⌊c0⌋ − 4, ⌊c0⌋ + 5]`, clamped to the detector.
pub fn default_roi(center: (f64, f64)) -> RoiSpec {
    let (c0, c1) = (center.0.floor() as i64, center.1.floor() as i64);
    let clamp = |v: i64| v.clamp(0, DETECTOR_PIXELS as i64);
    RoiSpec::Lrbt([clamp(c1 - 7), clamp(c1 + 2), clamp(c0 - 4), clamp(c0 + 5)])
}

#[cfg(test)]
mod roi_test {
    use super::*;
    use ndarray::Array3;

    /// Frame whose count at `(t, y, x)` is `t + 1` everywhere.
    fn frames() -> Array3<i32> {
        Array3::from_shape_fn((16, 128, 128), |(t, _, _)| t as i32 + 1)
    }

    #[test]
    fn test_mode_exclusivity() {
        let r = Some([10, 20, 5, 5]);
        let m = || Some(Array2::<f64>::ones((128, 128)));

        assert!(RoiSpec::from_modes(r, None, None).is_ok());
        assert!(RoiSpec::from_modes(None, r, None).is_ok());
        assert!(RoiSpec::from_modes(None, None, m()).is_ok());

        for (lbwh, lrbt, mask) in [
            (None, None, None),
            (r, r, None),
            (r, None, m()),
            (None, r, m()),
            (r, r, m()),
        ] {
            assert!(matches!(
                RoiSpec::from_modes(lbwh, lrbt, mask),
                Err(ReductionError::InvalidRoiSpecification(_))
            ));
        }
    }

    #[test]
    fn test_lbwh_matches_lrbt() {
        let data = frames();
        let lbwh = RoiSpec::Lbwh([60, 50, 9, 4]).extract(data.view()).unwrap();
        let lrbt = RoiSpec::Lrbt([60, 69, 50, 54]).extract(data.view()).unwrap();
        assert_eq!(lbwh, lrbt);
        assert_eq!(lbwh.len(), 16);
        // 36 pixels per bin
        assert_eq!(lbwh[0], 36.0);
        assert_eq!(lbwh[15], 16.0 * 36.0);
    }

    #[test]
    fn test_axes_orientation() {
        let mut data = Array3::<i32>::zeros((16, 128, 128));
        // one bright pixel at y = 10, x = 100
        data[[3, 10, 100]] = 7;

        let x_window = RoiSpec::Lrbt([95, 105, 0, 20]).extract(data.view()).unwrap();
        assert_eq!(x_window[3], 7.0);
        let swapped = RoiSpec::Lrbt([0, 20, 95, 105]).extract(data.view()).unwrap();
        assert_eq!(swapped.iter().sum::<f64>(), 0.0);
    }

    #[test]
    fn test_clamping() {
        let data = frames();
        let edge = RoiSpec::Lrbt([-5, 3, 120, 140]).extract(data.view()).unwrap();
        assert_eq!(edge[0], (3 * 8) as f64);
        let outside = RoiSpec::Lrbt([200, 210, 0, 5]).extract(data.view()).unwrap();
        assert!(outside.iter().all(|&c| c == 0.0));
        let inverted = RoiSpec::Lrbt([50, 40, 0, 5]).extract(data.view()).unwrap();
        assert!(inverted.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_mask_not_implemented() {
        let roi = RoiSpec::Mask(Array2::ones((128, 128)));
        assert!(matches!(
            roi.extract(frames().view()),
            Err(ReductionError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_default_roi() {
        assert_eq!(default_roi((64.6, 70.2)), RoiSpec::Lrbt([63, 72, 60, 69]));
        assert_eq!(default_roi((2.0, 126.5)), RoiSpec::Lrbt([119, 128, 0, 7]));
    }
}
