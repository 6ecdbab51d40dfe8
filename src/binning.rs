//! # 2-D binning of feature rows
//!
//! This module owns the histogram geometry ([`BinGrid`]) and the streaming
//! accumulator ([`BinnedAccumulator`]) that turns `(intensity, ratio, dca2)`
//! triples into a per-bin count grid and a per-bin DCA² sum grid.
//!
//! ## Overview
//! -----------------
//! A lookup table is a 2-D histogram over image intensity (log-spaced axis)
//! and width/length ratio (linear axis on `[0, 1]`), carrying the mean
//! squared distance of closest approach of the training rows in each bin.
//! Counts and sums are filled through one shared bin-assignment routine, so
//! `mean = sum / count` is well defined wherever a bin holds data.
//!
//! ## Bucketing rules
//! -----------------
//! Two distinct rules live here, and they are intentionally asymmetric:
//!
//! * **Fill rule** ([`BinGrid::fill_index`]): the rule used while building a
//!   table. It matches the bucketing of NumPy's `histogramdd`, so tables
//!   built here agree bin-for-bin with training artifacts produced by
//!   Python tooling: bins are left-closed (`e[k] <= x < e[k+1]`), samples
//!   outside the axis range are silently dropped, and a sample on the
//!   rightmost edge — or above it within a rounding guard derived from the
//!   minimum bin width — is pulled back into the last bin instead of being
//!   treated as overflow.
//! * **Query rule** ([`BinGrid::query_index`]): the rule used when looking a
//!   value up in a finished table: the bin whose left edge is the largest
//!   edge strictly below the value. Under this rule a value equal to the
//!   first edge is out of range while a value equal to the last edge lands
//!   in the last bin.
//!
//! The fill-side edge guard rounds both the sample and the rightmost edge to
//! `trunc(-log10(min_bin_width)) + 6` decimals (round-half-even) before
//! comparing, so the tolerance scales with the bin geometry.
//!
//! ## See also
//! ------------
//! * [`crate::lookup::LookupTable`] – consumes the accumulator output.
//! * [`crate::lookup::store::LookupStore`] – merges accumulated statistics.

use itertools::izip;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::constants::{EDGE_GUARD_DIGITS, INTENSITY_LOG_FLOOR};
use crate::dcalut_errors::DcalutError;

/// Round `x` to `decimals` decimal digits, ties to even.
///
/// Negative `decimals` round to tens, hundreds, … — the same convention as
/// NumPy's `around`, which the fill-side edge guard has to reproduce.
#[inline]
fn round_half_even(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (x * scale).round_ties_even() / scale
}

/// Precomputed rightmost-edge tolerance for one axis.
///
/// `decimals` is derived from the smallest bin width of the axis, so the
/// guard widens for coarse axes and tightens for fine ones.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EdgeGuard {
    last: f64,
    decimals: i32,
    last_rounded: f64,
}

impl EdgeGuard {
    fn for_edges(edges: &[f64]) -> Self {
        let min_width = edges
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(f64::INFINITY, f64::min);
        let decimals = (-min_width.log10()).trunc() as i32 + EDGE_GUARD_DIGITS;
        let last = edges[edges.len() - 1];
        Self {
            last,
            decimals,
            last_rounded: round_half_even(last, decimals),
        }
    }

    /// True when `x` sits at (or within rounding distance above) the
    /// rightmost edge of the axis.
    #[inline]
    fn on_last_edge(&self, x: f64) -> bool {
        x >= self.last && round_half_even(x, self.decimals) == self.last_rounded
    }
}

/// Histogram-fill bin assignment for one axis.
///
/// Returns `None` when the sample falls outside the axis range on either
/// side; the caller drops such samples without counting them.
#[inline]
fn fill_bin_index(x: f64, edges: &[f64], guard: &EdgeGuard) -> Option<usize> {
    debug_assert!(x.is_finite(), "non-finite samples must be filtered upstream");
    let nbins = edges.len() - 1;
    // Number of edges <= x, i.e. the digitize index.
    let mut k = edges.partition_point(|e| *e <= x);
    if guard.on_last_edge(x) {
        k -= 1;
    }
    if k == 0 || k > nbins {
        None
    } else {
        Some(k - 1)
    }
}

/// Query-side bin assignment for one axis (strictly-less rule).
#[inline]
fn query_bin_index(x: f64, edges: &[f64]) -> Option<usize> {
    let nbins = edges.len() - 1;
    let k = edges.partition_point(|e| *e < x);
    if k == 0 || k > nbins {
        None
    } else {
        Some(k - 1)
    }
}

/// The two bin-edge sequences of a lookup table.
///
/// Axis 1 is image intensity in photoelectrons, log-spaced from 10
/// (`10^INTENSITY_LOG_FLOOR`) to the per-camera `size_max`. Axis 2 is the
/// width/length ratio, linearly spaced over `[0, 1]`.
///
/// Invariants
/// ----------
/// * Both edge sequences are finite, strictly increasing, length ≥ 2.
/// * The last intensity edge equals `size_max` exactly, so a query at
///   `size_max` lands in the last bin for any configured maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinGrid {
    intensity_edges: Vec<f64>,
    ratio_edges: Vec<f64>,
}

impl BinGrid {
    /// Build a grid from explicit edge sequences.
    ///
    /// Arguments
    /// -----------------
    /// * `intensity_edges` — Intensity axis edges (photoelectrons).
    /// * `ratio_edges` — Width/length ratio axis edges.
    ///
    /// Return
    /// ----------
    /// * The validated grid, or [`DcalutError::InvalidParameter`] if either
    ///   sequence is shorter than 2, non-finite, or not strictly increasing.
    pub fn new(intensity_edges: Vec<f64>, ratio_edges: Vec<f64>) -> Result<Self, DcalutError> {
        validate_edges("intensity_edges", &intensity_edges)?;
        validate_edges("ratio_edges", &ratio_edges)?;
        Ok(Self {
            intensity_edges,
            ratio_edges,
        })
    }

    /// Build the standard per-camera grid.
    ///
    /// The intensity axis has `n_intensity + 1` log-spaced edges from 10 to
    /// `size_max` inclusive; the ratio axis has `n_ratio + 1` linear edges
    /// over `[0, 1]`.
    ///
    /// Arguments
    /// -----------------
    /// * `size_max` — Upper bound of the intensity axis for this camera
    ///   type; must be finite and above the 10 p.e. floor.
    /// * `n_intensity` — Number of intensity bins (≥ 1).
    /// * `n_ratio` — Number of ratio bins (≥ 1).
    pub fn for_camera(
        size_max: f64,
        n_intensity: usize,
        n_ratio: usize,
    ) -> Result<Self, DcalutError> {
        let floor = 10f64.powf(INTENSITY_LOG_FLOOR);
        if !size_max.is_finite() || size_max <= floor {
            return Err(DcalutError::InvalidParameter(format!(
                "size_max must be finite and above {floor} p.e., got {size_max}"
            )));
        }
        if n_intensity == 0 || n_ratio == 0 {
            return Err(DcalutError::InvalidParameter(
                "bin counts must be at least 1 on both axes".into(),
            ));
        }

        let hi = size_max.log10();
        let step = (hi - INTENSITY_LOG_FLOOR) / n_intensity as f64;
        let mut intensity_edges: Vec<f64> = (0..=n_intensity)
            .map(|i| 10f64.powf(INTENSITY_LOG_FLOOR + step * i as f64))
            .collect();
        // Pin the endpoint: 10^log10(size_max) can fall one ulp short, which
        // would push a query at exactly size_max out of range.
        intensity_edges[n_intensity] = size_max;

        let ratio_edges: Vec<f64> = (0..=n_ratio).map(|i| i as f64 / n_ratio as f64).collect();

        Self::new(intensity_edges, ratio_edges)
    }

    pub fn n_intensity_bins(&self) -> usize {
        self.intensity_edges.len() - 1
    }

    pub fn n_ratio_bins(&self) -> usize {
        self.ratio_edges.len() - 1
    }

    pub fn intensity_edges(&self) -> &[f64] {
        &self.intensity_edges
    }

    pub fn ratio_edges(&self) -> &[f64] {
        &self.ratio_edges
    }

    /// Histogram-fill assignment of a sample to a `(intensity, ratio)` bin.
    ///
    /// `None` means the sample is out of range on at least one axis and must
    /// be dropped (neither counted nor summed). See the module docs for the
    /// exact rule.
    pub(crate) fn fill_index(
        &self,
        intensity: f64,
        ratio: f64,
        guards: &(EdgeGuard, EdgeGuard),
    ) -> Option<(usize, usize)> {
        let i = fill_bin_index(intensity, &self.intensity_edges, &guards.0)?;
        let j = fill_bin_index(ratio, &self.ratio_edges, &guards.1)?;
        Some((i, j))
    }

    pub(crate) fn edge_guards(&self) -> (EdgeGuard, EdgeGuard) {
        (
            EdgeGuard::for_edges(&self.intensity_edges),
            EdgeGuard::for_edges(&self.ratio_edges),
        )
    }

    /// Query-side assignment (strictly-less rule on both axes).
    ///
    /// `None` means the point is outside the table domain; callers surface
    /// this as [`DcalutError::LookupOutOfRange`].
    pub(crate) fn query_index(&self, intensity: f64, ratio: f64) -> Option<(usize, usize)> {
        let i = query_bin_index(intensity, &self.intensity_edges)?;
        let j = query_bin_index(ratio, &self.ratio_edges)?;
        Some((i, j))
    }
}

fn validate_edges(name: &str, edges: &[f64]) -> Result<(), DcalutError> {
    if edges.len() < 2 {
        return Err(DcalutError::InvalidParameter(format!(
            "{name} needs at least 2 edges, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(DcalutError::InvalidParameter(format!(
            "{name} contains a non-finite edge"
        )));
    }
    if edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(DcalutError::InvalidParameter(format!(
            "{name} must be strictly increasing"
        )));
    }
    Ok(())
}

/// Streaming accumulator of per-bin counts and DCA² sums.
///
/// Both grids are filled through [`BinGrid::fill_index`], the single source
/// of bin assignment, so the mean produced by [`BinnedAccumulator::finish`]
/// is defined exactly where the count is nonzero.
///
/// The buffers are single-writer: parallel builds should use one
/// accumulator per worker and merge the finished tables afterwards.
#[derive(Debug, Clone)]
pub struct BinnedAccumulator {
    grid: BinGrid,
    guards: (EdgeGuard, EdgeGuard),
    counts: DMatrix<u64>,
    sum_dca2: DMatrix<f64>,
}

impl BinnedAccumulator {
    pub fn new(grid: BinGrid) -> Self {
        let (n1, n2) = (grid.n_intensity_bins(), grid.n_ratio_bins());
        let guards = grid.edge_guards();
        Self {
            grid,
            guards,
            counts: DMatrix::from_element(n1, n2, 0),
            sum_dca2: DMatrix::from_element(n1, n2, 0.0),
        }
    }

    /// Add one sample. Out-of-range samples are dropped silently.
    ///
    /// Non-finite inputs are a precondition violation: callers filter rows
    /// before accumulation (debug builds assert).
    #[inline]
    pub fn fill(&mut self, intensity: f64, ratio: f64, dca2: f64) {
        debug_assert!(dca2.is_finite(), "non-finite targets must be filtered upstream");
        if let Some((i, j)) = self.grid.fill_index(intensity, ratio, &self.guards) {
            self.counts[(i, j)] += 1;
            self.sum_dca2[(i, j)] += dca2;
        }
    }

    /// Add a columnar batch of samples.
    ///
    /// Arguments
    /// -----------------
    /// * `intensity` — Image amplitudes (photoelectrons).
    /// * `ratio` — Width/length ratios.
    /// * `dca2` — Squared distances of closest approach.
    ///
    /// Panics
    /// ----------
    /// * If the three slices differ in length (caller contract).
    pub fn accumulate(&mut self, intensity: &[f64], ratio: &[f64], dca2: &[f64]) {
        assert_eq!(
            intensity.len(),
            ratio.len(),
            "intensity/ratio length mismatch"
        );
        assert_eq!(intensity.len(), dca2.len(), "intensity/dca2 length mismatch");
        for (&v1, &v2, &t) in izip!(intensity, ratio, dca2) {
            self.fill(v1, v2, t);
        }
    }

    /// Number of samples accumulated in range so far.
    pub fn filled(&self) -> u64 {
        self.counts.sum()
    }

    /// Consume the accumulator, producing the grid, the counts, and the
    /// per-bin mean (`None` where the count is zero — a division that can
    /// never be attempted).
    pub fn finish(self) -> (BinGrid, DMatrix<u64>, DMatrix<Option<f64>>) {
        let mean = self
            .sum_dca2
            .zip_map(&self.counts, |s, n| (n > 0).then(|| s / n as f64));
        (self.grid, self.counts, mean)
    }
}
