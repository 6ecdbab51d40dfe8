//! # Lookup tables for DCA²-based telescope weighting
//!
//! Everything needed to **build, merge, persist and query** the per-camera
//! lookup tables that map image shape features to an expected direction
//! reconstruction quality.
//!
//! ## Overview
//! -----------------
//! A [`LookupTable`] is a 2-D histogram over `(intensity, width/length)`
//! holding, per cell, the sample count and the mean squared distance of
//! closest approach (DCA²) of the training shower images that fell there.
//! The inverse of that mean is the weight a telescope receives in the
//! array-level direction fit: cells where the reconstruction historically
//! performed well pull harder.
//!
//! The module family:
//! - [`params`] — [`LutParams`](params::LutParams): binning geometry,
//!   per-camera `size_max`, `min_stat` and `ratio_cut`, off-axis strata.
//! - [`LookupTable`] (this module) — one camera, build + cell query.
//! - [`store`] — [`LookupStore`](store::LookupStore): one table per
//!   camera, NaN-safe merging across shards, JSON persistence, the
//!   multi-file drivers.
//! - [`diffuse`] — [`DiffuseLookupStore`](diffuse::DiffuseLookupStore):
//!   the off-axis-angle stratified variant for diffuse gamma training.
//! - [`weights`] — the query facade: `get_weight` / `event_weights` with
//!   the full cut cascade.
//!
//! ## Data model
//! -----------------
//! - The intensity axis is **log-spaced**: `intensity_bins + 1` edges from
//!   10 photoelectrons up to the per-camera `size_max` (last edge pinned
//!   exactly to `size_max`).
//! - The width/length axis is **linear** over `[0, 1]` with
//!   `ratio_bins + 1` edges.
//! - Cells store `counts: u64` and `mean_dca2: Option<f64>`; `None` marks
//!   a cell with no usable information (never filled, or masked below
//!   `min_stat`). The two matrices always share the grid shape.
//!
//! ## Fill vs. query bucketing
//! -----------------
//! Building uses the histogram fill rule (left-closed bins, rightmost
//! edge pulled into the last bin, out-of-range rows dropped); querying
//! uses the strictly-less rule where a value on the *first* edge is out
//! of range but a value on the *last* edge lands in the last bin. Both
//! live in [`crate::binning`] and are documented there.
//!
//! ## Example
//! -----------------
//! ```rust
//! use dcalut::features::Observation;
//! use dcalut::lookup::params::LutParams;
//! use dcalut::lookup::LookupTable;
//!
//! # fn demo() -> Result<(), dcalut::dcalut_errors::DcalutError> {
//! let params = LutParams::builder()
//!     .size_max_for("LSTCam", 1000.0)
//!     .bins([4, 4])
//!     .build()?;
//!
//! let rows: Vec<Observation> = (0..100)
//!     .map(|k| Observation::new(20.0 + 9.0 * k as f64, 0.03, 0.10, 1.0))
//!     .collect();
//!
//! let table = LookupTable::build(&rows, 1000.0, &params)?;
//! let (count, mean_dca2) = table.query(500.0, 0.3)?;
//! assert!(count > 0);
//! assert!(mean_dca2.is_some());
//! # Ok(()) }
//! # demo().unwrap();
//! ```
//!
//! ## See also
//! ------------
//! * [`crate::binning`] – Edge construction and both bucketing rules.
//! * [`store::LookupStore`] – Per-camera collection with merge + persistence.
//! * [`weights`] – The weight query cascade.
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::binning::{BinGrid, BinnedAccumulator};
use crate::constants::PhotoElectron;
use crate::dcalut_errors::DcalutError;
use crate::features::Observation;
use crate::lookup::params::LutParams;

pub mod diffuse;
pub mod params;
pub mod store;
pub mod weights;

#[cfg(feature = "progress")]
pub(crate) mod progress_bar;

/// One camera's lookup table: per-cell sample counts and mean DCA².
///
/// Overview
/// -----------------
/// Built from the camera's training rows by
/// [`LookupTable::build`], merged across shards by
/// [`LookupStore::combine`](store::LookupStore::combine), queried one cell
/// at a time by [`LookupTable::query`].
///
/// Invariants
/// -----------------
/// * `counts` and `mean_dca2` have the shape
///   `(intensity_bins, ratio_bins)` of `grid`.
/// * For freshly built tables `mean_dca2[(i, j)].is_some()` iff
///   `counts[(i, j)] > 0`; after
///   [`apply_min_stat`](store::LookupStore::apply_min_stat) a cell may
///   hold a nonzero count with a `None` mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupTable {
    pub(crate) grid: BinGrid,
    pub(crate) counts: DMatrix<u64>,
    pub(crate) mean_dca2: DMatrix<Option<f64>>,
}

impl LookupTable {
    /// Build a table from one camera's training rows.
    ///
    /// Rows with a non-finite value among intensity, width, length,
    /// width/length or DCA² are dropped before binning; rows falling
    /// outside the axis ranges are dropped by the fill rule. Dropped rows
    /// appear in neither the counts nor the means.
    ///
    /// Arguments
    /// -----------------
    /// * `rows` – The camera's training rows (any borrowing iterator).
    /// * `size_max` – Upper edge of the intensity axis \[photoelectrons\].
    /// * `params` – Binning geometry (`intensity_bins`, `ratio_bins`).
    ///
    /// Return
    /// ----------
    /// * `Ok(LookupTable)` with the populated histogram, or
    ///   `Err(DcalutError::InvalidParameter)` when the axis configuration
    ///   is unusable (`size_max` at or below the 10 p.e. floor, zero bins).
    ///
    /// See also
    /// ------------
    /// * [`BinGrid::for_camera`] – The axis construction.
    /// * [`LookupStore::build`](store::LookupStore::build) – The per-camera driver.
    pub fn build<'a, I>(
        rows: I,
        size_max: PhotoElectron,
        params: &LutParams,
    ) -> Result<Self, DcalutError>
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let grid = BinGrid::for_camera(size_max, params.intensity_bins, params.ratio_bins)?;
        let mut acc = BinnedAccumulator::new(grid);

        for obs in rows.into_iter().filter(|obs| obs.has_finite_features()) {
            acc.fill(obs.intensity, obs.ratio(), obs.dca2);
        }

        let (grid, counts, mean_dca2) = acc.finish();
        Ok(Self {
            grid,
            counts,
            mean_dca2,
        })
    }

    /// Look up the cell holding `(intensity, ratio)` under the query rule.
    ///
    /// A value strictly inside the axis range selects its bin; a value on
    /// the **last** edge selects the last bin; a value on the **first**
    /// edge, below it, above the last edge, or NaN is out of range.
    ///
    /// Arguments
    /// -----------------
    /// * `intensity` – Image amplitude \[photoelectrons\].
    /// * `ratio` – Width/length ratio of the image.
    ///
    /// Return
    /// ----------
    /// * `Ok((count, mean_dca2))` for the selected cell — `mean_dca2` is
    ///   `None` for an empty or masked cell.
    /// * `Err(DcalutError::LookupOutOfRange)` when either axis rejects the
    ///   value.
    pub fn query(&self, intensity: f64, ratio: f64) -> Result<(u64, Option<f64>), DcalutError> {
        let (i, j) = self
            .grid
            .query_index(intensity, ratio)
            .ok_or(DcalutError::LookupOutOfRange { intensity, ratio })?;
        Ok((self.counts[(i, j)], self.mean_dca2[(i, j)]))
    }

    /// The binning geometry of this table.
    pub fn grid(&self) -> &BinGrid {
        &self.grid
    }

    /// Per-cell sample counts, `(intensity, ratio)` indexed.
    pub fn counts(&self) -> &DMatrix<u64> {
        &self.counts
    }

    /// Per-cell mean DCA², `None` where the cell holds no usable value.
    pub fn mean_dca2(&self) -> &DMatrix<Option<f64>> {
        &self.mean_dca2
    }

    pub fn n_intensity_bins(&self) -> usize {
        self.grid.n_intensity_bins()
    }

    pub fn n_ratio_bins(&self) -> usize {
        self.grid.n_ratio_bins()
    }

    /// Total number of training rows binned into this table.
    pub fn n_samples(&self) -> u64 {
        self.counts.sum()
    }
}
