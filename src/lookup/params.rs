//! # Lookup table parameters
//!
//! This module defines the [`LutParams`] configuration struct and its
//! builder, which control how the per-camera lookup tables are binned,
//! which statistics a bin must reach to be trusted, and which image
//! quality cut is applied before any lookup.
//!
//! ## Purpose
//!
//! The [`LutParams`] object centralizes all tunable parameters used by
//! [`LookupStore::build`](crate::lookup::store::LookupStore::build),
//! [`DiffuseLookupStore::build`](crate::lookup::diffuse::DiffuseLookupStore::build)
//! and the weight queries. It lets you:
//!
//! - Choose the 2-D histogram geometry (intensity × width/length bins),
//! - Declare the per-camera intensity axis maximum (`size_max`),
//! - Set the minimum per-bin statistics for a weight to be trusted,
//! - Set the width/length ratio cut applied before any lookup,
//! - Declare the off-axis angle strata for the diffuse (stratified) tables.
//!
//! The struct is serde-compatible with per-field defaults, so a pipeline
//! JSON configuration can carry only the fields it overrides.
//!
//! ## Example
//!
//! ```rust
//! use dcalut::lookup::params::LutParams;
//!
//! let params = LutParams::builder()
//!     .size_max_for("LSTCam", 3.0e6)
//!     .size_max_for("NectarCam", 2.0e5)
//!     .bins([10, 10])
//!     .min_stat(5)
//!     .ratio_cut(1.0)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(params.intensity_bins, 10);
//! ```
//!
//! ## See also
//!
//! * [`LookupStore::build`](crate::lookup::store::LookupStore::build) – consumes these parameters.
//! * [`get_weight`](crate::lookup::store::LookupStore::get_weight) – applies `min_stat` and `ratio_cut`.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering::Greater;
use std::fmt;

use itertools::Itertools;

use crate::constants::{
    CamId, OffAxisBins, PhotoElectron, SizeMaxMap, DEFAULT_BINS, DEFAULT_MIN_STAT,
    DEFAULT_OFF_BINS, DEFAULT_RATIO_CUT, INTENSITY_LOG_FLOOR,
};
use crate::dcalut_errors::DcalutError;

/// Configuration parameters controlling table geometry and query cuts.
///
/// Overview
/// -----------------
/// A lookup table maps `(intensity, width/length)` cells to the mean
/// squared distance of closest approach observed in that cell. This
/// struct controls:
///
/// 1) **Histogram geometry** – `intensity_bins` log-spaced intensity bins
///    from 10 photoelectrons up to the per-camera `size_max`, and
///    `ratio_bins` linear width/length bins over `[0, 1]`.
///
/// 2) **Quality cuts** – `min_stat` (minimum per-bin sample count for a
///    weight query to succeed) and `ratio_cut` (maximum accepted
///    width/length ratio, applied before any lookup).
///
/// 3) **Off-axis strata** – the optional `off_bins` partition used by the
///    diffuse tables; each `[lo, hi]` pair selects training rows with
///    `lo <= offangle < hi` (the last stratum is closed at `hi`).
///
/// Fields
/// -----------------
/// * `intensity_bins` – number of log-spaced intensity bins (≥ 1).
/// * `ratio_bins` – number of linear width/length bins over `[0, 1]` (≥ 1).
/// * `size_max` – per-camera upper edge of the intensity axis, in
///   photoelectrons. Every camera to be built **must** appear here;
///   building a set that contains an undeclared camera fails with
///   [`DcalutError::MissingSizeMax`].
/// * `min_stat` – minimum per-bin count for weight queries.
/// * `ratio_cut` – maximum accepted width/length ratio.
/// * `off_bins` – off-axis strata for the diffuse tables; `None` for
///   point-source tables.
///
/// Defaults
/// -----------------
/// ```rust
/// use dcalut::lookup::params::LutParams;
/// let params = LutParams::default();
/// assert_eq!(params.intensity_bins, 10);
/// assert_eq!(params.ratio_bins, 10);
/// assert_eq!(params.min_stat, 5);
/// assert_eq!(params.ratio_cut, 1.0);
/// assert!(params.size_max.is_empty());
/// assert!(params.off_bins.is_none());
/// ```
///
/// Notes & Validation
/// -----------------
/// * `intensity_bins >= 1`, `ratio_bins >= 1`.
/// * `ratio_cut` finite and `> 0`.
/// * Every `size_max` value finite and above the 10 p.e. axis floor.
/// * `off_bins`, when set: non-empty, each pair finite with `lo < hi`,
///   pairs ascending and non-overlapping (touching boundaries allowed).
///
/// See also
/// -----------------
/// * [`LutParamsBuilder`] – fluent construction with validation.
/// * [`BinGrid::for_camera`](crate::binning::BinGrid::for_camera) – the
///   axis construction driven by `size_max` and the bin counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LutParams {
    // --- Histogram geometry ---
    #[serde(default = "default_intensity_bins")]
    pub intensity_bins: usize,
    #[serde(default = "default_ratio_bins")]
    pub ratio_bins: usize,
    /// Per-camera intensity axis maximum (photoelectrons).
    #[serde(default)]
    pub size_max: SizeMaxMap,

    // --- Quality cuts ---
    /// Minimum per-bin count for a weight query to succeed.
    #[serde(default = "default_min_stat")]
    pub min_stat: u64,
    /// Maximum accepted width/length ratio (checked before any lookup).
    #[serde(default = "default_ratio_cut")]
    pub ratio_cut: f64,

    // --- Off-axis strata (diffuse tables only) ---
    /// Ordered `[lo, hi]` off-axis angle pairs, in degrees.
    #[serde(default)]
    pub off_bins: Option<OffAxisBins>,
}

fn default_intensity_bins() -> usize {
    DEFAULT_BINS[0]
}

fn default_ratio_bins() -> usize {
    DEFAULT_BINS[1]
}

fn default_min_stat() -> u64 {
    DEFAULT_MIN_STAT
}

fn default_ratio_cut() -> f64 {
    DEFAULT_RATIO_CUT
}

impl LutParams {
    /// Construct a new [`LutParams`] with the default values.
    ///
    /// This is equivalent to calling [`LutParams::default()`]. Note that
    /// the default `size_max` map is empty: a usable configuration needs
    /// at least one camera declared through the builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`LutParamsBuilder`] to configure custom parameters.
    ///
    /// This is a **fluent builder API** for [`LutParams`], allowing you to
    /// override the default parameters step by step before building or
    /// querying the tables.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dcalut::lookup::params::LutParams;
    ///
    /// let params = LutParams::builder()
    ///     .size_max_for("LSTCam", 3.0e6)
    ///     .intensity_bins(20)
    ///     .ratio_bins(10)
    ///     .min_stat(10)
    ///     .build()
    ///     .unwrap();
    /// ```
    ///
    /// # See also
    /// * [`LutParams`] – Holds all configuration parameters for the tables.
    pub fn builder() -> LutParamsBuilder {
        LutParamsBuilder::new()
    }

    /// The lower edge of every intensity axis, in photoelectrons.
    #[inline]
    pub fn intensity_floor() -> PhotoElectron {
        10f64.powf(INTENSITY_LOG_FLOOR)
    }
}

impl Default for LutParams {
    fn default() -> Self {
        LutParams {
            intensity_bins: DEFAULT_BINS[0],
            ratio_bins: DEFAULT_BINS[1],
            size_max: SizeMaxMap::default(),
            min_stat: DEFAULT_MIN_STAT,
            ratio_cut: DEFAULT_RATIO_CUT,
            off_bins: None,
        }
    }
}

/// Builder for [`LutParams`], with validation.
#[derive(Debug, Clone)]
pub struct LutParamsBuilder {
    params: LutParams,
}

impl Default for LutParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LutParamsBuilder {
    /// Create a new builder initialized with default values.
    pub fn new() -> Self {
        Self {
            params: LutParams::default(),
        }
    }

    // --- Histogram geometry ---
    pub fn intensity_bins(mut self, v: usize) -> Self {
        self.params.intensity_bins = v;
        self
    }
    pub fn ratio_bins(mut self, v: usize) -> Self {
        self.params.ratio_bins = v;
        self
    }
    /// Set both bin counts at once, `[intensity_bins, ratio_bins]`.
    pub fn bins(mut self, v: [usize; 2]) -> Self {
        self.params.intensity_bins = v[0];
        self.params.ratio_bins = v[1];
        self
    }
    /// Replace the whole per-camera `size_max` map.
    pub fn size_max(mut self, v: SizeMaxMap) -> Self {
        self.params.size_max = v;
        self
    }
    /// Declare (or override) the intensity axis maximum for one camera.
    pub fn size_max_for(mut self, cam_id: impl Into<CamId>, v: PhotoElectron) -> Self {
        self.params.size_max.insert(cam_id.into(), v);
        self
    }

    // --- Quality cuts ---
    pub fn min_stat(mut self, v: u64) -> Self {
        self.params.min_stat = v;
        self
    }
    pub fn ratio_cut(mut self, v: f64) -> Self {
        self.params.ratio_cut = v;
        self
    }

    // --- Off-axis strata ---
    pub fn off_bins(mut self, v: OffAxisBins) -> Self {
        self.params.off_bins = Some(v);
        self
    }
    /// Use the standard diffuse partition `[0,2] [2,4] [4,6] [6,10]` degrees.
    pub fn default_off_bins(mut self) -> Self {
        self.params.off_bins = Some(DEFAULT_OFF_BINS.to_vec());
        self
    }

    // ---- Numeric helpers for PartialOrd (handle NaN as invalid) ----

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Finalize the builder and produce a [`LutParams`] instance.
    ///
    /// Validation rules
    /// -----------------
    /// The following checks are performed:
    ///
    /// * `intensity_bins >= 1`, `ratio_bins >= 1` – a table needs at least
    ///   one bin per axis.
    /// * `ratio_cut` finite and `> 0.0` – the width/length ratio of a real
    ///   image is positive.
    /// * Every `size_max` value finite and strictly above the 10 p.e. axis
    ///   floor – otherwise the log-spaced intensity axis would be empty or
    ///   reversed.
    /// * `off_bins`, when set: non-empty; each `[lo, hi]` pair finite with
    ///   `lo < hi`; pairs in ascending order without overlap (a shared
    ///   boundary such as `[0,2] [2,4]` is allowed and assigned to the
    ///   upper stratum).
    ///
    /// Notes
    /// -----------------
    /// * An **empty** `size_max` map is accepted: building a store from an
    ///   empty feature set is legal and yields an empty store. The map is
    ///   only consulted for cameras actually present in the training set.
    /// * `min_stat = 0` is accepted and disables the statistics check at
    ///   query time.
    ///
    /// Returns
    /// -----------------
    /// * `Ok(LutParams)` if all values are valid.
    /// * `Err(DcalutError::InvalidParameter)` if any validation rule fails.
    ///
    /// Examples
    /// -----------------
    /// ```rust
    /// use dcalut::lookup::params::LutParams;
    ///
    /// let params = LutParams::builder()
    ///     .size_max_for("LSTCam", 1000.0)
    ///     .bins([4, 4])
    ///     .default_off_bins()
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(params.off_bins.as_ref().unwrap().len(), 4);
    /// ```
    pub fn build(self) -> Result<LutParams, DcalutError> {
        let p = &self.params;

        if p.intensity_bins < 1 || p.ratio_bins < 1 {
            return Err(DcalutError::InvalidParameter(
                "intensity_bins and ratio_bins must be >= 1".into(),
            ));
        }

        if !p.ratio_cut.is_finite() || !Self::gt0(p.ratio_cut) {
            return Err(DcalutError::InvalidParameter(
                "ratio_cut must be finite and > 0".into(),
            ));
        }

        let floor = LutParams::intensity_floor();
        for (cam_id, &size_max) in &p.size_max {
            if !size_max.is_finite() || size_max <= floor {
                return Err(DcalutError::InvalidParameter(format!(
                    "size_max for '{cam_id}' must be finite and > {floor} p.e., got {size_max}"
                )));
            }
        }

        if let Some(off_bins) = &p.off_bins {
            if off_bins.is_empty() {
                return Err(DcalutError::InvalidParameter(
                    "off_bins must contain at least one [lo, hi] pair".into(),
                ));
            }
            for pair in off_bins {
                let [lo, hi] = *pair;
                if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                    return Err(DcalutError::InvalidParameter(format!(
                        "off_bins pair [{lo}, {hi}] must be finite with lo < hi"
                    )));
                }
            }
            for (prev, next) in off_bins.iter().tuple_windows() {
                if next[0] < prev[1] {
                    return Err(DcalutError::InvalidParameter(format!(
                        "off_bins pairs [{}, {}] and [{}, {}] must be ascending and non-overlapping",
                        prev[0], prev[1], next[0], next[1]
                    )));
                }
            }
        }

        Ok(self.params)
    }
}

impl fmt::Display for LutParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 42; // width reserved for "name = value"
            writeln!(f, "Lookup Table Parameters")?;
            writeln!(f, "-----------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            // --- Histogram geometry ---
            writeln!(f, "[Histogram geometry]")?;
            line!(
                "intensity_bins = {}",
                self.intensity_bins,
                "Log-spaced bins from 10 p.e. to size_max"
            )?;
            line!(
                "ratio_bins     = {}",
                self.ratio_bins,
                "Linear width/length bins over [0, 1]"
            )?;
            for (cam_id, size_max) in self.size_max.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
                line!(
                    "size_max       = {:.1} p.e.",
                    size_max,
                    format!("Intensity axis maximum for {cam_id}")
                )?;
            }

            // --- Quality cuts ---
            writeln!(f, "\n[Quality cuts]")?;
            line!(
                "min_stat       = {}",
                self.min_stat,
                "Minimum per-bin count for a weight"
            )?;
            line!(
                "ratio_cut      = {:.3}",
                self.ratio_cut,
                "Maximum accepted width/length ratio"
            )?;

            // --- Off-axis strata ---
            if let Some(off_bins) = &self.off_bins {
                writeln!(f, "\n[Off-axis strata]")?;
                for (k, pair) in off_bins.iter().enumerate() {
                    line!(
                        "stratum        = {}",
                        format!("[{:.1}, {:.1}] deg", pair[0], pair[1]),
                        format!("Off-axis bin {k}")
                    )?;
                }
            }

            Ok(())
        } else {
            write!(
                f,
                "LutParams(bins=[{}, {}], cameras={}, min_stat={}, ratio_cut={:.2}, strata={})",
                self.intensity_bins,
                self.ratio_bins,
                self.size_max.len(),
                self.min_stat,
                self.ratio_cut,
                self.off_bins.as_ref().map_or(0, |b| b.len()),
            )
        }
    }
}
