//! # Feature rows: collection and ingestion
//!
//! Facilities to **collect** per-telescope image features, grouped by camera
//! type. The central type is [`FeatureSet`], a fast hash map bucketing
//! [`Observation`]s per [`CamId`]. Public helpers build a set from Parquet
//! shards or in-memory columnar batches; the `lookup` module then turns a
//! set into per-camera tables.
//!
//! Modules
//! -----------------
//! * [`batch_reader`](crate::features::batch_reader) – Zero-copy container
//!   for single-camera columnar batches.
//! * [`feature_file`](crate::features::feature_file) – **Public** trait
//!   exposing `new_from_*` and `add_from_*` helpers to construct/extend a
//!   [`FeatureSet`].
//! * *(crate-private)* `parquet_reader` – Arrow/Parquet shard ingestion.
//!
//! Data Model
//! -----------------
//! * **Key:** [`CamId`] (camera type identifier, e.g. `"LSTCam"`).
//! * **Value:** [`FeatureList`](crate::constants::FeatureList) =
//!   `Vec<Observation>` in source order.
//! * **Set:** [`FeatureSet`] = `HashMap<CamId, FeatureList, ahash::RandomState>`
//!   for fast hashing on large training samples.
//!
//! Units & Conventions
//! -----------------
//! * `intensity` in photoelectrons, `width`/`length` in a shared camera
//!   length unit (only their ratio enters the tables).
//! * `dca2` is the squared distance of closest approach in degrees².
//! * `offangle` (diffuse training only) in degrees.
//!
//! Quick-Start
//! -----------------
//! ```rust,no_run
//! use camino::Utf8Path;
//! use dcalut::{FeatureBatch, FeatureFile, FeatureSet, LookupStore, LutParams};
//!
//! # fn run() -> Result<(), dcalut::DcalutError> {
//! // Ingest a Parquet shard, then append an in-memory batch.
//! let mut set: FeatureSet =
//!     FeatureSet::new_from_parquet(Utf8Path::new("shards/output_0.parquet"), None)?;
//! let (intensity, width, length, dca2) = (vec![120.0], vec![0.02], vec![0.11], vec![0.004]);
//! let batch = FeatureBatch::from_columns_borrowed("LSTCam", &intensity, &width, &length, &dca2, None);
//! set.add_from_batch(&batch);
//!
//! // Build one table per camera.
//! let params = LutParams::builder().size_max_for("LSTCam", 3.0e6).build()?;
//! let store = LookupStore::build(&set, &params)?;
//! # Ok(()) }
//! ```
//!
//! See also
//! ------------
//! * [`feature_file::FeatureFile`] – Public ingestion API.
//! * [`crate::lookup::store::LookupStore`] – Consumes a [`FeatureSet`].
use std::collections::HashMap;

use ahash::RandomState;

use crate::constants::{CamId, Degree, FeatureList, PhotoElectron, SquaredDegree};

pub mod batch_reader;
pub mod feature_file;
pub(crate) mod parquet_reader;

/// All feature rows of a training sample, bucketed by camera type.
///
/// Uses [`ahash`](https://docs.rs/ahash) for fast hashing.
pub type FeatureSet = HashMap<CamId, FeatureList, RandomState>;

/// One telescope-image record.
///
/// The four required fields feed the lookup tables; `offangle` is required
/// only when building off-axis-stratified tables, and the remaining Hillas
/// moments are carried along for downstream feature regression without
/// entering any table.
///
/// Records are immutable once collected: builders only read them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Total image amplitude (photoelectrons).
    pub intensity: PhotoElectron,
    /// Hillas width (camera length unit).
    pub width: f64,
    /// Hillas length (same unit as `width`).
    pub length: f64,
    /// Squared distance of closest approach (degrees²), the table target.
    pub dca2: SquaredDegree,
    /// Off-axis angle of the true source direction (degrees), when known.
    pub offangle: Option<Degree>,
    /// Hillas skewness, carried for downstream regressors.
    pub skewness: Option<f64>,
    /// Hillas kurtosis, carried for downstream regressors.
    pub kurtosis: Option<f64>,
    /// Distance of the image c.o.g. from the camera center, carried for
    /// downstream regressors.
    pub r: Option<f64>,
}

impl Observation {
    /// Build a record from the four required features.
    pub fn new(intensity: PhotoElectron, width: f64, length: f64, dca2: SquaredDegree) -> Self {
        Self {
            intensity,
            width,
            length,
            dca2,
            offangle: None,
            skewness: None,
            kurtosis: None,
            r: None,
        }
    }

    /// Attach the off-axis angle (degrees) of the simulated source.
    pub fn with_offangle(mut self, offangle: Degree) -> Self {
        self.offangle = Some(offangle);
        self
    }

    /// Attach the remaining Hillas moments.
    pub fn with_moments(mut self, skewness: f64, kurtosis: f64, r: f64) -> Self {
        self.skewness = Some(skewness);
        self.kurtosis = Some(kurtosis);
        self.r = Some(r);
        self
    }

    /// Width/length ratio, the second table axis.
    ///
    /// Not finite when `length` is zero; such rows fail
    /// [`Observation::has_finite_features`] and are dropped by builders.
    #[inline]
    pub fn ratio(&self) -> f64 {
        self.width / self.length
    }

    /// True when every feature entering a table is finite (including the
    /// derived ratio).
    #[inline]
    pub(crate) fn has_finite_features(&self) -> bool {
        self.intensity.is_finite()
            && self.width.is_finite()
            && self.length.is_finite()
            && self.dca2.is_finite()
            && self.ratio().is_finite()
    }

    /// The off-axis angle if present and finite, for stratified builds.
    #[inline]
    pub(crate) fn finite_offangle(&self) -> Option<Degree> {
        self.offangle.filter(|a| a.is_finite())
    }
}
