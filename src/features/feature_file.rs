//! # Feature ingestion
//!
//! High-level utilities to **build and extend** a [`FeatureSet`] from
//! Parquet shards or in-memory column batches.
//!
//! ## Overview
//! -----------------
//! This module exposes the [`FeatureFile`] trait implemented for
//! [`FeatureSet`]. It provides:
//! - Constructors that **create** a new set from a given source (`new_from_*`),
//! - Appenders that **extend** an existing set (`add_from_*`).
//!
//! Internally, ingestion from in-memory batches uses a crate-private routine
//! `observations_from_batch`; Parquet ingestion uses `parquet_to_feature_set`.
//! End users should interact only with the public trait methods.
//!
//! ## Data model
//! -----------------
//! - A [`FeatureSet`] is a `HashMap<CamId, FeatureList>` storing the shower
//!   image rows per camera type.
//! - [`FeatureBatch`] is a thin container (borrowed or owned) for columnar
//!   rows from a **single camera**; it is expanded into concrete
//!   [`Observation`](crate::features::Observation)s.
//!
//! ## Duplicates & ordering
//! -----------------
//! - **No deduplication** is performed by any `add_*` method. Users must
//!   avoid re-ingesting the same shard twice if duplicates are undesirable.
//! - Rows are stored **as provided**; the table builders do not depend on
//!   row order.
//!
//! ## Error semantics
//! -----------------
//! - The Parquet methods return `Result<_, DcalutError>` and propagate
//!   I/O, schema, and decoding errors.
//! - The batch methods are infallible: the columns are already typed and
//!   non-finite rows are filtered later, at table build time.
//!
//! ## Example
//! -----------------
//! ```no_run
//! use camino::Utf8Path;
//! use dcalut::{FeatureFile, FeatureSet, LookupStore, LutParams};
//!
//! # fn demo() -> Result<(), dcalut::dcalut_errors::DcalutError> {
//! // Ingest two shards into one per-camera sample.
//! let mut features = FeatureSet::new_from_parquet(
//!     Utf8Path::new("dca_features_night1.parquet"),
//!     Some(8192),
//! )?;
//! features.add_from_parquet(Utf8Path::new("dca_features_night2.parquet"), None)?;
//!
//! // Build the per-camera lookup tables.
//! let params = LutParams::builder()
//!     .size_max_for("LSTCam", 3.0e6)
//!     .bins([10, 10])
//!     .build()?;
//! let store = LookupStore::build(&features, &params)?;
//! # let _ = store;
//! # Ok(()) }
//! ```
//!
//! ## See also
//! ------------
//! * [`FeatureFile`] – Public ingestion API surface.
//! * [`FeatureBatch`] – Zero-copy batch container (single camera).
//! * [`LookupStore::build`](crate::lookup::store::LookupStore::build) – Consumes a [`FeatureSet`].
use std::collections::HashMap;

use camino::Utf8Path;

use super::batch_reader::{observations_from_batch, FeatureBatch};
use super::parquet_reader::parquet_to_feature_set;
use crate::dcalut_errors::DcalutError;
use crate::FeatureSet;

/// Ingestion API for the [`FeatureSet`] type definition.
///
/// This trait provides methods to create a FeatureSet from different sources
/// and to add rows to an existing FeatureSet from these sources.
/// The methods are:
/// * `new_from_parquet`: Create a FeatureSet from a Parquet shard.
/// * `add_from_parquet`: Add rows to a FeatureSet from a Parquet shard.
/// * `new_from_batch`: Create a FeatureSet from an in-memory column batch.
/// * `add_from_batch`: Add rows to a FeatureSet from an in-memory column batch.
///
/// Note
/// ----
/// * Warning: No check is done for duplicated rows in any add method.
///   * The user should be careful to not add the same shard or batch twice.
pub trait FeatureFile {
    /// Create a new [`FeatureSet`] from a Parquet shard.
    ///
    /// Arguments
    /// -----------------
    /// * `parquet` – Path to the input Parquet file.
    /// * `batch_size` – Record batch size for the Parquet reader; defaults
    ///   to 8192 if `None`.
    ///
    /// Return
    /// ----------
    /// * `Ok(FeatureSet)` – A new set of per-camera rows populated from the file.
    /// * `Err(DcalutError)` – If the file cannot be opened, parsed, or
    ///   contains invalid data.
    ///
    /// Notes
    /// ----------
    /// * The shard must contain `"intensity"`, `"width"`, `"length"`,
    ///   `"dca2"` (`Float64`) and `"cam_id"` (`Utf8`) columns.
    /// * `"offangle"`, `"skewness"`, `"kurtosis"` and `"r"` (`Float64`) are
    ///   read when present and left unset otherwise.
    ///
    /// See also
    /// ------------
    /// * [`FeatureFile::add_from_parquet`] – Appends rows to an existing set.
    fn new_from_parquet(parquet: &Utf8Path, batch_size: Option<usize>) -> Result<Self, DcalutError>
    where
        Self: Sized;

    /// Add rows from a Parquet shard to an existing [`FeatureSet`].
    ///
    /// Arguments
    /// -----------------
    /// * `parquet` – Path to the input Parquet file.
    /// * `batch_size` – Record batch size for the Parquet reader; defaults
    ///   to 8192 if `None`.
    ///
    /// Return
    /// ----------
    /// * `Ok(())` – On successful ingestion, with the set updated in place.
    /// * `Err(DcalutError)` – If the file cannot be opened, parsed, or
    ///   contains invalid data.
    ///
    /// See also
    /// ------------
    /// * [`FeatureFile::new_from_parquet`] – Creates a brand new set from a shard.
    fn add_from_parquet(
        &mut self,
        parquet: &Utf8Path,
        batch_size: Option<usize>,
    ) -> Result<(), DcalutError>;

    /// Create a new [`FeatureSet`] from a column batch taken by a single camera.
    ///
    /// Arguments
    /// -----------------
    /// * `batch` – A [`FeatureBatch`] with the per-row columns and the camera id.
    ///
    /// Return
    /// ----------
    /// * A new [`FeatureSet`] with one bucket holding the batch rows.
    fn new_from_batch(batch: &FeatureBatch<'_>) -> Self;

    /// Add the rows of a column batch to an existing [`FeatureSet`].
    ///
    /// The rows are appended to the bucket of the batch camera, creating the
    /// bucket if the camera is new to the set.
    ///
    /// Arguments
    /// -----------------
    /// * `batch` – A [`FeatureBatch`] with the per-row columns and the camera id.
    fn add_from_batch(&mut self, batch: &FeatureBatch<'_>);
}

impl FeatureFile for FeatureSet {
    fn new_from_parquet(parquet: &Utf8Path, batch_size: Option<usize>) -> Result<Self, DcalutError>
    where
        Self: Sized,
    {
        let mut set: FeatureSet = HashMap::default();
        parquet_to_feature_set(&mut set, parquet, batch_size)?;
        Ok(set)
    }

    fn add_from_parquet(
        &mut self,
        parquet: &Utf8Path,
        batch_size: Option<usize>,
    ) -> Result<(), DcalutError> {
        parquet_to_feature_set(self, parquet, batch_size)
    }

    fn new_from_batch(batch: &FeatureBatch<'_>) -> Self {
        let mut set: FeatureSet = HashMap::default();
        observations_from_batch(&mut set, batch);
        set
    }

    fn add_from_batch(&mut self, batch: &FeatureBatch<'_>) {
        observations_from_batch(self, batch);
    }
}

#[cfg(test)]
mod feature_file_tests {
    use super::*;

    #[test]
    fn batch_constructor_and_appender_agree() {
        let intensity = [120.0, 340.0];
        let width = [0.03, 0.05];
        let length = [0.11, 0.12];
        let dca2 = [0.4, 0.9];

        let batch = FeatureBatch::from_columns_borrowed(
            "NectarCam",
            &intensity,
            &width,
            &length,
            &dca2,
            None,
        );

        let built = FeatureSet::new_from_batch(&batch);

        let mut appended: FeatureSet = HashMap::default();
        appended.add_from_batch(&batch);

        assert_eq!(built.len(), 1);
        assert_eq!(built["NectarCam"], appended["NectarCam"]);
        assert_eq!(built["NectarCam"].len(), 2);
    }
}
