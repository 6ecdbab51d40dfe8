//! # Single-Camera Feature Batch Ingestion
//!
//! This module provides the [`FeatureBatch`] type, which groups the feature
//! columns of many telescope images from a **single camera type** into a
//! compact container. Such a batch can then be expanded into concrete
//! [`Observation`]s and stored in a [`FeatureSet`].
//!
//! ## Overview
//! -----------------
//! Training pipelines typically deliver columnar features (intensity, width,
//! length, DCA², and for diffuse simulations the off-axis angle).
//! [`FeatureBatch`] wraps such columns into a structured form ready for
//! ingestion, either borrowing the caller's slices (zero-copy) or owning
//! converted buffers.
//!
//! To actually turn batches into stored rows, use the trait
//! [`FeatureFile`](crate::features::feature_file::FeatureFile):
//! - [`FeatureFile::new_from_batch`](crate::features::feature_file::FeatureFile::new_from_batch) — build a new [`FeatureSet`] from a batch.
//! - [`FeatureFile::add_from_batch`](crate::features::feature_file::FeatureFile::add_from_batch) — append a batch into an existing set.
//!
//! ## Invariants
//! -----------------
//! - `intensity.len() == width.len() == length.len() == dca2.len()`
//!   (and `offangle.len()`, when present).
//! - All rows of a batch belong to the **same** camera type; for
//!   multi-camera datasets, create one batch per camera.
//!
//! ## See also
//! ------------
//! * [`FeatureBatch::from_columns_borrowed`] – Zero-copy construction.
//! * [`FeatureBatch::from_columns_owned`] – Copy transient buffers once.
//! * [`FeatureFile::new_from_batch`](crate::features::feature_file::FeatureFile::new_from_batch) – Public entry point for batch ingestion.
use std::borrow::Cow;

use itertools::izip;

use crate::constants::CamId;
use crate::features::{FeatureSet, Observation};

/// Columnar feature batch from a single camera type.
///
/// Fields
/// -----------------
/// * `cam_id` — Camera type the whole batch belongs to.
/// * `intensity` — Image amplitudes (photoelectrons).
/// * `width` / `length` — Hillas ellipse axes (shared length unit).
/// * `dca2` — Squared distances of closest approach (degrees²).
/// * `offangle` — Off-axis angles (degrees), present for diffuse training.
#[derive(Debug, Clone)]
pub struct FeatureBatch<'a> {
    pub cam_id: CamId,
    pub intensity: Cow<'a, [f64]>,
    pub width: Cow<'a, [f64]>,
    pub length: Cow<'a, [f64]>,
    pub dca2: Cow<'a, [f64]>,
    pub offangle: Option<Cow<'a, [f64]>>,
}

impl<'a> FeatureBatch<'a> {
    /// Construct a batch by **borrowing** the caller's column slices.
    ///
    /// No allocation is performed; the batch holds `Cow::Borrowed` views.
    ///
    /// Arguments
    /// -----------------
    /// * `cam_id` — Camera type of every row in the batch.
    /// * `intensity` / `width` / `length` / `dca2` — Feature columns; all
    ///   lengths must match.
    /// * `offangle` — Optional off-axis column (same length), required only
    ///   for stratified builds.
    ///
    /// Panics
    /// ----------
    /// * Debug builds only: panics if the column lengths do not match.
    pub fn from_columns_borrowed(
        cam_id: impl Into<CamId>,
        intensity: &'a [f64],
        width: &'a [f64],
        length: &'a [f64],
        dca2: &'a [f64],
        offangle: Option<&'a [f64]>,
    ) -> Self {
        debug_assert_eq!(intensity.len(), width.len(), "intensity/width length mismatch");
        debug_assert_eq!(intensity.len(), length.len(), "intensity/length length mismatch");
        debug_assert_eq!(intensity.len(), dca2.len(), "intensity/dca2 length mismatch");
        if let Some(off) = offangle {
            debug_assert_eq!(intensity.len(), off.len(), "intensity/offangle length mismatch");
        }

        Self {
            cam_id: cam_id.into(),
            intensity: Cow::Borrowed(intensity),
            width: Cow::Borrowed(width),
            length: Cow::Borrowed(length),
            dca2: Cow::Borrowed(dca2),
            offangle: offangle.map(Cow::Borrowed),
        }
    }

    /// Construct a batch that **owns** copies of the provided columns.
    ///
    /// Use this when the source buffers are transient (e.g. decoded from an
    /// event stream) and the batch must outlive them.
    pub fn from_columns_owned(
        cam_id: impl Into<CamId>,
        intensity: &[f64],
        width: &[f64],
        length: &[f64],
        dca2: &[f64],
        offangle: Option<&[f64]>,
    ) -> FeatureBatch<'static> {
        debug_assert_eq!(intensity.len(), width.len(), "intensity/width length mismatch");
        debug_assert_eq!(intensity.len(), length.len(), "intensity/length length mismatch");
        debug_assert_eq!(intensity.len(), dca2.len(), "intensity/dca2 length mismatch");

        FeatureBatch {
            cam_id: cam_id.into(),
            intensity: Cow::Owned(intensity.to_vec()),
            width: Cow::Owned(width.to_vec()),
            length: Cow::Owned(length.to_vec()),
            dca2: Cow::Owned(dca2.to_vec()),
            offangle: offangle.map(|off| Cow::Owned(off.to_vec())),
        }
    }

    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }
}

/// Expand a single-camera batch into [`Observation`]s appended to a
/// [`FeatureSet`].
///
/// Rows land in the bucket of `batch.cam_id` in source order. No filtering
/// happens here: non-finite rows are kept and dropped later by the table
/// builders, so a set can be re-used for diagnostics on the raw sample.
pub(crate) fn observations_from_batch(set: &mut FeatureSet, batch: &FeatureBatch<'_>) {
    debug_assert_eq!(batch.intensity.len(), batch.width.len(), "intensity/width length mismatch");
    debug_assert_eq!(batch.intensity.len(), batch.length.len(), "intensity/length length mismatch");
    debug_assert_eq!(batch.intensity.len(), batch.dca2.len(), "intensity/dca2 length mismatch");

    let rows = set.entry(batch.cam_id.clone()).or_default();
    rows.reserve(batch.len());

    let offangle = batch.offangle.as_deref();
    for (i, (&intensity, &width, &length, &dca2)) in
        izip!(&*batch.intensity, &*batch.width, &*batch.length, &*batch.dca2).enumerate()
    {
        let mut obs = Observation::new(intensity, width, length, dca2);
        if let Some(off) = offangle {
            obs = obs.with_offangle(off[i]);
        }
        rows.push(obs);
    }
}

#[cfg(test)]
mod test_batch_reader {
    use super::*;

    #[test]
    fn expansion_groups_rows_under_the_batch_camera() {
        let mut set = FeatureSet::default();
        let batch = FeatureBatch::from_columns_borrowed(
            "FlashCam",
            &[100.0, 200.0],
            &[0.01, 0.02],
            &[0.05, 0.08],
            &[0.5, 1.5],
            None,
        );
        observations_from_batch(&mut set, &batch);
        observations_from_batch(&mut set, &batch);

        let rows = &set["FlashCam"];
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1].intensity, 200.0);
        assert_eq!(rows[1].offangle, None);
    }

    #[test]
    fn offangle_column_is_carried_per_row() {
        let mut set = FeatureSet::default();
        let batch = FeatureBatch::from_columns_owned(
            "LSTCam",
            &[100.0, 200.0],
            &[0.01, 0.02],
            &[0.05, 0.08],
            &[0.5, 1.5],
            Some(&[1.2, 3.4]),
        );
        observations_from_batch(&mut set, &batch);
        assert_eq!(set["LSTCam"][0].offangle, Some(1.2));
        assert_eq!(set["LSTCam"][1].offangle, Some(3.4));
    }
}
