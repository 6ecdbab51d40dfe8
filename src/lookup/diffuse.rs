//! # Off-axis stratified lookup tables
//!
//! Point-source tables assume every training shower came from the camera
//! center. Diffuse gamma training covers a range of off-axis angles, and
//! the DCA² statistics drift with that angle — so the training rows are
//! **stratified**: one full [`LookupStore`] per off-axis angle interval,
//! selected at query time from the event's reconstructed off-axis angle.
//!
//! ## Stratification rule
//! -----------------
//! The strata are declared as ordered `[lo, hi]` pairs
//! ([`LutParams::off_bins`](crate::lookup::params::LutParams)). A training
//! row with off-axis angle `a` belongs to stratum `k` when
//! `lo_k <= a < hi_k`; the **last** stratum is closed at its upper bound.
//! Every row therefore contributes to exactly one stratum — a row sitting
//! on a shared boundary such as `2.0` in `[0,2][2,4]` counts once, in the
//! upper stratum. Rows without a finite off-axis angle are skipped.
//!
//! ## Query-side stratum selection
//! -----------------
//! The stratum of a query angle is `#{boundary values < a} / 2` over the
//! flattened pair list, which reproduces the build-side assignment for
//! angles inside the partition. An angle beyond the last stratum **falls
//! back to the last stratum** rather than failing: the outermost table is
//! the best available statistics for a far-off-axis event, and the
//! per-telescope cuts still apply. Angles below the first stratum use the
//! first one, symmetrically.
//!
//! ## See also
//! ------------
//! * [`LookupStore`] – The per-stratum building block.
//! * [`DiffuseLookupStore::get_weight`](crate::lookup::weights) – The
//!   weight cascade with stratum selection in front.
use std::collections::HashMap;
use std::io::{BufReader, BufWriter};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "progress")]
use std::time::Duration;

#[cfg(feature = "progress")]
use super::progress_bar::{fmt_dur, IterTimer};

use crate::constants::{Degree, FeatureList, OffAxisBins};
use crate::dcalut_errors::DcalutError;
use crate::features::feature_file::FeatureFile;
use crate::features::{FeatureSet, Observation};
use crate::lookup::params::LutParams;
use crate::lookup::store::LookupStore;

/// One [`LookupStore`] per off-axis angle stratum.
///
/// Invariants
/// -----------------
/// * `strata.len() == off_bins.len()`, index-aligned.
/// * All strata share the camera set of the training rows (a camera with
///   no rows in some stratum still gets an empty table there).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffuseLookupStore {
    off_bins: OffAxisBins,
    strata: Vec<LookupStore>,
}

/// Build-side stratum membership (last stratum closed at `hi`).
fn in_stratum(obs: &Observation, lo: Degree, hi: Degree, last: bool) -> bool {
    match obs.finite_offangle() {
        Some(a) => a >= lo && (a < hi || (last && a <= hi)),
        None => false,
    }
}

impl DiffuseLookupStore {
    /// Build the stratified tables from diffuse training rows.
    ///
    /// `params.off_bins` declares the strata (it is required here);
    /// per stratum, the rows whose off-axis angle falls inside the
    /// interval are selected and handed to [`LookupStore::build`], so all
    /// per-camera rules (declared `size_max`, non-finite filtering) apply
    /// per stratum.
    ///
    /// Arguments
    /// -----------------
    /// * `features` – Per-camera diffuse training rows (with `offangle`).
    /// * `params` – Binning geometry, `size_max` map, and the strata.
    ///
    /// Return
    /// ----------
    /// * `Ok(DiffuseLookupStore)` with one store per stratum.
    /// * `Err(DcalutError::InvalidParameter)` when `params.off_bins` is
    ///   `None`, or any error of [`LookupStore::build`].
    pub fn build(features: &FeatureSet, params: &LutParams) -> Result<Self, DcalutError> {
        let off_bins = params.off_bins.clone().ok_or_else(|| {
            DcalutError::InvalidParameter(
                "off_bins must be declared to build stratified tables".into(),
            )
        })?;

        let mut strata = Vec::with_capacity(off_bins.len());
        for (k, pair) in off_bins.iter().enumerate() {
            let [lo, hi] = *pair;
            let last = k + 1 == off_bins.len();

            let mut stratum_set: FeatureSet = HashMap::default();
            for (cam_id, rows) in features {
                let selected: FeatureList = rows
                    .iter()
                    .filter(|obs| in_stratum(obs, lo, hi, last))
                    .copied()
                    .collect();
                stratum_set.insert(cam_id.clone(), selected);
            }

            strata.push(LookupStore::build(&stratum_set, params)?);
        }

        Ok(Self { off_bins, strata })
    }

    /// Merge any number of stratified stores into one.
    ///
    /// Every input must carry the **same** `off_bins` partition; the
    /// strata are then merged pairwise with [`LookupStore::combine`].
    /// Merging zero stores yields an empty store with no strata.
    ///
    /// Return
    /// ----------
    /// * `Ok(DiffuseLookupStore)` with the merged strata.
    /// * `Err(DcalutError::BinMismatch)` when the partitions differ, or
    ///   any per-stratum merge error.
    pub fn combine<'a, I>(stores: I) -> Result<Self, DcalutError>
    where
        I: IntoIterator<Item = &'a DiffuseLookupStore>,
    {
        let mut inputs = stores.into_iter();
        let Some(first) = inputs.next() else {
            return Ok(Self {
                off_bins: OffAxisBins::new(),
                strata: Vec::new(),
            });
        };

        let mut per_stratum: Vec<Vec<&LookupStore>> =
            first.strata.iter().map(|s| vec![s]).collect();

        for store in inputs {
            if store.off_bins != first.off_bins {
                return Err(DcalutError::BinMismatch(
                    "cannot merge stratified stores with different off-axis partitions".into(),
                ));
            }
            for (bucket, stratum) in per_stratum.iter_mut().zip(&store.strata) {
                bucket.push(stratum);
            }
        }

        let strata = per_stratum
            .into_iter()
            .map(|bucket| LookupStore::combine(bucket.into_iter()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            off_bins: first.off_bins.clone(),
            strata,
        })
    }

    /// Build a stratified store from a list of Parquet shards.
    ///
    /// Shard-at-a-time fold, like
    /// [`LookupStore::from_feature_files`]: read, build, merge, drop.
    #[cfg(not(feature = "progress"))]
    pub fn from_feature_files(
        files: &[Utf8PathBuf],
        params: &LutParams,
    ) -> Result<Self, DcalutError> {
        let mut total: Option<DiffuseLookupStore> = None;
        for path in files {
            let features = FeatureSet::new_from_parquet(path, None)?;
            let shard = DiffuseLookupStore::build(&features, params)?;
            total = Some(match total {
                None => shard,
                Some(done) => DiffuseLookupStore::combine([&done, &shard])?,
            });
        }
        match total {
            Some(store) => Ok(store),
            None => DiffuseLookupStore::build(&HashMap::default(), params),
        }
    }

    /// Build a stratified store from a list of Parquet shards.
    ///
    /// Progress-bar variant; see the non-`progress` build for the
    /// semantics.
    #[cfg(feature = "progress")]
    pub fn from_feature_files(
        files: &[Utf8PathBuf],
        params: &LutParams,
    ) -> Result<Self, DcalutError> {
        let pb = ProgressBar::new((files.len() as u64).max(1));
        pb.set_style(
            ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) \
             | {per_sec} | ETA {eta_precise} | {msg}",
            )
            .expect("indicatif template"),
        );
        pb.enable_steady_tick(Duration::from_millis(200));

        let mut it_timer = IterTimer::new(0.2);
        let mut total: Option<DiffuseLookupStore> = None;

        for path in files {
            let last = it_timer.tick();
            let avg = it_timer.avg();
            pb.set_message(format!("last: {}, avg: {}", fmt_dur(last), fmt_dur(avg)));

            let features = FeatureSet::new_from_parquet(path, None)?;
            let shard = DiffuseLookupStore::build(&features, params)?;
            total = Some(match total {
                None => shard,
                Some(done) => DiffuseLookupStore::combine([&done, &shard])?,
            });

            pb.inc(1);
        }

        pb.finish_and_clear();
        match total {
            Some(store) => Ok(store),
            None => DiffuseLookupStore::build(&HashMap::default(), params),
        }
    }

    /// Write the stratified store as JSON (`off_bins` + per-stratum stores).
    pub fn save(&self, path: &Utf8Path) -> Result<(), DcalutError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Read a store written by [`DiffuseLookupStore::save`].
    pub fn load(path: &Utf8Path) -> Result<Self, DcalutError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// The stratum a query angle selects, with the out-of-partition
    /// fallback described in the module docs. `None` only for a store
    /// with no strata.
    pub(crate) fn stratum_index(&self, offangle: Degree) -> Option<usize> {
        if self.strata.is_empty() {
            return None;
        }
        let below = self
            .off_bins
            .iter()
            .flatten()
            .filter(|b| **b < offangle)
            .count();
        Some((below / 2).min(self.strata.len() - 1))
    }

    /// Look up the cell holding `(intensity, ratio)` in the stratum
    /// selected by `offangle`.
    ///
    /// Arguments
    /// -----------------
    /// * `cam_id` – Camera type of the image.
    /// * `intensity`, `ratio` – The table coordinates.
    /// * `offangle` – Reconstructed off-axis angle of the event \[deg\].
    ///
    /// Return
    /// ----------
    /// * `Ok((count, mean_dca2))` from the selected stratum's table.
    /// * `Err(DcalutError::UnknownCamera)` when the store has no strata or
    ///   the stratum has no table for `cam_id`; out-of-range propagates
    ///   as [`LookupOutOfRange`](DcalutError::LookupOutOfRange).
    pub fn query(
        &self,
        cam_id: &str,
        intensity: f64,
        ratio: f64,
        offangle: Degree,
    ) -> Result<(u64, Option<f64>), DcalutError> {
        let stratum = self
            .stratum_index(offangle)
            .ok_or_else(|| DcalutError::UnknownCamera(cam_id.to_string()))?;
        self.strata[stratum].query(cam_id, intensity, ratio)
    }

    /// The declared off-axis partition.
    pub fn off_bins(&self) -> &[[Degree; 2]] {
        &self.off_bins
    }

    /// Number of strata.
    pub fn n_strata(&self) -> usize {
        self.strata.len()
    }

    /// The per-stratum store at index `k`.
    pub fn stratum(&self, k: usize) -> Option<&LookupStore> {
        self.strata.get(k)
    }
}

#[cfg(test)]
mod diffuse_tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(intensity: f64, ratio: f64, dca2: f64, offangle: Degree) -> Observation {
        Observation::new(intensity, ratio * 0.1, 0.1, dca2).with_offangle(offangle)
    }

    fn single_cam_set(rows: Vec<Observation>) -> FeatureSet {
        let mut set: FeatureSet = HashMap::default();
        set.insert("LSTCam".to_string(), rows);
        set
    }

    fn two_strata_params() -> LutParams {
        LutParams::builder()
            .size_max_for("LSTCam", 1000.0)
            .bins([4, 4])
            .off_bins(vec![[0.0, 2.0], [2.0, 4.0]])
            .build()
            .unwrap()
    }

    fn four_strata_params() -> LutParams {
        LutParams::builder()
            .size_max_for("LSTCam", 1000.0)
            .bins([4, 4])
            .default_off_bins()
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_declared_strata() {
        let params = LutParams::builder()
            .size_max_for("LSTCam", 1000.0)
            .build()
            .unwrap();
        let err = DiffuseLookupStore::build(&single_cam_set(vec![]), &params).unwrap_err();
        assert!(matches!(err, DcalutError::InvalidParameter(_)));
    }

    #[test]
    fn boundary_row_lands_in_the_upper_stratum_only() {
        let params = two_strata_params();
        let rows = vec![
            row(150.0, 0.3, 1.0, 1.0),
            // Exactly on the shared boundary: upper stratum only.
            row(150.0, 0.3, 1.0, 2.0),
            row(150.0, 0.3, 1.0, 3.0),
        ];
        let store = DiffuseLookupStore::build(&single_cam_set(rows), &params).unwrap();

        let s0 = store.stratum(0).unwrap().get("LSTCam").unwrap();
        let s1 = store.stratum(1).unwrap().get("LSTCam").unwrap();
        assert_eq!(s0.n_samples(), 1);
        assert_eq!(s1.n_samples(), 2);
    }

    #[test]
    fn last_stratum_is_closed_at_its_upper_bound() {
        let params = two_strata_params();
        let rows = vec![row(150.0, 0.3, 1.0, 4.0)];
        let store = DiffuseLookupStore::build(&single_cam_set(rows), &params).unwrap();

        assert_eq!(store.stratum(0).unwrap().get("LSTCam").unwrap().n_samples(), 0);
        assert_eq!(store.stratum(1).unwrap().get("LSTCam").unwrap().n_samples(), 1);
    }

    #[test]
    fn rows_without_offangle_are_skipped() {
        let params = two_strata_params();
        let rows = vec![
            Observation::new(150.0, 0.03, 0.1, 1.0),
            Observation::new(150.0, 0.03, 0.1, 1.0).with_offangle(f64::NAN),
        ];
        let store = DiffuseLookupStore::build(&single_cam_set(rows), &params).unwrap();

        let total: u64 = (0..store.n_strata())
            .map(|k| store.stratum(k).unwrap().get("LSTCam").unwrap().n_samples())
            .sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn query_selects_the_matching_stratum() {
        let params = four_strata_params();
        // One row per stratum, with a stratum-identifying DCA².
        let rows = vec![
            row(150.0, 0.3, 1.0, 1.0),
            row(150.0, 0.3, 2.0, 3.0),
            row(150.0, 0.3, 3.0, 5.0),
            row(150.0, 0.3, 4.0, 7.0),
        ];
        let store = DiffuseLookupStore::build(&single_cam_set(rows), &params).unwrap();

        for (offangle, expected) in [(0.5, 1.0), (3.0, 2.0), (4.5, 3.0), (9.9, 4.0)] {
            let (count, mean) = store.query("LSTCam", 150.0, 0.3, offangle).unwrap();
            assert_eq!(count, 1, "offangle {offangle}");
            assert_relative_eq!(mean.unwrap(), expected);
        }
    }

    #[test]
    fn out_of_partition_angles_fall_back_to_the_edge_strata() {
        let params = four_strata_params();
        let rows = vec![
            row(150.0, 0.3, 1.0, 1.0),
            row(150.0, 0.3, 4.0, 7.0),
        ];
        let store = DiffuseLookupStore::build(&single_cam_set(rows), &params).unwrap();

        // Beyond the last stratum: last stratum answers.
        let (_, mean) = store.query("LSTCam", 150.0, 0.3, 25.0).unwrap();
        assert_relative_eq!(mean.unwrap(), 4.0);

        // Below the first stratum: first stratum answers.
        let (_, mean) = store.query("LSTCam", 150.0, 0.3, -1.0).unwrap();
        assert_relative_eq!(mean.unwrap(), 1.0);
    }

    #[test]
    fn combine_merges_stratum_by_stratum() {
        let params = two_strata_params();
        let a = DiffuseLookupStore::build(
            &single_cam_set(vec![row(150.0, 0.3, 2.0, 1.0); 3]),
            &params,
        )
        .unwrap();
        let b = DiffuseLookupStore::build(
            &single_cam_set(vec![row(150.0, 0.3, 6.0, 1.0); 1]),
            &params,
        )
        .unwrap();

        let merged = DiffuseLookupStore::combine([&a, &b]).unwrap();

        let (count, mean) = merged.query("LSTCam", 150.0, 0.3, 1.0).unwrap();
        assert_eq!(count, 4);
        // (3 × 2.0 + 1 × 6.0) / 4
        assert_relative_eq!(mean.unwrap(), 3.0);

        // The other stratum stays empty.
        let (count, mean) = merged.query("LSTCam", 150.0, 0.3, 3.0).unwrap();
        assert_eq!(count, 0);
        assert!(mean.is_none());
    }

    #[test]
    fn combine_rejects_mismatched_partitions() {
        let rows = vec![row(150.0, 0.3, 1.0, 1.0)];
        let a = DiffuseLookupStore::build(&single_cam_set(rows.clone()), &two_strata_params())
            .unwrap();
        let b =
            DiffuseLookupStore::build(&single_cam_set(rows), &four_strata_params()).unwrap();

        let err = DiffuseLookupStore::combine([&a, &b]).unwrap_err();
        assert!(matches!(err, DcalutError::BinMismatch(_)));
    }

    #[test]
    fn combine_of_nothing_has_no_strata() {
        let merged = DiffuseLookupStore::combine(std::iter::empty()).unwrap();
        assert_eq!(merged.n_strata(), 0);
        assert!(merged.query("LSTCam", 150.0, 0.3, 1.0).is_err());
    }
}
