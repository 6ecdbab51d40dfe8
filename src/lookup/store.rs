//! # Per-camera lookup store
//!
//! A [`LookupStore`] holds **one [`LookupTable`] per camera type** and is
//! the unit of persistence and merging: build one store per training
//! shard, fold the shards together with [`LookupStore::combine`], save the
//! result to JSON, and query it during reconstruction.
//!
//! ## Overview
//! -----------------
//! - [`LookupStore::build`] — one table per camera in a [`FeatureSet`];
//!   every camera must have a declared `size_max`.
//! - [`LookupStore::combine`] — count-weighted, NaN-safe merge across
//!   stores. Associative and commutative (up to float summation order),
//!   so shard-parallel builds merge to the same tables as one build over
//!   the concatenated rows.
//! - [`LookupStore::from_feature_files`] / [`LookupStore::combine_files`]
//!   — the multi-shard drivers (Parquet shards, saved stores).
//! - [`LookupStore::apply_min_stat`] — mask means below a count threshold.
//! - [`LookupStore::save`] / [`LookupStore::load`] — JSON persistence;
//!   a missing mean is stored as `null`, so sparse-cell positions survive
//!   the round trip exactly.
//!
//! ## Merge semantics
//! -----------------
//! Counts add exactly (`u64`). Means merge through the per-cell weighted
//! sum: a cell populated in only one input keeps that input's mean
//! untouched; a cell populated in several inputs gets the count-weighted
//! average. The two-value laws live in [`merge_sum`] and [`mean_from`]
//! and are unit-tested in all quadrants.
//!
//! ## See also
//! ------------
//! * [`LookupTable`] – The per-camera histogram.
//! * [`DiffuseLookupStore`](crate::lookup::diffuse::DiffuseLookupStore) –
//!   The off-axis stratified variant, built on top of this store.
//! * [`get_weight`](LookupStore::get_weight) – The query cascade
//!   (defined in [`crate::lookup::weights`]).
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{BufReader, BufWriter};

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "progress")]
use std::time::Duration;

#[cfg(feature = "progress")]
use super::progress_bar::{fmt_dur, IterTimer};

use crate::binning::BinGrid;
use crate::constants::CamId;
use crate::dcalut_errors::DcalutError;
use crate::features::feature_file::FeatureFile;
use crate::features::FeatureSet;
use crate::lookup::params::LutParams;
use crate::lookup::LookupTable;

/// NaN-safe sum of two optional per-cell weighted sums.
///
/// The four quadrants:
/// * `None + None = None` — a cell empty in every input stays empty.
/// * `Some(x) + None = Some(x)` and `None + Some(y) = Some(y)` — a cell
///   populated on one side only keeps that side's value untouched.
/// * `Some(x) + Some(y) = Some(x + y)`.
#[inline]
pub(crate) fn merge_sum(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (Some(x), Some(y)) => Some(x + y),
    }
}

/// Turn a merged weighted sum back into a per-cell mean.
///
/// A zero count always yields `None`, so the division can never be
/// attempted on an empty cell.
#[inline]
pub(crate) fn mean_from(sum: Option<f64>, count: u64) -> Option<f64> {
    if count == 0 {
        None
    } else {
        sum.map(|s| s / count as f64)
    }
}

/// Running merge state for one camera: exact counts plus the per-cell
/// weighted sum of means.
struct MergedTable {
    grid: BinGrid,
    counts: DMatrix<u64>,
    weighted_sum: DMatrix<Option<f64>>,
}

impl MergedTable {
    fn from_table(table: &LookupTable) -> Self {
        Self {
            grid: table.grid.clone(),
            counts: table.counts.clone(),
            weighted_sum: weighted_sum_of(table),
        }
    }

    fn absorb(&mut self, cam_id: &str, table: &LookupTable) -> Result<(), DcalutError> {
        if self.grid != table.grid {
            return Err(DcalutError::BinMismatch(format!(
                "camera '{cam_id}': cannot merge tables with different bin edges"
            )));
        }
        self.counts += &table.counts;
        self.weighted_sum = self.weighted_sum.zip_map(&weighted_sum_of(table), merge_sum);
        Ok(())
    }

    fn finish(self) -> LookupTable {
        let mean_dca2 = self.weighted_sum.zip_map(&self.counts, mean_from);
        LookupTable {
            grid: self.grid,
            counts: self.counts,
            mean_dca2,
        }
    }
}

/// Per-cell `count × mean`, `None` where the table holds no mean.
fn weighted_sum_of(table: &LookupTable) -> DMatrix<Option<f64>> {
    table
        .counts
        .zip_map(&table.mean_dca2, |n, m| m.map(|m| m * n as f64))
}

/// One lookup table per camera type.
///
/// See the [module docs](self) for the build → merge → persist → query
/// life cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LookupStore {
    tables: HashMap<CamId, LookupTable, RandomState>,
}

impl LookupStore {
    /// Create an empty store (no cameras).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one table per camera present in `features`.
    ///
    /// Arguments
    /// -----------------
    /// * `features` – Per-camera training rows.
    /// * `params` – Binning geometry and the per-camera `size_max` map.
    ///
    /// Return
    /// ----------
    /// * `Ok(LookupStore)` with one table per camera in `features`.
    /// * `Err(DcalutError::MissingSizeMax)` when a camera in `features`
    ///   has no `size_max` entry — cameras must be declared up front.
    ///
    /// See also
    /// ------------
    /// * [`LookupTable::build`] – The per-camera histogram build.
    /// * [`LookupStore::from_feature_files`] – Shard-by-shard driver.
    pub fn build(features: &FeatureSet, params: &LutParams) -> Result<Self, DcalutError> {
        let mut tables: HashMap<CamId, LookupTable, RandomState> = HashMap::default();
        for (cam_id, rows) in features {
            let size_max = *params
                .size_max
                .get(cam_id)
                .ok_or_else(|| DcalutError::MissingSizeMax(cam_id.clone()))?;
            let table = LookupTable::build(rows, size_max, params)?;
            tables.insert(cam_id.clone(), table);
        }
        Ok(Self { tables })
    }

    /// Merge any number of stores into one.
    ///
    /// The camera set of the result is the union of the inputs'. Per
    /// shared camera the bin edges must be identical; counts add exactly
    /// and means combine count-weighted (see the module docs). Cells
    /// populated in a single input keep that input's mean bit-for-bit.
    ///
    /// Merging is associative and commutative up to float summation
    /// order, and merging zero stores yields an empty store.
    ///
    /// Arguments
    /// -----------------
    /// * `stores` – The stores to merge, in any order.
    ///
    /// Return
    /// ----------
    /// * `Ok(LookupStore)` with the merged tables.
    /// * `Err(DcalutError::BinMismatch)` when a shared camera carries
    ///   different bin edges in two inputs.
    pub fn combine<'a, I>(stores: I) -> Result<Self, DcalutError>
    where
        I: IntoIterator<Item = &'a LookupStore>,
    {
        let mut merged: HashMap<CamId, MergedTable, RandomState> = HashMap::default();

        for store in stores {
            for (cam_id, table) in &store.tables {
                match merged.entry(cam_id.clone()) {
                    Entry::Occupied(mut e) => e.get_mut().absorb(cam_id, table)?,
                    Entry::Vacant(e) => {
                        e.insert(MergedTable::from_table(table));
                    }
                }
            }
        }

        let tables = merged
            .into_iter()
            .map(|(cam_id, acc)| (cam_id, acc.finish()))
            .collect();
        Ok(Self { tables })
    }

    /// Build a store from a list of Parquet shards, one shard at a time.
    ///
    /// Each shard is read into a [`FeatureSet`], built into a per-shard
    /// store, and folded into the running merge, so peak memory stays at
    /// one shard plus the merged tables regardless of the shard count.
    ///
    /// Arguments
    /// -----------------
    /// * `files` – The shard paths.
    /// * `params` – Binning geometry and the per-camera `size_max` map.
    ///
    /// Return
    /// ----------
    /// * `Ok(LookupStore)` with every shard merged in, or the first
    ///   ingestion/build/merge error.
    ///
    /// See also
    /// ------------
    /// * [`FeatureFile::new_from_parquet`] – The per-shard reader.
    /// * [`LookupStore::combine_files`] – Same fold over *saved* stores.
    #[cfg(not(feature = "progress"))]
    pub fn from_feature_files(
        files: &[Utf8PathBuf],
        params: &LutParams,
    ) -> Result<Self, DcalutError> {
        let mut total = LookupStore::new();
        for path in files {
            let features = FeatureSet::new_from_parquet(path, None)?;
            let shard = LookupStore::build(&features, params)?;
            total = LookupStore::combine([&total, &shard])?;
        }
        Ok(total)
    }

    /// Build a store from a list of Parquet shards, one shard at a time.
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
        let mut total = LookupStore::new();

        for path in files {
            let last = it_timer.tick();
            let avg = it_timer.avg();
            pb.set_message(format!("last: {}, avg: {}", fmt_dur(last), fmt_dur(avg)));

            let features = FeatureSet::new_from_parquet(path, None)?;
            let shard = LookupStore::build(&features, params)?;
            total = LookupStore::combine([&total, &shard])?;

            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(total)
    }

    /// Merge a list of *saved* stores (JSON files) into one.
    ///
    /// Arguments
    /// -----------------
    /// * `files` – Paths of stores written by [`LookupStore::save`].
    ///
    /// Return
    /// ----------
    /// * `Ok(LookupStore)` with every file merged in, or the first
    ///   load/merge error.
    pub fn combine_files(files: &[Utf8PathBuf]) -> Result<Self, DcalutError> {
        let mut total = LookupStore::new();
        for path in files {
            let shard = LookupStore::load(path)?;
            total = LookupStore::combine([&total, &shard])?;
        }
        Ok(total)
    }

    /// Mask the mean of every cell whose count is below `min_stat`.
    ///
    /// Counts are preserved; only the means are set to `None`. Weight
    /// queries reject such cells with
    /// [`InsufficientStatistics`](DcalutError::InsufficientStatistics)
    /// whatever the caller's own `min_stat`, which makes the masking
    /// suitable before distributing a merged store.
    pub fn apply_min_stat(&mut self, min_stat: u64) {
        for table in self.tables.values_mut() {
            table.mean_dca2 = table
                .counts
                .zip_map(&table.mean_dca2, |n, m| if n < min_stat { None } else { m });
        }
    }

    /// Write the store as JSON.
    ///
    /// Missing means serialize as `null`; counts and edges round-trip
    /// exactly, so `load(save(store)) == store`.
    pub fn save(&self, path: &Utf8Path) -> Result<(), DcalutError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Read a store written by [`LookupStore::save`].
    pub fn load(path: &Utf8Path) -> Result<Self, DcalutError> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Look up the cell holding `(intensity, ratio)` in one camera's table.
    ///
    /// Return
    /// ----------
    /// * `Ok((count, mean_dca2))` for the selected cell.
    /// * `Err(DcalutError::UnknownCamera)` when the store has no table for
    ///   `cam_id`, or the table's out-of-range error.
    pub fn query(
        &self,
        cam_id: &str,
        intensity: f64,
        ratio: f64,
    ) -> Result<(u64, Option<f64>), DcalutError> {
        let table = self
            .get(cam_id)
            .ok_or_else(|| DcalutError::UnknownCamera(cam_id.to_string()))?;
        table.query(intensity, ratio)
    }

    /// The table of one camera, if the store holds it.
    pub fn get(&self, cam_id: &str) -> Option<&LookupTable> {
        self.tables.get(cam_id)
    }

    /// Number of cameras in the store.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The camera ids present in the store (arbitrary order).
    pub fn cameras(&self) -> impl Iterator<Item = &CamId> {
        self.tables.keys()
    }

    /// Iterate over `(camera, table)` pairs (arbitrary order).
    pub fn iter(&self) -> impl Iterator<Item = (&CamId, &LookupTable)> {
        self.tables.iter()
    }
}
