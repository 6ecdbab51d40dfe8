//! # Parquet Reader for Feature Lists
//!
//! Ingestion of per-telescope feature rows from **Apache Parquet** shards
//! into a [`FeatureSet`]. The module focuses on a minimal, column-projected
//! read path and appends rows to the per-camera buckets in file order.
//!
//! ## Overview
//! -----------------
//! The single entry point is a crate-internal routine used by the public
//! [`FeatureFile`](crate::features::feature_file::FeatureFile) helpers. Key
//! design points:
//! - **Projection-first**: materialize only the columns the tables consume.
//! - **Typed downcast once per batch**: avoid per-row dynamic checks.
//! - **Fast path for non-null columns**: iterate over `&[f64]` slices.
//! - Columns are resolved by **name** in the projected batches, so shard
//!   column order does not matter.
//!
//! ## Expected Parquet Schema
//! -----------------
//! Required leaf columns:
//! - `intensity: Float64` — Image amplitude (photoelectrons).
//! - `width: Float64`, `length: Float64` — Hillas axes (shared unit).
//! - `dca2: Float64` — Squared distance of closest approach (degrees²).
//! - `cam_id: Utf8` — Camera type, the bucketing key.
//!
//! Optional leaf columns, attached to the rows when present in the schema:
//! - `offangle: Float64` — Off-axis angle (degrees), for diffuse training.
//! - `skewness`, `kurtosis`, `r: Float64` — Extra Hillas moments.
//!
//! A missing required column produces an `io::ErrorKind::NotFound` with a
//! clear message; a wrongly typed column an `io::ErrorKind::InvalidData`.
//!
//! ## Null Handling Policy
//! -----------------
//! - A null in a **required** column drops that row (fallback path only;
//!   shards without nulls take the fast path).
//! - A null in an **optional** column leaves the corresponding field unset
//!   without dropping the row.
//!
//! Non-finite values are *kept* here: the table builders filter them, so
//! the raw sample stays available for diagnostics.
use arrow_array::array::{Float64Array, StringArray};
use arrow_array::{Array, RecordBatch};
use camino::Utf8Path;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ProjectionMask};
use parquet::errors::ParquetError;
use std::io;

use crate::constants::FeatureList;
use crate::dcalut_errors::DcalutError;
use crate::features::{FeatureSet, Observation};

/// Required columns, resolved up front to build the projection mask.
const REQUIRED_COLUMNS: [&str; 5] = ["intensity", "width", "length", "dca2", "cam_id"];

/// Optional columns, projected only when the shard carries them.
const OPTIONAL_COLUMNS: [&str; 4] = ["offangle", "skewness", "kurtosis", "r"];

/// Load feature rows from a Parquet shard into an existing [`FeatureSet`].
///
/// Arguments
/// -----------------
/// * `set` – The mutable [`FeatureSet`] the rows are appended to.
/// * `parquet` – Path to the shard (schema above).
/// * `batch_size` – Optional Arrow reader batch size (default: 8192 rows).
///
/// Return
/// ----------
/// * `Ok(())` with rows appended in place, or a [`DcalutError`] on I/O,
///   schema, or decoding failures.
pub(crate) fn parquet_to_feature_set(
    set: &mut FeatureSet,
    parquet: &Utf8Path,
    batch_size: Option<usize>,
) -> Result<(), DcalutError> {
    let file = std::fs::File::open(parquet)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let schema_descr = builder.metadata().file_metadata().schema_descr();
    let all_fields = schema_descr.columns();

    let mut projection_indices: Vec<usize> = REQUIRED_COLUMNS
        .iter()
        .map(|name| {
            all_fields
                .iter()
                .position(|f| f.name() == *name)
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("Column '{name}' not found in schema"),
                    )
                })
        })
        .collect::<Result<_, io::Error>>()?;
    projection_indices.extend(
        OPTIONAL_COLUMNS
            .iter()
            .filter_map(|name| all_fields.iter().position(|f| f.name() == *name)),
    );
    let mask = ProjectionMask::leaves(schema_descr, projection_indices);

    let batch_size = batch_size.unwrap_or(8192);
    let reader = builder
        .with_projection(mask)
        .with_batch_size(batch_size)
        .build()?;

    for maybe_batch in reader {
        let batch = maybe_batch.map_err(ParquetError::from)?;
        let len = batch.num_rows();

        let intensity_arr = required_f64(&batch, "intensity")?;
        let width_arr = required_f64(&batch, "width")?;
        let length_arr = required_f64(&batch, "length")?;
        let dca2_arr = required_f64(&batch, "dca2")?;
        let cam_arr = batch
            .column_by_name("cam_id")
            .ok_or_else(|| missing_column("cam_id"))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| wrong_type("cam_id", "Utf8"))?;

        let offangle_arr = optional_f64(&batch, "offangle")?;
        let skewness_arr = optional_f64(&batch, "skewness")?;
        let kurtosis_arr = optional_f64(&batch, "kurtosis")?;
        let r_arr = optional_f64(&batch, "r")?;

        let no_nulls = intensity_arr.nulls().is_none()
            && width_arr.nulls().is_none()
            && length_arr.nulls().is_none()
            && dca2_arr.nulls().is_none()
            && cam_arr.nulls().is_none();

        if no_nulls {
            // Raw slice views over the required numeric columns.
            let intensity_vals: &[f64] = intensity_arr.values();
            let width_vals: &[f64] = width_arr.values();
            let length_vals: &[f64] = length_arr.values();
            let dca2_vals: &[f64] = dca2_arr.values();

            for i in 0..len {
                let mut obs = Observation::new(
                    intensity_vals[i],
                    width_vals[i],
                    length_vals[i],
                    dca2_vals[i],
                );
                attach_optional(&mut obs, i, offangle_arr, skewness_arr, kurtosis_arr, r_arr);
                push_row(set, cam_arr.value(i), obs);
            }
        } else {
            // Fallback: per-row null checks, incomplete rows skipped.
            for i in 0..len {
                if intensity_arr.is_null(i)
                    || width_arr.is_null(i)
                    || length_arr.is_null(i)
                    || dca2_arr.is_null(i)
                    || cam_arr.is_null(i)
                {
                    continue;
                }

                let mut obs = Observation::new(
                    intensity_arr.value(i),
                    width_arr.value(i),
                    length_arr.value(i),
                    dca2_arr.value(i),
                );
                attach_optional(&mut obs, i, offangle_arr, skewness_arr, kurtosis_arr, r_arr);
                push_row(set, cam_arr.value(i), obs);
            }
        }
    }

    Ok(())
}

fn missing_column(name: &str) -> DcalutError {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("Column '{name}' missing from projected batch"),
    )
    .into()
}

fn wrong_type(name: &str, expected: &str) -> DcalutError {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Column '{name}' must be of type {expected}"),
    )
    .into()
}

fn required_f64<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array, DcalutError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| missing_column(name))?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| wrong_type(name, "Float64"))
}

fn optional_f64<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<Option<&'a Float64Array>, DcalutError> {
    match batch.column_by_name(name) {
        None => Ok(None),
        Some(col) => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(Some)
            .ok_or_else(|| wrong_type(name, "Float64")),
    }
}

/// Fill the optional fields of a row from whichever optional columns the
/// shard carries (nulls leave the field unset).
fn attach_optional(
    obs: &mut Observation,
    i: usize,
    offangle: Option<&Float64Array>,
    skewness: Option<&Float64Array>,
    kurtosis: Option<&Float64Array>,
    r: Option<&Float64Array>,
) {
    obs.offangle = non_null_value(offangle, i);
    obs.skewness = non_null_value(skewness, i);
    obs.kurtosis = non_null_value(kurtosis, i);
    obs.r = non_null_value(r, i);
}

#[inline]
fn non_null_value(arr: Option<&Float64Array>, i: usize) -> Option<f64> {
    arr.and_then(|a| (!a.is_null(i)).then(|| a.value(i)))
}

/// Append a row to its camera bucket without allocating on the hot path.
#[inline]
fn push_row(set: &mut FeatureSet, cam: &str, obs: Observation) {
    if !set.contains_key(cam) {
        set.insert(cam.to_string(), FeatureList::new());
    }
    let rows = set.get_mut(cam).expect("bucket ensured above");
    rows.push(obs);
}
