//! End-to-end Parquet ingestion: shards written with the Arrow writer are
//! read back into per-camera feature rows and folded into lookup tables.

mod common;

use std::fs::File;
use std::sync::Arc;

use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use camino::{Utf8Path, Utf8PathBuf};
use dcalut::{DcalutError, FeatureFile, FeatureSet, LookupStore};
use parquet::arrow::ArrowWriter;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Shard scaffolding
// ---------------------------------------------------------------------------

fn scratch_file(dir: &TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("utf-8 temp path")
}

fn f64_col(values: Vec<f64>) -> ArrayRef {
    Arc::new(Float64Array::from(values))
}

fn nullable_f64_col(values: Vec<Option<f64>>) -> ArrayRef {
    Arc::new(Float64Array::from(values))
}

fn cam_col(values: Vec<&str>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

fn write_shard(path: &Utf8Path, batch: &RecordBatch) {
    let file = File::create(path).expect("create shard");
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).expect("open writer");
    writer.write(batch).expect("write batch");
    writer.close().expect("close shard");
}

/// A well-formed shard carrying the four required feature columns and `cam_id`.
fn plain_shard(
    path: &Utf8Path,
    cam_id: Vec<&str>,
    intensity: Vec<f64>,
    width: Vec<f64>,
    length: Vec<f64>,
    dca2: Vec<f64>,
) {
    let batch = RecordBatch::try_from_iter(vec![
        ("intensity", f64_col(intensity)),
        ("width", f64_col(width)),
        ("length", f64_col(length)),
        ("dca2", f64_col(dca2)),
        ("cam_id", cam_col(cam_id)),
    ])
    .expect("record batch");
    write_shard(path, &batch);
}

// ---------------------------------------------------------------------------
// Reading shards back
// ---------------------------------------------------------------------------

#[test]
fn shard_rows_are_grouped_by_camera() {
    let dir = TempDir::new().expect("tempdir");
    let path = scratch_file(&dir, "night1.parquet");

    plain_shard(
        &path,
        vec!["LSTCam", "LSTCam", "NectarCam"],
        vec![120.0, 340.0, 55.0],
        vec![0.03, 0.05, 0.02],
        vec![0.11, 0.12, 0.10],
        vec![0.4, 0.9, 1.3],
    );

    let set = FeatureSet::new_from_parquet(&path, None).expect("ingest shard");

    assert_eq!(set.len(), 2);
    assert_eq!(set["LSTCam"].len(), 2);
    assert_eq!(set["NectarCam"].len(), 1);

    // Doubles survive the Parquet round trip bit for bit.
    let obs = set["NectarCam"][0];
    assert_eq!(obs.intensity, 55.0);
    assert_eq!(obs.width, 0.02);
    assert_eq!(obs.length, 0.10);
    assert_eq!(obs.dca2, 1.3);
    assert!(obs.offangle.is_none());
    assert!(obs.skewness.is_none());
    assert!(obs.kurtosis.is_none());
    assert!(obs.r.is_none());
}

#[test]
fn optional_columns_are_read_when_present() {
    let dir = TempDir::new().expect("tempdir");
    let path = scratch_file(&dir, "diffuse.parquet");

    let batch = RecordBatch::try_from_iter(vec![
        ("intensity", f64_col(vec![120.0, 340.0, 55.0])),
        ("width", f64_col(vec![0.03, 0.05, 0.02])),
        ("length", f64_col(vec![0.11, 0.12, 0.10])),
        ("dca2", f64_col(vec![0.4, 0.9, 1.3])),
        ("cam_id", cam_col(vec!["LSTCam"; 3])),
        (
            "offangle",
            nullable_f64_col(vec![Some(1.5), None, Some(3.0)]),
        ),
    ])
    .expect("record batch");
    write_shard(&path, &batch);

    let set = FeatureSet::new_from_parquet(&path, None).expect("ingest shard");
    let rows = &set["LSTCam"];

    // A null in an optional column leaves that field unset for the row only.
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].offangle, Some(1.5));
    assert_eq!(rows[1].offangle, None);
    assert_eq!(rows[2].offangle, Some(3.0));
}

#[test]
fn nulls_in_required_columns_drop_those_rows_only() {
    let dir = TempDir::new().expect("tempdir");
    let path = scratch_file(&dir, "holes.parquet");

    let batch = RecordBatch::try_from_iter(vec![
        (
            "intensity",
            nullable_f64_col(vec![Some(120.0), None, Some(300.0)]),
        ),
        ("width", f64_col(vec![0.03, 0.05, 0.02])),
        ("length", f64_col(vec![0.11, 0.12, 0.10])),
        ("dca2", f64_col(vec![0.4, 0.9, 1.3])),
        ("cam_id", cam_col(vec!["LSTCam"; 3])),
    ])
    .expect("record batch");
    write_shard(&path, &batch);

    let set = FeatureSet::new_from_parquet(&path, None).expect("ingest shard");
    let rows = &set["LSTCam"];

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].intensity, 120.0);
    assert_eq!(rows[1].intensity, 300.0);
}

#[test]
fn a_shard_missing_a_required_column_is_refused() {
    let dir = TempDir::new().expect("tempdir");
    let path = scratch_file(&dir, "no_dca2.parquet");

    let batch = RecordBatch::try_from_iter(vec![
        ("intensity", f64_col(vec![120.0, 340.0])),
        ("width", f64_col(vec![0.03, 0.05])),
        ("length", f64_col(vec![0.11, 0.12])),
        ("cam_id", cam_col(vec!["LSTCam"; 2])),
    ])
    .expect("record batch");
    write_shard(&path, &batch);

    let err = FeatureSet::new_from_parquet(&path, None).unwrap_err();
    assert!(matches!(err, DcalutError::IoError(_)));
    assert!(err.to_string().contains("dca2"));
}

#[test]
fn add_from_parquet_appends_to_the_existing_buckets() {
    let dir = TempDir::new().expect("tempdir");
    let p1 = scratch_file(&dir, "night1.parquet");
    let p2 = scratch_file(&dir, "night2.parquet");

    plain_shard(
        &p1,
        vec!["LSTCam", "LSTCam"],
        vec![120.0, 340.0],
        vec![0.03, 0.05],
        vec![0.11, 0.12],
        vec![0.4, 0.9],
    );
    plain_shard(
        &p2,
        vec!["LSTCam", "FlashCam", "FlashCam"],
        vec![210.0, 66.0, 78.0],
        vec![0.04, 0.02, 0.03],
        vec![0.10, 0.09, 0.11],
        vec![0.7, 1.1, 0.6],
    );

    let mut set = FeatureSet::new_from_parquet(&p1, None).expect("shard 1");
    set.add_from_parquet(&p2, None).expect("shard 2");

    assert_eq!(set.len(), 2);
    assert_eq!(set["LSTCam"].len(), 3);
    assert_eq!(set["FlashCam"].len(), 2);
}

// ---------------------------------------------------------------------------
// Shard-by-shard folding
// ---------------------------------------------------------------------------

#[test]
fn from_feature_files_matches_one_build_over_everything() {
    let dir = TempDir::new().expect("tempdir");
    let p1 = scratch_file(&dir, "run1.parquet");
    let p2 = scratch_file(&dir, "run2.parquet");

    plain_shard(
        &p1,
        vec!["LSTCam"; 6],
        vec![150.0; 6],
        vec![0.03; 6],
        vec![0.1; 6],
        vec![0.5; 6],
    );
    plain_shard(
        &p2,
        vec![
            "LSTCam",
            "LSTCam",
            "NectarCam",
            "NectarCam",
            "NectarCam",
            "NectarCam",
            "NectarCam",
            "NectarCam",
        ],
        vec![150.0, 150.0, 50.0, 50.0, 50.0, 50.0, 50.0, 50.0],
        vec![0.03, 0.03, 0.01, 0.01, 0.01, 0.01, 0.01, 0.01],
        vec![0.1; 8],
        vec![1.0, 1.0, 0.25, 0.25, 0.25, 0.25, 0.25, 0.25],
    );

    let params = common::array_params();
    let via_shards =
        LookupStore::from_feature_files(&[p1.clone(), p2.clone()], &params).expect("fold shards");

    let mut all = FeatureSet::new_from_parquet(&p1, None).expect("shard 1");
    all.add_from_parquet(&p2, None).expect("shard 2");
    let in_one_go = LookupStore::build(&all, &params).expect("single build");

    assert_eq!(via_shards, in_one_go);

    // Six rows at 0.5 deg^2 and two at 1.0 share one LSTCam cell.
    assert_eq!(
        via_shards.query("LSTCam", 150.0, 0.3).expect("cell"),
        (8, Some(0.625))
    );
    assert_eq!(
        via_shards.query("NectarCam", 50.0, 0.1).expect("cell"),
        (6, Some(0.25))
    );
}
