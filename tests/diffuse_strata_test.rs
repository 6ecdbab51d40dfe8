use approx::assert_relative_eq;

use dcalut::{DcalutError, DiffuseLookupStore, FeatureSet, LutParams, Observation};

mod common;
use common::array_params;

fn stratified_params() -> LutParams {
    LutParams::builder()
        .size_max_for("LSTCam", 1000.0)
        .bins([4, 4])
        .min_stat(5)
        .default_off_bins()
        .build()
        .unwrap()
}

/// Six rows in the cell around (150 p.e., ratio 0.3), tagged with one
/// off-axis angle and one DCA² per stratum.
fn stratum_rows(offangle: f64, dca2: f64) -> Vec<Observation> {
    vec![Observation::new(150.0, 0.03, 0.1, dca2).with_offangle(offangle); 6]
}

fn four_strata_store() -> DiffuseLookupStore {
    let mut rows = Vec::new();
    rows.extend(stratum_rows(1.0, 0.25));
    rows.extend(stratum_rows(3.0, 0.5));
    rows.extend(stratum_rows(5.0, 1.0));
    rows.extend(stratum_rows(7.0, 2.0));

    let mut set = FeatureSet::default();
    set.insert("LSTCam".to_string(), rows);
    DiffuseLookupStore::build(&set, &stratified_params()).unwrap()
}

#[test]
fn rows_are_partitioned_by_off_axis_angle() {
    let store = four_strata_store();
    assert_eq!(store.n_strata(), 4);

    for k in 0..4 {
        let stratum = store.stratum(k).unwrap();
        assert_eq!(stratum.get("LSTCam").unwrap().n_samples(), 6);
    }
}

#[test]
fn queries_select_the_stratum_of_their_angle() {
    let store = four_strata_store();
    let params = stratified_params();
    let probe = Observation::new(150.0, 0.03, 0.1, 0.0);

    for (offangle, expected) in [(1.0, 4.0), (3.0, 2.0), (5.0, 1.0), (7.0, 0.5)] {
        let weight = store.get_weight("LSTCam", &probe, offangle, &params).unwrap();
        assert_relative_eq!(weight, expected);
    }
}

#[test]
fn out_of_partition_angles_fall_back_to_the_nearest_stratum() {
    let store = four_strata_store();
    let params = stratified_params();
    let probe = Observation::new(150.0, 0.03, 0.1, 0.0);

    // Below the first stratum and far beyond the last one.
    let near = store.get_weight("LSTCam", &probe, 0.0, &params).unwrap();
    let far = store.get_weight("LSTCam", &probe, 25.0, &params).unwrap();
    assert_relative_eq!(near, 4.0);
    assert_relative_eq!(far, 0.5);
}

#[test]
fn rows_without_an_angle_never_enter_the_tables() {
    let mut rows = stratum_rows(1.0, 0.25);
    rows.push(Observation::new(150.0, 0.03, 0.1, 0.25)); // no offangle
    rows.push(Observation::new(150.0, 0.03, 0.1, 0.25).with_offangle(f64::NAN));

    let mut set = FeatureSet::default();
    set.insert("LSTCam".to_string(), rows);
    let store = DiffuseLookupStore::build(&set, &stratified_params()).unwrap();

    assert_eq!(store.stratum(0).unwrap().get("LSTCam").unwrap().n_samples(), 6);
}

#[test]
fn strata_combine_pairwise() {
    let half = |dca2: f64| {
        let mut set = FeatureSet::default();
        let mut rows = stratum_rows(1.0, dca2);
        rows.extend(stratum_rows(3.0, dca2));
        set.insert("LSTCam".to_string(), rows);
        DiffuseLookupStore::build(&set, &stratified_params()).unwrap()
    };

    let merged = DiffuseLookupStore::combine([&half(0.25), &half(0.75)]).unwrap();
    assert_eq!(merged.n_strata(), 4);
    for k in 0..2 {
        let table = merged.stratum(k).unwrap().get("LSTCam").unwrap();
        assert_eq!(table.n_samples(), 12);
    }
    // Means average across the merged halves.
    let (count, mean) = merged.query("LSTCam", 150.0, 0.3, 1.0).unwrap();
    assert_eq!(count, 12);
    assert_relative_eq!(mean.unwrap(), 0.5);
}

#[test]
fn combining_different_partitions_is_refused() {
    let build_with = |off_bins: Vec<[f64; 2]>| {
        let params = LutParams::builder()
            .size_max_for("LSTCam", 1000.0)
            .bins([4, 4])
            .off_bins(off_bins)
            .build()
            .unwrap();
        let mut set = FeatureSet::default();
        set.insert("LSTCam".to_string(), stratum_rows(1.0, 0.25));
        DiffuseLookupStore::build(&set, &params).unwrap()
    };

    let two = build_with(vec![[0.0, 2.0], [2.0, 4.0]]);
    let three = build_with(vec![[0.0, 2.0], [2.0, 4.0], [4.0, 8.0]]);

    let err = DiffuseLookupStore::combine([&two, &three]).unwrap_err();
    assert!(matches!(err, DcalutError::BinMismatch(_)));
}

#[test]
fn stratified_build_requires_a_partition() {
    let mut set = FeatureSet::default();
    set.insert("LSTCam".to_string(), stratum_rows(1.0, 0.25));

    // array_params declares no off-axis partition.
    let err = DiffuseLookupStore::build(&set, &array_params()).unwrap_err();
    assert!(matches!(err, DcalutError::InvalidParameter(_)));
}
