use rand::rngs::StdRng;
use rand::SeedableRng;

use dcalut::{DcalutError, FeatureSet, LookupStore, LutParams};

mod common;
use common::{array_params, assert_stores_close, uniform_rows};

fn shard(rng: &mut StdRng, n_lst: usize, n_nectar: usize) -> FeatureSet {
    let mut set = FeatureSet::default();
    set.insert("LSTCam".to_string(), uniform_rows(rng, n_lst));
    set.insert("NectarCam".to_string(), uniform_rows(rng, n_nectar));
    set
}

#[test]
fn combining_shards_matches_one_build_over_everything() {
    let params = array_params();
    let mut rng = StdRng::seed_from_u64(0xDCA);

    let shards = [
        shard(&mut rng, 400, 150),
        shard(&mut rng, 250, 80),
        shard(&mut rng, 30, 300),
    ];

    let partials: Vec<LookupStore> = shards
        .iter()
        .map(|s| LookupStore::build(s, &params).unwrap())
        .collect();
    let combined = LookupStore::combine(&partials).unwrap();

    let mut everything = FeatureSet::default();
    for s in &shards {
        for (cam_id, rows) in s {
            everything
                .entry(cam_id.clone())
                .or_default()
                .extend_from_slice(rows);
        }
    }
    let reference = LookupStore::build(&everything, &params).unwrap();

    assert_stores_close(&combined, &reference);
}

#[test]
fn combine_is_insensitive_to_fold_order() {
    let params = array_params();
    let mut rng = StdRng::seed_from_u64(7);

    let a = LookupStore::build(&shard(&mut rng, 200, 60), &params).unwrap();
    let b = LookupStore::build(&shard(&mut rng, 90, 110), &params).unwrap();
    let c = LookupStore::build(&shard(&mut rng, 310, 40), &params).unwrap();

    let flat = LookupStore::combine([&a, &b, &c]).unwrap();
    let left = LookupStore::combine([&LookupStore::combine([&a, &b]).unwrap(), &c]).unwrap();
    let right = LookupStore::combine([&a, &LookupStore::combine([&b, &c]).unwrap()]).unwrap();

    assert_stores_close(&left, &flat);
    assert_stores_close(&right, &flat);
}

#[test]
fn combining_different_geometries_is_refused() {
    let mut rng = StdRng::seed_from_u64(11);
    let set = shard(&mut rng, 50, 50);

    let coarse_params = LutParams::builder()
        .size_max_for("LSTCam", 1000.0)
        .size_max_for("NectarCam", 500.0)
        .bins([2, 4])
        .build()
        .unwrap();

    let fine = LookupStore::build(&set, &array_params()).unwrap();
    let coarse = LookupStore::build(&set, &coarse_params).unwrap();

    let err = LookupStore::combine([&fine, &coarse]).unwrap_err();
    assert!(matches!(err, DcalutError::BinMismatch(_)));
}

#[test]
fn min_stat_masking_keeps_counts() {
    let params = array_params();
    let mut rng = StdRng::seed_from_u64(23);

    let mut store = LookupStore::build(&shard(&mut rng, 500, 200), &params).unwrap();
    store.apply_min_stat(u64::MAX);

    // Every cell keeps its count but loses its mean.
    for (_, table) in store.iter() {
        assert!(table.mean_dca2().iter().all(|m| m.is_none()));
    }
    let (count, mean) = store.query("LSTCam", 150.0, 0.3).unwrap();
    assert!(count > 0, "seeded sample should populate an interior cell");
    assert_eq!(mean, None);
}
