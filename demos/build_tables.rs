//! Build per-camera DCA² lookup tables and write them to JSON.
//!
//! Usage:
//!   build_tables [SHARD.parquet ...] [-o TABLES.json]
//! Example:
//!   build_tables dca_features_night1.parquet dca_features_night2.parquet -o tables.json
//!
//! With no shard arguments a synthetic training sample is drawn instead, so
//! the demo runs standalone. The store is written to `dca_tables.json` unless
//! `-o` says otherwise.
use std::env;

use camino::Utf8PathBuf;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dcalut::{DcalutError, FeatureSet, LookupStore, LutParams, Observation};

/// Draw a synthetic training sample for two camera types.
///
/// Intensities are log-uniform over each camera axis; DCA² grows with the
/// width/length ratio so the tables pick up the usual elongation trend.
///
/// Arguments
/// -----------------
/// * `rng`: Seeded generator, so repeated runs build identical tables.
/// * `n_per_cam`: Number of rows drawn for each camera type.
///
/// Return
/// ----------
/// * A [`FeatureSet`] with `LSTCam` and `NectarCam` buckets.
fn synthetic_features(rng: &mut StdRng, n_per_cam: usize) -> FeatureSet {
    let mut features = FeatureSet::default();
    for (cam_id, size_max) in [("LSTCam", 3.0e5_f64), ("NectarCam", 1.0e5)] {
        let rows = features.entry(cam_id.to_string()).or_default();
        for _ in 0..n_per_cam {
            let intensity = 10f64.powf(rng.random_range(1.0..size_max.log10()));
            let length = rng.random_range(0.05..0.4);
            let width = length * rng.random_range(0.05..0.95);
            let dca2 = (0.01 + rng.random_range(0.0..0.05)) * (1.0 + 8.0 * width / length);
            rows.push(Observation::new(intensity, width, length, dca2));
        }
    }
    features
}

fn main() -> Result<(), DcalutError> {
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    let out = if let Some(pos) = args.iter().position(|a| a == "-o") {
        args.remove(pos);
        Utf8PathBuf::from(args.remove(pos))
    } else {
        Utf8PathBuf::from("dca_tables.json")
    };

    let params = LutParams::builder()
        .size_max_for("LSTCam", 3.0e5)
        .size_max_for("NectarCam", 1.0e5)
        .bins([10, 10])
        .min_stat(5)
        .ratio_cut(1.0)
        .build()?;

    println!("Building tables with params: {params:#}");

    let store = if args.is_empty() {
        println!("No shards given, drawing a synthetic training sample.");
        let mut rng = StdRng::seed_from_u64(42);
        let features = synthetic_features(&mut rng, 50_000);
        LookupStore::build(&features, &params)?
    } else {
        let shards: Vec<Utf8PathBuf> = args.iter().map(Utf8PathBuf::from).collect();
        println!("Folding {} shard(s) into one store.", shards.len());
        LookupStore::from_feature_files(&shards, &params)?
    };

    for (cam_id, table) in store.iter() {
        let filled = table.counts().iter().filter(|&&n| n > 0).count();
        let cells = table.n_intensity_bins() * table.n_ratio_bins();
        println!(
            "{cam_id}: {} rows over {filled}/{cells} cells",
            table.n_samples()
        );
    }

    store.save(&out)?;
    println!("Tables written to {out}");

    Ok(())
}
