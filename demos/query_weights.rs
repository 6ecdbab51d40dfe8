//! Weight a handful of telescope images against a lookup store.
//!
//! Usage:
//!   query_weights [TABLES.json]
//! Example:
//!   query_weights tables.json
//!
//! Without an argument a small store is built in memory first, so the demo
//! runs standalone. Each image is weighted on its own and the per-telescope
//! outcome (weight, or the reason it was rejected) is printed, followed by
//! the grouped per-event weights.
use std::env;

use camino::Utf8Path;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dcalut::{DcalutError, FeatureSet, LookupStore, LutParams, Observation};

/// Build a store over a seeded synthetic sample, dense enough that every
/// interior cell clears the minimum-statistics threshold.
fn demo_store(params: &LutParams) -> Result<LookupStore, DcalutError> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut features = FeatureSet::default();
    for (cam_id, size_max) in [("LSTCam", 3.0e5_f64), ("NectarCam", 1.0e5)] {
        let rows = features.entry(cam_id.to_string()).or_default();
        for _ in 0..20_000 {
            let intensity = 10f64.powf(rng.random_range(1.0..size_max.log10()));
            let length = rng.random_range(0.05..0.4);
            let width = length * rng.random_range(0.05..0.95);
            let dca2 = (0.01 + rng.random_range(0.0..0.05)) * (1.0 + 8.0 * width / length);
            rows.push(Observation::new(intensity, width, length, dca2));
        }
    }
    LookupStore::build(&features, params)
}

fn main() -> Result<(), DcalutError> {
    let params = LutParams::builder()
        .size_max_for("LSTCam", 3.0e5)
        .size_max_for("NectarCam", 1.0e5)
        .bins([10, 10])
        .min_stat(5)
        .ratio_cut(1.0)
        .build()?;

    let store = match env::args().nth(1) {
        Some(path) => {
            println!("Loading tables from {path}");
            LookupStore::load(Utf8Path::new(&path))?
        }
        None => {
            println!("No table file given, building one over a synthetic sample.");
            demo_store(&params)?
        }
    };

    // One stereo event seen by four telescopes. The second image is wider
    // than it is long, the third saturates the intensity axis and the last
    // camera type has no table.
    let cam_ids: Vec<String> = vec![
        "LSTCam".into(),
        "LSTCam".into(),
        "NectarCam".into(),
        "CHEC".into(),
    ];
    let images = vec![
        Observation::new(540.0, 0.05, 0.22, 0.012),
        Observation::new(95.0, 0.11, 0.09, 0.030),
        Observation::new(1.2e6, 0.04, 0.21, 0.008),
        Observation::new(210.0, 0.04, 0.18, 0.015),
    ];

    for (cam_id, obs) in cam_ids.iter().zip(&images) {
        match store.get_weight(cam_id, obs, &params) {
            Ok(w) => println!("{cam_id:>10}: weight {w:.3}"),
            Err(why) => println!("{cam_id:>10}: rejected ({why})"),
        }
    }

    let weights = store.event_weights(&cam_ids, &images, &params);
    println!("Event weights: {weights:?}");

    Ok(())
}
