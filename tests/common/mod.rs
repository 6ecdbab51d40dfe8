// Not every test binary uses every helper.
#![allow(dead_code)]

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::Rng;

use dcalut::{LookupStore, LutParams, Observation};

/// Two-camera parameter set shared by the integration tests.
///
/// Size caps: LSTCam 1000 p.e., NectarCam 500 p.e.; 4x4 cells.
pub fn array_params() -> LutParams {
    LutParams::builder()
        .size_max_for("LSTCam", 1000.0)
        .size_max_for("NectarCam", 500.0)
        .bins([4, 4])
        .min_stat(5)
        .ratio_cut(1.0)
        .build()
        .unwrap()
}

/// Random rows spread over the whole LSTCam grid, away from the bin
/// edges so that filling and querying agree on the cell.
pub fn uniform_rows(rng: &mut StdRng, n: usize) -> Vec<Observation> {
    (0..n)
        .map(|_| {
            let intensity = rng.random_range(12.0..950.0);
            let length = 0.1;
            let width = length * rng.random_range(0.05..0.95);
            let dca2 = rng.random_range(0.0..0.1);
            Observation::new(intensity, width, length, dca2)
        })
        .collect()
}

/// Cell-by-cell comparison of two stores: identical cameras, edges and
/// counts, means equal up to merge-order rounding.
pub fn assert_stores_close(actual: &LookupStore, expected: &LookupStore) {
    assert_eq!(actual.len(), expected.len());
    for (cam_id, expected_table) in expected.iter() {
        let actual_table = actual
            .get(cam_id)
            .unwrap_or_else(|| panic!("camera {cam_id} missing"));
        assert_eq!(actual_table.grid(), expected_table.grid());
        assert_eq!(actual_table.counts(), expected_table.counts());
        for (got, want) in actual_table
            .mean_dca2()
            .iter()
            .zip(expected_table.mean_dca2().iter())
        {
            match (got, want) {
                (None, None) => {}
                (Some(got), Some(want)) => {
                    assert_relative_eq!(got, want, epsilon = 1e-12, max_relative = 1e-12)
                }
                _ => panic!("empty-cell pattern differs for {cam_id}"),
            }
        }
    }
}
