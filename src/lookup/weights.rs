//! # Telescope weight queries
//!
//! The last stage of the pipeline: turn a table cell into the weight a
//! telescope receives in the array-level direction fit, applying the full
//! cut cascade on the way.
//!
//! ## The cascade
//! -----------------
//! For one telescope image, in order:
//!
//! 1. **Ratio cut** — `width/length > ratio_cut` rejects the image with
//!    [`RatioCutExceeded`](DcalutError::RatioCutExceeded) *before any
//!    lookup*: an almost-circular image carries no usable axis direction,
//!    whatever the tables say.
//! 2. **Camera resolution** — no table for the camera is
//!    [`UnknownCamera`](DcalutError::UnknownCamera).
//! 3. **Cell lookup** — out-of-range coordinates are
//!    [`LookupOutOfRange`](DcalutError::LookupOutOfRange).
//! 4. **Statistics** — a count below `min_stat`, or a cell with no mean
//!    (never filled, or masked), is
//!    [`InsufficientStatistics`](DcalutError::InsufficientStatistics).
//! 5. **Degenerate mean** — a mean DCA² of exactly zero would make the
//!    weight infinite and let a single telescope dominate the fit; it is
//!    rejected with [`DegenerateMeanDca2`](DcalutError::DegenerateMeanDca2).
//! 6. Otherwise the weight is `1 / mean_dca2`.
//!
//! ## Per-event use
//! -----------------
//! `event_weights` runs the cascade once per telescope image of an event
//! and returns one `Option<f64>` per image: a telescope failing any check
//! is dropped (`None`), the event itself never aborts. The result is a
//! [`SmallVec`] sized for typical array multiplicities, so per-event
//! calls stay allocation-free.
use itertools::izip;
use smallvec::SmallVec;

use crate::constants::{CamId, Degree};
use crate::dcalut_errors::DcalutError;
use crate::features::Observation;
use crate::lookup::diffuse::DiffuseLookupStore;
use crate::lookup::params::LutParams;
use crate::lookup::store::LookupStore;

/// One entry per telescope image of an event; `None` where the telescope
/// failed a check and is dropped from the direction fit.
pub type EventWeights = SmallVec<[Option<f64>; 8]>;

/// The ratio cut, applied before any table access.
fn checked_ratio(obs: &Observation, params: &LutParams) -> Result<f64, DcalutError> {
    let ratio = obs.ratio();
    if ratio > params.ratio_cut {
        return Err(DcalutError::RatioCutExceeded {
            ratio,
            ratio_cut: params.ratio_cut,
        });
    }
    Ok(ratio)
}

/// Steps 4–6 of the cascade, shared by both store kinds.
fn weight_from_cell(
    cam_id: &str,
    count: u64,
    mean_dca2: Option<f64>,
    params: &LutParams,
) -> Result<f64, DcalutError> {
    if count < params.min_stat {
        return Err(DcalutError::InsufficientStatistics {
            count,
            min_stat: params.min_stat,
        });
    }
    match mean_dca2 {
        None => Err(DcalutError::InsufficientStatistics {
            count,
            min_stat: params.min_stat,
        }),
        Some(mean) if mean == 0.0 => Err(DcalutError::DegenerateMeanDca2 {
            cam_id: cam_id.to_string(),
        }),
        Some(mean) => Ok(1.0 / mean),
    }
}

impl LookupStore {
    /// Weight of one telescope image, `1 / mean_dca2` of its table cell.
    ///
    /// Runs the full cascade described in the [module docs](self); every
    /// rejection is a typed, recoverable error so callers can distinguish
    /// a cut image from a configuration problem.
    ///
    /// Arguments
    /// -----------------
    /// * `cam_id` – Camera type of the image.
    /// * `obs` – The image features (`intensity` and the width/length
    ///   ratio are consumed).
    /// * `params` – `ratio_cut` and `min_stat`.
    ///
    /// Return
    /// ----------
    /// * `Ok(weight)` with `weight > 0`, or the first failing check.
    ///
    /// See also
    /// ------------
    /// * [`LookupStore::event_weights`] – The per-event driver.
    pub fn get_weight(
        &self,
        cam_id: &str,
        obs: &Observation,
        params: &LutParams,
    ) -> Result<f64, DcalutError> {
        let ratio = checked_ratio(obs, params)?;
        let (count, mean_dca2) = self.query(cam_id, obs.intensity, ratio)?;
        weight_from_cell(cam_id, count, mean_dca2, params)
    }

    /// Weights for all telescope images of one event.
    ///
    /// One entry per image, in input order; a telescope failing any check
    /// of the cascade yields `None` and the others are unaffected.
    ///
    /// Panics
    /// ----------
    /// * If `cam_ids` and `images` have different lengths.
    pub fn event_weights(
        &self,
        cam_ids: &[CamId],
        images: &[Observation],
        params: &LutParams,
    ) -> EventWeights {
        assert_eq!(
            cam_ids.len(),
            images.len(),
            "cam_ids/images length mismatch"
        );
        cam_ids
            .iter()
            .zip(images)
            .map(|(cam_id, obs)| self.get_weight(cam_id, obs, params).ok())
            .collect()
    }
}

impl DiffuseLookupStore {
    /// Weight of one telescope image, from the stratum selected by the
    /// event's off-axis angle.
    ///
    /// Identical cascade to [`LookupStore::get_weight`], with the stratum
    /// selection of [`DiffuseLookupStore::query`] between the ratio cut
    /// and the cell lookup.
    ///
    /// Arguments
    /// -----------------
    /// * `cam_id` – Camera type of the image.
    /// * `obs` – The image features.
    /// * `offangle` – Reconstructed off-axis angle of the event \[deg\].
    /// * `params` – `ratio_cut` and `min_stat`.
    pub fn get_weight(
        &self,
        cam_id: &str,
        obs: &Observation,
        offangle: Degree,
        params: &LutParams,
    ) -> Result<f64, DcalutError> {
        let ratio = checked_ratio(obs, params)?;
        let (count, mean_dca2) = self.query(cam_id, obs.intensity, ratio, offangle)?;
        weight_from_cell(cam_id, count, mean_dca2, params)
    }

    /// Weights for all telescope images of one event, one off-axis angle
    /// per image.
    ///
    /// Panics
    /// ----------
    /// * If the three input slices have different lengths.
    pub fn event_weights(
        &self,
        cam_ids: &[CamId],
        images: &[Observation],
        offangles: &[Degree],
        params: &LutParams,
    ) -> EventWeights {
        assert_eq!(
            cam_ids.len(),
            images.len(),
            "cam_ids/images length mismatch"
        );
        assert_eq!(
            cam_ids.len(),
            offangles.len(),
            "cam_ids/offangles length mismatch"
        );
        izip!(cam_ids, images, offangles)
            .map(|(cam_id, obs, &offangle)| self.get_weight(cam_id, obs, offangle, params).ok())
            .collect()
    }
}

#[cfg(test)]
mod weights_tests {
    use super::*;
    use crate::features::FeatureSet;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn row(intensity: f64, ratio: f64, dca2: f64) -> Observation {
        Observation::new(intensity, ratio * 0.1, 0.1, dca2)
    }

    fn store_of(rows: Vec<Observation>, params: &LutParams) -> LookupStore {
        let mut set: FeatureSet = HashMap::default();
        set.insert("LSTCam".to_string(), rows);
        LookupStore::build(&set, params).unwrap()
    }

    fn test_params() -> LutParams {
        LutParams::builder()
            .size_max_for("LSTCam", 1000.0)
            .bins([4, 4])
            .min_stat(5)
            .ratio_cut(1.0)
            .build()
            .unwrap()
    }

    #[test]
    fn weight_is_inverse_mean_dca2() {
        let params = test_params();
        let store = store_of(vec![row(150.0, 0.3, 2.0); 6], &params);

        let weight = store
            .get_weight("LSTCam", &row(150.0, 0.3, 0.0), &params)
            .unwrap();
        assert_relative_eq!(weight, 0.5);
    }

    #[test]
    fn ratio_cut_fires_before_any_lookup() {
        let params = test_params();
        let store = store_of(vec![row(150.0, 0.3, 2.0); 6], &params);

        // Intensity far out of range too: the cut must win.
        let bad = Observation::new(1.0e9, 0.15, 0.1, 0.0);
        let err = store.get_weight("LSTCam", &bad, &params).unwrap_err();
        assert!(matches!(err, DcalutError::RatioCutExceeded { .. }));
    }

    #[test]
    fn sparse_cells_are_rejected() {
        let params = test_params();
        let store = store_of(vec![row(150.0, 0.3, 2.0); 2], &params);

        let err = store
            .get_weight("LSTCam", &row(150.0, 0.3, 0.0), &params)
            .unwrap_err();
        assert!(matches!(
            err,
            DcalutError::InsufficientStatistics {
                count: 2,
                min_stat: 5
            }
        ));
    }

    #[test]
    fn masked_cells_are_rejected_even_with_enough_counts() {
        let params = test_params();
        let mut store = store_of(vec![row(150.0, 0.3, 2.0); 6], &params);
        // Mask harder than the query-side threshold.
        store.apply_min_stat(10);

        let err = store
            .get_weight("LSTCam", &row(150.0, 0.3, 0.0), &params)
            .unwrap_err();
        assert!(matches!(err, DcalutError::InsufficientStatistics { .. }));
    }

    #[test]
    fn zero_mean_dca2_is_degenerate_not_infinite() {
        let params = test_params();
        let store = store_of(vec![row(150.0, 0.3, 0.0); 6], &params);

        let err = store
            .get_weight("LSTCam", &row(150.0, 0.3, 0.0), &params)
            .unwrap_err();
        assert!(matches!(err, DcalutError::DegenerateMeanDca2 { .. }));
    }

    #[test]
    fn event_weights_drop_failing_telescopes_individually() {
        let params = test_params();
        let store = store_of(vec![row(150.0, 0.3, 2.0); 6], &params);

        let cam_ids = vec![
            "LSTCam".to_string(),
            "LSTCam".to_string(),
            "FlashCam".to_string(),
        ];
        let images = vec![
            row(150.0, 0.3, 0.0),
            // Fails the ratio cut.
            Observation::new(150.0, 0.15, 0.1, 0.0),
            // Unknown camera.
            row(150.0, 0.3, 0.0),
        ];

        let weights = store.event_weights(&cam_ids, &images, &params);
        assert_eq!(weights.len(), 3);
        assert_relative_eq!(weights[0].unwrap(), 0.5);
        assert!(weights[1].is_none());
        assert!(weights[2].is_none());
    }

    #[test]
    fn diffuse_weight_uses_the_selected_stratum() {
        let params = LutParams::builder()
            .size_max_for("LSTCam", 1000.0)
            .bins([4, 4])
            .min_stat(1)
            .off_bins(vec![[0.0, 2.0], [2.0, 4.0]])
            .build()
            .unwrap();

        let mut set: FeatureSet = HashMap::default();
        set.insert(
            "LSTCam".to_string(),
            vec![
                row(150.0, 0.3, 2.0).with_offangle(1.0),
                row(150.0, 0.3, 4.0).with_offangle(3.0),
            ],
        );
        let store = DiffuseLookupStore::build(&set, &params).unwrap();

        let probe = row(150.0, 0.3, 0.0);
        let near = store.get_weight("LSTCam", &probe, 1.0, &params).unwrap();
        let far = store.get_weight("LSTCam", &probe, 3.0, &params).unwrap();
        assert_relative_eq!(near, 0.5);
        assert_relative_eq!(far, 0.25);

        let weights = store.event_weights(
            &["LSTCam".to_string(), "LSTCam".to_string()],
            &[probe, probe],
            &[1.0, 3.0],
            &params,
        );
        assert_relative_eq!(weights[0].unwrap(), 0.5);
        assert_relative_eq!(weights[1].unwrap(), 0.25);
    }
}
