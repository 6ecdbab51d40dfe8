//! # Constants and type definitions for dcalut
//!
//! This module centralizes the **tuning defaults** and **common type
//! definitions** used throughout the `dcalut` library. It also defines the
//! container aliases for organizing per-camera feature rows.
//!
//! ## Overview
//!
//! - Histogram axis defaults (bin counts, intensity-axis floor)
//! - Weighting defaults (minimum statistics, width/length ratio cut)
//! - Canonical off-axis strata for diffuse-simulation tables
//! - Core type aliases used across the crate
//!
//! These definitions are used by all main modules, including table
//! construction, merging, and the weighting facade.

use crate::features::Observation;
use std::collections::HashMap;

// -------------------------------------------------------------------------------------------------
// Histogram and weighting defaults
// -------------------------------------------------------------------------------------------------

/// log10 of the lower bound of the intensity axis (first edge at 10 p.e.).
///
/// The intensity axis is log-spaced from this fixed exponent up to the
/// per-camera `size_max`; images fainter than 10 photoelectrons carry no
/// usable direction information and fall below the table domain.
pub const INTENSITY_LOG_FLOOR: f64 = 1.0;

/// Default number of bins per axis, `[intensity, width/length ratio]`.
pub const DEFAULT_BINS: [usize; 2] = [10, 10];

/// Default minimum number of training samples a bin must hold before its
/// mean DCA² is trusted for weighting.
pub const DEFAULT_MIN_STAT: u64 = 5;

/// Default upper bound on the width/length ratio of a query image.
///
/// Ratios above 1 describe images wider than they are long, outside the
/// domain the tables are trained on.
pub const DEFAULT_RATIO_CUT: f64 = 1.0;

/// Extra decimal digits kept beyond the minimum bin width when deciding
/// whether a sample sits on the rightmost edge of an axis.
pub const EDGE_GUARD_DIGITS: i32 = 6;

/// Canonical off-axis strata (degrees) for diffuse-simulation tables.
pub const DEFAULT_OFF_BINS: [[Degree; 2]; 4] = [[0., 2.], [2., 4.], [4., 6.], [6., 10.]];

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Squared angle in degrees², the unit of the DCA² target
pub type SquaredDegree = f64;
/// Image amplitude in photoelectrons
pub type PhotoElectron = f64;
/// Camera type identifier (e.g. `"LSTCam"`, `"NectarCam"`)
pub type CamId = String;

/// Feature rows collected for one camera type
pub type FeatureList = Vec<Observation>;

/// Upper bound of the intensity axis, per camera type
pub type SizeMaxMap = HashMap<CamId, PhotoElectron>;

/// Ordered off-axis strata as `[low, high]` pairs (degrees)
pub type OffAxisBins = Vec<[Degree; 2]>;
