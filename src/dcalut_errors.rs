use thiserror::Error;

use crate::constants::CamId;

#[derive(Error, Debug)]
pub enum DcalutError {
    #[error("query point outside the table domain: intensity={intensity}, ratio={ratio}")]
    LookupOutOfRange { intensity: f64, ratio: f64 },

    #[error("bin holds {count} samples, fewer than the required {min_stat}")]
    InsufficientStatistics { count: u64, min_stat: u64 },

    #[error("width/length ratio {ratio} exceeds the configured cut {ratio_cut}")]
    RatioCutExceeded { ratio: f64, ratio_cut: f64 },

    #[error("mean DCA² is zero in the matched bin for camera {cam_id}; weight undefined")]
    DegenerateMeanDca2 { cam_id: CamId },

    #[error("no lookup table for camera: {0}")]
    UnknownCamera(CamId),

    #[error("bin edges do not match across tables: {0}")]
    BinMismatch(String),

    #[error("no size_max configured for camera: {0}")]
    MissingSizeMax(CamId),

    #[error("invalid lookup parameter: {0}")]
    InvalidParameter(String),

    #[error("unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Parquet read error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),
}

impl PartialEq for DcalutError {
    fn eq(&self, other: &Self) -> bool {
        use DcalutError::*;
        match (self, other) {
            (
                LookupOutOfRange {
                    intensity: a1,
                    ratio: a2,
                },
                LookupOutOfRange {
                    intensity: b1,
                    ratio: b2,
                },
            ) => a1 == b1 && a2 == b2,
            (
                InsufficientStatistics {
                    count: a1,
                    min_stat: a2,
                },
                InsufficientStatistics {
                    count: b1,
                    min_stat: b2,
                },
            ) => a1 == b1 && a2 == b2,
            (
                RatioCutExceeded {
                    ratio: a1,
                    ratio_cut: a2,
                },
                RatioCutExceeded {
                    ratio: b1,
                    ratio_cut: b2,
                },
            ) => a1 == b1 && a2 == b2,
            (DegenerateMeanDca2 { cam_id: a }, DegenerateMeanDca2 { cam_id: b }) => a == b,
            (UnknownCamera(a), UnknownCamera(b)) => a == b,
            (BinMismatch(a), BinMismatch(b)) => a == b,
            (MissingSizeMax(a), MissingSizeMax(b)) => a == b,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,

            // Wrapped foreign errors are not comparable: equal if same variant.
            (IoError(_), IoError(_)) => true,
            (JsonError(_), JsonError(_)) => true,
            (ParquetError(_), ParquetError(_)) => true,

            _ => false,
        }
    }
}
