pub mod binning;
pub mod constants;
pub mod dcalut_errors;
pub mod features;
pub mod lookup;

pub use crate::dcalut_errors::DcalutError;
pub use crate::features::batch_reader::FeatureBatch;
pub use crate::features::feature_file::FeatureFile;
pub use crate::features::{FeatureSet, Observation};
pub use crate::lookup::diffuse::DiffuseLookupStore;
pub use crate::lookup::params::{LutParams, LutParamsBuilder};
pub use crate::lookup::store::LookupStore;
pub use crate::lookup::weights::EventWeights;
pub use crate::lookup::LookupTable;
