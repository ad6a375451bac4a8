//! Complete detectors and the model zoo.

mod ssd;
mod zoo;

pub use ssd::*;
pub use zoo::*;
