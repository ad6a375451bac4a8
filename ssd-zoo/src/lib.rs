//! Single shot multibox detectors (SSD, DSSD, ESSD and RefineDet) on top of libtorch.

mod common;
pub mod coder;
pub mod download;
pub mod extractor;
pub mod loss;
pub mod model;
pub mod multibox;
pub mod nms;
pub mod pretrained;
pub mod serializer;
