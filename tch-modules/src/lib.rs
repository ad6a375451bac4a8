//! Layer building blocks on top of `tch::nn` shared by the detection models.

mod common;

pub mod batch_norm_2d;
pub mod conv_2d;
pub mod deconv_2d;
pub mod init;
pub mod normalize;
pub mod pool;

pub use batch_norm_2d::*;
pub use conv_2d::*;
pub use deconv_2d::*;
pub use init::*;
pub use normalize::*;
pub use pool::*;
