//! Multibox prediction heads mapping feature maps to per default box offsets and scores.

mod deconv_residual;
mod extended;
mod multibox;
mod residual;
mod tcb;

pub use deconv_residual::*;
pub use extended::*;
pub use multibox::*;
pub use residual::*;
pub use tcb::*;

use crate::common::*;

/// The outputs of a single stage multibox head.
#[derive(Debug, TensorLike)]
pub struct MultiboxOutput {
    /// Box offsets `[B, K, 4]`.
    pub locs: Tensor,
    /// Class logits `[B, K, n_class]`, class 0 being background.
    pub confs: Tensor,
}

#[derive(Debug)]
pub enum HeadOutput {
    Multibox(MultiboxOutput),
    Refined(RefinedMultiboxOutput),
}

#[derive(Debug, AsRefStr)]
pub enum MultiboxHead {
    ResidualMultibox(ResidualMultibox),
    DeconvolutionalResidualMultibox(DeconvolutionalResidualMultibox),
    ExtendedMultibox(ExtendedMultibox),
    MultiboxWithTcb(MultiboxWithTcb),
}

impl MultiboxHead {
    /// The number of classes including background.
    pub fn n_class(&self) -> usize {
        match self {
            Self::ResidualMultibox(head) => head.n_class(),
            Self::DeconvolutionalResidualMultibox(head) => head.n_class(),
            Self::ExtendedMultibox(head) => head.n_class(),
            Self::MultiboxWithTcb(head) => head.n_class(),
        }
    }

    /// Whether default boxes include the intermediate scale `sqrt(s_k * s_k+1)` box.
    pub fn intermediate_scale(&self) -> bool {
        !matches!(self, Self::MultiboxWithTcb(_))
    }

    pub fn forward_t(&self, xs: &[Tensor], train: bool) -> Result<HeadOutput> {
        let (locs, confs) = match self {
            Self::ResidualMultibox(head) => head.forward(xs)?,
            Self::DeconvolutionalResidualMultibox(head) => head.forward_t(xs, train)?,
            Self::ExtendedMultibox(head) => head.forward_t(xs, train)?,
            Self::MultiboxWithTcb(head) => return Ok(HeadOutput::Refined(head.forward(xs)?)),
        };
        Ok(HeadOutput::Multibox(MultiboxOutput { locs, confs }))
    }
}

impl From<ResidualMultibox> for MultiboxHead {
    fn from(v: ResidualMultibox) -> Self {
        Self::ResidualMultibox(v)
    }
}

impl From<DeconvolutionalResidualMultibox> for MultiboxHead {
    fn from(v: DeconvolutionalResidualMultibox) -> Self {
        Self::DeconvolutionalResidualMultibox(v)
    }
}

impl From<ExtendedMultibox> for MultiboxHead {
    fn from(v: ExtendedMultibox) -> Self {
        Self::ExtendedMultibox(v)
    }
}

impl From<MultiboxWithTcb> for MultiboxHead {
    fn from(v: MultiboxWithTcb) -> Self {
        Self::MultiboxWithTcb(v)
    }
}
