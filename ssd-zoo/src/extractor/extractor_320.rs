use super::vgg16::{Vgg16, Vgg16Variant};
use crate::common::*;

/// A VGG-16 based feature extractor for RefineDet320.
///
/// It exports `conv4_3`, `conv5_3`, `conv7` and `conv6_2`.
#[derive(Debug)]
pub struct Vgg16Extractor320 {
    base: Vgg16,
    conv6_1: Conv2D,
    conv6_2: Conv2D,
}

impl Vgg16Extractor320 {
    pub const INSIZE: i64 = 320;
    pub const GRIDS: [i64; 4] = [40, 20, 10, 5];

    pub fn new<'p>(path: impl Borrow<nn::Path<'p>>) -> Result<Self> {
        let path = path.borrow();
        let base = Vgg16::new(path, Vgg16Variant::RefineDet)?;
        let conv6_1 = Conv2DInit::new(1)
            .ws_init(WeightInit::LeCunUniform)
            .build(path / "conv6_1", 1024, 256)?;
        let conv6_2 = Conv2DInit::new(3)
            .stride(2)
            .padding(1)
            .ws_init(WeightInit::LeCunUniform)
            .build(path / "conv6_2", 256, 512)?;

        Ok(Self {
            base,
            conv6_1,
            conv6_2,
        })
    }

    pub fn out_channels(&self) -> Vec<usize> {
        let mut channels = self.base.out_channels();
        channels.push(512);
        channels
    }

    pub fn forward(&self, xs: &Tensor) -> Vec<Tensor> {
        let mut ys = self.base.forward(xs);
        let h = ys
            .last()
            .unwrap()
            .apply(&self.conv6_1)
            .relu()
            .apply(&self.conv6_2)
            .relu();
        ys.push(h);
        ys
    }
}
