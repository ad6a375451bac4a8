use super::vgg16::{Vgg16, Vgg16Variant};
use crate::common::*;

/// `(name, mid channels, out channels, stride, padding)` of the extra layers.
const EXTRAS: [(&str, usize, usize, usize, usize); 4] = [
    ("8", 256, 512, 2, 1),
    ("9", 128, 256, 2, 1),
    ("10", 128, 256, 1, 0),
    ("11", 128, 256, 1, 0),
];

/// A VGG-16 based feature extractor for SSD300.
///
/// It exports `conv4_3`, `conv7`, `conv8_2`, `conv9_2`, `conv10_2` and `conv11_2`.
#[derive(Debug)]
pub struct Vgg16Extractor300 {
    base: Vgg16,
    extras: Vec<(Conv2D, Conv2D)>,
}

impl Vgg16Extractor300 {
    pub const INSIZE: i64 = 300;
    pub const GRIDS: [i64; 6] = [38, 19, 10, 5, 3, 1];

    pub fn new<'p>(path: impl Borrow<nn::Path<'p>>) -> Result<Self> {
        let path = path.borrow();
        let base = Vgg16::new(path, Vgg16Variant::Ssd)?;

        let (_, extras) = EXTRAS.iter().try_fold(
            (1024, vec![]),
            |(in_c, mut extras), &(name, mid_c, out_c, stride, padding)| -> Result<_> {
                let conv1 = Conv2DInit::new(1)
                    .ws_init(WeightInit::LeCunUniform)
                    .build(path / format!("conv{}_1", name), in_c, mid_c)?;
                let conv2 = Conv2DInit::new(3)
                    .stride(stride)
                    .padding(padding)
                    .ws_init(WeightInit::LeCunUniform)
                    .build(path / format!("conv{}_2", name), mid_c, out_c)?;
                extras.push((conv1, conv2));
                Ok((out_c, extras))
            },
        )?;

        Ok(Self { base, extras })
    }

    pub fn out_channels(&self) -> Vec<usize> {
        let mut channels = self.base.out_channels();
        channels.extend(EXTRAS.iter().map(|&(_, _, out_c, _, _)| out_c));
        channels
    }

    pub fn forward(&self, xs: &Tensor) -> Vec<Tensor> {
        let mut ys = self.base.forward(xs);

        let mut h = ys.last().unwrap().shallow_clone();
        for (conv1, conv2) in &self.extras {
            h = h.apply(conv1).relu().apply(conv2).relu();
            ys.push(h.shallow_clone());
        }

        ys
    }
}
