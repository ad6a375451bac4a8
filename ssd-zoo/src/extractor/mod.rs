//! Convolutional feature extractors producing multi-scale feature maps.

mod extractor_300;
mod extractor_320;
mod vgg16;

pub use extractor_300::*;
pub use extractor_320::*;
pub use vgg16::*;

use crate::common::*;

#[derive(Debug, AsRefStr)]
pub enum Extractor {
    Vgg16Extractor300(Vgg16Extractor300),
    Vgg16Extractor320(Vgg16Extractor320),
}

impl Extractor {
    /// The side length of the square input image.
    pub fn insize(&self) -> i64 {
        match self {
            Self::Vgg16Extractor300(_) => Vgg16Extractor300::INSIZE,
            Self::Vgg16Extractor320(_) => Vgg16Extractor320::INSIZE,
        }
    }

    /// The side lengths of the exported feature maps for an input of `insize`.
    pub fn grids(&self) -> &'static [i64] {
        match self {
            Self::Vgg16Extractor300(_) => &Vgg16Extractor300::GRIDS,
            Self::Vgg16Extractor320(_) => &Vgg16Extractor320::GRIDS,
        }
    }

    pub fn out_channels(&self) -> Vec<usize> {
        match self {
            Self::Vgg16Extractor300(extractor) => extractor.out_channels(),
            Self::Vgg16Extractor320(extractor) => extractor.out_channels(),
        }
    }

    pub fn forward(&self, xs: &Tensor) -> Vec<Tensor> {
        match self {
            Self::Vgg16Extractor300(extractor) => extractor.forward(xs),
            Self::Vgg16Extractor320(extractor) => extractor.forward(xs),
        }
    }
}

impl From<Vgg16Extractor300> for Extractor {
    fn from(v: Vgg16Extractor300) -> Self {
        Self::Vgg16Extractor300(v)
    }
}

impl From<Vgg16Extractor320> for Extractor {
    fn from(v: Vgg16Extractor320) -> Self {
        Self::Vgg16Extractor320(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_feature_maps(extractor: &Extractor) {
        let insize = extractor.insize();
        let xs = Tensor::randn(&[1, 3, insize, insize], (Kind::Float, Device::Cpu));
        let ys = tch::no_grad(|| extractor.forward(&xs));

        assert_eq!(ys.len(), extractor.grids().len());
        izip!(&ys, extractor.grids(), extractor.out_channels()).for_each(|(y, &grid, out_c)| {
            assert_eq!(y.size(), vec![1, out_c as i64, grid, grid]);
        });
    }

    #[test]
    fn extractor_300_feature_maps() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let extractor: Extractor = Vgg16Extractor300::new(&vs.root() / "extractor")?.into();
        check_feature_maps(&extractor);
        Ok(())
    }

    #[test]
    fn extractor_320_feature_maps() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let extractor: Extractor = Vgg16Extractor320::new(&vs.root() / "extractor")?.into();
        check_feature_maps(&extractor);
        Ok(())
    }
}
