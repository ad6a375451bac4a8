use super::{
    multibox::Multibox,
    residual::{apply_residuals, build_residuals, Residual, RESIDUAL_OUT_CHANNELS},
};
use crate::common::*;
use tch_modules::resize_like;

const DECONV_CHANNELS: usize = 512;

/// The DSSD deconvolution module that fuses a deeper map into a shallower one.
#[derive(Debug)]
pub struct DeconvolutionModule {
    deconv: Deconv2D,
    deconv_conv: Conv2D,
    deconv_bn: BatchNorm2D,
    lateral_conv1: Conv2D,
    lateral_bn1: BatchNorm2D,
    lateral_conv2: Conv2D,
    lateral_bn2: BatchNorm2D,
}

impl DeconvolutionModule {
    pub fn new<'p>(path: impl Borrow<nn::Path<'p>>, lateral_c: usize) -> Result<Self> {
        let path = path.borrow();
        let conv = Conv2DInit::new(3).ws_init(WeightInit::LeCunUniform);
        let c = DECONV_CHANNELS;

        Ok(Self {
            deconv: Deconv2DInit::new(2, 2).build(path / "deconv", c, c)?,
            deconv_conv: conv.clone().build(path / "deconv_conv", c, c)?,
            deconv_bn: BatchNorm2DInit::default().build(path / "deconv_bn", c),
            lateral_conv1: conv.clone().build(path / "lateral_conv1", lateral_c, c)?,
            lateral_bn1: BatchNorm2DInit::default().build(path / "lateral_bn1", c),
            lateral_conv2: conv.build(path / "lateral_conv2", c, c)?,
            lateral_bn2: BatchNorm2DInit::default().build(path / "lateral_bn2", c),
        })
    }

    pub fn forward_t(&self, deep: &Tensor, lateral: &Tensor, train: bool) -> Result<Tensor> {
        let up = resize_like(&deep.apply(&self.deconv), lateral)?
            .apply(&self.deconv_conv)
            .apply_t(&self.deconv_bn, train);
        let lateral = lateral
            .apply(&self.lateral_conv1)
            .apply_t(&self.lateral_bn1, train)
            .relu()
            .apply(&self.lateral_conv2)
            .apply_t(&self.lateral_bn2, train);
        Ok((up * lateral).relu())
    }
}

/// DSSD head: deconvolution modules from the deepest map upwards, then residual
/// prediction modules and multibox convolutions.
#[derive(Debug)]
pub struct DeconvolutionalResidualMultibox {
    top: Conv2D,
    deconvs: Vec<DeconvolutionModule>,
    res: Vec<Residual>,
    multibox: Multibox,
}

impl DeconvolutionalResidualMultibox {
    pub fn new<'p>(
        path: impl Borrow<nn::Path<'p>>,
        n_class: usize,
        n_defaults: &[usize],
        in_channels: &[usize],
    ) -> Result<Self> {
        let path = path.borrow();
        let (&top_c, lateral_cs) = in_channels
            .split_last()
            .ok_or_else(|| format_err!("at least one feature map is required"))?;

        let top = Conv2DInit::new(1)
            .ws_init(WeightInit::LeCunUniform)
            .build(path / "top", top_c, DECONV_CHANNELS)?;
        let deconvs: Vec<_> = lateral_cs
            .iter()
            .enumerate()
            .map(|(index, &lateral_c)| {
                DeconvolutionModule::new(path / "deconv" / index, lateral_c)
            })
            .try_collect()?;
        let res = build_residuals(path / "res", &vec![DECONV_CHANNELS; in_channels.len()])?;
        let multibox = Multibox::new(
            path,
            n_class,
            n_defaults,
            &vec![RESIDUAL_OUT_CHANNELS; in_channels.len()],
        )?;

        Ok(Self {
            top,
            deconvs,
            res,
            multibox,
        })
    }

    pub fn n_class(&self) -> usize {
        self.multibox.n_class()
    }

    pub fn forward_t(&self, xs: &[Tensor], train: bool) -> Result<(Tensor, Tensor)> {
        let hs = self.deconvolve_t(xs, train)?;
        let hs = apply_residuals(&self.res, &hs)?;
        self.multibox.forward(&hs)
    }

    /// Fuse the feature maps from the deepest upwards, returning 512 channel maps
    /// in the input order.
    fn deconvolve_t(&self, xs: &[Tensor], train: bool) -> Result<Vec<Tensor>> {
        let (top, laterals) = xs
            .split_last()
            .ok_or_else(|| format_err!("empty feature maps"))?;
        ensure!(
            laterals.len() == self.deconvs.len(),
            "expect {} feature maps, but get {}",
            self.deconvs.len() + 1,
            xs.len()
        );

        let mut deep = top.apply(&self.top);
        let mut hs = vec![deep.shallow_clone()];
        for (deconv, lateral) in izip!(&self.deconvs, laterals).rev() {
            deep = deconv.forward_t(&deep, lateral, train)?;
            hs.push(deep.shallow_clone());
        }
        hs.reverse();
        Ok(hs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deconvolution_module_matches_lateral_size() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let module = DeconvolutionModule::new(&vs.root() / "deconv", 64)?;
        let deep = Tensor::randn(&[2, 512, 5, 5], (Kind::Float, Device::Cpu));
        let lateral = Tensor::randn(&[2, 64, 10, 10], (Kind::Float, Device::Cpu));
        assert_eq!(
            module.forward_t(&deep, &lateral, false)?.size(),
            vec![2, 512, 10, 10]
        );

        // odd lateral size
        let deep = Tensor::randn(&[2, 512, 10, 10], (Kind::Float, Device::Cpu));
        let lateral = Tensor::randn(&[2, 64, 19, 19], (Kind::Float, Device::Cpu));
        assert_eq!(
            module.forward_t(&deep, &lateral, true)?.size(),
            vec![2, 512, 19, 19]
        );
        Ok(())
    }

    #[test]
    fn deepest_map_is_not_rectified() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let head =
            DeconvolutionalResidualMultibox::new(&vs.root() / "head", 3, &[4, 4], &[64, 128])?;
        tch::no_grad(|| {
            let mut variables = vs.variables();
            let _ = variables.get_mut("head.top.weight").unwrap().fill_(1.0);
            let _ = variables.get_mut("head.top.bias").unwrap().fill_(0.0);
        });

        let xs = vec![
            Tensor::randn(&[1, 64, 10, 10], (Kind::Float, Device::Cpu)),
            -Tensor::ones(&[1, 128, 5, 5], (Kind::Float, Device::Cpu)),
        ];
        let hs = tch::no_grad(|| head.deconvolve_t(&xs, false))?;
        assert_eq!(hs.len(), 2);
        assert_eq!(hs[0].size(), vec![1, 512, 10, 10]);
        assert_eq!(hs[1].size(), vec![1, 512, 5, 5]);
        assert_eq!(f64::from(&hs[1].max()), -128.0);
        Ok(())
    }
}
