use super::multibox::Multibox;
use crate::common::*;

pub const RESIDUAL_OUT_CHANNELS: usize = 1024;

/// The residual prediction module placed before the multibox convolutions.
#[derive(Debug)]
pub struct Residual {
    conv1: Conv2D,
    conv2: Conv2D,
    conv3: Conv2D,
    skip: Conv2D,
}

impl Residual {
    pub fn new<'p>(path: impl Borrow<nn::Path<'p>>, in_c: usize) -> Result<Self> {
        let path = path.borrow();
        let init = Conv2DInit::new(1).ws_init(WeightInit::LeCunUniform);

        Ok(Self {
            conv1: init.clone().build(path / "conv1", in_c, 256)?,
            conv2: init.clone().build(path / "conv2", 256, 256)?,
            conv3: init
                .clone()
                .build(path / "conv3", 256, RESIDUAL_OUT_CHANNELS)?,
            skip: init.build(path / "conv4", in_c, RESIDUAL_OUT_CHANNELS)?,
        })
    }
}

impl nn::Module for Residual {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let h = xs
            .apply(&self.conv1)
            .relu()
            .apply(&self.conv2)
            .relu()
            .apply(&self.conv3);
        h + xs.apply(&self.skip)
    }
}

/// Multibox head with a residual prediction module on every feature map.
#[derive(Debug)]
pub struct ResidualMultibox {
    res: Vec<Residual>,
    multibox: Multibox,
}

impl ResidualMultibox {
    pub fn new<'p>(
        path: impl Borrow<nn::Path<'p>>,
        n_class: usize,
        n_defaults: &[usize],
        in_channels: &[usize],
    ) -> Result<Self> {
        let path = path.borrow();
        let res = build_residuals(path / "res", in_channels)?;
        let multibox = Multibox::new(
            path,
            n_class,
            n_defaults,
            &vec![RESIDUAL_OUT_CHANNELS; in_channels.len()],
        )?;
        Ok(Self { res, multibox })
    }

    pub fn n_class(&self) -> usize {
        self.multibox.n_class()
    }

    pub fn forward(&self, xs: &[Tensor]) -> Result<(Tensor, Tensor)> {
        let hs = apply_residuals(&self.res, xs)?;
        self.multibox.forward(&hs)
    }
}

pub(crate) fn build_residuals(path: nn::Path, in_channels: &[usize]) -> Result<Vec<Residual>> {
    in_channels
        .iter()
        .enumerate()
        .map(|(index, &in_c)| Residual::new(&path / index, in_c))
        .try_collect()
}

pub(crate) fn apply_residuals(res: &[Residual], xs: &[Tensor]) -> Result<Vec<Tensor>> {
    ensure!(
        res.len() == xs.len(),
        "expect {} feature maps, but get {}",
        res.len(),
        xs.len()
    );
    Ok(izip!(res, xs).map(|(res, x)| x.apply(res)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residual_keeps_spatial_size() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let res = Residual::new(&vs.root() / "res", 32)?;
        let xs = Tensor::randn(&[1, 32, 7, 7], (Kind::Float, Device::Cpu));
        assert_eq!(xs.apply(&res).size(), vec![1, 1024, 7, 7]);
        Ok(())
    }

    #[test]
    fn residual_multibox_variables() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let _head = ResidualMultibox::new(&vs.root() / "multibox", 3, &[4], &[32])?;
        let variables = vs.variables();
        assert_eq!(variables["multibox.res.0.conv4.weight"].size(), vec![1024, 32, 1, 1]);
        assert_eq!(variables["multibox.loc.0.weight"].size(), vec![16, 1024, 3, 3]);
        assert_eq!(variables["multibox.conf.0.weight"].size(), vec![12, 1024, 3, 3]);
        Ok(())
    }
}
