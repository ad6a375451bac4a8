use super::{
    multibox::Multibox,
    residual::{apply_residuals, build_residuals, Residual, RESIDUAL_OUT_CHANNELS},
};
use crate::common::*;
use tch_modules::resize_like;

/// The number of shallow feature maps that receive context from deeper maps.
pub const N_EXTENDED_MAPS: usize = 3;

/// The ESSD extension module that enriches a shallow map with the upsampled deeper one.
#[derive(Debug)]
pub struct ExtensionModule {
    deconv: Deconv2D,
    up_conv: Conv2D,
    up_bn: BatchNorm2D,
    lateral_conv: Conv2D,
    lateral_bn: BatchNorm2D,
    fuse: Conv2D,
}

impl ExtensionModule {
    pub fn new<'p>(
        path: impl Borrow<nn::Path<'p>>,
        deep_c: usize,
        shallow_c: usize,
    ) -> Result<Self> {
        let path = path.borrow();
        let conv = Conv2DInit::new(3).ws_init(WeightInit::LeCunUniform);

        Ok(Self {
            deconv: Deconv2DInit::new(2, 2).build(path / "deconv", deep_c, shallow_c)?,
            up_conv: conv.clone().build(path / "up_conv", shallow_c, shallow_c)?,
            up_bn: BatchNorm2DInit::default().build(path / "up_bn", shallow_c),
            lateral_conv: conv.build(path / "lateral_conv", shallow_c, shallow_c)?,
            lateral_bn: BatchNorm2DInit::default().build(path / "lateral_bn", shallow_c),
            fuse: Conv2DInit::new(1)
                .ws_init(WeightInit::LeCunUniform)
                .build(path / "fuse", shallow_c * 2, shallow_c)?,
        })
    }

    pub fn forward_t(&self, deep: &Tensor, shallow: &Tensor, train: bool) -> Result<Tensor> {
        let up = resize_like(&deep.apply(&self.deconv), shallow)?
            .apply(&self.up_conv)
            .apply_t(&self.up_bn, train)
            .relu();
        let lateral = shallow
            .apply(&self.lateral_conv)
            .apply_t(&self.lateral_bn, train)
            .relu();
        Ok(Tensor::cat(&[lateral, up], 1).apply(&self.fuse).relu())
    }
}

/// ESSD head, optionally followed by residual prediction modules.
#[derive(Debug)]
pub struct ExtendedMultibox {
    extensions: Vec<ExtensionModule>,
    res: Option<Vec<Residual>>,
    multibox: Multibox,
}

impl ExtendedMultibox {
    /// The extended head with plain multibox convolutions.
    pub fn new<'p>(
        path: impl Borrow<nn::Path<'p>>,
        n_class: usize,
        n_defaults: &[usize],
        in_channels: &[usize],
    ) -> Result<Self> {
        Self::new_ext(path, n_class, n_defaults, in_channels, false)
    }

    /// The extended head with residual prediction modules.
    pub fn new_residual<'p>(
        path: impl Borrow<nn::Path<'p>>,
        n_class: usize,
        n_defaults: &[usize],
        in_channels: &[usize],
    ) -> Result<Self> {
        Self::new_ext(path, n_class, n_defaults, in_channels, true)
    }

    fn new_ext<'p>(
        path: impl Borrow<nn::Path<'p>>,
        n_class: usize,
        n_defaults: &[usize],
        in_channels: &[usize],
        residual: bool,
    ) -> Result<Self> {
        let path = path.borrow();
        let n_extended = N_EXTENDED_MAPS.min(in_channels.len().saturating_sub(1));

        let extensions: Vec<_> = (0..n_extended)
            .map(|index| {
                ExtensionModule::new(
                    path / "extension" / index,
                    in_channels[index + 1],
                    in_channels[index],
                )
            })
            .try_collect()?;

        let (res, multibox_in_channels) = if residual {
            let res = build_residuals(path / "res", in_channels)?;
            (Some(res), vec![RESIDUAL_OUT_CHANNELS; in_channels.len()])
        } else {
            (None, in_channels.to_vec())
        };

        let multibox = Multibox::new(path, n_class, n_defaults, &multibox_in_channels)?;

        Ok(Self {
            extensions,
            res,
            multibox,
        })
    }

    pub fn is_residual(&self) -> bool {
        self.res.is_some()
    }

    pub fn n_class(&self) -> usize {
        self.multibox.n_class()
    }

    pub fn forward_t(&self, xs: &[Tensor], train: bool) -> Result<(Tensor, Tensor)> {
        ensure!(
            xs.len() > self.extensions.len(),
            "expect more than {} feature maps, but get {}",
            self.extensions.len(),
            xs.len()
        );

        let mut hs: Vec<_> = xs.iter().map(Tensor::shallow_clone).collect();
        for (index, extension) in self.extensions.iter().enumerate().rev() {
            hs[index] = extension.forward_t(&hs[index + 1], &xs[index], train)?;
        }

        let hs = match &self.res {
            Some(res) => apply_residuals(res, &hs)?,
            None => hs,
        };
        self.multibox.forward(&hs)
    }
}
