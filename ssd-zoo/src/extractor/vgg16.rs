use crate::common::*;

/// The layer layout of VGG-16 used by the detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vgg16Variant {
    /// The SSD flavor: 3x3 stride 1 pooling after `conv5_3` and `conv6` dilated by 6.
    Ssd,
    /// The RefineDet flavor: `conv5_3` is exported, 2x2 stride 2 pooling after it and
    /// `conv6` dilated by 3.
    RefineDet,
}

const BLOCK_CHANNELS: [(usize, usize); 5] = [(2, 64), (2, 128), (3, 256), (3, 512), (3, 512)];

/// VGG-16 with the fully connected layers converted to convolutions.
#[derive(Debug)]
pub struct Vgg16 {
    variant: Vgg16Variant,
    blocks: Vec<Vec<Conv2D>>,
    norm4: Normalize,
    conv6: Conv2D,
    conv7: Conv2D,
}

impl Vgg16 {
    pub fn new<'p>(path: impl Borrow<nn::Path<'p>>, variant: Vgg16Variant) -> Result<Self> {
        let path = path.borrow();

        let (_, blocks) = BLOCK_CHANNELS.iter().enumerate().try_fold(
            (3, vec![]),
            |(in_c, mut blocks), (block_index, &(n_layers, out_c))| -> Result<_> {
                let convs: Vec<_> = (0..n_layers)
                    .map(|layer_index| {
                        let name = format!("conv{}_{}", block_index + 1, layer_index + 1);
                        let in_c = if layer_index == 0 { in_c } else { out_c };
                        Conv2DInit::new(3).build(path / name, in_c, out_c)
                    })
                    .try_collect()?;
                blocks.push(convs);
                Ok((out_c, blocks))
            },
        )?;

        let norm4 = NormalizeInit::new(20.0).build(path / "norm4", 512);
        let conv6 = {
            let dilation = match variant {
                Vgg16Variant::Ssd => 6,
                Vgg16Variant::RefineDet => 3,
            };
            Conv2DInit::new(3)
                .padding(dilation)
                .dilation(dilation)
                .build(path / "conv6", 512, 1024)?
        };
        let conv7 = Conv2DInit::new(1).build(path / "conv7", 1024, 1024)?;

        Ok(Self {
            variant,
            blocks,
            norm4,
            conv6,
            conv7,
        })
    }

    /// Channels of the exported feature maps.
    pub fn out_channels(&self) -> Vec<usize> {
        match self.variant {
            Vgg16Variant::Ssd => vec![512, 1024],
            Vgg16Variant::RefineDet => vec![512, 512, 1024],
        }
    }

    pub fn forward(&self, xs: &Tensor) -> Vec<Tensor> {
        let mut ys = vec![];
        let pool = MaxPool2D::new(2);

        let h = self
            .blocks
            .iter()
            .enumerate()
            .fold(xs.shallow_clone(), |h, (block_index, convs)| {
                let h = convs.iter().fold(h, |h, conv| h.apply(conv).relu());

                match (block_index, self.variant) {
                    (0..=2, _) => pool.forward(&h),
                    (3, _) => {
                        ys.push(h.apply(&self.norm4));
                        pool.forward(&h)
                    }
                    (_, Vgg16Variant::Ssd) => MaxPool2D {
                        ksize: 3,
                        stride: 1,
                        padding: 1,
                    }
                    .forward(&h),
                    (_, Vgg16Variant::RefineDet) => {
                        // conv5_3 shares the normalization layer with conv4_3
                        ys.push(h.apply(&self.norm4));
                        pool.forward(&h)
                    }
                }
            });

        let h = h.apply(&self.conv6).relu();
        let h = h.apply(&self.conv7).relu();
        ys.push(h);
        ys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vgg16_parameter_names() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let _vgg = Vgg16::new(&vs.root() / "extractor", Vgg16Variant::Ssd)?;
        let variables = vs.variables();

        for name in [
            "extractor.conv1_1.weight",
            "extractor.conv3_3.bias",
            "extractor.conv5_3.weight",
            "extractor.norm4.scale",
            "extractor.conv6.weight",
            "extractor.conv7.weight",
        ] {
            assert!(variables.contains_key(name), "missing variable {}", name);
        }

        assert_eq!(variables["extractor.conv6.weight"].size(), vec![1024, 512, 3, 3]);
        assert_eq!(variables["extractor.conv7.weight"].size(), vec![1024, 1024, 1, 1]);
        Ok(())
    }
}
