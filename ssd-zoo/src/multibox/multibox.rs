use crate::common::*;

/// The number of default boxes placed at each feature map cell.
///
/// SSD places two square boxes per cell (sizes `s_k` and `sqrt(s_k * s_k+1)`) while
/// RefineDet places only the first one. Every aspect ratio adds a portrait and a
/// landscape box.
pub fn n_default_boxes(aspect_ratios: &[f64], intermediate_scale: bool) -> usize {
    let n_square = if intermediate_scale { 2 } else { 1 };
    n_square + aspect_ratios.len() * 2
}

/// Per feature map localization and classification convolutions.
#[derive(Debug)]
pub struct Multibox {
    n_class: usize,
    loc: Vec<Conv2D>,
    conf: Vec<Conv2D>,
}

impl Multibox {
    pub fn new<'p>(
        path: impl Borrow<nn::Path<'p>>,
        n_class: usize,
        n_defaults: &[usize],
        in_channels: &[usize],
    ) -> Result<Self> {
        let path = path.borrow();
        ensure!(n_class > 0, "n_class must be positive");
        ensure!(
            n_defaults.len() == in_channels.len(),
            "the number of aspect ratio groups ({}) does not match the number of feature maps ({})",
            n_defaults.len(),
            in_channels.len()
        );

        let (loc, conf): (Vec<_>, Vec<_>) = izip!(n_defaults, in_channels)
            .enumerate()
            .map(|(index, (&n, &in_c))| -> Result<_> {
                let init = Conv2DInit::new(3).ws_init(WeightInit::LeCunUniform);
                let loc = init.clone().build(path / "loc" / index, in_c, n * 4)?;
                let conf = init.build(path / "conf" / index, in_c, n * n_class)?;
                Ok((loc, conf))
            })
            .process_results(|iter| iter.unzip())?;

        Ok(Self { n_class, loc, conf })
    }

    pub fn n_class(&self) -> usize {
        self.n_class
    }

    /// Compute `(locs [B, K, 4], confs [B, K, n_class])` from the feature maps.
    pub fn forward(&self, xs: &[Tensor]) -> Result<(Tensor, Tensor)> {
        ensure!(
            xs.len() == self.loc.len(),
            "expect {} feature maps, but get {}",
            self.loc.len(),
            xs.len()
        );

        let (locs, confs): (Vec<_>, Vec<_>) = izip!(xs, &self.loc, &self.conf)
            .map(|(x, loc, conf)| -> Result<_> {
                let (b, _, _, _) = x.size4()?;
                let loc = flatten_prediction(&x.apply(loc), b, 4);
                let conf = flatten_prediction(&x.apply(conf), b, self.n_class as i64);
                Ok((loc, conf))
            })
            .process_results(|iter| iter.unzip())?;

        Ok((Tensor::cat(&locs, 1), Tensor::cat(&confs, 1)))
    }
}

/// Reorder `[B, n * dim, H, W]` to `[B, H * W * n, dim]`.
fn flatten_prediction(xs: &Tensor, batch_size: i64, dim: i64) -> Tensor {
    xs.permute(&[0, 2, 3, 1])
        .contiguous()
        .view([batch_size, -1, dim])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_box_count() {
        assert_eq!(n_default_boxes(&[2.0], true), 4);
        assert_eq!(n_default_boxes(&[2.0, 3.0], true), 6);
        assert_eq!(n_default_boxes(&[2.0], false), 3);
    }

    #[test]
    fn multibox_output_shape() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let multibox = Multibox::new(&vs.root() / "multibox", 21, &[4, 6], &[8, 16])?;

        let xs = vec![
            Tensor::randn(&[2, 8, 5, 5], (Kind::Float, Device::Cpu)),
            Tensor::randn(&[2, 16, 3, 3], (Kind::Float, Device::Cpu)),
        ];
        let (locs, confs) = multibox.forward(&xs)?;
        let n_boxes = 5 * 5 * 4 + 3 * 3 * 6;
        assert_eq!(locs.size(), vec![2, n_boxes, 4]);
        assert_eq!(confs.size(), vec![2, n_boxes, 21]);

        assert!(multibox.forward(&xs[..1]).is_err());
        Ok(())
    }
}
