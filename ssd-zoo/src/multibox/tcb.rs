use super::multibox::Multibox;
use crate::common::*;
use tch_modules::resize_like;

const TCB_CHANNELS: usize = 256;

/// RefineDet transfer connection block.
#[derive(Debug)]
pub struct TransferConnection {
    conv1: Conv2D,
    conv2: Conv2D,
    deconv: Option<Deconv2D>,
    conv3: Conv2D,
}

impl TransferConnection {
    /// The block of the deepest map has no deconvolution input.
    pub fn new<'p>(path: impl Borrow<nn::Path<'p>>, in_c: usize, has_deeper: bool) -> Result<Self> {
        let path = path.borrow();
        let conv = Conv2DInit::new(3).ws_init(WeightInit::LeCunUniform);
        let c = TCB_CHANNELS;

        let deconv = has_deeper
            .then(|| Deconv2DInit::new(2, 2).build(path / "deconv", c, c))
            .transpose()?;

        Ok(Self {
            conv1: conv.clone().build(path / "conv1", in_c, c)?,
            conv2: conv.clone().build(path / "conv2", c, c)?,
            deconv,
            conv3: conv.build(path / "conv3", c, c)?,
        })
    }

    pub fn forward(&self, xs: &Tensor, deeper: Option<&Tensor>) -> Result<Tensor> {
        let h = xs.apply(&self.conv1).relu().apply(&self.conv2);

        let h = match (&self.deconv, deeper) {
            (Some(deconv), Some(deeper)) => &h + resize_like(&deeper.apply(deconv), &h)?,
            (None, None) => h,
            (Some(_), None) => bail!("the transfer connection expects a deeper feature map"),
            (None, Some(_)) => bail!("the deepest transfer connection takes no deeper feature map"),
        };

        Ok(h.relu().apply(&self.conv3).relu())
    }
}

/// The outputs of the RefineDet head.
#[derive(Debug, TensorLike)]
pub struct RefinedMultiboxOutput {
    /// ARM offsets `[B, K, 4]`.
    pub arm_locs: Tensor,
    /// ARM binary objectness logits `[B, K, 2]`.
    pub arm_confs: Tensor,
    /// ODM offsets relative to the refined anchors `[B, K, 4]`.
    pub odm_locs: Tensor,
    /// ODM class logits `[B, K, n_class]`.
    pub odm_confs: Tensor,
}

/// RefineDet head: anchor refinement module, transfer connection blocks and object
/// detection module.
#[derive(Debug)]
pub struct MultiboxWithTcb {
    arm: Multibox,
    tcbs: Vec<TransferConnection>,
    odm: Multibox,
}

impl MultiboxWithTcb {
    pub fn new<'p>(
        path: impl Borrow<nn::Path<'p>>,
        n_class: usize,
        n_defaults: &[usize],
        in_channels: &[usize],
    ) -> Result<Self> {
        let path = path.borrow();
        let n_maps = in_channels.len();
        ensure!(n_maps > 0, "at least one feature map is required");

        let arm = Multibox::new(path / "arm", 2, n_defaults, in_channels)?;
        let tcbs: Vec<_> = in_channels
            .iter()
            .enumerate()
            .map(|(index, &in_c)| {
                TransferConnection::new(path / "tcb" / index, in_c, index + 1 < n_maps)
            })
            .try_collect()?;
        let odm = Multibox::new(
            path / "odm",
            n_class,
            n_defaults,
            &vec![TCB_CHANNELS; n_maps],
        )?;

        Ok(Self { arm, tcbs, odm })
    }

    pub fn n_class(&self) -> usize {
        self.odm.n_class()
    }

    pub fn forward(&self, xs: &[Tensor]) -> Result<RefinedMultiboxOutput> {
        ensure!(
            xs.len() == self.tcbs.len(),
            "expect {} feature maps, but get {}",
            self.tcbs.len(),
            xs.len()
        );

        let (arm_locs, arm_confs) = self.arm.forward(xs)?;

        let mut hs: Vec<Tensor> = vec![];
        for (tcb, x) in izip!(&self.tcbs, xs).rev() {
            let h = tcb.forward(x, hs.last())?;
            hs.push(h);
        }
        hs.reverse();

        let (odm_locs, odm_confs) = self.odm.forward(&hs)?;

        Ok(RefinedMultiboxOutput {
            arm_locs,
            arm_confs,
            odm_locs,
            odm_confs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcb_head_output_shape() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let head = MultiboxWithTcb::new(&vs.root() / "multibox", 5, &[3, 3], &[16, 32])?;

        let xs = vec![
            Tensor::randn(&[2, 16, 8, 8], (Kind::Float, Device::Cpu)),
            Tensor::randn(&[2, 32, 4, 4], (Kind::Float, Device::Cpu)),
        ];
        let output = head.forward(&xs)?;
        let n_boxes = (64 + 16) * 3;
        assert_eq!(output.arm_locs.size(), vec![2, n_boxes, 4]);
        assert_eq!(output.arm_confs.size(), vec![2, n_boxes, 2]);
        assert_eq!(output.odm_locs.size(), vec![2, n_boxes, 4]);
        assert_eq!(output.odm_confs.size(), vec![2, n_boxes, 5]);

        let variables = vs.variables();
        assert!(variables.contains_key("multibox.tcb.0.deconv.weight"));
        assert!(!variables.contains_key("multibox.tcb.1.deconv.weight"));
        Ok(())
    }
}
