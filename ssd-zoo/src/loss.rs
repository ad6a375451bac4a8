//! Multibox training loss.

use crate::common::*;

/// Compute the localization and confidence losses of a batch.
///
/// - `mb_locs`: predicted offsets `[B, K, 4]`.
/// - `mb_confs`: predicted class logits `[B, K, n_class]`.
/// - `gt_mb_locs`: encoded target offsets `[B, K, 4]`.
/// - `gt_mb_labels`: encoded target labels `[B, K]`, zero for background.
/// - `k`: the number of hard negatives kept per positive.
///
/// Both losses are normalized by the number of positive default boxes.
pub fn multibox_loss(
    mb_locs: &Tensor,
    mb_confs: &Tensor,
    gt_mb_locs: &Tensor,
    gt_mb_labels: &Tensor,
    k: f64,
) -> Result<(Tensor, Tensor)> {
    let (batch_size, n_default, _) = mb_confs.size3()?;
    ensure!(
        mb_locs.size() == [batch_size, n_default, 4],
        "invalid predicted offset shape {:?}",
        mb_locs.size()
    );
    ensure!(
        gt_mb_locs.size() == mb_locs.size(),
        "invalid target offset shape {:?}",
        gt_mb_locs.size()
    );
    ensure!(
        gt_mb_labels.size() == [batch_size, n_default],
        "invalid target label shape {:?}",
        gt_mb_labels.size()
    );
    ensure!(k >= 0.0, "k must be non-negative");

    let device = mb_confs.device();
    let positive = gt_mb_labels.gt(0);
    let n_positive = i64::from(&positive.sum(Kind::Int64));

    if n_positive == 0 {
        let zero = Tensor::zeros(&[], (Kind::Float, device));
        return Ok((zero.shallow_clone(), zero));
    }
    let positive_f = positive.to_kind(Kind::Float);

    let loc_loss = mb_locs
        .smooth_l1_loss(gt_mb_locs, Reduction::None, 1.0)
        .sum_dim_intlist(&[-1], false, Kind::Float);
    let loc_loss = (loc_loss * &positive_f).sum(Kind::Float) / n_positive as f64;

    let conf_loss = -mb_confs
        .log_softmax(-1, Kind::Float)
        .gather(2, &gt_mb_labels.unsqueeze(-1), false)
        .squeeze_dim(-1);
    let hard_negative = tch::no_grad(|| hard_negative(&conf_loss, &positive, k));
    let selected = positive.logical_or(&hard_negative).to_kind(Kind::Float);
    let conf_loss = (conf_loss * selected).sum(Kind::Float) / n_positive as f64;

    Ok((loc_loss, conf_loss))
}

/// Select the negatives with the highest loss, `k` times the positives of each image.
fn hard_negative(conf_loss: &Tensor, positive: &Tensor, k: f64) -> Tensor {
    // positives get zero and negatives their negated loss, so an ascending rank puts
    // the hardest negatives first
    let key = conf_loss * (positive.to_kind(Kind::Float) - 1.0);
    let rank = key.argsort(1, false).argsort(1, false);
    let n_negative = (positive.sum_dim_intlist(&[1], true, Kind::Float) * k).floor();
    rank.to_kind(Kind::Float).lt_tensor(&n_negative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn no_positive_gives_zero_loss() -> Result<()> {
        let mb_locs = Tensor::randn(&[2, 6, 4], (Kind::Float, Device::Cpu));
        let mb_confs = Tensor::randn(&[2, 6, 3], (Kind::Float, Device::Cpu));
        let gt_mb_locs = Tensor::zeros(&[2, 6, 4], (Kind::Float, Device::Cpu));
        let gt_mb_labels = Tensor::zeros(&[2, 6], (Kind::Int64, Device::Cpu));

        let (loc_loss, conf_loss) =
            multibox_loss(&mb_locs, &mb_confs, &gt_mb_locs, &gt_mb_labels, 3.0)?;
        assert_eq!(f64::from(&loc_loss), 0.0);
        assert_eq!(f64::from(&conf_loss), 0.0);
        Ok(())
    }

    #[test]
    fn losses_with_hard_negative_mining() -> Result<()> {
        // one image, four default boxes, two classes
        let mb_locs = Tensor::of_slice(&[
            0.5f32, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 0.0,
        ])
        .view([1, 4, 4]);
        let gt_mb_locs = Tensor::zeros(&[1, 4, 4], (Kind::Float, Device::Cpu));
        let gt_mb_labels = Tensor::of_slice(&[1i64, 0, 0, 0]).view([1, 4]);
        // the negative at index 2 is the hardest
        let mb_confs = Tensor::of_slice(&[
            0.0f32, 0.0, //
            2.0, 0.0, //
            0.0, 3.0, //
            0.0, 1.0,
        ])
        .view([1, 4, 2]);

        let (loc_loss, conf_loss) =
            multibox_loss(&mb_locs, &mb_confs, &gt_mb_locs, &gt_mb_labels, 1.0)?;

        // smooth L1 of 0.5 with beta 1 is 0.5 * 0.5^2
        assert_abs_diff_eq!(f64::from(&loc_loss), 0.125, epsilon = 1e-6);

        let ce = |logit_label: f64, logit_other: f64| {
            -(logit_label.exp() / (logit_label.exp() + logit_other.exp())).ln()
        };
        let expect = ce(0.0, 0.0) + ce(0.0, 3.0);
        assert_abs_diff_eq!(f64::from(&conf_loss), expect, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn reject_mismatched_shapes() {
        let mb_locs = Tensor::zeros(&[1, 4, 4], (Kind::Float, Device::Cpu));
        let mb_confs = Tensor::zeros(&[1, 4, 2], (Kind::Float, Device::Cpu));
        let gt_mb_labels = Tensor::zeros(&[1, 3], (Kind::Int64, Device::Cpu));
        assert!(multibox_loss(&mb_locs, &mb_confs, &mb_locs, &gt_mb_labels, 3.0).is_err());
    }
}
