//! Non-maximum suppression.

use crate::common::*;
use std::cmp::Ordering;

/// Greedy non-maximum suppression.
///
/// Boxes are visited in descending score order, or in the given order if `scores` is
/// `None`. A box is dropped if its IoU with an already selected box is at least
/// `thresh`. The returned indexes point into `bboxes` in selection order.
pub fn non_maximum_suppression(
    bboxes: &[TLBR<f32>],
    thresh: f32,
    scores: Option<&[f32]>,
    limit: Option<usize>,
) -> Result<Vec<usize>> {
    let mut order: Vec<usize> = (0..bboxes.len()).collect();

    if let Some(scores) = scores {
        ensure!(
            scores.len() == bboxes.len(),
            "the number of scores ({}) does not match the number of boxes ({})",
            scores.len(),
            bboxes.len()
        );
        order.sort_by(|&lhs, &rhs| {
            scores[rhs]
                .partial_cmp(&scores[lhs])
                .unwrap_or(Ordering::Equal)
        });
    }

    let limit = limit.unwrap_or(bboxes.len());
    let mut selected: Vec<usize> = vec![];

    for index in order {
        if selected.len() >= limit {
            break;
        }

        let bbox = &bboxes[index];
        let suppressed = selected
            .iter()
            .any(|&other| bbox.iou_with(&bboxes[other]) >= thresh);

        if !suppressed {
            selected.push(index);
        }
    }

    Ok(selected)
}

/// Tensor variant of [non_maximum_suppression] taking `[N, 4]` boxes and `[N]` scores.
pub fn non_maximum_suppression_tensor(
    bboxes: &Tensor,
    scores: &Tensor,
    thresh: f64,
) -> Result<Tensor> {
    let device = bboxes.device();
    let (n_boxes, n_coords) = bboxes.size2()?;
    ensure!(n_coords == 4, "boxes must have shape [N, 4]");

    let to_vec = |tensor: &Tensor| -> Vec<f32> {
        Vec::from(
            &tensor
                .to_device(Device::Cpu)
                .to_kind(Kind::Float)
                .contiguous(),
        )
    };
    let coords = to_vec(bboxes);
    let scores = to_vec(scores);
    ensure!(scores.len() as i64 == n_boxes, "scores must have shape [N]");

    let rects: Vec<TLBR<f32>> = coords
        .chunks(4)
        .map(|tlbr| TLBR::try_from_tlbr([tlbr[0], tlbr[1], tlbr[2], tlbr[3]]))
        .try_collect()?;

    let keep = non_maximum_suppression(&rects, thresh as f32, Some(&scores), None)?;
    let keep: Vec<i64> = keep.into_iter().map(|index| index as i64).collect();
    Ok(Tensor::of_slice(&keep).to_device(device))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(tlbr: [f32; 4]) -> TLBR<f32> {
        TLBR::try_from_tlbr(tlbr).unwrap()
    }

    #[test]
    fn nms_suppresses_overlaps() -> Result<()> {
        let bboxes = vec![
            rect([0.0, 0.0, 10.0, 10.0]),
            rect([1.0, 1.0, 11.0, 11.0]),
            rect([20.0, 20.0, 30.0, 30.0]),
        ];
        let scores = vec![0.5, 0.9, 0.3];

        let keep = non_maximum_suppression(&bboxes, 0.5, Some(&scores), None)?;
        assert_eq!(keep, vec![1, 2]);

        let keep = non_maximum_suppression(&bboxes, 0.5, None, None)?;
        assert_eq!(keep, vec![0, 2]);

        let keep = non_maximum_suppression(&bboxes, 0.5, Some(&scores), Some(1))?;
        assert_eq!(keep, vec![1]);

        // a threshold above every IoU keeps everything
        let keep = non_maximum_suppression(&bboxes, 1.0, Some(&scores), None)?;
        assert_eq!(keep, vec![1, 0, 2]);
        Ok(())
    }

    #[test]
    fn nms_on_empty_input() -> Result<()> {
        assert!(non_maximum_suppression(&[], 0.45, Some(&[]), None)?.is_empty());

        let bboxes = Tensor::zeros(&[0, 4], (Kind::Float, Device::Cpu));
        let scores = Tensor::zeros(&[0], (Kind::Float, Device::Cpu));
        let keep = non_maximum_suppression_tensor(&bboxes, &scores, 0.45)?;
        assert_eq!(keep.size(), vec![0]);
        Ok(())
    }

    #[test]
    fn nms_rejects_mismatched_scores() {
        let bboxes = vec![rect([0.0, 0.0, 1.0, 1.0])];
        assert!(non_maximum_suppression(&bboxes, 0.5, Some(&[]), None).is_err());
    }
}
