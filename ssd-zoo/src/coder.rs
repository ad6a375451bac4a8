//! Default box generation and the encoding between boxes and multibox offsets.

use crate::{common::*, nms::non_maximum_suppression_tensor};
use std::cmp::Ordering;

/// Anchors whose ARM objectness falls below this value are discarded in RefineDet.
pub const NEGATIVE_ANCHOR_THRESH: f64 = 0.01;

/// Decoded detections of a single image.
#[derive(Debug, TensorLike)]
pub struct Detection {
    /// Boxes `[N, 4]` in `(y_min, x_min, y_max, x_max)` order.
    pub bboxes: Tensor,
    /// Foreground class indexes `[N]`, background excluded.
    pub labels: Tensor,
    /// Confidence scores `[N]`.
    pub scores: Tensor,
}

impl Detection {
    pub fn empty(device: Device) -> Self {
        Self {
            bboxes: Tensor::zeros(&[0, 4], (Kind::Float, device)),
            labels: Tensor::zeros(&[0], (Kind::Int64, device)),
            scores: Tensor::zeros(&[0], (Kind::Float, device)),
        }
    }

    pub fn len(&self) -> usize {
        self.scores.size()[0] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Converts between boxes and the outputs of a multibox head.
#[derive(Debug, Getters, CopyGetters)]
pub struct MultiboxCoder {
    /// Default boxes in network input pixels, ordered by (feature map, y, x, box).
    #[getset(get = "pub")]
    default_bboxes: Vec<CyCxHW<f32>>,
    /// The default boxes as a `[K, 4]` tensor in `(cy, cx, h, w)` order.
    #[getset(get = "pub")]
    default_bbox: Tensor,
    #[getset(get_copy = "pub")]
    variance: [f64; 2],
}

impl MultiboxCoder {
    /// Generate the default boxes.
    ///
    /// `sizes` carries either one entry per feature map plus one, in which case every cell
    /// also gets the intermediate `sqrt(s_k * s_k+1)` box, or exactly one entry per map.
    pub fn new(
        grids: &[i64],
        aspect_ratios: &[Vec<f64>],
        steps: &[f64],
        sizes: &[f64],
        variance: [f64; 2],
    ) -> Result<Self> {
        let n_maps = grids.len();
        ensure!(n_maps > 0, "grids must not be empty");
        ensure!(
            aspect_ratios.len() == n_maps,
            "the number of aspect ratio groups must be equal to the number of grids"
        );
        ensure!(
            steps.len() == n_maps,
            "the number of steps must be equal to the number of grids"
        );
        ensure!(
            sizes.len() == n_maps + 1 || sizes.len() == n_maps,
            "the number of sizes must be the number of grids, or plus one"
        );
        ensure!(grids.iter().all(|&grid| grid > 0), "grids must be positive");
        ensure!(
            sizes.iter().chain(steps).all(|&v| v > 0.0),
            "steps and sizes must be positive"
        );
        ensure!(
            aspect_ratios.iter().flatten().all(|&ar| ar > 0.0),
            "aspect ratios must be positive"
        );
        ensure!(
            variance.iter().all(|&v| v > 0.0),
            "variance must be positive"
        );
        let intermediate_scale = sizes.len() == n_maps + 1;

        let mut default_bboxes = vec![];

        for (k, (&grid, ars, &step)) in izip!(grids, aspect_ratios, steps).enumerate() {
            let size = sizes[k];
            let mut shapes = vec![(size, size)];
            if intermediate_scale {
                let s = (size * sizes[k + 1]).sqrt();
                shapes.push((s, s));
            }
            for &ar in ars {
                let sqrt_ar = ar.sqrt();
                shapes.push((size / sqrt_ar, size * sqrt_ar));
                shapes.push((size * sqrt_ar, size / sqrt_ar));
            }

            for v in 0..grid {
                for u in 0..grid {
                    let cy = (v as f64 + 0.5) * step;
                    let cx = (u as f64 + 0.5) * step;
                    for &(h, w) in &shapes {
                        default_bboxes.push(CyCxHW::try_from_cycxhw([
                            cy as f32, cx as f32, h as f32, w as f32,
                        ])?);
                    }
                }
            }
        }

        let flat: Vec<f32> = default_bboxes.iter().flat_map(|bbox| bbox.cycxhw()).collect();
        let default_bbox = Tensor::of_slice(&flat).view([-1, 4]);

        Ok(Self {
            default_bboxes,
            default_bbox,
            variance,
        })
    }

    pub fn n_default_bboxes(&self) -> usize {
        self.default_bboxes.len()
    }

    /// Encode ground truth boxes into multibox targets.
    ///
    /// Returns `(locs [K, 4], labels [K])`. Labels are shifted by one so that zero marks
    /// background. Every ground truth is first assigned to its best matching default box,
    /// then the remaining default boxes take the ground truth with the highest IoU if it
    /// reaches `iou_thresh`.
    pub fn encode(
        &self,
        bboxes: &[TLBR<f32>],
        labels: &[i64],
        iou_thresh: f64,
    ) -> Result<(Tensor, Tensor)> {
        ensure!(
            bboxes.len() == labels.len(),
            "the number of boxes ({}) does not match the number of labels ({})",
            bboxes.len(),
            labels.len()
        );
        ensure!(labels.iter().all(|&label| label >= 0), "labels must be non-negative");
        ensure!(
            bboxes.iter().all(|bbox| bbox.h() > 0.0 && bbox.w() > 0.0),
            "ground truth boxes must have positive size"
        );

        let n_default = self.default_bboxes.len();
        let [v0, v1] = self.variance;

        if bboxes.is_empty() {
            return Ok((
                Tensor::zeros(&[n_default as i64, 4], (Kind::Float, Device::Cpu)),
                Tensor::zeros(&[n_default as i64], (Kind::Int64, Device::Cpu)),
            ));
        }

        let iou: Vec<Vec<f32>> = self
            .default_bboxes
            .iter()
            .map(|default| bboxes.iter().map(|gt| default.iou_with(gt)).collect())
            .collect();

        let mut index: Vec<Option<usize>> = vec![None; n_default];

        // bipartite matching: the best default box for each ground truth
        {
            let mut masked_iou = iou.clone();
            loop {
                let best = masked_iou
                    .iter()
                    .enumerate()
                    .flat_map(|(i, row)| row.iter().enumerate().map(move |(j, &v)| (i, j, v)))
                    .max_by(|(_, _, lhs), (_, _, rhs)| {
                        lhs.partial_cmp(rhs).unwrap_or(Ordering::Equal)
                    });
                let (i, j) = match best {
                    Some((i, j, v)) if v > 1e-6 => (i, j),
                    _ => break,
                };
                index[i] = Some(j);
                masked_iou[i].iter_mut().for_each(|v| *v = 0.0);
                masked_iou.iter_mut().for_each(|row| row[j] = 0.0);
            }
        }

        // threshold matching for the rest
        izip!(&mut index, &iou)
            .filter(|(index, _)| index.is_none())
            .for_each(|(index, row)| {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|(_, lhs), (_, rhs)| lhs.partial_cmp(rhs).unwrap_or(Ordering::Equal));
                if let Some((j, &max)) = best {
                    if max as f64 >= iou_thresh {
                        *index = Some(j);
                    }
                }
            });

        let (locs, mb_labels): (Vec<[f32; 4]>, Vec<i64>) = izip!(&self.default_bboxes, &index)
            .map(|(default, index)| match *index {
                Some(j) => {
                    let gt = bboxes[j].to_cycxhw();
                    let loc = [
                        (gt.cy() - default.cy()) / (v0 as f32 * default.h()),
                        (gt.cx() - default.cx()) / (v0 as f32 * default.w()),
                        (gt.h() / default.h()).ln() / v1 as f32,
                        (gt.w() / default.w()).ln() / v1 as f32,
                    ];
                    (loc, labels[j] + 1)
                }
                None => ([0.0; 4], 0),
            })
            .unzip();

        let locs: Vec<f32> = locs.into_iter().flatten().collect();
        Ok((
            Tensor::of_slice(&locs).view([-1, 4]),
            Tensor::of_slice(&mb_labels),
        ))
    }

    /// Decode the head outputs of one image into detections.
    ///
    /// `mb_loc` has shape `[K, 4]` and `mb_conf` has shape `[K, n_class]`.
    pub fn decode(
        &self,
        mb_loc: &Tensor,
        mb_conf: &Tensor,
        nms_thresh: f64,
        score_thresh: f64,
    ) -> Result<Detection> {
        tch::no_grad(|| {
            self.check_shape(mb_loc, 4)?;
            let (_, n_class) = mb_conf.size2()?;
            self.check_shape(mb_conf, n_class)?;

            let anchors = self.default_bbox.to_device(mb_loc.device());
            let bbox = cycxhw_to_tlbr(&self.decode_cycxhw(&anchors, mb_loc));
            let scores = mb_conf.softmax(-1, Kind::Float);
            suppress(&bbox, &scores, nms_thresh, score_thresh)
        })
    }

    /// Decode the two stage RefineDet outputs of one image into detections.
    ///
    /// The ARM offsets refine the default boxes, anchors with low ARM objectness are
    /// dropped, and the ODM offsets are decoded relative to the refined anchors.
    pub fn decode_refined(
        &self,
        arm_loc: &Tensor,
        arm_conf: &Tensor,
        odm_loc: &Tensor,
        odm_conf: &Tensor,
        nms_thresh: f64,
        score_thresh: f64,
    ) -> Result<Detection> {
        tch::no_grad(|| {
            self.check_shape(arm_loc, 4)?;
            self.check_shape(arm_conf, 2)?;
            self.check_shape(odm_loc, 4)?;
            let (_, n_class) = odm_conf.size2()?;
            self.check_shape(odm_conf, n_class)?;

            let defaults = self.default_bbox.to_device(arm_loc.device());
            let anchors = self.decode_cycxhw(&defaults, arm_loc);

            let objectness = arm_conf.softmax(-1, Kind::Float).select(1, 1);
            let positive = objectness
                .ge(NEGATIVE_ANCHOR_THRESH)
                .nonzero()
                .view([-1]);

            let anchors = anchors.index_select(0, &positive);
            let odm_loc = odm_loc.index_select(0, &positive);
            let scores = odm_conf
                .index_select(0, &positive)
                .softmax(-1, Kind::Float);

            let bbox = cycxhw_to_tlbr(&self.decode_cycxhw(&anchors, &odm_loc));
            suppress(&bbox, &scores, nms_thresh, score_thresh)
        })
    }

    fn check_shape(&self, tensor: &Tensor, dim: i64) -> Result<()> {
        let n_default = self.default_bboxes.len() as i64;
        ensure!(
            tensor.size() == [n_default, dim],
            "expect shape [{}, {}], but get {:?}",
            n_default,
            dim,
            tensor.size()
        );
        Ok(())
    }

    /// Apply offsets to `(cy, cx, h, w)` anchors.
    fn decode_cycxhw(&self, anchors: &Tensor, loc: &Tensor) -> Tensor {
        let [v0, v1] = self.variance;
        let anchor_center = anchors.i((.., 0..2));
        let anchor_size = anchors.i((.., 2..4));

        let center = &anchor_center + loc.i((.., 0..2)) * v0 * &anchor_size;
        let size = &anchor_size * (loc.i((.., 2..4)) * v1).exp();
        Tensor::cat(&[center, size], 1)
    }
}

fn cycxhw_to_tlbr(bbox: &Tensor) -> Tensor {
    let center = bbox.i((.., 0..2));
    let half = bbox.i((.., 2..4)) / 2.0;
    Tensor::cat(&[&center - &half, &center + &half], 1)
}

/// Per foreground class score thresholding followed by NMS.
fn suppress(
    bbox: &Tensor,
    scores: &Tensor,
    nms_thresh: f64,
    score_thresh: f64,
) -> Result<Detection> {
    let device = bbox.device();
    let (_, n_class) = scores.size2()?;

    let (bboxes, labels, class_scores): (Vec<_>, Vec<_>, Vec<_>) = (1..n_class)
        .map(|label| -> Result<_> {
            let score = scores.select(1, label);
            let candidates = score.ge(score_thresh).nonzero().view([-1]);
            let bbox = bbox.index_select(0, &candidates);
            let score = score.index_select(0, &candidates);

            let keep = non_maximum_suppression_tensor(&bbox, &score, nms_thresh)?;
            let n_keep = keep.size()[0];

            Ok((
                bbox.index_select(0, &keep),
                Tensor::full(&[n_keep], label - 1, (Kind::Int64, device)),
                score.index_select(0, &keep),
            ))
        })
        .process_results(|iter| {
            let mut bboxes = vec![];
            let mut labels = vec![];
            let mut scores = vec![];
            iter.for_each(|(bbox, label, score)| {
                bboxes.push(bbox);
                labels.push(label);
                scores.push(score);
            });
            (bboxes, labels, scores)
        })?;

    if bboxes.is_empty() {
        return Ok(Detection::empty(device));
    }

    Ok(Detection {
        bboxes: Tensor::cat(&bboxes, 0),
        labels: Tensor::cat(&labels, 0),
        scores: Tensor::cat(&class_scores, 0),
    })
}
