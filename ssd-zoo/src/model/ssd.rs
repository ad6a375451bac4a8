use crate::{
    coder::{Detection, MultiboxCoder},
    common::*,
    extractor::Extractor,
    multibox::{HeadOutput, MultiboxHead},
};

/// Threshold presets for [Ssd::use_preset].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Preset {
    /// High score threshold for human inspection.
    Visualize,
    /// Low score threshold for mAP evaluation.
    Evaluate,
}

impl Preset {
    pub const NMS_THRESH: f64 = 0.45;

    /// Returns `(nms_thresh, score_thresh)`.
    pub fn thresholds(&self) -> (R64, R64) {
        let score_thresh = match self {
            Self::Visualize => 0.6,
            Self::Evaluate => 0.01,
        };
        (r64(Self::NMS_THRESH), r64(score_thresh))
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self::Visualize
    }
}

/// A single shot detector: feature extractor, multibox head and box coder.
#[derive(Debug, Getters, CopyGetters)]
pub struct Ssd {
    #[getset(get = "pub")]
    extractor: Extractor,
    #[getset(get = "pub")]
    multibox: MultiboxHead,
    #[getset(get = "pub")]
    coder: MultiboxCoder,
    /// Per channel mean `[3, 1, 1]` subtracted from RGB inputs.
    #[getset(get = "pub")]
    mean: Tensor,
    #[getset(get_copy = "pub")]
    nms_thresh: R64,
    #[getset(get_copy = "pub")]
    score_thresh: R64,
}

impl Ssd {
    pub fn new(
        extractor: Extractor,
        multibox: MultiboxHead,
        coder: MultiboxCoder,
        mean: [f32; 3],
        device: Device,
    ) -> Result<Self> {
        let n_cells: i64 = extractor.grids().iter().map(|grid| grid * grid).sum();
        ensure!(
            coder.n_default_bboxes() as i64 % n_cells == 0,
            "{} default boxes cannot be spread over {} feature map cells",
            coder.n_default_bboxes(),
            n_cells
        );

        let (nms_thresh, score_thresh) = Preset::default().thresholds();

        Ok(Self {
            extractor,
            multibox,
            coder,
            mean: Tensor::of_slice(&mean).view([3, 1, 1]).to_device(device),
            nms_thresh,
            score_thresh,
        })
    }

    /// The number of foreground classes.
    pub fn n_fg_class(&self) -> usize {
        self.multibox.n_class() - 1
    }

    pub fn insize(&self) -> i64 {
        self.extractor.insize()
    }

    pub fn device(&self) -> Device {
        self.mean.device()
    }

    pub fn use_preset(&mut self, preset: Preset) {
        let (nms_thresh, score_thresh) = preset.thresholds();
        self.nms_thresh = nms_thresh;
        self.score_thresh = score_thresh;
    }

    pub fn set_nms_thresh(&mut self, nms_thresh: R64) {
        self.nms_thresh = nms_thresh;
    }

    pub fn set_score_thresh(&mut self, score_thresh: R64) {
        self.score_thresh = score_thresh;
    }

    /// Run the network on a prepared `[B, 3, insize, insize]` batch.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<HeadOutput> {
        let (_, channels, height, width) = xs.size4()?;
        let insize = self.insize();
        ensure!(
            channels == 3 && height == insize && width == insize,
            "expect input shape [_, 3, {}, {}], but get {:?}",
            insize,
            insize,
            xs.size()
        );

        let features = self.extractor.forward(xs);
        self.multibox.forward_t(&features, train)
    }

    /// Resize a `[3, H, W]` RGB image with values in `0..255` to the input size and
    /// subtract the mean.
    pub fn prepare(&self, image: &Tensor) -> Result<Tensor> {
        let (channels, _, _) = image.size3()?;
        ensure!(channels == 3, "expect an RGB image, but get {} channels", channels);

        let insize = self.insize();
        let resized = image
            .to_device(self.device())
            .to_kind(Kind::Float)
            .unsqueeze(0)
            .upsample_bilinear2d(&[insize, insize], false, None, None)
            .squeeze_dim(0);
        Ok(resized - &self.mean)
    }

    /// Detect objects in `[3, H, W]` RGB images.
    ///
    /// Boxes of each detection are in the coordinates of the original image.
    pub fn predict(&self, images: &[Tensor]) -> Result<Vec<Detection>> {
        if images.is_empty() {
            return Ok(vec![]);
        }

        tch::no_grad(|| {
            let sizes: Vec<HW<f64>> = images
                .iter()
                .map(|image| -> Result<_> {
                    let (_, height, width) = image.size3()?;
                    HW::try_from_hw([height as f64, width as f64])
                })
                .try_collect()?;
            let xs: Vec<_> = images.iter().map(|image| self.prepare(image)).try_collect()?;
            let xs = Tensor::stack(&xs, 0);

            let nms_thresh = self.nms_thresh.raw();
            let score_thresh = self.score_thresh.raw();

            let detections: Vec<Detection> = match self.forward_t(&xs, false)? {
                HeadOutput::Multibox(output) => (0..images.len() as i64)
                    .map(|index| {
                        self.coder.decode(
                            &output.locs.get(index),
                            &output.confs.get(index),
                            nms_thresh,
                            score_thresh,
                        )
                    })
                    .try_collect()?,
                HeadOutput::Refined(output) => (0..images.len() as i64)
                    .map(|index| {
                        self.coder.decode_refined(
                            &output.arm_locs.get(index),
                            &output.arm_confs.get(index),
                            &output.odm_locs.get(index),
                            &output.odm_confs.get(index),
                            nms_thresh,
                            score_thresh,
                        )
                    })
                    .try_collect()?,
            };

            let insize = self.insize() as f64;
            let input_size = HW::try_from_hw([insize, insize])?;

            let detections = izip!(detections, sizes)
                .map(|(detection, size)| {
                    let transform = Transform::from_sizes_exact(&input_size, &size);
                    rescale(detection, &transform)
                })
                .collect();

            Ok(detections)
        })
    }
}

fn rescale(detection: Detection, transform: &Transform<f64>) -> Detection {
    let Transform { sy, sx, ty, tx } = *transform;
    let device = detection.bboxes.device();
    let scale = Tensor::of_slice(&[sy, sx, sy, sx])
        .to_kind(Kind::Float)
        .to_device(device);
    let offset = Tensor::of_slice(&[ty, tx, ty, tx])
        .to_kind(Kind::Float)
        .to_device(device);

    Detection {
        bboxes: detection.bboxes * scale + offset,
        ..detection
    }
}
