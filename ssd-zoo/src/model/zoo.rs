use super::ssd::Ssd;
use crate::{
    coder::MultiboxCoder,
    common::*,
    extractor::{Extractor, Vgg16Extractor300, Vgg16Extractor320},
    multibox::{
        n_default_boxes, DeconvolutionalResidualMultibox, ExtendedMultibox, MultiboxHead,
        MultiboxWithTcb, ResidualMultibox,
    },
    pretrained::{check_pretrained_model, pretrained_models, PretrainedModel},
    serializer::load_npz,
};

/// RGB mean of the ImageNet training images.
pub const IMAGENET_MEAN: [f32; 3] = [123.0, 117.0, 104.0];
pub const VARIANCE: [f64; 2] = [0.1, 0.2];

const ASPECT_RATIOS_300: [&[f64]; 6] = [
    &[2.0],
    &[2.0, 3.0],
    &[2.0, 3.0],
    &[2.0, 3.0],
    &[2.0],
    &[2.0],
];
const STEPS_300: [f64; 6] = [8.0, 16.0, 32.0, 64.0, 100.0, 300.0];
const SIZES_300: [f64; 7] = [30.0, 60.0, 111.0, 162.0, 213.0, 264.0, 315.0];

const ASPECT_RATIOS_320: [&[f64]; 4] = [&[2.0], &[2.0], &[2.0], &[2.0]];
const STEPS_320: [f64; 4] = [8.0, 16.0, 32.0, 64.0];
const SIZES_320: [f64; 4] = [32.0, 64.0, 128.0, 256.0];

/// The detectors of the zoo.
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
pub enum ModelKind {
    /// SSD300 with residual prediction modules.
    Ssd300Plus,
    /// Deconvolutional single shot detector.
    Dssd300,
    /// Extended single shot detector.
    Essd300,
    /// ESSD with residual prediction modules.
    Essd300Plus,
    /// RefineDet with 320x320 inputs.
    #[serde(rename = "refinedet320")]
    #[strum(serialize = "refinedet320")]
    RefineDet320,
}

impl ModelKind {
    pub fn insize(&self) -> i64 {
        match self {
            Self::RefineDet320 => Vgg16Extractor320::INSIZE,
            _ => Vgg16Extractor300::INSIZE,
        }
    }

    pub fn grids(&self) -> &'static [i64] {
        match self {
            Self::RefineDet320 => &Vgg16Extractor320::GRIDS,
            _ => &Vgg16Extractor300::GRIDS,
        }
    }

    /// Returns `(aspect_ratios, steps, sizes)` of the default boxes.
    pub fn anchor_config(&self) -> (&'static [&'static [f64]], &'static [f64], &'static [f64]) {
        match self {
            Self::RefineDet320 => (&ASPECT_RATIOS_320[..], &STEPS_320[..], &SIZES_320[..]),
            _ => (&ASPECT_RATIOS_300[..], &STEPS_300[..], &SIZES_300[..]),
        }
    }

    pub fn pretrained_models(&self) -> &'static [(&'static str, PretrainedModel)] {
        pretrained_models(*self)
    }

    /// Build the network under `path` with randomly initialized weights.
    pub fn build_network<'p>(&self, path: impl Borrow<nn::Path<'p>>, n_fg_class: usize) -> Result<Ssd> {
        let path = path.borrow();
        ensure!(n_fg_class > 0, "n_fg_class must be positive");
        let n_class = n_fg_class + 1;

        let extractor: Extractor = match self {
            Self::RefineDet320 => Vgg16Extractor320::new(path / "extractor")?.into(),
            _ => Vgg16Extractor300::new(path / "extractor")?.into(),
        };

        let (aspect_ratios, steps, sizes) = self.anchor_config();
        let intermediate_scale = sizes.len() == steps.len() + 1;
        let n_defaults: Vec<usize> = aspect_ratios
            .iter()
            .map(|ars| n_default_boxes(ars, intermediate_scale))
            .collect();
        let in_channels = extractor.out_channels();

        let mb_path = path / "multibox";
        let multibox: MultiboxHead = match self {
            Self::Ssd300Plus => {
                ResidualMultibox::new(&mb_path, n_class, &n_defaults, &in_channels)?.into()
            }
            Self::Dssd300 => {
                DeconvolutionalResidualMultibox::new(&mb_path, n_class, &n_defaults, &in_channels)?
                    .into()
            }
            Self::Essd300 => {
                ExtendedMultibox::new(&mb_path, n_class, &n_defaults, &in_channels)?.into()
            }
            Self::Essd300Plus => {
                ExtendedMultibox::new_residual(&mb_path, n_class, &n_defaults, &in_channels)?
                    .into()
            }
            Self::RefineDet320 => {
                MultiboxWithTcb::new(&mb_path, n_class, &n_defaults, &in_channels)?.into()
            }
        };
        ensure!(
            multibox.intermediate_scale() == intermediate_scale,
            "the default box layout does not match the {} head",
            multibox.as_ref()
        );

        let aspect_ratios: Vec<Vec<f64>> = aspect_ratios.iter().map(|ars| ars.to_vec()).collect();
        let coder = MultiboxCoder::new(extractor.grids(), &aspect_ratios, steps, sizes, VARIANCE)?;

        Ssd::new(extractor, multibox, coder, IMAGENET_MEAN, path.device())
    }

    /// Build the model in the root of `vs` and load the requested weights.
    ///
    /// `pretrained_model` is a registered weight set name, a checkpoint path, or `None`
    /// to keep the initial weights.
    pub fn build(
        &self,
        vs: &nn::VarStore,
        n_fg_class: Option<usize>,
        pretrained_model: Option<&str>,
    ) -> Result<Ssd> {
        let (n_fg_class, path) = check_pretrained_model(n_fg_class, pretrained_model, *self)?;
        let model = self.build_network(&vs.root(), n_fg_class)?;

        if let Some(path) = path {
            let report = load_npz(&path, vs)?;
            if report.loaded.is_empty() {
                warn!(
                    "no weights in {} match the {} model, {} entries skipped",
                    path.display(),
                    self,
                    report.skipped.len()
                );
            }
        }

        Ok(model)
    }
}

pub fn ssd300_plus(
    vs: &nn::VarStore,
    n_fg_class: Option<usize>,
    pretrained_model: Option<&str>,
) -> Result<Ssd> {
    ModelKind::Ssd300Plus.build(vs, n_fg_class, pretrained_model)
}

pub fn dssd300(
    vs: &nn::VarStore,
    n_fg_class: Option<usize>,
    pretrained_model: Option<&str>,
) -> Result<Ssd> {
    ModelKind::Dssd300.build(vs, n_fg_class, pretrained_model)
}

pub fn essd300(
    vs: &nn::VarStore,
    n_fg_class: Option<usize>,
    pretrained_model: Option<&str>,
) -> Result<Ssd> {
    ModelKind::Essd300.build(vs, n_fg_class, pretrained_model)
}

pub fn essd300_plus(
    vs: &nn::VarStore,
    n_fg_class: Option<usize>,
    pretrained_model: Option<&str>,
) -> Result<Ssd> {
    ModelKind::Essd300Plus.build(vs, n_fg_class, pretrained_model)
}

pub fn refinedet320(
    vs: &nn::VarStore,
    n_fg_class: Option<usize>,
    pretrained_model: Option<&str>,
) -> Result<Ssd> {
    ModelKind::RefineDet320.build(vs, n_fg_class, pretrained_model)
}
