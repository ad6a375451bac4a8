//! Registry of published weight sets.

use crate::{common::*, download::download_model, model::ModelKind};
use once_cell::sync::Lazy;

const VOC0712_URL: &str =
    "https://github.com/yuyu2172/share-weights/releases/download/0.0.3/ssd300_voc0712_2017_06_06.npz";
const VGG16_IMAGENET_URL: &str =
    "https://github.com/yuyu2172/share-weights/releases/download/0.0.3/ssd_vgg16_imagenet_2017_06_09.npz";
const VGG16_REDUCED_IMAGENET_URL: &str =
    "https://github.com/fukatani/RefineDet_chainer/releases/download/0.0.0/VGG_ILSVRC_16_layers_fc_reduced.npz";

/// A published weight file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PretrainedModel {
    pub url: &'static str,
    /// The number of foreground classes the weights were trained on, or `None` if the
    /// weights only initialize the backbone.
    pub n_fg_class: Option<usize>,
}

static PRETRAINED_MODELS: Lazy<HashMap<ModelKind, Vec<(&'static str, PretrainedModel)>>> =
    Lazy::new(|| {
        let voc0712 = (
            "voc0712",
            PretrainedModel {
                url: VOC0712_URL,
                n_fg_class: Some(20),
            },
        );
        let imagenet = (
            "imagenet",
            PretrainedModel {
                url: VGG16_IMAGENET_URL,
                n_fg_class: None,
            },
        );
        let imagenet_reduced = (
            "imagenet",
            PretrainedModel {
                url: VGG16_REDUCED_IMAGENET_URL,
                n_fg_class: None,
            },
        );

        ModelKind::iter()
            .map(|kind| {
                let models = match kind {
                    ModelKind::Ssd300Plus | ModelKind::Dssd300 => vec![voc0712, imagenet],
                    ModelKind::Essd300 | ModelKind::Essd300Plus => vec![imagenet],
                    ModelKind::RefineDet320 => vec![imagenet_reduced],
                };
                (kind, models)
            })
            .collect()
    });

/// The registered weight sets of a model kind, in registration order.
pub fn pretrained_models(kind: ModelKind) -> &'static [(&'static str, PretrainedModel)] {
    PRETRAINED_MODELS
        .get(&kind)
        .map(|models| models.as_slice())
        .unwrap_or(&[])
}

pub fn find_pretrained_model(kind: ModelKind, key: &str) -> Option<&'static PretrainedModel> {
    pretrained_models(kind)
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, model)| model)
}

/// Where the weights of a model come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightSource {
    /// A registered weight set to be downloaded.
    Url(&'static str),
    /// A local checkpoint file.
    File(PathBuf),
}

/// Validate the class count against the requested weights without touching the network.
///
/// `pretrained_model` is either a registered key of `kind` or a checkpoint path.
pub fn resolve_pretrained_model(
    n_fg_class: Option<usize>,
    pretrained_model: Option<&str>,
    kind: ModelKind,
) -> Result<(usize, Option<WeightSource>)> {
    ensure!(n_fg_class != Some(0), "n_fg_class must be positive");
    let pretrained_model = pretrained_model.filter(|key| !key.is_empty());

    let (n_fg_class, source) = match pretrained_model {
        Some(key) => match find_pretrained_model(kind, key) {
            Some(model) => {
                let n_fg_class = match (model.n_fg_class, n_fg_class) {
                    (Some(expect), Some(given)) => {
                        ensure!(given == expect, "n_fg_class should be {}", expect);
                        expect
                    }
                    (Some(expect), None) => expect,
                    (None, Some(given)) => given,
                    (None, None) => bail!("n_fg_class must be specified"),
                };
                (n_fg_class, Some(WeightSource::Url(model.url)))
            }
            None => {
                let n_fg_class =
                    n_fg_class.ok_or_else(|| format_err!("n_fg_class must be specified"))?;
                (n_fg_class, Some(WeightSource::File(PathBuf::from(key))))
            }
        },
        None => {
            let n_fg_class =
                n_fg_class.ok_or_else(|| format_err!("n_fg_class must be specified"))?;
            (n_fg_class, None)
        }
    };

    Ok((n_fg_class, source))
}

/// Resolve the class count and the local weight file, downloading registered weights
/// on demand.
pub fn check_pretrained_model(
    n_fg_class: Option<usize>,
    pretrained_model: Option<&str>,
    kind: ModelKind,
) -> Result<(usize, Option<PathBuf>)> {
    let (n_fg_class, source) = resolve_pretrained_model(n_fg_class, pretrained_model, kind)?;

    let path = match source {
        Some(WeightSource::Url(url)) => Some(download_model(url)?),
        Some(WeightSource::File(path)) => {
            ensure!(
                path.is_file(),
                "'{}' is neither a registered weight set of {} nor a file",
                path.display(),
                kind
            );
            Some(path)
        }
        None => None,
    };

    Ok((n_fg_class, path))
}
