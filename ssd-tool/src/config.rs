use anyhow::{Context, Result};
use noisy_float::prelude::*;
use serde::{Deserialize, Serialize};
use ssd_zoo::model::{ModelKind, Preset};
use std::{fs, path::Path};
use tch::Device;

/// Detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelKind,
    /// The number of foreground classes, required unless implied by the weights.
    pub n_fg_class: Option<usize>,
    /// A registered weight set name or a checkpoint path.
    pub pretrained_model: Option<String>,
    /// The device where the model runs on.
    #[serde(with = "tch_serde::serde_device", default = "default_device")]
    pub device: Device,
    #[serde(default)]
    pub preset: Preset,
    /// Overrides the NMS threshold of the preset.
    pub nms_thresh: Option<R64>,
    /// Overrides the score threshold of the preset.
    pub score_thresh: Option<R64>,
    /// Optional class names indexed by label.
    pub label_names: Option<Vec<String>>,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = json5::from_str(&text)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }
}

fn default_device() -> Device {
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("detect.json5");
        fs::write(
            &path,
            r#"{
                // VOC detector
                model: "ssd300_plus",
                n_fg_class: 20,
                pretrained_model: "voc0712",
                device: "cpu",
                preset: "evaluate",
                score_thresh: 0.3,
            }"#,
        )?;

        let config = Config::open(&path)?;
        assert_eq!(config.model, ModelKind::Ssd300Plus);
        assert_eq!(config.n_fg_class, Some(20));
        assert_eq!(config.pretrained_model.as_deref(), Some("voc0712"));
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.preset, Preset::Evaluate);
        assert_eq!(config.score_thresh, Some(r64(0.3)));
        assert!(config.label_names.is_none());
        Ok(())
    }

    #[test]
    fn minimal_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("detect.json5");
        fs::write(&path, r#"{ model: "refinedet320", n_fg_class: 3 }"#)?;

        let config = Config::open(&path)?;
        assert_eq!(config.model, ModelKind::RefineDet320);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.preset, Preset::Visualize);
        assert!(config.pretrained_model.is_none());
        Ok(())
    }
}
